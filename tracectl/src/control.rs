// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracing runtime control.

use ordermap::{OrderMap, OrderSet};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, Registry, filter::LevelFilter, prelude::*, reload};

use crate::targets::TARGET_DECLS;
use crate::trace_target;

trace_target!("tracectl", LevelFilter::INFO, &[]);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TraceCtlError {
    #[error("Invalid syntax '{0}': it should be tag=level")]
    Syntax(String),
    #[error("Invalid level '{0}'")]
    Level(String),
}

/// Runtime configuration of a tracing target
#[derive(Debug, Clone, PartialEq)]
pub struct TargetCfg {
    pub target: &'static str,
    pub name: &'static str,
    pub level: LevelFilter,
    pub tags: Vec<&'static str>,
}

#[derive(Debug)]
struct TargetDb {
    level: LevelFilter,
    targets: OrderMap<&'static str, TargetCfg>,
    tags: OrderMap<&'static str, OrderSet<&'static str>>,
}

impl TargetDb {
    fn new(level: LevelFilter) -> Self {
        let mut db = Self {
            level,
            targets: OrderMap::new(),
            tags: OrderMap::new(),
        };
        for decl in TARGET_DECLS {
            db.register(decl.target, decl.name, decl.level, decl.tags);
        }
        db
    }
    fn register(
        &mut self,
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) {
        // the name of a target is always one of its tags
        let mut tags = tags.to_vec();
        if !tags.contains(&name) {
            tags.push(name);
        }
        for tag in &tags {
            self.tags.entry(*tag).or_default().insert(target);
        }
        let cfg = TargetCfg {
            target,
            name,
            level,
            tags,
        };
        if self.targets.insert(target, cfg).is_some() {
            warn!("Tracing target {target} is declared more than once");
        }
    }
    fn tagged_mut(&mut self, tag: &str) -> impl Iterator<Item = &mut TargetCfg> {
        let members = self.tags.get(tag).cloned().unwrap_or_default();
        self.targets
            .values_mut()
            .filter(move |cfg| members.contains(cfg.target))
    }
    fn env_filter(&self) -> EnvFilter {
        self.targets
            .values()
            .fold(EnvFilter::new(self.level.to_string()), |filter, cfg| {
                match format!("{}={}", cfg.target, cfg.level).parse() {
                    Ok(directive) => filter.add_directive(directive),
                    Err(e) => {
                        warn!("Skipping tracing directive for {}: {e}", cfg.target);
                        filter
                    }
                }
            })
    }
    fn as_config_string(&self) -> String {
        let mut out = format!("default={}", self.level);
        for cfg in self.targets.values() {
            out += &format!(",{}={}", cfg.name, cfg.level);
        }
        out
    }
}

impl Display for TargetDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:>40} │ {:>8} │ TAGS", "TARGET", "LEVEL")?;
        for cfg in self.targets.values() {
            writeln!(
                f,
                "{:>40} │ {:>8} │ {}",
                cfg.target,
                cfg.level,
                cfg.tags.join(",")
            )?;
        }
        write!(f, "{:>40} │ {:>8} │ --", "(default)", self.level)
    }
}

/// Owner of the tracing subscriber and of the per-target levels
pub struct TracingControl {
    db: Mutex<TargetDb>,
    reload_handle: Option<reload::Handle<EnvFilter, Registry>>,
}

static TRACING_CTL: OnceLock<TracingControl> = OnceLock::new();

/// Get the process-wide [`TracingControl`], installing the subscriber on first use
pub fn get_trace_ctl() -> &'static TracingControl {
    TRACING_CTL.get_or_init(TracingControl::new)
}

impl TracingControl {
    fn new() -> Self {
        let db = TargetDb::new(LevelFilter::INFO);
        let (filter, handle) = reload::Layer::new(db.env_filter());
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_line_number(true)
            .with_target(true)
            .with_thread_names(true)
            .with_level(true);

        // another global subscriber (e.g. a test harness) may already be in place
        let reload_handle = match tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            Ok(()) => Some(handle),
            Err(e) => {
                debug!("Tracing subscriber not installed: {e}");
                None
            }
        };
        Self {
            db: Mutex::new(db),
            reload_handle,
        }
    }
    pub fn init() {
        get_trace_ctl();
    }
    fn lock(&self) -> MutexGuard<'_, TargetDb> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
    fn reload(&self, db: &TargetDb) {
        if let Some(handle) = &self.reload_handle
            && let Err(e) = handle.reload(db.env_filter())
        {
            warn!("Failed to reload tracing filter: {e}");
        }
    }

    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) {
        let mut db = self.lock();
        let mut changed = 0;
        for cfg in db.tagged_mut(tag) {
            if cfg.level != level {
                cfg.level = level;
                changed += 1;
            }
        }
        if changed > 0 {
            self.reload(&db);
        }
        info!("Log level for tag '{tag}' set to {level} ({changed} targets changed)");
    }
    pub fn set_level_all(&self, level: LevelFilter) {
        let mut db = self.lock();
        db.targets.values_mut().for_each(|cfg| cfg.level = level);
        self.reload(&db);
    }
    pub fn set_default_level(&self, level: LevelFilter) {
        let mut db = self.lock();
        if db.level != level {
            db.level = level;
            self.reload(&db);
            info!("Default log level set to {level}");
        }
    }
    #[must_use]
    pub fn get_default_level(&self) -> LevelFilter {
        self.lock().level
    }

    fn parse_config(input: &str) -> Result<OrderMap<String, LevelFilter>, TraceCtlError> {
        let mut out = OrderMap::new();
        for item in input.split(',').map(str::trim) {
            let (tag, level) = item
                .split_once('=')
                .ok_or_else(|| TraceCtlError::Syntax(item.to_string()))?;
            let level = LevelFilter::from_str(level.trim())
                .map_err(|_| TraceCtlError::Level(level.trim().to_string()))?;
            out.insert(tag.trim().to_string(), level);
        }
        Ok(out)
    }

    /// Configure levels from a string of comma-separated `tag=level` items.
    /// `default` sets the default level and `all` sets every known target;
    /// other tags are applied afterwards so `all=info,lpm=debug` works as expected.
    ///
    /// # Errors
    ///
    /// Fails without changing anything if any item is malformed.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TraceCtlError> {
        let config = Self::parse_config(input)?;
        if let Some(level) = config.get("default") {
            self.set_default_level(*level);
        }
        if let Some(level) = config.get("all") {
            self.set_level_all(*level);
        }
        for (tag, level) in config
            .iter()
            .filter(|(tag, _)| *tag != "default" && *tag != "all")
        {
            self.set_tag_level(tag, *level);
        }
        Ok(())
    }

    #[must_use]
    pub fn get_target(&self, target: &str) -> Option<TargetCfg> {
        self.lock().targets.get(target).cloned()
    }
    #[must_use]
    pub fn get_targets_by_tag(&self, tag: &str) -> Vec<TargetCfg> {
        let mut db = self.lock();
        db.tagged_mut(tag).map(|cfg| cfg.clone()).collect()
    }
    #[must_use]
    pub fn as_config_string(&self) -> String {
        self.lock().as_config_string()
    }
    pub fn dump(&self) {
        info!("\n{}", *self.lock());
    }
}

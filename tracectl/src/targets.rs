// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Link-time registry of tracing targets

use crate::LevelFilter;
use linkme::distributed_slice;

/// A tracing target as declared in code
#[derive(Debug)]
pub struct TargetDecl {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: &'static [&'static str],
}
impl TargetDecl {
    #[must_use]
    pub const fn new(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            target,
            name,
            level,
            tags,
        }
    }
}

#[distributed_slice]
pub static TARGET_DECLS: [TargetDecl];

#[doc(hidden)]
#[macro_export]
macro_rules! target_decl_deps {
    () => {
        use linkme::distributed_slice;
        use $crate::LevelFilter;
        use $crate::targets::{TARGET_DECLS, TargetDecl};
    };
}

/// Declare the module path as a tracing target, with a name, a default level and tags.
///
/// The expansion is wrapped in an anonymous const so that the macro can be used
/// several times in a crate without clashing statics.
#[macro_export]
macro_rules! trace_target {
    ($name:expr, $level:expr, $tags:expr) => {
        const _: () = {
            $crate::target_decl_deps!();

            #[distributed_slice(TARGET_DECLS)]
            static DECL: TargetDecl = TargetDecl::new(module_path!(), $name, $level, $tags);
        };
    };
}

/// Declare a tracing target that is not a module path. Logs must then use
/// `target: "..."` explicitly.
#[macro_export]
macro_rules! custom_target {
    ($target:expr, $level:expr, $tags:expr) => {
        const _: () = {
            $crate::target_decl_deps!();

            #[distributed_slice(TARGET_DECLS)]
            static DECL: TargetDecl = TargetDecl::new($target, $target, $level, $tags);
        };
    };
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime control of tracing targets.
//!
//! Crates declare their tracing targets with [`trace_target!`] or [`custom_target!`].
//! Declarations are gathered at link time, so [`TracingControl`] knows every target
//! before any of them logs, and log levels can be changed per target or per tag.

#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod control;
pub mod targets;

pub use control::{TraceCtlError, TracingControl, get_trace_ctl};
pub use tracing_subscriber::filter::LevelFilter;

// src/watch/mod.rs

//! Run-on-save.
//!
//! - [`patterns`] compiles a rule's glob and matches saved paths against it.
//! - [`trigger`] owns the per-rule debounce timers and launches tasks.
//! - [`watcher`] turns `notify` events into saves for the CLI `watch` mode.

pub mod patterns;
pub mod trigger;
pub mod watcher;

pub use patterns::SaveRule;
pub use trigger::{RunOnSaveTrigger, TaskLauncher};
pub use watcher::{WatcherHandle, spawn_save_watcher};

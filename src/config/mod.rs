// src/config/mod.rs

//! Task document loading, validation and saving.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`), both the raw shapes
//!   accepted on disk and the canonical [`TaskConfig`].
//! - Load and save a document (`loader.rs`).
//! - Normalise union-shaped fields and validate basic invariants
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_str, save_to_path};
pub use model::{
    MAX_RUN_ON_SAVE_DELAY_MS, RawTasksDocument, RunOnSaveConfig, Settings, TaskConfig,
    TasksDocument,
};

// src/fs/mod.rs

//! Read-only filesystem access used by task auto-detection.

use std::fmt::Debug;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod mock;

pub use mock::MockFileSystem;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn is_file(&self, path: &Path) -> bool;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

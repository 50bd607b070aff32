//! Local storage for the widget position

use crate::infrastructure::traits::PositionStore;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub const POSITION_KEY: &str = "chat-widget-position";

/// Keeps the position in `<dir>/chat-widget-position.json`.
#[derive(Debug, Clone)]
pub struct FilePositionStore {
    path: PathBuf,
}

impl FilePositionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{POSITION_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PositionStore for FilePositionStore {
    fn load(&self) -> Option<String> {
        fs::read_to_string(&self.path).ok()
    }

    fn save(&self, raw: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, raw)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPositionStore {
    value: Mutex<Option<String>>,
}

impl MemoryPositionStore {
    pub fn with_value(raw: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(raw.into())),
        }
    }
}

impl PositionStore for MemoryPositionStore {
    fn load(&self) -> Option<String> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, raw: &str) -> io::Result<()> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw.to_owned());
        Ok(())
    }
}

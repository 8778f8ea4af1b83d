//! `settings.json` in the application data directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::document::write_text_file;
use crate::error::BackendError;
use crate::view_store::DocumentType;

pub const SETTINGS_FILE: &str = "settings.json";
pub const BACKUP_DIR: &str = "backup";
pub const LOG_DIR: &str = "logs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub log_level: String,
    pub default_quote_type: DocumentType,
    /// Relative paths resolve against the application data directory.
    pub backup_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_quote_type: DocumentType::Final,
            backup_dir: None,
        }
    }
}

impl AppSettings {
    pub fn path(root: &Path) -> PathBuf {
        root.join(SETTINGS_FILE)
    }

    /// Missing or unreadable files yield the defaults.
    pub fn load(root: &Path) -> Self {
        let path = Self::path(root);
        if !path.exists() {
            return Self::default();
        }
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "settings unreadable, using defaults");
                return Self::default();
            }
        };
        let parsed = serde_json::from_str::<Value>(raw.as_str()).unwrap_or(Value::Null);
        Self::from_value(parsed)
    }

    /// Fields of the wrong shape fall back one by one.
    pub fn from_value(value: Value) -> Self {
        let defaults = Self::default();
        let Some(obj) = value.as_object() else {
            return defaults;
        };
        let log_level = obj
            .get("logLevel")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|level| !level.is_empty())
            .map(str::to_string)
            .unwrap_or(defaults.log_level);
        let default_quote_type = obj
            .get("defaultQuoteType")
            .and_then(Value::as_str)
            .and_then(DocumentType::parse)
            .unwrap_or(defaults.default_quote_type);
        let backup_dir = obj
            .get("backupDir")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);
        Self {
            log_level,
            default_quote_type,
            backup_dir,
        }
    }

    pub fn save(&self, root: &Path) -> Result<(), BackendError> {
        let content = serde_json::to_string_pretty(self)?;
        write_text_file(&Self::path(root), content.as_str())?;
        Ok(())
    }

    pub fn backup_dir(&self, root: &Path) -> PathBuf {
        match &self.backup_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.join(BACKUP_DIR),
        }
    }

    pub fn log_dir(root: &Path) -> PathBuf {
        root.join(LOG_DIR)
    }
}

//! # courier-settings
//!
//! Configuration management with layered sources for the Courier gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`CourierSettings::default()`]
//! 2. **User file** — `~/.courier/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `COURIER_*` overrides (highest priority)
//!
//! The global singleton is reloadable so operational tooling can rewrite
//! the file and swap the cached value without a restart.

#![deny(unsafe_code)]

pub mod types;

pub use types::*;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Settings errors.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// File read failed.
    #[error("failed to read settings at {path}: {reason}")]
    Read {
        /// Settings file path.
        path: String,
        /// Error description.
        reason: String,
    },
    /// JSON parse failed.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Convenience alias for settings results.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Global settings singleton. `RwLock<Option<Arc<_>>>` rather than
/// `OnceLock` so the cached value can be swapped on reload.
static SETTINGS: RwLock<Option<Arc<CourierSettings>>> = RwLock::new(None);

/// Default settings file location (`~/.courier/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
    home.join(".courier").join("settings.json")
}

/// Get the global settings instance.
///
/// First call loads from [`settings_path`]; later calls return the cached
/// `Arc`. Load failures fall back to compiled defaults with a warning.
pub fn get_settings() -> Arc<CourierSettings> {
    {
        let guard = SETTINGS.read().expect("settings lock poisoned");
        if let Some(ref s) = *guard {
            return Arc::clone(s);
        }
    }

    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    // Another thread may have initialized while we waited for the lock.
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings_from_path(&settings_path()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            CourierSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Replace the global settings (startup and tests).
pub fn init_settings(settings: CourierSettings) {
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(Arc::new(settings));
}

/// Reload from a specific file path and swap the global cache.
pub fn reload_settings_from_path(path: &Path) {
    let new = Arc::new(match load_settings_from_path(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, ?path, "failed to reload settings, falling back to defaults");
            CourierSettings::default()
        }
    });
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(new);
    tracing::info!(?path, "settings reloaded from disk");
}

/// Load settings from a file, deep-merged over defaults, then apply
/// `COURIER_*` env overrides. A missing file is not an error.
pub fn load_settings_from_path(path: &Path) -> Result<CourierSettings> {
    let mut doc = serde_json::to_value(CourierSettings::default())?;

    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let file_doc: Value = serde_json::from_str(&raw)?;
            doc = deep_merge(doc, file_doc);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(SettingsError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            });
        }
    }

    doc = apply_env_overrides(doc);
    Ok(serde_json::from_value(doc)?)
}

/// Recursively merge `overlay` into `base`. Objects merge key-by-key;
/// everything else is replaced wholesale.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Env override table: `COURIER_<SECTION>_<KEY>` → JSON pointer.
const ENV_OVERRIDES: &[(&str, &str, &str)] = &[
    ("COURIER_SERVER_HOST", "server", "host"),
    ("COURIER_SERVER_PORT", "server", "port"),
    ("COURIER_DATABASE_PATH", "database", "path"),
    ("COURIER_BRIDGE_URL", "transport", "bridgeUrl"),
    ("COURIER_COUNTRY_CODE", "transport", "defaultCountryCode"),
    ("COURIER_ROUTING_SUFFIX", "transport", "routingSuffix"),
    ("COURIER_QUEUE_MAX_DEPTH", "queue", "maxDepth"),
];

fn apply_env_overrides(mut doc: Value) -> Value {
    for (var, section, key) in ENV_OVERRIDES {
        let Ok(raw) = std::env::var(var) else {
            continue;
        };
        // Numbers parse as numbers, everything else stays a string.
        let value = raw
            .parse::<i64>()
            .map_or_else(|_| Value::String(raw.clone()), Value::from);
        if let Some(section_map) = doc.get_mut(*section).and_then(Value::as_object_mut) {
            let _ = section_map.insert((*key).to_string(), value);
        }
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let loaded = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(loaded, CourierSettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, r#"{{"queue": {{"maxDepth": 5}}, "server": {{"port": 9999}}}}"#).unwrap();

        let loaded = load_settings_from_path(&path).unwrap();
        assert_eq!(loaded.queue.max_depth, 5);
        assert_eq!(loaded.server.port, 9999);
        // Untouched sections keep defaults.
        assert_eq!(loaded.logging.batch_size, 10);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn deep_merge_preserves_sibling_keys() {
        let base = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 3});
        let overlay = serde_json::json!({"a": {"y": 20}});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged["a"]["x"], 1);
        assert_eq!(merged["a"]["y"], 20);
        assert_eq!(merged["b"], 3);
    }

    #[test]
    fn init_and_get_round_trip() {
        let mut custom = CourierSettings::default();
        custom.server.port = 4242;
        init_settings(custom.clone());
        assert_eq!(get_settings().server.port, 4242);
        // Restore defaults for other tests in this process.
        init_settings(CourierSettings::default());
    }
}

use std::{collections::BTreeMap, path::PathBuf};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    error::{CustomCssError, ErrorAction, ErrorKind},
    utils::write_file::write_file,
    CustomCssResult,
};

/// Persistent key-value option store.
///
/// Options live in memory in a `DashMap` and every mutation rewrites the whole backing JSON
/// object file. Each individual write is atomic on disk, there is no multi-key transaction.
#[derive(Debug)]
pub struct Optionarium {
    options: DashMap<String, Value>,
    /// Backing file. `None` keeps the store purely in memory.
    options_path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl Optionarium {
    /// Creates a store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            options: DashMap::new(),
            options_path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Loads the store from a JSON object file. A missing file yields an empty store.
    pub async fn load(options_path: PathBuf) -> CustomCssResult<Self> {
        tracing::info!("Loading options from {:?}", options_path);

        let options = DashMap::new();

        match tokio::fs::read_to_string(&options_path).await {
            Ok(raw_options) if raw_options.trim().is_empty() => {}
            Ok(raw_options) => {
                let parsed: serde_json::Map<String, Value> = serde_json::from_str(&raw_options)
                    .map_err(|err| {
                        CustomCssError::raise_critical_store_error(
                            ErrorKind::OptionsFileParsingError,
                            &err.to_string(),
                            ErrorAction::Fix,
                        )
                    })?;

                for (key, value) in parsed {
                    options.insert(key, value);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Options file not found, starting with an empty store");
            }
            Err(err) => {
                return Err(CustomCssError::raise_critical_store_error(
                    ErrorKind::OptionsFileReadError,
                    &err.to_string(),
                    ErrorAction::Exit,
                ));
            }
        }

        tracing::debug!("Loaded {} options", options.len());

        Ok(Self {
            options,
            options_path: Some(options_path),
            persist_lock: Mutex::new(()),
        })
    }

    /// Returns the stored value for `key`, or `default` when the option does not exist.
    pub fn get_option(&self, key: &str, default: Value) -> Value {
        self.options
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or(default)
    }

    /// Reads an option as a string. Numbers and booleans are rendered, anything else yields `default`.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.get_option(key, Value::Null) {
            Value::String(value) => value,
            Value::Number(value) => value.to_string(),
            Value::Bool(value) => (if value { "1" } else { "" }).to_string(),
            _ => default.to_string(),
        }
    }

    /// Reads an option as an integer, accepting numeric strings.
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.get_option(key, Value::Null) {
            Value::Number(value) => value.as_i64().unwrap_or(default),
            Value::String(value) => value.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn has_option(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// Inserts `value` only when `key` is absent. Returns whether the option was created.
    pub async fn add_option(&self, key: &str, value: Value) -> CustomCssResult<bool> {
        let inserted = match self.options.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        };

        if inserted {
            tracing::debug!("Option `{}` created", key);

            if let Err(err) = self.persist().await {
                self.options.remove(key);
                return Err(err);
            }
        }

        Ok(inserted)
    }

    /// Sets `key` to `value`. Returns whether the stored value changed.
    ///
    /// # Errors
    ///
    /// Returns the write error when the backing file cannot be rewritten. The previous value is
    /// restored in memory before returning, so memory never runs ahead of the file.
    pub async fn update_option(&self, key: &str, value: Value) -> CustomCssResult<bool> {
        let previous = self.options.insert(key.to_string(), value.clone());

        if previous.as_ref() == Some(&value) {
            return Ok(false);
        }

        tracing::debug!("Option `{}` updated", key);

        if let Err(err) = self.persist().await {
            self.restore(key, previous);
            return Err(err);
        }

        Ok(true)
    }

    fn restore(&self, key: &str, previous: Option<Value>) {
        tracing::warn!("Option `{}` could not be persisted, restoring its previous value", key);

        match previous {
            Some(value) => {
                self.options.insert(key.to_string(), value);
            }
            None => {
                self.options.remove(key);
            }
        }
    }

    async fn persist(&self) -> CustomCssResult<()> {
        let Some(options_path) = &self.options_path else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;

        // Snapshot under the lock so an older snapshot never lands after a newer one.
        let snapshot: BTreeMap<String, Value> = self
            .options
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let serialized = serde_json::to_vec_pretty(&snapshot).map_err(|err| {
            CustomCssError::raise_general_store_error(
                ErrorKind::OptionsSerializationError,
                &err.to_string(),
                ErrorAction::Notify,
            )
        })?;

        let folder_path = options_path
            .parent()
            .map(|parent| parent.to_path_buf())
            .unwrap_or_default();

        write_file(
            folder_path,
            options_path.clone(),
            &serialized,
            ErrorAction::Notify,
            ErrorKind::OptionsFileWriteError,
            ErrorKind::OptionsFileWriteError,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use dashmap::DashMap;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use crate::{error::ErrorKind, optionarium::Optionarium};

    #[tokio::test]
    async fn missing_options_read_as_default() {
        let store = Optionarium::in_memory();

        assert_eq!(store.get_option("om4_freeform_css", json!("")), json!(""));
        assert_eq!(store.get_i64("om4_freeform_css_last_saved_timestamp", 1), 1);
        assert!(!store.has_option("om4_freeform_css"));
    }

    #[tokio::test]
    async fn add_option_only_inserts_when_absent() {
        let store = Optionarium::in_memory();

        assert!(store.add_option("key", json!("first")).await.unwrap());
        assert!(!store.add_option("key", json!("second")).await.unwrap());
        assert_eq!(store.get_string("key", ""), "first");
    }

    #[tokio::test]
    async fn update_option_reports_changes() {
        let store = Optionarium::in_memory();

        assert!(store.update_option("key", json!(10)).await.unwrap());
        assert!(!store.update_option("key", json!(10)).await.unwrap());
        assert_eq!(store.get_i64("key", 0), 10);
        assert_eq!(store.get_string("key", ""), "10");

        assert!(store.update_option("key", json!("eleven")).await.unwrap());
        assert_eq!(store.get_i64("key", 0), 0);
        assert_eq!(store.get_option("other", Value::Null), Value::Null);
    }

    #[tokio::test]
    async fn numeric_strings_read_as_integers() {
        let store = Optionarium::in_memory();
        store.update_option("stamp", json!("1329690974")).await.unwrap();

        assert_eq!(store.get_i64("stamp", 1), 1_329_690_974);
    }

    #[tokio::test]
    async fn options_survive_a_reload() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("options.json");

        let store = Optionarium::load(path.clone()).await.unwrap();
        store
            .update_option("om4_freeform_css", json!(".a{color:red}"))
            .await
            .unwrap();
        store
            .update_option("om4_freeform_css_last_saved_timestamp", json!(42))
            .await
            .unwrap();

        let reloaded = Optionarium::load(path).await.unwrap();

        assert_eq!(reloaded.get_string("om4_freeform_css", ""), ".a{color:red}");
        assert_eq!(
            reloaded.get_i64("om4_freeform_css_last_saved_timestamp", 1),
            42
        );
    }

    #[tokio::test]
    async fn malformed_options_file_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("options.json");
        std::fs::write(&path, "[not an object").unwrap();

        let error = Optionarium::load(path).await.unwrap_err();

        assert_eq!(error.get_kind(), ErrorKind::OptionsFileParsingError);
        assert!(error.is_critical());
    }

    #[tokio::test]
    async fn persist_failure_restores_the_previous_value() {
        let temp_dir = tempfile::tempdir().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let options = DashMap::new();
        options.insert("key".to_string(), json!("before"));

        let store = Optionarium {
            options,
            options_path: Some(blocker.join("options.json")),
            persist_lock: Mutex::new(()),
        };

        let error = store.update_option("key", json!("after")).await.unwrap_err();
        assert_eq!(error.get_kind(), ErrorKind::FileDirCreationError);
        assert_eq!(store.get_string("key", ""), "before");

        assert!(store.update_option("fresh", json!(1)).await.is_err());
        assert!(!store.has_option("fresh"));

        assert!(store.add_option("added", json!(1)).await.is_err());
        assert!(!store.has_option("added"));
    }
}

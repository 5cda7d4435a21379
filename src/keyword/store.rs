//! Per-group trigger store persisted as one YAML file per group.
//!
//! Every operation re-reads the group's file, so edits made outside the bot
//! show up on the next message. Writes for one group are serialized by a
//! per-group lock held across load, mutate and save.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Errors from reading or writing persisted YAML files.
#[derive(Debug)]
pub enum StoreError {
    /// Filesystem operation failed.
    Io { path: PathBuf, source: std::io::Error },
    /// File exists but is not valid YAML for its schema.
    ParseYaml { path: PathBuf, source: serde_yaml::Error },
    /// In-memory state could not be serialized.
    SerializeYaml { path: PathBuf, source: serde_yaml::Error },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "I/O error on '{}': {}", path.display(), source)
            }
            Self::ParseYaml { path, source } => {
                write!(f, "failed to parse '{}': {}", path.display(), source)
            }
            Self::SerializeYaml { path, source } => {
                write!(f, "failed to serialize '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::ParseYaml { source, .. } => Some(source),
            Self::SerializeYaml { source, .. } => Some(source),
        }
    }
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

/// Write `contents` next to `path` and rename it into place.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}

/// Text plus ordered image references: one side of a trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerContent {
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl TriggerContent {
    pub fn new(text: impl Into<String>, images: Vec<String>) -> Self {
        Self { text: text.into(), images }
    }
}

/// A stored question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub id: String,
    pub question: TriggerContent,
    pub answer: TriggerContent,
}

#[derive(Deserialize)]
struct TriggerBody {
    question: TriggerContent,
    answer: TriggerContent,
}

#[derive(Serialize)]
struct TriggerBodyRef<'a> {
    question: &'a TriggerContent,
    answer: &'a TriggerContent,
}

/// Ordered id → trigger mapping for one group.
///
/// Serializes as a YAML mapping keyed by id. Entry order is kept on both
/// save and load, since the responder picks the first matching trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerStore {
    triggers: Vec<Trigger>,
}

impl TriggerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new trigger under a fresh id and return that id.
    pub fn insert(&mut self, question: TriggerContent, answer: TriggerContent) -> String {
        let id = Uuid::new_v4().to_string();
        self.triggers.push(Trigger {
            id: id.clone(),
            question,
            answer,
        });
        id
    }

    /// Remove the first trigger whose question text is exactly `text`.
    pub fn remove_by_question_text(&mut self, text: &str) -> bool {
        match self.triggers.iter().position(|t| t.question.text == text) {
            Some(idx) => {
                self.triggers.remove(idx);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter()
    }

    /// Question texts in store order.
    pub fn questions(&self) -> Vec<&str> {
        self.triggers.iter().map(|t| t.question.text.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

impl Serialize for TriggerStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.triggers.len()))?;
        for trigger in &self.triggers {
            let body = TriggerBodyRef {
                question: &trigger.question,
                answer: &trigger.answer,
            };
            map.serialize_entry(&trigger.id, &body)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TriggerStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StoreVisitor;

        impl<'de> Visitor<'de> for StoreVisitor {
            type Value = TriggerStore;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of trigger ids to question/answer pairs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TriggerStore, A::Error> {
                let mut triggers: Vec<Trigger> = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((id, body)) = access.next_entry::<String, TriggerBody>()? {
                    if triggers.iter().any(|t| t.id == id) {
                        return Err(de::Error::custom(format!("duplicate trigger id '{id}'")));
                    }
                    triggers.push(Trigger {
                        id,
                        question: body.question,
                        answer: body.answer,
                    });
                }
                Ok(TriggerStore { triggers })
            }
        }

        deserializer.deserialize_map(StoreVisitor)
    }
}

/// On-disk layout: a top-level `triggers` mapping.
#[derive(Deserialize)]
struct TriggerFile {
    #[serde(default)]
    triggers: Option<TriggerStore>,
}

#[derive(Serialize)]
struct TriggerFileRef<'a> {
    triggers: &'a TriggerStore,
}

/// Directory of per-group trigger files.
pub struct TriggerRepository {
    dir: PathBuf,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TriggerRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// File backing `group`'s store.
    pub fn path_for(&self, group: &str) -> PathBuf {
        self.dir.join(format!("{group}.yml"))
    }

    fn group_lock(&self, group: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(group.to_string()).or_default().clone()
    }

    /// Load the group's store, creating an empty file when none exists.
    pub async fn load(&self, group: &str) -> Result<TriggerStore, StoreError> {
        let lock = self.group_lock(group);
        let _guard = lock.lock().await;
        self.load_unlocked(group).await
    }

    /// Overwrite the group's file with `store`.
    #[cfg(test)]
    pub async fn save(&self, group: &str, store: &TriggerStore) -> Result<(), StoreError> {
        let lock = self.group_lock(group);
        let _guard = lock.lock().await;
        self.save_unlocked(group, store).await
    }

    /// Append a trigger to the group's store and persist it. Returns the new id.
    pub async fn add_trigger(
        &self,
        group: &str,
        question: TriggerContent,
        answer: TriggerContent,
    ) -> Result<String, StoreError> {
        let lock = self.group_lock(group);
        let _guard = lock.lock().await;

        let mut store = self.load_unlocked(group).await?;
        let id = store.insert(question, answer);
        self.save_unlocked(group, &store).await?;
        info!("💾 Saved trigger {} for group {} ({} total)", id, group, store.len());
        Ok(id)
    }

    /// Delete the first trigger whose question text equals `text`.
    pub async fn remove_by_question_text(&self, group: &str, text: &str) -> Result<bool, StoreError> {
        let lock = self.group_lock(group);
        let _guard = lock.lock().await;

        let mut store = self.load_unlocked(group).await?;
        if !store.remove_by_question_text(text) {
            return Ok(false);
        }
        self.save_unlocked(group, &store).await?;
        info!("🗑️ Removed trigger '{}' from group {}", text, group);
        Ok(true)
    }

    /// Remove the group's file. Returns whether a file was deleted.
    pub async fn delete_store_file(&self, group: &str) -> Result<bool, StoreError> {
        let lock = self.group_lock(group);
        let _guard = lock.lock().await;

        let path = self.path_for(group);
        let deleted = match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("🗑️ Deleted trigger file {:?}", path);
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        // Drop the group's lock entry unless another caller is waiting on it.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 && locks.get(group).is_some_and(|l| Arc::ptr_eq(l, &lock)) {
            locks.remove(group);
        }
        Ok(deleted)
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn load_unlocked(&self, group: &str) -> Result<TriggerStore, StoreError> {
        let path = self.path_for(group);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No trigger file for group {}, creating {:?}", group, path);
                let store = TriggerStore::new();
                self.save_unlocked(group, &store).await?;
                return Ok(store);
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        if content.trim().is_empty() {
            return Ok(TriggerStore::new());
        }

        let file: TriggerFile = serde_yaml::from_str(&content)
            .map_err(|e| StoreError::ParseYaml { path: path.clone(), source: e })?;
        let store = file.triggers.unwrap_or_default();
        debug!("Loaded {} trigger(s) for group {}", store.len(), group);
        Ok(store)
    }

    async fn save_unlocked(&self, group: &str, store: &TriggerStore) -> Result<(), StoreError> {
        let path = self.path_for(group);
        let yaml = serde_yaml::to_string(&TriggerFileRef { triggers: store })
            .map_err(|e| StoreError::SerializeYaml { path: path.clone(), source: e })?;
        write_atomic(&path, &yaml).await
    }
}

//! Group allow-list with mtime-based hot reload.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

use crate::keyword::store::{write_atomic, StoreError};

/// Group ids may be written by hand as bare numbers or as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawGroupId {
    Number(i64),
    Text(String),
}

impl RawGroupId {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Deserialize)]
struct AllowListFile {
    #[serde(default)]
    allowed_groups: Option<Vec<RawGroupId>>,
}

#[derive(Serialize)]
struct AllowListFileRef<'a> {
    allowed_groups: &'a [String],
}

struct AllowListState {
    groups: Vec<String>,
    /// Modification time of the file as of the last read or write.
    last_modified: Option<SystemTime>,
}

/// Normalize a group id to the form used for lookups and file names.
///
/// Returns `None` unless the trimmed id is non-empty ASCII alphanumerics,
/// `-` or `_`.
pub fn normalize_group_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| id.to_string())
}

/// Process-wide set of groups the bot may operate in.
pub struct AllowList {
    path: PathBuf,
    state: RwLock<AllowListState>,
}

impl AllowList {
    /// Open the allow-list file, creating an empty one if it does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?
        {
            info!("No allow-list file, creating {:?}", path);
            write_groups(&path, &[]).await?;
        }

        let groups = read_groups(&path).await?;
        let last_modified = modified_time(&path).await?;
        info!("Loaded allow-list from {:?} ({} groups)", path, groups.len());

        Ok(Self {
            path,
            state: RwLock::new(AllowListState { groups, last_modified }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_allowed(&self, group: &str) -> bool {
        let Some(group) = normalize_group_id(group) else {
            return false;
        };
        self.state.read().await.groups.contains(&group)
    }

    /// Add a group. Returns `false` if it was already present.
    pub async fn add(&self, group: &str) -> Result<bool, StoreError> {
        let Some(group) = normalize_group_id(group) else {
            return Ok(false);
        };

        let mut state = self.state.write().await;
        if state.groups.contains(&group) {
            return Ok(false);
        }

        let mut groups = state.groups.clone();
        groups.push(group.clone());
        write_groups(&self.path, &groups).await?;
        state.groups = groups;
        state.last_modified = modified_time(&self.path).await?;
        info!("✅ Allowed group {}", group);
        Ok(true)
    }

    /// Remove a group. Returns `false` if it was not present.
    pub async fn remove(&self, group: &str) -> Result<bool, StoreError> {
        let Some(group) = normalize_group_id(group) else {
            return Ok(false);
        };

        let mut state = self.state.write().await;
        if !state.groups.contains(&group) {
            return Ok(false);
        }

        let groups: Vec<String> = state.groups.iter().filter(|g| **g != group).cloned().collect();
        write_groups(&self.path, &groups).await?;
        state.groups = groups;
        state.last_modified = modified_time(&self.path).await?;
        info!("🚫 Disallowed group {}", group);
        Ok(true)
    }

    /// Allowed groups in file order.
    pub async fn list(&self) -> Vec<String> {
        self.state.read().await.groups.clone()
    }

    /// Re-read the file if its mtime is newer than the last one seen.
    ///
    /// Returns whether the in-memory list was replaced.
    pub async fn reload(&self) -> Result<bool, StoreError> {
        let Some(modified) = modified_time(&self.path).await? else {
            debug!("Allow-list file {:?} is missing, keeping current list", self.path);
            return Ok(false);
        };

        let mut state = self.state.write().await;
        if state.last_modified.is_some_and(|seen| modified <= seen) {
            return Ok(false);
        }

        let groups = read_groups(&self.path).await?;
        info!("🔄 Reloaded allow-list ({} groups)", groups.len());
        state.groups = groups;
        state.last_modified = Some(modified);
        Ok(true)
    }

    /// Spawn a task that calls [`reload`](Self::reload) every `interval`.
    ///
    /// The task stops when the returned handle is dropped.
    pub fn watch(self: Arc<Self>, interval: Duration) -> AllowListWatcher {
        let cancel = Arc::new(Notify::new());
        let cancel_clone = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately; the list was just loaded.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = cancel_clone.notified() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.reload().await {
                            warn!("Allow-list reload failed: {e}");
                        }
                    }
                }
            }
            debug!("Allow-list watcher stopped");
        });

        AllowListWatcher { cancel }
    }
}

/// Handle for the background reload task.
pub struct AllowListWatcher {
    cancel: Arc<Notify>,
}

impl Drop for AllowListWatcher {
    fn drop(&mut self) {
        self.cancel.notify_one();
    }
}

async fn read_groups(path: &Path) -> Result<Vec<String>, StoreError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let file: AllowListFile = serde_yaml::from_str(&content)
        .map_err(|e| StoreError::ParseYaml { path: path.to_path_buf(), source: e })?;

    let mut groups: Vec<String> = Vec::new();
    for raw in file.allowed_groups.unwrap_or_default() {
        let raw = raw.into_string();
        match normalize_group_id(&raw) {
            Some(group) if !groups.contains(&group) => groups.push(group),
            Some(_) => {}
            None => warn!("Ignoring invalid group id {:?} in {:?}", raw, path),
        }
    }
    Ok(groups)
}

async fn write_groups(path: &Path, groups: &[String]) -> Result<(), StoreError> {
    let yaml = serde_yaml::to_string(&AllowListFileRef { allowed_groups: groups })
        .map_err(|e| StoreError::SerializeYaml { path: path.to_path_buf(), source: e })?;
    write_atomic(path, &yaml).await
}

async fn modified_time(path: &Path) -> Result<Option<SystemTime>, StoreError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.modified().map(Some).map_err(|e| StoreError::io(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

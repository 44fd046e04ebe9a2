//! Shared, versioned context store.
//!
//! One store is created per session and handed to every agent as an
//! `Arc<ContextStore>`. Values live in a JSON tree addressed by
//! dot-delimited paths (`analysis_results.complexity`). Each write records
//! a full snapshot of the tree, and a bounded history of snapshots makes
//! rollback possible.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ContextSettings;
use crate::error::ContextError;
use crate::protocol::envelope::current_timestamp;

pub type Result<T> = std::result::Result<T, ContextError>;

/// Context tree: string keys to JSON values.
pub type Tree = Map<String, Value>;

/// Default number of retained versions.
pub const DEFAULT_MAX_VERSIONS: usize = 10;

/// Store construction parameters.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub max_versions: usize,
    /// Initial tree, restored by [`ContextStore::clear`].
    pub seed: Tree,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_versions: DEFAULT_MAX_VERSIONS,
            seed: Tree::new(),
        }
    }
}

impl From<&ContextSettings> for ContextConfig {
    fn from(settings: &ContextSettings) -> Self {
        Self {
            max_versions: settings.max_versions,
            seed: settings.seed.clone(),
        }
    }
}

/// Immutable snapshot of the whole tree.
#[derive(Debug, Clone)]
struct ContextVersion {
    version_id: u64,
    timestamp: String,
    data: Tree,
}

/// Version metadata as exposed by [`ContextStore::get_version_history`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version_id: u64,
    pub timestamp: String,
}

#[derive(Debug)]
struct StoreState {
    tree: Tree,
    versions: VecDeque<ContextVersion>,
    next_version: u64,
}

/// Thread-safe shared context with versioning and rollback.
#[derive(Debug)]
pub struct ContextStore {
    max_versions: usize,
    seed: Tree,
    state: Mutex<StoreState>,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    /// Create a store and record its baseline version.
    pub fn with_config(config: ContextConfig) -> Self {
        let store = Self {
            max_versions: config.max_versions.max(1),
            state: Mutex::new(StoreState {
                tree: config.seed.clone(),
                versions: VecDeque::new(),
                next_version: 0,
            }),
            seed: config.seed,
        };
        store.save_version(&mut store.lock());
        store
    }

    pub fn max_versions(&self) -> usize {
        self.max_versions
    }

    /// Set a value, creating missing intermediate mappings, and record a version.
    pub fn set(&self, path: &str, value: Value) -> Result<()> {
        self.write_one(path, value, true)
    }

    /// Same as [`set`](Self::set) without recording a version.
    pub fn set_unversioned(&self, path: &str, value: Value) -> Result<()> {
        self.write_one(path, value, false)
    }

    /// Deep copy of the value at `path`, or `None` if any segment is missing.
    pub fn get(&self, path: &str) -> Option<Value> {
        let state = self.lock();
        lookup(&state.tree, path).cloned()
    }

    /// Deep copy of the value at `path`, or `default`.
    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).unwrap_or(default)
    }

    /// Apply several writes and record one version for the batch.
    ///
    /// All-or-nothing: if any path cannot be written the tree is untouched.
    pub fn update<I, K>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        self.write_many(entries, true)
    }

    pub fn update_unversioned<I, K>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        self.write_many(entries, false)
    }

    /// Append to the list at `path`, starting a new list if nothing is there.
    pub fn append(&self, path: &str, value: Value) -> Result<()> {
        self.push_one(path, value, true)
    }

    pub fn append_unversioned(&self, path: &str, value: Value) -> Result<()> {
        self.push_one(path, value, false)
    }

    /// Deep copy of the entire tree.
    pub fn snapshot(&self) -> Tree {
        self.lock().tree.clone()
    }

    /// Restore an older snapshot.
    ///
    /// `None` means the version right before the current one. The restored
    /// tree is recorded as a new version; history is never truncated.
    pub fn rollback(&self, version_id: Option<u64>) -> Result<()> {
        let mut state = self.lock();

        let target = match version_id {
            None => {
                if state.versions.len() < 2 {
                    return Err(ContextError::NoPreviousVersion);
                }
                state.versions[state.versions.len() - 2].clone()
            }
            Some(id) => state
                .versions
                .iter()
                .find(|v| v.version_id == id)
                .cloned()
                .ok_or(ContextError::VersionNotFound(id))?,
        };

        state.tree = target.data;
        self.save_version(&mut state);
        tracing::info!("Context rolled back to version {}", target.version_id);
        Ok(())
    }

    /// Retained versions, oldest first.
    pub fn get_version_history(&self) -> Vec<VersionInfo> {
        self.lock()
            .versions
            .iter()
            .map(|v| VersionInfo {
                version_id: v.version_id,
                timestamp: v.timestamp.clone(),
            })
            .collect()
    }

    /// Id of the most recently recorded version.
    pub fn current_version(&self) -> Option<u64> {
        self.lock().versions.back().map(|v| v.version_id)
    }

    /// Reset to the seed tree, drop history and record a fresh baseline.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.tree = self.seed.clone();
        state.versions.clear();
        state.next_version = 0;
        self.save_version(&mut state);
        tracing::debug!("Context cleared");
    }

    /// Export the whole tree as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.lock().tree)
    }

    fn write_one(&self, path: &str, value: Value, save_version: bool) -> Result<()> {
        let mut state = self.lock();
        set_in(&mut state.tree, path, value)?;
        if save_version {
            self.save_version(&mut state);
        }
        tracing::trace!(path, "Context set");
        Ok(())
    }

    fn write_many<I, K>(&self, entries: I, save_version: bool) -> Result<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut state = self.lock();
        let mut staged = state.tree.clone();
        for (path, value) in entries {
            set_in(&mut staged, path.as_ref(), value)?;
        }
        state.tree = staged;
        if save_version {
            self.save_version(&mut state);
        }
        Ok(())
    }

    fn push_one(&self, path: &str, value: Value, save_version: bool) -> Result<()> {
        let mut state = self.lock();
        let mut list = match lookup(&state.tree, path) {
            None => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err(ContextError::NotASequence {
                    path: path.to_string(),
                })
            }
        };
        list.push(value);
        set_in(&mut state.tree, path, Value::Array(list))?;
        if save_version {
            self.save_version(&mut state);
        }
        Ok(())
    }

    fn save_version(&self, state: &mut StoreState) {
        let version = ContextVersion {
            version_id: state.next_version,
            timestamp: current_timestamp(),
            data: state.tree.clone(),
        };
        state.versions.push_back(version);

        while state.versions.len() > self.max_versions {
            state.versions.pop_front();
        }

        state.next_version += 1;
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // Writes either complete or return before touching the tree.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Display for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_json() {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("{}"),
        }
    }
}

/// Resolve a dot path; `None` if a segment is missing or a non-mapping is hit.
fn lookup<'a>(tree: &'a Tree, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = tree.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write `value` at a dot path, creating missing intermediate mappings.
fn set_in(tree: &mut Tree, path: &str, value: Value) -> Result<()> {
    if path.is_empty() {
        return Err(ContextError::EmptyPath);
    }

    let segments: Vec<&str> = path.split('.').collect();
    let (leaf, parents) = segments
        .split_last()
        .ok_or(ContextError::EmptyPath)?;

    let mut current = tree;
    for (depth, segment) in parents.iter().enumerate() {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(ContextError::NotAMapping {
                    path: segments[..=depth].join("."),
                })
            }
        };
    }

    current.insert(leaf.to_string(), value);
    Ok(())
}

//! Shared state registry.
//!
//! Incremental checkpoints reference fragments written by earlier
//! checkpoints. The registry keeps one canonical handle per fragment key
//! together with the set of checkpoints that depend on it, and hands the
//! fragment to a [`StateDisposer`] once that set becomes empty.
//!
//! ```text
//! chk-1 registers A, B        A{1}    B{1}
//! chk-2 registers A, C        A{1,2}  B{1}   C{2}
//! chk-1 subsumed              A{2}    C{2}          -> dispose B
//! chk-2 subsumed                                    -> dispose A, C
//! ```

use super::{
    BackgroundDisposer, CompositeStateHandle, InlineDisposer, StateDisposer, StreamStateHandle,
};
use crate::error::StateError;
use crate::types::CheckpointId;
use ahash::AHashMap;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Key under which a fragment is deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SharedStateRegistryKey(String);

impl SharedStateRegistryKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key derived from the physical identity of `handle`.
    pub fn for_handle(handle: &StreamStateHandle) -> Self {
        Self(handle.physical_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SharedStateRegistryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How released fragments are physically discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisposalMode {
    /// On the thread that released the last reference.
    #[default]
    Inline,
    /// On a dedicated disposer thread.
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedStateRegistryConfig {
    pub disposal: DisposalMode,
    /// Pending discards the background disposer buffers before callers block.
    pub disposal_queue_capacity: usize,
}

impl Default for SharedStateRegistryConfig {
    fn default() -> Self {
        Self {
            disposal: DisposalMode::Inline,
            disposal_queue_capacity: 1024,
        }
    }
}

impl SharedStateRegistryConfig {
    pub fn with_disposal(mut self, disposal: DisposalMode) -> Self {
        self.disposal = disposal;
        self
    }

    pub fn with_disposal_queue_capacity(mut self, capacity: usize) -> Self {
        self.disposal_queue_capacity = capacity.max(1);
        self
    }
}

#[derive(Debug)]
struct SharedStateEntry {
    handle: StreamStateHandle,
    /// Checkpoints that depend on this fragment. Its size is the reference count.
    checkpoints: BTreeSet<CheckpointId>,
}

#[derive(Debug)]
struct RegistryInner {
    entries: AHashMap<SharedStateRegistryKey, SharedStateEntry>,
    open: bool,
}

/// Process-wide, reference-counted registry of shared state fragments.
///
/// Safe to use from concurrently completing and subsumed checkpoints.
/// Disposal runs after the internal lock has been released.
pub struct SharedStateRegistry {
    inner: Mutex<RegistryInner>,
    disposer: Arc<dyn StateDisposer>,
}

impl SharedStateRegistry {
    /// Registry that discards released fragments inline.
    pub fn new() -> Self {
        Self::with_disposer(Arc::new(InlineDisposer))
    }

    pub fn with_disposer(disposer: Arc<dyn StateDisposer>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                entries: AHashMap::new(),
                open: true,
            }),
            disposer,
        }
    }

    pub fn from_config(config: &SharedStateRegistryConfig) -> Result<Self> {
        let disposer: Arc<dyn StateDisposer> = match config.disposal {
            DisposalMode::Inline => Arc::new(InlineDisposer),
            DisposalMode::Background => {
                Arc::new(BackgroundDisposer::new(config.disposal_queue_capacity)?)
            }
        };
        Ok(Self::with_disposer(disposer))
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryInner>, StateError> {
        self.inner
            .lock()
            .map_err(|_| StateError::LockPoisoned("shared state registry"))
    }

    /// Record that `checkpoint_id` depends on the fragment under `key` and
    /// return the canonical handle the caller must use from now on.
    ///
    /// An unseen key adopts `handle`. A known key keeps its canonical handle;
    /// if the caller uploaded a second physical copy of the same content,
    /// that copy is unreferenced and gets disposed.
    pub fn register_reference(
        &self,
        key: SharedStateRegistryKey,
        handle: StreamStateHandle,
        checkpoint_id: CheckpointId,
    ) -> Result<StreamStateHandle> {
        let (canonical, redundant) = {
            let mut inner = self.lock()?;
            if !inner.open {
                return Err(StateError::RegistryClosed.into());
            }

            match inner.entries.get_mut(&key) {
                Some(entry) => {
                    entry.checkpoints.insert(checkpoint_id);
                    let redundant = (!handle.is_placeholder()
                        && handle.physical_id() != entry.handle.physical_id())
                    .then_some(handle);
                    tracing::debug!(
                        "shared state {} referenced by checkpoint {}, refcount={}",
                        key,
                        checkpoint_id,
                        entry.checkpoints.len()
                    );
                    (entry.handle.clone(), redundant)
                }
                None => {
                    if handle.is_placeholder() {
                        return Err(StateError::UnknownSharedState(key).into());
                    }
                    tracing::debug!(
                        "shared state {} registered by checkpoint {}",
                        key,
                        checkpoint_id
                    );
                    inner.entries.insert(
                        key,
                        SharedStateEntry {
                            handle: handle.clone(),
                            checkpoints: BTreeSet::from([checkpoint_id]),
                        },
                    );
                    (handle, None)
                }
            }
        };

        if let Some(redundant) = redundant {
            tracing::debug!(
                "discarding duplicate upload {} in favour of {}",
                redundant.physical_id(),
                canonical.physical_id()
            );
            self.disposer.dispose(redundant);
        }
        Ok(canonical)
    }

    /// Register every shared fragment of `states` on behalf of `checkpoint_id`.
    pub fn register_all<'a, I>(&self, states: I, checkpoint_id: CheckpointId) -> Result<()>
    where
        I: IntoIterator<Item = &'a dyn CompositeStateHandle>,
    {
        for state in states {
            state.register_shared_states(self, checkpoint_id)?;
        }
        Ok(())
    }

    /// Drop the references held by a subsumed or aborted checkpoint.
    ///
    /// Returns the number of fragments handed to the disposer.
    pub fn unregister_checkpoint(&self, checkpoint_id: CheckpointId) -> Result<usize> {
        self.release_where(|id| id == checkpoint_id)
    }

    /// Drop the references held by every checkpoint older than `lowest_retained`.
    pub fn unregister_unused_state(&self, lowest_retained: CheckpointId) -> Result<usize> {
        self.release_where(|id| id < lowest_retained)
    }

    fn release_where(&self, released: impl Fn(CheckpointId) -> bool) -> Result<usize> {
        let unreferenced: Vec<StreamStateHandle> = {
            let mut inner = self.lock()?;
            let mut unreferenced = Vec::new();
            inner.entries.retain(|key, entry| {
                entry.checkpoints.retain(|id| !released(*id));
                if entry.checkpoints.is_empty() {
                    tracing::debug!("shared state {} is no longer referenced", key);
                    unreferenced.push(entry.handle.clone());
                    false
                } else {
                    true
                }
            });
            unreferenced
        };

        let disposed = unreferenced.len();
        for handle in unreferenced {
            self.disposer.dispose(handle);
        }
        Ok(disposed)
    }

    /// Number of checkpoints depending on the fragment; 0 when unknown.
    pub fn reference_count(&self, key: &SharedStateRegistryKey) -> Result<usize> {
        Ok(self
            .lock()?
            .entries
            .get(key)
            .map_or(0, |entry| entry.checkpoints.len()))
    }

    /// Checkpoints depending on the fragment, in ascending order.
    pub fn checkpoints_of(&self, key: &SharedStateRegistryKey) -> Result<Vec<CheckpointId>> {
        Ok(self
            .lock()?
            .entries
            .get(key)
            .map(|entry| entry.checkpoints.iter().copied().collect())
            .unwrap_or_default())
    }

    pub fn canonical_handle(
        &self,
        key: &SharedStateRegistryKey,
    ) -> Result<Option<StreamStateHandle>> {
        Ok(self.lock()?.entries.get(key).map(|entry| entry.handle.clone()))
    }

    pub fn contains(&self, key: &SharedStateRegistryKey) -> Result<bool> {
        Ok(self.lock()?.entries.contains_key(key))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.entries.is_empty())
    }

    /// Reject further registrations. Releasing references keeps working.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.open {
            inner.open = false;
            tracing::info!(
                "shared state registry closed with {} live fragments",
                inner.entries.len()
            );
        }
        Ok(())
    }

    pub fn is_open(&self) -> Result<bool> {
        Ok(self.lock()?.open)
    }
}

impl Default for SharedStateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedStateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("SharedStateRegistry");
        match self.inner.lock() {
            Ok(inner) => debug
                .field("entries", &inner.entries.len())
                .field("open", &inner.open),
            Err(_) => debug.field("entries", &"<poisoned>"),
        };
        debug.finish()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;

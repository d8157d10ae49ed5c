//! Keyed state handles.
//!
//! Keyed state is partitioned into key groups; `max_parallelism` fixes how
//! many key groups exist, and each subtask owns a contiguous
//! [`KeyGroupRange`]. A handle is either a full snapshot of that range or an
//! incremental one whose bulk lives in fragments shared with earlier
//! checkpoints.

use super::{
    CompositeStateHandle, SharedStateRegistry, SharedStateRegistryKey, StateObject,
    StreamStateHandle,
};
use crate::types::CheckpointId;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// Inclusive range of key groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyGroupRange {
    pub start: u32,
    pub end: u32,
}

impl KeyGroupRange {
    pub const EMPTY: KeyGroupRange = KeyGroupRange { start: 1, end: 0 };

    pub fn of(start: u32, end: u32) -> Self {
        if start > end {
            return Self::EMPTY;
        }
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key_group: u32) -> bool {
        (self.start..=self.end).contains(&key_group)
    }
}

/// Full snapshot of the key groups in `key_group_range`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGroupsStateHandle {
    key_group_range: KeyGroupRange,
    /// Offset of each key group inside the delegate.
    offsets: Vec<u64>,
    delegate: StreamStateHandle,
}

impl KeyGroupsStateHandle {
    pub fn new(
        key_group_range: KeyGroupRange,
        offsets: Vec<u64>,
        delegate: StreamStateHandle,
    ) -> Self {
        Self {
            key_group_range,
            offsets,
            delegate,
        }
    }

    pub fn key_group_range(&self) -> KeyGroupRange {
        self.key_group_range
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn delegate(&self) -> &StreamStateHandle {
        &self.delegate
    }
}

/// One fragment of an incremental snapshot that may be shared across checkpoints.
///
/// Registration replaces the handle with the registry's canonical one, so it
/// sits behind a lock even though the surrounding snapshot is immutable.
#[derive(Debug, Serialize, Deserialize)]
pub struct SharedStateSlot {
    key: SharedStateRegistryKey,
    /// File name inside the backend's local working directory.
    local_path: String,
    handle: RwLock<StreamStateHandle>,
}

impl SharedStateSlot {
    pub fn new(local_path: impl Into<String>, handle: StreamStateHandle) -> Self {
        Self {
            key: SharedStateRegistryKey::for_handle(&handle),
            local_path: local_path.into(),
            handle: RwLock::new(handle),
        }
    }

    pub fn key(&self) -> &SharedStateRegistryKey {
        &self.key
    }

    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    /// Current handle; the canonical one once registered.
    pub fn handle(&self) -> StreamStateHandle {
        // A poisoned write still left a whole handle behind.
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, handle: StreamStateHandle) {
        *self.handle.write().unwrap_or_else(PoisonError::into_inner) = handle;
    }
}

impl Clone for SharedStateSlot {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            local_path: self.local_path.clone(),
            handle: RwLock::new(self.handle()),
        }
    }
}

impl PartialEq for SharedStateSlot {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.local_path == other.local_path
            && self.handle() == other.handle()
    }
}

/// Incremental snapshot of a keyed state backend.
///
/// Until [`register_shared_states`](CompositeStateHandle::register_shared_states)
/// succeeds the handle owns its shared fragments and discards them itself.
/// Afterwards they belong to the [`SharedStateRegistry`].
#[derive(Debug, Serialize, Deserialize)]
pub struct IncrementalKeyedStateHandle {
    checkpoint_id: CheckpointId,
    key_group_range: KeyGroupRange,
    shared_state: Vec<SharedStateSlot>,
    private_state: Vec<StreamStateHandle>,
    metadata: StreamStateHandle,
    /// Fixed at construction: registration may later swap placeholders for
    /// canonical handles, which must not count as bytes written here.
    checkpointed_size: u64,
    /// Not persisted: a decoded handle is registered again on recovery.
    #[serde(skip)]
    registered: AtomicBool,
}

impl IncrementalKeyedStateHandle {
    pub fn new(
        checkpoint_id: CheckpointId,
        key_group_range: KeyGroupRange,
        shared_state: Vec<SharedStateSlot>,
        private_state: Vec<StreamStateHandle>,
        metadata: StreamStateHandle,
    ) -> Self {
        let checkpointed_size = metadata.checkpointed_size()
            + private_state
                .iter()
                .map(StateObject::checkpointed_size)
                .sum::<u64>()
            + shared_state
                .iter()
                .map(|slot| slot.handle().checkpointed_size())
                .sum::<u64>();
        Self {
            checkpoint_id,
            key_group_range,
            shared_state,
            private_state,
            metadata,
            checkpointed_size,
            registered: AtomicBool::new(false),
        }
    }

    pub fn checkpoint_id(&self) -> CheckpointId {
        self.checkpoint_id
    }

    pub fn key_group_range(&self) -> KeyGroupRange {
        self.key_group_range
    }

    pub fn shared_state(&self) -> &[SharedStateSlot] {
        &self.shared_state
    }

    pub fn private_state(&self) -> &[StreamStateHandle] {
        &self.private_state
    }

    pub fn metadata(&self) -> &StreamStateHandle {
        &self.metadata
    }

    /// Whether the shared fragments have been handed to a registry.
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }
}

impl Clone for IncrementalKeyedStateHandle {
    fn clone(&self) -> Self {
        Self {
            checkpoint_id: self.checkpoint_id,
            key_group_range: self.key_group_range,
            shared_state: self.shared_state.clone(),
            private_state: self.private_state.clone(),
            metadata: self.metadata.clone(),
            checkpointed_size: self.checkpointed_size,
            registered: AtomicBool::new(self.is_registered()),
        }
    }
}

impl PartialEq for IncrementalKeyedStateHandle {
    fn eq(&self, other: &Self) -> bool {
        self.checkpoint_id == other.checkpoint_id
            && self.key_group_range == other.key_group_range
            && self.shared_state == other.shared_state
            && self.private_state == other.private_state
            && self.metadata == other.metadata
            && self.checkpointed_size == other.checkpointed_size
    }
}

impl StateObject for IncrementalKeyedStateHandle {
    /// Discards metadata and private fragments. Shared fragments are
    /// discarded too unless a registry has taken them over, which is the
    /// case for a checkpoint aborted before it completed.
    fn discard_state(&self) -> Result<()> {
        self.metadata.discard_state()?;
        for handle in &self.private_state {
            handle.discard_state()?;
        }
        if !self.is_registered() {
            for slot in &self.shared_state {
                let handle = slot.handle();
                if !handle.is_placeholder() {
                    handle.discard_state()?;
                }
            }
        }
        Ok(())
    }

    fn state_size(&self) -> u64 {
        self.metadata.state_size()
            + self
                .private_state
                .iter()
                .map(StateObject::state_size)
                .sum::<u64>()
            + self
                .shared_state
                .iter()
                .map(|slot| slot.handle().state_size())
                .sum::<u64>()
    }

    fn checkpointed_size(&self) -> u64 {
        // A decoded size is not trusted beyond what the handle holds.
        self.checkpointed_size.min(self.state_size())
    }
}

impl CompositeStateHandle for IncrementalKeyedStateHandle {
    fn register_shared_states(
        &self,
        registry: &SharedStateRegistry,
        checkpoint_id: CheckpointId,
    ) -> Result<()> {
        // Set before registering: after a partial failure the registry already
        // owns some of the fragments.
        self.registered.store(true, Ordering::Release);
        for slot in &self.shared_state {
            let canonical =
                registry.register_reference(slot.key().clone(), slot.handle(), checkpoint_id)?;
            slot.replace(canonical);
        }
        Ok(())
    }
}

/// State of a keyed state backend for one key-group range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyedStateHandle {
    KeyGroups(KeyGroupsStateHandle),
    Incremental(IncrementalKeyedStateHandle),
}

impl KeyedStateHandle {
    pub fn key_group_range(&self) -> KeyGroupRange {
        match self {
            Self::KeyGroups(handle) => handle.key_group_range(),
            Self::Incremental(handle) => handle.key_group_range(),
        }
    }
}

impl StateObject for KeyedStateHandle {
    fn discard_state(&self) -> Result<()> {
        match self {
            Self::KeyGroups(handle) => handle.delegate().discard_state(),
            Self::Incremental(handle) => handle.discard_state(),
        }
    }

    fn state_size(&self) -> u64 {
        match self {
            Self::KeyGroups(handle) => handle.delegate().state_size(),
            Self::Incremental(handle) => handle.state_size(),
        }
    }

    fn checkpointed_size(&self) -> u64 {
        match self {
            Self::KeyGroups(handle) => handle.delegate().checkpointed_size(),
            Self::Incremental(handle) => handle.checkpointed_size(),
        }
    }
}

impl CompositeStateHandle for KeyedStateHandle {
    fn register_shared_states(
        &self,
        registry: &SharedStateRegistry,
        checkpoint_id: CheckpointId,
    ) -> Result<()> {
        match self {
            // Full snapshots share nothing.
            Self::KeyGroups(_) => Ok(()),
            Self::Incremental(handle) => handle.register_shared_states(registry, checkpoint_id),
        }
    }
}

impl From<KeyGroupsStateHandle> for KeyedStateHandle {
    fn from(handle: KeyGroupsStateHandle) -> Self {
        Self::KeyGroups(handle)
    }
}

impl From<IncrementalKeyedStateHandle> for KeyedStateHandle {
    fn from(handle: IncrementalKeyedStateHandle) -> Self {
        Self::Incremental(handle)
    }
}

#[cfg(test)]
#[path = "tests/handle_tests.rs"]
mod tests;

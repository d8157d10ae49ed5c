use super::{CompositeStateHandle, SharedStateRegistry, StateObject};
use crate::types::CheckpointId;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Immutable collection of state handles of one category.
///
/// Cloning shares the underlying handles; two subtask states built from the
/// same collection refer to the same objects.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateObjectCollection<T>(Arc<Vec<T>>);

impl<T> StateObjectCollection<T> {
    pub fn new(handles: Vec<T>) -> Self {
        Self(Arc::new(handles))
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn singleton(handle: T) -> Self {
        Self::new(vec![handle])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_state(&self) -> bool {
        !self.0.is_empty()
    }

    /// True if both collections share the same handles.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for StateObjectCollection<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Default for StateObjectCollection<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Vec<T>> for StateObjectCollection<T> {
    fn from(handles: Vec<T>) -> Self {
        Self::new(handles)
    }
}

impl<'a, T> IntoIterator for &'a StateObjectCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: StateObject> StateObject for StateObjectCollection<T> {
    fn discard_state(&self) -> Result<()> {
        for handle in self.iter() {
            handle.discard_state()?;
        }
        Ok(())
    }

    fn state_size(&self) -> u64 {
        self.iter().map(StateObject::state_size).sum()
    }

    fn checkpointed_size(&self) -> u64 {
        self.iter().map(StateObject::checkpointed_size).sum()
    }
}

impl<T: CompositeStateHandle> CompositeStateHandle for StateObjectCollection<T> {
    fn register_shared_states(
        &self,
        registry: &SharedStateRegistry,
        checkpoint_id: CheckpointId,
    ) -> Result<()> {
        for handle in self.iter() {
            handle.register_shared_states(registry, checkpoint_id)?;
        }
        Ok(())
    }
}

use super::{StateObject, StreamStateHandle};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operator (non-keyed) state of one subtask.
///
/// All named states are written back to back into a single delegate blob;
/// `partition_offsets` records where each list-state partition starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorStreamStateHandle {
    partition_offsets: BTreeMap<String, Vec<u64>>,
    delegate: StreamStateHandle,
}

impl OperatorStreamStateHandle {
    pub fn new(partition_offsets: BTreeMap<String, Vec<u64>>, delegate: StreamStateHandle) -> Self {
        Self {
            partition_offsets,
            delegate,
        }
    }

    pub fn partition_offsets(&self) -> &BTreeMap<String, Vec<u64>> {
        &self.partition_offsets
    }

    pub fn delegate(&self) -> &StreamStateHandle {
        &self.delegate
    }
}

impl StateObject for OperatorStreamStateHandle {
    fn discard_state(&self) -> Result<()> {
        self.delegate.discard_state()
    }

    fn state_size(&self) -> u64 {
        self.delegate.state_size()
    }

    fn checkpointed_size(&self) -> u64 {
        self.delegate.checkpointed_size()
    }
}

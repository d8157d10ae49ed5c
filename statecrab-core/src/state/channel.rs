use super::{StateObject, StreamStateHandle};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// In-flight buffers of one input channel or result subpartition, captured
/// by an unaligned checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStateHandle {
    channel_index: u32,
    /// Start offset of every buffer inside the delegate.
    offsets: Vec<u64>,
    delegate: StreamStateHandle,
}

impl ChannelStateHandle {
    pub fn new(channel_index: u32, offsets: Vec<u64>, delegate: StreamStateHandle) -> Self {
        Self {
            channel_index,
            offsets,
            delegate,
        }
    }

    pub fn channel_index(&self) -> u32 {
        self.channel_index
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn delegate(&self) -> &StreamStateHandle {
        &self.delegate
    }
}

impl StateObject for ChannelStateHandle {
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

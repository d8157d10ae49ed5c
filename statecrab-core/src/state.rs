//! # State Handles
//!
//! Handles to checkpointed state and the registry that deduplicates
//! fragments shared between incremental checkpoints.
//!
//! ## Handle Types
//!
//! - [`StreamStateHandle`] — Leaf blob: in-memory bytes, a file, or a placeholder
//! - [`KeyedStateHandle`] — Keyed state for a key-group range, full or incremental
//! - [`OperatorStreamStateHandle`] — Operator (non-keyed) state partitions
//! - [`ChannelStateHandle`] — In-flight buffer data of one channel
//!
//! ## Sharing
//!
//! - [`SharedStateRegistry`] — Reference-counted map from fragment key to canonical handle
//! - [`StateDisposer`] — Performs the physical discard once a fragment is unreferenced

use crate::types::CheckpointId;
use anyhow::Result;

pub mod channel;
pub mod collection;
pub mod disposer;
pub mod handle;
pub mod keyed;
pub mod operator;
pub mod registry;

pub use channel::ChannelStateHandle;
pub use collection::StateObjectCollection;
pub use disposer::{BackgroundDisposer, InlineDisposer, StateDisposer};
pub use handle::{
    ByteStreamStateHandle, FileStateHandle, PlaceholderStreamStateHandle, StreamStateHandle,
};
pub use keyed::{
    IncrementalKeyedStateHandle, KeyGroupRange, KeyGroupsStateHandle, KeyedStateHandle,
    SharedStateSlot,
};
pub use operator::OperatorStreamStateHandle;
pub use registry::{
    DisposalMode, SharedStateRegistry, SharedStateRegistryConfig, SharedStateRegistryKey,
};

/// Anything that occupies checkpoint storage.
pub trait StateObject {
    /// Physically delete the state. May perform blocking I/O.
    fn discard_state(&self) -> Result<()>;

    /// Logical size in bytes, including fragments reused from earlier checkpoints.
    fn state_size(&self) -> u64;

    /// Bytes physically written by the checkpoint that produced this object.
    ///
    /// Never exceeds [`state_size`](StateObject::state_size).
    fn checkpointed_size(&self) -> u64 {
        self.state_size()
    }
}

/// State object that may hold fragments shared with other checkpoints.
pub trait CompositeStateHandle: StateObject {
    /// Register every shared fragment with `registry` on behalf of
    /// `checkpoint_id`, adopting the registry's canonical handles.
    fn register_shared_states(
        &self,
        registry: &SharedStateRegistry,
        checkpoint_id: CheckpointId,
    ) -> Result<()>;
}

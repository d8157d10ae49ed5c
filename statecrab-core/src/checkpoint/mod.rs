//! Checkpointed operator state.
//!
//! - [`OperatorSubtaskState`] — what one subtask of an operator snapshotted
//! - [`OperatorState`] — all subtask states of one operator plus its coordinator state

use crate::error::StateError;
use crate::state::{
    ByteStreamStateHandle, ChannelStateHandle, CompositeStateHandle, KeyedStateHandle,
    OperatorStreamStateHandle, SharedStateRegistry, StateObject, StateObjectCollection,
};
use crate::types::{CheckpointId, OperatorId, WriteOnce};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

mod operator_state;
mod subtask_state;

pub use operator_state::*;
pub use subtask_state::*;

#[cfg(test)]
#[path = "tests/checkpoint_tests.rs"]
mod tests;

//! # StateCrab Core
//!
//! Checkpoint state bookkeeping for the StateCrab stream processing engine.
//!
//! - [`types`] — Identifiers ([`OperatorId`](types::OperatorId),
//!   [`CheckpointId`](types::CheckpointId)) and the [`WriteOnce`](types::WriteOnce) cell.
//! - [`state`] — State handles, [`StateObject`](state::StateObject) /
//!   [`CompositeStateHandle`](state::CompositeStateHandle), and the
//!   [`SharedStateRegistry`](state::SharedStateRegistry) that deduplicates
//!   fragments across incremental checkpoints.
//! - [`checkpoint`] — Per-operator checkpoint state:
//!   [`OperatorState`](checkpoint::OperatorState) and
//!   [`OperatorSubtaskState`](checkpoint::OperatorSubtaskState).
//! - [`error`] — [`StateError`](error::StateError).

pub mod checkpoint;
pub mod error;
pub mod state;
pub mod types;

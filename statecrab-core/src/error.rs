//! Error types for checkpoint state bookkeeping.

use crate::state::SharedStateRegistryKey;

/// Contract violations raised by [`OperatorState`](crate::checkpoint::OperatorState)
/// and [`SharedStateRegistry`](crate::state::SharedStateRegistry).
///
/// Storage failures (discarding files and the like) are not represented here;
/// they travel as `anyhow::Error` with this type as the root cause where one
/// of these violations is involved.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("parallelism {parallelism} is not smaller or equal to max parallelism {max_parallelism}")]
    InvalidParallelism {
        parallelism: usize,
        max_parallelism: usize,
    },

    #[error(
        "subtask index {index} is out of bounds for parallelism {parallelism} ({collected} states collected)"
    )]
    SubtaskIndexOutOfBounds {
        index: usize,
        parallelism: usize,
        collected: usize,
    },

    #[error("coordinator state already set")]
    CoordinatorStateAlreadySet,

    #[error("attempt to reference unknown shared state {0}")]
    UnknownSharedState(SharedStateRegistryKey),

    #[error("attempt to register state to a closed shared state registry")]
    RegistryClosed,

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

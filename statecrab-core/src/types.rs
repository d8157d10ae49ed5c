use serde::{Deserialize, Serialize};

/// Unique, monotonically increasing identifier of a checkpoint.
pub type CheckpointId = u64;

/// Stable identifier of a logical operator.
///
/// Survives restores unchanged unless the job graph explicitly remaps it, see
/// [`OperatorState::copy_with_new_operator_id`](crate::checkpoint::OperatorState::copy_with_new_operator_id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperatorId(pub u128);

impl OperatorId {
    pub fn new(id: u128) -> Self {
        Self(id)
    }

    /// Build an id from its upper and lower 64-bit halves.
    pub fn from_parts(upper: u64, lower: u64) -> Self {
        Self(((upper as u128) << 64) | lower as u128)
    }

    pub fn upper_part(&self) -> u64 {
        (self.0 >> 64) as u64
    }

    pub fn lower_part(&self) -> u64 {
        self.0 as u64
    }
}

impl std::fmt::Display for OperatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Write-once cell.
///
/// The first [`set`](WriteOnce::set) stores the value; every later call is
/// rejected and hands the rejected value back to the caller.
#[derive(Debug, Clone, Default)]
pub struct WriteOnce<T>(std::sync::OnceLock<T>);

impl<T> WriteOnce<T> {
    pub fn new() -> Self {
        Self(std::sync::OnceLock::new())
    }

    pub fn set(&self, value: T) -> Result<(), T> {
        self.0.set(value)
    }

    pub fn get(&self) -> Option<&T> {
        self.0.get()
    }

    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }
}

impl<T> From<Option<T>> for WriteOnce<T> {
    fn from(value: Option<T>) -> Self {
        let cell = Self::new();
        if let Some(value) = value {
            // Fresh cell, cannot be occupied.
            let _ = cell.set(value);
        }
        cell
    }
}

impl<T: Serialize> Serialize for WriteOnce<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for WriteOnce<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;

//! Leaf state handles.

use super::StateObject;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// State kept in memory and shipped inline with the checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteStreamStateHandle {
    handle_name: String,
    data: Vec<u8>,
}

impl ByteStreamStateHandle {
    pub fn new(handle_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            handle_name: handle_name.into(),
            data,
        }
    }

    pub fn handle_name(&self) -> &str {
        &self.handle_name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl StateObject for ByteStreamStateHandle {
    fn discard_state(&self) -> Result<()> {
        Ok(())
    }

    fn state_size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// State written to a file of the checkpoint storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStateHandle {
    path: PathBuf,
    size: u64,
}

impl FileStateHandle {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateObject for FileStateHandle {
    /// Removes the file. A file that is already gone counts as discarded.
    fn discard_state(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to discard state file {}", self.path.display())),
        }
    }

    fn state_size(&self) -> u64 {
        self.size
    }
}

/// Stand-in for a fragment that an earlier checkpoint already uploaded.
///
/// Carries only the physical id of the fragment it refers to; the shared
/// state registry swaps it for the canonical handle on registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderStreamStateHandle {
    physical_id: String,
    size: u64,
}

impl PlaceholderStreamStateHandle {
    pub fn new(physical_id: impl Into<String>, size: u64) -> Self {
        Self {
            physical_id: physical_id.into(),
            size,
        }
    }

    pub fn physical_id(&self) -> &str {
        &self.physical_id
    }
}

impl StateObject for PlaceholderStreamStateHandle {
    fn discard_state(&self) -> Result<()> {
        // Nothing was written for this checkpoint.
        Ok(())
    }

    fn state_size(&self) -> u64 {
        self.size
    }

    fn checkpointed_size(&self) -> u64 {
        0
    }
}

/// A readable, immutable blob of checkpointed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamStateHandle {
    ByteStream(ByteStreamStateHandle),
    File(FileStateHandle),
    Placeholder(PlaceholderStreamStateHandle),
}

impl StreamStateHandle {
    /// Identity of the physical object behind this handle.
    ///
    /// A placeholder reports the id of the object it stands for.
    pub fn physical_id(&self) -> String {
        match self {
            Self::ByteStream(handle) => handle.handle_name().to_string(),
            Self::File(handle) => handle.path().display().to_string(),
            Self::Placeholder(handle) => handle.physical_id().to_string(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    fn as_state_object(&self) -> &dyn StateObject {
        match self {
            Self::ByteStream(handle) => handle,
            Self::File(handle) => handle,
            Self::Placeholder(handle) => handle,
        }
    }
}

impl StateObject for StreamStateHandle {
    fn discard_state(&self) -> Result<()> {
        self.as_state_object().discard_state()
    }

    fn state_size(&self) -> u64 {
        self.as_state_object().state_size()
    }

    fn checkpointed_size(&self) -> u64 {
        self.as_state_object().checkpointed_size()
    }
}

impl From<ByteStreamStateHandle> for StreamStateHandle {
    fn from(handle: ByteStreamStateHandle) -> Self {
        Self::ByteStream(handle)
    }
}

impl From<FileStateHandle> for StreamStateHandle {
    fn from(handle: FileStateHandle) -> Self {
        Self::File(handle)
    }
}

impl From<PlaceholderStreamStateHandle> for StreamStateHandle {
    fn from(handle: PlaceholderStreamStateHandle) -> Self {
        Self::Placeholder(handle)
    }
}

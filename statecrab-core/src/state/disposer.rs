//! Physical disposal of state fragments released by the shared state registry.

use super::{StateObject, StreamStateHandle};
use anyhow::{Context, Result};
use crossbeam_channel::{Sender, bounded};
use std::thread::{self, JoinHandle};

/// Performs the physical discard of fragments that no checkpoint references anymore.
///
/// Disposal failures are not reported back to the registry: the fragment is
/// already unreachable and retrying belongs to an outer cleanup service.
pub trait StateDisposer: Send + Sync {
    fn dispose(&self, handle: StreamStateHandle);
}

fn discard_logged(handle: &StreamStateHandle) {
    if let Err(err) = handle.discard_state() {
        tracing::warn!(
            "failed to discard shared state {}: {:#}",
            handle.physical_id(),
            err
        );
    }
}

/// Discards on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDisposer;

impl StateDisposer for InlineDisposer {
    fn dispose(&self, handle: StreamStateHandle) {
        discard_logged(&handle);
    }
}

/// Discards on a dedicated thread so that subsumption never blocks on storage I/O.
///
/// Dropping the disposer drains the queue and joins the thread.
pub struct BackgroundDisposer {
    sender: Option<Sender<StreamStateHandle>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundDisposer {
    pub fn new(queue_capacity: usize) -> Result<Self> {
        let (sender, receiver) = bounded::<StreamStateHandle>(queue_capacity.max(1));
        let worker = thread::Builder::new()
            .name("shared-state-disposer".to_string())
            .spawn(move || {
                for handle in receiver {
                    discard_logged(&handle);
                }
            })
            .context("failed to spawn shared state disposer thread")?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }
}

impl StateDisposer for BackgroundDisposer {
    fn dispose(&self, handle: StreamStateHandle) {
        let Some(sender) = self.sender.as_ref() else {
            discard_logged(&handle);
            return;
        };
        if let Err(err) = sender.send(handle) {
            tracing::warn!("disposer thread is gone, discarding inline");
            discard_logged(&err.into_inner());
        }
    }
}

impl Drop for BackgroundDisposer {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once the queue is drained.
        self.sender.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("shared state disposer thread panicked");
        }
    }
}

impl std::fmt::Debug for BackgroundDisposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundDisposer")
            .field("queued", &self.sender.as_ref().map_or(0, Sender::len))
            .finish()
    }
}

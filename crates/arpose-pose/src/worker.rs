use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// A named background thread that exits when its shutdown channel closes.
pub(crate) struct Worker {
    name: String,
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn `body` on a new thread. `body` receives the shutdown receiver and
    /// must return once it disconnects.
    pub(crate) fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (shutdown, shutdown_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || body(shutdown_rx))?;
        Ok(Self {
            name: name.into(),
            shutdown,
            handle,
        })
    }

    /// Signal shutdown and wait for the thread to exit.
    ///
    /// Must not be called from the worker thread itself.
    pub(crate) fn stop(self) {
        drop(self.shutdown);
        if self.handle.join().is_err() {
            error!(worker = %self.name, "Pose worker panicked");
        } else {
            debug!(worker = %self.name, "Pose worker stopped");
        }
    }
}

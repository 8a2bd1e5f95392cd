//! Where listener callbacks run.
use std::sync::{mpsc, Mutex};
use std::thread::JoinHandle;

use crate::{Error, Result};

/// A listener invocation waiting to be run.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Runs listener callbacks on the execution context callers expect.
pub trait CallbackExecutor: Send + Sync {
    fn execute(&self, callback: Callback);
}

impl<F> CallbackExecutor for F
where
    F: Fn(Callback) + Send + Sync,
{
    fn execute(&self, callback: Callback) {
        self(callback)
    }
}

/// Runs callbacks directly on the dispatcher worker that finished the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateExecutor;

impl CallbackExecutor for ImmediateExecutor {
    fn execute(&self, callback: Callback) {
        callback()
    }
}

/// A single background thread that runs callbacks one at a time, in the order they were
/// submitted.
pub struct DeliveryThread {
    // `Mutex` makes the sender `Sync` so the executor can be shared between workers.
    sender: Mutex<Option<mpsc::Sender<Callback>>>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryThread {
    pub const THREAD_NAME: &'static str = "ddna-delivery";

    /// Spawn the delivery thread.
    ///
    /// # Errors
    ///
    /// IO error if the thread failed to start.
    pub fn start() -> std::io::Result<DeliveryThread> {
        let (sender, receiver) = mpsc::channel::<Callback>();

        let join_handle = std::thread::Builder::new()
            .name(DeliveryThread::THREAD_NAME.to_owned())
            .spawn(move || {
                // Ends once every sender is dropped and the queue is drained.
                for callback in receiver {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback));
                    if result.is_err() {
                        log::error!(target: "ddna", "request listener panicked");
                    }
                }
                log::debug!(target: "ddna", "delivery thread stopped");
            })?;

        Ok(DeliveryThread {
            sender: Mutex::new(Some(sender)),
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

    /// Deliver pending callbacks, then stop the thread and wait for it to exit.
    ///
    /// Callbacks submitted afterwards run on the submitting thread.
    pub fn shutdown(&self) -> Result<()> {
        drop(self.lock_sender().take());

        let join_handle = match self.join_handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(join_handle) = join_handle {
            join_handle.join().map_err(|_| Error::WorkerPanicked)?;
        }
        Ok(())
    }

    fn lock_sender(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<Callback>>> {
        // Nothing panics while holding this lock.
        self.sender
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl CallbackExecutor for DeliveryThread {
    fn execute(&self, callback: Callback) {
        let rejected = match &*self.lock_sender() {
            Some(sender) => sender.send(callback).err().map(|err| err.0),
            None => Some(callback),
        };

        // A terminal outcome must never be dropped. Once the thread is gone, deliver inline.
        if let Some(callback) = rejected {
            log::warn!(target: "ddna", "delivery thread is stopped, running callback inline");
            callback();
        }
    }
}

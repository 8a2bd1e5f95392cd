//! A bounded worker pool that executes requests with retries and delivers their outcomes.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc, Mutex,
};
use std::thread::JoinHandle;

use crate::{
    converter::ResponseBodyConverter,
    error::StatusError,
    executor::{CallbackExecutor, DeliveryThread},
    listener::RequestListener,
    transport::Transport,
    CancelableRequest, Error, Request, Result,
};

/// Configuration for [`Dispatcher`].
#[derive(Clone)]
pub struct DispatcherConfig {
    /// Number of worker threads executing requests.
    ///
    /// Defaults to [`DispatcherConfig::DEFAULT_WORKERS`].
    pub workers: usize,
    /// Where listener callbacks run. When `None`, the dispatcher starts its own
    /// [`DeliveryThread`].
    pub executor: Option<Arc<dyn CallbackExecutor>>,
}

impl DispatcherConfig {
    /// Default value for [`DispatcherConfig::workers`].
    pub const DEFAULT_WORKERS: usize = 4;

    pub fn new() -> DispatcherConfig {
        DispatcherConfig::default()
    }

    /// Update the pool size. At least one worker is always started.
    pub fn with_workers(mut self, workers: usize) -> DispatcherConfig {
        self.workers = workers.max(1);
        self
    }

    /// Deliver callbacks through `executor` instead of a dedicated delivery thread.
    pub fn with_executor(mut self, executor: impl CallbackExecutor + 'static) -> DispatcherConfig {
        self.executor = Some(Arc::new(executor));
        self
    }
}

impl Default for DispatcherConfig {
    fn default() -> DispatcherConfig {
        DispatcherConfig {
            workers: DispatcherConfig::DEFAULT_WORKERS,
            executor: None,
        }
    }
}

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    transport: Arc<dyn Transport>,
    executor: Arc<dyn CallbackExecutor>,
    stopping: AtomicBool,
    /// Requests currently waiting out a retry delay.
    retrying: Mutex<Vec<CancelableRequest>>,
}

impl Shared {
    fn lock_retrying(&self) -> std::sync::MutexGuard<'_, Vec<CancelableRequest>> {
        // Nothing panics while holding this lock.
        self.retrying
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Executes [`Request`]s on a fixed pool of worker threads.
///
/// Requests are picked up in no particular order relative to each other. Each one is attempted
/// until it succeeds, fails permanently, runs out of retries, or is cancelled. Its outcome is run
/// through the response converter on the worker and handed to the listener on the callback
/// executor.
///
/// The dispatcher is an explicit object: start it once, share it by reference, and call
/// [`Dispatcher::shutdown`] when done.
pub struct Dispatcher {
    shared: Arc<Shared>,
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    workers: Vec<JoinHandle<()>>,
    /// Set when the dispatcher owns its delivery thread.
    delivery: Option<Arc<DeliveryThread>>,
}

impl Dispatcher {
    /// Start a dispatcher with the default configuration.
    ///
    /// # Errors
    ///
    /// IO error if a thread failed to start.
    pub fn start(transport: impl Transport + 'static) -> std::io::Result<Dispatcher> {
        Dispatcher::start_with_config(transport, DispatcherConfig::default())
    }

    /// Start a dispatcher with the provided configuration.
    ///
    /// # Errors
    ///
    /// IO error if a thread failed to start.
    pub fn start_with_config(
        transport: impl Transport + 'static,
        config: DispatcherConfig,
    ) -> std::io::Result<Dispatcher> {
        let (executor, delivery) = match config.executor {
            Some(executor) => (executor, None),
            None => {
                let delivery = Arc::new(DeliveryThread::start()?);
                (delivery.clone() as Arc<dyn CallbackExecutor>, Some(delivery))
            }
        };

        let shared = Arc::new(Shared {
            transport: Arc::new(transport),
            executor,
            stopping: AtomicBool::new(false),
            retrying: Mutex::new(Vec::new()),
        });

        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..config.workers.max(1))
            .map(|index| {
                let receiver = Arc::clone(&receiver);
                std::thread::Builder::new()
                    .name(format!("ddna-dispatcher-{index}"))
                    .spawn(move || worker_loop(&receiver))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        log::debug!(target: "ddna", workers = workers.len(); "dispatcher started");

        Ok(Dispatcher {
            shared,
            sender: Mutex::new(Some(sender)),
            workers,
            delivery,
        })
    }

    /// Schedule `request` and return immediately.
    ///
    /// The returned handle can cancel the request at any point before its outcome is committed.
    /// Errors are never returned from here; every outcome goes to `listener`.
    pub fn enqueue<T, C, L>(&self, request: Request, converter: C, listener: L) -> CancelableRequest
    where
        T: Send + 'static,
        C: ResponseBodyConverter<T> + 'static,
        L: RequestListener<T> + 'static,
    {
        let handle = CancelableRequest::new();
        let job = Job {
            shared: Arc::clone(&self.shared),
            request,
            converter,
            listener: Box::new(listener),
            handle: handle.clone(),
        };
        let task: Task = Box::new(move || job.run());

        let rejected = match &*self.lock_sender() {
            Some(sender) => sender.send(task).err().map(|err| err.0),
            None => Some(task),
        };
        if let Some(task) = rejected {
            // Stopped: the task sees `stopping` and fails without touching the network.
            task();
        }

        handle
    }

    /// Stop accepting requests.
    ///
    /// Requests still waiting for a worker fail with [`Error::Cancelled`]. An attempt already on
    /// the wire runs to completion but is not retried. Requests waiting out a retry delay wake up
    /// and fail with the error of their last attempt. This function does not wait for workers to
    /// exit.
    pub fn stop(&self) {
        if !self.shared.stopping.swap(true, Ordering::SeqCst) {
            log::debug!(target: "ddna", "dispatcher received stop command");
        }
        for handle in self.shared.lock_retrying().iter() {
            handle.interrupt();
        }
        // Dropping the sender lets workers exit once the queue is drained.
        drop(self.lock_sender().take());
    }

    /// Stop the dispatcher and block waiting for workers and the delivery thread to exit.
    ///
    /// Blocks for at most the longest attempt in flight; pending retry delays are cut short.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerPanicked`] if a worker or the delivery thread has panicked.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop();

        let mut result = Ok(());
        for worker in std::mem::take(&mut self.workers) {
            if worker.join().is_err() {
                result = Err(Error::WorkerPanicked);
            }
        }
        if let Some(delivery) = self.delivery.take() {
            delivery.shutdown()?;
        }
        result
    }

    fn lock_sender(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<Task>>> {
        // Nothing panics while holding this lock.
        self.sender
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(receiver: &Mutex<mpsc::Receiver<Task>>) {
    loop {
        let task = match receiver.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => return,
        };
        let Ok(task) = task else {
            // All senders dropped and the queue is empty.
            return;
        };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
        if result.is_err() {
            log::error!(target: "ddna", "request task panicked");
        }
    }
}

struct Job<T, C> {
    shared: Arc<Shared>,
    request: Request,
    converter: C,
    listener: Box<dyn RequestListener<T>>,
    handle: CancelableRequest,
}

impl<T, C> Job<T, C>
where
    T: Send + 'static,
    C: ResponseBodyConverter<T>,
{
    fn run(self) {
        let url = self.request.url();
        let result = if self.shared.stopping.load(Ordering::SeqCst) {
            log::debug!(target: "ddna", "dispatcher stopped, abandoning {url}");
            Some(Err(Error::Cancelled))
        } else {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.execute()))
                .unwrap_or_else(|_| {
                    log::error!(target: "ddna", "request to {url} panicked");
                    Some(Err(Error::WorkerPanicked))
                })
        };

        let Some(result) = result else {
            log::debug!(target: "ddna", "request to {url} cancelled");
            return;
        };
        if !self.handle.complete(result.is_ok()) {
            log::debug!(target: "ddna", "request to {url} cancelled before completion");
            return;
        }

        let listener = self.listener;
        self.shared
            .executor
            .execute(Box::new(move || match result {
                Ok(value) => listener.on_success(value),
                Err(err) => listener.on_failure(err),
            }));
    }

    /// Run the attempt loop. Returns `None` if the request got cancelled.
    fn execute(&self) -> Option<Result<T>> {
        let request = &self.request;
        let mut attempt: u32 = 0;

        loop {
            if !self.handle.begin_attempt() {
                return None;
            }
            attempt += 1;
            log::debug!(
                target: "ddna", attempt = attempt;
                "sending {} {}", request.method().as_str(), request.url()
            );

            let error = match self.shared.transport.execute(request) {
                Ok(response) if response.is_success() => {
                    let body = response.body().unwrap_or_default();
                    return Some(self.converter.convert(body).map_err(Error::from));
                }
                Ok(response) => Error::from(StatusError::from(response)),
                Err(err) => Error::from(err),
            };

            if !error.is_transient() || attempt > request.max_retries() {
                log::warn!(
                    target: "ddna", attempt = attempt;
                    "request to {} failed: {}", request.url(), error
                );
                return Some(Err(error));
            }

            log::warn!(
                target: "ddna", attempt = attempt;
                "request to {} failed, retrying in {:?}: {}",
                request.url(), request.retry_delay(), error
            );
            match self.wait_for_retry() {
                Some(true) => {}
                Some(false) => {
                    log::debug!(
                        target: "ddna",
                        "dispatcher stopped, not retrying {}", request.url()
                    );
                    return Some(Err(error));
                }
                None => return None,
            }
        }
    }

    /// Wait out the retry delay. `Some(false)` means the dispatcher stopped meanwhile, `None`
    /// that the request got cancelled.
    fn wait_for_retry(&self) -> Option<bool> {
        self.shared.lock_retrying().push(self.handle.clone());
        // Either `stop` sees the handle registered above or the flag is already set here.
        let proceed = !self.shared.stopping.load(Ordering::SeqCst)
            && self.handle.wait_for_retry(self.request.retry_delay());
        self.shared
            .lock_retrying()
            .retain(|handle| !handle.same_request(&self.handle));

        if self.handle.is_cancelled() {
            None
        } else {
            Some(proceed && !self.shared.stopping.load(Ordering::SeqCst))
        }
    }
}

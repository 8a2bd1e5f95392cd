use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex, MutexGuard, PoisonError,
};
use std::time::{Duration, Instant};

/// Lifecycle of an enqueued request.
///
/// `Pending → Sending → {Succeeded, Failed, Cancelled, Retrying → Sending}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Queued, waiting for a worker.
    Pending,
    /// An attempt is in flight.
    Sending,
    /// Waiting out the retry delay before the next attempt.
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Succeeded | RequestState::Failed | RequestState::Cancelled
        )
    }
}

struct Control {
    state: Mutex<RequestState>,
    changed: Condvar,
    /// Set when the dispatcher stops; cuts short any retry wait without cancelling.
    interrupted: AtomicBool,
}

/// Handle to an enqueued request that allows cancelling it.
///
/// Cancellation is cooperative. It prevents further attempts and suppresses the listener
/// callback, but an attempt already on the wire is not interrupted. Cancelling after the
/// request has completed has no effect.
#[derive(Clone)]
pub struct CancelableRequest {
    control: Arc<Control>,
}

impl CancelableRequest {
    pub(crate) fn new() -> CancelableRequest {
        CancelableRequest {
            control: Arc::new(Control {
                state: Mutex::new(RequestState::Pending),
                changed: Condvar::new(),
                interrupted: AtomicBool::new(false),
            }),
        }
    }

    /// Cancel the request. Idempotent.
    pub fn cancel(&self) {
        let mut state = self.lock();
        if !state.is_terminal() {
            log::debug!(target: "ddna", "cancelling request in state {:?}", *state);
            *state = RequestState::Cancelled;
            self.control.changed.notify_all();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.lock() == RequestState::Cancelled
    }

    pub fn state(&self) -> RequestState {
        *self.lock()
    }

    /// Move to `Sending`. Returns `false` if the request was cancelled.
    pub(crate) fn begin_attempt(&self) -> bool {
        self.transition(RequestState::Sending)
    }

    /// Block for `delay` in `Retrying`. Returns `false` as soon as the request is cancelled.
    ///
    /// Returns `true` early when [`CancelableRequest::interrupt`] is called.
    pub(crate) fn wait_for_retry(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let mut state = self.lock();
        if *state == RequestState::Cancelled {
            return false;
        }
        *state = RequestState::Retrying;

        loop {
            if *state == RequestState::Cancelled {
                return false;
            }
            let now = Instant::now();
            if now >= deadline || self.is_interrupted() {
                return true;
            }
            state = self
                .control
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Wake any current or future retry wait. The request itself is not cancelled.
    pub(crate) fn interrupt(&self) {
        let _state = self.lock();
        self.control.interrupted.store(true, Ordering::Release);
        self.control.changed.notify_all();
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.control.interrupted.load(Ordering::Acquire)
    }

    pub(crate) fn same_request(&self, other: &CancelableRequest) -> bool {
        Arc::ptr_eq(&self.control, &other.control)
    }

    /// Commit the terminal outcome. Returns `false` if cancellation got there first, in which
    /// case the outcome must not be delivered.
    pub(crate) fn complete(&self, succeeded: bool) -> bool {
        self.transition(if succeeded {
            RequestState::Succeeded
        } else {
            RequestState::Failed
        })
    }

    fn transition(&self, next: RequestState) -> bool {
        let mut state = self.lock();
        if state.is_terminal() {
            return false;
        }
        *state = next;
        self.control.changed.notify_all();
        true
    }

    fn lock(&self) -> MutexGuard<'_, RequestState> {
        // Nothing panics while holding this lock.
        self.control
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CancelableRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelableRequest")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let request = CancelableRequest::new();

        request.cancel();
        request.cancel();

        assert_eq!(request.state(), RequestState::Cancelled);
        assert!(!request.begin_attempt());
    }

    #[test]
    fn cancel_after_completion_is_a_no_op() {
        let request = CancelableRequest::new();
        assert!(request.begin_attempt());
        assert!(request.complete(true));

        request.cancel();

        assert_eq!(request.state(), RequestState::Succeeded);
        assert!(!request.is_cancelled());
    }

    #[test]
    fn cancel_before_commit_wins() {
        let request = CancelableRequest::new();
        assert!(request.begin_attempt());

        request.cancel();

        assert!(!request.complete(false));
        assert_eq!(request.state(), RequestState::Cancelled);
    }

    #[test]
    fn retry_wait_elapses() {
        let request = CancelableRequest::new();
        assert!(request.begin_attempt());

        assert!(request.wait_for_retry(Duration::from_millis(20)));
        assert_eq!(request.state(), RequestState::Retrying);
        assert!(request.begin_attempt());
    }

    #[test]
    fn cancel_wakes_retry_wait() {
        let request = CancelableRequest::new();
        assert!(request.begin_attempt());

        let handle = request.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.cancel();
        });

        let started = Instant::now();
        assert!(!request.wait_for_retry(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(10));
        canceller.join().unwrap();
    }

    #[test]
    fn interrupt_ends_retry_wait_without_cancelling() {
        let request = CancelableRequest::new();
        assert!(request.begin_attempt());

        let handle = request.clone();
        let interrupter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.interrupt();
        });

        let started = Instant::now();
        assert!(request.wait_for_retry(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!request.is_cancelled());
        assert!(request.same_request(&request.clone()));
        assert!(!request.same_request(&CancelableRequest::new()));
        interrupter.join().unwrap();
    }
}

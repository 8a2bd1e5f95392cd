use crate::{Error, Result};

/// Receives the outcome of an enqueued request.
///
/// Exactly one of the methods is called, once, on the dispatcher's callback executor, unless the
/// request was cancelled by its caller, in which case neither is. Both methods consume the
/// listener.
///
/// Closures taking a [`Result`] are listeners:
///
/// ```
/// # use ddna::{JsonObject, RequestListener, Result};
/// fn assert_listener<T>(_: impl RequestListener<T>) {}
/// assert_listener(|result: Result<JsonObject>| match result {
///     Ok(response) => println!("engage response: {response:?}"),
///     Err(err) if err.is_cancelled() => println!("dispatcher stopped"),
///     Err(err) => eprintln!("engage failed: {err}"),
/// });
/// ```
pub trait RequestListener<T>: Send {
    fn on_success(self: Box<Self>, result: T);

    /// Called with the terminal error. [`Error::is_cancelled`] tells whether the request was
    /// abandoned (dispatcher stopped) rather than failed.
    fn on_failure(self: Box<Self>, error: Error);
}

impl<T, F> RequestListener<T> for F
where
    F: FnOnce(Result<T>) + Send,
{
    fn on_success(self: Box<Self>, result: T) {
        (*self)(Ok(result))
    }

    fn on_failure(self: Box<Self>, error: Error) {
        (*self)(Err(error))
    }
}

/// A listener that discards the outcome. Used for fire-and-forget requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl<T> RequestListener<T> for NoopListener {
    fn on_success(self: Box<Self>, _result: T) {}

    fn on_failure(self: Box<Self>, error: Error) {
        log::debug!(target: "ddna", "request without listener failed: {error}");
    }
}

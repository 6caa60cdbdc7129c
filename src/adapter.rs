//! Call-signature adaptation for wrapped operations
//!
//! Every operation handed to a breaker (main service call, fallback and
//! health check alike) is normalized into "takes `Args`, yields a future
//! of `Result<T, E>`". Two calling conventions are recognized, selected
//! explicitly by the constructor used: future-returning functions, and
//! functions that complete through a trailing callback.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Completion handle passed to callback-style operations. Invoke it once
/// with the call's outcome.
pub type Completion<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

type FutureFn<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type CallbackFn<A, T, E> = Arc<dyn Fn(A, Completion<T, E>) + Send + Sync>;

/// A caller-supplied operation normalized to a uniform future contract.
pub enum CallAdapter<A, T, E> {
    /// The operation already returns a future.
    FutureBased(FutureFn<A, T, E>),
    /// The operation accepts a trailing completion callback.
    CallbackBased(CallbackFn<A, T, E>),
}

impl<A, T, E> Clone for CallAdapter<A, T, E> {
    fn clone(&self) -> Self {
        match self {
            CallAdapter::FutureBased(f) => CallAdapter::FutureBased(Arc::clone(f)),
            CallAdapter::CallbackBased(f) => CallAdapter::CallbackBased(Arc::clone(f)),
        }
    }
}

impl<A, T, E> std::fmt::Debug for CallAdapter<A, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallAdapter::FutureBased(_) => f.write_str("CallAdapter::FutureBased"),
            CallAdapter::CallbackBased(_) => f.write_str("CallAdapter::CallbackBased"),
        }
    }
}

impl<A, T, E> CallAdapter<A, T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Adapt a future-returning function.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        CallAdapter::FutureBased(Arc::new(move |args| Box::pin(f(args))))
    }

    /// Adapt a callback-style function. The completion may be invoked from
    /// any thread; invoking it settles the call.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(A, Completion<T, E>) + Send + Sync + 'static,
    {
        CallAdapter::CallbackBased(Arc::new(f))
    }

    /// Invoke the operation with `args`.
    ///
    /// In callback mode, dropping the completion without invoking it leaves
    /// the returned future pending forever, the same shape as an operation
    /// that never settles, which the breaker's per-call timeout covers.
    pub fn invoke(&self, args: A) -> BoxFuture<'static, Result<T, E>> {
        match self {
            CallAdapter::FutureBased(f) => f(args),
            CallAdapter::CallbackBased(f) => {
                let (tx, rx) = oneshot::channel();
                f(
                    args,
                    Box::new(move |outcome| {
                        let _ = tx.send(outcome);
                    }),
                );
                Box::pin(async move {
                    match rx.await {
                        Ok(outcome) => outcome,
                        Err(_) => std::future::pending().await,
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_future_mode_resolves() {
        let adapter: CallAdapter<u32, u32, String> = CallAdapter::future(|n: u32| async move {
            if n == 0 {
                Err("zero".to_string())
            } else {
                Ok(n * 2)
            }
        });

        assert_eq!(adapter.invoke(21).await, Ok(42));
        assert_eq!(adapter.invoke(0).await, Err("zero".to_string()));
    }

    #[tokio::test]
    async fn test_callback_mode_bridges_completion() {
        let adapter: CallAdapter<&'static str, String, String> =
            CallAdapter::callback(|name, done: Completion<String, String>| {
                done(Ok(format!("hello {name}")));
            });

        assert_eq!(adapter.invoke("world").await, Ok("hello world".to_string()));
    }

    #[tokio::test]
    async fn test_callback_mode_from_another_thread() {
        let adapter: CallAdapter<u32, u32, String> =
            CallAdapter::callback(|n, done: Completion<u32, String>| {
                std::thread::spawn(move || done(Ok(n + 1)));
            });

        assert_eq!(adapter.invoke(1).await, Ok(2));
    }

    #[tokio::test]
    async fn test_dropped_completion_never_settles() {
        let adapter: CallAdapter<(), (), String> =
            CallAdapter::callback(|(), done: Completion<(), String>| {
                drop(done);
            });

        let pending = adapter.invoke(());
        let raced = tokio::time::timeout(Duration::from_millis(30), pending).await;
        assert!(raced.is_err(), "dropped completion must leave the call pending");
    }
}

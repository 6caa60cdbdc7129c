//! Failure classification
//!
//! Not every error should count against the circuit: validation failures
//! or 4xx-style client errors usually say nothing about the health of the
//! downstream service. A classifier decides, per error, whether the
//! failure is recorded into the window. Unclassified errors still reach
//! the caller (or the fallback); they just stay invisible to the breaker's
//! own health evaluation.

/// Context handed to classifiers for each failed call.
#[derive(Debug)]
pub struct FailureContext<'a, E> {
    /// Breaker name.
    pub circuit_name: &'a str,
    /// The error the operation surfaced.
    pub error: &'a E,
    /// Duration of the failed call in milliseconds.
    pub latency_ms: u64,
}

/// Decides whether an error counts as a failure for circuit evaluation.
pub trait FailureClassifier<E>: Send + Sync {
    /// Return `true` to record this failure into the rolling window,
    /// `false` to ignore it.
    fn is_failure(&self, ctx: &FailureContext<'_, E>) -> bool;
}

/// Default classifier: every error counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl<E> FailureClassifier<E> for DefaultClassifier {
    fn is_failure(&self, _ctx: &FailureContext<'_, E>) -> bool {
        true
    }
}

/// Closure-based classifier for simple filtering patterns.
///
/// ```rust
/// use ringbreaker::{FailureClassifier, FailureContext, PredicateClassifier};
///
/// // Only count slow failures.
/// let classifier = PredicateClassifier::new(|ctx: &FailureContext<'_, String>| {
///     ctx.latency_ms > 1_000
/// });
///
/// let ctx = FailureContext { circuit_name: "api", error: &"err".to_string(), latency_ms: 5 };
/// assert!(!classifier.is_failure(&ctx));
/// ```
pub struct PredicateClassifier<F> {
    predicate: F,
}

impl<F> PredicateClassifier<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> FailureClassifier<E> for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_, E>) -> bool + Send + Sync,
{
    fn is_failure(&self, ctx: &FailureContext<'_, E>) -> bool {
        (self.predicate)(ctx)
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classifier_counts_everything() {
        let classifier = DefaultClassifier;
        let ctx = FailureContext {
            circuit_name: "test",
            error: &"any error",
            latency_ms: 1,
        };

        assert!(classifier.is_failure(&ctx));
    }

    #[test]
    fn test_predicate_on_latency() {
        let classifier = PredicateClassifier::new(|ctx: &FailureContext<'_, &str>| {
            ctx.latency_ms > 500
        });

        let fast = FailureContext {
            circuit_name: "test",
            error: &"fast",
            latency_ms: 100,
        };
        let slow = FailureContext {
            circuit_name: "test",
            error: &"slow",
            latency_ms: 2_000,
        };

        assert!(!classifier.is_failure(&fast));
        assert!(classifier.is_failure(&slow));
    }

    #[test]
    fn test_predicate_on_typed_error() {
        #[derive(Debug)]
        enum ApiError {
            Client(u16),
            Server(u16),
        }

        let classifier = PredicateClassifier::new(|ctx: &FailureContext<'_, ApiError>| {
            matches!(ctx.error, ApiError::Server(code) if *code >= 500)
        });

        let client = FailureContext {
            circuit_name: "test",
            error: &ApiError::Client(404),
            latency_ms: 1,
        };
        let server = FailureContext {
            circuit_name: "test",
            error: &ApiError::Server(503),
            latency_ms: 1,
        };

        assert!(!classifier.is_failure(&client));
        assert!(classifier.is_failure(&server));
    }
}

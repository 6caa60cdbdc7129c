//! Error types for breaker operations

use crate::stats::Totals;
use std::error::Error;
use std::fmt;

/// Errors a caller can observe from `execute`.
///
/// `E` is the error type of the wrapped operation. When the breaker is
/// configured with `modify_error` (the default) and has a name, propagated
/// operation and timeout errors render with a `[Breaker: name]` prefix.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker was built without a main operation.
    MissingOperation,
    /// Call rejected while the circuit is open and no fallback is set.
    CircuitBroken {
        circuit: String,
        totals: Totals,
        threshold: f64,
    },
    /// The per-call timeout elapsed before the operation settled.
    Timeout { circuit: Option<String> },
    /// The wrapped operation (or a fallback) failed.
    Execution { circuit: Option<String>, source: E },
}

impl<E> BreakerError<E> {
    pub fn is_circuit_broken(&self) -> bool {
        matches!(self, BreakerError::CircuitBroken { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }
}

fn write_prefix(f: &mut fmt::Formatter<'_>, circuit: &Option<String>) -> fmt::Result {
    match circuit {
        Some(name) if !name.is_empty() => write!(f, "[Breaker: {}] ", name),
        _ => Ok(()),
    }
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::MissingOperation => {
                write!(f, "This breaker has no main operation to execute")
            }
            BreakerError::CircuitBroken {
                circuit,
                totals,
                threshold,
            } => {
                if !circuit.is_empty() {
                    write!(f, "[Breaker: {}] ", circuit)?;
                }
                let failed_pct = if totals.total == 0 {
                    0.0
                } else {
                    ((1.0 - totals.successful as f64 / totals.total as f64) * 100.0).floor()
                };
                write!(
                    f,
                    "Circuit has been opened - The percentage of failed requests ({}%) is greater than the threshold specified ({}%)",
                    failed_pct,
                    threshold * 100.0
                )
            }
            BreakerError::Timeout { circuit } => {
                write_prefix(f, circuit)?;
                write!(f, "Request timed out")
            }
            BreakerError::Execution { circuit, source } => {
                write_prefix(f, circuit)?;
                write!(f, "{}", source)
            }
        }
    }
}

impl<E: Error + 'static> Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BreakerError::Execution { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Requested percentage of a bucket field that does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidBucketField {
    field: String,
}

impl InvalidBucketField {
    pub(crate) fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl fmt::Display for InvalidBucketField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid bucket field '{}'", self.field)
    }
}

impl Error for InvalidBucketField {}

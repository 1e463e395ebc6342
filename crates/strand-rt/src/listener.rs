//! Completion listeners.
//!
//! A listener receives a strand's terminal result: exactly one of `send`
//! (the strand completed with a value) or `throw` (it completed with an
//! error) per completed strand. Delivery returns a `Result` so that a
//! failing listener is observable at exit time; the strand reports the
//! failure to its kernel and skips the remaining listeners.

use crate::error::StrandError;
use crate::strand::Strand;
use crate::value::Value;

/// A recipient of a strand's terminal result.
pub trait Listener {
    /// The strand completed with a value.
    fn send(&self, value: Value, strand: &Strand) -> Result<(), StrandError>;

    /// The strand completed with an error.
    fn throw(&self, error: StrandError, strand: &Strand) -> Result<(), StrandError>;
}

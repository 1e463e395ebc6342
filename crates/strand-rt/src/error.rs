//! Errors produced and propagated by the strand engine.
//!
//! Errors travel two routes: frame-to-frame inside a strand (fed into the
//! parent frame as a throw-style resume) and strand-to-listener once the
//! frame stack is exhausted. The kernel wraps unhandled completions in
//! `StrandFailed` and listener delivery failures in `ListenerFailed`.

use std::fmt;

use crate::strand::StrandId;

/// An error raised inside, or about, a strand.
#[derive(Debug, Clone, PartialEq)]
pub enum StrandError {
    /// The strand was forcibly terminated; injected as its final result.
    Terminated(StrandId),
    /// Delivered to a displaced primary listener that was not the kernel.
    PrimaryListenerRemoved(StrandId),
    /// A completion listener failed while being notified; reported to the
    /// kernel, and later listeners are skipped.
    ListenerFailed {
        strand: StrandId,
        cause: Box<StrandError>,
    },
    /// An unhandled error reached the strand's top frame; the kernel's
    /// canonical wrapping.
    StrandFailed {
        strand: StrandId,
        cause: Box<StrandError>,
    },
    /// A callable entry point did not produce a coroutine.
    InvalidEntryPoint(String),
    /// An API call named an operation the API does not implement.
    UnknownOperation(String),
    /// A yielded value had no dispatch rule and the API fallback rejected it.
    UnexpectedValue(String),
    /// A coroutine frame panicked while running.
    Panicked(String),
    /// A free-form failure raised by user code.
    Failure(String),
}

impl StrandError {
    /// Build a free-form user failure.
    pub fn failure(message: impl Into<String>) -> Self {
        StrandError::Failure(message.into())
    }
}

impl fmt::Display for StrandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminated(id) => write!(f, "strand {id} terminated"),
            Self::PrimaryListenerRemoved(id) => {
                write!(f, "primary listener removed from strand {id}")
            }
            Self::ListenerFailed { strand, cause } => {
                write!(f, "listener for strand {strand} failed: {cause}")
            }
            Self::StrandFailed { strand, cause } => {
                write!(f, "strand {strand} failed: {cause}")
            }
            Self::InvalidEntryPoint(detail) => write!(f, "invalid entry point: {detail}"),
            Self::UnknownOperation(name) => write!(f, "unknown api operation: {name}"),
            Self::UnexpectedValue(detail) => {
                write!(f, "no dispatch rule for yielded value: {detail}")
            }
            Self::Panicked(message) => write!(f, "coroutine panicked: {message}"),
            Self::Failure(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for StrandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ListenerFailed { cause, .. } | Self::StrandFailed { cause, .. } => {
                Some(cause.as_ref())
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! The closed set of values a frame may yield, and its dispatch vocabulary.
//!
//! Every suspension hands the scheduler exactly one `YieldValue`; the strand
//! interpreter routes each variant through a fixed rule:
//!
//! - `Coroutine` / `CoroutineProvider`: push a nested frame and enter it
//! - `Call`: delegate to the API, which may return a frame to push or
//!   arrange its own resumption
//! - `Awaitable` / `AwaitableProvider`: register the strand as a waiter
//! - `Value`: fall back to the API's value dispatch
//! - `Trace`: diagnostic records folded into the frame before dispatch

use std::fmt;

use crate::api::ApiCall;
use crate::awaitable::{Awaitable, AwaitableProvider, CoroutineProvider};
use crate::frame::{CoroutineFrame, CoroutineSite, YieldSite};
use crate::value::Value;

/// A value yielded by a frame, awaiting dispatch.
pub enum YieldValue {
    /// A nested coroutine frame to push onto the strand's stack.
    Coroutine(CoroutineFrame),
    /// A producer asked for its coroutine at dispatch time.
    CoroutineProvider(Box<dyn CoroutineProvider>),
    /// A named API operation with value arguments.
    Call(ApiCall),
    /// An object that will eventually resume the strand.
    Awaitable(Box<dyn Awaitable>),
    /// A producer asked for its awaitable at dispatch time.
    AwaitableProvider(Box<dyn AwaitableProvider>),
    /// Any other value; routed through the API fallback.
    Value(Value),
    /// A diagnostic record, folded into the yielding frame.
    Trace(TraceRecord),
}

impl YieldValue {
    /// Shorthand for an API call yield.
    pub fn call(name: impl Into<String>, args: Vec<Value>) -> Self {
        YieldValue::Call(ApiCall::new(name, args))
    }
}

impl fmt::Debug for YieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coroutine(frame) => f.debug_tuple("Coroutine").field(frame).finish(),
            Self::CoroutineProvider(_) => write!(f, "CoroutineProvider(..)"),
            Self::Call(call) => f.debug_tuple("Call").field(call).finish(),
            Self::Awaitable(_) => write!(f, "Awaitable(..)"),
            Self::AwaitableProvider(_) => write!(f, "AwaitableProvider(..)"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Trace(record) => f.debug_tuple("Trace").field(record).finish(),
        }
    }
}

impl From<Value> for YieldValue {
    fn from(value: Value) -> Self {
        YieldValue::Value(value)
    }
}

impl From<CoroutineFrame> for YieldValue {
    fn from(frame: CoroutineFrame) -> Self {
        YieldValue::Coroutine(frame)
    }
}

// ---------------------------------------------------------------------------
// TraceRecord
// ---------------------------------------------------------------------------

/// A diagnostic record yielded by instrumented coroutines.
///
/// Both kinds are informational: a `Coroutine` record resumes the strand
/// transparently with null, and a `Yield` record re-enters dispatch with its
/// wrapped value as if the record had not been present.
#[derive(Debug)]
pub enum TraceRecord {
    /// Identifies the yielding coroutine itself.
    Coroutine(CoroutineSite),
    /// Identifies the call site of the next yield, wrapping the real value.
    Yield {
        site: YieldSite,
        value: Box<YieldValue>,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Suspendable coroutine frames built on corosensei.
//!
//! One `CoroutineFrame` is one level of a strand's logical call stack: a
//! stackful coroutine on its own 64 KiB stack. A frame is resumed either with
//! a value (`resume_send`) or with an error (`resume_throw`); after each
//! resume it is observed in exactly one of three ways:
//!
//! - `Yielded(v)`: still suspended, produced a value for dispatch
//! - `Returned(v)`: the body completed with a value
//! - `Failed(e)`: the body returned an error, or panicked
//!
//! The resume input and the body's return type are both
//! `Result<Value, StrandError>`, so a body "catches" a thrown resume by
//! matching the `Err` and "rethrows" with `?`.

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};

use crate::error::StrandError;
use crate::value::Value;
use crate::yield_value::YieldValue;

/// Stack size for each frame's coroutine: 64 KiB.
///
/// Virtual memory lazy-commits pages, so deep strand stacks stay cheap.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// What a frame receives when resumed, and what its body returns.
pub type ResumeResult = Result<Value, StrandError>;

/// The corosensei coroutine underlying a frame.
pub type FrameBody = Coroutine<ResumeResult, YieldValue, ResumeResult>;

/// Handle passed to a frame body for suspending.
///
/// `suspend` hands a [`YieldValue`] to the scheduler and blocks until the
/// strand is resumed; the returned [`ResumeResult`] is the resume payload.
pub type FrameYielder = Yielder<ResumeResult, YieldValue>;

// ---------------------------------------------------------------------------
// Trace annotations
// ---------------------------------------------------------------------------

/// Identity of a frame's coroutine: function name and source location.
#[derive(Debug, Clone, PartialEq)]
pub struct CoroutineSite {
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl CoroutineSite {
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        CoroutineSite {
            function: function.into(),
            file: file.into(),
            line,
        }
    }
}

/// Call site of a frame's most recent yield.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldSite {
    pub file: String,
    pub line: u32,
}

impl YieldSite {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        YieldSite {
            file: file.into(),
            line,
        }
    }
}

/// Trace annotations accumulated on a frame from trace records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameTrace {
    pub coroutine: Option<CoroutineSite>,
    pub last_yield: Option<YieldSite>,
}

// ---------------------------------------------------------------------------
// FrameStep
// ---------------------------------------------------------------------------

/// Observation of a frame after one resume.
#[derive(Debug)]
pub enum FrameStep {
    /// The frame suspended on a yielded value.
    Yielded(YieldValue),
    /// The frame's body completed with a value.
    Returned(Value),
    /// The frame's body returned an error or panicked.
    Failed(StrandError),
}

// ---------------------------------------------------------------------------
// CoroutineFrame
// ---------------------------------------------------------------------------

/// One suspendable level of a strand's call stack.
///
/// `CoroutineFrame` is `!Send`: corosensei coroutines cannot move across
/// threads, and the strand engine is single-threaded by design.
pub struct CoroutineFrame {
    body: FrameBody,
    #[cfg(feature = "frame-trace")]
    trace: FrameTrace,
}

impl CoroutineFrame {
    /// Wrap an already-built coroutine body.
    pub fn new(body: FrameBody) -> Self {
        CoroutineFrame {
            body,
            #[cfg(feature = "frame-trace")]
            trace: FrameTrace::default(),
        }
    }

    /// Build a frame from a closure body on a fresh 64 KiB stack.
    ///
    /// The closure receives the yielder and the first resume payload.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce(&FrameYielder, ResumeResult) -> ResumeResult + 'static,
    {
        let stack = DefaultStack::new(DEFAULT_STACK_SIZE).expect("failed to allocate frame stack");
        Self::new(Coroutine::with_stack(stack, f))
    }

    /// A trivial frame that yields `value` once and returns whatever it is
    /// resumed with.
    pub fn one_shot(value: Value) -> Self {
        Self::from_fn(move |yielder, _input| yielder.suspend(YieldValue::Value(value)))
    }

    /// Resume the frame with a value.
    pub fn resume_send(&mut self, value: Value) -> FrameStep {
        self.resume(Ok(value))
    }

    /// Resume the frame with an error.
    pub fn resume_throw(&mut self, error: StrandError) -> FrameStep {
        self.resume(Err(error))
    }

    pub(crate) fn resume(&mut self, input: ResumeResult) -> FrameStep {
        // A panicking body must not unwind into the interpreter.
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.body.resume(input)));
        match outcome {
            Ok(CoroutineResult::Yield(yielded)) => FrameStep::Yielded(yielded),
            Ok(CoroutineResult::Return(Ok(value))) => FrameStep::Returned(value),
            Ok(CoroutineResult::Return(Err(error))) => FrameStep::Failed(error),
            Err(payload) => FrameStep::Failed(StrandError::Panicked(panic_message(&payload))),
        }
    }

    /// Check whether the body has finished.
    pub fn done(&self) -> bool {
        self.body.done()
    }

    /// Note the coroutine identity reported by a trace record.
    pub fn record_coroutine_site(&mut self, site: CoroutineSite) {
        #[cfg(feature = "frame-trace")]
        {
            self.trace.coroutine = Some(site);
        }
        #[cfg(not(feature = "frame-trace"))]
        let _ = site;
    }

    /// Note the yield site reported by a trace record.
    pub fn record_yield_site(&mut self, site: YieldSite) {
        #[cfg(feature = "frame-trace")]
        {
            self.trace.last_yield = Some(site);
        }
        #[cfg(not(feature = "frame-trace"))]
        let _ = site;
    }

    /// The trace annotations accumulated so far.
    ///
    /// Empty when the `frame-trace` feature is disabled.
    pub fn trace(&self) -> FrameTrace {
        #[cfg(feature = "frame-trace")]
        {
            self.trace.clone()
        }
        #[cfg(not(feature = "frame-trace"))]
        {
            FrameTrace::default()
        }
    }
}

impl std::fmt::Debug for CoroutineFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoroutineFrame")
            .field("done", &self.done())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(inner) = payload.downcast_ref::<Box<dyn std::any::Any + Send>>() {
        // corosensei re-wraps the original panic payload in its own
        // `Box<dyn Any + Send>` when propagating it across the coroutine
        // stack boundary, so unwrap one extra layer before giving up.
        panic_message(inner.as_ref())
    } else {
        "frame body panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

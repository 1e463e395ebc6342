//! Suspension seams: awaitables and providers.
//!
//! An awaitable parks a strand: its `wait` registration stores whatever it
//! needs to eventually call `send` or `throw` on the strand. Registration is
//! one-shot, so the traits take `self: Box<Self>`; dispatch consumes the
//! yielded object.
//!
//! A registration is allowed to resume the strand synchronously, from inside
//! `wait` itself; the interpreter detects this and loops instead of
//! re-entering.

use std::sync::Arc;

use crate::api::Api;
use crate::error::StrandError;
use crate::frame::CoroutineFrame;
use crate::strand::Strand;

/// An object that, once registered, eventually resumes the waiting strand.
pub trait Awaitable {
    /// Register `strand` as the waiter. The implementation must arrange an
    /// eventual `strand.send(..)` or `strand.throw(..)` (possibly before
    /// returning), and should install a terminator on the strand if the
    /// arrangement reserves resources.
    fn wait(self: Box<Self>, strand: &Strand, api: &Arc<dyn Api>) -> Result<(), StrandError>;
}

/// A producer asked for its awaitable at dispatch time.
pub trait AwaitableProvider {
    fn awaitable(self: Box<Self>) -> Result<Box<dyn Awaitable>, StrandError>;
}

/// A producer asked for its coroutine at dispatch time.
///
/// Extraction failures surface in the *yielding* frame as a thrown resume.
pub trait CoroutineProvider {
    fn coroutine(self: Box<Self>) -> Result<CoroutineFrame, StrandError>;
}

// ---------------------------------------------------------------------------
// FnAwaitable
// ---------------------------------------------------------------------------

/// An awaitable built from a one-shot registration closure.
pub struct FnAwaitable<F>(pub F);

impl<F> Awaitable for FnAwaitable<F>
where
    F: FnOnce(&Strand, &Arc<dyn Api>) -> Result<(), StrandError>,
{
    fn wait(self: Box<Self>, strand: &Strand, api: &Arc<dyn Api>) -> Result<(), StrandError> {
        let FnAwaitable(register) = *self;
        register(strand, api)
    }
}

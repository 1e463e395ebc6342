//! The strand engine: a scheduled task with a suspendable call stack.
//!
//! A strand owns a stack of coroutine frames and advances by feeding values
//! into the top frame, interpreting what it yields, and propagating results
//! and errors up the stack. The interpreter (`start`) runs until the strand
//! parks on an awaitable, is terminated, or exits.
//!
//! ## Design
//!
//! - The control block lives under `Arc<parking_lot::Mutex<..>>`; handles are
//!   cheap clones shared with listeners, awaitables, and linked strands.
//! - Frames are resumed and yielded values dispatched with the control lock
//!   released, so user code may call back into the strand through its own
//!   handle without deadlocking.
//! - `start` is never re-entered. A resume arriving while dispatch is still
//!   in progress flips the state from `SuspendedActive` to `Ready`; the
//!   in-flight interpreter observes the flip and loops.
//!
//! ## States
//!
//! - `Ready`: a resume is queued; `start` will consume it
//! - `Running`: the interpreter is executing a frame
//! - `SuspendedActive`: the frame yielded and dispatch is still in progress
//! - `SuspendedInactive`: parked; an awaitable holds a reference and will
//!   resume the strand later
//! - `Exited`: terminal; the queued signal is frozen as the final result

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::api::Api;
use crate::awaitable::Awaitable;
use crate::error::StrandError;
use crate::frame::{CoroutineFrame, FrameStep, FrameTrace, FrameYielder, ResumeResult};
use crate::kernel::{Kernel, KernelShared};
use crate::listener::Listener;
use crate::value::Value;
use crate::yield_value::{TraceRecord, YieldValue};

// ---------------------------------------------------------------------------
// StrandId
// ---------------------------------------------------------------------------

/// Unique identifier for a strand, assigned sequentially by its kernel.
///
/// An id is never reused while its strand is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrandId(pub u64);

impl StrandId {
    /// Return the raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StrandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// StrandState
// ---------------------------------------------------------------------------

/// The execution state of a strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrandState {
    /// A resume is queued; the interpreter will consume it.
    Ready,
    /// The interpreter is executing inside `start`.
    Running,
    /// The current frame yielded; dispatch is still in progress.
    SuspendedActive,
    /// Parked on an awaitable that holds a reference to this strand.
    SuspendedInactive,
    /// Terminal; the final result is frozen.
    Exited,
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// A pending resume: the value to send into the current frame, or the error
/// to throw into it. Once the strand exits, the last signal is frozen as its
/// final result and delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Send(Value),
    Throw(StrandError),
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// The accepted shapes of a strand entry point.
///
/// Normalization happens at construction: a callable is invoked and must
/// produce a coroutine (or a coroutine provider); a plain value is wrapped in
/// a one-shot frame that yields it once and returns the resume result.
pub enum Entry {
    Coroutine(CoroutineFrame),
    Provider(Box<dyn crate::awaitable::CoroutineProvider>),
    Callable(Box<dyn FnOnce() -> Entry>),
    Value(Value),
}

impl Entry {
    /// Build a coroutine entry point from a closure body.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce(&FrameYielder, ResumeResult) -> ResumeResult + 'static,
    {
        Entry::Coroutine(CoroutineFrame::from_fn(f))
    }

    /// Build a callable entry point.
    pub fn callable<F>(f: F) -> Self
    where
        F: FnOnce() -> Entry + 'static,
    {
        Entry::Callable(Box::new(f))
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Entry::Coroutine(_) => "a coroutine",
            Entry::Provider(_) => "a coroutine provider",
            Entry::Callable(_) => "another callable",
            Entry::Value(_) => "a plain value",
        }
    }

    pub(crate) fn into_frame(self) -> Result<CoroutineFrame, StrandError> {
        match self {
            Entry::Coroutine(frame) => Ok(frame),
            Entry::Provider(provider) => provider.coroutine(),
            Entry::Callable(callable) => match callable() {
                Entry::Coroutine(frame) => Ok(frame),
                Entry::Provider(provider) => provider.coroutine(),
                other => Err(StrandError::InvalidEntryPoint(format!(
                    "callable entry point produced {}",
                    other.kind_name()
                ))),
            },
            Entry::Value(value) => Ok(CoroutineFrame::one_shot(value)),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entry({})", self.kind_name())
    }
}

impl From<CoroutineFrame> for Entry {
    fn from(frame: CoroutineFrame) -> Self {
        Entry::Coroutine(frame)
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Entry::Value(value)
    }
}

// ---------------------------------------------------------------------------
// Strand control block
// ---------------------------------------------------------------------------

/// One-shot cleanup callback installed by whoever parked the strand.
///
/// Invoked on termination so pending event-loop resources can be cancelled;
/// cleared by the engine on every resume.
pub type TerminatorHook = Box<dyn FnOnce(&Strand)>;

/// The primary listener slot: the kernel by default, or a replacement.
enum Primary {
    Kernel,
    Listener(Arc<dyn Listener>),
}

struct StrandInner {
    id: StrandId,
    kernel: Weak<KernelShared>,
    api: Arc<dyn Api>,
    state: StrandState,
    /// Suspended parent frames, bottom-first.
    stack: Vec<CoroutineFrame>,
    /// The active top-of-stack frame; absent once exited.
    current: Option<CoroutineFrame>,
    /// The queued resume while live; the frozen final result once exited.
    pending: Option<Signal>,
    primary: Option<Primary>,
    listeners: Vec<Arc<dyn Listener>>,
    terminator: Option<TerminatorHook>,
    /// Strands to terminate when this one exits, keyed by id.
    links: FxHashMap<StrandId, Strand>,
    /// Trace annotations of the frame that produced the final result.
    completion_trace: Option<FrameTrace>,
}

/// A scheduled task: a stack of suspendable coroutine frames driven by the
/// yield-dispatch interpreter.
///
/// `Strand` is a cheap handle; clones share the same control block.
#[derive(Clone)]
pub struct Strand {
    id: StrandId,
    inner: Arc<Mutex<StrandInner>>,
}

impl Strand {
    /// Create a strand in the `Ready` state from a normalized entry point.
    ///
    /// Fails with `InvalidEntryPoint` when a callable entry point does not
    /// produce a coroutine.
    pub(crate) fn new(
        kernel: Weak<KernelShared>,
        api: Arc<dyn Api>,
        id: StrandId,
        entry: Entry,
    ) -> Result<Self, StrandError> {
        let frame = entry.into_frame()?;
        let inner = StrandInner {
            id,
            kernel,
            api,
            state: StrandState::Ready,
            stack: Vec::new(),
            current: Some(frame),
            pending: Some(Signal::Send(Value::Null)),
            primary: Some(Primary::Kernel),
            listeners: Vec::new(),
            terminator: None,
            links: FxHashMap::default(),
            completion_trace: None,
        };
        Ok(Strand {
            id,
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    /// This strand's id.
    pub fn id(&self) -> StrandId {
        self.id
    }

    /// The kernel this strand belongs to, if it is still alive.
    pub fn kernel(&self) -> Option<Kernel> {
        self.inner.lock().kernel.upgrade().map(Kernel::from_shared)
    }

    /// Check whether the strand has exited.
    pub fn has_exited(&self) -> bool {
        self.inner.lock().state == StrandState::Exited
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> StrandState {
        self.inner.lock().state
    }

    /// The frozen final result, once the strand has exited.
    #[cfg(test)]
    pub(crate) fn result(&self) -> Option<Signal> {
        let inner = self.inner.lock();
        if inner.state == StrandState::Exited {
            inner.pending.clone()
        } else {
            None
        }
    }

    /// Trace annotations of the frame that produced the final result.
    ///
    /// Populated on completion when the `frame-trace` feature is enabled.
    pub fn trace(&self) -> Option<FrameTrace> {
        self.inner.lock().completion_trace.clone()
    }

    /// A boxed awaitable that resumes its waiter with this strand's result.
    pub fn awaitable(&self) -> Box<dyn Awaitable> {
        Box::new(self.clone())
    }

    // -----------------------------------------------------------------------
    // Resumption
    // -----------------------------------------------------------------------

    /// Resume the strand with a value. No-op once exited.
    pub fn send(&self, value: Value) {
        self.resume_with(Signal::Send(value));
    }

    /// Resume the strand with an error. No-op once exited.
    pub fn throw(&self, error: StrandError) {
        self.resume_with(Signal::Throw(error));
    }

    fn resume_with(&self, signal: Signal) {
        let run = {
            let mut inner = self.inner.lock();
            if inner.state == StrandState::Exited {
                return;
            }
            // Whoever parked the strand installed this hook; it is stale now.
            inner.terminator = None;
            inner.pending = Some(signal);
            match inner.state {
                StrandState::SuspendedInactive => true,
                StrandState::SuspendedActive => {
                    // The interpreter is mid-dispatch; it will observe the
                    // flip and loop rather than be re-entered.
                    inner.state = StrandState::Ready;
                    false
                }
                _ => false,
            }
        };
        if run {
            self.start();
        }
    }

    // -----------------------------------------------------------------------
    // Interpreter
    // -----------------------------------------------------------------------

    /// Advance the strand until it parks, is terminated, or exits.
    ///
    /// No-op when the strand has exited or the interpreter is already
    /// running; would-be re-entrant callers queue a resume instead.
    pub fn start(&self) {
        {
            let inner = self.inner.lock();
            match inner.state {
                StrandState::Ready | StrandState::SuspendedInactive => {}
                StrandState::Running | StrandState::SuspendedActive | StrandState::Exited => {
                    return;
                }
            }
        }

        loop {
            // Take the queued resume and the active frame.
            let (mut frame, input) = {
                let mut inner = self.inner.lock();
                if inner.state == StrandState::Exited {
                    return;
                }
                let signal = match inner.pending.take() {
                    Some(signal) => signal,
                    None => return,
                };
                let frame = match inner.current.take() {
                    Some(frame) => frame,
                    None => return,
                };
                inner.state = StrandState::Running;
                let input = match signal {
                    Signal::Send(value) => Ok(value),
                    Signal::Throw(error) => Err(error),
                };
                (frame, input)
            };

            // Run the frame to its next suspension point with the lock
            // released; the body may call back through its own handle.
            let step = frame.resume(input);

            let yielded = {
                let mut inner = self.inner.lock();
                if inner.state == StrandState::Exited {
                    // Terminated from inside the frame body; the stack was
                    // already discarded and the frame is dropped here.
                    inner.completion_trace = Some(frame.trace());
                    return;
                }
                match step {
                    FrameStep::Yielded(yielded) => {
                        inner.current = Some(frame);
                        inner.state = StrandState::SuspendedActive;
                        match fold_trace(&mut inner, yielded) {
                            Some(yielded) => yielded,
                            // A coroutine trace record queued a transparent
                            // resume; pick it up.
                            None => continue,
                        }
                    }
                    FrameStep::Returned(value) => {
                        if let Some(parent) = inner.stack.pop() {
                            inner.current = Some(parent);
                            inner.pending = Some(Signal::Send(value));
                            continue;
                        }
                        inner.completion_trace = Some(frame.trace());
                        inner.pending = Some(Signal::Send(value));
                        drop(inner);
                        self.exit();
                        return;
                    }
                    FrameStep::Failed(error) => {
                        if let Some(parent) = inner.stack.pop() {
                            inner.current = Some(parent);
                            inner.pending = Some(Signal::Throw(error));
                            continue;
                        }
                        inner.completion_trace = Some(frame.trace());
                        inner.pending = Some(Signal::Throw(error));
                        drop(inner);
                        self.exit();
                        return;
                    }
                }
            };

            // Dispatch with the lock released; awaitables and API calls may
            // resume or terminate the strand synchronously.
            let dispatched = self.dispatch(yielded);

            let mut inner = self.inner.lock();
            if inner.state == StrandState::Exited {
                return;
            }
            if let Err(error) = dispatched {
                // A failing dispatch reads as if the frame had thrown on its
                // own yield: feed the error back in.
                inner.pending = Some(Signal::Throw(error));
                inner.state = StrandState::Ready;
            }
            match inner.state {
                // Resumed synchronously during dispatch.
                StrandState::Ready => continue,
                StrandState::SuspendedActive => {
                    inner.state = StrandState::SuspendedInactive;
                    return;
                }
                _ => return,
            }
        }
    }

    /// The per-variant dispatch rules for a yielded value.
    fn dispatch(&self, yielded: YieldValue) -> Result<(), StrandError> {
        match yielded {
            YieldValue::Coroutine(frame) => {
                self.enter_frame(frame);
                Ok(())
            }
            YieldValue::CoroutineProvider(provider) => {
                let frame = provider.coroutine()?;
                self.enter_frame(frame);
                Ok(())
            }
            YieldValue::Call(call) => {
                let api = self.api();
                if let Some(frame) = api.call(self, call)? {
                    self.enter_frame(frame);
                }
                Ok(())
            }
            YieldValue::Awaitable(awaitable) => {
                let api = self.api();
                awaitable.wait(self, &api)
            }
            YieldValue::AwaitableProvider(provider) => {
                let api = self.api();
                let awaitable = provider.awaitable()?;
                awaitable.wait(self, &api)
            }
            YieldValue::Value(value) => {
                let api = self.api();
                api.dispatch_value(self, None, value)
            }
            // Trace records are folded before dispatch; one that survives
            // (e.g. wrapped inside another record) resumes transparently.
            YieldValue::Trace(_) => {
                self.send(Value::Null);
                Ok(())
            }
        }
    }

    /// Push the current frame and enter a nested one.
    fn enter_frame(&self, frame: CoroutineFrame) {
        let mut inner = self.inner.lock();
        if inner.state == StrandState::Exited {
            return;
        }
        if let Some(current) = inner.current.take() {
            inner.stack.push(current);
        }
        inner.current = Some(frame);
        // The fresh frame starts on a null resume, exactly like an entry
        // point; the interpreter loop picks it up.
        inner.pending = Some(Signal::Send(Value::Null));
        inner.state = StrandState::Ready;
    }

    fn api(&self) -> Arc<dyn Api> {
        self.inner.lock().api.clone()
    }

    // -----------------------------------------------------------------------
    // Termination
    // -----------------------------------------------------------------------

    /// Discard the call stack, invoke the terminator hook, and exit with a
    /// `Terminated` error. Legal in any state; no-op once exited.
    ///
    /// Discarded frames are never resumed: dropping them unwinds their
    /// stacks without any frame observing a throw-style resume.
    pub fn terminate(&self) {
        let mut discarded: Vec<CoroutineFrame> = Vec::new();
        let terminator = {
            let mut inner = self.inner.lock();
            if inner.state == StrandState::Exited {
                return;
            }
            if let Some(frame) = inner.current.as_ref() {
                inner.completion_trace = Some(frame.trace());
            }
            discarded.extend(inner.stack.drain(..));
            discarded.extend(inner.current.take());
            inner.pending = Some(Signal::Throw(StrandError::Terminated(inner.id)));
            inner.terminator.take()
        };
        // Unwind the abandoned frames before any listener runs.
        drop(discarded);
        if let Some(hook) = terminator {
            // A panicking hook must not unwind into the engine.
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(self)));
        }
        self.exit();
    }

    /// Install or clear the terminator hook.
    pub fn set_terminator(&self, hook: Option<TerminatorHook>) {
        let mut inner = self.inner.lock();
        if inner.state == StrandState::Exited {
            return;
        }
        inner.terminator = hook;
    }

    // -----------------------------------------------------------------------
    // Listeners and links
    // -----------------------------------------------------------------------

    /// Replace the primary listener.
    ///
    /// On an exited strand the new listener is notified immediately with the
    /// final result. Otherwise, a displaced non-kernel primary receives
    /// `PrimaryListenerRemoved` exactly once.
    pub fn set_primary_listener(&self, listener: Arc<dyn Listener>) {
        let (displaced, final_signal) = {
            let mut inner = self.inner.lock();
            if inner.state == StrandState::Exited {
                (None, inner.pending.clone())
            } else {
                let previous = inner.primary.replace(Primary::Listener(listener.clone()));
                (previous, None)
            }
        };
        if let Some(signal) = final_signal {
            if let Err(cause) = deliver(&*listener, &signal, self) {
                self.report_listener_failure(cause);
            }
            return;
        }
        if let Some(Primary::Listener(previous)) = displaced {
            let _ = previous.throw(StrandError::PrimaryListenerRemoved(self.id), self);
        }
    }

    /// Restore the kernel as the primary listener.
    pub fn clear_primary_listener(&self) {
        let mut inner = self.inner.lock();
        if inner.state == StrandState::Exited {
            return;
        }
        inner.primary = Some(Primary::Kernel);
    }

    /// Attach a secondary completion listener.
    ///
    /// On an exited strand the listener is notified immediately with the
    /// final result; otherwise it is appended and notified at exit, after
    /// the primary listener.
    pub fn await_completion(&self, listener: Arc<dyn Listener>) {
        let immediate = {
            let mut inner = self.inner.lock();
            if inner.state == StrandState::Exited {
                inner.pending.clone()
            } else {
                inner.listeners.push(listener.clone());
                None
            }
        };
        if let Some(signal) = immediate {
            if let Err(cause) = deliver(&*listener, &signal, self) {
                self.report_listener_failure(cause);
            }
        }
    }

    /// Register `other` to be terminated when this strand exits.
    ///
    /// Links are uni-directional and idempotent. Linking from an exited
    /// strand is a no-op: the exit that would have consumed the link has
    /// already happened.
    pub fn link(&self, other: &Strand) {
        let mut inner = self.inner.lock();
        if inner.state == StrandState::Exited {
            return;
        }
        inner.links.insert(other.id(), other.clone());
    }

    /// Remove a link previously registered with `link`.
    pub fn unlink(&self, other: &Strand) {
        self.inner.lock().links.remove(&other.id());
    }

    // -----------------------------------------------------------------------
    // Exit
    // -----------------------------------------------------------------------

    /// Freeze the final result, notify listeners, and terminate links.
    ///
    /// Primary first, then secondaries in insertion order; the first
    /// delivery failure is reported to the kernel and ends delivery. Linked
    /// strands are terminated last, each removed from the link set before
    /// its termination runs so a cascading exit cannot re-enter.
    fn exit(&self) {
        let mut discarded: Vec<CoroutineFrame> = Vec::new();
        let (signal, primary, listeners, links, kernel) = {
            let mut inner = self.inner.lock();
            if inner.state == StrandState::Exited {
                return;
            }
            inner.state = StrandState::Exited;
            discarded.extend(inner.stack.drain(..));
            discarded.extend(inner.current.take());
            inner.terminator = None;
            let signal = inner.pending.clone().unwrap_or(Signal::Send(Value::Null));
            inner.pending = Some(signal.clone());
            (
                signal,
                inner.primary.take(),
                std::mem::take(&mut inner.listeners),
                std::mem::take(&mut inner.links),
                inner.kernel.clone(),
            )
        };
        drop(discarded);

        let kernel = kernel.upgrade();

        let mut delivery_failed = false;
        if let Some(primary) = primary {
            let delivered = match primary {
                Primary::Kernel => {
                    if let Some(kernel) = &kernel {
                        kernel.strand_completed(self, &signal);
                    }
                    Ok(())
                }
                Primary::Listener(listener) => deliver(&*listener, &signal, self),
            };
            if let Err(cause) = delivered {
                if let Some(kernel) = &kernel {
                    kernel.listener_failed(StrandError::ListenerFailed {
                        strand: self.id,
                        cause: Box::new(cause),
                    });
                }
                delivery_failed = true;
            }
        }
        if !delivery_failed {
            for listener in listeners {
                if let Err(cause) = deliver(&*listener, &signal, self) {
                    if let Some(kernel) = &kernel {
                        kernel.listener_failed(StrandError::ListenerFailed {
                            strand: self.id,
                            cause: Box::new(cause),
                        });
                    }
                    break;
                }
            }
        }

        // The strand is no longer schedulable.
        if let Some(kernel) = &kernel {
            kernel.reap(self.id);
        }

        for (_, linked) in links {
            linked.terminate();
        }
    }

    fn report_listener_failure(&self, cause: StrandError) {
        if let Some(kernel) = self.inner.lock().kernel.upgrade() {
            kernel.listener_failed(StrandError::ListenerFailed {
                strand: self.id,
                cause: Box::new(cause),
            });
        }
    }
}

impl PartialEq for Strand {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Strand {}

impl fmt::Debug for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.try_lock().map(|inner| inner.state);
        f.debug_struct("Strand")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}

/// Fold leading trace records into the current frame's annotations.
///
/// A coroutine record queues a transparent null resume and returns `None`;
/// a yield record is unwrapped and its inner value re-enters dispatch.
fn fold_trace(inner: &mut StrandInner, mut yielded: YieldValue) -> Option<YieldValue> {
    loop {
        match yielded {
            YieldValue::Trace(TraceRecord::Coroutine(site)) => {
                if let Some(frame) = inner.current.as_mut() {
                    frame.record_coroutine_site(site);
                }
                inner.pending = Some(Signal::Send(Value::Null));
                inner.state = StrandState::Ready;
                return None;
            }
            YieldValue::Trace(TraceRecord::Yield { site, value }) => {
                if let Some(frame) = inner.current.as_mut() {
                    frame.record_yield_site(site);
                }
                yielded = *value;
            }
            other => return Some(other),
        }
    }
}

fn deliver(listener: &dyn Listener, signal: &Signal, strand: &Strand) -> Result<(), StrandError> {
    match signal {
        Signal::Send(value) => listener.send(value.clone(), strand),
        Signal::Throw(error) => listener.throw(error.clone(), strand),
    }
}

// ---------------------------------------------------------------------------
// Strand as awaitable
// ---------------------------------------------------------------------------

/// Forwards a completed strand's result into a waiting strand.
struct ResumeWaiter {
    waiter: Strand,
}

impl Listener for ResumeWaiter {
    fn send(&self, value: Value, _strand: &Strand) -> Result<(), StrandError> {
        self.waiter.send(value);
        Ok(())
    }

    fn throw(&self, error: StrandError, _strand: &Strand) -> Result<(), StrandError> {
        self.waiter.throw(error);
        Ok(())
    }
}

impl Awaitable for Strand {
    fn wait(self: Box<Self>, strand: &Strand, _api: &Arc<dyn Api>) -> Result<(), StrandError> {
        self.await_completion(Arc::new(ResumeWaiter {
            waiter: strand.clone(),
        }));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiCall;
    use crate::awaitable::{CoroutineProvider, FnAwaitable};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// An API whose value fallback echoes the yielded value back into the
    /// strand, synchronously.
    struct EchoApi;

    impl Api for EchoApi {
        fn call(
            &self,
            _strand: &Strand,
            call: ApiCall,
        ) -> Result<Option<CoroutineFrame>, StrandError> {
            Err(StrandError::UnknownOperation(call.name))
        }

        fn dispatch_value(
            &self,
            strand: &Strand,
            _key: Option<Value>,
            value: Value,
        ) -> Result<(), StrandError> {
            strand.send(value);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Capture {
        events: Mutex<Vec<Signal>>,
    }

    impl Capture {
        fn events(&self) -> Vec<Signal> {
            self.events.lock().clone()
        }
    }

    impl Listener for Capture {
        fn send(&self, value: Value, _strand: &Strand) -> Result<(), StrandError> {
            self.events.lock().push(Signal::Send(value));
            Ok(())
        }

        fn throw(&self, error: StrandError, _strand: &Strand) -> Result<(), StrandError> {
            self.events.lock().push(Signal::Throw(error));
            Ok(())
        }
    }

    /// A listener that always fails delivery.
    struct Rejecting;

    impl Listener for Rejecting {
        fn send(&self, _value: Value, _strand: &Strand) -> Result<(), StrandError> {
            Err(StrandError::failure("listener rejected value"))
        }

        fn throw(&self, _error: StrandError, _strand: &Strand) -> Result<(), StrandError> {
            Err(StrandError::failure("listener rejected error"))
        }
    }

    fn spawn_id(id: u64, entry: Entry) -> Strand {
        Strand::new(Weak::new(), Arc::new(EchoApi), StrandId(id), entry)
            .expect("entry point accepted")
    }

    fn spawn(entry: Entry) -> Strand {
        spawn_id(1, entry)
    }

    #[test]
    fn test_immediate_return_exits_in_one_start() {
        let strand = spawn(Entry::from_fn(|_yielder, _input| Ok(Value::from("done"))));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        assert_eq!(strand.state(), StrandState::Ready);
        strand.start();
        assert!(strand.has_exited());
        assert_eq!(capture.events(), vec![Signal::Send(Value::from("done"))]);
    }

    #[test]
    fn test_immediate_error_exits_with_throw() {
        let strand = spawn(Entry::from_fn(|_yielder, _input| {
            Err(StrandError::failure("broken before first yield"))
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(
            capture.events(),
            vec![Signal::Throw(StrandError::failure(
                "broken before first yield"
            ))]
        );
    }

    #[test]
    fn test_echo_dispatch_round_trip() {
        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let echoed = yielder.suspend(YieldValue::Value(Value::Int(7)))?;
            if echoed != Value::Int(7) {
                return Err(StrandError::failure("echo mismatch"));
            }
            Ok(Value::from("done"))
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(capture.events(), vec![Signal::Send(Value::from("done"))]);
    }

    #[test]
    fn test_nested_coroutine_result_feeds_parent() {
        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let child = CoroutineFrame::from_fn(|_yielder, _input| Ok(Value::Int(5)));
            let got = yielder.suspend(YieldValue::Coroutine(child))?;
            Ok(got)
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(capture.events(), vec![Signal::Send(Value::Int(5))]);
    }

    #[test]
    fn test_nested_error_propagates_to_parent() {
        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let child =
                CoroutineFrame::from_fn(|_yielder, _input| Err(StrandError::failure("child blew")));
            let got = yielder.suspend(YieldValue::Coroutine(child))?;
            Ok(got)
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(
            capture.events(),
            vec![Signal::Throw(StrandError::failure("child blew"))]
        );
    }

    #[test]
    fn test_parent_catches_child_error() {
        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let child =
                CoroutineFrame::from_fn(|_yielder, _input| Err(StrandError::failure("child blew")));
            match yielder.suspend(YieldValue::Coroutine(child)) {
                Ok(value) => Ok(value),
                Err(_) => Ok(Value::from("recovered")),
            }
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(
            capture.events(),
            vec![Signal::Send(Value::from("recovered"))]
        );
    }

    #[test]
    fn test_provider_extraction_error_hits_yielding_frame() {
        struct Broken;

        impl CoroutineProvider for Broken {
            fn coroutine(self: Box<Self>) -> Result<CoroutineFrame, StrandError> {
                Err(StrandError::failure("no coroutine available"))
            }
        }

        let strand = spawn(Entry::from_fn(|yielder, _input| {
            match yielder.suspend(YieldValue::CoroutineProvider(Box::new(Broken))) {
                Ok(value) => Ok(value),
                Err(error) => Ok(Value::Str(format!("saw: {error}"))),
            }
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(
            capture.events(),
            vec![Signal::Send(Value::from("saw: no coroutine available"))]
        );
    }

    #[test]
    fn test_awaitable_provider_registers_its_awaitable() {
        struct Ready;

        impl crate::awaitable::AwaitableProvider for Ready {
            fn awaitable(self: Box<Self>) -> Result<Box<dyn crate::awaitable::Awaitable>, StrandError> {
                Ok(Box::new(FnAwaitable(
                    |strand: &Strand, _api: &Arc<dyn Api>| -> Result<(), StrandError> {
                        strand.send(Value::Int(13));
                        Ok(())
                    },
                )))
            }
        }

        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let got = yielder.suspend(YieldValue::AwaitableProvider(Box::new(Ready)))?;
            Ok(got)
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(capture.events(), vec![Signal::Send(Value::Int(13))]);
    }

    #[test]
    fn test_awaitable_provider_failure_hits_yielding_frame() {
        struct Broken;

        impl crate::awaitable::AwaitableProvider for Broken {
            fn awaitable(self: Box<Self>) -> Result<Box<dyn crate::awaitable::Awaitable>, StrandError> {
                Err(StrandError::failure("no awaitable available"))
            }
        }

        let strand = spawn(Entry::from_fn(|yielder, _input| {
            match yielder.suspend(YieldValue::AwaitableProvider(Box::new(Broken))) {
                Ok(value) => Ok(value),
                Err(error) => Ok(Value::Str(format!("saw: {error}"))),
            }
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(
            capture.events(),
            vec![Signal::Send(Value::from("saw: no awaitable available"))]
        );
    }

    #[test]
    fn test_provider_entry_point() {
        struct Fixed;

        impl CoroutineProvider for Fixed {
            fn coroutine(self: Box<Self>) -> Result<CoroutineFrame, StrandError> {
                Ok(CoroutineFrame::from_fn(|_yielder, _input| {
                    Ok(Value::Int(21))
                }))
            }
        }

        let strand = spawn(Entry::Provider(Box::new(Fixed)));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(capture.events(), vec![Signal::Send(Value::Int(21))]);
    }

    #[test]
    fn test_callable_entry_point_unwraps() {
        let strand = spawn(Entry::callable(|| {
            Entry::from_fn(|_yielder, _input| Ok(Value::Int(3)))
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(capture.events(), vec![Signal::Send(Value::Int(3))]);
    }

    #[test]
    fn test_invalid_entry_point_callable() {
        let result = Strand::new(
            Weak::new(),
            Arc::new(EchoApi),
            StrandId(9),
            Entry::callable(|| Entry::Value(Value::Int(1))),
        );
        match result {
            Err(StrandError::InvalidEntryPoint(detail)) => {
                assert!(detail.contains("plain value"), "detail was: {detail}");
            }
            other => panic!("expected InvalidEntryPoint, got {other:?}"),
        }
    }

    #[test]
    fn test_value_entry_point_wraps_one_shot() {
        // The one-shot frame yields the value (echoed back by the API) and
        // returns the resume result.
        let strand = spawn(Entry::Value(Value::Int(42)));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(capture.events(), vec![Signal::Send(Value::Int(42))]);
    }

    #[test]
    fn test_sync_resume_during_await_does_not_recurse() {
        let registrations = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicUsize::new(0));
        let strand = {
            let registrations = registrations.clone();
            let seen = seen.clone();
            spawn(Entry::from_fn(move |yielder, _input| {
                let awaitable = FnAwaitable(move |strand: &Strand, _api: &Arc<dyn Api>| {
                    registrations.fetch_add(1, Ordering::SeqCst);
                    strand.send(Value::Int(42));
                    Ok(())
                });
                let got = yielder.suspend(YieldValue::Awaitable(Box::new(awaitable)))?;
                if got == Value::Int(42) {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                Ok(Value::from("after sync resume"))
            }))
        };
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(registrations.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(
            capture.events(),
            vec![Signal::Send(Value::from("after sync resume"))]
        );
    }

    #[test]
    fn test_parked_strand_resumes_on_send() {
        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
            ))))?;
            Ok(got)
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(strand.state(), StrandState::SuspendedInactive);
        strand.send(Value::Int(5));
        assert!(strand.has_exited());
        assert_eq!(capture.events(), vec![Signal::Send(Value::Int(5))]);
    }

    #[test]
    fn test_parked_strand_resumes_on_throw() {
        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
            ))))?;
            Ok(got)
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        strand.throw(StrandError::failure("delivery failed"));
        assert_eq!(
            capture.events(),
            vec![Signal::Throw(StrandError::failure("delivery failed"))]
        );
    }

    #[test]
    fn test_send_and_throw_after_exit_are_noops() {
        let strand = spawn(Entry::from_fn(|_yielder, _input| Ok(Value::Int(1))));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert!(strand.has_exited());
        strand.send(Value::Int(2));
        strand.throw(StrandError::failure("late"));
        assert_eq!(capture.events(), vec![Signal::Send(Value::Int(1))]);
        assert_eq!(strand.result(), Some(Signal::Send(Value::Int(1))));
    }

    #[test]
    fn test_terminate_discards_stack_and_notifies() {
        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
            ))))?;
            Ok(got)
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();

        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            strand.set_terminator(Some(Box::new(move |_strand| {
                fired.fetch_add(1, Ordering::SeqCst);
            })));
        }
        strand.terminate();

        assert_eq!(fired.load(Ordering::SeqCst), 1, "terminator fired once");
        assert_eq!(
            capture.events(),
            vec![Signal::Throw(StrandError::Terminated(StrandId(1)))]
        );
        // Terminate again, then resume: all no-ops.
        strand.terminate();
        strand.send(Value::Int(1));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(capture.events().len(), 1);
    }

    #[test]
    fn test_terminator_cleared_on_resume() {
        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
            ))))?;
            Ok(got)
        }));
        strand.start();

        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            strand.set_terminator(Some(Box::new(move |_strand| {
                fired.fetch_add(1, Ordering::SeqCst);
            })));
        }
        // Resuming clears the hook before the frame runs.
        strand.send(Value::Null);
        assert!(strand.has_exited());
        assert_eq!(fired.load(Ordering::SeqCst), 0, "stale hook never fired");
    }

    #[test]
    fn test_set_terminator_none_clears() {
        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
            ))))?;
            Ok(got)
        }));
        strand.start();

        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            strand.set_terminator(Some(Box::new(move |_strand| {
                fired.fetch_add(1, Ordering::SeqCst);
            })));
        }
        strand.set_terminator(None);
        strand.terminate();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_self_termination_from_running_frame() {
        let slot: Arc<Mutex<Option<Strand>>> = Arc::new(Mutex::new(None));
        let strand = {
            let slot = slot.clone();
            spawn(Entry::from_fn(move |_yielder, _input| {
                let me = slot.lock().clone().expect("own handle installed");
                me.terminate();
                // The rest of the invocation is discarded; this return value
                // never becomes the result.
                Ok(Value::Int(9))
            }))
        };
        *slot.lock() = Some(strand.clone());
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(
            capture.events(),
            vec![Signal::Throw(StrandError::Terminated(StrandId(1)))]
        );
        assert_eq!(
            strand.result(),
            Some(Signal::Throw(StrandError::Terminated(StrandId(1))))
        );
    }

    #[test]
    fn test_linked_cascade() {
        let parked = |yielder: &FrameYielder, _input: ResumeResult| {
            let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
            ))))?;
            Ok(got)
        };
        let a = spawn_id(1, Entry::from_fn(parked));
        let b = spawn_id(2, Entry::from_fn(parked));
        let c = spawn_id(3, Entry::from_fn(parked));
        a.start();
        b.start();
        c.start();
        a.link(&b);
        b.link(&c);

        let b_capture = Arc::new(Capture::default());
        b.await_completion(b_capture.clone());

        a.terminate();
        assert!(b.has_exited(), "direct link terminated");
        assert_eq!(
            b_capture.events(),
            vec![Signal::Throw(StrandError::Terminated(StrandId(2)))]
        );
        // B's own exit carried the cascade on to its link.
        assert!(c.has_exited());
    }

    #[test]
    fn test_unlink_prevents_cascade() {
        let parked = |yielder: &FrameYielder, _input: ResumeResult| {
            let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
            ))))?;
            Ok(got)
        };
        let a = spawn_id(1, Entry::from_fn(parked));
        let b = spawn_id(2, Entry::from_fn(parked));
        let c = spawn_id(3, Entry::from_fn(parked));
        a.start();
        b.start();
        c.start();
        a.link(&b);
        b.link(&c);
        b.unlink(&c);

        a.terminate();
        assert!(b.has_exited());
        assert!(!c.has_exited(), "unlinked strand survives the cascade");
    }

    #[test]
    fn test_link_is_unidirectional() {
        let parked = |yielder: &FrameYielder, _input: ResumeResult| {
            let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
            ))))?;
            Ok(got)
        };
        let a = spawn_id(1, Entry::from_fn(parked));
        let b = spawn_id(2, Entry::from_fn(parked));
        a.start();
        b.start();
        a.link(&b);

        b.terminate();
        assert!(!a.has_exited(), "link points from a to b only");
        a.terminate();
        assert!(a.has_exited());
    }

    #[test]
    fn test_primary_listener_handoff() {
        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
            ))))?;
            Ok(got)
        }));
        strand.start();

        let l1 = Arc::new(Capture::default());
        let l2 = Arc::new(Capture::default());
        // Displacing the kernel is silent; displacing l1 is not.
        strand.set_primary_listener(l1.clone());
        assert!(l1.events().is_empty());
        strand.set_primary_listener(l2.clone());
        assert_eq!(
            l1.events(),
            vec![Signal::Throw(StrandError::PrimaryListenerRemoved(StrandId(
                1
            )))]
        );

        strand.send(Value::from("finished"));
        assert_eq!(l2.events(), vec![Signal::Send(Value::from("finished"))]);
        // l1 saw the removal exactly once and nothing else.
        assert_eq!(l1.events().len(), 1);
    }

    #[test]
    fn test_set_primary_after_exit_notifies_immediately() {
        let strand = spawn(Entry::from_fn(|_yielder, _input| Ok(Value::Int(11))));
        strand.start();
        assert!(strand.has_exited());

        let late = Arc::new(Capture::default());
        strand.set_primary_listener(late.clone());
        assert_eq!(late.events(), vec![Signal::Send(Value::Int(11))]);
    }

    #[test]
    fn test_clear_primary_listener_is_silent() {
        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
            ))))?;
            Ok(got)
        }));
        strand.start();

        let l1 = Arc::new(Capture::default());
        strand.set_primary_listener(l1.clone());
        strand.clear_primary_listener();
        strand.send(Value::Null);
        assert!(strand.has_exited());
        // The displaced listener was not notified of anything.
        assert!(l1.events().is_empty());
    }

    #[test]
    fn test_await_after_exit_notifies_immediately() {
        let strand = spawn(Entry::from_fn(|_yielder, _input| {
            Err(StrandError::failure("went wrong"))
        }));
        strand.start();

        let late = Arc::new(Capture::default());
        strand.await_completion(late.clone());
        assert_eq!(
            late.events(),
            vec![Signal::Throw(StrandError::failure("went wrong"))]
        );
    }

    #[test]
    fn test_each_listener_notified_exactly_once() {
        let strand = spawn(Entry::from_fn(|_yielder, _input| Ok(Value::Int(1))));
        let first = Arc::new(Capture::default());
        let second = Arc::new(Capture::default());
        strand.await_completion(first.clone());
        strand.await_completion(second.clone());
        strand.start();
        assert_eq!(first.events().len(), 1);
        assert_eq!(second.events().len(), 1);
    }

    #[test]
    fn test_listener_failure_skips_later_listeners() {
        let strand = spawn(Entry::from_fn(|_yielder, _input| Ok(Value::Int(1))));
        let skipped = Arc::new(Capture::default());
        strand.await_completion(Arc::new(Rejecting));
        strand.await_completion(skipped.clone());
        strand.start();
        assert!(strand.has_exited());
        assert!(
            skipped.events().is_empty(),
            "listeners after the failing one are skipped"
        );
    }

    #[test]
    fn test_strand_awaitable_wakes_waiter() {
        let producer = spawn_id(
            1,
            Entry::from_fn(|yielder, _input| {
                let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                    |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
                ))))?;
                Ok(got)
            }),
        );
        producer.start();

        let consumer = {
            let producer = producer.clone();
            spawn_id(
                2,
                Entry::from_fn(move |yielder, _input| {
                    let got = yielder.suspend(YieldValue::Awaitable(producer.awaitable()))?;
                    Ok(got)
                }),
            )
        };
        let capture = Arc::new(Capture::default());
        consumer.await_completion(capture.clone());
        consumer.start();
        assert_eq!(consumer.state(), StrandState::SuspendedInactive);

        producer.send(Value::from("produced"));
        assert!(producer.has_exited());
        assert!(consumer.has_exited());
        assert_eq!(capture.events(), vec![Signal::Send(Value::from("produced"))]);
    }

    #[test]
    fn test_strand_awaitable_forwards_errors() {
        let producer = spawn_id(
            1,
            Entry::from_fn(|yielder, _input| {
                let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                    |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
                ))))?;
                Ok(got)
            }),
        );
        producer.start();

        let consumer = {
            let producer = producer.clone();
            spawn_id(
                2,
                Entry::from_fn(move |yielder, _input| {
                    let got = yielder.suspend(YieldValue::Awaitable(producer.awaitable()))?;
                    Ok(got)
                }),
            )
        };
        let capture = Arc::new(Capture::default());
        consumer.await_completion(capture.clone());
        consumer.start();

        producer.terminate();
        assert_eq!(
            capture.events(),
            vec![Signal::Throw(StrandError::Terminated(StrandId(1)))]
        );
    }

    #[test]
    fn test_trace_coroutine_record_resumes_transparently() {
        use crate::frame::CoroutineSite;

        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let resumed = yielder.suspend(YieldValue::Trace(TraceRecord::Coroutine(
                CoroutineSite::new("worker", "app.rs", 21),
            )))?;
            if !resumed.is_null() {
                return Err(StrandError::failure("expected transparent null resume"));
            }
            Ok(Value::from("instrumented"))
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(
            capture.events(),
            vec![Signal::Send(Value::from("instrumented"))]
        );
        #[cfg(feature = "frame-trace")]
        {
            let trace = strand.trace().expect("trace captured on completion");
            assert_eq!(
                trace.coroutine,
                Some(CoroutineSite::new("worker", "app.rs", 21))
            );
        }
    }

    #[test]
    fn test_trace_yield_record_unwraps_inner_value() {
        use crate::frame::YieldSite;

        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let echoed = yielder.suspend(YieldValue::Trace(TraceRecord::Yield {
                site: YieldSite::new("app.rs", 34),
                value: Box::new(YieldValue::Value(Value::Int(8))),
            }))?;
            Ok(echoed)
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        assert_eq!(capture.events(), vec![Signal::Send(Value::Int(8))]);
        #[cfg(feature = "frame-trace")]
        {
            let trace = strand.trace().expect("trace captured on completion");
            assert_eq!(trace.last_yield, Some(YieldSite::new("app.rs", 34)));
        }
    }

    #[test]
    fn test_state_machine_observable_points() {
        let strand = spawn(Entry::from_fn(|yielder, _input| {
            let got = yielder.suspend(YieldValue::Awaitable(Box::new(FnAwaitable(
                |_strand: &Strand, _api: &Arc<dyn Api>| Ok(()),
            ))))?;
            Ok(got)
        }));
        assert_eq!(strand.state(), StrandState::Ready);
        strand.start();
        assert_eq!(strand.state(), StrandState::SuspendedInactive);
        strand.send(Value::Null);
        assert_eq!(strand.state(), StrandState::Exited);
    }

    #[test]
    fn test_panicking_frame_exits_with_throw() {
        let strand = spawn(Entry::from_fn(|_yielder, _input| -> ResumeResult {
            panic!("frame exploded")
        }));
        let capture = Arc::new(Capture::default());
        strand.await_completion(capture.clone());
        strand.start();
        match capture.events().as_slice() {
            [Signal::Throw(StrandError::Panicked(message))] => {
                assert!(message.contains("frame exploded"), "message: {message}");
            }
            other => panic!("expected a single Panicked throw, got {other:?}"),
        }
    }

    #[test]
    fn test_strand_handle_identity() {
        let strand = spawn(Entry::from_fn(|_yielder, _input| Ok(Value::Null)));
        let other = spawn_id(2, Entry::from_fn(|_yielder, _input| Ok(Value::Null)));
        let alias = strand.clone();
        assert_eq!(strand, alias);
        assert_ne!(strand, other);
        assert_eq!(strand.id(), StrandId(1));
        assert!(strand.kernel().is_none(), "no kernel attached in this test");
    }
}

//! Strand runtime library.
//!
//! A *strand* is a lightweight task whose body is a stack of suspendable
//! coroutines. The engine multiplexes many strands onto a single-threaded
//! event loop: each strand advances by feeding values into its top frame,
//! interpreting the values it yields, and propagating results and errors up
//! the strand's logical call stack.
//!
//! ## Architecture
//!
//! - **Frame** ([`frame`]): one level of a strand's call stack, a corosensei
//!   stackful coroutine resumed with a value or an error and observed as
//!   yielded, returned, or failed.
//! - **Yield taxonomy** ([`yield_value`]): the closed set of values a frame
//!   may yield, each with a fixed dispatch rule.
//! - **Strand** ([`strand`]): the control block and interpreter: state
//!   machine, dispatch, termination, listeners, and links.
//! - **Kernel** ([`kernel`]): strand ids, the strand table, and the tick
//!   loop with virtual-clock timers; the default primary listener.
//! - **Api** ([`api`]): the yield-dispatch collaborator, with [`SystemApi`]
//!   as the reference implementation over the kernel loop.
//!
//! ## Concurrency model
//!
//! Single-threaded and cooperative: all strand manipulation and all loop
//! callbacks run on one thread, and a frame gives up control only at its
//! explicit yield points. Strands are shared by reference with listeners,
//! awaitables, and linked strands; the interpreter is never re-entered. A
//! resume that arrives mid-dispatch is queued and picked up by the in-flight
//! interpreter loop.

pub mod api;
pub mod awaitable;
pub mod error;
pub mod frame;
pub mod kernel;
pub mod listener;
pub mod strand;
pub mod value;
pub mod yield_value;

pub use api::{Api, ApiCall, SystemApi};
pub use awaitable::{Awaitable, AwaitableProvider, CoroutineProvider, FnAwaitable};
pub use error::StrandError;
pub use frame::{
    CoroutineFrame, CoroutineSite, FrameBody, FrameStep, FrameTrace, FrameYielder, ResumeResult,
    YieldSite, DEFAULT_STACK_SIZE,
};
pub use kernel::Kernel;
pub use listener::Listener;
pub use strand::{Entry, Signal, Strand, StrandId, StrandState, TerminatorHook};
pub use value::Value;
pub use yield_value::{TraceRecord, YieldValue};

//! The yield-dispatch API contract and the reference system API.
//!
//! When a frame yields a named operation, the strand delegates to its `Api`
//! collaborator. The API either returns a coroutine frame to push, or
//! arranges an eventual `send`/`throw` on the strand (installing a
//! terminator when the arrangement reserves event-loop resources), or
//! resumes the strand synchronously before returning.
//!
//! `SystemApi` implements the value-argument operations over the kernel
//! loop. Operations whose arguments are coroutines are expressed through
//! nested coroutines and awaitables instead of named calls.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::error::StrandError;
use crate::frame::CoroutineFrame;
use crate::kernel::KernelShared;
use crate::strand::{Strand, StrandId};
use crate::value::Value;

// ---------------------------------------------------------------------------
// ApiCall
// ---------------------------------------------------------------------------

/// A named API operation with value arguments, yielded by a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub name: String,
    pub args: Vec<Value>,
}

impl ApiCall {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        ApiCall {
            name: name.into(),
            args,
        }
    }
}

// ---------------------------------------------------------------------------
// Api
// ---------------------------------------------------------------------------

/// The strand's yield-dispatch collaborator.
pub trait Api {
    /// Dispatch a named operation yielded by `strand`.
    ///
    /// Return `Some(frame)` to push a nested frame, or `None` when the
    /// operation has arranged its own resumption (or none at all). Errors
    /// are fed back into the yielding frame as a thrown resume.
    fn call(&self, strand: &Strand, call: ApiCall) -> Result<Option<CoroutineFrame>, StrandError>;

    /// Fallback for yielded values with no built-in dispatch rule.
    ///
    /// `key` is the key half of a keyed yield where the frame supports one;
    /// frames without keyed yields pass `None`.
    fn dispatch_value(
        &self,
        strand: &Strand,
        key: Option<Value>,
        value: Value,
    ) -> Result<(), StrandError>;
}

// ---------------------------------------------------------------------------
// SystemApi
// ---------------------------------------------------------------------------

/// The reference API over the kernel event loop.
///
/// Operations:
///
/// - `cooperate`: resume with null on the next tick
/// - `sleep seconds`: resume with null after the delay; a non-positive delay
///   behaves like `cooperate`; a terminator cancels the pending timer
/// - `strand`: resume synchronously with the caller's id
/// - `terminate`: terminate the calling strand
/// - `stop`: halt the kernel loop; the caller stays parked
/// - `link id` / `unlink id`: link the caller to the named strand, then
///   resume with null
pub struct SystemApi {
    kernel: Weak<KernelShared>,
}

impl SystemApi {
    pub(crate) fn new(kernel: Weak<KernelShared>) -> Self {
        SystemApi { kernel }
    }

    fn kernel(&self) -> Result<Arc<KernelShared>, StrandError> {
        self.kernel
            .upgrade()
            .ok_or_else(|| StrandError::failure("kernel is gone"))
    }

    fn target_arg(&self, call: &ApiCall) -> Result<Strand, StrandError> {
        let id = match call.args.first() {
            Some(Value::Int(n)) if *n >= 0 => StrandId(*n as u64),
            other => {
                return Err(StrandError::failure(format!(
                    "{} expects a strand id, got {}",
                    call.name,
                    other.map(Value::type_name).unwrap_or("nothing")
                )))
            }
        };
        self.kernel()?
            .strand_by_id(id)
            .ok_or_else(|| StrandError::failure(format!("no live strand {id}")))
    }
}

impl Api for SystemApi {
    fn call(&self, strand: &Strand, call: ApiCall) -> Result<Option<CoroutineFrame>, StrandError> {
        match call.name.as_str() {
            "cooperate" => {
                let kernel = self.kernel()?;
                let resumed = strand.clone();
                kernel.defer(Box::new(move || resumed.send(Value::Null)));
                Ok(None)
            }
            "sleep" => {
                let seconds = numeric_arg(&call)?;
                if !seconds.is_finite() {
                    return Err(StrandError::failure("sleep expects a finite delay"));
                }
                let kernel = self.kernel()?;
                let resumed = strand.clone();
                if seconds <= 0.0 {
                    kernel.defer(Box::new(move || resumed.send(Value::Null)));
                } else {
                    let timer = kernel.schedule_timer(
                        Duration::from_secs_f64(seconds),
                        Box::new(move || resumed.send(Value::Null)),
                    );
                    // If the strand is killed before the timer fires, the
                    // timer must not outlive it.
                    let canceller = self.kernel.clone();
                    strand.set_terminator(Some(Box::new(move |_strand| {
                        if let Some(kernel) = canceller.upgrade() {
                            kernel.cancel_timer(timer);
                        }
                    })));
                }
                Ok(None)
            }
            "strand" => {
                strand.send(Value::Int(strand.id().as_u64() as i64));
                Ok(None)
            }
            "terminate" => {
                strand.terminate();
                Ok(None)
            }
            "stop" => {
                self.kernel()?.stop();
                Ok(None)
            }
            "link" | "unlink" => {
                let target = self.target_arg(&call)?;
                if call.name == "link" {
                    strand.link(&target);
                } else {
                    strand.unlink(&target);
                }
                strand.send(Value::Null);
                Ok(None)
            }
            _ => Err(StrandError::UnknownOperation(call.name.clone())),
        }
    }

    fn dispatch_value(
        &self,
        _strand: &Strand,
        _key: Option<Value>,
        value: Value,
    ) -> Result<(), StrandError> {
        Err(StrandError::UnexpectedValue(format!(
            "{} ({})",
            value,
            value.type_name()
        )))
    }
}

fn numeric_arg(call: &ApiCall) -> Result<f64, StrandError> {
    match call.args.first() {
        Some(Value::Int(n)) => Ok(*n as f64),
        Some(Value::Float(x)) => Ok(*x),
        other => Err(StrandError::failure(format!(
            "{} expects a numeric delay, got {}",
            call.name,
            other.map(Value::type_name).unwrap_or("nothing")
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! The reference kernel: strand creation, the tick loop, and timers.
//!
//! The kernel allocates strand ids, owns the strand table, and drives a
//! single-threaded event loop: a FIFO queue of deferred callbacks plus a
//! timer heap against a virtual monotonic clock. When the queue is empty the
//! clock jumps to the earliest pending deadline, which keeps timer behavior
//! deterministic; wall-clock pacing belongs to an outer integration.
//!
//! As the default primary listener of every strand it creates, the kernel
//! applies the failure policy: an error completion becomes `StrandFailed`
//! (except a strand's own `Terminated`, which is clean), a failing listener
//! surfaces as `ListenerFailed`, and the first recorded failure interrupts
//! `run`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::api::{Api, SystemApi};
use crate::error::StrandError;
use crate::strand::{Entry, Signal, Strand, StrandId};

/// A deferred callback on the kernel loop.
pub(crate) type Tick = Box<dyn FnOnce()>;

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

/// Identifies a pending timer for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TimerId(u64);

/// Heap entry: earliest deadline first, then registration order.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct TimerSlot {
    deadline: Duration,
    id: TimerId,
}

/// Pending timers. Cancellation removes the callback and leaves a stale heap
/// entry behind; the loop skips entries with no callback.
struct Timers {
    heap: BinaryHeap<Reverse<TimerSlot>>,
    callbacks: FxHashMap<TimerId, Tick>,
    next: u64,
}

impl Timers {
    fn new() -> Self {
        Timers {
            heap: BinaryHeap::new(),
            callbacks: FxHashMap::default(),
            next: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// KernelShared
// ---------------------------------------------------------------------------

pub(crate) struct KernelShared {
    api: Arc<dyn Api>,
    next_id: AtomicU64,
    /// Live strands by id; entries are reaped as strands exit.
    strands: Mutex<FxHashMap<StrandId, Strand>>,
    /// FIFO queue of deferred callbacks.
    queue: Mutex<VecDeque<Tick>>,
    timers: Mutex<Timers>,
    /// Virtual monotonic clock, advanced to timer deadlines.
    clock: Mutex<Duration>,
    /// First recorded failure; interrupts `run`.
    failure: Mutex<Option<StrandError>>,
    stopped: AtomicBool,
}

impl KernelShared {
    fn new(api: Arc<dyn Api>) -> Self {
        KernelShared {
            api,
            next_id: AtomicU64::new(1),
            strands: Mutex::new(FxHashMap::default()),
            queue: Mutex::new(VecDeque::new()),
            timers: Mutex::new(Timers::new()),
            clock: Mutex::new(Duration::ZERO),
            failure: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub(crate) fn defer(&self, tick: Tick) {
        self.queue.lock().push_back(tick);
    }

    pub(crate) fn schedule_timer(&self, delay: Duration, tick: Tick) -> TimerId {
        let now = *self.clock.lock();
        let mut timers = self.timers.lock();
        let id = TimerId(timers.next);
        timers.next += 1;
        timers.heap.push(Reverse(TimerSlot {
            deadline: now + delay,
            id,
        }));
        timers.callbacks.insert(id, tick);
        id
    }

    pub(crate) fn cancel_timer(&self, id: TimerId) {
        self.timers.lock().callbacks.remove(&id);
    }

    /// Pop the earliest live timer, advancing the clock to its deadline.
    fn pop_due_timer(&self) -> Option<Tick> {
        let mut timers = self.timers.lock();
        while let Some(Reverse(slot)) = timers.heap.pop() {
            if let Some(tick) = timers.callbacks.remove(&slot.id) {
                drop(timers);
                let mut clock = self.clock.lock();
                if *clock < slot.deadline {
                    *clock = slot.deadline;
                }
                return Some(tick);
            }
        }
        None
    }

    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub(crate) fn strand_by_id(&self, id: StrandId) -> Option<Strand> {
        self.strands.lock().get(&id).cloned()
    }

    /// Kernel-as-primary-listener: apply the failure policy to a completed
    /// strand. A strand terminated by design is a clean outcome.
    pub(crate) fn strand_completed(&self, strand: &Strand, signal: &Signal) {
        if let Signal::Throw(error) = signal {
            if matches!(error, StrandError::Terminated(id) if *id == strand.id()) {
                return;
            }
            self.record_failure(StrandError::StrandFailed {
                strand: strand.id(),
                cause: Box::new(error.clone()),
            });
        }
    }

    pub(crate) fn listener_failed(&self, error: StrandError) {
        self.record_failure(error);
    }

    fn record_failure(&self, error: StrandError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(error);
        }
    }

    pub(crate) fn reap(&self, id: StrandId) {
        self.strands.lock().remove(&id);
    }
}

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

/// A handle to the kernel; clones share the same loop and strand table.
#[derive(Clone)]
pub struct Kernel {
    shared: Arc<KernelShared>,
}

impl Kernel {
    /// Create a kernel wired to the reference [`SystemApi`].
    pub fn new() -> Self {
        let shared = Arc::new_cyclic(|weak| {
            KernelShared::new(Arc::new(SystemApi::new(weak.clone())))
        });
        Kernel { shared }
    }

    /// Create a kernel whose strands dispatch through a custom API.
    pub fn with_api(api: Arc<dyn Api>) -> Self {
        Kernel {
            shared: Arc::new(KernelShared::new(api)),
        }
    }

    pub(crate) fn from_shared(shared: Arc<KernelShared>) -> Self {
        Kernel { shared }
    }

    /// Create a strand from an entry point and queue its first run on the
    /// next tick.
    pub fn execute(&self, entry: impl Into<Entry>) -> Result<Strand, StrandError> {
        let id = StrandId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let strand = Strand::new(
            Arc::downgrade(&self.shared),
            self.shared.api.clone(),
            id,
            entry.into(),
        )?;
        self.shared.strands.lock().insert(id, strand.clone());
        let queued = strand.clone();
        self.shared.defer(Box::new(move || queued.start()));
        Ok(strand)
    }

    /// Drive the loop until it is quiescent, stopped, or a failure is
    /// recorded.
    ///
    /// Deferred callbacks run in FIFO order; when the queue is empty the
    /// earliest pending timer fires, advancing the virtual clock to its
    /// deadline.
    pub fn run(&self) -> Result<(), StrandError> {
        loop {
            if let Some(error) = self.shared.failure.lock().take() {
                return Err(error);
            }
            if self.shared.stopped.swap(false, Ordering::SeqCst) {
                return Ok(());
            }
            let tick = self.shared.queue.lock().pop_front();
            if let Some(tick) = tick {
                tick();
                continue;
            }
            match self.shared.pop_due_timer() {
                Some(tick) => tick(),
                None => return Ok(()),
            }
        }
    }

    /// Halt the loop after the current callback.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Look up a live strand by id.
    pub fn strand(&self, id: StrandId) -> Option<Strand> {
        self.shared.strand_by_id(id)
    }

    /// Number of live strands.
    pub fn strand_count(&self) -> usize {
        self.shared.strands.lock().len()
    }

    /// The virtual clock's current reading.
    pub fn now(&self) -> Duration {
        *self.shared.clock.lock()
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("strands", &self.strand_count())
            .field("now", &self.now())
            .field("stopped", &self.shared.stopped.load(Ordering::Relaxed))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

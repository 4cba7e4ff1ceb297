//! Per-context backtrace state.
//!
//! Every logical thread of control owns one [`ExecutionContext`]. Nothing in
//! it is shared: when a carrier thread switches to running another context,
//! the scheduler moves or [`migrate`](ExecutionContext::migrate)s the state,
//! it never hands out two references to it.
//!
//! Raise-time capture must be cheap and must not call back into the managed
//! heap. It only touches the context's own slot buffer, which lives inline or
//! on the system allocator.


use crate::buffer::{SlotBuffer, BACKTRACE_BUFFER_SIZE};
use crate::config::Config;
use crate::slot::{Backend, BackendMismatch, ExnId, RawBacktrace, Slot};
use crate::walk::FrameWalker;

/// Decides whether a raise continues the trace of the previous one.
pub trait ReraisePolicy {
    /// `last` is the exception recorded by the previous raise. `reraise` is
    /// the raiser's own claim, when it makes one.
    fn continues(&self, last: Option<ExnId>, raised: ExnId, reraise: Option<bool>) -> bool;
}

/// A raise continues the trace if it raises the very same value again.
///
/// This is best effort. Exceptions without arguments are shared constants, so
/// two unrelated raises of one such exception look like a re-raise. An
/// explicit `reraise = Some(false)` always starts over.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhysicalIdentity;

impl ReraisePolicy for PhysicalIdentity {
    fn continues(&self, last: Option<ExnId>, raised: ExnId, reraise: Option<bool>) -> bool {
        reraise != Some(false) && last == Some(raised)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionContext<P = PhysicalIdentity> {
    backend: Backend,
    active: bool,
    buffer: SlotBuffer,
    /// Only meaningful while `active`.
    last_exn: Option<ExnId>,
    max_slots: usize,
    policy: P,
}

impl ExecutionContext {
    /// A context that does not record yet.
    pub fn new(backend: Backend) -> Self {
        Self::with_policy(backend, PhysicalIdentity)
    }

    pub fn with_config(backend: Backend, config: &Config) -> Self {
        let mut ctx = Self::new(backend);
        ctx.max_slots = config.max_slots;
        ctx.set_recording(config.record_backtraces);
        ctx
    }
}

impl<P: ReraisePolicy> ExecutionContext<P> {
    pub fn with_policy(backend: Backend, policy: P) -> Self {
        Self {
            backend,
            active: false,
            buffer: SlotBuffer::new(),
            last_exn: None,
            max_slots: BACKTRACE_BUFFER_SIZE,
            policy,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Turns recording on or off. Either way the context starts from a clean
    /// buffer and forgets the last exception.
    ///
    /// Safe to call before the managed heap exists: nothing is allocated here.
    pub fn set_recording(&mut self, enabled: bool) {
        if self.active != enabled {
            debug!(enabled, "backtrace recording toggled");
        }
        self.active = enabled;
        self.buffer.clear();
        self.last_exn = None;
    }

    pub fn is_recording(&self) -> bool {
        self.active
    }

    /// Number of slots captured for the current exception.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    pub fn last_exception(&self) -> Option<ExnId> {
        self.last_exn
    }

    /// Forgets the captured slots but not the last exception. Compiled code
    /// calls this on a fresh raise instead of passing a flag.
    pub fn reset_position(&mut self) {
        self.buffer.clear();
    }

    /// Records the frames `walker` yields for a raise of `exn`.
    ///
    /// A re-raise of the exception already being recorded (as judged by the
    /// policy) appends to the trace; anything else starts a new one. Does
    /// nothing while recording is off.
    pub fn stash<W: FrameWalker>(&mut self, exn: ExnId, walker: W, reraise: Option<bool>) {
        if !self.active {
            return;
        }
        if let Err(err) = self.backend.check(walker.backend()) {
            error!("not recording backtrace: {err}");
            return;
        }

        if !self.policy.continues(self.last_exn, exn, reraise) {
            self.buffer.clear();
        }
        self.last_exn = Some(exn);
        let stored = self.buffer.fill(walker, self.max_slots);
        trace!(?exn, stored, len = self.buffer.len(), "stashed backtrace");
    }

    /// Captures up to `max_slots` frames of the whole logical call chain into
    /// `buffer`, replacing its contents. With an `alloc_index`, slot 0 is the
    /// allocation point the walk starts at.
    ///
    /// Independent of recording: neither the context's exception trace nor
    /// its last exception are touched. Returns the number of slots captured.
    pub fn get_callstack<W: FrameWalker>(
        &self,
        mut walker: W,
        max_slots: usize,
        buffer: &mut SlotBuffer,
        alloc_index: Option<u32>,
    ) -> usize {
        buffer.clear();
        if let Err(err) = self.backend.check(walker.backend()) {
            error!("not capturing call stack: {err}");
            return 0;
        }

        if let Some(index) = alloc_index {
            if let Some(at) = walker.alloc_site() {
                let slot = Slot::Alloc {
                    backend: self.backend,
                    at,
                    index,
                };
                if buffer.push(slot, max_slots).is_err() {
                    return buffer.len();
                }
            }
        }
        buffer.fill(walker, max_slots);
        buffer.len()
    }

    /// Like [`get_callstack`](Self::get_callstack), into a frozen copy.
    pub fn snapshot_callstack<W: FrameWalker>(
        &self,
        walker: W,
        max_slots: usize,
        alloc_index: Option<u32>,
    ) -> RawBacktrace {
        let mut buffer = SlotBuffer::new();
        self.get_callstack(walker, max_slots, &mut buffer, alloc_index);
        RawBacktrace::copy_from(self.backend, buffer.as_slice())
    }

    /// A copy of the trace recorded for the current exception. Empty while
    /// recording is off.
    pub fn exception_backtrace(&self) -> RawBacktrace {
        RawBacktrace::copy_from(self.backend, self.buffer.as_slice())
    }

    /// Makes `backtrace` the recorded trace of `exn`, as if `exn` had been
    /// raised along it. A later re-raise of `exn` appends to it.
    pub fn restore_backtrace(
        &mut self,
        exn: ExnId,
        backtrace: &RawBacktrace,
    ) -> Result<(), BackendMismatch> {
        self.backend.check(backtrace.backend())?;
        if !self.active {
            return Ok(());
        }

        self.buffer.clear();
        self.last_exn = Some(exn);
        let frames = backtrace.iter().filter(|slot| !slot.is_alloc());
        let stored = self.buffer.fill(frames, self.max_slots);
        if stored < backtrace.len() {
            debug!(stored, len = backtrace.len(), "restored backtrace truncated");
        }
        Ok(())
    }
}

impl<P: ReraisePolicy + Clone> ExecutionContext<P> {
    /// A copy of this context's state for another carrier. The two never
    /// share a buffer.
    pub fn migrate(&self) -> Self {
        self.clone()
    }
}

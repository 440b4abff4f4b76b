use derive_new::new;
use std::collections::VecDeque;
use strum_macros::Display;

use crate::envelope::Envelope;
use crate::time::NanoTime;

/// The queueing discipline applied to an input port's pending envelopes.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum BufferKind {
    /// Bounded queue, oldest first.
    Fifo,
    /// Bounded stack, newest first.
    Lifo,
    /// Single slot; always returns the latest envelope.
    LastValue,
}

/// Which limit, if any, bounds an input buffer.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum LimitKind {
    None,
    Count,
    Memory,
    CountAndMemory,
}

/// Size limits for one input buffer.  The default caps memory at 50MB
/// and leaves the item count unbounded.
#[derive(new, Clone, Copy, Debug)]
pub struct BufferLimit {
    pub kind: LimitKind,
    pub max_len: usize,
    pub max_bytes: usize,
}

impl Default for BufferLimit {
    fn default() -> Self {
        Self::new(LimitKind::Memory, usize::MAX, 50 * 1024 * 1024)
    }
}

impl BufferLimit {
    pub fn unbounded() -> Self {
        Self::new(LimitKind::None, usize::MAX, usize::MAX)
    }

    pub fn count(max_len: usize) -> Self {
        Self::new(LimitKind::Count, max_len, usize::MAX)
    }

    pub fn memory(max_bytes: usize) -> Self {
        Self::new(LimitKind::Memory, usize::MAX, max_bytes)
    }

    fn caps(&self) -> (usize, usize) {
        match self.kind {
            LimitKind::None => (usize::MAX, usize::MAX),
            LimitKind::Count => (self.max_len, usize::MAX),
            LimitKind::Memory => (usize::MAX, self.max_bytes),
            LimitKind::CountAndMemory => (self.max_len, self.max_bytes),
        }
    }
}

/// Buffers envelopes arriving at one input port.
///
/// `pop` always returns *something* once anything was ever pushed: with no
/// pending envelope it replays the most recently returned one, so a node can
/// re-read a now-stale input without special-casing "no new data".  The
/// distinct "never received anything" state is visible through
/// [InputBuffer::status] returning `None`.
///
/// Overflow is silent, policy-ordered eviction, not an error: push never
/// blocks and never fails.  The newest pending envelope always survives
/// eviction, for every kind.
pub struct InputBuffer {
    kind: BufferKind,
    limit: BufferLimit,
    queue: VecDeque<Envelope>,
    bytes: usize,
    /// Most recently popped envelope, replayed while the queue is dry.
    last: Envelope,
    /// LastValue slot and its sticky freshness flag.
    current: Envelope,
    fresh: bool,
}

impl InputBuffer {
    pub fn new(kind: BufferKind, limit: BufferLimit) -> Self {
        Self {
            kind,
            limit,
            queue: VecDeque::new(),
            bytes: 0,
            last: Envelope::empty(),
            current: Envelope::empty(),
            fresh: false,
        }
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn limit(&self) -> BufferLimit {
        self.limit
    }

    /// Reconfigures the limits.  Already-buffered envelopes survive unless
    /// the new limit is immediately exceeded, in which case the oldest are
    /// dropped.
    pub fn set_limit(&mut self, limit: BufferLimit) {
        self.limit = limit;
        self.enforce();
    }

    /// Switches the queueing discipline, carrying pending envelopes across.
    pub fn set_kind(&mut self, kind: BufferKind) {
        if kind == self.kind {
            return;
        }
        let pending = self.take_pending();
        self.kind = kind;
        self.fresh = false;
        for env in pending {
            self.push(env);
        }
    }

    /// Inserts an envelope, evicting per policy order if a limit is
    /// exceeded.  Returns the pending count *before* the push.
    pub fn push(&mut self, env: Envelope) -> usize {
        if env.is_empty() {
            // the canonical no-data envelope is absent, not a sample
            return self.remaining();
        }
        match self.kind {
            BufferKind::LastValue => {
                let previous = self.fresh as usize;
                self.current = env;
                self.fresh = true;
                previous
            }
            BufferKind::Fifo | BufferKind::Lifo => {
                let previous = self.queue.len();
                self.bytes += env.memory_footprint();
                self.queue.push_back(env);
                self.enforce();
                previous
            }
        }
    }

    /// Removes and returns the next envelope per policy order, or replays
    /// the last returned one when nothing is pending.
    pub fn pop(&mut self) -> Envelope {
        match self.kind {
            BufferKind::LastValue => {
                self.fresh = false;
                self.current.clone()
            }
            BufferKind::Fifo => match self.queue.pop_front() {
                Some(env) => self.popped(env),
                None => self.last.clone(),
            },
            BufferKind::Lifo => match self.queue.pop_back() {
                Some(env) => self.popped(env),
                None => self.last.clone(),
            },
        }
    }

    /// Like [InputBuffer::pop] but never removes.
    pub fn peek(&self) -> Envelope {
        match self.kind {
            BufferKind::LastValue => self.current.clone(),
            BufferKind::Fifo => self.queue.front().cloned().unwrap_or_else(|| self.last.clone()),
            BufferKind::Lifo => self.queue.back().cloned().unwrap_or_else(|| self.last.clone()),
        }
    }

    /// Removes and returns everything pending, oldest to newest regardless
    /// of kind.
    pub fn drain_all(&mut self) -> Vec<Envelope> {
        match self.kind {
            BufferKind::LastValue => {
                if self.fresh {
                    self.fresh = false;
                    vec![self.current.clone()]
                } else {
                    Vec::new()
                }
            }
            BufferKind::Fifo | BufferKind::Lifo => {
                self.bytes = 0;
                let drained: Vec<Envelope> = self.queue.drain(..).collect();
                if let Some(newest) = drained.last() {
                    self.last = newest.clone();
                }
                drained
            }
        }
    }

    /// Clears all pending state and seeds exactly one envelope.
    pub fn reset(&mut self, env: Envelope) {
        self.queue.clear();
        self.bytes = 0;
        match self.kind {
            BufferKind::LastValue => {
                self.current = env;
                self.fresh = true;
            }
            BufferKind::Fifo | BufferKind::Lifo => {
                self.bytes = env.memory_footprint();
                self.queue.push_back(env);
            }
        }
    }

    pub fn has_new(&self) -> bool {
        match self.kind {
            BufferKind::LastValue => self.fresh,
            BufferKind::Fifo | BufferKind::Lifo => !self.queue.is_empty(),
        }
    }

    pub fn remaining(&self) -> usize {
        match self.kind {
            BufferKind::LastValue => self.fresh as usize,
            BufferKind::Fifo | BufferKind::Lifo => self.queue.len(),
        }
    }

    /// True until the first envelope is ever pushed.
    pub fn is_empty(&self) -> bool {
        match self.kind {
            BufferKind::LastValue => self.current.is_empty(),
            BufferKind::Fifo | BufferKind::Lifo => self.queue.is_empty() && self.last.is_empty(),
        }
    }

    /// Pending count, or `None` if nothing was ever received.
    pub fn status(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(self.remaining())
        }
    }

    /// Time of the envelope the next `pop` would return.
    pub fn next_time(&self) -> NanoTime {
        self.peek().time()
    }

    pub fn memory_footprint(&self) -> usize {
        match self.kind {
            BufferKind::LastValue => self.current.memory_footprint(),
            BufferKind::Fifo | BufferKind::Lifo => self.bytes,
        }
    }

    /// Removes all pending envelopes.  The stale-replay value survives.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.bytes = 0;
        self.fresh = false;
    }

    fn popped(&mut self, env: Envelope) -> Envelope {
        self.bytes = self.bytes.saturating_sub(env.memory_footprint());
        self.last = env.clone();
        env
    }

    fn take_pending(&mut self) -> Vec<Envelope> {
        match self.kind {
            BufferKind::LastValue => {
                if self.fresh {
                    vec![std::mem::take(&mut self.current)]
                } else {
                    Vec::new()
                }
            }
            BufferKind::Fifo | BufferKind::Lifo => {
                self.bytes = 0;
                self.queue.drain(..).collect()
            }
        }
    }

    fn enforce(&mut self) {
        let (cap_len, cap_bytes) = self.limit.caps();
        let mut dropped = 0usize;
        // evict oldest first; the newest pending envelope always survives
        while self.queue.len() > 1 && (self.queue.len() > cap_len || self.bytes > cap_bytes) {
            if let Some(old) = self.queue.pop_front() {
                self.bytes = self.bytes.saturating_sub(old.memory_footprint());
                dropped += 1;
            }
        }
        if dropped > 0 {
            trace!("input buffer dropped {dropped} envelopes ({})", self.kind);
        }
    }
}

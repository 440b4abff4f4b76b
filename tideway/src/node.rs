use crossbeam::channel::{Receiver, Sender, unbounded};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use std::time::{Duration, Instant};
use strum_macros::Display;
use thiserror::Error;

use crate::buffer::{BufferKind, BufferLimit};
use crate::connection::ConnectionId;
use crate::envelope::{AttributeMap, Envelope, SourceId};
use crate::graph::{GraphShared, NodeHandle};
use crate::ports::{InputSlot, OutputSlot, PortTable, PropertySlot, Schema, SchemaError};
use crate::time::NanoTime;

/// How many errors a node retains for diagnostics.
const ERROR_HISTORY: usize = 16;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Individual scheduling flags.  Combine them into [ScheduleStrategies]
/// with `|`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ScheduleStrategy {
    /// Fire only when every input holds fresh data since the last compute.
    /// Unset, one fresh input suffices.
    AllInputs = 0x01,
    /// Freshness on an input triggers the node by itself; unset, the
    /// application calls `trigger` explicitly (pull mode).
    Asynchronous = 0x02,
    /// In asynchronous mode, drop a trigger that arrives while a compute
    /// is already pending or running instead of queueing another.
    SkipIfBusy = 0x04,
    /// Fire even while some input never received data.
    AcceptEmptyInput = 0x08,
    /// A run that finds no fresh input on any of its inputs returns
    /// without computing.
    SkipIfNoInput = 0x10,
    /// Synchronous mode only: compute inline on the triggering thread
    /// instead of on the worker pool's stable threads.
    RunOnCallerThread = 0x20,
}

/// A bit set of [ScheduleStrategy] flags.
///
/// The default is a plain synchronous node: compute inline on the caller
/// thread, skip when nothing fresh arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleStrategies(u32);

impl ScheduleStrategies {
    pub const NONE: Self = Self(0);

    pub fn contains(&self, flag: ScheduleStrategy) -> bool {
        self.0 & flag as u32 != 0
    }

    pub fn with(mut self, flag: ScheduleStrategy, on: bool) -> Self {
        if on {
            self.0 |= flag as u32;
        } else {
            self.0 &= !(flag as u32);
        }
        self
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

impl Default for ScheduleStrategies {
    fn default() -> Self {
        ScheduleStrategy::SkipIfNoInput | ScheduleStrategy::RunOnCallerThread
    }
}

impl From<ScheduleStrategy> for ScheduleStrategies {
    fn from(flag: ScheduleStrategy) -> Self {
        Self(flag as u32)
    }
}

impl std::ops::BitOr for ScheduleStrategy {
    type Output = ScheduleStrategies;
    fn bitor(self, other: Self) -> ScheduleStrategies {
        ScheduleStrategies(self as u32 | other as u32)
    }
}

impl std::ops::BitOr<ScheduleStrategy> for ScheduleStrategies {
    type Output = ScheduleStrategies;
    fn bitor(self, other: ScheduleStrategy) -> ScheduleStrategies {
        ScheduleStrategies(self.0 | other as u32)
    }
}

/// Where a node currently sits in its scheduling lifecycle.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum NodeState {
    Idle,
    Pending,
    Running,
    Disabled,
}

/// Standard error identifiers recorded through the node error contract.
/// `User` opens the range for caller-defined codes.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ErrorCode {
    Runtime,
    InputBufferFull,
    WrongInputType,
    WrongInputCount,
    ConnectionNotOpen,
    DeviceNotOpen,
    Io,
    User(i32),
}

/// One recorded error: what, which kind, when.
#[derive(Clone, Debug, Error)]
#[error("{message} [{code}]")]
pub struct ErrorData {
    pub message: String,
    pub code: ErrorCode,
    pub time: NanoTime,
}

/// The failure a `compute` implementation reports.  It is recorded on the
/// node, never thrown across the scheduler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ComputeError {
    pub message: String,
    pub code: ErrorCode,
}

impl ComputeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Runtime, message)
    }
}

impl From<anyhow::Error> for ComputeError {
    fn from(err: anyhow::Error) -> Self {
        Self::runtime(format!("{err:#}"))
    }
}

impl From<String> for ComputeError {
    fn from(message: String) -> Self {
        Self::runtime(message)
    }
}

impl From<&str> for ComputeError {
    fn from(message: &str) -> Self {
        Self::runtime(message)
    }
}

/// Notifications a node emits; collect them with [NodeRef::subscribe].
#[derive(Clone, Debug)]
pub enum NodeEvent {
    /// A compute call finished (successfully or not).
    Done { elapsed: Duration },
    /// An error was recorded.
    ErrorSet { error: ErrorData },
    /// A connection on the named port closed.
    ConnectionClosed { port: String },
}

#[derive(Default)]
struct ErrorRecord {
    last: Option<ErrorData>,
    history: VecDeque<ErrorData>,
}

struct StatsInner {
    last_elapsed: Duration,
    last_run: NanoTime,
    rate: f64,
    count: u32,
    window_start: NanoTime,
}

/// Snapshot of a node's timing counters.
#[derive(Clone, Copy, Debug)]
pub struct NodeStats {
    /// Duration of the most recent compute call.
    pub last_elapsed: Duration,
    /// When the most recent compute call started.
    pub last_run: NanoTime,
    /// Smoothed computes per second.
    pub rate: f64,
}

/// The computation a node performs.
///
/// Read inputs and properties through the [NodeRef], publish results on the
/// outputs.  Do not block indefinitely.  Failures are returned, not
/// panicked: a panic is caught at the scheduler boundary and recorded as a
/// [ErrorCode::Runtime] error, but a returned [ComputeError] carries a
/// proper code.  Closures of the right shape implement this directly.
pub trait Compute: Send {
    fn compute(&mut self, node: &NodeRef) -> Result<(), ComputeError>;
}

impl<F> Compute for F
where
    F: FnMut(&NodeRef) -> Result<(), ComputeError> + Send,
{
    fn compute(&mut self, node: &NodeRef) -> Result<(), ComputeError> {
        self(node)
    }
}

/// Shared state of one node.  Lives in the graph arena (or privately inside
/// a [Sequence](crate::Sequence)); all access from application code goes
/// through [NodeRef].
pub(crate) struct NodeCell {
    pub(crate) name: String,
    pub(crate) type_tag: String,
    pub(crate) source_id: SourceId,
    pub(crate) handle: OnceLock<NodeHandle>,
    pub(crate) graph: OnceLock<Weak<GraphShared>>,
    this: OnceLock<Weak<NodeCell>>,
    enabled: AtomicBool,
    strategies: AtomicU32,
    pub(crate) priority: AtomicI32,
    pub(crate) ports: RwLock<PortTable>,
    compute: Mutex<Box<dyn Compute>>,
    pub(crate) pending: AtomicUsize,
    claimed: AtomicUsize,
    pub(crate) queued: AtomicBool,
    running: AtomicBool,
    // error record and timing counters are locked independently of the
    // buffers, reading an error never contends with a push
    error: Mutex<ErrorRecord>,
    stats: Mutex<StatsInner>,
    compute_stats: AtomicBool,
    attributes: Mutex<AttributeMap>,
    subscribers: Mutex<Vec<Sender<NodeEvent>>>,
    input_time: Mutex<NanoTime>,
    pub(crate) auto_remove: AtomicBool,
}

impl NodeCell {
    pub(crate) fn new(
        name: &str,
        type_tag: String,
        schema: &Schema,
        compute: Box<dyn Compute>,
        limit: BufferLimit,
    ) -> Result<Arc<Self>, SchemaError> {
        schema.validate()?;
        let ports = PortTable::from_schema(schema, limit);
        let cell = Arc::new(Self {
            name: name.to_string(),
            type_tag,
            source_id: SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed)),
            handle: OnceLock::new(),
            graph: OnceLock::new(),
            this: OnceLock::new(),
            enabled: AtomicBool::new(true),
            strategies: AtomicU32::new(ScheduleStrategies::default().bits()),
            priority: AtomicI32::new(0),
            ports: RwLock::new(ports),
            compute: Mutex::new(compute),
            pending: AtomicUsize::new(0),
            claimed: AtomicUsize::new(0),
            queued: AtomicBool::new(false),
            running: AtomicBool::new(false),
            error: Mutex::new(ErrorRecord::default()),
            stats: Mutex::new(StatsInner {
                last_elapsed: Duration::ZERO,
                last_run: NanoTime::INVALID,
                rate: 0.0,
                count: 0,
                window_start: NanoTime::INVALID,
            }),
            compute_stats: AtomicBool::new(true),
            attributes: Mutex::new(AttributeMap::new()),
            subscribers: Mutex::new(Vec::new()),
            input_time: Mutex::new(NanoTime::INVALID),
            auto_remove: AtomicBool::new(false),
        });
        let _ = cell.this.set(Arc::downgrade(&cell));
        Ok(cell)
    }

    pub(crate) fn bind(&self, handle: NodeHandle, graph: &Arc<GraphShared>) {
        let _ = self.handle.set(handle);
        let _ = self.graph.set(Arc::downgrade(graph));
    }

    pub(crate) fn graph_ref(&self) -> Option<Arc<GraphShared>> {
        self.graph.get().and_then(Weak::upgrade)
    }

    /// The owning Arc of this cell.  Set right after construction, alive
    /// for as long as any `&self` can exist.
    fn arc(&self) -> Arc<NodeCell> {
        self.this
            .get()
            .and_then(Weak::upgrade)
            .expect("node cell outlived its owning Arc")
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn strategies(&self) -> ScheduleStrategies {
        ScheduleStrategies::from_bits(self.strategies.load(Ordering::SeqCst))
    }

    pub(crate) fn set_strategies(&self, strategies: ScheduleStrategies) {
        self.strategies.store(strategies.bits(), Ordering::SeqCst);
    }

    pub(crate) fn state(&self) -> NodeState {
        if !self.is_enabled() {
            NodeState::Disabled
        } else if self.running.load(Ordering::SeqCst) {
            NodeState::Running
        } else if self.scheduled() > 0 {
            NodeState::Pending
        } else {
            NodeState::Idle
        }
    }

    /// Pending plus in-flight compute count for this node.
    pub(crate) fn scheduled(&self) -> usize {
        self.pending.load(Ordering::SeqCst) + self.claimed.load(Ordering::SeqCst)
    }

    pub(crate) fn sink_accepts(&self, port: &str) -> bool {
        let ports = self.ports.read().unwrap();
        if let Some(input) = ports.find_input(port) {
            return input.is_enabled();
        }
        if let Some(property) = ports.find_property(port) {
            return property.is_enabled();
        }
        false
    }

    /// Buffers an envelope on `slot` and, for asynchronous nodes, evaluates
    /// the trigger condition right away.  Disabled nodes and disabled
    /// inputs silently drop the envelope.
    pub(crate) fn push_input(&self, graph: &Arc<GraphShared>, slot: &Arc<InputSlot>, env: Envelope) {
        if !self.is_enabled() || !slot.is_enabled() {
            return;
        }
        slot.buffer.lock().unwrap().push(env);
        if self.strategies().contains(ScheduleStrategy::Asynchronous) {
            self.trigger(graph, false);
        }
    }

    /// Decides whether to compute now, hand off to the pool, or do nothing.
    /// Returns whether a compute was run or scheduled.
    pub(crate) fn trigger(&self, graph: &Arc<GraphShared>, force: bool) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let strategies = self.strategies();

        // Pull mode resolves the upstream graph end to end before this
        // node computes.  Recursion depth is bounded by graph depth.
        if !strategies.contains(ScheduleStrategy::Asynchronous) {
            for source in self.source_nodes(graph) {
                source.trigger(graph, false);
            }
        }

        if !force && !self.fire_condition_met() {
            return false;
        }

        if strategies.contains(ScheduleStrategy::SkipIfBusy) && self.scheduled() > 0 {
            trace!("{}: busy, trigger dropped", self.name);
            return false;
        }

        if strategies.contains(ScheduleStrategy::Asynchronous) {
            graph.pool.schedule(self.arc());
        } else if strategies.contains(ScheduleStrategy::RunOnCallerThread) {
            self.run(graph);
        } else {
            // still synchronous, but always computed on the pool's stable
            // threads
            graph.pool.schedule(self.arc());
            self.wait(graph, false, None);
        }
        true
    }

    fn fire_condition_met(&self) -> bool {
        let strategies = self.strategies();
        let accept_empty = strategies.contains(ScheduleStrategy::AcceptEmptyInput);
        let all_inputs = strategies.contains(ScheduleStrategy::AllInputs);
        let ports = self.ports.read().unwrap();
        let mut fresh = 0usize;
        for slot in ports.flat_inputs() {
            let status = slot.buffer.lock().unwrap().status();
            match status {
                None => {
                    if !accept_empty || all_inputs {
                        return false;
                    }
                }
                Some(0) => {
                    if all_inputs {
                        return false;
                    }
                }
                Some(_) => fresh += 1,
            }
        }
        fresh > 0
    }

    /// Executes one compute call.  Serialised per node by the compute
    /// mutex; parallel across distinct nodes.
    pub(crate) fn run(&self, graph: &Arc<GraphShared>) {
        let mut compute = self.compute.lock().unwrap();

        if self.strategies().contains(ScheduleStrategy::SkipIfNoInput) {
            let skip = {
                let ports = self.ports.read().unwrap();
                let mut any_input = false;
                let mut any_fresh = false;
                for slot in ports.flat_inputs() {
                    any_input = true;
                    if slot.buffer.lock().unwrap().has_new() {
                        any_fresh = true;
                        break;
                    }
                }
                any_input && !any_fresh
            };
            if skip {
                trace!("{}: no fresh input, run skipped", self.name);
                return;
            }
        }

        self.reset_error();
        self.running.store(true, Ordering::SeqCst);
        let running = scopeguard::guard(&self.running, |flag| {
            flag.store(false, Ordering::SeqCst);
        });

        let started = NanoTime::now();
        let node_ref = NodeRef {
            graph: graph.clone(),
            node: self.arc(),
        };
        let result = catch_unwind(AssertUnwindSafe(|| compute.compute(&node_ref)));
        let elapsed = Duration::from(NanoTime::now() - started);

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.set_error(err.message, err.code),
            Err(payload) => self.set_error(panic_message(payload), ErrorCode::Runtime),
        }

        if self.compute_stats.load(Ordering::Relaxed) {
            self.update_stats(started, elapsed);
        }
        drop(running);
        self.notify(NodeEvent::Done { elapsed });
    }

    /// Runs every pending compute for this node, one after the other.
    pub(crate) fn drain(&self, graph: &Arc<GraphShared>) {
        while self.claim() {
            self.run(graph);
            self.unclaim();
        }
    }

    fn claim(&self) -> bool {
        // claimed goes up before pending goes down so scheduled() never
        // dips to zero in the handoff
        self.claimed.fetch_add(1, Ordering::SeqCst);
        let took = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !took {
            self.claimed.fetch_sub(1, Ordering::SeqCst);
        }
        took
    }

    fn unclaim(&self) {
        self.claimed.fetch_sub(1, Ordering::SeqCst);
    }

    /// Blocks until no compute for this node (and optionally its transitive
    /// upstream nodes) remains pending or running, or until the timeout.
    /// Called from a pool worker it drains this node's pending work inline
    /// instead of deadlocking on its own queue.
    pub(crate) fn wait(
        &self,
        graph: &Arc<GraphShared>,
        upstream: bool,
        timeout: Option<Duration>,
    ) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        if upstream {
            let sources = self.all_sources(graph);
            for source in sources.iter().rev() {
                let remaining = match deadline {
                    Some(d) => match d.checked_duration_since(Instant::now()) {
                        Some(r) => Some(r),
                        None => return false,
                    },
                    None => None,
                };
                if !source.wait(graph, false, remaining) {
                    return false;
                }
            }
        }
        if crate::pool::on_worker_thread() {
            while self.claim() {
                self.run(graph);
                self.unclaim();
            }
        }
        loop {
            if self.scheduled() == 0 {
                return true;
            }
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    return false;
                }
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Direct upstream nodes, reached through open inbound connections.
    pub(crate) fn source_nodes(&self, graph: &Arc<GraphShared>) -> Vec<Arc<NodeCell>> {
        let ids: Vec<ConnectionId> = {
            let ports = self.ports.read().unwrap();
            ports
                .flat_inputs()
                .flat_map(|slot| slot.sources.lock().unwrap().clone())
                .collect()
        };
        let mut seen: Vec<SourceId> = Vec::new();
        let mut out = Vec::new();
        for id in ids {
            let Some(conn) = graph.connection(id) else {
                continue;
            };
            if !conn.is_open() {
                continue;
            }
            let Some(cell) = graph.cell(conn.source().node) else {
                continue;
            };
            if cell.source_id == self.source_id || seen.contains(&cell.source_id) {
                continue;
            }
            seen.push(cell.source_id);
            out.push(cell);
        }
        out
    }

    /// Transitive upstream closure, nearest first.
    pub(crate) fn all_sources(&self, graph: &Arc<GraphShared>) -> Vec<Arc<NodeCell>> {
        let mut out: Vec<Arc<NodeCell>> = Vec::new();
        let mut stack = self.source_nodes(graph);
        while let Some(cell) = stack.pop() {
            if cell.source_id == self.source_id
                || out.iter().any(|c| c.source_id == cell.source_id)
            {
                continue;
            }
            stack.extend(cell.source_nodes(graph));
            out.push(cell);
        }
        out
    }

    pub(crate) fn set_error(&self, message: impl Into<String>, code: ErrorCode) {
        let data = ErrorData {
            message: message.into(),
            code,
            time: NanoTime::now(),
        };
        warn!("{}: {}", self.name, data);
        {
            let mut record = self.error.lock().unwrap();
            record.history.push_back(data.clone());
            while record.history.len() > ERROR_HISTORY {
                record.history.pop_front();
            }
            record.last = Some(data.clone());
        }
        self.notify(NodeEvent::ErrorSet { error: data });
    }

    pub(crate) fn reset_error(&self) {
        self.error.lock().unwrap().last = None;
    }

    pub(crate) fn last_error(&self) -> Option<ErrorData> {
        self.error.lock().unwrap().last.clone()
    }

    pub(crate) fn error_history(&self) -> Vec<ErrorData> {
        self.error.lock().unwrap().history.iter().cloned().collect()
    }

    pub(crate) fn subscribe(&self) -> Receiver<NodeEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub(crate) fn notify(&self, event: NodeEvent) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn attributes_snapshot(&self) -> AttributeMap {
        self.attributes.lock().unwrap().clone()
    }

    pub(crate) fn set_attribute(&self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.lock().unwrap().insert(key.into(), value);
    }

    pub(crate) fn note_input_time(&self, time: NanoTime) {
        *self.input_time.lock().unwrap() = time;
    }

    /// Time stamped onto produced envelopes: the most recently consumed
    /// input time, or the clock when nothing was consumed yet.
    pub(crate) fn current_time(&self) -> NanoTime {
        let time = *self.input_time.lock().unwrap();
        if time.is_valid() { time } else { NanoTime::now() }
    }

    fn update_stats(&self, started: NanoTime, elapsed: Duration) {
        const RATE_WINDOW: Duration = Duration::from_millis(500);
        let mut stats = self.stats.lock().unwrap();
        stats.last_elapsed = elapsed;
        stats.last_run = started;
        if !stats.window_start.is_valid() {
            stats.window_start = started;
        } else if started - stats.window_start > NanoTime::from(RATE_WINDOW) {
            let window = (started - stats.window_start).nanos() as f64;
            stats.rate = (stats.count + 1) as f64 * 1e9 / window;
            stats.count = 0;
            stats.window_start = started;
        } else {
            stats.count += 1;
        }
    }

    pub(crate) fn stats(&self) -> NodeStats {
        let stats = self.stats.lock().unwrap();
        NodeStats {
            last_elapsed: stats.last_elapsed,
            last_run: stats.last_run,
            rate: stats.rate,
        }
    }

    pub(crate) fn set_compute_stats(&self, enabled: bool) {
        self.compute_stats.store(enabled, Ordering::Relaxed);
    }

    /// True when no outbound connection on any output is open.
    pub(crate) fn outputs_all_closed(&self, graph: &GraphShared) -> bool {
        let ids: Vec<ConnectionId> = {
            let ports = self.ports.read().unwrap();
            ports
                .flat_outputs()
                .flat_map(|slot| slot.sinks.lock().unwrap().clone())
                .collect()
        };
        !ids.iter()
            .filter_map(|id| graph.connection(*id))
            .any(|conn| conn.is_open())
    }

    /// True when any connection on any port is open.
    pub(crate) fn has_open_connections(&self, graph: &GraphShared) -> bool {
        let ids: Vec<ConnectionId> = {
            let ports = self.ports.read().unwrap();
            let inputs = ports
                .flat_inputs()
                .flat_map(|slot| slot.sources.lock().unwrap().clone());
            let outputs = ports
                .flat_outputs()
                .flat_map(|slot| slot.sinks.lock().unwrap().clone());
            let properties = ports
                .properties
                .iter()
                .flat_map(|group| group.slots.iter())
                .flat_map(|slot| slot.sources.lock().unwrap().clone());
            inputs.chain(outputs).chain(properties).collect()
        };
        ids.iter()
            .filter_map(|id| graph.connection(*id))
            .any(|conn| conn.is_open())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unhandled panic in compute".to_string()
    }
}

/// Handle to one node: its ports, scheduling controls, error record and
/// notifications.  Cheap to clone; this is also what a [Compute]
/// implementation receives.
#[derive(Clone)]
pub struct NodeRef {
    pub(crate) graph: Arc<GraphShared>,
    pub(crate) node: Arc<NodeCell>,
}

impl NodeRef {
    pub(crate) fn for_cell(graph: Arc<GraphShared>, node: Arc<NodeCell>) -> Self {
        Self { graph, node }
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// The concrete compute type behind this node.
    pub fn type_tag(&self) -> &str {
        &self.node.type_tag
    }

    pub fn handle(&self) -> Option<NodeHandle> {
        self.node.handle.get().copied()
    }

    pub fn source_id(&self) -> SourceId {
        self.node.source_id
    }

    pub fn state(&self) -> NodeState {
        self.node.state()
    }

    pub fn is_enabled(&self) -> bool {
        self.node.is_enabled()
    }

    /// A disabled node rejects triggers and input pushes.  Disabling does
    /// not abort a compute that is already running.
    pub fn set_enabled(&self, enabled: bool) {
        self.node.set_enabled(enabled);
    }

    pub fn strategies(&self) -> ScheduleStrategies {
        self.node.strategies()
    }

    pub fn set_strategies(&self, strategies: impl Into<ScheduleStrategies>) {
        self.node.set_strategies(strategies.into());
    }

    pub fn set_strategy(&self, flag: ScheduleStrategy, on: bool) {
        self.node.set_strategies(self.node.strategies().with(flag, on));
    }

    /// Pool priority for this node's computes.
    pub fn set_priority(&self, priority: i32) {
        self.node.priority.store(priority, Ordering::SeqCst);
    }

    /// Evaluates the trigger condition and, if met (or forced), runs or
    /// schedules the compute.  See [ScheduleStrategy] for how the flags
    /// shape this.
    pub fn trigger(&self, force: bool) -> bool {
        self.node.trigger(&self.graph, force)
    }

    /// Blocks until this node (and, if asked, its transitive upstream
    /// nodes) has no compute pending or running.  Returns whether it
    /// drained within the timeout.
    pub fn wait(&self, wait_for_upstream: bool, timeout: Option<Duration>) -> bool {
        self.node.wait(&self.graph, wait_for_upstream, timeout)
    }

    /// Number of computes pending or running for this node.
    pub fn scheduled(&self) -> usize {
        self.node.scheduled()
    }

    pub fn input_count(&self) -> usize {
        self.node.ports.read().unwrap().input_count()
    }

    pub fn output_count(&self) -> usize {
        self.node.ports.read().unwrap().output_count()
    }

    pub fn property_count(&self) -> usize {
        self.node.ports.read().unwrap().property_count()
    }

    /// Input by flat index, multi groups expanded in declaration order.
    pub fn input(&self, index: usize) -> Option<InputPort> {
        let slot = self.node.ports.read().unwrap().input_flat(index)?;
        Some(InputPort {
            graph: self.graph.clone(),
            node: self.node.clone(),
            slot,
        })
    }

    pub fn input_named(&self, name: &str) -> Option<InputPort> {
        let slot = self.node.ports.read().unwrap().find_input(name)?;
        Some(InputPort {
            graph: self.graph.clone(),
            node: self.node.clone(),
            slot,
        })
    }

    pub fn output(&self, index: usize) -> Option<OutputPort> {
        let slot = self.node.ports.read().unwrap().output_flat(index)?;
        Some(OutputPort {
            graph: self.graph.clone(),
            node: self.node.clone(),
            slot,
        })
    }

    pub fn output_named(&self, name: &str) -> Option<OutputPort> {
        let slot = self.node.ports.read().unwrap().find_output(name)?;
        Some(OutputPort {
            graph: self.graph.clone(),
            node: self.node.clone(),
            slot,
        })
    }

    pub fn property(&self, index: usize) -> Option<PropertyPort> {
        let slot = self.node.ports.read().unwrap().property_flat(index)?;
        Some(PropertyPort { slot })
    }

    pub fn property_named(&self, name: &str) -> Option<PropertyPort> {
        let slot = self.node.ports.read().unwrap().find_property(name)?;
        Some(PropertyPort { slot })
    }

    /// The resizable view of a multi input declared in the schema.
    pub fn multi_input(&self, name: &str) -> Option<MultiInputPort> {
        let exists = self
            .node
            .ports
            .read()
            .unwrap()
            .inputs
            .iter()
            .any(|group| group.name == name && group.bounds.is_some());
        exists.then(|| MultiInputPort {
            graph: self.graph.clone(),
            node: self.node.clone(),
            name: name.to_string(),
        })
    }

    pub fn multi_output(&self, name: &str) -> Option<MultiOutputPort> {
        let exists = self
            .node
            .ports
            .read()
            .unwrap()
            .outputs
            .iter()
            .any(|group| group.name == name && group.bounds.is_some());
        exists.then(|| MultiOutputPort {
            graph: self.graph.clone(),
            node: self.node.clone(),
            name: name.to_string(),
        })
    }

    pub fn multi_property(&self, name: &str) -> Option<MultiPropertyPort> {
        let exists = self
            .node
            .ports
            .read()
            .unwrap()
            .properties
            .iter()
            .any(|group| group.name == name && group.bounds.is_some());
        exists.then(|| MultiPropertyPort {
            node: self.node.clone(),
            name: name.to_string(),
        })
    }

    /// Builds an envelope the way this node stamps data: payload wrapped,
    /// time from the most recently consumed input, this node as source, and
    /// the node's attributes merged on.
    pub fn create<T: Any + Send + Sync>(&self, value: T) -> Envelope {
        self.stamp(Envelope::from_value(value))
    }

    /// Stamps an existing envelope with this node's identity and
    /// attributes.  A valid time already on the envelope is kept.
    pub fn stamp(&self, mut env: Envelope) -> Envelope {
        if !env.time().is_valid() {
            env.set_time(self.node.current_time());
        }
        env.set_source(self.node.source_id);
        env.merge_attributes(&self.node.attributes_snapshot());
        env
    }

    /// Records an error on this node, overwriting the previous one.  The
    /// record is reset automatically before each compute call.
    pub fn set_error(&self, message: impl Into<String>, code: ErrorCode) {
        self.node.set_error(message, code);
    }

    pub fn reset_error(&self) {
        self.node.reset_error();
    }

    pub fn last_error(&self) -> Option<ErrorData> {
        self.node.last_error()
    }

    pub fn has_error(&self) -> bool {
        self.node.last_error().is_some()
    }

    /// The bounded ring of recent errors, oldest first.
    pub fn error_history(&self) -> Vec<ErrorData> {
        self.node.error_history()
    }

    /// Subscribes to this node's notifications.
    pub fn subscribe(&self) -> Receiver<NodeEvent> {
        self.node.subscribe()
    }

    pub fn attributes(&self) -> AttributeMap {
        self.node.attributes_snapshot()
    }

    /// Attributes set here are merged onto every envelope the node creates.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.node.set_attribute(key, value.into());
    }

    pub fn stats(&self) -> NodeStats {
        self.node.stats()
    }

    pub fn set_compute_stats(&self, enabled: bool) {
        self.node.set_compute_stats(enabled);
    }

    /// When set, the node is retired from its graph once every output
    /// connection has closed and its pending work has drained.
    pub fn set_auto_remove(&self, enabled: bool) {
        self.node.auto_remove.store(enabled, Ordering::SeqCst);
    }
}

/// A buffered, trigger-capable connection endpoint.
pub struct InputPort {
    graph: Arc<GraphShared>,
    node: Arc<NodeCell>,
    slot: Arc<InputSlot>,
}

impl InputPort {
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// Buffers an envelope.  For an asynchronous owning node this also
    /// evaluates the trigger condition.  Never fails: overflow evicts per
    /// buffer policy, disabled ports drop silently.
    pub fn push(&self, env: Envelope) {
        self.node.push_input(&self.graph, &self.slot, env);
    }

    /// The next envelope per buffer policy; replays the stale value when
    /// nothing new is pending.
    pub fn data(&self) -> Envelope {
        let env = self.slot.buffer.lock().unwrap().pop();
        if env.time().is_valid() {
            self.node.note_input_time(env.time());
        }
        env
    }

    /// Like [InputPort::data] without consuming.
    pub fn probe(&self) -> Envelope {
        self.slot.buffer.lock().unwrap().peek()
    }

    /// Every pending envelope, oldest to newest.
    pub fn all_data(&self) -> Vec<Envelope> {
        self.slot.buffer.lock().unwrap().drain_all()
    }

    /// Clears pending state and seeds exactly one envelope.
    pub fn reset(&self, env: Envelope) {
        self.slot.buffer.lock().unwrap().reset(env);
    }

    pub fn has_new(&self) -> bool {
        self.slot.buffer.lock().unwrap().has_new()
    }

    /// Pending count, or `None` if this input never received data.
    pub fn status(&self) -> Option<usize> {
        self.slot.buffer.lock().unwrap().status()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.buffer.lock().unwrap().is_empty()
    }

    pub fn time(&self) -> NanoTime {
        self.slot.buffer.lock().unwrap().next_time()
    }

    pub fn buffer_kind(&self) -> BufferKind {
        self.slot.buffer.lock().unwrap().kind()
    }

    pub fn set_buffer_kind(&self, kind: BufferKind) {
        self.slot.buffer.lock().unwrap().set_kind(kind);
    }

    pub fn set_buffer_limit(&self, limit: BufferLimit) {
        self.slot.buffer.lock().unwrap().set_limit(limit);
    }

    pub fn memory_footprint(&self) -> usize {
        self.slot.buffer.lock().unwrap().memory_footprint()
    }

    /// A disabled input silently drops incoming pushes and never triggers.
    pub fn set_enabled(&self, enabled: bool) {
        self.slot.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.slot.is_enabled()
    }
}

/// The publishing endpoint of a node.  Always reflects its latest publish.
pub struct OutputPort {
    graph: Arc<GraphShared>,
    node: Arc<NodeCell>,
    slot: Arc<OutputSlot>,
}

impl OutputPort {
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// Stamps the envelope with the owning node's attributes and identity,
    /// stores it as the current value and forwards it through every open
    /// outbound connection.  Deliveries of one publish complete before the
    /// next publish on this output starts delivering.
    pub fn publish(&self, mut env: Envelope) {
        env.merge_attributes(&self.node.attributes_snapshot());
        if env.source() == SourceId::NONE {
            env.set_source(self.node.source_id);
        }
        let mut value = self.slot.value.lock().unwrap();
        *value = env.clone();
        if self.slot.buffered.load(Ordering::SeqCst) {
            self.slot.overflow.lock().unwrap().push(env.clone());
        }
        let sinks: Vec<ConnectionId> = self.slot.sinks.lock().unwrap().clone();
        for id in sinks {
            if let Some(conn) = self.graph.connection(id) {
                conn.send(&env);
            }
        }
    }

    /// The latest published envelope.
    pub fn data(&self) -> Envelope {
        self.slot.value.lock().unwrap().clone()
    }

    pub fn time(&self) -> NanoTime {
        self.data().time()
    }

    /// Enables the overflow buffer: every publish is also appended for
    /// [OutputPort::take_buffered] to collect.
    pub fn set_buffered(&self, enabled: bool) {
        self.slot.buffered.store(enabled, Ordering::SeqCst);
    }

    /// Atomically returns and clears everything published since the last
    /// call.  Only meaningful with buffering enabled.
    pub fn take_buffered(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.slot.overflow.lock().unwrap())
    }

    pub fn buffered_len(&self) -> usize {
        self.slot.overflow.lock().unwrap().len()
    }
}

/// An unbuffered, connectable slot that never triggers its node.
pub struct PropertyPort {
    slot: Arc<PropertySlot>,
}

impl PropertyPort {
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    pub fn set_data(&self, env: Envelope) {
        if !self.slot.is_enabled() {
            return;
        }
        *self.slot.value.lock().unwrap() = env;
    }

    pub fn data(&self) -> Envelope {
        self.slot.value.lock().unwrap().clone()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.slot.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.slot.is_enabled()
    }
}

/// Resizable view of a multi input.  Mutations fail without side effects
/// when they would violate the schema's min/max bounds.
pub struct MultiInputPort {
    graph: Arc<GraphShared>,
    node: Arc<NodeCell>,
    name: String,
}

impl MultiInputPort {
    pub fn count(&self) -> usize {
        let ports = self.node.ports.read().unwrap();
        ports
            .inputs
            .iter()
            .find(|group| group.name == self.name)
            .map(|group| group.count())
            .unwrap_or(0)
    }

    fn slot_template(&self) -> (BufferKind, BufferLimit) {
        let ports = self.node.ports.read().unwrap();
        ports
            .inputs
            .iter()
            .find(|group| group.name == self.name)
            .and_then(|group| group.slots.first())
            .map(|slot| {
                let buffer = slot.buffer.lock().unwrap();
                (buffer.kind(), buffer.limit())
            })
            .unwrap_or((BufferKind::Fifo, BufferLimit::default()))
    }

    pub fn resize(&self, count: usize) -> bool {
        let (kind, limit) = self.slot_template();
        let mut ports = self.node.ports.write().unwrap();
        ports
            .inputs
            .iter_mut()
            .find(|group| group.name == self.name)
            .map(|group| group.resize_with(count, |name| InputSlot::new(name, kind, limit)))
            .unwrap_or(false)
    }

    pub fn insert_at(&self, index: usize) -> bool {
        let (kind, limit) = self.slot_template();
        let mut ports = self.node.ports.write().unwrap();
        ports
            .inputs
            .iter_mut()
            .find(|group| group.name == self.name)
            .map(|group| group.insert_with(index, |name| InputSlot::new(name, kind, limit)))
            .unwrap_or(false)
    }

    pub fn remove_at(&self, index: usize) -> bool {
        let mut ports = self.node.ports.write().unwrap();
        ports
            .inputs
            .iter_mut()
            .find(|group| group.name == self.name)
            .map(|group| group.remove_at(index))
            .unwrap_or(false)
    }

    pub fn at(&self, index: usize) -> Option<InputPort> {
        let slot = {
            let ports = self.node.ports.read().unwrap();
            ports
                .inputs
                .iter()
                .find(|group| group.name == self.name)
                .and_then(|group| group.slots.get(index).cloned())
        }?;
        Some(InputPort {
            graph: self.graph.clone(),
            node: self.node.clone(),
            slot,
        })
    }
}

/// Resizable view of a multi output.
pub struct MultiOutputPort {
    graph: Arc<GraphShared>,
    node: Arc<NodeCell>,
    name: String,
}

impl MultiOutputPort {
    pub fn count(&self) -> usize {
        let ports = self.node.ports.read().unwrap();
        ports
            .outputs
            .iter()
            .find(|group| group.name == self.name)
            .map(|group| group.count())
            .unwrap_or(0)
    }

    pub fn resize(&self, count: usize) -> bool {
        let mut ports = self.node.ports.write().unwrap();
        ports
            .outputs
            .iter_mut()
            .find(|group| group.name == self.name)
            .map(|group| group.resize_with(count, OutputSlot::new))
            .unwrap_or(false)
    }

    pub fn insert_at(&self, index: usize) -> bool {
        let mut ports = self.node.ports.write().unwrap();
        ports
            .outputs
            .iter_mut()
            .find(|group| group.name == self.name)
            .map(|group| group.insert_with(index, OutputSlot::new))
            .unwrap_or(false)
    }

    pub fn remove_at(&self, index: usize) -> bool {
        let mut ports = self.node.ports.write().unwrap();
        ports
            .outputs
            .iter_mut()
            .find(|group| group.name == self.name)
            .map(|group| group.remove_at(index))
            .unwrap_or(false)
    }

    pub fn at(&self, index: usize) -> Option<OutputPort> {
        let slot = {
            let ports = self.node.ports.read().unwrap();
            ports
                .outputs
                .iter()
                .find(|group| group.name == self.name)
                .and_then(|group| group.slots.get(index).cloned())
        }?;
        Some(OutputPort {
            graph: self.graph.clone(),
            node: self.node.clone(),
            slot,
        })
    }
}

/// Resizable view of a multi property.
pub struct MultiPropertyPort {
    node: Arc<NodeCell>,
    name: String,
}

impl MultiPropertyPort {
    pub fn count(&self) -> usize {
        let ports = self.node.ports.read().unwrap();
        ports
            .properties
            .iter()
            .find(|group| group.name == self.name)
            .map(|group| group.count())
            .unwrap_or(0)
    }

    pub fn resize(&self, count: usize) -> bool {
        let mut ports = self.node.ports.write().unwrap();
        ports
            .properties
            .iter_mut()
            .find(|group| group.name == self.name)
            .map(|group| group.resize_with(count, PropertySlot::new))
            .unwrap_or(false)
    }

    pub fn insert_at(&self, index: usize) -> bool {
        let mut ports = self.node.ports.write().unwrap();
        ports
            .properties
            .iter_mut()
            .find(|group| group.name == self.name)
            .map(|group| group.insert_with(index, PropertySlot::new))
            .unwrap_or(false)
    }

    pub fn remove_at(&self, index: usize) -> bool {
        let mut ports = self.node.ports.write().unwrap();
        ports
            .properties
            .iter_mut()
            .find(|group| group.name == self.name)
            .map(|group| group.remove_at(index))
            .unwrap_or(false)
    }

    pub fn at(&self, index: usize) -> Option<PropertyPort> {
        let slot = {
            let ports = self.node.ports.read().unwrap();
            ports
                .properties
                .iter()
                .find(|group| group.name == self.name)
                .and_then(|group| group.slots.get(index).cloned())
        }?;
        Some(PropertyPort { slot })
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::graph::Graph;
    use crate::ports::Schema;

    fn doubler() -> impl Compute {
        |node: &NodeRef| -> Result<(), ComputeError> {
            let input = node.input(0).unwrap().data();
            let value = input
                .value::<i64>()
                .ok_or_else(|| ComputeError::new(ErrorCode::WrongInputType, "expected i64"))?;
            let out = node.output(0).unwrap();
            out.publish(node.create(value * 2));
            Ok(())
        }
    }

    #[test]
    fn all_inputs_gate_requires_every_input_fresh() {
        //env_logger::init();
        let graph = Graph::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let schema = Schema::new().input("a").input("b").output("sum");
        let handle = graph
            .add_node("adder", schema, move |node: &NodeRef| -> Result<(), ComputeError> {
                seen.fetch_add(1, Ordering::SeqCst);
                let a = node.input(0).unwrap().data().value::<i64>().unwrap_or(0);
                let b = node.input(1).unwrap().data().value::<i64>().unwrap_or(0);
                node.output(0).unwrap().publish(node.create(a + b));
                Ok(())
            })
            .unwrap();
        let node = graph.node(handle).unwrap();
        node.set_strategy(ScheduleStrategy::AllInputs, true);

        node.input(0).unwrap().push(Envelope::from_value(1i64));
        assert!(!node.trigger(false));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        node.input(1).unwrap().push(Envelope::from_value(2i64));
        assert!(node.trigger(false));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(node.output(0).unwrap().data().value::<i64>(), Some(3));

        // both consumed: no further fire until both are fresh again
        assert!(!node.trigger(false));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn skip_if_busy_drops_the_second_trigger() {
        let graph = Graph::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let schema = Schema::new().input_buffered("in", BufferKind::LastValue);
        let handle = graph
            .add_node("slow", schema, move |node: &NodeRef| -> Result<(), ComputeError> {
                node.input(0).unwrap().data();
                std::thread::sleep(Duration::from_millis(100));
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        let node = graph.node(handle).unwrap();
        node.set_strategies(
            ScheduleStrategy::Asynchronous
                | ScheduleStrategy::SkipIfBusy
                | ScheduleStrategy::SkipIfNoInput,
        );

        node.input(0).unwrap().push(Envelope::from_value(1i64));
        std::thread::sleep(Duration::from_millis(20)); // first compute is running
        node.input(0).unwrap().push(Envelope::from_value(2i64));
        assert!(node.wait(false, Some(Duration::from_secs(5))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn synchronous_wait_returns_immediately() {
        let graph = Graph::new();
        let schema = Schema::new().input("in").output("out");
        let handle = graph.add_node("double", schema, doubler()).unwrap();
        let node = graph.node(handle).unwrap();
        node.input(0).unwrap().push(Envelope::from_value(21i64));
        assert!(node.trigger(false));
        // compute already ran inline
        assert!(node.wait(false, Some(Duration::from_millis(1))));
        assert_eq!(node.output(0).unwrap().data().value::<i64>(), Some(42));
    }

    #[test]
    fn asynchronous_wait_blocks_until_compute_finished() {
        let graph = Graph::new();
        let schema = Schema::new().input("in").output("out");
        let handle = graph.add_node("double", schema, doubler()).unwrap();
        let node = graph.node(handle).unwrap();
        node.set_strategies(ScheduleStrategy::Asynchronous | ScheduleStrategy::SkipIfNoInput);
        node.input(0).unwrap().push(Envelope::from_value(5i64));
        assert!(node.wait(false, Some(Duration::from_secs(5))));
        assert_eq!(node.output(0).unwrap().data().value::<i64>(), Some(10));
        assert_eq!(node.state(), NodeState::Idle);
    }

    #[test]
    fn disabled_input_drops_pushes_silently() {
        let graph = Graph::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let schema = Schema::new().input("in");
        let handle = graph
            .add_node("sink", schema, move |node: &NodeRef| -> Result<(), ComputeError> {
                node.input(0).unwrap().data();
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        let node = graph.node(handle).unwrap();
        node.set_strategies(ScheduleStrategy::Asynchronous | ScheduleStrategy::SkipIfNoInput);
        let input = node.input(0).unwrap();
        input.set_enabled(false);
        input.push(Envelope::from_value(1i64));
        assert!(!input.has_new());
        assert!(node.wait(false, Some(Duration::from_millis(50))));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(node.state(), NodeState::Idle);
    }

    #[test]
    fn compute_errors_are_recorded_not_thrown() {
        let graph = Graph::new();
        let schema = Schema::new().input("in");
        let handle = graph
            .add_node("fallible", schema, |_node: &NodeRef| -> Result<(), ComputeError> {
                Err(ComputeError::new(ErrorCode::WrongInputType, "expected f64"))
            })
            .unwrap();
        let node = graph.node(handle).unwrap();
        node.input(0).unwrap().push(Envelope::from_value(1i64));
        assert!(node.trigger(false));
        let error = node.last_error().unwrap();
        assert_eq!(error.code, ErrorCode::WrongInputType);
        assert_eq!(node.error_history().len(), 1);

        // errors pile into the bounded history, last_error overwrites
        node.input(0).unwrap().push(Envelope::from_value(2i64));
        node.trigger(false);
        assert_eq!(node.error_history().len(), 2);
        assert!(node.has_error());
    }

    #[test]
    fn panics_are_caught_at_the_scheduler_boundary() {
        let graph = Graph::new();
        let schema = Schema::new().input("in");
        let handle = graph
            .add_node("panicky", schema, |_node: &NodeRef| -> Result<(), ComputeError> {
                panic!("boom");
            })
            .unwrap();
        let node = graph.node(handle).unwrap();
        node.set_strategies(ScheduleStrategy::Asynchronous | ScheduleStrategy::SkipIfNoInput);
        node.input(0).unwrap().push(Envelope::from_value(1i64));
        assert!(node.wait(false, Some(Duration::from_secs(5))));
        let error = node.last_error().unwrap();
        assert_eq!(error.code, ErrorCode::Runtime);
        assert!(error.message.contains("boom"));
        // the pool survives; the node can run again
        node.input(0).unwrap().push(Envelope::from_value(2i64));
        assert!(node.wait(false, Some(Duration::from_secs(5))));
    }

    #[test]
    fn done_notification_is_emitted() {
        let graph = Graph::new();
        let schema = Schema::new().input("in").output("out");
        let handle = graph.add_node("double", schema, doubler()).unwrap();
        let node = graph.node(handle).unwrap();
        let events = node.subscribe();
        node.input(0).unwrap().push(Envelope::from_value(1i64));
        node.trigger(false);
        let event = events.try_recv().unwrap();
        assert!(matches!(event, NodeEvent::Done { .. }));
    }
}

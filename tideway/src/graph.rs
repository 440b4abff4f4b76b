use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::buffer::BufferLimit;
use crate::connection::{
    Connection, ConnectionError, ConnectionId, Endpoint, IoMode, TransportFactory, split_address,
};
use crate::envelope::{AttributeMap, Envelope};
use crate::node::{Compute, NodeCell, NodeEvent, NodeRef, ScheduleStrategies};
use crate::pool::{PoolConfig, WorkerPool};
use crate::ports::{Schema, SchemaError, SinkSlot};

static GRAPH_ID: AtomicUsize = AtomicUsize::new(0);

/// Stable address of a node within its graph.  Handles are never reused;
/// a removed node leaves a dead slot behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub(crate) usize);

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown node handle {0:?}")]
    UnknownNode(NodeHandle),
    #[error("node '{0}' still has open connections")]
    ConnectionsOpen(String),
    #[error("snapshot of type '{0}' does not fit node of type '{1}'")]
    TypeMismatch(String, String),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// What the (external) serialization layer reads and writes per node: the
/// concrete type tag, the scheduling flags, the attribute map, property
/// envelopes and addressed connection strings.  Restoring a node means
/// rebuilding its schema-defined ports first, then replaying these values.
#[derive(Clone, Debug)]
pub struct NodeSnapshot {
    pub type_tag: String,
    pub name: String,
    pub strategies: ScheduleStrategies,
    pub enabled: bool,
    pub attributes: AttributeMap,
    /// Property values in port declaration order.
    pub properties: Vec<(String, Envelope)>,
    /// `(output port, address)` pairs for addressed transports.  Direct
    /// in-process edges are graph wiring and are not part of a node's own
    /// snapshot.
    pub connections: Vec<(String, String)>,
}

pub(crate) struct GraphShared {
    pub(crate) id: usize,
    nodes: RwLock<Vec<Option<Arc<NodeCell>>>>,
    connections: RwLock<Vec<Option<Arc<Connection>>>>,
    pub(crate) pool: WorkerPool,
    transports: RwLock<Vec<Arc<dyn TransportFactory>>>,
    default_limit: Mutex<BufferLimit>,
    priorities: Mutex<HashMap<String, i32>>,
}

impl GraphShared {
    pub(crate) fn cell(&self, handle: NodeHandle) -> Option<Arc<NodeCell>> {
        self.nodes.read().unwrap().get(handle.0).and_then(Clone::clone)
    }

    pub(crate) fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .unwrap()
            .get(id.0)
            .and_then(Clone::clone)
    }

    fn cells(&self) -> Vec<Arc<NodeCell>> {
        self.nodes.read().unwrap().iter().flatten().cloned().collect()
    }

    /// Called by a closing connection: tells both endpoint nodes and
    /// retires an auto-remove source whose outputs all went down.
    pub(crate) fn connection_closed(&self, conn: &Connection) {
        if let Some(cell) = self.cell(conn.source.node) {
            cell.notify(NodeEvent::ConnectionClosed {
                port: conn.source.port.clone(),
            });
            self.reap(&cell);
        }
        if let Some(sink) = &conn.sink {
            if let Some(cell) = self.cell(sink.node) {
                cell.notify(NodeEvent::ConnectionClosed {
                    port: sink.port.clone(),
                });
            }
        }
    }

    /// Removes an auto-remove node once its outputs are closed and no
    /// compute is pending or running.  Workers call this after a drain so
    /// retirement never races a running compute.
    pub(crate) fn reap(&self, cell: &Arc<NodeCell>) {
        if cell.auto_remove.load(Ordering::SeqCst)
            && cell.scheduled() == 0
            && cell.outputs_all_closed(self)
        {
            self.remove_cell(cell);
        }
    }

    fn remove_cell(&self, cell: &Arc<NodeCell>) {
        if let Some(handle) = cell.handle.get() {
            let mut nodes = self.nodes.write().unwrap();
            if let Some(slot) = nodes.get_mut(handle.0) {
                if slot.is_some() {
                    *slot = None;
                    debug!("graph {}: removed node [{}] '{}'", self.id, handle.0, cell.name);
                }
            }
        }
    }
}

/// The engine: an arena of nodes and connections, the worker pool, and the
/// graph-wide defaults.  Everything that the original design kept in
/// process-wide registries lives here, owned by the application.
pub struct Graph {
    shared: Arc<GraphShared>,
}

impl Graph {
    pub fn new() -> Graph {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(pool: PoolConfig) -> Graph {
        let id = GRAPH_ID.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(GraphShared {
            id,
            nodes: RwLock::new(Vec::new()),
            connections: RwLock::new(Vec::new()),
            pool: WorkerPool::new(&pool),
            transports: RwLock::new(Vec::new()),
            default_limit: Mutex::new(BufferLimit::default()),
            priorities: Mutex::new(HashMap::new()),
        });
        debug!("graph {id} created");
        Graph { shared }
    }

    /// Adds a node built from its schema and compute.  The schema is the
    /// node's fixed port layout; a bad one fails here, never at runtime.
    pub fn add_node<C: Compute + 'static>(
        &self,
        name: &str,
        schema: Schema,
        compute: C,
    ) -> Result<NodeHandle, SchemaError> {
        let type_tag = tynm::type_name::<C>();
        let limit = *self.shared.default_limit.lock().unwrap();
        let cell = NodeCell::new(name, type_tag, &schema, Box::new(compute), limit)?;
        if let Some(priority) = self.shared.priorities.lock().unwrap().get(&cell.type_tag) {
            cell.priority.store(*priority, Ordering::SeqCst);
        }
        let mut nodes = self.shared.nodes.write().unwrap();
        let handle = NodeHandle(nodes.len());
        cell.bind(handle, &self.shared);
        debug!("graph {}: added node [{}] '{}'", self.shared.id, handle.0, name);
        nodes.push(Some(cell));
        Ok(handle)
    }

    pub fn node(&self, handle: NodeHandle) -> Option<NodeRef> {
        let cell = self.shared.cell(handle)?;
        Some(NodeRef::for_cell(self.shared.clone(), cell))
    }

    pub fn node_count(&self) -> usize {
        self.shared.nodes.read().unwrap().iter().flatten().count()
    }

    /// Destroys a node.  It is a programming error to remove a node whose
    /// connections are still open; this fails loudly instead of leaking
    /// dangling connection state.
    pub fn remove_node(&self, handle: NodeHandle) -> Result<(), GraphError> {
        let cell = self
            .shared
            .cell(handle)
            .ok_or(GraphError::UnknownNode(handle))?;
        if cell.has_open_connections(&self.shared) {
            return Err(GraphError::ConnectionsOpen(cell.name.clone()));
        }
        cell.wait(&self.shared, false, None);
        self.shared.remove_cell(&cell);
        Ok(())
    }

    /// Wires an output to an input or property with the direct in-process
    /// transport and opens the link.
    pub fn connect(
        &self,
        src: (NodeHandle, &str),
        dst: (NodeHandle, &str),
    ) -> Result<ConnectionId, ConnectionError> {
        let missing = |h: NodeHandle, p: &str| ConnectionError::UnknownEndpoint(format!("{h:?}:{p}"));
        let src_cell = self.shared.cell(src.0).ok_or_else(|| missing(src.0, src.1))?;
        let src_slot = {
            let ports = src_cell.ports.read().unwrap();
            ports.find_output(src.1).ok_or_else(|| missing(src.0, src.1))?
        };
        let dst_cell = self.shared.cell(dst.0).ok_or_else(|| missing(dst.0, dst.1))?;
        {
            let ports = dst_cell.ports.read().unwrap();
            if ports.find_sink(dst.1).is_none() {
                return Err(missing(dst.0, dst.1));
            }
        }
        let mut connections = self.shared.connections.write().unwrap();
        let id = ConnectionId(connections.len());
        let conn = Connection::direct(
            id,
            Endpoint::new(src.0, src.1.to_string()),
            Endpoint::new(dst.0, dst.1.to_string()),
            &self.shared,
        );
        conn.open(IoMode::Output)?;
        src_slot.sinks.lock().unwrap().push(id);
        {
            let ports = dst_cell.ports.read().unwrap();
            match ports.find_sink(dst.1) {
                Some(SinkSlot::Input(slot)) => slot.sources.lock().unwrap().push(id),
                Some(SinkSlot::Property(slot)) => slot.sources.lock().unwrap().push(id),
                None => {}
            }
        }
        connections.push(Some(conn));
        Ok(id)
    }

    /// Wires an output to an addressed transport.  An address with a
    /// `"<transport>:"` prefix selects the registered factory of that name;
    /// otherwise every factory is offered the address in registration
    /// order.  Fails when nothing claims it.
    pub fn connect_address(
        &self,
        src: (NodeHandle, &str),
        address: &str,
    ) -> Result<ConnectionId, ConnectionError> {
        let missing = |h: NodeHandle, p: &str| ConnectionError::UnknownEndpoint(format!("{h:?}:{p}"));
        let src_cell = self.shared.cell(src.0).ok_or_else(|| missing(src.0, src.1))?;
        let src_slot = {
            let ports = src_cell.ports.read().unwrap();
            ports.find_output(src.1).ok_or_else(|| missing(src.0, src.1))?
        };
        let factories: Vec<Arc<dyn TransportFactory>> =
            self.shared.transports.read().unwrap().clone();
        let (prefix, rest) = split_address(address);
        let transport = match prefix {
            Some(name) => factories
                .iter()
                .find(|factory| factory.name() == name)
                .and_then(|factory| factory.try_create(rest)),
            None => factories.iter().find_map(|factory| factory.try_create(address)),
        }
        .ok_or_else(|| ConnectionError::AddressUnresolved(address.to_string()))?;
        let mut connections = self.shared.connections.write().unwrap();
        let id = ConnectionId(connections.len());
        let conn = Connection::addressed(
            id,
            Endpoint::new(src.0, src.1.to_string()),
            address.to_string(),
            transport,
            &self.shared,
        );
        conn.open(IoMode::Output)?;
        src_slot.sinks.lock().unwrap().push(id);
        connections.push(Some(conn));
        Ok(id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.shared.connection(id)
    }

    /// Closes and discards a connection, detaching it from both endpoints.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let conn = {
            let mut connections = self.shared.connections.write().unwrap();
            connections.get_mut(id.0).and_then(Option::take)
        };
        let Some(conn) = conn else {
            return false;
        };
        conn.close();
        if let Some(cell) = self.shared.cell(conn.source().node) {
            let ports = cell.ports.read().unwrap();
            if let Some(slot) = ports.find_output(&conn.source().port) {
                slot.sinks.lock().unwrap().retain(|existing| *existing != id);
            }
        }
        if let Some(sink) = conn.sink() {
            if let Some(cell) = self.shared.cell(sink.node) {
                let ports = cell.ports.read().unwrap();
                match ports.find_sink(&sink.port) {
                    Some(SinkSlot::Input(slot)) => {
                        slot.sources.lock().unwrap().retain(|existing| *existing != id)
                    }
                    Some(SinkSlot::Property(slot)) => {
                        slot.sources.lock().unwrap().retain(|existing| *existing != id)
                    }
                    None => {}
                }
            }
        }
        true
    }

    /// Registers a transport factory for [Graph::connect_address].
    pub fn register_transport(&self, factory: Arc<dyn TransportFactory>) {
        self.shared.transports.write().unwrap().push(factory);
    }

    /// Applies a buffer limit to every existing input buffer and to all
    /// future ones.
    pub fn set_default_buffer_limit(&self, limit: BufferLimit) {
        *self.shared.default_limit.lock().unwrap() = limit;
        for cell in self.shared.cells() {
            let ports = cell.ports.read().unwrap();
            for slot in ports.flat_inputs() {
                slot.buffer.lock().unwrap().set_limit(limit);
            }
        }
    }

    /// Pool priority for every node of the given compute type, existing
    /// and future.
    pub fn set_type_priority(&self, type_tag: &str, priority: i32) {
        self.shared
            .priorities
            .lock()
            .unwrap()
            .insert(type_tag.to_string(), priority);
        for cell in self.shared.cells() {
            if cell.type_tag == type_tag {
                cell.priority.store(priority, Ordering::SeqCst);
            }
        }
    }

    /// Triggers every node in the graph.
    pub fn trigger_all(&self, force: bool) {
        for cell in self.shared.cells() {
            cell.trigger(&self.shared, force);
        }
    }

    /// Waits for every node to drain.  Returns whether all did in time.
    pub fn wait_all(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        for cell in self.shared.cells() {
            let remaining = match deadline {
                Some(d) => match d.checked_duration_since(Instant::now()) {
                    Some(r) => Some(r),
                    None => return false,
                },
                None => None,
            };
            if !cell.wait(&self.shared, false, remaining) {
                return false;
            }
        }
        true
    }

    /// The per-node values the external serialization layer persists.
    pub fn snapshot(&self, handle: NodeHandle) -> Option<NodeSnapshot> {
        let cell = self.shared.cell(handle)?;
        let ports = cell.ports.read().unwrap();
        let properties = ports
            .properties
            .iter()
            .flat_map(|group| group.slots.iter())
            .map(|slot| (slot.name.clone(), slot.value.lock().unwrap().clone()))
            .collect();
        let connections = ports
            .flat_outputs()
            .flat_map(|slot| slot.sinks.lock().unwrap().clone())
            .filter_map(|id| self.shared.connection(id))
            .filter_map(|conn| {
                conn.address()
                    .map(|address| (conn.source().port.clone(), address.to_string()))
            })
            .collect();
        Some(NodeSnapshot {
            type_tag: cell.type_tag.clone(),
            name: cell.name.clone(),
            strategies: cell.strategies(),
            enabled: cell.is_enabled(),
            attributes: cell.attributes_snapshot(),
            properties,
            connections,
        })
    }

    /// Replays a snapshot onto a node whose schema-defined ports already
    /// exist, then re-opens its addressed connections.
    pub fn restore(&self, handle: NodeHandle, snapshot: &NodeSnapshot) -> Result<(), GraphError> {
        let cell = self
            .shared
            .cell(handle)
            .ok_or(GraphError::UnknownNode(handle))?;
        if cell.type_tag != snapshot.type_tag {
            return Err(GraphError::TypeMismatch(
                snapshot.type_tag.clone(),
                cell.type_tag.clone(),
            ));
        }
        cell.set_strategies(snapshot.strategies);
        cell.set_enabled(snapshot.enabled);
        for (key, value) in &snapshot.attributes {
            cell.set_attribute(key.clone(), value.clone());
        }
        {
            let ports = cell.ports.read().unwrap();
            let mut replayed: HashMap<&str, usize> = HashMap::new();
            for (name, env) in &snapshot.properties {
                let index = replayed
                    .entry(name.as_str())
                    .and_modify(|i| *i += 1)
                    .or_insert(0);
                if let Some(group) = ports.properties.iter().find(|g| g.name == *name) {
                    if let Some(slot) = group.slots.get(*index) {
                        *slot.value.lock().unwrap() = env.clone();
                    }
                }
            }
        }
        for (port, address) in &snapshot.connections {
            self.connect_address((handle, port), address)?;
        }
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        let connections: Vec<Arc<Connection>> = self
            .shared
            .connections
            .read()
            .unwrap()
            .iter()
            .flatten()
            .cloned()
            .collect();
        for conn in connections {
            conn.close();
        }
        self.shared.pool.stop();
        debug!("graph {} stopped", self.shared.id);
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::envelope::Envelope;
    use crate::node::{ComputeError, ErrorCode, NodeRef, ScheduleStrategy};
    use crate::ports::Schema;
    use std::sync::Mutex as StdMutex;

    fn doubler(node: &NodeRef) -> Result<(), ComputeError> {
        let input = node.input(0).unwrap().data();
        let value = input
            .value::<i64>()
            .ok_or_else(|| ComputeError::new(ErrorCode::WrongInputType, "expected i64"))?;
        node.output(0).unwrap().publish(node.create(value * 2));
        Ok(())
    }

    fn source_only(_node: &NodeRef) -> Result<(), ComputeError> {
        Ok(())
    }

    #[test]
    fn publish_connect_trigger_end_to_end() {
        //env_logger::init();
        let graph = Graph::new();
        let a = graph
            .add_node("a", Schema::new().output("out"), source_only)
            .unwrap();
        let b = graph
            .add_node("b", Schema::new().input("in").output("out"), doubler)
            .unwrap();
        graph.connect((a, "out"), (b, "in")).unwrap();

        // external producer publishes on a's output
        graph
            .node(a)
            .unwrap()
            .output(0)
            .unwrap()
            .publish(Envelope::from_value(5i64).with_time(crate::NanoTime::new(100)));

        let node_b = graph.node(b).unwrap();
        assert!(node_b.input(0).unwrap().has_new());
        assert!(node_b.trigger(false));
        let out = node_b.output(0).unwrap().data();
        assert_eq!(out.value::<i64>(), Some(10));
        assert_eq!(out.time(), crate::NanoTime::new(100));
        assert_eq!(out.source(), node_b.source_id());
    }

    #[test]
    fn closed_connection_forwards_nothing() {
        let graph = Graph::new();
        let a = graph
            .add_node("a", Schema::new().output("out"), source_only)
            .unwrap();
        let b = graph
            .add_node("b", Schema::new().input("in").output("out"), doubler)
            .unwrap();
        let id = graph.connect((a, "out"), (b, "in")).unwrap();
        let conn = graph.connection(id).unwrap();
        conn.close();
        conn.close(); // idempotent

        graph
            .node(a)
            .unwrap()
            .output(0)
            .unwrap()
            .publish(Envelope::from_value(5i64));
        assert!(!graph.node(b).unwrap().input(0).unwrap().has_new());

        // reopening restores the flow
        conn.open(IoMode::Output).unwrap();
        graph
            .node(a)
            .unwrap()
            .output(0)
            .unwrap()
            .publish(Envelope::from_value(7i64));
        assert!(graph.node(b).unwrap().input(0).unwrap().has_new());
    }

    #[test]
    fn reopen_in_other_mode_is_refused() {
        let graph = Graph::new();
        let a = graph
            .add_node("a", Schema::new().output("out"), source_only)
            .unwrap();
        let b = graph
            .add_node("b", Schema::new().input("in"), source_only)
            .unwrap();
        let id = graph.connect((a, "out"), (b, "in")).unwrap();
        let conn = graph.connection(id).unwrap();
        assert!(matches!(
            conn.open(IoMode::Input),
            Err(ConnectionError::AlreadyOpenDifferentMode)
        ));
        assert!(conn.open(IoMode::Output).is_ok());
    }

    #[test]
    fn disabled_sink_rejects_the_open() {
        let graph = Graph::new();
        let a = graph
            .add_node("a", Schema::new().output("out"), source_only)
            .unwrap();
        let b = graph
            .add_node("b", Schema::new().input("in"), source_only)
            .unwrap();
        graph.node(b).unwrap().input(0).unwrap().set_enabled(false);
        assert!(matches!(
            graph.connect((a, "out"), (b, "in")),
            Err(ConnectionError::SinkRejected)
        ));
    }

    #[test]
    fn unresolved_address_fails() {
        let graph = Graph::new();
        let a = graph
            .add_node("a", Schema::new().output("out"), source_only)
            .unwrap();
        assert!(matches!(
            graph.connect_address((a, "out"), "nowhere:xyz"),
            Err(ConnectionError::AddressUnresolved(_))
        ));
    }

    struct RecordingTransport {
        sent: Arc<StdMutex<Vec<Envelope>>>,
    }

    impl crate::connection::Transport for RecordingTransport {
        fn open(&self, _mode: IoMode) -> Result<(), ConnectionError> {
            Ok(())
        }
        fn send(&self, env: &Envelope) {
            self.sent.lock().unwrap().push(env.clone());
        }
        fn close(&self) {}
    }

    struct RecordingFactory {
        sent: Arc<StdMutex<Vec<Envelope>>>,
    }

    impl TransportFactory for RecordingFactory {
        fn name(&self) -> &'static str {
            "record"
        }
        fn try_create(&self, address: &str) -> Option<Box<dyn crate::connection::Transport>> {
            address.starts_with("tap").then(|| {
                Box::new(RecordingTransport {
                    sent: self.sent.clone(),
                }) as Box<dyn crate::connection::Transport>
            })
        }
    }

    #[test]
    fn addressed_transport_receives_publishes() {
        let graph = Graph::new();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        graph.register_transport(Arc::new(RecordingFactory { sent: sent.clone() }));
        let a = graph
            .add_node("a", Schema::new().output("out"), source_only)
            .unwrap();
        // prefixed and unprefixed resolution both land on the factory
        graph.connect_address((a, "out"), "record:tap-main").unwrap();
        let snapshot_src = graph.connect_address((a, "out"), "tap-side").unwrap();
        graph
            .node(a)
            .unwrap()
            .output(0)
            .unwrap()
            .publish(Envelope::from_value(3i64));
        assert_eq!(sent.lock().unwrap().len(), 2);
        assert_eq!(
            graph.connection(snapshot_src).unwrap().address(),
            Some("tap-side")
        );
    }

    #[test]
    fn remove_node_fails_loudly_with_open_connections() {
        let graph = Graph::new();
        let a = graph
            .add_node("a", Schema::new().output("out"), source_only)
            .unwrap();
        let b = graph
            .add_node("b", Schema::new().input("in"), source_only)
            .unwrap();
        let id = graph.connect((a, "out"), (b, "in")).unwrap();
        assert!(matches!(
            graph.remove_node(a),
            Err(GraphError::ConnectionsOpen(_))
        ));
        graph.disconnect(id);
        graph.remove_node(a).unwrap();
        assert!(graph.node(a).is_none());
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn auto_remove_retires_node_when_outputs_close() {
        let graph = Graph::new();
        let a = graph
            .add_node("a", Schema::new().output("out"), source_only)
            .unwrap();
        let b = graph
            .add_node("b", Schema::new().input("in"), source_only)
            .unwrap();
        let id = graph.connect((a, "out"), (b, "in")).unwrap();
        graph.node(a).unwrap().set_auto_remove(true);
        graph.connection(id).unwrap().close();
        assert!(graph.node(a).is_none());
        assert!(graph.node(b).is_some());
    }

    #[test]
    fn snapshot_round_trips_onto_a_fresh_node() {
        let graph = Graph::new();
        let schema = Schema::new().input("in").property("factor").output("out");
        let a = graph.add_node("a", schema.clone(), doubler).unwrap();
        let node = graph.node(a).unwrap();
        node.set_strategies(ScheduleStrategy::Asynchronous | ScheduleStrategy::SkipIfBusy);
        node.set_attribute("Name", "doubler");
        node.property_named("factor")
            .unwrap()
            .set_data(Envelope::from_value(2.5f64));

        let snapshot = graph.snapshot(a).unwrap();
        assert_eq!(snapshot.properties.len(), 1);

        let b = graph.add_node("b", schema, doubler).unwrap();
        graph.restore(b, &snapshot).unwrap();
        let restored = graph.node(b).unwrap();
        assert_eq!(restored.strategies(), snapshot.strategies);
        assert_eq!(
            restored
                .property_named("factor")
                .unwrap()
                .data()
                .value::<f64>(),
            Some(2.5)
        );
        assert_eq!(
            restored.attributes().get("Name"),
            Some(&serde_json::json!("doubler"))
        );
    }

    #[test]
    fn buffer_defaults_apply_to_live_inputs() {
        let graph = Graph::new();
        let a = graph
            .add_node("a", Schema::new().input("in"), source_only)
            .unwrap();
        let input = graph.node(a).unwrap().input(0).unwrap();
        for i in 0..5 {
            input.push(Envelope::from_value(i as i64));
        }
        assert_eq!(input.status(), Some(5));
        graph.set_default_buffer_limit(BufferLimit::count(2));
        // the new limit evicts down to the cap, oldest first
        input.push(Envelope::from_value(99i64));
        assert_eq!(input.status(), Some(2));
    }

    #[test]
    fn property_connection_never_triggers() {
        let graph = Graph::new();
        let a = graph
            .add_node("a", Schema::new().output("out"), source_only)
            .unwrap();
        let b = graph
            .add_node(
                "b",
                Schema::new().input("in").property("gain"),
                source_only,
            )
            .unwrap();
        graph.connect((a, "out"), (b, "gain")).unwrap();
        let node_b = graph.node(b).unwrap();
        node_b.set_strategies(
            ScheduleStrategy::Asynchronous | ScheduleStrategy::SkipIfNoInput,
        );
        graph
            .node(a)
            .unwrap()
            .output(0)
            .unwrap()
            .publish(Envelope::from_value(0.5f64));
        assert_eq!(
            node_b
                .property_named("gain")
                .unwrap()
                .data()
                .value::<f64>(),
            Some(0.5)
        );
        assert_eq!(node_b.scheduled(), 0);
    }
}

use derive_new::new;
use std::sync::{Arc, Mutex, Weak};
use strum_macros::Display;
use thiserror::Error;

use crate::envelope::Envelope;
use crate::graph::{GraphShared, NodeHandle};
use crate::ports::SinkSlot;

/// Identifies a connection within its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub(crate) usize);

/// Which side of a channel a connection was opened as.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum IoMode {
    /// Receiving side: envelopes arrive through the connection.
    Input,
    /// Sending side: envelopes leave through the connection.
    Output,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("no transport claims address '{0}'")]
    AddressUnresolved(String),
    #[error("connection is already open in a different mode")]
    AlreadyOpenDifferentMode,
    #[error("sink port rejected the connection")]
    SinkRejected,
    #[error("unknown node or port '{0}'")]
    UnknownEndpoint(String),
}

/// One end of a connection, addressed by stable handle and port name so
/// teardown order never matters.
#[derive(new, Clone, Debug)]
pub struct Endpoint {
    pub node: NodeHandle,
    pub port: String,
}

/// A non-direct way of moving envelopes, selected by address.
///
/// The engine only ships the direct in-process handoff; transports are the
/// extension point for shared-memory or network channels.  A transport must
/// preserve per-sink delivery order even when it forwards asynchronously.
pub trait Transport: Send + Sync {
    fn open(&self, mode: IoMode) -> Result<(), ConnectionError>;
    fn send(&self, env: &Envelope);
    fn close(&self);
}

/// Builds [Transport]s from addresses.  Factories are registered on the
/// graph; an address `"zmq:tcp://..."` selects the factory named `zmq`,
/// an unprefixed address is offered to every factory in registration order.
pub trait TransportFactory: Send + Sync {
    fn name(&self) -> &'static str;
    /// Returns `None` when this factory does not claim the address.
    fn try_create(&self, address: &str) -> Option<Box<dyn Transport>>;
}

/// Splits an optional `"<transport>:"` prefix off an address.  The
/// remainder is transport-specific and opaque to the engine.
pub(crate) fn split_address(address: &str) -> (Option<&str>, &str) {
    match address.split_once(':') {
        Some((prefix, rest)) if !prefix.is_empty() => (Some(prefix), rest),
        _ => (None, address),
    }
}

/// A directed edge from one output to one sink (input or property), or to
/// an addressed transport.
///
/// Closed connections forward nothing: [Connection::send] on a closed
/// connection is a no-op, not an error.  [Connection::close] is idempotent
/// and notifies both endpoint nodes.
pub struct Connection {
    pub(crate) id: ConnectionId,
    pub(crate) source: Endpoint,
    pub(crate) sink: Option<Endpoint>,
    pub(crate) address: Option<String>,
    pub(crate) transport: Option<Box<dyn Transport>>,
    mode: Mutex<Option<IoMode>>,
    graph: Weak<GraphShared>,
}

impl Connection {
    pub(crate) fn direct(
        id: ConnectionId,
        source: Endpoint,
        sink: Endpoint,
        graph: &Arc<GraphShared>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            source,
            sink: Some(sink),
            address: None,
            transport: None,
            mode: Mutex::new(None),
            graph: Arc::downgrade(graph),
        })
    }

    pub(crate) fn addressed(
        id: ConnectionId,
        source: Endpoint,
        address: String,
        transport: Box<dyn Transport>,
        graph: &Arc<GraphShared>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            source,
            sink: None,
            address: Some(address),
            transport: Some(transport),
            mode: Mutex::new(None),
            graph: Arc::downgrade(graph),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn source(&self) -> &Endpoint {
        &self.source
    }

    pub fn sink(&self) -> Option<&Endpoint> {
        self.sink.as_ref()
    }

    /// The address this connection was resolved from, if any.  Direct
    /// in-process edges have none.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.mode.lock().unwrap().is_some()
    }

    pub fn open_mode(&self) -> Option<IoMode> {
        *self.mode.lock().unwrap()
    }

    /// Marks the link active.  Re-opening in the same mode is a no-op;
    /// a different mode is refused.  A disabled sink port refuses the open.
    pub fn open(&self, mode: IoMode) -> Result<(), ConnectionError> {
        let mut current = self.mode.lock().unwrap();
        if let Some(open_mode) = *current {
            if open_mode != mode {
                return Err(ConnectionError::AlreadyOpenDifferentMode);
            }
            return Ok(());
        }
        if let Some(sink) = &self.sink {
            let accepts = self
                .graph
                .upgrade()
                .and_then(|graph| graph.cell(sink.node))
                .map(|cell| cell.sink_accepts(&sink.port))
                .unwrap_or(false);
            if !accepts {
                return Err(ConnectionError::SinkRejected);
            }
        }
        if let Some(transport) = &self.transport {
            transport.open(mode)?;
        }
        *current = Some(mode);
        debug!(
            "connection {:?} open ({mode}) {} -> {}",
            self.id,
            self.source.port,
            self.sink
                .as_ref()
                .map(|s| s.port.as_str())
                .or(self.address.as_deref())
                .unwrap_or("?"),
        );
        Ok(())
    }

    /// Releases the link and tells both endpoint nodes.  Safe to call any
    /// number of times.
    pub fn close(&self) {
        {
            let mut current = self.mode.lock().unwrap();
            if current.is_none() {
                return;
            }
            *current = None;
        }
        if let Some(transport) = &self.transport {
            transport.close();
        }
        debug!("connection {:?} closed", self.id);
        if let Some(graph) = self.graph.upgrade() {
            graph.connection_closed(self);
        }
    }

    /// Forwards an envelope to the sink.  No-op while closed.
    pub fn send(&self, env: &Envelope) {
        if !self.is_open() {
            return;
        }
        if let Some(transport) = &self.transport {
            transport.send(env);
        }
        self.deliver(env);
    }

    /// Entry point for transports receiving envelopes from elsewhere:
    /// hands the envelope to the sink port, subject to the same open check.
    pub fn inject(&self, env: Envelope) {
        if !self.is_open() {
            return;
        }
        self.deliver(&env);
    }

    fn deliver(&self, env: &Envelope) {
        let Some(sink) = &self.sink else {
            return;
        };
        let Some(graph) = self.graph.upgrade() else {
            return;
        };
        let Some(cell) = graph.cell(sink.node) else {
            return;
        };
        let slot = {
            let ports = cell.ports.read().unwrap();
            ports.find_sink(&sink.port)
        };
        match slot {
            Some(SinkSlot::Input(input)) => cell.push_input(&graph, &input, env.clone()),
            Some(SinkSlot::Property(property)) => {
                if property.is_enabled() {
                    *property.value.lock().unwrap() = env.clone();
                }
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn address_prefix_is_optional() {
        assert_eq!(split_address("zmq:tcp://host:5555"), (Some("zmq"), "tcp://host:5555"));
        assert_eq!(split_address("plain-address"), (None, "plain-address"));
        assert_eq!(split_address(":odd"), (None, ":odd"));
    }
}

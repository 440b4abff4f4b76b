use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use strum_macros::Display;
use thiserror::Error;

use crate::buffer::{BufferKind, BufferLimit, InputBuffer};
use crate::connection::ConnectionId;
use crate::envelope::Envelope;

/// The six port flavours a node schema can declare.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum PortKind {
    Input,
    MultiInput,
    Property,
    MultiProperty,
    Output,
    MultiOutput,
}

/// A schema problem is a construction-time error: nodes with a bad port
/// layout fail to build, they never fail at runtime.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("duplicate port name '{0}'")]
    DuplicateName(String),
    #[error("multi port '{0}': min {1} exceeds max {2}")]
    InvalidBounds(String, usize, usize),
}

#[derive(Clone)]
pub(crate) struct SchemaEntry {
    pub name: String,
    pub kind: PortKind,
    pub buffer: BufferKind,
    pub min: usize,
    pub max: usize,
    pub initial: usize,
}

/// Declares the ports of a node type, once, before the node exists.
///
/// ```
/// use tideway::{BufferKind, Schema};
///
/// let schema = Schema::new()
///     .input("samples")
///     .input_buffered("reference", BufferKind::LastValue)
///     .property("factor")
///     .output("scaled");
/// ```
#[derive(Clone, Default)]
pub struct Schema {
    pub(crate) entries: Vec<SchemaEntry>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single input with the default FIFO buffer.
    pub fn input(self, name: &str) -> Self {
        self.input_buffered(name, BufferKind::Fifo)
    }

    /// A single input with an explicit buffering discipline.
    pub fn input_buffered(mut self, name: &str, buffer: BufferKind) -> Self {
        self.entries.push(SchemaEntry {
            name: name.to_string(),
            kind: PortKind::Input,
            buffer,
            min: 1,
            max: 1,
            initial: 1,
        });
        self
    }

    /// A resizable collection of inputs.  Starts at `min` slots.
    pub fn multi_input(mut self, name: &str, min: usize, max: usize) -> Self {
        self.entries.push(SchemaEntry {
            name: name.to_string(),
            kind: PortKind::MultiInput,
            buffer: BufferKind::Fifo,
            min,
            max,
            initial: min,
        });
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        self.entries.push(SchemaEntry {
            name: name.to_string(),
            kind: PortKind::Output,
            buffer: BufferKind::Fifo,
            min: 1,
            max: 1,
            initial: 1,
        });
        self
    }

    pub fn multi_output(mut self, name: &str, min: usize, max: usize) -> Self {
        self.entries.push(SchemaEntry {
            name: name.to_string(),
            kind: PortKind::MultiOutput,
            buffer: BufferKind::Fifo,
            min,
            max,
            initial: min,
        });
        self
    }

    pub fn property(mut self, name: &str) -> Self {
        self.entries.push(SchemaEntry {
            name: name.to_string(),
            kind: PortKind::Property,
            buffer: BufferKind::Fifo,
            min: 1,
            max: 1,
            initial: 1,
        });
        self
    }

    pub fn multi_property(mut self, name: &str, min: usize, max: usize) -> Self {
        self.entries.push(SchemaEntry {
            name: name.to_string(),
            kind: PortKind::MultiProperty,
            buffer: BufferKind::Fifo,
            min,
            max,
            initial: min,
        });
        self
    }

    pub(crate) fn validate(&self) -> Result<(), SchemaError> {
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.min > entry.max {
                return Err(SchemaError::InvalidBounds(
                    entry.name.clone(),
                    entry.min,
                    entry.max,
                ));
            }
            if self.entries[..i].iter().any(|e| e.name == entry.name) {
                return Err(SchemaError::DuplicateName(entry.name.clone()));
            }
        }
        Ok(())
    }
}

// Port slots.  A slot's hot state (buffer, value) sits behind its own
// mutex with push/pop-sized critical sections; connection membership is
// locked separately so wiring never contends with data flow.

pub(crate) struct InputSlot {
    pub name: String,
    pub enabled: AtomicBool,
    pub buffer: Mutex<InputBuffer>,
    pub sources: Mutex<Vec<ConnectionId>>,
}

impl InputSlot {
    pub fn new(name: &str, kind: BufferKind, limit: BufferLimit) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            enabled: AtomicBool::new(true),
            buffer: Mutex::new(InputBuffer::new(kind, limit)),
            sources: Mutex::new(Vec::new()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

pub(crate) struct OutputSlot {
    pub name: String,
    pub enabled: AtomicBool,
    /// Latest published envelope; held across fan-out so two publishes
    /// from the same output never interleave their deliveries.
    pub value: Mutex<Envelope>,
    pub buffered: AtomicBool,
    pub overflow: Mutex<Vec<Envelope>>,
    pub sinks: Mutex<Vec<ConnectionId>>,
}

impl OutputSlot {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            enabled: AtomicBool::new(true),
            value: Mutex::new(Envelope::empty()),
            buffered: AtomicBool::new(false),
            overflow: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
        })
    }
}

pub(crate) struct PropertySlot {
    pub name: String,
    pub enabled: AtomicBool,
    pub value: Mutex<Envelope>,
    pub sources: Mutex<Vec<ConnectionId>>,
}

impl PropertySlot {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            enabled: AtomicBool::new(true),
            value: Mutex::new(Envelope::empty()),
            sources: Mutex::new(Vec::new()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// A named group of slots: singular ports own exactly one fixed slot,
/// multi ports own an ordered, bounds-checked vector of them.
pub(crate) struct PortGroup<S> {
    pub name: String,
    pub slots: Vec<Arc<S>>,
    /// `None` marks a singular port; multi ports carry (min, max).
    pub bounds: Option<(usize, usize)>,
}

impl<S> PortGroup<S> {
    pub fn singular(name: &str, slot: Arc<S>) -> Self {
        Self {
            name: name.to_string(),
            slots: vec![slot],
            bounds: None,
        }
    }

    pub fn multi(name: &str, slots: Vec<Arc<S>>, min: usize, max: usize) -> Self {
        Self {
            name: name.to_string(),
            slots,
            bounds: Some((min, max)),
        }
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// Grows or shrinks to `n` slots.  Fails without side effects when the
    /// bounds would be violated or the port is singular.
    pub fn resize_with(&mut self, n: usize, make: impl Fn(&str) -> Arc<S>) -> bool {
        let Some((min, max)) = self.bounds else {
            return false;
        };
        if n < min || n > max {
            return false;
        }
        while self.slots.len() > n {
            self.slots.pop();
        }
        while self.slots.len() < n {
            self.slots.push(make(&self.name));
        }
        true
    }

    pub fn insert_with(&mut self, index: usize, make: impl Fn(&str) -> Arc<S>) -> bool {
        let Some((_, max)) = self.bounds else {
            return false;
        };
        if self.slots.len() >= max || index > self.slots.len() {
            return false;
        }
        self.slots.insert(index, make(&self.name));
        true
    }

    pub fn remove_at(&mut self, index: usize) -> bool {
        let Some((min, _)) = self.bounds else {
            return false;
        };
        if self.slots.len() <= min || index >= self.slots.len() {
            return false;
        }
        self.slots.remove(index);
        true
    }
}

/// A connection sink can be an input or a property.
pub(crate) enum SinkSlot {
    Input(Arc<InputSlot>),
    Property(Arc<PropertySlot>),
}

/// All ports of one node, built once from its schema.
pub(crate) struct PortTable {
    pub inputs: Vec<PortGroup<InputSlot>>,
    pub outputs: Vec<PortGroup<OutputSlot>>,
    pub properties: Vec<PortGroup<PropertySlot>>,
}

impl PortTable {
    pub fn from_schema(schema: &Schema, limit: BufferLimit) -> Self {
        let mut table = Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            properties: Vec::new(),
        };
        for entry in &schema.entries {
            match entry.kind {
                PortKind::Input => {
                    table.inputs.push(PortGroup::singular(
                        &entry.name,
                        InputSlot::new(&entry.name, entry.buffer, limit),
                    ));
                }
                PortKind::MultiInput => {
                    let slots = (0..entry.initial)
                        .map(|_| InputSlot::new(&entry.name, entry.buffer, limit))
                        .collect();
                    table
                        .inputs
                        .push(PortGroup::multi(&entry.name, slots, entry.min, entry.max));
                }
                PortKind::Output => {
                    table
                        .outputs
                        .push(PortGroup::singular(&entry.name, OutputSlot::new(&entry.name)));
                }
                PortKind::MultiOutput => {
                    let slots = (0..entry.initial)
                        .map(|_| OutputSlot::new(&entry.name))
                        .collect();
                    table
                        .outputs
                        .push(PortGroup::multi(&entry.name, slots, entry.min, entry.max));
                }
                PortKind::Property => {
                    table.properties.push(PortGroup::singular(
                        &entry.name,
                        PropertySlot::new(&entry.name),
                    ));
                }
                PortKind::MultiProperty => {
                    let slots = (0..entry.initial)
                        .map(|_| PropertySlot::new(&entry.name))
                        .collect();
                    table
                        .properties
                        .push(PortGroup::multi(&entry.name, slots, entry.min, entry.max));
                }
            }
        }
        table
    }

    pub fn flat_inputs(&self) -> impl Iterator<Item = &Arc<InputSlot>> {
        self.inputs.iter().flat_map(|group| group.slots.iter())
    }

    pub fn input_flat(&self, index: usize) -> Option<Arc<InputSlot>> {
        self.flat_inputs().nth(index).cloned()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.iter().map(PortGroup::count).sum()
    }

    pub fn find_input(&self, name: &str) -> Option<Arc<InputSlot>> {
        self.inputs
            .iter()
            .find(|group| group.name == name)
            .and_then(|group| group.slots.first().cloned())
    }

    pub fn flat_outputs(&self) -> impl Iterator<Item = &Arc<OutputSlot>> {
        self.outputs.iter().flat_map(|group| group.slots.iter())
    }

    pub fn output_flat(&self, index: usize) -> Option<Arc<OutputSlot>> {
        self.flat_outputs().nth(index).cloned()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.iter().map(PortGroup::count).sum()
    }

    pub fn find_output(&self, name: &str) -> Option<Arc<OutputSlot>> {
        self.outputs
            .iter()
            .find(|group| group.name == name)
            .and_then(|group| group.slots.first().cloned())
    }

    pub fn property_flat(&self, index: usize) -> Option<Arc<PropertySlot>> {
        self.properties
            .iter()
            .flat_map(|group| group.slots.iter())
            .nth(index)
            .cloned()
    }

    pub fn property_count(&self) -> usize {
        self.properties.iter().map(PortGroup::count).sum()
    }

    pub fn find_property(&self, name: &str) -> Option<Arc<PropertySlot>> {
        self.properties
            .iter()
            .find(|group| group.name == name)
            .and_then(|group| group.slots.first().cloned())
    }

    /// Resolves a name to something a connection can deliver into.
    pub fn find_sink(&self, name: &str) -> Option<SinkSlot> {
        if let Some(input) = self.find_input(name) {
            return Some(SinkSlot::Input(input));
        }
        self.find_property(name).map(SinkSlot::Property)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn duplicate_port_names_fail_validation() {
        let schema = Schema::new().input("data").output("data");
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::DuplicateName(name)) if name == "data"
        ));
    }

    #[test]
    fn multi_group_respects_bounds() {
        let schema = Schema::new().multi_input("inputs", 1, 3);
        schema.validate().unwrap();
        let mut table = PortTable::from_schema(&schema, BufferLimit::default());
        let make = |name: &str| InputSlot::new(name, BufferKind::Fifo, BufferLimit::default());
        let group = &mut table.inputs[0];
        assert_eq!(group.count(), 1);
        assert!(group.resize_with(3, make));
        assert!(!group.resize_with(4, make)); // above max, no mutation
        assert_eq!(group.count(), 3);
        assert!(!group.insert_with(0, make)); // already full
        assert!(group.remove_at(2));
        assert!(group.remove_at(1));
        assert!(!group.remove_at(0)); // below min
        assert_eq!(group.count(), 1);
    }

    #[test]
    fn singular_ports_cannot_be_resized() {
        let schema = Schema::new().input("data");
        let mut table = PortTable::from_schema(&schema, BufferLimit::default());
        let make = |name: &str| InputSlot::new(name, BufferKind::Fifo, BufferLimit::default());
        assert!(!table.inputs[0].resize_with(2, make));
        assert_eq!(table.inputs[0].count(), 1);
    }

    #[test]
    fn flat_indexing_spans_groups() {
        let schema = Schema::new().input("first").multi_input("rest", 2, 4);
        let table = PortTable::from_schema(&schema, BufferLimit::default());
        assert_eq!(table.input_count(), 3);
        assert_eq!(table.input_flat(0).unwrap().name, "first");
        assert_eq!(table.input_flat(2).unwrap().name, "rest");
        assert!(table.input_flat(3).is_none());
    }
}

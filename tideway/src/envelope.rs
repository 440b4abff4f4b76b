use serde_json::Value;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::time::NanoTime;

/// Identifies the node that produced an envelope.  Provenance only -
/// the engine records it on every envelope a node creates but never
/// dereferences it.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl SourceId {
    pub const NONE: Self = Self(0);
}

/// The type-erased payload carried by an [Envelope].  The engine is
/// payload agnostic: callers store numeric values, sample vectors,
/// geometry handles or whatever else their nodes exchange.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Free-form attributes attached to an [Envelope] or a node.
pub type AttributeMap = HashMap<String, Value>;

/// List of attribute keys whose value actually changed in a merge.
pub type ChangedKeys = SmallVec<[String; 4]>;

/// The value exchanged between ports: an opaque payload, a timestamp,
/// the producing node and a free-form attribute map.
///
/// An envelope with no payload is the canonical "no data" value;
/// buffers and trigger evaluation treat it as absent, never as a
/// zero-filled payload.
#[derive(Clone, Default)]
pub struct Envelope {
    payload: Option<Payload>,
    time: NanoTime,
    source: SourceId,
    attributes: AttributeMap,
    footprint: usize,
}

impl Envelope {
    /// The canonical empty envelope: no payload, no time, no source.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps a concrete value.  The byte footprint used by memory-limited
    /// input buffers is captured here, while the concrete type is still
    /// known; heap-heavy payloads should correct it with [Envelope::set_footprint].
    pub fn from_value<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            payload: Some(Arc::new(value)),
            time: NanoTime::INVALID,
            source: SourceId::NONE,
            attributes: AttributeMap::new(),
            footprint: std::mem::size_of::<T>(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
    }

    pub fn is_valid(&self) -> bool {
        !self.is_empty()
    }

    /// Borrow the payload as a concrete type, if it is one.
    pub fn value_ref<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref::<T>()
    }

    /// Clone the payload out as a concrete type, if it is one.
    pub fn value<T: Any + Clone>(&self) -> Option<T> {
        self.value_ref::<T>().cloned()
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Adopts another envelope's payload (and footprint), keeping this
    /// envelope's time, source and attributes.
    pub fn set_payload_from(&mut self, other: &Envelope) {
        self.payload = other.payload.clone();
        self.footprint = other.footprint;
    }

    pub fn time(&self) -> NanoTime {
        self.time
    }

    pub fn set_time(&mut self, time: NanoTime) {
        self.time = time;
    }

    pub fn with_time(mut self, time: NanoTime) -> Self {
        self.time = time;
        self
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn set_source(&mut self, source: SourceId) {
        self.source = source;
    }

    pub fn with_source(mut self, source: SourceId) -> Self {
        self.source = source;
        self
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Merges `attrs` into this envelope's attributes, overriding on key
    /// collision and leaving unrelated keys in place.  Returns the keys
    /// whose value actually changed.
    pub fn merge_attributes(&mut self, attrs: &AttributeMap) -> ChangedKeys {
        let mut changed = ChangedKeys::new();
        for (key, value) in attrs {
            if self.attributes.get(key) != Some(value) {
                self.attributes.insert(key.clone(), value.clone());
                changed.push(key.clone());
            }
        }
        changed
    }

    /// The conventional "Name" attribute, inherited from the producing node.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.set_attribute("Name", name.into());
    }

    pub fn name(&self) -> Option<&str> {
        self.attribute("Name").and_then(Value::as_str)
    }

    pub fn footprint(&self) -> usize {
        self.footprint
    }

    pub fn set_footprint(&mut self, bytes: usize) {
        self.footprint = bytes;
    }

    /// Approximate total memory footprint, payload plus attributes.
    pub fn memory_footprint(&self) -> usize {
        let attrs: usize = self
            .attributes
            .iter()
            .map(|(k, _)| k.len() + std::mem::size_of::<Value>())
            .sum();
        self.footprint + attrs
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("payload", &self.payload.as_ref().map(|_| "<opaque>"))
            .field("time", &self.time)
            .field("source", &self.source)
            .field("attributes", &self.attributes.len())
            .finish()
    }
}

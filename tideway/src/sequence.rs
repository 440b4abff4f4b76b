use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::buffer::BufferLimit;
use crate::node::{Compute, ComputeError, NodeCell, NodeRef};
use crate::ports::{Schema, SchemaError};

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("child must have exactly one input, found {0}")]
    WrongInputCount(usize),
    #[error("child must have at least one output")]
    NoOutput,
    #[error("child is already part of the sequence")]
    Duplicate,
    #[error("index {0} out of bounds")]
    OutOfBounds(usize),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// A child taken out of a [Sequence] with [Sequence::take].  It can be
/// re-inserted, into the same sequence or another one.
pub struct Child {
    cell: Arc<NodeCell>,
    enabled: bool,
}

impl Child {
    pub fn name(&self) -> &str {
        &self.cell.name
    }
}

struct SequenceInner {
    children: Mutex<Vec<(Arc<NodeCell>, bool)>>,
    applying: AtomicBool,
}

/// A node that pipes its single input through an ordered chain of child
/// nodes and publishes the last child's first output.
///
/// The sequence owns its children: they are not part of any graph arena,
/// they cannot be wired from outside, and dropping the sequence drops them.
/// Each child must have exactly one input and at least one output.  The
/// handle is cheap to clone, so the same value can serve as the node's
/// [Compute] and as the mutation surface:
///
/// ```no_run
/// use tideway::{ComputeError, Graph, NodeRef, Schema, Sequence};
///
/// let graph = Graph::new();
/// let chain = Sequence::new();
/// chain
///     .append(
///         "plus-one",
///         Schema::new().input("in").output("out"),
///         |node: &NodeRef| -> Result<(), ComputeError> {
///             let x = node.input(0).unwrap().data().value::<i64>().unwrap_or(0);
///             node.output(0).unwrap().publish(node.create(x + 1));
///             Ok(())
///         },
///     )
///     .unwrap();
/// let handle = graph
///     .add_node("chain", Sequence::schema(), chain.clone())
///     .unwrap();
/// # let _ = handle;
/// ```
#[derive(Clone)]
pub struct Sequence {
    inner: Arc<SequenceInner>,
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequence {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SequenceInner {
                children: Mutex::new(Vec::new()),
                applying: AtomicBool::new(false),
            }),
        }
    }

    /// The port layout of the sequence node itself: one input, one output.
    pub fn schema() -> Schema {
        Schema::new().input("input").output("output")
    }

    pub fn len(&self) -> usize {
        self.inner.children.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds a child node at the end of the chain.
    pub fn append<C: Compute + 'static>(
        &self,
        name: &str,
        schema: Schema,
        compute: C,
    ) -> Result<(), SequenceError> {
        let len = self.len();
        self.insert(len, name, schema, compute)
    }

    /// Builds a child node at `index`.
    pub fn insert<C: Compute + 'static>(
        &self,
        index: usize,
        name: &str,
        schema: Schema,
        compute: C,
    ) -> Result<(), SequenceError> {
        let cell = NodeCell::new(
            name,
            tynm::type_name::<C>(),
            &schema,
            Box::new(compute),
            BufferLimit::default(),
        )?;
        self.insert_cell(index, cell, true)
    }

    /// Re-inserts a child previously removed with [Sequence::take].
    pub fn insert_child(&self, index: usize, child: Child) -> Result<(), SequenceError> {
        self.insert_cell(index, child.cell, child.enabled)
    }

    fn insert_cell(
        &self,
        index: usize,
        cell: Arc<NodeCell>,
        enabled: bool,
    ) -> Result<(), SequenceError> {
        {
            let ports = cell.ports.read().unwrap();
            let inputs = ports.input_count();
            if inputs != 1 {
                return Err(SequenceError::WrongInputCount(inputs));
            }
            if ports.output_count() == 0 {
                return Err(SequenceError::NoOutput);
            }
        }
        let mut children = self.inner.children.lock().unwrap();
        if index > children.len() {
            return Err(SequenceError::OutOfBounds(index));
        }
        if children.iter().any(|(existing, _)| Arc::ptr_eq(existing, &cell)) {
            return Err(SequenceError::Duplicate);
        }
        children.insert(index, (cell, enabled));
        Ok(())
    }

    /// Drops the child at `index`.
    pub fn remove(&self, index: usize) -> bool {
        let mut children = self.inner.children.lock().unwrap();
        if index >= children.len() {
            return false;
        }
        children.remove(index);
        true
    }

    /// Removes and returns the child at `index`.
    pub fn take(&self, index: usize) -> Option<Child> {
        let mut children = self.inner.children.lock().unwrap();
        if index >= children.len() {
            return None;
        }
        let (cell, enabled) = children.remove(index);
        Some(Child { cell, enabled })
    }

    /// Disabled children are skipped by the chain, not removed from it.
    pub fn set_child_enabled(&self, index: usize, enabled: bool) -> bool {
        let mut children = self.inner.children.lock().unwrap();
        match children.get_mut(index) {
            Some(entry) => {
                entry.1 = enabled;
                true
            }
            None => false,
        }
    }

    pub fn child_name(&self, index: usize) -> Option<String> {
        self.inner
            .children
            .lock()
            .unwrap()
            .get(index)
            .map(|(cell, _)| cell.name.clone())
    }
}

impl Compute for Sequence {
    fn compute(&mut self, node: &NodeRef) -> Result<(), ComputeError> {
        if self.inner.applying.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let applying = scopeguard::guard(&self.inner.applying, |flag| {
            flag.store(false, Ordering::SeqCst);
        });

        let input = node
            .input(0)
            .ok_or_else(|| ComputeError::runtime("sequence node lost its input port"))?;
        let output = node
            .output(0)
            .ok_or_else(|| ComputeError::runtime("sequence node lost its output port"))?;
        let children: Vec<(Arc<NodeCell>, bool)> =
            self.inner.children.lock().unwrap().clone();

        // the rolling envelope keeps the input's timestamp; children only
        // contribute payloads and attributes
        let mut data = input.data();

        for (cell, enabled) in &children {
            if !enabled {
                continue;
            }
            let child = NodeRef::for_cell(node.graph.clone(), cell.clone());
            if let Some(port) = child.input(0) {
                port.push(data.clone());
            }
            child.trigger(true);
            if let Some(err) = child.last_error() {
                // the chain stops at the first failing child; what was
                // produced so far is still published below
                node.set_error(err.message.clone(), err.code);
                break;
            }
            if let Some(port) = child.output(0) {
                let produced = port.data();
                data.merge_attributes(produced.attributes());
                data.set_payload_from(&produced);
            }
        }

        output.publish(node.stamp(data));
        drop(applying);
        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::envelope::Envelope;
    use crate::graph::Graph;
    use crate::node::ErrorCode;
    use crate::time::NanoTime;

    fn plus_one(node: &NodeRef) -> Result<(), ComputeError> {
        let x = node
            .input(0)
            .unwrap()
            .data()
            .value::<i64>()
            .ok_or_else(|| ComputeError::new(ErrorCode::WrongInputType, "expected i64"))?;
        node.output(0).unwrap().publish(node.create(x + 1));
        Ok(())
    }

    fn times_two(node: &NodeRef) -> Result<(), ComputeError> {
        let x = node
            .input(0)
            .unwrap()
            .data()
            .value::<i64>()
            .ok_or_else(|| ComputeError::new(ErrorCode::WrongInputType, "expected i64"))?;
        node.output(0).unwrap().publish(node.create(x * 2));
        Ok(())
    }

    fn io_schema() -> Schema {
        Schema::new().input("in").output("out")
    }

    #[test]
    fn chains_children_in_order() {
        let graph = Graph::new();
        let chain = Sequence::new();
        chain.append("plus-one", io_schema(), plus_one).unwrap();
        chain.append("times-two", io_schema(), times_two).unwrap();
        let handle = graph
            .add_node("chain", Sequence::schema(), chain.clone())
            .unwrap();
        let node = graph.node(handle).unwrap();
        node.input(0)
            .unwrap()
            .push(Envelope::from_value(3i64).with_time(NanoTime::new(50)));
        assert!(node.trigger(false));
        let out = node.output(0).unwrap().data();
        assert_eq!(out.value::<i64>(), Some(8)); // (3 + 1) * 2
        assert_eq!(out.time(), NanoTime::new(50));
    }

    #[test]
    fn empty_sequence_passes_the_input_through() {
        let graph = Graph::new();
        let chain = Sequence::new();
        let handle = graph
            .add_node("chain", Sequence::schema(), chain.clone())
            .unwrap();
        let node = graph.node(handle).unwrap();
        node.input(0)
            .unwrap()
            .push(Envelope::from_value(11i64).with_time(NanoTime::new(9)));
        assert!(node.trigger(false));
        let out = node.output(0).unwrap().data();
        assert_eq!(out.value::<i64>(), Some(11));
        assert_eq!(out.time(), NanoTime::new(9));
    }

    #[test]
    fn disabled_children_are_skipped() {
        let graph = Graph::new();
        let chain = Sequence::new();
        chain.append("plus-one", io_schema(), plus_one).unwrap();
        chain.append("times-two", io_schema(), times_two).unwrap();
        chain.set_child_enabled(0, false);
        let handle = graph
            .add_node("chain", Sequence::schema(), chain.clone())
            .unwrap();
        let node = graph.node(handle).unwrap();
        node.input(0).unwrap().push(Envelope::from_value(3i64));
        node.trigger(false);
        assert_eq!(node.output(0).unwrap().data().value::<i64>(), Some(6));
    }

    #[test]
    fn child_error_stops_the_chain_and_lands_on_the_sequence() {
        let graph = Graph::new();
        let chain = Sequence::new();
        chain.append("plus-one", io_schema(), plus_one).unwrap();
        chain
            .append(
                "broken",
                io_schema(),
                |_node: &NodeRef| -> Result<(), ComputeError> {
                    Err(ComputeError::new(ErrorCode::DeviceNotOpen, "camera offline"))
                },
            )
            .unwrap();
        chain.append("times-two", io_schema(), times_two).unwrap();
        let handle = graph
            .add_node("chain", Sequence::schema(), chain.clone())
            .unwrap();
        let node = graph.node(handle).unwrap();
        node.input(0).unwrap().push(Envelope::from_value(3i64));
        node.trigger(false);
        let error = node.last_error().unwrap();
        assert_eq!(error.code, ErrorCode::DeviceNotOpen);
        // published output reflects the chain up to the failure
        assert_eq!(node.output(0).unwrap().data().value::<i64>(), Some(4));
    }

    #[test]
    fn children_must_fit_the_one_in_one_out_shape() {
        let chain = Sequence::new();
        let no_output = Schema::new().input("in");
        assert!(matches!(
            chain.append("bad", no_output, plus_one),
            Err(SequenceError::NoOutput)
        ));
        let two_inputs = Schema::new().input("a").input("b").output("out");
        assert!(matches!(
            chain.append("bad", two_inputs, plus_one),
            Err(SequenceError::WrongInputCount(2))
        ));
        assert!(chain.is_empty());
    }

    #[test]
    fn taken_children_can_move_but_not_duplicate() {
        let chain = Sequence::new();
        chain.append("plus-one", io_schema(), plus_one).unwrap();
        chain.append("times-two", io_schema(), times_two).unwrap();
        let child = chain.take(0).unwrap();
        assert_eq!(child.name(), "plus-one");
        assert_eq!(chain.len(), 1);
        // moving it to the back is fine
        chain.insert_child(1, child).unwrap();
        assert_eq!(chain.child_name(1).as_deref(), Some("plus-one"));
        assert_eq!(chain.len(), 2);
    }
}

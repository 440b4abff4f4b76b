use std::any::Any;
use std::marker::PhantomData;

use crate::node::{Compute, ComputeError, NodeRef};
use crate::ports::Schema;

/// Port layout for a [Generator] node: a single output.
pub fn generator_schema() -> Schema {
    Schema::new().output("output")
}

/// Publishes the value produced by its closure on every forced trigger.
/// A node with no inputs never satisfies the freshness gate, so drive it
/// with `trigger(true)`.
pub struct Generator<T, F> {
    func: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> Generator<T, F>
where
    T: Any + Send + Sync,
    F: FnMut() -> T + Send,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

impl<T, F> Compute for Generator<T, F>
where
    T: Any + Send + Sync,
    F: FnMut() -> T + Send,
{
    fn compute(&mut self, node: &NodeRef) -> Result<(), ComputeError> {
        let value = (self.func)();
        let output = node
            .output(0)
            .ok_or_else(|| ComputeError::runtime("generator node has no output port"))?;
        output.publish(node.create(value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::graph::Graph;

    #[test]
    fn publishes_on_every_forced_trigger() {
        let graph = Graph::new();
        let mut counter = 0i64;
        let handle = graph
            .add_node(
                "counter",
                generator_schema(),
                Generator::new(move || {
                    counter += 1;
                    counter
                }),
            )
            .unwrap();
        let node = graph.node(handle).unwrap();
        assert!(node.trigger(true));
        assert!(node.trigger(true));
        assert_eq!(node.output(0).unwrap().data().value::<i64>(), Some(2));
        // without force there is no fresh input to fire on
        assert!(!node.trigger(false));
    }
}

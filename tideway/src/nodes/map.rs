use std::any::Any;
use std::marker::PhantomData;

use crate::node::{Compute, ComputeError, ErrorCode, NodeRef};
use crate::ports::Schema;

/// Port layout for a [Map] node: one input, one output.
pub fn map_schema() -> Schema {
    Schema::new().input("input").output("output")
}

/// Transforms its input payload with the supplied closure and publishes
/// the result.  An empty or differently-typed input is reported as a
/// [ErrorCode::WrongInputType] error.
pub struct Map<IN, OUT, F> {
    func: F,
    _marker: PhantomData<fn(IN) -> OUT>,
}

impl<IN, OUT, F> Map<IN, OUT, F>
where
    IN: Any + Clone,
    OUT: Any + Send + Sync,
    F: FnMut(IN) -> OUT + Send,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

impl<IN, OUT, F> Compute for Map<IN, OUT, F>
where
    IN: Any + Clone,
    OUT: Any + Send + Sync,
    F: FnMut(IN) -> OUT + Send,
{
    fn compute(&mut self, node: &NodeRef) -> Result<(), ComputeError> {
        let input = node
            .input(0)
            .ok_or_else(|| ComputeError::runtime("map node has no input port"))?;
        let env = input.data();
        let value = env.value::<IN>().ok_or_else(|| {
            ComputeError::new(
                ErrorCode::WrongInputType,
                format!("expected {}", tynm::type_name::<IN>()),
            )
        })?;
        let output = node
            .output(0)
            .ok_or_else(|| ComputeError::runtime("map node has no output port"))?;
        output.publish(node.create((self.func)(value)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::envelope::Envelope;
    use crate::graph::Graph;

    #[test]
    fn maps_the_payload() {
        let graph = Graph::new();
        let handle = graph
            .add_node("scale", map_schema(), Map::new(|x: f64| x * 10.0))
            .unwrap();
        let node = graph.node(handle).unwrap();
        node.input(0).unwrap().push(Envelope::from_value(1.5f64));
        assert!(node.trigger(false));
        assert_eq!(node.output(0).unwrap().data().value::<f64>(), Some(15.0));
    }

    #[test]
    fn wrong_payload_type_is_reported() {
        let graph = Graph::new();
        let handle = graph
            .add_node("scale", map_schema(), Map::new(|x: f64| x * 10.0))
            .unwrap();
        let node = graph.node(handle).unwrap();
        node.input(0)
            .unwrap()
            .push(Envelope::from_value("not a number".to_string()));
        node.trigger(false);
        assert_eq!(node.last_error().unwrap().code, ErrorCode::WrongInputType);
        assert!(node.output(0).unwrap().data().is_empty());
    }
}

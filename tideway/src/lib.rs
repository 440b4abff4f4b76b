#![warn(clippy::perf)]
#![allow(clippy::type_complexity)]

//! # tideway
//!
//! A processing-object dataflow engine: a graph of computational nodes
//! connected through named, typed ports, each input backed by a
//! configurable buffering policy, triggered either synchronously on demand
//! or asynchronously as data arrives, with per-node error records, timing
//! statistics and a bounded worker pool.
//!
//! ## The pieces
//!
//! - [Envelope]: the timestamped, attributed value exchanged between ports.
//! - [InputBuffer]: FIFO, LIFO or last-value buffering with count and
//!   memory limits; overflow is silent, policy-ordered eviction.
//! - [Schema]: a node's fixed port layout, declared once at construction.
//! - [Connection]: a directed edge from an output to inputs or properties;
//!   direct in-process by default, addressed transports via a registry.
//! - [NodeRef]: a node's ports, scheduling controls and error record.
//! - [Graph]: the arena owning nodes, connections, defaults and the pool.
//! - [Sequence]: an ordered chain of child nodes behaving as one node.
//!
//! ## A two-node pipeline
//!
//! ```rust
//! use tideway::{ComputeError, Envelope, Graph, NodeRef, Schema};
//!
//! fn main() {
//!     let graph = Graph::new();
//!     let source = graph
//!         .add_node("source", Schema::new().output("out"),
//!             |_: &NodeRef| -> Result<(), ComputeError> { Ok(()) })
//!         .unwrap();
//!     let double = graph
//!         .add_node("double", Schema::new().input("in").output("out"),
//!             |node: &NodeRef| -> Result<(), ComputeError> {
//!                 let x = node.input(0).unwrap().data().value::<i64>().unwrap_or(0);
//!                 node.output(0).unwrap().publish(node.create(x * 2));
//!                 Ok(())
//!             })
//!         .unwrap();
//!     graph.connect((source, "out"), (double, "in")).unwrap();
//!
//!     // an external producer publishes straight onto the source's output
//!     graph.node(source).unwrap().output(0).unwrap()
//!         .publish(Envelope::from_value(5i64));
//!
//!     let node = graph.node(double).unwrap();
//!     node.trigger(false);
//!     assert_eq!(node.output(0).unwrap().data().value::<i64>(), Some(10));
//! }
//! ```
//!
//! ## Synchronous vs asynchronous
//!
//! A node is synchronous by default: the application calls
//! [NodeRef::trigger], which first resolves the upstream graph end to end
//! (pull mode), then computes.  Setting
//! [ScheduleStrategy::Asynchronous] turns the node around: freshness on an
//! input schedules its compute on the worker pool, subject to the other
//! flags ([ScheduleStrategy::AllInputs], [ScheduleStrategy::SkipIfBusy],
//! ...).  One node's computes never overlap; distinct nodes run in
//! parallel.
//!
//! ## Errors
//!
//! Compute failures are recorded on the node ([NodeRef::last_error], a
//! bounded history) and never thrown across the scheduler; one failing
//! node does not halt the rest of the graph.  Buffer overflow is not an
//! error at all, it is policy-defined eviction.

#[macro_use]
extern crate log;

mod buffer;
mod connection;
mod envelope;
mod graph;
mod node;
pub mod nodes;
mod pool;
mod ports;
mod sequence;
mod time;

pub use buffer::*;
pub use connection::*;
pub use envelope::*;
pub use graph::*;
pub use node::*;
pub use pool::*;
pub use ports::*;
pub use sequence::*;
pub use time::*;

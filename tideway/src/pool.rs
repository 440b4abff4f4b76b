use priority_queue::PriorityQueue;
use std::cell::Cell;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::node::NodeCell;

thread_local! {
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// True on a pool worker thread.  `wait` uses this to drain a node's own
/// pending work inline rather than deadlock on the queue it is part of.
pub(crate) fn on_worker_thread() -> bool {
    ON_WORKER.with(|flag| flag.get())
}

/// Sizing of the worker pool.
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    /// Number of worker threads executing pooled computes.
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self { workers }
    }
}

/// Queue entry hashed and compared by node identity, so one node occupies
/// at most one ready-queue slot no matter how many runs are pending.
struct TaskRef {
    cell: Arc<NodeCell>,
}

impl Hash for TaskRef {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        (Arc::as_ptr(&self.cell) as *const ()).hash(state);
    }
}

impl PartialEq for TaskRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.cell) as *const (),
            Arc::as_ptr(&other.cell) as *const (),
        )
    }
}

impl Eq for TaskRef {}

struct PoolShared {
    queue: Mutex<PriorityQueue<TaskRef, i32>>,
    available: Condvar,
    stop: AtomicBool,
}

/// Fixed-size pool executing node computes.
///
/// One node's computes are strictly serialised (a worker drains all of a
/// node's pending runs in one go, and the node's compute mutex backs that
/// up); distinct nodes run in parallel across workers.  Higher priority
/// nodes are picked first when workers are scarce.
pub(crate) struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn new(config: &PoolConfig) -> Self {
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(PriorityQueue::new()),
            available: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let mut workers = Vec::new();
        for index in 0..config.workers.max(1) {
            let shared = shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("tideway-worker-{index}"))
                .spawn(move || worker_loop(shared))
                .expect("failed to spawn pool worker");
            workers.push(handle);
        }
        debug!("worker pool started with {} threads", config.workers.max(1));
        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Adds one pending run for `cell` and makes sure a worker will pick
    /// the node up.  Duplicate queue entries collapse; the pending count
    /// carries the multiplicity.
    pub(crate) fn schedule(&self, cell: Arc<NodeCell>) {
        cell.pending.fetch_add(1, Ordering::SeqCst);
        if !cell.queued.swap(true, Ordering::SeqCst) {
            let priority = cell.priority.load(Ordering::SeqCst);
            let mut queue = self.shared.queue.lock().unwrap();
            queue.push(TaskRef { cell }, priority);
        }
        self.shared.available.notify_one();
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    pub(crate) fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.available.notify_all();
        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<PoolShared>) {
    ON_WORKER.with(|flag| flag.set(true));
    loop {
        let task = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if shared.stop.load(Ordering::SeqCst) {
                    return;
                }
                if let Some((task, _priority)) = queue.pop() {
                    break task;
                }
                // short slices keep shutdown prompt even if a notify is lost
                let (guard, _timeout) = shared
                    .available
                    .wait_timeout(queue, Duration::from_millis(15))
                    .unwrap();
                queue = guard;
            }
        };
        // clear the queue marker before draining: a schedule arriving
        // mid-drain re-queues the node rather than getting lost
        task.cell.queued.store(false, Ordering::SeqCst);
        if let Some(graph) = task.cell.graph_ref() {
            task.cell.drain(&graph);
            graph.reap(&task.cell);
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::envelope::Envelope;
    use crate::graph::Graph;
    use crate::node::{ComputeError, NodeRef, ScheduleStrategy};
    use crate::ports::Schema;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn per_node_computes_never_overlap() {
        let graph = Graph::new();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let (concurrent2, peak2, runs2) = (concurrent.clone(), peak.clone(), runs.clone());
        let handle = graph
            .add_node(
                "serial",
                Schema::new().input("in"),
                move |node: &NodeRef| -> Result<(), ComputeError> {
                    node.input(0).unwrap().data();
                    let now = concurrent2.fetch_add(1, Ordering::SeqCst) + 1;
                    peak2.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    concurrent2.fetch_sub(1, Ordering::SeqCst);
                    runs2.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .unwrap();
        let node = graph.node(handle).unwrap();
        node.set_strategies(ScheduleStrategy::Asynchronous | ScheduleStrategy::SkipIfNoInput);
        for i in 0..8 {
            node.input(0).unwrap().push(Envelope::from_value(i as i64));
        }
        assert!(node.wait(false, Some(Duration::from_secs(10))));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(runs.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn distinct_nodes_run_in_parallel() {
        let graph = Graph::new();
        let mut nodes = Vec::new();
        let started = Arc::new(AtomicUsize::new(0));
        for i in 0..3 {
            let started = started.clone();
            let handle = graph
                .add_node(
                    &format!("worker-{i}"),
                    Schema::new().input("in"),
                    move |node: &NodeRef| -> Result<(), ComputeError> {
                        node.input(0).unwrap().data();
                        started.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        Ok(())
                    },
                )
                .unwrap();
            let node = graph.node(handle).unwrap();
            node.set_strategies(ScheduleStrategy::Asynchronous | ScheduleStrategy::SkipIfNoInput);
            nodes.push(node);
        }
        for node in &nodes {
            node.input(0).unwrap().push(Envelope::from_value(1i64));
        }
        for node in &nodes {
            assert!(node.wait(false, Some(Duration::from_secs(10))));
        }
        assert_eq!(started.load(Ordering::SeqCst), 3);
    }
}

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Fixed-size worker-pool executor.
//!
//! Phase A: `worker_count` dedicated OS threads pulling from one unbounded
//! request buffer, same shape as `rask-rt::green::scheduler::Scheduler`'s
//! worker threads draining its injection queue. Phase B would swap the
//! buffer and workers for the green-task scheduler without touching
//! `Executor`'s public surface.
//!
//! uC++ distinguishes `Same`/`Sep` clusters (whether workers share the
//! caller's virtual processor cluster or get a dedicated one); Rust has no
//! notion of "the current cluster" outside a green-task runtime, so both
//! variants collapse to the same dedicated-OS-thread-pool behavior here.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::future::{FutureIsm, NoIsmServerCancel};

#[cfg(feature = "tracing")]
use tracing::trace;

/// Which virtual-processor cluster new workers join. Both variants behave
/// identically in this implementation; the type is kept so callers porting
/// uC++ code have a direct mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cluster {
    /// Workers would share the caller's cluster in uC++.
    Same,
    /// Workers would get a dedicated cluster in uC++.
    Sep,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Request {
    Work(Job),
    Stop,
}

/// Unbounded monitor queue feeding the worker pool.
struct Buffer {
    queue: Mutex<VecDeque<Request>>,
    delay: Condvar,
}

impl Buffer {
    fn new() -> Self {
        Buffer {
            queue: Mutex::new(VecDeque::new()),
            delay: Condvar::new(),
        }
    }

    fn insert(&self, request: Request) {
        let mut guard = self.queue.lock().unwrap();
        guard.push_back(request);
        self.delay.notify_one();
    }

    fn remove(&self) -> Request {
        let mut guard = self.queue.lock().unwrap();
        while guard.is_empty() {
            guard = self.delay.wait(guard).unwrap();
        }
        guard.pop_front().unwrap()
    }
}

fn worker_loop(id: usize, buffer: &Buffer) {
    loop {
        match buffer.remove() {
            Request::Work(job) => {
                #[cfg(feature = "tracing")]
                trace!(worker = id, "executing request");
                job();
            }
            Request::Stop => {
                #[cfg(feature = "tracing")]
                trace!(worker = id, "worker received stop sentinel");
                break;
            }
        }
    }
}

/// A fixed pool of worker threads draining one shared request buffer.
pub struct Executor {
    buffer: Arc<Buffer>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    worker_count: usize,
    cluster: Cluster,
}

/// uC++'s `uExecutor` default worker count (16 workers, 2 processors by
/// default there). The matching processor default has no equivalent here —
/// see the `Cluster` doc comment.
const DEFAULT_WORKERS: usize = 16;

impl Executor {
    /// Start `worker_count` workers. `worker_count == 0` uses the uC++
    /// default of 16.
    pub fn new(worker_count: usize, cluster: Cluster) -> Self {
        let worker_count = if worker_count == 0 {
            DEFAULT_WORKERS
        } else {
            worker_count
        };

        let buffer = Arc::new(Buffer::new());
        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let buffer = buffer.clone();
            handles.push(
                thread::Builder::new()
                    .name(format!("rask-future-worker-{id}"))
                    .spawn(move || worker_loop(id, &buffer))
                    .expect("failed to spawn executor worker thread"),
            );
        }

        Executor {
            buffer,
            workers: Mutex::new(handles),
            worker_count,
            cluster,
        }
    }

    pub fn cluster(&self) -> Cluster {
        self.cluster
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Enqueue a fire-and-forget unit of work.
    pub fn send<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.buffer.insert(Request::Work(Box::new(job)));
    }

    /// Enqueue work and return a future for its result. The
    /// `submit(result, action)` variant uC++ leaves commented out is not
    /// exposed here — callers compose `sendrecv` with a `FutureIsm`/
    /// `Selector` themselves instead.
    pub fn sendrecv<T, F>(&self, job: F) -> FutureIsm<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let future: FutureIsm<T, NoIsmServerCancel> = FutureIsm::new();
        let reply = future.clone();
        self.send(move || {
            let value = job();
            reply.deliver(value);
        });
        future
    }
}

impl Drop for Executor {
    /// One stop sentinel per worker: workers pull requests in
    /// arbitrary order, so a single sentinel could be consumed twice by the
    /// same worker while another blocks forever. `worker_count` sentinels
    /// guarantee every worker sees exactly one.
    fn drop(&mut self) {
        for _ in 0..self.worker_count {
            self.buffer.insert(Request::Stop);
        }
        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn send_runs_the_job() {
        let exec = Executor::new(2, Cluster::Same);
        let (tx, rx) = mpsc::channel();
        exec.send(move || tx.send(42).unwrap());
        assert_eq!(rx.recv().unwrap(), 42);
    }

    #[test]
    fn sendrecv_delivers_through_a_future() {
        let exec = Executor::new(2, Cluster::Sep);
        let future = exec.sendrecv(|| 2 + 2);
        assert_eq!(future.get().unwrap(), 4);
    }

    #[test]
    fn every_worker_processes_requests_under_load() {
        let exec = Executor::new(4, Cluster::Same);
        let counter = Arc::new(AtomicUsize::new(0));
        let futures: Vec<_> = (0..50)
            .map(|i| {
                let counter = counter.clone();
                exec.sendrecv(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    i * 2
                })
            })
            .collect();
        for (i, f) in futures.into_iter().enumerate() {
            assert_eq!(f.get().unwrap(), i * 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn drop_joins_every_worker_cleanly() {
        let exec = Executor::new(3, Cluster::Same);
        exec.send(|| {});
        drop(exec);
    }
}

//! `WorkQueue` — a fixed pool of worker threads draining a FIFO of tagged
//! work units, with cooperative shutdown.
//!
//! Grounded on `common/workq.c`/`workq.h` in the original source: a
//! `pthread`+mutex+condvar pool there becomes `std::thread` +
//! `Mutex`/`Condvar` here, with the same shape (`new_workq`,
//! `workq_add_work`, `quiesce_workq`, `workq_get_active`).

use slurm_common::error::{Error, Result};
use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

thread_local! {
    /// Debug-only recursion guard: a `WorkUnit`'s function must not submit
    /// a unit back onto the same queue from inside its own execution.
    static RUNNING_ON_WORKER: Cell<bool> = Cell::new(false);
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// One deferred unit of work. `tag` is a short label used only for
/// diagnostics; `connection_ref` optionally names the `Connection` (by id)
/// this unit is accounted against, for callers layering per-connection
/// serialization on top (conmgr does; `WorkQueue` itself does not enforce
/// it — see §4.1 of the design).
pub struct WorkUnit {
    pub tag: &'static str,
    pub connection_ref: Option<usize>,
    job: Job,
}

impl WorkUnit {
    pub fn new<F>(tag: &'static str, connection_ref: Option<usize>, func: F) -> WorkUnit
    where
        F: FnOnce() + Send + 'static,
    {
        WorkUnit {
            tag,
            connection_ref,
            job: Box::new(func),
        }
    }
}

struct Shared {
    queue: VecDeque<WorkUnit>,
    shutdown: bool,
    active: usize,
    total: usize,
}

/// A fixed-size pool of worker threads. `new(n)` spawns `n` workers
/// immediately; `quiesce()` joins them all.
pub struct WorkQueue {
    state: Arc<Mutex<Shared>>,
    cond: Arc<Condvar>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkQueue {
    /// Constructs a queue backed by `count` worker threads. `count` must be
    /// less than 1024, mirroring the source's `xassert(count < 1024)`.
    pub fn new(count: usize) -> WorkQueue {
        assert!(count < 1024, "worker pool too large: {count}");

        let state = Arc::new(Mutex::new(Shared {
            queue: VecDeque::new(),
            shutdown: false,
            active: 0,
            total: count,
        }));
        let cond = Arc::new(Condvar::new());

        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            let state = Arc::clone(&state);
            let cond = Arc::clone(&cond);
            workers.push(
                thread::Builder::new()
                    .name(format!("workq-{id}"))
                    .spawn(move || Self::worker_loop(state, cond))
                    .expect("failed to spawn worker thread"),
            );
        }

        WorkQueue {
            state,
            cond,
            workers: Mutex::new(workers),
        }
    }

    /// Pushes `unit` onto the FIFO and wakes one idle worker. Returns
    /// `Error::Disabled` once `quiesce()` has been called.
    pub fn submit(&self, unit: WorkUnit) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        if guard.shutdown {
            return Err(Error::Disabled("workq is shutting down".into()));
        }
        guard.queue.push_back(unit);
        drop(guard);
        self.cond.notify_one();
        Ok(())
    }

    /// `(active, total)` worker counts, for diagnostics.
    pub fn load(&self) -> (usize, usize) {
        let guard = self.state.lock().unwrap();
        (guard.active, guard.total)
    }

    pub fn active_count(&self) -> usize {
        self.load().0
    }

    /// Sets the shutdown latch, wakes every worker, and joins them all.
    /// After this returns, `submit` always fails and the queue is empty.
    pub fn quiesce(&self) {
        {
            let mut guard = self.state.lock().unwrap();
            guard.shutdown = true;
        }
        self.cond.notify_all();

        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    fn worker_loop(state: Arc<Mutex<Shared>>, cond: Arc<Condvar>) {
        loop {
            let unit = {
                let mut guard = state.lock().unwrap();
                loop {
                    if let Some(unit) = guard.queue.pop_front() {
                        break Some(unit);
                    }
                    if guard.shutdown {
                        break None;
                    }
                    guard = cond.wait(guard).unwrap();
                }
            };

            let Some(unit) = unit else {
                return;
            };

            {
                let mut guard = state.lock().unwrap();
                guard.active += 1;
            }

            RUNNING_ON_WORKER.with(|flag| flag.set(true));
            (unit.job)();
            RUNNING_ON_WORKER.with(|flag| flag.set(false));

            let mut guard = state.lock().unwrap();
            guard.active -= 1;
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.quiesce();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn submit_runs_units_fifo_order_per_submission() {
        let wq = WorkQueue::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = Arc::clone(&order);
            wq.submit(WorkUnit::new("test", None, move || {
                order.lock().unwrap().push(i);
            }))
            .unwrap();
        }

        wq.quiesce();
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn submit_after_quiesce_is_disabled() {
        let wq = WorkQueue::new(2);
        wq.quiesce();
        let result = wq.submit(WorkUnit::new("test", None, || {}));
        assert!(matches!(result, Err(Error::Disabled(_))));
    }

    #[test]
    fn active_count_reflects_running_work() {
        let wq = WorkQueue::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            wq.submit(WorkUnit::new("test", None, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
            }))
            .unwrap();
        }

        thread::sleep(Duration::from_millis(10));
        let (active, total) = wq.load();
        assert!(active > 0);
        assert_eq!(total, 4);

        wq.quiesce();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}

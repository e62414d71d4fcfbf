//! Serial task queue.
//!
//! Every mutating operation (and every read that goes through `exec`) runs
//! as a task on this queue. Exactly one task runs at a time and tasks never
//! reorder, which is what makes each operation atomic with respect to the
//! others.
//!
//! The queue starts *buffered*: tasks pushed before [Executor::process_buffer]
//! are parked in arrival order and only join the live queue when the
//! executor becomes ready. A boot task (loading the store) can jump ahead of
//! the buffer with `force_queuing`.

use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::Arc;

/// A unit of work. The task's completion signal is its return: whatever
/// result or error it produces must be routed out by the closure itself, so
/// the executor never swallows an error and the queue always drains.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Where a pushed task ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended to the live queue; it has run (or will run before the
    /// current drain finishes).
    Queued,
    /// Parked in the pre-ready buffer until [Executor::process_buffer].
    Buffered,
}

/// Single-consumer FIFO task queue with a buffered pre-ready phase.
///
/// Tasks run inline on the pushing thread: a push into an idle ready queue
/// drains it immediately, and a task pushed from inside a running task is
/// appended and picked up by the active drain. At most one drain loop is
/// active at a time.
#[derive(Clone, Default)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

#[derive(Default)]
struct ExecutorInner {
    state: Mutex<ExecutorState>,
}

#[derive(Default)]
struct ExecutorState {
    buffer: VecDeque<Task>,
    queue: VecDeque<Task>,
    ready: bool,
    draining: bool,
}

impl Executor {
    pub fn new() -> Self {
        Executor::default()
    }

    /// True once [Executor::process_buffer] has run. The transition is
    /// one-way.
    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().ready
    }

    /// Schedules a task. When the executor is ready (or `force_queuing` is
    /// set) the task joins the live queue and runs in FIFO order; otherwise
    /// it is parked in the pre-ready buffer.
    pub fn push(&self, task: Task, force_queuing: bool) -> PushOutcome {
        let mut state = self.inner.state.lock();
        if !state.ready && !force_queuing {
            state.buffer.push_back(task);
            return PushOutcome::Buffered;
        }
        state.queue.push_back(task);
        self.drain(state);
        PushOutcome::Queued
    }

    /// Transitions to ready and moves every buffered task into the live
    /// queue in arrival order.
    pub fn process_buffer(&self) {
        let mut state = self.inner.state.lock();
        state.ready = true;
        while let Some(task) = state.buffer.pop_front() {
            state.queue.push_back(task);
        }
        self.drain(state);
    }

    fn drain<'a>(&'a self, mut state: MutexGuard<'a, ExecutorState>) {
        if state.draining {
            // a drain loop further up the stack (or on another thread) will
            // pick up what we queued
            return;
        }
        state.draining = true;
        loop {
            let task = match state.queue.pop_front() {
                Some(task) => task,
                None => break,
            };
            drop(state);
            task();
            state = self.inner.state.lock();
        }
        state.draining = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<i32>>>, impl Fn(i32) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_tasks = log.clone();
        let make = move |n: i32| -> Task {
            let log = log_for_tasks.clone();
            Box::new(move || log.lock().push(n))
        };
        (log, make)
    }

    #[test]
    fn test_starts_buffered() {
        let executor = Executor::new();
        assert!(!executor.is_ready());
        let (log, task) = recorder();
        assert_eq!(executor.push(task(1), false), PushOutcome::Buffered);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_process_buffer_drains_in_arrival_order() {
        let executor = Executor::new();
        let (log, task) = recorder();
        executor.push(task(1), false);
        executor.push(task(2), false);
        executor.push(task(3), false);
        executor.process_buffer();
        assert!(executor.is_ready());
        assert_eq!(*log.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_ready_tasks_run_immediately_in_fifo_order() {
        let executor = Executor::new();
        executor.process_buffer();
        let (log, task) = recorder();
        assert_eq!(executor.push(task(1), false), PushOutcome::Queued);
        assert_eq!(*log.lock(), vec![1]);
        executor.push(task(2), false);
        assert_eq!(*log.lock(), vec![1, 2]);
    }

    #[test]
    fn test_force_queuing_jumps_the_buffer() {
        let executor = Executor::new();
        let (log, task) = recorder();
        executor.push(task(10), false);
        // the boot task runs ahead of the buffered user task
        assert_eq!(executor.push(task(1), true), PushOutcome::Queued);
        assert_eq!(*log.lock(), vec![1]);
        executor.process_buffer();
        assert_eq!(*log.lock(), vec![1, 10]);
    }

    #[test]
    fn test_task_pushed_during_task_runs_after_it() {
        let executor = Executor::new();
        executor.process_buffer();
        let (log, task) = recorder();

        let inner_executor = executor.clone();
        let inner_log = log.clone();
        let cascading: Task = Box::new(move || {
            inner_log.lock().push(1);
            let nested = {
                let log = inner_log.clone();
                Box::new(move || log.lock().push(2))
            };
            // appended to the live queue and picked up by the active drain
            inner_executor.push(nested, false);
            inner_log.lock().push(3);
        });
        executor.push(cascading, false);
        executor.push(task(4), false);
        assert_eq!(*log.lock(), vec![1, 3, 2, 4]);
    }

    #[test]
    fn test_queue_keeps_draining_after_a_failing_task() {
        let executor = Executor::new();
        executor.process_buffer();
        let (log, task) = recorder();
        let failed = Arc::new(Mutex::new(None));
        let failure_slot = failed.clone();
        // a task that produces an error routes it through its own channel;
        // the queue moves on regardless
        executor.push(
            Box::new(move || {
                *failure_slot.lock() = Some("boom");
            }),
            false,
        );
        executor.push(task(2), false);
        assert_eq!(*failed.lock(), Some("boom"));
        assert_eq!(*log.lock(), vec![2]);
    }

    #[test]
    fn test_cross_thread_push() {
        let executor = Executor::new();
        executor.process_buffer();
        let (log, _) = recorder();

        let mut handles = Vec::new();
        for n in 0..4 {
            let executor = executor.clone();
            let log = log.clone();
            handles.push(std::thread::spawn(move || {
                executor.push(Box::new(move || log.lock().push(n)), false);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let mut seen = log.lock().clone();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Priority band of a deferred task.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Priority {
    /// Runs before anything in the default band.
    High,
    /// Runs once the high band is drained.
    Default,
}

type Task = Box<dyn FnOnce() + 'static>;

#[derive(Default)]
struct Bands {
    high: VecDeque<Task>,
    default: VecDeque<Task>,
}

/// A single-threaded cooperative task queue with two priority bands.
///
/// All framework callbacks run through this queue on the caller's thread;
/// there is no parallelism, only deferred execution. Tasks posted to the
/// same band run in FIFO order, and the high band always drains before the
/// default band. The handle is cheap to clone and all clones share the same
/// queue.
#[derive(Clone, Default)]
pub struct TaskQueue {
    bands: Rc<RefCell<Bands>>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bands = self.bands.borrow();
        f.debug_struct("TaskQueue")
            .field("high", &bands.high.len())
            .field("default", &bands.default.len())
            .finish()
    }
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts a task for deferred execution in the given band.
    pub fn post(&self, priority: Priority, task: impl FnOnce() + 'static) {
        let mut bands = self.bands.borrow_mut();
        match priority {
            Priority::High => bands.high.push_back(Box::new(task)),
            Priority::Default => bands.default.push_back(Box::new(task)),
        }
    }

    /// Posts a task to the high band.
    pub fn post_high(&self, task: impl FnOnce() + 'static) {
        self.post(Priority::High, task);
    }

    /// Posts a task to the default band.
    pub fn post_default(&self, task: impl FnOnce() + 'static) {
        self.post(Priority::Default, task);
    }

    /// True if no task is waiting.
    pub fn is_idle(&self) -> bool {
        let bands = self.bands.borrow();
        bands.high.is_empty() && bands.default.is_empty()
    }

    /// Runs the next pending task, if any. Returns false when idle.
    ///
    /// The queue borrow is released before the task runs, so tasks are free
    /// to post further tasks.
    pub fn run_one(&self) -> bool {
        let task = {
            let mut bands = self.bands.borrow_mut();
            bands.high.pop_front().or_else(|| bands.default.pop_front())
        };
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is idle. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_within_a_band() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            queue.post_default(move || log.borrow_mut().push(i));
        }
        queue.run_until_idle();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn high_band_runs_first() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        queue.post_default(move || l.borrow_mut().push("default"));
        let l = log.clone();
        queue.post_high(move || l.borrow_mut().push("high"));
        queue.run_until_idle();
        assert_eq!(*log.borrow(), vec!["high", "default"]);
    }

    #[test]
    fn tasks_may_post_tasks() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        let q = queue.clone();
        queue.post_default(move || {
            l.borrow_mut().push(1);
            let l = l.clone();
            q.post_default(move || l.borrow_mut().push(2));
        });
        assert_eq!(queue.run_until_idle(), 2);
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn run_one_reports_idle() {
        let queue = TaskQueue::new();
        assert!(!queue.run_one());
        queue.post_high(|| {});
        assert!(!queue.is_idle());
        assert!(queue.run_one());
        assert!(queue.is_idle());
    }
}

use parking_lot::{Condvar, Mutex};
use rayon::ThreadPool;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

type Work = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct State {
    running: bool,
    pending: Option<Work>,
    executed: u64,
    superseded: u64,
}

struct Inner {
    pool: Arc<ThreadPool>,
    state: Mutex<State>,
    idle: Condvar,
}

#[derive(Clone)]
pub struct CoalescingScheduler {
    inner: Arc<Inner>,
}

impl CoalescingScheduler {
    pub fn new(pool: Arc<ThreadPool>) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                state: Mutex::new(State::default()),
                idle: Condvar::new(),
            }),
        }
    }

    /// Run `work` on the pool now, or after the running unit if one is active.
    ///
    /// Never runs `work` on the calling thread and never blocks on it.
    pub fn submit<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.running {
            if state.pending.replace(Box::new(work)).is_some() {
                state.superseded += 1;
            }
            return;
        }
        state.running = true;
        drop(state);

        let inner = Arc::clone(&self.inner);
        self.inner.pool.spawn(move || inner.drain(Box::new(work)));
    }

    /// Block until nothing runs or waits. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.running {
            if self.inner.idle.wait_until(&mut state, deadline).timed_out() {
                return !state.running;
            }
        }
        true
    }

    /// Units of work that have run to completion.
    pub fn executed(&self) -> u64 {
        self.inner.state.lock().executed
    }

    /// Units dropped because a later submission replaced them.
    pub fn superseded(&self) -> u64 {
        self.inner.state.lock().superseded
    }
}

impl Inner {
    fn drain(&self, first: Work) {
        let mut next = Some(first);
        while let Some(work) = next.take() {
            if catch_unwind(AssertUnwindSafe(work)).is_err() {
                warn!("Scheduled work panicked");
            }

            let mut state = self.state.lock();
            state.executed += 1;
            next = state.pending.take();
            if next.is_none() {
                state.running = false;
                self.idle.notify_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use rayon::ThreadPoolBuilder;

    fn pool() -> Arc<ThreadPool> {
        Arc::new(ThreadPoolBuilder::new().num_threads(2).build().unwrap())
    }

    #[test]
    fn test_runs_immediately_off_caller_thread() {
        let scheduler = CoalescingScheduler::new(pool());
        let (tx, rx) = bounded(1);
        scheduler.submit(move || {
            tx.send(std::thread::current().id()).unwrap();
        });

        let ran_on = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(ran_on, std::thread::current().id());
        assert!(scheduler.wait_idle(Duration::from_secs(5)));
        assert_eq!(scheduler.executed(), 1);
    }

    #[test]
    fn test_burst_coalesces_to_latest() {
        let scheduler = CoalescingScheduler::new(pool());
        let ran = Arc::new(Mutex::new(Vec::new()));
        let (started_tx, started_rx) = bounded(1);
        let (release_tx, release_rx) = bounded::<()>(1);

        let log = ran.clone();
        scheduler.submit(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            log.lock().push(0);
        });
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        for i in 1..=10 {
            let log = ran.clone();
            scheduler.submit(move || log.lock().push(i));
        }
        release_tx.send(()).unwrap();

        assert!(scheduler.wait_idle(Duration::from_secs(5)));
        assert_eq!(*ran.lock(), vec![0, 10]);
        assert_eq!(scheduler.executed(), 2);
        assert_eq!(scheduler.superseded(), 9);
    }

    #[test]
    fn test_panicking_work_does_not_wedge() {
        let scheduler = CoalescingScheduler::new(pool());
        scheduler.submit(|| panic!("boom"));
        assert!(scheduler.wait_idle(Duration::from_secs(5)));

        let (tx, rx) = bounded(1);
        scheduler.submit(move || tx.send(()).unwrap());
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}

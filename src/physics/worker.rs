//! A fixed-size pool of threads pulling jobs from a shared FIFO queue.

use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    thread::JoinHandle,
};

struct Queue<J> {
    jobs: VecDeque<J>,
    in_flight: usize,
    panicked: usize,
    stop: bool,
}

struct Shared<J> {
    queue: Mutex<Queue<J>>,
    /// Signaled when jobs are added or the pool is stopping.
    wake: Condvar,
    /// Signaled when the last in-flight job finishes.
    done: Condvar,
}

/// Decrements the in-flight count even if the job panics.
struct InFlightGuard<'a, J> {
    shared: &'a Shared<J>,
}

impl<'a, J> Drop for InFlightGuard<'a, J> {
    fn drop(&mut self) {
        let mut q = self.shared.queue.lock();
        q.in_flight -= 1;
        if q.in_flight == 0 && q.jobs.is_empty() {
            self.shared.done.notify_all();
        }
    }
}

pub(crate) struct WorkerPool<J: Send + 'static> {
    shared: Arc<Shared<J>>,
    threads: Vec<JoinHandle<()>>,
}

impl<J: Send + 'static> WorkerPool<J> {
    /// Start `thread_count` workers that run `handler` on every job.
    pub fn new(
        thread_count: usize,
        handler: impl Fn(J) + Send + Sync + 'static,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                in_flight: 0,
                panicked: 0,
                stop: false,
            }),
            wake: Condvar::new(),
            done: Condvar::new(),
        });
        let handler = Arc::new(handler);

        let mut threads = Vec::with_capacity(thread_count);
        for i in 0..thread_count.max(1) {
            let shared = shared.clone();
            let handler = handler.clone();
            let thread = std::thread::Builder::new()
                .name(format!("physics-worker-{i}"))
                .spawn(move || worker_loop(&shared, &*handler))?;
            threads.push(thread);
        }
        log::debug!("Started {} physics workers", threads.len());

        Ok(WorkerPool { shared, threads })
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn submit_all(&self, jobs: impl IntoIterator<Item = J>) {
        let mut q = self.shared.queue.lock();
        q.jobs.extend(jobs);
        self.shared.wake.notify_all();
    }

    /// Block until the queue is empty and no job is running.
    /// Returns the number of jobs that panicked since the last call.
    pub fn wait_idle(&self) -> usize {
        let mut q = self.shared.queue.lock();
        while !(q.jobs.is_empty() && q.in_flight == 0) {
            self.shared.done.wait(&mut q);
        }
        std::mem::take(&mut q.panicked)
    }

    /// Stop and join every worker. Jobs still queued are dropped.
    pub fn shutdown(&mut self) {
        {
            let mut q = self.shared.queue.lock();
            q.stop = true;
            q.jobs.clear();
            self.shared.wake.notify_all();
        }
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                log::warn!("A physics worker exited with a panic");
            }
        }
    }
}

impl<J: Send + 'static> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<J, F: Fn(J) + ?Sized>(shared: &Shared<J>, handler: &F) {
    loop {
        let job = {
            let mut q = shared.queue.lock();
            loop {
                if q.stop {
                    return;
                }
                if let Some(job) = q.jobs.pop_front() {
                    q.in_flight += 1;
                    break job;
                }
                shared.wake.wait(&mut q);
            }
        };

        let _guard = InFlightGuard { shared };
        if catch_unwind(AssertUnwindSafe(|| handler(job))).is_err() {
            shared.queue.lock().panicked += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_every_job_before_idle() {
        let sum = Arc::new(AtomicUsize::new(0));
        let pool = {
            let sum = sum.clone();
            WorkerPool::new(4, move |n: usize| {
                std::thread::sleep(std::time::Duration::from_micros(50));
                sum.fetch_add(n, Ordering::SeqCst);
            })
            .unwrap()
        };
        assert_eq!(pool.thread_count(), 4);
        for round in 1..=3 {
            pool.submit_all(1..=100);
            assert_eq!(pool.wait_idle(), 0);
            assert_eq!(sum.load(Ordering::SeqCst), round * 5050);
        }
    }

    #[test]
    fn panicking_jobs_are_counted_and_workers_survive() {
        let ran = Arc::new(AtomicUsize::new(0));
        let pool = {
            let ran = ran.clone();
            WorkerPool::new(2, move |fail: bool| {
                if fail {
                    panic!("job failed");
                }
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        };
        pool.submit_all([true, false, true, false]);
        assert_eq!(pool.wait_idle(), 2);
        pool.submit_all([false]);
        assert_eq!(pool.wait_idle(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn idle_pool_returns_immediately_and_shuts_down() {
        let mut pool = WorkerPool::new(3, |_: ()| {}).unwrap();
        assert_eq!(pool.wait_idle(), 0);
        pool.shutdown();
        assert_eq!(pool.thread_count(), 0);
    }
}

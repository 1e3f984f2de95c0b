/// Background job queue for profile computation
///
/// A fixed pool of worker threads drains a channel of boxed closures.
/// Callers enqueue work and move on; `wait_for_all` blocks until every
/// enqueued job has finished, which doubles as the test barrier for
/// asynchronous profile delivery.

use log::{debug, warn};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PendingCounter {
    count: Mutex<usize>,
    idle: Condvar,
}

pub struct JobQueue {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<PendingCounter>,
}

impl JobQueue {
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new(PendingCounter {
            count: Mutex::new(0),
            idle: Condvar::new(),
        });

        let num_workers = num_workers.max(1);
        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let receiver = Arc::clone(&receiver);
            let pending = Arc::clone(&pending);
            let handle = thread::spawn(move || loop {
                let job = {
                    let guard = match receiver.lock() {
                        Ok(g) => g,
                        Err(_) => break,
                    };
                    guard.recv()
                };
                match job {
                    Ok(job) => {
                        debug!("worker {} picked up a job", worker_id);
                        // Contain panics so the counter still reaches zero
                        // and the worker stays in the pool
                        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
                        if outcome.is_err() {
                            warn!("worker {}: job panicked", worker_id);
                        }
                        if let Ok(mut count) = pending.count.lock() {
                            *count -= 1;
                            if *count == 0 {
                                pending.idle.notify_all();
                            }
                        }
                    }
                    // Channel closed, queue is shutting down
                    Err(_) => break,
                }
            });
            workers.push(handle);
        }

        JobQueue {
            sender: Some(sender),
            workers,
            pending,
        }
    }

    /// Enqueue a job for execution on the pool.
    pub fn submit<F>(&self, job: F) -> Result<(), String>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut count = self
                .pending
                .count
                .lock()
                .map_err(|_| "job queue lock poisoned".to_string())?;
            *count += 1;
        }
        match &self.sender {
            Some(sender) => sender.send(Box::new(job)).map_err(|_| {
                // Undo the reservation so wait_for_all is not stranded
                if let Ok(mut count) = self.pending.count.lock() {
                    *count -= 1;
                    if *count == 0 {
                        self.pending.idle.notify_all();
                    }
                }
                "job queue has shut down".to_string()
            }),
            None => Err("job queue has shut down".to_string()),
        }
    }

    /// Block until every submitted job has completed.
    pub fn wait_for_all(&self) {
        let guard = match self.pending.count.lock() {
            Ok(g) => g,
            Err(_) => return,
        };
        let _unused = self
            .pending
            .idle
            .wait_while(guard, |count| *count > 0)
            .map_err(|_| ());
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        // Closing the channel ends the worker loops
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("profile worker panicked during shutdown");
            }
        }
    }
}

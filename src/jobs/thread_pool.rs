//! Thread-pool job backend (§4.3): submits to a bounded worker pool.
//! Failures are logged, never propagated to the submitter.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::Result;

use super::{execute_with_retry, EnrichmentContext, Job, JobRunner};

enum Message {
    Run(Arc<EnrichmentContext>, Job),
    Shutdown,
}

/// A fixed-size pool of worker threads draining a shared job queue.
pub struct ThreadPoolBackend {
    sender: Sender<Message>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPoolBackend {
    /// Spawns `worker_count` worker threads (minimum 1).
    pub fn new(worker_count: usize) -> Self {
        let (sender, receiver): (Sender<Message>, Receiver<Message>) = unbounded();
        let worker_count = worker_count.max(1);
        let workers = (0..worker_count)
            .map(|_| {
                let receiver = receiver.clone();
                std::thread::spawn(move || {
                    while let Ok(message) = receiver.recv() {
                        match message {
                            Message::Run(ctx, job) => execute_with_retry(&ctx, job),
                            Message::Shutdown => break,
                        }
                    }
                })
            })
            .collect();
        Self {
            sender,
            workers: Mutex::new(workers),
        }
    }
}

impl JobRunner for ThreadPoolBackend {
    fn enqueue(&self, ctx: Arc<EnrichmentContext>, job: Job) -> Result<()> {
        // An unbounded channel never blocks the submitter; a full durable
        // queue is out of scope without a broker dependency.
        let _ = self.sender.send(Message::Run(ctx, job));
        Ok(())
    }

    fn drain(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("worker pool lock poisoned");
            workers.drain(..).collect()
        };
        for _ in &handles {
            let _ = self.sender.send(Message::Shutdown);
        }
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPoolBackend {
    fn drop(&mut self) {
        self.drain();
    }
}

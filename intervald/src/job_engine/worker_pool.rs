// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::io;
use std::thread::{self, JoinHandle};

use async_channel::{Receiver, Sender};
use log::debug;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fixed number of named worker threads sharing one unbounded queue. When all
/// workers are busy, tasks wait in the queue.
#[derive(Debug)]
pub struct WorkerPool {
    tx: Sender<Task>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(size: usize, name_prefix: &str) -> io::Result<Self> {
        let (tx, rx) = async_channel::unbounded::<Task>();
        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let rx = rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("{name_prefix}-{index}"))
                .spawn(move || worker_loop(rx));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // let the already started workers run dry
                    tx.close();
                    return Err(e);
                }
            }
        }
        Ok(Self { tx, workers })
    }

    /// A queue handle for producers on other threads.
    pub fn queue(&self) -> Sender<Task> {
        self.tx.clone()
    }

    /// Fails with the task if the pool has been closed.
    #[cfg(test)]
    fn submit(&self, task: Task) -> Result<(), Task> {
        self.tx.try_send(task).map_err(async_channel::TrySendError::into_inner)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Workers whose thread has not ended yet.
    #[cfg(test)]
    fn live_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    /// Stops accepting tasks. Queued tasks are still handed out; workers exit
    /// once the queue is empty. Busy workers are not waited for.
    pub fn close(&self) {
        self.tx.close();
    }
}

fn worker_loop(rx: Receiver<Task>) {
    while let Ok(task) = rx.recv_blocking() {
        task();
    }
    debug!("Worker {:?} exiting", thread::current().name());
}

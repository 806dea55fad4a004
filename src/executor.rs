use crate::error::{BridgeError, BridgeResult};
use crossbeam::channel::{self, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted work on some thread, not necessarily the caller's.
pub trait DispatchExecutor: Send + Sync {
    /// `name` labels the work in thread names and logs.
    fn submit(&self, name: &str, job: Job) -> BridgeResult<()>;

    fn shutdown(&self) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutorConfig {
    /// One OS thread per submitted job.
    #[default]
    Threads,
    /// Fixed set of threads draining a bounded queue.
    Pooled {
        #[serde(default = "ExecutorConfig::default_threads")]
        threads: usize,
        #[serde(default = "ExecutorConfig::default_queue")]
        queue: usize,
    },
}

impl ExecutorConfig {
    fn default_threads() -> usize {
        8
    }

    fn default_queue() -> usize {
        256
    }

    pub fn build(&self) -> BridgeResult<Arc<dyn DispatchExecutor>> {
        Ok(match self {
            ExecutorConfig::Threads => Arc::new(ThreadExecutor::new("mqbridge")),
            ExecutorConfig::Pooled { threads, queue } => {
                Arc::new(PooledExecutor::new("mqbridge", *threads, *queue)?)
            }
        })
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic (unknown type)".into())
}

/// Spawns a detached, named thread for every job.
#[derive(Debug, Clone)]
pub struct ThreadExecutor {
    prefix: String,
}

impl ThreadExecutor {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl DispatchExecutor for ThreadExecutor {
    fn submit(&self, name: &str, job: Job) -> BridgeResult<()> {
        thread::Builder::new()
            .name(format!("{}-{}", self.prefix, name))
            .spawn(job)
            .map(|_| ())
            .map_err(|e| BridgeError::Executor(format!("cannot spawn thread for {name}: {e}")))
    }
}

type Task = (String, Job);

/// Fixed-size thread pool fed through a bounded crossbeam channel.
///
/// A panicking job is logged and the thread moves on to the next one.
pub struct PooledExecutor {
    tx: Mutex<Option<Sender<Task>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PooledExecutor {
    pub fn new(prefix: &str, threads: usize, queue: usize) -> BridgeResult<Self> {
        let (tx, rx) = channel::bounded::<Task>(queue.max(1));
        let mut handles = Vec::with_capacity(threads.max(1));

        for i in 0..threads.max(1) {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{prefix}-pool-{i}"))
                .spawn(move || {
                    for (name, job) in rx.iter() {
                        if let Err(p) = panic::catch_unwind(AssertUnwindSafe(job)) {
                            tracing::error!(
                                "[Executor] job {} panicked: {}",
                                name,
                                panic_message(p.as_ref())
                            );
                        }
                    }
                })
                .map_err(|e| BridgeError::Executor(format!("cannot spawn pool thread: {e}")))?;
            handles.push(handle);
        }

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
        })
    }

    pub fn threads(&self) -> usize {
        self.handles.lock().len()
    }
}

impl DispatchExecutor for PooledExecutor {
    fn submit(&self, name: &str, job: Job) -> BridgeResult<()> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(BridgeError::Executor("executor is shut down".into()));
        };
        match tx.try_send((name.to_string(), job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(BridgeError::Executor(format!("queue is full, {name} rejected")))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(BridgeError::Executor("executor is shut down".into()))
            }
        }
    }

    /// Stops accepting work, lets queued jobs finish and joins every thread.
    fn shutdown(&self) {
        drop(self.tx.lock().take());
        let handles = std::mem::take(&mut *self.handles.lock());
        let current = thread::current().id();
        for handle in handles {
            // A job may shut down the executor it runs on.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!("[Executor] pool thread ended with a panic");
            }
        }
    }
}

impl Drop for PooledExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

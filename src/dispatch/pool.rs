use crate::dispatch::{DispatchWorker, SessionPool, WorkerFactory};
use crate::error::{BridgeError, BridgeResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Ceiling on workers alive at once, idle ones included.
    #[serde(default = "PoolConfig::default_max_active")]
    pub max_active: usize,
    /// Idle workers kept for reuse; extra returns are destroyed.
    #[serde(default = "PoolConfig::default_max_idle")]
    pub max_idle: usize,
}

impl PoolConfig {
    fn default_max_active() -> usize {
        8
    }

    fn default_max_idle() -> usize {
        8
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_active: Self::default_max_active(),
            max_idle: Self::default_max_idle(),
        }
    }
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<Arc<DispatchWorker>>,
    /// Workers lent out plus creations in flight.
    active: usize,
    closed: bool,
    /// Bumped by `evict_idle`; workers from an older epoch are not reused.
    epoch: u64,
}

/// Bounded pool of reusable dispatch workers.
pub struct DispatchPool {
    cfg: PoolConfig,
    factory: Arc<WorkerFactory>,
    state: Mutex<PoolState>,
}

impl DispatchPool {
    /// Builds the pool and binds it into `factory`.
    pub fn new(cfg: PoolConfig, factory: Arc<WorkerFactory>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<DispatchPool>| {
            let pool: Weak<dyn SessionPool> = weak.clone();
            factory.bind_pool(pool);
            Self {
                cfg,
                factory,
                state: Mutex::new(PoolState::default()),
            }
        })
    }

    pub fn factory(&self) -> &Arc<WorkerFactory> {
        &self.factory
    }

    pub fn borrow(&self) -> BridgeResult<Arc<DispatchWorker>> {
        let epoch = {
            let mut st = self.state.lock();
            if st.closed {
                return Err(BridgeError::PoolClosed);
            }
            if let Some(worker) = st.idle.pop_front() {
                st.active += 1;
                worker.lend();
                return Ok(worker);
            }
            if st.active + st.idle.len() >= self.cfg.max_active {
                return Err(BridgeError::Unavailable);
            }
            st.active += 1;
            st.epoch
        };

        // Created outside the lock: session setup talks to the broker.
        let created = self.factory.create_worker();

        let mut st = self.state.lock();
        match created {
            Ok(worker) if !st.closed => {
                worker.stamp(epoch);
                worker.lend();
                Ok(worker)
            }
            Ok(worker) => {
                st.active -= 1;
                drop(st);
                self.factory.destroy_worker(&worker);
                Err(BridgeError::PoolClosed)
            }
            Err(e) => {
                st.active -= 1;
                Err(e)
            }
        }
    }

    /// Returns a lent worker. Workers from before the last
    /// [`DispatchPool::evict_idle`] are destroyed instead of kept.
    pub fn release(&self, worker: &Arc<DispatchWorker>) {
        if !worker.give_back() {
            tracing::warn!("[DispatchPool] ignoring release of worker {} that is not lent out", worker.id());
            return;
        }
        worker.reset();
        let mut st = self.state.lock();
        debug_assert!(st.active > 0, "release with no worker lent out");
        st.active = st.active.saturating_sub(1);
        if st.closed || worker.epoch() != st.epoch || st.idle.len() >= self.cfg.max_idle {
            drop(st);
            self.factory.destroy_worker(worker);
            return;
        }
        st.idle.push_back(Arc::clone(worker));
    }

    pub fn invalidate(&self, worker: &Arc<DispatchWorker>) {
        if !worker.give_back() {
            tracing::warn!("[DispatchPool] ignoring invalidation of worker {} that is not lent out", worker.id());
            return;
        }
        {
            let mut st = self.state.lock();
            debug_assert!(st.active > 0, "invalidate with no worker lent out");
            st.active = st.active.saturating_sub(1);
        }
        self.factory.destroy_worker(worker);
    }

    /// Destroys idle workers and retires lent ones, whose sessions belong to
    /// a connection that is gone. The pool stays open.
    pub fn evict_idle(&self) {
        let idle = {
            let mut st = self.state.lock();
            st.epoch += 1;
            std::mem::take(&mut st.idle)
        };
        if !idle.is_empty() {
            tracing::debug!("[DispatchPool] evicting {} idle workers", idle.len());
        }
        for worker in idle {
            self.factory.destroy_worker(&worker);
        }
    }

    /// Closes the pool and destroys idle workers. Workers still lent out
    /// are destroyed as they come back.
    pub fn dispose(&self) {
        let idle = {
            let mut st = self.state.lock();
            st.closed = true;
            std::mem::take(&mut st.idle)
        };
        if !idle.is_empty() {
            tracing::debug!("[DispatchPool] destroying {} idle workers", idle.len());
        }
        for worker in idle {
            self.factory.destroy_worker(&worker);
        }
    }

    /// Accepts borrows again after [`DispatchPool::dispose`].
    pub fn reopen(&self) {
        self.state.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }
}

impl SessionPool for DispatchPool {
    fn server_session(&self) -> BridgeResult<Arc<DispatchWorker>> {
        self.borrow()
    }

    fn release(&self, worker: &Arc<DispatchWorker>) {
        DispatchPool::release(self, worker)
    }

    fn invalidate(&self, worker: &Arc<DispatchWorker>) {
        DispatchPool::invalidate(self, worker)
    }
}

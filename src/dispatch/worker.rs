use crate::broker::Session;
use crate::context::{self, SessionContext};
use crate::dispatch::SessionPool;
use crate::error::{BridgeError, BridgeResult};
use crate::executor::{DispatchExecutor, panic_message};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// One pooled session plus the machinery to run it on the executor.
///
/// A worker is lent to exactly one dispatch at a time: `start` refuses a
/// second submission until the pool resets it on release.
pub struct DispatchWorker {
    id: WorkerId,
    session: Arc<dyn Session>,
    executor: Arc<dyn DispatchExecutor>,
    pool: Weak<dyn SessionPool>,
    context: Arc<dyn SessionContext>,
    started: AtomicBool,
    /// Raised while a pool has the worker lent out.
    lent: AtomicBool,
    /// Pool epoch the session was created in.
    epoch: AtomicU64,
}

impl DispatchWorker {
    pub fn new(
        session: Arc<dyn Session>,
        executor: Arc<dyn DispatchExecutor>,
        pool: Weak<dyn SessionPool>,
        context: Arc<dyn SessionContext>,
    ) -> Self {
        Self {
            id: WorkerId::new(),
            session,
            executor,
            pool,
            context,
            started: AtomicBool::new(false),
            lent: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    #[inline]
    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Submits [`DispatchWorker::run`] to the executor.
    pub fn start(self: &Arc<Self>) -> BridgeResult<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BridgeError::AlreadyStarted);
        }

        let worker = Arc::clone(self);
        let name = format!("worker-{}", self.id);
        if let Err(e) = self.executor.submit(&name, Box::new(move || worker.run())) {
            self.started.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    /// Delivers the session's pending messages, then hands the worker back
    /// to its pool: released on success, invalidated on error or panic.
    pub fn run(self: &Arc<Self>) {
        let outcome = {
            let _guard = context::enter(self.context.as_ref(), Arc::clone(&self.session));
            match panic::catch_unwind(AssertUnwindSafe(|| self.session.run())) {
                Ok(res) => res,
                Err(p) => Err(anyhow::anyhow!("session panicked: {}", panic_message(p.as_ref()))),
            }
        };

        let Some(pool) = self.pool.upgrade() else {
            tracing::debug!("[DispatchWorker] {} finished after its pool was dropped", self.id);
            if let Err(e) = self.close() {
                tracing::warn!("[DispatchWorker] {} close failed: {e:#}", self.id);
            }
            return;
        };

        match outcome {
            Ok(()) => pool.release(self),
            Err(e) => {
                tracing::warn!("[DispatchWorker] {} delivery failed, evicting: {e:#}", self.id);
                pool.invalidate(self);
            }
        }
    }

    pub(crate) fn lend(&self) {
        self.lent.store(true, Ordering::Release);
    }

    /// Clears the lent flag; `false` if the worker was not lent out.
    pub(crate) fn give_back(&self) -> bool {
        self.lent.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn stamp(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::Release);
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self) {
        self.started.store(false, Ordering::Release);
    }

    pub fn close(&self) -> anyhow::Result<()> {
        self.session.close()
    }
}

impl fmt::Debug for DispatchWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchWorker")
            .field("id", &self.id)
            .field("started", &self.is_started())
            .finish()
    }
}

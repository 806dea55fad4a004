use crate::broker::{Connection, FaultListener};
use crate::connector::{ConnectionSource, ConnectorCallback};
use crate::executor::DispatchExecutor;
use crate::utils::CancelToken;
use crate::utils::backoff::ReconnectDelay;
use crate::utils::logger::Throttle;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

const FAILURE_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Keeps one broker connection alive, reconnecting with backoff on failure.
///
/// Two independent flags drive it:
/// - `running`: whether the connector should be active at all;
/// - `connecting`: whether some thread currently owns a (re)connect attempt.
///
/// The fault listener claims `connecting` with a compare-and-swap, so it
/// never blocks behind an attempt that is talking to the broker.
pub struct Connector {
    inner: Arc<ConnectorInner>,
}

struct ConnectorInner {
    name: String,
    source: Arc<dyn ConnectionSource>,
    callback: Arc<dyn ConnectorCallback>,
    delay: Arc<dyn ReconnectDelay>,
    executor: Arc<dyn DispatchExecutor>,
    cancel: CancelToken,
    running: AtomicBool,
    connecting: AtomicBool,
    /// Bumped on every attempt; faults from older connections are ignored.
    generation: AtomicU64,
    active: Mutex<Option<Arc<dyn Connection>>>,
    /// Per connector, so one subscription's outage never hides another's.
    failure_log: Throttle,
}

impl Connector {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn ConnectionSource>,
        callback: Arc<dyn ConnectorCallback>,
        delay: Arc<dyn ReconnectDelay>,
        executor: Arc<dyn DispatchExecutor>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                name: name.into(),
                source,
                callback,
                delay,
                executor,
                cancel,
                running: AtomicBool::new(false),
                connecting: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                active: Mutex::new(None),
                failure_log: Throttle::new(FAILURE_LOG_INTERVAL),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn start(&self) {
        let inner = &self.inner;
        if inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("[Connector] {} is already running", inner.name);
            return;
        }
        inner.connecting.store(true, Ordering::Release);
        inner.schedule();
    }

    pub fn stop(&self) {
        let inner = &self.inner;
        if inner
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("[Connector] {} is not running", inner.name);
            return;
        }
        inner.delay.reset();

        let active = inner.active.lock().take();
        if let Some(conn) = active
            && let Err(e) = conn.close()
        {
            tracing::warn!("[Connector] {} failed to close connection: {e:#}", inner.name);
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.active.lock().is_some()
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

impl ConnectorInner {
    fn schedule(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let name = format!("connector-{}", self.name);
        if let Err(e) = self.executor.submit(&name, Box::new(move || inner.run())) {
            tracing::error!("[Connector] {} executor won't accept work: {e}", self.name);
        }
    }

    /// Connect loop; returns once a connection is up, the connector stops,
    /// or a backoff wait is interrupted.
    fn run(self: &Arc<Self>) {
        while self.running.load(Ordering::Acquire) && self.connecting.load(Ordering::Acquire) {
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

            let conn = match self.source.open() {
                Ok(conn) => conn,
                Err(e) => {
                    crate::warn_throttled!(
                        self.failure_log,
                        "[Connector] {} cannot open connection: {:#}",
                        self.name,
                        e
                    );
                    if !self.backoff() {
                        return;
                    }
                    continue;
                }
            };

            let mut released = false;
            match self.establish(&conn, generation, &mut released) {
                Ok(()) => {
                    self.retain(conn);
                    return;
                }
                Err(e) => {
                    crate::warn_throttled!(
                        self.failure_log,
                        "[Connector] {} connect attempt failed: {:#}",
                        self.name,
                        e
                    );
                    // Ownership was handed back before `on_ready`; take it
                    // again unless a fault handler got there first.
                    if released
                        && self
                            .connecting
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_err()
                    {
                        return;
                    }
                    self.cleanup(&conn);
                    if !self.backoff() {
                        return;
                    }
                }
            }
        }
    }

    fn establish(
        self: &Arc<Self>,
        conn: &Arc<dyn Connection>,
        generation: u64,
        released: &mut bool,
    ) -> anyhow::Result<()> {
        conn.set_fault_listener(self.fault_listener(conn, generation))?;
        conn.start()?;
        self.connecting.store(false, Ordering::Release);
        *released = true;
        self.delay.reset();
        self.callback.on_ready(conn)
    }

    fn retain(&self, conn: Arc<dyn Connection>) {
        let mut active = self.active.lock();
        // `stop` clears `running` before taking `active`, so checking under
        // the lock tells whether it will see this connection.
        if !self.running.load(Ordering::Acquire) {
            drop(active);
            if let Err(e) = conn.close() {
                tracing::debug!("[Connector] {} close after stop: {e:#}", self.name);
            }
            return;
        }
        *active = Some(conn);
        tracing::info!("[Connector] {} connected", self.name);
    }

    fn fault_listener(self: &Arc<Self>, conn: &Arc<dyn Connection>, generation: u64) -> FaultListener {
        let inner = Arc::downgrade(self);
        let conn = Arc::downgrade(conn);
        Arc::new(move |err: anyhow::Error| {
            if let Some(inner) = inner.upgrade() {
                inner.on_fault(&conn, generation, err);
            }
        })
    }

    fn on_fault(self: &Arc<Self>, conn: &Weak<dyn Connection>, generation: u64, err: anyhow::Error) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        if generation != self.generation.load(Ordering::Acquire) {
            tracing::debug!("[Connector] {} ignoring fault from a stale connection", self.name);
            return;
        }
        if self
            .connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        tracing::warn!("[Connector] {} connection lost: {err:#}", self.name);

        if let Some(conn) = conn.upgrade() {
            {
                let mut active = self.active.lock();
                if active
                    .as_ref()
                    .is_some_and(|a| std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(&conn)))
                {
                    active.take();
                }
            }
            self.cleanup(&conn);
        }

        if self.backoff() {
            self.schedule();
        }
    }

    fn cleanup(&self, conn: &Arc<dyn Connection>) {
        if let Err(e) = self.callback.on_failed(conn) {
            tracing::warn!("[Connector] {} error while cleaning up: {e:#}", self.name);
        }
        if let Err(e) = conn.close() {
            tracing::debug!("[Connector] {} close of failed connection: {e:#}", self.name);
        }
    }

    /// `false` means the wait was interrupted and no reconnect should follow.
    fn backoff(&self) -> bool {
        match self.delay.pause(&self.cancel) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("[Connector] {} reconnect abandoned: {e}", self.name);
                false
            }
        }
    }
}

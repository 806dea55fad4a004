//! In-process broker doubles with counters and scripted failures.

use crate::broker::{
    Connection, ConnectionFactory, Consumer, ConsumerRequest, Destination, DestinationKind,
    DestinationResolver, EndpointFactory, FaultListener, Message, MessageListener, Session,
};
use crate::connector::ConnectorCallback;
use crate::context::{SessionContext, ThreadLocalSessionContext, current_session};
use crate::descriptor::{AckMode, Credentials};
use crate::dispatch::{DispatchWorker, SessionPool};
use crate::error::{BridgeError, BridgeResult};
use crate::executor::{DispatchExecutor, Job};
use crate::utils::CancelToken;
use crate::utils::backoff::ReconnectDelay;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

fn take_one(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

/// Runs every job on the submitting thread.
#[derive(Default)]
pub struct InlineExecutor {
    submitted: AtomicUsize,
    reject: AtomicBool,
}

impl InlineExecutor {
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::Acquire)
    }

    pub fn reject(&self, on: bool) {
        self.reject.store(on, Ordering::Release);
    }
}

impl DispatchExecutor for InlineExecutor {
    fn submit(&self, name: &str, job: Job) -> BridgeResult<()> {
        if self.reject.load(Ordering::Acquire) {
            return Err(BridgeError::Executor(format!("{name} rejected")));
        }
        self.submitted.fetch_add(1, Ordering::AcqRel);
        job();
        Ok(())
    }
}

#[derive(Default)]
struct SessionStats {
    closed: AtomicUsize,
    saw_context: AtomicBool,
}

#[derive(Default, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    #[default]
    Deliver,
    Fail,
    Panic,
}

#[derive(Default)]
pub struct MockSession {
    mode: RunMode,
    listener: Mutex<Option<Box<dyn MessageListener>>>,
    pending: Mutex<Vec<Message>>,
    runs: AtomicUsize,
    closes: AtomicUsize,
    stats: Option<Arc<SessionStats>>,
    /// Closed flag of the connection that created the session.
    connection_closed: Option<Arc<AtomicBool>>,
}

impl MockSession {
    pub fn failing() -> Self {
        Self {
            mode: RunMode::Fail,
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            mode: RunMode::Panic,
            ..Self::default()
        }
    }

    fn shared(stats: Arc<SessionStats>, connection_closed: Arc<AtomicBool>) -> Self {
        Self {
            stats: Some(stats),
            connection_closed: Some(connection_closed),
            ..Self::default()
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::Acquire)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::Acquire)
    }
}

impl Session for MockSession {
    fn set_listener(&self, listener: Box<dyn MessageListener>) -> anyhow::Result<()> {
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    fn load(&self, message: Message) {
        self.pending.lock().push(message);
    }

    fn run(&self) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::AcqRel);
        if let Some(stats) = &self.stats
            && current_session().is_some()
        {
            stats.saw_context.store(true, Ordering::Release);
        }
        if self
            .connection_closed
            .as_ref()
            .is_some_and(|closed| closed.load(Ordering::Acquire))
        {
            anyhow::bail!("session belongs to a closed connection");
        }
        match self.mode {
            RunMode::Fail => anyhow::bail!("delivery failed"),
            RunMode::Panic => panic!("listener blew up"),
            RunMode::Deliver => {}
        }
        let pending = std::mem::take(&mut *self.pending.lock());
        let mut listener = self.listener.lock();
        for message in &pending {
            if let Some(listener) = listener.as_mut() {
                listener.on_message(message)?;
            }
        }
        Ok(())
    }

    fn close(&self) -> anyhow::Result<()> {
        self.closes.fetch_add(1, Ordering::AcqRel);
        if let Some(stats) = &self.stats {
            stats.closed.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }
}

pub struct MockConsumer {
    closes: Arc<AtomicUsize>,
    fail: bool,
}

impl Consumer for MockConsumer {
    fn close(&mut self) -> anyhow::Result<()> {
        self.closes.fetch_add(1, Ordering::AcqRel);
        if self.fail {
            anyhow::bail!("consumer already gone");
        }
        Ok(())
    }
}

/// Connection double. `MockFactory::new` hands the same instance out on
/// every open so counters accumulate across reconnects; starting it again
/// revives its sessions.
#[derive(Default)]
pub struct MockConnection {
    starts: AtomicUsize,
    closed: Arc<AtomicBool>,
    start_failures: AtomicUsize,
    closes: AtomicUsize,
    listeners_set: AtomicUsize,
    sessions_created: AtomicUsize,
    consumers_opened: AtomicUsize,
    consumer_closes: Arc<AtomicUsize>,
    fail_consumer_close: AtomicBool,
    sessions: Arc<SessionStats>,
    listener: Mutex<Option<FaultListener>>,
    last_request: Mutex<Option<ConsumerRequest>>,
    pool: Mutex<Option<Weak<dyn SessionPool>>>,
}

impl MockConnection {
    /// The next `n` calls to `start` fail.
    pub fn fail_starts(&self, n: usize) {
        self.start_failures.store(n, Ordering::Release);
    }

    pub fn fail_consumer_close(&self, on: bool) {
        self.fail_consumer_close.store(on, Ordering::Release);
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::Acquire)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::Acquire)
    }

    pub fn listeners_set(&self) -> usize {
        self.listeners_set.load(Ordering::Acquire)
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::Acquire)
    }

    pub fn sessions_closed(&self) -> usize {
        self.sessions.closed.load(Ordering::Acquire)
    }

    pub fn saw_session_context(&self) -> bool {
        self.sessions.saw_context.load(Ordering::Acquire)
    }

    pub fn consumers_opened(&self) -> usize {
        self.consumers_opened.load(Ordering::Acquire)
    }

    pub fn consumers_closed(&self) -> usize {
        self.consumer_closes.load(Ordering::Acquire)
    }

    pub fn last_request(&self) -> Option<ConsumerRequest> {
        self.last_request.lock().clone()
    }

    pub fn fault_listener(&self) -> Option<FaultListener> {
        self.listener.lock().clone()
    }

    /// Reports a broker-side fault through the installed listener.
    pub fn fault(&self) -> bool {
        match self.fault_listener() {
            Some(listener) => {
                listener(anyhow::anyhow!("connection reset by broker"));
                true
            }
            None => false,
        }
    }

    /// Hands a message to a pooled worker the way a broker consumer would.
    pub fn deliver(&self, message: Message) -> BridgeResult<Arc<DispatchWorker>> {
        let pool = self
            .pool
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(BridgeError::NotBound("session pool"))?;
        let worker = pool.server_session()?;
        worker.session().load(message);
        worker.start()?;
        Ok(worker)
    }
}

impl Connection for MockConnection {
    fn set_fault_listener(&self, listener: FaultListener) -> anyhow::Result<()> {
        self.listeners_set.fetch_add(1, Ordering::AcqRel);
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    fn start(&self) -> anyhow::Result<()> {
        self.starts.fetch_add(1, Ordering::AcqRel);
        self.closed.store(false, Ordering::Release);
        if take_one(&self.start_failures) {
            anyhow::bail!("broker refused start");
        }
        Ok(())
    }

    fn create_session(&self, _ack_mode: AckMode) -> anyhow::Result<Arc<dyn Session>> {
        self.sessions_created.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(MockSession::shared(
            Arc::clone(&self.sessions),
            Arc::clone(&self.closed),
        )))
    }

    fn open_consumer(
        &self,
        request: ConsumerRequest,
        pool: Arc<dyn SessionPool>,
    ) -> anyhow::Result<Box<dyn Consumer>> {
        self.consumers_opened.fetch_add(1, Ordering::AcqRel);
        *self.last_request.lock() = Some(request);
        *self.pool.lock() = Some(Arc::downgrade(&pool));
        Ok(Box::new(MockConsumer {
            closes: Arc::clone(&self.consumer_closes),
            fail: self.fail_consumer_close.load(Ordering::Acquire),
        }))
    }

    fn close(&self) -> anyhow::Result<()> {
        self.closes.fetch_add(1, Ordering::AcqRel);
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

pub struct MockFactory {
    /// `None` opens a new connection every time.
    conn: Option<Arc<MockConnection>>,
    opened: Mutex<Vec<Arc<MockConnection>>>,
    opens: AtomicUsize,
    open_failures: AtomicUsize,
    last_credentials: Mutex<Option<Credentials>>,
}

impl MockFactory {
    pub fn new(conn: Arc<MockConnection>) -> Self {
        Self::with_connection(Some(conn))
    }

    /// Opens a distinct connection per call, as a real broker client does.
    pub fn fresh() -> Self {
        Self::with_connection(None)
    }

    fn with_connection(conn: Option<Arc<MockConnection>>) -> Self {
        Self {
            conn,
            opened: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
            open_failures: AtomicUsize::new(0),
            last_credentials: Mutex::new(None),
        }
    }

    /// The `n`-th connection handed out successfully.
    pub fn connection(&self, n: usize) -> Option<Arc<MockConnection>> {
        self.opened.lock().get(n).cloned()
    }

    pub fn fail_opens(&self, n: usize) {
        self.open_failures.store(n, Ordering::Release);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::Acquire)
    }

    pub fn last_credentials(&self) -> Option<Credentials> {
        self.last_credentials.lock().clone()
    }
}

impl ConnectionFactory for MockFactory {
    fn create_connection(
        &self,
        credentials: Option<&Credentials>,
    ) -> anyhow::Result<Arc<dyn Connection>> {
        self.opens.fetch_add(1, Ordering::AcqRel);
        *self.last_credentials.lock() = credentials.cloned();
        if take_one(&self.open_failures) {
            anyhow::bail!("listener refused connection");
        }
        let conn = self.conn.clone().unwrap_or_default();
        self.opened.lock().push(Arc::clone(&conn));
        Ok(conn)
    }
}

/// Delay that never sleeps; can be told to report an interrupted wait.
#[derive(Default)]
pub struct CountingDelay {
    pauses: AtomicUsize,
    resets: AtomicUsize,
    interrupt: AtomicBool,
}

impl CountingDelay {
    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::Acquire)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::Acquire)
    }

    pub fn interrupt(&self, on: bool) {
        self.interrupt.store(on, Ordering::Release);
    }
}

impl ReconnectDelay for CountingDelay {
    fn pause(&self, _cancel: &CancelToken) -> BridgeResult<()> {
        self.pauses.fetch_add(1, Ordering::AcqRel);
        if self.interrupt.load(Ordering::Acquire) {
            return Err(BridgeError::Interrupted);
        }
        Ok(())
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Default)]
pub struct RecordingCallback {
    ready: AtomicUsize,
    failed: AtomicUsize,
    ready_failures: AtomicUsize,
    last_ready: Mutex<Option<Arc<dyn Connection>>>,
}

impl RecordingCallback {
    pub fn ready(&self) -> usize {
        self.ready.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Acquire)
    }

    pub fn fail_ready(&self, n: usize) {
        self.ready_failures.store(n, Ordering::Release);
    }

    pub fn last_ready_is(&self, conn: &Arc<MockConnection>) -> bool {
        self.last_ready
            .lock()
            .as_ref()
            .is_some_and(|last| std::ptr::addr_eq(Arc::as_ptr(last), Arc::as_ptr(conn)))
    }
}

impl ConnectorCallback for RecordingCallback {
    fn on_ready(&self, connection: &Arc<dyn Connection>) -> anyhow::Result<()> {
        self.ready.fetch_add(1, Ordering::AcqRel);
        *self.last_ready.lock() = Some(Arc::clone(connection));
        if take_one(&self.ready_failures) {
            anyhow::bail!("consumer could not be opened");
        }
        Ok(())
    }

    fn on_failed(&self, _connection: &Arc<dyn Connection>) -> anyhow::Result<()> {
        self.failed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

struct RecordingListener {
    received: Arc<Mutex<Vec<String>>>,
}

impl MessageListener for RecordingListener {
    fn on_message(&mut self, message: &Message) -> anyhow::Result<()> {
        self.received.lock().push(message.id.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingEndpoints {
    created: AtomicUsize,
    fail: bool,
    received: Arc<Mutex<Vec<String>>>,
}

impl CountingEndpoints {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    /// Ids of every message delivered to any endpoint from this factory.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }
}

impl EndpointFactory for CountingEndpoints {
    fn create_endpoint(&self) -> anyhow::Result<Box<dyn MessageListener>> {
        self.created.fetch_add(1, Ordering::AcqRel);
        if self.fail {
            anyhow::bail!("endpoint unavailable");
        }
        Ok(Box::new(RecordingListener {
            received: Arc::clone(&self.received),
        }))
    }
}

#[derive(Default)]
pub struct RecordingPool {
    released: AtomicUsize,
    invalidated: AtomicUsize,
}

impl RecordingPool {
    pub fn released(&self) -> usize {
        self.released.load(Ordering::Acquire)
    }

    pub fn invalidated(&self) -> usize {
        self.invalidated.load(Ordering::Acquire)
    }
}

impl SessionPool for RecordingPool {
    fn server_session(&self) -> BridgeResult<Arc<DispatchWorker>> {
        Err(BridgeError::Unavailable)
    }

    fn release(&self, _worker: &Arc<DispatchWorker>) {
        self.released.fetch_add(1, Ordering::AcqRel);
    }

    fn invalidate(&self, _worker: &Arc<DispatchWorker>) {
        self.invalidated.fetch_add(1, Ordering::AcqRel);
    }
}

/// Thread-local context that also counts calls.
#[derive(Default)]
pub struct RecordingContext {
    sets: AtomicUsize,
    clears: AtomicUsize,
}

impl RecordingContext {
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::Acquire)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::Acquire)
    }
}

impl SessionContext for RecordingContext {
    fn set(&self, session: Arc<dyn Session>) {
        self.sets.fetch_add(1, Ordering::AcqRel);
        ThreadLocalSessionContext.set(session);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::AcqRel);
        ThreadLocalSessionContext.clear();
    }
}

pub struct FailingResolver;

impl DestinationResolver for FailingResolver {
    fn resolve(&self, name: &str, _kind: DestinationKind) -> anyhow::Result<Destination> {
        anyhow::bail!("no such destination: {name}")
    }
}

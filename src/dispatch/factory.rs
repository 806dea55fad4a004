use crate::broker::{Connection, EndpointFactory};
use crate::context::SessionContext;
use crate::descriptor::AckMode;
use crate::dispatch::{DispatchWorker, SessionPool};
use crate::error::{BridgeError, BridgeResult};
use crate::executor::DispatchExecutor;
use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Connection currently used to open worker sessions.
struct Binding {
    connection: Arc<dyn Connection>,
}

/// Builds and tears down pooled workers.
///
/// Both a connection and a pool must be bound before `create_worker`
/// succeeds. The connection is swapped in and out as the connector
/// reconnects; the pool is bound once when the pool is built.
pub struct WorkerFactory {
    connection: ArcSwapOption<Binding>,
    pool: RwLock<Option<Weak<dyn SessionPool>>>,
    endpoints: Arc<dyn EndpointFactory>,
    ack_mode: AckMode,
    executor: Arc<dyn DispatchExecutor>,
    context: Arc<dyn SessionContext>,
}

impl WorkerFactory {
    pub fn new(
        endpoints: Arc<dyn EndpointFactory>,
        ack_mode: AckMode,
        executor: Arc<dyn DispatchExecutor>,
        context: Arc<dyn SessionContext>,
    ) -> Self {
        Self {
            connection: ArcSwapOption::empty(),
            pool: RwLock::new(None),
            endpoints,
            ack_mode,
            executor,
            context,
        }
    }

    pub fn bind_connection(&self, connection: Arc<dyn Connection>) {
        self.connection.store(Some(Arc::new(Binding { connection })));
    }

    pub fn unbind_connection(&self) {
        self.connection.store(None);
    }

    pub fn is_connection_bound(&self) -> bool {
        self.connection.load().is_some()
    }

    pub fn bind_pool(&self, pool: Weak<dyn SessionPool>) {
        *self.pool.write() = Some(pool);
    }

    pub fn create_worker(&self) -> BridgeResult<Arc<DispatchWorker>> {
        let Some(pool) = self.pool.read().clone() else {
            tracing::error!("[WorkerFactory] create_worker called before a session pool was bound");
            return Err(BridgeError::NotBound("session pool"));
        };
        let Some(binding) = self.connection.load_full() else {
            tracing::error!("[WorkerFactory] create_worker called without a bound connection");
            return Err(BridgeError::NotBound("connection"));
        };

        let session = binding.connection.create_session(self.ack_mode)?;
        let installed = self
            .endpoints
            .create_endpoint()
            .and_then(|listener| session.set_listener(listener));
        if let Err(e) = installed {
            if let Err(close_err) = session.close() {
                tracing::debug!("[WorkerFactory] close after failed setup: {close_err:#}");
            }
            return Err(e.into());
        }

        Ok(Arc::new(DispatchWorker::new(
            session,
            Arc::clone(&self.executor),
            pool,
            Arc::clone(&self.context),
        )))
    }

    pub fn destroy_worker(&self, worker: &DispatchWorker) {
        if let Err(e) = worker.close() {
            tracing::warn!("[WorkerFactory] failed to close worker {}: {e:#}", worker.id());
        }
    }
}

use crate::broker::{ConnectionFactory, DestinationResolver, EndpointFactory};
use crate::config::AdapterConfig;
use crate::context::{SessionContext, ThreadLocalSessionContext};
use crate::descriptor::SubscriptionDescriptor;
use crate::endpoint::RunnerContext;
use crate::error::{BridgeError, BridgeResult};
use crate::executor::DispatchExecutor;
use crate::registry::Registry;
use crate::utils::CancelToken;
use parking_lot::Mutex;
use std::sync::Arc;

struct Running {
    registry: Arc<Registry>,
    executor: Arc<dyn DispatchExecutor>,
}

/// Entry point: owns the registry of active subscriptions and the executor
/// every subscription dispatches on.
pub struct Adapter {
    cfg: AdapterConfig,
    connections: Arc<dyn ConnectionFactory>,
    resolver: Arc<dyn DestinationResolver>,
    session_context: Arc<dyn SessionContext>,
    running: Mutex<Option<Running>>,
}

impl Adapter {
    pub fn new(
        cfg: AdapterConfig,
        connections: Arc<dyn ConnectionFactory>,
        resolver: Arc<dyn DestinationResolver>,
    ) -> Self {
        Self {
            cfg,
            connections,
            resolver,
            session_context: Arc::new(ThreadLocalSessionContext),
            running: Mutex::new(None),
        }
    }

    pub fn with_session_context(mut self, ctx: Arc<dyn SessionContext>) -> Self {
        self.session_context = ctx;
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.cfg
    }

    /// Starts with the executor described by the configuration.
    pub fn start(&self) -> BridgeResult<()> {
        if self.is_started() {
            tracing::warn!("[Adapter] already started");
            return Ok(());
        }
        let executor = self.cfg.executor.build()?;
        self.start_with_executor(executor);
        Ok(())
    }

    pub fn start_with_executor(&self, executor: Arc<dyn DispatchExecutor>) {
        let mut running = self.running.lock();
        if running.is_some() {
            tracing::warn!("[Adapter] already started");
            return;
        }
        let ctx = RunnerContext {
            connections: Arc::clone(&self.connections),
            default_credentials: self.cfg.credentials.clone(),
            resolver: Arc::clone(&self.resolver),
            executor: Arc::clone(&executor),
            session_context: Arc::clone(&self.session_context),
            backoff: self.cfg.backoff.clone(),
            pool: self.cfg.pool,
            cancel: CancelToken::new_root(),
        };
        *running = Some(Running {
            registry: Arc::new(Registry::new(ctx)),
            executor,
        });
        tracing::info!(
            "[Adapter] started; default login: {}",
            self.cfg
                .credentials
                .as_ref()
                .and_then(|c| c.username())
                .unwrap_or("<none>")
        );
    }

    /// Stops every subscription and the executor.
    pub fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            tracing::warn!("[Adapter] not started");
            return;
        };
        running.registry.dispose_all();
        running.executor.shutdown();
        tracing::info!("[Adapter] stopped");
    }

    pub fn is_started(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn activate(
        &self,
        descriptor: &SubscriptionDescriptor,
        factory: &Arc<dyn EndpointFactory>,
    ) -> BridgeResult<()> {
        tracing::debug!("[Adapter] activating {:?}", descriptor);
        descriptor.validate()?;
        let registry = self.registry()?;
        let runner = registry.create(descriptor, factory)?;
        runner.start()
    }

    /// Failures are logged; deactivation never fails the caller.
    pub fn deactivate(&self, descriptor: &SubscriptionDescriptor, factory: &Arc<dyn EndpointFactory>) {
        tracing::debug!("[Adapter] deactivating {}", descriptor.destination);
        let stopped = self
            .registry()
            .and_then(|registry| registry.remove(descriptor, factory))
            .and_then(|runner| runner.stop());
        if let Err(e) = stopped {
            tracing::warn!("[Adapter] failed to stop {}: {e}", descriptor.destination);
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.running
            .lock()
            .as_ref()
            .map_or(0, |running| running.registry.len())
    }

    fn registry(&self) -> BridgeResult<Arc<Registry>> {
        self.running
            .lock()
            .as_ref()
            .map(|running| Arc::clone(&running.registry))
            .ok_or(BridgeError::NotStarted)
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        if self.is_started() {
            self.stop();
        }
    }
}

use crate::broker::{ConnectionFactory, DestinationResolver, EndpointFactory};
use crate::connector::{Connector, CredentialedSource};
use crate::context::SessionContext;
use crate::descriptor::{Credentials, SubscriptionDescriptor};
use crate::dispatch::{DispatchPool, PoolConfig, WorkerFactory};
use crate::endpoint::ConsumerBinding;
use crate::error::{BridgeError, BridgeResult};
use crate::executor::DispatchExecutor;
use crate::utils::CancelToken;
use crate::utils::backoff::{BackoffConfig, ExponentialBackoff, ReconnectDelay};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Collaborators shared by every runner of one adapter.
#[derive(Clone)]
pub struct RunnerContext {
    pub connections: Arc<dyn ConnectionFactory>,
    pub default_credentials: Option<Credentials>,
    pub resolver: Arc<dyn DestinationResolver>,
    pub executor: Arc<dyn DispatchExecutor>,
    pub session_context: Arc<dyn SessionContext>,
    pub backoff: BackoffConfig,
    pub pool: PoolConfig,
    /// Parent of each runner's connector token.
    pub cancel: CancelToken,
}

/// Drives one subscription: a connector, a worker pool, and the consumer
/// opened whenever the connector reports a live connection.
pub struct EndpointRunner {
    started: AtomicBool,
    connector: Connector,
    pool: Arc<DispatchPool>,
    binding: Arc<ConsumerBinding>,
}

impl EndpointRunner {
    pub fn new(
        ctx: &RunnerContext,
        descriptor: SubscriptionDescriptor,
        endpoints: Arc<dyn EndpointFactory>,
    ) -> Self {
        let delay = Arc::new(ExponentialBackoff::new(ctx.backoff.clone()));
        Self::with_delay(ctx, descriptor, endpoints, delay)
    }

    pub fn with_delay(
        ctx: &RunnerContext,
        descriptor: SubscriptionDescriptor,
        endpoints: Arc<dyn EndpointFactory>,
        delay: Arc<dyn ReconnectDelay>,
    ) -> Self {
        let factory = Arc::new(WorkerFactory::new(
            endpoints,
            descriptor.ack_mode,
            Arc::clone(&ctx.executor),
            Arc::clone(&ctx.session_context),
        ));
        let pool = DispatchPool::new(ctx.pool, factory);

        let source = Arc::new(CredentialedSource::new(
            Arc::clone(&ctx.connections),
            descriptor.credentials.as_ref(),
            ctx.default_credentials.as_ref(),
        ));
        let name = format!("{}:{}", descriptor.destination_kind, descriptor.destination);
        let binding = Arc::new(ConsumerBinding::new(
            descriptor,
            Arc::clone(&ctx.resolver),
            Arc::clone(&pool),
        ));
        let connector = Connector::new(
            name,
            source,
            binding.clone(),
            delay,
            Arc::clone(&ctx.executor),
            ctx.cancel.child(),
        );

        Self {
            started: AtomicBool::new(false),
            connector,
            pool,
            binding,
        }
    }

    pub fn start(&self) -> BridgeResult<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BridgeError::AlreadyStarted);
        }
        self.pool.reopen();
        self.connector.start();
        Ok(())
    }

    pub fn stop(&self) -> BridgeResult<()> {
        if self
            .started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BridgeError::AlreadyStopped);
        }
        self.connector.stop();
        self.binding.detach();
        self.pool.dispose();
        tracing::info!("[EndpointRunner] {} stopped", self.connector.name());
        Ok(())
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.connector.is_connected()
    }

    pub fn descriptor(&self) -> &SubscriptionDescriptor {
        self.binding.descriptor()
    }

    pub fn pool(&self) -> &Arc<DispatchPool> {
        &self.pool
    }
}

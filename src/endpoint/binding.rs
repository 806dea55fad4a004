use crate::broker::{Connection, Consumer, ConsumerRequest, DestinationResolver};
use crate::connector::ConnectorCallback;
use crate::descriptor::SubscriptionDescriptor;
use crate::dispatch::{DispatchPool, SessionPool};
use crate::error::BridgeError;
use anyhow::Context;
use parking_lot::Mutex;
use std::sync::Arc;

/// Ties a live connection to the subscription's broker-side consumer.
pub struct ConsumerBinding {
    descriptor: SubscriptionDescriptor,
    resolver: Arc<dyn DestinationResolver>,
    pool: Arc<DispatchPool>,
    consumer: Mutex<Option<Box<dyn Consumer>>>,
}

impl ConsumerBinding {
    pub fn new(
        descriptor: SubscriptionDescriptor,
        resolver: Arc<dyn DestinationResolver>,
        pool: Arc<DispatchPool>,
    ) -> Self {
        Self {
            descriptor,
            resolver,
            pool,
            consumer: Mutex::new(None),
        }
    }

    pub fn descriptor(&self) -> &SubscriptionDescriptor {
        &self.descriptor
    }

    pub fn has_consumer(&self) -> bool {
        self.consumer.lock().is_some()
    }

    pub fn consumer_request(&self) -> anyhow::Result<ConsumerRequest> {
        let d = &self.descriptor;
        let destination = self
            .resolver
            .resolve(&d.destination, d.destination_kind)
            .with_context(|| format!("cannot locate destination named '{}'", d.destination))?;

        let durable_name = if d.durable {
            if !destination.is_topic() {
                return Err(BridgeError::InvalidDestination(d.destination.clone()).into());
            }
            d.subscription_name().map(str::to_string)
        } else {
            None
        };

        Ok(ConsumerRequest {
            destination,
            selector: d.selector().map(str::to_string),
            durable_name,
            max_messages: d.max_messages,
        })
    }

    /// Unbinds the connection, drops pooled sessions opened on it and closes
    /// the consumer, ignoring close errors.
    pub fn detach(&self) {
        self.pool.factory().unbind_connection();
        self.pool.evict_idle();
        let consumer = self.consumer.lock().take();
        if let Some(mut consumer) = consumer
            && let Err(e) = consumer.close()
        {
            tracing::debug!("[EndpointRunner] consumer close failed: {e:#}");
        }
    }
}

impl ConnectorCallback for ConsumerBinding {
    fn on_ready(&self, connection: &Arc<dyn Connection>) -> anyhow::Result<()> {
        self.pool.factory().bind_connection(Arc::clone(connection));
        let request = self.consumer_request()?;
        let pool: Arc<dyn SessionPool> = self.pool.clone();
        let consumer = connection.open_consumer(request, pool)?;

        let previous = self.consumer.lock().replace(consumer);
        if let Some(mut previous) = previous
            && let Err(e) = previous.close()
        {
            tracing::debug!("[EndpointRunner] stale consumer close failed: {e:#}");
        }
        tracing::info!(
            "[EndpointRunner] consuming from {} {}",
            self.descriptor.destination_kind,
            self.descriptor.destination
        );
        Ok(())
    }

    fn on_failed(&self, _connection: &Arc<dyn Connection>) -> anyhow::Result<()> {
        self.detach();
        Ok(())
    }
}

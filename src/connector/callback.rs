use crate::broker::Connection;
use std::sync::Arc;

/// Receives connection lifecycle notifications from a [`super::Connector`].
///
/// Errors returned from either method are logged by the connector. A failed
/// `on_ready` is treated like a failed connect attempt.
pub trait ConnectorCallback: Send + Sync {
    fn on_ready(&self, connection: &Arc<dyn Connection>) -> anyhow::Result<()>;

    fn on_failed(&self, connection: &Arc<dyn Connection>) -> anyhow::Result<()>;
}

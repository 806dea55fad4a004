use crate::broker::{Connection, ConnectionFactory};
use crate::descriptor::Credentials;
use std::sync::Arc;

/// Opens a fresh broker connection for each connect attempt.
pub trait ConnectionSource: Send + Sync {
    fn open(&self) -> anyhow::Result<Arc<dyn Connection>>;
}

/// Opens connections with a subscription's own login when it names a user,
/// falling back to the adapter-wide default otherwise.
pub struct CredentialedSource {
    factory: Arc<dyn ConnectionFactory>,
    credentials: Option<Credentials>,
}

impl CredentialedSource {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        subscription: Option<&Credentials>,
        defaults: Option<&Credentials>,
    ) -> Self {
        let credentials = subscription
            .filter(|c| c.username().is_some())
            .or(defaults)
            .cloned();
        Self {
            factory,
            credentials,
        }
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

impl ConnectionSource for CredentialedSource {
    fn open(&self) -> anyhow::Result<Arc<dyn Connection>> {
        self.factory.create_connection(self.credentials.as_ref())
    }
}

//! Broker-facing seams consumed by the engine.
//!
//! Implementations wrap a concrete client library; every fallible call
//! returns `anyhow::Result` so vendor errors can carry their own context.

use crate::descriptor::{AckMode, Credentials};
use ahash::AHashMap;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::dispatch::SessionPool;

/// Invoked by the broker client when an established connection degrades.
pub type FaultListener = Arc<dyn Fn(anyhow::Error) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    #[default]
    Queue,
    Topic,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationKind::Queue => write!(f, "queue"),
            DestinationKind::Topic => write!(f, "topic"),
        }
    }
}

/// A resolved broker destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    Queue(String),
    Topic(String),
}

impl Destination {
    pub fn name(&self) -> &str {
        match self {
            Destination::Queue(name) | Destination::Topic(name) => name,
        }
    }

    pub fn kind(&self) -> DestinationKind {
        match self {
            Destination::Queue(_) => DestinationKind::Queue,
            Destination::Topic(_) => DestinationKind::Topic,
        }
    }

    #[inline]
    pub fn is_topic(&self) -> bool {
        matches!(self, Destination::Topic(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Message {
    pub id: String,
    pub payload: Bytes,
    pub properties: AHashMap<String, String>,
}

impl Message {
    pub fn new(id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            properties: AHashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Parameters for opening the broker-side consumer of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRequest {
    pub destination: Destination,
    pub selector: Option<String>,
    /// Set only for durable topic subscriptions.
    pub durable_name: Option<String>,
    pub max_messages: u32,
}

pub trait ConnectionFactory: Send + Sync {
    fn create_connection(
        &self,
        credentials: Option<&Credentials>,
    ) -> anyhow::Result<Arc<dyn Connection>>;
}

pub trait Connection: Send + Sync {
    fn set_fault_listener(&self, listener: FaultListener) -> anyhow::Result<()>;

    fn start(&self) -> anyhow::Result<()>;

    fn create_session(&self, ack_mode: AckMode) -> anyhow::Result<Arc<dyn Session>>;

    /// Opens a consumer that hands inbound messages to sessions borrowed
    /// from `pool`.
    fn open_consumer(
        &self,
        request: ConsumerRequest,
        pool: Arc<dyn SessionPool>,
    ) -> anyhow::Result<Box<dyn Consumer>>;

    fn close(&self) -> anyhow::Result<()>;
}

pub trait Session: Send + Sync {
    fn set_listener(&self, listener: Box<dyn MessageListener>) -> anyhow::Result<()>;

    /// Queues a message for the next `run`.
    fn load(&self, message: Message);

    /// Delivers every loaded message to the listener.
    fn run(&self) -> anyhow::Result<()>;

    fn close(&self) -> anyhow::Result<()>;
}

pub trait Consumer: Send {
    fn close(&mut self) -> anyhow::Result<()>;
}

pub trait MessageListener: Send {
    fn on_message(&mut self, message: &Message) -> anyhow::Result<()>;
}

/// Application-side factory producing one listener per pooled session.
pub trait EndpointFactory: Send + Sync {
    fn create_endpoint(&self) -> anyhow::Result<Box<dyn MessageListener>>;
}

pub trait DestinationResolver: Send + Sync {
    fn resolve(&self, name: &str, kind: DestinationKind) -> anyhow::Result<Destination>;
}

/// Resolver that maps a name straight onto a destination of the requested kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectResolver;

impl DestinationResolver for DirectResolver {
    fn resolve(&self, name: &str, kind: DestinationKind) -> anyhow::Result<Destination> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("destination name is empty");
        }
        Ok(match kind {
            DestinationKind::Queue => Destination::Queue(name.to_string()),
            DestinationKind::Topic => Destination::Topic(name.to_string()),
        })
    }
}

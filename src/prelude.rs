pub use crate::adapter::Adapter;
pub use crate::broker::{
    Connection, ConnectionFactory, Consumer, ConsumerRequest, Destination, DestinationKind,
    DestinationResolver, DirectResolver, EndpointFactory, FaultListener, Message, MessageListener,
    Session,
};
pub use crate::config::AdapterConfig;
pub use crate::context::current_session;
pub use crate::descriptor::{AckMode, Credentials, SubscriptionDescriptor};
pub use crate::dispatch::SessionPool;
pub use crate::error::{BridgeError, BridgeResult};
pub use crate::utils::logger::LoggerConfig;
pub use crate::utils::secret::SecretValue;

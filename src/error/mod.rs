use std::{error::Error, fmt};

const ERR_MSG_INTERRUPTED: &str = "wait interrupted";
const ERR_MSG_ALREADY_STARTED: &str = "already started";
const ERR_MSG_ALREADY_STOPPED: &str = "already stopped";
const ERR_MSG_ALREADY_REGISTERED: &str = "subscription is already registered";
const ERR_MSG_NOT_REGISTERED: &str = "subscription is not registered";
const ERR_MSG_UNAVAILABLE: &str = "dispatch pool exhausted";
const ERR_MSG_POOL_CLOSED: &str = "dispatch pool is closed";
const ERR_MSG_NOT_STARTED: &str = "adapter is not started";

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug)]
pub enum BridgeError {
    /// Cancellation observed while blocked in a wait.
    Interrupted,
    AlreadyStarted,
    AlreadyStopped,
    AlreadyRegistered,
    NotRegistered,
    /// Pool ceiling reached.
    Unavailable,
    PoolClosed,
    /// Durable subscription requested against a destination that is not a topic.
    InvalidDestination(String),
    /// Transient broker failure; drives the reconnect loop.
    ConnectionFailure(anyhow::Error),
    /// A worker factory was used before its connection or pool was bound.
    NotBound(&'static str),
    NotStarted,
    Executor(String),
    Config(ConfigErrors),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "{ERR_MSG_INTERRUPTED}"),
            Self::AlreadyStarted => write!(f, "{ERR_MSG_ALREADY_STARTED}"),
            Self::AlreadyStopped => write!(f, "{ERR_MSG_ALREADY_STOPPED}"),
            Self::AlreadyRegistered => write!(f, "{ERR_MSG_ALREADY_REGISTERED}"),
            Self::NotRegistered => write!(f, "{ERR_MSG_NOT_REGISTERED}"),
            Self::Unavailable => write!(f, "{ERR_MSG_UNAVAILABLE}"),
            Self::PoolClosed => write!(f, "{ERR_MSG_POOL_CLOSED}"),
            Self::InvalidDestination(name) => {
                write!(f, "destination '{name}' is not a topic; durable subscription refused")
            }
            Self::ConnectionFailure(err) => write!(f, "connection failure: {err}"),
            Self::NotBound(what) => write!(f, "worker factory has no {what} bound"),
            Self::NotStarted => write!(f, "{ERR_MSG_NOT_STARTED}"),
            Self::Executor(msg) => write!(f, "executor rejected work: {msg}"),
            Self::Config(errors) => write!(f, "{errors}"),
        }
    }
}

impl Error for BridgeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConnectionFailure(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        BridgeError::ConnectionFailure(err)
    }
}

/// Field-level violations collected while validating a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigErrors {
    errors: Vec<(&'static str, String)>,
}

impl ConfigErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, property: &'static str, message: impl Into<String>) {
        self.errors.push((property, message.into()));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Names of the violated properties, in the order they were reported.
    pub fn properties(&self) -> Vec<&'static str> {
        self.errors.iter().map(|(p, _)| *p).collect()
    }

    /// `Ok(())` when nothing was reported, otherwise a [`BridgeError::Config`].
    pub fn into_result(self) -> BridgeResult<()> {
        if self.has_errors() {
            Err(BridgeError::Config(self))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: ")?;
        for (property, message) in &self.errors {
            write!(f, "property {property}: {message}; ")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_list_every_property() {
        let mut errors = ConfigErrors::new();
        errors.add("destination", "physical destination is required");
        errors.add("max_messages", "a positive integer value is required");

        assert_eq!(errors.properties(), vec!["destination", "max_messages"]);
        let msg = errors.clone().into_result().unwrap_err().to_string();
        assert_eq!(
            msg,
            "configuration error: property destination: physical destination is required; \
             property max_messages: a positive integer value is required; "
        );
    }

    #[test]
    fn empty_config_errors_are_ok() {
        assert!(ConfigErrors::new().into_result().is_ok());
    }

    #[test]
    fn anyhow_converts_to_connection_failure() {
        let err: BridgeError = anyhow::anyhow!("socket reset").into();
        assert!(matches!(err, BridgeError::ConnectionFailure(_)));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "connection failure: socket reset");
    }
}

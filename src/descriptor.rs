use crate::broker::DestinationKind;
use crate::error::{BridgeResult, ConfigErrors};
use crate::utils::secret::SecretValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    #[default]
    Auto,
    DupsOk,
}

/// Broker login used when opening a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretValue>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(SecretValue::new(password)),
        }
    }

    pub fn username(&self) -> Option<&str> {
        non_blank(self.username.as_deref())
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(SecretValue::expose)
    }
}

/// Everything needed to open one subscription against the broker.
///
/// Blank strings are treated as absent, matching how the values usually
/// arrive from deployment descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct SubscriptionDescriptor {
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub destination_kind: DestinationKind,
    #[serde(default)]
    pub durable: bool,
    #[serde(default)]
    pub subscription_name: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
    /// Upper bound on concurrently dispatched sessions.
    #[serde(default = "SubscriptionDescriptor::default_max_messages")]
    pub max_messages: u32,
    #[serde(default)]
    pub ack_mode: AckMode,
    /// Overrides the adapter's default credentials for this subscription.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl SubscriptionDescriptor {
    fn default_max_messages() -> u32 {
        10
    }

    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            destination: name.into(),
            ..Self::default()
        }
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            destination: name.into(),
            destination_kind: DestinationKind::Topic,
            ..Self::default()
        }
    }

    pub fn durable(mut self, subscription_name: impl Into<String>, client_id: impl Into<String>) -> Self {
        self.durable = true;
        self.subscription_name = Some(subscription_name.into());
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_max_messages(mut self, max_messages: u32) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn subscription_name(&self) -> Option<&str> {
        non_blank(self.subscription_name.as_deref())
    }

    pub fn client_id(&self) -> Option<&str> {
        non_blank(self.client_id.as_deref())
    }

    pub fn selector(&self) -> Option<&str> {
        non_blank(self.selector.as_deref())
    }

    /// Checks every field and reports all violations at once.
    pub fn validate(&self) -> BridgeResult<()> {
        let mut errors = ConfigErrors::new();

        if self.durable && self.client_id().is_none() {
            errors.add("client_id", "ID is required for durable subscription");
        }
        if self.destination.trim().is_empty() {
            errors.add("destination", "physical destination is required");
        }
        if self.max_messages == 0 {
            errors.add("max_messages", "a positive integer value is required");
        }
        if self.durable && self.destination_kind != DestinationKind::Topic {
            errors.add("durable", "cannot specify a durable subscription for a queue");
        }
        if self.durable && self.subscription_name().is_none() {
            errors.add("subscription_name", "name is required for durable subscription");
        }
        if let Some(creds) = &self.credentials
            && creds.username().is_some()
            && creds.password.is_none()
        {
            errors.add("username", "password is required when specifying a username");
        }

        errors.into_result()
    }
}

impl Default for SubscriptionDescriptor {
    fn default() -> Self {
        Self {
            destination: String::new(),
            destination_kind: DestinationKind::Queue,
            durable: false,
            subscription_name: None,
            client_id: None,
            selector: None,
            max_messages: Self::default_max_messages(),
            ack_mode: AckMode::Auto,
            credentials: None,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

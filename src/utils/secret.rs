use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A credential that never appears in logs or serialized output.
///
/// Deserializes from a plain string, or from `{ value, env }` where `env`
/// names a variable that overrides `value` when it is set.
#[derive(Clone, Default)]
pub struct SecretValue {
    value: String,
    env: Option<String>,
}

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            env: None,
        }
    }

    pub fn from_env(var: impl Into<String>) -> Self {
        let mut secret = Self {
            value: String::new(),
            env: Some(var.into()),
        };
        secret.refresh_from_env();
        secret
    }

    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn env_var(&self) -> Option<&str> {
        self.env.as_deref()
    }

    /// Re-reads the backing environment variable. Returns `false` when no
    /// variable is configured or it is unset.
    pub fn refresh_from_env(&mut self) -> bool {
        let Some(var) = self.env.as_deref() else {
            return false;
        };
        match std::env::var(var) {
            Ok(value) => {
                self.value = value;
                true
            }
            Err(_) => {
                tracing::warn!("[Secret] environment variable {var} is not set");
                false
            }
        }
    }
}

impl PartialEq for SecretValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for SecretValue {}

impl Hash for SecretValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("value", &"***")
            .field("env", &self.env)
            .finish()
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Plain(String),
            Detailed {
                #[serde(default)]
                value: String,
                env: Option<String>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Plain(value) => SecretValue::new(value),
            Repr::Detailed { value, env } => {
                let mut secret = SecretValue { value, env };
                secret.refresh_from_env();
                secret
            }
        })
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Masked<'a> {
            value: &'static str,
            env: &'a Option<String>,
        }

        Masked {
            value: "***",
            env: &self.env,
        }
        .serialize(serializer)
    }
}

/// Loads a dotenv file (`.env` by default) without overriding variables that
/// are already set. A missing file is not an error.
pub fn load_dotenv(path: Option<&str>) {
    let res = match path {
        Some(path) => dotenvy::from_filename(path).map(|p| p.display().to_string()),
        None => dotenvy::dotenv().map(|p| p.display().to_string()),
    };
    match res {
        Ok(loaded) => tracing::debug!("[Secret] loaded environment from {loaded}"),
        Err(err) => tracing::debug!("[Secret] no dotenv file loaded: {err}"),
    }
}

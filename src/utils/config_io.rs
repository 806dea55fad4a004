use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Environment prefix for overrides, e.g. `MQBRIDGE__POOL__MAX_ACTIVE=16`.
pub const ENV_PREFIX: &str = "MQBRIDGE";

/// Reads a config file (format picked from its extension) and applies
/// `MQBRIDGE__`-prefixed environment overrides on top.
pub fn load_cfg<T: for<'a> Deserialize<'a>>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    let cfg = Config::builder()
        .add_source(File::from(path))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to read config from {}", path.display()))?;

    cfg.try_deserialize()
        .with_context(|| format!("failed to deserialize config from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        threads: usize,
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "name = \"orders\"\nthreads = 4").unwrap();

        let sample: Sample = load_cfg(file.path()).unwrap();
        assert_eq!(sample.name, "orders");
        assert_eq!(sample.threads, 4);
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let err = load_cfg::<Sample>("/nonexistent/mqbridge.toml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/mqbridge.toml"));
    }
}

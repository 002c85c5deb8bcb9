use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

pub const API_KEY_NAME: &str = "OPENAI_API_KEY";

/// Key baked in at build time, if the build environment provided one.
pub const BUILD_TIME_API_KEY: Option<&str> = option_env!("NUMA_OPENAI_API_KEY");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    ConfigFile,
    BuildMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredential {
    pub key: String,
    pub source: CredentialSource,
}

/// Where to look for the vision API key, in priority order.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    pub env_var: String,
    pub config_path: Option<PathBuf>,
    pub build_time: Option<String>,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self {
            env_var: API_KEY_NAME.to_string(),
            config_path: None,
            build_time: BUILD_TIME_API_KEY.map(str::to_string),
        }
    }
}

impl CredentialResolver {
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Environment, then config file, then build metadata. Blank values are
    /// skipped. Re-read on every call.
    pub fn resolve(&self) -> Option<ApiCredential> {
        if let Some(key) = non_empty(env::var(&self.env_var).ok()) {
            log::debug!("vision API key found in ${}", self.env_var);
            return Some(ApiCredential {
                key,
                source: CredentialSource::Environment,
            });
        }

        if let Some(key) = self
            .config_path
            .as_deref()
            .and_then(|path| read_config_key(path, API_KEY_NAME))
        {
            log::debug!("vision API key found in config file");
            return Some(ApiCredential {
                key,
                source: CredentialSource::ConfigFile,
            });
        }

        if let Some(key) = non_empty(self.build_time.clone()) {
            log::debug!("vision API key found in build metadata");
            return Some(ApiCredential {
                key,
                source: CredentialSource::BuildMetadata,
            });
        }

        log::warn!(
            "no vision API key: set ${} or add {} to the config file",
            self.env_var,
            API_KEY_NAME
        );
        None
    }
}

fn read_config_key(path: &Path, key: &str) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw)
        .map_err(|err| log::warn!("ignoring malformed config {}: {err}", path.display()))
        .ok()?;
    non_empty(parsed.get(key).and_then(Value::as_str).map(str::to_string))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // Each test uses its own variable name so parallel tests do not race.
    fn resolver(env_var: &str) -> CredentialResolver {
        CredentialResolver {
            env_var: env_var.to_string(),
            config_path: None,
            build_time: None,
        }
    }

    #[test]
    fn environment_wins() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = temp.path().join("config.json");
        fs::write(&config, json!({"OPENAI_API_KEY": "from-file"}).to_string())?;
        env::set_var("NUMA_TEST_KEY_ENV_WINS", "  from-env ");

        let mut resolver = resolver("NUMA_TEST_KEY_ENV_WINS").with_config_path(&config);
        resolver.build_time = Some("from-build".to_string());
        let credential = resolver.resolve();
        env::remove_var("NUMA_TEST_KEY_ENV_WINS");

        assert_eq!(
            credential,
            Some(ApiCredential {
                key: "from-env".to_string(),
                source: CredentialSource::Environment,
            })
        );
        Ok(())
    }

    #[test]
    fn config_file_then_build_metadata() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = temp.path().join("config.json");
        fs::write(&config, json!({"OPENAI_API_KEY": "from-file"}).to_string())?;

        let mut resolver = resolver("NUMA_TEST_KEY_UNSET_A").with_config_path(&config);
        resolver.build_time = Some("from-build".to_string());
        assert_eq!(
            resolver.resolve().map(|c| c.source),
            Some(CredentialSource::ConfigFile)
        );

        fs::write(&config, json!({"OPENAI_API_KEY": "   "}).to_string())?;
        let credential = resolver.resolve();
        assert_eq!(credential.as_ref().map(|c| c.key.as_str()), Some("from-build"));
        assert_eq!(credential.map(|c| c.source), Some(CredentialSource::BuildMetadata));
        Ok(())
    }

    #[test]
    fn nothing_configured_is_none() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = temp.path().join("config.json");
        fs::write(&config, "not json")?;
        let resolver = resolver("NUMA_TEST_KEY_UNSET_B").with_config_path(config);
        assert_eq!(resolver.resolve(), None);
        Ok(())
    }
}

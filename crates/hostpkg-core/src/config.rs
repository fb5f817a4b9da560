use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::ShellPackageClient;
use crate::execution::{ShellExecutor, ShellTarget, TokioProcessExecutor};
use crate::models::{CoreError, CoreErrorKind, PackageManagerId};
use crate::persistence::{InMemoryStateStore, JsonFileStateStore, StateStore};
use crate::reconcile::{ManagedUnit, ReconciliationEngine};
use crate::sqlite::SqliteStateStore;

pub type ConfigResult<T> = Result<T, CoreError>;

const DEFAULT_SHELL: &str = "/bin/sh";
const DEFAULT_CONTAINER_RUNTIME: &str = "docker";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub manager: PackageManagerId,
    pub target: TargetConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TargetConfig {
    Local {
        #[serde(default = "default_shell")]
        shell: String,
    },
    Ssh {
        host: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity_file: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },
    Container {
        #[serde(default = "default_container_runtime")]
        runtime: String,
        container: String,
    },
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StateConfig {
    #[default]
    Memory,
    JsonDir {
        path: PathBuf,
    },
    Sqlite {
        path: PathBuf,
    },
}

fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}

fn default_container_runtime() -> String {
    DEFAULT_CONTAINER_RUNTIME.to_string()
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| invalid_config(format!("failed to parse engine config: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|error| {
            invalid_config(format!("failed to read {}: {error}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.command_timeout_secs == Some(0) {
            return Err(invalid_config("command_timeout_secs must be greater than zero"));
        }

        match &self.target {
            TargetConfig::Local { shell } => require_non_empty("target.shell", shell)?,
            TargetConfig::Ssh {
                host, user, options, ..
            } => {
                require_non_empty("target.host", host)?;
                if let Some(user) = user {
                    require_non_empty("target.user", user)?;
                }
                if options.iter().any(|option| option.trim().is_empty()) {
                    return Err(invalid_config("target.options must not contain empty entries"));
                }
            }
            TargetConfig::Container { runtime, container } => {
                require_non_empty("target.runtime", runtime)?;
                require_non_empty("target.container", container)?;
            }
        }

        match &self.state {
            StateConfig::Memory => Ok(()),
            StateConfig::JsonDir { path } | StateConfig::Sqlite { path } => {
                if path.as_os_str().is_empty() {
                    Err(invalid_config("state.path must not be empty"))
                } else {
                    Ok(())
                }
            }
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn shell_target(&self) -> ShellTarget {
        match &self.target {
            TargetConfig::Local { shell } => ShellTarget::Local {
                shell: shell.clone(),
            },
            TargetConfig::Ssh {
                host,
                user,
                port,
                identity_file,
                options,
            } => ShellTarget::Ssh {
                destination: match user {
                    Some(user) => format!("{user}@{host}"),
                    None => host.clone(),
                },
                port: *port,
                identity_file: identity_file.clone(),
                options: options.clone(),
            },
            TargetConfig::Container { runtime, container } => {
                ShellTarget::container(runtime.as_str(), container.as_str())
            }
        }
    }

    /// Opens the configured store. SQLite databases are migrated to the
    /// latest schema before use.
    pub fn open_store(&self) -> ConfigResult<Arc<dyn StateStore>> {
        match &self.state {
            StateConfig::Memory => Ok(Arc::new(InMemoryStateStore::new())),
            StateConfig::JsonDir { path } => Ok(Arc::new(JsonFileStateStore::new(path.clone()))),
            StateConfig::Sqlite { path } => {
                let store = SqliteStateStore::new(path.clone());
                store.migrate_to_latest()?;
                Ok(Arc::new(store))
            }
        }
    }

    pub fn build_engine(&self) -> ReconciliationEngine {
        let mut shell = ShellExecutor::new(Arc::new(TokioProcessExecutor), self.shell_target());
        if let Some(timeout) = self.command_timeout() {
            shell = shell.with_command_timeout(timeout);
        }
        let client = ShellPackageClient::new(Arc::new(shell), self.manager);
        ReconciliationEngine::new(Arc::new(client))
    }

    pub fn build_unit(&self, name: impl Into<String>) -> ConfigResult<ManagedUnit> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(invalid_config("unit name must not be empty"));
        }

        let store = self.open_store()?;
        tracing::debug!(
            unit = %name,
            manager = %self.manager,
            target = ?self.target,
            "building managed unit"
        );
        Ok(ManagedUnit::new(name, self.build_engine(), store))
    }
}

fn require_non_empty(field: &str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(invalid_config(format!("{field} must not be empty")));
    }
    Ok(())
}

fn invalid_config(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{EngineConfig, StateConfig, TargetConfig};
    use crate::execution::ShellTarget;
    use crate::models::{CoreErrorKind, PackageManagerId};

    #[test]
    fn parses_ssh_target_with_sqlite_state() {
        let config = EngineConfig::from_json_str(
            r#"{
                "manager": "snap",
                "target": {
                    "transport": "ssh",
                    "host": "build-01.internal",
                    "user": "deploy",
                    "port": 2222,
                    "options": ["StrictHostKeyChecking=accept-new"]
                },
                "command_timeout_secs": 600,
                "state": { "backend": "sqlite", "path": "/var/lib/hostpkg/state.db" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.manager, PackageManagerId::Snap);
        assert_eq!(
            config.state,
            StateConfig::Sqlite {
                path: PathBuf::from("/var/lib/hostpkg/state.db")
            }
        );
        assert_eq!(
            config.shell_target(),
            ShellTarget::Ssh {
                destination: "deploy@build-01.internal".to_string(),
                port: Some(2222),
                identity_file: None,
                options: vec!["StrictHostKeyChecking=accept-new".to_string()],
            }
        );
        assert_eq!(config.command_timeout().unwrap().as_secs(), 600);
    }

    #[test]
    fn local_target_and_state_fall_back_to_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{"manager": "flatpak", "target": {"transport": "local"}}"#,
        )
        .unwrap();

        assert_eq!(
            config.target,
            TargetConfig::Local {
                shell: "/bin/sh".to_string()
            }
        );
        assert_eq!(config.state, StateConfig::Memory);
        assert_eq!(config.command_timeout(), None);
    }

    #[test]
    fn container_runtime_defaults_to_docker() {
        let config = EngineConfig::from_json_str(
            r#"{"manager": "snap", "target": {"transport": "container", "container": "ci-runner"}}"#,
        )
        .unwrap();

        assert_eq!(config.shell_target(), ShellTarget::container("docker", "ci-runner"));
    }

    #[test]
    fn rejects_invalid_configuration() {
        let cases = [
            r#"{"manager": "apt", "target": {"transport": "local"}}"#,
            r#"{"manager": "snap", "target": {"transport": "ssh", "host": " "}}"#,
            r#"{"manager": "snap", "target": {"transport": "local"}, "command_timeout_secs": 0}"#,
            r#"{"manager": "snap", "target": {"transport": "local"}, "state": {"backend": "json_dir", "path": ""}}"#,
            r#"{"manager": "snap", "target": {"transport": "telnet"}}"#,
        ];

        for raw in cases {
            let error = EngineConfig::from_json_str(raw).unwrap_err();
            assert_eq!(error.kind, CoreErrorKind::InvalidInput, "{raw}");
        }
    }

    #[test]
    fn empty_unit_names_are_rejected() {
        let config = EngineConfig::from_json_str(
            r#"{"manager": "snap", "target": {"transport": "local"}}"#,
        )
        .unwrap();

        let error = config.build_unit("  ").err().unwrap();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
        assert_eq!(config.build_unit("tools").unwrap().name(), "tools");
    }
}

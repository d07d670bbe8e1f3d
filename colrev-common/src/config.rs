//! Environment configuration and environment directory resolution
//!
//! The environment directory holds state shared by every review on the
//! machine: the local index database and the cover/last page sidecars.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the environment directory
pub const ENV_DIR_VAR: &str = "COLREV_ENV_DIR";
pub const USER_NAME_VAR: &str = "COLREV_USER_NAME";
pub const USER_EMAIL_VAR: &str = "COLREV_USER_EMAIL";

/// Contents of `~/.config/colrev/config.toml`
///
/// Every key is optional; a missing or unreadable file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub env_dir: Option<PathBuf>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

impl TomlConfig {
    /// Load the user config file, falling back to defaults
    pub fn load() -> Self {
        match config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

/// `~/.config/colrev/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("colrev").join("config.toml"))
}

/// Environment directory resolution, in priority order:
/// 1. Command-line argument
/// 2. `COLREV_ENV_DIR`
/// 3. `env_dir` in the TOML config file
/// 4. OS-dependent default (`<data_local_dir>/colrev`)
pub fn resolve_env_dir(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ENV_DIR_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.env_dir {
        return path.clone();
    }

    default_env_dir()
}

fn default_env_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("colrev"))
        .unwrap_or_else(|| PathBuf::from("./colrev_env"))
}

/// Name and email used for commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub name: String,
    pub email: String,
}

impl UserIdentity {
    /// Identity of automated commits
    pub fn bot() -> Self {
        Self {
            name: "script: colrev".to_string(),
            email: "colrev@users.noreply.github.com".to_string(),
        }
    }

    /// Resolve the user identity
    ///
    /// Environment variables win over the TOML config, which wins over the
    /// git configuration visible from `repo_path`.
    pub fn resolve(toml_config: &TomlConfig, repo_path: Option<&Path>) -> Result<Self> {
        let git_config = repo_path
            .and_then(|p| git2::Repository::discover(p).ok())
            .and_then(|r| r.config().ok())
            .or_else(|| git2::Config::open_default().ok());
        let from_git = |key: &str| git_config.as_ref().and_then(|c| c.get_string(key).ok());

        let name = env_value(USER_NAME_VAR)
            .or_else(|| toml_config.user_name.clone())
            .or_else(|| from_git("user.name"));
        let email = env_value(USER_EMAIL_VAR)
            .or_else(|| toml_config.user_email.clone())
            .or_else(|| from_git("user.email"));

        match (name, email) {
            (Some(name), Some(email)) => Ok(Self { name, email }),
            _ => Err(Error::Config(format!(
                "User identity not configured (set {} and {}, or git user.name/user.email)",
                USER_NAME_VAR, USER_EMAIL_VAR
            ))),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Resolved environment: directory layout plus user identity
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub env_dir: PathBuf,
    pub user: UserIdentity,
}

impl EnvConfig {
    pub fn resolve(cli_env_dir: Option<&Path>, repo_path: Option<&Path>) -> Result<Self> {
        let toml_config = TomlConfig::load();
        let env_dir = resolve_env_dir(cli_env_dir, &toml_config);
        let user = UserIdentity::resolve(&toml_config, repo_path)?;
        Ok(Self { env_dir, user })
    }

    pub fn local_index_path(&self) -> PathBuf {
        self.env_dir.join("local_index.db")
    }

    pub fn coverpages_dir(&self) -> PathBuf {
        self.env_dir.join(".coverpages")
    }

    pub fn lastpages_dir(&self) -> PathBuf {
        self.env_dir.join(".lastpages")
    }

    /// Create the environment directory and sidecar folders if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.env_dir.clone(), self.coverpages_dir(), self.lastpages_dir()] {
            if !dir.exists() {
                tracing::info!(path = %dir.display(), "Creating environment directory");
                std::fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}

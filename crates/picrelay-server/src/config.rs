use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use picrelay_types::{RepositoryId, RepositoryList};
use picrelay_upload::{GitHubClientConfig, UploaderSettings, DEFAULT_API_BASE, DEFAULT_RAW_BASE};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// `api_base` value that selects the in-process content API instead of
/// GitHub. Objects then live only as long as the process.
pub const MEMORY_CONTENT_BACKEND: &str = "memory:";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// `postgres://…`, `sqlite:…` or `memory:`.
    pub database_url: String,
    pub github: GitHubConfig,
    /// Backing repositories in rotation order.
    pub repositories: Vec<RepositoryId>,
    pub unique_names: bool,
    /// Wipe the rotation counter and the upload log at startup.
    pub reset_on_start: bool,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            database_url: "sqlite://picrelay.db".into(),
            github: GitHubConfig::default(),
            repositories: Vec::new(),
            unique_names: true,
            reset_on_start: false,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base: String,
    pub raw_base: String,
    pub token: String,
    pub owner: String,
    pub branch: String,
    pub upload_dir: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        let client = GitHubClientConfig::default();
        let uploader = UploaderSettings::default();
        Self {
            api_base: DEFAULT_API_BASE.into(),
            raw_base: DEFAULT_RAW_BASE.into(),
            token: String::new(),
            owner: String::new(),
            branch: uploader.branch,
            upload_dir: uploader.upload_dir,
            timeout_secs: client.timeout.as_secs(),
            user_agent: client.user_agent,
        }
    }
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_base", &self.api_base)
            .field("raw_base", &self.raw_base)
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("owner", &self.owner)
            .field("branch", &self.branch)
            .field("upload_dir", &self.upload_dir)
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl GitHubConfig {
    pub fn uses_memory_backend(&self) -> bool {
        self.api_base == MEMORY_CONTENT_BACKEND
    }

    pub fn client_config(&self) -> GitHubClientConfig {
        GitHubClientConfig {
            api_base: self.api_base.clone(),
            token: self.token.clone(),
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl ServerConfig {
    /// Defaults, overlaid with `path` if given, overlaid with the process
    /// environment.
    pub fn load(path: Option<&Path>) -> ServerResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
    }

    /// Override fields from environment variables looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> ServerResult<()> {
        if let Some(token) = var("GITHUB_TOKEN") {
            self.github.token = token;
        }
        if let Some(owner) = var("PICRELAY_OWNER") {
            self.github.owner = owner;
        }
        if let Some(raw) = var("PICRELAY_REPOSITORIES") {
            let list = RepositoryList::parse_csv(&raw)
                .map_err(|e| ServerError::Config(format!("PICRELAY_REPOSITORIES: {e}")))?;
            self.repositories = list.into();
        }
        if let Some(branch) = var("PICRELAY_BRANCH") {
            self.github.branch = branch;
        }
        if let Some(dir) = var("PICRELAY_UPLOAD_DIR") {
            self.github.upload_dir = dir;
        }
        if let Some(url) = var("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(raw) = var("PICRELAY_BIND") {
            self.bind_addr = raw
                .parse()
                .map_err(|e| ServerError::Config(format!("PICRELAY_BIND {raw:?}: {e}")))?;
        }
        if let Some(raw) = var("PICRELAY_RESET_ON_START") {
            self.reset_on_start = parse_flag("PICRELAY_RESET_ON_START", &raw)?;
        }
        if let Some(raw) = var("PICRELAY_UNIQUE_NAMES") {
            self.unique_names = parse_flag("PICRELAY_UNIQUE_NAMES", &raw)?;
        }
        if let Some(raw) = var("PICRELAY_HTTP_TIMEOUT_SECS") {
            self.github.timeout_secs = raw
                .parse()
                .map_err(|e| ServerError::Config(format!("PICRELAY_HTTP_TIMEOUT_SECS {raw:?}: {e}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> ServerResult<()> {
        self.repository_list()?;
        if self.github.owner.trim().is_empty() {
            return Err(ServerError::Config(
                "repository owner is not set (github.owner or PICRELAY_OWNER)".into(),
            ));
        }
        if self.github.token.is_empty() && !self.github.uses_memory_backend() {
            return Err(ServerError::Config("GitHub token is not set (github.token or GITHUB_TOKEN)".into()));
        }
        if self.github.timeout_secs == 0 {
            return Err(ServerError::Config("github.timeout_secs must be positive".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(ServerError::Config("max_upload_bytes must be positive".into()));
        }
        Ok(())
    }

    pub fn repository_list(&self) -> ServerResult<RepositoryList> {
        RepositoryList::new(self.repositories.clone())
            .map_err(|e| ServerError::Config(format!("repositories: {e}")))
    }

    pub fn uploader_settings(&self) -> UploaderSettings {
        UploaderSettings {
            owner: self.github.owner.clone(),
            branch: self.github.branch.clone(),
            upload_dir: self.github.upload_dir.clone(),
            raw_base: self.github.raw_base.clone(),
            unique_names: self.unique_names,
        }
    }
}

fn parse_flag(key: &str, raw: &str) -> ServerResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ServerError::Config(format!("{key}: expected a boolean, got {raw:?}"))),
    }
}

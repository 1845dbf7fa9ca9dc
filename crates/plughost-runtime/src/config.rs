//! Hierarchical configuration lookup.
//!
//! Keys are slash paths such as `middleware/api/base_url` or
//! `plugin/<name>/events/<resource>/<event>`; each resolves to a scalar string
//! or nothing. The TOML source merges the installation's `etc/local.toml`
//! over the plugin's own `etc/config.toml` and looks keys up under `default`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use toml::{Table, Value};

use crate::error::HostError;

// ─── Well-known keys ────────────────────────────────────────────────────

pub const API_BASE_URL: &str = "middleware/api/base_url";
pub const API_LOGIN: &str = "middleware/api/login";
pub const API_PASSWORD: &str = "middleware/api/password";
pub const API_SECRET_KEY: &str = "middleware/api/secret_key";
pub const PUBSUB_ACTIVE: &str = "middleware/pubsub/active";
pub const PUBSUB_SERVER: &str = "middleware/pubsub/server";
pub const PUBSUB_COMMAND: &str = "middleware/pubsub/command";
pub const PUBSUB_TIMEOUT: &str = "middleware/pubsub/timeout";
pub const SYSTEM_LOG: &str = "middleware/system/log";
pub const CACHE_BACKEND: &str = "middleware/cache/backend";
pub const CACHE_SERVER: &str = "middleware/cache/server";

/// Loose truthiness used for feature flags: present, non-empty, not `0`/`false`.
pub fn is_truthy(value: &str) -> bool {
    let v = value.trim();
    !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
}

/// Configuration lookup collaborator.
pub trait ConfigSource: Send + Sync {
    fn get(&self, path: &str) -> Option<String>;

    fn is_enabled(&self, path: &str) -> bool {
        self.get(path).is_some_and(|v| is_truthy(&v))
    }
}

// ─── Installation layout ────────────────────────────────────────────────

/// Filesystem layout of a plughost installation.
#[derive(Debug, Clone)]
pub struct HostPaths {
    root: PathBuf,
}

impl HostPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `PLUGHOST_ROOT`, defaulting to the working directory.
    pub fn from_env() -> Self {
        Self::new(std::env::var("PLUGHOST_ROOT").unwrap_or_else(|_| ".".to_string()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plugin_dir(&self, plugin: &str) -> PathBuf {
        self.root.join("plugins").join(plugin)
    }

    pub fn plugin_config_file(&self, plugin: &str) -> PathBuf {
        self.plugin_dir(plugin).join("etc").join("config.toml")
    }

    pub fn local_config_file(&self) -> PathBuf {
        self.root.join("etc").join("local.toml")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }
}

// ─── TOML source ────────────────────────────────────────────────────────

/// Merged plugin + local configuration tree.
#[derive(Debug, Clone, Default)]
pub struct TomlConfig {
    tree: Table,
}

impl TomlConfig {
    /// Load `<plugin>/etc/config.toml` and merge `etc/local.toml` over it.
    /// Both files are required.
    pub fn load(paths: &HostPaths, plugin: &str) -> Result<Self, HostError> {
        let plugin_toml = read_config_file(&paths.plugin_config_file(plugin))?;
        let local_toml = read_config_file(&paths.local_config_file())?;
        Self::from_sources(&plugin_toml, &local_toml)
    }

    /// Merge two TOML documents, the second one winning.
    pub fn from_sources(plugin_toml: &str, local_toml: &str) -> Result<Self, HostError> {
        let mut tree: Table = plugin_toml.parse()?;
        let local: Table = local_toml.parse()?;
        merge_tables(&mut tree, local);
        Ok(Self { tree })
    }
}

impl ConfigSource for TomlConfig {
    fn get(&self, path: &str) -> Option<String> {
        if path.trim().is_empty() {
            return None;
        }
        let mut node = self.tree.get("default")?;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = node.as_table()?.get(segment)?;
        }
        render_scalar(node)
    }
}

fn read_config_file(path: &Path) -> Result<String, HostError> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(HostError::Configuration(
            format!("The configuration file \"{}\" does not exist.", path.display()),
        )),
        Err(e) => Err(HostError::Configuration(format!(
            "The configuration file \"{}\" is not readable: {e}",
            path.display()
        ))),
    }
}

/// Recursive merge: tables merge key by key, anything else is replaced.
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(true) => Some("1".to_string()),
        Value::Boolean(false) => Some(String::new()),
        Value::Datetime(d) => Some(d.to_string()),
        Value::Array(_) | Value::Table(_) => None,
    }
}

// ─── In-memory source ───────────────────────────────────────────────────

/// Flat path → value map, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, value: &str) -> Self {
        self.set(path, value);
        self
    }

    pub fn set(&mut self, path: &str, value: &str) {
        self.values.insert(path.trim_matches('/').to_string(), value.to_string());
    }
}

impl ConfigSource for MapConfig {
    fn get(&self, path: &str) -> Option<String> {
        self.values.get(path.trim_matches('/')).cloned()
    }
}

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::P4Error;

/// Default cap on captured output per invocation. Tagged listings of large
/// depots get big, but anything past this is a runaway.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024 * 1024;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for the `p4` tool.
pub struct Config {
    /// `P4PORT`, e.g. `ssl:perforce.example.com:1666`.
    pub port: Option<String>,
    pub user: Option<String>,
    pub client: Option<String>,
    pub charset: Option<String>,
    /// Piped to `p4 login -p`. Only ever read from the environment.
    pub password: Option<SecretString>,
    pub executable: String,
    /// Global options placed before every command (e.g. `["-C", "utf8"]`).
    pub global_args: Vec<String>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: None,
            user: None,
            client: None,
            charset: None,
            password: None,
            executable: "p4".to_string(),
            global_args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("user", &self.user)
            .field("client", &self.client)
            .field("charset", &self.charset)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("executable", &self.executable)
            .field("global_args", &self.global_args)
            .field("timeout", &self.timeout)
            .field("max_output_bytes", &self.max_output_bytes)
            .finish()
    }
}

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    port: Option<String>,
    user: Option<String>,
    client: Option<String>,
    charset: Option<String>,
    executable: Option<String>,
    global_args: Option<Vec<String>>,
    timeout_secs: Option<u64>,
    max_output_bytes: Option<usize>,
}

impl Config {
    /// Defaults, then the config file, then `P4*` environment variables.
    pub fn load() -> Result<Self, P4Error> {
        let path = env::var_os("P4TAG_CONFIG")
            .map(PathBuf::from)
            .or_else(default_config_path);
        Self::load_from(path.as_deref())
    }

    /// Like [`Config::load`] with an explicit file. A missing file is not an
    /// error; a malformed one is.
    pub fn load_from(path: Option<&Path>) -> Result<Self, P4Error> {
        let mut config = Config::default();

        if let Some(path) = path {
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    config.apply_toml(&text)?;
                    tracing::debug!(path = %path.display(), "loaded config file");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "no config file");
                }
                Err(e) => {
                    return Err(P4Error::Config(format!(
                        "failed to read {}: {e}",
                        path.display()
                    )));
                }
            }
        }

        config.apply_env(|key| env::var(key).ok())?;

        if config.port.is_none() {
            tracing::warn!("P4PORT not set, p4 will use its own default");
        }

        Ok(config)
    }

    fn apply_toml(&mut self, text: &str) -> Result<(), P4Error> {
        let file: FileConfig =
            toml::from_str(text).map_err(|e| P4Error::Config(format!("invalid config: {e}")))?;

        if file.port.is_some() {
            self.port = file.port;
        }
        if file.user.is_some() {
            self.user = file.user;
        }
        if file.client.is_some() {
            self.client = file.client;
        }
        if file.charset.is_some() {
            self.charset = file.charset;
        }
        if let Some(executable) = file.executable {
            self.executable = executable;
        }
        if let Some(args) = file.global_args {
            self.global_args = args;
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = file.max_output_bytes {
            self.max_output_bytes = limit;
        }
        Ok(())
    }

    /// Overlay environment variables. `lookup` abstracts `std::env::var` so
    /// tests don't have to mutate the process environment.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), P4Error> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(port) = non_empty("P4PORT") {
            self.port = Some(port);
        }
        if let Some(user) = non_empty("P4USER") {
            self.user = Some(user);
        }
        if let Some(client) = non_empty("P4CLIENT") {
            self.client = Some(client);
        }
        if let Some(charset) = non_empty("P4CHARSET") {
            self.charset = Some(charset);
        }
        if let Some(password) = non_empty("P4PASSWD") {
            self.password = Some(SecretString::from(password));
        }
        if let Some(executable) = non_empty("P4TAG_EXECUTABLE") {
            self.executable = executable;
        }
        if let Some(secs) = non_empty("P4TAG_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                P4Error::Config(format!("P4TAG_TIMEOUT_SECS is not a number: {secs}"))
            })?;
            self.timeout = Duration::from_secs(secs);
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/p4tag/config.toml"))
}

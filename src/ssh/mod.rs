pub mod session;
pub mod sftp;
pub mod transfer;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::permissions::UploadMode;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 20_000;

/// Connection configuration for one deploy target.
///
/// Built once per connection attempt, never mutated afterwards. Optional
/// string fields set to an empty string are treated as absent.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Remote host; blank falls back to `127.0.0.1`.
    pub host: String,
    /// Remote port; absent falls back to 22.
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Private key file, read locally before connecting.
    pub private_key_path: Option<PathBuf>,
    pub passphrase: Option<String>,
    /// Local ssh-agent socket to try for public-key auth.
    pub agent: Option<PathBuf>,
    /// Request agent forwarding on the session channel.
    pub agent_forward: bool,
    /// Digest algorithm for host-key verification.
    pub host_hash: HashAlgorithm,
    /// Accepted host-key digests; empty accepts any host key.
    pub host_fingerprints: Vec<String>,
    /// Handshake timeout in milliseconds; absent falls back to 20000.
    pub ready_timeout_ms: Option<u64>,
    /// Retry authentication via keyboard-interactive using the password.
    pub try_keyboard: bool,
    /// Log connection progress at debug level.
    pub debug: bool,
    /// Permission specification applied to uploaded files.
    pub upload_mode: Option<UploadMode>,
}

/// Digest algorithm used for host-key fingerprints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Md5
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: None,
            username: None,
            password: None,
            private_key_path: None,
            passphrase: None,
            agent: None,
            agent_forward: false,
            host_hash: HashAlgorithm::Md5,
            host_fingerprints: Vec::new(),
            ready_timeout_ms: None,
            try_keyboard: false,
            debug: false,
            upload_mode: None,
        }
    }
}

impl ConnectionOptions {
    pub fn effective_host(&self) -> &str {
        if self.host.is_empty() {
            DEFAULT_HOST
        } else {
            &self.host
        }
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms.unwrap_or(DEFAULT_READY_TIMEOUT_MS))
    }

    pub(crate) fn effective_username(&self) -> &str {
        non_empty(&self.username).unwrap_or("")
    }

    pub(crate) fn effective_password(&self) -> Option<&str> {
        non_empty(&self.password)
    }

    pub(crate) fn key_path(&self) -> Option<&Path> {
        non_empty_path(&self.private_key_path)
    }

    pub(crate) fn effective_passphrase(&self) -> Option<&str> {
        non_empty(&self.passphrase)
    }

    pub(crate) fn agent_socket(&self) -> Option<&Path> {
        non_empty_path(&self.agent)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn non_empty_path(value: &Option<PathBuf>) -> Option<&Path> {
    value.as_deref().filter(|p| !p.as_os_str().is_empty())
}

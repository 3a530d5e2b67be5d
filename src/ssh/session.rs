//! Connection lifecycle for deploy sessions.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use md5::Md5;
use russh::client::{self, AuthResult, KeyboardInteractiveAuthResponse};
use russh::keys::ssh_key;
use russh::keys::{decode_secret_key, PrivateKey, PrivateKeyWithHashAlg};
use russh_sftp::client::SftpSession;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

#[cfg(unix)]
use russh::keys::agent::client::AgentClient;

use crate::error::FerryError;
use crate::ssh::sftp::{SftpTransport, Transport};
use crate::ssh::{ConnectionOptions, HashAlgorithm};

/// Upper bound on keyboard-interactive prompt rounds answered per connect.
const MAX_INTERACTIVE_ROUNDS: usize = 3;

/// One authenticated deploy session.
///
/// Holds the live transport, the options it was built from, and the cache of
/// remote directories already confirmed to exist. Operations on a session
/// are meant to run one at a time; on-demand downloads produced by listings
/// open their own sessions instead of sharing this one.
pub struct Session {
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) options: Arc<ConnectionOptions>,
    pub(crate) verified_dirs: HashSet<String>,
    pub(crate) factory: Arc<dyn SessionFactory>,
}

/// Produces a fresh session from stored options, one per on-demand download.
#[async_trait]
pub(crate) trait SessionFactory: Send + Sync {
    async fn open_session(&self) -> Result<Session, FerryError>;
}

struct ReconnectFactory {
    options: Arc<ConnectionOptions>,
}

#[async_trait]
impl SessionFactory for ReconnectFactory {
    async fn open_session(&self) -> Result<Session, FerryError> {
        Session::connect(self.options.as_ref().clone()).await
    }
}

/// Transport handler: verifies the server's host key against the configured
/// fingerprint list.
pub(crate) struct ClientHandler {
    options: Arc<ConnectionOptions>,
}

impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let blob = server_public_key.to_bytes()?;
        let digest = host_key_digest(self.options.host_hash, &blob);
        let accepted = fingerprint_accepted(&self.options.host_fingerprints, &digest);
        if accepted {
            log::debug!(
                "server key accepted ({:?} digest {digest})",
                self.options.host_hash
            );
        } else {
            log::warn!(
                "server key {:?} digest {digest} is not in the accepted fingerprint list",
                self.options.host_hash
            );
        }
        Ok(accepted)
    }
}

impl Session {
    /// Open and authenticate a session to the configured host.
    ///
    /// Applies the documented defaults, reads the private key (if any)
    /// before touching the network, and tries authentication methods in
    /// order: private key, ssh-agent identities, password, then
    /// keyboard-interactive when enabled. The handshake and authentication
    /// run under the configured ready timeout.
    pub async fn connect(options: ConnectionOptions) -> Result<Session, FerryError> {
        let options = Arc::new(options);
        let host = options.effective_host().to_string();
        let port = options.effective_port();

        let key = match options.key_path() {
            Some(path) => Some(read_private_key(path, options.effective_passphrase())?),
            None => None,
        };

        if options.debug {
            log::debug!(
                "connecting to {host}:{port} as {:?}",
                options.effective_username()
            );
        }

        let config = Arc::new(client::Config::default());
        let handler = ClientHandler {
            options: options.clone(),
        };

        let timeout = options.ready_timeout();
        let handshake = async {
            let mut handle = client::connect(config, (host.as_str(), port), handler)
                .await
                .map_err(|e| connect_error(e, &host, port))?;
            authenticate(&mut handle, &options, key).await?;
            Ok::<_, FerryError>(handle)
        };
        let handle = tokio::time::timeout(timeout, handshake).await.map_err(|_| {
            FerryError::Connection(format!(
                "connection to {host}:{port} timed out after {}ms",
                timeout.as_millis()
            ))
        })??;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| FerryError::Connection(format!("cannot open session channel: {e}")))?;
        if options.agent_forward {
            if let Err(e) = channel.agent_forward(false).await {
                log::warn!("agent forwarding request failed: {e}");
            }
        }
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| FerryError::Connection(format!("cannot start sftp subsystem: {e}")))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| FerryError::Connection(format!("sftp handshake failed: {e}")))?;

        log::info!("connected to {host}:{port}");

        Ok(Session {
            transport: Box::new(SftpTransport::new(handle, sftp)),
            factory: Arc::new(ReconnectFactory {
                options: options.clone(),
            }),
            options,
            verified_dirs: HashSet::new(),
        })
    }

    /// Close the session. Teardown failures are logged, never returned.
    pub async fn close(self) {
        if let Err(err) = self.transport.close().await {
            log::warn!("error closing session: {err}");
        }
    }

    /// Options this session was created from.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    #[cfg(test)]
    pub(crate) fn with_transport(
        transport: Box<dyn Transport>,
        options: Arc<ConnectionOptions>,
        factory: Arc<dyn SessionFactory>,
    ) -> Session {
        Session {
            transport,
            options,
            verified_dirs: HashSet::new(),
            factory,
        }
    }
}

/// Read and decode the private key before any network activity.
fn read_private_key(path: &Path, passphrase: Option<&str>) -> Result<PrivateKey, FerryError> {
    let material = std::fs::read_to_string(path).map_err(|source| FerryError::KeyRead {
        path: path.to_path_buf(),
        source,
    })?;
    decode_secret_key(&material, passphrase).map_err(|e| {
        FerryError::Connection(format!("cannot decode private key {}: {e}", path.display()))
    })
}

/// Map a handshake failure, keeping host-key rejection distinguishable.
fn connect_error(err: anyhow::Error, host: &str, port: u16) -> FerryError {
    match err.downcast_ref::<russh::Error>() {
        Some(russh::Error::UnknownKey) => FerryError::Connection(format!(
            "host key verification failed for {host}:{port}"
        )),
        _ => FerryError::Connection(format!("ssh handshake with {host}:{port} failed: {err}")),
    }
}

/// Try the configured authentication methods in order; first success wins.
async fn authenticate(
    handle: &mut client::Handle<ClientHandler>,
    options: &ConnectionOptions,
    key: Option<PrivateKey>,
) -> Result<(), FerryError> {
    let user = options.effective_username().to_string();

    if let Some(key) = key {
        let pk = PrivateKeyWithHashAlg::new(Arc::new(key), None);
        match handle.authenticate_publickey(&user, pk).await {
            Ok(AuthResult::Success) => return Ok(()),
            Ok(AuthResult::Failure { .. }) => log::debug!("private key rejected for {user}"),
            Err(e) => {
                return Err(FerryError::Connection(format!("publickey auth failed: {e}")))
            }
        }
    }

    #[cfg(unix)]
    if let Some(socket) = options.agent_socket() {
        if authenticate_agent(handle, &user, socket).await {
            return Ok(());
        }
    }

    if let Some(password) = options.effective_password() {
        match handle.authenticate_password(&user, password).await {
            Ok(AuthResult::Success) => return Ok(()),
            Ok(AuthResult::Failure { .. }) => log::debug!("password auth rejected for {user}"),
            Err(e) => {
                return Err(FerryError::Connection(format!("password auth failed: {e}")))
            }
        }

        if options.try_keyboard && authenticate_interactive(handle, &user, password).await {
            return Ok(());
        }
    }

    Err(FerryError::Connection(format!(
        "authentication failed for {user:?}: no configured method succeeded"
    )))
}

/// Offer every ssh-agent identity in turn. Agent trouble never aborts the
/// cascade; it is logged and the next method gets its chance.
#[cfg(unix)]
async fn authenticate_agent(
    handle: &mut client::Handle<ClientHandler>,
    user: &str,
    socket: &Path,
) -> bool {
    let mut agent = match AgentClient::connect_uds(socket).await {
        Ok(agent) => agent,
        Err(e) => {
            log::warn!("cannot reach ssh-agent at {}: {e}", socket.display());
            return false;
        }
    };
    let identities = match agent.request_identities().await {
        Ok(identities) => identities,
        Err(e) => {
            log::warn!("ssh-agent identity listing failed: {e}");
            return false;
        }
    };
    for key in identities {
        match handle
            .authenticate_publickey_with(user, key, None, &mut agent)
            .await
        {
            Ok(AuthResult::Success) => return true,
            Ok(AuthResult::Failure { .. }) => {}
            Err(e) => log::debug!("agent identity rejected: {e}"),
        }
    }
    false
}

/// Keyboard-interactive fallback: answer every info request with the
/// configured password as the sole response, whatever the prompts ask.
/// Failures in the exchange are logged, never raised.
async fn authenticate_interactive(
    handle: &mut client::Handle<ClientHandler>,
    user: &str,
    password: &str,
) -> bool {
    let mut response = match handle
        .authenticate_keyboard_interactive_start(user, None::<String>)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            log::warn!("keyboard-interactive start failed: {e}");
            return false;
        }
    };

    let mut rounds = 0;
    loop {
        match response {
            KeyboardInteractiveAuthResponse::Success => return true,
            KeyboardInteractiveAuthResponse::InfoRequest { .. } => {
                if rounds == MAX_INTERACTIVE_ROUNDS {
                    log::debug!("keyboard-interactive gave up after {rounds} rounds");
                    return false;
                }
                rounds += 1;
                response = match handle
                    .authenticate_keyboard_interactive_respond(vec![password.to_string()])
                    .await
                {
                    Ok(response) => response,
                    Err(e) => {
                        log::warn!("keyboard-interactive response failed: {e}");
                        return false;
                    }
                };
            }
            other => {
                log::debug!("keyboard-interactive rejected: {other:?}");
                return false;
            }
        }
    }
}

/// Host-key acceptance rule: an empty accepted list trusts any key,
/// otherwise the computed digest must appear in the list.
fn fingerprint_accepted(accepted: &[String], digest: &str) -> bool {
    accepted.is_empty() || accepted.iter().any(|f| normalize_fingerprint(f) == digest)
}

/// Accepted fingerprints may use colon separators and uppercase; computed
/// digests are plain lowercase hex.
fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| *c != ':')
        .collect::<String>()
        .to_lowercase()
}

/// Lowercase hex digest of a host-key blob under the configured algorithm.
fn host_key_digest(algorithm: HashAlgorithm, blob: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Md5 => hex_string(&Md5::digest(blob)),
        HashAlgorithm::Sha1 => hex_string(&Sha1::digest(blob)),
        HashAlgorithm::Sha256 => hex_string(&Sha256::digest(blob)),
        HashAlgorithm::Sha512 => hex_string(&Sha512::digest(blob)),
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

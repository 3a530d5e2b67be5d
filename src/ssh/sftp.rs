//! SFTP transport binding.
//!
//! The operation layer talks to the remote side through the [`Transport`]
//! trait; [`SftpTransport`] binds it to a live russh SFTP subsystem channel.
//! Keeping the trait in between lets the transfer logic run against an
//! in-memory transport in tests.

use std::pin::Pin;

use async_trait::async_trait;
use russh::client;
use russh::Disconnect;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::AsyncRead;

use crate::ssh::session::ClientHandler;

/// Node kind reported by the remote side for one directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Directory,
    File,
    Other,
}

/// One raw directory entry as reported by the transport.
#[derive(Clone, Debug)]
pub(crate) struct RawEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<u64>,
}

/// Remote file operations available on an established session.
#[async_trait]
pub(crate) trait Transport: Send + Sync {
    async fn list_dir(&self, path: &str) -> Result<Vec<RawEntry>, anyhow::Error>;
    async fn open_read(&self, path: &str)
        -> Result<Pin<Box<dyn AsyncRead + Send>>, anyhow::Error>;
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), anyhow::Error>;
    async fn remove_file(&self, path: &str) -> Result<(), anyhow::Error>;
    async fn create_dir(&self, path: &str) -> Result<(), anyhow::Error>;
    async fn set_mode(&self, path: &str, mode: u32) -> Result<(), anyhow::Error>;
    async fn close(&self) -> Result<(), anyhow::Error>;
}

/// Production transport over a russh SFTP subsystem channel.
pub(crate) struct SftpTransport {
    handle: client::Handle<ClientHandler>,
    sftp: SftpSession,
}

impl SftpTransport {
    pub(crate) fn new(handle: client::Handle<ClientHandler>, sftp: SftpSession) -> Self {
        Self { handle, sftp }
    }
}

#[async_trait]
impl Transport for SftpTransport {
    async fn list_dir(&self, path: &str) -> Result<Vec<RawEntry>, anyhow::Error> {
        let dir = self.sftp.read_dir(path).await?;
        let mut entries = Vec::new();

        for entry in dir {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let file_type = entry.file_type();
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            let metadata = entry.metadata();

            entries.push(RawEntry {
                name,
                kind,
                size: metadata.size.unwrap_or(0),
                modified: metadata.mtime.map(|v| v as u64),
            });
        }

        Ok(entries)
    }

    async fn open_read(
        &self,
        path: &str,
    ) -> Result<Pin<Box<dyn AsyncRead + Send>>, anyhow::Error> {
        let file = self.sftp.open(path).await?;
        Ok(Box::pin(file))
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), anyhow::Error> {
        self.sftp.write(path, data).await?;
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), anyhow::Error> {
        self.sftp.remove_file(path).await?;
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<(), anyhow::Error> {
        self.sftp.create_dir(path).await?;
        Ok(())
    }

    async fn set_mode(&self, path: &str, mode: u32) -> Result<(), anyhow::Error> {
        let attrs = FileAttributes {
            permissions: Some(mode),
            ..Default::default()
        };
        self.sftp.set_metadata(path, attrs).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), anyhow::Error> {
        self.handle
            .disconnect(Disconnect::ByApplication, "deploy session closed", "en")
            .await?;
        Ok(())
    }
}

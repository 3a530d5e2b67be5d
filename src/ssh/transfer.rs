//! Remote listing, transfer, and delete operations.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::FerryError;
use crate::path::{remote_parent, to_remote_path};
use crate::ssh::session::{Session, SessionFactory};
use crate::ssh::sftp::EntryKind;
use crate::staging::with_temp_file;

const DOWNLOAD_CHUNK_SIZE: usize = 32 * 1024;

/// Fields shared by every listed entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub name: String,
    pub parent: String,
    pub size: u64,
    pub modified: Option<u64>,
}

/// One classified directory entry.
#[derive(Clone, Debug)]
pub enum RemoteEntry {
    Directory(EntryInfo),
    File(RemoteFile),
    Other(EntryInfo),
}

impl RemoteEntry {
    pub fn info(&self) -> &EntryInfo {
        match self {
            RemoteEntry::Directory(info) | RemoteEntry::Other(info) => info,
            RemoteEntry::File(file) => &file.info,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, RemoteEntry::Directory(_))
    }
}

/// A listed regular file, downloadable on demand.
#[derive(Clone)]
pub struct RemoteFile {
    pub info: EntryInfo,
    path: String,
    factory: Arc<dyn SessionFactory>,
}

impl fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFile")
            .field("info", &self.info)
            .field("path", &self.path)
            .finish()
    }
}

impl RemoteFile {
    /// Full remote path this entry downloads from.
    pub fn remote_path(&self) -> &str {
        &self.path
    }

    /// Download this file over a session of its own.
    ///
    /// Opens a fresh session from the original connection options, fetches
    /// the bytes, and always closes that session again, even when the fetch
    /// failed; the fetch's own error is what the caller sees.
    pub async fn download(&self) -> Result<Vec<u8>, FerryError> {
        let session = self.factory.open_session().await?;
        let result = session.download(&self.path).await;
        session.close().await;
        result
    }
}

impl Session {
    /// List a remote directory as classified entries, directories first.
    pub async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, FerryError> {
        let dir = to_remote_path(path);
        let raw = self
            .transport
            .list_dir(&dir)
            .await
            .map_err(|e| FerryError::List {
                path: dir.clone(),
                reason: e.to_string(),
            })?;

        let mut entries = Vec::new();
        for entry in raw {
            let full_path = format!("{}/{}", dir.trim_end_matches('/'), entry.name);
            let info = EntryInfo {
                name: entry.name,
                parent: dir.clone(),
                size: entry.size,
                modified: entry.modified,
            };
            entries.push(match entry.kind {
                EntryKind::Directory => RemoteEntry::Directory(info),
                EntryKind::File => RemoteEntry::File(RemoteFile {
                    info,
                    path: full_path,
                    factory: self.factory.clone(),
                }),
                EntryKind::Other => RemoteEntry::Other(info),
            });
        }

        // Sort: directories first, then files, alphabetically
        entries.sort_by(|a, b| {
            b.is_dir().cmp(&a.is_dir()).then_with(|| {
                a.info()
                    .name
                    .to_lowercase()
                    .cmp(&b.info().name.to_lowercase())
            })
        });

        Ok(entries)
    }

    /// Upload `data` to the remote path, creating the parent directory when
    /// needed and applying the configured permission rule.
    ///
    /// The write replaces any existing file. Setting the permission bits is
    /// best-effort: a chmod failure is logged and the upload still counts
    /// as successful.
    pub async fn upload(&mut self, path: &str, data: &[u8]) -> Result<(), FerryError> {
        let remote_path = to_remote_path(path);
        let parent = remote_parent(&remote_path);

        let mode = match &self.options.upload_mode {
            Some(spec) => spec.resolve(&remote_path)?,
            None => None,
        };

        self.ensure_remote_dir(&parent).await?;

        self.transport
            .write_file(&remote_path, data)
            .await
            .map_err(|e| FerryError::Upload {
                path: remote_path.clone(),
                reason: e.to_string(),
            })?;

        match mode {
            Some(mode) => {
                if let Err(e) = self.transport.set_mode(&remote_path, mode).await {
                    log::warn!("cannot set mode {mode:o} on {remote_path}: {e}");
                }
            }
            None => {
                if self.options.upload_mode.is_some() {
                    log::debug!("no permission rule matched {remote_path}");
                }
            }
        }

        log::info!("uploaded {} bytes to {remote_path}", data.len());
        Ok(())
    }

    /// Download a remote file into memory.
    ///
    /// The stream is staged through a local temporary file and read back
    /// afterwards, so the live stream and the full in-memory result never
    /// coexist. The staging file is removed on every exit path.
    pub async fn download(&self, path: &str) -> Result<Vec<u8>, FerryError> {
        let remote_path = to_remote_path(path);
        let mut stream = self
            .transport
            .open_read(&remote_path)
            .await
            .map_err(|e| FerryError::Download {
                path: remote_path.clone(),
                reason: e.to_string(),
            })?;

        let stream_path = remote_path.clone();
        let data = with_temp_file(|staging_path| async move {
            let mut staged = tokio::fs::File::create(&staging_path).await?;
            let mut buf = vec![0u8; DOWNLOAD_CHUNK_SIZE];
            loop {
                let n = stream
                    .read(&mut buf)
                    .await
                    .map_err(|e| FerryError::Download {
                        path: stream_path.clone(),
                        reason: e.to_string(),
                    })?;
                if n == 0 {
                    break;
                }
                staged.write_all(&buf[..n]).await?;
            }
            staged.flush().await?;
            drop(staged);
            Ok::<_, FerryError>(tokio::fs::read(&staging_path).await?)
        })
        .await?;

        log::info!("downloaded {} bytes from {remote_path}", data.len());
        Ok(data)
    }

    /// Delete a remote file. Failure detail is logged, never returned.
    pub async fn delete(&self, path: &str) -> bool {
        let remote_path = to_remote_path(path);
        match self.transport.remove_file(&remote_path).await {
            Ok(()) => {
                log::info!("deleted {remote_path}");
                true
            }
            Err(e) => {
                log::debug!("delete of {remote_path} failed: {e}");
                false
            }
        }
    }

    /// Confirm the directory exists, creating it and any missing ancestors
    /// when it does not. Confirmed directories are cached for the life of
    /// the session so sibling uploads skip the existence round-trip.
    async fn ensure_remote_dir(&mut self, dir: &str) -> Result<(), FerryError> {
        if self.verified_dirs.contains(dir) {
            return Ok(());
        }

        if self.transport.list_dir(dir).await.is_err() {
            self.create_remote_dir(dir).await?;
        }
        self.verified_dirs.insert(dir.to_string());
        Ok(())
    }

    /// Create every missing component of `dir`, tolerating components that
    /// already exist.
    async fn create_remote_dir(&self, dir: &str) -> Result<(), FerryError> {
        for prefix in path_prefixes(dir) {
            if let Err(create_err) = self.transport.create_dir(&prefix).await {
                if self.transport.list_dir(&prefix).await.is_err() {
                    return Err(FerryError::Upload {
                        path: dir.to_string(),
                        reason: format!("cannot create directory {prefix}: {create_err}"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Successive directory prefixes of a normalized absolute path, shallowest
/// first; the root itself is omitted.
fn path_prefixes(dir: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let mut current = String::new();
    for segment in dir.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes
}

//! Temporary-file staging for downloads.
//!
//! Downloads stream the remote file to local disk first and read the bytes
//! back afterwards, so the live stream and the full in-memory result never
//! coexist.

use std::future::Future;
use std::path::PathBuf;

use tempfile::NamedTempFile;

/// Run `body` with the path of a fresh temporary file.
///
/// The file is removed after `body` completes, on success and on failure; a
/// removal failure is logged, never returned. The body receives the file's
/// path and may reopen it freely.
pub async fn with_temp_file<F, Fut, T, E>(body: F) -> Result<T, E>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<std::io::Error>,
{
    let staged = NamedTempFile::new().map_err(E::from)?;
    let result = body(staged.path().to_path_buf()).await;
    if let Err(err) = staged.close() {
        log::warn!("failed to remove staging file: {err}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_round_trip_and_cleanup() {
        let out: Result<(Vec<u8>, PathBuf), Error> = with_temp_file(|path| async move {
            tokio::fs::write(&path, b"staged bytes").await?;
            let data = tokio::fs::read(&path).await?;
            Ok((data, path))
        })
        .await;

        let (data, path) = out.unwrap();
        assert_eq!(data, b"staged bytes");
        assert!(!path.exists(), "staging file must be removed");
    }

    #[tokio::test]
    async fn test_removed_when_body_fails() {
        let seen = Arc::new(Mutex::new(PathBuf::new()));
        let grabbed = seen.clone();

        let out: Result<(), Error> = with_temp_file(|path| async move {
            *grabbed.lock().unwrap() = path.clone();
            assert!(path.exists(), "staging file must exist inside the body");
            Err(Error::new(ErrorKind::Other, "simulated failure"))
        })
        .await;

        assert!(out.is_err());
        let path = seen.lock().unwrap();
        assert!(!path.exists(), "staging file must be removed on failure");
    }
}

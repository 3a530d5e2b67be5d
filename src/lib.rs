//! Ferry Core - the transfer engine behind Ferry Deploy
//!
//! Provides SSH/SFTP sessions, uploads with per-path permission rules,
//! staged downloads, and remote directory listings.

pub mod error;
pub mod path;
pub mod permissions;
pub mod ssh;
pub mod staging;

pub use error::FerryError;
pub use permissions::{ModeRule, ModeValue, UploadMode};
pub use ssh::session::Session;
pub use ssh::transfer::{EntryInfo, RemoteEntry, RemoteFile};
pub use ssh::{ConnectionOptions, HashAlgorithm};

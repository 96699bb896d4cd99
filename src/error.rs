//! Error types shared by the server and client halves.
//!
//! Every failure is classified into one of four [`ErrorKind`]s so callers can
//! pick the right user-facing message without matching on transport details.

use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Coarse failure classes presented to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or wrong credentials; the user must re-enter them.
    AuthFailure,
    /// Folder or image absent.
    NotFound,
    /// The endpoint could not be reached at all.
    Connectivity,
    /// The server failed while enumerating or reading files.
    ServerFault,
}

impl ErrorKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AuthFailure => "Authentication failed. Please check your password.",
            Self::NotFound => "Not found. The folder or image may no longer exist.",
            Self::Connectivity => "Could not reach the server. Please check that it is running.",
            Self::ServerFault => "The server could not complete the request.",
        }
    }
}

/// Failures of the file-system backed catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("image not found: {folder}/{image}")]
    ImageNotFound { folder: String, image: String },

    #[error("failed to enumerate {path:?}")]
    Enumerate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("catalog task panicked")]
    Task(#[from] tokio::task::JoinError),
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FolderNotFound(_) | Self::ImageNotFound { .. } => ErrorKind::NotFound,
            Self::Enumerate { .. } | Self::Read { .. } | Self::Task(_) => ErrorKind::ServerFault,
        }
    }

    /// Message safe to send to clients: no paths, no error chains.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::FolderNotFound(_) => "Folder not found",
            Self::ImageNotFound { .. } => "Image not found",
            Self::Enumerate { .. } | Self::Task(_) => "Failed to read gallery contents",
            Self::Read { .. } => "Failed to serve image",
        }
    }
}

/// Failures of the HTTP transport client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no endpoint or secret configured")]
    NotConfigured,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("could not reach server")]
    Connectivity(#[source] reqwest::Error),

    #[error("server responded with HTTP {status}")]
    Status { status: StatusCode },

    #[error("malformed response body")]
    Decode(#[source] serde_json::Error),

    #[error("downloaded bytes are not a decodable image")]
    InvalidImage(#[from] image::ImageError),

    #[error("image decode task panicked")]
    Task(#[from] tokio::task::JoinError),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured => ErrorKind::AuthFailure,
            Self::InvalidEndpoint(_) | Self::Connectivity(_) => ErrorKind::Connectivity,
            Self::Status { status } => match *status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::AuthFailure,
                StatusCode::NOT_FOUND => ErrorKind::NotFound,
                _ => ErrorKind::ServerFault,
            },
            Self::Decode(_) | Self::InvalidImage(_) | Self::Task(_) => ErrorKind::ServerFault,
        }
    }

    /// HTTP status carried by a non-success response, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }
}

/// Failures of the persisted key-value settings.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings database error")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare settings directory {path:?}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not determine a settings directory")]
    NoHomeDirectory,
}

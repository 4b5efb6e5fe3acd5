//! Error types for mailbox operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while operating on a mailbox session.
#[derive(Error, Debug)]
pub enum MailboxError {
    /// Failed to reach the IMAP server.
    #[error("IMAP connection failed: {0}")]
    ConnectionFailed(String),

    /// TLS negotiation failed.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No usable password source was configured, or the source was empty.
    #[error("Credentials not found: {0}")]
    CredentialsNotFound(String),

    /// Folder selection was rejected by the store.
    #[error("IMAP folder '{0}' not found")]
    FolderNotFound(String),

    /// A folder was re-selected under a different UIDVALIDITY epoch; unique
    /// ids recorded for it earlier no longer identify the same messages.
    #[error("UIDVALIDITY changed for folder '{0}': was {1}, now {2}")]
    UidValidityChanged(String, u32, u32),

    /// An operation that requires an open folder ran before any selection.
    #[error("No folder selected")]
    NoFolderSelected,

    /// The sequence number matched no message in the selected folder.
    #[error("Message {0} not found in the selected folder")]
    MessageNotFound(u32),

    /// The unique id matched no message in the selected folder.
    #[error("No message with unique id {0} in the selected folder")]
    UidNotFound(u32),

    /// The store refused to relocate the message.
    #[error("Could not move message {sequence} to '{destination}': {reason}")]
    MoveFailed {
        sequence: u32,
        destination: String,
        reason: String,
    },

    /// The fetched payload was not a parseable message.
    #[error("Failed to parse message: {0}")]
    ParseError(String),

    /// Any other IMAP-level failure.
    #[error("IMAP protocol error: {0}")]
    ProtocolError(String),

    /// The configured time budget for a network operation ran out.
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl From<async_native_tls::Error> for MailboxError {
    fn from(err: async_native_tls::Error) -> Self {
        MailboxError::TlsError(err.to_string())
    }
}

/// Errors from handing attachment bytes to the filesystem.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for mailbox operations.
pub type Result<T> = std::result::Result<T, MailboxError>;

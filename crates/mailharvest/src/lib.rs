//! IMAP mailbox session library.
//!
//! Connects to a mail store over IMAP, enumerates and summarizes messages,
//! extracts attachments with per-part failure isolation, and relocates
//! messages between folders. Connection and credential settings live in
//! [`config::MailboxConfig`].

pub mod config;
pub mod error;
pub mod message;
pub mod session;
pub mod storage;
mod stream;

pub use config::{AuthSettings, MailboxConfig, SecurityMode};
pub use error::{MailboxError, Result, StorageError};
pub use message::{extract_attachments, Attachment, MessageFlag, MessageSummary};
pub use session::MailboxSession;
pub use storage::write_attachment;

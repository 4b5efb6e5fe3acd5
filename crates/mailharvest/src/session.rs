//! The IMAP mailbox session.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_imap::error::Error as ImapError;
use async_imap::types::{Flag, Mailbox};
use async_imap::Session;
use async_io::Async;
use async_native_tls::TlsConnector;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use secrecy::ExposeSecret;

use crate::config::{MailboxConfig, SecurityMode};
use crate::error::{MailboxError, Result};
use crate::message::{self, MessageFlag, MessageSummary};
use crate::stream::MailStream;

/// One authenticated connection to a mail store.
///
/// A session serves one caller at a time; every operation takes `&mut self`,
/// so commands are serialized on the single connection. Run independent
/// sessions for parallel access. There is no reconnection: a connection
/// failure ends the session.
pub struct MailboxSession {
    session: Option<Session<MailStream>>,
    config: MailboxConfig,
    current_folder: Option<String>,
    folder_validity: HashMap<String, u32>,
    timeout: Duration,
}

impl MailboxSession {
    /// Connects to the configured server and authenticates.
    pub async fn connect(config: MailboxConfig) -> Result<Self> {
        let password = config.auth.resolve_password()?;
        let limit = Duration::from_secs(config.timeout_secs);

        let addr = format!("{}:{}", config.host, config.port);
        info!("Connecting to IMAP server at {}", addr);

        // Establish the TCP connection with std::net and hand it to async-io.
        let std_stream = std::net::TcpStream::connect(&addr)
            .map_err(|e| MailboxError::ConnectionFailed(e.to_string()))?;
        std_stream
            .set_nonblocking(true)
            .map_err(|e| MailboxError::ConnectionFailed(e.to_string()))?;
        let tcp_stream = Async::new(std_stream)
            .map_err(|e| MailboxError::ConnectionFailed(e.to_string()))?;

        let stream = match config.security {
            SecurityMode::None => MailStream::Plain(tcp_stream),
            SecurityMode::Ssl | SecurityMode::Tls => {
                let tls = TlsConnector::new();
                let tls_stream = timed(limit, "TLS handshake", async {
                    tls.connect(&config.host, tcp_stream)
                        .await
                        .map_err(MailboxError::from)
                })
                .await?;
                MailStream::Tls(tls_stream)
            }
        };

        let client = async_imap::Client::new(stream);
        let session = timed(limit, "LOGIN", async {
            client
                .login(&config.username, password.expose_secret())
                .await
                .map_err(|(e, _)| MailboxError::AuthenticationFailed(e.to_string()))
        })
        .await?;

        info!("Authenticated to {} as {}", config.host, config.username);
        Ok(Self {
            session: Some(session),
            current_folder: None,
            folder_validity: HashMap::new(),
            timeout: limit,
            config,
        })
    }

    /// Switches the session's active folder.
    ///
    /// The switch is atomic from the caller's perspective: when the store
    /// rejects the selection, the previously selected folder is re-opened and
    /// remains current. A successful selection that reveals a changed
    /// UIDVALIDITY leaves the folder selected but returns
    /// [`MailboxError::UidValidityChanged`], since unique ids recorded
    /// earlier no longer apply.
    pub async fn select_folder(&mut self, folder: &str) -> Result<()> {
        info!("Selecting folder '{}'", folder);
        let mailbox = match self.raw_select(folder).await {
            Ok(mailbox) => mailbox,
            Err(err) => {
                // A rejected SELECT closes whatever mailbox was open, so the
                // previous folder has to be re-opened to keep it current.
                if let Some(previous) = self.current_folder.clone() {
                    if let Err(restore) = self.raw_select(&previous).await {
                        warn!(
                            "Could not re-open folder '{}' after failed selection: {}",
                            previous, restore
                        );
                    }
                }
                error!("Could not select folder '{}': {}", folder, err);
                return Err(err);
            }
        };

        self.current_folder = Some(folder.to_string());
        debug!("Folder '{}' selected ({} messages)", folder, mailbox.exists);

        if let Some(validity) = mailbox.uid_validity {
            if let Some(known) = self.folder_validity.insert(folder.to_string(), validity) {
                if known != validity {
                    warn!(
                        "UIDVALIDITY for '{}' changed from {} to {}",
                        folder, known, validity
                    );
                    return Err(MailboxError::UidValidityChanged(
                        folder.to_string(),
                        known,
                        validity,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Selects the folder named in the configuration (default: INBOX).
    pub async fn select_configured_folder(&mut self) -> Result<()> {
        let folder = self.config.folder.clone();
        self.select_folder(&folder).await
    }

    /// Enumerates the sequence numbers of every message in the active
    /// folder, ascending. The result is a point-in-time snapshot; it does
    /// not track later changes to the folder.
    pub async fn list_messages(&mut self) -> Result<Vec<u32>> {
        self.require_folder()?;
        let limit = self.timeout;
        let session = self.session_mut()?;

        let found = timed(limit, "SEARCH", async {
            session
                .search("ALL")
                .await
                .map_err(|e| MailboxError::ProtocolError(e.to_string()))
        })
        .await?;

        let mut sequences: Vec<u32> = found.into_iter().collect();
        sequences.sort_unstable();
        debug!("Active folder holds {} messages", sequences.len());
        Ok(sequences)
    }

    /// Fetches one message and assembles its summary.
    ///
    /// A sequence number that matches nothing (stale or out of range) is a
    /// hard error; missing header fields within a found message are empty
    /// strings instead.
    pub async fn get_message(&mut self, sequence: u32) -> Result<MessageSummary> {
        self.require_folder()?;
        let limit = self.timeout;
        let session = self.session_mut()?;

        debug!("Fetching message {}", sequence);
        let (uid, flags, raw) = timed(limit, "FETCH", async {
            let mut fetches = session
                .fetch(sequence.to_string(), "(UID FLAGS BODY.PEEK[])")
                .await
                .map_err(|e| fetch_error(sequence, e))?;

            let fetch = match fetches.next().await {
                Some(Ok(fetch)) => fetch,
                Some(Err(e)) => return Err(fetch_error(sequence, e)),
                None => return Err(MailboxError::MessageNotFound(sequence)),
            };

            let uid = fetch.uid.ok_or_else(|| {
                MailboxError::ProtocolError("server did not return the message UID".to_string())
            })?;
            let flags: Vec<MessageFlag> = fetch.flags().filter_map(flag_of).collect();
            let raw = fetch
                .body()
                .map(|body| body.to_vec())
                .ok_or(MailboxError::MessageNotFound(sequence))?;

            Ok((uid, flags, raw))
        })
        .await?;

        message::summarize(sequence, uid, flags, &raw)
    }

    /// Summarizes every message in the active folder.
    ///
    /// A message that cannot be fetched or parsed is logged and skipped; the
    /// remaining messages are still returned.
    pub async fn fetch_all(&mut self) -> Result<Vec<MessageSummary>> {
        let sequences = self.list_messages().await?;

        let mut summaries = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            match self.get_message(sequence).await {
                Ok(summary) => summaries.push(summary),
                Err(err) => error!("Skipping message {}: {}", sequence, err),
            }
        }

        info!(
            "Read {} messages from '{}'",
            summaries.len(),
            self.current_folder.as_deref().unwrap_or_default()
        );
        Ok(summaries)
    }

    /// Translates a unique id to the message's current sequence number in
    /// the active folder. Sequence numbers shift when earlier messages are
    /// moved or deleted; unique ids are the stable way back to a message.
    pub async fn resolve_sequence_number(&mut self, uid: u32) -> Result<u32> {
        self.require_folder()?;
        let limit = self.timeout;
        let session = self.session_mut()?;

        let query = format!("UID {}", uid);
        let found = timed(limit, "SEARCH", async {
            session
                .search(&query)
                .await
                .map_err(|e| MailboxError::ProtocolError(e.to_string()))
        })
        .await?;

        let sequence = found
            .into_iter()
            .min()
            .ok_or(MailboxError::UidNotFound(uid))?;
        debug!("Unique id {} resolved to sequence number {}", uid, sequence);
        Ok(sequence)
    }

    /// Moves one message to another folder on the same store.
    ///
    /// Afterwards every sequence number held for the active folder is
    /// suspect; re-resolve through unique ids before further use.
    pub async fn move_message(&mut self, sequence: u32, destination: &str) -> Result<()> {
        self.require_folder()?;
        let limit = self.timeout;
        let session = self.session_mut()?;

        timed(limit, "MOVE", async {
            session
                .mv(sequence.to_string(), destination)
                .await
                .map_err(|e| MailboxError::MoveFailed {
                    sequence,
                    destination: destination.to_string(),
                    reason: e.to_string(),
                })
        })
        .await?;

        info!("Moved message {} to '{}'", sequence, destination);
        Ok(())
    }

    /// Logs out and releases the connection.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            info!("Disconnecting from {}", self.config.host);
            let limit = self.timeout;
            timed(limit, "LOGOUT", async {
                session
                    .logout()
                    .await
                    .map_err(|e| MailboxError::ProtocolError(e.to_string()))
            })
            .await?;
        }
        self.current_folder = None;
        self.folder_validity.clear();
        Ok(())
    }

    /// Returns the currently selected folder, if any.
    pub fn current_folder(&self) -> Option<&str> {
        self.current_folder.as_deref()
    }

    /// Returns the UIDVALIDITY observed for the currently selected folder.
    pub fn uidvalidity(&self) -> Option<u32> {
        self.current_folder
            .as_ref()
            .and_then(|folder| self.folder_validity.get(folder))
            .copied()
    }

    /// Checks whether the session still holds its connection.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Returns the configuration the session was created with.
    pub fn config(&self) -> &MailboxConfig {
        &self.config
    }

    async fn raw_select(&mut self, folder: &str) -> Result<Mailbox> {
        let limit = self.timeout;
        let session = self.session_mut()?;
        timed(limit, "SELECT", async {
            session
                .select(folder)
                .await
                .map_err(|e| select_error(folder, e))
        })
        .await
    }

    fn session_mut(&mut self) -> Result<&mut Session<MailStream>> {
        self.session
            .as_mut()
            .ok_or_else(|| MailboxError::ConnectionFailed("not connected".to_string()))
    }

    fn require_folder(&self) -> Result<()> {
        if self.current_folder.is_none() {
            return Err(MailboxError::NoFolderSelected);
        }
        Ok(())
    }
}

impl Drop for MailboxSession {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("MailboxSession dropped without explicit disconnect; the connection will be closed");
        }
    }
}

async fn timed<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(MailboxError::Timeout(format!(
            "{} did not complete within {}s",
            operation,
            limit.as_secs()
        ))),
    }
}

fn select_error(folder: &str, err: ImapError) -> MailboxError {
    match err {
        ImapError::No(..) => MailboxError::FolderNotFound(folder.to_string()),
        other => MailboxError::ProtocolError(other.to_string()),
    }
}

fn fetch_error(sequence: u32, err: ImapError) -> MailboxError {
    match err {
        ImapError::No(..) | ImapError::Bad(..) => MailboxError::MessageNotFound(sequence),
        other => MailboxError::ProtocolError(other.to_string()),
    }
}

fn flag_of(flag: Flag<'_>) -> Option<MessageFlag> {
    match flag {
        Flag::Seen => Some(MessageFlag::Seen),
        Flag::Answered => Some(MessageFlag::Answered),
        Flag::Flagged => Some(MessageFlag::Flagged),
        Flag::Deleted => Some(MessageFlag::Deleted),
        Flag::Draft => Some(MessageFlag::Draft),
        Flag::Recent => Some(MessageFlag::Recent),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthSettings;

    fn test_config() -> MailboxConfig {
        MailboxConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            security: SecurityMode::None,
            username: "test@example.com".to_string(),
            auth: AuthSettings {
                password_insecure: Some("hunter2".to_string()),
                password_file: None,
                password_env_var: None,
            },
            folder: "INBOX".to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        let result = MailboxSession::connect(test_config()).await;
        assert!(matches!(result, Err(MailboxError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_network_io() {
        let mut config = test_config();
        config.auth = AuthSettings::default();
        config.host = "host.invalid".to_string();

        let result = MailboxSession::connect(config).await;
        assert!(matches!(result, Err(MailboxError::CredentialsNotFound(_))));
    }

    #[test]
    fn flags_outside_the_model_are_dropped() {
        assert_eq!(flag_of(Flag::Seen), Some(MessageFlag::Seen));
        assert_eq!(flag_of(Flag::Answered), Some(MessageFlag::Answered));
        assert_eq!(flag_of(Flag::Deleted), Some(MessageFlag::Deleted));
        assert_eq!(flag_of(Flag::MayCreate), None);
        assert_eq!(flag_of(Flag::Custom("$Junk".into())), None);
    }
}

//! Message summarization and attachment extraction.

use std::path::Path;

use log::debug;
use mail_parser::{Message, MessageParser, MessagePartId, MimeHeaders, PartType};

use crate::error::{MailboxError, Result, StorageError};

/// Flags attached to a message in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageFlag {
    Seen,
    Answered,
    Flagged,
    Deleted,
    Draft,
    Recent,
}

/// A single attachment extracted from a message.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Descriptive name declared by the message part; may be empty.
    pub name: String,
    /// MIME type inferred from the file extension of `name`, falling back to
    /// `application/octet-stream`.
    pub mime_type: String,
    /// Transfer-decoded content bytes.
    pub content: Vec<u8>,
}

impl Attachment {
    /// Hands the decoded content to the filesystem, replacing `path`.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), StorageError> {
        crate::storage::write_attachment(path, &self.content)
    }
}

/// Everything the session reads out of a single message.
#[derive(Debug, Clone)]
pub struct MessageSummary {
    /// 1-based position in the selected folder. Valid only for the current
    /// connection; invalidated by moves and deletions of earlier messages.
    pub sequence: u32,
    /// Store-assigned unique id, stable within the folder's UIDVALIDITY epoch.
    pub uid: u32,
    pub from: String,
    pub to: String,
    pub date: String,
    pub subject: String,
    /// One entry per `Received` header, in the order the store returned them.
    /// A message with a single hop yields a one-element vector.
    pub smtp_history: Vec<String>,
    pub flags: Vec<MessageFlag>,
    /// First text part of the body; empty when the message has none.
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Extracts the attachments of a raw message.
///
/// A message with a single part has no attachments and yields an empty
/// vector. For multipart messages the top-level parts 2..N are examined
/// (part 1 is the primary body). A part that is itself a container or that
/// lacks a Content-Description is skipped; one unreadable part never aborts
/// extraction of the rest.
pub fn extract_attachments(raw: &[u8]) -> Result<Vec<Attachment>> {
    let message = parse(raw)?;
    Ok(attachments_of(&message))
}

pub(crate) fn summarize(
    sequence: u32,
    uid: u32,
    flags: Vec<MessageFlag>,
    raw: &[u8],
) -> Result<MessageSummary> {
    let message = parse(raw)?;
    let summary = MessageSummary {
        sequence,
        uid,
        from: message
            .from()
            .and_then(|addr| addr.first())
            .map(format_address)
            .unwrap_or_default(),
        to: message
            .to()
            .and_then(|addr| addr.first())
            .map(format_address)
            .unwrap_or_default(),
        date: message.date().map(|d| d.to_rfc3339()).unwrap_or_default(),
        subject: message.subject().unwrap_or_default().to_string(),
        smtp_history: received_chain(&message),
        body: message
            .body_text(0)
            .map(|text| text.to_string())
            .unwrap_or_default(),
        attachments: attachments_of(&message),
        flags,
    };

    debug!(
        "Summarized message {} (uid {}): from={:?} subject={:?}",
        sequence, uid, summary.from, summary.subject
    );
    Ok(summary)
}

fn parse(raw: &[u8]) -> Result<Message<'_>> {
    MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailboxError::ParseError("not a parseable RFC 822 message".to_string()))
}

fn attachments_of(message: &Message) -> Vec<Attachment> {
    let root = match message.parts.first() {
        Some(root) => root,
        None => return Vec::new(),
    };

    // Part 1 is the primary body; only its siblings can be attachments.
    let children = match &root.body {
        PartType::Multipart(ids) => ids,
        _ => return Vec::new(),
    };

    let mut attachments = Vec::new();
    for (position, part_id) in children.iter().enumerate().skip(1) {
        match read_part(message, *part_id) {
            Ok(attachment) => {
                debug!(
                    "Got part {} as attachment {:?} ({}, {} bytes)",
                    position + 1,
                    attachment.name,
                    attachment.mime_type,
                    attachment.content.len()
                );
                attachments.push(attachment);
            }
            Err(reason) => {
                debug!("Skipping part {}: {}", position + 1, reason);
            }
        }
    }
    attachments
}

fn read_part(message: &Message, id: MessagePartId) -> std::result::Result<Attachment, String> {
    let part = message.part(id).ok_or_else(|| "no such part".to_string())?;

    let name = part
        .content_description()
        .map(str::to_string)
        .ok_or_else(|| "part carries no Content-Description".to_string())?;

    let content = match &part.body {
        PartType::Binary(data) | PartType::InlineBinary(data) => data.to_vec(),
        PartType::Text(text) => text.as_bytes().to_vec(),
        PartType::Html(html) => html.as_bytes().to_vec(),
        PartType::Message(_) => return Err("nested message part".to_string()),
        PartType::Multipart(_) => return Err("nested multipart container".to_string()),
    };

    let mime_type = mime_guess::from_path(&name)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    Ok(Attachment {
        name,
        mime_type,
        content,
    })
}

fn received_chain(message: &Message) -> Vec<String> {
    let raw = message.raw_message.as_ref();
    message
        .headers()
        .iter()
        .filter(|header| header.name().eq_ignore_ascii_case("received"))
        .filter_map(|header| raw.get(header.offset_start as usize..header.offset_end as usize))
        .map(unfold)
        .collect()
}

/// Collapses folded header continuation lines into a single line.
fn unfold(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats an address as "Name <mailbox@host>", or just the mailbox when no
/// display name is present.
fn format_address(addr: &mail_parser::Addr) -> String {
    match addr.name() {
        Some(name) => format!("{} <{}>", name, addr.address().unwrap_or_default()),
        None => addr.address().unwrap_or_default().to_string(),
    }
}

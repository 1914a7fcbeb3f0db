//! Platform-neutral chat transport contract.
//!
//! The dialogue controller only ever talks to a [`ChatTransport`]: it sends
//! and edits HTML text messages (optionally carrying a button [`Menu`]),
//! acknowledges button presses, downloads an attachment by id and sends a
//! file back. Incoming traffic reaches it as [`Event`]s. Nothing here knows
//! about a concrete chat platform; see [`crate::telegram`] for one adapter.

use crate::convert::TargetKind;
use crate::error::TransportError;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform chat (conversation) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message previously sent by the bot, so it can be edited later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat: ChatId,
    pub message_id: i64,
}

/// A user-submitted file as declared by the platform. Nothing has been
/// downloaded yet; size and media type are the sender's claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDescriptor {
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: Option<String>,
}

/// Something the user can pick from a menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Convert(TargetKind),
    Cancel,
    Help,
}

impl Choice {
    /// Opaque payload attached to the button.
    pub fn callback_data(self) -> &'static str {
        match self {
            Choice::Convert(TargetKind::Document) => "convert_word",
            Choice::Convert(TargetKind::Spreadsheet) => "convert_excel",
            Choice::Convert(TargetKind::PlainText) => "convert_text",
            Choice::Cancel => "cancel",
            Choice::Help => "help",
        }
    }

    /// Inverse of [`Choice::callback_data`]. Unknown payloads (for example
    /// from a menu sent by an older build) yield `None`.
    pub fn from_callback_data(data: &str) -> Option<Choice> {
        match data {
            "convert_word" => Some(Choice::Convert(TargetKind::Document)),
            "convert_excel" => Some(Choice::Convert(TargetKind::Spreadsheet)),
            "convert_text" => Some(Choice::Convert(TargetKind::PlainText)),
            "cancel" => Some(Choice::Cancel),
            "help" => Some(Choice::Help),
            _ => None,
        }
    }
}

/// One menu button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub choice: Choice,
}

impl Button {
    pub fn new(label: impl Into<String>, choice: Choice) -> Self {
        Self {
            label: label.into(),
            choice,
        }
    }
}

/// Rows of buttons attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Menu {
    pub rows: Vec<Vec<Button>>,
}

impl Menu {
    /// Menu shown under the welcome text.
    pub fn welcome() -> Self {
        Self {
            rows: vec![
                vec![Button::new(
                    "📄 PDF → Word",
                    Choice::Convert(TargetKind::Document),
                )],
                vec![Button::new(
                    "📊 PDF → Excel",
                    Choice::Convert(TargetKind::Spreadsheet),
                )],
                vec![Button::new("ℹ️ Help", Choice::Help)],
            ],
        }
    }

    /// Menu shown once a file is waiting for a conversion choice.
    pub fn conversion() -> Self {
        Self {
            rows: vec![
                vec![
                    Button::new("📄 To Word", Choice::Convert(TargetKind::Document)),
                    Button::new("📊 To Excel", Choice::Convert(TargetKind::Spreadsheet)),
                ],
                vec![Button::new(
                    "📝 Text only",
                    Choice::Convert(TargetKind::PlainText),
                )],
                vec![Button::new("❌ Cancel", Choice::Cancel)],
            ],
        }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

/// Slash commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Info,
}

impl Command {
    /// Parse `/start`, `/help@SomeBot extra words` and the like.
    pub fn parse(text: &str) -> Option<Command> {
        let word = text.split_whitespace().next()?;
        let word = word.strip_prefix('/')?;
        let name = word.split('@').next().unwrap_or(word);
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "info" => Some(Command::Info),
            _ => None,
        }
    }
}

/// Incoming traffic, already stripped of platform detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command {
        user: UserId,
        chat: ChatId,
        command: Command,
    },
    Upload {
        user: UserId,
        chat: ChatId,
        upload: UploadDescriptor,
    },
    /// A menu button was pressed. `choice` is `None` for unknown payloads.
    Choice {
        user: UserId,
        callback_id: String,
        message: MessageRef,
        choice: Option<Choice>,
    },
    /// Anything else (plain text, stickers, edits...).
    Other { chat: Option<ChatId> },
}

impl Event {
    pub fn user(&self) -> Option<UserId> {
        match self {
            Event::Command { user, .. } | Event::Upload { user, .. } | Event::Choice { user, .. } => {
                Some(*user)
            }
            Event::Other { .. } => None,
        }
    }

    /// Where an apology should go if handling this event fails.
    pub fn chat(&self) -> Option<ChatId> {
        match self {
            Event::Command { chat, .. } | Event::Upload { chat, .. } => Some(*chat),
            Event::Choice { message, .. } => Some(message.chat),
            Event::Other { chat } => *chat,
        }
    }
}

/// Outbound side of a chat platform. Message text is HTML.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a new message, optionally with a menu.
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        menu: Option<&Menu>,
    ) -> Result<MessageRef, TransportError>;

    /// Replace the text (and menu) of a message sent earlier.
    async fn edit_text(
        &self,
        message: &MessageRef,
        text: &str,
        menu: Option<&Menu>,
    ) -> Result<(), TransportError>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn answer_choice(&self, callback_id: &str) -> Result<(), TransportError>;

    /// Stream the attachment `file_id` into `dest`. Returns bytes written.
    async fn download(&self, file_id: &str, dest: &Path) -> Result<u64, TransportError>;

    /// Send the file at `path` to `chat` under `file_name`.
    async fn send_file(
        &self,
        chat: ChatId,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Result<(), TransportError>;
}

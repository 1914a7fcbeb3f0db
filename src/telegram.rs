//! Telegram Bot API adapter.
//!
//! [`TelegramClient`] implements [`ChatTransport`] over plain HTTPS with
//! `reqwest` and also owns the `getUpdates` long poll that feeds
//! [`crate::bot`]. Only the handful of Bot API fields the bot reads are
//! modelled; everything else in an update is ignored by serde.
//!
//! Control calls (messages, edits, `getFile`) carry the configured request
//! budget as a per-request timeout. Attachment bodies carry none; the
//! budgeted wrappers in [`crate::transfer`] bound them instead.

use crate::config::BotConfig;
use crate::error::{BotError, TransportError};
use crate::transport::{
    ChatId, ChatTransport, Choice, Command, Event, Menu, MessageRef, UploadDescriptor, UserId,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Name given to documents sent without one.
const FALLBACK_FILE_NAME: &str = "document.pdf";

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, TransportError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TransportError::Api {
                code: self.error_code.unwrap_or_default(),
                description: self
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
struct Message {
    message_id: i64,
    #[serde(default)]
    from: Option<User>,
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct Document {
    file_id: String,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    #[serde(default)]
    file_path: Option<String>,
}

impl Update {
    /// Strip the platform detail and keep what the dialogue needs.
    pub fn into_event(self) -> Event {
        if let Some(query) = self.callback_query {
            return match query.message {
                Some(message) => Event::Choice {
                    user: UserId(query.from.id),
                    callback_id: query.id,
                    message: MessageRef {
                        chat: ChatId(message.chat.id),
                        message_id: message.message_id,
                    },
                    choice: query.data.as_deref().and_then(Choice::from_callback_data),
                },
                None => Event::Other { chat: None },
            };
        }

        let Some(message) = self.message else {
            return Event::Other { chat: None };
        };
        let chat = ChatId(message.chat.id);
        let Some(user) = message.from.as_ref().map(|u| UserId(u.id)) else {
            return Event::Other { chat: Some(chat) };
        };

        if let Some(document) = message.document {
            return Event::Upload {
                user,
                chat,
                upload: UploadDescriptor {
                    file_id: document.file_id,
                    file_name: document
                        .file_name
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string()),
                    file_size: document.file_size.unwrap_or_default(),
                    mime_type: document.mime_type,
                },
            };
        }

        match message.text.as_deref().and_then(Command::parse) {
            Some(command) => Event::Command {
                user,
                chat,
                command,
            },
            None => Event::Other { chat: Some(chat) },
        }
    }
}

/// `reply_markup` body for an inline keyboard.
fn keyboard(menu: &Menu) -> Value {
    let rows: Vec<Vec<Value>> = menu
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.label, "callback_data": b.choice.callback_data() }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Editing a message to its current content is rejected by the API; the
/// dialogue treats that as success.
fn is_not_modified(err: &TransportError) -> bool {
    matches!(err, TransportError::Api { description, .. } if description.contains("message is not modified"))
}

/// HTTPS client for one bot token.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    method_base: String,
    file_base: String,
    request_budget: Duration,
    poll_timeout_secs: u64,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URLs embed the token.
        f.debug_struct("TelegramClient")
            .field("request_budget", &self.request_budget)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl TelegramClient {
    pub fn new(config: &BotConfig) -> Result<Self, BotError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BotError::Internal(format!("HTTP client: {e}")))?;
        let api = config.api_url.trim_end_matches('/');
        Ok(Self {
            http,
            method_base: format!("{api}/bot{}", config.token),
            file_base: format!("{api}/file/bot{}", config.token),
            request_budget: config.request_budget(),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        budget: Duration,
    ) -> Result<T, TransportError> {
        debug!("Bot API {}", method);
        let response = self
            .http
            .post(format!("{}/{}", self.method_base, method))
            .timeout(budget)
            .json(body)
            .send()
            .await?;
        // Error replies carry a JSON envelope too, so the status is not checked.
        response.json::<ApiResponse<T>>().await?.into_result()
    }

    /// Name of the bot behind the token; doubles as a credential check.
    pub async fn get_me(&self) -> Result<String, TransportError> {
        let me: User = self.call("getMe", &json!({}), self.request_budget).await?;
        Ok(me.username.unwrap_or_else(|| me.id.to_string()))
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TransportError> {
        let body = json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let budget = self.request_budget + Duration::from_secs(self.poll_timeout_secs);
        self.call("getUpdates", &body, budget).await
    }

    async fn file_url(&self, file_id: &str) -> Result<String, TransportError> {
        let file: RemoteFile = self
            .call("getFile", &json!({ "file_id": file_id }), self.request_budget)
            .await?;
        let path = file.file_path.ok_or_else(|| TransportError::Api {
            code: 0,
            description: format!("no file_path for {file_id}"),
        })?;
        Ok(format!("{}/{}", self.file_base, path))
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        menu: Option<&Menu>,
    ) -> Result<MessageRef, TransportError> {
        let mut body = json!({ "chat_id": chat.0, "text": text, "parse_mode": "HTML" });
        if let Some(menu) = menu {
            body["reply_markup"] = keyboard(menu);
        }
        let sent: Message = self.call("sendMessage", &body, self.request_budget).await?;
        Ok(MessageRef {
            chat: ChatId(sent.chat.id),
            message_id: sent.message_id,
        })
    }

    async fn edit_text(
        &self,
        message: &MessageRef,
        text: &str,
        menu: Option<&Menu>,
    ) -> Result<(), TransportError> {
        let mut body = json!({
            "chat_id": message.chat.0,
            "message_id": message.message_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(menu) = menu {
            body["reply_markup"] = keyboard(menu);
        }
        match self
            .call::<Value>("editMessageText", &body, self.request_budget)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn answer_choice(&self, callback_id: &str) -> Result<(), TransportError> {
        self.call::<bool>(
            "answerCallbackQuery",
            &json!({ "callback_query_id": callback_id }),
            self.request_budget,
        )
        .await
        .map(|_| ())
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<u64, TransportError> {
        let url = self.file_url(file_id).await?;
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Api {
                code: i64::from(response.status().as_u16()),
                description: format!("file download returned {}", response.status()),
            });
        }

        let io_err = |source| TransportError::Io {
            path: dest.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
        Ok(written)
    }

    async fn send_file(
        &self,
        chat: ChatId,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Result<(), TransportError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| TransportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let part = Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("chat_id", chat.0.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .part("document", part);

        let response = self
            .http
            .post(format!("{}/sendDocument", self.method_base))
            .multipart(form)
            .send()
            .await?;
        let sent = response.json::<ApiResponse<Value>>().await?.into_result();
        if let Err(e) = &sent {
            warn!(chat = %chat, "sendDocument rejected: {}", e);
        }
        sent.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::TargetKind;

    fn update(raw: Value) -> Update {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn document_message_becomes_upload() {
        let event = update(json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": { "id": 42, "is_bot": false, "first_name": "A" },
                "chat": { "id": 42, "type": "private" },
                "document": {
                    "file_id": "BQAD",
                    "file_unique_id": "x",
                    "file_name": "report.pdf",
                    "mime_type": "application/pdf",
                    "file_size": 2048
                }
            }
        }))
        .into_event();

        assert_eq!(
            event,
            Event::Upload {
                user: UserId(42),
                chat: ChatId(42),
                upload: UploadDescriptor {
                    file_id: "BQAD".into(),
                    file_name: "report.pdf".into(),
                    file_size: 2048,
                    mime_type: Some("application/pdf".into()),
                },
            }
        );
    }

    #[test]
    fn nameless_document_gets_fallback_name() {
        let event = update(json!({
            "update_id": 2,
            "message": {
                "message_id": 11,
                "from": { "id": 7 },
                "chat": { "id": 7 },
                "document": { "file_id": "f" }
            }
        }))
        .into_event();
        match event {
            Event::Upload { upload, .. } => {
                assert_eq!(upload.file_name, FALLBACK_FILE_NAME);
                assert_eq!(upload.file_size, 0);
                assert_eq!(upload.mime_type, None);
            }
            other => panic!("expected upload, got {other:?}"),
        }
    }

    #[test]
    fn commands_and_plain_text() {
        let command = update(json!({
            "update_id": 3,
            "message": { "message_id": 1, "from": { "id": 5 }, "chat": { "id": 9 }, "text": "/help@PdfBot" }
        }))
        .into_event();
        assert_eq!(
            command,
            Event::Command {
                user: UserId(5),
                chat: ChatId(9),
                command: Command::Help
            }
        );

        let chatter = update(json!({
            "update_id": 4,
            "message": { "message_id": 2, "from": { "id": 5 }, "chat": { "id": 9 }, "text": "hello" }
        }))
        .into_event();
        assert_eq!(chatter, Event::Other { chat: Some(ChatId(9)) });
    }

    #[test]
    fn callback_query_becomes_choice() {
        let event = update(json!({
            "update_id": 5,
            "callback_query": {
                "id": "cb1",
                "from": { "id": 42 },
                "message": { "message_id": 77, "chat": { "id": 42 }, "text": "Choose" },
                "data": "convert_excel"
            }
        }))
        .into_event();
        assert_eq!(
            event,
            Event::Choice {
                user: UserId(42),
                callback_id: "cb1".into(),
                message: MessageRef {
                    chat: ChatId(42),
                    message_id: 77
                },
                choice: Some(Choice::Convert(TargetKind::Spreadsheet)),
            }
        );
    }

    #[test]
    fn unknown_callback_data_is_kept_as_unknown_choice() {
        let event = update(json!({
            "update_id": 6,
            "callback_query": {
                "id": "cb2",
                "from": { "id": 1 },
                "message": { "message_id": 3, "chat": { "id": 1 } },
                "data": "convert_pptx"
            }
        }))
        .into_event();
        assert!(matches!(event, Event::Choice { choice: None, .. }));
    }

    #[test]
    fn edited_and_empty_updates_are_ignored() {
        let event = update(json!({ "update_id": 8, "edited_message": { "message_id": 1 } })).into_event();
        assert_eq!(event, Event::Other { chat: None });
    }

    #[test]
    fn keyboard_markup_carries_callback_data() {
        let markup = keyboard(&Menu::conversion());
        let rows = markup["inline_keyboard"].as_array().unwrap();
        let data: Vec<&str> = rows
            .iter()
            .flat_map(|r| r.as_array().unwrap())
            .map(|b| b["callback_data"].as_str().unwrap())
            .collect();
        assert!(data.contains(&"convert_word"));
        assert!(data.contains(&"convert_excel"));
        assert!(data.contains(&"convert_text"));
        assert!(data.contains(&"cancel"));
    }

    #[test]
    fn api_envelope_maps_errors() {
        let ok: ApiResponse<bool> =
            serde_json::from_value(json!({ "ok": true, "result": true })).unwrap();
        assert!(ok.into_result().unwrap());

        let err: ApiResponse<Value> = serde_json::from_value(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message is not modified"
        }))
        .unwrap();
        let err = err.into_result().unwrap_err();
        assert!(is_not_modified(&err));
        assert!(matches!(err, TransportError::Api { code: 400, .. }));
    }

    #[test]
    fn urls_embed_token_but_debug_does_not() {
        let config = BotConfig::builder()
            .token("123:SECRET")
            .api_url("http://localhost:8081/")
            .build()
            .unwrap();
        let client = TelegramClient::new(&config).unwrap();
        assert_eq!(client.method_base, "http://localhost:8081/bot123:SECRET");
        assert_eq!(client.file_base, "http://localhost:8081/file/bot123:SECRET");
        assert!(!format!("{client:?}").contains("SECRET"));
    }
}

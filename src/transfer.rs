//! Budgeted file transfers.
//!
//! Both directions run under their own wall-clock budget and report exactly
//! one of three outcomes: done, [`TransferError::Timeout`], or
//! [`TransferError::Network`]. There is no retry here; a failed transfer
//! fails the job and the user starts over.

use crate::error::TransferError;
use crate::transport::{ChatId, ChatTransport};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Download attachment `file_id` into `dest` within `budget`.
///
/// Returns the number of bytes written. On failure a partially written
/// `dest` may remain; the caller owns its cleanup.
pub async fn fetch_to_path(
    transport: &dyn ChatTransport,
    file_id: &str,
    dest: &Path,
    budget: Duration,
) -> Result<u64, TransferError> {
    debug!("Downloading {} → {}", file_id, dest.display());
    match tokio::time::timeout(budget, transport.download(file_id, dest)).await {
        Ok(Ok(bytes)) => {
            info!("Downloaded {} bytes to {}", bytes, dest.display());
            Ok(bytes)
        }
        Ok(Err(e)) => {
            warn!("Download of {} failed: {}", file_id, e);
            Err(TransferError::Network(e.to_string()))
        }
        Err(_) => {
            warn!("Download of {} exceeded {}s", file_id, budget.as_secs());
            Err(TransferError::Timeout {
                secs: budget.as_secs(),
            })
        }
    }
}

/// Send the file at `path` to `chat` as `file_name` within `budget`.
pub async fn send_from_path(
    transport: &dyn ChatTransport,
    chat: ChatId,
    path: &Path,
    file_name: &str,
    caption: &str,
    budget: Duration,
) -> Result<(), TransferError> {
    debug!("Uploading {} as {}", path.display(), file_name);
    match tokio::time::timeout(budget, transport.send_file(chat, path, file_name, caption)).await
    {
        Ok(Ok(())) => {
            info!(chat = %chat, "Sent {}", file_name);
            Ok(())
        }
        Ok(Err(e)) => {
            warn!(chat = %chat, "Upload of {} failed: {}", file_name, e);
            Err(TransferError::Network(e.to_string()))
        }
        Err(_) => {
            warn!(chat = %chat, "Upload of {} exceeded {}s", file_name, budget.as_secs());
            Err(TransferError::Timeout {
                secs: budget.as_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::{Menu, MessageRef};
    use async_trait::async_trait;

    /// Transport whose transfers take `delay` and then succeed or fail.
    struct SlowTransport {
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl ChatTransport for SlowTransport {
        async fn send_text(
            &self,
            chat: ChatId,
            _text: &str,
            _menu: Option<&Menu>,
        ) -> Result<MessageRef, TransportError> {
            Ok(MessageRef {
                chat,
                message_id: 1,
            })
        }

        async fn edit_text(
            &self,
            _message: &MessageRef,
            _text: &str,
            _menu: Option<&Menu>,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn answer_choice(&self, _callback_id: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn download(&self, _file_id: &str, _dest: &Path) -> Result<u64, TransportError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(TransportError::Http("connection reset".into()))
            } else {
                Ok(2048)
            }
        }

        async fn send_file(
            &self,
            _chat: ChatId,
            _path: &Path,
            _file_name: &str,
            _caption: &str,
        ) -> Result<(), TransportError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(TransportError::Api {
                    code: 413,
                    description: "Request Entity Too Large".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    const BUDGET: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn download_within_budget_succeeds() {
        let t = SlowTransport {
            delay: Duration::from_secs(5),
            fail: false,
        };
        let got = fetch_to_path(&t, "f", Path::new("x.pdf"), BUDGET).await;
        assert_eq!(got, Ok(2048));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_download_times_out() {
        let t = SlowTransport {
            delay: Duration::from_secs(120),
            fail: false,
        };
        let got = fetch_to_path(&t, "f", Path::new("x.pdf"), BUDGET).await;
        assert_eq!(got, Err(TransferError::Timeout { secs: 60 }));
    }

    #[tokio::test(start_paused = true)]
    async fn download_network_error_is_distinct_from_timeout() {
        let t = SlowTransport {
            delay: Duration::from_secs(1),
            fail: true,
        };
        let got = fetch_to_path(&t, "f", Path::new("x.pdf"), BUDGET).await;
        assert!(matches!(got, Err(TransferError::Network(ref m)) if m.contains("reset")));
    }

    #[tokio::test(start_paused = true)]
    async fn upload_outcomes() {
        let ok = SlowTransport {
            delay: Duration::from_secs(1),
            fail: false,
        };
        let slow = SlowTransport {
            delay: Duration::from_secs(61),
            fail: false,
        };
        let broken = SlowTransport {
            delay: Duration::from_secs(1),
            fail: true,
        };
        let p = Path::new("out.docx");
        assert_eq!(send_from_path(&ok, ChatId(1), p, "a.docx", "", BUDGET).await, Ok(()));
        assert_eq!(
            send_from_path(&slow, ChatId(1), p, "a.docx", "", BUDGET).await,
            Err(TransferError::Timeout { secs: 60 })
        );
        assert!(matches!(
            send_from_path(&broken, ChatId(1), p, "a.docx", "", BUDGET).await,
            Err(TransferError::Network(_))
        ));
    }
}

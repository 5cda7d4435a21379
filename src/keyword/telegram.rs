//! Telegram client using teloxide.

use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, MessageId, ReplyParameters};
use tracing::{info, warn};

use crate::keyword::message::{MessagePart, Reply};

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
    dry_run: bool,
}

/// Turn a stored image reference into something `send_photo` accepts.
///
/// HTTP(S) references are sent as URLs, anything else as a Telegram file id.
pub fn image_input(image_ref: &str) -> InputFile {
    if image_ref.starts_with("http://") || image_ref.starts_with("https://") {
        match Url::parse(image_ref) {
            Ok(url) => return InputFile::url(url),
            Err(e) => warn!("Bad image URL {:?}, sending as file id: {e}", image_ref),
        }
    }
    InputFile::file_id(FileId(image_ref.to_string()))
}

impl TelegramClient {
    pub fn new(bot: Bot, dry_run: bool) -> Self {
        Self { bot, dry_run }
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<i64, String> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);

        if let Some(msg_id) = reply_to_message_id {
            let reply_params = ReplyParameters::new(MessageId(msg_id as i32));
            request = request.reply_parameters(reply_params);
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }

    /// Send an image by URL or file id.
    pub async fn send_image(
        &self,
        chat_id: i64,
        image_ref: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<i64, String> {
        info!("📷 Sending image to chat {}", chat_id);

        let mut request = self.bot.send_photo(ChatId(chat_id), image_input(image_ref));

        if let Some(msg_id) = reply_to_message_id {
            let reply_params = ReplyParameters::new(MessageId(msg_id as i32));
            request = request.reply_parameters(reply_params);
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send image: {e}");
            warn!("{}", msg);
            msg
        })
    }

    /// Deliver an engine reply. Chains go out part by part, in order.
    ///
    /// Only the first outgoing message quotes the triggering message.
    pub async fn send_reply(&self, chat_id: i64, reply: &Reply, reply_to_message_id: Option<i64>) {
        if self.dry_run {
            info!("[DRY RUN] Would reply in {}: {:?}", chat_id, reply.plain_text());
            return;
        }

        let parts = match reply {
            Reply::Text(text) => vec![MessagePart::Text(text.clone())],
            Reply::Chain(parts) => parts.clone(),
        };

        let mut quote = reply_to_message_id;
        for part in &parts {
            let sent = match part {
                MessagePart::Text(text) => self.send_message(chat_id, text, quote).await,
                MessagePart::Image(image_ref) => self.send_image(chat_id, image_ref, quote).await,
            };
            // Errors are already logged; keep sending the remaining parts.
            if sent.is_ok() {
                quote = None;
            }
        }
    }
}


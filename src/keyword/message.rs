//! Inbound message and outbound reply types shared with the host.

/// One piece of a message's content, in the order the host delivered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Text(String),
    /// Image reference: a URL or a host file id.
    Image(String),
}

/// A group message as seen by the engine.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub group_id: String,
    pub sender_id: String,
    /// Plain text of the message (caption for photos).
    pub text: String,
    pub parts: Vec<MessagePart>,
}

impl IncomingMessage {
    /// Build a text-only message.
    pub fn text(group_id: impl Into<String>, sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let parts = if text.is_empty() {
            vec![]
        } else {
            vec![MessagePart::Text(text.clone())]
        };
        Self {
            group_id: group_id.into(),
            sender_id: sender_id.into(),
            text,
            parts,
        }
    }

    /// Attach an image reference after the existing parts.
    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.parts.push(MessagePart::Image(image_ref.into()));
        self
    }

    /// Image references in message order.
    pub fn image_refs(&self) -> Vec<String> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Image(image_ref) => Some(image_ref.clone()),
                MessagePart::Text(_) => None,
            })
            .collect()
    }
}

/// What the engine asks the host to send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Chain(Vec<MessagePart>),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// All text carried by this reply, joined by newlines.
    pub fn plain_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Chain(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    MessagePart::Text(text) => Some(text.as_str()),
                    MessagePart::Image(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

//! Two-step recording dialogue: question first, then answer.
//!
//! Only one session exists per process. While it is active, messages from
//! anyone other than the (group, sender) that started it are ignored.

use crate::keyword::message::IncomingMessage;
use crate::keyword::store::TriggerContent;

/// Command word that starts a recording.
pub const START_RECORDING: &str = "开始记录";

/// The (group, sender) pair a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOwner {
    pub group_id: String,
    pub sender_id: String,
}

impl SessionOwner {
    pub fn new(group_id: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            sender_id: sender_id.into(),
        }
    }

    pub fn matches(&self, msg: &IncomingMessage) -> bool {
        self.group_id == msg.group_id && self.sender_id == msg.sender_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RecordingSession {
    #[default]
    Idle,
    AwaitingQuestion {
        owner: SessionOwner,
    },
    AwaitingAnswer {
        owner: SessionOwner,
        question: TriggerContent,
    },
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Same owner already recording; nothing changed.
    AlreadyRecording,
    /// Someone else is recording; nothing changed.
    Busy,
}

/// Result of feeding a message to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStep {
    /// No session is active.
    Inactive,
    /// The message is not from the session owner.
    NotOwner,
    /// The owner repeated the start command before giving a question.
    Ignored,
    QuestionCaptured,
    /// Both halves captured. The session is back to idle.
    Completed {
        owner: SessionOwner,
        question: TriggerContent,
        answer: TriggerContent,
    },
}

impl RecordingSession {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn owner(&self) -> Option<&SessionOwner> {
        match self {
            Self::Idle => None,
            Self::AwaitingQuestion { owner } | Self::AwaitingAnswer { owner, .. } => Some(owner),
        }
    }

    /// Begin recording for `owner` unless a session is already active.
    pub fn start(&mut self, owner: SessionOwner) -> StartOutcome {
        match self.owner() {
            Some(current) if *current == owner => StartOutcome::AlreadyRecording,
            Some(_) => StartOutcome::Busy,
            None => {
                *self = Self::AwaitingQuestion { owner };
                StartOutcome::Started
            }
        }
    }

    /// Advance the dialogue with `msg`.
    pub fn feed(&mut self, msg: &IncomingMessage) -> SessionStep {
        match self.owner() {
            None => return SessionStep::Inactive,
            Some(owner) if !owner.matches(msg) => return SessionStep::NotOwner,
            Some(_) => {}
        }

        let captured = TriggerContent::new(msg.text.clone(), msg.image_refs());
        match std::mem::take(self) {
            Self::AwaitingQuestion { owner } => {
                if msg.text.trim() == START_RECORDING {
                    *self = Self::AwaitingQuestion { owner };
                    return SessionStep::Ignored;
                }
                *self = Self::AwaitingAnswer {
                    owner,
                    question: captured,
                };
                SessionStep::QuestionCaptured
            }
            Self::AwaitingAnswer { owner, question } => SessionStep::Completed {
                owner,
                question,
                answer: captured,
            },
            Self::Idle => SessionStep::Inactive,
        }
    }

    /// Put a completed pair's question back so the owner can resend the answer.
    pub fn restore(&mut self, owner: SessionOwner, question: TriggerContent) {
        *self = Self::AwaitingAnswer { owner, question };
    }
}

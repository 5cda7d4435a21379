//! Keyword engine - routes group messages to commands, recording or auto-reply.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::keyword::allowlist::{normalize_group_id, AllowList};
use crate::keyword::commands::{self, Command};
use crate::keyword::message::{IncomingMessage, Reply};
use crate::keyword::responder;
use crate::keyword::session::{RecordingSession, SessionOwner, SessionStep, StartOutcome};
use crate::keyword::store::{StoreError, TriggerRepository};

/// The keyword engine.
pub struct KeywordEngine {
    allow_list: Arc<AllowList>,
    triggers: TriggerRepository,
    session: Mutex<RecordingSession>,
}

impl KeywordEngine {
    pub fn new(allow_list: Arc<AllowList>, triggers: TriggerRepository) -> Self {
        Self {
            allow_list,
            triggers,
            session: Mutex::new(RecordingSession::default()),
        }
    }

    /// Handle one inbound group message. Returns the reply to send, if any.
    ///
    /// While a session is recording, the owner's messages are captured as the
    /// question or answer even when they start with a command word. Only
    /// `开始记录` keeps its command meaning.
    pub async fn handle(&self, msg: &IncomingMessage) -> Result<Option<Reply>, StoreError> {
        match Command::parse(&msg.text) {
            None => self.handle_message(msg).await,
            Some(Command::StartRecording) => self.handle_command(Command::StartRecording, msg).await,
            Some(command) => {
                if self.allow_list.is_allowed(&msg.group_id).await {
                    let mut session = self.session.lock().await;
                    if session.owner().is_some_and(|owner| owner.matches(msg)) {
                        return self.record(&mut session, msg).await;
                    }
                }
                self.handle_command(command, msg).await
            }
        }
    }

    async fn handle_command(&self, command: Command, msg: &IncomingMessage) -> Result<Option<Reply>, StoreError> {
        debug!("Command {:?} from {} in {}", command, msg.sender_id, msg.group_id);
        if command.requires_allowed_group() && !self.allow_list.is_allowed(&msg.group_id).await {
            return Ok(None);
        }

        match command {
            Command::StartRecording => self.start_recording(msg).await,
            Command::ListTriggers => self.list_triggers(&msg.group_id).await,
            Command::DeleteTrigger(arg) => self.delete_trigger(&msg.group_id, arg).await,
            Command::AddGroup(arg) => self.add_group(arg).await,
            Command::RemoveGroup(arg) => self.remove_group(arg).await,
            Command::ListGroups => {
                let groups = self.allow_list.list().await;
                Ok(Some(Reply::text(commands::group_listing(&groups))))
            }
        }
    }

    async fn handle_message(&self, msg: &IncomingMessage) -> Result<Option<Reply>, StoreError> {
        if !self.allow_list.is_allowed(&msg.group_id).await {
            return Ok(None);
        }

        let mut session = self.session.lock().await;
        if session.is_active() {
            return self.record(&mut session, msg).await;
        }
        drop(session);

        let store = self.triggers.load(&msg.group_id).await?;
        Ok(responder::respond(&store, &msg.text))
    }

    async fn start_recording(&self, msg: &IncomingMessage) -> Result<Option<Reply>, StoreError> {
        let mut session = self.session.lock().await;
        let owner = SessionOwner::new(msg.group_id.clone(), msg.sender_id.clone());
        match session.start(owner) {
            StartOutcome::Started => {
                // Make sure the group's file exists before the dialogue begins.
                if let Err(e) = self.triggers.load(&msg.group_id).await {
                    *session = RecordingSession::Idle;
                    return Err(e);
                }
                info!("🎙️ Recording started by {} in {}", msg.sender_id, msg.group_id);
                Ok(Some(Reply::text(commands::RECORDING_STARTED)))
            }
            StartOutcome::AlreadyRecording => {
                debug!("{} in {} is already recording", msg.sender_id, msg.group_id);
                Ok(None)
            }
            StartOutcome::Busy => {
                debug!("Recording busy, dropping start from {} in {}", msg.sender_id, msg.group_id);
                Ok(None)
            }
        }
    }

    async fn record(&self, session: &mut RecordingSession, msg: &IncomingMessage) -> Result<Option<Reply>, StoreError> {
        match session.feed(msg) {
            SessionStep::Inactive | SessionStep::NotOwner | SessionStep::Ignored => Ok(None),
            SessionStep::QuestionCaptured => {
                info!("Question captured in {}: {:?}", msg.group_id, msg.text);
                Ok(Some(Reply::text(commands::QUESTION_RECORDED)))
            }
            SessionStep::Completed { owner, question, answer } => {
                match self
                    .triggers
                    .add_trigger(&owner.group_id, question.clone(), answer)
                    .await
                {
                    Ok(id) => {
                        info!("✅ Recorded trigger {} in {}", id, owner.group_id);
                        Ok(Some(Reply::text(commands::ANSWER_RECORDED)))
                    }
                    Err(e) => {
                        warn!("Keeping recording open for {} after failed save", owner.sender_id);
                        session.restore(owner, question);
                        Err(e)
                    }
                }
            }
        }
    }

    async fn list_triggers(&self, group: &str) -> Result<Option<Reply>, StoreError> {
        let store = self.triggers.load(group).await?;
        Ok(Some(Reply::text(commands::trigger_listing(&store.questions()))))
    }

    async fn delete_trigger(&self, group: &str, keyword: Option<String>) -> Result<Option<Reply>, StoreError> {
        let Some(keyword) = keyword else {
            return Ok(Some(Reply::text(commands::DELETE_TRIGGER_USAGE)));
        };

        let reply = if self.triggers.remove_by_question_text(group, &keyword).await? {
            commands::trigger_deleted(&keyword)
        } else {
            commands::trigger_not_found(&keyword)
        };
        Ok(Some(Reply::text(reply)))
    }

    async fn add_group(&self, arg: Option<String>) -> Result<Option<Reply>, StoreError> {
        let Some(group) = arg.as_deref().and_then(normalize_group_id) else {
            return Ok(Some(Reply::text(commands::ADD_GROUP_USAGE)));
        };

        let reply = if self.allow_list.add(&group).await? {
            commands::group_added(&group)
        } else {
            commands::group_already_allowed(&group)
        };
        Ok(Some(Reply::text(reply)))
    }

    async fn remove_group(&self, arg: Option<String>) -> Result<Option<Reply>, StoreError> {
        let Some(group) = arg.as_deref().and_then(normalize_group_id) else {
            return Ok(Some(Reply::text(commands::REMOVE_GROUP_USAGE)));
        };

        if !self.allow_list.remove(&group).await? {
            return Ok(Some(Reply::text(commands::group_not_allowed(&group))));
        }

        self.triggers.delete_store_file(&group).await?;

        // A session in a group that just lost access can never finish.
        let mut session = self.session.lock().await;
        if session.owner().is_some_and(|owner| owner.group_id == group) {
            info!("Dropping recording session in removed group {}", group);
            *session = RecordingSession::Idle;
        }

        Ok(Some(Reply::text(commands::group_removed(&group))))
    }
}

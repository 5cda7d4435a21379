//! Auto-reply: match incoming text against stored questions.

use regex::Regex;
use tracing::{debug, warn};

use crate::keyword::message::{MessagePart, Reply};
use crate::keyword::store::{Trigger, TriggerStore};

/// Wildcard character users put in questions.
pub const WILDCARD: char = '%';

/// Build the search pattern for a question.
///
/// The question is a regex in which each `%` matches any run of characters,
/// newlines included. The pattern is not anchored.
pub fn question_pattern(question: &str) -> Result<Regex, regex::Error> {
    Regex::new(&question.replace(WILDCARD, "(?s:.*)"))
}

/// Compose the reply for a matched trigger: answer text, then its images.
pub fn reply_for(trigger: &Trigger) -> Option<Reply> {
    let answer = &trigger.answer;
    let mut parts = Vec::with_capacity(answer.images.len() + 1);
    if !answer.text.is_empty() {
        parts.push(MessagePart::Text(answer.text.clone()));
    }
    parts.extend(answer.images.iter().cloned().map(MessagePart::Image));

    if parts.is_empty() {
        None
    } else {
        Some(Reply::Chain(parts))
    }
}

/// Find the first trigger in store order whose question matches `text`.
pub fn find_match<'a>(store: &'a TriggerStore, text: &str) -> Option<&'a Trigger> {
    store.iter().find(|trigger| match question_pattern(&trigger.question.text) {
        Ok(pattern) => pattern.is_match(text),
        Err(e) => {
            warn!("Skipping trigger {} with unusable pattern: {e}", trigger.id);
            false
        }
    })
}

/// Reply to `text` using the first matching trigger, if any.
pub fn respond(store: &TriggerStore, text: &str) -> Option<Reply> {
    let trigger = find_match(store, text)?;
    debug!("Message matched trigger {} ({:?})", trigger.id, trigger.question.text);
    reply_for(trigger)
}

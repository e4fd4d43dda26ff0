// ABOUTME: Trigger command recognition for chat messages
// ABOUTME: Extracts the invoking user and free-text argument from `!clip ...` lines

use crate::irc::{self, ChatMessage, IrcLine};

/// A recognized trigger, ready for the cooldown gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Nick of the user who typed the command; never empty
    pub invoker: String,
    /// Text after the trigger, trimmed; may be empty
    pub argument: String,
}

impl TriggerEvent {
    pub fn title(&self) -> Option<&str> {
        if self.argument.is_empty() {
            None
        } else {
            Some(&self.argument)
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    trigger: String,
}

impl CommandRecognizer {
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into().trim().to_string(),
        }
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    /// Classify a chat message; anything that is not a well-formed trigger yields `None`
    pub fn recognize(&self, message: &ChatMessage) -> Option<TriggerEvent> {
        let invoker = message.sender()?;
        let argument = self.match_trigger(&message.body)?;

        Some(TriggerEvent {
            invoker: invoker.to_string(),
            argument,
        })
    }

    /// Convenience for raw lines straight off the wire
    pub fn recognize_line(&self, line: &str) -> Option<TriggerEvent> {
        match irc::parse_line(line) {
            IrcLine::ChatMessage(message) => self.recognize(&message),
            _ => None,
        }
    }

    /// Case-insensitive prefix match; the trigger must end at whitespace or end of body
    fn match_trigger(&self, body: &str) -> Option<String> {
        if self.trigger.is_empty() {
            return None;
        }
        let body = body.trim_start();
        let head = body.get(..self.trigger.len())?;
        if !head.eq_ignore_ascii_case(&self.trigger) {
            return None;
        }

        let tail = &body[self.trigger.len()..];
        if !tail.is_empty() && !tail.starts_with(char::is_whitespace) {
            // `!clipboard` is a different command
            return None;
        }
        Some(tail.trim().to_string())
    }
}

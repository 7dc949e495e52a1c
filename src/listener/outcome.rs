use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::callback::CallbackError;

/// What a registration ends with. Handed to the callback exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerOutcome {
    /// A response file was found and parsed.
    Matched { file: PathBuf, content: Value },
    /// A response file was found but could not be read as JSON.
    Malformed { file: PathBuf, reason: String },
    /// No response file appeared in time.
    TimedOut { request_id: String, waited: Duration },
}

impl ListenerOutcome {
    pub fn content(&self) -> Option<&Value> {
        match self {
            ListenerOutcome::Matched { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ListenerOutcome::TimedOut { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Watching,
    /// File claimed, callback running.
    Matched,
    Delivered,
    TimedOut,
    Cancelled,
}

impl RegistrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RegistrationState::Delivered | RegistrationState::TimedOut | RegistrationState::Cancelled
        )
    }
}

#[async_trait]
pub trait FileHandlerCallback: Send + Sync {
    async fn handle(&self, outcome: ListenerOutcome) -> Result<(), CallbackError>;
}

/// Forwards outcomes into a channel.
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    sender: mpsc::UnboundedSender<ListenerOutcome>,
}

impl ChannelCallback {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ListenerOutcome>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl FileHandlerCallback for ChannelCallback {
    async fn handle(&self, outcome: ListenerOutcome) -> Result<(), CallbackError> {
        self.sender
            .send(outcome)
            .map_err(|_| CallbackError::Handler("outcome receiver dropped".to_string()))
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use super::handlers::{
    CheckInactivityHandler, GitCredsHandler, ImageHandler, LibInstallHandler, LibListHandler,
    ResourceStatusHandler, ResponseHandler, ReuploadKeyHandler,
};
use super::CallbackError;
use crate::model::DockerAction;

/// Action to handler table, built once at startup.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<DockerAction, Arc<dyn ResponseHandler>>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry covering every [`DockerAction`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        let resource: Arc<dyn ResponseHandler> = Arc::new(ResourceStatusHandler);

        for action in [
            DockerAction::Create,
            DockerAction::Start,
            DockerAction::Stop,
            DockerAction::Terminate,
            DockerAction::Status,
            DockerAction::ReconfigureSpark,
            DockerAction::Describe,
            DockerAction::Run,
        ] {
            registry.register(action, Arc::clone(&resource));
        }
        registry.register(DockerAction::CreateImage, Arc::new(ImageHandler));
        registry.register(DockerAction::LibInstall, Arc::new(LibInstallHandler));
        registry.register(DockerAction::LibList, Arc::new(LibListHandler));
        registry.register(DockerAction::GitCreds, Arc::new(GitCredsHandler));
        registry.register(DockerAction::ReuploadKey, Arc::new(ReuploadKeyHandler));
        registry.register(DockerAction::CheckInactivity, Arc::new(CheckInactivityHandler));
        registry
    }

    /// Replace the handler for `action`.
    pub fn register(&mut self, action: DockerAction, handler: Arc<dyn ResponseHandler>) {
        self.handlers.insert(action, handler);
    }

    pub fn get(&self, action: DockerAction) -> Result<Arc<dyn ResponseHandler>, CallbackError> {
        self.handlers
            .get(&action)
            .cloned()
            .ok_or_else(|| CallbackError::NoHandler(action.to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

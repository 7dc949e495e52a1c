use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::client::StatusSink;
use super::handlers::{HandlerContext, ResponseHandler};
use super::CallbackError;
use crate::listener::{FileHandlerCallback, ListenerOutcome};

/// Listener callback that turns an outcome into a status update and sends it.
pub struct StatusCallback {
    handler: Arc<dyn ResponseHandler>,
    context: HandlerContext,
    sink: Arc<dyn StatusSink>,
}

impl StatusCallback {
    pub fn new(
        handler: Arc<dyn ResponseHandler>,
        context: HandlerContext,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            handler,
            context,
            sink,
        }
    }

    pub fn context(&self) -> &HandlerContext {
        &self.context
    }
}

#[async_trait]
impl FileHandlerCallback for StatusCallback {
    async fn handle(&self, outcome: ListenerOutcome) -> Result<(), CallbackError> {
        let update = self.handler.handle(&self.context, &outcome)?;
        info!(
            "Reporting {} for {} ({}) via {}",
            update.body["status"].as_str().unwrap_or("unknown"),
            self.context.request_id,
            self.context.action,
            self.handler.name()
        );

        if let Err(e) = self.sink.send(&update).await {
            warn!(
                "Status update for {} was not delivered: {}",
                self.context.request_id, e
            );
            return Err(e);
        }
        Ok(())
    }
}

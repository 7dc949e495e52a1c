//! Translation of listener outcomes into status updates for self-service.
//!
//! A [`HandlerRegistry`] maps every [`DockerAction`](crate::model::DockerAction)
//! to a [`ResponseHandler`]. [`StatusCallback`] ties a handler and the
//! request context to a [`StatusSink`] and is what gets registered with the
//! folder listener.

mod client;
mod dispatch;
mod dto;
mod handlers;
mod registry;
mod response;

use thiserror::Error;

pub use client::{SelfServiceClient, StatusSink};
pub use dispatch::StatusCallback;
pub use dto::{
    CheckInactivityStatusDto, ComputationalStatusDto, EdgeStatusDto, ExploratoryStatusDto,
    ImageStatusDto, LibInstallEntry, LibInstallStatusDto, LibListEntry, LibListStatusDto,
    ResourceStatusDto, StatusBase,
};
pub use handlers::{
    CheckInactivityHandler, GitCredsHandler, HandlerContext, ImageHandler, LibInstallHandler,
    LibListHandler, ResourceStatusHandler, ResponseHandler, ReuploadKeyHandler, StatusUpdate,
};
pub use registry::HandlerRegistry;
pub use response::{ContainerResponse, ResponseStatus};

/// Self-service paths, relative to the configured base URL.
pub mod endpoints {
    pub const EXPLORATORY_STATUS: &str =
        "/api/infrastructure_provision/exploratory_environment/status";
    pub const COMPUTATIONAL_STATUS: &str =
        "/api/infrastructure_provision/computational_resources/status";
    pub const EDGE_STATUS: &str = "/api/infrastructure/edge/status";
    pub const IMAGE_STATUS: &str = "/api/infrastructure_provision/image/image_status";
    pub const LIB_INSTALL_STATUS: &str = "/api/infrastructure_provision/library/lib_status";
    pub const LIB_LIST_UPDATE: &str = "/api/infrastructure_provision/library/update_lib_list";
    pub const GIT_CREDS_STATUS: &str = "/api/user/git_creds/status";
    pub const BACKUP_STATUS: &str = "/api/infrastructure/backup/status";
    pub const REUPLOAD_KEY_CALLBACK: &str = "/api/infrastructure/reupload_key/callback";
    pub const CHECK_INACTIVITY_CALLBACK: &str = "/api/infrastructure/inactivity/callback";
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Failed to deliver status to {uri}: {source}")]
    Delivery {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Self-service rejected status update to {uri} with {status}: {body}")]
    Status {
        status: u16,
        uri: String,
        body: String,
    },

    #[error("Invalid self-service URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("No handler registered for action {0}")]
    NoHandler(String),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Failed to serialize status update: {0}")]
    Serialization(#[from] serde_json::Error),
}

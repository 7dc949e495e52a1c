//! Domain types shared by the command builder, the executor and the
//! callback handlers.

pub mod action;
pub mod cloud;
pub mod dto;
pub mod status;

pub use action::{DockerAction, ResourceType};
pub use cloud::{
    AwsCloudSettings, AzureCloudSettings, CertificateSettings, CloudProvider, CloudSettings,
    GcpCloudSettings, LdapSettings,
};
pub use dto::{
    ComputationalBody, ExploratoryBody, GitCredential, GitCredsBody, ImageBody, LibInstallBody,
    LibraryRef, ResourceBaseDto,
};
pub use status::{LibStatus, UserInstanceStatus};

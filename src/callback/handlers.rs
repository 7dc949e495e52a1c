use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use super::dto::{
    CheckInactivityStatusDto, ComputationalStatusDto, EdgeStatusDto, ExploratoryStatusDto,
    ImageStatusDto, LibInstallEntry, LibInstallStatusDto, LibListEntry, LibListStatusDto,
    ResourceStatusDto, StatusBase,
};
use super::endpoints;
use super::response::ContainerResponse;
use super::CallbackError;
use crate::listener::ListenerOutcome;
use crate::model::{DockerAction, LibStatus, LibraryRef, ResourceType, UserInstanceStatus};

/// What a handler knows about the request besides the response file.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerContext {
    pub request_id: String,
    pub user: String,
    pub project: Option<String>,
    pub action: DockerAction,
    pub resource: ResourceType,
    pub exploratory_name: Option<String>,
    pub computational_name: Option<String>,
    pub image_name: Option<String>,
    pub libs: Vec<LibraryRef>,
}

impl HandlerContext {
    pub fn new(
        request_id: impl Into<String>,
        user: impl Into<String>,
        action: DockerAction,
        resource: ResourceType,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user: user.into(),
            project: None,
            action,
            resource,
            exploratory_name: None,
            computational_name: None,
            image_name: None,
            libs: Vec::new(),
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_exploratory(mut self, name: impl Into<String>) -> Self {
        self.exploratory_name = Some(name.into());
        self
    }

    pub fn with_computational(mut self, name: impl Into<String>) -> Self {
        self.computational_name = Some(name.into());
        self
    }

    pub fn with_image(mut self, name: impl Into<String>) -> Self {
        self.image_name = Some(name.into());
        self
    }

    pub fn with_libs(mut self, libs: Vec<LibraryRef>) -> Self {
        self.libs = libs;
        self
    }

    fn exploratory(&self) -> Result<String, CallbackError> {
        required(&self.exploratory_name, "exploratory name")
    }

    fn computational(&self) -> Result<String, CallbackError> {
        required(&self.computational_name, "computational name")
    }

    fn base(&self, status: &str, error_message: Option<String>) -> StatusBase {
        StatusBase {
            request_id: self.request_id.clone(),
            user: self.user.clone(),
            project: self.project.clone(),
            status: status.to_string(),
            error_message,
            uptime: Utc::now(),
        }
    }
}

fn required(value: &Option<String>, what: &str) -> Result<String, CallbackError> {
    value
        .clone()
        .ok_or_else(|| CallbackError::Handler(format!("request has no {what}")))
}

/// Where a status update goes and what it says.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub uri: &'static str,
    pub body: Value,
}

impl StatusUpdate {
    fn new<T: Serialize>(uri: &'static str, dto: &T) -> Result<Self, CallbackError> {
        Ok(Self {
            uri,
            body: serde_json::to_value(dto)?,
        })
    }
}

pub trait ResponseHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fail unless `ctx` carries everything [`handle`](Self::handle) needs
    /// to report any outcome, a timeout included.
    fn check(&self, _ctx: &HandlerContext) -> Result<(), CallbackError> {
        Ok(())
    }

    fn handle(
        &self,
        ctx: &HandlerContext,
        outcome: &ListenerOutcome,
    ) -> Result<StatusUpdate, CallbackError>;
}

/// Outcome reduced to a status, an optional error and the result object.
struct Evaluation<'a> {
    status: UserInstanceStatus,
    error_message: Option<String>,
    result: Option<&'a Value>,
}

impl<'a> Evaluation<'a> {
    fn of(action: DockerAction, outcome: &'a ListenerOutcome) -> Self {
        match outcome {
            ListenerOutcome::Matched { content, .. } => {
                let response = ContainerResponse::new(content);
                let (status, error_message) = response.instance_status(action);
                Self {
                    status,
                    error_message,
                    result: response.result(),
                }
            }
            ListenerOutcome::Malformed { reason, .. } => Self {
                status: UserInstanceStatus::Failed,
                error_message: Some(format!("Malformed response file: {reason}")),
                result: None,
            },
            ListenerOutcome::TimedOut { waited, .. } => Self {
                status: UserInstanceStatus::Failed,
                error_message: Some(format!("Request timed out after {waited:?}")),
                result: None,
            },
        }
    }

    fn failed(&self) -> bool {
        self.status == UserInstanceStatus::Failed
    }

    fn result_str(&self, keys: &[&str]) -> Option<String> {
        let result = self.result?;
        keys.iter()
            .find_map(|key| result.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    }

    fn result_value(&self, key: &str) -> Option<Value> {
        self.result?.get(key).cloned()
    }
}

/// Lifecycle actions on edge nodes, notebooks, clusters and backups.
#[derive(Debug, Default)]
pub struct ResourceStatusHandler;

impl ResponseHandler for ResourceStatusHandler {
    fn name(&self) -> &'static str {
        "resource_status"
    }

    fn check(&self, ctx: &HandlerContext) -> Result<(), CallbackError> {
        match ctx.resource {
            ResourceType::Exploratory => ctx.exploratory().map(drop),
            ResourceType::Computational | ResourceType::ComputationalService => {
                ctx.exploratory()?;
                ctx.computational().map(drop)
            }
            ResourceType::Edge | ResourceType::Backup => Ok(()),
        }
    }

    fn handle(
        &self,
        ctx: &HandlerContext,
        outcome: &ListenerOutcome,
    ) -> Result<StatusUpdate, CallbackError> {
        let eval = Evaluation::of(ctx.action, outcome);
        let base = ctx.base(eval.status.as_str(), eval.error_message.clone());

        match ctx.resource {
            ResourceType::Edge => StatusUpdate::new(
                endpoints::EDGE_STATUS,
                &EdgeStatusDto {
                    base,
                    edge_info: eval.result.cloned(),
                },
            ),
            ResourceType::Exploratory => StatusUpdate::new(
                endpoints::EXPLORATORY_STATUS,
                &ExploratoryStatusDto {
                    base,
                    exploratory_name: ctx.exploratory()?,
                    exploratory_id: eval.result_str(&["instance_id", "notebook_name"]),
                    exploratory_url: eval.result_value("exploratory_url"),
                    private_ip: eval.result_str(&["ip", "private_ip"]),
                },
            ),
            ResourceType::Computational | ResourceType::ComputationalService => {
                let id_keys: &[&str] = if ctx.resource == ResourceType::ComputationalService {
                    &["cluster_id", "instance_id"]
                } else {
                    &["instance_id", "cluster_id"]
                };
                StatusUpdate::new(
                    endpoints::COMPUTATIONAL_STATUS,
                    &ComputationalStatusDto {
                        base,
                        exploratory_name: ctx.exploratory()?,
                        computational_name: ctx.computational()?,
                        computational_id: eval.result_str(id_keys),
                        computational_url: eval.result_value("computational_url"),
                    },
                )
            }
            ResourceType::Backup => {
                let status = if eval.failed() { "failed" } else { "created" };
                StatusUpdate::new(
                    endpoints::BACKUP_STATUS,
                    &ResourceStatusDto {
                        base: ctx.base(status, eval.error_message.clone()),
                        resource_name: eval.result_str(&["backup_file", "file"]),
                        details: eval.result.cloned(),
                    },
                )
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ImageHandler;

impl ResponseHandler for ImageHandler {
    fn name(&self) -> &'static str {
        "image"
    }

    fn check(&self, ctx: &HandlerContext) -> Result<(), CallbackError> {
        ctx.exploratory()?;
        required(&ctx.image_name, "image name").map(drop)
    }

    fn handle(
        &self,
        ctx: &HandlerContext,
        outcome: &ListenerOutcome,
    ) -> Result<StatusUpdate, CallbackError> {
        let eval = Evaluation::of(ctx.action, outcome);
        StatusUpdate::new(
            endpoints::IMAGE_STATUS,
            &ImageStatusDto {
                base: ctx.base(eval.status.as_str(), eval.error_message.clone()),
                exploratory_name: ctx.exploratory()?,
                image_name: required(&ctx.image_name, "image name")?,
                image_info: eval.result.cloned(),
            },
        )
    }
}

/// Per-library results of an install. A failed run marks every requested
/// library failed.
#[derive(Debug, Default)]
pub struct LibInstallHandler;

impl LibInstallHandler {
    fn entries(ctx: &HandlerContext, eval: &Evaluation<'_>) -> Vec<LibInstallEntry> {
        if eval.failed() {
            return ctx
                .libs
                .iter()
                .map(|lib| LibInstallEntry {
                    group: lib.group.clone(),
                    name: lib.name.clone(),
                    version: lib.version.clone(),
                    status: LibStatus::Failed,
                    error_message: eval.error_message.clone(),
                })
                .collect();
        }

        match eval.result.and_then(|r| r.get("libs")).and_then(Value::as_array) {
            Some(reported) => reported
                .iter()
                .filter_map(|lib| {
                    let text = |key: &str| lib.get(key).and_then(Value::as_str);
                    Some(LibInstallEntry {
                        group: text("group").unwrap_or_default().to_string(),
                        name: text("name")?.to_string(),
                        version: text("version").map(str::to_string),
                        status: text("status")
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(LibStatus::Installed),
                        error_message: text("error_message").map(str::to_string),
                    })
                })
                .collect(),
            None => ctx
                .libs
                .iter()
                .map(|lib| LibInstallEntry {
                    group: lib.group.clone(),
                    name: lib.name.clone(),
                    version: lib.version.clone(),
                    status: LibStatus::Installed,
                    error_message: None,
                })
                .collect(),
        }
    }
}

impl ResponseHandler for LibInstallHandler {
    fn name(&self) -> &'static str {
        "lib_install"
    }

    fn check(&self, ctx: &HandlerContext) -> Result<(), CallbackError> {
        ctx.exploratory().map(drop)
    }

    fn handle(
        &self,
        ctx: &HandlerContext,
        outcome: &ListenerOutcome,
    ) -> Result<StatusUpdate, CallbackError> {
        let eval = Evaluation::of(ctx.action, outcome);
        StatusUpdate::new(
            endpoints::LIB_INSTALL_STATUS,
            &LibInstallStatusDto {
                base: ctx.base(eval.status.as_str(), eval.error_message.clone()),
                exploratory_name: ctx.exploratory()?,
                computational_name: ctx.computational_name.clone(),
                libs: Self::entries(ctx, &eval),
            },
        )
    }
}

/// Installed-library listing, reported either as an array of
/// `{group, name, version}` or as `{group: {name: version}}`.
#[derive(Debug, Default)]
pub struct LibListHandler;

impl LibListHandler {
    fn entries(libs: Option<&Value>) -> Vec<LibListEntry> {
        let version_of = |v: &Value| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        match libs {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|lib| {
                    Some(LibListEntry {
                        group: lib.get("group")?.as_str()?.to_string(),
                        name: lib.get("name")?.as_str()?.to_string(),
                        version: lib.get("version").map(version_of).unwrap_or_default(),
                    })
                })
                .collect(),
            Some(Value::Object(groups)) => groups
                .iter()
                .filter_map(|(group, libs)| Some((group, libs.as_object()?)))
                .flat_map(|(group, libs)| {
                    libs.iter().map(move |(name, version)| LibListEntry {
                        group: group.clone(),
                        name: name.clone(),
                        version: version_of(version),
                    })
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl ResponseHandler for LibListHandler {
    fn name(&self) -> &'static str {
        "lib_list"
    }

    fn check(&self, ctx: &HandlerContext) -> Result<(), CallbackError> {
        ctx.exploratory().map(drop)
    }

    fn handle(
        &self,
        ctx: &HandlerContext,
        outcome: &ListenerOutcome,
    ) -> Result<StatusUpdate, CallbackError> {
        let eval = Evaluation::of(ctx.action, outcome);
        let libs = if eval.failed() {
            Vec::new()
        } else {
            Self::entries(eval.result.and_then(|r| r.get("libs")))
        };
        StatusUpdate::new(
            endpoints::LIB_LIST_UPDATE,
            &LibListStatusDto {
                base: ctx.base(eval.status.as_str(), eval.error_message.clone()),
                exploratory_name: ctx.exploratory()?,
                computational_name: ctx.computational_name.clone(),
                libs,
            },
        )
    }
}

#[derive(Debug, Default)]
pub struct GitCredsHandler;

impl ResponseHandler for GitCredsHandler {
    fn name(&self) -> &'static str {
        "git_creds"
    }

    fn check(&self, ctx: &HandlerContext) -> Result<(), CallbackError> {
        ctx.exploratory().map(drop)
    }

    fn handle(
        &self,
        ctx: &HandlerContext,
        outcome: &ListenerOutcome,
    ) -> Result<StatusUpdate, CallbackError> {
        let eval = Evaluation::of(ctx.action, outcome);
        StatusUpdate::new(
            endpoints::GIT_CREDS_STATUS,
            &ResourceStatusDto {
                base: ctx.base(eval.status.as_str(), eval.error_message.clone()),
                resource_name: Some(ctx.exploratory()?),
                details: None,
            },
        )
    }
}

#[derive(Debug, Default)]
pub struct ReuploadKeyHandler;

impl ResponseHandler for ReuploadKeyHandler {
    fn name(&self) -> &'static str {
        "reupload_key"
    }

    fn handle(
        &self,
        ctx: &HandlerContext,
        outcome: &ListenerOutcome,
    ) -> Result<StatusUpdate, CallbackError> {
        let eval = Evaluation::of(ctx.action, outcome);
        let resource_name = ctx
            .computational_name
            .clone()
            .or_else(|| ctx.exploratory_name.clone())
            .unwrap_or_else(|| ctx.resource.to_string());
        StatusUpdate::new(
            endpoints::REUPLOAD_KEY_CALLBACK,
            &ResourceStatusDto {
                base: ctx.base(eval.status.as_str(), eval.error_message.clone()),
                resource_name: Some(resource_name),
                details: eval.result.cloned(),
            },
        )
    }
}

#[derive(Debug, Default)]
pub struct CheckInactivityHandler;

impl CheckInactivityHandler {
    /// RFC 3339 text or epoch seconds.
    fn last_activity(value: Option<Value>) -> Option<DateTime<Utc>> {
        match value? {
            Value::String(s) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Value::Number(n) => Utc.timestamp_opt(n.as_i64()?, 0).single(),
            _ => None,
        }
    }
}

impl ResponseHandler for CheckInactivityHandler {
    fn name(&self) -> &'static str {
        "check_inactivity"
    }

    fn handle(
        &self,
        ctx: &HandlerContext,
        outcome: &ListenerOutcome,
    ) -> Result<StatusUpdate, CallbackError> {
        let eval = Evaluation::of(ctx.action, outcome);
        StatusUpdate::new(
            endpoints::CHECK_INACTIVITY_CALLBACK,
            &CheckInactivityStatusDto {
                base: ctx.base(eval.status.as_str(), eval.error_message.clone()),
                exploratory_name: ctx.exploratory_name.clone(),
                computational_name: ctx.computational_name.clone(),
                last_activity: Self::last_activity(eval.result_value("last_activity")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;

    fn matched(content: Value) -> ListenerOutcome {
        ListenerOutcome::Matched {
            file: PathBuf::from("/response/notebook_alice_r-1.json"),
            content,
        }
    }

    fn notebook_ctx(action: DockerAction) -> HandlerContext {
        HandlerContext::new("r-1", "alice", action, ResourceType::Exploratory)
            .with_project("proj")
            .with_exploratory("nb1")
    }

    #[test]
    fn test_exploratory_create_success() {
        let outcome = matched(json!({
            "status": "ok",
            "response": {"result": {"ip": "10.1.1.1", "instance_id": "i-123",
                                    "exploratory_url": [{"url": "http://nb"}]}}
        }));
        let update = ResourceStatusHandler
            .handle(&notebook_ctx(DockerAction::Create), &outcome)
            .unwrap();

        assert_eq!(update.uri, endpoints::EXPLORATORY_STATUS);
        assert_eq!(update.body["request_id"], "r-1");
        assert_eq!(update.body["user"], "alice");
        assert_eq!(update.body["project"], "proj");
        assert_eq!(update.body["status"], "running");
        assert_eq!(update.body["exploratory_name"], "nb1");
        assert_eq!(update.body["exploratory_id"], "i-123");
        assert_eq!(update.body["private_ip"], "10.1.1.1");
        assert_eq!(update.body["exploratory_url"][0]["url"], "http://nb");
        assert!(update.body.get("error_message").is_none());
    }

    #[test]
    fn test_timeout_reports_failure() {
        let outcome = ListenerOutcome::TimedOut {
            request_id: "r-1".to_string(),
            waited: Duration::from_secs(2),
        };
        let update = ResourceStatusHandler
            .handle(&notebook_ctx(DockerAction::Stop), &outcome)
            .unwrap();
        assert_eq!(update.body["status"], "failed");
        assert!(update.body["error_message"]
            .as_str()
            .unwrap()
            .contains("timed out"));
    }

    #[test]
    fn test_malformed_reports_failure() {
        let outcome = ListenerOutcome::Malformed {
            file: PathBuf::from("x.json"),
            reason: "expected value at line 1".to_string(),
        };
        let ctx = HandlerContext::new("r-2", "bob", DockerAction::Create, ResourceType::Edge);
        let update = ResourceStatusHandler.handle(&ctx, &outcome).unwrap();
        assert_eq!(update.uri, endpoints::EDGE_STATUS);
        assert_eq!(update.body["status"], "failed");
        assert!(update.body["error_message"]
            .as_str()
            .unwrap()
            .contains("expected value"));
    }

    #[test]
    fn test_computational_requires_names() {
        let ctx = HandlerContext::new(
            "r-3",
            "carol",
            DockerAction::Terminate,
            ResourceType::ComputationalService,
        )
        .with_exploratory("nb1");
        let outcome = matched(json!({"status": "ok"}));
        assert!(matches!(
            ResourceStatusHandler.handle(&ctx, &outcome),
            Err(CallbackError::Handler(_))
        ));

        let ctx = ctx.with_computational("emr1");
        let update = ResourceStatusHandler
            .handle(
                &ctx,
                &matched(json!({"status": "ok", "response": {"result": {"cluster_id": "j-ABC"}}})),
            )
            .unwrap();
        assert_eq!(update.uri, endpoints::COMPUTATIONAL_STATUS);
        assert_eq!(update.body["status"], "terminated");
        assert_eq!(update.body["computational_id"], "j-ABC");
    }

    #[test]
    fn test_lib_install_failure_marks_every_library() {
        let ctx = notebook_ctx(DockerAction::LibInstall).with_libs(vec![
            LibraryRef {
                group: "pip3".to_string(),
                name: "numpy".to_string(),
                version: Some("1.26".to_string()),
            },
            LibraryRef {
                group: "pip3".to_string(),
                name: "pandas".to_string(),
                version: None,
            },
        ]);
        let outcome = matched(json!({"status": "err", "response": {"result": {"error": "no network"}}}));
        let update = LibInstallHandler.handle(&ctx, &outcome).unwrap();

        assert_eq!(update.uri, endpoints::LIB_INSTALL_STATUS);
        let libs = update.body["libs"].as_array().unwrap();
        assert_eq!(libs.len(), 2);
        for lib in libs {
            assert_eq!(lib["status"], "failed");
            assert_eq!(lib["error_message"], "no network");
        }
    }

    #[test]
    fn test_lib_install_uses_reported_statuses() {
        let ctx = notebook_ctx(DockerAction::LibInstall);
        let outcome = matched(json!({"status": "ok", "response": {"result": {"libs": [
            {"group": "pip3", "name": "numpy", "version": "1.26", "status": "installed"},
            {"group": "pip3", "name": "nope", "status": "invalid_name", "error_message": "not found"}
        ]}}}));
        let update = LibInstallHandler.handle(&ctx, &outcome).unwrap();
        let libs = update.body["libs"].as_array().unwrap();
        assert_eq!(libs[0]["status"], "installed");
        assert_eq!(libs[1]["status"], "invalid_name");
        assert_eq!(libs[1]["error_message"], "not found");
    }

    #[test]
    fn test_lib_list_accepts_both_shapes() {
        let ctx = notebook_ctx(DockerAction::LibList);

        let grouped = matched(json!({"status": "ok", "response": {"result": {"libs": {
            "pip3": {"numpy": "1.26", "pandas": "2.1"},
            "os_pkg": {"git": "2.40"}
        }}}}));
        let update = LibListHandler.handle(&ctx, &grouped).unwrap();
        assert_eq!(update.uri, endpoints::LIB_LIST_UPDATE);
        assert_eq!(update.body["libs"].as_array().unwrap().len(), 3);

        let listed = matched(json!({"status": "ok", "response": {"result": {"libs": [
            {"group": "r_pkg", "name": "dplyr", "version": "1.1"}
        ]}}}));
        let update = LibListHandler.handle(&ctx, &listed).unwrap();
        assert_eq!(
            update.body["libs"],
            json!([{"group": "r_pkg", "name": "dplyr", "version": "1.1"}])
        );
    }

    #[test]
    fn test_image_and_inactivity() {
        let ctx = notebook_ctx(DockerAction::CreateImage).with_image("my-image");
        let update = ImageHandler
            .handle(&ctx, &matched(json!({"status": "ok"})))
            .unwrap();
        assert_eq!(update.uri, endpoints::IMAGE_STATUS);
        assert_eq!(update.body["status"], "created");
        assert_eq!(update.body["image_name"], "my-image");

        let ctx = notebook_ctx(DockerAction::CheckInactivity);
        let update = CheckInactivityHandler
            .handle(
                &ctx,
                &matched(json!({"status": "ok", "response": {"result": {"last_activity": 1700000000}}})),
            )
            .unwrap();
        assert_eq!(update.uri, endpoints::CHECK_INACTIVITY_CALLBACK);
        assert_eq!(update.body["last_activity"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_check_requires_names_for_the_resource() {
        let bare = |action, resource| HandlerContext::new("r-1", "alice", action, resource);

        let err = ResourceStatusHandler
            .check(&bare(DockerAction::Create, ResourceType::Exploratory))
            .unwrap_err();
        assert!(err.to_string().contains("exploratory name"));
        assert!(ResourceStatusHandler
            .check(&bare(DockerAction::Create, ResourceType::Exploratory).with_exploratory("nb"))
            .is_ok());

        let dataengine = bare(DockerAction::Start, ResourceType::Computational).with_exploratory("nb");
        let err = ResourceStatusHandler.check(&dataengine).unwrap_err();
        assert!(err.to_string().contains("computational name"));
        assert!(ResourceStatusHandler
            .check(&dataengine.with_computational("spark"))
            .is_ok());

        assert!(ResourceStatusHandler
            .check(&bare(DockerAction::Create, ResourceType::Edge))
            .is_ok());
        assert!(ImageHandler
            .check(&bare(DockerAction::CreateImage, ResourceType::Exploratory).with_exploratory("nb"))
            .is_err());
        assert!(LibListHandler
            .check(&bare(DockerAction::LibList, ResourceType::Exploratory))
            .is_err());
        assert!(CheckInactivityHandler
            .check(&bare(DockerAction::CheckInactivity, ResourceType::Exploratory))
            .is_ok());
    }

    #[test]
    fn test_checked_context_reports_timeout() {
        let ctx = HandlerContext::new("r-1", "alice", DockerAction::Create, ResourceType::Exploratory)
            .with_exploratory("nb");
        ResourceStatusHandler.check(&ctx).unwrap();

        let update = ResourceStatusHandler
            .handle(
                &ctx,
                &ListenerOutcome::TimedOut {
                    request_id: "r-1".to_string(),
                    waited: Duration::from_secs(1),
                },
            )
            .unwrap();
        assert_eq!(update.body["status"], "failed");
    }
}

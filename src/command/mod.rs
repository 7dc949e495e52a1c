//! Command lines handed to provisioning containers: typed construction,
//! the JSON-piping builder, credential redaction and the parser used by the
//! mock execution path.

pub mod builder;
pub mod docker;
pub mod error;
pub mod parser;
pub mod redact;

pub use builder::CommandBuilder;
pub use docker::{CmdCommand, PythonBackupCommand, RunDockerCommand};
pub use error::{BuildError, ParseError};
pub use parser::{CommandParser, ParsedCommand, VolumeMount};
pub use redact::{redact_command, redact_json};

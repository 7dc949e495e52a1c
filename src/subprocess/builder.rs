use std::time::Duration;

use crate::subprocess::ProcessCommand;

/// Builds the `<shell> -c <script>` invocation of one provisioning command.
pub struct ProcessCommandBuilder {
    command: ProcessCommand,
}

impl ProcessCommandBuilder {
    pub fn shell(shell: &str, script: &str) -> Self {
        Self {
            command: ProcessCommand {
                shell: shell.to_string(),
                script: script.to_string(),
                timeout: None,
            },
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.command.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ProcessCommand {
        self.command
    }
}

//! `litmusctl`, run inside the chaoscenter container

use tracing::debug;

use super::Container;
use crate::error::{Error, Result};

pub const LITMUSCTL_BIN: &str = "litmusctl";

/// nginx is always reachable here from inside the container
pub const LITMUSCTL_ENDPOINT: &str = "http://localhost:8185";

pub struct Litmusctl<'a> {
    container: &'a mut dyn Container,
}

impl<'a> Litmusctl<'a> {
    pub fn new(container: &'a mut dyn Container) -> Self {
        Self { container }
    }

    fn run(&mut self, args: &[&str]) -> Result<String> {
        let mut command = vec![LITMUSCTL_BIN.to_string()];
        command.extend(args.iter().map(|a| a.to_string()));
        // args may carry passwords
        debug!("Running {} {}", LITMUSCTL_BIN, args.first().copied().unwrap_or_default());
        let output = self.container.exec(&command)?;
        if !output.success() {
            return Err(Error::LitmusctlError {
                command: args.iter().take(2).copied().collect::<Vec<_>>().join(" "),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    /// Register `username` against the local chaoscenter
    pub fn set_account(&mut self, username: &str, password: &str) -> Result<()> {
        self.run(&[
            "config",
            "set-account",
            "--endpoint",
            LITMUSCTL_ENDPOINT,
            "--username",
            username,
            "--password",
            password,
            "--non-interactive",
        ])
        .map(|_| ())
    }
}

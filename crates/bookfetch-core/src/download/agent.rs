//! External download agent started as a child process (e.g. a browser).

use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use super::DownloadAgent;
use crate::catalog::MirrorLocation;

/// Placeholder replaced by the mirror URL in the command template.
const URL_PLACEHOLDER: &str = "{url}";

/// Runs a configured command line per download, e.g. `["firefox", "--new-tab", "{url}"]`.
/// When no argument contains `{url}` the URL is appended as the last argument.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    argv: Vec<String>,
}

impl CommandAgent {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.first().map_or(true, |p| p.trim().is_empty()) {
            anyhow::bail!("agent_command must name a program");
        }
        Ok(Self { argv })
    }

    fn expand(&self, url: &str) -> Vec<String> {
        let mut args: Vec<String> = self.argv.iter().map(|a| a.replace(URL_PLACEHOLDER, url)).collect();
        if !self.argv.iter().any(|a| a.contains(URL_PLACEHOLDER)) {
            args.push(url.to_string());
        }
        args
    }
}

impl DownloadAgent for CommandAgent {
    fn initiate(&self, location: &MirrorLocation) -> Result<()> {
        let args = self.expand(&location.url);
        let (program, rest) = args.split_first().context("empty agent command")?;
        let mut child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn download agent: {}", program))?;
        tracing::debug!(program = %program, pid = child.id(), url = %location.url, "download agent started");

        // The agent may outlive the download (a browser window); reap it off-thread.
        std::thread::spawn(move || match child.wait() {
            Ok(status) if !status.success() => tracing::warn!("download agent exited with {}", status),
            Ok(_) => {}
            Err(e) => tracing::warn!("download agent wait failed: {}", e),
        });
        Ok(())
    }
}

//! Rendered fetches through a scripted browser
//!
//! The renderer is an escalation path for listing pages whose items are only
//! present after client-side scripts run.

use crate::crawler::FetchError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

/// Produces the final DOM of a page after scripts have run
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &Url) -> Result<String, FetchError>;
}

/// Renderer that runs a headless-browser command and reads the DOM from stdout
///
/// `{url}` in the command line is replaced with the page URL; without a
/// placeholder the URL is appended as the last argument, e.g.
/// `chromium --headless --dump-dom`.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn from_command_line(command: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }

    fn arguments(&self, url: &Url) -> Vec<String> {
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains("{url}") {
                    substituted = true;
                    arg.replace("{url}", url.as_str())
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(url.to_string());
        }
        args
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, url: &Url) -> Result<String, FetchError> {
        let failed = |message: String| FetchError::RenderFailed {
            url: url.to_string(),
            message,
        };

        let child = Command::new(&self.program)
            .args(self.arguments(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(format!("failed to start {}: {}", self.program, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| failed(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            return Err(failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let dom = String::from_utf8_lossy(&output.stdout).into_owned();
        if dom.trim().is_empty() {
            return Err(failed("renderer produced no output".to_string()));
        }
        Ok(dom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://www.rbnz.govt.nz/news").unwrap()
    }

    #[test]
    fn test_url_placeholder_substitution() {
        let renderer =
            CommandRenderer::from_command_line("render --url={url} --wait", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            renderer.arguments(&url()),
            vec!["--url=https://www.rbnz.govt.nz/news", "--wait"]
        );
    }

    #[test]
    fn test_url_appended_without_placeholder() {
        let renderer =
            CommandRenderer::from_command_line("chromium --headless --dump-dom", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            renderer.arguments(&url()),
            vec!["--headless", "--dump-dom", "https://www.rbnz.govt.nz/news"]
        );
        assert!(CommandRenderer::from_command_line("", Duration::from_secs(1)).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output_is_the_dom() {
        let renderer = CommandRenderer::from_command_line("echo", Duration::from_secs(5)).unwrap();
        let dom = renderer.render(&url()).await.unwrap();
        assert_eq!(dom.trim(), "https://www.rbnz.govt.nz/news");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command() {
        let renderer = CommandRenderer::from_command_line("false", Duration::from_secs(5)).unwrap();
        let result = renderer.render(&url()).await;
        assert!(matches!(result, Err(FetchError::RenderFailed { .. })));
    }
}

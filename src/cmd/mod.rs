pub mod app;
pub mod cli_config;
pub mod connection;
pub mod context;
pub mod entra;
pub mod formatting;
pub mod login;
pub mod output;
pub mod progress;
pub mod prompts;
pub mod schema_extension;
pub mod sharepoint;
pub mod teams;
pub mod todo;
pub mod validation;

use crate::config::{ConfigManager, OutputMode};
use crate::error::{M365Error, Result};
use crate::graph::auth::is_app_only_access_token;
use crate::graph::{GRAPH_URL, RequestClient};
use prompts::Prompter;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

/// What a command hands back for printing
pub type CommandOutput = Option<Value>;

/// Stored connection a command runs under, used to persist discovered values
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    pub config: ConfigManager,
    pub name: String,
}

/// Everything a command action needs at runtime
pub struct CommandContext {
    pub client: RequestClient,
    pub prompter: Box<dyn Prompter>,
    pub output: OutputMode,
    /// Ask the user instead of failing when a choice is ambiguous
    pub prompt: bool,
    pub verbose: bool,
    pub graph_url: String,
    pub spo_url: Option<String>,
    pub spo_tenant_id: Option<String>,
    pub working_dir: PathBuf,
    pub connection: Option<ConnectionHandle>,
}

impl CommandContext {
    pub fn new(client: RequestClient, prompter: Box<dyn Prompter>) -> Self {
        Self {
            client,
            prompter,
            output: OutputMode::Json,
            prompt: false,
            verbose: false,
            graph_url: GRAPH_URL.to_string(),
            spo_url: None,
            spo_tenant_id: None,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            connection: None,
        }
    }

    pub fn with_graph_url(mut self, url: impl Into<String>) -> Self {
        self.graph_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_spo_url(mut self, url: impl Into<String>) -> Self {
        self.spo_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_prompt(mut self, prompt: bool) -> Self {
        self.prompt = prompt;
        self
    }

    /// Absolute Microsoft Graph URL for `path` (e.g. `v1.0/me`)
    pub fn graph(&self, path: &str) -> String {
        format!("{}/{}", self.graph_url, path.trim_start_matches('/'))
    }

    /// SharePoint root URL of the active connection
    pub fn spo_url(&self) -> Result<&str> {
        self.spo_url.as_deref().ok_or_else(|| {
            M365Error::CommandError(
                "SharePoint Online site URL not set. Run 'm365 spo set --url https://contoso.sharepoint.com' first"
                    .into(),
            )
        })
    }

    /// Ask for confirmation unless `force` is set
    pub fn confirm_or_force(&self, force: bool, message: &str) -> Result<bool> {
        if force {
            return Ok(true);
        }
        self.prompter.confirm(message)
    }

    /// Pick one of several matches, or fail listing their keys when prompting is off
    pub fn handle_multiple_results_found<T>(
        &self,
        message: &str,
        mut results: Vec<(String, T)>,
    ) -> Result<T> {
        let keys: Vec<String> = results.iter().map(|(key, _)| key.clone()).collect();

        if !self.prompt {
            return Err(M365Error::CommandError(format!(
                "{} Found: {}.",
                message,
                keys.join(", ")
            )));
        }

        let index = self
            .prompter
            .select(&format!("{} Please choose one:", message), &keys)?;
        if index >= results.len() {
            return Err(M365Error::CommandError("No option selected".into()));
        }
        Ok(results.swap_remove(index).1)
    }

    /// Fail when the Graph token is app-only
    pub async fn assert_delegated_access_token(&self) -> Result<()> {
        let token = self.client.access_token(&self.graph_url).await?;
        if is_app_only_access_token(&token) {
            return Err(M365Error::CommandError(
                "This command does not support application permissions.".into(),
            ));
        }
        Ok(())
    }

    /// Persist a value discovered for the active connection
    pub fn remember_spo_tenant_id(&self, tenant_id: &str) {
        if let Some(handle) = &self.connection {
            let result = handle.config.update_connection(&handle.name, |c| {
                c.spo_tenant_id = Some(tenant_id.to_string())
            });
            if let Err(e) = result {
                debug!("Could not cache SharePoint tenant id: {}", e);
            }
        }
    }
}

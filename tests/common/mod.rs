//! Shared helpers for integration tests

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use m365_cli::cmd::CommandContext;
use m365_cli::cmd::prompts::Prompter;
use m365_cli::error::Result;
use m365_cli::graph::auth::StaticTokenProvider;
use m365_cli::graph::{RequestClient, RetryPolicy};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use wiremock::MockServer;

pub const USER_NAME: &str = "john.doe@contoso.onmicrosoft.com";

/// Unsigned JWT carrying `claims`
pub fn jwt(claims: Value) -> String {
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(r#"{"typ":"JWT","alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

pub fn delegated_token() -> String {
    jwt(json!({
        "upn": USER_NAME,
        "scp": "User.Read Chat.ReadWrite Tasks.Read",
        "tid": "7a1e0c1f-6f5b-4f6d-b5cf-6bbc3e4e8a11"
    }))
}

pub fn app_only_token() -> String {
    jwt(json!({
        "idtyp": "app",
        "roles": ["Directory.Read.All"],
        "tid": "7a1e0c1f-6f5b-4f6d-b5cf-6bbc3e4e8a11"
    }))
}

/// Answers prompts from a script and records what was asked
#[derive(Default)]
pub struct ScriptedPrompter {
    confirms: Mutex<VecDeque<bool>>,
    selections: Mutex<VecDeque<usize>>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn confirming(answer: bool) -> Self {
        let prompter = Self::default();
        prompter.confirms.lock().unwrap().push_back(answer);
        prompter
    }

    pub fn selecting(index: usize) -> Self {
        let prompter = Self::default();
        prompter.selections.lock().unwrap().push_back(index);
        prompter
    }

    pub fn asked(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.asked)
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, message: &str) -> Result<bool> {
        self.asked.lock().unwrap().push(message.to_string());
        Ok(self.confirms.lock().unwrap().pop_front().unwrap_or(false))
    }

    fn select(&self, message: &str, _choices: &[String]) -> Result<usize> {
        self.asked.lock().unwrap().push(message.to_string());
        Ok(self.selections.lock().unwrap().pop_front().unwrap_or(0))
    }
}

pub fn client(token: String) -> RequestClient {
    RequestClient::with_retry(
        Arc::new(StaticTokenProvider::new(token)),
        RetryPolicy::immediate(2),
    )
}

/// Context whose Graph and SharePoint endpoints both point at `server`
pub fn context(server: &MockServer, token: String, prompter: ScriptedPrompter) -> CommandContext {
    CommandContext::new(client(token), Box::new(prompter))
        .with_graph_url(server.uri())
        .with_spo_url(server.uri())
}

/// CSOM `ProcessQuery` response with `results` as `id, value` pairs
pub fn csom_response(results: &[(u64, Value)]) -> Value {
    let mut items = vec![json!({
        "SchemaVersion": "15.0.0.0",
        "LibraryVersion": "16.0.24817.12005",
        "ErrorInfo": null,
        "TraceCorrelationId": "e4f2e59e-c0a9-0000-3dd0-1d8ef12cc742"
    })];
    for (id, value) in results {
        items.push(json!(id));
        items.push(value.clone());
    }
    Value::Array(items)
}

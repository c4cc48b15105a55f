use super::formatting::{encode_query_parameter, pick_properties};
use super::validation::validate_option_set;
use super::{CommandContext, CommandOutput};
use crate::config::OutputMode;
use crate::error::{M365Error, Result};
use crate::graph::PaginatedResponse;
use clap::Args;
use serde::Deserialize;
use serde_json::Value;

#[derive(Args, Debug, Default)]
pub struct TaskGetArgs {
    /// ID of the task
    #[arg(short, long)]
    pub id: String,

    /// Display name of the task list
    #[arg(long)]
    pub list_name: Option<String>,

    /// ID of the task list
    #[arg(long)]
    pub list_id: Option<String>,
}

impl TaskGetArgs {
    pub fn validate(&self) -> Result<()> {
        validate_option_set(&[
            ("list-id", self.list_id.is_some()),
            ("list-name", self.list_name.is_some()),
        ])
    }
}

#[derive(Debug, Deserialize)]
struct TaskList {
    id: String,
}

async fn todo_list_id(ctx: &CommandContext, args: &TaskGetArgs) -> Result<String> {
    if let Some(id) = &args.list_id {
        return Ok(id.clone());
    }

    let name = args.list_name.as_deref().unwrap_or_default();
    let response: PaginatedResponse<TaskList> = ctx
        .client
        .get(&ctx.graph(&format!(
            "v1.0/me/todo/lists?$filter=displayName eq '{}'",
            encode_query_parameter(name)
        )))
        .await?;

    response
        .value
        .into_iter()
        .next()
        .map(|list| list.id)
        .ok_or_else(|| M365Error::CommandError("The specified task list does not exist".into()))
}

pub async fn task_get(ctx: &CommandContext, args: &TaskGetArgs) -> Result<CommandOutput> {
    args.validate()?;
    ctx.assert_delegated_access_token().await?;

    let list_id = todo_list_id(ctx, args).await?;
    let task: Value = ctx
        .client
        .get(&ctx.graph(&format!(
            "v1.0/me/todo/lists/{}/tasks/{}",
            list_id, args.id
        )))
        .await?;

    if ctx.output == OutputMode::Text {
        return Ok(Some(pick_properties(
            &task,
            &["id", "title", "status", "createdDateTime", "lastModifiedDateTime"],
        )));
    }

    Ok(Some(task))
}

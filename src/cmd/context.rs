//! Context options stored in the project's `.m365rc.json`

use super::{CommandContext, CommandOutput};
use crate::config::project::{PROJECT_FILE, ProjectFile};
use crate::error::{M365Error, Result};
use clap::Args;
use serde_json::{Map, Value, json};
use std::fs;
use tracing::info;

#[derive(Args, Debug, Default)]
pub struct ContextRemoveArgs {
    /// Don't prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug, Default)]
pub struct OptionSetArgs {
    /// Name of the option
    #[arg(short, long)]
    pub name: String,

    /// Value of the option
    #[arg(long)]
    pub value: String,
}

#[derive(Args, Debug, Default)]
pub struct OptionRemoveArgs {
    /// Name of the option
    #[arg(short, long)]
    pub name: String,

    /// Don't prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

pub async fn init(ctx: &CommandContext) -> Result<CommandOutput> {
    let mut project = ProjectFile::load(&ctx.working_dir)?.unwrap_or_default();
    if project.context.is_some() {
        info!("Context already present in {}", PROJECT_FILE);
        return Ok(None);
    }

    project.context = Some(Map::new());
    project.save(&ctx.working_dir)?;
    info!("Added context to {}", PROJECT_FILE);
    Ok(None)
}

pub async fn remove(ctx: &CommandContext, args: &ContextRemoveArgs) -> Result<CommandOutput> {
    let confirmed = ctx.confirm_or_force(
        args.force,
        &format!("Are you sure you want to remove the context from {}?", PROJECT_FILE),
    )?;
    if !confirmed {
        return Ok(None);
    }

    let Some(mut project) = ProjectFile::load(&ctx.working_dir)? else {
        return Ok(None);
    };
    if project.context.take().is_none() {
        return Ok(None);
    }

    let path = ProjectFile::path_in(&ctx.working_dir);
    let result = if project.is_empty() {
        fs::remove_file(&path).map_err(M365Error::from)
    } else {
        project.save(&ctx.working_dir)
    };
    result.map_err(|e| {
        M365Error::CommandError(format!(
            "Error writing {}: {}. Please remove context info from {} manually.",
            PROJECT_FILE, e, PROJECT_FILE
        ))
    })?;

    Ok(None)
}

pub async fn option_list(ctx: &CommandContext) -> Result<CommandOutput> {
    let context = ProjectFile::load(&ctx.working_dir)
        .map_err(|e| {
            M365Error::CommandError(format!("Error reading {}: {}", PROJECT_FILE, e))
        })?
        .and_then(|p| p.context);

    match context {
        Some(options) => Ok(Some(Value::Object(options))),
        None => {
            info!("No context defined in {}", PROJECT_FILE);
            Ok(None)
        }
    }
}

pub async fn option_set(ctx: &CommandContext, args: &OptionSetArgs) -> Result<CommandOutput> {
    let mut project = ProjectFile::load(&ctx.working_dir)
        .map_err(|e| {
            M365Error::CommandError(format!(
                "Error reading {}: {}. Please add {} to {} manually.",
                PROJECT_FILE, e, args.name, PROJECT_FILE
            ))
        })?
        .unwrap_or_default();

    project
        .context
        .get_or_insert_with(Map::new)
        .insert(args.name.clone(), json!(args.value));

    project.save(&ctx.working_dir).map_err(|e| {
        M365Error::CommandError(format!(
            "Error writing {}: {}. Please add {} to {} manually.",
            PROJECT_FILE, e, args.name, PROJECT_FILE
        ))
    })?;

    info!("Context option '{}' set", args.name);
    Ok(None)
}

pub async fn option_remove(ctx: &CommandContext, args: &OptionRemoveArgs) -> Result<CommandOutput> {
    let confirmed = ctx.confirm_or_force(
        args.force,
        &format!("Are you sure you want to remove the context option {}?", args.name),
    )?;
    if !confirmed {
        return Ok(None);
    }

    let manual = |action: &str, e: &dyn std::fmt::Display| {
        M365Error::CommandError(format!(
            "Error {} {}: {}. Please remove context option {} from {} manually.",
            action, PROJECT_FILE, e, args.name, PROJECT_FILE
        ))
    };

    let mut project = ProjectFile::load(&ctx.working_dir)
        .map_err(|e| manual("reading", &e))?
        .unwrap_or_default();

    let removed = project
        .context
        .as_mut()
        .and_then(|context| context.remove(&args.name));
    if removed.is_none() {
        return Err(M365Error::CommandError(format!(
            "There is no option {} in the context info",
            args.name
        )));
    }

    project
        .save(&ctx.working_dir)
        .map_err(|e| manual("writing", &e))?;

    info!("Context option '{}' removed", args.name);
    Ok(None)
}

use super::validation::{is_valid_user_principal_name, require_guid, validate_option_set};
use super::{CommandContext, CommandOutput};
use crate::error::{M365Error, Result};
use crate::graph::entra;
use clap::Args;
use serde_json::Value;
use tracing::info;

#[derive(Args, Debug, Default)]
pub struct AdministrativeUnitRemoveArgs {
    /// ID of the administrative unit
    #[arg(short, long)]
    pub id: Option<String>,

    /// Display name of the administrative unit
    #[arg(short = 'n', long)]
    pub display_name: Option<String>,

    /// Don't prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

impl AdministrativeUnitRemoveArgs {
    pub fn validate(&self) -> Result<()> {
        validate_option_set(&[
            ("id", self.id.is_some()),
            ("display-name", self.display_name.is_some()),
        ])?;
        require_guid("id", self.id.as_deref())
    }
}

#[derive(Args, Debug, Default)]
pub struct UserSessionRevokeArgs {
    /// ID of the user
    #[arg(short = 'i', long)]
    pub user_id: Option<String>,

    /// User principal name of the user
    #[arg(short = 'n', long)]
    pub user_name: Option<String>,

    /// Don't prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

impl UserSessionRevokeArgs {
    pub fn validate(&self) -> Result<()> {
        validate_option_set(&[
            ("user-id", self.user_id.is_some()),
            ("user-name", self.user_name.is_some()),
        ])?;
        require_guid("user-id", self.user_id.as_deref())?;

        if let Some(name) = &self.user_name {
            if !is_valid_user_principal_name(name) {
                return Err(M365Error::ValidationError(format!(
                    "'{}' is not a valid UPN for option user-name.",
                    name
                )));
            }
        }
        Ok(())
    }
}

pub async fn administrative_unit_remove(
    ctx: &CommandContext,
    args: &AdministrativeUnitRemoveArgs,
) -> Result<CommandOutput> {
    args.validate()?;

    let label = args
        .id
        .as_deref()
        .or(args.display_name.as_deref())
        .unwrap_or_default();
    let confirmed = ctx.confirm_or_force(
        args.force,
        &format!("Are you sure you want to remove administrative unit '{}'?", label),
    )?;
    if !confirmed {
        return Ok(None);
    }

    let id = match &args.display_name {
        Some(name) => entra::administrative_unit_id_by_display_name(ctx, name).await?,
        None => args.id.clone().unwrap_or_default(),
    };

    info!("Removing administrative unit {}", id);
    ctx.client
        .delete(&ctx.graph(&format!("v1.0/directory/administrativeUnits/{}", id)))
        .await?;

    Ok(None)
}

pub async fn user_session_revoke(
    ctx: &CommandContext,
    args: &UserSessionRevokeArgs,
) -> Result<CommandOutput> {
    args.validate()?;

    let user = args
        .user_id
        .as_deref()
        .or(args.user_name.as_deref())
        .unwrap_or_default();
    let confirmed = ctx.confirm_or_force(
        args.force,
        &format!(
            "This will revoke all sessions for the user '{}', requiring the user to re-sign in from all devices. Are you sure?",
            user
        ),
    )?;
    if !confirmed {
        return Ok(None);
    }

    info!("Invalidating all the refresh tokens for user {}...", user);
    // UPNs starting with '$' must be addressed with the key-as-segment syntax
    let segment = if user.starts_with('$') {
        format!("users('{}')", user)
    } else {
        format!("users/{}", user)
    };

    let response: Value = ctx
        .client
        .post_empty(&ctx.graph(&format!("v1.0/{}/revokeSignInSessions", segment)))
        .await?;

    Ok(Some(response))
}

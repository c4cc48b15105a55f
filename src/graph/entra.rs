//! Microsoft Entra ID lookups over Microsoft Graph

use crate::cmd::CommandContext;
use crate::cmd::formatting::encode_query_parameter;
use crate::error::{M365Error, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub group_types: Vec<String>,
}

impl Group {
    /// Microsoft 365 (Unified) groups are claimed through the federated provider
    pub fn is_microsoft_365_group(&self) -> bool {
        self.group_types.iter().any(|t| t == "Unified")
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DirectoryObject {
    id: String,
}

pub async fn group_by_id(ctx: &CommandContext, id: &str) -> Result<Group> {
    info!("Retrieving group {}", id);
    ctx.client
        .get(&ctx.graph(&format!("v1.0/groups/{}", id)))
        .await
}

pub async fn group_by_display_name(ctx: &CommandContext, display_name: &str) -> Result<Group> {
    info!("Retrieving group '{}'", display_name);
    let groups: Vec<Group> = ctx
        .client
        .get_all_items(&ctx.graph(&format!(
            "v1.0/groups?$filter=displayName eq '{}'",
            encode_query_parameter(display_name)
        )))
        .await?;

    single_match(
        ctx,
        groups,
        |g| g.id.clone(),
        format!("The specified group '{}' does not exist.", display_name),
        format!("Multiple groups with name '{}' found.", display_name),
    )
}

pub async fn administrative_unit_id_by_display_name(
    ctx: &CommandContext,
    display_name: &str,
) -> Result<String> {
    info!("Retrieving administrative unit '{}'", display_name);
    let units: Vec<DirectoryObject> = ctx
        .client
        .get_all_items(&ctx.graph(&format!(
            "v1.0/directory/administrativeUnits?$filter=displayName eq '{}'",
            encode_query_parameter(display_name)
        )))
        .await?;

    let unit = single_match(
        ctx,
        units,
        |u| u.id.clone(),
        format!(
            "The specified administrative unit '{}' does not exist.",
            display_name
        ),
        format!(
            "Multiple administrative units with name '{}' found.",
            display_name
        ),
    )?;
    Ok(unit.id)
}

/// App registration (application object) for an app id
pub async fn app_registration_by_app_id(ctx: &CommandContext, app_id: &str) -> Result<Value> {
    info!("Retrieving the Entra application registration with appId '{}'", app_id);
    let apps: Vec<Value> = ctx
        .client
        .get_all_items(&ctx.graph(&format!(
            "v1.0/applications?$filter=appId eq '{}'",
            encode_query_parameter(app_id)
        )))
        .await?;

    apps.into_iter().next().ok_or_else(|| {
        M365Error::CommandError(format!(
            "App with appId '{}' not found in Microsoft Entra ID",
            app_id
        ))
    })
}

/// Exactly one item, or the not-found / ambiguity handling
fn single_match<T, K>(
    ctx: &CommandContext,
    mut items: Vec<T>,
    key: K,
    not_found: String,
    multiple: String,
) -> Result<T>
where
    K: Fn(&T) -> String,
{
    match items.len() {
        0 => Err(M365Error::CommandError(not_found)),
        1 => Ok(items.remove(0)),
        _ => {
            let keyed = items.into_iter().map(|item| (key(&item), item)).collect();
            ctx.handle_multiple_results_found(&multiple, keyed)
        }
    }
}

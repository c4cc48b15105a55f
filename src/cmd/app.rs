//! Commands for the Microsoft Entra app of the current project
//!
//! The app is taken from `--app-id` or from the `apps` list in `.m365rc.json`.

use super::validation::require_guid;
use super::{CommandContext, CommandOutput};
use crate::config::project::{PROJECT_FILE, ProjectFile};
use crate::error::{M365Error, Result};
use crate::graph::PaginatedResponse;
use crate::graph::entra;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

#[derive(Args, Debug, Default)]
pub struct PermissionListArgs {
    /// Client ID of the Microsoft Entra app; defaults to the app in .m365rc.json
    #[arg(short = 'i', long)]
    pub app_id: Option<String>,
}

impl PermissionListArgs {
    pub fn validate(&self) -> Result<()> {
        require_guid("app-id", self.app_id.as_deref())
    }
}

/// One row of the permission listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiPermission {
    pub resource: String,
    pub permission: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServicePrincipal {
    #[serde(default)]
    id: String,
    #[serde(default)]
    app_id: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppRoleAssignment {
    resource_id: String,
    #[serde(default)]
    resource_display_name: Option<String>,
    app_role_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OAuth2PermissionGrant {
    resource_id: String,
    #[serde(default)]
    scope: String,
}

/// Entry of `appRoles` or `oauth2PermissionScopes`
#[derive(Debug, Clone, Deserialize)]
struct PermissionDefinition {
    id: String,
    #[serde(default)]
    value: Option<String>,
}

/// A resource service principal with its permission definitions
#[derive(Debug, Default)]
struct ResourceDefinitions {
    principal: ServicePrincipal,
    app_roles: Vec<PermissionDefinition>,
    scopes: Vec<PermissionDefinition>,
}

impl ResourceDefinitions {
    fn display_name(&self) -> &str {
        self.principal.display_name.as_deref().unwrap_or(&self.principal.id)
    }

    fn role_value(&self, id: &str) -> Option<String> {
        find_value(&self.app_roles, id)
    }

    fn scope_value(&self, id: &str) -> Option<String> {
        find_value(&self.scopes, id)
    }
}

fn find_value(definitions: &[PermissionDefinition], id: &str) -> Option<String> {
    definitions
        .iter()
        .find(|d| d.id == id)
        .and_then(|d| d.value.clone())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequiredResourceAccess {
    resource_app_id: String,
    #[serde(default)]
    resource_access: Vec<ResourceAccess>,
}

#[derive(Debug, Deserialize)]
struct ResourceAccess {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

/// App id from the option or the project file
fn resolve_app_id(ctx: &CommandContext, args: &PermissionListArgs) -> Result<String> {
    if let Some(app_id) = &args.app_id {
        return Ok(app_id.clone());
    }

    let project = ProjectFile::load(&ctx.working_dir)?.ok_or_else(|| {
        M365Error::CommandError(format!(
            "Could not find file: {}. Specify the app-id option or run this command in a folder with {}",
            PROJECT_FILE, PROJECT_FILE
        ))
    })?;

    let apps = project.apps();
    match apps.len() {
        0 => Err(M365Error::CommandError(format!(
            "No Microsoft Entra apps found in {}",
            PROJECT_FILE
        ))),
        1 => Ok(apps[0].app_id.clone()),
        _ => {
            let keyed = apps
                .iter()
                .map(|app| (format!("{} ({})", app.name, app.app_id), app.app_id.clone()))
                .collect();
            ctx.handle_multiple_results_found(
                &format!("Multiple Microsoft Entra apps found in {}.", PROJECT_FILE),
                keyed,
            )
        }
    }
}

async fn service_principal_by_app_id(
    ctx: &CommandContext,
    app_id: &str,
) -> Result<Option<ServicePrincipal>> {
    info!("Retrieving service principal {}", app_id);
    let response: PaginatedResponse<ServicePrincipal> = ctx
        .client
        .get(&ctx.graph(&format!(
            "v1.0/servicePrincipals?$filter=appId eq '{}'&$select=appId,id,displayName",
            app_id
        )))
        .await?;
    Ok(response.value.into_iter().next())
}

async fn values<T: serde::de::DeserializeOwned>(ctx: &CommandContext, path: &str) -> Result<Vec<T>> {
    let response: PaginatedResponse<T> = ctx.client.get(&ctx.graph(path)).await?;
    Ok(response.value)
}

async fn with_definitions(
    ctx: &CommandContext,
    principal: ServicePrincipal,
) -> Result<ResourceDefinitions> {
    info!(
        "Retrieving permission definitions for {} ({})...",
        principal.id, principal.app_id
    );
    let scopes = values(
        ctx,
        &format!("v1.0/servicePrincipals/{}/oauth2PermissionScopes", principal.id),
    )
    .await?;
    let app_roles = values(ctx, &format!("v1.0/servicePrincipals/{}/appRoles", principal.id)).await?;

    Ok(ResourceDefinitions {
        principal,
        app_roles,
        scopes,
    })
}

async fn resource_by_id(ctx: &CommandContext, id: &str) -> Result<Option<ResourceDefinitions>> {
    info!("Retrieving service principal {}", id);
    let principal: Option<ServicePrincipal> = ctx
        .client
        .get(&ctx.graph(&format!(
            "v1.0/servicePrincipals/{}?$select=appId,id,displayName",
            id
        )))
        .await?;
    match principal {
        Some(p) => Ok(Some(with_definitions(ctx, p).await?)),
        None => Ok(None),
    }
}

/// Permissions granted to the app's service principal in this tenant
async fn service_principal_permissions(
    ctx: &CommandContext,
    principal: &ServicePrincipal,
) -> Result<Vec<ApiPermission>> {
    info!("Retrieving permissions for service principal {}...", principal.id);
    let assignments: Vec<AppRoleAssignment> = values(
        ctx,
        &format!("v1.0/servicePrincipals/{}/appRoleAssignments", principal.id),
    )
    .await?;
    let grants: Vec<OAuth2PermissionGrant> = values(
        ctx,
        &format!("v1.0/servicePrincipals/{}/oauth2PermissionGrants", principal.id),
    )
    .await?;

    info!("Resolving permissions for the service principal...");
    let mut permissions = Vec::new();
    let mut resource_names: HashMap<String, String> = HashMap::new();
    let mut to_resolve: Vec<String> = Vec::new();

    for assignment in assignments {
        let name = assignment
            .resource_display_name
            .clone()
            .unwrap_or_else(|| assignment.resource_id.clone());
        resource_names.insert(assignment.resource_id.clone(), name.clone());
        if !to_resolve.contains(&assignment.resource_id) {
            to_resolve.push(assignment.resource_id.clone());
        }
        permissions.push(ApiPermission {
            resource: name,
            // role id for now, resolved to its value below
            permission: assignment.app_role_id,
            kind: "Application".into(),
        });
    }

    for grant in grants {
        let resource = match resource_names.get(&grant.resource_id) {
            Some(name) => name.clone(),
            None => {
                if !to_resolve.contains(&grant.resource_id) {
                    to_resolve.push(grant.resource_id.clone());
                }
                grant.resource_id.clone()
            }
        };
        for scope in grant.scope.split(' ').filter(|s| !s.is_empty()) {
            permissions.push(ApiPermission {
                resource: resource.clone(),
                permission: scope.to_string(),
                kind: "Delegated".into(),
            });
        }
    }

    for id in to_resolve {
        let Some(resource) = resource_by_id(ctx, &id).await? else {
            continue;
        };
        apply_resource_names(&mut permissions, &resource);
    }

    Ok(permissions)
}

fn apply_resource_names(permissions: &mut [ApiPermission], resource: &ResourceDefinitions) {
    let display_name = resource.display_name().to_string();
    for permission in permissions.iter_mut() {
        if permission.resource == resource.principal.id {
            permission.resource = display_name.clone();
        }
        if permission.resource == display_name && permission.kind == "Application" {
            if let Some(value) = resource.role_value(&permission.permission) {
                permission.permission = value;
            }
        }
    }
}

/// Permissions requested by the app registration
async fn app_registration_permissions(ctx: &CommandContext, app_id: &str) -> Result<Vec<ApiPermission>> {
    let application = entra::app_registration_by_app_id(ctx, app_id).await?;
    let required: Vec<RequiredResourceAccess> = match application.get("requiredResourceAccess") {
        Some(value) => serde_json::from_value(value.clone())?,
        None => Vec::new(),
    };

    let mut permissions = Vec::new();
    for access in required {
        let resource = match service_principal_by_app_id(ctx, &access.resource_app_id).await? {
            Some(principal) => Some(with_definitions(ctx, principal).await?),
            None => None,
        };
        let resource_name = resource
            .as_ref()
            .map(|r| r.display_name().to_string())
            .unwrap_or_else(|| access.resource_app_id.clone());

        for item in access.resource_access {
            permissions.push(permission_from_registration(&resource_name, &item, resource.as_ref()));
        }
    }
    Ok(permissions)
}

fn permission_from_registration(
    resource_name: &str,
    access: &ResourceAccess,
    resource: Option<&ResourceDefinitions>,
) -> ApiPermission {
    let name = match (resource, access.kind.as_str()) {
        (Some(r), "Role") => r.role_value(&access.id),
        (Some(r), "Scope") => r.scope_value(&access.id),
        _ => None,
    };

    ApiPermission {
        resource: resource_name.to_string(),
        permission: name.unwrap_or_else(|| access.id.clone()),
        kind: if access.kind == "Role" {
            "Application".into()
        } else {
            "Delegated".into()
        },
    }
}

pub async fn permission_list(ctx: &CommandContext, args: &PermissionListArgs) -> Result<CommandOutput> {
    args.validate()?;
    let app_id = resolve_app_id(ctx, args)?;

    let permissions = match service_principal_by_app_id(ctx, &app_id).await? {
        Some(principal) => service_principal_permissions(ctx, &principal).await?,
        None => app_registration_permissions(ctx, &app_id).await?,
    };

    Ok(Some(serde_json::to_value(permissions)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_resource() -> ResourceDefinitions {
        ResourceDefinitions {
            principal: ServicePrincipal {
                id: "5e2ef5f4-0d2f-4a39-94a7-6b4ae5d5e2c3".into(),
                app_id: "00000003-0000-0000-c000-000000000000".into(),
                display_name: Some("Microsoft Graph".into()),
            },
            app_roles: vec![PermissionDefinition {
                id: "df021288-bdef-4463-88db-98f22de89214".into(),
                value: Some("User.Read.All".into()),
            }],
            scopes: vec![PermissionDefinition {
                id: "e1fe6dd8-ba31-4d61-89e7-88639da4683d".into(),
                value: Some("User.Read".into()),
            }],
        }
    }

    #[test]
    fn test_resource_names_are_resolved() {
        let resource = graph_resource();
        let mut permissions = vec![
            ApiPermission {
                resource: "Microsoft Graph".into(),
                permission: "df021288-bdef-4463-88db-98f22de89214".into(),
                kind: "Application".into(),
            },
            ApiPermission {
                resource: resource.principal.id.clone(),
                permission: "User.Read".into(),
                kind: "Delegated".into(),
            },
        ];

        apply_resource_names(&mut permissions, &resource);
        assert_eq!(permissions[0].permission, "User.Read.All");
        assert_eq!(permissions[1].resource, "Microsoft Graph");
        assert_eq!(permissions[1].permission, "User.Read");
    }

    #[test]
    fn test_registration_permission_names() {
        let resource = graph_resource();
        let scope = ResourceAccess {
            id: "e1fe6dd8-ba31-4d61-89e7-88639da4683d".into(),
            kind: "Scope".into(),
        };
        let role = ResourceAccess {
            id: "00000000-0000-0000-0000-000000000000".into(),
            kind: "Role".into(),
        };

        let delegated = permission_from_registration("Microsoft Graph", &scope, Some(&resource));
        assert_eq!(delegated.permission, "User.Read");
        assert_eq!(delegated.kind, "Delegated");

        let unknown = permission_from_registration("Microsoft Graph", &role, Some(&resource));
        assert_eq!(unknown.permission, "00000000-0000-0000-0000-000000000000");
        assert_eq!(unknown.kind, "Application");

        let unresolved = permission_from_registration("abc", &scope, None);
        assert_eq!(unresolved.permission, scope.id);
    }

    #[test]
    fn test_serialized_shape() {
        let permission = ApiPermission {
            resource: "Microsoft Graph".into(),
            permission: "User.Read".into(),
            kind: "Delegated".into(),
        };
        assert_eq!(
            serde_json::to_value(&permission).unwrap(),
            serde_json::json!({"resource": "Microsoft Graph", "permission": "User.Read", "type": "Delegated"})
        );
    }
}

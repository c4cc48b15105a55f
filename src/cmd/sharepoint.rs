//! SharePoint Online CLI commands
//!
//! Tenant-level commands run against the admin site derived from the
//! connection's SharePoint URL; site-level commands take `--web-url`.

use super::formatting::{encode_query_parameter, server_relative_path};
use super::validation::{is_valid_guid, require_guid, require_sharepoint_url, validate_option_set};
use super::{CommandContext, CommandOutput};
use crate::error::{M365Error, Result};
use crate::graph::{csom, entra, spo};
use clap::Args;
use colored::Colorize;
use serde_json::{Map, Value, json};
use tracing::info;

// ============================================
// Connection URL
// ============================================

#[derive(Args, Debug, Default)]
pub struct SpoSetArgs {
    /// SharePoint root URL, e.g. https://contoso.sharepoint.com
    #[arg(short, long)]
    pub url: String,
}

impl SpoSetArgs {
    pub fn validate(&self) -> Result<()> {
        require_sharepoint_url("url", &self.url)
    }
}

pub async fn set(ctx: &CommandContext, args: &SpoSetArgs) -> Result<CommandOutput> {
    args.validate()?;

    let Some(handle) = &ctx.connection else {
        return Err(M365Error::TokenNotFound);
    };

    let url = args.url.trim_end_matches('/').to_string();
    handle.config.update_connection(&handle.name, |c| {
        if c.spo_url.as_deref() != Some(url.as_str()) {
            c.spo_tenant_id = None;
        }
        c.spo_url = Some(url.clone());
    })?;

    info!("SharePoint URL for connection '{}' set to {}", handle.name, url);
    if ctx.verbose {
        eprintln!("{} SharePoint URL set to {}", "✓".green(), url.cyan());
    }
    Ok(None)
}

pub async fn get(ctx: &CommandContext) -> Result<CommandOutput> {
    Ok(Some(json!({ "SpoUrl": ctx.spo_url.clone().unwrap_or_default() })))
}

// ============================================
// Tenant CDN
// ============================================

#[derive(Args, Debug)]
pub struct CdnOriginListArgs {
    /// CDN type: Public or Private
    #[arg(short, long, default_value = "Public")]
    pub r#type: String,
}

impl Default for CdnOriginListArgs {
    fn default() -> Self {
        Self {
            r#type: "Public".into(),
        }
    }
}

impl CdnOriginListArgs {
    pub fn validate(&self) -> Result<()> {
        cdn_type_value(&self.r#type).map(|_| ())
    }
}

fn cdn_type_value(cdn_type: &str) -> Result<u8> {
    match cdn_type {
        "Public" => Ok(0),
        "Private" => Ok(1),
        other => Err(M365Error::ValidationError(format!(
            "{} is not a valid CDN type. Allowed values are Public|Private",
            other
        ))),
    }
}

fn cdn_origins_query(tenant_id: &str, cdn_type: u8) -> String {
    csom::request_body(
        &format!(
            r#"<Method Name="GetTenantCdnOrigins" Id="22" ObjectPathId="18"><Parameters><Parameter Type="Enum">{}</Parameter></Parameters></Method>"#,
            cdn_type
        ),
        &format!(r#"<Identity Id="18" Name="{}" />"#, tenant_id),
    )
}

pub async fn cdn_origin_list(ctx: &CommandContext, args: &CdnOriginListArgs) -> Result<CommandOutput> {
    args.validate()?;
    let cdn_type = cdn_type_value(&args.r#type)?;

    let tenant_id = spo::tenant_id(ctx).await?;
    let admin = spo::admin_url(ctx.spo_url()?);

    info!("Retrieving configured origins for {} CDN...", args.r#type);
    let response = spo::process_query(&ctx.client, &admin, &cdn_origins_query(&tenant_id, cdn_type)).await?;

    Ok(Some(response.result(22).cloned().unwrap_or(Value::Array(Vec::new()))))
}

// ============================================
// Command sets
// ============================================

#[derive(Args, Debug, Default)]
pub struct CommandSetAddArgs {
    /// URL of the site
    #[arg(short = 'u', long)]
    pub web_url: String,

    /// Title of the command set
    #[arg(short, long)]
    pub title: String,

    /// Client-side component ID of the extension (GUID)
    #[arg(short = 'i', long)]
    pub client_side_component_id: String,

    /// JSON properties passed to the extension
    #[arg(long)]
    pub client_side_component_properties: Option<String>,

    /// List type: List, Library or SitePages
    #[arg(short, long)]
    pub list_type: Option<String>,

    /// Scope: Site or Web
    #[arg(short, long)]
    pub scope: Option<String>,

    /// Location: CommandBar, ContextMenu or Both
    #[arg(long)]
    pub location: Option<String>,
}

const LIST_TYPES: &[&str] = &["List", "Library", "SitePages"];
const SCOPES: &[&str] = &["Site", "Web"];
const LOCATIONS: &[&str] = &["CommandBar", "ContextMenu", "Both"];

fn check_allowed(value: Option<&str>, allowed: &[&str], label: &str) -> Result<()> {
    match value {
        Some(v) if !allowed.contains(&v) => Err(M365Error::ValidationError(format!(
            "{} is not a valid {}. Allowed values are {}",
            v,
            label,
            allowed.join("|")
        ))),
        _ => Ok(()),
    }
}

impl CommandSetAddArgs {
    pub fn validate(&self) -> Result<()> {
        require_sharepoint_url("web-url", &self.web_url)?;
        if !is_valid_guid(&self.client_side_component_id) {
            return Err(M365Error::ValidationError(format!(
                "{} is not a valid GUID",
                self.client_side_component_id
            )));
        }
        check_allowed(self.list_type.as_deref(), LIST_TYPES, "list type")?;
        check_allowed(self.scope.as_deref(), SCOPES, "scope")?;
        check_allowed(self.location.as_deref(), LOCATIONS, "location")
    }

    fn body(&self) -> Value {
        let location = match self.location.as_deref().unwrap_or("Both") {
            "CommandBar" => "ClientSideExtension.ListViewCommandSet.CommandBar",
            "ContextMenu" => "ClientSideExtension.ListViewCommandSet.ContextMenu",
            _ => "ClientSideExtension.ListViewCommandSet",
        };
        let registration_id = match self.list_type.as_deref().unwrap_or("List") {
            "Library" => "101",
            "SitePages" => "119",
            _ => "100",
        };

        let mut body = Map::new();
        body.insert("Title".into(), json!(self.title));
        body.insert("Name".into(), json!(self.title));
        body.insert("Location".into(), json!(location));
        body.insert("ClientSideComponentId".into(), json!(self.client_side_component_id));
        if let Some(properties) = &self.client_side_component_properties {
            body.insert("ClientSideComponentProperties".into(), json!(properties));
        }
        body.insert("RegistrationId".into(), json!(registration_id));
        body.insert("RegistrationType".into(), json!(1));
        Value::Object(body)
    }
}

pub async fn commandset_add(ctx: &CommandContext, args: &CommandSetAddArgs) -> Result<CommandOutput> {
    args.validate()?;
    add_command_set(ctx, args).await
}

async fn add_command_set(ctx: &CommandContext, args: &CommandSetAddArgs) -> Result<CommandOutput> {
    let scope = args.scope.as_deref().unwrap_or("Web");
    info!("Adding ListView Command Set '{}' to the {}", args.title, scope);

    let created: Value = ctx
        .client
        .post(
            &format!("{}/_api/{}/UserCustomActions", args.web_url.trim_end_matches('/'), scope),
            &args.body(),
        )
        .await?;
    Ok(Some(created))
}

// ============================================
// Themes and home site
// ============================================

#[derive(Args, Debug, Default)]
pub struct HideDefaultThemesSetArgs {
    /// Hide the out-of-the-box themes from the theme picker
    #[arg(long, action = clap::ArgAction::Set)]
    pub hide_default_themes: bool,
}

pub async fn hidedefaultthemes_set(
    ctx: &CommandContext,
    args: &HideDefaultThemesSetArgs,
) -> Result<CommandOutput> {
    let admin = spo::admin_url(ctx.spo_url()?);
    info!("Setting the value of the HideDefaultThemes setting to {}...", args.hide_default_themes);

    let _: Value = ctx
        .client
        .post(
            &format!("{}/_api/thememanager/SetHideDefaultThemes", admin),
            &json!({ "hideDefaultThemes": args.hide_default_themes }),
        )
        .await?;
    Ok(None)
}

#[derive(Args, Debug, Default)]
pub struct HomeSiteSetArgs {
    /// URL of the site to set as home site
    #[arg(short = 'u', long)]
    pub site_url: String,

    /// Open Viva Connections as the default landing experience
    #[arg(long)]
    pub viva_connections_default_start: Option<bool>,
}

impl HomeSiteSetArgs {
    pub fn validate(&self) -> Result<()> {
        require_sharepoint_url("site-url", &self.site_url)
    }
}

pub async fn homesite_set(ctx: &CommandContext, args: &HomeSiteSetArgs) -> Result<CommandOutput> {
    args.validate()?;
    let admin = spo::admin_url(ctx.spo_url()?);
    info!("Setting the SharePoint home site to {}...", args.site_url);

    let (endpoint, body) = match args.viva_connections_default_start {
        Some(start) => (
            "SetSPHSiteWithConfiguration",
            json!({
                "sphSiteUrl": args.site_url,
                "configuration": { "vivaConnectionsDefaultStart": start }
            }),
        ),
        None => ("SetSPHSite", json!({ "sphSiteUrl": args.site_url })),
    };

    let response: Value = ctx
        .client
        .post(&format!("{}/_api/SPO.Tenant/{}", admin, endpoint), &body)
        .await?;
    Ok(response.get("value").cloned())
}

// ============================================
// Lists
// ============================================

/// How a list is addressed on a web
#[derive(Debug, Clone, Copy)]
struct ListRef<'a> {
    id: Option<&'a str>,
    title: Option<&'a str>,
    url: Option<&'a str>,
}

impl ListRef<'_> {
    fn validate(&self) -> Result<()> {
        validate_option_set(&[
            ("list-id", self.id.is_some()),
            ("list-title", self.title.is_some()),
            ("list-url", self.url.is_some()),
        ])?;
        require_guid("list-id", self.id)
    }

    /// `_api/web/` path segment (with trailing slash) for this list
    fn segment(&self, web_url: &str) -> Result<String> {
        if let Some(id) = self.id {
            return Ok(format!("lists(guid'{}')/", encode_query_parameter(id)));
        }
        if let Some(title) = self.title {
            return Ok(format!("lists/getByTitle('{}')/", encode_query_parameter(title)));
        }
        let url = self.url.unwrap_or_default();
        let server_relative = server_relative_path(web_url, url)?;
        Ok(format!("GetList('{}')/", encode_query_parameter(&server_relative)))
    }

    fn label(&self) -> &str {
        self.id.or(self.title).or(self.url).unwrap_or_default()
    }
}

#[derive(Args, Debug, Default)]
pub struct ListContentTypeAddArgs {
    /// URL of the site where the list is located
    #[arg(short = 'u', long)]
    pub web_url: String,

    /// ID of the list
    #[arg(short = 'l', long)]
    pub list_id: Option<String>,

    /// Title of the list
    #[arg(short = 't', long)]
    pub list_title: Option<String>,

    /// Server- or site-relative URL of the list
    #[arg(long)]
    pub list_url: Option<String>,

    /// ID of the content type to add
    #[arg(short = 'c', long)]
    pub id: String,
}

impl ListContentTypeAddArgs {
    fn list(&self) -> ListRef<'_> {
        ListRef {
            id: self.list_id.as_deref(),
            title: self.list_title.as_deref(),
            url: self.list_url.as_deref(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_sharepoint_url("web-url", &self.web_url)?;
        self.list().validate()
    }

    fn request_url(&self) -> Result<String> {
        let web_url = self.web_url.trim_end_matches('/');
        Ok(format!(
            "{}/_api/web/{}ContentTypes/AddAvailableContentType",
            web_url,
            self.list().segment(web_url)?
        ))
    }
}

pub async fn list_contenttype_add(
    ctx: &CommandContext,
    args: &ListContentTypeAddArgs,
) -> Result<CommandOutput> {
    args.validate()?;
    add_content_type(ctx, args).await
}

async fn add_content_type(ctx: &CommandContext, args: &ListContentTypeAddArgs) -> Result<CommandOutput> {
    info!("Adding content type {} to list {}...", args.id, args.list().label());

    let added: Value = ctx
        .client
        .post(&args.request_url()?, &json!({ "contentTypeId": args.id }))
        .await?;
    Ok(Some(added))
}

// ============================================
// List item permissions
// ============================================

#[derive(Args, Debug, Default)]
pub struct ListItemRoleAssignmentRemoveArgs {
    /// URL of the site where the list is located
    #[arg(short = 'u', long)]
    pub web_url: String,

    /// ID of the list
    #[arg(long)]
    pub list_id: Option<String>,

    /// Title of the list
    #[arg(long)]
    pub list_title: Option<String>,

    /// Server- or site-relative URL of the list
    #[arg(long)]
    pub list_url: Option<String>,

    /// ID of the list item
    #[arg(long)]
    pub list_item_id: u64,

    /// SharePoint principal ID of the user or group
    #[arg(long)]
    pub principal_id: Option<u64>,

    /// User principal name of the user
    #[arg(long)]
    pub upn: Option<String>,

    /// Name of the SharePoint group
    #[arg(long)]
    pub group_name: Option<String>,

    /// ID of the Microsoft Entra group
    #[arg(long)]
    pub entra_group_id: Option<String>,

    /// Display name of the Microsoft Entra group
    #[arg(long)]
    pub entra_group_name: Option<String>,

    /// Don't prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

impl ListItemRoleAssignmentRemoveArgs {
    fn list(&self) -> ListRef<'_> {
        ListRef {
            id: self.list_id.as_deref(),
            title: self.list_title.as_deref(),
            url: self.list_url.as_deref(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_sharepoint_url("web-url", &self.web_url)?;
        self.list().validate()?;
        validate_option_set(&[
            ("principal-id", self.principal_id.is_some()),
            ("upn", self.upn.is_some()),
            ("group-name", self.group_name.is_some()),
            ("entra-group-id", self.entra_group_id.is_some()),
            ("entra-group-name", self.entra_group_name.is_some()),
        ])?;

        if let Some(id) = &self.entra_group_id {
            if !is_valid_guid(id) {
                return Err(M365Error::ValidationError(format!(
                    "'{}' is not a valid GUID for option entra-group-id.",
                    id
                )));
            }
        }
        Ok(())
    }

    fn request_url(&self, principal_id: u64) -> Result<String> {
        let web_url = self.web_url.trim_end_matches('/');
        Ok(format!(
            "{}/_api/web/{}items({})/roleassignments/removeroleassignment(principalid='{}')",
            web_url,
            self.list().segment(web_url)?,
            self.list_item_id,
            principal_id
        ))
    }
}

async fn resolve_principal_id(
    ctx: &CommandContext,
    args: &ListItemRoleAssignmentRemoveArgs,
) -> Result<u64> {
    if let Some(id) = args.principal_id {
        return Ok(id);
    }
    if let Some(upn) = &args.upn {
        return Ok(spo::get_user_by_email(&ctx.client, &args.web_url, upn).await?.id);
    }
    if let Some(name) = &args.group_name {
        return Ok(spo::get_group_by_name(&ctx.client, &args.web_url, name).await?.id);
    }

    info!("Retrieving group information...");
    let group = match (&args.entra_group_id, &args.entra_group_name) {
        (Some(id), _) => entra::group_by_id(ctx, id).await?,
        (None, Some(name)) => entra::group_by_display_name(ctx, name).await?,
        (None, None) => {
            return Err(M365Error::ValidationError(
                "Specify one of the following options: principal-id, upn, group-name, entra-group-id, entra-group-name.".into(),
            ));
        }
    };
    Ok(spo::ensure_entra_group(&ctx.client, &args.web_url, &group).await?.id)
}

pub async fn listitem_roleassignment_remove(
    ctx: &CommandContext,
    args: &ListItemRoleAssignmentRemoveArgs,
) -> Result<CommandOutput> {
    args.validate()?;

    let confirmed = ctx.confirm_or_force(
        args.force,
        &format!(
            "Are you sure you want to remove role assignment from listitem {} from list {} from site {}?",
            args.list_item_id,
            args.list().label(),
            args.web_url
        ),
    )?;
    if !confirmed {
        return Ok(None);
    }

    remove_role_assignment(ctx, args).await
}

async fn remove_role_assignment(
    ctx: &CommandContext,
    args: &ListItemRoleAssignmentRemoveArgs,
) -> Result<CommandOutput> {
    info!("Removing role assignment from listitem in site at {}...", args.web_url);
    let principal_id = resolve_principal_id(ctx, args).await?;

    let _: Value = ctx.client.post_empty(&args.request_url(principal_id)?).await?;
    Ok(None)
}

// ============================================
// Tenant settings
// ============================================

/// Numeric tenant properties reported by CSOM and their names
const TENANT_ENUMS: &[(&str, &[&str])] = &[
    (
        "SharingCapability",
        &[
            "Disabled",
            "ExternalUserSharingOnly",
            "ExternalUserAndGuestSharing",
            "ExistingExternalUserSharingOnly",
        ],
    ),
    ("SharingDomainRestrictionMode", &["None", "AllowList", "BlockList"]),
    (
        "DefaultSharingLinkType",
        &["None", "Direct", "Internal", "AnonymousAccess"],
    ),
    ("DefaultLinkPermission", &["None", "View", "Edit"]),
    ("ODBMembersCanShare", &["Unspecified", "On", "Off"]),
    ("ODBAccessRequests", &["Unspecified", "On", "Off"]),
    ("FileAnonymousLinkType", &["None", "View", "Edit"]),
    ("FolderAnonymousLinkType", &["None", "View", "Edit"]),
    (
        "ConditionalAccessPolicy",
        &["AllowFullAccess", "AllowLimitedAccess", "BlockAccess"],
    ),
    (
        "SpecialCharactersStateInFileFolderNames",
        &["NoPreference", "Allowed", "Disallowed"],
    ),
    (
        "LimitedAccessFileType",
        &["OfficeOnlineFilesOnly", "WebPreviewableFiles", "OtherFiles"],
    ),
];

fn map_tenant_settings(mut settings: Value) -> Value {
    let Some(object) = settings.as_object_mut() else {
        return settings;
    };

    object.remove("_ObjectType_");
    object.remove("_ObjectIdentity_");

    for (property, names) in TENANT_ENUMS {
        if let Some(value) = object.get_mut(*property) {
            let name = value
                .as_u64()
                .and_then(|index| names.get(index as usize));
            if let Some(name) = name {
                *value = json!(name);
            }
        }
    }
    settings
}

pub async fn tenant_settings_list(ctx: &CommandContext) -> Result<CommandOutput> {
    info!("Retrieving SharePoint tenant settings...");
    let settings = spo::tenant_properties(ctx).await?;
    Ok(Some(map_tenant_settings(settings)))
}

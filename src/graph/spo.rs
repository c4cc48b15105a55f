//! SharePoint Online helpers shared by the `spo` commands

use super::csom::{self, CsomResponse};
use crate::cmd::CommandContext;
use crate::cmd::formatting::encode_query_parameter;
use crate::error::{M365Error, Result};
use crate::graph::RequestClient;
use crate::graph::entra::Group;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

/// Site user or group as returned by `_api/web`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SitePrincipal {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub login_name: Option<String>,
}

/// Tenant admin site for a SharePoint root URL.
///
/// `https://contoso.sharepoint.com` becomes `https://contoso-admin.sharepoint.com`;
/// other hosts (such as local test servers) are returned unchanged.
pub fn admin_url(spo_url: &str) -> String {
    let trimmed = spo_url.trim_end_matches('/');
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return trimmed.to_string();
    };
    match rest.split_once(".sharepoint.") {
        Some((tenant, domain)) if !tenant.ends_with("-admin") && !tenant.contains('/') => {
            format!("{}://{}-admin.sharepoint.{}", scheme, tenant, domain)
        }
        _ => trimmed.to_string(),
    }
}

/// Form digest required by CSOM and some REST writes
pub async fn request_digest(client: &RequestClient, site_url: &str) -> Result<String> {
    let url = format!("{}/_api/contextinfo", site_url.trim_end_matches('/'));
    let response: Value = client.post_empty(&url).await?;
    response
        .get("FormDigestValue")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| M365Error::CommandError("Could not retrieve the request digest".into()))
}

/// Run a `ProcessQuery` request against `site_url`
pub async fn process_query(
    client: &RequestClient,
    site_url: &str,
    body: &str,
) -> Result<CsomResponse> {
    let digest = request_digest(client, site_url).await?;
    let url = format!("{}{}", site_url.trim_end_matches('/'), csom::PROCESS_QUERY_PATH);
    let text = client
        .post_text(&url, body, csom::CONTENT_TYPE, &[("X-RequestDigest", &digest)])
        .await?;
    CsomResponse::parse(&text)
}

/// All properties of the tenant object, queried on the admin site
pub async fn tenant_properties(ctx: &CommandContext) -> Result<Value> {
    let admin = admin_url(ctx.spo_url()?);
    let response = process_query(&ctx.client, &admin, &csom::tenant_properties_query()).await?;
    response
        .result(5)
        .cloned()
        .ok_or_else(|| M365Error::CommandError("The tenant query returned no result".into()))
}

/// CSOM identity of the tenant object, used as an object path name
pub async fn tenant_id(ctx: &CommandContext) -> Result<String> {
    if let Some(id) = &ctx.spo_tenant_id {
        return Ok(id.clone());
    }

    info!("Retrieving SharePoint tenant id...");
    let tenant = tenant_properties(ctx).await?;
    let identity = tenant
        .get("_ObjectIdentity_")
        .and_then(Value::as_str)
        .ok_or_else(|| M365Error::CommandError("Could not retrieve the tenant id".into()))?
        .replace('\n', "&#xA;");

    ctx.remember_spo_tenant_id(&identity);
    Ok(identity)
}

pub async fn get_user_by_email(
    client: &RequestClient,
    web_url: &str,
    email: &str,
) -> Result<SitePrincipal> {
    info!("Retrieving information for user {}", email);
    client
        .get(&format!(
            "{}/_api/web/siteusers/GetByEmail('{}')",
            web_url.trim_end_matches('/'),
            encode_query_parameter(email)
        ))
        .await
}

pub async fn get_group_by_name(
    client: &RequestClient,
    web_url: &str,
    name: &str,
) -> Result<SitePrincipal> {
    info!("Retrieving information for group {}", name);
    client
        .get(&format!(
            "{}/_api/web/sitegroups/GetByName('{}')",
            web_url.trim_end_matches('/'),
            encode_query_parameter(name)
        ))
        .await
}

/// Make sure an Entra group exists as a site user and return it
pub async fn ensure_entra_group(
    client: &RequestClient,
    web_url: &str,
    group: &Group,
) -> Result<SitePrincipal> {
    let logon_name = if group.is_microsoft_365_group() {
        format!("c:0o.c|federateddirectoryclaimprovider|{}", group.id)
    } else {
        format!("c:0t.c|tenant|{}", group.id)
    };

    client
        .post(
            &format!("{}/_api/web/ensureuser", web_url.trim_end_matches('/')),
            &json!({ "logonName": logon_name }),
        )
        .await
}

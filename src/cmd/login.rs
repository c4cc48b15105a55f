use super::CommandOutput;
use super::validation::{is_valid_guid, require_sharepoint_url};
use crate::config::{AuthType, ConfigManager, ConnectionConfig, TokenCache};
use crate::error::{M365Error, Result};
use crate::graph::auth::{
    Authenticator, GRAPH_RESOURCE, is_app_only_access_token, tenant_id_from_access_token,
    user_name_from_access_token,
};
use clap::Args;
use colored::Colorize;
use serde_json::json;

#[derive(Args, Debug, Default)]
pub struct LoginArgs {
    /// Client ID of the Microsoft Entra app used to sign in
    #[arg(long)]
    pub app_id: String,

    /// Tenant ID or domain; device code sign-in also accepts 'common'
    #[arg(long, default_value = "common")]
    pub tenant: String,

    /// Authentication flow
    #[arg(long, value_enum)]
    pub auth_type: Option<AuthType>,

    /// Client secret for the secret auth type
    #[arg(long)]
    pub secret: Option<String>,

    /// Name for the stored connection (defaults to the first segment of the tenant)
    #[arg(long)]
    pub name: Option<String>,

    /// SharePoint root URL, e.g. https://contoso.sharepoint.com
    #[arg(long)]
    pub spo_url: Option<String>,

    /// Free-form description of the connection
    #[arg(long)]
    pub description: Option<String>,
}

impl LoginArgs {
    pub fn auth_type(&self) -> AuthType {
        match (self.auth_type, &self.secret) {
            (Some(auth_type), _) => auth_type,
            (None, Some(_)) => AuthType::Secret,
            (None, None) => AuthType::DeviceCode,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_guid(&self.app_id) {
            return Err(M365Error::ValidationError(format!(
                "{} is not a valid GUID for option app-id.",
                self.app_id
            )));
        }

        if self.auth_type() == AuthType::Secret {
            if self.secret.is_none() {
                return Err(M365Error::ValidationError(
                    "Specify secret when using the secret auth type".into(),
                ));
            }
            if self.tenant == "common" {
                return Err(M365Error::ValidationError(
                    "Specify the tenant when using the secret auth type".into(),
                ));
            }
        }

        if let Some(url) = &self.spo_url {
            require_sharepoint_url("spo-url", url)?;
        }
        Ok(())
    }

    fn connection_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.tenant
                .split(['-', '.'])
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or("default")
                .to_string()
        })
    }

    /// Connection to store, keeping SharePoint details of an existing one
    pub fn connection(&self, existing: Option<&ConnectionConfig>) -> ConnectionConfig {
        ConnectionConfig {
            name: self.connection_name(),
            tenant_id: self.tenant.clone(),
            app_id: self.app_id.clone(),
            client_secret: self.secret.clone(),
            auth_type: self.auth_type(),
            description: self
                .description
                .clone()
                .or_else(|| existing.and_then(|c| c.description.clone())),
            spo_url: self
                .spo_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string())
                .or_else(|| existing.and_then(|c| c.spo_url.clone())),
            spo_tenant_id: existing
                .filter(|c| self.spo_url.is_none() || c.spo_url == self.spo_url)
                .and_then(|c| c.spo_tenant_id.clone()),
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct LogoutArgs {
    /// Connection to sign out of (defaults to the active one)
    #[arg(long)]
    pub name: Option<String>,

    /// Sign out of all connections
    #[arg(long)]
    pub all: bool,
}

pub async fn login(config: &ConfigManager, args: &LoginArgs) -> Result<CommandOutput> {
    args.validate()?;

    let name = args.connection_name();
    let existing = config.get_connection(&name).ok();
    let mut connection = args.connection(existing.as_ref());

    eprintln!(
        "{} Signing in to '{}' ({})",
        "→".cyan(),
        connection.name.bold(),
        match connection.auth_type {
            AuthType::DeviceCode => "device code",
            AuthType::Secret => "client secret",
        }
    );

    let auth = Authenticator::new(&connection)?;
    let grant = match connection.auth_type {
        AuthType::DeviceCode => auth.device_code().await?,
        AuthType::Secret => auth.client_credentials(GRAPH_RESOURCE).await?,
    };

    // multi-tenant sign-ins are pinned to the tenant that issued the token
    if connection.tenant_id == "common" {
        if let Some(tenant_id) = tenant_id_from_access_token(&grant.access_token) {
            connection.tenant_id = tenant_id;
        }
    }

    let mut cache = TokenCache::default();
    grant.store(GRAPH_RESOURCE, &mut cache);
    config.save_token(&connection.name, &cache)?;

    config.add_connection(connection.clone())?;
    config.set_active_connection(&connection.name)?;

    eprintln!(
        "{} Active connection: {}",
        "✓".green(),
        connection.name.bold()
    );
    Ok(None)
}

pub async fn logout(config: &ConfigManager, args: &LogoutArgs) -> Result<CommandOutput> {
    if args.all {
        let connections = config.load_connections()?;
        for connection in &connections {
            config.delete_token(&connection.name)?;
        }
        eprintln!("{} Logged out from all connections", "✓".green());
        return Ok(None);
    }

    let name = match &args.name {
        Some(name) => Some(config.get_connection(name)?.name),
        None => config.load_config()?.current_connection,
    };

    match name {
        Some(name) => {
            config.delete_token(&name)?;
            eprintln!("{} Logged out from '{}'", "✓".green(), name);
        }
        None => eprintln!("{} No active connection", "!".yellow()),
    }
    Ok(None)
}

/// Signed-in identity for a connection, from its cached Graph token
pub fn connected_as(config: &ConfigManager, connection: &ConnectionConfig) -> Result<Option<String>> {
    let cache = config.load_token(&connection.name)?;
    let Some(token) = cache.tokens.get(GRAPH_RESOURCE) else {
        return Ok(None);
    };

    if is_app_only_access_token(&token.access_token) {
        return Ok(Some(connection.app_id.clone()));
    }
    Ok(user_name_from_access_token(&token.access_token))
}

pub async fn status(config: &ConfigManager) -> Result<CommandOutput> {
    let Some(connection) = config.get_active_connection()? else {
        eprintln!("Logged out");
        return Ok(None);
    };

    let Some(user) = connected_as(config, &connection)? else {
        eprintln!("Logged out from '{}'", connection.name);
        return Ok(None);
    };

    Ok(Some(json!({
        "connectionName": connection.name,
        "connectedAs": user,
        "authType": connection.auth_type,
        "appId": connection.app_id,
        "appTenant": connection.tenant_id,
        "spoUrl": connection.spo_url,
    })))
}

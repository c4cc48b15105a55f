use super::CommandOutput;
use super::login::connected_as;
use super::prompts::Prompter;
use crate::config::ConfigManager;
use crate::error::Result;
use clap::Args;
use colored::Colorize;
use serde_json::{Value, json};

#[derive(Args, Debug, Default)]
pub struct ConnectionUseArgs {
    /// Name of the connection to switch to
    #[arg(short, long)]
    pub name: String,
}

#[derive(Args, Debug, Default)]
pub struct ConnectionRemoveArgs {
    /// Name of the connection to remove
    #[arg(short, long)]
    pub name: String,

    /// Don't prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

pub async fn list(config: &ConfigManager) -> Result<CommandOutput> {
    let connections = config.load_connections()?;
    let active = config.load_config()?.current_connection;

    let mut listed = Vec::with_capacity(connections.len());
    for connection in &connections {
        listed.push(json!({
            "name": connection.name,
            "connectedAs": connected_as(config, connection)?,
            "authType": connection.auth_type,
            "appId": connection.app_id,
            "appTenant": connection.tenant_id,
            "active": active.as_deref() == Some(connection.name.as_str()),
        }));
    }

    Ok(Some(Value::Array(listed)))
}

pub async fn switch(config: &ConfigManager, args: &ConnectionUseArgs) -> Result<CommandOutput> {
    config.set_active_connection(&args.name)?;
    eprintln!("{} Switched to connection '{}'", "✓".green(), args.name);
    Ok(None)
}

pub async fn remove(
    config: &ConfigManager,
    prompter: &dyn Prompter,
    args: &ConnectionRemoveArgs,
) -> Result<CommandOutput> {
    // fail on unknown names before asking
    config.get_connection(&args.name)?;

    if !args.force
        && !prompter.confirm(&format!(
            "Are you sure you want to remove connection '{}'?",
            args.name
        ))?
    {
        return Ok(None);
    }

    config.remove_connection(&args.name)?;
    eprintln!("{} Connection '{}' removed", "✓".green(), args.name);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::prompts::tests::ScriptedPrompter;
    use crate::config::{AuthType, ConnectionConfig};
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> ConfigManager {
        let config = ConfigManager::with_dir(dir.path().to_path_buf()).unwrap();
        for name in ["contoso", "fabrikam"] {
            config
                .add_connection(ConnectionConfig {
                    name: name.into(),
                    tenant_id: format!("{}.onmicrosoft.com", name),
                    app_id: "31359c7f-bd7e-475c-86db-fdb8c937548e".into(),
                    client_secret: None,
                    auth_type: AuthType::DeviceCode,
                    description: None,
                    spo_url: None,
                    spo_tenant_id: None,
                })
                .unwrap();
        }
        config
    }

    #[tokio::test]
    async fn test_list_marks_active() {
        let dir = TempDir::new().unwrap();
        let config = manager(&dir);

        switch(&config, &ConnectionUseArgs { name: "fabrikam".into() })
            .await
            .unwrap();

        let listed = list(&config).await.unwrap().unwrap();
        assert_eq!(listed[0]["name"], "contoso");
        assert_eq!(listed[0]["active"], false);
        assert_eq!(listed[1]["active"], true);
        assert!(listed[1]["connectedAs"].is_null());
    }

    #[tokio::test]
    async fn test_switch_to_unknown_connection() {
        let dir = TempDir::new().unwrap();
        let config = manager(&dir);

        let err = switch(&config, &ConnectionUseArgs { name: "northwind".into() })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Connection 'northwind' not found");
    }

    #[tokio::test]
    async fn test_remove_respects_confirmation() {
        let dir = TempDir::new().unwrap();
        let config = manager(&dir);
        let args = ConnectionRemoveArgs {
            name: "contoso".into(),
            force: false,
        };

        remove(&config, &ScriptedPrompter::default().with_confirm(false), &args)
            .await
            .unwrap();
        assert_eq!(config.load_connections().unwrap().len(), 2);

        remove(&config, &ScriptedPrompter::default().with_confirm(true), &args)
            .await
            .unwrap();
        let remaining = config.load_connections().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "fabrikam");
    }
}

use clap::{Parser, Subcommand};
use colored::Colorize;
use m365_cli::cmd::{self, CommandContext, CommandOutput, ConnectionHandle};
use m365_cli::config::{Config, ConfigManager, OutputMode};
use m365_cli::error::{self, M365Error};
use m365_cli::graph::RequestClient;
use m365_cli::graph::auth::{ConnectionTokenProvider, StaticTokenProvider, TokenProvider};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "m365",
    about = "Manage Microsoft 365 from the command line",
    version,
    long_about = "Manage Microsoft 365 from the command line\n\n\
                  Works with Microsoft Graph, SharePoint Online, Teams, To Do and\n\
                  Microsoft Entra ID using stored connections."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format; defaults to the 'output' setting
    #[arg(long, global = true, value_enum)]
    output: Option<OutputMode>,

    /// Log progress to stderr
    #[arg(long, global = true)]
    verbose: bool,

    /// Log requests and responses to stderr
    #[arg(long, global = true)]
    debug: bool,

    /// Pre-acquired access token used instead of the stored connection
    #[arg(long, global = true, env = "M365_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and store the connection
    Login(cmd::login::LoginArgs),

    /// Sign out and clear cached tokens
    Logout(cmd::login::LogoutArgs),

    /// Show the active connection and signed-in identity
    Status,

    /// Manage stored connections
    #[command(subcommand)]
    Connection(ConnectionCommands),

    /// Manage CLI settings
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Manage context options in .m365rc.json
    #[command(subcommand)]
    Context(ContextCommands),

    /// Microsoft Entra app of the current project
    #[command(subcommand)]
    App(AppCommands),

    /// Microsoft Entra ID
    #[command(subcommand, alias = "aad")]
    Entra(EntraCommands),

    /// Microsoft Graph
    #[command(subcommand)]
    Graph(GraphCommands),

    /// SharePoint Online
    #[command(subcommand)]
    Spo(SpoCommands),

    /// Microsoft Teams
    #[command(subcommand)]
    Teams(TeamsCommands),

    /// Microsoft To Do
    #[command(subcommand)]
    Todo(TodoCommands),
}

#[derive(Subcommand, Debug)]
enum ConnectionCommands {
    /// List stored connections
    List,

    /// Switch the active connection
    Use(cmd::connection::ConnectionUseArgs),

    /// Remove a stored connection and its tokens
    Remove(cmd::connection::ConnectionRemoveArgs),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show a setting
    Get(cmd::cli_config::ConfigGetArgs),

    /// Change a setting
    Set(cmd::cli_config::ConfigSetArgs),

    /// List all settings
    List,

    /// Restore defaults
    Reset(cmd::cli_config::ConfigResetArgs),
}

#[derive(Subcommand, Debug)]
enum ContextCommands {
    /// Add a context section to .m365rc.json
    Init,

    /// Remove the context section from .m365rc.json
    Remove(cmd::context::ContextRemoveArgs),

    /// List context options
    #[command(name = "option-list")]
    OptionList,

    /// Add or update a context option
    #[command(name = "option-set")]
    OptionSet(cmd::context::OptionSetArgs),

    /// Remove a context option
    #[command(name = "option-remove")]
    OptionRemove(cmd::context::OptionRemoveArgs),
}

#[derive(Subcommand, Debug)]
enum AppCommands {
    /// List API permissions of the app
    #[command(name = "permission-list")]
    PermissionList(cmd::app::PermissionListArgs),
}

#[derive(Subcommand, Debug)]
enum EntraCommands {
    /// Remove an administrative unit
    #[command(name = "administrativeunit-remove")]
    AdministrativeUnitRemove(cmd::entra::AdministrativeUnitRemoveArgs),

    /// Revoke all sign-in sessions of a user
    #[command(name = "user-session-revoke")]
    UserSessionRevoke(cmd::entra::UserSessionRevokeArgs),
}

#[derive(Subcommand, Debug)]
enum GraphCommands {
    /// Create a schema extension
    #[command(name = "schemaextension-add")]
    SchemaExtensionAdd(cmd::schema_extension::SchemaExtensionAddArgs),

    /// Update a schema extension
    #[command(name = "schemaextension-set")]
    SchemaExtensionSet(cmd::schema_extension::SchemaExtensionSetArgs),
}

#[derive(Subcommand, Debug)]
enum SpoCommands {
    /// Set the SharePoint URL of the active connection
    Set(cmd::sharepoint::SpoSetArgs),

    /// Show the SharePoint URL of the active connection
    Get,

    /// List origins of the tenant CDN
    #[command(name = "cdn-origin-list")]
    CdnOriginList(cmd::sharepoint::CdnOriginListArgs),

    /// Add a ListView Command Set to a site
    #[command(name = "commandset-add")]
    CommandSetAdd(cmd::sharepoint::CommandSetAddArgs),

    /// Show or hide the default themes
    #[command(name = "hidedefaultthemes-set")]
    HideDefaultThemesSet(cmd::sharepoint::HideDefaultThemesSetArgs),

    /// Set the SharePoint home site
    #[command(name = "homesite-set")]
    HomeSiteSet(cmd::sharepoint::HomeSiteSetArgs),

    /// Add a content type to a list
    #[command(name = "list-contenttype-add")]
    ListContentTypeAdd(cmd::sharepoint::ListContentTypeAddArgs),

    /// Remove a role assignment from a list item
    #[command(name = "listitem-roleassignment-remove")]
    ListItemRoleAssignmentRemove(cmd::sharepoint::ListItemRoleAssignmentRemoveArgs),

    /// List tenant settings
    #[command(name = "tenant-settings-list")]
    TenantSettingsList,
}

#[derive(Subcommand, Debug)]
enum TeamsCommands {
    /// Send a message to a chat
    #[command(name = "chat-message-send")]
    ChatMessageSend(cmd::teams::ChatMessageSendArgs),
}

#[derive(Subcommand, Debug)]
enum TodoCommands {
    /// Get a task from a To Do list
    #[command(name = "task-get")]
    TaskGet(cmd::todo::TaskGetArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose || cli.debug;

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if verbose {
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", "→".cyan(), hint);
            }
        }
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli, settings: &Config) {
    let directive = if cli.debug {
        "m365_cli=debug".to_string()
    } else if cli.verbose {
        "m365_cli=info".to_string()
    } else {
        format!("m365_cli={}", settings.log_level.as_deref().unwrap_or("warn"))
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Runtime context for commands that call Microsoft 365
fn command_context(config: &ConfigManager, settings: &Config, cli: &Cli) -> error::Result<CommandContext> {
    let connection = config.get_active_connection()?;

    let tokens: Arc<dyn TokenProvider> = match (&cli.access_token, &connection) {
        (Some(token), _) => Arc::new(StaticTokenProvider::new(token.clone())),
        (None, Some(c)) => Arc::new(ConnectionTokenProvider::new(config.clone(), c.clone())),
        (None, None) => return Err(M365Error::TokenNotFound),
    };

    let mut ctx = CommandContext::new(
        RequestClient::new(tokens),
        Box::new(cmd::prompts::TerminalPrompter),
    )
    .with_output(cli.output.unwrap_or(settings.output))
    .with_prompt(settings.prompt);
    ctx.verbose = cli.verbose || cli.debug;

    if let Some(connection) = connection {
        if let Some(url) = &connection.spo_url {
            ctx = ctx.with_spo_url(url.as_str());
        }
        ctx.spo_tenant_id = connection.spo_tenant_id.clone();
        ctx.connection = Some(ConnectionHandle {
            config: config.clone(),
            name: connection.name,
        });
    }

    Ok(ctx)
}

async fn run(cli: Cli) -> error::Result<()> {
    let config = ConfigManager::new()?;
    let settings = config.load_config()?;
    init_logging(&cli, &settings);

    let output_mode = cli.output.unwrap_or(settings.output);

    let output: CommandOutput = match &cli.command {
        Commands::Login(args) => cmd::login::login(&config, args).await?,
        Commands::Logout(args) => cmd::login::logout(&config, args).await?,
        Commands::Status => cmd::login::status(&config).await?,
        Commands::Connection(connection_cmd) => match connection_cmd {
            ConnectionCommands::List => cmd::connection::list(&config).await?,
            ConnectionCommands::Use(args) => cmd::connection::switch(&config, args).await?,
            ConnectionCommands::Remove(args) => {
                cmd::connection::remove(&config, &cmd::prompts::TerminalPrompter, args).await?
            }
        },
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Get(args) => cmd::cli_config::get(&config, args).await?,
            ConfigCommands::Set(args) => cmd::cli_config::set(&config, args).await?,
            ConfigCommands::List => cmd::cli_config::list(&config).await?,
            ConfigCommands::Reset(args) => cmd::cli_config::reset(&config, args).await?,
        },
        Commands::Context(context_cmd) => {
            let ctx = local_context(&cli, &settings);
            match context_cmd {
                ContextCommands::Init => cmd::context::init(&ctx).await?,
                ContextCommands::Remove(args) => cmd::context::remove(&ctx, args).await?,
                ContextCommands::OptionList => cmd::context::option_list(&ctx).await?,
                ContextCommands::OptionSet(args) => cmd::context::option_set(&ctx, args).await?,
                ContextCommands::OptionRemove(args) => {
                    cmd::context::option_remove(&ctx, args).await?
                }
            }
        }
        Commands::App(app_cmd) => {
            let ctx = command_context(&config, &settings, &cli)?;
            match app_cmd {
                AppCommands::PermissionList(args) => cmd::app::permission_list(&ctx, args).await?,
            }
        }
        Commands::Entra(entra_cmd) => {
            let ctx = command_context(&config, &settings, &cli)?;
            match entra_cmd {
                EntraCommands::AdministrativeUnitRemove(args) => {
                    cmd::entra::administrative_unit_remove(&ctx, args).await?
                }
                EntraCommands::UserSessionRevoke(args) => {
                    cmd::entra::user_session_revoke(&ctx, args).await?
                }
            }
        }
        Commands::Graph(graph_cmd) => {
            let ctx = command_context(&config, &settings, &cli)?;
            match graph_cmd {
                GraphCommands::SchemaExtensionAdd(args) => {
                    cmd::schema_extension::add(&ctx, args).await?
                }
                GraphCommands::SchemaExtensionSet(args) => {
                    cmd::schema_extension::set(&ctx, args).await?
                }
            }
        }
        Commands::Spo(spo_cmd) => {
            let ctx = command_context(&config, &settings, &cli)?;
            match spo_cmd {
                SpoCommands::Set(args) => cmd::sharepoint::set(&ctx, args).await?,
                SpoCommands::Get => cmd::sharepoint::get(&ctx).await?,
                SpoCommands::CdnOriginList(args) => cmd::sharepoint::cdn_origin_list(&ctx, args).await?,
                SpoCommands::CommandSetAdd(args) => cmd::sharepoint::commandset_add(&ctx, args).await?,
                SpoCommands::HideDefaultThemesSet(args) => {
                    cmd::sharepoint::hidedefaultthemes_set(&ctx, args).await?
                }
                SpoCommands::HomeSiteSet(args) => cmd::sharepoint::homesite_set(&ctx, args).await?,
                SpoCommands::ListContentTypeAdd(args) => {
                    cmd::sharepoint::list_contenttype_add(&ctx, args).await?
                }
                SpoCommands::ListItemRoleAssignmentRemove(args) => {
                    cmd::sharepoint::listitem_roleassignment_remove(&ctx, args).await?
                }
                SpoCommands::TenantSettingsList => cmd::sharepoint::tenant_settings_list(&ctx).await?,
            }
        }
        Commands::Teams(teams_cmd) => {
            let ctx = command_context(&config, &settings, &cli)?;
            match teams_cmd {
                TeamsCommands::ChatMessageSend(args) => {
                    cmd::teams::chat_message_send(&ctx, args).await?
                }
            }
        }
        Commands::Todo(todo_cmd) => {
            let ctx = command_context(&config, &settings, &cli)?;
            match todo_cmd {
                TodoCommands::TaskGet(args) => cmd::todo::task_get(&ctx, args).await?,
            }
        }
    };

    if let Some(value) = output {
        if let Some(text) = cmd::output::render(&value, output_mode)? {
            println!("{}", text);
        }
    }

    Ok(())
}

/// Context for commands that only touch local files; no token is needed
fn local_context(cli: &Cli, settings: &Config) -> CommandContext {
    let tokens: Arc<dyn TokenProvider> = Arc::new(StaticTokenProvider::new(String::new()));
    CommandContext::new(
        RequestClient::new(tokens),
        Box::new(cmd::prompts::TerminalPrompter),
    )
    .with_output(cli.output.unwrap_or(settings.output))
    .with_prompt(settings.prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_is_global() {
        let cli = Cli::try_parse_from(["m365", "spo", "get", "--access-token", "eyJ0eXAi"]).unwrap();
        assert_eq!(cli.access_token.as_deref(), Some("eyJ0eXAi"));
        assert!(matches!(cli.command, Commands::Spo(SpoCommands::Get)));
    }

    #[test]
    fn test_hyphenated_subcommands() {
        let cli = Cli::try_parse_from([
            "m365",
            "--output",
            "text",
            "todo",
            "task-get",
            "--id",
            "AAMkADU3Y",
            "--list-name",
            "Tasks",
        ])
        .unwrap();
        assert_eq!(cli.output, Some(OutputMode::Text));
        assert!(matches!(cli.command, Commands::Todo(TodoCommands::TaskGet(_))));
    }
}

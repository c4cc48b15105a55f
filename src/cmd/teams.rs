use super::formatting::encode_query_parameter;
use super::validation::{is_valid_teams_chat_id, is_valid_user_principal_name, validate_option_set};
use super::{CommandContext, CommandOutput};
use crate::error::{M365Error, Result};
use crate::graph::auth::user_name_from_access_token;
use clap::Args;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::info;

/// Attempts to create a chat after the first one fails with 404
const CHAT_CREATE_RETRIES: u32 = 3;
const CHAT_CREATE_RETRY_DELAY: Duration = Duration::from_millis(500);

const MULTIPLE_CHATS: &str = "Multiple chat conversations with this name found.";

#[derive(Args, Debug, Default)]
pub struct ChatMessageSendArgs {
    /// ID of the chat conversation
    #[arg(short, long)]
    pub chat_id: Option<String>,

    /// Topic of the chat conversation
    #[arg(long)]
    pub chat_name: Option<String>,

    /// Comma-separated email addresses of the chat members, excluding yourself
    #[arg(short = 'e', long)]
    pub user_emails: Option<String>,

    /// Message to send
    #[arg(short, long)]
    pub message: String,
}

impl ChatMessageSendArgs {
    pub fn validate(&self) -> Result<()> {
        validate_option_set(&[
            ("chat-id", self.chat_id.is_some()),
            ("chat-name", self.chat_name.is_some()),
            ("user-emails", self.user_emails.is_some()),
        ])?;

        if let Some(chat_id) = &self.chat_id {
            if !is_valid_teams_chat_id(chat_id) {
                return Err(M365Error::ValidationError(format!(
                    "{} is not a valid Teams chat ID.",
                    chat_id
                )));
            }
        }

        if let Some(emails) = &self.user_emails {
            let invalid: Vec<&str> = split_emails(emails)
                .into_iter()
                .filter(|e| !is_valid_user_principal_name(e))
                .collect();
            if !invalid.is_empty() || split_emails(emails).is_empty() {
                return Err(M365Error::ValidationError(format!(
                    "{} contains one or more invalid email addresses.",
                    emails
                )));
            }
        }

        if self.message.trim().is_empty() {
            return Err(M365Error::ValidationError(
                "Specify a message to send.".into(),
            ));
        }

        Ok(())
    }
}

fn split_emails(emails: &str) -> Vec<&str> {
    emails
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Chat {
    id: String,
    #[serde(default)]
    members: Vec<ChatMember>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMember {
    #[serde(default)]
    email: Option<String>,
}

pub async fn chat_message_send(
    ctx: &CommandContext,
    args: &ChatMessageSendArgs,
) -> Result<CommandOutput> {
    args.validate()?;
    ctx.assert_delegated_access_token().await?;

    let chat_id = match (&args.chat_id, &args.chat_name, &args.user_emails) {
        (Some(id), _, _) => id.clone(),
        (None, Some(name), _) => chat_id_by_name(ctx, name).await?,
        (None, None, Some(emails)) => chat_id_by_emails(ctx, &split_emails(emails)).await?,
        (None, None, None) => {
            return Err(M365Error::ValidationError(
                "Specify one of the following options: chat-id, chat-name, user-emails.".into(),
            ));
        }
    };

    info!("Sending message to chat {}", chat_id);
    let _: Value = ctx
        .client
        .post(
            &ctx.graph(&format!("v1.0/chats/{}/messages", chat_id)),
            &json!({ "body": { "content": args.message } }),
        )
        .await?;

    Ok(None)
}

async fn chat_id_by_name(ctx: &CommandContext, name: &str) -> Result<String> {
    let chats: Vec<Chat> = ctx
        .client
        .get_all_items(&ctx.graph(&format!(
            "v1.0/chats?$filter=topic eq '{}'&$expand=members&$select=id,topic,createdDateTime,chatType",
            encode_query_parameter(name)
        )))
        .await?;

    match chats.len() {
        0 => Err(M365Error::CommandError(
            "No chat conversation was found with this name.".into(),
        )),
        1 => Ok(chats[0].id.clone()),
        _ => {
            let keyed = chats.into_iter().map(|c| (c.id.clone(), c.id)).collect();
            ctx.handle_multiple_results_found(MULTIPLE_CHATS, keyed)
        }
    }
}

async fn chat_id_by_emails(ctx: &CommandContext, emails: &[&str]) -> Result<String> {
    let token = ctx.client.access_token(&ctx.graph_url).await?;
    let current_user = user_name_from_access_token(&token).ok_or_else(|| {
        M365Error::CommandError("Could not determine the signed-in user.".into())
    })?;

    let mut participants: BTreeSet<String> =
        emails.iter().map(|e| e.to_lowercase()).collect();
    participants.insert(current_user.to_lowercase());

    let chat_type = if emails.len() == 1 { "oneOnOne" } else { "group" };
    let chats: Vec<Chat> = ctx
        .client
        .get_all_items(&ctx.graph(&format!(
            "v1.0/chats?$filter=chatType eq '{}'&$expand=members&$select=id,topic,createdDateTime,members",
            chat_type
        )))
        .await?;

    let matches: Vec<Chat> = chats
        .into_iter()
        .filter(|chat| {
            let members: BTreeSet<String> = chat
                .members
                .iter()
                .filter_map(|m| m.email.as_deref())
                .map(str::to_lowercase)
                .collect();
            members == participants
        })
        .collect();

    match matches.len() {
        0 => create_chat(ctx, chat_type, &participants).await,
        1 => Ok(matches[0].id.clone()),
        _ => {
            let keyed = matches.into_iter().map(|c| (c.id.clone(), c.id)).collect();
            ctx.handle_multiple_results_found(MULTIPLE_CHATS, keyed)
        }
    }
}

/// Create the conversation; Graph intermittently answers 404 right after
/// resolving new members, so those responses are retried.
async fn create_chat(
    ctx: &CommandContext,
    chat_type: &str,
    participants: &BTreeSet<String>,
) -> Result<String> {
    let members: Vec<Value> = participants
        .iter()
        .map(|email| {
            json!({
                "@odata.type": "#microsoft.graph.aadUserConversationMember",
                "roles": ["owner"],
                "user@odata.bind": format!("https://graph.microsoft.com/v1.0/users/{}", email)
            })
        })
        .collect();
    let body = json!({ "chatType": chat_type, "members": members });

    let mut attempt = 0;
    loop {
        info!("Creating {} chat conversation", chat_type);
        match ctx.client.post::<Chat>(&ctx.graph("v1.0/chats"), &body).await {
            Ok(chat) => return Ok(chat.id),
            Err(M365Error::ApiError { status: 404, .. }) if attempt < CHAT_CREATE_RETRIES => {
                attempt += 1;
                info!(
                    "Chat creation returned 404, retrying ({}/{})",
                    attempt, CHAT_CREATE_RETRIES
                );
                tokio::time::sleep(CHAT_CREATE_RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

use super::validation::is_valid_guid;
use super::{CommandContext, CommandOutput};
use crate::error::{M365Error, Result};
use clap::Args;
use serde_json::{Map, Value, json};
use tracing::info;

const PROPERTY_TYPES: &[&str] = &["Binary", "Boolean", "DateTime", "Integer", "String"];
const STATUSES: &[&str] = &["Available", "Deprecated"];

#[derive(Args, Debug, Default)]
pub struct SchemaExtensionAddArgs {
    /// Unique identifier of the schema extension
    #[arg(short, long)]
    pub id: String,

    /// ID of the app that owns the schema extension
    #[arg(long)]
    pub owner: String,

    /// Comma-separated resource types the extension applies to
    #[arg(short, long)]
    pub target_types: String,

    /// JSON array of {name, type} property definitions
    #[arg(short, long)]
    pub properties: String,

    /// Description of the schema extension
    #[arg(short, long)]
    pub description: Option<String>,
}

impl SchemaExtensionAddArgs {
    pub fn validate(&self) -> Result<()> {
        validate_owner(&self.owner)?;
        parse_properties(&self.properties).map(|_| ())
    }
}

#[derive(Args, Debug, Default)]
pub struct SchemaExtensionSetArgs {
    /// Unique identifier of the schema extension
    #[arg(short, long)]
    pub id: String,

    /// ID of the app that owns the schema extension
    #[arg(long)]
    pub owner: String,

    /// New description
    #[arg(short, long)]
    pub description: Option<String>,

    /// New lifecycle state: Available or Deprecated
    #[arg(short, long)]
    pub status: Option<String>,

    /// Comma-separated resource types the extension applies to
    #[arg(short, long)]
    pub target_types: Option<String>,

    /// JSON array of {name, type} property definitions
    #[arg(short, long)]
    pub properties: Option<String>,
}

impl SchemaExtensionSetArgs {
    pub fn validate(&self) -> Result<()> {
        validate_owner(&self.owner)?;

        if self.description.is_none()
            && self.status.is_none()
            && self.target_types.is_none()
            && self.properties.is_none()
        {
            return Err(M365Error::ValidationError(
                "No updates were specified. Please specify at least one argument among description, status, target-types, or properties".into(),
            ));
        }

        if let Some(status) = &self.status {
            if !STATUSES.contains(&status.as_str()) {
                return Err(M365Error::ValidationError(format!(
                    "Status must be one of the following values: {}",
                    STATUSES.join(", ")
                )));
            }
        }

        if let Some(properties) = &self.properties {
            parse_properties(properties)?;
        }
        Ok(())
    }
}

fn validate_owner(owner: &str) -> Result<()> {
    if is_valid_guid(owner) {
        Ok(())
    } else {
        Err(M365Error::ValidationError(format!(
            "The specified owner '{}' is not a valid App Id",
            owner
        )))
    }
}

/// Parse and check the property definitions
fn parse_properties(raw: &str) -> Result<Value> {
    let properties: Value = serde_json::from_str(raw).map_err(|e| {
        M365Error::ValidationError(format!("The specified properties JSON string is invalid. Error: {}", e))
    })?;

    let Some(items) = properties.as_array() else {
        return Err(M365Error::ValidationError(
            "Provided properties is not an array".into(),
        ));
    };

    for item in items {
        let name = item.get("name").and_then(Value::as_str);
        let kind = item.get("type").and_then(Value::as_str);
        match (name, kind) {
            (None, _) => {
                return Err(M365Error::ValidationError(format!(
                    "Property {} misses name",
                    item
                )));
            }
            (Some(name), None) => {
                return Err(M365Error::ValidationError(format!(
                    "{} has no type specified",
                    name
                )));
            }
            (Some(name), Some(kind)) if !PROPERTY_TYPES.contains(&kind) => {
                return Err(M365Error::ValidationError(format!(
                    "{} has invalid type {}. Valid types are: {}",
                    name,
                    kind,
                    PROPERTY_TYPES.join(", ")
                )));
            }
            _ => {}
        }
    }

    Ok(properties)
}

fn split_target_types(target_types: &str) -> Vec<String> {
    target_types
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

pub async fn add(ctx: &CommandContext, args: &SchemaExtensionAddArgs) -> Result<CommandOutput> {
    args.validate()?;
    info!("Adding schema extension with id '{}'...", args.id);

    let mut body = Map::new();
    body.insert("id".into(), json!(args.id));
    if let Some(description) = &args.description {
        body.insert("description".into(), json!(description));
    }
    body.insert("owner".into(), json!(args.owner));
    body.insert("targetTypes".into(), json!(split_target_types(&args.target_types)));
    body.insert("properties".into(), parse_properties(&args.properties)?);

    let created: Value = ctx
        .client
        .post(&ctx.graph("v1.0/schemaExtensions"), &Value::Object(body))
        .await?;
    Ok(Some(created))
}

pub async fn set(ctx: &CommandContext, args: &SchemaExtensionSetArgs) -> Result<CommandOutput> {
    args.validate()?;
    info!("Updating schema extension with id '{}'...", args.id);

    let mut body = Map::new();
    body.insert("owner".into(), json!(args.owner));
    if let Some(description) = &args.description {
        body.insert("description".into(), json!(description));
    }
    if let Some(status) = &args.status {
        body.insert("status".into(), json!(status));
    }
    if let Some(target_types) = &args.target_types {
        body.insert("targetTypes".into(), json!(split_target_types(target_types)));
    }
    if let Some(properties) = &args.properties {
        body.insert("properties".into(), parse_properties(properties)?);
    }

    let _: Value = ctx
        .client
        .patch(
            &ctx.graph(&format!("v1.0/schemaExtensions/{}", args.id)),
            &Value::Object(body),
        )
        .await?;

    info!("Schema extension successfully updated.");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "b07a45b3-f7b7-489b-9269-da6f3f93dff0";
    const PROPERTIES: &str = r#"[{"name":"MyInt","type":"Integer"},{"name":"MyString","type":"String"}]"#;

    #[test]
    fn test_property_validation() {
        assert!(parse_properties(PROPERTIES).is_ok());
        assert!(parse_properties("foobar").is_err());
        assert!(parse_properties("{}").is_err());
        assert!(parse_properties(r#"[{"name":"MyInt"}]"#).is_err());
        assert!(parse_properties(r#"[{"type":"Integer"}]"#).is_err());
        assert_eq!(
            parse_properties(r#"[{"name":"MyInt","type":"Foo"}]"#)
                .unwrap_err()
                .to_string(),
            "MyInt has invalid type Foo. Valid types are: Binary, Boolean, DateTime, Integer, String"
        );
        for kind in PROPERTY_TYPES {
            assert!(parse_properties(&format!(r#"[{{"name":"P","type":"{}"}}]"#, kind)).is_ok());
        }
    }

    #[test]
    fn test_add_owner_must_be_guid() {
        let args = SchemaExtensionAddArgs {
            id: "TestSchemaExtension".into(),
            owner: "invalid".into(),
            target_types: "Group".into(),
            properties: PROPERTIES.into(),
            description: None,
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_set_requires_an_update() {
        let args = SchemaExtensionSetArgs {
            id: "ext6kguklm2_TestSchemaExtension".into(),
            owner: OWNER.into(),
            ..Default::default()
        };
        assert!(args.validate().unwrap_err().to_string().starts_with("No updates"));

        let args = SchemaExtensionSetArgs {
            description: Some("Test Description".into()),
            ..args
        };
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_set_status_values() {
        let args = SchemaExtensionSetArgs {
            id: "ext6kguklm2_TestSchemaExtension".into(),
            owner: OWNER.into(),
            status: Some("invalid".into()),
            ..Default::default()
        };
        assert!(args.validate().is_err());

        let args = SchemaExtensionSetArgs {
            status: Some("Available".into()),
            ..args
        };
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_split_target_types() {
        assert_eq!(split_target_types("Group, User,"), vec!["Group", "User"]);
    }
}

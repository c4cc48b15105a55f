//! SharePoint client-side object model (CSOM) over `ProcessQuery`
//!
//! Requests are XML documents listing actions against object paths; the
//! response is a JSON array that starts with a header object (carrying
//! `ErrorInfo`) followed by `action id, result` pairs.

use crate::error::{M365Error, Result};
use serde_json::Value;

pub const PROCESS_QUERY_PATH: &str = "/_vti_bin/client.svc/ProcessQuery";
pub const CONTENT_TYPE: &str = "text/xml";

const APPLICATION_NAME: &str = "m365-cli";
const CLIENT_QUERY_NS: &str = "http://schemas.microsoft.com/sharepoint/clientquery/2009";

/// Type id of the `Microsoft.Online.SharePoint.TenantAdministration.Tenant` constructor
pub const TENANT_TYPE_ID: &str = "{268004ae-ef6b-4e9b-8425-127220d84719}";

/// Wrap actions and object paths in a `ProcessQuery` request envelope
pub fn request_body(actions: &str, object_paths: &str) -> String {
    format!(
        r#"<Request AddExpandoFieldTypeSuffix="true" SchemaVersion="15.0.0.0" LibraryVersion="16.0.0.0" ApplicationName="{}" xmlns="{}"><Actions>{}</Actions><ObjectPaths>{}</ObjectPaths></Request>"#,
        APPLICATION_NAME, CLIENT_QUERY_NS, actions, object_paths
    )
}

/// Query every property of the tenant object: action ids 4 and 5, path 3
pub fn tenant_properties_query() -> String {
    request_body(
        r#"<ObjectPath Id="4" ObjectPathId="3" /><Query Id="5" ObjectPathId="3"><Query SelectAllProperties="true"><Properties /></Query></Query>"#,
        &format!(r#"<Constructor Id="3" TypeId="{}" />"#, TENANT_TYPE_ID),
    )
}

/// Parsed `ProcessQuery` response
#[derive(Debug)]
pub struct CsomResponse {
    items: Vec<Value>,
}

impl CsomResponse {
    /// Parse the response array, failing on a reported `ErrorInfo`
    pub fn parse(text: &str) -> Result<Self> {
        let items: Vec<Value> = serde_json::from_str(text)?;

        let error_message = items
            .first()
            .and_then(|header| header.get("ErrorInfo"))
            .and_then(|info| info.get("ErrorMessage"))
            .and_then(Value::as_str);
        if let Some(message) = error_message {
            return Err(M365Error::CommandError(message.to_string()));
        }

        Ok(Self { items })
    }

    /// Result of the action with `id`
    pub fn result(&self, id: u64) -> Option<&Value> {
        self.items
            .iter()
            .skip(1)
            .step_by(2)
            .position(|v| v.as_u64() == Some(id))
            .and_then(|pos| self.items.get(1 + pos * 2 + 1))
    }
}

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum M365Error {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid or conflicting command options.
    #[error("{0}")]
    ValidationError(String),

    /// A command could not complete; the message is shown to the user as-is.
    #[error("{0}")]
    CommandError(String),

    /// Normalized OData error returned by Microsoft Graph or SharePoint.
    #[error("{message}")]
    ApiError {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Interactive prompt error: {0}")]
    DialoguerError(#[from] dialoguer::Error),

    #[error("Not logged in. Run 'm365 login' first")]
    TokenNotFound,

    #[error("Connection '{0}' not found")]
    ConnectionNotFound(String),
}

pub type Result<T> = std::result::Result<T, M365Error>;

pub use M365Error as Error;

impl M365Error {
    /// Build an API error from a failed response body
    pub fn from_response(status: u16, body: &str) -> Self {
        let (code, message) = odata_error(body);
        let message = if message.is_empty() {
            format!("Request failed with status code {}", status)
        } else {
            message
        };

        M365Error::ApiError {
            status,
            code,
            message,
        }
    }

    /// Actionable hint for well-known failures, shown in verbose mode
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            M365Error::ApiError { status, code, message } => {
                match (code.as_deref().unwrap_or_default(), *status) {
                    ("InvalidAuthenticationToken" | "Unauthorized", _) | (_, 401) => Some(
                        "Your access token may have expired. Run 'm365 login' again.",
                    ),
                    ("Authorization_RequestDenied" | "Forbidden" | "InsufficientPrivileges", _)
                    | (_, 403) => Some(
                        "Check that the app registration has the required permissions and that admin consent is granted.",
                    ),
                    ("TooManyRequests", _) | (_, 429) => {
                        Some("The service is throttling requests. Wait a moment and try again.")
                    }
                    ("Request_ResourceNotFound" | "NotFound" | "itemNotFound", _) | (_, 404) => {
                        Some("The requested resource doesn't exist. Check IDs and names.")
                    }
                    ("BadRequest", _) if message.contains("Resource not found for the segment") => {
                        Some("This endpoint may require the beta API or different permissions.")
                    }
                    _ => None,
                }
            }
            M365Error::TokenNotFound => Some("Run 'm365 login' to sign in to a tenant."),
            _ => None,
        }
    }
}

/// Extract the error code and message from any OData error envelope.
///
/// Graph and SharePoint disagree on the shape: SharePoint nests the message
/// under `odata.error.message.value`, Graph uses `error.message`, and the
/// identity platform answers with `error_description`. Bodies that aren't JSON
/// are returned verbatim.
pub fn odata_error(body: &str) -> (Option<String>, String) {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return (None, body.trim().to_string());
    };

    let envelope = json
        .get("odata.error")
        .or_else(|| json.get("error").and_then(|e| e.get("odata.error")));
    if let Some(err) = envelope {
        return (string_field(err, "code"), message_of(err).unwrap_or_default());
    }

    if let Some(err) = json.get("error") {
        if err.is_object() {
            if let Some(message) = message_of(err) {
                return (string_field(err, "code"), message);
            }
        }
        if let Some(description) = string_field(&json, "error_description") {
            return (err.as_str().map(str::to_string), description);
        }
    }

    if let Some(message) = string_field(&json, "message") {
        return (None, message);
    }

    (None, body.trim().to_string())
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn message_of(err: &Value) -> Option<String> {
    match err.get("message")? {
        Value::String(s) => Some(s.clone()),
        m => m.get("value").and_then(Value::as_str).map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sharepoint_nometadata_error() {
        let body = r#"{"odata.error":{"code":"-1, Microsoft.SharePoint.Client.InvalidClientQueryException","message":{"lang":"en-US","value":"An error has occurred"}}}"#;
        let (code, message) = odata_error(body);
        assert_eq!(
            code.as_deref(),
            Some("-1, Microsoft.SharePoint.Client.InvalidClientQueryException")
        );
        assert_eq!(message, "An error has occurred");
    }

    #[test]
    fn test_wrapped_sharepoint_error() {
        let body = r#"{"error":{"odata.error":{"code":"-1","message":{"value":"List does not exist"}}}}"#;
        assert_eq!(odata_error(body).1, "List does not exist");
    }

    #[test]
    fn test_graph_error() {
        let body = r#"{"error":{"code":"Request_ResourceNotFound","message":"Resource 'x' does not exist"}}"#;
        let (code, message) = odata_error(body);
        assert_eq!(code.as_deref(), Some("Request_ResourceNotFound"));
        assert_eq!(message, "Resource 'x' does not exist");
    }

    #[test]
    fn test_verbose_sharepoint_error() {
        let body = r#"{"error":{"code":"-2147024894","message":{"lang":"en-US","value":"File Not Found."}}}"#;
        assert_eq!(odata_error(body).1, "File Not Found.");
    }

    #[test]
    fn test_identity_platform_error() {
        let body = r#"{"error":"invalid_grant","error_description":"AADSTS70000: The grant is expired."}"#;
        let (code, message) = odata_error(body);
        assert_eq!(code.as_deref(), Some("invalid_grant"));
        assert_eq!(message, "AADSTS70000: The grant is expired.");
    }

    #[test]
    fn test_plain_message_and_raw_text() {
        assert_eq!(odata_error(r#"{"message":"Boom"}"#).1, "Boom");
        assert_eq!(odata_error("Service unavailable\n").1, "Service unavailable");
    }

    #[test]
    fn test_empty_body_falls_back_to_status() {
        let err = M365Error::from_response(502, "");
        assert_eq!(err.to_string(), "Request failed with status code 502");
    }

    #[test]
    fn test_hint_for_forbidden() {
        let err = M365Error::from_response(
            403,
            r#"{"error":{"code":"Authorization_RequestDenied","message":"Insufficient privileges to complete the operation."}}"#,
        );
        assert!(err.hint().unwrap().contains("admin consent"));
        assert_eq!(
            err.to_string(),
            "Insufficient privileges to complete the operation."
        );
    }
}

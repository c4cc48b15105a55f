use crate::error::{M365Error, Result};
use uuid::Uuid;

/// Hyphenated 8-4-4-4-12 GUID
pub fn is_valid_guid(value: &str) -> bool {
    value.len() == 36 && Uuid::parse_str(value).is_ok()
}

/// Absolute https URL on a SharePoint Online host
pub fn is_valid_sharepoint_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let Some(rest) = lower.strip_prefix("https://") else {
        return false;
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();

    [".sharepoint.com", ".sharepoint.us", ".sharepoint.de", ".sharepoint.cn"]
        .iter()
        .any(|suffix| host.len() > suffix.len() && host.ends_with(suffix))
}

pub fn is_valid_user_principal_name(upn: &str) -> bool {
    let Some((local, domain)) = upn.split_once('@') else {
        return false;
    };

    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~.-".contains(c));
    let domain_ok = !domain.is_empty()
        && domain.split('.').all(|label| {
            !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });

    local_ok && domain_ok
}

/// Teams chat ids look like `19:<id>@thread.v2` or `19:<id>@unq.gbl.spaces`
pub fn is_valid_teams_chat_id(chat_id: &str) -> bool {
    let Some(rest) = chat_id.strip_prefix("19:") else {
        return false;
    };
    ["@thread.v2", "@unq.gbl.spaces"].iter().any(|suffix| {
        rest.strip_suffix(suffix)
            .is_some_and(|id| !id.is_empty() && !id.contains('@'))
    })
}

/// Exactly one option of a mutually exclusive set must be given
pub fn validate_option_set(options: &[(&str, bool)]) -> Result<()> {
    let names: Vec<&str> = options.iter().map(|(name, _)| *name).collect();

    match options.iter().filter(|(_, present)| *present).count() {
        1 => Ok(()),
        0 => Err(M365Error::ValidationError(format!(
            "Specify one of the following options: {}.",
            names.join(", ")
        ))),
        _ => Err(M365Error::ValidationError(format!(
            "Multiple options from an option set specified. Specify one of the following options: {}.",
            names.join(", ")
        ))),
    }
}

pub fn require_guid(option: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if !is_valid_guid(v) => Err(M365Error::ValidationError(format!(
            "{} is not a valid GUID for option {}.",
            v, option
        ))),
        _ => Ok(()),
    }
}

pub fn require_sharepoint_url(option: &str, value: &str) -> Result<()> {
    if is_valid_sharepoint_url(value) {
        Ok(())
    } else {
        Err(M365Error::ValidationError(format!(
            "'{}' is not a valid SharePoint Online site URL for option {}.",
            value, option
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid() {
        assert!(is_valid_guid("9b1b1e42-794b-4c71-93ac-5ed92488b67f"));
        assert!(!is_valid_guid("9b1b1e42794b4c7193ac5ed92488b67f"));
        assert!(!is_valid_guid("{9b1b1e42-794b-4c71-93ac-5ed92488b67f}"));
        assert!(!is_valid_guid("invalid"));
    }

    #[test]
    fn test_sharepoint_url() {
        assert!(is_valid_sharepoint_url("https://contoso.sharepoint.com"));
        assert!(is_valid_sharepoint_url(
            "https://contoso.sharepoint.com/sites/project-x"
        ));
        assert!(is_valid_sharepoint_url("https://contoso.sharepoint.us/"));
        assert!(!is_valid_sharepoint_url("http://contoso.sharepoint.com"));
        assert!(!is_valid_sharepoint_url("https://contoso.com/sharepoint.com"));
        assert!(!is_valid_sharepoint_url("foo"));
    }

    #[test]
    fn test_user_principal_name() {
        assert!(is_valid_user_principal_name("john.doe@contoso.onmicrosoft.com"));
        assert!(is_valid_user_principal_name("$admin@contoso.com"));
        assert!(!is_valid_user_principal_name("john.doe"));
        assert!(!is_valid_user_principal_name("john@"));
        assert!(!is_valid_user_principal_name("john@contoso..com"));
    }

    #[test]
    fn test_teams_chat_id() {
        assert!(is_valid_teams_chat_id(
            "19:2da4c29f6d7041eca70b638b43d45437@thread.v2"
        ));
        assert!(is_valid_teams_chat_id(
            "19:82fe7758-5bb3-4f0d-a43f-e555fd399c6f_8c0a1a67-50ce-4114-bb6c-da9c5dbcf6ca@unq.gbl.spaces"
        ));
        assert!(!is_valid_teams_chat_id("19:@thread.v2"));
        assert!(!is_valid_teams_chat_id("2da4c29f6d7041eca70b638b43d45437@thread.v2"));
        assert!(!is_valid_teams_chat_id("19:abc@thread.skype"));
    }

    #[test]
    fn test_option_set() {
        assert!(validate_option_set(&[("id", true), ("display-name", false)]).is_ok());

        let none = validate_option_set(&[("id", false), ("display-name", false)]).unwrap_err();
        assert_eq!(
            none.to_string(),
            "Specify one of the following options: id, display-name."
        );

        let both = validate_option_set(&[("id", true), ("display-name", true)]).unwrap_err();
        assert_eq!(
            both.to_string(),
            "Multiple options from an option set specified. Specify one of the following options: id, display-name."
        );
    }
}

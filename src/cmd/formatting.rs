use crate::error::{M365Error, Result};
use reqwest::Url;
use serde_json::{Map, Value};

/// Encode a value for an OData string literal: quotes doubled, then percent-encoded
pub fn encode_query_parameter(value: &str) -> String {
    urlencoding::encode(&value.replace('\'', "''")).into_owned()
}

/// Server-relative form of `url`, resolved against `web_url`.
///
/// The tenant origin is dropped, a leading `/` is added, and the web's own
/// server-relative path is prepended unless the value already starts with it
/// (case-insensitive).
pub fn server_relative_path(web_url: &str, url: &str) -> Result<String> {
    let web_path = decode(parse(web_url)?.path());
    let web_path = web_path.trim_end_matches('/');

    let mut path = if url.starts_with("http://") || url.starts_with("https://") {
        decode(parse(url)?.path())
    } else {
        decode(url)
    };
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    if !path.to_lowercase().starts_with(&web_path.to_lowercase()) {
        path = format!("{}{}", web_path, path);
    }

    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    })
}

fn decode(path: &str) -> String {
    urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

fn parse(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| M365Error::ValidationError(format!("Invalid URL '{}': {}", url, e)))
}

/// Keep only `properties` of an object, in the given order
pub fn pick_properties(value: &Value, properties: &[&str]) -> Value {
    let Some(object) = value.as_object() else {
        return value.clone();
    };

    let mut picked = Map::new();
    for property in properties {
        if let Some(v) = object.get(*property) {
            picked.insert(property.to_string(), v.clone());
        }
    }
    Value::Object(picked)
}

//! Integration tests for the request client
//!
//! Uses wiremock to simulate Graph and SharePoint responses and verify
//! retry behavior, rate limit handling, paging and error normalization.

mod common;

use m365_cli::error::M365Error;
use m365_cli::graph::{PaginatedResponse, RequestClient, RetryPolicy};
use m365_cli::graph::auth::StaticTokenProvider;
use serde_json::{Value, json};
use std::sync::Arc;
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> RequestClient {
    common::client("token".into())
}

/// Successful GET with bearer auth and Graph metadata header
#[tokio::test]
async fn test_get_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .and(header("authorization", "Bearer token"))
        .and(header("accept", "application/json;odata.metadata=none"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "12345",
            "displayName": "Test User"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let body: Value = client()
        .get(&format!("{}/v1.0/me", server.uri()))
        .await
        .unwrap();
    assert_eq!(body["displayName"], "Test User");
}

/// SharePoint REST calls ask for nometadata JSON
#[tokio::test]
async fn test_sharepoint_accept_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/team/_api/web"))
        .and(header("accept", "application/json;odata=nometadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Title": "Team" })))
        .expect(1)
        .mount(&server)
        .await;

    let web: Value = client()
        .get(&format!("{}/sites/team/_api/web", server.uri()))
        .await
        .unwrap();
    assert_eq!(web["Title"], "Team");
}

/// 429 is retried after Retry-After
#[tokio::test]
async fn test_rate_limit_with_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/test"))
        .respond_with(
            ResponseTemplate::new(429)
                .append_header("Retry-After", "0")
                .set_body_string("Rate limited"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let body: Value = client()
        .get(&format!("{}/v1.0/test", server.uri()))
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
}

/// 5xx is retried until the budget runs out, then normalized
#[tokio::test]
async fn test_server_error_exhausts_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/error"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {
                "code": "ServiceUnavailable",
                "message": "Service is temporarily unavailable"
            }
        })))
        .expect(3) // first attempt plus two retries
        .mount(&server)
        .await;

    let err = client()
        .get::<Value>(&format!("{}/v1.0/error", server.uri()))
        .await
        .unwrap_err();

    match err {
        M365Error::ApiError {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 503);
            assert_eq!(code.as_deref(), Some("ServiceUnavailable"));
            assert_eq!(message, "Service is temporarily unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

/// 401 Unauthorized (should not retry)
#[tokio::test]
async fn test_unauthorized_no_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/unauthorized"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "code": "InvalidAuthenticationToken",
                "message": "Access token is empty."
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client()
        .get::<Value>(&format!("{}/v1.0/unauthorized", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Access token is empty.");
    assert!(err.hint().is_some());
}

/// SharePoint OData errors carry the message under `message.value`
#[tokio::test]
async fn test_sharepoint_error_normalized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_api/web/lists/getByTitle('Missing')/items"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "odata.error": {
                "code": "-1, System.ArgumentException",
                "message": {
                    "lang": "en-US",
                    "value": "List 'Missing' does not exist at site with URL 'https://contoso.sharepoint.com'."
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client()
        .post::<Value>(
            &format!("{}/_api/web/lists/getByTitle('Missing')/items", server.uri()),
            &json!({}),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "List 'Missing' does not exist at site with URL 'https://contoso.sharepoint.com'."
    );
}

/// Errors without a body fall back to the status code
#[tokio::test]
async fn test_empty_error_body() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1.0/groups/1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = client()
        .delete(&format!("{}/v1.0/groups/1", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Request failed with status code 404");
}

/// POST sends the JSON body
#[tokio::test]
async fn test_post_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/groups"))
        .and(body_json(json!({ "displayName": "Marketing" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "new-group-id",
            "displayName": "Marketing"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created: Value = client()
        .post(
            &format!("{}/v1.0/groups", server.uri()),
            &json!({ "displayName": "Marketing" }),
        )
        .await
        .unwrap();
    assert_eq!(created["id"], "new-group-id");
}

/// 204 responses read as null
#[tokio::test]
async fn test_patch_no_content() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/v1.0/schemaExtensions/ext1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let updated: Value = client()
        .patch(
            &format!("{}/v1.0/schemaExtensions/ext1", server.uri()),
            &json!({ "status": "Available" }),
        )
        .await
        .unwrap();
    assert!(updated.is_null());
}

/// Raw bodies go out with their content type and extra headers
#[tokio::test]
async fn test_post_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_vti_bin/client.svc/ProcessQuery"))
        .and(header("content-type", "text/xml"))
        .and(header("x-requestdigest", "0x1234"))
        .and(body_string("<Request />"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[{\"ErrorInfo\":null}]"))
        .expect(1)
        .mount(&server)
        .await;

    let text = client()
        .post_text(
            &format!("{}/_vti_bin/client.svc/ProcessQuery", server.uri()),
            "<Request />",
            "text/xml",
            &[("X-RequestDigest", "0x1234")],
        )
        .await
        .unwrap();
    assert_eq!(text, "[{\"ErrorInfo\":null}]");
}

/// Pages are followed through @odata.nextLink
#[tokio::test]
async fn test_get_all_items_follows_next_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "3" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "1" }, { "id": "2" }],
            "@odata.nextLink": format!("{}/v1.0/users?$skiptoken=page2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    let users: Vec<Value> = client()
        .get_all_items(&format!("{}/v1.0/users", server.uri()))
        .await
        .unwrap();
    let ids: Vec<&str> = users.iter().filter_map(|u| u["id"].as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

/// A single page deserializes into the paged envelope
#[tokio::test]
async fn test_paginated_response_without_next_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/beta/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let page: PaginatedResponse<Value> = client()
        .get(&format!("{}/beta/chats", server.uri()))
        .await
        .unwrap();
    assert!(page.value.is_empty());
    assert!(page.next_link.is_none());
}

/// Unreachable hosts fail after the retry budget
#[tokio::test]
async fn test_connection_error() {
    let client = RequestClient::with_retry(
        Arc::new(StaticTokenProvider::new("token")),
        RetryPolicy::immediate(1),
    );

    let err = client
        .get::<Value>("http://127.0.0.1:1/v1.0/me")
        .await
        .unwrap_err();
    assert!(matches!(err, M365Error::HttpError(_)));
}

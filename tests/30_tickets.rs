mod common;

use anyhow::Result;
use opsboard_api::auth::{generate_jwt, Claims};
use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

// The server and the test process share the same default config, so a
// token minted here validates against the spawned binary.
fn bearer_token() -> Result<String> {
    let claims = Claims::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        None,
        "editor@example.com".to_string(),
        "member".to_string(),
    );
    Ok(generate_jwt(&claims)?)
}

#[tokio::test]
async fn ticket_update_rejects_empty_title() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .put(format!("{}/api/tickets/{}", server.base_url, Uuid::new_v4()))
        .bearer_auth(bearer_token()?)
        .json(&json!({ "title": "   " }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn ticket_create_rejects_empty_title() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/projects/{}/tickets", server.base_url, Uuid::new_v4()))
        .bearer_auth(bearer_token()?)
        .json(&json!({ "title": "" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn protected_routes_require_a_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    for path in ["/api/auth/whoami", "/api/dashboards", "/api/audit-logs"] {
        let res = client.get(server.url(path)).send().await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{}", path);

        let body = res.json::<serde_json::Value>().await?;
        assert_eq!(body["message"], "Unauthorized");
    }
    Ok(())
}

#[tokio::test]
async fn malformed_bearer_is_rejected_before_the_store() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(server.url("/api/users"))
        .header("Authorization", "Bearer not-a-jwt")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(server.url("/api/users"))
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn register_validates_before_touching_the_database() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/auth/register"))
        .json(&json!({
            "full_name": "",
            "email": "ana@example.com",
            "password": "long-enough-password"
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["message"], "Full name is required");
    Ok(())
}

#[tokio::test]
async fn malformed_json_is_a_client_error() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/auth/login"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

mod common;

use anyhow::Result;
use reqwest::StatusCode;

#[tokio::test]
async fn root_endpoint_describes_the_service() -> Result<()> {
    let server = common::ensure_server().await?;

    let res = reqwest::get(server.url("/")).await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "DocFlow API");
    assert!(body["data"]["version"].is_string());
    Ok(())
}

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = common::ensure_server().await?;

    let res = reqwest::get(server.url("/health")).await?;

    // OK with a reachable IAM database, SERVICE_UNAVAILABLE without one
    let status = res.status();
    assert!(
        status == StatusCode::OK || status == StatusCode::SERVICE_UNAVAILABLE,
        "unexpected status: {}",
        status
    );

    let body: serde_json::Value = res.json().await?;
    if status == StatusCode::OK {
        assert_eq!(body["data"]["status"], "ok");
    } else {
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    }
    Ok(())
}

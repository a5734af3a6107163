mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

const X_COMPANY_ID: &str = "x-company-id";

async fn create_tenant(base_url: &str, client: &reqwest::Client, name: &str) -> Result<Value> {
    let res = client
        .post(format!("{}/api/root/tenant", base_url))
        .bearer_auth(common::mint_token("ops", "root", None))
        .json(&json!({ "name": name }))
        .send()
        .await?;
    anyhow::ensure!(
        res.status() == StatusCode::CREATED,
        "tenant creation failed: {}",
        res.status()
    );
    Ok(res.json::<Value>().await?["data"].clone())
}

fn tenant_id(tenant: &Value) -> Uuid {
    tenant["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn explicit_header_resolves_and_binds() -> Result<()> {
    if !common::database_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return Ok(());
    }
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let name = common::unique_tenant_name("acme");
    let tenant = create_tenant(&server.base_url, &client, &name).await?;

    let res = client
        .get(format!("{}/api/auth/whoami", server.base_url))
        .bearer_auth(common::mint_token("admin", "full", None))
        .header(X_COMPANY_ID, tenant_id(&tenant).to_string())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["tenant"]["id"], tenant["id"]);
    assert!(body["data"]["tenant"]["namespace"]
        .as_str()
        .unwrap()
        .starts_with("tenant_"));
    Ok(())
}

#[tokio::test]
async fn token_claim_resolves_tenant() -> Result<()> {
    if !common::database_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return Ok(());
    }
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let name = common::unique_tenant_name("claims");
    let tenant = create_tenant(&server.base_url, &client, &name).await?;

    let res = client
        .get(format!("{}/api/auth/whoami", server.base_url))
        .bearer_auth(common::mint_token("admin", "full", Some(tenant_id(&tenant))))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["tenant"]["id"], tenant["id"]);
    Ok(())
}

#[tokio::test]
async fn explicit_header_wins_over_token_claim() -> Result<()> {
    if !common::database_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return Ok(());
    }
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let a = create_tenant(&server.base_url, &client, &common::unique_tenant_name("prio-a")).await?;
    let b = create_tenant(&server.base_url, &client, &common::unique_tenant_name("prio-b")).await?;

    // Claims say A, the explicit header says B: the header must win
    let res = client
        .get(format!("{}/api/auth/whoami", server.base_url))
        .bearer_auth(common::mint_token("admin", "full", Some(tenant_id(&a))))
        .header(X_COMPANY_ID, tenant_id(&b).to_string())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["tenant"]["id"], b["id"]);
    Ok(())
}

#[tokio::test]
async fn unknown_explicit_header_never_falls_through() -> Result<()> {
    if !common::database_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return Ok(());
    }
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let a = create_tenant(&server.base_url, &client, &common::unique_tenant_name("hard")).await?;

    // The claims would resolve A, but the bogus explicit id must reject
    let res = client
        .get(format!("{}/api/auth/whoami", server.base_url))
        .bearer_auth(common::mint_token("admin", "full", Some(tenant_id(&a))))
        .header(X_COMPANY_ID, Uuid::new_v4().to_string())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Generic message only; no hint of how far resolution got
    let body = res.json::<Value>().await?;
    assert_eq!(body["message"], "Tenant could not be resolved");
    Ok(())
}

#[tokio::test]
async fn request_without_any_identifier_is_unauthorized() -> Result<()> {
    if !common::database_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return Ok(());
    }
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/auth/whoami", server.base_url))
        .bearer_auth(common::mint_token("admin", "full", None))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn deactivated_tenant_is_rejected_for_every_strategy() -> Result<()> {
    if !common::database_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return Ok(());
    }
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let name = common::unique_tenant_name("inactive");
    let tenant = create_tenant(&server.base_url, &client, &name).await?;
    let id = tenant_id(&tenant);

    // Sanity: active tenant resolves
    let res = client
        .get(format!("{}/api/auth/whoami", server.base_url))
        .bearer_auth(common::mint_token("admin", "full", None))
        .header(X_COMPANY_ID, id.to_string())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    // Deactivate (invalidates the directory cache)
    let res = client
        .delete(format!("{}/api/root/tenant/{}", server.base_url, name))
        .bearer_auth(common::mint_token("ops", "root", None))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    // Explicit strategy
    let res = client
        .get(format!("{}/api/auth/whoami", server.base_url))
        .bearer_auth(common::mint_token("admin", "full", None))
        .header(X_COMPANY_ID, id.to_string())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Token-claim strategy
    let res = client
        .get(format!("{}/api/auth/whoami", server.base_url))
        .bearer_auth(common::mint_token("admin", "full", Some(id)))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Restore brings it back
    let res = client
        .post(format!("{}/api/root/tenant/{}/restore", server.base_url, name))
        .bearer_auth(common::mint_token("ops", "root", None))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/api/auth/whoami", server.base_url))
        .bearer_auth(common::mint_token("admin", "full", None))
        .header(X_COMPANY_ID, id.to_string())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn login_for_unknown_tenant_is_unauthorized() -> Result<()> {
    if !common::database_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return Ok(());
    }
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!(
            "{}/auth/login/{}/somebody",
            server.base_url,
            common::unique_tenant_name("ghost")
        ))
        .send()
        .await?;
    // 401, not 404: login must not reveal which tenants exist
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn tenant_administration_requires_root_access() -> Result<()> {
    if !common::database_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return Ok(());
    }
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/root/tenant", server.base_url))
        .bearer_auth(common::mint_token("admin", "full", None))
        .json(&json!({ "name": common::unique_tenant_name("nope") }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn duplicate_tenant_names_conflict() -> Result<()> {
    if !common::database_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return Ok(());
    }
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let name = common::unique_tenant_name("dup");
    create_tenant(&server.base_url, &client, &name).await?;

    let res = client
        .post(format!("{}/api/root/tenant", server.base_url))
        .bearer_auth(common::mint_token("ops", "root", None))
        .json(&json!({ "name": name }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    Ok(())
}

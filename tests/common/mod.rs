use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use uuid::Uuid;

/// Secret shared between the spawned server and the tokens minted in-process.
pub const TEST_JWT_SECRET: &str = "fieldops-test-secret";

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    #[allow(dead_code)]
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_fieldops-api"));
        cmd.env("FIELDOPS_API_PORT", port.to_string())
            .env("JWT_SECRET", TEST_JWT_SECRET)
            // Strict resolution: the bootstrap fallback would mask 401 paths
            .env("TENANCY_DEFAULT_TENANT_ENABLED", "false")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Inherit the rest of the environment so the server sees DATABASE_URL
        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline { break; }
            let url = format!("{}/health", self.base_url);
            match client.get(&url).send().await {
                Ok(resp) => {
                    // Ready on OK; SERVICE_UNAVAILABLE still means the router is up
                    if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                        return Ok(());
                    }
                }
                Err(_) => {}
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    // The in-process config (used for token minting and direct registry
    // access) must agree with the spawned server before it is first touched.
    std::env::set_var("JWT_SECRET", TEST_JWT_SECRET);

    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Tenancy tests need a live Postgres; skip cleanly when none is configured.
pub fn database_available() -> bool {
    std::env::var("DATABASE_URL").is_ok()
}

/// Mint a token the spawned server will accept.
pub fn mint_token(user: &str, access: &str, company_id: Option<Uuid>) -> String {
    let claims = fieldops_api::auth::Claims::new(
        Uuid::new_v4(),
        user.to_string(),
        access.to_string(),
        company_id,
    );
    fieldops_api::auth::generate_jwt(claims).expect("failed to mint test token")
}

/// Unique tenant name per test run.
pub fn unique_tenant_name(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dxr::Value;
use robot_mongodb_library::remote::{xmlrpc, Response};

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_robot-mongodb-library"));
        cmd.args(["--port", &port.to_string(), "--host", "127.0.0.1", "--no-stop"])
            .args(["--mongodb-host", "127.0.0.1"])
            .env("ROBOT_MONGODB_SERVER_SELECTION_TIMEOUT_SECS", "2")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            if call(&self.base_url, "get_keyword_names", vec![]).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Post one XML-RPC call and decode the response
pub async fn call(base_url: &str, method: &str, params: Vec<Value>) -> Result<Response> {
    let body = xmlrpc::call_to_xml(&xmlrpc::call(method, params))?;
    let res = reqwest::Client::new()
        .post(format!("{}/RPC2", base_url))
        .header("Content-Type", "text/xml")
        .body(body)
        .send()
        .await?;
    let xml = res.text().await?;
    xmlrpc::parse_response(&xml).with_context(|| format!("bad response: {}", xml))
}

/// Like [`call`], but fails on a fault and returns the value as JSON
pub async fn call_json(base_url: &str, method: &str, params: Vec<Value>) -> Result<serde_json::Value> {
    match call(base_url, method, params).await? {
        Ok(value) => Ok(xmlrpc::to_json(&value)?),
        Err(fault) => anyhow::bail!("fault {}: {}", fault.code(), fault.string()),
    }
}

/// `run_keyword` with positional string arguments; returns the result struct
pub async fn run_keyword(base_url: &str, keyword: &str, args: &[&str]) -> Result<serde_json::Value> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    call_json(base_url, "run_keyword", vec![xmlrpc::string(keyword), xmlrpc::strings(&args)]).await
}

/// True when a MongoDB server answers on localhost:27017. Tests that need a
/// live database return early otherwise.
pub async fn mongo_available() -> bool {
    let probe = tokio::net::TcpStream::connect(("127.0.0.1", 27017));
    matches!(tokio::time::timeout(Duration::from_millis(500), probe).await, Ok(Ok(_)))
}

/// Collection name unique to one test
pub fn unique_collection(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

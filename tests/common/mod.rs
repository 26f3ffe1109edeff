//! Shared utilities for integration tests: mock edges and cycle workspaces.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use edgekeeper::config::{EdgeConfig, PathsConfig};
use edgekeeper::probe::{Prober, ProbeOutcome};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Body of the test object served by healthy mock edges.
pub const TEST_OBJECT: &str = "edgekeeper test object\n";

/// How a mock edge answers.
#[derive(Debug, Clone, Copy)]
pub enum EdgeBehavior {
    /// 200 with this body.
    Serve(&'static str),
    /// This status with this body.
    Status(u16, &'static str),
    /// Accept the connection and never answer.
    Stall,
}

/// A running mock edge.
pub struct MockEdge {
    pub addr: SocketAddr,
    /// Host header of every request received.
    pub hosts: Arc<Mutex<Vec<String>>>,
}

/// Start a mock edge on `addr` (port 0 picks a free port).
pub async fn start_mock_edge(addr: &str, behavior: EdgeBehavior) -> MockEdge {
    let listener = TcpListener::bind(addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hosts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&hosts);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let seen = Arc::clone(&seen);
                    tokio::spawn(handle(socket, behavior, seen));
                }
                Err(_) => break,
            }
        }
    });

    MockEdge { addr, hosts }
}

async fn handle(mut socket: TcpStream, behavior: EdgeBehavior, seen: Arc<Mutex<Vec<String>>>) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let text = String::from_utf8_lossy(&request);
    if let Some(host) = text
        .lines()
        .find_map(|line| line.strip_prefix("host: ").or_else(|| line.strip_prefix("Host: ")))
    {
        seen.lock().unwrap().push(host.trim().to_string());
    }

    let (status, body) = match behavior {
        EdgeBehavior::Serve(body) => (200, body),
        EdgeBehavior::Status(status, body) => (status, body),
        EdgeBehavior::Stall => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return;
        }
    };
    let status_text = match status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// A local address with nothing listening on it.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Answers each edge from a fixed table; unknown edges time out.
#[derive(Clone, Default)]
pub struct ScriptedProber {
    pub script: BTreeMap<String, ProbeOutcome>,
}

impl ScriptedProber {
    pub fn new(script: &[(&str, ProbeOutcome)]) -> Self {
        Self {
            script: script
                .iter()
                .map(|(edge, outcome)| (edge.to_string(), outcome.clone()))
                .collect(),
        }
    }
}

impl Prober for ScriptedProber {
    fn probe(&self, edge: &str) -> impl Future<Output = ProbeOutcome> + Send {
        let outcome = self.script.get(edge).cloned().unwrap_or(ProbeOutcome::TimedOut);
        async move { outcome }
    }
}

/// A temporary directory laid out like a deployment for one dnet.
pub struct Workspace {
    pub dir: TempDir,
    pub config: EdgeConfig,
    pub dnet: String,
}

impl Workspace {
    pub fn new(dnet: &str, edges: &[&str], zones: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let paths = PathsConfig {
            edgelist_dir: root.join("edges"),
            healthdata_store: root.join("health"),
            state_dir: root.join("state"),
            zonetemplate_dir: root.join("zones"),
            output_dir: root.join("out"),
            lockfile: root.join("edgekeeper.lock"),
        };

        fs::create_dir_all(&paths.edgelist_dir).unwrap();
        fs::write(
            paths.edgelist_dir.join(dnet),
            format!("# edges for {dnet}\n{}\n", edges.join("\n")),
        )
        .unwrap();

        let zone_dir = paths.zonetemplate_dir.join(dnet);
        fs::create_dir_all(&zone_dir).unwrap();
        for zone in zones {
            fs::write(zone_dir.join(format!("{zone}.zone")), "$TTL 300\n").unwrap();
        }

        let local_object = root.join("edgetest.txt");
        fs::write(&local_object, TEST_OBJECT).unwrap();

        let mut config = EdgeConfig::default();
        config.paths = paths;
        config.probe.local_object = local_object;
        config.probe.scheme = "http".into();
        config.probe.fetch_timeout_secs = 2.0;
        config.probe.fetch_retry = 1;
        config.probe.retry_base_delay_ms = 1;
        config.probe.retry_max_delay_ms = 5;
        config.decision.edge_count = 2;

        Self {
            dir,
            config,
            dnet: dnet.to_string(),
        }
    }

    pub fn canary(&mut self, zone: &str, edge: &str) -> &mut Self {
        self.config
            .canaries
            .entry(self.dnet.clone())
            .or_default()
            .insert(zone.to_string(), edge.to_string());
        self
    }

    pub fn state_path(&self) -> PathBuf {
        self.config.paths.state_dir.join(format!("{}.state.json", self.dnet))
    }

    pub fn record_path(&self, edge: &str) -> PathBuf {
        self.config.paths.healthdata_store.join(format!("{edge}.edgestore"))
    }

    pub fn manifest_path(&self, zone: &str) -> PathBuf {
        self.config.paths.output_dir.join(format!("{zone}.live.json"))
    }
}

//! Shared utilities for integration testing.
//!
//! Mock upstreams listen on loopback, which the relay refuses to contact.
//! Test hostnames are therefore mapped to public addresses by a
//! [`StaticResolver`] while the relay's HTTP client is told to connect
//! those same hostnames to 127.0.0.1. URLs carry the mock's port.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use api_relay::config::ServiceConfig;
use api_relay::lifecycle::Shutdown;
use api_relay::relay::{RelayExecutor, StaticResolver, TargetResolver};
use api_relay::HttpServer;
use axum::Router;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Origin the relay under test considers its own.
pub const BASE_ORIGIN: &str = "http://relay.test";

/// Documentation-range address standing in for a public upstream.
pub const PUBLIC_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10));

/// Hostnames that resolve to a public address but connect to the mock.
pub const PUBLIC_HOSTS: [&str; 2] = ["api.test", "other.test"];

/// Hostname that resolves to a private address.
pub const INTERNAL_HOST: &str = "internal.test";

/// Start a mock upstream on an ephemeral loopback port.
pub async fn start_upstream(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Start an upstream that answers every connection with a fixed raw HTTP/1.1 response.
pub async fn start_raw_upstream(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// An executor whose view of DNS is fixed and whose connections land on loopback.
pub fn test_executor() -> RelayExecutor {
    let mut dns = StaticResolver::new()
        .with_host(INTERNAL_HOST, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy();
    let loopback = SocketAddr::from(([127, 0, 0, 1], 0));
    for host in PUBLIC_HOSTS {
        dns = dns.with_host(host, PUBLIC_IP);
        builder = builder.resolve(host, loopback);
    }
    builder = builder.resolve(INTERNAL_HOST, loopback);

    let resolver = TargetResolver::new(Arc::new(dns), Duration::from_secs(1));
    RelayExecutor::with_client(builder.build().unwrap(), resolver)
}

/// Defaults with the test base origin.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.admission.base_origin = BASE_ORIGIN.to_string();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config
}

/// A running relay. Dropping it shuts the server down.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub config_tx: mpsc::UnboundedSender<ServiceConfig>,
    shutdown: Shutdown,
}

impl TestRelay {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// POST a relay payload with the headers a same-origin page would send.
    pub async fn relay(&self, payload: Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(self.url("/api/relay"))
            .header("origin", BASE_ORIGIN)
            .json(&payload)
            .send()
            .await
            .unwrap()
    }

    /// Relay a payload and decode the JSON reply.
    pub async fn relay_json(&self, payload: Value) -> (u16, Value) {
        let response = self.relay(payload).await;
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the relay with the test executor.
pub async fn start_relay(config: ServiceConfig) -> TestRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (config_tx, config_rx) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();

    let server = HttpServer::with_executor(config, test_executor());
    tokio::spawn(server.run(listener, config_rx, shutdown.subscribe()));

    TestRelay {
        addr,
        config_tx,
        shutdown,
    }
}

/// URL on a public test host, routed to the given mock upstream.
pub fn upstream_url(host: &str, upstream: SocketAddr, path: &str) -> String {
    format!("http://{}:{}{}", host, upstream.port(), path)
}

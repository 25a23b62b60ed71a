use std::{net::SocketAddr, time::Duration};

use leadpulse_core::events::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_QUEUE_CAPACITY};

pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: String,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub subscriber_queue: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let listen_addr = parse_listen_addr(
            &std::env::var("LP_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        )?;
        let db_path = std::env::var("LP_DB_PATH").unwrap_or_else(|_| "./db/leads.db".into());
        let cors_allow = std::env::var("LP_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let timeout_ms: u64 = env_number("LP_REQUEST_TIMEOUT_MS", 30_000);
        let heartbeat_secs: u64 =
            env_number("LP_HEARTBEAT_SECS", DEFAULT_HEARTBEAT_INTERVAL.as_secs());
        let subscriber_queue: usize = env_number("LP_SUBSCRIBER_QUEUE", DEFAULT_QUEUE_CAPACITY);
        Ok(Self {
            listen_addr,
            db_path,
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
            heartbeat_interval: Duration::from_secs(heartbeat_secs.max(1)),
            subscriber_queue: subscriber_queue.max(1),
        })
    }
}

fn parse_listen_addr(raw: &str) -> anyhow::Result<SocketAddr> {
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid LP_LISTEN_ADDR '{raw}': {e}"))
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

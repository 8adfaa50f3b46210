use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use rendezvous::signaling::{DEFAULT_PATH, DEFAULT_SIGNALING_ADDR, ServerConfig};

#[derive(Parser, Debug)]
#[command(
    name = "rendezvous",
    about = "WebRTC signaling relay",
    rename_all = "kebab-case",
    rename_all_env = "screaming-snake"
)]
pub struct Args {
    /// Address to listen on
    #[arg(default_value = DEFAULT_SIGNALING_ADDR, env)]
    pub host: SocketAddr,

    /// Path the WebSocket endpoint is served on
    #[arg(long, default_value = DEFAULT_PATH, env = "WS_PATH")]
    pub path: String,

    /// Seconds between keepalive pings; no pings when unset or 0
    #[arg(long, env)]
    pub ping_interval: Option<u64>,
}

impl Args {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            path: self.path.clone(),
            ping_interval: self
                .ping_interval
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["rendezvous"]).unwrap();
        assert_eq!(args.host, "0.0.0.0:8080".parse().unwrap());

        let config = args.server_config();
        assert_eq!(config.path, "/ws");
        assert_eq!(config.ping_interval, None);
    }

    #[test]
    fn explicit_values() {
        let args = Args::try_parse_from([
            "rendezvous",
            "127.0.0.1:9000",
            "--path",
            "/signal",
            "--ping-interval",
            "30",
        ])
        .unwrap();
        assert_eq!(args.host, "127.0.0.1:9000".parse().unwrap());

        let config = args.server_config();
        assert_eq!(config.path, "/signal");
        assert_eq!(config.ping_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_ping_interval_disables_heartbeat() {
        let args = Args::try_parse_from(["rendezvous", "--ping-interval", "0"]).unwrap();
        assert_eq!(args.server_config().ping_interval, None);
    }
}

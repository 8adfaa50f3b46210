use clap::Parser;
use rendezvous::signaling::SignalingServer;
use tracing::info;
use tracing_subscriber::prelude::*;

use crate::args::Args;

mod args;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rendezvous=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    println!("   Rendezvous Signaling Server");
    println!("   Binding to ws://{}{}", args.host, args.path);
    println!("   Press Ctrl+C to stop\n");

    let server = SignalingServer::bind(args.host, args.server_config()).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}

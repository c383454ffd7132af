//! pathlink client
//!
//! - Connects to the coordinator and registers this node's paths
//! - Streams envelopes back; forwarded requests are answered by path handlers
//! - Ctrl-C closes the session

use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use pathlink_client::{config, Client};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "pathlink.yaml".to_string());
    let cfg = config::load_from_file(&path).expect("config load failed");

    let client = Client::new(cfg);
    tracing::info!(
        client_id = %client.cfg().client.id,
        paths = ?client.dispatcher().registered_paths(),
        "pathlink-client starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    if let Err(e) = client.run(shutdown_rx).await {
        tracing::error!(kind = e.kind().as_str(), error = %e, "pathlink-client stopped");
        std::process::exit(1);
    }
}

use std::time::Duration;

use nse_socket_rs::{ClientConfig, HeartbeatConfig, NseClient, ReconnectConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    let client = NseClient::new(ClientConfig::from_env())?;

    // Short intervals so the ping/pong cycle is visible
    client.set_heartbeat_config(HeartbeatConfig {
        enabled: true,
        interval: Duration::from_secs(5),
        timeout: Duration::from_secs(3),
    });
    client.set_reconnect_config(ReconnectConfig {
        interval: Duration::from_secs(2),
        max_interval: Duration::from_secs(30),
        multiplier: 2.0,
        max_attempts: 5,
        ..ReconnectConfig::default()
    });

    if client.token().is_none() {
        client.authenticate("monitor").await?;
    }
    if !client.connect_and_subscribe(&["NIFTY"]).await {
        eprintln!("❌ Could not connect");
        return Ok(());
    }

    let watcher = client.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            let status = watcher.heartbeat_status();
            println!(
                "[Heartbeat] state={:?} connected={} last_pong={:?}",
                watcher.connection_state(),
                status.connected,
                status.last_pong
            );
        }
    });

    client.run(Some(Duration::from_secs(60))).await;
    println!("Monitor finished.");
    Ok(())
}

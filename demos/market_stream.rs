use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nse_socket_rs::{Callbacks, ClientConfig, NseClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ClientConfig::from_env();
    let symbols = ["NIFTY", "RELIANCE", "TCS", "INFY"];

    let tick_count = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&tick_count);
    let callbacks = Callbacks::new()
        .on_ticks(move |tick| {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            println!(
                "[Tick #{}] {} close={:?} high={:?} low={:?} volume={:?}",
                n, tick.symbol, tick.data.close, tick.data.high, tick.data.low, tick.data.volume
            );
        })
        .on_connect(|| println!("✅ Connected to NSE Socket"))
        .on_disconnect(|| println!("Disconnected"))
        .on_error(|e| eprintln!("❌ Error: {}", e));

    let client = NseClient::with_handler(config, callbacks)?;

    if client.config().token.is_none() {
        let login = client.authenticate("demo_user").await?;
        println!("Logged in as {:?}", login.user_id);
    }

    println!("Subscribing to {} symbol(s)", symbols.len());
    if !client.connect_and_subscribe(&symbols).await {
        eprintln!("❌ Could not subscribe to any symbol");
        return Ok(());
    }

    // Ctrl+C stops the stream
    let stopper = client.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nShutting down...");
            stopper.stop().await;
        }
    });

    println!("Waiting for ticks...\n");
    client.run(None).await;

    println!(
        "Stream ended after {} tick(s).",
        tick_count.load(Ordering::Relaxed)
    );
    Ok(())
}

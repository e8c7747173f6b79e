use nse_socket_rs::{Callbacks, ClientConfig, NseClient, OrderFilter, OrderRequest, OrderSide, OrderStatus};
use rust_decimal::Decimal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let callbacks = Callbacks::new().on_order_update(|order| {
        println!(
            "[Order Update] {} {} {} x{} -> {}",
            order.id,
            order.side.as_str(),
            order.symbol,
            order.quantity,
            order.status.as_str()
        );
    });
    let client = NseClient::with_handler(ClientConfig::from_env(), callbacks)?;

    if !client.health_check().await {
        eprintln!("❌ API at {} is not healthy", client.config().api_url);
        return Ok(());
    }

    let login = client.authenticate("trader1").await?;
    println!("Permissions: {}", login.permissions.join(", "));

    // Limit buy of 10 RELIANCE @ 2450.50
    let request = OrderRequest::limit("RELIANCE", OrderSide::Buy, 10, Decimal::new(245050, 2));
    let order = client.place_order(&request).await?;
    println!("✅ Placed order {}", order.id);

    let pending = client
        .get_orders(&OrderFilter::new().symbol("reliance").status(OrderStatus::Pending))
        .await?;
    println!("Pending RELIANCE orders: {}", pending.len());
    for order in &pending {
        println!("  {} {:?} @ {:?}", order.id, order.order_type, order.price);
    }

    let cancelled = client.cancel_order(&order.id).await?;
    println!("Cancelled order {} ({})", cancelled.id, cancelled.status.as_str());

    Ok(())
}

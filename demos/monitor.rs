use parking_realtime::{
    ConnectionManager, Credentials, PollerOptions, SettingsProvider, StaticSettings, StatusPoller,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present, then initialize tracing
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("parking_realtime=info".parse()?))
        .init();

    let settings = Arc::new(StaticSettings::from_env());
    let manager = ConnectionManager::new(settings.clone())?;
    let registry = manager.registry();

    registry.register_connection("monitor", |connected| {
        println!("{}", if *connected { "online" } else { "offline" });
    });
    registry.register_vehicle("monitor", |event| {
        println!("{}: {}", event.alert_title(), event.alert_body());
    });
    registry.register_status("monitor", |status| {
        println!(
            "{} of {} spaces free ({:.0}% full) - {}",
            status.snapshot.available,
            status.snapshot.total,
            status.snapshot.percentage_full,
            status.status_message
        );
    });
    registry.register_notification("monitor", |item| {
        println!("[{:?}] {}: {}", item.priority, item.title, item.message);
    });

    // HTTP fallback only when dashboard credentials are configured
    let poller = match (
        std::env::var("PARKING_HTTP_USER"),
        std::env::var("PARKING_HTTP_PASSWORD"),
    ) {
        (Ok(user), Ok(password)) => {
            let options = PollerOptions {
                skip_while_connected: true,
                ..PollerOptions::new(Credentials::new(user, password))
            };
            let poller = StatusPoller::new(&settings.server_url(), options)?
                .with_connection_state(manager.subscribe_state());
            poller.start_periodic_updates(registry.status_sink());
            Some(poller)
        }
        _ => None,
    };

    println!("Connecting to {}...", settings.server_url());
    println!("{:?}", manager.connect().await);

    tokio::signal::ctrl_c().await?;

    println!("Shutting down...");
    if let Some(poller) = poller {
        poller.stop_periodic_updates();
    }
    println!("{}", serde_json::to_string_pretty(&manager.connection_info().await)?);
    manager.cleanup().await;

    Ok(())
}

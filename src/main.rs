use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use realtime_asr_relay::config::ConfigSet;
use realtime_asr_relay::relay::{self, ProviderConnector, RelayHandler};

#[tokio::main]
async fn main() {
    init_tracing();

    match ConfigSet::load_from_env() {
        Ok(config) => {
            info!(root = ?config.root(), "configuration loaded");

            let connector = Arc::new(ProviderConnector::from_config(&config.upstream));
            let handler = RelayHandler::new(connector, config.server.teardown_grace());

            let bind_addr = config.server.ws_bind_addr.clone();
            info!(
                addr = %bind_addr,
                upstream = %config.upstream.endpoint,
                "starting relay server"
            );
            if let Err(e) = relay::bind_and_run(&bind_addr, handler).await {
                error!(error = %e, "failed to start server");
                std::process::exit(1);
            }
        }
        Err(err) => {
            error!(error = ?err, "failed to load configuration");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {err}");
    }
}

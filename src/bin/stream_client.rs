use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;
use tracing::{error, info};

use realtime_asr_relay::capture::SilenceDevice;
use realtime_asr_relay::config::ConfigSet;
use realtime_asr_relay::session::{SessionController, SessionOptions};
use realtime_asr_relay::transport::WebSocketConnector;

/// 無音デバイスで中継サーバへ一定時間ストリーミングし、
/// 届いた転写行を表示するデモクライアント
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cfg = match ConfigSet::load_from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let relay_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("ws://{}", cfg.server.ws_bind_addr));
    let options = SessionOptions::from_config(&cfg.session, relay_url.clone());

    let device = Arc::new(SilenceDevice::new(3200));
    let connector = Arc::new(WebSocketConnector::new(cfg.session.connect_timeout()));
    let mut controller = SessionController::new(options, device, connector);

    let mut lines = match controller.take_line_stream() {
        Some(lines) => lines,
        None => {
            eprintln!("line stream already taken");
            std::process::exit(1);
        }
    };
    let printer = tokio::spawn(async move {
        while let Some(line) = lines.next().await {
            let marker = if line.is_final { "*" } else { " " };
            println!("[{}]{} {}", line.timestamp.format("%H:%M:%S"), marker, line.text);
        }
    });

    info!(session_id = %controller.session_id(), url = %relay_url, "starting demo session");
    if let Err(e) = controller.start() {
        error!(error = %e, "session start failed");
        std::process::exit(1);
    }

    tokio::time::sleep(Duration::from_secs(10)).await;
    controller.stop().await;
    printer.abort();
    info!("demo session finished");
}

//! lanwatch - LAN device discovery and security monitoring CLI

use lanwatch::log_error;

#[tokio::main]
async fn main() {
    if let Err(e) = lanwatch::logging::init_logging() {
        eprintln!("[WARN] Failed to initialize structured logging: {}", e);
    }

    if let Err(e) = lanwatch::run(std::env::args()).await {
        log_error!("{:#}", e);
        std::process::exit(1);
    }
}

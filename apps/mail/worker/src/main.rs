//! Email pipeline worker
//!
//! Binary entry point.

#[tokio::main]
async fn main() {
    if let Err(e) = mail_worker::run().await {
        eprintln!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}

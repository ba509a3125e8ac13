#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

#[tokio::main]
async fn main() {
    if let Err(e) = haul_watch::run().await {
        log::error!("{e}");
        eprintln!("haul-watch: {e}");
        std::process::exit(1);
    }
}

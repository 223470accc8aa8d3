use clap::Parser;
use robot_mongodb_library::cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env if present so ROBOT_MONGODB_* settings are picked up
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = robot_mongodb_library::cli::run(cli).await {
        match std::env::var("ROBOT_MONGODB_VERBOSE").as_deref() {
            Ok("true") | Ok("1") => eprintln!("Remote server failed: {e:?}"),
            _ => eprintln!("Remote server failed: {e}"),
        }
        std::process::exit(1);
    }
}

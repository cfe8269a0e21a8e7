mod cmd;

use clap::{Parser, Subcommand};
use cmd::demo::DemoArgs;

#[derive(Parser)]
#[command(name = "localmsg", about = "Local message table (transactional outbox) tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the two-shard demo against in-memory stores and broker
    Demo(DemoArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Demo(args) => cmd::demo::run(&args).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

//! Undertow CLI - Command-line interface
//!
//! Runs the streaming server and offers small inspection helpers.

mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "undertow")]
#[command(about = "Turns magnet links into HLS streams")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // a missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    commands::handle_command(cli.command).await
}

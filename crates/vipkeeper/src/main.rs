//! vipkeeper binary

use clap::Parser;
use std::process::ExitCode;
use vipkeeper::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match vipkeeper::run(&cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            // Logging may not be initialized yet.
            eprintln!("vipkeeper: {e}");
            ExitCode::FAILURE
        }
    }
}

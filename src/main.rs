//! agentmesh - in-process multi-agent messaging runtime.

use clap::Parser;
use std::process::ExitCode;

use agentmesh::cli::Commands;
use agentmesh::logging;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args = Commands::parse();
    let settings = args.settings();

    // Initialize logging
    let _guard = match logging::init(&settings.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Run the command
    match args.run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

//! Interactive client: `ackget <address> <port>`

use ackget::cli::ClientArgs;
use ackget::client::{Console, Session, SessionEnd};
use ackget::logging::init_logging;
use ackget::Error;
use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ClientArgs::parse();
    init_logging(1 + args.verbose)?;
    let config = args.into_config();

    println!("-- Connecting with the server...");
    let input = BufReader::new(tokio::io::stdin()).lines();
    let console = Console::stdout();

    let code = match Session::connect(&config, input, console).await {
        Ok(session) => match session.run().await {
            Ok(summary) => {
                tracing::info!(
                    files = summary.files,
                    bytes = summary.bytes,
                    end = ?summary.end,
                    "session finished"
                );
                match summary.end {
                    SessionEnd::Quit | SessionEnd::Disconnected => 0,
                    SessionEnd::Aborted => 1,
                }
            }
            Err(e) => {
                eprintln!("{} {}", "error:".red().bold(), e);
                1
            }
        },
        Err(Error::ConnectionRefused) => {
            eprintln!("The connection has been refused by the server");
            1
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            1
        }
    };

    // The blocking stdin reader cannot be cancelled; exit instead of
    // waiting for the runtime to join it.
    std::process::exit(code)
}

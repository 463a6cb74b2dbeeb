//! Terminal output for the interactive client.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::net::SocketAddr;

const PROMPT: &str =
    "Type \"GET file_name\" or \"QUIT\" to finish (\"ABORT\" to interrupt the transfer): ";

const BAR_TEMPLATE: &str = "{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({percent}%)";

/// Where session messages go. A silent console prints nothing and hands
/// out hidden progress bars.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    visible: bool,
}

impl Console {
    pub fn stdout() -> Self {
        Self { visible: true }
    }

    pub fn silent() -> Self {
        Self { visible: false }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn connected(&self, peer: SocketAddr) {
        if self.visible {
            println!("-- Connected to {}", peer);
        }
    }

    pub fn prompt(&self) {
        if self.visible {
            print!("{}", PROMPT);
            let _ = std::io::stdout().flush();
        }
    }

    pub fn rejected(&self) {
        if self.visible {
            println!("{}", "Illegal command or file not found".red());
        }
    }

    pub fn start_transfer(&self, remote: &str, total: u64) -> ProgressBar {
        if !self.visible {
            return ProgressBar::hidden();
        }
        println!("Receiving file \"{}\"...", remote);
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        ProgressBar::new(total).with_style(style).with_message("Bytes received")
    }

    pub fn completed(&self, bar: &ProgressBar, total: u64, local_name: &str) {
        bar.finish_and_clear();
        if self.visible {
            println!("Completed. {} bytes received", total);
            println!(
                "{}",
                format!("File \"{}\" created successfully", local_name).green()
            );
        }
    }

    pub fn aborted(&self, bar: &ProgressBar, received: u64) {
        bar.abandon();
        if self.visible {
            eprintln!(
                "{}",
                format!("File transfer aborted after {} bytes", received).yellow()
            );
        }
    }

    pub fn disconnected(&self) {
        if self.visible {
            println!();
            println!("{}", "Disconnected by the server due to inactivity".yellow());
        }
    }

    pub fn closed(&self) {
        if self.visible {
            println!("-- Connection closed");
        }
    }
}

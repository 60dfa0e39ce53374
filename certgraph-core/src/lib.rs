pub mod report;
pub mod walk;

use colored::Colorize;

/// Print the startup banner to stderr so stdout stays a clean report.
pub fn print_banner() {
    eprintln!();
    eprintln!(
        "  {} {}",
        "certgraph".bright_cyan().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black()
    );
    eprintln!("  {}", "hosts you can reach by following certificate names".white());
    eprintln!();
}

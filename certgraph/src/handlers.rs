use certgraph_core::report::{ReportFormat, generate_report, save_report};
use certgraph_core::walk::{WalkOptions, execute_walk, normalize_seed, seed_port};
use clap::ArgMatches;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

// Helper functions for the walk handler

/// Load seeds from either a hosts file or the single --host argument
pub fn load_seeds_from_source(
    host: Option<&String>,
    hosts_file: Option<&PathBuf>,
    port: u16,
) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_hosts_from_file(hosts_file_path, port)
    } else if let Some(host) = host {
        warn_on_port_conflict(host, port);
        parse_host_line(host)
            .map(|seed| vec![seed])
            .ok_or_else(|| format!("Invalid host '{}'", host))
    } else {
        Err("Either --host or --hosts-file must be provided".to_string())
    }
}

/// Load and normalize seed hosts from a file
pub fn load_hosts_from_file(path: &Path, port: u16) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let mut hosts: Vec<String> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_host_line(line) {
            Some(host) if !hosts.contains(&host) => {
                warn_on_port_conflict(line, port);
                hosts.push(host);
            }
            Some(_) => {}
            None => eprintln!("{} Skipping invalid host '{}'", "⚠".yellow(), line),
        }
    }

    if hosts.is_empty() {
        return Err(format!("No valid hosts found in {}", path.display()));
    }

    Ok(hosts)
}

/// Parse a single line as a seed host; URLs and host:port are reduced to the host
pub fn parse_host_line(line: &str) -> Option<String> {
    normalize_seed(line)
}

/// A seed's own port when it disagrees with the walk port. Every host in a
/// walk is dialed on the same port, so the seed's port would be ignored.
pub fn port_conflict(raw: &str, port: u16) -> Option<u16> {
    seed_port(raw).filter(|seed_port| *seed_port != port)
}

fn warn_on_port_conflict(raw: &str, port: u16) {
    if let Some(seed_port) = port_conflict(raw, port) {
        eprintln!(
            "{} '{}' names port {}, but every host is walked on port {} (use --port)",
            "⚠".yellow(),
            raw,
            seed_port,
            port
        );
    }
}

/// Expand `~` in a user-supplied output path
pub fn expand_output_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Route tracing to stderr; --verbose opens up debug diagnostics
pub fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Build walk options from parsed command-line arguments
pub fn build_walk_options(args: &ArgMatches) -> Result<WalkOptions, String> {
    let defaults = WalkOptions::default();
    let port = args.get_one::<u16>("port").copied().unwrap_or(defaults.port);

    let host = args.get_one::<String>("host");
    let hosts_file = args.get_one::<PathBuf>("hosts-file");
    let seeds = load_seeds_from_source(host, hosts_file, port)?;

    Ok(WalkOptions {
        seeds,
        port,
        timeout: args
            .get_one::<u64>("timeout")
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or(defaults.timeout),
        max_depth: args.get_one::<usize>("depth").copied().unwrap_or(defaults.max_depth),
        parallelism: args
            .get_one::<usize>("parallel")
            .copied()
            .unwrap_or(defaults.parallelism),
        show_progress: !args.get_flag("quiet") && !args.get_flag("verbose"),
    })
}

pub fn report_format(args: &ArgMatches) -> ReportFormat {
    args.get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text)
}

pub async fn handle_walk(args: &ArgMatches) {
    let verbose = args.get_flag("verbose");
    let quiet = args.get_flag("quiet");
    init_tracing(verbose);

    let options = match build_walk_options(args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };
    let seeds = options.seeds.clone();
    let format = report_format(args);

    if !quiet {
        eprintln!("{} Walking {} seed(s)", "→".blue(), seeds.len());
        eprintln!("  Port: {}", options.port);
        eprintln!("  Timeout: {}s", options.timeout.as_secs());
        eprintln!("  Max depth: {}", options.max_depth);
        eprintln!("  Workers: {}\n", options.parallelism);
    }

    let progress_callback = Arc::new(|msg: String| {
        tracing::debug!("{}", msg);
    });

    let result = match execute_walk(options, Some(progress_callback)).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    let report = match generate_report(format, &result, &seeds) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} Failed to render report: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    match args.get_one::<String>("output") {
        Some(raw_path) => {
            let path = expand_output_path(raw_path);
            if let Err(e) = save_report(&report, &path) {
                eprintln!(
                    "{} Failed to write {}: {}",
                    "✗".red().bold(),
                    path.display(),
                    e
                );
                std::process::exit(1);
            }
            if !quiet {
                eprintln!(
                    "{} Report saved to {}",
                    "✓".green().bold(),
                    path.display().to_string().bright_white()
                );
            }
        }
        None => print!("{}", report),
    }
}

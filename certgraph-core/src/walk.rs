use anyhow::{Context, Result};
use certgraph_scanner::{CertResolver, TlsResolver, WalkConfig, WalkResult, Walker};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Options for configuring a walk
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub seeds: Vec<String>,
    pub port: u16,
    pub timeout: Duration,
    pub max_depth: usize,
    pub parallelism: usize,
    pub show_progress: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        let config = WalkConfig::default();
        Self {
            seeds: vec!["localhost".to_string()],
            port: config.port,
            timeout: config.timeout,
            max_depth: config.max_depth,
            parallelism: config.parallelism,
            show_progress: false,
        }
    }
}

impl WalkOptions {
    pub fn config(&self) -> WalkConfig {
        WalkConfig {
            port: self.port,
            timeout: self.timeout,
            max_depth: self.max_depth,
            parallelism: self.parallelism,
        }
    }
}

/// Callback for status messages while a walk runs
pub type WalkProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Turn user input into a seed hostname. Accepts bare hosts
/// (`Example.com`), `host:port` and full URLs; only the host is kept.
pub fn normalize_seed(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if !raw.contains("://") && !raw.contains(['/', ':']) {
        return if raw.contains(char::is_whitespace) {
            None
        } else {
            Some(raw.to_lowercase())
        };
    }

    let url = if raw.contains("://") {
        Url::parse(raw).ok()?
    } else {
        Url::parse(&format!("https://{}", raw)).ok()?
    };

    url.host_str()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_lowercase())
        .filter(|host| !host.is_empty())
}

/// The port a seed spells out, if any. URLs without one report their
/// scheme's default; bare hostnames report nothing.
pub fn seed_port(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    if !raw.contains("://") && !raw.contains(['/', ':']) {
        return None;
    }

    let url = if raw.contains("://") {
        Url::parse(raw).ok()?
    } else {
        Url::parse(&format!("https://{}", raw)).ok()?
    };
    url.port_or_known_default()
}

/// Execute a walk over real TLS endpoints
pub async fn execute_walk(
    options: WalkOptions,
    progress_callback: Option<WalkProgressCallback>,
) -> Result<WalkResult> {
    execute_walk_with(TlsResolver::new(), options, progress_callback).await
}

/// Execute a walk with the given resolver.
/// Returns the finished graph and its stats
pub async fn execute_walk_with<R: CertResolver>(
    resolver: R,
    options: WalkOptions,
    progress_callback: Option<WalkProgressCallback>,
) -> Result<WalkResult> {
    let config = options.config();
    config.validate().context("invalid walk configuration")?;

    let progress_bar = if options.show_progress {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Starting walk...");
        Some(pb)
    } else {
        None
    };

    let mut walker = Walker::with_resolver(resolver).with_config(config);
    if let Some(ref pb) = progress_bar {
        let pb = pb.clone();
        walker = walker.with_progress_callback(Arc::new(move |count: usize, domain: String| {
            pb.set_message(format!("Walking... {} domains admitted ({})", count, domain));
        }));
    }

    if let Some(ref callback) = progress_callback {
        callback(format!(
            "Walking {} seed(s) on port {}",
            options.seeds.len(),
            options.port
        ));
    }

    let result = walker
        .walk_many(options.seeds.as_slice())
        .await
        .context("certificate walk failed");

    if let Some(ref pb) = progress_bar {
        match &result {
            Ok(r) => pb.finish_with_message(format!("Walk complete! {} domains found", r.graph.len())),
            Err(_) => pb.finish_and_clear(),
        }
    }

    let result = result?;
    log_summary(&result);
    Ok(result)
}

/// Log the end-of-walk summary (visible with --verbose)
pub fn log_summary(result: &WalkResult) {
    info!("Done...");
    info!("Found {} domains", result.graph.len());
    info!("Graph depth: {}", result.stats.dispatch.max_depth_seen);
    for (kind, count) in &result.stats.failures {
        info!("  {}: {}", kind, count);
    }
    info!("Elapsed: {:.2}s", result.stats.elapsed.as_secs_f64());
}

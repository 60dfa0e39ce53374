use crate::dispatcher::{Admission, Dispatcher};
use crate::domain::{DomainGraph, DomainNode, FrontierItem};
use crate::error::{FailureKind, Result, WalkError};
use crate::resolver::{CertResolver, TlsResolver, derive_neighbors};
use crate::result::{WalkResult, WalkStats};
use crate::tracker::{CompletionGuard, CompletionTracker};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Called with the running admission count and the domain just admitted.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

/// Capacity of the frontier and graph channels. Full queues push back on
/// workers rather than letting fan-out grow without bound.
const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkConfig {
    pub port: u16,
    pub timeout: Duration,
    pub max_depth: usize,
    pub parallelism: usize,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            port: 443,
            timeout: Duration::from_secs(5),
            max_depth: 20,
            parallelism: 10,
        }
    }
}

impl WalkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.parallelism < 1 {
            return Err(WalkError::InvalidParallelism(self.parallelism));
        }
        Ok(())
    }
}

/// Breadth-first walker over certificate hostnames.
///
/// One dispatcher (the `walk` future itself) owns the visited set, one
/// aggregator task owns the graph, and up to `parallelism` workers hold a
/// semaphore permit while talking to the network.
pub struct Walker<R: CertResolver> {
    resolver: Arc<R>,
    config: WalkConfig,
    progress_callback: Option<ProgressCallback>,
}

impl Walker<TlsResolver> {
    pub fn new() -> Self {
        Self::with_resolver(TlsResolver::new())
    }
}

impl Default for Walker<TlsResolver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CertResolver> Walker<R> {
    pub fn with_resolver(resolver: R) -> Self {
        Self {
            resolver: Arc::new(resolver),
            config: WalkConfig::default(),
            progress_callback: None,
        }
    }

    pub fn with_config(mut self, config: WalkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.config.parallelism = parallelism;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }


    pub async fn walk(&self, seed: &str) -> Result<WalkResult> {
        self.walk_many(&[seed]).await
    }

    /// Walk outward from every seed at once. Seeds share one visited set,
    /// so a host reachable from two seeds is resolved once.
    pub async fn walk_many<S: AsRef<str>>(&self, seeds: &[S]) -> Result<WalkResult> {
        self.config.validate()?;
        if seeds.is_empty() {
            return Err(WalkError::NoSeeds);
        }

        let started = Instant::now();
        let seeds: Vec<String> = seeds.iter().map(|s| s.as_ref().to_lowercase()).collect();
        info!(
            "Starting walk of {} seed(s) with {} workers, max depth {}",
            seeds.len(),
            self.config.parallelism,
            self.config.max_depth
        );

        let (frontier_tx, mut frontier_rx) = mpsc::channel::<FrontierItem>(QUEUE_CAPACITY);
        let (graph_tx, graph_rx) = mpsc::channel::<Resolved>(QUEUE_CAPACITY);
        let tracker = Arc::new(CompletionTracker::new());

        let aggregator = tokio::spawn(aggregate(graph_rx));

        tracker.add(seeds.len());
        let seed_tx = frontier_tx.clone();
        tokio::spawn(async move {
            for seed in seeds {
                if seed_tx.send(FrontierItem::seed(seed)).await.is_err() {
                    break;
                }
            }
        });

        let ctx = WorkerContext {
            resolver: self.resolver.clone(),
            permits: Arc::new(Semaphore::new(self.config.parallelism)),
            tracker: tracker.clone(),
            frontier: frontier_tx,
            graph: graph_tx,
            port: self.config.port,
            timeout: self.config.timeout,
        };

        let mut dispatcher = Dispatcher::new(self.config.max_depth);
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                Some(item) = frontier_rx.recv() => match dispatcher.admit(&item) {
                    Admission::Expand(domain) => {
                        if let Some(ref callback) = self.progress_callback {
                            callback(dispatcher.visited_count(), domain.clone());
                        }
                        let guard = tracker.guard();
                        workers.spawn(expand(ctx.clone(), domain, item.depth, guard));
                    }
                    Admission::Skip(reason) => {
                        debug!("Skipping {} ({:?})", item.domain, reason);
                        tracker.complete();
                    }
                },
                Some(joined) = workers.join_next() => {
                    if let Err(e) = joined {
                        warn!("Worker task failed: {}", e);
                    }
                }
                _ = tracker.wait_idle() => break,
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("Worker task failed: {}", e);
            }
        }

        // Last senders gone: the aggregator drains and hands back the graph.
        drop(ctx);
        let (graph, failures) = aggregator.await?;

        let stats = WalkStats {
            dispatch: dispatcher.stats(),
            failures,
            elapsed: started.elapsed(),
        };
        info!(
            "Walk complete. Found {} domains, graph depth {}",
            graph.len(),
            stats.dispatch.max_depth_seen
        );

        Ok(WalkResult::new(graph, stats))
    }
}

/// A finished node on its way to the aggregator.
struct Resolved {
    node: DomainNode,
    failure: Option<FailureKind>,
}

struct WorkerContext<R> {
    resolver: Arc<R>,
    permits: Arc<Semaphore>,
    tracker: Arc<CompletionTracker>,
    frontier: mpsc::Sender<FrontierItem>,
    graph: mpsc::Sender<Resolved>,
    port: u16,
    timeout: Duration,
}

impl<R> Clone for WorkerContext<R> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            permits: self.permits.clone(),
            tracker: self.tracker.clone(),
            frontier: self.frontier.clone(),
            graph: self.graph.clone(),
            port: self.port,
            timeout: self.timeout,
        }
    }
}

/// Resolve one admitted domain, commit its node and queue its neighbors.
/// `_done` completes the item however this returns.
async fn expand<R: CertResolver>(
    ctx: WorkerContext<R>,
    domain: String,
    depth: usize,
    _done: CompletionGuard,
) {
    let outcome = {
        let Ok(_permit) = ctx.permits.acquire().await else {
            return;
        };
        debug!("Visiting {} {}", depth, domain);
        ctx.resolver.resolve(&domain, ctx.port, ctx.timeout).await
    };

    let (neighbors, failure) = match outcome {
        Ok(chain) => (derive_neighbors(&chain), None),
        Err(e) => {
            debug!("{}: {} ({})", e.kind(), domain, e);
            (Vec::new(), Some(e.kind()))
        }
    };

    let node = DomainNode::new(domain, depth, neighbors.clone());
    if ctx.graph.send(Resolved { node, failure }).await.is_err() {
        warn!("Aggregator stopped before the walk finished");
    }

    for neighbor in neighbors {
        ctx.tracker.add(1);
        if ctx
            .frontier
            .send(FrontierItem::new(neighbor, depth + 1))
            .await
            .is_err()
        {
            ctx.tracker.complete();
            break;
        }
    }
}

async fn aggregate(
    mut nodes: mpsc::Receiver<Resolved>,
) -> (DomainGraph, BTreeMap<FailureKind, usize>) {
    let mut graph = DomainGraph::new();
    let mut failures = BTreeMap::new();

    while let Some(Resolved { node, failure }) = nodes.recv().await {
        if let Some(kind) = failure {
            *failures.entry(kind).or_insert(0) += 1;
        }
        if let Some(previous) = graph.insert(node) {
            warn!("{} was committed twice", previous.domain);
        }
    }

    (graph, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::resolver::CertificateObservation;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned SAN lists and records how many calls overlap.
    #[derive(Default)]
    struct MockResolver {
        certs: HashMap<String, Vec<String>>,
        refused: HashSet<String>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl MockResolver {
        fn new() -> Self {
            Self::default()
        }

        fn cert(mut self, host: &str, sans: &[&str]) -> Self {
            self.certs
                .insert(host.to_string(), sans.iter().map(|s| s.to_string()).collect());
            self
        }

        fn refuse(mut self, host: &str) -> Self {
            self.refused.insert(host.to_string());
            self
        }

        fn delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_for(&self, host: &str) -> usize {
            self.calls().iter().filter(|h| h.as_str() == host).count()
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CertResolver for MockResolver {
        async fn resolve(
            &self,
            host: &str,
            _port: u16,
            _timeout: Duration,
        ) -> std::result::Result<Vec<CertificateObservation>, ResolveError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(host.to_string());

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.refused.contains(host) {
                return Err(ResolveError::ConnectionRefused);
            }
            match self.certs.get(host) {
                Some(sans) => Ok(vec![CertificateObservation::new("", sans.clone())]),
                None => Err(ResolveError::UnknownHost(host.to_string())),
            }
        }
    }

    fn neighbors_of<'a>(result: &'a WalkResult, domain: &str) -> &'a [String] {
        &result.graph.get(domain).unwrap().neighbors
    }

    #[tokio::test]
    async fn test_chain_walk_with_self_references() {
        let resolver = MockResolver::new()
            .cert("a.test", &["a.test", "b.test"])
            .cert("b.test", &["b.test", "c.test"])
            .cert("c.test", &["c.test"]);

        let result = Walker::with_resolver(resolver).walk("a.test").await.unwrap();

        assert_eq!(result.graph.len(), 3);
        let a = result.graph.get("a.test").unwrap();
        assert_eq!(a.depth, 0);
        assert_eq!(a.neighbors, vec!["a.test", "b.test"]);
        let b = result.graph.get("b.test").unwrap();
        assert_eq!(b.depth, 1);
        assert_eq!(b.neighbors, vec!["b.test", "c.test"]);
        let c = result.graph.get("c.test").unwrap();
        assert_eq!(c.depth, 2);
        assert_eq!(c.neighbors, vec!["c.test"]);

        assert_eq!(result.stats.dispatch.admitted, 3);
        assert_eq!(result.stats.dispatch.max_depth_seen, 3);
        assert_eq!(result.stats.total_failures(), 0);
    }

    #[tokio::test]
    async fn test_mutual_references_terminate() {
        let resolver = MockResolver::new()
            .cert("a.test", &["b.test"])
            .cert("b.test", &["a.test"]);

        let walker = Walker::with_resolver(resolver);
        let result = walker.walk("a.test").await.unwrap();

        assert_eq!(result.graph.len(), 2);
        assert_eq!(walker.resolver.calls_for("a.test"), 1);
        assert_eq!(walker.resolver.calls_for("b.test"), 1);
    }

    #[tokio::test]
    async fn test_wildcard_collapses_to_one_node() {
        let resolver = MockResolver::new()
            .cert("seed.test", &["*.example.com", "example.com", "EXAMPLE.com"])
            .cert("example.com", &["*.example.com"]);

        let walker = Walker::with_resolver(resolver);
        let result = walker.walk("seed.test").await.unwrap();

        assert_eq!(
            neighbors_of(&result, "seed.test"),
            ["*.example.com", "example.com"]
        );
        assert_eq!(result.graph.len(), 2);
        assert!(result.graph.get("example.com").is_some());
        assert!(result.graph.get("*.example.com").is_none());
        assert_eq!(walker.resolver.calls_for("example.com"), 1);
    }

    #[tokio::test]
    async fn test_depth_bound_stops_expansion() {
        let resolver = MockResolver::new()
            .cert("a.test", &["b.test"])
            .cert("b.test", &["c.test"])
            .cert("c.test", &["d.test"]);

        let walker = Walker::with_resolver(resolver).with_max_depth(1);
        let result = walker.walk("a.test").await.unwrap();

        assert_eq!(result.graph.len(), 2);
        assert_eq!(result.graph.get("b.test").unwrap().depth, 1);
        assert_eq!(neighbors_of(&result, "b.test"), ["c.test"]);
        assert!(result.graph.get("c.test").is_none());
        assert!(result.graph.sorted().iter().all(|node| node.depth <= 1));
        assert_eq!(walker.resolver.calls_for("c.test"), 0);
        assert_eq!(result.stats.dispatch.skipped_depth, 1);
    }

    #[tokio::test]
    async fn test_depth_zero_resolves_only_the_seed() {
        let resolver = MockResolver::new().cert("a.test", &["a.test", "b.test"]);

        let walker = Walker::with_resolver(resolver).with_max_depth(0);
        let result = walker.walk("a.test").await.unwrap();

        assert_eq!(result.graph.len(), 1);
        assert_eq!(neighbors_of(&result, "a.test"), ["a.test", "b.test"]);
        assert_eq!(walker.resolver.calls(), vec!["a.test"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallelism_ceiling_is_respected() {
        let leaves: Vec<String> = (0..40).map(|i| format!("leaf{}.test", i)).collect();
        let leaf_refs: Vec<&str> = leaves.iter().map(String::as_str).collect();
        let mut resolver = MockResolver::new()
            .cert("hub.test", &leaf_refs)
            .delay(Duration::from_millis(20));
        for leaf in &leaves {
            resolver = resolver.cert(leaf, &[leaf.as_str(), "hub.test"]);
        }

        let walker = Walker::with_resolver(resolver).with_parallelism(4);
        let result = walker.walk("hub.test").await.unwrap();

        assert_eq!(result.graph.len(), 41);
        let peak = walker.resolver.peak();
        assert!(peak <= 4, "saw {} concurrent resolutions with 4 permits", peak);
        assert!(peak > 1, "expected resolutions to overlap, peak was {}", peak);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_permit_serializes_resolutions() {
        let resolver = MockResolver::new()
            .cert("hub.test", &["x.test", "y.test", "z.test"])
            .cert("x.test", &[])
            .cert("y.test", &[])
            .cert("z.test", &[])
            .delay(Duration::from_millis(10));

        let walker = Walker::with_resolver(resolver).with_parallelism(1);
        let result = walker.walk("hub.test").await.unwrap();

        assert_eq!(result.graph.len(), 4);
        assert_eq!(walker.resolver.peak(), 1);
    }

    #[tokio::test]
    async fn test_failed_host_does_not_stop_siblings() {
        let resolver = MockResolver::new()
            .cert("a.test", &["a.test", "b.test", "c.test"])
            .refuse("b.test")
            .cert("c.test", &["c.test", "d.test"])
            .cert("d.test", &["d.test"]);

        let result = Walker::with_resolver(resolver).walk("a.test").await.unwrap();

        assert_eq!(result.graph.len(), 4);
        assert!(neighbors_of(&result, "b.test").is_empty());
        assert_eq!(result.graph.get("d.test").unwrap().depth, 2);
        assert_eq!(result.stats.failures_of(FailureKind::ConnectionRefused), 1);
        assert_eq!(result.stats.total_failures(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_seed_yields_single_empty_node() {
        let result = Walker::with_resolver(MockResolver::new())
            .walk("nowhere.test")
            .await
            .unwrap();

        assert_eq!(result.graph.len(), 1);
        assert!(neighbors_of(&result, "nowhere.test").is_empty());
        assert_eq!(result.stats.failures_of(FailureKind::UnknownHost), 1);
    }

    #[tokio::test]
    async fn test_seed_is_lowercased() {
        let resolver = MockResolver::new().cert("a.test", &[]);
        let walker = Walker::with_resolver(resolver);
        let result = walker.walk("A.Test").await.unwrap();

        assert!(result.graph.get("a.test").is_some());
        assert_eq!(walker.resolver.calls(), vec!["a.test"]);
    }

    #[tokio::test]
    async fn test_zero_parallelism_is_rejected_up_front() {
        let resolver = MockResolver::new().cert("a.test", &["b.test"]);
        let walker = Walker::with_resolver(resolver).with_parallelism(0);

        let err = walker.walk("a.test").await.unwrap_err();
        assert!(matches!(err, WalkError::InvalidParallelism(0)));
        assert!(walker.resolver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_seeds_is_an_error() {
        let walker = Walker::with_resolver(MockResolver::new());
        let seeds: [&str; 0] = [];
        assert!(matches!(
            walker.walk_many(&seeds).await,
            Err(WalkError::NoSeeds)
        ));
    }

    #[tokio::test]
    async fn test_seeds_share_visited_set() {
        let resolver = MockResolver::new()
            .cert("a.test", &["shared.test"])
            .cert("b.test", &["shared.test"])
            .cert("shared.test", &[]);

        let walker = Walker::with_resolver(resolver);
        let result = walker.walk_many(&["a.test", "b.test"]).await.unwrap();

        assert_eq!(result.graph.len(), 3);
        assert_eq!(result.graph.get("a.test").unwrap().depth, 0);
        assert_eq!(result.graph.get("b.test").unwrap().depth, 0);
        assert_eq!(result.graph.get("shared.test").unwrap().depth, 1);
        assert_eq!(walker.resolver.calls_for("shared.test"), 1);
    }

    #[tokio::test]
    async fn test_wide_fan_out_beyond_queue_capacity() {
        let leaves: Vec<String> = (0..(QUEUE_CAPACITY * 3))
            .map(|i| format!("n{}.test", i))
            .collect();
        let leaf_refs: Vec<&str> = leaves.iter().map(String::as_str).collect();
        let mut resolver = MockResolver::new().cert("root.test", &leaf_refs);
        for leaf in &leaves {
            resolver = resolver.cert(leaf, &leaf_refs);
        }

        let result = Walker::with_resolver(resolver)
            .with_parallelism(8)
            .walk("root.test")
            .await
            .unwrap();

        assert_eq!(result.graph.len(), leaves.len() + 1);
    }

    #[tokio::test]
    async fn test_progress_callback_sees_each_admission() {
        let resolver = MockResolver::new()
            .cert("a.test", &["a.test", "b.test"])
            .cert("b.test", &["a.test"]);

        let seen: Arc<Mutex<Vec<(usize, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let walker = Walker::with_resolver(resolver).with_progress_callback(Arc::new(
            move |count, domain| {
                seen_clone.lock().unwrap().push((count, domain));
            },
        ));

        walker.walk("a.test").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![(1, "a.test".to_string()), (2, "b.test".to_string())]
        );
    }
}

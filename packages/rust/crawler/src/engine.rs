//! The crawl coordinator: one URL's probe → fetch → extract → dispatch cycle,
//! recursively resubmitted through the worker pool for every newly discovered
//! same-host child.
//!
//! Recursion past the root is always expressed as task submission, never a
//! direct call, so the pool's worker cap bounds the number of concurrently
//! active crawl nodes. Completion is driven purely by the outstanding-work
//! counter: when it returns to zero the report stream closes, exactly once,
//! regardless of traversal order or worker count.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::Client;
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use sitecrawler_shared::{LinkReport, Status, normalized_path};

use crate::extract::extract_links;
use crate::pool::{Submission, WorkerPool};
use crate::probe::{fetch_page, probe};
use crate::seen::SeenSet;

// ---------------------------------------------------------------------------
// WorkTracker
// ---------------------------------------------------------------------------

/// Counts dispatched-but-unfinished coordinator invocations for one run.
///
/// The counter never touches zero mid-run: a parent increments for each
/// child before its own decrement, so the only zero crossing is the real
/// end of the crawl.
#[derive(Debug, Default)]
pub struct WorkTracker {
    outstanding: AtomicUsize,
    idle: Notify,
}

impl WorkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one dispatched invocation.
    pub fn started(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    /// Record one finished invocation, waking idle waiters on the last one.
    pub fn finished(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Currently outstanding invocations.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Wait until the counter reaches zero. Subscribes before checking, so
    /// a final decrement racing this call is never missed.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// PageCrawler
// ---------------------------------------------------------------------------

/// Run-initiation entrypoint for a same-host crawl.
pub struct PageCrawler {
    /// Parsed root URL to crawl.
    pub target: Url,
    /// Maximum depth to descend; `<= 0` means unbounded.
    pub max_depth: i64,
    /// HTTP client used for every probe and fetch; its timeout bounds each
    /// network call.
    pub client: Client,
    /// Run-level cancellation signal, shared with the pool.
    pub cancel: CancellationToken,
}

impl PageCrawler {
    /// Start the crawl and return the stream of per-page reports.
    ///
    /// With `Some(pool)` every node past the root is dispatched through the
    /// pool; with `None` the traversal runs inline on a single task, for
    /// smaller workloads. The channel closes exactly once, when every
    /// dispatched node has finished. Reports arrive in no particular order.
    ///
    /// Must be called from within a tokio runtime.
    #[tracing::instrument(skip_all, fields(target = %self.target))]
    pub fn run(self, pool: Option<Arc<WorkerPool>>) -> UnboundedReceiver<LinkReport> {
        let (reports, rx) = mpsc::unbounded_channel();

        info!(
            max_depth = self.max_depth,
            pooled = pool.is_some(),
            "starting crawl"
        );

        let shared = Arc::new(CrawlShared {
            client: self.client,
            root: self.target.clone(),
            max_depth: self.max_depth,
            seen: SeenSet::new(),
            work: WorkTracker::new(),
            cancel: self.cancel,
            pool,
            reports,
        });

        let root = CrawlTask::new(Arc::clone(&shared), self.target, 0, None);

        // Single monitor per run: dispatch the root, then hold the last
        // reference to the report sender until the counter reaches zero.
        // Dropping it is what closes the stream — exactly once.
        tokio::spawn(async move {
            match &shared.pool {
                Some(pool) => {
                    if pool.add(root.run()).await.is_err() {
                        debug!("root dispatch rejected, run ends empty");
                    }
                }
                None => root.run().await,
            }

            shared.work.wait_idle().await;
            info!(visited = shared.seen.len(), "crawl complete");
        });

        rx
    }
}

// ---------------------------------------------------------------------------
// Shared run state and the per-dispatch task
// ---------------------------------------------------------------------------

/// Handles shared by reference across every coordinator invocation of a run.
/// Created at run start, discarded at run end, never reset in between.
struct CrawlShared {
    client: Client,
    root: Url,
    max_depth: i64,
    seen: SeenSet,
    work: WorkTracker,
    cancel: CancellationToken,
    pool: Option<Arc<WorkerPool>>,
    reports: UnboundedSender<LinkReport>,
}

impl CrawlShared {
    /// Push one report onto the run's output stream. A consumer that has
    /// dropped the receiver forfeits the rest of the stream.
    fn emit(&self, report: LinkReport) {
        if self.reports.send(report).is_err() {
            debug!("report receiver dropped, discarding");
        }
    }
}

/// Decrements the outstanding-work counter exactly once, on drop.
///
/// Lives inside the task value, so every way a task can end — normal
/// completion, cancellation mid-node, pool rejection, or being dropped
/// unrun from the pool's queue — settles the counter.
struct WorkGuard {
    shared: Arc<CrawlShared>,
}

impl WorkGuard {
    fn claim(shared: &Arc<CrawlShared>) -> Self {
        shared.work.started();
        Self {
            shared: Arc::clone(shared),
        }
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.shared.work.finished();
    }
}

/// One node's crawl task. Immutable after construction; a fresh value is
/// built for every dispatch, so no instance is ever shared or mutated
/// across invocations.
struct CrawlTask {
    target: Url,
    depth: i64,
    /// Status already probed by the parent while annotating children,
    /// carried along to avoid probing the same URL twice.
    status: Option<Status>,
    shared: Arc<CrawlShared>,
    _work: WorkGuard,
}

impl CrawlTask {
    fn new(shared: Arc<CrawlShared>, target: Url, depth: i64, status: Option<Status>) -> Self {
        let work = WorkGuard::claim(&shared);
        Self {
            target,
            depth,
            status,
            shared,
            _work: work,
        }
    }

    /// One full coordinator invocation for this node.
    ///
    /// Returned as a boxed future so the recursive dispatch below does not
    /// produce an infinitely-sized (and un-provable `Send`) opaque type.
    fn run(mut self) -> crate::pool::Task {
        Box::pin(async move {
        let shared = Arc::clone(&self.shared);

        // Depth budget exhausted: not an error, the node simply ends here.
        if shared.max_depth > 0 && self.depth >= shared.max_depth {
            return;
        }

        // Claim the path before any blocking I/O; the claim is atomic, so
        // concurrently dispatched duplicates lose here and emit nothing.
        let path = normalized_path(&self.target);
        if !shared.seen.claim(&path) {
            return;
        }

        if shared.cancel.is_cancelled() {
            return;
        }

        debug!(target = %self.target, depth = self.depth, "scanning");

        let status = match self.status.take() {
            Some(status) => status,
            None => tokio::select! {
                _ = shared.cancel.cancelled() => return,
                status = probe(&shared.client, &self.target) => status,
            },
        };

        let mut report = LinkReport::leaf(self.target.clone(), status);

        // Dead, or live but not worth fetching: terminal childless report.
        if !report.status.is_live || !report.status.is_crawlable {
            shared.emit(report);
            return;
        }

        let body = tokio::select! {
            _ = shared.cancel.cancelled() => return,
            fetched = fetch_page(&shared.client, &self.target) => match fetched {
                Ok(body) => body,
                Err(reason) => {
                    // The page died between probe and fetch. Downgrade
                    // liveness only; crawlable stays as probed.
                    report.status.is_live = false;
                    report.status.reason = Some(reason);
                    shared.emit(report);
                    return;
                }
            },
        };

        // Annotate the immediate same-host children with their own probed
        // status, so the emitted report is fully self-describing.
        for link in extract_links(&body, &self.target) {
            if !same_host(&link, &shared.root) {
                continue;
            }
            let status = tokio::select! {
                _ = shared.cancel.cancelled() => break,
                status = probe(&shared.client, &link) => status,
            };
            report.points_to.push(LinkReport::leaf(link, status));
        }

        let children = report.points_to.clone();
        shared.emit(report);

        let next_depth = self.depth + 1;
        for child in children {
            // The root marker is claimed at the start of every run.
            if normalized_path(&child.path) == "/" {
                continue;
            }
            if !child.status.is_crawlable {
                continue;
            }
            if shared.seen.has(&normalized_path(&child.path)) {
                continue;
            }

            let task = CrawlTask::new(
                Arc::clone(&shared),
                child.path,
                next_depth,
                Some(child.status),
            );
            match &shared.pool {
                Some(pool) => match pool.try_add(task.run()) {
                    Ok(Submission::Accepted) => {}
                    // Saturated pool: run the child here. This worker's own
                    // task is suspended meanwhile, so the concurrency cap
                    // holds, and a pool of one still makes progress.
                    Ok(Submission::Saturated(child)) => child.await,
                    // Rejection drops the task; its work guard settles the
                    // counter so the run cannot stall.
                    Err(_) => warn!("worker pool rejected child dispatch"),
                },
                None => task.run().await,
            }
        }
        })
    }
}

/// Same-host filter: host and effective port must both match, mirroring a
/// comparison of full `host:port` authorities.
fn same_host(candidate: &Url, root: &Url) -> bool {
    candidate.host_str() == root.host_str()
        && candidate.port_or_known_default() == root.port_or_known_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tokio::time::timeout;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> Client {
        Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .expect("build test client")
    }

    async fn mount_html(server: &MockServer, route: &str, body: &str) {
        Mock::given(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html"))
            .mount(server)
            .await;
    }

    /// The fixture graph:
    /// `/` → `/services`, `/contacts`; `/contacts` → `/`, `/services`,
    /// `/jsoncard`, external; `/services` → itself; `/jsoncard` is JSON.
    async fn fixture_site() -> MockServer {
        let server = MockServer::start().await;

        mount_html(
            &server,
            "/",
            r#"<html><body>
                <a href="/services">Services</a>
                <a href="/contacts">Contacts</a>
            </body></html>"#,
        )
        .await;

        mount_html(
            &server,
            "/services",
            r#"<html><body><a href="/services">Services</a></body></html>"#,
        )
        .await;

        mount_html(
            &server,
            "/contacts",
            r#"<html><body>
                <a href="/">Home</a>
                <a href="/services">Services</a>
                <a href="/jsoncard">Card</a>
                <a href="https://external.invalid/x">Elsewhere</a>
            </body></html>"#,
        )
        .await;

        Mock::given(path("/jsoncard"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"card":true}"#, "application/json"),
            )
            .mount(&server)
            .await;

        server
    }

    async fn collect(mut rx: UnboundedReceiver<LinkReport>) -> Vec<LinkReport> {
        timeout(Duration::from_secs(10), async move {
            let mut reports = Vec::new();
            while let Some(report) = rx.recv().await {
                reports.push(report);
            }
            reports
        })
        .await
        .expect("report stream closed in time")
    }

    fn paths_of(reports: &[LinkReport]) -> BTreeSet<String> {
        reports
            .iter()
            .map(|r| normalized_path(&r.path))
            .collect()
    }

    #[tokio::test]
    async fn full_crawl_visits_every_page_exactly_once() {
        let server = fixture_site().await;
        let cancel = CancellationToken::new();
        let pool = Arc::new(WorkerPool::new(4, cancel.child_token()));

        let crawler = PageCrawler {
            target: Url::parse(&server.uri()).unwrap(),
            max_depth: -1,
            client: client(),
            cancel,
        };

        let reports = collect(crawler.run(Some(Arc::clone(&pool)))).await;
        pool.stop().await;

        assert_eq!(reports.len(), 4);
        assert_eq!(
            paths_of(&reports),
            BTreeSet::from([
                "/".to_string(),
                "/services".to_string(),
                "/contacts".to_string(),
                "/jsoncard".to_string(),
            ])
        );

        // The JSON card is live but was never descended into.
        let card = reports
            .iter()
            .find(|r| normalized_path(&r.path) == "/jsoncard")
            .expect("jsoncard report");
        assert!(card.status.is_live);
        assert!(!card.status.is_crawlable);
        assert!(card.points_to.is_empty());

        // The external link never became a report of its own.
        assert!(
            reports
                .iter()
                .all(|r| r.path.host_str() != Some("external.invalid"))
        );
    }

    #[tokio::test]
    async fn visit_set_is_invariant_to_pool_size() {
        for workers in [1usize, 4] {
            let server = fixture_site().await;
            let cancel = CancellationToken::new();
            let pool = Arc::new(WorkerPool::new(workers, cancel.child_token()));

            let crawler = PageCrawler {
                target: Url::parse(&server.uri()).unwrap(),
                max_depth: -1,
                client: client(),
                cancel,
            };

            let reports = collect(crawler.run(Some(Arc::clone(&pool)))).await;
            pool.stop().await;

            assert_eq!(reports.len(), 4, "workers = {workers}");
        }
    }

    #[tokio::test]
    async fn single_threaded_mode_matches_pooled_mode() {
        let server = fixture_site().await;

        let crawler = PageCrawler {
            target: Url::parse(&server.uri()).unwrap(),
            max_depth: -1,
            client: client(),
            cancel: CancellationToken::new(),
        };

        let reports = collect(crawler.run(None)).await;
        assert_eq!(reports.len(), 4);
    }

    #[tokio::test]
    async fn depth_one_visits_only_the_root() {
        let server = fixture_site().await;
        let cancel = CancellationToken::new();
        let pool = Arc::new(WorkerPool::new(4, cancel.child_token()));

        let crawler = PageCrawler {
            target: Url::parse(&server.uri()).unwrap(),
            max_depth: 1,
            client: client(),
            cancel,
        };

        let reports = collect(crawler.run(Some(Arc::clone(&pool)))).await;
        pool.stop().await;

        assert_eq!(reports.len(), 1);
        assert_eq!(normalized_path(&reports[0].path), "/");
        // The root's report still carries its annotated children.
        assert!(!reports[0].points_to.is_empty());
    }

    #[tokio::test]
    async fn depth_two_stops_at_the_first_hop() {
        let server = fixture_site().await;
        let cancel = CancellationToken::new();
        let pool = Arc::new(WorkerPool::new(2, cancel.child_token()));

        let crawler = PageCrawler {
            target: Url::parse(&server.uri()).unwrap(),
            max_depth: 2,
            client: client(),
            cancel,
        };

        let reports = collect(crawler.run(Some(Arc::clone(&pool)))).await;
        pool.stop().await;

        // Root plus its direct children; /jsoncard hangs off /contacts at
        // depth 2 and is never dispatched.
        assert_eq!(
            paths_of(&reports),
            BTreeSet::from([
                "/".to_string(),
                "/services".to_string(),
                "/contacts".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_still_closes_the_stream() {
        let server = fixture_site().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = Arc::new(WorkerPool::new(4, cancel.child_token()));

        let crawler = PageCrawler {
            target: Url::parse(&server.uri()).unwrap(),
            max_depth: -1,
            client: client(),
            cancel,
        };

        let reports = collect(crawler.run(Some(Arc::clone(&pool)))).await;
        pool.wait_on_stop().await;

        // Zero or only the root's report, but the stream always closes.
        assert!(reports.len() <= 1);
    }

    #[tokio::test]
    async fn dead_root_emits_one_childless_report() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let crawler = PageCrawler {
            target: Url::parse(&server.uri()).unwrap(),
            max_depth: -1,
            client: client(),
            cancel: CancellationToken::new(),
        };

        let reports = collect(crawler.run(None)).await;
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].status.is_live);
        assert!(reports[0].points_to.is_empty());
    }

    #[tokio::test]
    async fn dead_children_are_annotated_but_not_crawled() {
        let server = MockServer::start().await;
        mount_html(
            &server,
            "/",
            r#"<html><a href="/missing">Missing</a></html>"#,
        )
        .await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let crawler = PageCrawler {
            target: Url::parse(&server.uri()).unwrap(),
            max_depth: -1,
            client: client(),
            cancel: CancellationToken::new(),
        };

        let reports = collect(crawler.run(None)).await;

        // Only the root reports; the dead child shows up annotated inside it.
        assert_eq!(reports.len(), 1);
        let child = &reports[0].points_to[0];
        assert_eq!(normalized_path(&child.path), "/missing");
        assert!(!child.status.is_live);
    }

    #[tokio::test]
    async fn work_tracker_wakes_idle_waiters() {
        let tracker = Arc::new(WorkTracker::new());
        tracker.started();

        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.wait_idle().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.finished();

        timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter woke")
            .expect("waiter task");
    }

    #[tokio::test]
    async fn work_tracker_is_immediately_idle_at_zero() {
        let tracker = WorkTracker::new();
        timeout(Duration::from_millis(100), tracker.wait_idle())
            .await
            .expect("already idle");
    }
}

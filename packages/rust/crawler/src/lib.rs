//! Same-host crawl engine.
//!
//! This crate provides:
//! - [`pool`] — Bounded-concurrency worker pool with lazy worker spawn
//! - [`seen`] — Concurrency-safe claimed-path set
//! - [`extract`] — HTML link extraction against a base URL
//! - [`probe`] — HEAD-based status probing and GET-based page fetching
//! - [`engine`] — The per-node crawl coordinator and run entrypoint

pub mod engine;
pub mod extract;
pub mod pool;
pub mod probe;
pub mod seen;

pub use engine::{PageCrawler, WorkTracker};
pub use extract::extract_links;
pub use pool::{Submission, Task, TaskRejected, WorkerPool};
pub use probe::{fetch_page, probe};
pub use seen::SeenSet;

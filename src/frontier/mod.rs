//! Frontier module for Sumi-Swarm
//!
//! The Frontier owns the dedup set and depth bookkeeping of a crawl job. It
//! turns seeds and discovered links into bounded, policy-filtered crawl
//! tasks, and settles frontier entries from crawl results and dead-lettered
//! tasks.

mod dedup;
mod master;
mod service;

pub use dedup::{DedupStore, FrontierEntry, Transition};
pub use master::{Frontier, FrontierStats};
pub use service::FrontierService;

use std::ops::AddAssign;

/// Counts returned by [`Frontier::submit_seeds`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// New entries that produced a task
    pub accepted: usize,
    /// URLs already in the dedup set
    pub already_seen: usize,
    /// New entries excluded by domain policy or the URL budget
    pub excluded: usize,
    /// Seeds that could not be canonicalized
    pub invalid: usize,
}

/// Counts returned by [`Frontier::ingest_discovered_links`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub accepted: usize,
    pub already_seen: usize,
    pub excluded: usize,
    /// Links beyond `max_depth`; no entry is created for them
    pub too_deep: usize,
    pub invalid: usize,
}

impl AddAssign for IngestOutcome {
    fn add_assign(&mut self, other: Self) {
        self.accepted += other.accepted;
        self.already_seen += other.already_seen;
        self.excluded += other.excluded;
        self.too_deep += other.too_deep;
        self.invalid += other.invalid;
    }
}

/// What happened to the entry a crawl result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultHandling {
    pub transition: Transition,
    pub links: IngestOutcome,
}

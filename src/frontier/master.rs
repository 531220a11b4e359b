//! Frontier core: admission, dispatch and settlement of frontier entries

use crate::config::FrontierConfig;
use crate::frontier::dedup::{DedupStore, FrontierEntry, Transition};
use crate::frontier::{IngestOutcome, ResultHandling, SubmitOutcome};
use crate::metrics::Counters;
use crate::model::{CancelFlag, CrawlJob, CrawlResult, CrawlTask, ResultOutcome};
use crate::queue::{publish_json, Queue, CRAWL_TASKS};
use crate::state::EntryState;
use crate::url::{canonicalize, extract_domain, DomainPolicy, PolicyDecision};
use crate::{Result, SwarmError};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// How a single URL was admitted
enum Admission {
    Accepted(CrawlTask),
    AlreadySeen,
    Excluded,
    TooDeep,
    Invalid,
}

/// Point-in-time view of a frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierStats {
    pub entries: usize,
    pub by_state: HashMap<EntryState, usize>,
    pub in_flight: usize,
    pub deferred: usize,
    pub urls_reserved: u64,
    pub max_urls: u64,
    pub cancelled: bool,
}

impl FrontierStats {
    pub fn count(&self, state: EntryState) -> usize {
        self.by_state.get(&state).copied().unwrap_or(0)
    }
}

impl fmt::Display for FrontierStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} entries (", self.entries)?;
        for (i, state) in EntryState::all_states().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", state, self.count(*state))?;
        }
        write!(
            f,
            "), budget {}/{}, in flight {}, deferred {}",
            self.urls_reserved, self.max_urls, self.in_flight, self.deferred
        )
    }
}

/// Frontier of one crawl job
///
/// Shared state is the dedup store (sharded locks), two atomics (URL budget
/// and in-flight count) and the deferral FIFO. All methods take `&self` and
/// may be called from any number of worker slots concurrently.
pub struct Frontier {
    job: CrawlJob,
    policy: DomainPolicy,
    store: DedupStore,
    max_in_flight: usize,
    in_flight: AtomicUsize,
    urls_reserved: AtomicU64,
    deferred: Mutex<VecDeque<CrawlTask>>,
    cancel: CancelFlag,
    queue: Arc<dyn Queue>,
    counters: Arc<Counters>,
}

impl Frontier {
    /// Creates the frontier for `job`
    ///
    /// # Returns
    ///
    /// * `Ok(Frontier)` - Ready to accept seeds
    /// * `Err(SwarmError::InvalidJob)` - The job failed validation
    pub fn new(
        job: CrawlJob,
        config: &FrontierConfig,
        queue: Arc<dyn Queue>,
        counters: Arc<Counters>,
    ) -> Result<Self> {
        job.validate()
            .map_err(|e| SwarmError::InvalidJob(e.to_string()))?;

        Ok(Self {
            policy: job.policy(),
            job,
            store: DedupStore::new(config.dedup_shards),
            max_in_flight: config.max_in_flight.max(1),
            in_flight: AtomicUsize::new(0),
            urls_reserved: AtomicU64::new(0),
            deferred: Mutex::new(VecDeque::new()),
            cancel: CancelFlag::new(),
            queue,
            counters,
        })
    }

    pub fn job(&self) -> &CrawlJob {
        &self.job
    }

    /// Submits seed URLs at depth 0
    ///
    /// Each seed is canonicalized and inserted into the dedup set if absent.
    /// New seeds within the domain policy and the URL budget become crawl
    /// tasks; the others are recorded as excluded entries.
    pub async fn submit_seeds<S: AsRef<str>>(&self, seeds: &[S]) -> Result<SubmitOutcome> {
        let mut outcome = SubmitOutcome::default();
        let mut tasks = Vec::new();

        for seed in seeds {
            match self.admit(seed.as_ref(), 0) {
                Admission::Accepted(task) => {
                    outcome.accepted += 1;
                    tasks.push(task);
                }
                Admission::AlreadySeen => outcome.already_seen += 1,
                Admission::Excluded => outcome.excluded += 1,
                Admission::TooDeep | Admission::Invalid => outcome.invalid += 1,
            }
        }

        tracing::info!(
            "Seeds submitted: {} accepted, {} already seen, {} excluded, {} invalid",
            outcome.accepted,
            outcome.already_seen,
            outcome.excluded,
            outcome.invalid
        );

        self.enqueue(tasks).await?;
        Ok(outcome)
    }

    /// Ingests the links found on a page at `parent_depth`
    ///
    /// Links deeper than `max_depth` are dropped before the dedup set is
    /// consulted, so no entry is created for them. Nothing is ingested once
    /// the job is cancelled.
    pub async fn ingest_discovered_links<I, S>(&self, parent_depth: u32, links: I) -> Result<IngestOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcome = IngestOutcome::default();
        if self.is_cancelled() {
            return Ok(outcome);
        }

        let depth = parent_depth.saturating_add(1);
        let mut tasks = Vec::new();

        for link in links {
            match self.admit(link.as_ref(), depth) {
                Admission::Accepted(task) => {
                    outcome.accepted += 1;
                    tasks.push(task);
                }
                Admission::AlreadySeen => outcome.already_seen += 1,
                Admission::Excluded => outcome.excluded += 1,
                Admission::TooDeep => outcome.too_deep += 1,
                Admission::Invalid => outcome.invalid += 1,
            }
        }

        self.enqueue(tasks).await?;
        Ok(outcome)
    }

    /// Settles the entry a crawl result belongs to
    ///
    /// Links of successful results are ingested first, then the entry moves
    /// to `done`, `excluded` or `failed`. A duplicate result finds the entry
    /// already terminal and changes nothing.
    pub async fn handle_result(&self, result: &CrawlResult) -> Result<ResultHandling> {
        let Some(entry) = self.store.get(&result.url) else {
            tracing::debug!("Result for unknown URL {} ignored", result.url);
            return Ok(ResultHandling {
                transition: Transition::Unknown,
                links: IngestOutcome::default(),
            });
        };

        let outcome = result.outcome();
        let links = if outcome == ResultOutcome::Success {
            self.ingest_discovered_links(
                entry.depth,
                result.extracted_links.iter().map(|link| link.url.as_str()),
            )
            .await?
        } else {
            IngestOutcome::default()
        };

        let target = match outcome {
            ResultOutcome::Success => EntryState::Done,
            ResultOutcome::Excluded => EntryState::Excluded,
            ResultOutcome::Failed => EntryState::Failed,
        };

        let transition = self.store.transition(&result.url, target);
        match transition {
            Transition::Applied { previous, .. } => {
                tracing::debug!("{}: {} -> {}", result.url, previous, target);
                if let Some(error) = &result.error {
                    tracing::info!("{} settled as {}: {}", result.url, target, error);
                }
                if previous == EntryState::Dispatched {
                    self.release_slot();
                    self.drain().await?;
                }
            }
            Transition::Refused { current } => {
                tracing::debug!("Duplicate result for {} ignored (already {})", result.url, current);
            }
            Transition::Unknown => {}
        }

        Ok(ResultHandling { transition, links })
    }

    /// Marks the entry of a dead-lettered task as failed
    ///
    /// The queue's delivery counter is the only attempt counter, so this is
    /// the only path by which a dispatched entry fails for redelivery
    /// exhaustion. Repeated dead letters for the same URL are no-ops.
    pub async fn handle_dead_letter(&self, task: &CrawlTask) -> Result<Transition> {
        let transition = self.store.transition(&task.url, EntryState::Failed);
        self.settle_exhausted(&task.url, "task", &transition).await?;
        Ok(transition)
    }

    /// Fails the entry of a dead-lettered crawl result that is still
    /// dispatched
    ///
    /// A result is dead-lettered when one of its consumers gave up on it.
    /// If the Frontier already settled the entry from another copy, nothing
    /// changes.
    pub async fn handle_result_dead_letter(&self, result: &CrawlResult) -> Result<Transition> {
        let transition = match self.store.get(&result.url) {
            Some(entry) if entry.state == EntryState::Dispatched => {
                self.store.transition(&result.url, EntryState::Failed)
            }
            Some(entry) => Transition::Refused {
                current: entry.state,
            },
            None => Transition::Unknown,
        };
        self.settle_exhausted(&result.url, "result", &transition).await?;
        Ok(transition)
    }

    async fn settle_exhausted(&self, url: &str, kind: &str, transition: &Transition) -> Result<()> {
        match *transition {
            Transition::Applied { previous, .. } => {
                self.counters.add_errors(1);
                tracing::warn!("QueueRedeliveryExhausted: {} ({}) marked failed", url, kind);
                if previous == EntryState::Dispatched {
                    self.release_slot();
                    self.drain().await?;
                }
            }
            Transition::Refused { current } => {
                tracing::debug!("Dead {} for {} ignored (already {})", kind, url, current);
            }
            Transition::Unknown => {
                tracing::debug!("Dead {} for unknown URL {} ignored", kind, url);
            }
        }
        Ok(())
    }

    /// Cancels the job
    ///
    /// No task is emitted afterwards and deferred tasks are dropped; their
    /// entries stay pending. Tasks already on the queue are left to drain.
    pub fn cancel(&self) {
        if self.cancel.cancel() {
            return;
        }
        let dropped = {
            let mut deferred = self.lock_deferred();
            let n = deferred.len();
            deferred.clear();
            n
        };
        tracing::info!("Crawl job cancelled, {} deferred tasks dropped", dropped);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The job's cancel flag, for crawler workers of the same process
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Returns true when nothing is deferred or in flight
    pub fn is_quiescent(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0 && self.lock_deferred().is_empty()
    }

    /// Tasks waiting for capacity plus tasks in flight
    pub fn backlog(&self) -> u64 {
        (self.in_flight.load(Ordering::SeqCst) + self.lock_deferred().len()) as u64
    }

    pub fn entry(&self, url: &str) -> Option<FrontierEntry> {
        self.store.get(url)
    }

    pub fn entries(&self) -> Vec<FrontierEntry> {
        self.store.entries()
    }

    pub fn stats(&self) -> FrontierStats {
        FrontierStats {
            entries: self.store.len(),
            by_state: self.store.count_by_state(),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            deferred: self.lock_deferred().len(),
            urls_reserved: self.urls_reserved.load(Ordering::SeqCst),
            max_urls: self.job.max_urls,
            cancelled: self.is_cancelled(),
        }
    }

    /// Decides what happens to one URL discovered at `depth`
    fn admit(&self, raw: &str, depth: u32) -> Admission {
        let url = match canonicalize(raw) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Skipping URL {}: {}", raw, e);
                return Admission::Invalid;
            }
        };

        if depth > self.job.max_depth {
            return Admission::TooDeep;
        }

        let Some(domain) = extract_domain(&url) else {
            return Admission::Invalid;
        };

        let decision = self.policy.decide(&domain);
        let initial = if decision.is_allowed() {
            EntryState::Pending
        } else {
            EntryState::Excluded
        };

        let entry = FrontierEntry::new(url.as_str(), depth, domain.as_str()).with_state(initial);
        if !self.store.insert_if_absent(entry) {
            return Admission::AlreadySeen;
        }

        if decision != PolicyDecision::Allowed {
            tracing::debug!("{} excluded by domain policy ({:?})", url, decision);
            return Admission::Excluded;
        }

        if !self.reserve_url() {
            self.store.transition(url.as_str(), EntryState::Excluded);
            tracing::debug!("{} excluded, URL budget of {} exhausted", url, self.job.max_urls);
            return Admission::Excluded;
        }

        Admission::Accepted(CrawlTask::new(
            url.as_str(),
            depth,
            &self.policy,
            self.job.max_depth,
            self.job.respect_robots,
        ))
    }

    fn reserve_url(&self) -> bool {
        let max = self.job.max_urls;
        self.urls_reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    fn reserve_slot(&self) -> bool {
        let max = self.max_in_flight;
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    fn release_slot(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn lock_deferred(&self) -> MutexGuard<'_, VecDeque<CrawlTask>> {
        self.deferred
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends tasks to the deferral FIFO and dispatches what capacity allows
    async fn enqueue(&self, tasks: Vec<CrawlTask>) -> Result<()> {
        if tasks.is_empty() || self.is_cancelled() {
            return Ok(());
        }
        self.lock_deferred().extend(tasks);
        self.drain().await
    }

    /// Publishes deferred tasks, oldest first, while in-flight capacity lasts
    async fn drain(&self) -> Result<()> {
        loop {
            if self.is_cancelled() || !self.reserve_slot() {
                return Ok(());
            }

            let next = self.lock_deferred().pop_front();
            let Some(task) = next else {
                self.release_slot();
                return Ok(());
            };

            self.dispatch(task).await;
        }
    }

    /// Publishes one task whose in-flight slot is already reserved
    async fn dispatch(&self, task: CrawlTask) {
        if !self
            .store
            .transition(&task.url, EntryState::Dispatched)
            .is_applied()
        {
            self.release_slot();
            return;
        }

        if let Err(e) = publish_json(self.queue.as_ref(), CRAWL_TASKS, &task).await {
            tracing::error!("Failed to publish task for {}: {}", task.url, e);
            self.counters.add_errors(1);
            self.store.transition(&task.url, EntryState::Failed);
            self.release_slot();
            return;
        }

        tracing::debug!("Dispatched {} at depth {}", task.url, task.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExtractedLink;
    use crate::queue::{declare_pipeline, MemoryQueue, CRAWLER_SUBSCRIPTION};
    use std::time::Duration;

    fn job(seeds: &[&str], max_depth: u32, deny: &[&str], max_urls: u64) -> CrawlJob {
        CrawlJob {
            seed_urls: seeds.iter().map(|s| s.to_string()).collect(),
            max_depth,
            allow_domains: vec![],
            deny_domains: deny.iter().map(|s| s.to_string()).collect(),
            max_urls,
            respect_robots: true,
        }
    }

    async fn frontier_with(job: CrawlJob, max_in_flight: usize) -> (Frontier, Arc<MemoryQueue>) {
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(30), 5));
        declare_pipeline(queue.as_ref()).await.unwrap();
        let config = FrontierConfig {
            max_in_flight,
            ..FrontierConfig::default()
        };
        let frontier = Frontier::new(job, &config, queue.clone(), Arc::new(Counters::new())).unwrap();
        (frontier, queue)
    }

    async fn drain_tasks(queue: &MemoryQueue) -> Vec<CrawlTask> {
        let mut tasks = Vec::new();
        while let Some(delivery) = queue
            .receive(CRAWLER_SUBSCRIPTION, Duration::from_millis(10))
            .await
            .unwrap()
        {
            tasks.push(delivery.decode().unwrap());
            queue.ack(&delivery.handle).await.unwrap();
        }
        tasks
    }

    fn success(url: &str, links: &[&str], depth: u32) -> CrawlResult {
        let mut result = CrawlResult::failure(url, "");
        result.error = None;
        result.status_code = Some(200);
        result.extracted_links = links
            .iter()
            .map(|l| ExtractedLink {
                url: l.to_string(),
                depth: depth + 1,
            })
            .collect();
        result
    }

    #[tokio::test]
    async fn test_seed_submitted_twice_emits_one_task() {
        let (frontier, queue) = frontier_with(job(&["http://a.test/"], 1, &[], 100), 10).await;

        let first = frontier.submit_seeds(&["http://a.test/"]).await.unwrap();
        let second = frontier.submit_seeds(&["http://A.test/#top"]).await.unwrap();

        assert_eq!(first.accepted, 1);
        assert_eq!(second.already_seen, 1);
        assert_eq!(drain_tasks(&queue).await.len(), 1);
    }

    #[tokio::test]
    async fn test_depth_bounded_scenario() {
        let (frontier, queue) = frontier_with(job(&["http://a.test/"], 1, &[], 100), 10).await;
        frontier.submit_seeds(&["http://a.test/"]).await.unwrap();

        let handled = frontier
            .handle_result(&success("http://a.test/", &["http://b.test/", "http://c.test/"], 0))
            .await
            .unwrap();
        assert_eq!(handled.links.accepted, 2);

        for url in ["http://b.test/", "http://c.test/"] {
            let handled = frontier
                .handle_result(&success(url, &["http://d.test/"], 1))
                .await
                .unwrap();
            assert_eq!(handled.links.too_deep, 1);
        }

        let tasks = drain_tasks(&queue).await;
        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|t| t.depth <= 1));
        assert_eq!(frontier.stats().entries, 3);
        assert!(frontier.entry("http://d.test/").is_none());
        assert_eq!(frontier.stats().count(EntryState::Done), 3);
        assert!(frontier.is_quiescent());
    }

    #[tokio::test]
    async fn test_denied_link_recorded_as_excluded() {
        let (frontier, queue) =
            frontier_with(job(&["http://a.test/"], 2, &["ads.test"], 100), 10).await;
        frontier.submit_seeds(&["http://a.test/"]).await.unwrap();

        let handled = frontier
            .handle_result(&success("http://a.test/", &["http://ads.test/x"], 0))
            .await
            .unwrap();

        assert_eq!(handled.links.excluded, 1);
        let entry = frontier.entry("http://ads.test/x").unwrap();
        assert_eq!(entry.state, EntryState::Excluded);
        assert_eq!(entry.depth, 1);

        let tasks = drain_tasks(&queue).await;
        assert_eq!(tasks.len(), 1);
        assert!(tasks.iter().all(|t| t.url != "http://ads.test/x"));
    }

    #[tokio::test]
    async fn test_url_budget() {
        let (frontier, queue) = frontier_with(job(&["http://a.test/"], 3, &[], 2), 10).await;
        frontier.submit_seeds(&["http://a.test/"]).await.unwrap();

        let outcome = frontier
            .ingest_discovered_links(0, ["http://a.test/1", "http://a.test/2", "http://a.test/3"])
            .await
            .unwrap();

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.excluded, 2);
        assert_eq!(drain_tasks(&queue).await.len(), 2);
        assert_eq!(frontier.stats().urls_reserved, 2);
    }

    #[tokio::test]
    async fn test_backpressure_defers_without_dropping() {
        let (frontier, queue) = frontier_with(job(&["http://a.test/"], 2, &[], 100), 1).await;
        frontier.submit_seeds(&["http://a.test/"]).await.unwrap();

        frontier
            .handle_result(&success("http://a.test/", &["http://a.test/x", "http://a.test/y"], 0))
            .await
            .unwrap();

        // Seed settled, one child dispatched, one waiting.
        let stats = frontier.stats();
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.count(EntryState::Pending), 1);

        frontier
            .handle_result(&success("http://a.test/x", &[], 1))
            .await
            .unwrap();
        let stats = frontier.stats();
        assert_eq!(stats.deferred, 0);
        assert_eq!(stats.count(EntryState::Dispatched), 1);

        let urls: Vec<String> = drain_tasks(&queue).await.into_iter().map(|t| t.url).collect();
        assert_eq!(urls, vec!["http://a.test/", "http://a.test/x", "http://a.test/y"]);
    }

    #[tokio::test]
    async fn test_dead_letter_fails_exactly_once() {
        let counters = Arc::new(Counters::new());
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(30), 2));
        declare_pipeline(queue.as_ref()).await.unwrap();
        let frontier = Frontier::new(
            job(&["http://a.test/"], 1, &[], 10),
            &FrontierConfig::default(),
            queue.clone(),
            counters.clone(),
        )
        .unwrap();
        frontier.submit_seeds(&["http://a.test/"]).await.unwrap();
        let task = drain_tasks(&queue).await.remove(0);

        for _ in 0..3 {
            frontier.handle_dead_letter(&task).await.unwrap();
        }

        assert_eq!(frontier.entry("http://a.test/").unwrap().state, EntryState::Failed);
        assert_eq!(counters.errors(), 1);
        assert_eq!(frontier.stats().count(EntryState::Done), 0);
        assert!(frontier.is_quiescent());

        // A late success does not resurrect the entry.
        let late = frontier.handle_result(&success("http://a.test/", &[], 0)).await.unwrap();
        assert!(matches!(late.transition, Transition::Refused { .. }));
    }

    #[tokio::test]
    async fn test_dead_result_fails_only_dispatched_entries() {
        let counters = Arc::new(Counters::new());
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(30), 2));
        declare_pipeline(queue.as_ref()).await.unwrap();
        let frontier = Frontier::new(
            job(&["http://a.test/", "http://b.test/"], 1, &[], 10),
            &FrontierConfig::default(),
            queue.clone(),
            counters.clone(),
        )
        .unwrap();
        frontier
            .submit_seeds(&["http://a.test/", "http://b.test/"])
            .await
            .unwrap();
        frontier
            .handle_result(&success("http://a.test/", &[], 0))
            .await
            .unwrap();

        // already settled from another copy
        let settled = frontier
            .handle_result_dead_letter(&success("http://a.test/", &[], 0))
            .await
            .unwrap();
        assert!(matches!(settled, Transition::Refused { current: EntryState::Done }));

        let dead = frontier
            .handle_result_dead_letter(&success("http://b.test/", &[], 0))
            .await
            .unwrap();
        assert!(dead.is_applied());
        assert_eq!(frontier.entry("http://b.test/").unwrap().state, EntryState::Failed);
        assert_eq!(counters.errors(), 1);
        assert!(frontier.is_quiescent());
    }

    #[tokio::test]
    async fn test_excluded_and_failed_results() {
        let (frontier, _queue) = frontier_with(
            job(&["http://a.test/", "http://b.test/"], 1, &[], 10),
            10,
        )
        .await;
        frontier
            .submit_seeds(&["http://a.test/", "http://b.test/"])
            .await
            .unwrap();

        let mut robots = CrawlResult::failure("http://a.test/", "RobotsDisallowed");
        robots.extracted_links = vec![ExtractedLink {
            url: "http://c.test/".into(),
            depth: 1,
        }];
        let handled = frontier.handle_result(&robots).await.unwrap();
        assert_eq!(handled.links, IngestOutcome::default());

        frontier
            .handle_result(&CrawlResult::failure("http://b.test/", "PermanentFetchError: HTTP 404"))
            .await
            .unwrap();

        assert_eq!(frontier.entry("http://a.test/").unwrap().state, EntryState::Excluded);
        assert_eq!(frontier.entry("http://b.test/").unwrap().state, EntryState::Failed);
        assert!(frontier.entry("http://c.test/").is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_emission() {
        let (frontier, queue) = frontier_with(job(&["http://a.test/"], 2, &[], 100), 1).await;
        frontier.submit_seeds(&["http://a.test/", "http://b.test/"]).await.unwrap();
        assert_eq!(frontier.stats().deferred, 1);

        frontier.cancel();
        assert!(frontier.is_cancelled());
        assert_eq!(frontier.stats().deferred, 0);

        let outcome = frontier
            .ingest_discovered_links(0, ["http://c.test/"])
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::default());
        assert_eq!(drain_tasks(&queue).await.len(), 1);
        assert_eq!(frontier.entry("http://b.test/").unwrap().state, EntryState::Pending);
    }

    #[tokio::test]
    async fn test_invalid_seeds_and_job() {
        let (frontier, _queue) = frontier_with(job(&["http://a.test/"], 1, &[], 10), 10).await;
        let outcome = frontier
            .submit_seeds(&["mailto:x@a.test", "not a url"])
            .await
            .unwrap();
        assert_eq!(outcome.invalid, 2);

        let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new(Duration::from_secs(1), 1));
        let result = Frontier::new(
            job(&[], 1, &[], 10),
            &FrontierConfig::default(),
            queue,
            Arc::new(Counters::new()),
        );
        assert!(matches!(result, Err(SwarmError::InvalidJob(_))));
    }
}

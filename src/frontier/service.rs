//! Frontier worker loop
//!
//! Consumes crawl results, dead-lettered tasks and dead-lettered results
//! and feeds them to the [`Frontier`]. A message is acknowledged only after
//! it was handled.

use crate::frontier::Frontier;
use crate::model::{CrawlResult, CrawlTask};
use crate::queue::{
    consume, Delivery, Handled, Queue, FRONTIER_DEAD_LETTER_SUBSCRIPTION,
    FRONTIER_RESULTS_DEAD_LETTER_SUBSCRIPTION, FRONTIER_SUBSCRIPTION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Runs the Frontier's consumers until shutdown
pub struct FrontierService {
    frontier: Arc<Frontier>,
    queue: Arc<dyn Queue>,
    slots: usize,
    receive_wait: Duration,
}

impl FrontierService {
    /// # Arguments
    ///
    /// * `frontier` - The frontier of the running job
    /// * `queue` - Queue carrying results and dead letters
    /// * `slots` - Concurrent result consumers
    /// * `receive_wait` - Longest a consumer blocks per receive call
    pub fn new(
        frontier: Arc<Frontier>,
        queue: Arc<dyn Queue>,
        slots: usize,
        receive_wait: Duration,
    ) -> Self {
        Self {
            frontier,
            queue,
            slots: slots.max(1),
            receive_wait,
        }
    }

    /// Consumes until `shutdown` turns true
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let mut workers = JoinSet::new();

        for slot in 0..self.slots {
            let frontier = Arc::clone(&self.frontier);
            let queue = Arc::clone(&self.queue);
            let shutdown = shutdown.clone();
            let wait = self.receive_wait;
            workers.spawn(async move {
                consume(queue, FRONTIER_SUBSCRIPTION, wait, shutdown, |delivery| {
                    handle_result_delivery(Arc::clone(&frontier), delivery)
                })
                .await;
                tracing::debug!("Frontier result slot {} stopped", slot);
            });
        }

        {
            let frontier = Arc::clone(&self.frontier);
            let queue = Arc::clone(&self.queue);
            let shutdown = shutdown.clone();
            let wait = self.receive_wait;
            workers.spawn(async move {
                consume(
                    queue,
                    FRONTIER_DEAD_LETTER_SUBSCRIPTION,
                    wait,
                    shutdown,
                    |delivery| handle_dead_letter_delivery(Arc::clone(&frontier), delivery),
                )
                .await;
            });
        }

        {
            let frontier = Arc::clone(&self.frontier);
            let queue = Arc::clone(&self.queue);
            let wait = self.receive_wait;
            workers.spawn(async move {
                consume(
                    queue,
                    FRONTIER_RESULTS_DEAD_LETTER_SUBSCRIPTION,
                    wait,
                    shutdown,
                    |delivery| handle_dead_result_delivery(Arc::clone(&frontier), delivery),
                )
                .await;
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Frontier worker panicked: {}", e);
            }
        }
    }
}

async fn handle_result_delivery(frontier: Arc<Frontier>, delivery: Delivery) -> Handled {
    let result: CrawlResult = match delivery.decode() {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!("Dropping undecodable crawl result: {}", e);
            return Handled::Ack;
        }
    };

    match frontier.handle_result(&result).await {
        Ok(_) => Handled::Ack,
        Err(e) => {
            tracing::error!("Failed to handle result for {}: {}", result.url, e);
            Handled::Retry
        }
    }
}

async fn handle_dead_letter_delivery(frontier: Arc<Frontier>, delivery: Delivery) -> Handled {
    let task: CrawlTask = match delivery.decode() {
        Ok(task) => task,
        Err(e) => {
            tracing::warn!("Dropping undecodable dead letter: {}", e);
            return Handled::Ack;
        }
    };

    match frontier.handle_dead_letter(&task).await {
        Ok(_) => Handled::Ack,
        Err(e) => {
            tracing::error!("Failed to handle dead letter for {}: {}", task.url, e);
            Handled::Retry
        }
    }
}

async fn handle_dead_result_delivery(frontier: Arc<Frontier>, delivery: Delivery) -> Handled {
    let result: CrawlResult = match delivery.decode() {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!("Dropping undecodable dead result: {}", e);
            return Handled::Ack;
        }
    };

    match frontier.handle_result_dead_letter(&result).await {
        Ok(_) => Handled::Ack,
        Err(e) => {
            tracing::error!("Failed to handle dead result for {}: {}", result.url, e);
            Handled::Retry
        }
    }
}

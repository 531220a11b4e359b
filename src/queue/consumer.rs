use crate::queue::{Delivery, Queue};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// What a consumer decided about a handled delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Done with the message; acknowledge it
    Ack,
    /// Leave it unacknowledged so the queue redelivers it
    Retry,
}

/// Receives from `subscription` until `shutdown` turns true, acking every
/// delivery the handler reports as [`Handled::Ack`]
pub async fn consume<F, Fut>(
    queue: Arc<dyn Queue>,
    subscription: &'static str,
    wait: Duration,
    shutdown: watch::Receiver<bool>,
    mut handle: F,
) where
    F: FnMut(Delivery) -> Fut,
    Fut: Future<Output = Handled>,
{
    while !*shutdown.borrow() {
        let delivery = match queue.receive(subscription, wait).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!("Receive on {} failed: {}", subscription, e);
                tokio::time::sleep(wait).await;
                continue;
            }
        };

        let handle_ref = delivery.handle.clone();
        if handle(delivery).await == Handled::Ack {
            if let Err(e) = queue.ack(&handle_ref).await {
                tracing::error!("Ack on {} failed: {}", subscription, e);
            }
        }
    }
}

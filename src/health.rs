//! Health endpoint
//!
//! `GET /health` answers 200 while the process can make progress and 503
//! once a fatal backend error was recorded or the backend stops answering.

use crate::queue::Queue;
use crate::storage::SearchBackend;
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Body of a health response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub queue_depth_estimate: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.reason.is_none()
    }
}

/// Process-wide health, shared by the workers and the endpoint
pub struct HealthState {
    fatal: RwLock<Option<String>>,
    queue: Arc<dyn Queue>,
    subscriptions: Vec<&'static str>,
    backend: Option<Arc<dyn SearchBackend>>,
}

impl HealthState {
    /// # Arguments
    ///
    /// * `queue` - Queue whose backlog is reported
    /// * `subscriptions` - Subscriptions summed into `queue_depth_estimate`
    pub fn new(queue: Arc<dyn Queue>, subscriptions: Vec<&'static str>) -> Self {
        Self {
            fatal: RwLock::new(None),
            queue,
            subscriptions,
            backend: None,
        }
    }

    /// Also probes `backend` on every check
    pub fn with_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Records a fatal error; the process stays unhealthy afterwards
    pub fn mark_fatal(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!("Marking process unhealthy: {}", reason);
        let mut fatal = self.fatal.write().unwrap_or_else(|p| p.into_inner());
        fatal.get_or_insert(reason);
    }

    pub fn fatal_reason(&self) -> Option<String> {
        self.fatal.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal_reason().is_some()
    }

    /// Checks health now
    pub async fn report(&self) -> HealthReport {
        let mut queue_depth_estimate = 0;
        for subscription in &self.subscriptions {
            match self.queue.depth_estimate(subscription).await {
                Ok(depth) => queue_depth_estimate += depth,
                Err(e) => tracing::debug!("No depth for {}: {}", subscription, e),
            }
        }

        let mut reason = self.fatal_reason();
        if reason.is_none() {
            if let Some(backend) = &self.backend {
                if let Err(e) = backend.ping().await {
                    reason = Some(format!("search backend unreachable: {}", e));
                }
            }
        }

        HealthReport {
            status: if reason.is_none() { "ok" } else { "unavailable" }.to_string(),
            queue_depth_estimate,
            reason,
        }
    }
}

#[get("/health")]
async fn health(state: web::Data<HealthState>) -> impl Responder {
    let report = state.report().await;
    if report.is_ok() {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::ServiceUnavailable().json(report)
    }
}

/// Registers the health routes on an actix-web app
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health);
}

/// Binds the health server to `bind` (e.g. `127.0.0.1:8080`)
///
/// The returned server must be awaited (or spawned) to serve requests.
pub fn serve(state: Arc<HealthState>, bind: &str) -> std::io::Result<actix_web::dev::Server> {
    let data = web::Data::from(state);
    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(configure))
        .workers(1)
        .disable_signals()
        .bind(bind)?
        .run();
    tracing::info!("Health endpoint listening on {}", bind);
    Ok(server)
}

//! Robots.txt handling module
//!
//! This module fetches, parses and caches robots.txt per origin so crawler
//! workers can honor disallow rules and crawl delays.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache, RobotsVerdict};
pub use parser::RobotsRules;

use tracing::{debug, warn};
use url::Url;

/// Fetches and parses the robots.txt of the origin of `url`
///
/// Never fails: a missing file, an error status or a network failure all
/// yield [`RobotsRules::allow_all`].
///
/// # Arguments
///
/// * `client` - HTTP client to use
/// * `url` - Any URL on the origin
/// * `user_agent` - Sent as the User-Agent header
pub async fn fetch_robots(client: &reqwest::Client, url: &Url, user_agent: &str) -> RobotsRules {
    let robots_url = match url.join("/robots.txt") {
        Ok(robots_url) => robots_url,
        Err(e) => {
            warn!(url = %url, error = %e, "Cannot build robots.txt URL");
            return RobotsRules::allow_all();
        }
    };

    let response = match client
        .get(robots_url.clone())
        .header(reqwest::header::USER_AGENT, user_agent)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %robots_url, error = %e, "robots.txt fetch failed, allowing all");
            return RobotsRules::allow_all();
        }
    };

    let status = response.status();
    if !status.is_success() {
        debug!(url = %robots_url, status = status.as_u16(), "No usable robots.txt, allowing all");
        return RobotsRules::allow_all();
    }

    match response.text().await {
        Ok(body) => RobotsRules::parse(&body),
        Err(e) => {
            warn!(url = %robots_url, error = %e, "Unreadable robots.txt body, allowing all");
            RobotsRules::allow_all()
        }
    }
}

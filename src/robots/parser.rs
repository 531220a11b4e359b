//! Robots exclusion rules
//!
//! Allow/disallow matching is delegated to the robotstxt crate; the
//! `Crawl-delay` extension is read here since the crate ignores it.

use robotstxt::DefaultMatcher;

/// One `User-agent` group and the crawl delay declared in it
#[derive(Debug, Clone, PartialEq)]
struct AgentGroup {
    agents: Vec<String>,
    crawl_delay: Option<f64>,
}

/// Robots exclusion rules of one origin
#[derive(Debug, Clone)]
pub struct RobotsRules {
    /// Raw robots.txt body; `None` allows everything
    body: Option<String>,
    groups: Vec<AgentGroup>,
}

impl RobotsRules {
    /// Parses a robots.txt body
    pub fn parse(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            groups: parse_groups(body),
        }
    }

    /// Rules that allow every path and declare no delay
    ///
    /// Used when robots.txt is missing, unreachable or answers with an error.
    pub fn allow_all() -> Self {
        Self {
            body: None,
            groups: Vec::new(),
        }
    }

    /// Returns true if the rules cannot disallow anything
    pub fn is_allow_all(&self) -> bool {
        self.body.as_deref().map_or(true, |body| body.trim().is_empty())
    }

    /// Checks an absolute URL against the rules for `user_agent`
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match self.body.as_deref() {
            Some(body) if !body.trim().is_empty() => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(body, user_agent, url)
            }
            _ => true,
        }
    }

    /// Crawl delay in seconds for `user_agent`
    ///
    /// A group naming the agent wins over the `*` group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        let agent = user_agent.to_lowercase();

        let specific = self
            .groups
            .iter()
            .filter(|group| {
                group
                    .agents
                    .iter()
                    .any(|name| name != "*" && agent.contains(name.as_str()))
            })
            .find_map(|group| group.crawl_delay);

        specific.or_else(|| {
            self.groups
                .iter()
                .filter(|group| group.agents.iter().any(|name| name == "*"))
                .find_map(|group| group.crawl_delay)
        })
    }
}

/// Splits a robots.txt body into user-agent groups
///
/// Consecutive `User-agent` lines share a group; any other directive closes
/// the run of agent lines so the next `User-agent` starts a new group.
fn parse_groups(body: &str) -> Vec<AgentGroup> {
    let mut groups: Vec<AgentGroup> = Vec::new();
    let mut collecting_agents = false;

    for line in body.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if !collecting_agents {
                    groups.push(AgentGroup {
                        agents: Vec::new(),
                        crawl_delay: None,
                    });
                    collecting_agents = true;
                }
                if let Some(group) = groups.last_mut() {
                    group.agents.push(value.to_lowercase());
                }
            }
            "crawl-delay" => {
                collecting_agents = false;
                if let (Some(group), Ok(delay)) = (groups.last_mut(), value.parse::<f64>()) {
                    if delay.is_finite() && delay >= 0.0 {
                        group.crawl_delay = Some(delay);
                    }
                }
            }
            _ => collecting_agents = false,
        }
    }

    groups
}

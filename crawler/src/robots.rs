use parking_lot::{Mutex, RwLock};
use reqwest::{header, Client, Url};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cached rules are refetched after this long.
const ROBOTS_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct Robots {
    fetched_at: Instant,
    allows: Vec<String>,
    disallows: Vec<String>,
    crawl_delay: Option<Duration>,
}

impl Robots {
    /// The advertised `Crawl-delay`, never longer than `cap`.
    pub fn crawl_delay(&self, cap: Duration) -> Option<Duration> {
        self.crawl_delay.map(|d| d.min(cap))
    }

    fn is_fresh(&self) -> bool { self.fetched_at.elapsed() < ROBOTS_TTL }
}

/// Per-origin robots.txt rules for the `*` user-agent group.
///
/// Concurrent lookups for an origin with no cached rules share one fetch.
#[derive(Default)]
pub struct RobotsCache {
    rules: RwLock<HashMap<String, Robots>>,
    fetching: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RobotsCache {
    fn cached(&self, origin: &str) -> Option<Robots> {
        self.rules.read().get(origin).filter(|r| r.is_fresh()).cloned()
    }

    pub async fn rules(&self, client: &Client, url: &Url, ua: &str) -> Robots {
        let origin = url.origin().ascii_serialization();
        if let Some(rules) = self.cached(&origin) {
            return rules;
        }
        let gate = self.fetching.lock().entry(origin.clone()).or_default().clone();
        let _fetch = gate.lock().await;
        // another worker may have filled the cache while we waited
        if let Some(rules) = self.cached(&origin) {
            return rules;
        }

        let robots_url = format!("{origin}/robots.txt");
        let txt = match client.get(&robots_url).header(header::USER_AGENT, ua).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            _ => String::new(),
        };
        let parsed = parse_robots(&txt);
        tracing::debug!(%origin, disallows = parsed.disallows.len(), crawl_delay = ?parsed.crawl_delay, "robots.txt cached");
        self.rules.write().insert(origin.clone(), parsed.clone());
        self.fetching.lock().remove(&origin);
        parsed
    }

    pub async fn allowed(&self, client: &Client, url: &Url, ua: &str) -> bool {
        path_allowed(url.path(), &self.rules(client, url, ua).await)
    }
}

fn parse_delay(val: &str) -> Option<Duration> {
    let secs = val.parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

pub fn parse_robots(txt: &str) -> Robots {
    // minimal parser for the '*' group
    let mut active = false;
    let mut allows = Vec::new();
    let mut disallows = Vec::new();
    let mut crawl_delay = None;
    for line in txt.lines() {
        let l = line.split('#').next().unwrap_or("").trim();
        if l.is_empty() { continue; }
        if let Some((k, v)) = l.split_once(':') {
            let key = k.trim().to_lowercase();
            let val = v.trim();
            match key.as_str() {
                "user-agent" => { active = val == "*"; }
                "allow" if active && !val.is_empty() => allows.push(val.to_string()),
                "disallow" if active && !val.is_empty() => disallows.push(val.to_string()),
                "crawl-delay" if active => crawl_delay = parse_delay(val),
                _ => {}
            }
        }
    }
    Robots { fetched_at: Instant::now(), allows, disallows, crawl_delay }
}

/// Longest matching Allow vs Disallow wins; Allow wins ties.
pub fn path_allowed(path: &str, rules: &Robots) -> bool {
    let longest = |patterns: &[String]| patterns.iter().filter(|p| path.starts_with(p.as_str())).map(String::len).max();
    match (longest(&rules.allows), longest(&rules.disallows)) {
        (Some(a), Some(d)) => a >= d,
        (_, None) => true,
        (None, Some(_)) => false,
    }
}

//! URL classification
//!
//! Classification is purely syntactic: host, path and query are inspected, no
//! network access happens. Hosts outside the supported set are rejected, while
//! well-formed URLs on a supported host that match no known shape are reported
//! as [`Category::Unknown`] so the caller can decide whether to fetch them anyway.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use url::Url;

use crate::error::ValidationError;
use crate::types::Category;

/// Hosts we classify and fetch from
pub const SUPPORTED_HOSTS: [&str; 5] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// Default number of cached classifications
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

const CHANNEL_PREFIXES: [&str; 3] = ["channel", "c", "user"];
const SINGLE_PREFIXES: [&str; 4] = ["shorts", "live", "embed", "v"];

/// Result of classifying one URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    /// Content category
    pub category: Category,
    /// Normalized identifier: video id, list id, `@handle` / `channel/<id>`, or path
    pub id: String,
    /// The input URL, trimmed
    pub url: String,
}

/// Classify a URL without caching
pub fn classify(input: &str) -> Result<Classification, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidUrl {
            url: input.to_string(),
            reason: "empty URL".to_string(),
        });
    }

    let url = Url::parse(trimmed).map_err(|e| ValidationError::InvalidUrl {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidUrl {
            url: trimmed.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    let host = url
        .host_str()
        .map(str::to_lowercase)
        .ok_or_else(|| ValidationError::InvalidUrl {
            url: trimmed.to_string(),
            reason: "missing host".to_string(),
        })?;

    if !SUPPORTED_HOSTS.contains(&host.as_str()) {
        return Err(ValidationError::UnsupportedHost { host });
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let (category, id) = if host == "youtu.be" {
        classify_short_link(&url, &segments)
    } else {
        classify_full_link(&url, &segments)
    };

    Ok(Classification {
        category,
        id,
        url: trimmed.to_string(),
    })
}

fn classify_short_link(url: &Url, segments: &[&str]) -> (Category, String) {
    if let Some(list) = query_value(url, "list") {
        return (Category::Collection, list);
    }
    match segments.first() {
        Some(id) if is_video_id(id) => (Category::Single, (*id).to_string()),
        _ => (Category::Unknown, url.path().to_string()),
    }
}

fn classify_full_link(url: &Url, segments: &[&str]) -> (Category, String) {
    if let Some(channel) = channel_id(segments) {
        return (Category::Channel, channel);
    }

    if let Some(list) = query_value(url, "list") {
        return (Category::Collection, list);
    }

    match segments {
        ["watch"] => {
            if let Some(v) = query_value(url, "v").filter(|v| is_video_id(v)) {
                return (Category::Single, v);
            }
        }
        [prefix, id, ..] if SINGLE_PREFIXES.contains(prefix) && is_video_id(id) => {
            return (Category::Single, (*id).to_string());
        }
        _ => {}
    }

    (Category::Unknown, url.path().to_string())
}

fn channel_id(segments: &[&str]) -> Option<String> {
    let first = segments.first()?;
    if let Some(handle) = first.strip_prefix('@') {
        return (!handle.is_empty()).then(|| format!("@{handle}"));
    }
    if CHANNEL_PREFIXES.contains(first) {
        let name = segments.get(1)?;
        return Some(format!("{first}/{name}"));
    }
    None
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}

fn is_video_id(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Bounded FIFO cache of successful classifications
#[derive(Debug, Default)]
struct ClassificationCache {
    entries: HashMap<String, Classification>,
    order: VecDeque<String>,
}

/// URL classifier with a bounded result cache
///
/// ```
/// use tea_dl::classifier::UrlClassifier;
/// use tea_dl::types::Category;
///
/// let classifier = UrlClassifier::default();
/// let c = classifier.classify("https://www.youtube.com/playlist?list=PL123").unwrap();
/// assert_eq!(c.category, Category::Collection);
/// assert_eq!(c.id, "PL123");
/// ```
#[derive(Debug)]
pub struct UrlClassifier {
    capacity: usize,
    cache: Mutex<ClassificationCache>,
}

impl Default for UrlClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl UrlClassifier {
    /// Create a classifier caching at most `capacity` results (0 disables caching)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            cache: Mutex::new(ClassificationCache::default()),
        }
    }

    /// Classify a URL, consulting the cache first
    ///
    /// Failures are never cached.
    pub fn classify(&self, url: &str) -> Result<Classification, ValidationError> {
        let key = url.trim();

        if let Ok(cache) = self.cache.lock()
            && let Some(hit) = cache.entries.get(key)
        {
            tracing::debug!(url = %key, category = %hit.category, "Classification cache hit");
            return Ok(hit.clone());
        }

        let result = classify(url)?;
        tracing::debug!(url = %key, category = %result.category, id = %result.id, "Classified URL");

        if self.capacity > 0
            && let Ok(mut cache) = self.cache.lock()
            && !cache.entries.contains_key(key)
        {
            while cache.order.len() >= self.capacity {
                match cache.order.pop_front() {
                    Some(oldest) => {
                        cache.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
            cache.order.push_back(key.to_string());
            cache.entries.insert(key.to_string(), result.clone());
        }

        Ok(result)
    }

    /// Number of cached classifications
    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.entries.len()).unwrap_or(0)
    }

    /// Drop every cached classification
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.entries.clear();
            cache.order.clear();
        }
    }
}

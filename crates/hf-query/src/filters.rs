//! Resolution of user-entered asset and event-type selectors
//!
//! A selector is matched exactly against an item's path (assets), name
//! (event types) or UUID. A selector wrapped in slashes, `/pattern/`, is a
//! regular expression; an invalid pattern or an empty selector matches
//! nothing.

use std::collections::BTreeSet;

use hf_core::{AssetIndex, EventType};
use regex::Regex;
use tracing::debug;
use uuid::Uuid;

/// A compiled selector
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    Pattern(Regex),
    Nothing,
}

impl Matcher {
    pub fn new(selector: &str) -> Self {
        if selector.is_empty() {
            return Matcher::Nothing;
        }
        let pattern = selector
            .strip_prefix('/')
            .and_then(|s| s.strip_suffix('/'))
            .filter(|p| !p.is_empty());
        match pattern {
            Some(pattern) => match Regex::new(pattern) {
                Ok(regex) => Matcher::Pattern(regex),
                Err(err) => {
                    debug!("ignoring selector {}: {}", selector, err);
                    Matcher::Nothing
                }
            },
            None => Matcher::Exact(selector.to_string()),
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Matcher::Exact(value) => value == candidate,
            Matcher::Pattern(regex) => regex.is_match(candidate),
            Matcher::Nothing => false,
        }
    }
}

/// Assets whose path or UUID matches any selector
pub fn filter_assets(assets: &AssetIndex, selectors: &[String]) -> Vec<Uuid> {
    let matchers: Vec<Matcher> = selectors.iter().map(|s| Matcher::new(s)).collect();
    let mut selected = BTreeSet::new();
    for asset in assets.iter() {
        let path = assets.path(&asset.uuid).unwrap_or_default();
        let uuid = asset.uuid.to_string();
        if matchers.iter().any(|m| m.matches(&path) || m.matches(&uuid)) {
            selected.insert(asset.uuid);
        }
    }
    selected.into_iter().collect()
}

/// Event types whose name or UUID matches any selector
pub fn filter_event_types(event_types: &[EventType], selectors: &[String]) -> Vec<Uuid> {
    let matchers: Vec<Matcher> = selectors.iter().map(|s| Matcher::new(s)).collect();
    let selected: BTreeSet<Uuid> = event_types
        .iter()
        .filter(|t| {
            let uuid = t.uuid.to_string();
            matchers.iter().any(|m| m.matches(&t.name) || m.matches(&uuid))
        })
        .map(|t| t.uuid)
        .collect();
    selected.into_iter().collect()
}

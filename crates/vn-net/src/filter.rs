//! URL-pattern rules that block or mock requests before they are sent.
//!
//! Rules are tried in order against `(hostname, pathname + search)`. The
//! first match resolves the context with a fresh copy of its configured
//! terminal state; the response body of a mock is single-read, so each match
//! gets its own.
//!
//! ```json
//! { "rules": [
//!     { "hostname": "^ads\\.example\\.com$", "action": "block" },
//!     { "hostname": "cdn\\.example\\.net", "pathname": "^/pixel",
//!       "action": { "mock": { "status": 204 } } }
//! ] }
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::callback::NetworkCallback;
use crate::context::{NetworkContext, NetworkState, Phase, Response};
use crate::error::NetworkError;
use crate::url::RequestUrl;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Invalid filter JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Terminal state a matching rule puts the request in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    /// FAILED, as if the network refused.
    Block,
    /// SUCCESS with a canned response.
    Mock(MockResponse),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MockResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

fn default_status() -> u16 {
    200
}

impl FilterAction {
    /// A new terminal state for a request to `url`.
    pub fn to_state(&self, url: &RequestUrl) -> NetworkState {
        match self {
            Self::Block => NetworkState::Failed(NetworkError::Blocked(url.href.clone())),
            Self::Mock(mock) => NetworkState::Success(
                Response::new(mock.status, mock.body.clone())
                    .with_headers(mock.headers.clone().into())
                    .with_url(url.href.clone()),
            ),
        }
    }
}

#[derive(Deserialize)]
struct FilterFile {
    rules: Vec<RuleEntry>,
}

#[derive(Deserialize)]
struct RuleEntry {
    hostname: String,
    #[serde(default)]
    pathname: Option<String>,
    action: FilterAction,
}

/// One `(hostname, pathname)` pattern pair.
#[derive(Debug, Clone)]
pub struct UrlRule {
    hostname: Regex,
    pathname: Option<Regex>,
    action: FilterAction,
}

impl UrlRule {
    /// `pathname` of `None` matches any path.
    pub fn new(hostname: &str, pathname: Option<&str>, action: FilterAction) -> Result<Self, FilterError> {
        Ok(Self {
            hostname: compile(hostname)?,
            pathname: pathname.map(compile).transpose()?,
            action,
        })
    }

    pub fn matches(&self, url: &RequestUrl) -> bool {
        self.hostname.is_match(&url.hostname)
            && self
                .pathname
                .as_ref()
                .map_or(true, |pathname| pathname.is_match(&url.path_and_search()))
    }

    pub fn action(&self) -> &FilterAction {
        &self.action
    }

    fn describe(&self) -> String {
        match &self.pathname {
            Some(pathname) => format!("{} {}", self.hostname, pathname),
            None => self.hostname.to_string(),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, FilterError> {
    Regex::new(pattern).map_err(|source| FilterError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Ordered URL rules, usable directly or as a [`NetworkCallback`].
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    rules: Vec<UrlRule>,
}

impl UrlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, FilterError> {
        let file: FilterFile = serde_json::from_str(json)?;
        let mut filter = Self::new();
        for entry in file.rules {
            filter.push(UrlRule::new(&entry.hostname, entry.pathname.as_deref(), entry.action)?);
        }
        log::debug!(target: "url_filter", "loaded {} rules", filter.len());
        Ok(filter)
    }

    pub fn push(&mut self, rule: UrlRule) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The first rule matching `url`.
    pub fn find(&self, url: &RequestUrl) -> Option<&UrlRule> {
        self.rules.iter().find(|rule| rule.matches(url))
    }

    /// Resolve an UNSENT context from the first matching rule. Returns whether
    /// a rule matched.
    pub fn apply(&self, ctx: &mut NetworkContext) -> bool {
        if !ctx.is_unsent() {
            return false;
        }
        match self.find(&ctx.url) {
            Some(rule) => {
                let state = rule.action.to_state(&ctx.url);
                log::debug!(
                    target: "url_filter",
                    "hit {} [{}] -> {}",
                    ctx.url,
                    rule.describe(),
                    state.name()
                );
                ctx.resolve(state);
                true
            }
            None => {
                log::trace!(target: "url_filter", "miss {}", ctx.url);
                false
            }
        }
    }
}

#[async_trait(?Send)]
impl NetworkCallback for UrlFilter {
    async fn handle(&self, ctx: &mut NetworkContext) -> Result<(), NetworkError> {
        if ctx.phase == Phase::Request {
            self.apply(ctx);
        }
        Ok(())
    }
}

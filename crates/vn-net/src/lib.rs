//! Veneer Network Interception
//!
//! Both of the page's request entry points, `fetch` and
//! `XMLHttpRequest.prototype.send`, funnel into one pipeline of
//! [`NetworkCallback`]s. A callback may block or mock a request before it
//! leaves, let it through untouched, or rewrite whatever comes back.
//!
//! - `url`: request URL parsing and resolution
//! - `context`: requests, responses and the per-request [`NetworkContext`]
//! - `host`: the native entry points over a [`Transport`]
//! - `interceptor`: [`NetworkInterceptor`], the pipeline itself
//! - `filter`: [`UrlFilter`], declarative block/mock rules

pub mod callback;
pub mod context;
pub mod error;
pub mod filter;
pub mod host;
pub mod interceptor;
pub mod url;

pub use callback::{NetworkCallback, SyncCallback};
pub use context::{Headers, NetworkContext, NetworkState, Phase, Request, RequestInit, Response};
pub use error::NetworkError;
pub use filter::{FilterAction, FilterError, MockResponse, UrlFilter, UrlRule};
pub use host::{NetworkHost, Transport};
pub use interceptor::NetworkInterceptor;
pub use url::RequestUrl;

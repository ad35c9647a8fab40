//! Veneer Core Library
//!
//! This crate provides the interception core for the Veneer content blocker:
//! the machinery that wraps native entry points, arbitrates between the rules
//! that want to observe or veto their calls, and fabricates stand-ins for
//! third-party APIs that were blocked from loading.
//!
//! # Architecture
//!
//! Everything runs on one thread, mirroring the page's event loop. Page-facing
//! primitives are dynamic [`Value`]s; globals and prototypes are [`Object`]
//! dispatch tables whose slots the [`HookRegistry`] rebinds to [`Hook`]
//! wrappers.
//!
//! # Modules
//!
//! - `value`, `object`, `function`, `promise`: the reflective value model
//! - `hook`: callback chains around one native function
//! - `registry`: ownership of hooked binding slots
//! - `proxy_chain`: self-extending fake objects
//! - `feature`: capability activation driven by persisted bitmasks
//! - `config`: persisted settings accessors
//! - `logger`: per-prefix `log` backend
//! - `error`: exceptions visible to page code

pub mod config;
pub mod error;
pub mod feature;
pub mod function;
pub mod hook;
pub mod logger;
pub mod object;
pub mod promise;
pub mod proxy_chain;
pub mod registry;
pub mod value;

// Re-export commonly used types
pub use error::{Error, Result};
pub use function::Function;
pub use hook::{CallContext, CallbackId, Execution, Hook, HookCallback, HookResult};
pub use object::{Object, Property};
pub use promise::Promise;
pub use proxy_chain::{Invoke, ProxyChain, ProxyChainOptions};
pub use registry::HookRegistry;
pub use value::{HostRef, Value};

//! Rules plugged into the request pipeline.

use async_trait::async_trait;

use crate::context::NetworkContext;
use crate::error::NetworkError;

/// A rule consulted on both passes of every request.
///
/// During [`Phase::Request`](crate::Phase) the context is UNSENT and a rule
/// may resolve it (block, mock) or set `passthrough`. During
/// [`Phase::Response`](crate::Phase) it sees the outcome and may rewrite it.
/// Errors propagate to the page unchanged.
#[async_trait(?Send)]
pub trait NetworkCallback {
    async fn handle(&self, ctx: &mut NetworkContext) -> Result<(), NetworkError>;
}

/// Adapter for rules that never suspend.
pub struct SyncCallback<F>(pub F);

impl<F> SyncCallback<F>
where
    F: Fn(&mut NetworkContext) -> Result<(), NetworkError>,
{
    pub fn new(callback: F) -> Self {
        Self(callback)
    }
}

#[async_trait(?Send)]
impl<F> NetworkCallback for SyncCallback<F>
where
    F: Fn(&mut NetworkContext) -> Result<(), NetworkError>,
{
    async fn handle(&self, ctx: &mut NetworkContext) -> Result<(), NetworkError> {
        (self.0)(ctx)
    }
}

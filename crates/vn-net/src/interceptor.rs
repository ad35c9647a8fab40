//! The request/response pipeline shared by `fetch` and `XMLHttpRequest`.
//!
//! Every request runs the same ordered callback list twice:
//!
//! 1. `on_request` builds an UNSENT [`NetworkContext`]. Callbacks run in
//!    order until one resolves the context or sets `passthrough`.
//! 2. If the context is still UNSENT, the original entry point performs the
//!    real request and its outcome becomes SUCCESS or FAILED.
//! 3. `on_response` runs the callbacks again over the outcome, stopping early
//!    on `passthrough`.
//!
//! The interception points are only bound while at least one callback is
//! registered. Both passes run inside the promise the wrapped entry point
//! returns, so they start when it is first awaited, not at call time.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use vn_core::{CallContext, CallbackId, Function, HookRegistry, HookResult, Object, Promise, Value};

use crate::callback::NetworkCallback;
use crate::context::{NetworkContext, Phase, Request, Response};
use crate::error::NetworkError;
use crate::host::{complete_xhr, xhr_request, NetworkHost, Transport};

type Installed = Vec<(Object, &'static str, CallbackId)>;

struct Inner {
    host: NetworkHost,
    registry: HookRegistry,
    callbacks: RefCell<Vec<(CallbackId, Rc<dyn NetworkCallback>)>>,
    hooks: RefCell<Installed>,
}

/// Ordered rule set governing every request a page makes.
#[derive(Clone)]
pub struct NetworkInterceptor {
    inner: Rc<Inner>,
}

impl NetworkInterceptor {
    pub fn new(host: NetworkHost, registry: HookRegistry) -> Self {
        Self {
            inner: Rc::new(Inner {
                host,
                registry,
                callbacks: RefCell::new(Vec::new()),
                hooks: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn host(&self) -> &NetworkHost {
        &self.inner.host
    }

    pub fn add_callback<C>(&self, callback: C) -> vn_core::Result<CallbackId>
    where
        C: NetworkCallback + 'static,
    {
        self.add_shared_callback(Rc::new(callback))
    }

    /// Append a callback; the first one binds the `fetch` and
    /// `XMLHttpRequest.prototype.send` hooks.
    pub fn add_shared_callback(&self, callback: Rc<dyn NetworkCallback>) -> vn_core::Result<CallbackId> {
        if self.inner.hooks.borrow().is_empty() {
            self.inner.install_hooks()?;
        }
        let id = CallbackId::next();
        self.inner.callbacks.borrow_mut().push((id, callback));
        log::debug!(target: "net", "callback {id:?} registered");
        Ok(id)
    }

    /// Remove a callback; the last one unbinds the hooks and restores the
    /// original entry points.
    pub fn remove_callback(&self, id: CallbackId) -> bool {
        let removed = {
            let mut callbacks = self.inner.callbacks.borrow_mut();
            let before = callbacks.len();
            callbacks.retain(|(cid, _)| *cid != id);
            callbacks.len() != before
        };
        if removed {
            log::debug!(target: "net", "callback {id:?} removed");
            if self.inner.callbacks.borrow().is_empty() {
                self.inner.uninstall_hooks();
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.callbacks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Request pass: returns the context, UNSENT unless a callback decided.
    pub async fn on_request(&self, request: Request) -> Result<NetworkContext, NetworkError> {
        self.inner.on_request(request).await
    }

    /// Response pass over a resolved context.
    pub async fn on_response(&self, ctx: &mut NetworkContext) -> Result<(), NetworkError> {
        self.inner.on_response(ctx).await
    }

    /// Run the whole pipeline against `transport`, without going through any
    /// page entry point.
    pub async fn execute(&self, request: Request, transport: &dyn Transport) -> Result<NetworkContext, NetworkError> {
        let mut ctx = self.inner.on_request(request).await?;
        if ctx.is_unsent() {
            match transport.send(ctx.request.clone()).await {
                Ok(response) => ctx.succeed(response),
                Err(err) => ctx.fail(err),
            };
        }
        self.inner.on_response(&mut ctx).await?;
        Ok(ctx)
    }
}

impl Inner {
    fn snapshot(&self) -> Vec<Rc<dyn NetworkCallback>> {
        self.callbacks.borrow().iter().map(|(_, cb)| cb.clone()).collect()
    }

    async fn on_request(&self, request: Request) -> Result<NetworkContext, NetworkError> {
        let mut ctx = NetworkContext::new(request);
        for callback in self.snapshot() {
            if ctx.passthrough || !ctx.is_unsent() {
                break;
            }
            callback.handle(&mut ctx).await?;
        }
        log::debug!(
            target: "net",
            "{} {}: {}{}",
            ctx.request.method,
            ctx.url,
            ctx.state().name(),
            if ctx.passthrough { " (passthrough)" } else { "" }
        );
        Ok(ctx)
    }

    async fn on_response(&self, ctx: &mut NetworkContext) -> Result<(), NetworkError> {
        ctx.phase = Phase::Response;
        for callback in self.snapshot() {
            if ctx.passthrough {
                break;
            }
            callback.handle(ctx).await?;
        }
        Ok(())
    }

    fn install_hooks(self: &Rc<Self>) -> vn_core::Result<()> {
        let global = self.host.global().clone();
        let fetch = self.registry.attach(&global, "fetch")?;
        let weak = Rc::downgrade(self);
        let fetch_id = fetch.add(move |ctx| fetch_adapter(&weak, ctx));

        let proto = self.host.xhr_prototype().clone();
        let send = match self.registry.attach(&proto, "send") {
            Ok(send) => send,
            Err(err) => {
                fetch.remove(fetch_id);
                return Err(err);
            }
        };
        let weak = Rc::downgrade(self);
        let send_id = send.add(move |ctx| xhr_adapter(&weak, ctx));

        *self.hooks.borrow_mut() = vec![(global, "fetch", fetch_id), (proto, "send", send_id)];
        log::debug!(target: "net", "fetch/XMLHttpRequest hooks installed");
        Ok(())
    }

    fn uninstall_hooks(&self) {
        let installed = std::mem::take(&mut *self.hooks.borrow_mut());
        for (target, key, id) in installed {
            if let Some(hook) = self.registry.hook_for(&target, key) {
                hook.remove(id);
            }
        }
        log::debug!(target: "net", "fetch/XMLHttpRequest hooks removed");
    }
}

// =============================================================================
// Adapters
// =============================================================================

/// Run the original entry point and take ownership of the response it
/// produced.
async fn call_origin(origin: &Function, this: &Value, args: &[Value]) -> Result<Response, NetworkError> {
    let value = origin.call(this, args)?.resolve().await?;
    match Response::from_value(&value) {
        Some(response) => Response::into_owned(response),
        None => Err(NetworkError::Script(vn_core::Error::type_error(format!(
            "{} did not produce a Response",
            origin.name()
        )))),
    }
}

fn settle_with_origin(ctx: &mut NetworkContext, outcome: Result<Response, NetworkError>) {
    match outcome {
        Ok(response) => ctx.succeed(response),
        Err(err) => ctx.fail(err),
    };
}

/// `fetch` hook: answers immediately with a promise driving the pipeline.
fn fetch_adapter(weak: &Weak<Inner>, ctx: &mut CallContext) -> vn_core::Result<HookResult> {
    let Some(inner) = weak.upgrade() else {
        return Ok(HookResult::EXECUTION_IGNORE);
    };
    let request = match Request::from_fetch_args(&ctx.args, inner.host.base_url()) {
        Ok(request) => request,
        Err(err) => {
            ctx.return_value = Value::Promise(Promise::reject(err.into()));
            return Ok(HookResult::EXECUTION_RETURN);
        }
    };

    let origin = ctx.origin.clone();
    let this = ctx.this.clone();
    ctx.return_value = Value::Promise(Promise::new(async move {
        let mut nctx = inner.on_request(request).await?;
        if nctx.is_unsent() {
            let args = [nctx.request.to_value()];
            let outcome = call_origin(&origin, &this, &args).await;
            settle_with_origin(&mut nctx, outcome);
        }
        inner.on_response(&mut nctx).await?;
        Ok(nctx.into_response()?.into_value())
    }));
    Ok(HookResult::EXECUTION_RETURN)
}

/// `XMLHttpRequest.prototype.send` hook: same pipeline, with the outcome
/// written into the XHR instance.
fn xhr_adapter(weak: &Weak<Inner>, ctx: &mut CallContext) -> vn_core::Result<HookResult> {
    let Some(inner) = weak.upgrade() else {
        return Ok(HookResult::EXECUTION_IGNORE);
    };
    let request = xhr_request(&ctx.this, &ctx.args, inner.host.base_url())?;

    let origin = ctx.origin.clone();
    let this = ctx.this.clone();
    let args = ctx.args.clone();
    ctx.return_value = Value::Promise(Promise::new(async move {
        let mut nctx = inner.on_request(request).await?;
        if nctx.is_unsent() {
            let outcome = call_origin(&origin, &this, &args).await;
            settle_with_origin(&mut nctx, outcome);
        }
        inner.on_response(&mut nctx).await?;
        complete_xhr(&this, nctx.into_response())
    }));
    Ok(HookResult::EXECUTION_RETURN)
}

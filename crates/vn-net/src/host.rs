//! Native networking entry points.
//!
//! [`NetworkHost`] installs `fetch` and an `XMLHttpRequest` prototype on a
//! global object, both backed by a [`Transport`]. These are the originals the
//! interceptor wraps; page code calls them through the global's slots.
//!
//! `fetch(..)` and `xhr.send(..)` return a promise without doing any work.
//! The request (and, once intercepted, every callback pass) starts when the
//! promise is first awaited, and all awaiters share that single run. A
//! promise nobody awaits never touches the network.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use vn_core::{Error, HostRef, Object, Promise, Value};

use crate::context::{Headers, Request, RequestInit, Response};
use crate::error::NetworkError;

/// The real network.
#[async_trait(?Send)]
pub trait Transport {
    async fn send(&self, request: Request) -> Result<Response, NetworkError>;
}

/// Handle to the networking globals of one page.
#[derive(Clone)]
pub struct NetworkHost {
    global: Object,
    xhr_prototype: Object,
    base_url: Option<Rc<str>>,
}

impl NetworkHost {
    /// Define `fetch` and `XMLHttpRequest` on `global`. Relative URLs resolve
    /// against `base_url`, the page location.
    pub fn install(global: &Object, transport: Rc<dyn Transport>, base_url: Option<&str>) -> Self {
        let base_url: Option<Rc<str>> = base_url.map(Rc::from);

        let fetch_transport = transport.clone();
        let fetch_base = base_url.clone();
        global.define_method("fetch", move |_, args| {
            let request = match Request::from_fetch_args(args, fetch_base.as_deref()) {
                Ok(request) => request,
                Err(err) => return Ok(Value::Promise(Promise::reject(err.into()))),
            };
            let transport = fetch_transport.clone();
            Ok(Value::Promise(Promise::new(async move {
                log::trace!(target: "net", "fetch {} {}", request.method, request.url);
                let mut response = transport.send(request.clone()).await?;
                if response.url.is_empty() {
                    response.url = request.url.href;
                }
                Ok(response.into_value())
            })))
        });

        let xhr_prototype = Object::new();
        install_xhr_natives(&xhr_prototype, transport, base_url.clone());
        let constructor = Object::new();
        constructor.define_value("prototype", xhr_prototype.clone());
        global.define_value("XMLHttpRequest", constructor);

        Self {
            global: global.clone(),
            xhr_prototype,
            base_url,
        }
    }

    pub fn global(&self) -> &Object {
        &self.global
    }

    /// `XMLHttpRequest.prototype`.
    pub fn xhr_prototype(&self) -> &Object {
        &self.xhr_prototype
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// `new XMLHttpRequest()`.
    pub fn create_xhr(&self) -> Value {
        let object = Object::with_proto(&self.xhr_prototype);
        object.define_value("readyState", 0);
        object.define_value("status", 0);
        object.define_value("responseText", "");
        Value::Host(HostRef::new(Rc::new(XhrState::default())).with_object(object))
    }

    /// `fetch(input, init)` through whatever is bound at `global.fetch`.
    /// Nothing is sent until the returned promise is awaited.
    pub fn fetch(&self, input: &str, init: Option<Object>) -> Result<Value, Error> {
        let mut args = vec![Value::from(input)];
        if let Some(init) = init {
            args.push(Value::Object(init));
        }
        Value::Object(self.global.clone()).call_method("fetch", &args)
    }
}

// =============================================================================
// XMLHttpRequest
// =============================================================================

#[derive(Default)]
struct XhrState {
    method: RefCell<String>,
    url: RefCell<Option<String>>,
    headers: RefCell<Headers>,
}

fn xhr_state(this: &Value) -> Result<Rc<XhrState>, Error> {
    this.downcast_host::<XhrState>()
        .ok_or_else(|| Error::type_error("Illegal invocation"))
}

/// The request a pending `xhr.send(body)` will issue.
pub(crate) fn xhr_request(this: &Value, args: &[Value], base: Option<&str>) -> Result<Request, NetworkError> {
    let state = xhr_state(this)?;
    let url = state.url.borrow().clone().ok_or_else(|| {
        NetworkError::Script(Error::thrown(
            "InvalidStateError",
            "Failed to execute 'send' on 'XMLHttpRequest': The object's state must be OPENED.",
        ))
    })?;
    let method = state.method.borrow().clone();
    let body = match args.first() {
        Some(Value::String(body)) => Some(body.clone()),
        Some(value) if !value.is_nullish() => Some(value.describe()),
        // GET and HEAD drop the body instead of failing
        _ => None,
    }
    .filter(|_| !matches!(method.to_ascii_uppercase().as_str(), "GET" | "HEAD"));

    let init = RequestInit {
        method: Some(method),
        headers: Default::default(),
        body,
    };
    let mut request = Request::new(&url, init, base)?;
    request.headers = state.headers.borrow().clone();
    Ok(request)
}

/// Write the outcome of a request into the XHR instance, moving it to DONE.
pub(crate) fn complete_xhr(this: &Value, outcome: Result<Response, NetworkError>) -> Result<Value, Error> {
    let object = this
        .as_host()
        .and_then(HostRef::object)
        .cloned()
        .ok_or_else(|| Error::type_error("Illegal invocation"))?;

    match outcome {
        Ok(response) => {
            let text = response.try_clone()?.text()?;
            object.define_value("status", f64::from(response.status));
            object.define_value("statusText", response.status_text.as_str());
            object.define_value("responseURL", response.url.as_str());
            object.define_value("responseText", text);
            object.define_value("readyState", 4);
            Ok(response.into_value())
        }
        Err(err) => {
            object.define_value("status", 0);
            object.define_value("responseText", "");
            object.define_value("readyState", 4);
            Err(err.into())
        }
    }
}

fn install_xhr_natives(proto: &Object, transport: Rc<dyn Transport>, base_url: Option<Rc<str>>) {
    proto.define_method("open", |this, args| {
        let state = xhr_state(this)?;
        let method = args.first().and_then(Value::as_str).unwrap_or("GET");
        let url = args
            .get(1)
            .map(Value::to_primitive)
            .and_then(|url| url.as_str().map(str::to_string))
            .ok_or_else(|| Error::type_error("Failed to execute 'open' on 'XMLHttpRequest': 2 arguments required."))?;
        *state.method.borrow_mut() = method.to_string();
        *state.url.borrow_mut() = Some(url);
        *state.headers.borrow_mut() = Headers::new();
        this.set("readyState", Value::from(1))?;
        Ok(Value::Undefined)
    });

    proto.define_method("setRequestHeader", |this, args| {
        let state = xhr_state(this)?;
        match (args.first().and_then(Value::as_str), args.get(1).and_then(Value::as_str)) {
            (Some(name), Some(value)) => {
                state.headers.borrow_mut().append(name, value);
                Ok(Value::Undefined)
            }
            _ => Err(Error::type_error(
                "Failed to execute 'setRequestHeader' on 'XMLHttpRequest': 2 arguments required.",
            )),
        }
    });

    // Resolves once the request is DONE, standing in for the load/error events.
    proto.define_method("send", move |this, args| {
        let request = match xhr_request(this, args, base_url.as_deref()) {
            Ok(request) => request,
            Err(err) => return Err(err.into()),
        };
        let transport = transport.clone();
        let this = this.clone();
        Ok(Value::Promise(Promise::new(async move {
            log::trace!(target: "net", "xhr {} {}", request.method, request.url);
            let href = request.url.href.clone();
            let outcome = transport.send(request).await.map(|mut response| {
                if response.url.is_empty() {
                    response.url = href;
                }
                response
            });
            complete_xhr(&this, outcome)
        })))
    });
}

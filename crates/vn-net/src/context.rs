//! Requests, responses and the per-request interception state.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::Deserialize;
use vn_core::{HostRef, Object, Promise, Value};

use crate::error::NetworkError;
use crate::url::RequestUrl;

// =============================================================================
// Headers
// =============================================================================

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Replace every value of `name`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.0.push((name.to_ascii_lowercase(), value.into()));
    }

    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.0.push((name.to_ascii_lowercase(), value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for Headers {
    fn from(map: BTreeMap<String, String>) -> Self {
        let mut headers = Self::new();
        for (name, value) in map {
            headers.append(&name, value);
        }
        headers
    }
}

// =============================================================================
// Request
// =============================================================================

/// The `init` dictionary of `fetch(input, init)`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestInit {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl RequestInit {
    /// Read an init object passed by page code. `undefined` and `null` mean
    /// no overrides.
    pub fn from_value(value: &Value) -> Result<Self, NetworkError> {
        let Some(object) = value.as_object() else {
            return if value.is_nullish() {
                Ok(Self::default())
            } else {
                Err(NetworkError::InvalidRequest(
                    "The provided value is not of type 'RequestInit'.".to_string(),
                ))
            };
        };

        let mut init = Self::default();
        if let Value::String(method) = object.get("method")? {
            init.method = Some(method);
        }
        if let Value::Object(headers) = object.get("headers")? {
            for key in headers.own_keys() {
                if let Value::String(value) = headers.get(&key)? {
                    init.headers.insert(key, value);
                }
            }
        }
        match object.get("body")? {
            Value::String(body) => init.body = Some(body),
            body if body.is_nullish() => {}
            other => init.body = Some(other.describe()),
        }
        Ok(init)
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: RequestUrl,
    pub headers: Headers,
    pub body: Option<String>,
}

impl Request {
    /// `new Request(input, init)` in a page whose location is `base`.
    pub fn new(input: &str, init: RequestInit, base: Option<&str>) -> Result<Self, NetworkError> {
        let url = RequestUrl::resolve(input, base)?;
        let mut request = Self {
            method: "GET".to_string(),
            url,
            headers: Headers::new(),
            body: None,
        };
        request.apply(init)?;
        Ok(request)
    }

    /// A plain GET of an absolute URL.
    pub fn get(url: &str) -> Result<Self, NetworkError> {
        Self::new(url, RequestInit::default(), None)
    }

    fn apply(&mut self, init: RequestInit) -> Result<(), NetworkError> {
        if let Some(method) = init.method {
            self.method = normalize_method(&method)?;
        }
        for (name, value) in init.headers {
            self.headers.set(&name, value);
        }
        if init.body.is_some() {
            self.body = init.body;
        }
        if self.body.is_some() && matches!(self.method.as_str(), "GET" | "HEAD") {
            return Err(NetworkError::InvalidRequest(
                "Request with GET/HEAD method cannot have body.".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the request described by `fetch(input, init)` arguments.
    pub fn from_fetch_args(args: &[Value], base: Option<&str>) -> Result<Self, NetworkError> {
        let init = RequestInit::from_value(args.get(1).unwrap_or(&Value::Undefined))?;
        match args.first().map(Value::to_primitive) {
            Some(Value::String(input)) => Self::new(&input, init, base),
            Some(value) => match Self::from_value(&value) {
                Some(request) => {
                    let mut request = (*request).clone();
                    request.apply(init)?;
                    Ok(request)
                }
                None => Err(NetworkError::InvalidUrl(value.describe())),
            },
            None => Err(NetworkError::InvalidRequest(
                "1 argument required, but only 0 present.".to_string(),
            )),
        }
    }

    pub fn from_value(value: &Value) -> Option<Rc<Self>> {
        value.downcast_host::<Self>()
    }

    /// A `Request` object for page code.
    pub fn to_value(&self) -> Value {
        let object = Object::new();
        object.define_value("url", self.url.href.as_str());
        object.define_value("method", self.method.as_str());
        Value::Host(HostRef::new(Rc::new(self.clone())).with_object(object))
    }
}

fn normalize_method(method: &str) -> Result<String, NetworkError> {
    const NORMALIZED: &[&str] = &["DELETE", "GET", "HEAD", "OPTIONS", "POST", "PUT", "PATCH"];
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)) {
        return Err(NetworkError::InvalidRequest(format!("'{method}' is not a valid HTTP method.")));
    }
    let upper = method.to_ascii_uppercase();
    Ok(if NORMALIZED.contains(&upper.as_str()) {
        upper
    } else {
        method.to_string()
    })
}

// =============================================================================
// Response
// =============================================================================

/// A response whose body can be read once.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub url: String,
    body: RefCell<Option<String>>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: reason_phrase(status).to_string(),
            headers: Headers::new(),
            url: String::new(),
            body: RefCell::new(Some(body.into())),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_used(&self) -> bool {
        self.body.borrow().is_none()
    }

    /// Consume the body.
    pub fn text(&self) -> Result<String, NetworkError> {
        self.body.borrow_mut().take().ok_or(NetworkError::BodyUsed)
    }

    /// `response.clone()`: fails once the body has been read.
    pub fn try_clone(&self) -> Result<Self, NetworkError> {
        let body = self.body.borrow().clone().ok_or(NetworkError::BodyUsed)?;
        Ok(Self {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            url: self.url.clone(),
            body: RefCell::new(Some(body)),
        })
    }

    pub fn from_value(value: &Value) -> Option<Rc<Self>> {
        value.downcast_host::<Self>()
    }

    /// Take ownership of a response handed out to page code, cloning it if
    /// the page still holds a reference.
    pub fn into_owned(response: Rc<Self>) -> Result<Self, NetworkError> {
        Rc::try_unwrap(response).or_else(|shared| shared.try_clone())
    }

    /// A `Response` object for page code, with `status`, `ok`, `url` and
    /// an awaitable `text()`.
    pub fn into_value(self) -> Value {
        let object = Object::new();
        object.define_value("status", f64::from(self.status));
        object.define_value("statusText", self.status_text.as_str());
        object.define_value("ok", self.ok());
        object.define_value("url", self.url.as_str());
        object.define_method("text", |this, _| {
            let promise = match Response::from_value(this) {
                Some(response) => match response.text() {
                    Ok(text) => Promise::resolve(Value::from(text)),
                    Err(err) => Promise::reject(err.into()),
                },
                None => Promise::reject(vn_core::Error::type_error("Illegal invocation")),
            };
            Ok(Value::Promise(promise))
        });
        Value::Host(HostRef::new(Rc::new(self)).with_object(object))
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

// =============================================================================
// Network Context
// =============================================================================

/// Where a request is in its life.
#[derive(Debug, Default)]
pub enum NetworkState {
    /// Nobody has produced an outcome yet.
    #[default]
    Unsent,
    Success(Response),
    Failed(NetworkError),
}

impl NetworkState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unsent => "UNSENT",
            Self::Success(_) => "SUCCESS",
            Self::Failed(_) => "FAILED",
        }
    }
}

/// Which pass over the callbacks is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Request,
    Response,
}

/// The record threaded through request and response callbacks.
#[derive(Debug)]
pub struct NetworkContext {
    pub url: RequestUrl,
    pub request: Request,
    /// Skip every remaining callback and take the current state as final.
    pub passthrough: bool,
    /// Scratch space for callbacks to hand data from the request pass to the
    /// response pass.
    pub user_data: HashMap<String, serde_json::Value>,
    pub phase: Phase,
    state: NetworkState,
}

impl NetworkContext {
    pub fn new(request: Request) -> Self {
        Self {
            url: request.url.clone(),
            request,
            passthrough: false,
            user_data: HashMap::new(),
            phase: Phase::Request,
            state: NetworkState::Unsent,
        }
    }

    pub fn state(&self) -> &NetworkState {
        &self.state
    }

    pub fn is_unsent(&self) -> bool {
        matches!(self.state, NetworkState::Unsent)
    }

    /// Move to `state`. A resolved context never goes back to UNSENT;
    /// otherwise later states replace earlier ones.
    pub fn resolve(&mut self, state: NetworkState) -> bool {
        if matches!(state, NetworkState::Unsent) && !self.is_unsent() {
            log::warn!(target: "net", "{}: ignoring reset to UNSENT", self.url);
            return false;
        }
        log::trace!(
            target: "net",
            "{}: {} -> {}",
            self.url,
            self.state.name(),
            state.name()
        );
        self.state = state;
        true
    }

    pub fn succeed(&mut self, response: Response) -> bool {
        self.resolve(NetworkState::Success(response))
    }

    pub fn fail(&mut self, error: NetworkError) -> bool {
        self.resolve(NetworkState::Failed(error))
    }

    pub fn response(&self) -> Option<&Response> {
        match &self.state {
            NetworkState::Success(response) => Some(response),
            _ => None,
        }
    }

    pub fn response_mut(&mut self) -> Option<&mut Response> {
        match &mut self.state {
            NetworkState::Success(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_state(self) -> NetworkState {
        self.state
    }

    /// The final outcome. An UNSENT context here is a pipeline bug.
    pub fn into_response(self) -> Result<Response, NetworkError> {
        match self.state {
            NetworkState::Success(response) => Ok(response),
            NetworkState::Failed(error) => Err(error),
            NetworkState::Unsent => {
                log::error!(target: "net", "{}: outcome requested while UNSENT", self.url);
                Err(NetworkError::Unresolved)
            }
        }
    }
}

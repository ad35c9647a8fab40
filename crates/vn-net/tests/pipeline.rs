use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;

use vn_core::{HookRegistry, Object, Value};
use vn_net::{
    NetworkCallback, NetworkContext, NetworkError, NetworkHost, NetworkInterceptor, Phase, Request, Response,
    SyncCallback, Transport, UrlFilter,
};

/// Counts every request that actually reaches the network.
struct Spy {
    calls: Rc<Cell<u32>>,
}

#[async_trait(?Send)]
impl Transport for Spy {
    async fn send(&self, request: Request) -> Result<Response, NetworkError> {
        self.calls.set(self.calls.get() + 1);
        Ok(Response::new(200, format!("live {}", request.url.hostname)))
    }
}

fn page() -> (NetworkInterceptor, Rc<Cell<u32>>) {
    let calls = Rc::new(Cell::new(0));
    let host = NetworkHost::install(
        &Object::new(),
        Rc::new(Spy { calls: calls.clone() }),
        Some("https://news.example.org/"),
    );
    (NetworkInterceptor::new(host, HookRegistry::new()), calls)
}

const FILTERS: &str = r#"{ "rules": [
    { "hostname": "^ads\\.example\\.com$", "action": "block" },
    { "hostname": "^metrics\\.", "pathname": "^/collect", "action": { "mock": { "status": 204 } } }
] }"#;

async fn text_of(response: Value) -> String {
    let text = response.call_method("text", &[]).unwrap().resolve().await.unwrap();
    text.as_str().unwrap().to_string()
}

#[tokio::test]
async fn blocked_request_never_reaches_the_network() {
    let (net, calls) = page();
    net.add_callback(UrlFilter::from_json(FILTERS).unwrap()).unwrap();

    let err = net
        .host()
        .fetch("https://ads.example.com/banner.js", None)
        .unwrap()
        .resolve()
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "TypeError: Failed to fetch");
    assert_eq!(calls.get(), 0);

    let response = net.host().fetch("/article", None).unwrap().resolve().await.unwrap();
    assert_eq!(text_of(response).await, "live news.example.org");
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn mocked_request_gets_the_canned_response() {
    let (net, calls) = page();
    net.add_callback(UrlFilter::from_json(FILTERS).unwrap()).unwrap();

    let response = net
        .host()
        .fetch("https://metrics.example.net/collect?e=view", None)
        .unwrap()
        .resolve()
        .await
        .unwrap();
    assert_eq!(response.get("status").unwrap().as_number(), Some(204.0));
    assert_eq!(
        response.get("url").unwrap().as_str(),
        Some("https://metrics.example.net/collect?e=view")
    );
    assert_eq!(calls.get(), 0);

    let xhr = net.host().create_xhr();
    xhr.call_method("open", &[Value::from("POST"), Value::from("https://metrics.example.net/collect")])
        .unwrap();
    xhr.call_method("send", &[Value::from("{}")]).unwrap().resolve().await.unwrap();
    assert_eq!(xhr.get("status").unwrap().as_number(), Some(204.0));
    assert_eq!(calls.get(), 0);
}

#[tokio::test]
async fn last_removal_restores_the_original_fetch() {
    let (net, _) = page();
    let global = net.host().global().clone();
    let native = global.get("fetch").unwrap();

    let id = net.add_callback(UrlFilter::new()).unwrap();
    let hooked = global.get("fetch").unwrap();
    assert!(!vn_core::Function::ptr_eq(
        hooked.as_function().unwrap(),
        native.as_function().unwrap()
    ));

    assert!(net.remove_callback(id));
    assert!(net.is_empty());
    let restored = global.get("fetch").unwrap();
    assert!(vn_core::Function::ptr_eq(
        restored.as_function().unwrap(),
        native.as_function().unwrap()
    ));
}

/// Suspends before recording, so interleaving would show up in the log.
struct Slow {
    name: &'static str,
    log: Rc<RefCell<Vec<String>>>,
}

#[async_trait(?Send)]
impl NetworkCallback for Slow {
    async fn handle(&self, ctx: &mut NetworkContext) -> Result<(), NetworkError> {
        self.log.borrow_mut().push(format!("{} start {:?}", self.name, ctx.phase));
        tokio::task::yield_now().await;
        self.log.borrow_mut().push(format!("{} end {:?}", self.name, ctx.phase));
        Ok(())
    }
}

#[tokio::test]
async fn async_callbacks_run_one_after_another() {
    let (net, calls) = page();
    let log = Rc::new(RefCell::new(Vec::new()));
    net.add_callback(Slow { name: "a", log: log.clone() }).unwrap();
    net.add_callback(Slow { name: "b", log: log.clone() }).unwrap();

    net.host().fetch("/feed", None).unwrap().resolve().await.unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(
        *log.borrow(),
        [
            "a start Request",
            "a end Request",
            "b start Request",
            "b end Request",
            "a start Response",
            "a end Response",
            "b start Response",
            "b end Response",
        ]
    );
}

#[tokio::test]
async fn response_pass_sees_filter_outcome() {
    let (net, _) = page();
    let seen = Rc::new(RefCell::new(None));
    let sink = seen.clone();
    net.add_callback(UrlFilter::from_json(FILTERS).unwrap()).unwrap();
    net.add_callback(SyncCallback::new(move |ctx: &mut NetworkContext| {
        if ctx.phase == Phase::Response {
            *sink.borrow_mut() = Some(ctx.state().name());
        }
        Ok(())
    }))
    .unwrap();

    let _ = net
        .host()
        .fetch("https://ads.example.com/x", None)
        .unwrap()
        .resolve()
        .await;
    assert_eq!(*seen.borrow(), Some("FAILED"));
}

#[tokio::test]
async fn intercepted_fetch_runs_once_when_first_awaited() {
    let (net, calls) = page();
    let passes = Rc::new(Cell::new(0));
    let counter = passes.clone();
    net.add_callback(SyncCallback::new(move |_: &mut NetworkContext| {
        counter.set(counter.get() + 1);
        Ok(())
    }))
    .unwrap();
    net.add_callback(Slow {
        name: "slow",
        log: Rc::new(RefCell::new(Vec::new())),
    })
    .unwrap();

    let promise = net.host().fetch("/live", None).unwrap();
    assert_eq!(passes.get(), 0);
    assert_eq!(calls.get(), 0);

    let (a, b) = tokio::join!(promise.clone().resolve(), promise.clone().resolve());
    assert_eq!(text_of(a.unwrap()).await, "live news.example.org");
    assert!(vn_core::Value::same_value(&b.unwrap(), &promise.resolve().await.unwrap()));
    assert_eq!(passes.get(), 2);
    assert_eq!(calls.get(), 1);
}

//! WebAssembly bindings for Veneer

use std::cell::RefCell;
use std::str::FromStr;

use log::{Level, LevelFilter, Log, Metadata, Record};
use vn_net::url::extract_host;
use vn_net::{NetworkContext, NetworkState, Request, UrlFilter};
use wasm_bindgen::prelude::*;

thread_local! {
    static URL_FILTER: RefCell<Option<UrlFilter>> = const { RefCell::new(None) };
}

/// Load URL filter rules from their JSON form, replacing any loaded before.
#[wasm_bindgen]
pub fn init_url_filters(json: &str) -> Result<(), JsValue> {
    let filter = UrlFilter::from_json(json).map_err(|e| JsValue::from_str(&e.to_string()))?;
    URL_FILTER.with(|slot| {
        let previous = slot.borrow_mut().replace(filter);
        if previous.is_some() {
            log::info!(target: "url_filter", "url filters replaced");
        }
    });
    Ok(())
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    URL_FILTER.with(|slot| slot.borrow().is_some())
}

/// Outcome of running one URL through the loaded filters.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UrlMatch {
    matched: bool,
    state: &'static str,
    status: u16,
}

impl UrlMatch {
    const NONE: Self = Self {
        matched: false,
        state: "UNSENT",
        status: 0,
    };
}

fn evaluate(url: &str) -> Result<UrlMatch, String> {
    let request = Request::get(url).map_err(|e| e.to_string())?;
    let mut ctx = NetworkContext::new(request);
    let matched = URL_FILTER.with(|slot| slot.borrow().as_ref().is_some_and(|filter| filter.apply(&mut ctx)));
    if !matched {
        return Ok(UrlMatch::NONE);
    }
    let status = match ctx.state() {
        NetworkState::Success(response) => response.status,
        _ => 0,
    };
    Ok(UrlMatch {
        matched,
        state: ctx.state().name(),
        status,
    })
}

/// `{ matched, state, status }` for `url`; nothing matches before
/// initialization.
#[wasm_bindgen]
pub fn match_url(url: &str) -> Result<JsValue, JsValue> {
    let outcome = evaluate(url).map_err(|e| JsValue::from_str(&e))?;

    let js_result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&js_result, &"matched".into(), &JsValue::from(outcome.matched));
    let _ = js_sys::Reflect::set(&js_result, &"state".into(), &JsValue::from_str(outcome.state));
    let _ = js_sys::Reflect::set(&js_result, &"status".into(), &JsValue::from(outcome.status));
    Ok(js_result.into())
}

#[wasm_bindgen]
pub fn extract_host_js(url: &str) -> Option<String> {
    extract_host(url).map(|h| h.to_string())
}

// =============================================================================
// Console logging
// =============================================================================

struct ConsoleLogger {
    level: LevelFilter,
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            Level::Error => web_sys::console::error_1(&line),
            Level::Warn => web_sys::console::warn_1(&line),
            Level::Info => web_sys::console::info_1(&line),
            Level::Debug | Level::Trace => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

/// Route `log` records to the browser console at `level` (`"off"` through
/// `"trace"`). Only the first call installs a logger.
#[wasm_bindgen]
pub fn init_console_logging(level: &str) -> Result<(), JsValue> {
    let level = LevelFilter::from_str(level).map_err(|_| JsValue::from_str(&format!("Unknown log level: {level}")))?;
    log::set_boxed_logger(Box::new(ConsoleLogger { level }))
        .map_err(|_| JsValue::from_str("A logger is already installed"))?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILTERS: &str = r#"{ "rules": [
        { "hostname": "^ads\\.", "action": "block" },
        { "hostname": "^cdn\\.", "pathname": "^/ga\\.js", "action": { "mock": { "body": "" } } }
    ] }"#;

    #[test]
    fn test_evaluate() {
        assert_eq!(evaluate("https://ads.example.com/x").unwrap(), UrlMatch::NONE);

        init_url_filters(FILTERS).unwrap();
        assert!(is_initialized());
        assert_eq!(
            evaluate("https://ads.example.com/x").unwrap(),
            UrlMatch {
                matched: true,
                state: "FAILED",
                status: 0
            }
        );
        assert_eq!(
            evaluate("https://cdn.example.com/ga.js").unwrap(),
            UrlMatch {
                matched: true,
                state: "SUCCESS",
                status: 200
            }
        );
        assert_eq!(evaluate("https://example.com/").unwrap(), UrlMatch::NONE);
        assert!(evaluate("not a url").is_err());
    }

    #[test]
    fn test_extract_host() {
        assert_eq!(extract_host_js("https://sub.example.com:8080/a").as_deref(), Some("sub.example.com"));
        assert_eq!(extract_host_js("about:blank"), None);
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn match_url_shape() {
        init_url_filters(r#"{ "rules": [{ "hostname": "^ads\\.", "action": "block" }] }"#).unwrap();
        let result = match_url("https://ads.example.com/").unwrap();
        let state = js_sys::Reflect::get(&result, &"state".into()).unwrap();
        assert_eq!(state.as_string().as_deref(), Some("FAILED"));
    }
}

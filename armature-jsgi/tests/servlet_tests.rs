//! Servlet lifecycle and dispatch tests.

mod common;

use armature_jsgi::config::{
    FUNCTION_NAME, InitParams, MODULE_NAME, MODULE_PATH, ServletConfig, ServletContext,
};
use armature_jsgi::{
    Callable, HandlerRef, JsgiError, JsgiRequest, JsgiResponse, JsgiServlet, Outcome,
    ServletError,
};
use common::{AlwaysExpired, Invocation, MockEngine, RecordingReporter, text_response, write_module};
use http::{Method, Uri};
use std::sync::Arc;
use tempfile::TempDir;

fn servlet_config(params: InitParams) -> ServletConfig {
    ServletConfig::new("jsgi", params, ServletContext::detached(""))
}

fn get(path: &'static str) -> JsgiRequest {
    JsgiRequest::new(Method::GET, Uri::from_static(path))
}

#[test]
fn test_callable_takes_precedence_over_init_params() {
    let engine = Arc::new(MockEngine::new());
    let params = InitParams::new()
        .with(MODULE_NAME, "main")
        .with(FUNCTION_NAME, "serve");
    let servlet = JsgiServlet::builder()
        .engine(engine.clone())
        .callable(Callable::native("bound", |_| Ok(text_response(200, "bound"))))
        .init(&servlet_config(params))
        .unwrap();

    assert!(servlet.handler().is_bound());
    let response = JsgiResponse::new();
    let outcome = servlet.service(get("/"), &response).unwrap();

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(engine.invocations(), vec![Invocation::Bound("bound".to_string())]);
    assert_eq!(&response.body()[..], b"bound");
}

#[test]
fn test_default_handler_is_config_app() {
    let engine = Arc::new(MockEngine::new());
    let servlet = JsgiServlet::builder()
        .engine(engine.clone())
        .init(&servlet_config(InitParams::new()))
        .unwrap();

    servlet.service(get("/"), &JsgiResponse::new()).unwrap();
    assert_eq!(
        engine.invocations(),
        vec![Invocation::Named {
            module: "config".to_string(),
            function: "app".to_string(),
        }]
    );
    assert!(matches!(servlet.handler(), HandlerRef::Named { .. }));
}

#[test]
fn test_expired_continuation_is_skipped_silently() {
    let engine = Arc::new(MockEngine::new());
    let reporter = Arc::new(RecordingReporter::default());
    let servlet = JsgiServlet::builder()
        .engine(engine.clone())
        .reporter(reporter.clone())
        .continuations(Arc::new(AlwaysExpired))
        .init(&servlet_config(InitParams::new()))
        .unwrap();
    let entered_after_init = engine.entered();

    let response = JsgiResponse::new();
    let outcome = servlet.service(get("/poll"), &response).unwrap();

    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(engine.dispatches(), 0);
    assert!(engine.invocations().is_empty());
    assert_eq!(engine.entered(), entered_after_init);
    assert_eq!(reporter.count(), 0);
    assert!(response.is_untouched());
}

#[test]
fn test_prototype_context_released_on_success() {
    let engine = Arc::new(MockEngine::new());
    JsgiServlet::builder()
        .engine(engine.clone())
        .init(&servlet_config(InitParams::new()))
        .unwrap();

    assert_eq!(engine.entered(), 1);
    assert_eq!(engine.exited(), 1);
}

#[test]
fn test_prototype_context_released_on_failure() {
    let engine = Arc::new(MockEngine::without_jsgi());
    let err = JsgiServlet::builder()
        .engine(engine.clone())
        .init(&servlet_config(InitParams::new()))
        .unwrap_err();

    assert!(matches!(err, ServletError::Init(JsgiError::NoSuchMethod { .. })));
    assert_eq!(engine.entered(), 1);
    assert_eq!(engine.exited(), 1);
}

#[test]
fn test_prototype_shared_across_requests() {
    let engine = Arc::new(MockEngine::new());
    let servlet = JsgiServlet::builder()
        .engine(engine.clone())
        .init(&servlet_config(InitParams::new()))
        .unwrap();

    servlet.service(get("/first"), &JsgiResponse::new()).unwrap();
    servlet.service(get("/second"), &JsgiResponse::new()).unwrap();

    let prototypes = engine.prototypes.lock();
    assert_eq!(prototypes.len(), 2);
    assert!(Arc::ptr_eq(&prototypes[0], &prototypes[1]));
    assert!(Arc::ptr_eq(&prototypes[0], servlet.prototype()));
    assert_eq!(*engine.paths.lock(), vec!["/first", "/second"]);
}

#[test]
fn test_failure_reported_once() {
    let engine = Arc::new(MockEngine::failing());
    let reporter = Arc::new(RecordingReporter::default());
    let servlet = JsgiServlet::builder()
        .engine(engine.clone())
        .reporter(reporter.clone())
        .init(&servlet_config(InitParams::new()))
        .unwrap();

    let err = servlet.service(get("/"), &JsgiResponse::new()).unwrap_err();

    assert!(matches!(err, ServletError::Request(JsgiError::HandlerExecution { .. })));
    assert_eq!(reporter.count(), 1);
    assert_eq!(engine.invocations().len(), 1);
    assert_eq!(engine.entered(), engine.exited());
}

#[test]
fn test_rhai_application_end_to_end() {
    let temp = TempDir::new().unwrap();
    write_module(
        temp.path(),
        "WEB-INF/app/config.rhai",
        r#"
            fn app(env) {
                #{
                    status: 200,
                    headers: #{ "content-type": "text/plain" },
                    body: ["Hello"]
                }
            }
        "#,
    );
    let reporter = Arc::new(RecordingReporter::default());
    let config = ServletConfig::new(
        "jsgi",
        InitParams::new(),
        ServletContext::new("", temp.path()),
    );
    let servlet = JsgiServlet::builder()
        .reporter(reporter.clone())
        .init(&config)
        .unwrap();

    let response = JsgiResponse::new();
    let outcome = servlet.service(get("/"), &response).unwrap();

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(response.status(), 200);
    assert_eq!(response.header("content-type").as_deref(), Some("text/plain"));
    assert_eq!(&response.body()[..], b"Hello");
    assert!(response.is_committed());
    assert_eq!(reporter.count(), 0);
}

#[test]
fn test_rhai_handler_reads_environment() {
    let temp = TempDir::new().unwrap();
    write_module(
        temp.path(),
        "WEB-INF/lib/main.rhai",
        r#"
            fn serve(env) {
                let who = env.header("x-user");
                #{
                    status: 201,
                    headers: #{ "x-path": env.pathInfo, "x-method": env.method },
                    body: [`${who}@${env.queryString}`]
                }
            }
        "#,
    );
    let params = InitParams::new()
        .with(MODULE_PATH, "lib")
        .with(MODULE_NAME, "main")
        .with(FUNCTION_NAME, "serve");
    let config = ServletConfig::new("jsgi", params, ServletContext::new("/shop", temp.path()));
    let servlet = JsgiServlet::builder().init(&config).unwrap();

    let request = JsgiRequest::new(Method::POST, Uri::from_static("/shop/cart?page=2"))
        .with_header("X-User", "ada");
    let response = JsgiResponse::new();
    servlet.service(request, &response).unwrap();

    assert_eq!(response.status(), 201);
    assert_eq!(response.header("x-path").as_deref(), Some("/cart"));
    assert_eq!(response.header("x-method").as_deref(), Some("POST"));
    assert_eq!(&response.body()[..], b"ada@page=2");
}

#[test]
fn test_rhai_missing_function_is_reported() {
    let temp = TempDir::new().unwrap();
    write_module(temp.path(), "WEB-INF/app/config.rhai", "fn other(env) { () }");
    let reporter = Arc::new(RecordingReporter::default());
    let config = ServletConfig::new(
        "jsgi",
        InitParams::new(),
        ServletContext::new("", temp.path()),
    );
    let servlet = JsgiServlet::builder()
        .reporter(reporter.clone())
        .init(&config)
        .unwrap();

    let err = servlet.service(get("/"), &JsgiResponse::new()).unwrap_err();
    assert!(err.cause().is_missing_method());
    assert_eq!(reporter.count(), 1);
}

#[test]
fn test_rhai_invalid_response_is_reported() {
    let temp = TempDir::new().unwrap();
    write_module(temp.path(), "WEB-INF/app/config.rhai", r#"fn app(env) { "just text" }"#);
    let reporter = Arc::new(RecordingReporter::default());
    let config = ServletConfig::new(
        "jsgi",
        InitParams::new(),
        ServletContext::new("", temp.path()),
    );
    let servlet = JsgiServlet::builder()
        .reporter(reporter.clone())
        .init(&config)
        .unwrap();

    let response = JsgiResponse::new();
    let err = servlet.service(get("/"), &response).unwrap_err();
    assert!(matches!(err.cause(), JsgiError::InvalidResponse { .. }));
    assert!(response.is_untouched());
    assert_eq!(reporter.count(), 1);
}

#[test]
fn test_rhai_malformed_header_is_reported() {
    let temp = TempDir::new().unwrap();
    write_module(
        temp.path(),
        "WEB-INF/app/config.rhai",
        r#"fn app(env) { #{ status: 200, headers: #{ "bad header": "x" }, body: ["ok"] } }"#,
    );
    let reporter = Arc::new(RecordingReporter::default());
    let config = ServletConfig::new(
        "jsgi",
        InitParams::new(),
        ServletContext::new("", temp.path()),
    );
    let servlet = JsgiServlet::builder()
        .reporter(reporter.clone())
        .init(&config)
        .unwrap();

    let response = JsgiResponse::new();
    let err = servlet.service(get("/"), &response).unwrap_err();
    assert!(matches!(err, ServletError::Request(JsgiError::InvalidResponse { .. })));
    assert_eq!(reporter.count(), 1);
    assert!(response.is_untouched());
}

#[test]
fn test_missing_code_root_fails_init() {
    let params = InitParams::new().with("appHome", "/no/such/webapp/root");
    let err = JsgiServlet::builder()
        .init(&servlet_config(params))
        .unwrap_err();
    assert!(matches!(err, ServletError::Init(JsgiError::CodeRoot { .. })));
}

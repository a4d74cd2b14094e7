use std::sync::Arc;

use action_svc::{
    Context, Error, Handler, HandlerError, Middleware, Service, handler, middleware,
};
use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Default, Deserialize)]
struct Named {
    #[serde(rename = "Name", default)]
    name: String,
}

fn echo_name(c: &mut Context) -> Result<(), HandlerError> {
    let mut args = Named::default();
    c.bind(&mut args)?;
    c.success(&args.name)
}

fn get(uri: &str) -> http::Request<Bytes> {
    http::Request::builder().uri(uri).body(Bytes::new()).unwrap()
}

fn body(resp: &http::Response<Bytes>) -> Value {
    serde_json::from_slice(resp.body()).unwrap()
}

fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Middleware {
    let log = Arc::clone(log);
    middleware(move |next: Handler| {
        let log = Arc::clone(&log);
        handler(move |c| {
            log.lock().push(format!("{name}:in"));
            let result = next(c);
            log.lock().push(format!("{name}:out"));
            result
        })
    })
}

#[test]
fn query_binding_end_to_end() {
    let svc = Service::new();
    svc.register("svc", echo_name);

    let resp = svc.handle(get("/?Action=svc&Name=test"));
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[http::header::CONTENT_TYPE], "application/json; charset=UTF-8");
    assert_eq!(resp.body().as_ref(), br#"{"Data":"test"}"#);
}

#[test]
fn missing_action_is_in_band_error() {
    let svc = Service::new();
    svc.register("svc", echo_name);

    let resp = svc.handle(get("/"));
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body(&resp), json!({"Error": {"Code": "InvalidAction", "Message": "no action"}}));
}

#[test]
fn unknown_action_never_reaches_a_handler() {
    let svc = Service::new();
    svc.register("svc", |_| panic!("must not run"));

    let resp = svc.handle(get("/?Action=nope"));
    assert_eq!(
        body(&resp),
        json!({"Error": {"Code": "InvalidAction", "Message": "invalid action 'nope'"}})
    );
}

#[test]
fn mapping_before_register_resolves() {
    let svc = Service::new();
    svc.mapping("old", "new");
    svc.register("new", |c| c.success("from new"));

    let resp = svc.handle(get("/?Action=old"));
    assert_eq!(body(&resp), json!({"Data": "from new"}));
    assert_eq!(svc.mappings().get("old").map(String::as_str), Some("new"));
    assert_eq!(svc.services(), ["new"]);
}

#[test]
fn direct_write_suppresses_fallback_envelope() {
    let svc = Service::new();
    svc.register("raw", |c| {
        c.set_resp_header("Content-Type", "text/plain");
        c.write_header(StatusCode::ACCEPTED);
        c.write_str("accepted");
        Err("ignored after write".into())
    });

    let resp = svc.handle(get("/?Action=raw"));
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(resp.headers()[http::header::CONTENT_TYPE], "text/plain");
    assert_eq!(resp.body().as_ref(), b"accepted");
}

#[test]
fn handler_without_respond_gets_empty_success() {
    let svc = Service::new();
    svc.register("quiet", |_| Ok(()));

    let resp = svc.handle(get("/?Action=quiet"));
    assert_eq!(resp.body().as_ref(), b"{}");
}

#[test]
fn handler_error_is_classified() {
    let svc = Service::new();
    svc.register("boom", |_| Err("database unreachable".into()));
    svc.register("typed", |_| Err(Error::new("NotFound", "no such pet").into()));

    assert_eq!(
        body(&svc.handle(get("/?Action=boom"))),
        json!({"Error": {"Code": "ServerError", "Message": "database unreachable"}})
    );
    assert_eq!(
        body(&svc.handle(get("/?Action=typed"))),
        json!({"Error": {"Code": "NotFound", "Message": "no such pet"}})
    );
}

#[test]
fn request_id_is_echoed() {
    let svc = Service::new();
    svc.register("svc", echo_name);

    let req = http::Request::builder()
        .uri("/?Action=svc&Name=x")
        .header("X-Request-Id", "req-42")
        .body(Bytes::new())
        .unwrap();
    assert_eq!(body(&svc.handle(req)), json!({"RequestId": "req-42", "Data": "x"}));

    let missing = http::Request::builder()
        .uri("/")
        .header("X-Request-Id", "req-43")
        .body(Bytes::new())
        .unwrap();
    assert_eq!(body(&svc.handle(missing))["RequestId"], "req-43");
}

#[test]
fn post_binds_json_body() {
    let svc = Service::new();
    svc.register("svc", echo_name);

    let req = http::Request::builder()
        .method("POST")
        .uri("/")
        .header("X-Action", "svc")
        .header("Content-Type", "application/json")
        .body(Bytes::from_static(br#"{"Name":"posted"}"#))
        .unwrap();
    assert_eq!(body(&svc.handle(req)), json!({"Data": "posted"}));
}

#[test]
fn unsupported_method_and_malformed_body() {
    let svc = Service::new();
    svc.register("svc", echo_name);

    let delete = http::Request::builder()
        .method("DELETE")
        .uri("/?Action=svc")
        .body(Bytes::new())
        .unwrap();
    assert_eq!(body(&svc.handle(delete))["Error"]["Code"], "UnsupportedProtocol");

    let malformed = http::Request::builder()
        .method("POST")
        .uri("/?Action=svc")
        .body(Bytes::from_static(b"{not json"))
        .unwrap();
    assert_eq!(body(&svc.handle(malformed))["Error"]["Code"], "InvalidParameter");
}

#[test]
fn global_middleware_runs_in_onion_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let svc = Service::new();
    svc.use_middleware(&[recorder(&log, "m1"), recorder(&log, "m2")]);

    let inner = Arc::clone(&log);
    svc.register("svc", move |c| {
        inner.lock().push("handler".to_owned());
        c.success(&())
    });

    svc.handle(get("/?Action=svc"));
    assert_eq!(*log.lock(), ["m1:in", "m2:in", "handler", "m2:out", "m1:out"]);
}

#[test]
fn global_middleware_sees_unresolved_actions() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let svc = Service::new();
    svc.use_middleware(&[recorder(&log, "global")]);

    svc.handle(get("/?Action=missing"));
    assert_eq!(*log.lock(), ["global:in", "global:out"]);
}

#[test]
fn use_middleware_accumulates() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let svc = Service::new();
    svc.register("svc", |c| c.success(&()));

    svc.use_middleware(&[recorder(&log, "first")]);
    svc.use_middleware(&[recorder(&log, "second")]);

    svc.handle(get("/?Action=svc"));
    assert_eq!(*log.lock(), ["first:in", "second:in", "second:out", "first:out"]);
}

#[test]
fn per_action_middleware_runs_inside_global_chain() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let svc = Service::new();
    svc.use_middleware(&[recorder(&log, "global")]);

    let inner = Arc::clone(&log);
    svc.register_with(
        "svc",
        move |c| {
            inner.lock().push("handler".to_owned());
            c.success(&())
        },
        &[recorder(&log, "local")],
    );
    svc.register("other", |c| c.success(&()));

    svc.handle(get("/?Action=svc"));
    assert_eq!(
        *log.lock(),
        ["global:in", "local:in", "handler", "local:out", "global:out"]
    );

    log.lock().clear();
    svc.handle(get("/?Action=other"));
    assert_eq!(*log.lock(), ["global:in", "global:out"]);
}

#[test]
fn middleware_can_answer_early() {
    let svc = Service::new();
    svc.use_middleware(&[middleware(|next: Handler| {
        handler(move |c| {
            if c.version.is_empty() {
                return c.failure(Error::INVALID_PARAMETER.with_message("missing version"));
            }
            next(c)
        })
    })]);
    svc.register("svc", |c| c.success("ok"));

    assert_eq!(
        body(&svc.handle(get("/?Action=svc"))),
        json!({"Error": {"Code": "InvalidParameter", "Message": "missing version"}})
    );

    let versioned = http::Request::builder()
        .uri("/?Action=svc")
        .header("X-Version", "2024-01-01")
        .body(Bytes::new())
        .unwrap();
    assert_eq!(body(&svc.handle(versioned)), json!({"Data": "ok"}));
}

#[test]
fn factory_hooks_apply_to_every_request() {
    let svc = Service::builder()
        .context_factory(|| {
            let mut ctx = Context::new();
            ctx.set_default = Some(Arc::new(|v: &mut dyn std::any::Any| -> Result<(), HandlerError> {
                if let Some(named) = v.downcast_mut::<Named>() {
                    if named.name.is_empty() {
                        named.name = "anonymous".into();
                    }
                }
                Ok(())
            }));
            ctx.validate = Some(Arc::new(|v: &mut dyn std::any::Any| -> Result<(), HandlerError> {
                match v.downcast_ref::<Named>() {
                    Some(named) if named.name.len() > 8 => Err("Name is too long".into()),
                    _ => Ok(()),
                }
            }));
            ctx
        })
        .build();
    svc.register("svc", echo_name);

    assert_eq!(body(&svc.handle(get("/?Action=svc"))), json!({"Data": "anonymous"}));
    assert_eq!(
        body(&svc.handle(get("/?Action=svc&Name=much-too-long"))),
        json!({"Error": {"Code": "InvalidParameter", "Message": "Name is too long"}})
    );
}

#[test]
fn custom_action_extractor() {
    let svc = Service::builder()
        .action_extractor(|req| req.uri().path().trim_start_matches('/').to_owned())
        .build();
    svc.register("ping", |c| c.success("pong"));

    assert_eq!(body(&svc.handle(get("/ping"))), json!({"Data": "pong"}));
    assert_eq!(body(&svc.handle(get("/?Action=ping")))["Error"]["Code"], "InvalidAction");
}

#[test]
fn concurrent_requests_get_their_own_context() {
    let svc = Arc::new(Service::new());
    svc.register("svc", echo_name);

    std::thread::scope(|s| {
        for t in 0..8 {
            let svc = Arc::clone(&svc);
            s.spawn(move || {
                for i in 0..200 {
                    let name = format!("t{t}i{i}");
                    let req = http::Request::builder()
                        .uri(format!("/?Action=svc&Name={name}"))
                        .header("X-Request-Id", name.as_str())
                        .body(Bytes::new())
                        .unwrap();
                    let resp = svc.handle(req);
                    assert_eq!(body(&resp), json!({"RequestId": name, "Data": name}));
                }
            });
        }
    });

    assert!(svc.idle_contexts() >= 1);
}

#[test]
fn registry_changes_apply_to_live_service() {
    let svc = Service::new();
    svc.register("svc", |c| c.success("v1"));
    assert_eq!(body(&svc.handle(get("/?Action=svc"))), json!({"Data": "v1"}));

    svc.register("svc", |c| c.success("v2"));
    assert_eq!(body(&svc.handle(get("/?Action=svc"))), json!({"Data": "v2"}));

    svc.unregister("svc");
    assert_eq!(body(&svc.handle(get("/?Action=svc")))["Error"]["Code"], "InvalidAction");
}

#[test]
fn boxed_descriptor_renders_verbatim() {
    fn find_pet(_name: &str) -> Result<(), action_svc::BoxError> {
        Err(Box::new(Error::new("NotFound", "no such pet")))
    }

    let svc = Service::new();
    svc.register("GetPet", |c| {
        find_pet("rex")?;
        c.success("found")
    });

    assert_eq!(
        body(&svc.handle(get("/?Action=GetPet"))),
        json!({"Error": {"Code": "NotFound", "Message": "no such pet"}})
    );
}

#[test]
fn repeated_query_key_binds_first_value() {
    let svc = Service::new();
    svc.register("dup", echo_name);

    assert_eq!(body(&svc.handle(get("/?Action=dup&Name=a&Name=b"))), json!({"Data": "a"}));
}

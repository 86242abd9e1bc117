//! Admin HTTP surface (§6): authorization, routing, and JSON encoding for
//! every `/admin/*` route. The core's contract ends at "these mutations
//! exist and return this shape" (§1: "the admin HTTP surface beyond what
//! the core consumes" is out of scope) — this module is the thin
//! translation from wire requests to the `Engine` operations already
//! implemented in `src/app.rs`.

use super::{cors_headers, Method, Request, Response};
use crate::app::Engine;
use crate::types::{Model, Time};
use std::sync::Arc;

fn authorized(engine: &Engine, req: &Request) -> bool {
    let expected = &engine.config.admin_passcode;
    req.header("x-admin-passcode").is_some_and(|got| got == expected)
}

fn unauthorized() -> Response {
    Response::text(401, "Unauthorized")
}

fn bad_request(msg: impl Into<String>) -> Response {
    Response::text(400, msg.into())
}

fn snapshot_response(engine: &Engine, status: u16, action: Option<&str>) -> Response {
    let snapshot = engine.admin_snapshot();
    let mut value = serde_json::to_value(&snapshot).unwrap_or_default();
    if let Some(action) = action {
        if let Some(obj) = value.as_object_mut() {
            obj.insert("action".to_string(), serde_json::Value::String(action.to_string()));
        }
    }
    Response::json(status, &value)
}

/// Dispatches one parsed admin (or CORS-preflight) request. Handles
/// `OPTIONS` before authorization, since a preflight never carries the
/// passcode header (§6: "`OPTIONS` must return 204 with headers").
#[must_use]
pub fn handle(engine: &Arc<Engine>, req: &Request) -> Response {
    if req.method == Method::Options {
        let origin = req.header("origin");
        let mut resp = Response::no_content(204);
        resp.headers.extend(cors_headers(&engine.config, origin));
        return resp;
    }

    let mut response = route(engine, req);
    if let Some(origin) = req.header("origin") {
        response.headers.extend(cors_headers(&engine.config, Some(origin)));
    }
    response
}

fn route(engine: &Arc<Engine>, req: &Request) -> Response {
    if !req.path.starts_with("/admin") {
        return Response::text(404, "Not Found");
    }
    if !authorized(engine, req) {
        return unauthorized();
    }

    match (req.method, req.path.as_str()) {
        (Method::Post, "/admin/login") => snapshot_response(engine, 200, None),
        (Method::Get, "/admin/status") => snapshot_response(engine, 200, None),
        (Method::Post, "/admin/pause") => {
            engine.pause();
            snapshot_response(engine, 200, Some("Paused"))
        }
        (Method::Post, "/admin/resume") => {
            engine.resume(Time::now());
            snapshot_response(engine, 200, Some("Resumed"))
        }
        (Method::Post, "/admin/reset") => {
            engine.reset();
            snapshot_response(engine, 200, None)
        }
        (Method::Get, "/admin/export") => {
            let dump = engine.store.export_generation();
            Response::json(200, &dump).with_header("Content-Disposition", "attachment; filename=\"export.json\"")
        }
        (Method::Get, "/admin/models") => models_list(engine),
        (Method::Post, "/admin/models") => models_upsert(engine, req),
        (Method::Get, "/admin/viewer-targets") => targets_list(engine),
        (Method::Post, "/admin/viewer-targets") => targets_create(engine, req),
        _ => Response::text(404, "Not Found"),
    }
}

fn models_list(engine: &Engine) -> Response {
    let models = engine.store.all_models();
    let snapshot = engine.admin_snapshot();
    Response::json(
        200,
        &serde_json::json!({ "models": models, "snapshot": snapshot }),
    )
}

fn models_upsert(engine: &Engine, req: &Request) -> Response {
    let model: Model = match serde_json::from_slice(&req.body) {
        Ok(m) => m,
        Err(e) => return bad_request(format!("invalid model payload: {e}")),
    };
    engine.store.upsert_model(model);
    models_list(engine)
}

fn targets_list(engine: &Engine) -> Response {
    Response::json(200, &serde_json::json!({ "targets": engine.store.viewer_targets() }))
}

fn targets_create(engine: &Engine, req: &Request) -> Response {
    let target: serde_json::Value = match serde_json::from_slice(&req.body) {
        Ok(v) => v,
        Err(e) => return bad_request(format!("invalid viewer-target payload: {e}")),
    };
    engine.store.add_viewer_target(target);
    targets_list(engine)
}

//! The chat-bridge vote surface (§6): `GET /fossabot/vote?vote=<1|2|A|B>`.
//! Maps a chat command's query parameter and the headers a chat provider
//! attaches for the calling user to `Engine::cast_vote`, returning a short
//! plain-text reply suitable for echoing back into chat.
//!
//! Validating the request against the chat provider's own validate URL
//! (§6: "may be required, 5 s timeout") is a call to an external service
//! outside this crate's scope (§1); [`ChatIdentity::from_request`] is the
//! seam where such a check would sit, ahead of the `cast_vote` call.

use super::{Method, Request, Response};
use crate::app::Engine;
use crate::types::{Side, ViewerId, VoteCastStatus};

/// The chat-provider-supplied identity a vote is attributed to. Fossabot
/// (and similar bridges) pass the user id as a header rather than a query
/// parameter; falling back to the query string keeps this testable without
/// fabricating provider-specific header names the core doesn't define.
struct ChatIdentity(String);

impl ChatIdentity {
    fn from_request(req: &Request) -> Option<Self> {
        let id = req
            .header("x-fossabot-message-userlogin")
            .or_else(|| req.header("x-provider-user-id"))
            .or_else(|| req.query_param("user"))?;
        Some(Self(id.to_string()))
    }
}

fn parse_side(raw: &str) -> Option<Side> {
    match raw {
        "1" | "A" | "a" => Some(Side::A),
        "2" | "B" | "b" => Some(Side::B),
        _ => None,
    }
}

/// Handles `GET /fossabot/vote`. Any other path or method under this
/// prefix is a 404; the core names only the one route.
#[must_use]
pub fn handle(engine: &Engine, req: &Request) -> Response {
    if req.method != Method::Get || req.path != "/fossabot/vote" {
        return Response::text(404, "Not Found");
    }

    let Some(raw_vote) = req.query_param("vote") else {
        return Response::text(400, "missing vote parameter");
    };
    let Some(side) = parse_side(raw_vote) else {
        return Response::text(400, "vote must be one of 1, 2, A, B");
    };
    let Some(identity) = ChatIdentity::from_request(req) else {
        return Response::text(400, "could not identify caller");
    };

    let viewer_id = ViewerId(format!("chat:{}", identity.0));
    match engine.cast_vote(viewer_id, side) {
        VoteCastStatus::Accepted => Response::text(200, format!("Vote recorded for {side:?}!")),
        VoteCastStatus::Updated => Response::text(200, format!("Vote changed to {side:?}.")),
        VoteCastStatus::Unchanged => Response::text(200, "You already voted that way."),
        VoteCastStatus::Inactive => Response::text(200, "No round is currently accepting votes."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::llm_adapter::ScriptedAdapter;
    use crate::types::ModelId;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn engine() -> Arc<Engine> {
        Arc::new(Engine::new(EngineConfig::from_env(), Arc::new(ScriptedAdapter::new())))
    }

    fn req(query: &str, user_header: Option<&str>) -> Request {
        let (path, query) = Request::parse_path_and_query(&format!("/fossabot/vote?{query}"));
        let mut headers = HashMap::new();
        if let Some(u) = user_header {
            headers.insert("x-fossabot-message-userlogin".to_string(), u.to_string());
        }
        Request {
            method: Method::Get,
            path,
            query,
            headers,
            body: Vec::new(),
        }
    }

    #[test]
    fn rejects_missing_vote_param() {
        let engine = engine();
        let resp = handle(&engine, &req("", Some("alice")));
        assert_eq!(resp.status, 400);
    }

    #[test]
    fn rejects_unidentified_caller() {
        let engine = engine();
        let resp = handle(&engine, &req("vote=A", None));
        assert_eq!(resp.status, 400);
    }

    #[test]
    fn reports_inactive_when_no_round_is_running() {
        let engine = engine();
        let resp = handle(&engine, &req("vote=A", Some("alice")));
        assert_eq!(resp.status, 200);
        assert!(String::from_utf8(resp.body).unwrap().contains("No round"));
    }

    #[test]
    fn accepts_a_vote_once_a_round_is_voting() {
        let engine = engine();
        for i in 0..3 {
            engine.store.upsert_model(crate::types::Model {
                id: ModelId(format!("m{i}")),
                name: format!("m{i}"),
                color: "#000".into(),
                logo_id: "logo".into(),
                reasoning_effort: None,
                metrics_epoch: 0,
                enabled: true,
                archived_at: None,
                can_prompt: true,
                can_answer: true,
                can_vote: true,
            });
        }
        // `cast_vote` stamps its own check against real `Time::now()`, so the
        // deadline here must be relative to real now rather than a fixed
        // epoch offset (a fixed offset would already be in the past).
        let now = crate::types::Time::now();
        let (round_id, _) = engine
            .store
            .create_round(0, ModelId("m0".into()), [ModelId("m1".into()), ModelId("m2".into())], now)
            .unwrap();
        engine.store.start_answering(0, round_id, now).unwrap();
        engine
            .store
            .start_voting(
                0,
                round_id,
                vec![ModelId("m0".into())],
                now.plus_millis(60_000),
                60_000,
                crate::types::ViewerVotingMode::Idle,
                now,
            )
            .unwrap();

        let resp = handle(&engine, &req("vote=1", Some("alice")));
        assert_eq!(resp.status, 200);
        assert!(String::from_utf8(resp.body).unwrap().contains("recorded"));
    }
}

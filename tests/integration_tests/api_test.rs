//! HTTP API tests
//!
//! Exercise the router in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crawl_orchestrator::api::{create_router, AppState};
use crawl_orchestrator::orchestrator::Orchestrator;

use super::fixtures::{collect_until_terminal, orchestrator_with, ScriptedCrawler};

fn router(orchestrator: &Arc<Orchestrator>) -> Router {
    create_router(AppState::new(Arc::clone(orchestrator)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ============================================================================
// Job Endpoints
// ============================================================================

#[tokio::test]
async fn test_start_crawl_then_conflict() {
    let (crawler, gate) = ScriptedCrawler::new().gated();
    let (orch, _store) = orchestrator_with(Arc::new(crawler));
    let orch = Arc::new(orch);
    let app = router(&orch);
    let mut rx = orch.subscribe();

    let (status, body) = send(
        &app,
        post_json(
            "/start_crawl",
            json!({
                "platforms": ["xhs", "dy"],
                "keyword_groups": [["coffee"], ["tea"]],
                "task_id": "api-1",
                "config": {"max_notes_count": 5}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task_id"], "api-1");
    assert_eq!(body["status"], "started");
    assert_eq!(body["total_rounds"], 2);
    assert_eq!(body["platforms"], json!(["xhs", "dy"]));

    let (status, body) = send(
        &app,
        post_json(
            "/start_crawl",
            json!({"platforms": ["ks"], "keyword_groups": [["x"]], "task_id": "api-2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["success"], false);
    assert_eq!(body["current_task"]["task_id"], "api-1");

    let (status, _) = send(&app, get("/task_status/api-2")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Same id as the running job.
    let (status, body) = send(
        &app,
        post_json(
            "/start_crawl",
            json!({"platforms": ["xhs"], "keyword_groups": [["coffee"]], "task_id": "api-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["current_task"]["task_id"], "api-1");

    let (_, body) = send(&app, get("/is_running")).await;
    assert_eq!(body["is_running"], true);
    assert_eq!(body["current_task"]["task_id"], "api-1");

    gate.add_permits(4);
    collect_until_terminal(&mut rx, "api-1").await;

    let (status, body) = send(&app, get("/task_status/api-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["progress"], 100.0);
    assert_eq!(body["total_rounds"], 2);
    assert!(body["end_time"].is_string());

    let (_, body) = send(&app, get("/is_running")).await;
    assert_eq!(body["is_running"], false);
    assert!(body["current_task"].is_null());
}

#[tokio::test]
async fn test_start_crawl_rejects_invalid_requests() {
    let (orch, _store) = orchestrator_with(Arc::new(ScriptedCrawler::new()));
    let orch = Arc::new(orch);
    let app = router(&orch);

    let invalid = [
        json!({"platforms": [], "keyword_groups": [["a"]]}),
        json!({"platforms": ["xhs"], "keyword_groups": []}),
        json!({"platforms": ["myspace"], "keyword_groups": [["a"]]}),
        json!({"platforms": ["xhs"], "keyword_groups": [["a"], []]}),
        json!({"platforms": ["xhs"], "keyword_groups": [["  "]]}),
        json!({"platforms": ["xhs"], "keyword_groups": [["a"]], "config": {"platform": "dy"}}),
    ];
    for body in invalid {
        let (status, response) = send(&app, post_json("/start_crawl", body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "request {body}");
        assert_eq!(response["success"], false);
    }

    assert!(!orch.is_running());
}

#[tokio::test]
async fn test_concurrent_start_crawl_admits_one() {
    let (crawler, gate) = ScriptedCrawler::new().gated();
    let (orch, _store) = orchestrator_with(Arc::new(crawler));
    let orch = Arc::new(orch);
    let app = router(&orch);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let request = post_json(
                    "/start_crawl",
                    json!({"platforms": ["wb"], "keyword_groups": [["race"]], "task_id": format!("race-{i}")}),
                );
                app.oneshot(request).await.unwrap().status()
            })
        })
        .collect();

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::LOCKED)
            .count(),
        7
    );

    gate.add_permits(1);
    orch.shutdown().await;
}

#[tokio::test]
async fn test_is_running_fields_agree_across_job_lifetime() {
    let (crawler, gate) = ScriptedCrawler::new().gated();
    let (orch, _store) = orchestrator_with(Arc::new(crawler));
    let orch = Arc::new(orch);
    let app = router(&orch);
    let mut rx = orch.subscribe();

    let (status, _) = send(
        &app,
        post_json(
            "/start_crawl",
            json!({"platforms": ["xhs", "dy"], "keyword_groups": [["a"]], "task_id": "poll"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Keep polling while the job finishes so reads straddle the terminal update.
    let poller = {
        let app = app.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..200 {
                let (_, body) = send(&app, get("/is_running")).await;
                seen.push(body);
                tokio::task::yield_now().await;
            }
            seen
        })
    };

    gate.add_permits(2);
    collect_until_terminal(&mut rx, "poll").await;

    for body in poller.await.unwrap() {
        let running = body["is_running"].as_bool().unwrap();
        assert_eq!(running, !body["current_task"].is_null(), "{body}");
        if running {
            let status = body["current_task"]["status"].as_str().unwrap();
            assert!(matches!(status, "pending" | "running"), "{body}");
        }
    }

    assert!(orch.current_task().await.is_none());
    let (_, body) = send(&app, get("/is_running")).await;
    assert_eq!(body, json!({"is_running": false, "current_task": null}));
}

// ============================================================================
// Result Endpoints
// ============================================================================

#[tokio::test]
async fn test_data_and_stats_after_job() {
    let (orch, _store) = orchestrator_with(Arc::new(ScriptedCrawler::new().with_posts_per_call(3)));
    let orch = Arc::new(orch);
    let app = router(&orch);
    let mut rx = orch.subscribe();

    let (status, _) = send(
        &app,
        post_json(
            "/start_crawl",
            json!({"platforms": ["bili"], "keyword_groups": [["cats"]], "task_id": "data"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    collect_until_terminal(&mut rx, "data").await;

    let (status, body) = send(&app, get("/data/bili")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert_eq!(body["data"][0]["post_id"], "bili-cats-0");
    assert_eq!(body["data"][0]["crawl_metadata"]["task_id"], "data");

    let (_, body) = send(&app, get("/data/bili?limit=1&skip=1")).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["post_id"], "bili-cats-1");

    let (status, body) = send(&app, get("/data/bili/bili-cats-2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["comment_count"], 3);

    let (status, _) = send(&app, get("/data/bili/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, get("/stats/bili")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_posts"], 3);
    // 1 + 2 + 3 comments
    assert_eq!(body["total_comments"], 6);

    let (_, body) = send(&app, get("/stats/xhs")).await;
    assert_eq!(body["total_posts"], 0);

    for uri in ["/data/myspace", "/stats/myspace", "/data/myspace/1"] {
        let (status, _) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }
}

// ============================================================================
// Service Endpoints
// ============================================================================

#[tokio::test]
async fn test_service_endpoints() {
    let (orch, _store) = orchestrator_with(Arc::new(ScriptedCrawler::new()));
    let orch = Arc::new(orch);
    let app = router(&orch);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["is_running"], false);

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "crawl-orchestrator");
    assert!(body["endpoints"].as_array().unwrap().len() >= 7);

    let (status, body) = send(&app, get("/platforms")).await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = body["platforms"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["xhs", "dy", "ks", "bili", "wb", "tieba", "zhihu"]);

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = send(&app, get("/no-such-route")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

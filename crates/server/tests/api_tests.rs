use axum_test::TestServer;
use serde_json::{json, Value};
use server::config::ServerConfig;
use server::{create_router, state::AppState};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Stand-in search worker that records its arguments and prints one match
/// whose address encodes the pattern and position it was asked for.
const SCENARIO_WORKER: &str = r#"
echo "$@" >> "$(dirname "$0")/args.log"
echo '{"type":"connected"}'
echo '{"type":"progress","attempts":1000,"found":0,"searching_for":1}'
echo "{\"type\":\"found\",\"address\":\"$1-$3\",\"attempts\":4821,\"private_key\":\"k1\",\"index\":1}"
echo '{"type":"complete","total_attempts":4821,"total_found":1}'
"#;

fn write_worker(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("solana-generator");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write worker");
    let mut perms = fs::metadata(&path).expect("Failed to stat worker").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("Failed to chmod worker");
    path
}

fn setup_test_server(worker_body: &str) -> (TestServer, TempDir) {
    setup_test_server_with(worker_body, |_| {})
}

fn setup_test_server_with(
    worker_body: &str,
    configure: impl FnOnce(&mut ServerConfig),
) -> (TestServer, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let worker = write_worker(temp_dir.path(), worker_body);

    let mut config = ServerConfig {
        worker_binary: worker,
        ..Default::default()
    };
    configure(&mut config);

    let app = create_router(AppState::new(config));
    let server = TestServer::new(app).expect("Failed to create test server");

    (server, temp_dir)
}

/// Pull the JSON payload out of every `data:` block of an SSE body.
fn sse_events(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter_map(|block| {
            block
                .lines()
                .find_map(|line| line.strip_prefix("data:"))
                .map(|data| serde_json::from_str(data.trim_start()).expect("data is JSON"))
        })
        .collect()
}

fn event_types(events: &[Value]) -> Vec<&str> {
    events
        .iter()
        .map(|event| event["type"].as_str().unwrap_or_default())
        .collect()
}

fn recorded_args(dir: &TempDir) -> Vec<String> {
    fs::read_to_string(dir.path().join("args.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

mod health {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (server, _temp_dir) = setup_test_server(SCENARIO_WORKER);

        let response = server.get("/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert!(body["version"].is_string());
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let (server, _temp_dir) = setup_test_server(SCENARIO_WORKER);

        let response = server.get("/api/openapi.json").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert!(body["paths"]["/generate"].is_object());
        assert!(body["paths"]["/generate-both"].is_object());
    }
}

mod generate {
    use super::*;

    #[tokio::test]
    async fn test_prefix_search_streams_translated_events() {
        let (server, temp_dir) = setup_test_server(SCENARIO_WORKER);

        let response = server
            .get("/generate")
            .add_query_param("pattern", "abc")
            .add_query_param("position", "prefix")
            .await;

        response.assert_status_ok();
        assert_eq!(response.header("content-type"), "text/event-stream");
        assert_eq!(response.header("cache-control"), "no-cache");
        assert_eq!(response.header("x-accel-buffering"), "no");

        let events = sse_events(&response.text());
        assert_eq!(
            event_types(&events),
            vec!["connected", "progress", "found", "complete"]
        );
        assert_eq!(events[0]["message"], "Starting search...");
        assert_eq!(events[2]["address"], "abc-prefix");
        assert_eq!(events[2]["position"], "prefix");
        assert!(events[2].get("private_key").is_none());
        assert!(!response.text().contains("k1"));

        assert_eq!(recorded_args(&temp_dir), vec!["abc 1 prefix"]);
    }

    #[tokio::test]
    async fn test_unknown_position_falls_back_to_prefix() {
        let (server, temp_dir) = setup_test_server(SCENARIO_WORKER);

        let response = server
            .get("/generate")
            .add_query_param("pattern", "abc")
            .add_query_param("position", "middle")
            .add_query_param("count", "3")
            .await;

        response.assert_status_ok();
        assert_eq!(recorded_args(&temp_dir), vec!["abc 3 prefix"]);
    }

    #[tokio::test]
    async fn test_combined_search_via_json_body() {
        let worker = r#"
echo "$@" >> "$(dirname "$0")/args.log"
echo '{"type":"found","address":"abXYZyz","attempts":10,"private_key":"k1","index":1}'
echo '{"type":"found","address":"ab123yz","attempts":20,"private_key":"k2","index":2}'
echo '{"type":"complete","total_attempts":20,"total_found":2}'
"#;
        let (server, temp_dir) = setup_test_server(worker);

        let response = server
            .post("/generate")
            .json(&json!({
                "pattern": "ab",
                "suffix": "yz",
                "position": "both",
                "count": 2
            }))
            .await;

        response.assert_status_ok();
        let events = sse_events(&response.text());
        assert_eq!(
            event_types(&events),
            vec!["connected", "found", "found", "complete"]
        );
        assert!(events[1..3].iter().all(|e| e["position"] == "both"));
        assert_eq!(recorded_args(&temp_dir), vec!["ab yz both 2"]);
    }

    #[tokio::test]
    async fn test_malformed_worker_output_is_dropped() {
        let worker = r#"
echo 'not json at all'
echo '{"type":"found","address":"abc1","private_key":"k1","index":1'
echo '{"type":"found","address":"abc1","attempts":5,"private_key":"k1","index":1}'
"#;
        let (server, _temp_dir) = setup_test_server(worker);

        let response = server.get("/generate").add_query_param("pattern", "abc").await;

        let body = response.text();
        assert!(!body.contains("not json"));
        let events = sse_events(&body);
        assert_eq!(event_types(&events), vec!["connected", "found", "complete"]);
        assert_eq!(events[2]["message"], "Done");
    }

    #[tokio::test]
    async fn test_missing_worker_binary_reports_error() {
        let (server, temp_dir) = setup_test_server_with(SCENARIO_WORKER, |config| {
            config.worker_binary = PathBuf::from("/nonexistent/solana-generator");
        });

        let response = server.get("/generate").add_query_param("pattern", "abc").await;

        response.assert_status_ok();
        let body = response.text();
        assert!(!body.contains("/nonexistent"));
        let events = sse_events(&body);
        assert_eq!(event_types(&events), vec!["connected", "error"]);
        assert!(events[1]["message"]
            .as_str()
            .unwrap()
            .starts_with("Failed to start search worker"));
        assert!(recorded_args(&temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_worker_crash_reports_exit_code() {
        let worker = r#"
echo '{"type":"progress","attempts":100,"found":0,"searching_for":1}'
exit 3
"#;
        let (server, _temp_dir) = setup_test_server(worker);

        let response = server.get("/generate").add_query_param("pattern", "abc").await;

        let events = sse_events(&response.text());
        assert_eq!(event_types(&events), vec!["connected", "progress", "error"]);
        assert_eq!(events[2]["message"], "Search worker failed (exit code 3)");
    }

    #[tokio::test]
    async fn test_missing_pattern_defaults_to_test() {
        let (server, temp_dir) = setup_test_server(SCENARIO_WORKER);

        let response = server.get("/generate").await;

        response.assert_status_ok();
        let events = sse_events(&response.text());
        assert_eq!(events[2]["address"], "test-prefix");
        assert_eq!(recorded_args(&temp_dir), vec!["test 1 prefix"]);
    }

    #[tokio::test]
    async fn test_blank_pattern_is_bad_request() {
        let (server, temp_dir) = setup_test_server(SCENARIO_WORKER);

        let response = server.get("/generate").add_query_param("pattern", "  ").await;

        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["error"], "bad_request");
        assert!(recorded_args(&temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_post_without_body_uses_defaults() {
        let (server, temp_dir) = setup_test_server(SCENARIO_WORKER);

        let response = server.post("/generate").await;

        response.assert_status_ok();
        let events = sse_events(&response.text());
        assert_eq!(events.last().unwrap()["type"], "complete");
        assert_eq!(recorded_args(&temp_dir), vec!["test 1 prefix"]);
    }

    #[tokio::test]
    async fn test_invalid_count_is_bad_request() {
        let (server, temp_dir) = setup_test_server(SCENARIO_WORKER);

        for count in ["0", "many", "101"] {
            let response = server
                .get("/generate")
                .add_query_param("pattern", "abc")
                .add_query_param("count", count)
                .await;
            response.assert_status_bad_request();
        }

        assert!(recorded_args(&temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_both_without_suffix_is_bad_request() {
        let (server, _temp_dir) = setup_test_server(SCENARIO_WORKER);

        let response = server
            .get("/generate")
            .add_query_param("pattern", "ab")
            .add_query_param("position", "both")
            .await;

        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn test_session_limit_returns_service_unavailable() {
        let (server, temp_dir) = setup_test_server_with(SCENARIO_WORKER, |config| {
            config.max_sessions = Some(0);
        });

        let response = server.get("/generate").add_query_param("pattern", "abc").await;

        response.assert_status_service_unavailable();
        let body: Value = response.json();
        assert_eq!(body["error"], "service_unavailable");
        assert!(recorded_args(&temp_dir).is_empty());
    }
}

mod generate_both {
    use super::*;

    #[tokio::test]
    async fn test_runs_prefix_then_suffix_with_single_completion() {
        let (server, temp_dir) = setup_test_server(SCENARIO_WORKER);

        let response = server
            .get("/generate-both")
            .add_query_param("pattern", "abc")
            .add_query_param("count", "5")
            .await;

        response.assert_status_ok();
        let events = sse_events(&response.text());
        assert_eq!(
            event_types(&events),
            vec!["connected", "progress", "found", "progress", "found", "complete"]
        );
        assert_eq!(events[2]["position"], "prefix");
        assert_eq!(events[2]["address"], "abc-prefix");
        assert_eq!(events[4]["position"], "suffix");
        assert_eq!(events[4]["address"], "abc-suffix");
        assert_eq!(events[5]["message"], "Both addresses found");
        assert_eq!(events[5]["position"], "both");

        // Dual searches always look for a single match per position.
        assert_eq!(recorded_args(&temp_dir), vec!["abc 1 prefix", "abc 1 suffix"]);
    }

    #[tokio::test]
    async fn test_count_is_ignored() {
        let (server, temp_dir) = setup_test_server(SCENARIO_WORKER);

        let response = server
            .get("/generate-both")
            .add_query_param("pattern", "abc")
            .add_query_param("count", "0")
            .await;

        response.assert_status_ok();
        assert_eq!(recorded_args(&temp_dir), vec!["abc 1 prefix", "abc 1 suffix"]);
    }

    #[tokio::test]
    async fn test_accepts_json_body() {
        let (server, temp_dir) = setup_test_server(SCENARIO_WORKER);

        let response = server
            .post("/generate-both")
            .json(&json!({ "pattern": "xyz", "chain": "solana" }))
            .await;

        response.assert_status_ok();
        let events = sse_events(&response.text());
        assert_eq!(events.last().unwrap()["type"], "complete");
        assert_eq!(recorded_args(&temp_dir), vec!["xyz 1 prefix", "xyz 1 suffix"]);
    }
}

mod static_files {
    use super::*;

    #[tokio::test]
    async fn test_web_dir_serves_index() {
        let web_dir = TempDir::new().expect("Failed to create web dir");
        fs::write(web_dir.path().join("index.html"), "<h1>vanity</h1>")
            .expect("Failed to write index");

        let web_path = web_dir.path().to_path_buf();
        let (server, _temp_dir) = setup_test_server_with(SCENARIO_WORKER, |config| {
            config.web_dir = Some(web_path);
        });

        let response = server.get("/").await;
        response.assert_status_ok();
        assert!(response.text().contains("<h1>vanity</h1>"));

        // Unknown paths fall back to the client app.
        let response = server.get("/some/client/route").await;
        assert!(response.text().contains("<h1>vanity</h1>"));
    }
}

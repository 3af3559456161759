//! Replay serving and live passthrough.

mod common;

use bank_scraper::fixtures::{load_recording, recording_path};
use bank_scraper::model::BankCode;
use bank_scraper::replay::{
    count_redactions, load_replay_log, sanitize_log, save_replay_log, MatchKind, ReplayOutcome,
    Replayer,
};
use bank_scraper::transport::live::LiveTransport;
use bank_scraper::transport::{OutgoingRequest, ResponseSource, StatusCapture, Transport};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn success_log() -> Replayer {
    Replayer::new(load_recording(&common::fixture_root(), BankCode::Bbva, "login_success").unwrap())
}

#[test]
fn test_wrapped_recording_is_indexed() {
    let stats = success_log().stats();
    assert_eq!(stats.entries, 6);
    assert_eq!(stats.exact_keys, 6);
    assert_eq!(stats.coarse_keys, 6);
}

#[test]
fn test_submission_redirect_is_followed_to_dashboard() {
    let replayer = success_log();
    match replayer.resolve("https://www.bbvanetcash.pe/DFAUTH85/slod_pe_web/DFServlet") {
        ReplayOutcome::Matched {
            response,
            match_kind,
            hops,
        } => {
            assert_eq!(match_kind, MatchKind::Exact);
            assert_eq!(hops, 1);
            assert_eq!(response.status, 200);
            assert!(response.body_text().contains("kyop-boby-table"));
            assert_eq!(response.header("location"), None);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_base64_body_is_decoded_and_encoding_header_dropped() {
    let replayer = success_log();
    match replayer.resolve("https://www.bbvanetcash.pe/nextgenempresas/portal/cuentas.html") {
        ReplayOutcome::Matched { response, .. } => {
            assert!(response.body_text().contains("list-group-currency=\"PEN\""));
            assert_eq!(response.header("content-encoding"), None);
            assert_eq!(
                response.header("content-type"),
                Some("text/html; charset=UTF-8")
            );
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_query_variance_falls_back_to_coarse_match() {
    let replayer = success_log();
    match replayer
        .resolve("https://www.bbvanetcash.pe/nextgenempresas/portal/movimientos.html?account=X")
    {
        ReplayOutcome::Matched { match_kind, .. } => assert_eq!(match_kind, MatchKind::Coarse),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_unmatched_request_gets_structured_404() {
    let replayer = success_log();
    let response = replayer
        .round_trip(&OutgoingRequest::get("https://www.bbvanetcash.pe/unknown"))
        .await
        .unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.source, ResponseSource::Synthetic);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body, serde_json::json!({"error": "no recording found for URL"}));
}

#[tokio::test]
async fn test_passthrough_reaches_live_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/static/app.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("console.log('ok')"))
        .mount(&server)
        .await;

    let live = LiveTransport::new(Duration::from_secs(5)).unwrap();
    let replayer = success_log().with_passthrough(Arc::new(live));

    let response = replayer
        .round_trip(&OutgoingRequest::get(format!("{}/static/app.js", server.uri())))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.source, ResponseSource::Network);
    assert_eq!(response.body_text(), "console.log('ok')");

    // Recorded URLs never hit the network.
    let recorded = replayer
        .round_trip(&OutgoingRequest::get(
            "https://www.bbvanetcash.pe/DFAUTH85/mult/KDPOSolicitarCredenciales_es.html",
        ))
        .await
        .unwrap();
    assert_eq!(recorded.source, ResponseSource::Recording);
}

#[tokio::test]
async fn test_status_capture_over_replay_sees_final_status() {
    let capture = StatusCapture::new(
        Arc::new(success_log()),
        "/DFAUTH85/slod_pe_web/DFServlet",
    );
    capture
        .round_trip(&OutgoingRequest::post_form(
            "https://www.bbvanetcash.pe/DFAUTH85/slod_pe_web/DFServlet",
            "cod_emp=x",
        ))
        .await
        .unwrap();
    capture
        .round_trip(&OutgoingRequest::get(
            "https://smetrics.bbva.pe/b/ss/bbvape/1/JS-2.22.0?AQB=1&pageName=inicio",
        ))
        .await
        .unwrap();
    assert_eq!(capture.captured(), Some(200));
}

#[test]
fn test_recordings_are_already_sanitized() {
    let root = common::fixture_root();
    for scenario in ["login_success", "login_bot_detection", "login_invalid_credentials"] {
        let log = load_replay_log(&recording_path(&root, BankCode::Bbva, scenario)).unwrap();
        let clean = sanitize_log(&log);
        assert_eq!(count_redactions(&log, &clean), 0, "{scenario} has secrets");
    }
}

#[test]
fn test_saved_log_reloads_in_native_format() {
    let dir = tempfile::tempdir().unwrap();
    let log = load_recording(&common::fixture_root(), BankCode::Bbva, "login_success").unwrap();
    let out = dir.path().join("copy.har.json");
    save_replay_log(&out, &log).unwrap();

    let raw = std::fs::read_to_string(&out).unwrap();
    assert!(!raw.contains("\"log\""));
    assert_eq!(load_replay_log(&out).unwrap(), log);
}

mod common;

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use diktat::audio::NullSink;
use diktat::clip::{Clip, ClipError, ClipOutcome, ClipPlayer, LoadError};
use diktat::controller::SessionController;
use diktat::session::{Phase, SessionConfig, Speed};
use diktat::source::{ClipSource, HttpClipSource, SourceError};
use tokio::net::TcpListener;
use tokio::runtime::Handle;

use common::{paths_for, wav_bytes};

static LOOPBACK_NO_PROXY: Once = Once::new();

/// Every test calls this before building a client, so the variable is
/// written once and only read afterwards.
fn bypass_proxy_for_loopback() {
    LOOPBACK_NO_PROXY.call_once(|| std::env::set_var("NO_PROXY", "127.0.0.1,localhost"));
}

#[derive(Clone)]
struct ClipServer {
    clip: Arc<Vec<u8>>,
    missing: Option<u32>,
    delay: Duration,
    hits: Arc<Mutex<Vec<String>>>,
}

async fn serve_clip(
    State(server): State<ClipServer>,
    Path((speed, number)): Path<(String, u32)>,
) -> Response {
    server
        .hits
        .lock()
        .unwrap()
        .push(format!("/api/audio/{speed}/{number}"));
    tokio::time::sleep(server.delay).await;

    if !["slow", "normal", "fast"].contains(&speed.as_str()) || server.missing == Some(number) {
        return StatusCode::NOT_FOUND.into_response();
    }
    ([(header::CONTENT_TYPE, "audio/wav")], server.clip.as_ref().clone()).into_response()
}

async fn spawn_clip_server(
    missing: Option<u32>,
    delay: Duration,
) -> (String, Arc<Mutex<Vec<String>>>) {
    bypass_proxy_for_loopback();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let state = ClipServer {
        clip: Arc::new(wav_bytes(100)),
        missing,
        delay,
        hits: hits.clone(),
    };
    let app = Router::new()
        .route("/api/audio/:speed/:number", get(serve_clip))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), hits)
}

#[tokio::test]
async fn fetches_clip_by_speed_and_number() {
    let (url, hits) = spawn_clip_server(None, Duration::ZERO).await;
    let source = HttpClipSource::new(format!("{url}/"), Duration::from_secs(5)).unwrap();
    assert_eq!(source.base_url(), url);

    let bytes = source.fetch(Clip::new(Speed::Slow, 42)).await.unwrap();
    assert_eq!(bytes, wav_bytes(100));
    assert_eq!(*hits.lock().unwrap(), vec!["/api/audio/slow/42".to_string()]);
}

#[tokio::test]
async fn missing_clip_is_status_error() {
    let (url, _) = spawn_clip_server(Some(13), Duration::ZERO).await;
    let source = HttpClipSource::new(url, Duration::from_secs(5)).unwrap();

    let err = source.fetch(Clip::new(Speed::Normal, 13)).await.unwrap_err();
    assert_matches!(err, SourceError::Status { status, .. } if status == 404);
}

#[tokio::test]
async fn stalled_server_hits_load_timeout() {
    let (url, _) = spawn_clip_server(None, Duration::from_secs(5)).await;
    let source = HttpClipSource::new(url, Duration::from_millis(200)).unwrap();

    let err = source.fetch(Clip::new(Speed::Fast, 1)).await.unwrap_err();
    assert_matches!(err, SourceError::Request { .. });
}

#[tokio::test]
async fn unreachable_server_is_load_error_for_player() {
    bypass_proxy_for_loopback();
    let source = HttpClipSource::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
    let player = ClipPlayer::new(Arc::new(source), Arc::new(NullSink::new()));
    assert_eq!(player.source_location(), "http://127.0.0.1:9");

    let err = player.play(Clip::new(Speed::Normal, 7)).await.unwrap_err();
    assert_matches!(
        &err,
        ClipError::Load {
            number: 7,
            source: LoadError::Source(SourceError::Request { .. })
        }
    );
    assert_eq!(err.user_message(), "Failed to load audio file for number 7");
}

#[tokio::test]
async fn player_plays_served_clip() {
    let (url, _) = spawn_clip_server(None, Duration::ZERO).await;
    let source = HttpClipSource::new(url, Duration::from_secs(5)).unwrap();
    let sink = Arc::new(NullSink::new());
    let player = ClipPlayer::new(Arc::new(source), sink.clone());

    let outcome = player.play(Clip::new(Speed::Normal, 3)).await.unwrap();
    assert_eq!(outcome, ClipOutcome::Finished);
    assert_eq!(sink.started(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dictation_over_http_requests_every_number_in_order() {
    let (url, hits) = spawn_clip_server(None, Duration::ZERO).await;
    let source = HttpClipSource::new(url, Duration::from_secs(5)).unwrap();
    let player = Arc::new(ClipPlayer::new(Arc::new(source), Arc::new(NullSink::new())));
    let mut controller = SessionController::new(
        player,
        Handle::current(),
        SessionConfig::new(Speed::Normal, 3, 0.5),
    );

    controller.start().unwrap();
    controller.join().await;

    let state = controller.snapshot();
    assert_eq!(state.phase, Phase::Review);
    assert_eq!(state.played, 3);
    assert_eq!(*hits.lock().unwrap(), paths_for("normal", &state.numbers));
}

#[test]
fn loopback_proxy_bypass_is_written_once() {
    bypass_proxy_for_loopback();
    bypass_proxy_for_loopback();
    assert!(LOOPBACK_NO_PROXY.is_completed());
    assert_eq!(
        std::env::var("NO_PROXY").as_deref(),
        Ok("127.0.0.1,localhost")
    );
}

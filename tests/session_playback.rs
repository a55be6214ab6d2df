mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use diktat::audio::NullSink;
use diktat::clip::{Clip, ClipPlayer};
use diktat::controller::{SessionController, SessionError};
use diktat::review;
use diktat::session::{generate_numbers, Phase, SessionConfig, Speed};
use diktat::source::MemoryClipSource;
use rand::{rngs::StdRng, SeedableRng};
use tokio::runtime::Handle;

use common::{paths_for, wav_bytes};

struct Harness {
    controller: SessionController,
    source: Arc<MemoryClipSource>,
    sink: Arc<NullSink>,
}

fn harness(source: MemoryClipSource, config: SessionConfig) -> Harness {
    let source = Arc::new(source);
    let sink = Arc::new(NullSink::new());
    let player = Arc::new(ClipPlayer::new(source.clone(), sink.clone()));
    Harness {
        controller: SessionController::new(player, Handle::current(), config),
        source,
        sink,
    }
}

async fn wait_for_played(controller: &SessionController, played: usize) {
    for _ in 0..1000 {
        if controller.snapshot().played >= played {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("never reached {played} played clips");
}

#[tokio::test(start_paused = true)]
async fn three_numbers_play_in_order_then_review() {
    let mut h = harness(
        MemoryClipSource::new(wav_bytes(100)),
        SessionConfig::new(Speed::Normal, 3, 0.0),
    );
    assert_eq!(h.controller.config().pause_secs, 0.5);

    h.controller.start().unwrap();
    assert_eq!(h.controller.phase(), Phase::Playing);
    h.controller.join().await;

    let state = h.controller.snapshot();
    assert_eq!(state.phase, Phase::Review);
    assert_eq!(state.numbers.len(), 3);
    assert_eq!(state.played, 3);
    assert_eq!(state.cursor, None);
    assert_eq!(state.error, None);
    assert_eq!(h.source.requests(), paths_for("normal", &state.numbers));
    assert_eq!(h.sink.peak_active(), 1);

    let rows = review::rows(&state.numbers);
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0],
        [
            Some(state.numbers[0]),
            Some(state.numbers[1]),
            Some(state.numbers[2]),
            None,
            None
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn seven_numbers_fill_two_review_rows() {
    let mut h = harness(
        MemoryClipSource::new(wav_bytes(50)),
        SessionConfig::new(Speed::Fast, 7, 0.5),
    );
    h.controller.start().unwrap();
    h.controller.join().await;

    let state = h.controller.snapshot();
    assert_eq!(state.played, 7);
    assert_eq!(h.source.requests(), paths_for("fast", &state.numbers));

    let rows = review::rows(&state.numbers);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][..2], [Some(state.numbers[5]), Some(state.numbers[6])]);
    assert_eq!(rows[1][2..], [None, None, None]);
}

#[tokio::test(start_paused = true)]
async fn stop_during_pause_ends_after_first_clip() {
    let mut h = harness(
        MemoryClipSource::new(wav_bytes(100)),
        SessionConfig::new(Speed::Slow, 5, 10.0),
    );
    h.controller.start().unwrap();
    wait_for_played(&h.controller, 1).await;

    assert!(h.controller.stop());
    let state = h.controller.snapshot();
    assert_eq!(state.phase, Phase::Review);
    assert_eq!(state.cursor, None);
    assert_eq!(state.played, 1);
    assert_eq!(state.numbers.len(), 5);
    assert!(state.ended_early());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.sink.started(), 1);
    assert_eq!(h.source.requests().len(), 1);
    assert!(!h.controller.is_running());
    assert_eq!(h.controller.phase(), Phase::Review);
}

#[tokio::test(start_paused = true)]
async fn escape_mid_clip_silences_it() {
    let mut h = harness(
        MemoryClipSource::new(wav_bytes(2000)),
        SessionConfig::new(Speed::Normal, 3, 0.5),
    );
    h.controller.start().unwrap();
    for _ in 0..100 {
        if h.sink.active() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.sink.active(), 1);

    assert!(h.controller.cancel_via_key());
    h.controller.join().await;
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(h.sink.active(), 0);
    assert_eq!(h.controller.snapshot().played, 0);
    assert!(!h.controller.player().is_active());
}

#[tokio::test(start_paused = true)]
async fn missing_clip_aborts_into_review() {
    let (seed, numbers) = (0..1000u64)
        .map(|seed| (seed, generate_numbers(&mut StdRng::seed_from_u64(seed), 4)))
        .find(|(_, n)| n[0] != n[1])
        .unwrap();

    let mut h = harness(
        MemoryClipSource::new(wav_bytes(100)).with_missing(numbers[1]),
        SessionConfig::new(Speed::Normal, 4, 0.5),
    );
    h.controller
        .start_with_rng(&mut StdRng::seed_from_u64(seed))
        .unwrap();
    h.controller.join().await;

    let state = h.controller.snapshot();
    assert_eq!(state.numbers, numbers);
    assert_eq!(state.phase, Phase::Review);
    assert_eq!(state.played, 1);
    assert_eq!(
        state.error.as_deref(),
        Some(format!("Failed to load audio file for number {}", numbers[1]).as_str())
    );
    assert_eq!(h.source.requests(), paths_for("normal", &numbers[..2]));
}

#[tokio::test(start_paused = true)]
async fn preview_is_stopped_when_dictation_starts() {
    let mut h = harness(
        MemoryClipSource::new(wav_bytes(5000)),
        SessionConfig::new(Speed::Normal, 2, 0.5),
    );
    let player = h.controller.player().clone();
    let preview = tokio::spawn(async move { player.play(Clip::new(Speed::Fast, 99)).await });
    for _ in 0..100 {
        if h.sink.active() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    h.controller.start().unwrap();
    h.controller.join().await;

    assert!(preview.await.unwrap().is_ok());
    assert_eq!(h.sink.peak_active(), 1);
    assert_eq!(h.source.requests()[0], "/api/audio/fast/99");
    assert_eq!(h.controller.snapshot().played, 2);
}

#[tokio::test(start_paused = true)]
async fn settings_locked_while_playing() {
    let mut h = harness(
        MemoryClipSource::new(wav_bytes(100)),
        SessionConfig::default(),
    );
    h.controller.start().unwrap();

    assert_matches!(
        h.controller.configure(Speed::Fast, 5, 1.0),
        Err(SessionError::WrongPhase {
            actual: Phase::Playing,
            ..
        })
    );
    assert_matches!(h.controller.start(), Err(SessionError::WrongPhase { .. }));
    assert_eq!(h.controller.config(), SessionConfig::default());

    h.controller.reset();
    assert_eq!(h.controller.phase(), Phase::Setup);
    assert!(h.controller.configure(Speed::Fast, 5, 1.0).is_ok());
}

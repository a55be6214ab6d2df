use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::audio::{decode, AudioSink, DecodeError, OutputError, Pcm};
use crate::session::Speed;
use crate::source::{ClipSource, SourceError};

/// One spoken-number clip, addressed by speed and number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Clip {
    pub speed: Speed,
    pub number: u32,
}

impl Clip {
    pub fn new(speed: Speed, number: u32) -> Self {
        Self { speed, number }
    }

    pub fn path(&self) -> String {
        format!("/api/audio/{}/{}", self.speed, self.number)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("decoder task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("failed to load clip for number {number}: {source}")]
    Load {
        number: u32,
        #[source]
        source: LoadError,
    },
    #[error("playback of number {number} failed: {source}")]
    Playback {
        number: u32,
        #[source]
        source: OutputError,
    },
}

impl ClipError {
    pub fn number(&self) -> u32 {
        match self {
            ClipError::Load { number, .. } | ClipError::Playback { number, .. } => *number,
        }
    }

    /// Short message for the screen
    pub fn user_message(&self) -> String {
        match self {
            ClipError::Load { number, .. } => {
                format!("Failed to load audio file for number {number}")
            }
            ClipError::Playback { number, .. } => {
                format!("Error playing audio for number {number}")
            }
        }
    }
}

/// Observable state of the player
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ClipStatus {
    #[default]
    Idle,
    Loading(Clip),
    Playing(Clip),
    Failed(String),
}

impl ClipStatus {
    pub fn is_busy(&self) -> bool {
        matches!(self, ClipStatus::Loading(_) | ClipStatus::Playing(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipOutcome {
    /// the clip played to its end
    Finished,
    /// `stop()` or a newer `play()` ended it early
    Stopped,
}

struct ActiveClip {
    id: u64,
    clip: Clip,
    stop: CancellationToken,
}

/// Loads and plays one clip at a time. Shared by the preview control and the
/// session loop, so there is a single audio slot for the whole app.
pub struct ClipPlayer {
    source: Arc<dyn ClipSource>,
    sink: Arc<dyn AudioSink>,
    current: Mutex<Option<ActiveClip>>,
    next_id: AtomicU64,
    status: watch::Sender<ClipStatus>,
}

impl ClipPlayer {
    pub fn new(source: Arc<dyn ClipSource>, sink: Arc<dyn AudioSink>) -> Self {
        let (status, _) = watch::channel(ClipStatus::Idle);
        Self {
            source,
            sink,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            status,
        }
    }

    pub fn status(&self) -> ClipStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClipStatus> {
        self.status.subscribe()
    }

    pub fn source_location(&self) -> String {
        self.source.location()
    }

    pub fn current_clip(&self) -> Option<Clip> {
        self.current.lock().as_ref().map(|active| active.clip)
    }

    pub fn is_active(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Play `clip` to its end. Anything already playing is stopped first, so a
    /// repeated call restarts from the beginning.
    pub async fn play(&self, clip: Clip) -> Result<ClipOutcome, ClipError> {
        let (id, stop) = self.begin(clip);
        self.publish(id, ClipStatus::Loading(clip));
        debug!(number = clip.number, speed = %clip.speed, "clip loading");

        let loaded = tokio::select! {
            biased;
            _ = stop.cancelled() => return Ok(ClipOutcome::Stopped),
            loaded = self.load(clip) => loaded,
        };
        let pcm = loaded.map_err(|source| {
            self.fail(
                id,
                ClipError::Load {
                    number: clip.number,
                    source,
                },
            )
        })?;

        let playback = self.sink.start(pcm, stop.clone()).map_err(|source| {
            self.fail(
                id,
                ClipError::Playback {
                    number: clip.number,
                    source,
                },
            )
        })?;
        self.publish(id, ClipStatus::Playing(clip));
        debug!(number = clip.number, "clip playing");

        let played = tokio::select! {
            biased;
            _ = stop.cancelled() => return Ok(ClipOutcome::Stopped),
            played = playback => played.unwrap_or(Err(OutputError::Closed)),
        };

        match played {
            Ok(()) if stop.is_cancelled() => Ok(ClipOutcome::Stopped),
            Ok(()) => {
                self.release(id);
                debug!(number = clip.number, "clip finished");
                Ok(ClipOutcome::Finished)
            }
            Err(source) => Err(self.fail(
                id,
                ClipError::Playback {
                    number: clip.number,
                    source,
                },
            )),
        }
    }

    /// Silence and release the active clip, if any. Also clears the error
    /// left by a failed clip.
    pub fn stop(&self) {
        let mut current = self.current.lock();
        if let Some(active) = current.take() {
            debug!(number = active.clip.number, "clip stopped");
            active.stop.cancel();
        }
        self.status.send_if_modified(|status| {
            let changed = *status != ClipStatus::Idle;
            *status = ClipStatus::Idle;
            changed
        });
    }

    fn begin(&self, clip: Clip) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stop = CancellationToken::new();
        let previous = self.current.lock().replace(ActiveClip {
            id,
            clip,
            stop: stop.clone(),
        });
        if let Some(previous) = previous {
            previous.stop.cancel();
        }
        (id, stop)
    }

    async fn load(&self, clip: Clip) -> Result<Pcm, LoadError> {
        let bytes = self.source.fetch(clip).await?;
        let pcm = tokio::task::spawn_blocking(move || decode(&bytes))
            .await
            .map_err(|e| LoadError::Task(e.to_string()))??;
        debug!(
            number = clip.number,
            duration_ms = pcm.duration().as_millis() as u64,
            "clip decoded"
        );
        Ok(pcm)
    }

    /// Status updates from a superseded clip are dropped
    fn publish(&self, id: u64, status: ClipStatus) {
        let current = self.current.lock();
        if current.as_ref().map(|a| a.id) == Some(id) {
            self.status.send_replace(status);
        }
    }

    fn release(&self, id: u64) {
        let mut current = self.current.lock();
        if current.as_ref().map(|a| a.id) == Some(id) {
            *current = None;
            self.status.send_replace(ClipStatus::Idle);
        }
    }

    fn fail(&self, id: u64, err: ClipError) -> ClipError {
        warn!(number = err.number(), "clip failed: {err}");
        let mut current = self.current.lock();
        if current.as_ref().map(|a| a.id) == Some(id) {
            *current = None;
            self.status
                .send_replace(ClipStatus::Failed(err.user_message()));
        }
        err
    }
}

impl Drop for ClipPlayer {
    fn drop(&mut self) {
        if let Some(active) = self.current.get_mut().take() {
            active.stop.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullSink;
    use crate::fixtures::short_clip;

    fn wav_bytes() -> Vec<u8> {
        short_clip().unwrap()
    }
    use crate::source::MemoryClipSource;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn player(source: MemoryClipSource, sink: NullSink) -> Arc<ClipPlayer> {
        Arc::new(ClipPlayer::new(Arc::new(source), Arc::new(sink)))
    }

    #[test]
    fn clip_path_matches_service_route() {
        assert_eq!(Clip::new(Speed::Normal, 5).path(), "/api/audio/normal/5");
        assert_eq!(Clip::new(Speed::Fast, 100).path(), "/api/audio/fast/100");
    }

    #[test]
    fn user_messages_name_the_number() {
        let load = ClipError::Load {
            number: 17,
            source: LoadError::Task("boom".into()),
        };
        assert_eq!(load.user_message(), "Failed to load audio file for number 17");
        assert_eq!(load.number(), 17);

        let playback = ClipError::Playback {
            number: 3,
            source: OutputError::NoDevice,
        };
        assert_eq!(playback.user_message(), "Error playing audio for number 3");
    }

    #[tokio::test(start_paused = true)]
    async fn play_runs_to_natural_end() {
        let sink = NullSink::new();
        let player = player(MemoryClipSource::new(wav_bytes()), sink.clone());

        let outcome = player.play(Clip::new(Speed::Normal, 9)).await.unwrap();

        assert_eq!(outcome, ClipOutcome::Finished);
        assert_eq!(player.status(), ClipStatus::Idle);
        assert!(!player.is_active());
        assert_eq!(sink.started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn status_moves_through_loading_and_playing() {
        let sink = NullSink::with_duration(Duration::from_secs(5));
        let source = MemoryClipSource::new(wav_bytes()).with_delay(Duration::from_secs(1));
        let player = player(source, sink);
        let mut rx = player.subscribe();

        let task = {
            let player = player.clone();
            tokio::spawn(async move { player.play(Clip::new(Speed::Slow, 4)).await })
        };

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ClipStatus::Loading(Clip::new(Speed::Slow, 4)));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ClipStatus::Playing(Clip::new(Speed::Slow, 4)));
        assert_eq!(player.current_clip(), Some(Clip::new(Speed::Slow, 4)));

        assert_eq!(task.await.unwrap().unwrap(), ClipOutcome::Finished);
        assert_eq!(player.status(), ClipStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_playback_early() {
        let sink = NullSink::with_duration(Duration::from_secs(30));
        let player = player(MemoryClipSource::new(wav_bytes()), sink.clone());
        let mut rx = player.subscribe();

        let task = {
            let player = player.clone();
            tokio::spawn(async move { player.play(Clip::new(Speed::Normal, 1)).await })
        };
        rx.wait_for(|s| matches!(s, ClipStatus::Playing(_)))
            .await
            .unwrap();

        player.stop();
        assert!(!player.is_active());
        assert_eq!(player.status(), ClipStatus::Idle);

        assert_eq!(task.await.unwrap().unwrap(), ClipOutcome::Stopped);
        tokio::task::yield_now().await;
        assert_eq!(sink.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_loading_never_starts_output() {
        let source = MemoryClipSource::new(wav_bytes()).with_delay(Duration::from_secs(10));
        let sink = NullSink::new();
        let player = player(source, sink.clone());

        let task = {
            let player = player.clone();
            tokio::spawn(async move { player.play(Clip::new(Speed::Normal, 2)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        player.stop();

        assert_eq!(task.await.unwrap().unwrap(), ClipOutcome::Stopped);
        assert_eq!(sink.started(), 0);
    }

    #[test]
    fn stop_without_clip_is_harmless() {
        let player = player(MemoryClipSource::new(Vec::new()), NullSink::new());
        player.stop();
        player.stop();
        assert_eq!(player.status(), ClipStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn second_play_replaces_first() {
        let sink = NullSink::with_duration(Duration::from_secs(10));
        let player = player(MemoryClipSource::new(wav_bytes()), sink.clone());

        let first = {
            let player = player.clone();
            tokio::spawn(async move { player.play(Clip::new(Speed::Normal, 1)).await })
        };
        let mut rx = player.subscribe();
        rx.wait_for(|s| matches!(s, ClipStatus::Playing(_)))
            .await
            .unwrap();

        let second = player.play(Clip::new(Speed::Normal, 2)).await.unwrap();

        assert_eq!(first.await.unwrap().unwrap(), ClipOutcome::Stopped);
        assert_eq!(second, ClipOutcome::Finished);
        assert_eq!(sink.started(), 2);
        assert_eq!(sink.peak_active(), 1);
    }

    #[tokio::test]
    async fn missing_clip_is_load_error() {
        let player = player(
            MemoryClipSource::new(wav_bytes()).with_missing(55),
            NullSink::new(),
        );

        let err = player.play(Clip::new(Speed::Fast, 55)).await.unwrap_err();

        assert_matches!(err, ClipError::Load { number: 55, source: LoadError::Source(_) });
        assert_eq!(err.number(), 55);
        assert_eq!(
            player.status(),
            ClipStatus::Failed("Failed to load audio file for number 55".into())
        );
        assert!(!player.is_active());
    }

    #[tokio::test]
    async fn undecodable_clip_is_load_error() {
        let player = player(
            MemoryClipSource::new(b"not audio at all".to_vec()),
            NullSink::new(),
        );

        let err = player.play(Clip::new(Speed::Normal, 8)).await.unwrap_err();

        assert_matches!(err, ClipError::Load { number: 8, source: LoadError::Decode(_) });
    }

    #[tokio::test]
    async fn failed_status_clears_on_next_play() {
        let player = player(
            MemoryClipSource::new(wav_bytes()).with_missing(1),
            NullSink::with_duration(Duration::from_millis(1)),
        );
        let _ = player.play(Clip::new(Speed::Normal, 1)).await;
        assert_matches!(player.status(), ClipStatus::Failed(_));

        player.play(Clip::new(Speed::Normal, 2)).await.unwrap();
        assert_eq!(player.status(), ClipStatus::Idle);
    }

    #[tokio::test]
    async fn stop_clears_failed_status() {
        let player = player(MemoryClipSource::new(Vec::new()), NullSink::new());
        let _ = player.play(Clip::new(Speed::Slow, 12)).await;
        assert_matches!(player.status(), ClipStatus::Failed(_));

        player.stop();
        assert_eq!(player.status(), ClipStatus::Idle);
    }
}

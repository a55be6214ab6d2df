use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clip::{Clip, ClipOutcome, ClipPlayer};
use crate::session::{generate_numbers, Phase, SessionConfig, SessionState, Speed};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{action} is only available in the {expected} phase (currently {actual})")]
    WrongPhase {
        action: &'static str,
        expected: Phase,
        actual: Phase,
    },
}

/// Drives one dictation at a time: setup -> playing -> review -> setup.
///
/// The state lives behind a shared lock so the playback task, the stop
/// button and the escape key all act on the same, current session.
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    player: Arc<ClipPlayer>,
    runtime: Handle,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl SessionController {
    pub fn new(player: Arc<ClipPlayer>, runtime: Handle, config: SessionConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new(config))),
            player,
            runtime,
            cancel: None,
            task: None,
        }
    }

    /// Copy of the current session state
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn config(&self) -> SessionConfig {
        self.state.lock().config
    }

    pub fn player(&self) -> &Arc<ClipPlayer> {
        &self.player
    }

    /// Change the settings of the next dictation. Values are clamped into
    /// range; rejected outside the setup phase.
    pub fn configure(
        &mut self,
        speed: Speed,
        count: usize,
        pause_secs: f64,
    ) -> Result<SessionConfig, SessionError> {
        let mut state = self.state.lock();
        if state.phase != Phase::Setup {
            return Err(SessionError::WrongPhase {
                action: "configure",
                expected: Phase::Setup,
                actual: state.phase,
            });
        }
        state.config = SessionConfig::new(speed, count, pause_secs);
        debug!(config = ?state.config, "session configured");
        Ok(state.config)
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        self.start_with_rng(&mut rand::thread_rng())
    }

    /// Draw a fresh sequence and begin playing it
    pub fn start_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if state.phase != Phase::Setup {
            return Err(SessionError::WrongPhase {
                action: "start",
                expected: Phase::Setup,
                actual: state.phase,
            });
        }

        // a preview may still own the audio slot
        self.player.stop();

        let config = state.config;
        let numbers = generate_numbers(rng, config.count);
        state.numbers = numbers.clone();
        state.phase = Phase::Playing;
        state.cursor = Some(0);
        state.played = 0;
        state.error = None;
        drop(state);

        info!(
            count = config.count,
            speed = %config.speed,
            pause_secs = config.pause_secs,
            "dictation started"
        );

        let token = CancellationToken::new();
        let task = self.runtime.spawn(play_sequence(
            numbers,
            config,
            self.state.clone(),
            self.player.clone(),
            token.clone(),
        ));
        self.cancel = Some(token);
        self.task = Some(task);
        Ok(())
    }

    /// End the running dictation now and go to review. Returns false when
    /// nothing was playing.
    pub fn stop(&mut self) -> bool {
        let mut state = self.state.lock();
        if state.phase != Phase::Playing {
            return false;
        }

        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.player.stop();

        state.phase = Phase::Review;
        state.cursor = None;
        info!(
            played = state.played,
            total = state.numbers.len(),
            "dictation stopped"
        );
        true
    }

    /// Escape-key path. Same effect as `stop`, only while playing.
    pub fn cancel_via_key(&mut self) -> bool {
        if self.phase() != Phase::Playing {
            return false;
        }
        debug!("cancel key pressed");
        self.stop()
    }

    /// Back to setup for a new dictation. A running dictation is stopped
    /// first, so it passes through review.
    pub fn reset(&mut self) {
        self.stop();
        self.player.stop();
        self.cancel = None;
        self.task = None;

        let mut state = self.state.lock();
        state.numbers.clear();
        state.phase = Phase::Setup;
        state.cursor = None;
        state.played = 0;
        state.error = None;
        debug!("session reset");
    }

    /// Wait for the playback task of the current dictation to exit
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("playback task ended abnormally: {e}");
            }
        }
    }

    /// Whether the playback task of the last start is still alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.player.stop();
    }
}

/// The sequential playback protocol. Stops are noticed at every suspension
/// point; every state write re-checks the token under the lock, so a stop
/// that already moved the session to review is never overwritten.
async fn play_sequence(
    numbers: Vec<u32>,
    config: SessionConfig,
    state: Arc<Mutex<SessionState>>,
    player: Arc<ClipPlayer>,
    token: CancellationToken,
) {
    for (index, &number) in numbers.iter().enumerate() {
        {
            let mut state = state.lock();
            if token.is_cancelled() {
                return;
            }
            state.cursor = Some(index);
        }
        debug!(index, number, "playing item");

        let outcome = player.play(Clip::new(config.speed, number)).await;

        match outcome {
            Ok(ClipOutcome::Finished) => {
                let mut state = state.lock();
                state.played += 1;
                if token.is_cancelled() {
                    return;
                }
            }
            Ok(ClipOutcome::Stopped) => {
                finish(&state, &token, None);
                return;
            }
            Err(err) => {
                finish(&state, &token, Some(err.user_message()));
                return;
            }
        }

        if pause(config.pause(), &token).await.is_err() {
            return;
        }
    }

    finish(&state, &token, None);
}

async fn pause(duration: Duration, token: &CancellationToken) -> Result<(), ()> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(()),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

fn finish(state: &Mutex<SessionState>, token: &CancellationToken, error: Option<String>) {
    let mut state = state.lock();
    if token.is_cancelled() || state.phase != Phase::Playing {
        return;
    }
    state.phase = Phase::Review;
    state.cursor = None;
    match error {
        Some(message) => {
            warn!(played = state.played, "dictation aborted: {message}");
            state.error = Some(message);
        }
        None => info!(played = state.played, "dictation complete"),
    }
}

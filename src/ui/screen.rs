use ratatui::{buffer::Buffer, layout::Rect};

use diktat::{
    clip::ClipStatus,
    session::{Phase, SessionState},
};

use crate::{
    ui::{render_playing, render_review, render_setup},
    App,
};

/// One phase of the dictation, drawn from a snapshot of the session
pub trait Screen {
    fn render(
        &self,
        app: &App,
        state: &SessionState,
        status: &ClipStatus,
        area: Rect,
        buf: &mut Buffer,
    );
}

/// Settings form plus the preview control
pub struct SetupScreen;

impl Screen for SetupScreen {
    fn render(&self, app: &App, _: &SessionState, status: &ClipStatus, area: Rect, buf: &mut Buffer) {
        render_setup(app, status, area, buf);
    }
}

pub struct PlayingScreen;

impl Screen for PlayingScreen {
    fn render(&self, _: &App, state: &SessionState, status: &ClipStatus, area: Rect, buf: &mut Buffer) {
        render_playing(state, status, area, buf);
    }
}

/// Table of everything that was generated, in playback order
pub struct ReviewScreen;

impl Screen for ReviewScreen {
    fn render(&self, _: &App, state: &SessionState, _: &ClipStatus, area: Rect, buf: &mut Buffer) {
        render_review(state, area, buf);
    }
}

pub fn current_screen(phase: Phase) -> Box<dyn Screen> {
    match phase {
        Phase::Setup => Box::new(SetupScreen),
        Phase::Playing => Box::new(PlayingScreen),
        Phase::Review => Box::new(ReviewScreen),
    }
}

mod ui;

use std::io::{self, stdin};
use std::sync::Arc;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use diktat::{
    app_dirs::AppDirs,
    audio::{AudioSink, CpalSink, NullSink},
    clip::{Clip, ClipPlayer, ClipStatus},
    config::{ConfigStore, FileConfigStore, Preferences},
    controller::SessionController,
    form::{Field, SetupForm, Step},
    logging,
    runtime::{AppEvent, CrosstermEventSource, EventSource, FixedTicker, Runner, Ticker},
    session::{Phase, Speed, MAX_NUMBER, MIN_NUMBER},
    source::HttpClipSource,
};
use rand::Rng;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

const TICK_RATE_MS: u64 = 100;

/// numbers dictation trainer for the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Plays a random sequence of spoken numbers from a clip server, one after another, then shows them so you can check what you wrote down."
)]
pub struct Cli {
    /// base url of the clip server
    #[clap(short = 'u', long = "server")]
    server: Option<String>,

    /// speaking speed of the clips
    #[clap(short = 's', long, value_enum)]
    speed: Option<Speed>,

    /// how many numbers to dictate (1-100)
    #[clap(short = 'c', long)]
    count: Option<usize>,

    /// seconds of silence between numbers (0.5-10)
    #[clap(short = 'p', long = "pause")]
    pause: Option<f64>,

    /// seconds to wait for a clip to download
    #[clap(long, default_value_t = 10)]
    load_timeout: u64,

    /// do not open an audio device, clips play as silence
    #[clap(long)]
    silent: bool,
}

impl Cli {
    /// Saved preferences with any flags given on the command line applied
    fn preferences(&self, mut prefs: Preferences) -> Preferences {
        if let Some(server) = &self.server {
            prefs.server_url = server.clone();
        }
        if let Some(speed) = self.speed {
            prefs.speed = speed;
        }
        if let Some(count) = self.count {
            prefs.count = count;
        }
        if let Some(pause) = self.pause {
            prefs.pause_secs = pause;
        }
        let session = prefs.session_config();
        prefs.with_session(session)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    pub controller: SessionController,
    pub form: SetupForm,
    prefs: Preferences,
    store: Box<dyn ConfigStore>,
    runtime: Handle,
}

impl App {
    pub fn new(
        controller: SessionController,
        prefs: Preferences,
        store: Box<dyn ConfigStore>,
        runtime: Handle,
    ) -> Self {
        Self {
            form: SetupForm::new(controller.config()),
            controller,
            prefs,
            store,
            runtime,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.controller.stop();
            self.controller.player().stop();
            return Flow::Quit;
        }

        match self.controller.phase() {
            Phase::Setup => self.on_setup_key(key),
            Phase::Playing => {
                match key.code {
                    KeyCode::Esc => {
                        self.controller.cancel_via_key();
                    }
                    KeyCode::Char('s') => {
                        self.controller.stop();
                    }
                    _ => {}
                }
                Flow::Continue
            }
            Phase::Review => match key.code {
                KeyCode::Char('n') | KeyCode::Enter => {
                    self.controller.reset();
                    Flow::Continue
                }
                KeyCode::Char('q') => Flow::Quit,
                _ => Flow::Continue,
            },
        }
    }

    fn on_setup_key(&mut self, key: KeyEvent) -> Flow {
        match key.code {
            KeyCode::Char('q') => {
                self.controller.player().stop();
                return Flow::Quit;
            }
            KeyCode::Up | KeyCode::BackTab => self.form.focus_prev(),
            KeyCode::Down | KeyCode::Tab => self.form.focus_next(),
            KeyCode::Left | KeyCode::Char('-') => self.adjust(|f| f.decrease(Step::Fine)),
            KeyCode::Right | KeyCode::Char('+') | KeyCode::Char('=') => {
                self.adjust(|f| f.increase(Step::Fine))
            }
            KeyCode::PageUp => self.adjust(|f| f.increase(Step::Coarse)),
            KeyCode::PageDown => self.adjust(|f| f.decrease(Step::Coarse)),
            KeyCode::Enter => self.start_dictation(),
            KeyCode::Char('p') => self.toggle_preview(),
            _ => {}
        }
        Flow::Continue
    }

    fn adjust(&mut self, change: impl FnOnce(&mut SetupForm)) {
        let speed = self.form.speed;
        change(&mut self.form);

        // a failed preview belongs to the old speed
        if self.form.focus == Field::Speed
            && self.form.speed != speed
            && matches!(self.controller.player().status(), ClipStatus::Failed(_))
        {
            self.controller.player().stop();
        }
    }

    fn start_dictation(&mut self) {
        let form = self.form.config();
        let config = match self
            .controller
            .configure(form.speed, form.count, form.pause_secs)
        {
            Ok(config) => config,
            Err(e) => {
                warn!("cannot configure dictation: {e}");
                return;
            }
        };
        if let Err(e) = self.controller.start() {
            warn!("cannot start dictation: {e}");
            return;
        }

        self.prefs = self.prefs.clone().with_session(config);
        if let Err(e) = self.store.save(&self.prefs) {
            warn!("failed to save preferences: {e}");
        }
    }

    /// Play a random number at the selected speed, or stop the one that is
    /// loading or playing
    fn toggle_preview(&mut self) {
        let player = self.controller.player().clone();
        if player.status().is_busy() {
            player.stop();
            return;
        }

        let number = rand::thread_rng().gen_range(MIN_NUMBER..=MAX_NUMBER);
        let clip = Clip::new(self.form.speed, number);
        debug!(speed = %clip.speed, number, "preview requested");
        self.runtime.spawn(async move {
            if let Err(e) = player.play(clip).await {
                debug!("preview ended with error: {e}");
            }
        });
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    if let Some(path) = AppDirs::log_path() {
        if let Err(e) = logging::init(&path) {
            eprintln!("diktat: logging disabled: {e}");
        }
    }

    let store = FileConfigStore::new();
    let prefs = cli.preferences(store.load());
    info!(server = %prefs.server_url, silent = cli.silent, "starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("diktat-worker")
        .build()?;

    let source = HttpClipSource::new(
        prefs.server_url.clone(),
        Duration::from_secs(cli.load_timeout),
    )?;
    let sink: Arc<dyn AudioSink> = if cli.silent {
        Arc::new(NullSink::new())
    } else {
        Arc::new(CpalSink)
    };
    let player = Arc::new(ClipPlayer::new(Arc::new(source), sink));
    let controller = SessionController::new(
        player,
        runtime.handle().clone(),
        prefs.session_config(),
    );
    let mut app = App::new(controller, prefs, Box::new(store), runtime.handle().clone());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    drop(app);
    runtime.shutdown_timeout(Duration::from_millis(500));
    info!("exiting");

    result
}

fn start_tui<B: Backend, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
) -> anyhow::Result<()> {
    loop {
        // playback advances on its own task, so every tick redraws
        terminal.draw(|f| ui(app, f))?;

        match runner.step() {
            AppEvent::Key(key) => {
                if app.handle_key(key) == Flow::Quit {
                    break;
                }
            }
            AppEvent::Resize | AppEvent::Tick => {}
        }
    }

    Ok(())
}

fn ui(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}

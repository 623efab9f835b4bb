pub mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use env_logger::{Env, Target};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    fs::{self, OpenOptions},
    io::{self, stdin},
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    time::Duration,
};
use stride::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, DeliveryMode, DistanceUnit, FileConfigStore},
    location::{read_track, LocationProvider, PollingProvider, ReplayProvider, SimulatedRunner},
    permission::{Authorization, FixedPermissionGate, PermissionGate, RememberingGate},
    runtime::{spawn_terminal_events, ChannelEventSource, FixedTicker, RunEvent, Runner},
    AggregateState, Coordinate, RecordingSession, SessionConfig, SessionUpdate, WorkoutSummary,
};

const TICK_RATE_MS: u64 = 250;

/// Bundled loop used when no track is given on the command line.
const DEMO_TRACK: &str = include_str!("../assets/demo_track.csv");

/// record a run from the terminal with live distance, duration and pace
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Record a run from the terminal. Location fixes come from a replayed track or a simulated runner; distance, duration and pace update live and a summary with the route is shown when you stop."
)]
pub struct Cli {
    /// replay a recorded track (csv with latitude,longitude,captured_at_millis)
    #[clap(short = 't', long)]
    track: Option<PathBuf>,

    /// poll a simulated runner instead of replaying a track
    #[clap(short = 'p', long, conflicts_with = "track")]
    poll: bool,

    /// distance unit used for display
    #[clap(short = 'u', long, value_enum)]
    units: Option<DistanceUnit>,

    /// replay speed multiplier
    #[clap(short = 's', long)]
    speed: Option<f64>,

    /// answer the location permission request with "no"
    #[clap(long)]
    deny_location: bool,

    /// write the effective units/delivery/speed back to the config file
    #[clap(long)]
    save_config: bool,

    /// print the last run's summary as JSON on exit
    #[clap(long)]
    json: bool,
}

impl Cli {
    /// Layer command line overrides on top of the stored config
    fn apply(&self, mut cfg: Config) -> Config {
        if let Some(units) = self.units {
            cfg.units = units;
        }
        if self.poll {
            cfg.delivery = DeliveryMode::Poll;
        } else if self.track.is_some() {
            cfg.delivery = DeliveryMode::Watch;
        }
        if let Some(speed) = self.speed.filter(|s| s.is_finite() && *s > 0.0) {
            cfg.replay_speed = speed;
        }
        cfg
    }
}

pub struct App {
    pub session: RecordingSession<Box<dyn LocationProvider>>,
    pub units: DistanceUnit,
    /// Latest totals pushed by the session
    pub live: AggregateState,
    /// Most recent finished run; kept after acknowledge for `--json`
    pub summary: Option<WorkoutSummary>,
    pub notice: Option<String>,
}

impl App {
    pub fn new(session: RecordingSession<Box<dyn LocationProvider>>, units: DistanceUnit) -> Self {
        Self {
            session,
            units,
            live: AggregateState::default(),
            summary: None,
            notice: None,
        }
    }

    pub fn apply(&mut self, update: SessionUpdate) {
        match update {
            SessionUpdate::Progress(aggregate) => {
                if aggregate.last_sample != self.live.last_sample {
                    self.notice = None;
                }
                self.live = aggregate;
            }
            SessionUpdate::PermissionDenied => {
                self.notice = Some("Location permission denied. Runs cannot be recorded without it.".into());
            }
            SessionUpdate::ProviderNotice(reason) => self.notice = Some(reason),
            SessionUpdate::Warning(warning) => self.notice = Some(warning),
            SessionUpdate::Finished(summary) => {
                self.live = AggregateState {
                    cumulative_distance_km: summary.distance_km,
                    total_elapsed_seconds: summary.duration_seconds,
                    ..self.live
                };
                self.summary = Some(summary);
                self.notice = None;
            }
        }
    }

    pub fn handle(&mut self, event: RunEvent) {
        if let Some(update) = self.session.handle(event) {
            self.apply(update);
        }
    }

    pub fn start(&mut self) {
        self.notice = None;
        match self.session.start() {
            Some(update) => self.apply(update),
            None => self.live = AggregateState::default(),
        }
    }

    pub fn stop(&mut self) {
        if let Some(update) = self.session.stop() {
            self.apply(update);
        }
    }

    pub fn acknowledge(&mut self) {
        if self.session.acknowledge() {
            self.live = AggregateState::default();
        }
    }

    /// Returns false when the app should quit
    pub fn on_key(&mut self, key: KeyEvent) -> bool {
        if key.kind == KeyEventKind::Release {
            return true;
        }
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return false,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return false,
            KeyCode::Char('s') => self.start(),
            KeyCode::Char('x') | KeyCode::Char(' ') => self.stop(),
            KeyCode::Enter => self.acknowledge(),
            _ => {}
        }
        true
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    init_logging();

    let store = FileConfigStore::new();
    let cfg = cli.apply(store.load());
    if cli.save_config {
        store.save(&cfg)?;
        log::info!("saved config to {}", store.path().display());
    }

    let provider = build_provider(&cli, &cfg)?;
    let gate: Arc<dyn PermissionGate> = Arc::new(RememberingGate::new(FixedPermissionGate::new(
        Authorization::from(!cli.deny_location),
    )));

    let (tx, rx) = mpsc::channel();
    let session = RecordingSession::new(SessionConfig::from(&cfg), provider, gate, tx.clone());
    let mut app = App::new(session, cfg.units);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    spawn_terminal_events(tx);
    let runner = Runner::new(
        ChannelEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result?;

    if cli.json {
        if let Some(summary) = &app.summary {
            println!("{}", summary.to_json()?);
        }
    }

    Ok(())
}

/// Log to a file; the terminal belongs to the UI while it runs
fn init_logging() {
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };

    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Pipe(Box::new(file)))
        .try_init();
}

fn build_provider(cli: &Cli, cfg: &Config) -> Result<Box<dyn LocationProvider>, Box<dyn Error>> {
    if let Some(track) = &cli.track {
        log::info!("replaying {} at {}x", track.display(), cfg.replay_speed);
        return Ok(Box::new(ReplayProvider::from_csv(track, cfg.replay_speed)?));
    }

    match cfg.delivery {
        DeliveryMode::Poll => {
            log::info!("polling simulated runner every {} ms", cfg.poll_interval_ms);
            let runner = SimulatedRunner::new(Coordinate::new(55.6761, 12.5683), 3.0, 45.0)
                .with_jitter(1.5, 7)
                .with_blackout_every(40);
            Ok(Box::new(PollingProvider::new(
                runner,
                Duration::from_millis(cfg.poll_interval_ms.max(1)),
            )))
        }
        DeliveryMode::Watch => {
            let track = read_track(DEMO_TRACK.as_bytes(), Path::new("demo_track.csv"))?;
            log::info!("replaying bundled demo track ({} fixes)", track.len());
            Ok(Box::new(ReplayProvider::new(track, cfg.replay_speed)))
        }
    }
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<ChannelEventSource, FixedTicker>,
) -> Result<(), Box<dyn Error>> {
    terminal.draw(|f| ui(app, f))?;

    loop {
        match runner.step() {
            RunEvent::Key(key) => {
                if !app.on_key(key) {
                    break;
                }
            }
            RunEvent::Resize | RunEvent::Tick => {}
            event => app.handle(event),
        }
        terminal.draw(|f| ui(app, f))?;
    }

    Ok(())
}

fn ui(app: &App, f: &mut Frame) {
    ui::screen::current_screen(app.session.state()).render(app, f);
}

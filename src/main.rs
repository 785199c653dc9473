mod catalog;
mod clock;
mod config;
mod error;
mod feedback;
mod lifecycle;
mod motion;
mod platform;
mod recorder;
mod runner;
mod sequencer;
mod session;
mod step_detector;

use crate::catalog::SessionTemplateCatalog;
use crate::clock::SystemClock;
use crate::feedback::{FeedbackDispatcher, FeedbackMode};
use crate::lifecycle::{LifecycleGuard, Visibility};
use crate::platform::{ConsolePlatform, HeadlessPlatform, Platform};
use crate::recorder::{HttpTelemetrySink, LogSink, SessionRecorder, TelemetrySink};
use crate::runner::{SessionCommand, SessionInputs};
use crate::sequencer::{format_clock, SessionStatus};
use crate::session::WalkSession;
use crate::step_detector::StrategyKind;

use clap::{ArgGroup, Parser};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;

const CONSOLE_HELP: &str = "\
While a session runs, type a command and press enter:
  p / r              pause / resume
  q                  reset and quit
  sound, vibration   switch feedback mode
  bg / fg            simulate the app leaving / returning to the foreground";

#[derive(Parser, Debug)]
#[command(name = "walkpace", version)]
#[command(about = "Guided interval-walking sessions with step counting and cues")]
#[command(after_help = CONSOLE_HELP)]
#[command(group(ArgGroup::new("step_source").args(["paced", "sensor"])))]
struct CliArgs {
    /// List the built-in and configured sessions, then exit
    #[arg(short, long)]
    list: bool,

    /// Cue channel, overriding the config file
    #[arg(short, long, value_enum)]
    mode: Option<FeedbackMode>,

    /// Synthetic pacing beats instead of counted steps
    #[arg(long)]
    paced: bool,

    /// Count steps from the motion sensor
    #[arg(long)]
    sensor: bool,

    /// Refuse motion-sensor access (timer only)
    #[arg(long)]
    no_sensor: bool,

    /// Run without cues, sensor or wake reservation
    #[arg(long)]
    headless: bool,

    /// Program id, e.g. marche or ramadan
    #[arg(required_unless_present = "list")]
    program: Option<String>,

    /// Week number within the program
    #[arg(required_unless_present = "list")]
    week: Option<u32>,

    /// Session number within the week
    #[arg(required_unless_present = "list")]
    session: Option<u32>,
}

impl CliArgs {
    /// Step strategy forced from the command line, if any.
    fn strategy(&self) -> Option<StrategyKind> {
        match (self.paced, self.sensor) {
            (true, _) => Some(StrategyKind::Paced),
            (_, true) => Some(StrategyKind::Sensor),
            _ => None,
        }
    }

    /// Normalized catalog key; None only with `--list`.
    fn session_key(&self) -> Option<(String, u32, u32)> {
        let program = self.program.as_deref()?.trim().to_ascii_lowercase();
        Some((program, self.week?, self.session?))
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = CliArgs::parse();

    log::info!("walkpace v{} starting...", env!("CARGO_PKG_VERSION"));

    let cfg = config::Config::load();

    let catalog = match SessionTemplateCatalog::load(cfg.catalog_path.as_deref().map(Path::new)) {
        Ok(catalog) => catalog,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };
    log::debug!("Catalog: {} session templates", catalog.len());

    if args.list {
        print_catalog(&catalog);
        return;
    }

    let Some((program, week, session_id)) = args.session_key() else {
        log::error!("No session given");
        std::process::exit(2);
    };
    let template = match catalog.lookup(&program, week, session_id) {
        Ok(template) => template.clone(),
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };
    if template.optional {
        log::info!("Session {} is optional", template.key);
    }
    for extra in &template.bonus {
        log::info!("Bonus: {extra}");
    }

    let mode = args.mode.unwrap_or(cfg.feedback.mode);
    let feedback = if cfg.feedback.enabled {
        FeedbackDispatcher::new(mode)
    } else {
        log::info!("Feedback: muted");
        FeedbackDispatcher::muted(mode)
    };

    let platform: Arc<dyn Platform> = if args.headless {
        log::info!("Headless: no cues, no sensor, no wake reservation");
        Arc::new(HeadlessPlatform)
    } else {
        Arc::new(ConsolePlatform { motion: !args.no_sensor })
    };

    let sink: Arc<dyn TelemetrySink> = if cfg.telemetry.enabled {
        let http = HttpTelemetrySink::new(
            &cfg.telemetry.base_url,
            cfg.telemetry.token.clone(),
            cfg.telemetry.timeout(),
        );
        log::info!("Telemetry: {}", http.endpoint());
        Arc::new(http)
    } else {
        Arc::new(LogSink)
    };
    let recorder = SessionRecorder::detached(sink);

    let mut session = WalkSession::new(
        cfg.steps.strategy_with(&template.key.program, args.strategy()),
        feedback,
        LifecycleGuard::new(cfg.lifecycle.wake_lock),
        platform,
        Arc::new(SystemClock::new()),
        recorder.clone(),
    );

    if let Err(e) = session.start(template) {
        log::error!("{e}");
        std::process::exit(1);
    }
    if let Some(t) = session.template() {
        log::info!(
            "{} ({}): {} planned",
            t.name,
            t.seance_id,
            format_clock(t.total_duration_s().min(u32::MAX as u64) as u32)
        );
    }

    // Motion stream (simulated walker). Only started when the strategy
    // counts real steps and the sensor was granted.
    let motion = if session.strategy_kind() == StrategyKind::Sensor && !session.is_timer_only() {
        let (motion_tx, motion_rx) = mpsc::channel(256);
        tokio::spawn(motion::run(motion::WalkSimConfig::default(), motion_tx));
        Some(motion_rx)
    } else {
        None
    };

    let (visibility_tx, visibility_rx) = watch::channel(Visibility::Foreground);
    let (command_tx, command_rx) = mpsc::channel(8);
    spawn_console_reader(command_tx, visibility_tx);

    let tick_interval = Duration::from_millis(cfg.tick_interval_ms.max(1));
    let inputs = SessionInputs {
        motion,
        visibility: visibility_rx,
        commands: command_rx,
    };
    let status = runner::run_session(&mut session, tick_interval, inputs).await;

    match status {
        SessionStatus::Completed => log::info!(
            "Session complete: {} steps, {} phases",
            session.step_count(),
            session.state().phases_completed()
        ),
        other => log::info!("Session ended ({other})"),
    }

    // Let the telemetry worker finish before the process exits.
    tokio::task::spawn_blocking(move || recorder.wait()).await.ok();
}

/// Read console commands on a plain thread; stdin blocks.
fn spawn_console_reader(commands: mpsc::Sender<SessionCommand>, visibility: watch::Sender<Visibility>) {
    let spawned = std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim().to_ascii_lowercase();
                match line.as_str() {
                    "" => continue,
                    "bg" => {
                        if visibility.send(Visibility::Background).is_err() {
                            break;
                        }
                    }
                    "fg" => {
                        if visibility.send(Visibility::Foreground).is_err() {
                            break;
                        }
                    }
                    other => match SessionCommand::parse(other) {
                        Some(cmd) => {
                            if commands.blocking_send(cmd).is_err() {
                                break;
                            }
                        }
                        None => eprintln!("unknown command '{other}'\n\n{CONSOLE_HELP}"),
                    },
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!("Console commands unavailable: {e}");
    }
}

fn print_catalog(catalog: &SessionTemplateCatalog) {
    // Iteration is in key order: program, then week, then session.
    for t in catalog.iter() {
        println!(
            "{:<14} {:<8} {:>3} phases {:>6}{}  {}",
            t.key.to_string(),
            t.seance_id,
            t.len(),
            format_clock(t.total_duration_s().min(u32::MAX as u64) as u32),
            if t.optional { " (optional)" } else { "" },
            t.name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(s: &str) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once("walkpace").chain(s.split_whitespace()))
    }

    #[test]
    fn command_definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn positional_session_key() {
        let cli = parse("Ramadan 2 3").unwrap();
        assert_eq!(cli.session_key(), Some(("ramadan".to_string(), 2, 3)));
        assert_eq!(cli.mode, None);
        assert_eq!(cli.strategy(), None);
    }

    #[test]
    fn options_anywhere() {
        let cli = parse("--mode sound marche --paced 4 1 --no-sensor --headless").unwrap();
        assert!(cli.headless);
        assert_eq!(cli.mode, Some(FeedbackMode::Sound));
        assert_eq!(cli.strategy(), Some(StrategyKind::Paced));
        assert!(cli.no_sensor);
        assert_eq!(cli.session_key(), Some(("marche".to_string(), 4, 1)));
    }

    #[test]
    fn mode_aliases() {
        assert_eq!(parse("-m haptics marche 1 1").unwrap().mode, Some(FeedbackMode::Vibration));
        assert_eq!(parse("-m tone marche 1 1").unwrap().mode, Some(FeedbackMode::Sound));
    }

    #[test]
    fn list_needs_no_key() {
        let cli = parse("--list").unwrap();
        assert!(cli.list);
        assert_eq!(cli.session_key(), None);
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(parse("marche 1").is_err());
        assert!(parse("marche one 1").is_err());
        assert!(parse("--mode loud marche 1 1").is_err());
        assert!(parse("--mode").is_err());
        assert!(parse("--fast marche 1 1").is_err());
    }

    #[test]
    fn paced_and_sensor_conflict() {
        let err = parse("--paced --sensor marche 1 1").unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        assert_eq!(parse("--sensor marche 1 1").unwrap().strategy(), Some(StrategyKind::Sensor));
    }
}

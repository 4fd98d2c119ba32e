mod app;
mod cli;
mod config;
mod input;
mod k8s;
mod ledger;
mod location;
mod model;
mod reconciler;
mod reconnect;
mod selection;
mod sync;
mod transport;
mod ui;

use anyhow::{Context, Result};
use app::{App, AppCommand};
use clap::Parser;
use cli::CliArgs;
use config::{RuntimeConfigSnapshot, RuntimeConfigWatcher};
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use futures::StreamExt;
use k8s::ClusterCatalog;
use k8s_openapi::api::core::v1::Namespace;
use location::{Location, Navigation};
use model::{SyncMessage, compact_error};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::{Arc, Mutex};
use sync::{DEFAULT_MEMBER_PARAM, DEFAULT_SETTLE_DELAY, SyncOptions, Synchronizer};
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use transport::{DEFAULT_BASE_URL, DEFAULT_RESOURCE_PATH, ListSource, ProxyClient, WatchTransport};

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
type NamespaceSync = Synchronizer<Namespace>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter, args.log_file.as_deref())?;

    let mut config_watcher = RuntimeConfigWatcher::discover();
    let config = match config_watcher.load_current() {
        Ok(config) => config,
        Err(error) => {
            warn!("ignoring runtime config: {error:#}");
            RuntimeConfigSnapshot::default()
        }
    };
    if let Some(source) = config_watcher.source() {
        info!("runtime config from {}", source.display());
    }

    let catalog = ClusterCatalog::load().unwrap_or_else(|error| {
        warn!("kubeconfig unavailable: {error:#}");
        ClusterCatalog::default()
    });
    debug!("{} kubeconfig contexts", catalog.targets().len());
    let (clusters, initial) = catalog.resolve(args.cluster.as_deref())?;

    let base_url = args
        .base_url
        .clone()
        .or_else(|| config.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let resource_path = config
        .resource_path
        .clone()
        .unwrap_or_else(|| DEFAULT_RESOURCE_PATH.to_string());
    let client = Arc::new(ProxyClient::new(&base_url, &resource_path)?);
    info!("watching through {}", client.base_url());

    let location = Location::parse(&args.location)
        .with_context(|| format!("invalid --location '{}'", args.location))?;
    let mut app = App::new(clusters, &initial, Navigation::new(location));
    match catalog.server_for(&initial) {
        Some(server) => app.set_status(format!("Watching {initial} ({server})")),
        None => app.set_status(format!("Watching {initial}")),
    }

    let (sync_tx, sync_rx) = mpsc::unbounded_channel();
    let lister: Arc<dyn ListSource<Namespace>> = client.clone();
    let transport: Arc<dyn WatchTransport> = client;
    let mut sync = Synchronizer::new(
        lister,
        transport,
        sync_tx,
        sync_options(&config, args.member_param.as_deref()),
    );
    sync.activate(&initial);

    let mut session = Session {
        app,
        sync,
        sync_rx,
        config_watcher,
        member_param: args.member_param.clone(),
    };
    run(&mut session, args.tick_ms.max(200)).await
}

struct Session {
    app: App,
    sync: NamespaceSync,
    sync_rx: mpsc::UnboundedReceiver<SyncMessage<Namespace>>,
    config_watcher: RuntimeConfigWatcher,
    member_param: Option<String>,
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::sink),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .with_writer(writer)
        .try_init();

    Ok(())
}

/// Command line wins over the config file, which wins over built-in defaults.
fn sync_options(config: &RuntimeConfigSnapshot, member_param: Option<&str>) -> SyncOptions {
    SyncOptions {
        reconnect: config.reconnect,
        settle_delay: config.settle_delay.unwrap_or(DEFAULT_SETTLE_DELAY),
        member_param: member_param
            .map(str::to_string)
            .or_else(|| config.member_param.clone())
            .unwrap_or_else(|| DEFAULT_MEMBER_PARAM.to_string()),
    }
}

async fn run(session: &mut Session, tick_ms: u64) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, session, tick_ms).await;
    session.sync.teardown();
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_ALTERNATE_KEYS
                    | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            )
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(terminal: &mut TuiTerminal, session: &mut Session, tick_ms: u64) -> Result<()> {
    let mut reader = EventStream::new();
    let mut ticker = interval(Duration::from_millis(tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if session.sync.observe_navigation(session.app.navigation()) {
            let selected = session.sync.selected_members().join(", ");
            session.app.set_status(format!("Location selects {selected}"));
        }
        session.app.set_members(session.sync.snapshot());

        terminal
            .draw(|frame| ui::render(frame, &session.app))
            .context("failed to render terminal frame")?;

        if !session.app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(session.app.mode(), key) {
                            debug!("action={action:?}");
                            let command = session.app.apply_action(action);
                            execute_app_command(session, command);
                        }
                    }
                    Some(Ok(Event::Resize(_, _))) => {}
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        session.app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        session.app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                reload_runtime_config(session);
            }
            maybe_message = session.sync_rx.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };
                let was_failing = session.sync.last_error().is_some();
                if session.sync.handle(message, session.app.navigation())
                    && !was_failing
                    && let Some(error) = session.sync.last_error()
                {
                    session.app.set_status(format!("List failed: {error}"));
                }
            }
        }
    }

    Ok(())
}

fn execute_app_command(session: &mut Session, command: AppCommand) {
    match command {
        AppCommand::None => {}
        AppCommand::SwitchTarget { target } => {
            session.sync.activate(&target);
        }
        AppCommand::Refresh => {
            if !session.sync.refresh() {
                let target = session.app.active_target().to_string();
                session.sync.activate(&target);
            }
        }
        AppCommand::SetSelection { names } => {
            let Session { app, sync, .. } = session;
            sync.set_selected_members(&names, app.navigation_mut());
        }
    }
}

fn reload_runtime_config(session: &mut Session) {
    match session.config_watcher.reload_if_changed() {
        Ok(Some(config)) => {
            let options = sync_options(&config, session.member_param.as_deref());
            if &options != session.sync.options() {
                session.sync.set_options(options);
            }
            let source = config.source.as_deref().unwrap_or("defaults");
            session.app.set_status(format!("Runtime config reloaded from {source}"));
        }
        Ok(None) => {}
        Err(error) => {
            let message = compact_error(&error).replace('\n', " | ");
            warn!("runtime config reload failed: {message}");
            session.app.set_status(format!("Config reload failed: {message}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sync_options;
    use crate::config::RuntimeConfigSnapshot;
    use crate::reconnect::ReconnectPolicy;
    use crate::sync::{DEFAULT_MEMBER_PARAM, DEFAULT_SETTLE_DELAY};
    use std::time::Duration;

    #[test]
    fn defaults_apply_without_config_or_flags() {
        let options = sync_options(&RuntimeConfigSnapshot::default(), None);
        assert_eq!(options.member_param, DEFAULT_MEMBER_PARAM);
        assert_eq!(options.settle_delay, DEFAULT_SETTLE_DELAY);
        assert_eq!(options.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn command_line_member_param_beats_config() {
        let config = RuntimeConfigSnapshot {
            member_param: Some("project".to_string()),
            settle_delay: Some(Duration::from_millis(50)),
            ..RuntimeConfigSnapshot::default()
        };
        assert_eq!(sync_options(&config, None).member_param, "project");

        let options = sync_options(&config, Some("ns"));
        assert_eq!(options.member_param, "ns");
        assert_eq!(options.settle_delay, Duration::from_millis(50));
    }
}

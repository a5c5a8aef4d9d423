//! Starlapse command line host
//!
//! Runs the extension's pieces in-process: `extract` shows what the reader
//! overlay would display for a saved page, `session` drives a page agent
//! through the popup from stdin.

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use starlapse::config::Config;
use starlapse::core::{AgentHandle, BackgroundService, HostPage, PageAgent};
use starlapse::extractor::ContentExtractor;
use starlapse::messaging::{serve, MessageBus, TabId, Target};
use starlapse::overlay::{ChannelPresenter, Effect, EffectPhase, OverlayEvent};
use starlapse::popup::PopupController;
use starlapse::storage::{JsonFileStore, KeyValueStore};

#[derive(ClapParser)]
#[command(name = "starlapse")]
#[command(about = "Reader overlay for web pages", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Custom data directory (default: ~/.starlapse)
    /// Can also be set via STARLAPSE_DIR environment variable
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the reading content extracted from an HTML file
    Extract {
        /// Saved page to extract from
        file: PathBuf,
    },
    /// Load a page and control its overlay from stdin
    Session {
        /// Address the page was loaded from
        #[arg(long)]
        url: String,

        /// Saved page markup
        #[arg(long, value_name = "FILE")]
        page: PathBuf,
    },
}

const SESSION_HELP: &str = "commands: open | activate | deactivate | theme <id> | event <name> | scroll <pct> | reload | quit";

fn init_logging() -> Result<()> {
    // stdout belongs to the session, so logs go to a file
    let log_path = Config::get_log_path()?;
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create data directory: {:?}", parent))?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context(format!("Failed to open log file: {:?}", log_path))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set before anything resolves the data directory
    if let Some(ref dir) = cli.data_dir {
        std::env::set_var("STARLAPSE_DIR", dir);
    }

    init_logging()?;
    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Extract { file } => extract(&config, &file),
        Commands::Session { url, page } => session(config, &url, &page).await,
    }
}

fn extract(config: &Config, file: &Path) -> Result<()> {
    let html =
        std::fs::read_to_string(file).context(format!("Failed to read page: {:?}", file))?;
    let extractor = ContentExtractor::new(config.extractor.clone())?;
    let extraction = extractor.extract(&html);

    eprintln!(
        "source: {:?}, {} characters",
        extraction.source, extraction.text_len
    );
    println!("{}", extraction.html);
    Ok(())
}

fn describe(event: &OverlayEvent) -> String {
    match event {
        OverlayEvent::Attached { mode, theme, content } => match content {
            Some(content) => format!(
                "{} overlay attached ({}), {} bytes of content",
                mode,
                theme.display_name(),
                content.len()
            ),
            None => format!("{} overlay attached", mode),
        },
        OverlayEvent::Detached => "overlay detached".to_string(),
        OverlayEvent::ScrollLocked(true) => "page scrolling locked".to_string(),
        OverlayEvent::ScrollLocked(false) => "page scrolling restored".to_string(),
        OverlayEvent::ThemeChanged(theme) => format!("theme: {}", theme.display_name()),
        OverlayEvent::Effect { effect, phase } => {
            let name = match effect {
                Effect::SuckIn => "suck-in".to_string(),
                Effect::Cosmic(event) => event.to_string(),
                Effect::Milestone(pct) => format!("{}% milestone", pct),
            };
            match phase {
                EffectPhase::Started => format!("{} started", name),
                EffectPhase::Finished => format!("{} finished", name),
            }
        }
        OverlayEvent::Progress(pct) => format!("progress {}%", pct),
        OverlayEvent::ReadingTime(elapsed) => {
            let secs = elapsed.as_secs();
            format!("reading {:02}:{:02}", secs / 60, secs % 60)
        }
        OverlayEvent::Twinkle => "twinkle".to_string(),
        OverlayEvent::ShootingStar => "shooting star".to_string(),
    }
}

/// Everything needed to (re)load the page in one tab
struct PageLoader {
    bus: MessageBus,
    tab: TabId,
    page: HostPage,
    config: Config,
    store: Arc<dyn KeyValueStore>,
    presenter: Arc<ChannelPresenter>,
    extractor: Arc<ContentExtractor>,
}

impl PageLoader {
    fn load(&self) -> AgentHandle {
        let agent = PageAgent::new(
            self.page.clone(),
            &self.config,
            Arc::clone(&self.store),
            self.presenter.clone(),
            Arc::clone(&self.extractor),
        );
        agent.spawn(&self.bus, self.tab)
    }
}

async fn session(config: Config, url: &str, page_path: &Path) -> Result<()> {
    let html = std::fs::read_to_string(page_path)
        .context(format!("Failed to read page: {:?}", page_path))?;
    let page = HostPage::new(url, html)?;

    let storage_path = config.storage_path()?;
    let first_install = !storage_path.exists();
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(storage_path));

    let bus = MessageBus::new();

    let mut background = BackgroundService::new(Arc::clone(&store));
    if first_install {
        background.on_installed();
    }
    background.on_startup();
    let tab = bus.open_tab();
    background.on_tab_updated(tab, true, Some(url));
    background.on_action_clicked(url);
    let runtime_inbox = bus.listen(Target::Runtime);
    let background_task = tokio::spawn(async move { serve(runtime_inbox, &mut background).await });

    let (presenter, mut overlay_rx) = ChannelPresenter::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = overlay_rx.recv().await {
            println!("  * {}", describe(&event));
        }
    });

    let loader = PageLoader {
        bus: bus.clone(),
        tab,
        page,
        extractor: Arc::new(ContentExtractor::new(config.extractor.clone())?),
        presenter: Arc::new(presenter),
        store,
        config,
    };
    let mut agent = loader.load();
    let mut popup = PopupController::new(bus.clone(), loader.config.agent.mode, &loader.config.popup);

    println!("{} loaded in {}", loader.page.host, tab);
    println!("{}", SESSION_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let arg = parts.next();

        match (command, arg) {
            ("open", _) => popup.open().await,
            ("activate", _) => {
                let before = popup.history().len();
                popup.activate().await;
                for status in &popup.history()[before..] {
                    println!("{}", status);
                }
            }
            ("deactivate", _) => {
                let before = popup.history().len();
                popup.deactivate().await;
                for status in &popup.history()[before..] {
                    println!("{}", status);
                }
            }
            ("theme", Some(id)) => {
                popup.change_theme(id).await;
            }
            ("event", Some(name)) => {
                popup.trigger_event(name).await;
            }
            ("scroll", Some(pct)) => match pct.parse::<f64>() {
                Ok(pct) => agent.scroll(pct, 200.0, 100.0),
                Err(_) => println!("scroll takes a percentage"),
            },
            ("reload", _) => {
                agent.unload().await;
                agent = loader.load();
                println!("{} reloaded", loader.page.host);
            }
            ("quit", _) => break,
            _ => {
                println!("{}", SESSION_HELP);
                continue;
            }
        }

        let view = popup.view();
        println!(
            "[{}] {}",
            if view.active { "active" } else { "inactive" },
            view.status
        );
        // Let overlay events from this command reach the printer
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    agent.unload().await;
    bus.close_tab(tab);
    drop(popup);
    drop(loader);
    drop(bus);
    background_task.await?;
    printer.abort();
    Ok(())
}

// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use cartlink::{
    load_catalog, ButtonLatch, Feedback, FeedbackSink, Ledger, LineTransport, ScannerNode,
    ScannerSettings, Settings, TagId, TagQueue, TcpLineTransport, DEFAULT_CONFIG_FILE,
};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Instant;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "cartlink", version = cartlink::VERSION)]
#[command(about = "Scanner node: tracks the cart and syncs it to the server node")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Server node link address (overrides config)
    #[arg(long)]
    server: Option<String>,

    /// CSV catalog with tag,name,price rows (overrides config)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Read tags from stdin instead of the terminal console
    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    if let Some(server) = cli.server {
        settings.scanner.server_addr = server;
    }
    if let Some(catalog) = cli.catalog {
        settings.scanner.catalog_path = Some(catalog);
    }
    let scanner = settings.scanner;

    let headless = cli.headless || !cfg!(feature = "tui");
    if headless {
        init_logging();
    }

    let catalog = load_catalog(scanner.catalog_path.as_deref()).context("Failed to load catalog")?;
    let transport = TcpLineTransport::new(scanner.server_addr.as_str())
        .with_context(|| format!("Invalid server address {}", scanner.server_addr))?;

    // The cart is sent as soon as the link comes up
    let mut node = ScannerNode::new(Ledger::new(catalog), scanner.dwell(), transport);

    if headless {
        run_headless(&mut node, &scanner)
    } else {
        run_ui_mode(&mut node, &scanner)
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cartlink=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(feature = "tui")]
fn run_ui_mode<T: LineTransport>(node: &mut ScannerNode<T>, settings: &ScannerSettings) -> Result<()> {
    ui::run_console(node, settings)?;
    println!("\n✅ Scanner console closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode<T: LineTransport>(node: &mut ScannerNode<T>, settings: &ScannerSettings) -> Result<()> {
    run_headless(node, settings)
}

// ============================================================================
// Headless mode: one tag (hex) per stdin line, "r" presses the remove button
// ============================================================================

struct PrintedFeedback;

impl FeedbackSink for PrintedFeedback {
    fn show(&mut self, feedback: &Feedback) {
        println!(
            "[{:?}/{:?}] {} | {}",
            feedback.led, feedback.tone, feedback.primary, feedback.secondary
        );
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(|line| line.ok()) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn run_headless<T: LineTransport>(node: &mut ScannerNode<T>, settings: &ScannerSettings) -> Result<()> {
    println!("🛒 Cartlink scanner node v{} (headless)", cartlink::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   Server link: {}", settings.server_addr);
    println!("   Type a tag in hex and press Enter, 'r' for remove, Ctrl+D to stop\n");

    let input = spawn_stdin_reader();
    let mut button = ButtonLatch::default();
    let mut tags = TagQueue::default();
    let mut sink = PrintedFeedback;
    sink.show(&node.idle_feedback());

    loop {
        match input.try_recv() {
            Ok(line) => {
                let line = line.trim();
                if line.eq_ignore_ascii_case("r") {
                    button.press();
                } else if let Some(tag) = TagId::from_hex(line) {
                    tags.push(tag);
                } else if !line.is_empty() {
                    eprintln!("❌ Not a tag: {}", line);
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) if tags.is_empty() => break,
            Err(TryRecvError::Disconnected) => {}
        }

        if let Some(feedback) = node.poll(Instant::now(), &mut button, &mut tags) {
            sink.show(&feedback);
        }
        std::thread::sleep(settings.poll_interval());
    }

    println!("\n✅ Scanner stopped. Final total: {}", cartlink::format_amount(node.ledger().total()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_reports_crate_version() {
        assert_eq!(Cli::command().get_version(), Some(cartlink::VERSION));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["cartlink", "--server", "10.0.0.2:7878", "--headless"]);
        assert_eq!(cli.server.as_deref(), Some("10.0.0.2:7878"));
        assert!(cli.headless);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }
}

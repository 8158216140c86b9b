use clap::Parser;
use dotenv::dotenv;
use panel_console::bridge::lock;
use panel_console::socket::run_session;
use panel_console::{
    CommandHistory, ConsoleBridge, ConsoleView, HistoryCommand, SharedBridge, StdoutTerminal,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Live console for one server, read from its daemon websocket.
#[derive(Debug, Parser)]
#[command(name = "panel-console", version, about)]
struct Args {
    /// Daemon websocket url, e.g. wss://node.example.com:8080/api/servers/<uuid>/ws
    #[arg(long, env = "CONSOLE_SOCKET")]
    socket: String,

    /// Websocket token issued by the panel
    #[arg(long, env = "CONSOLE_TOKEN")]
    token: String,

    /// Server identifier, used to name the history file
    #[arg(long, env = "CONSOLE_SERVER")]
    server: String,

    #[arg(long, env = "CONSOLE_HISTORY_DIR", default_value = ".")]
    history_dir: PathBuf,

    /// Seconds to wait before reconnecting after a dropped session
    #[arg(long, env = "CONSOLE_RECONNECT_DELAY", default_value_t = 5)]
    reconnect_delay: u64,
}

async fn read_input(
    args: &Args,
    bridge: SharedBridge,
    view: ConsoleView<StdoutTerminal>,
    mut history: CommandHistory,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "could not read input");
                break;
            }
        };
        let line = line.trim_end_matches(['\r', '\n']);

        let command = match HistoryCommand::parse(line) {
            Some(HistoryCommand::List) => {
                for (i, entry) in history.entries().iter().enumerate() {
                    println!("{:>3}  {}", i, entry);
                }
                continue;
            }
            Some(HistoryCommand::Up) => {
                println!("{}", history.up());
                continue;
            }
            Some(HistoryCommand::Down) => {
                println!("{}", history.down());
                continue;
            }
            Some(HistoryCommand::Repeat) => history.current().to_string(),
            None => line.to_string(),
        };
        let command = command.as_str();
        if command.is_empty() {
            continue;
        }
        if !view.input_enabled() {
            eprintln!("console is not connected");
            continue;
        }

        if let Err(e) = lock(&bridge).send_command(command) {
            eprintln!("{}", e);
            continue;
        }
        history.push(command);
        if let Err(e) = history.save(&args.history_dir, &args.server).await {
            tracing::warn!(error = %e, "could not save command history");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let history = CommandHistory::load(&args.history_dir, &args.server).await?;

    let mut bridge = ConsoleBridge::new();
    let view = ConsoleView::new(StdoutTerminal);
    view.attach(&mut bridge);
    let bridge = bridge.shared();

    let input = read_input(&args, bridge.clone(), view.clone(), history);
    tokio::pin!(input);

    let delay = Duration::from_secs(args.reconnect_delay);
    loop {
        tokio::select! {
            result = run_session(&args.socket, &args.token, bridge.clone()) => match result {
                Ok(()) => tracing::warn!("console connection closed"),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => tracing::warn!(error = %e, "console connection lost"),
            },
            _ = &mut input => return Ok(()),
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut input => return Ok(()),
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

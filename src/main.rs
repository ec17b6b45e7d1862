//! bbsterm - Telnet BBS client
//!
//! Connects to a BBS over Telnet and shows its ANSI output in the current
//! terminal. Keystrokes go straight to the remote host.
//!
//! # Quick Start
//!
//! ```text
//! bbsterm bbs.example.org          # port 23
//! bbsterm bbs.example.org 2323
//! bbsterm -b "Dark Realms"         # saved profile from config.toml
//! bbsterm -l                       # list saved profiles
//! ```
//!
//! Press Ctrl+] to disconnect.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bbsterm::config::Config;
use bbsterm::ui::{KeyMapper, Renderer};
use bbsterm::{EscapeSequenceParser, SessionEvent, SessionParameters, TelnetSession, TextDecoder};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command line arguments
#[derive(Default)]
struct Args {
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    profile: Option<String>,
    username: Option<String>,
    password: Option<String>,
    list: bool,
}

fn print_help() {
    eprintln!("bbsterm {} - Telnet BBS client", VERSION);
    eprintln!();
    eprintln!("Usage: bbsterm [OPTIONS] <HOST> [PORT]");
    eprintln!("       bbsterm [OPTIONS] -b <PROFILE>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -b, --bbs <NAME>      Connect to a saved profile");
    eprintln!("  -l, --list            List saved profiles");
    eprintln!("  -u, --user <NAME>     Username for automatic login");
    eprintln!("  -p, --pass <PASS>     Password for automatic login");
    eprintln!("  -c, --config <FILE>   Configuration file");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Press Ctrl+] to disconnect.");
    eprintln!();
    eprintln!("Configuration: ~/.bbsterm/config.toml");
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut positional = Vec::new();
    let mut iter = env::args().skip(1);

    while let Some(arg) = iter.next() {
        let mut value = |name: &str| iter.next().ok_or_else(|| format!("{} requires a value", name));

        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                eprintln!("bbsterm {}", VERSION);
                std::process::exit(0);
            }
            "-l" | "--list" => args.list = true,
            "-b" | "--bbs" => args.profile = Some(value(&arg)?),
            "-u" | "--user" => args.username = Some(value(&arg)?),
            "-p" | "--pass" => args.password = Some(value(&arg)?),
            "-c" | "--config" => args.config_path = Some(PathBuf::from(value(&arg)?)),
            _ if arg.starts_with('-') => return Err(format!("Unknown option: {}", arg)),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    args.host = positional.next();
    if let Some(port) = positional.next() {
        args.port = Some(port.parse().map_err(|_| format!("Invalid port: {}", port))?);
    }
    if positional.next().is_some() {
        return Err("Too many arguments".to_string());
    }

    Ok(args)
}

/// Log to ~/.bbsterm/bbsterm.log; the terminal itself shows the BBS
fn init_logging() {
    let log_path = Config::config_dir()
        .map(|dir| dir.join("bbsterm.log"))
        .unwrap_or_else(|| PathBuf::from("bbsterm.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("bbsterm {} starting...", VERSION);

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    if args.list {
        for profile in &config.bbs {
            println!("{:<24} {}:{}", profile.name, profile.address, profile.port);
        }
        return Ok(());
    }

    let params = session_parameters(&args, &config)?;
    run_client(params, &config)
}

/// Command line values override the profile
fn session_parameters(args: &Args, config: &Config) -> anyhow::Result<SessionParameters> {
    let mut params = match (&args.profile, &args.host) {
        (Some(name), _) => config
            .session_parameters(name)
            .ok_or_else(|| anyhow!("No saved BBS named {:?}", name))?,
        (None, Some(host)) => SessionParameters::new(host.clone()),
        (None, None) => return Err(anyhow!("No host given (see --help)")),
    };

    if let Some(port) = args.port {
        params.port = port;
    }
    if args.username.is_some() {
        params.username = args.username.clone();
    }
    if args.password.is_some() {
        params.password = args.password.clone();
    }
    Ok(params)
}

fn run_client(params: SessionParameters, config: &Config) -> anyhow::Result<()> {
    let address = params.address();
    let mut session = TelnetSession::with_options(params, config.session_options());
    let mut renderer = Renderer::stdout();

    renderer.notice(&format!("Connecting to {}...", address))?;
    session
        .connect()
        .with_context(|| format!("Could not start session for {}", address))?;

    renderer.init()?;
    let result = run_main_loop(&mut session, &mut renderer);
    let _ = renderer.cleanup();

    session.disconnect();
    if !session.join(Duration::from_secs(2)) {
        debug!("Session worker still running at exit");
    }
    info!("bbsterm exiting");
    result
}

fn run_main_loop(session: &mut TelnetSession, renderer: &mut Renderer<std::io::Stdout>) -> anyhow::Result<()> {
    let mut decoder = TextDecoder::new();
    let mut parser = EscapeSequenceParser::new();
    let mut title: Option<String> = None;

    loop {
        // Drain session events
        while let Some(event) = session.try_event() {
            match event {
                SessionEvent::Established => renderer.notice("Connected!")?,
                SessionEvent::Data(bytes) => {
                    let runs = parser.parse(&decoder.decode(&bytes));
                    renderer.render(&runs)?;

                    if parser.title() != title.as_deref() {
                        title = parser.title().map(str::to_string);
                        if let Some(t) = &title {
                            renderer.set_title(t)?;
                        }
                    }
                }
                SessionEvent::Error(ref message) => {
                    renderer.notice(&format!("Error: {}", message))?;
                    return session_outcome(&event);
                }
                SessionEvent::Closed => {
                    let runs = parser.parse(&decoder.finish());
                    renderer.render(&runs)?;
                    renderer.notice("Connection closed.")?;
                    return session_outcome(&event);
                }
            }
        }

        // Forward keystrokes
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if key.code == KeyCode::Char(']') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    info!("Disconnect requested by user");
                    return Ok(());
                }
                if let Some(bytes) = KeyMapper::map(&key) {
                    if let Err(e) = session.send(&bytes) {
                        debug!("Dropping input: {}", e);
                    }
                }
            }
        }
    }
}

/// Process result for a terminal session event; a session error is a
/// failed run.
fn session_outcome(event: &SessionEvent) -> anyhow::Result<()> {
    match event {
        SessionEvent::Error(message) => Err(anyhow!("Session failed: {}", message)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_fails_the_run() {
        let err = session_outcome(&SessionEvent::Error("Connection refused".into())).unwrap_err();
        assert!(err.to_string().contains("Connection refused"));
    }

    #[test]
    fn test_clean_close_succeeds() {
        assert!(session_outcome(&SessionEvent::Closed).is_ok());
    }
}

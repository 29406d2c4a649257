use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;

mod center;
mod machine;

use center::{DesktopCenter, NotificationRequest, DEFAULT_MESSAGE, DEFAULT_SOUND, DEFAULT_TITLE};
use machine::LINGER;

const APP_NAME: &str = "opencode-notify";

const SOUNDS_HELP: &str = "SOUNDS:
    Glass (default), Basso, Blow, Bottle, Frog, Funk,
    Hero, Morse, Ping, Pop, Purr, Sosumi, Submarine, Tink";

/// Flags that take a value
const VALUE_FLAGS: [&str; 6] = ["-t", "--title", "-m", "--message", "-s", "--sound"];

#[derive(Parser, Debug, PartialEq, Eq)]
#[command(name = "opencode-notify")]
#[command(about = "Desktop notification helper for OpenCode")]
#[command(after_help = SOUNDS_HELP)]
#[command(args_override_self = true)]
struct Args {
    /// Notification title
    #[arg(short, long, default_value = DEFAULT_TITLE, allow_hyphen_values = true)]
    title: String,

    /// Notification body
    #[arg(short, long, default_value = DEFAULT_MESSAGE, allow_hyphen_values = true)]
    message: String,

    /// Sound name
    #[arg(short, long, default_value = DEFAULT_SOUND, allow_hyphen_values = true)]
    sound: String,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            message: DEFAULT_MESSAGE.to_string(),
            sound: DEFAULT_SOUND.to_string(),
        }
    }
}

impl Args {
    fn into_request(self) -> NotificationRequest {
        NotificationRequest {
            title: self.title,
            message: self.message,
            sound: self.sound,
        }
    }
}

/// Parse leniently: unknown flags are dropped and a flag without a value
/// keeps its default. Only help is returned as an error.
fn parse_args(argv: Vec<String>) -> Result<Args, clap::Error> {
    match Args::try_parse_from(&argv) {
        Ok(args) => return Ok(args),
        Err(e) if is_help(&e) => return Err(e),
        Err(_) => {}
    }

    match Args::try_parse_from(retain_known_flags(&argv)) {
        Ok(args) => Ok(args),
        Err(e) if is_help(&e) => Err(e),
        Err(_) => Ok(Args::default()),
    }
}

fn is_help(e: &clap::Error) -> bool {
    matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
}

/// Keep the program name, help flags, and known flags that have a value
fn retain_known_flags(argv: &[String]) -> Vec<String> {
    let mut kept = Vec::new();
    let mut iter = argv.iter();
    if let Some(program) = iter.next() {
        kept.push(program.clone());
    }

    while let Some(arg) = iter.next() {
        if arg == "-h" || arg == "--help" {
            kept.push(arg.clone());
            continue;
        }
        match arg.split_once('=') {
            Some((flag, _)) if VALUE_FLAGS.contains(&flag) => kept.push(arg.clone()),
            Some(_) => {}
            None if VALUE_FLAGS.contains(&arg.as_str()) => {
                if let Some(value) = iter.next() {
                    kept.push(arg.clone());
                    kept.push(value.clone());
                }
            }
            None => {}
        }
    }
    kept
}

fn main() -> Result<()> {
    // Help exits here, before any notification API is touched
    let args = parse_args(std::env::args().collect()).unwrap_or_else(|e| e.exit());
    let request = args.into_request();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start runtime")?;

    let center = DesktopCenter::new(APP_NAME);
    let outcome = runtime.block_on(machine::run(&center, &request, LINGER));

    // Don't wait for blocking workers still parked on the notification server
    runtime.shutdown_background();
    std::process::exit(outcome.exit_code());
}

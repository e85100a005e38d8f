mod config;
mod dispatcher;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use config::EmulatorConfig;
use session::{Session, TranscriptProfile};

const USAGE: &str =
    "Usage: health-emulator [--config <file.toml>] [--record <bring-up|outage|ota>]";

struct Options {
    config: Option<PathBuf>,
    record: Option<TranscriptProfile>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = parse_options().context(USAGE)?;
    let config = match &options.config {
        Some(path) => EmulatorConfig::load(path)?,
        None => EmulatorConfig::default(),
    };
    log::info!(
        "starting emulator (boot: {}, watchdog: {} min)",
        config.boot,
        config.health.watchdog_minutes
    );

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(&config)?;
    if let Some(profile) = options.record {
        session
            .record(profile)
            .with_context(|| format!("failed to open {}", profile.log_path()))?;
    }
    let mut line = String::new();

    writeln!(
        writer,
        "Health Emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options() -> Result<Options> {
    let mut options = Options {
        config: None,
        record: None,
    };
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let Some(value) = inline.or_else(|| args.next()) else {
            bail!("expected value after {flag}");
        };
        match flag.as_str() {
            "--config" => options.config = Some(PathBuf::from(value)),
            "--record" => options.record = Some(profile_from_tag(&value)?),
            other => bail!("unknown option `{other}`"),
        }
    }
    Ok(options)
}

fn profile_from_tag(tag: &str) -> Result<TranscriptProfile> {
    if tag.eq_ignore_ascii_case("bring-up") {
        Ok(TranscriptProfile::BringUp)
    } else if tag.eq_ignore_ascii_case("outage") {
        Ok(TranscriptProfile::Outage)
    } else if tag.eq_ignore_ascii_case("ota") {
        Ok(TranscriptProfile::Ota)
    } else {
        bail!("unknown transcript profile `{tag}`")
    }
}

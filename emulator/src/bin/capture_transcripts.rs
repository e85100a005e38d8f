use anyhow::Result;
use health_core::system::BootCause;

#[allow(dead_code)]
#[path = "../config.rs"]
mod config;
#[allow(dead_code)]
#[path = "../dispatcher.rs"]
mod dispatcher;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use config::EmulatorConfig;
use session::{Session, TranscriptProfile};

/// Fixed start time so transcripts are reproducible.
const EPOCH: u64 = 1_700_000_000;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    record_profile(TranscriptProfile::BringUp)?;
    record_profile(TranscriptProfile::Outage)?;
    record_profile(TranscriptProfile::Ota)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> Result<()> {
    let boot = match profile {
        TranscriptProfile::Ota => BootCause::Ota,
        TranscriptProfile::BringUp | TranscriptProfile::Outage => BootCause::PowerOn,
    };
    let config = EmulatorConfig {
        boot,
        epoch: Some(EPOCH),
        ..EmulatorConfig::default()
    };

    let mut session = Session::new(&config)?;
    session.record(profile)?;
    let script: &[&str] = match profile {
        TranscriptProfile::BringUp => &[
            "status",
            "time rtc",
            "link start",
            "link up home",
            "inet up",
            "mqtt connect b1 1883",
            "sensor 0 ok bme280",
            "status",
        ],
        TranscriptProfile::Outage => &[
            "time rtc",
            "link up home",
            "inet up",
            "mqtt connect b1 1883",
            "mqtt lost b1 1883",
            "advance 20s",
            "mqtt connect b1 1883",
            "mqtt lost b1 1883",
            "link down",
            "advance 5m",
            "link up home",
            "inet up",
            "mqtt connect b1 1883",
            "status",
        ],
        TranscriptProfile::Ota => &[
            "status",
            "time rtc",
            "link up home",
            "advance 4m",
            "status",
            "advance 2m",
            "status",
        ],
    };

    for line in script {
        session.handle_command(line)?;
    }
    Ok(())
}

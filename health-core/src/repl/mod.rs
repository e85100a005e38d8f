//! Event-injection REPL shared by the emulator and host tooling.
//!
//! The grammar lives in [`grammar`] and is implemented with a token/parse
//! pipeline that stays compatible with `no_std`; [`commands`] turns parsed
//! lines into queued events.

pub mod commands;
pub mod grammar;

/// Help text per command keyword.
pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "link",
        "link init|start|up [ap]|down|stop      - station link lifecycle",
    ),
    (
        "inet",
        "inet up|slow|down [since=<secs>]       - internet reachability",
    ),
    (
        "mqtt",
        "mqtt connect <host> <port> [secondary] [local] | lost|fail|primary|secondary <host> <port> | error <msg> | clear",
    ),
    (
        "probe",
        "probe 1|2 up|down <host> [since=<secs>] - broker reachability probe",
    ),
    (
        "time",
        "time rtc|sync|silent on|off|tick       - time sources and minute tick",
    ),
    (
        "sensor",
        "sensor <0-7> ok|uninit|timeout|calibration|crc|error <name>",
    ),
    (
        "system",
        "system ota on|off | error on|off | alloc <bytes> | started",
    ),
    (
        "target",
        "target site|thingspeak|openmon|narodmon ok|fail [http=<code>]",
    ),
    (
        "notify",
        "notify telegram|smtp ok|fail            - notification channel errors",
    ),
    (
        "advance",
        "advance <duration>                      - move the virtual clock (ms/s/m/h)",
    ),
    (
        "wait",
        "wait <flag>[,<flag>...] <duration> [any] [clear] - block on status flags",
    ),
    (
        "status",
        "status [json]                           - show registries and monitors",
    ),
    (
        "help",
        "help [topic]                            - show help for a command",
    ),
];

/// Looks up the help line for `topic`.
#[must_use]
pub fn help_for(topic: &str) -> Option<&'static str> {
    HELP_TOPICS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(topic))
        .map(|(_, detail)| *detail)
}

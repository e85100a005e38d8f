#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the event-injection REPL.
//!
//! The lexer uses `regal` to produce a bounded token stream; the parser walks
//! those tokens with `winnow` parsers and builds structured commands that
//! mirror the events the dispatcher understands.

use core::fmt;
use core::ops::Range;
use core::time::Duration;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
#[allow(deprecated)]
use winnow::error::ErrorKind;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::stream::Stream;

use crate::events::{Broker, NotifyChannel, PublishTarget, SensorStatus};
use crate::flags::{SENSOR_SLOTS, StateFlag, StateSet};

/// Maximum number of tokens produced per REPL line.
pub const MAX_TOKENS: usize = 32;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Token classes of an event-injection line.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Dotted IPv4 address used as a host.
    #[regex(r"[0-9]+(?:\.[0-9]+){3}", priority = 3)]
    Address,
    /// Duration literal ending in `ms`, `s`, `m`, or `h`.
    #[regex(r"[0-9]+(?:ms|s|m|h)", priority = 2)]
    Duration,
    #[regex(r"[0-9]+")]
    Integer,
    /// Keyword, flag name, host name, or sensor name.
    #[regex(r"[A-Za-z][A-Za-z0-9._-]*")]
    Ident,
    /// Equals sign for `key=value` options.
    #[token("=")]
    Equals,
    /// Separates flag names in `wait`.
    #[token(",")]
    Comma,
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// Line terminator.
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Catch-all for characters no other rule accepts.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Lexed token; `span` indexes the original line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

/// Fixed-capacity token storage; lexing never allocates.
pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Lexer errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// The line holds more than [`MAX_TOKENS`] tokens.
    TooManyTokens { processed: usize },
    /// The `regal` engine gave up on the input.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "token buffer exhausted after {processed} items")
            }
            LexError::Engine => write!(f, "lexer engine error"),
        }
    }
}

/// Parser failure with the offending span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: Option<TokenKind>,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    InvalidInteger {
        span: Range<usize>,
    },
    InvalidDuration {
        span: Range<usize>,
    },
    UnknownFlag {
        span: Range<usize>,
        lexeme: &'a str,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::InvalidInteger { span } => {
                write!(f, "invalid integer literal at {span:?}")
            }
            GrammarErrorKind::InvalidDuration { span } => {
                write!(f, "invalid duration literal at {span:?}")
            }
            GrammarErrorKind::UnknownFlag { span, lexeme } => {
                write!(f, "unknown status flag `{lexeme}` at {span:?}")
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

/// Lexer failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        GrammarError {
            kind: match token {
                Some(tok) => GrammarErrorKind::UnexpectedToken {
                    expected,
                    found: Some(tok.kind),
                    span: tok.span.clone(),
                },
                None => GrammarErrorKind::UnexpectedEnd { expected },
            },
        }
    }

    fn invalid_integer(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidInteger {
                span: token.span.clone(),
            },
        }
    }

    fn invalid_duration(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidDuration {
                span: token.span.clone(),
            },
        }
    }

    fn unknown_flag(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::UnknownFlag {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

type Step<'src, T> = Result<T, ErrMode<GrammarError<'src>>>;

#[allow(deprecated)]
impl<'src, 'slice> ParserError<Input<'src, 'slice>> for GrammarError<'src>
where
    'src: 'slice,
{
    fn from_error_kind(input: &Input<'src, 'slice>, _kind: ErrorKind) -> Self {
        GrammarError::unexpected("token", input.first())
    }

    fn append(
        self,
        _input: &Input<'src, 'slice>,
        _token_start: &<Input<'src, 'slice> as Stream>::Checkpoint,
        _kind: ErrorKind,
    ) -> Self {
        self
    }

    fn or(self, other: Self) -> Self {
        other
    }
}

/// Failure from either stage of [`parse`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// One parsed event-injection line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Link(LinkCommand<'a>),
    Inet(InetCommand),
    Mqtt(MqttCommand<'a>),
    Probe(ProbeCommand<'a>),
    Time(TimeCommand),
    Sensor(SensorCommand<'a>),
    System(SystemCommand),
    Target(TargetCommand),
    Notify(NotifyCommand),
    /// Moves the virtual clock forward.
    Advance(Duration),
    Wait(WaitCommand),
    Status(StatusFormat),
    Help(HelpCommand<'a>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkCommand<'a> {
    Init,
    Start,
    Up { access_point: Option<&'a str> },
    Down,
    Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InetCommand {
    Up,
    Slow,
    /// `since` is an outage start in seconds on the event clock.
    Down { since: Option<u64> },
}

/// Transport endpoint as typed on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointArg<'a> {
    pub host: &'a str,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MqttCommand<'a> {
    Connect {
        endpoint: EndpointArg<'a>,
        primary: bool,
        local: bool,
    },
    Lost(EndpointArg<'a>),
    Fail(EndpointArg<'a>),
    Primary(EndpointArg<'a>),
    Secondary(EndpointArg<'a>),
    Error(&'a str),
    Clear,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeCommand<'a> {
    pub broker: Broker,
    pub up: bool,
    pub host: &'a str,
    pub since: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeCommand {
    Rtc,
    Sync,
    Silent(bool),
    Tick,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensorCommand<'a> {
    pub id: u8,
    pub status: SensorStatus,
    pub name: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemCommand {
    Ota(bool),
    Error(bool),
    Alloc(u32),
    Started,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetCommand {
    pub target: PublishTarget,
    pub failing: bool,
    pub http: Option<u16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotifyCommand {
    pub channel: NotifyChannel,
    pub failing: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitCommand {
    pub flags: StateSet,
    pub timeout: Duration,
    /// Require every flag rather than any of them.
    pub all: bool,
    /// Clear the matched flags on success.
    pub clear: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

pub(crate) fn parse_tokens_partial<'src, 'slice>(
    tokens: &'slice [Token<'src>],
) -> Result<(Command<'src>, &'slice [Token<'src>]), GrammarError<'src>>
where
    'src: 'slice,
{
    let mut input = tokens;
    match command().parse_next(&mut input) {
        Ok(cmd) => Ok((cmd, input)),
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => Err(err),
        Err(ErrMode::Incomplete(_)) => Err(GrammarError::unexpected("token", input.first())),
    }
}

/// Splits `line` into tokens; an unlexable tail becomes an error token.
///
/// # Errors
///
/// Fails when the line holds more than [`MAX_TOKENS`] tokens.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        push_token(&mut buffer, record.token, lexeme, span)?;
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let span = start..start + partial.fragment.len();
        push_token(&mut buffer, TokenKind::Error, partial.fragment, span)?;
    }

    Ok(buffer)
}

fn push_token<'a>(
    buffer: &mut TokenBuffer<'a>,
    kind: TokenKind,
    lexeme: &'a str,
    span: Range<usize>,
) -> Result<(), LexError> {
    buffer
        .push(Token { kind, lexeme, span })
        .map_err(|_| LexError::TooManyTokens {
            processed: buffer.len() + 1,
        })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parses one event-injection line.
///
/// # Errors
///
/// Returns the first lexical or grammatical problem in the line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    for token in &tokens {
        if token.kind == TokenKind::Error {
            return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
        }
    }

    let (command, mut rest) =
        parse_tokens_partial(tokens.as_slice()).map_err(ParseError::Grammar)?;

    while let Some((token, remaining)) = rest.split_first() {
        if token.kind == TokenKind::Eol {
            rest = remaining;
        } else {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "end of command",
                Some(token),
            )));
        }
    }

    Ok(command)
}

#[derive(Clone, Copy)]
enum Verb {
    Link,
    Inet,
    Mqtt,
    Probe,
    Time,
    Sensor,
    System,
    Target,
    Notify,
    Advance,
    Wait,
    Status,
    Help,
}

const VERBS: &[(&str, Verb)] = &[
    ("link", Verb::Link),
    ("inet", Verb::Inet),
    ("mqtt", Verb::Mqtt),
    ("probe", Verb::Probe),
    ("time", Verb::Time),
    ("sensor", Verb::Sensor),
    ("system", Verb::System),
    ("target", Verb::Target),
    ("notify", Verb::Notify),
    ("advance", Verb::Advance),
    ("wait", Verb::Wait),
    ("status", Verb::Status),
    ("help", Verb::Help),
];

fn command<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, Command<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let verb = keyword(input, VERBS, "command keyword")?;
        match verb {
            Verb::Link => parse_link(input).map(Command::Link),
            Verb::Inet => parse_inet(input).map(Command::Inet),
            Verb::Mqtt => parse_mqtt(input).map(Command::Mqtt),
            Verb::Probe => parse_probe(input).map(Command::Probe),
            Verb::Time => parse_time(input).map(Command::Time),
            Verb::Sensor => parse_sensor(input).map(Command::Sensor),
            Verb::System => parse_system(input).map(Command::System),
            Verb::Target => parse_target(input).map(Command::Target),
            Verb::Notify => parse_notify(input).map(Command::Notify),
            Verb::Advance => duration(input).map(Command::Advance),
            Verb::Wait => parse_wait(input).map(Command::Wait),
            Verb::Status => {
                let json = optional_keyword(input, "json");
                Ok(Command::Status(if json {
                    StatusFormat::Json
                } else {
                    StatusFormat::Text
                }))
            }
            Verb::Help => {
                let topic = optional_ident(input);
                Ok(Command::Help(HelpCommand { topic }))
            }
        }
    }
}

fn parse_link<'src>(input: &mut Input<'src, '_>) -> Step<'src, LinkCommand<'src>> {
    const ACTIONS: &[(&str, u8)] = &[
        ("init", 0),
        ("start", 1),
        ("up", 2),
        ("down", 3),
        ("stop", 4),
    ];
    Ok(match keyword(input, ACTIONS, "init|start|up|down|stop")? {
        0 => LinkCommand::Init,
        1 => LinkCommand::Start,
        2 => LinkCommand::Up {
            access_point: optional_ident(input),
        },
        3 => LinkCommand::Down,
        _ => LinkCommand::Stop,
    })
}

fn parse_inet<'src>(input: &mut Input<'src, '_>) -> Step<'src, InetCommand> {
    const ACTIONS: &[(&str, u8)] = &[("up", 0), ("slow", 1), ("down", 2)];
    Ok(match keyword(input, ACTIONS, "up|slow|down")? {
        0 => InetCommand::Up,
        1 => InetCommand::Slow,
        _ => InetCommand::Down {
            since: optional_assignment(input, "since")?,
        },
    })
}

fn parse_mqtt<'src>(input: &mut Input<'src, '_>) -> Step<'src, MqttCommand<'src>> {
    const ACTIONS: &[(&str, u8)] = &[
        ("connect", 0),
        ("lost", 1),
        ("fail", 2),
        ("primary", 3),
        ("secondary", 4),
        ("error", 5),
        ("clear", 6),
    ];
    Ok(
        match keyword(input, ACTIONS, "connect|lost|fail|primary|secondary|error|clear")? {
            0 => {
                let endpoint = endpoint(input)?;
                let secondary = optional_keyword(input, "secondary");
                let local = optional_keyword(input, "local");
                MqttCommand::Connect {
                    endpoint,
                    primary: !secondary,
                    local,
                }
            }
            1 => MqttCommand::Lost(endpoint(input)?),
            2 => MqttCommand::Fail(endpoint(input)?),
            3 => MqttCommand::Primary(endpoint(input)?),
            4 => MqttCommand::Secondary(endpoint(input)?),
            5 => {
                let message = expect_kind(TokenKind::Ident, "message").parse_next(input)?;
                MqttCommand::Error(message.lexeme)
            }
            _ => MqttCommand::Clear,
        },
    )
}

fn parse_probe<'src>(input: &mut Input<'src, '_>) -> Step<'src, ProbeCommand<'src>> {
    let slot = expect_kind(TokenKind::Integer, "broker number").parse_next(input)?;
    let broker = match slot.lexeme {
        "1" => Broker::First,
        "2" => Broker::Second,
        _ => return Err(ErrMode::Cut(GrammarError::unexpected("1 or 2", Some(&slot)))),
    };
    let up = up_down(input)?;
    let host = host(input)?;
    let since = if up {
        None
    } else {
        optional_assignment(input, "since")?
    };
    Ok(ProbeCommand {
        broker,
        up,
        host,
        since,
    })
}

fn parse_time<'src>(input: &mut Input<'src, '_>) -> Step<'src, TimeCommand> {
    const ACTIONS: &[(&str, u8)] = &[("rtc", 0), ("sync", 1), ("silent", 2), ("tick", 3)];
    Ok(match keyword(input, ACTIONS, "rtc|sync|silent|tick")? {
        0 => TimeCommand::Rtc,
        1 => TimeCommand::Sync,
        2 => TimeCommand::Silent(on_off(input)?),
        _ => TimeCommand::Tick,
    })
}

fn parse_sensor<'src>(input: &mut Input<'src, '_>) -> Step<'src, SensorCommand<'src>> {
    const STATUSES: &[(&str, SensorStatus)] = &[
        ("ok", SensorStatus::Ok),
        ("uninit", SensorStatus::NotInitialized),
        ("timeout", SensorStatus::Timeout),
        ("calibration", SensorStatus::CalibrationError),
        ("crc", SensorStatus::CrcError),
        ("error", SensorStatus::Error),
    ];
    let slot = expect_kind(TokenKind::Integer, "sensor slot").parse_next(input)?;
    let id = parse_integer::<u8>(&slot).map_err(ErrMode::Cut)?;
    if id >= SENSOR_SLOTS {
        return Err(ErrMode::Cut(GrammarError::invalid_integer(&slot)));
    }
    let status = keyword(input, STATUSES, "ok|uninit|timeout|calibration|crc|error")?;
    let name = expect_kind(TokenKind::Ident, "sensor name").parse_next(input)?.lexeme;
    Ok(SensorCommand { id, status, name })
}

fn parse_system<'src>(input: &mut Input<'src, '_>) -> Step<'src, SystemCommand> {
    const ACTIONS: &[(&str, u8)] = &[("ota", 0), ("error", 1), ("alloc", 2), ("started", 3)];
    Ok(match keyword(input, ACTIONS, "ota|error|alloc|started")? {
        0 => SystemCommand::Ota(on_off(input)?),
        1 => SystemCommand::Error(on_off(input)?),
        2 => {
            let size = expect_kind(TokenKind::Integer, "requested bytes").parse_next(input)?;
            SystemCommand::Alloc(parse_integer(&size).map_err(ErrMode::Cut)?)
        }
        _ => SystemCommand::Started,
    })
}

fn parse_target<'src>(input: &mut Input<'src, '_>) -> Step<'src, TargetCommand> {
    const TARGETS: &[(&str, PublishTarget)] = &[
        ("site", PublishTarget::Site),
        ("thingspeak", PublishTarget::ThingSpeak),
        ("openmon", PublishTarget::OpenMon),
        ("narodmon", PublishTarget::NarodMon),
    ];
    let target = keyword(input, TARGETS, "site|thingspeak|openmon|narodmon")?;
    let failing = ok_fail(input)?;
    let http = if failing {
        optional_assignment(input, "http")?
    } else {
        None
    };
    Ok(TargetCommand {
        target,
        failing,
        http,
    })
}

fn parse_notify<'src>(input: &mut Input<'src, '_>) -> Step<'src, NotifyCommand> {
    const CHANNELS: &[(&str, NotifyChannel)] = &[
        ("telegram", NotifyChannel::Telegram),
        ("smtp", NotifyChannel::Smtp),
    ];
    let channel = keyword(input, CHANNELS, "telegram|smtp")?;
    let failing = ok_fail(input)?;
    Ok(NotifyCommand { channel, failing })
}

fn parse_wait<'src>(input: &mut Input<'src, '_>) -> Step<'src, WaitCommand> {
    let mut flags = StateSet::empty();
    loop {
        let name = expect_kind(TokenKind::Ident, "status flag").parse_next(input)?;
        let flag = StateFlag::from_name(name.lexeme)
            .ok_or_else(|| ErrMode::Cut(GrammarError::unknown_flag(&name)))?;
        flags = flags.with(flag);
        match input.split_first() {
            Some((token, rest)) if token.kind == TokenKind::Comma => *input = rest,
            _ => break,
        }
    }
    let timeout = duration(input)?;
    let all = !optional_keyword(input, "any");
    let clear = optional_keyword(input, "clear");
    Ok(WaitCommand {
        flags,
        timeout,
        all,
        clear,
    })
}

fn keyword<'src, T: Copy>(
    input: &mut Input<'src, '_>,
    choices: &[(&'static str, T)],
    label: &'static str,
) -> Step<'src, T> {
    let token = expect_kind(TokenKind::Ident, label).parse_next(input)?;
    choices
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(token.lexeme))
        .map(|(_, value)| *value)
        .ok_or_else(|| ErrMode::Backtrack(GrammarError::unexpected(label, Some(&token))))
}

fn optional_keyword(input: &mut Input<'_, '_>, word: &str) -> bool {
    match input.split_first() {
        Some((token, rest))
            if token.kind == TokenKind::Ident && token.lexeme.eq_ignore_ascii_case(word) =>
        {
            *input = rest;
            true
        }
        _ => false,
    }
}

fn optional_ident<'src>(input: &mut Input<'src, '_>) -> Option<&'src str> {
    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Ident => {
            *input = rest;
            Some(token.lexeme)
        }
        _ => None,
    }
}

/// Parses an optional `name=<integer>` suffix.
fn optional_assignment<'src, T: core::str::FromStr>(
    input: &mut Input<'src, '_>,
    name: &str,
) -> Step<'src, Option<T>> {
    if !optional_keyword(input, name) {
        return Ok(None);
    }
    let _ = expect_kind(TokenKind::Equals, "=").parse_next(input)?;
    let value = expect_kind(TokenKind::Integer, "integer").parse_next(input)?;
    parse_integer(&value).map(Some).map_err(ErrMode::Cut)
}

fn on_off<'src>(input: &mut Input<'src, '_>) -> Step<'src, bool> {
    keyword(input, &[("on", true), ("off", false)], "on|off")
}

fn up_down<'src>(input: &mut Input<'src, '_>) -> Step<'src, bool> {
    keyword(input, &[("up", true), ("down", false)], "up|down")
}

/// `fail` yields `true`.
fn ok_fail<'src>(input: &mut Input<'src, '_>) -> Step<'src, bool> {
    keyword(input, &[("ok", false), ("fail", true)], "ok|fail")
}

fn host<'src>(input: &mut Input<'src, '_>) -> Step<'src, &'src str> {
    match input.split_first() {
        Some((token, rest)) if matches!(token.kind, TokenKind::Ident | TokenKind::Address) => {
            *input = rest;
            Ok(token.lexeme)
        }
        other => Err(ErrMode::Backtrack(GrammarError::unexpected(
            "host",
            other.map(|(token, _)| token),
        ))),
    }
}

fn endpoint<'src>(input: &mut Input<'src, '_>) -> Step<'src, EndpointArg<'src>> {
    let host = host(input)?;
    let port = expect_kind(TokenKind::Integer, "port").parse_next(input)?;
    let port = parse_integer(&port).map_err(ErrMode::Cut)?;
    Ok(EndpointArg { host, port })
}

fn duration<'src>(input: &mut Input<'src, '_>) -> Step<'src, Duration> {
    let token = expect_kind(TokenKind::Duration, "duration").parse_next(input)?;
    parse_duration(&token).map_err(ErrMode::Cut)
}

fn expect_kind<'src, 'slice>(
    kind: TokenKind,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(label, None))),
    }
}

fn parse_integer<'a, T: core::str::FromStr>(token: &Token<'a>) -> Result<T, GrammarError<'a>> {
    token
        .lexeme
        .parse::<T>()
        .map_err(|_| GrammarError::invalid_integer(token))
}

fn parse_duration<'a>(token: &Token<'a>) -> Result<Duration, GrammarError<'a>> {
    let text = token.lexeme;
    let (digits, scale) = if let Some(rest) = text.strip_suffix("ms") {
        (rest, None)
    } else if let Some(rest) = text.strip_suffix('s') {
        (rest, Some(1))
    } else if let Some(rest) = text.strip_suffix('m') {
        (rest, Some(60))
    } else if let Some(rest) = text.strip_suffix('h') {
        (rest, Some(3_600))
    } else {
        return Err(GrammarError::invalid_duration(token));
    };

    let value = digits
        .parse::<u32>()
        .map_err(|_| GrammarError::invalid_duration(token))?;
    Ok(match scale {
        None => Duration::from_millis(value.into()),
        Some(seconds) => Duration::from_secs(u64::from(value) * seconds),
    })
}

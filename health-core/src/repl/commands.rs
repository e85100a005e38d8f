//! REPL command dispatcher.
//!
//! Turns parsed commands into [`HealthEvent`]s and pushes them through an
//! [`EventQueueProducer`], the same path every other event source uses.
//! Commands that act on the front-end itself (clock, wait, status, help) are
//! handed back to the caller.

use core::fmt;
use core::time::Duration;

use crate::clock::Timestamp;
use crate::events::{
    Endpoint, HealthEvent, LinkEvent, ProbeEvent, ReachabilityEvent, SensorEvent, SystemEvent,
    TimeEvent, TransportEvent, label,
};
use crate::monitor::Reason;
use crate::queue::{EnqueueError, EventQueueProducer};

use super::grammar::{
    self, Command, EndpointArg, InetCommand, LinkCommand, MqttCommand, StatusFormat,
    SystemCommand, TimeCommand, WaitCommand,
};

/// Command execution successes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome<'a> {
    /// The event was queued for the dispatcher.
    Queued(HealthEvent),
    Advance(Duration),
    Wait(WaitCommand),
    Status(StatusFormat),
    Help(Option<&'a str>),
}

/// Errors surfaced while executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandError<'a, E> {
    Parse(grammar::ParseError<'a>),
    Enqueue(EnqueueError<E>),
}

impl<'a, E> From<grammar::ParseError<'a>> for CommandError<'a, E> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl<E> From<EnqueueError<E>> for CommandError<'_, E> {
    fn from(error: EnqueueError<E>) -> Self {
        Self::Enqueue(error)
    }
}

impl<E: fmt::Debug> fmt::Display for CommandError<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(err) => err.fmt(f),
            CommandError::Enqueue(EnqueueError::QueueFull) => f.write_str("event queue full"),
            CommandError::Enqueue(EnqueueError::Disconnected) => {
                f.write_str("dispatcher is not running")
            }
            CommandError::Enqueue(EnqueueError::Other(err)) => write!(f, "enqueue failed: {err:?}"),
        }
    }
}

/// Builds the event a command injects, if it injects one.
#[must_use]
pub fn event_for(command: &Command<'_>) -> Option<HealthEvent> {
    let event = match command {
        Command::Link(action) => HealthEvent::Link(match action {
            LinkCommand::Init => LinkEvent::Init,
            LinkCommand::Start => LinkEvent::Started,
            LinkCommand::Up { access_point } => LinkEvent::GotAddress {
                access_point: access_point.map(label),
            },
            LinkCommand::Down => LinkEvent::Disconnected,
            LinkCommand::Stop => LinkEvent::Stopped,
        }),
        Command::Inet(action) => HealthEvent::Reachability(match action {
            InetCommand::Up => ReachabilityEvent::Available,
            InetCommand::Slow => ReachabilityEvent::Slowdown,
            InetCommand::Down { since } => ReachabilityEvent::Unavailable {
                since: since.map(Timestamp::from_secs),
            },
        }),
        Command::Mqtt(action) => HealthEvent::Transport(transport_event(action)),
        Command::Probe(probe) => {
            let host = label(probe.host);
            HealthEvent::Probe(if probe.up {
                ProbeEvent::Available {
                    broker: probe.broker,
                    host,
                }
            } else {
                ProbeEvent::Unavailable {
                    broker: probe.broker,
                    host,
                    since: probe.since.map(Timestamp::from_secs),
                }
            })
        }
        Command::Time(action) => HealthEvent::Time(match action {
            TimeCommand::Rtc => TimeEvent::RtcAvailable,
            TimeCommand::Sync => TimeEvent::SyncConfirmed,
            TimeCommand::Silent(true) => TimeEvent::SilentModeOn,
            TimeCommand::Silent(false) => TimeEvent::SilentModeOff,
            TimeCommand::Tick => TimeEvent::MinuteTick,
        }),
        Command::Sensor(sensor) => HealthEvent::Sensor(SensorEvent {
            id: sensor.id,
            status: sensor.status,
            name: label(sensor.name),
        }),
        Command::System(action) => HealthEvent::System(match *action {
            SystemCommand::Ota(true) => SystemEvent::OtaStarted,
            SystemCommand::Ota(false) => SystemEvent::OtaCleared,
            SystemCommand::Error(active) => SystemEvent::GeneralError { active },
            SystemCommand::Alloc(requested) => SystemEvent::AllocationFailed { requested },
            SystemCommand::Started => SystemEvent::Started,
        }),
        Command::Target(target) => HealthEvent::System(SystemEvent::PublishTarget {
            target: target.target,
            active: target.failing,
            since: None,
            reason: target.http.map_or(Reason::Unspecified, Reason::Http),
        }),
        Command::Notify(notify) => HealthEvent::System(SystemEvent::ChannelError {
            channel: notify.channel,
            active: notify.failing,
        }),
        Command::Advance(_) | Command::Wait(_) | Command::Status(_) | Command::Help(_) => {
            return None;
        }
    };
    Some(event)
}

fn transport_event(action: &MqttCommand<'_>) -> TransportEvent {
    let endpoint = |arg: &EndpointArg<'_>| Endpoint::new(arg.host, arg.port);
    match action {
        MqttCommand::Connect {
            endpoint: arg,
            primary,
            local,
        } => TransportEvent::Connected {
            endpoint: endpoint(arg),
            primary: *primary,
            local: *local,
        },
        MqttCommand::Lost(arg) => TransportEvent::Lost(endpoint(arg)),
        MqttCommand::Fail(arg) => TransportEvent::ConnectFailed(endpoint(arg)),
        MqttCommand::Primary(arg) => TransportEvent::PrimarySelected(endpoint(arg)),
        MqttCommand::Secondary(arg) => TransportEvent::SecondarySelected(endpoint(arg)),
        MqttCommand::Error(message) => TransportEvent::ProtocolError(label(message)),
        MqttCommand::Clear => TransportEvent::ProtocolErrorCleared,
    }
}

/// Dispatches REPL commands into the event queue.
pub struct CommandExecutor<P> {
    queue: P,
}

impl<P> CommandExecutor<P> {
    pub const fn new(queue: P) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &P {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut P {
        &mut self.queue
    }

    pub fn into_inner(self) -> P {
        self.queue
    }
}

impl<P: EventQueueProducer> CommandExecutor<P> {
    /// Parses and executes a REPL line.
    ///
    /// # Errors
    ///
    /// Returns parse failures and queue rejections.
    pub fn execute<'a>(
        &mut self,
        line: &'a str,
    ) -> Result<CommandOutcome<'a>, CommandError<'a, P::Error>> {
        let command = grammar::parse(line)?;
        self.dispatch(command)
    }

    fn dispatch<'a>(
        &mut self,
        command: Command<'a>,
    ) -> Result<CommandOutcome<'a>, CommandError<'a, P::Error>> {
        if let Some(event) = event_for(&command) {
            self.queue.try_enqueue(event.clone())?;
            return Ok(CommandOutcome::Queued(event));
        }

        Ok(match command {
            Command::Advance(by) => CommandOutcome::Advance(by),
            Command::Wait(wait) => CommandOutcome::Wait(wait),
            Command::Status(format) => CommandOutcome::Status(format),
            Command::Help(help) => CommandOutcome::Help(help.topic),
            _ => unreachable!("event commands are queued above"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Broker, PublishTarget};
    use crate::queue::{EventQueueConsumer, LocalQueue};

    fn executor() -> CommandExecutor<LocalQueue<4>> {
        CommandExecutor::new(LocalQueue::new())
    }

    #[test]
    fn link_up_queues_got_address() {
        let mut executor = executor();
        let outcome = executor.execute("link up home").expect("command runs");
        let expected = HealthEvent::Link(LinkEvent::GotAddress {
            access_point: Some(label("home")),
        });
        assert_eq!(outcome, CommandOutcome::Queued(expected.clone()));
        assert_eq!(executor.queue_mut().try_dequeue(), Ok(Some(expected)));
    }

    #[test]
    fn mqtt_connect_builds_endpoint() {
        let mut executor = executor();
        executor
            .execute("mqtt connect b1 1883 local")
            .expect("command runs");
        assert_eq!(
            executor.queue_mut().try_dequeue(),
            Ok(Some(HealthEvent::Transport(TransportEvent::Connected {
                endpoint: Endpoint::new("b1", 1883),
                primary: true,
                local: true,
            })))
        );
    }

    #[test]
    fn probe_down_carries_onset() {
        let event = event_for(&grammar::parse("probe 1 down b1 since=40").expect("parses"));
        assert_eq!(
            event,
            Some(HealthEvent::Probe(ProbeEvent::Unavailable {
                broker: Broker::First,
                host: label("b1"),
                since: Some(Timestamp::from_secs(40)),
            }))
        );
    }

    #[test]
    fn target_failure_maps_http_reason() {
        let event = event_for(&grammar::parse("target openmon fail http=404").expect("parses"));
        assert_eq!(
            event,
            Some(HealthEvent::System(SystemEvent::PublishTarget {
                target: PublishTarget::OpenMon,
                active: true,
                since: None,
                reason: Reason::Http(404),
            }))
        );
    }

    #[test]
    fn front_end_commands_do_not_touch_queue() {
        let mut executor = executor();
        assert_eq!(
            executor.execute("advance 90s"),
            Ok(CommandOutcome::Advance(Duration::from_secs(90)))
        );
        assert_eq!(
            executor.execute("status json"),
            Ok(CommandOutcome::Status(StatusFormat::Json))
        );
        assert_eq!(executor.execute("help"), Ok(CommandOutcome::Help(None)));
        assert_eq!(EventQueueProducer::len(executor.queue()), Some(0));
    }

    #[test]
    fn full_queue_is_reported() {
        let mut executor = CommandExecutor::new(LocalQueue::<1>::new());
        executor.execute("time tick").expect("first fits");
        assert_eq!(
            executor.execute("time tick"),
            Err(CommandError::Enqueue(EnqueueError::QueueFull))
        );
    }

    #[test]
    fn parse_errors_surface() {
        let mut executor = executor();
        assert!(matches!(
            executor.execute("bogus"),
            Err(CommandError::Parse(_))
        ));
    }
}

//! Status LED: the registry observer queues indicator commands and the LED
//! task turns them into pin levels.

use embassy_sync::channel::Channel;
use health_core::indicator::{BlinkPattern, IndicatorCommand, IndicatorDriver};

use crate::events::EventMutex;

pub const LED_QUEUE_DEPTH: usize = 8;

pub type LedQueue = Channel<EventMutex, IndicatorCommand, LED_QUEUE_DEPTH>;

/// Indicator driver that forwards commands to the LED task.
pub struct QueuedIndicator {
    queue: &'static LedQueue,
}

impl QueuedIndicator {
    pub const fn new(queue: &'static LedQueue) -> Self {
        Self { queue }
    }
}

impl IndicatorDriver for QueuedIndicator {
    fn apply(&self, command: IndicatorCommand) {
        if self.queue.try_send(command).is_err() {
            log_dropped(command);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedOutput {
    Steady(bool),
    Pulse(BlinkPattern),
}

/// What the LED shows after every command seen so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedState {
    enabled: bool,
    base: LedOutput,
    flash: Option<BlinkPattern>,
}

impl LedState {
    pub const fn new() -> Self {
        Self {
            enabled: true,
            base: LedOutput::Steady(false),
            flash: None,
        }
    }

    pub fn apply(&mut self, command: IndicatorCommand) {
        match command {
            IndicatorCommand::On => self.base = LedOutput::Steady(true),
            IndicatorCommand::Off | IndicatorCommand::BlinkOff => {
                self.base = LedOutput::Steady(false);
            }
            IndicatorCommand::Blink(pattern) => self.base = LedOutput::Pulse(pattern),
            IndicatorCommand::Flash(pattern) => self.flash = Some(pattern),
            IndicatorCommand::Enable(enabled) => self.enabled = enabled,
        }
    }

    pub fn output(&self) -> LedOutput {
        if !self.enabled {
            return LedOutput::Steady(false);
        }
        self.flash.map_or(self.base, LedOutput::Pulse)
    }

    /// A pulse cycle ran to completion; a pending flash is spent.
    pub fn cycle_finished(&mut self) {
        self.flash = None;
    }
}

impl Default for LedState {
    fn default() -> Self {
        Self::new()
    }
}

/// One cycle of a blink pattern as `(level, hold_ms)` steps.
#[derive(Clone, Copy, Debug)]
pub struct BlinkCycle {
    pattern: BlinkPattern,
    step: u16,
}

impl BlinkCycle {
    pub const fn new(pattern: BlinkPattern) -> Self {
        Self { pattern, step: 0 }
    }
}

impl Iterator for BlinkCycle {
    type Item = (bool, u16);

    fn next(&mut self) -> Option<Self::Item> {
        let pulses = u16::from(self.pattern.quantity) * 2;
        let step = self.step;
        self.step = self.step.saturating_add(1);
        if step < pulses {
            Some((step % 2 == 0, self.pattern.duration_ms))
        } else if step == pulses {
            Some((false, self.pattern.interval_ms))
        } else {
            None
        }
    }
}

#[cfg(target_os = "none")]
fn log_dropped(command: IndicatorCommand) {
    defmt::warn!("led: queue full, dropped {}", defmt::Debug2Format(&command));
}

#[cfg(not(target_os = "none"))]
fn log_dropped(command: IndicatorCommand) {
    println!("led: queue full, dropped {command:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SHORT: BlinkPattern = BlinkPattern::new(2, 100, 1_000);

    #[test]
    fn blink_cycle_alternates_then_pauses() {
        let steps: Vec<(bool, u16)> = BlinkCycle::new(TWO_SHORT).collect();
        assert_eq!(
            steps,
            [
                (true, 100),
                (false, 100),
                (true, 100),
                (false, 100),
                (false, 1_000)
            ]
        );
    }

    #[test]
    fn flash_overrides_once_then_restores_base() {
        let mut led = LedState::new();
        led.apply(IndicatorCommand::On);
        led.apply(IndicatorCommand::Flash(TWO_SHORT));
        assert_eq!(led.output(), LedOutput::Pulse(TWO_SHORT));

        led.cycle_finished();
        assert_eq!(led.output(), LedOutput::Steady(true));
    }

    #[test]
    fn disabled_led_stays_dark() {
        let mut led = LedState::new();
        led.apply(IndicatorCommand::Blink(TWO_SHORT));
        led.apply(IndicatorCommand::Enable(false));
        assert_eq!(led.output(), LedOutput::Steady(false));

        led.apply(IndicatorCommand::Enable(true));
        assert_eq!(led.output(), LedOutput::Pulse(TWO_SHORT));
    }

    #[test]
    fn indicator_queues_commands() {
        static QUEUE: LedQueue = Channel::new();
        let indicator = QueuedIndicator::new(&QUEUE);
        indicator.apply(IndicatorCommand::Off);
        assert_eq!(QUEUE.try_receive(), Ok(IndicatorCommand::Off));
    }
}

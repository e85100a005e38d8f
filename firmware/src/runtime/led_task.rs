use embassy_futures::select::{Either, select};
use embassy_stm32::gpio::{Level, Output};
use embassy_time::Timer;
use health_core::indicator::{BlinkPattern, IndicatorCommand};

use super::LED_QUEUE;
use crate::indicator::{BlinkCycle, LedOutput, LedState};

#[embassy_executor::task]
pub async fn run(mut pin: Output<'static>) -> ! {
    let mut state = LedState::new();
    loop {
        match state.output() {
            LedOutput::Steady(on) => {
                pin.set_level(Level::from(on));
                state.apply(LED_QUEUE.receive().await);
            }
            LedOutput::Pulse(pattern) => match run_cycle(&mut pin, pattern).await {
                Some(command) => state.apply(command),
                None => state.cycle_finished(),
            },
        }
    }
}

/// Plays one blink cycle; a new command cuts it short.
async fn run_cycle(pin: &mut Output<'static>, pattern: BlinkPattern) -> Option<IndicatorCommand> {
    for (on, hold_ms) in BlinkCycle::new(pattern) {
        pin.set_level(Level::from(on));
        let hold = Timer::after_millis(u64::from(hold_ms));
        if let Either::First(command) = select(LED_QUEUE.receive(), hold).await {
            return Some(command);
        }
    }
    None
}

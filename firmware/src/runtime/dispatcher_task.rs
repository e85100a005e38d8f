use embassy_futures::select::{Either, select};
use embassy_time::Timer;
use health_core::events::HealthEvent;

use super::{EVENT_QUEUE, FirmwareService};
use crate::events::EventReceiver;

/// Single consumer of the event queue; timer expiry is routed through the
/// same loop so the service never runs concurrently with itself.
#[embassy_executor::task]
pub async fn run(mut service: FirmwareService) -> ! {
    service.start();
    defmt::info!("health: dispatcher running");

    let receiver: EventReceiver<'_> = EVENT_QUEUE.receiver();
    loop {
        let event = match service.next_deadline() {
            Some(deadline) => {
                match select(receiver.receive(), Timer::at(deadline.into_embassy())).await {
                    Either::First(event) => event,
                    Either::Second(()) => HealthEvent::TimerElapsed,
                }
            }
            None => receiver.receive().await,
        };
        service.handle(event);
    }
}

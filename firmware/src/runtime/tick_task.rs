use embassy_time::{Duration, Ticker};
use health_core::events::{HealthEvent, TimeEvent};
use health_core::queue::EventQueueProducer;

use super::EVENT_QUEUE;
use crate::events::EventProducer;

#[embassy_executor::task]
pub async fn run() -> ! {
    let mut producer = EventProducer::new(EVENT_QUEUE.sender());
    let mut ticker = Ticker::every(Duration::from_secs(60));
    loop {
        ticker.next().await;
        if let Err(err) = producer.try_enqueue(HealthEvent::Time(TimeEvent::MinuteTick)) {
            defmt::warn!("tick: minute tick dropped ({})", defmt::Debug2Format(&err));
        }
    }
}

//! Event queue shared by every producer and the health dispatcher task.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use health_core::events::HealthEvent;
use health_core::queue::{EnqueueError, EventQueueProducer};

/// Depth of the event queue feeding the dispatcher.
pub const EVENT_QUEUE_DEPTH: usize = 16;

pub type EventMutex = CriticalSectionRawMutex;

/// Queue carrying health events to the dispatcher.
pub type EventQueue = Channel<EventMutex, HealthEvent, EVENT_QUEUE_DEPTH>;

pub type EventSender<'a> = Sender<'a, EventMutex, HealthEvent, EVENT_QUEUE_DEPTH>;

pub type EventReceiver<'a> = Receiver<'a, EventMutex, HealthEvent, EVENT_QUEUE_DEPTH>;

/// Adapter that exposes the Embassy channel sender as a health-core producer.
pub struct EventProducer<'a> {
    sender: EventSender<'a>,
}

impl<'a> EventProducer<'a> {
    pub fn new(sender: EventSender<'a>) -> Self {
        Self { sender }
    }
}

impl EventQueueProducer for EventProducer<'_> {
    type Error = TrySendError<HealthEvent>;

    fn try_enqueue(&mut self, event: HealthEvent) -> Result<(), EnqueueError<Self::Error>> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(EnqueueError::QueueFull),
        }
    }

    fn capacity(&self) -> Option<usize> {
        Some(EVENT_QUEUE_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use health_core::events::TimeEvent;

    #[test]
    fn producer_reports_full_queue() {
        let queue = EventQueue::new();
        let mut producer = EventProducer::new(queue.sender());

        for _ in 0..EVENT_QUEUE_DEPTH {
            producer
                .try_enqueue(HealthEvent::Time(TimeEvent::MinuteTick))
                .expect("room in queue");
        }

        assert_eq!(
            producer.try_enqueue(HealthEvent::TimerElapsed),
            Err(EnqueueError::QueueFull)
        );
    }

    #[test]
    fn events_arrive_in_order() {
        let queue = EventQueue::new();
        let mut producer = EventProducer::new(queue.sender());
        producer
            .try_enqueue(HealthEvent::Time(TimeEvent::RtcAvailable))
            .expect("enqueue");
        producer
            .try_enqueue(HealthEvent::TimerElapsed)
            .expect("enqueue");

        let receiver = queue.receiver();
        assert_eq!(
            receiver.try_receive(),
            Ok(HealthEvent::Time(TimeEvent::RtcAvailable))
        );
        assert_eq!(receiver.try_receive(), Ok(HealthEvent::TimerElapsed));
    }
}

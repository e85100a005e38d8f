//! Event queue seam between producers and the single dispatcher.
//!
//! Upstream tasks (link manager, transport client, probers, sensors, the
//! minute tick, the REPL) only ever enqueue [`HealthEvent`]s. The dispatcher
//! drains them in arrival order, so registry and monitor mutation never runs
//! concurrently.

use crate::events::HealthEvent;

/// Error surfaced when an event cannot be enqueued.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EnqueueError<E = ()> {
    /// Queue has reached its maximum capacity.
    QueueFull,
    /// Queue has been disconnected from the dispatcher.
    Disconnected,
    /// Transport-specific failure.
    Other(E),
}

impl<E> EnqueueError<E> {
    /// Maps the inner error type.
    pub fn map_other<F, M>(self, mapper: M) -> EnqueueError<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            EnqueueError::QueueFull => EnqueueError::QueueFull,
            EnqueueError::Disconnected => EnqueueError::Disconnected,
            EnqueueError::Other(err) => EnqueueError::Other(mapper(err)),
        }
    }
}

/// Error surfaced when dequeueing fails.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DequeueError<E = ()> {
    /// Every producer has gone away.
    Disconnected,
    Other(E),
}

impl<E> DequeueError<E> {
    /// Maps the inner error type.
    pub fn map_other<F, M>(self, mapper: M) -> DequeueError<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            DequeueError::Disconnected => DequeueError::Disconnected,
            DequeueError::Other(err) => DequeueError::Other(mapper(err)),
        }
    }
}

/// Implemented by handles that push events toward the dispatcher.
pub trait EventQueueProducer {
    type Error;

    /// Attempts to enqueue an event without blocking.
    fn try_enqueue(&mut self, event: HealthEvent) -> Result<(), EnqueueError<Self::Error>>;

    /// Queue capacity, when known.
    fn capacity(&self) -> Option<usize> {
        None
    }

    /// Current depth, when observable.
    fn len(&self) -> Option<usize> {
        None
    }

    fn is_empty(&self) -> Option<bool> {
        self.len().map(|current| current == 0)
    }
}

/// Implemented by the dispatcher side of the queue.
pub trait EventQueueConsumer {
    type Error;

    /// Returns `Ok(None)` when the queue is currently empty.
    fn try_dequeue(&mut self) -> Result<Option<HealthEvent>, DequeueError<Self::Error>>;
}

/// Fixed-capacity in-memory queue usable as both ends, for hosted tests and
/// single-threaded front-ends.
#[derive(Debug)]
pub struct LocalQueue<const N: usize> {
    events: heapless::Deque<HealthEvent, N>,
}

impl<const N: usize> LocalQueue<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events: heapless::Deque::new(),
        }
    }
}

impl<const N: usize> Default for LocalQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EventQueueProducer for LocalQueue<N> {
    type Error = ();

    fn try_enqueue(&mut self, event: HealthEvent) -> Result<(), EnqueueError<Self::Error>> {
        self.events
            .push_back(event)
            .map_err(|_| EnqueueError::QueueFull)
    }

    fn capacity(&self) -> Option<usize> {
        Some(N)
    }

    fn len(&self) -> Option<usize> {
        Some(self.events.len())
    }
}

impl<const N: usize> EventQueueConsumer for LocalQueue<N> {
    type Error = ();

    fn try_dequeue(&mut self) -> Result<Option<HealthEvent>, DequeueError<Self::Error>> {
        Ok(self.events.pop_front())
    }
}

//! Async waits on the state registry.
//!
//! [`WatchedObserver`] raises a signal after every registry mutation so tasks
//! can sleep until the bits they need appear. The signal wakes a single
//! waiter; give each waiting task its own observer signal.

use embassy_sync::signal::Signal;
use embassy_time::{Duration, with_timeout};
use health_core::flags::StateSet;
use health_core::registry::{FlagStore, Registries, RegistryObserver, RegistrySnapshot};

use crate::events::EventMutex;

pub type ChangeSignal = Signal<EventMutex, ()>;

/// Forwards notifications to `inner`, then raises the change signal.
pub struct WatchedObserver<O> {
    inner: O,
    changed: &'static ChangeSignal,
}

impl<O> WatchedObserver<O> {
    pub const fn new(inner: O, changed: &'static ChangeSignal) -> Self {
        Self { inner, changed }
    }
}

impl<O: RegistryObserver> RegistryObserver for WatchedObserver<O> {
    fn registry_changed(&self, snapshot: RegistrySnapshot) {
        self.inner.registry_changed(snapshot);
        self.changed.signal(());
    }
}

/// Waits until every flag in `mask` is set. Returns `false` on timeout.
pub async fn wait_for_states<S, O>(
    registries: &Registries<S, O>,
    changed: &ChangeSignal,
    mask: StateSet,
    timeout: Duration,
) -> bool
where
    S: FlagStore,
{
    let satisfied = || registries.states().get().contains(mask);
    if satisfied() {
        return true;
    }

    with_timeout(timeout, async {
        loop {
            changed.wait().await;
            if satisfied() {
                break;
            }
        }
    })
    .await
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use health_core::flags::StateFlag;
    use health_core::registry::NoopObserver;

    #[test]
    fn observer_raises_signal_on_change() {
        static CHANGED: ChangeSignal = Signal::new();
        let registries = Registries::new(WatchedObserver::new(NoopObserver, &CHANGED));

        assert!(!CHANGED.signaled());
        registries
            .set_states(StateFlag::RtcEnabled)
            .expect("bits set");
        assert!(CHANGED.signaled());
    }

    #[test]
    fn satisfied_wait_returns_immediately() {
        static CHANGED: ChangeSignal = Signal::new();
        let registries = Registries::new(NoopObserver);
        registries
            .set_states(StateFlag::Started)
            .expect("bits set");

        let done = embassy_futures::block_on(wait_for_states(
            &registries,
            &CHANGED,
            StateFlag::Started.into(),
            Duration::from_secs(1),
        ));
        assert!(done);
    }
}

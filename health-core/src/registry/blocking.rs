//! Condition-variable backed flag store for hosted targets.

use core::time::Duration;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::{FlagStore, WaitOptions, WaitableFlagStore};

/// Flag store whose waiters block on a [`Condvar`].
///
/// Every mutation wakes all waiters, so a waiter observes the new bits
/// before the mutating thread proceeds to its next event.
#[derive(Debug, Default)]
pub struct CondvarFlagStore {
    bits: Mutex<u32>,
    changed: Condvar,
}

impl CondvarFlagStore {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: Mutex::new(0),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u32> {
        // A panicking writer cannot leave a half-written u32 behind.
        self.bits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, apply: impl FnOnce(u32) -> u32) -> u32 {
        let mut guard = self.lock();
        *guard = apply(*guard);
        let value = *guard;
        drop(guard);
        self.changed.notify_all();
        value
    }
}

impl FlagStore for CondvarFlagStore {
    fn load(&self) -> u32 {
        *self.lock()
    }

    fn set_bits(&self, bits: u32) -> u32 {
        self.update(|current| current | bits)
    }

    fn clear_bits(&self, bits: u32) -> u32 {
        self.update(|current| current & !bits)
    }

    fn test_and_clear(&self, bits: u32, clear: bool) -> u32 {
        let mut guard = self.lock();
        let observed = *guard;
        if clear && observed & bits == bits {
            *guard = observed & !bits;
            drop(guard);
            self.changed.notify_all();
        }
        observed
    }
}

impl WaitableFlagStore for CondvarFlagStore {
    fn wait_bits(&self, bits: u32, options: WaitOptions, timeout: Option<Duration>) -> u32 {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut guard = self.lock();

        loop {
            let current = *guard;
            if options.satisfied(current, bits) {
                if options.clear_on_exit {
                    *guard = current & !bits;
                    drop(guard);
                    self.changed.notify_all();
                }
                return current & bits;
            }

            match deadline {
                None => {
                    guard = self
                        .changed
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return current & bits;
                    }
                    let (next, _) = self
                        .changed
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard = next;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::flags::{StateFlag, StateSet};
    use crate::registry::{Registries, Registry, WaitOptions};

    #[test]
    fn wait_returns_promptly_when_bits_appear() {
        let registries = Registries::with_stores(
            CondvarFlagStore::new(),
            CondvarFlagStore::new(),
            crate::registry::NoopObserver,
        );

        let observed = thread::scope(|scope| {
            let waiter = scope.spawn(|| {
                registries.states().wait_for(
                    StateFlag::WifiConnected | StateFlag::InetAvailable,
                    WaitOptions::all(),
                    Some(Duration::from_secs(5)),
                )
            });

            thread::sleep(Duration::from_millis(20));
            registries
                .set_states(StateFlag::WifiConnected)
                .expect("set wifi");
            registries
                .set_states(StateFlag::InetAvailable)
                .expect("set inet");

            waiter.join().expect("waiter thread")
        });

        assert_eq!(observed, StateFlag::WifiConnected | StateFlag::InetAvailable);
    }

    #[test]
    fn wait_times_out_with_partial_result() {
        let registry: Registry<StateFlag, CondvarFlagStore> =
            Registry::with_store(CondvarFlagStore::new());
        registry.set(StateFlag::WifiConnected).expect("set");

        let started = Instant::now();
        let observed = registry.wait_for(
            StateFlag::WifiConnected | StateFlag::MqttConnected,
            WaitOptions::all().clearing(),
            Some(Duration::from_millis(50)),
        );
        let elapsed = started.elapsed();

        assert_eq!(observed, StateSet::from(StateFlag::WifiConnected));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2));
        assert!(
            registry.get().has(StateFlag::WifiConnected),
            "timeouts must not clear observed bits"
        );
    }

    #[test]
    fn wait_any_clears_satisfied_bits() {
        let registry: Registry<StateFlag, CondvarFlagStore> =
            Registry::with_store(CondvarFlagStore::new());
        registry
            .set(StateFlag::RtcEnabled | StateFlag::WifiStarted)
            .expect("set");

        let observed = registry.wait_for(
            StateFlag::RtcEnabled | StateFlag::SntpSynced,
            WaitOptions::any().clearing(),
            None,
        );

        assert_eq!(observed, StateSet::from(StateFlag::RtcEnabled));
        assert_eq!(registry.get(), StateSet::from(StateFlag::WifiStarted));
    }

    #[test]
    fn concurrent_disjoint_updates_are_not_lost() {
        let registry: Registry<StateFlag, CondvarFlagStore> =
            Registry::with_store(CondvarFlagStore::new());

        thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..500 {
                    registry.set(StateFlag::WifiConnected).expect("set wifi");
                    registry.clear(StateFlag::WifiConnected).expect("clear wifi");
                }
                registry.set(StateFlag::WifiConnected).expect("final wifi");
            });
            scope.spawn(|| {
                for _ in 0..500 {
                    registry.set(StateFlag::MqttConnected).expect("set mqtt");
                }
            });
        });

        assert_eq!(
            registry.get(),
            StateFlag::WifiConnected | StateFlag::MqttConnected
        );
    }
}

//! State and error registries.
//!
//! A [`Registry`] wraps a [`FlagStore`] holding one 32-bit flag space. The
//! pair of registries shared by the whole device lives in [`Registries`],
//! which also notifies a [`RegistryObserver`] after every successful mutation
//! so derived displays (the status indicator) stay in sync without the
//! mutators knowing about them.

use core::fmt;
use core::marker::PhantomData;
use core::time::Duration;

use portable_atomic::{AtomicU32, Ordering};

use crate::flags::{ErrorFlag, ErrorSet, Flag, FlagSet, StateFlag, StateSet};

#[cfg(feature = "std")]
mod blocking;

#[cfg(feature = "std")]
pub use blocking::CondvarFlagStore;

/// Storage backend for a single flag space.
///
/// Every operation must be atomic with respect to concurrent readers.
pub trait FlagStore {
    /// Returns the current bits.
    fn load(&self) -> u32;

    /// Sets `bits` and returns the value after the update.
    fn set_bits(&self, bits: u32) -> u32;

    /// Clears `bits` and returns the value after the update.
    fn clear_bits(&self, bits: u32) -> u32;

    /// Atomically checks that every bit of `bits` is set, clearing them when
    /// `clear` is true and the check succeeded. Returns the bits observed
    /// before any clearing.
    fn test_and_clear(&self, bits: u32, clear: bool) -> u32;
}

/// Store that can block the calling thread until bits appear.
pub trait WaitableFlagStore: FlagStore {
    /// Blocks until the condition described by `options` holds for `bits` or
    /// the timeout elapses. `None` (or a zero duration) waits forever.
    ///
    /// Returns the requested bits that were set when the wait finished.
    fn wait_bits(&self, bits: u32, options: WaitOptions, timeout: Option<Duration>) -> u32;
}

/// Lock-free store backed by a single atomic word.
#[derive(Debug, Default)]
pub struct AtomicFlagStore {
    bits: AtomicU32,
}

impl AtomicFlagStore {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }
}

impl FlagStore for AtomicFlagStore {
    fn load(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }

    fn set_bits(&self, bits: u32) -> u32 {
        self.bits.fetch_or(bits, Ordering::AcqRel) | bits
    }

    fn clear_bits(&self, bits: u32) -> u32 {
        self.bits.fetch_and(!bits, Ordering::AcqRel) & !bits
    }

    fn test_and_clear(&self, bits: u32, clear: bool) -> u32 {
        if !clear {
            return self.load();
        }

        let result = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current & bits == bits).then_some(current & !bits)
            });

        match result {
            Ok(previous) | Err(previous) => previous,
        }
    }
}

/// Options accepted by [`Registry::wait_for`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WaitOptions {
    /// Clear the satisfied bits before returning.
    pub clear_on_exit: bool,
    /// Require every requested bit instead of any of them.
    pub require_all: bool,
}

impl WaitOptions {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            clear_on_exit: false,
            require_all: true,
        }
    }

    #[must_use]
    pub const fn any() -> Self {
        Self {
            clear_on_exit: false,
            require_all: false,
        }
    }

    #[must_use]
    pub const fn clearing(self) -> Self {
        Self {
            clear_on_exit: true,
            ..self
        }
    }

    /// Returns `true` when `current` satisfies a wait on `requested`.
    #[must_use]
    pub const fn satisfied(self, current: u32, requested: u32) -> bool {
        if self.require_all {
            current & requested == requested
        } else {
            current & requested != 0
        }
    }
}

/// Mutation that failed its post-condition check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    Set,
    Clear,
}

/// Raised when bits did not reach the requested value after a mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsistencyError {
    pub space: &'static str,
    pub mutation: Mutation,
    pub requested: u32,
    pub observed: u32,
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.mutation {
            Mutation::Set => "set",
            Mutation::Clear => "clear",
        };
        write!(
            f,
            "failed to {verb} {} bits {:#010x} (observed {:#010x})",
            self.space, self.requested, self.observed
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConsistencyError {}

/// One flag space with typed operations.
pub struct Registry<F, S = AtomicFlagStore> {
    store: S,
    space: PhantomData<F>,
}

impl<F, S> Registry<F, S> {
    #[must_use]
    pub const fn with_store(store: S) -> Self {
        Self {
            store,
            space: PhantomData,
        }
    }

    /// Returns the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<F: Flag> Registry<F, AtomicFlagStore> {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_store(AtomicFlagStore::new())
    }
}

impl<F: Flag> Default for Registry<F, AtomicFlagStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F, S> Registry<F, S>
where
    F: Flag,
    S: FlagStore,
{
    #[must_use]
    pub fn get(&self) -> FlagSet<F> {
        FlagSet::from_bits(self.store.load())
    }

    /// Returns `true` when every flag of `mask` is set. With `clear_on_exit`
    /// the flags are consumed by the same atomic operation.
    pub fn check(&self, mask: impl Into<FlagSet<F>>, clear_on_exit: bool) -> bool {
        let mask = mask.into().bits();
        let observed = self.store.test_and_clear(mask, clear_on_exit);
        observed & mask == mask
    }

    /// Sets the flags of `mask`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsistencyError`] when the bits are not all set afterwards.
    pub fn set(&self, mask: impl Into<FlagSet<F>>) -> Result<FlagSet<F>, ConsistencyError> {
        let mask = mask.into().bits();
        let observed = self.store.set_bits(mask);
        if observed & mask == mask {
            Ok(FlagSet::from_bits(observed))
        } else {
            Err(ConsistencyError {
                space: F::SPACE,
                mutation: Mutation::Set,
                requested: mask,
                observed,
            })
        }
    }

    /// Clears the flags of `mask`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsistencyError`] when any bit is still set afterwards.
    pub fn clear(&self, mask: impl Into<FlagSet<F>>) -> Result<FlagSet<F>, ConsistencyError> {
        let mask = mask.into().bits();
        let observed = self.store.clear_bits(mask);
        if observed & mask == 0 {
            Ok(FlagSet::from_bits(observed))
        } else {
            Err(ConsistencyError {
                space: F::SPACE,
                mutation: Mutation::Clear,
                requested: mask,
                observed,
            })
        }
    }

    /// Sets or clears `mask` depending on `active`.
    ///
    /// # Errors
    ///
    /// Propagates [`ConsistencyError`] from [`Registry::set`] / [`Registry::clear`].
    pub fn assign(
        &self,
        mask: impl Into<FlagSet<F>>,
        active: bool,
    ) -> Result<FlagSet<F>, ConsistencyError> {
        if active {
            self.set(mask)
        } else {
            self.clear(mask)
        }
    }
}

impl<F, S> Registry<F, S>
where
    F: Flag,
    S: WaitableFlagStore,
{
    /// Blocks until `mask` is observed, honouring `options`, or the timeout
    /// elapses. A `None` or zero timeout waits indefinitely.
    ///
    /// Returns the requested flags that were set. On timeout nothing is
    /// cleared, and the result holds whatever subset happened to be set.
    pub fn wait_for(
        &self,
        mask: impl Into<FlagSet<F>>,
        options: WaitOptions,
        timeout: Option<Duration>,
    ) -> FlagSet<F> {
        let mask = mask.into().bits();
        let timeout = timeout.filter(|duration| !duration.is_zero());
        FlagSet::from_bits(self.store.wait_bits(mask, options, timeout))
    }
}

/// Copy of both registries taken at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub states: StateSet,
    pub errors: ErrorSet,
}

impl RegistrySnapshot {
    #[must_use]
    pub const fn new(states: StateSet, errors: ErrorSet) -> Self {
        Self { states, errors }
    }

    #[must_use]
    pub fn state(&self, flag: StateFlag) -> bool {
        self.states.has(flag)
    }

    #[must_use]
    pub fn error(&self, flag: ErrorFlag) -> bool {
        self.errors.has(flag)
    }
}

/// Subscriber notified after each successful registry mutation.
pub trait RegistryObserver {
    fn registry_changed(&self, snapshot: RegistrySnapshot);
}

/// Observer that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl RegistryObserver for NoopObserver {
    fn registry_changed(&self, _snapshot: RegistrySnapshot) {}
}

impl<T: RegistryObserver + ?Sized> RegistryObserver for &T {
    fn registry_changed(&self, snapshot: RegistrySnapshot) {
        (**self).registry_changed(snapshot);
    }
}

/// The device-wide state and error registries.
pub struct Registries<S = AtomicFlagStore, O = NoopObserver> {
    states: Registry<StateFlag, S>,
    errors: Registry<ErrorFlag, S>,
    observer: O,
}

impl<O> Registries<AtomicFlagStore, O> {
    /// Builds lock-free registries; usable in `static` items.
    #[must_use]
    pub const fn new(observer: O) -> Self {
        Self::with_stores(AtomicFlagStore::new(), AtomicFlagStore::new(), observer)
    }
}

impl<S, O> Registries<S, O> {
    #[must_use]
    pub const fn with_stores(states: S, errors: S, observer: O) -> Self {
        Self {
            states: Registry::with_store(states),
            errors: Registry::with_store(errors),
            observer,
        }
    }

    /// Read access to the state registry (including blocking waits).
    pub fn states(&self) -> &Registry<StateFlag, S> {
        &self.states
    }

    /// Read access to the error registry (including blocking waits).
    pub fn errors(&self) -> &Registry<ErrorFlag, S> {
        &self.errors
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }
}

impl<S, O> Registries<S, O>
where
    S: FlagStore,
    O: RegistryObserver,
{
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::new(self.states.get(), self.errors.get())
    }

    /// Sets state flags and notifies the observer.
    ///
    /// # Errors
    ///
    /// Returns [`ConsistencyError`] when the flags did not end up set.
    pub fn set_states(&self, mask: impl Into<StateSet>) -> Result<(), ConsistencyError> {
        self.states.set(mask)?;
        self.notify();
        Ok(())
    }

    /// Clears state flags and notifies the observer.
    ///
    /// # Errors
    ///
    /// Returns [`ConsistencyError`] when a flag is still set afterwards.
    pub fn clear_states(&self, mask: impl Into<StateSet>) -> Result<(), ConsistencyError> {
        self.states.clear(mask)?;
        self.notify();
        Ok(())
    }

    /// Sets or clears state flags and notifies the observer.
    ///
    /// # Errors
    ///
    /// Returns [`ConsistencyError`] when the flags did not reach `active`.
    pub fn assign_states(
        &self,
        mask: impl Into<StateSet>,
        active: bool,
    ) -> Result<(), ConsistencyError> {
        self.states.assign(mask, active)?;
        self.notify();
        Ok(())
    }

    /// Sets error flags and notifies the observer.
    ///
    /// # Errors
    ///
    /// Returns [`ConsistencyError`] when the flags did not end up set.
    pub fn set_errors(&self, mask: impl Into<ErrorSet>) -> Result<(), ConsistencyError> {
        self.errors.set(mask)?;
        self.notify();
        Ok(())
    }

    /// Clears error flags and notifies the observer.
    ///
    /// # Errors
    ///
    /// Returns [`ConsistencyError`] when a flag is still set afterwards.
    pub fn clear_errors(&self, mask: impl Into<ErrorSet>) -> Result<(), ConsistencyError> {
        self.errors.clear(mask)?;
        self.notify();
        Ok(())
    }

    /// Sets or clears error flags and notifies the observer.
    ///
    /// # Errors
    ///
    /// Returns [`ConsistencyError`] when the flags did not reach `active`.
    pub fn assign_errors(
        &self,
        mask: impl Into<ErrorSet>,
        active: bool,
    ) -> Result<(), ConsistencyError> {
        self.errors.assign(mask, active)?;
        self.notify();
        Ok(())
    }

    /// Consumes state flags when all of them are set; notifies on success.
    pub fn take_states(&self, mask: impl Into<StateSet>) -> bool {
        let taken = self.states.check(mask, true);
        if taken {
            self.notify();
        }
        taken
    }

    fn notify(&self) {
        self.observer.registry_changed(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::flags::{ErrorFlag, StateFlag};

    #[derive(Default)]
    struct CountingObserver {
        calls: Cell<u32>,
        last: Cell<RegistrySnapshot>,
    }

    impl RegistryObserver for CountingObserver {
        fn registry_changed(&self, snapshot: RegistrySnapshot) {
            self.calls.set(self.calls.get() + 1);
            self.last.set(snapshot);
        }
    }

    #[test]
    fn check_requires_every_bit() {
        let registry: Registry<StateFlag> = Registry::new();
        registry.set(StateFlag::WifiConnected).expect("set");

        assert!(registry.check(StateFlag::WifiConnected, false));
        assert!(!registry.check(StateFlag::WifiConnected | StateFlag::InetAvailable, false));
    }

    #[test]
    fn check_with_clear_consumes_only_on_success() {
        let registry: Registry<StateFlag> = Registry::new();
        registry.set(StateFlag::RtcEnabled).expect("set");

        assert!(!registry.check(StateFlag::RtcEnabled | StateFlag::SntpSynced, true));
        assert!(registry.get().has(StateFlag::RtcEnabled));

        assert!(registry.check(StateFlag::RtcEnabled, true));
        assert!(registry.get().is_empty());
    }

    #[test]
    fn set_and_clear_are_idempotent() {
        let registry: Registry<ErrorFlag> = Registry::new();
        registry.set(ErrorFlag::Mqtt).expect("first set");
        registry.set(ErrorFlag::Mqtt).expect("second set");
        assert_eq!(registry.get(), ErrorSet::from(ErrorFlag::Mqtt));

        registry.clear(ErrorFlag::Mqtt).expect("first clear");
        registry.clear(ErrorFlag::Mqtt).expect("second clear");
        assert!(registry.get().is_empty());
    }

    #[test]
    fn registries_notify_after_each_successful_mutation() {
        let observer = CountingObserver::default();
        let registries = Registries::new(&observer);

        registries
            .set_states(StateFlag::WifiStarted | StateFlag::WifiConnected)
            .expect("set states");
        registries.set_errors(ErrorFlag::Heap).expect("set errors");
        registries
            .clear_states(StateFlag::WifiConnected)
            .expect("clear states");

        assert_eq!(observer.calls.get(), 3);
        let last = observer.last.get();
        assert!(last.state(StateFlag::WifiStarted));
        assert!(!last.state(StateFlag::WifiConnected));
        assert!(last.error(ErrorFlag::Heap));
    }

    #[test]
    fn take_states_notifies_only_when_consumed() {
        let observer = CountingObserver::default();
        let registries = Registries::new(&observer);

        assert!(!registries.take_states(StateFlag::Ota));
        assert_eq!(observer.calls.get(), 0);

        registries.set_states(StateFlag::Ota).expect("set");
        assert!(registries.take_states(StateFlag::Ota));
        assert_eq!(observer.calls.get(), 2);
        assert!(!registries.snapshot().state(StateFlag::Ota));
    }

    #[test]
    fn wait_options_any_and_all() {
        let requested = 0b0110;
        assert!(WaitOptions::any().satisfied(0b0010, requested));
        assert!(!WaitOptions::all().satisfied(0b0010, requested));
        assert!(WaitOptions::all().satisfied(0b1110, requested));
    }

    #[test]
    fn consistency_error_renders_space_and_bits() {
        let error = ConsistencyError {
            space: "states",
            mutation: Mutation::Clear,
            requested: 0x200,
            observed: 0x200,
        };
        let mut rendered = heapless::String::<96>::new();
        core::fmt::write(&mut rendered, format_args!("{error}")).expect("fits");
        assert_eq!(
            rendered.as_str(),
            "failed to clear states bits 0x00000200 (observed 0x00000200)"
        );
    }
}

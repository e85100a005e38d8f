//! Named state and error flags plus the typed bit set that carries them.
//!
//! States and errors live in two disjoint 32-bit spaces so "a fault is active"
//! and "a feature is on" can never collide. Bit positions are stable for the
//! life of the process; composite masks are derived from primitive flags and
//! never stored on their own.

use core::fmt;
use core::marker::PhantomData;
use core::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Behaviour shared by [`StateFlag`] and [`ErrorFlag`].
pub trait Flag: Copy + Eq + 'static {
    /// Every flag of this space, in ascending bit order.
    const ALL: &'static [Self];

    /// Registry label used in logs.
    const SPACE: &'static str;

    /// Single-bit mask for the flag.
    fn mask(self) -> u32;

    /// Stable snake-case name (matches the JSON status field).
    fn name(self) -> &'static str;
}

/// Operational state bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateFlag {
    Ota,
    Started,
    RtcEnabled,
    SntpSynced,
    SilentMode,
    WifiStarted,
    WifiConnected,
    InetAvailable,
    InetSlowdown,
    Mqtt1Enabled,
    Mqtt2Enabled,
    MqttConnected,
    MqttPrimary,
    MqttLocal,
}

impl StateFlag {
    /// Bit position inside the state space.
    #[must_use]
    pub const fn bit(self) -> u32 {
        match self {
            StateFlag::Ota => 0,
            StateFlag::Started => 1,
            StateFlag::RtcEnabled => 4,
            StateFlag::SntpSynced => 5,
            StateFlag::SilentMode => 6,
            StateFlag::WifiStarted => 8,
            StateFlag::WifiConnected => 9,
            StateFlag::InetAvailable => 12,
            StateFlag::InetSlowdown => 13,
            StateFlag::Mqtt1Enabled => 16,
            StateFlag::Mqtt2Enabled => 17,
            StateFlag::MqttConnected => 18,
            StateFlag::MqttPrimary => 19,
            StateFlag::MqttLocal => 20,
        }
    }

    #[must_use]
    pub const fn mask(self) -> u32 {
        1 << self.bit()
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            StateFlag::Ota => "ota",
            StateFlag::Started => "started",
            StateFlag::RtcEnabled => "rtc_enabled",
            StateFlag::SntpSynced => "sntp_sync",
            StateFlag::SilentMode => "silent_mode",
            StateFlag::WifiStarted => "wifi_sta_started",
            StateFlag::WifiConnected => "wifi_sta_connected",
            StateFlag::InetAvailable => "inet_availabled",
            StateFlag::InetSlowdown => "inet_slowdown",
            StateFlag::Mqtt1Enabled => "mqtt1_enabled",
            StateFlag::Mqtt2Enabled => "mqtt2_enabled",
            StateFlag::MqttConnected => "mqtt_connected",
            StateFlag::MqttPrimary => "mqtt_primary",
            StateFlag::MqttLocal => "mqtt_local",
        }
    }

    /// Looks up a flag by its status name (case insensitive, `-` accepted for `_`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|flag| name_matches(flag.name(), name))
    }
}

impl Flag for StateFlag {
    const ALL: &'static [Self] = &[
        StateFlag::Ota,
        StateFlag::Started,
        StateFlag::RtcEnabled,
        StateFlag::SntpSynced,
        StateFlag::SilentMode,
        StateFlag::WifiStarted,
        StateFlag::WifiConnected,
        StateFlag::InetAvailable,
        StateFlag::InetSlowdown,
        StateFlag::Mqtt1Enabled,
        StateFlag::Mqtt2Enabled,
        StateFlag::MqttConnected,
        StateFlag::MqttPrimary,
        StateFlag::MqttLocal,
    ];

    const SPACE: &'static str = "states";

    fn mask(self) -> u32 {
        StateFlag::mask(self)
    }

    fn name(self) -> &'static str {
        StateFlag::name(self)
    }
}

/// Active error condition bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorFlag {
    General,
    Heap,
    Mqtt,
    Telegram,
    Smtp,
    Site,
    ThingSpeak,
    OpenMon,
    NarodMon,
    Sensor0,
    Sensor1,
    Sensor2,
    Sensor3,
    Sensor4,
    Sensor5,
    Sensor6,
    Sensor7,
}

/// Number of individually addressable sensor error bits.
pub const SENSOR_SLOTS: u8 = 8;

impl ErrorFlag {
    #[must_use]
    pub const fn bit(self) -> u32 {
        match self {
            ErrorFlag::General => 0,
            ErrorFlag::Heap => 1,
            ErrorFlag::Mqtt => 2,
            ErrorFlag::Telegram => 3,
            ErrorFlag::Smtp => 4,
            ErrorFlag::Site => 5,
            ErrorFlag::ThingSpeak => 6,
            ErrorFlag::OpenMon => 7,
            ErrorFlag::NarodMon => 8,
            ErrorFlag::Sensor0 => 16,
            ErrorFlag::Sensor1 => 17,
            ErrorFlag::Sensor2 => 18,
            ErrorFlag::Sensor3 => 19,
            ErrorFlag::Sensor4 => 20,
            ErrorFlag::Sensor5 => 21,
            ErrorFlag::Sensor6 => 22,
            ErrorFlag::Sensor7 => 23,
        }
    }

    #[must_use]
    pub const fn mask(self) -> u32 {
        1 << self.bit()
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ErrorFlag::General => "general",
            ErrorFlag::Heap => "heap",
            ErrorFlag::Mqtt => "mqtt",
            ErrorFlag::Telegram => "telegram",
            ErrorFlag::Smtp => "smtp",
            ErrorFlag::Site => "site",
            ErrorFlag::ThingSpeak => "thingspeak",
            ErrorFlag::OpenMon => "openmon",
            ErrorFlag::NarodMon => "narodmon",
            ErrorFlag::Sensor0 => "sensor0",
            ErrorFlag::Sensor1 => "sensor1",
            ErrorFlag::Sensor2 => "sensor2",
            ErrorFlag::Sensor3 => "sensor3",
            ErrorFlag::Sensor4 => "sensor4",
            ErrorFlag::Sensor5 => "sensor5",
            ErrorFlag::Sensor6 => "sensor6",
            ErrorFlag::Sensor7 => "sensor7",
        }
    }

    /// Maps a sensor identifier onto its error bit.
    ///
    /// Identifiers 1..=7 own a dedicated bit. Everything else, including 0,
    /// shares the `sensor0` bit.
    #[must_use]
    pub const fn sensor(id: u8) -> Self {
        match id {
            1 => ErrorFlag::Sensor1,
            2 => ErrorFlag::Sensor2,
            3 => ErrorFlag::Sensor3,
            4 => ErrorFlag::Sensor4,
            5 => ErrorFlag::Sensor5,
            6 => ErrorFlag::Sensor6,
            7 => ErrorFlag::Sensor7,
            _ => ErrorFlag::Sensor0,
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|flag| name_matches(flag.name(), name))
    }
}

impl Flag for ErrorFlag {
    const ALL: &'static [Self] = &[
        ErrorFlag::General,
        ErrorFlag::Heap,
        ErrorFlag::Mqtt,
        ErrorFlag::Telegram,
        ErrorFlag::Smtp,
        ErrorFlag::Site,
        ErrorFlag::ThingSpeak,
        ErrorFlag::OpenMon,
        ErrorFlag::NarodMon,
        ErrorFlag::Sensor0,
        ErrorFlag::Sensor1,
        ErrorFlag::Sensor2,
        ErrorFlag::Sensor3,
        ErrorFlag::Sensor4,
        ErrorFlag::Sensor5,
        ErrorFlag::Sensor6,
        ErrorFlag::Sensor7,
    ];

    const SPACE: &'static str = "errors";

    fn mask(self) -> u32 {
        ErrorFlag::mask(self)
    }

    fn name(self) -> &'static str {
        ErrorFlag::name(self)
    }
}

fn name_matches(canonical: &str, candidate: &str) -> bool {
    canonical.len() == candidate.len()
        && canonical
            .bytes()
            .zip(candidate.bytes())
            .all(|(left, right)| {
                let right = if right == b'-' { b'_' } else { right };
                left == right.to_ascii_lowercase()
            })
}

/// Typed set of flags from a single space.
pub struct FlagSet<F> {
    bits: u32,
    space: PhantomData<F>,
}

/// Set of [`StateFlag`]s.
pub type StateSet = FlagSet<StateFlag>;
/// Set of [`ErrorFlag`]s.
pub type ErrorSet = FlagSet<ErrorFlag>;

impl<F> FlagSet<F> {
    #[must_use]
    pub const fn empty() -> Self {
        Self::from_bits(0)
    }

    /// Wraps raw bits. Bits that do not belong to a named flag are kept.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            bits,
            space: PhantomData,
        }
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.bits
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Returns `true` when every flag of `other` is present.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    /// Returns `true` when at least one flag of `other` is present.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.bits & other.bits != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self::from_bits(self.bits | other.bits)
    }

    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self::from_bits(self.bits & other.bits)
    }

    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self::from_bits(self.bits & !other.bits)
    }
}

impl<F: Flag> FlagSet<F> {
    #[must_use]
    pub fn of(flags: &[F]) -> Self {
        flags
            .iter()
            .fold(Self::empty(), |set, flag| set.with(*flag))
    }

    #[must_use]
    pub fn with(self, flag: F) -> Self {
        Self::from_bits(self.bits | flag.mask())
    }

    #[must_use]
    pub fn has(self, flag: F) -> bool {
        self.bits & flag.mask() != 0
    }

    /// Iterates the named flags present in the set.
    pub fn iter(self) -> impl Iterator<Item = F> {
        F::ALL.iter().copied().filter(move |flag| self.has(*flag))
    }
}

impl<F> Clone for FlagSet<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for FlagSet<F> {}

impl<F> PartialEq for FlagSet<F> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<F> Eq for FlagSet<F> {}

impl<F> Default for FlagSet<F> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<F: Flag> From<F> for FlagSet<F> {
    fn from(flag: F) -> Self {
        Self::from_bits(flag.mask())
    }
}

impl<F> BitOr for FlagSet<F> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl<F> BitOrAssign for FlagSet<F> {
    fn bitor_assign(&mut self, rhs: Self) {
        self.bits |= rhs.bits;
    }
}

impl<F> BitAnd for FlagSet<F> {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl<F> Not for FlagSet<F> {
    type Output = Self;

    fn not(self) -> Self {
        Self::from_bits(!self.bits)
    }
}

impl BitOr for StateFlag {
    type Output = StateSet;

    fn bitor(self, rhs: Self) -> StateSet {
        StateSet::from(self).with(rhs)
    }
}

impl BitOr for ErrorFlag {
    type Output = ErrorSet;

    fn bitor(self, rhs: Self) -> ErrorSet {
        ErrorSet::from(self).with(rhs)
    }
}

impl<F: Flag> fmt::Debug for FlagSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#010x})", F::SPACE, self.bits)
    }
}

impl<F: Flag> fmt::Display for FlagSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for flag in self.iter() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(flag.name())?;
            first = false;
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Either time source confirms the wall clock.
pub const TIME_VALID: StateSet =
    StateSet::from_bits(StateFlag::RtcEnabled.mask() | StateFlag::SntpSynced.mask());

/// Bits invalidated whenever the station link is renegotiated or lost.
pub const LINK_DEPENDENT: StateSet = StateSet::from_bits(
    StateFlag::WifiConnected.mask()
        | StateFlag::InetAvailable.mask()
        | StateFlag::InetSlowdown.mask()
        | StateFlag::MqttConnected.mask(),
);

/// Reachability bits.
pub const REACHABILITY: StateSet =
    StateSet::from_bits(StateFlag::InetAvailable.mask() | StateFlag::InetSlowdown.mask());

/// Notification channel errors.
pub const NOTIFY_ERRORS: ErrorSet =
    ErrorSet::from_bits(ErrorFlag::Telegram.mask() | ErrorFlag::Smtp.mask());

/// Publish target errors.
pub const PUBLISH_ERRORS: ErrorSet = ErrorSet::from_bits(
    ErrorFlag::Site.mask()
        | ErrorFlag::ThingSpeak.mask()
        | ErrorFlag::OpenMon.mask()
        | ErrorFlag::NarodMon.mask(),
);

/// Per-sensor error bits.
pub const SENSOR_ERRORS: ErrorSet = ErrorSet::from_bits(0x00FF_0000);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_ids_beyond_range_collapse_onto_slot_zero() {
        assert_eq!(ErrorFlag::sensor(3), ErrorFlag::Sensor3);
        assert_eq!(ErrorFlag::sensor(0), ErrorFlag::Sensor0);
        assert_eq!(ErrorFlag::sensor(8), ErrorFlag::Sensor0);
        assert_eq!(ErrorFlag::sensor(200), ErrorFlag::Sensor0);
    }

    #[test]
    fn sensor_mask_covers_every_sensor_bit() {
        let all = (0..SENSOR_SLOTS).fold(ErrorSet::empty(), |set, id| {
            set.with(ErrorFlag::sensor(id))
        });
        assert_eq!(all, SENSOR_ERRORS);
    }

    #[test]
    fn state_and_error_bits_are_unique() {
        let mut seen = 0u32;
        for flag in StateFlag::ALL {
            assert_eq!(seen & flag.mask(), 0, "duplicate bit for {flag:?}");
            seen |= flag.mask();
        }

        let mut seen = 0u32;
        for flag in ErrorFlag::ALL {
            assert_eq!(seen & flag.mask(), 0, "duplicate bit for {flag:?}");
            seen |= flag.mask();
        }
    }

    #[test]
    fn names_resolve_with_dashes() {
        assert_eq!(
            StateFlag::from_name("wifi-sta-connected"),
            Some(StateFlag::WifiConnected)
        );
        assert_eq!(StateFlag::from_name("MQTT_CONNECTED"), Some(StateFlag::MqttConnected));
        assert_eq!(ErrorFlag::from_name("sensor3"), Some(ErrorFlag::Sensor3));
        assert_eq!(StateFlag::from_name("bogus"), None);
    }

    #[test]
    fn display_lists_named_flags() {
        let set = StateFlag::WifiConnected | StateFlag::InetAvailable;
        let mut rendered = heapless::String::<64>::new();
        core::fmt::write(&mut rendered, format_args!("{set}")).expect("fits");
        assert_eq!(rendered.as_str(), "wifi_sta_connected|inet_availabled");
    }
}

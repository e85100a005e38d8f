use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use health_core::config::HealthConfig;
use health_core::indicator::{IndicatorObserver, IndicatorPatterns};
use health_core::registry::{AtomicFlagStore, Registries};
use health_core::service::HealthService;

use crate::boot;
use crate::events::EventQueue;
use crate::indicator::{LedQueue, QueuedIndicator};
use crate::platform::{BoardSystem, FirmwareClock, LogAlertSink};
use crate::watch::{ChangeSignal, WatchedObserver};

mod dispatcher_task;
mod led_task;
mod startup_task;
mod tick_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) type FirmwareObserver = WatchedObserver<IndicatorObserver<QueuedIndicator>>;

pub(super) type FirmwareService = HealthService<
    'static,
    AtomicFlagStore,
    FirmwareObserver,
    FirmwareClock,
    LogAlertSink,
    BoardSystem,
>;

pub(super) static EVENT_QUEUE: EventQueue = Channel::new();
pub(super) static LED_QUEUE: LedQueue = Channel::new();
pub(super) static REGISTRY_CHANGED: ChangeSignal = Signal::new();
pub(super) static REGISTRIES: Registries<AtomicFlagStore, FirmwareObserver> =
    Registries::new(WatchedObserver::new(
        IndicatorObserver::new(
            QueuedIndicator::new(&LED_QUEUE),
            IndicatorPatterns::DEFAULT,
            false,
        ),
        &REGISTRY_CHANGED,
    ));

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let boot_cause = boot::take_boot_cause();
    let config = hal::Config::default();
    let hal::Peripherals { PA5, .. } = hal::init(config);

    let led = Output::new(PA5, Level::Low, Speed::Low);

    let service = HealthService::new(
        &REGISTRIES,
        HealthConfig::DEFAULT,
        FirmwareClock::new(0),
        LogAlertSink::new(),
        BoardSystem::new(boot_cause),
    )
    .expect("default health configuration");

    spawner
        .spawn(dispatcher_task::run(service))
        .expect("failed to spawn health dispatcher task");

    spawner
        .spawn(led_task::run(led))
        .expect("failed to spawn LED task");

    spawner
        .spawn(tick_task::run())
        .expect("failed to spawn minute tick task");

    spawner
        .spawn(startup_task::run())
        .expect("failed to spawn startup watch task");

    core::future::pending::<()>().await;
}

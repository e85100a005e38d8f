use embassy_time::Duration;
use health_core::flags::StateFlag;

use super::{REGISTRIES, REGISTRY_CHANGED};
use crate::watch::wait_for_states;

const REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Logs the registry state every minute until the device reports started.
#[embassy_executor::task]
pub async fn run() {
    let mut minutes: u32 = 0;
    while !wait_for_states(
        &REGISTRIES,
        &REGISTRY_CHANGED,
        StateFlag::Started.into(),
        REPORT_INTERVAL,
    )
    .await
    {
        minutes = minutes.saturating_add(1);
        defmt::info!(
            "startup: waiting {} min, states {}",
            minutes,
            defmt::Display2Format(&REGISTRIES.states().get())
        );
    }
    defmt::info!("startup: system started");
}

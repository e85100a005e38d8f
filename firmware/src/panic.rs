use core::panic::PanicInfo;

use health_core::system::BootCause;

use crate::boot;

/// Logs the panic and resets; the next boot reports the restart.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    defmt::error!("panic: {}", defmt::Display2Format(info));
    boot::mark_next_boot(BootCause::Panic);
    cortex_m::peripheral::SCB::sys_reset();
}

//! Language items and default exception handlers

// When defmt feature is enabled on ARM targets, use defmt_rtt and panic_probe
#[cfg(all(feature = "defmt", target_arch = "arm"))]
use defmt_rtt as _;

#[cfg(all(feature = "defmt", target_arch = "arm"))]
use panic_probe as _;

// Defmt panic handler
#[cfg(all(feature = "defmt", target_arch = "arm"))]
#[defmt::panic_handler]
fn defmt_panic() -> ! {
    cortex_m::asm::udf()
}

// Panic handler when defmt is disabled
#[cfg(all(not(feature = "defmt"), target_arch = "arm"))]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {
        cortex_m::asm::udf();
    }
}

// Faults end in the kernel halt so that the reason is recorded.
#[cfg(target_arch = "arm")]
#[cortex_m_rt::exception]
unsafe fn HardFault(_ef: &cortex_m_rt::ExceptionFrame) -> ! {
    crate::kernel::sys().halt(crate::error::HaltReason::Fault)
}

// Defmt timestamp, in system ticks
#[cfg(all(feature = "defmt", target_arch = "arm"))]
defmt::timestamp!("{=u32}", crate::kernel::sys().vt_get_system_time_x() as u32);

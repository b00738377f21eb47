//! Blink Example - LED blinking on STM32F401 (PA5)

#![no_std]
#![no_main]

use core::ptr;

use cortex_m_rt::entry;
use nil::{sys, ThreadDescriptor, WorkingArea};
use stm32_metapac as pac;

// ============ Thread Storage ============

static WA_BLINK: WorkingArea<512> = WorkingArea::new();
static WA_HEARTBEAT: WorkingArea<512> = WorkingArea::new();

static THREADS: [ThreadDescriptor; 2] = [
    ThreadDescriptor::new("blink", &WA_BLINK, 0, blink_thread, ptr::null_mut()),
    ThreadDescriptor::new("heartbeat", &WA_HEARTBEAT, 1, heartbeat_thread, ptr::null_mut()),
];

// ============ LED Control ============

fn led_init() {
    pac::RCC.ahb1enr().modify(|w| w.set_gpioaen(true));
    pac::GPIOA.moder().modify(|w| w.set_moder(5, pac::gpio::vals::Moder::OUTPUT));
    pac::GPIOA.otyper().modify(|w| w.set_ot(5, pac::gpio::vals::Ot::PUSHPULL));
}

fn led_on() {
    pac::GPIOA.bsrr().write(|w| w.set_bs(5, true));
}

fn led_off() {
    pac::GPIOA.bsrr().write(|w| w.set_br(5, true));
}

// ============ Threads ============

fn blink_thread(_: *mut ()) {
    nil::info!("blink thread started");
    loop {
        led_on();
        sys().thd_sleep_milliseconds(500);
        led_off();
        sys().thd_sleep_milliseconds(500);
    }
}

fn heartbeat_thread(_: *mut ()) {
    // Absolute deadlines, no drift.
    let mut next = sys().vt_get_system_time_x();
    loop {
        next = nil::time::time_add_x(next, nil::time::time_s2i(1));
        sys().thd_sleep_until(next);
        nil::info!("heartbeat at {=u32}", sys().vt_get_system_time_x() as u32);
    }
}

// ============ Main ============

#[entry]
fn main() -> ! {
    led_init();
    nil::info!("Starting Nil");
    nil::start(&THREADS)
}

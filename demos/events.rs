//! Event flags example
//!
//! A ticker thread broadcasts on an event source, with flags telling slow
//! ticks from fast ones. A worker listens for the slow ones only, and also
//! receives direct signals from a second thread.

#![no_std]
#![no_main]

use core::ptr;

use cortex_m_rt::entry;
use nil::event::EvHandler;
use nil::{
    event_mask, sys, EventId, EventListener, EventSource, ThreadDescriptor, ThreadId,
    WorkingArea, ALL_EVENTS,
};

const EVT_TICK: EventId = 0;
const EVT_POKE: EventId = 1;

const FLAG_FAST: u32 = 1 << 0;
const FLAG_SLOW: u32 = 1 << 1;

static TICKS: EventSource = EventSource::new();
static LISTENER: EventListener = EventListener::new();

static WA_WORKER: WorkingArea<1024> = WorkingArea::new();
static WA_TICKER: WorkingArea<512> = WorkingArea::new();
static WA_POKER: WorkingArea<512> = WorkingArea::new();

static THREADS: [ThreadDescriptor; 3] = [
    ThreadDescriptor::new("worker", &WA_WORKER, 0, worker_thread, ptr::null_mut()),
    ThreadDescriptor::new("ticker", &WA_TICKER, 1, ticker_thread, ptr::null_mut()),
    ThreadDescriptor::new("poker", &WA_POKER, 2, poker_thread, ptr::null_mut()),
];

fn on_tick(_: EventId) {
    nil::info!("[W] slow tick");
}

fn on_poke(_: EventId) {
    nil::info!("[W] poked");
}

static HANDLERS: [Option<EvHandler>; 2] = [Some(on_tick), Some(on_poke)];

fn worker_thread(_: *mut ()) {
    sys().evt_register_mask_with_flags(&TICKS, &LISTENER, event_mask(EVT_TICK), FLAG_SLOW);
    loop {
        let events = sys().evt_wait_any(ALL_EVENTS);
        if events & event_mask(EVT_TICK) != 0 {
            let flags = sys().evt_get_and_clear_flags(&LISTENER);
            nil::debug!("[W] flags seen {=u32:#x}", flags);
        }
        sys().evt_dispatch(&HANDLERS, events);
    }
}

fn ticker_thread(_: *mut ()) {
    let mut n: u32 = 0;
    loop {
        sys().thd_sleep_milliseconds(100);
        n += 1;
        let flags = if n % 10 == 0 { FLAG_SLOW } else { FLAG_FAST };
        sys().evt_broadcast_flags(&TICKS, flags);
    }
}

fn poker_thread(_: *mut ()) {
    loop {
        sys().thd_sleep_milliseconds(1500);
        sys().evt_signal(ThreadId::from_prio(0), event_mask(EVT_POKE));
    }
}

#[entry]
fn main() -> ! {
    nil::info!("Events Demo");
    nil::start(&THREADS)
}

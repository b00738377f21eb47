//! Producer-Consumer example with semaphores

#![no_std]
#![no_main]

use core::ptr;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use nil::{sys, Semaphore, ThreadDescriptor, WorkingArea, MSG_OK, MSG_TIMEOUT};

static PRODUCED: AtomicU32 = AtomicU32::new(0);
static CONSUMED: AtomicU32 = AtomicU32::new(0);

static SEM: Semaphore = Semaphore::new(0);

static WA_PRODUCER: WorkingArea<1024> = WorkingArea::new();
static WA_CONSUMER: WorkingArea<1024> = WorkingArea::new();

static THREADS: [ThreadDescriptor; 2] = [
    ThreadDescriptor::new("C", &WA_CONSUMER, 1, consumer_thread, ptr::null_mut()),
    ThreadDescriptor::new("P", &WA_PRODUCER, 2, producer_thread, ptr::null_mut()),
];

fn producer_thread(_: *mut ()) {
    loop {
        let n = PRODUCED.fetch_add(1, Ordering::Relaxed) + 1;
        sys().sem_signal(&SEM);
        nil::info!("[P] produced #{}", n);
        sys().thd_sleep_milliseconds(200);
    }
}

fn consumer_thread(_: *mut ()) {
    loop {
        match sys().sem_wait_timeout(&SEM, nil::time::time_ms2i(500)) {
            MSG_OK => {
                let n = CONSUMED.fetch_add(1, Ordering::Relaxed) + 1;
                nil::info!("[C] consumed #{}", n);
            }
            MSG_TIMEOUT => nil::warn!("[C] nothing produced"),
            _ => {}
        }
    }
}

#[entry]
fn main() -> ! {
    nil::info!("Producer-Consumer Demo");
    nil::start(&THREADS)
}

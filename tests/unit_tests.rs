//! Unit tests for the kernel
//!
//! These tests run on the host over the stub port. The stub `switch` returns
//! at once, so after a blocking call the code keeps running as the thread
//! that was switched in.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use nil::port::stub::StubPort;
use nil::{
    Interval, Prio, System, ThreadDescriptor, ThreadId, ThreadState, WorkingArea, MSG_OK,
    MSG_TIMEOUT,
};

type Sys = System<StubPort, 8>;

fn thread_main(_: *mut ()) {}

fn tid(prio: Prio) -> ThreadId {
    ThreadId::from_prio(prio)
}

fn working_area() -> &'static WorkingArea<256> {
    Box::leak(Box::new(WorkingArea::new()))
}

fn descriptor(name: &'static str, prio: Prio) -> ThreadDescriptor {
    ThreadDescriptor::new(name, working_area(), prio, thread_main, ptr::null_mut())
}

fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// Starts a system with one thread per priority in `prios`.
fn boot_with<const D: Interval>(prios: &[Prio]) -> System<StubPort<D>, 8> {
    let mut sys = System::new(StubPort::new());
    let tds: Vec<ThreadDescriptor> = prios.iter().map(|&p| descriptor("t", p)).collect();
    sys.sys_init(&tds);
    sys
}

fn boot(prios: &[Prio]) -> Sys {
    boot_with::<0>(prios)
}

/// One system timer interrupt, including the preemption on its way out.
fn tick<const D: Interval>(sys: &mut System<StubPort<D>, 8>) {
    sys.irq_prologue();
    sys.lock_from_isr();
    sys.timer_handler_i();
    sys.unlock_from_isr();
    sys.irq_epilogue();
    if sys.port().preemption_pending() {
        sys.switch_from_isr();
    }
}

fn ticks<const D: Interval>(sys: &mut System<StubPort<D>, 8>, n: usize) {
    for _ in 0..n {
        tick(sys);
    }
}

/// Moves the free running timer to the pending alarm and serves it.
fn fire_alarm<const D: Interval>(sys: &mut System<StubPort<D>, 8>) {
    let alarm = sys.port().alarm().expect("alarm armed");
    let now = sys.port().now();
    sys.port_mut().advance(alarm.wrapping_sub(now));
    tick(sys);
}

/// Highest priority ready thread, scanning the table.
fn highest_ready<const D: Interval>(sys: &System<StubPort<D>, 8>) -> ThreadId {
    (0..8)
        .map(tid)
        .find(|&t| sys.state(t).is_ready())
        .unwrap_or(System::<StubPort<D>, 8>::IDLE)
}

/// Scheduler and thread table invariants.
fn check_invariants<const D: Interval>(sys: &System<StubPort<D>, 8>) {
    assert_eq!(sys.next(), highest_ready(sys));
    assert!(sys.next() <= sys.current());
    for t in (0..8).map(tid) {
        if sys.thread(t).timeout() != 0 {
            assert!(!sys.state(t).is_ready(), "thread {:?} ready with a timeout", t);
        }
    }
}

#[cfg(test)]
mod init_tests {
    use super::*;

    #[test]
    fn test_init_runs_highest_priority() {
        let sys = boot(&[5, 2, 7]);
        assert_eq!(sys.current(), tid(2));
        assert_eq!(sys.next(), tid(2));
        assert_eq!(sys.state(Sys::IDLE), ThreadState::Ready(MSG_OK));
        assert_eq!(sys.thread(Sys::IDLE).name(), "idle");
        assert_eq!(sys.state(tid(0)), ThreadState::WtStart);
        assert!(!sys.dbg_state().is_locked());
        assert!(sys.port().irqs_on());
        check_invariants(&sys);
    }

    #[test]
    fn test_init_without_threads_stays_idle() {
        let sys = boot(&[]);
        assert_eq!(sys.current(), Sys::IDLE);
        assert_eq!(sys.port().switches, 0);
    }

    #[test]
    fn test_context_is_set_up() {
        let sys = boot(&[3]);
        let ctx = sys.thread(tid(3)).context();
        assert_eq!(ctx.entry, thread_main as usize);
        assert_eq!(ctx.wend - ctx.wbase, 256);
    }

    #[test]
    fn test_create_preempts_lower_priority_caller() {
        let mut sys = boot(&[5]);
        let t = sys.thd_create(&descriptor("worker", 1));
        assert_eq!(t, tid(1));
        assert_eq!(sys.current(), tid(1));
        assert_eq!(sys.thread(t).name(), "worker");
        assert_eq!(sys.state(tid(5)), ThreadState::Ready(MSG_OK));
        check_invariants(&sys);
    }

    #[test]
    fn test_create_i_does_not_reschedule() {
        let mut sys = boot(&[5]);
        sys.lock();
        sys.thd_create_i(&descriptor("worker", 1));
        assert!(sys.is_resc_required_i());
        assert_eq!(sys.current(), tid(5));
        sys.reschedule_s();
        sys.unlock();
        assert_eq!(sys.current(), tid(1));
    }

    #[test]
    #[should_panic(expected = "priority slot taken")]
    fn test_duplicate_priority_halts() {
        let mut sys = boot(&[3]);
        sys.thd_create(&descriptor("dup", 3));
    }

    #[test]
    #[should_panic(expected = "invalid priority")]
    fn test_create_out_of_range_priority() {
        let mut sys = boot(&[]);
        sys.thd_create(&descriptor("bad", 8));
    }

    #[test]
    #[should_panic(expected = "misaligned working area")]
    fn test_create_misaligned_working_area() {
        let mut sys = boot(&[]);
        let mut td = descriptor("bad", 2);
        td.wbase = td.wbase.wrapping_add(1);
        sys.thd_create(&td);
    }
}

#[cfg(test)]
mod sleep_tests {
    use super::*;
    use nil::time::time_ms2i;

    #[test]
    fn test_sleep_switches_to_higher_priority_ready() {
        // A (prio 5) runs while B (prio 3) is already ready.
        let mut sys = boot(&[5]);
        sys.lock();
        sys.thd_create_i(&descriptor("B", 3));
        let switches = sys.port().switches;
        sys.thd_sleep_s(time_ms2i(100));
        sys.unlock();

        assert_eq!(sys.current(), tid(3));
        assert_eq!(sys.port().switches, switches + 1);
        assert_eq!(sys.state(tid(5)), ThreadState::Sleeping);
        check_invariants(&sys);

        ticks(&mut sys, 99);
        assert_eq!(sys.state(tid(5)), ThreadState::Sleeping);
        assert_eq!(sys.thread(tid(5)).timeout(), 1);

        tick(&mut sys);
        assert_eq!(sys.state(tid(5)), ThreadState::Ready(MSG_TIMEOUT));
        assert_eq!(sys.thread(tid(5)).timeout(), 0);
        // B keeps the CPU.
        assert_eq!(sys.current(), tid(3));
        check_invariants(&sys);
    }

    #[test]
    fn test_tick_preempts_idle() {
        let mut sys = boot(&[4]);
        sys.thd_sleep(3);
        assert_eq!(sys.current(), Sys::IDLE);
        assert_eq!(sys.port().idle_enter, 1);

        ticks(&mut sys, 2);
        assert_eq!(sys.current(), Sys::IDLE);
        tick(&mut sys);
        assert_eq!(sys.current(), tid(4));
        assert_eq!(sys.port().preemption_requests, 1);
        assert!(!sys.port().preemption_pending());
        // One leave at boot, one after the wake-up.
        assert_eq!(sys.port().idle_leave, 2);
        check_invariants(&sys);
    }

    #[test]
    fn test_tick_without_wakeup_requests_nothing() {
        let mut sys = boot(&[4]);
        ticks(&mut sys, 10);
        assert_eq!(sys.port().preemption_requests, 0);
        assert_eq!(sys.vt_get_system_time_x(), 10);
        assert_eq!(sys.vt_time_elapsed_since_x(4), 6);
        assert!(sys.vt_is_system_time_within_x(5, 11));
    }

    #[test]
    fn test_sleep_until() {
        let mut sys = boot(&[2]);
        ticks(&mut sys, 5);
        sys.thd_sleep_until(12);
        assert_eq!(sys.thread(tid(2)).timeout(), 7);
        ticks(&mut sys, 7);
        assert_eq!(sys.current(), tid(2));
        assert_eq!(sys.vt_get_system_time_x(), 12);
    }

    #[test]
    fn test_sleeping_threads_wake_in_priority_order() {
        let mut sys = boot(&[1, 6]);
        sys.thd_sleep(5);
        assert_eq!(sys.current(), tid(6));
        sys.thd_sleep(5);
        assert_eq!(sys.current(), Sys::IDLE);

        ticks(&mut sys, 5);
        assert_eq!(sys.current(), tid(1));
        assert_eq!(sys.state(tid(6)), ThreadState::Ready(MSG_TIMEOUT));
        check_invariants(&sys);
    }

    #[test]
    fn test_polled_delay_terminates() {
        let sys = boot(&[]);
        let start = sys.sys_get_realtime_counter_x();
        sys.sys_polled_delay_x(10);
        assert!(sys.sys_get_realtime_counter_x().wrapping_sub(start) >= 10);
    }
}

#[cfg(test)]
mod timedelta_tests {
    use super::*;
    #[cfg(feature = "semaphores")]
    use nil::Semaphore;
    use nil::{ThreadReference, ThreadsQueue};

    type DeltaSys = System<StubPort<2>, 8>;

    #[test]
    fn test_single_timeout_programs_alarm() {
        let mut sys: DeltaSys = boot_with(&[1]);
        sys.thd_sleep(10);
        assert_eq!(sys.port().alarm(), Some(10));
        assert_eq!(sys.current(), DeltaSys::IDLE);

        fire_alarm(&mut sys);
        assert_eq!(sys.state(tid(1)), ThreadState::Ready(MSG_TIMEOUT));
        assert_eq!(sys.current(), tid(1));
        assert_eq!(sys.port().alarm(), None);
        assert_eq!(sys.vt_get_system_time_x(), 10);
    }

    #[test]
    fn test_earlier_deadline_reprograms_alarm() {
        let mut sys: DeltaSys = boot_with(&[1, 2]);
        sys.thd_sleep(10);
        assert_eq!(sys.current(), tid(2));
        sys.thd_sleep(4);
        assert_eq!(sys.port().alarm(), Some(4));

        fire_alarm(&mut sys);
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(MSG_TIMEOUT));
        assert_eq!(sys.state(tid(1)), ThreadState::Sleeping);
        // Remaining delta from the new service time.
        assert_eq!(sys.thread(tid(1)).timeout(), 6);
        assert_eq!(sys.port().alarm(), Some(10));

        fire_alarm(&mut sys);
        assert_eq!(sys.state(tid(1)), ThreadState::Ready(MSG_TIMEOUT));
        assert_eq!(sys.current(), tid(1));
        assert_eq!(sys.port().alarm(), None);
        check_invariants(&sys);
    }

    #[test]
    fn test_later_deadline_keeps_alarm() {
        let mut sys: DeltaSys = boot_with(&[1, 2]);
        sys.thd_sleep(5);
        let writes = sys.port().alarm_writes;
        sys.thd_sleep(20);
        assert_eq!(sys.port().alarm(), Some(5));
        assert_eq!(sys.port().alarm_writes, writes);
    }

    #[test]
    fn test_short_timeout_is_stretched_to_guard_band() {
        let mut sys: DeltaSys = boot_with(&[3]);
        sys.port_mut().advance(100);
        sys.thd_sleep(1);
        assert_eq!(sys.port().alarm(), Some(102));
    }

    #[test]
    fn test_exact_wakeup_time() {
        let mut sys: DeltaSys = boot_with(&[3]);
        sys.port_mut().advance(7);
        sys.thd_sleep(30);
        fire_alarm(&mut sys);
        assert_eq!(sys.port().now(), 37);
        assert_eq!(sys.state(tid(3)), ThreadState::Ready(MSG_TIMEOUT));
    }

    #[test]
    fn test_sleep_across_counter_wrap() {
        let mut sys: DeltaSys = boot_with(&[3]);
        sys.port_mut().advance(Interval::MAX - 4);
        sys.thd_sleep(10);
        assert_eq!(sys.port().alarm(), Some(5));
        assert_eq!(sys.thread(tid(3)).timeout(), 10);

        fire_alarm(&mut sys);
        assert_eq!(sys.port().now(), 5);
        assert_eq!(sys.state(tid(3)), ThreadState::Ready(MSG_TIMEOUT));
        assert_eq!(sys.port().alarm(), None);
    }

    #[test]
    fn test_deltas_restart_after_idle_wrap() {
        let mut sys: DeltaSys = boot_with(&[1, 2]);
        sys.thd_sleep(100);
        fire_alarm(&mut sys);
        assert_eq!(sys.current(), tid(1));
        assert_eq!(sys.port().alarm(), None);

        // The counter wraps while nobody waits, now is behind the last
        // served deadline.
        sys.port_mut().advance(Interval::MAX - 9);
        assert_eq!(sys.port().now(), 90);

        sys.thd_sleep(20);
        assert_eq!(sys.current(), tid(2));
        sys.thd_sleep(5);
        assert_eq!(sys.port().alarm(), Some(95));
        assert_eq!(sys.thread(tid(1)).timeout(), 20);
        assert_eq!(sys.thread(tid(2)).timeout(), 5);

        fire_alarm(&mut sys);
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(MSG_TIMEOUT));
        assert_eq!(sys.state(tid(1)), ThreadState::Sleeping);
        assert_eq!(sys.port().alarm(), Some(110));

        fire_alarm(&mut sys);
        assert_eq!(sys.port().now(), 110);
        assert_eq!(sys.state(tid(1)), ThreadState::Ready(MSG_TIMEOUT));
        assert_eq!(sys.current(), tid(1));
        check_invariants(&sys);
    }

    #[test]
    fn test_enqueue_timeout_restores_counter() {
        let q = leak(ThreadsQueue::new());
        let mut sys: DeltaSys = boot_with(&[3, 4]);
        sys.lock();
        sys.thd_enqueue_timeout_s(q, 3);
        sys.unlock();
        assert_eq!(q.count(), -1);
        assert_eq!(sys.port().alarm(), Some(3));

        fire_alarm(&mut sys);
        assert_eq!(q.count(), 0);
        assert_eq!(sys.state(tid(3)), ThreadState::Ready(MSG_TIMEOUT));
        assert_eq!(sys.current(), tid(3));
        assert_eq!(sys.port().alarm(), None);
        check_invariants(&sys);
    }

    #[cfg(feature = "semaphores")]
    #[test]
    fn test_sem_wait_timeout_restores_counter() {
        let sp = leak(Semaphore::new(0));
        let mut sys: DeltaSys = boot_with(&[3]);
        sys.sem_wait_timeout(sp, 5);
        assert_eq!(sp.queue().count(), -1);

        fire_alarm(&mut sys);
        assert_eq!(sys.port().now(), 5);
        assert_eq!(sys.state(tid(3)), ThreadState::Ready(MSG_TIMEOUT));
        assert_eq!(sp.queue().count(), 0);
    }

    #[test]
    fn test_suspend_timeout_clears_reference() {
        let trp = leak(ThreadReference::new());
        let mut sys: DeltaSys = boot_with(&[2]);
        sys.lock();
        sys.thd_suspend_timeout_s(trp, 4);
        sys.unlock();
        assert!(!trp.is_empty());

        fire_alarm(&mut sys);
        assert!(trp.is_empty());
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(MSG_TIMEOUT));
        assert_eq!(sys.port().alarm(), None);
    }
}

#[cfg(test)]
mod queue_tests {
    use super::*;
    use nil::{ThreadsQueue, MSG_RESET, TIME_IMMEDIATE, TIME_INFINITE};

    #[test]
    fn test_dequeue_wakes_highest_priority_waiter() {
        let q = leak(ThreadsQueue::new());
        let mut sys = boot(&[2, 4, 6]);

        for expected in [tid(4), tid(6)] {
            sys.lock();
            sys.thd_enqueue_timeout_s(q, TIME_INFINITE);
            sys.unlock();
            assert_eq!(sys.current(), expected);
        }
        assert_eq!(q.count(), -2);
        assert_eq!(sys.state(tid(2)), ThreadState::WtQueue(q));

        sys.lock();
        sys.thd_dequeue_next_i(q, MSG_OK);
        sys.reschedule_s();
        sys.unlock();

        assert_eq!(q.count(), -1);
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(MSG_OK));
        assert_eq!(sys.state(tid(4)), ThreadState::WtQueue(q));
        assert_eq!(sys.current(), tid(2));
        check_invariants(&sys);
    }

    #[test]
    fn test_dequeue_all_counts_woken_threads() {
        let q = leak(ThreadsQueue::new());
        let mut sys = boot(&[1, 2, 5]);
        for _ in 0..2 {
            sys.lock();
            sys.thd_enqueue_timeout_s(q, TIME_INFINITE);
            sys.unlock();
        }
        assert_eq!(sys.current(), tid(5));

        sys.lock();
        assert!(!sys.thd_queue_is_empty_i(q));
        assert_eq!(sys.thd_dequeue_all_i(q, MSG_RESET), 2);
        assert!(sys.thd_queue_is_empty_i(q));
        assert_eq!(sys.thd_dequeue_all_i(q, MSG_RESET), 0);
        sys.reschedule_s();
        sys.unlock();

        assert_eq!(q.count(), 0);
        assert_eq!(sys.state(tid(1)), ThreadState::Ready(MSG_RESET));
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(MSG_RESET));
        assert_eq!(sys.current(), tid(1));
    }

    #[test]
    fn test_dequeue_on_empty_queue_is_noop() {
        let q = leak(ThreadsQueue::new());
        let mut sys = boot(&[3]);
        sys.lock();
        sys.thd_dequeue_next_i(q, MSG_OK);
        sys.unlock();
        assert_eq!(q.count(), 0);
    }

    #[test]
    fn test_enqueue_immediate_fails_without_enqueueing() {
        let q = leak(ThreadsQueue::new());
        let mut sys = boot(&[3]);
        sys.lock();
        assert_eq!(sys.thd_enqueue_timeout_s(q, TIME_IMMEDIATE), MSG_TIMEOUT);
        sys.unlock();
        assert_eq!(q.count(), 0);
        assert_eq!(sys.current(), tid(3));
    }

    #[test]
    fn test_enqueue_timeout_restores_counter() {
        let q = leak(ThreadsQueue::new());
        let mut sys = boot(&[3, 4]);
        sys.lock();
        sys.thd_enqueue_timeout_s(q, 3);
        sys.unlock();
        assert_eq!(q.count(), -1);

        ticks(&mut sys, 3);
        assert_eq!(q.count(), 0);
        assert_eq!(sys.state(tid(3)), ThreadState::Ready(MSG_TIMEOUT));
        assert_eq!(sys.current(), tid(3));
        check_invariants(&sys);
    }

    #[test]
    fn test_queue_accounting() {
        let q = leak(ThreadsQueue::new());
        let mut sys = boot(&[0, 1, 2, 7]);
        let mut enqueued = 0;
        let mut woken = 0;

        for _ in 0..3 {
            sys.lock();
            sys.thd_enqueue_timeout_s(q, TIME_INFINITE);
            sys.unlock();
            enqueued += 1;
            assert_eq!(enqueued - woken, -q.count());
        }

        sys.lock();
        sys.thd_dequeue_next_i(q, MSG_OK);
        woken += 1;
        assert_eq!(enqueued - woken, -q.count());
        woken += sys.thd_dequeue_all_i(q, MSG_OK);
        sys.reschedule_s();
        sys.unlock();

        assert_eq!(enqueued - woken, -q.count());
        assert_eq!(q.count(), 0);
        check_invariants(&sys);
    }
}

#[cfg(test)]
mod suspend_tests {
    use super::*;
    use nil::{ThreadReference, TIME_IMMEDIATE, TIME_INFINITE};

    #[test]
    fn test_resume_clears_reference_once() {
        let trp = leak(ThreadReference::new());
        let mut sys = boot(&[2, 4]);

        sys.lock();
        sys.thd_suspend_timeout_s(trp, TIME_INFINITE);
        sys.unlock();
        assert_eq!(trp.get(), Some(tid(2)));
        assert_eq!(sys.state(tid(2)), ThreadState::Suspended(trp));
        assert_eq!(sys.current(), tid(4));

        sys.thd_resume(trp, 7);
        assert!(trp.is_empty());
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(7));
        assert_eq!(sys.current(), tid(2));

        // Nobody left to resume.
        let switches = sys.port().switches;
        sys.thd_resume(trp, 8);
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(7));
        assert_eq!(sys.port().switches, switches);
    }

    #[test]
    fn test_suspend_timeout_clears_reference() {
        let trp = leak(ThreadReference::new());
        let mut sys = boot(&[2]);
        sys.lock();
        sys.thd_suspend_timeout_s(trp, 2);
        sys.unlock();

        ticks(&mut sys, 2);
        assert!(trp.is_empty());
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(MSG_TIMEOUT));
    }

    #[test]
    fn test_suspend_immediate() {
        let trp = leak(ThreadReference::new());
        let mut sys = boot(&[2]);
        sys.lock();
        assert_eq!(sys.thd_suspend_timeout_s(trp, TIME_IMMEDIATE), MSG_TIMEOUT);
        sys.unlock();
        assert!(trp.is_empty());
    }

    #[test]
    fn test_resume_from_isr() {
        let trp = leak(ThreadReference::new());
        let mut sys = boot(&[2]);
        sys.lock();
        sys.thd_suspend_s(trp);
        sys.unlock();
        assert_eq!(sys.current(), Sys::IDLE);

        sys.irq_prologue();
        sys.lock_from_isr();
        sys.thd_resume_i(trp, MSG_OK);
        sys.unlock_from_isr();
        sys.irq_epilogue();
        assert!(sys.port().preemption_pending());
        sys.switch_from_isr();
        assert_eq!(sys.current(), tid(2));
    }

    #[test]
    #[should_panic(expected = "not NULL")]
    fn test_second_suspend_on_reference_halts() {
        let trp = leak(ThreadReference::new());
        let mut sys = boot(&[2, 4]);
        for _ in 0..2 {
            sys.lock();
            sys.thd_suspend_s(trp);
            sys.unlock();
        }
    }
}

#[cfg(all(test, feature = "waitexit"))]
mod exit_tests {
    use super::*;

    #[test]
    #[should_panic(expected = "invalid thread")]
    fn test_wait_on_out_of_range_thread() {
        let mut sys = boot(&[2]);
        sys.thd_wait(tid(11));
    }

    #[test]
    fn test_wait_collects_exit_message() {
        let mut sys = boot(&[2, 4]);
        sys.thd_wait(tid(4));
        assert_eq!(sys.state(tid(2)), ThreadState::WtExit(tid(4)));
        assert_eq!(sys.current(), tid(4));

        sys.thd_exit(42);
        assert_eq!(sys.state(tid(4)), ThreadState::Final(42));
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(42));
        assert_eq!(sys.current(), tid(2));
        assert_eq!(sys.port().exited(), &[Some(tid(4))]);

        // Already terminated, no blocking.
        let switches = sys.port().switches;
        assert_eq!(sys.thd_wait(tid(4)), 42);
        assert_eq!(sys.port().switches, switches);
    }

    #[test]
    fn test_final_slot_can_be_reused() {
        let mut sys = boot(&[3]);
        sys.thd_exit(MSG_OK);
        assert_eq!(sys.current(), Sys::IDLE);
        assert!(sys.state(tid(3)).is_final());

        sys.thd_create(&descriptor("again", 3));
        assert_eq!(sys.current(), tid(3));
    }
}

#[cfg(all(test, feature = "semaphores"))]
mod sem_tests {
    use super::*;
    use nil::{Semaphore, MSG_RESET, TIME_IMMEDIATE};

    #[test]
    fn test_wait_with_available_unit() {
        let sp = leak(Semaphore::new(1));
        let mut sys = boot(&[3]);
        assert_eq!(sys.sem_wait(sp), MSG_OK);
        assert_eq!(sp.queue().count(), 0);
        assert_eq!(sys.current(), tid(3));
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let sp = leak(Semaphore::new(0));
        let mut sys = boot(&[2, 4]);
        sys.sem_wait(sp);
        assert_eq!(sys.state(tid(2)), ThreadState::WtQueue(sp.queue()));
        assert_eq!(sp.queue().count(), -1);

        sys.sem_signal(sp);
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(MSG_OK));
        assert_eq!(sys.current(), tid(2));
        sys.lock();
        assert_eq!(sys.sem_get_counter_i(sp), 0);
        sys.unlock();
    }

    #[test]
    fn test_signal_without_waiters_counts_up() {
        let sp = leak(Semaphore::new(0));
        let mut sys = boot(&[3]);
        sys.sem_signal(sp);
        sys.sem_signal(sp);
        assert_eq!(sp.queue().count(), 2);
    }

    #[test]
    fn test_wait_immediate_keeps_counter() {
        let sp = leak(Semaphore::new(0));
        let mut sys = boot(&[3]);
        assert_eq!(sys.sem_wait_timeout(sp, TIME_IMMEDIATE), MSG_TIMEOUT);
        assert_eq!(sp.queue().count(), 0);
    }

    #[test]
    fn test_wait_timeout_restores_counter() {
        let sp = leak(Semaphore::new(0));
        let mut sys = boot(&[3]);
        sys.sem_wait_timeout(sp, 5);
        ticks(&mut sys, 5);
        assert_eq!(sys.state(tid(3)), ThreadState::Ready(MSG_TIMEOUT));
        assert_eq!(sp.queue().count(), 0);
    }

    #[test]
    fn test_reset_wakes_everybody() {
        let sp = leak(Semaphore::new(0));
        let mut sys = boot(&[1, 2, 6]);
        sys.sem_wait(sp);
        sys.sem_wait(sp);
        assert_eq!(sys.current(), tid(6));

        sys.sem_reset(sp, 3);
        assert_eq!(sp.queue().count(), 3);
        assert_eq!(sys.state(tid(1)), ThreadState::Ready(MSG_RESET));
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(MSG_RESET));
        assert_eq!(sys.current(), tid(1));
        check_invariants(&sys);
    }
}

#[cfg(all(test, feature = "events"))]
mod event_tests {
    use super::*;
    use nil::event::EvHandler;
    use nil::{EventId, EventListener, EventSource, ALL_EVENTS, TIME_IMMEDIATE};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_signal_wakes_any_waiter() {
        let mut sys = boot(&[2, 4]);
        sys.evt_wait_any(0b110);
        assert_eq!(sys.state(tid(2)), ThreadState::WtOrEvt(0b110));

        sys.evt_signal(tid(2), 0b001);
        assert_eq!(sys.state(tid(2)), ThreadState::WtOrEvt(0b110));
        sys.evt_signal(tid(2), 0b100);
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(MSG_OK));
        assert_eq!(sys.current(), tid(2));
        assert_eq!(sys.evt_get_and_clear_events(ALL_EVENTS), 0b101);
        assert_eq!(sys.evt_get_events_x(), 0);
    }

    #[test]
    fn test_signal_wakes_all_waiter_when_complete() {
        let mut sys = boot(&[2, 4]);
        sys.evt_wait_all(0b11);
        sys.evt_signal(tid(2), 0b01);
        assert_eq!(sys.state(tid(2)), ThreadState::WtAndEvt(0b11));
        sys.evt_signal(tid(2), 0b10);
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(MSG_OK));
        assert_eq!(sys.thread(tid(2)).epmask(), 0b11);
    }

    #[test]
    fn test_wait_one_serves_lowest_event() {
        let mut sys = boot(&[3]);
        assert_eq!(sys.evt_add_events(0b1010), 0b1010);
        assert_eq!(sys.evt_wait_one_timeout(ALL_EVENTS, TIME_IMMEDIATE), 0b10);
        assert_eq!(sys.evt_get_events_x(), 0b1000);
        assert_eq!(sys.evt_wait_any_timeout(ALL_EVENTS, TIME_IMMEDIATE), 0b1000);
        assert_eq!(sys.evt_wait_one_timeout(ALL_EVENTS, TIME_IMMEDIATE), 0);
    }

    #[test]
    fn test_wait_all_pending() {
        let mut sys = boot(&[3]);
        sys.evt_add_events(0b111);
        assert_eq!(sys.evt_wait_all_timeout(0b1000, TIME_IMMEDIATE), 0);
        assert_eq!(sys.evt_wait_all(0b101), 0b101);
        assert_eq!(sys.evt_get_events_x(), 0b010);
    }

    #[test]
    fn test_wait_timeout() {
        let mut sys = boot(&[3]);
        sys.evt_wait_any_timeout(0b1, 3);
        ticks(&mut sys, 3);
        assert_eq!(sys.state(tid(3)), ThreadState::Ready(MSG_TIMEOUT));
    }

    #[test]
    fn test_broadcast_filters_on_flags() {
        let esp = leak(EventSource::new());
        let elp = leak(EventListener::new());
        let mut sys = boot(&[2, 4]);

        sys.evt_register_mask_with_flags(esp, elp, 0b100, 0b01);
        assert_eq!(elp.listener(), Some(tid(2)));
        sys.evt_wait_any(0b100);

        sys.evt_broadcast_flags(esp, 0b10);
        assert_eq!(sys.state(tid(2)), ThreadState::WtOrEvt(0b100));
        assert_eq!(elp.flags(), 0b10);

        sys.evt_broadcast_flags(esp, 0b01);
        assert_eq!(sys.state(tid(2)), ThreadState::Ready(MSG_OK));
        assert_eq!(sys.current(), tid(2));
        assert_eq!(sys.evt_get_and_clear_flags(elp), 0b01);
        assert_eq!(elp.flags(), 0);
    }

    #[test]
    fn test_broadcast_without_flags_reaches_everybody() {
        let esp = leak(EventSource::new());
        let el1 = leak(EventListener::new());
        let el2 = leak(EventListener::new());
        let mut sys = boot(&[1, 2, 5]);

        sys.evt_register(esp, el1, 0);
        sys.evt_wait_any(ALL_EVENTS);
        sys.evt_register_mask_with_flags(esp, el2, 0b10, 0b1000);
        sys.evt_wait_any(ALL_EVENTS);
        assert_eq!(sys.current(), tid(5));

        sys.evt_broadcast(esp);
        assert_eq!(sys.thread(tid(1)).epmask(), 0b1);
        assert_eq!(sys.thread(tid(2)).epmask(), 0b10);
        assert_eq!(sys.current(), tid(1));
        check_invariants(&sys);
    }

    #[test]
    fn test_unregister() {
        let esp = leak(EventSource::new());
        let el1 = leak(EventListener::new());
        let el2 = leak(EventListener::new());
        let el3 = leak(EventListener::new());
        let mut sys = boot(&[2]);

        assert!(!esp.is_listening());
        sys.evt_register(esp, el1, 1);
        sys.evt_register(esp, el2, 2);
        sys.evt_register(esp, el3, 3);

        // Middle, head, then the last one.
        sys.evt_unregister(esp, el2);
        sys.evt_broadcast(esp);
        assert_eq!(sys.evt_get_and_clear_events(ALL_EVENTS), 0b1010);
        sys.evt_unregister(esp, el3);
        sys.evt_broadcast(esp);
        assert_eq!(sys.evt_get_and_clear_events(ALL_EVENTS), 0b10);
        sys.evt_unregister(esp, el1);
        assert!(!esp.is_listening());

        // Not registered.
        sys.evt_unregister(esp, el1);
        assert!(!esp.is_listening());
    }

    #[test]
    fn test_signal_from_isr() {
        let mut sys = boot(&[2]);
        sys.evt_wait_one(0b1);
        assert_eq!(sys.current(), Sys::IDLE);

        sys.irq_prologue();
        sys.lock_from_isr();
        sys.evt_signal_i(tid(2), 0b1);
        sys.unlock_from_isr();
        sys.irq_epilogue();
        sys.switch_from_isr();
        assert_eq!(sys.current(), tid(2));
    }

    static SEEN: AtomicU32 = AtomicU32::new(0);

    fn record(eid: EventId) {
        SEEN.fetch_or(1 << eid, Ordering::Relaxed);
    }

    #[test]
    fn test_dispatch_calls_handlers() {
        let mut sys = boot(&[]);
        let handlers: [Option<EvHandler>; 3] = [Some(record), None, Some(record)];
        sys.evt_dispatch(&handlers, 0b101);
        assert_eq!(SEEN.load(Ordering::Relaxed), 0b101);
    }

    #[test]
    #[should_panic(expected = "null handler")]
    fn test_dispatch_missing_handler() {
        let mut sys = boot(&[]);
        let handlers: [Option<EvHandler>; 2] = [None, None];
        sys.evt_dispatch(&handlers, 0b10);
    }
}

#[cfg(all(test, feature = "dbg-state-check"))]
mod state_check_tests {
    use super::*;
    use nil::{HaltReason, Violation};

    #[test]
    fn test_double_lock_halts_for_good() {
        let mut sys = boot(&[3]);
        let res = catch_unwind(AssertUnwindSafe(|| {
            sys.lock();
            sys.lock();
        }));
        assert!(res.is_err());
        assert_eq!(sys.halt_reason(), Some(HaltReason::State(Violation::Lock)));
        assert!(!sys.port().irqs_on());
    }

    #[test]
    #[should_panic(expected = "SV#5")]
    fn test_unlock_without_lock() {
        let mut sys = boot(&[3]);
        sys.unlock();
    }

    #[test]
    #[should_panic(expected = "SV#4")]
    fn test_lock_from_isr_context() {
        let mut sys = boot(&[3]);
        sys.irq_prologue();
        sys.lock();
    }

    #[test]
    #[should_panic(expected = "SV#6")]
    fn test_lock_from_isr_in_thread_context() {
        let mut sys = boot(&[3]);
        sys.lock_from_isr();
    }

    #[test]
    #[should_panic(expected = "SV#9")]
    fn test_epilogue_without_prologue() {
        let mut sys = boot(&[3]);
        sys.irq_epilogue();
    }

    #[test]
    #[should_panic(expected = "SV#10")]
    fn test_iclass_unlocked() {
        let mut sys = boot(&[3]);
        sys.ready_i(tid(5), MSG_OK);
    }

    #[test]
    #[should_panic(expected = "SV#11")]
    fn test_sclass_from_isr() {
        let mut sys = boot(&[3]);
        sys.irq_prologue();
        sys.lock_from_isr();
        sys.reschedule_s();
    }

    #[test]
    #[should_panic(expected = "SV#1")]
    fn test_disable_while_locked() {
        let mut sys = boot(&[3]);
        sys.lock();
        sys.disable();
    }

    #[test]
    fn test_status_save_restore_thread() {
        let mut sys = boot(&[4]);
        let sts = sys.get_status_and_lock_x();
        assert!(sys.dbg_state().is_locked());
        sys.thd_create_i(&descriptor("late", 2));
        sys.restore_status_x(sts);
        assert!(!sys.dbg_state().is_locked());
        assert_eq!(sys.current(), tid(2));

        // Nested use leaves the outer lock alone.
        sys.lock();
        let sts = sys.get_status_and_lock_x();
        sys.restore_status_x(sts);
        assert!(sys.dbg_state().is_locked());
        sys.unlock();
    }

    #[test]
    fn test_status_save_restore_isr() {
        let mut sys = boot(&[4]);
        sys.irq_prologue();
        sys.port_mut().set_isr(true);
        let sts = sys.get_status_and_lock_x();
        assert_eq!(sys.dbg_state().lock_cnt(), 1);
        sys.restore_status_x(sts);
        assert_eq!(sys.dbg_state().lock_cnt(), 0);
        sys.port_mut().set_isr(false);
        sys.irq_epilogue();
        assert_eq!(sys.dbg_state().isr_cnt(), 0);
    }

    #[test]
    fn test_unconditional_lock() {
        let mut sys = boot(&[4]);
        sys.unconditional_lock();
        sys.unconditional_lock();
        assert!(sys.dbg_state().is_locked());
        sys.unconditional_unlock();
        sys.unconditional_unlock();
        assert!(!sys.dbg_state().is_locked());
    }
}

#[cfg(all(test, feature = "dbg-asserts"))]
mod assert_tests {
    use super::*;

    #[test]
    #[should_panic(expected = "idle cannot sleep")]
    fn test_idle_cannot_sleep() {
        let mut sys = boot(&[]);
        sys.thd_sleep(10);
    }

    #[test]
    #[should_panic(expected = "already ready")]
    fn test_ready_twice() {
        let mut sys = boot(&[3, 5]);
        sys.lock();
        sys.ready_i(tid(5), MSG_OK);
    }

    #[test]
    fn test_halt_records_reason() {
        let mut sys = boot(&[3]);
        let res = catch_unwind(AssertUnwindSafe(|| {
            sys.thd_create(&descriptor("dup", 3));
        }));
        assert!(res.is_err());
        assert_eq!(
            sys.halt_reason().map(|r| r.message()),
            Some("priority slot taken")
        );
    }
}

#[cfg(all(test, feature = "dbg-stack-check"))]
mod stack_check_tests {
    use super::*;

    #[test]
    #[should_panic(expected = "stack overflow")]
    fn test_overflow_detected_on_switch() {
        let mut sys = boot(&[2, 4]);
        sys.port_mut().stack_overflow = true;
        sys.thd_sleep(5);
    }
}

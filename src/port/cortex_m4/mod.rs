//! Cortex-M4 port implementation
//!
//! Threads run in thread mode on the process stack, interrupts on a
//! dedicated main stack. The kernel lock is BASEPRI at [`BASEPRI_KERNEL`],
//! interrupts at a numerically lower priority must not use the kernel.
//!
//! Switches are synchronous: `__port_switch` pushes the callee saved
//! registers on the outgoing stack and pops them from the incoming one.
//! Preemption from an ISR pushes a fake exception frame so that the
//! exception return lands in thread mode on `__port_switch_from_isr`, which
//! reschedules and then drops the frame again through an SVCall.
//!
//! Assumes a soft-float target (`thumbv7em-none-eabi`), exception frames
//! carry no FPU state.

use core::arch::{asm, naked_asm};
use core::mem::size_of;
use core::ptr::NonNull;

use cortex_m::peripheral::scb::{SystemHandler, VectActive};
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{DCB, DWT, SCB};
use cortex_m::register::{basepri, psp};

use super::Port;
use crate::config::{CFG_CORE_CLOCK, CFG_INT_STACK_SIZE, CFG_ST_FREQUENCY};
use crate::error::HaltReason;
use crate::thread::{ThreadFn, WorkingArea};
use crate::types::{RtCnt, SysStatus, MSG_OK};

/// BASEPRI value of the kernel lock
pub const BASEPRI_KERNEL: u8 = 0x20;

/// SVCall must stay above the kernel level, it runs with the lock held.
const PRIO_SVCALL: u8 = 0x10;
const PRIO_SYSTICK: u8 = 0x80;

const ICSR_RETTOBASE: u32 = 1 << 11;
const XPSR_THUMB: u32 = 0x0100_0000;

/// Interrupt stack for MSP
static INTERRUPT_STACK: WorkingArea<CFG_INT_STACK_SIZE> = WorkingArea::new();

/// Callee saved registers, stored on the thread stack while switched out
#[repr(C)]
struct IntCtx {
    r4: u32,
    r5: u32,
    r6: u32,
    r7: u32,
    r8: u32,
    r9: u32,
    r10: u32,
    r11: u32,
    lr: u32,
}

/// Exception frame pushed by the hardware
#[repr(C)]
struct ExtCtx {
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}

/// Saved thread context, the stack pointer of the switched out thread.
#[repr(C)]
pub struct Context {
    sp: *mut IntCtx,
}

/// ARMv7-M port with SysTick as periodic system timer.
pub struct CortexM4 {
    _private: (),
}

impl CortexM4 {
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for CortexM4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for CortexM4 {
    type Context = Context;

    const CONTEXT_INIT: Context = Context {
        sp: core::ptr::null_mut(),
    };

    fn init(&mut self) {
        let mut p = unsafe { cortex_m::Peripherals::steal() };

        // The caller keeps its stack as PSP and becomes the idle thread,
        // handlers move to the interrupt stack.
        let msp_top = INTERRUPT_STACK.end() as u32;
        unsafe {
            asm!(
                "mrs {tmp}, msp",
                "msr psp, {tmp}",
                "mrs {tmp}, control",
                "orr {tmp}, {tmp}, #2",
                "msr control, {tmp}",
                "isb",
                "msr msp, {top}",
                tmp = out(reg) _,
                top = in(reg) msp_top,
            );
        }

        unsafe {
            p.SCB.set_priority(SystemHandler::SVCall, PRIO_SVCALL);
            p.SCB.set_priority(SystemHandler::SysTick, PRIO_SYSTICK);
        }

        // Cycle counter backing the realtime counter
        p.DCB.enable_trace();
        p.DWT.enable_cycle_counter();

        p.SYST.set_reload(CFG_CORE_CLOCK / CFG_ST_FREQUENCY - 1);
        p.SYST.clear_current();
        p.SYST.set_clock_source(SystClkSource::Core);
        p.SYST.enable_interrupt();
        p.SYST.enable_counter();
    }

    #[inline(always)]
    fn lock(&mut self) {
        unsafe { basepri::write(BASEPRI_KERNEL) };
    }

    #[inline(always)]
    fn unlock(&mut self) {
        unsafe { basepri::write(0) };
    }

    #[inline(always)]
    fn disable(&mut self) {
        cortex_m::interrupt::disable();
    }

    #[inline(always)]
    fn suspend(&mut self) {
        unsafe {
            basepri::write(BASEPRI_KERNEL);
            cortex_m::interrupt::enable();
        }
    }

    #[inline(always)]
    fn enable(&mut self) {
        unsafe {
            basepri::write(0);
            cortex_m::interrupt::enable();
        }
    }

    #[inline(always)]
    fn get_irq_status(&self) -> SysStatus {
        SysStatus(basepri::read() as u32)
    }

    #[inline(always)]
    fn irq_enabled(&self, sts: SysStatus) -> bool {
        sts.0 == 0
    }

    #[inline(always)]
    fn is_isr_context(&self) -> bool {
        SCB::vect_active() != VectActive::ThreadMode
    }

    unsafe fn setup_context(
        &mut self,
        ctx: &mut Context,
        _wbase: *mut u8,
        wend: *mut u8,
        f: ThreadFn,
        arg: *mut (),
    ) {
        let sp = (wend as usize - size_of::<IntCtx>()) as *mut IntCtx;
        unsafe {
            sp.write(IntCtx {
                r4: f as usize as u32,
                r5: arg as u32,
                r6: 0,
                r7: 0,
                r8: 0,
                r9: 0,
                r10: 0,
                r11: 0,
                lr: __port_thread_start as usize as u32,
            });
        }
        ctx.sp = sp;
    }

    #[inline(always)]
    unsafe fn switch(&mut self, ntp: NonNull<Context>, otp: NonNull<Context>) {
        unsafe { __port_switch(ntp.as_ptr(), otp.as_ptr()) };
    }

    fn request_preemption(&mut self) -> bool {
        // Nested ISRs leave the switch to the outermost one.
        let icsr = unsafe { (*SCB::PTR).icsr.read() };
        if icsr & ICSR_RETTOBASE == 0 {
            return false;
        }

        unsafe {
            let ctxp = (psp::read() as *mut ExtCtx).sub(1);
            ctxp.write(ExtCtx {
                r0: 0,
                r1: 0,
                r2: 0,
                r3: 0,
                r12: 0,
                lr: 0,
                pc: __port_switch_from_isr as usize as u32 & !1,
                xpsr: XPSR_THUMB,
            });
            psp::write(ctxp as u32);
        }
        true
    }

    /// Released by the SVCall issued in `__port_switch_from_isr`.
    #[inline(always)]
    fn exit_from_isr(&mut self) {}

    fn stack_check(&self, wabase: usize) -> bool {
        (psp::read() as usize).saturating_sub(size_of::<IntCtx>()) >= wabase
    }

    #[inline(always)]
    fn rt_counter(&self) -> RtCnt {
        DWT::cycle_count()
    }

    fn halt_hook(&mut self, reason: HaltReason) {
        #[cfg(not(feature = "defmt"))]
        if DCB::is_debugger_attached() {
            cortex_m_semihosting::hprintln!("nil: halted, {}", reason);
        }
        #[cfg(feature = "defmt")]
        let _ = reason;
    }
}

// ============ Switch primitives ============

/// Saves the callee saved registers in `otp`, restores `ntp`.
#[no_mangle]
#[unsafe(naked)]
unsafe extern "C" fn __port_switch(ntp: *mut Context, otp: *mut Context) {
    naked_asm!(
        "push {{r4-r11, lr}}",
        "str sp, [r1]",
        "ldr sp, [r0]",
        "pop {{r4-r11, pc}}",
    );
}

/// First code run by a new thread, entry point in r4 and argument in r5.
#[no_mangle]
#[unsafe(naked)]
unsafe extern "C" fn __port_thread_start() -> ! {
    naked_asm!(
        "mov r0, r4",
        "mov r1, r5",
        "b {entry}",
        entry = sym thread_entry,
    );
}

/// Thread mode landing point of a preemption requested by an ISR.
#[no_mangle]
#[unsafe(naked)]
unsafe extern "C" fn __port_switch_from_isr() -> ! {
    naked_asm!(
        "bl {preempt}",
        "svc #0",
        "b .",
        preempt = sym preempt_entry,
    );
}

unsafe extern "C" fn thread_entry(f: usize, arg: *mut ()) -> ! {
    // r4 holds the ThreadFn stored by setup_context.
    let f = unsafe { core::mem::transmute::<usize, ThreadFn>(f) };
    crate::kernel::sys().unlock();
    f(arg);
    crate::kernel::sys().thd_exit(MSG_OK);
    crate::kernel::sys().halt(HaltReason::Assert("zombies apocalypse"))
}

extern "C" fn preempt_entry() {
    crate::kernel::sys().switch_from_isr();
}

/// Drops the frame pushed by `svc #0`, the exception return then restores
/// the frame of the preempted thread and the kernel is unlocked.
#[cortex_m_rt::exception]
fn SVCall() {
    unsafe {
        psp::write(psp::read() + size_of::<ExtCtx>() as u32);
        basepri::write(0);
    }
}

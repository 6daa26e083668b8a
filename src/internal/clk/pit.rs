//! 8253/8254 PIT channel 0: the 1000 Hz system tick.
//!
//! At boot the PIT free-runs with a 65536 divider (~54.9 ms per tick);
//! init reprograms channel 0 to divider 1193 so one tick is one
//! millisecond and IRQ0 drives the monotonic counter.

use core::sync::atomic::{AtomicU32, Ordering};

use log::info;

use crate::internal::cpu;
use crate::internal::interrupts::{self, InterruptFrame};

const CHANNEL0_PORT: u16 = 0x40;
const CMD_PORT: u16 = 0x43;

/// PIT input clock in Hz.
pub const PIT_BASE_HZ: u32 = 1_193_182;
/// Target tick rate: 1000 Hz, one tick per millisecond.
pub const TICK_HZ: u32 = 1000;
/// Command: channel 0, lobyte/hibyte, mode 3 (square wave), binary.
const CMD_CH0_SQUARE: u8 = 0x36;

static TICKS: AtomicU32 = AtomicU32::new(0);

fn tick_handler(_frame: &mut InterruptFrame, _ctx: usize) {
    TICKS.fetch_add(1, Ordering::SeqCst);
}

/// Program channel 0 for `TICK_HZ` and hook IRQ0.
pub fn init() {
    let divisor = PIT_BASE_HZ / TICK_HZ;

    unsafe {
        cpu::out_u8(CMD_PORT, CMD_CH0_SQUARE);
        cpu::out_u8(CHANNEL0_PORT, (divisor & 0xFF) as u8);
        cpu::out_u8(CHANNEL0_PORT, (divisor >> 8) as u8);
    }

    interrupts::register_handler(interrupts::TIMER_VECTOR, tick_handler, 0)
        .expect("timer vector out of range");
    info!("PIT running at {} Hz (divisor {})", TICK_HZ, divisor);
}

/// Milliseconds since boot, modulo 2^32. Monotonic between wraps; written
/// only by the IRQ0 handler.
pub fn tick_ms() -> u32 {
    TICKS.load(Ordering::SeqCst)
}

/// Spin until `ms` ticks have elapsed. Leaves the interrupt flag alone;
/// uses a pause hint between polls. Wrap-safe via unsigned subtraction.
pub fn sleep_busy(ms: u32) {
    let start = tick_ms();
    while tick_ms().wrapping_sub(start) < ms {
        cpu::pause();
    }
}

/// Halt until `ms` ticks have elapsed, waking on every IRQ and re-checking
/// the deadline. Interrupts are enabled on return.
pub fn sleep_interrupt(ms: u32) {
    let start = tick_ms();
    while tick_ms().wrapping_sub(start) < ms {
        cpu::enable_interrupts_and_halt();
    }
}

#[test_case]
fn test_divisor_is_one_ms() {
    assert_eq!(PIT_BASE_HZ / TICK_HZ, 1193);
}

#[test_case]
fn test_tick_monotonic_across_sleep() {
    let before = tick_ms();
    sleep_busy(3);
    let after = tick_ms();
    assert!(after.wrapping_sub(before) >= 3);
}

#[test_case]
fn test_sleep_interrupt_waits_deadline() {
    let before = tick_ms();
    sleep_interrupt(5);
    assert!(tick_ms().wrapping_sub(before) >= 5);
}

//! # Memory-Mapped GPIO Port
//!
//! [`BitBangPort`] for GD32F1x0 GPIO banks, which have separate bit-set
//! (`BOP`) and bit-clear (`BC`) registers. A single store changes one pin
//! without a read-modify-write, which keeps every write the same length.
//!
//! On Thumb-2 cores the whole timeline is emitted by one `asm!` block whose
//! slot body is listed below, so the compiler cannot reshape the branches or
//! turn the delays into counted loops. Each channel is tested, then exactly
//! one of two conditional stores executes; the other is skipped at the cost
//! of one cycle. Both levels take the same five cycles.
//!
//! ```text
//! ldrb  data, [ptr]            ; 2  load slot
//! strb  zero, [ptr], #1        ; 2  zero it, advance
//! tst   data, #mask            ; 1  \
//! ite   ne                     ; 1   | x4 channels
//! strne pin, [gpio, #BOP]      ; 2/1 |
//! streq pin, [gpio, #BC]       ; 1/2/
//! nop x SLOT_PADDING
//! subs  count, count, #1       ; 1
//! bne   loop                   ; 3
//! ```
//!
//! Cycle costs are counted from the Cortex-M3 instruction timings for
//! zero-wait-state flash, not measured. Any change to this block must be
//! matched in [`super`]'s slot budget.
//!
//! The pins must already be configured as push-pull outputs.
//!
//! ## Usage
//!
//! ```no_run
//! use esc_bitbang::bitbang::mmio::MmioPort;
//! use esc_bitbang::config::DriverConfig;
//! use esc_bitbang::driver::EscDriver;
//!
//! // SAFETY: GPIOA is clocked and PA1/PA3/PA8/PA10 are push-pull outputs
//! let port = unsafe { MmioPort::h101_dual() };
//! let driver = EscDriver::new(DriverConfig::default(), port, 0);
//! ```

use core::ptr;

use super::BitBangPort;
use crate::dshot::protocol::{Channel, NUM_CHANNELS};
#[cfg(all(target_arch = "arm", target_feature = "thumb2"))]
use crate::dshot::protocol::TIMELINE_SLOTS;

/// GPIOA base address on the GD32F1x0
pub const GD32F1X0_GPIOA: usize = 0x4800_0000;

/// Offset of the bit operate (set) register
pub const GPIO_BOP_OFFSET: usize = 0x18;

/// Offset of the bit clear register
pub const GPIO_BC_OFFSET: usize = 0x28;

/// Pin masks of the H101 dual board: PA1 (front left), PA3 (back left),
/// PA10 (front right), PA8 (back right)
pub const H101_PINS: [u32; NUM_CHANNELS] = [1 << 1, 1 << 3, 1 << 10, 1 << 8];

/// Timeline loop for Thumb-2; operands are bound in [`MmioPort::emit_timeline`]
#[allow(unused_macros)]
macro_rules! timeline_asm {
    () => {
        concat!(
            "2:\n",
            "ldrb {data}, [{ptr}]\n",
            "strb {zero}, [{ptr}], #1\n",
            "tst {data}, #1\n",
            "ite ne\n",
            "strne {pin0}, [{gpio}, #{bop}]\n",
            "streq {pin0}, [{gpio}, #{bc}]\n",
            "tst {data}, #2\n",
            "ite ne\n",
            "strne {pin1}, [{gpio}, #{bop}]\n",
            "streq {pin1}, [{gpio}, #{bc}]\n",
            "tst {data}, #4\n",
            "ite ne\n",
            "strne {pin2}, [{gpio}, #{bop}]\n",
            "streq {pin2}, [{gpio}, #{bc}]\n",
            "tst {data}, #8\n",
            "ite ne\n",
            "strne {pin3}, [{gpio}, #{bop}]\n",
            "streq {pin3}, [{gpio}, #{bc}]\n",
            ".rept {pad}\n",
            "nop\n",
            ".endr\n",
            "subs {count}, {count}, #1\n",
            "bne 2b\n",
        )
    };
}

/// Output port writing pin masks to a GPIO bank's set/clear registers
#[derive(Debug)]
pub struct MmioPort {
    gpio: usize,
    pins: [u32; NUM_CHANNELS],
}

// The port only holds register addresses; moving it between threads is fine
// as long as a single owner drives the pins.
unsafe impl Send for MmioPort {}

impl MmioPort {
    /// Create a port from a GPIO bank base address and per-channel pin masks
    ///
    /// # Safety
    ///
    /// `gpio + GPIO_BOP_OFFSET` and `gpio + GPIO_BC_OFFSET` must be valid,
    /// aligned addresses of 32-bit set/clear registers (or memory standing in
    /// for them) for as long as the port is used, and no other code may drive
    /// the same pins concurrently.
    pub unsafe fn new(gpio: usize, pins: [u32; NUM_CHANNELS]) -> Self {
        Self { gpio, pins }
    }

    /// Port for GPIOA on the H101 dual board
    ///
    /// # Safety
    ///
    /// Only valid on a GD32F1x0 with GPIOA clocked and the four pins in
    /// push-pull output mode.
    pub unsafe fn h101_dual() -> Self {
        Self::new(GD32F1X0_GPIOA, H101_PINS)
    }

    /// Pin mask driven by a channel
    pub fn pin(&self, channel: Channel) -> u32 {
        self.pins[channel.index()]
    }

    #[inline(always)]
    fn register(&self, offset: usize) -> *mut u32 {
        (self.gpio + offset) as *mut u32
    }
}

impl BitBangPort for MmioPort {
    #[inline(always)]
    fn set_high(&mut self, channel: Channel) {
        let register = self.register(GPIO_BOP_OFFSET);
        // SAFETY: address validity is guaranteed by the constructor contract
        unsafe { ptr::write_volatile(register, self.pins[channel.index()]) }
    }

    #[inline(always)]
    fn set_low(&mut self, channel: Channel) {
        let register = self.register(GPIO_BC_OFFSET);
        // SAFETY: address validity is guaranteed by the constructor contract
        unsafe { ptr::write_volatile(register, self.pins[channel.index()]) }
    }

    #[inline(always)]
    fn nop<const N: usize>(&mut self) {
        // SAFETY: bare nops touch no memory, stack or flags
        unsafe {
            core::arch::asm!(
                ".rept {n}",
                "nop",
                ".endr",
                n = const N,
                options(nomem, nostack, preserves_flags)
            )
        }
    }

    #[cfg(all(target_arch = "arm", target_feature = "thumb2"))]
    #[inline(always)]
    fn emit_timeline(&mut self, slots: &mut [u8; TIMELINE_SLOTS]) {
        // SAFETY: `ptr` walks exactly TIMELINE_SLOTS bytes of `slots`; the
        // register addresses are guaranteed by the constructor contract
        unsafe {
            core::arch::asm!(
                timeline_asm!(),
                ptr = inout(reg) slots.as_mut_ptr() => _,
                count = inout(reg) TIMELINE_SLOTS => _,
                data = out(reg) _,
                zero = in(reg) 0u32,
                gpio = in(reg) self.gpio,
                pin0 = in(reg) self.pins[0],
                pin1 = in(reg) self.pins[1],
                pin2 = in(reg) self.pins[2],
                pin3 = in(reg) self.pins[3],
                bop = const GPIO_BOP_OFFSET,
                bc = const GPIO_BC_OFFSET,
                pad = const super::SLOT_PADDING,
                options(nostack)
            )
        }
    }
}

#![cfg_attr(not(test), no_std)]
#![deny(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(missing_debug_implementations)]

//! # nds7
//! `nds7` gives typed access to the sound, microphone and timer hardware of
//! the Nintendo DS's ARM7 processor.
//!
//! Every register access goes through a [`Bus`]. On the console that is
//! [`Hardware`], which does volatile reads and writes of the real memory
//! mapped registers. In tests it can be the in-memory `TestBus` from the
//! `testing` feature, which also models the timers and interrupt flags.
//!
//! Everything hangs off [`Arm7`], which hands out each piece of hardware once
//! so the borrow checker can keep two pieces of code from fighting over the
//! same timer or sound channel.
//!
//! ```rust,ignore
//! # fn test() -> Result<(), nds7::Error> {
//! use nds7::timer::{Divider, frequency_to_ticks_1024};
//!
//! let mut arm7 = nds7::Arm7::take().unwrap();
//!
//! let timer = arm7.timers.timer(1)?;
//! timer.configure(Divider::Divider1024, frequency_to_ticks_1024(60), false);
//!
//! loop {
//!     let ticks = timer.elapsed();
//!     // ...
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

/// The interrupt handler table timers attach their callbacks to.
pub mod interrupt;
mod memory_mapped;
/// Debug output for the no$gba emulator.
pub mod nocash;
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[doc(hidden)]
pub mod print;
/// Sound channels, the mixer and microphone recording.
pub mod sound;
/// The serial bus to the power management chip and the microphone.
pub mod spi;
/// An in-memory register file for testing code which uses this crate.
#[cfg(any(test, feature = "testing"))]
pub mod test_bus;
/// The four hardware timers.
pub mod timer;

pub use memory_mapped::{Bus, Hardware, MemoryMapped, RegisterValue};

use sound::{Microphone, Sampler, SoundController};
use spi::PowerManagement;
use timer::TimerController;

/// The errors the checked parts of the API return.
///
/// The unchecked parts mask or wrap out of range values the way the
/// hardware would.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("there is no sound channel {0}, channels are numbered 0 to 15")]
    InvalidSoundChannel(usize),
    #[error("there is no timer {0}, timers are numbered 0 to 3")]
    InvalidTimer(usize),
    #[error("volume {0} is out of range, the maximum is 127")]
    InvalidVolume(u8),
    #[error("pan {0} is out of range, the maximum is 127")]
    InvalidPan(u8),
    #[error("{frequency}Hz can't be produced, the range is {min}Hz to {max}Hz")]
    FrequencyOutOfRange { frequency: u32, min: u32, max: u32 },
    #[error("a microphone recording is already running")]
    RecordingInProgress,
}

/// The microphone with its amplifier behind the power management chip.
pub type Arm7Microphone<B> = Microphone<PowerManagement<B>>;

/// The Arm7 struct is used to control access to the hardware in a way which
/// makes it the borrow checker's responsibility to ensure no clashes of
/// global resources.
#[derive(Debug)]
#[non_exhaustive]
pub struct Arm7<B> {
    /// The mixer and the sixteen sound channels.
    pub sound: SoundController<B>,
    /// The four hardware timers.
    pub timers: TimerController<B>,
    /// The microphone. Recording needs one of the timers as well.
    pub microphone: Arm7Microphone<B>,
}

impl<B: Bus + Clone> Arm7<B> {
    /// Builds the peripherals on top of `bus`, with the microphone read
    /// through `sampler`.
    ///
    /// With [`Hardware`] use [`Arm7::take`] instead, which makes sure there is
    /// only ever one.
    pub fn with_bus(bus: B, sampler: Sampler) -> Self {
        Self {
            sound: SoundController::new(bus.clone()),
            timers: TimerController::new(bus.clone()),
            microphone: Microphone::new(PowerManagement::new(bus), sampler),
        }
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
static TAKEN: portable_atomic::AtomicBool = portable_atomic::AtomicBool::new(false);

#[cfg(all(target_arch = "arm", target_os = "none"))]
impl Arm7<Hardware> {
    /// The real hardware. Returns `None` if it has already been taken.
    #[must_use]
    pub fn take() -> Option<Self> {
        if TAKEN.swap(true, portable_atomic::Ordering::Relaxed) {
            log::warn!("Arm7::take called more than once");
            return None;
        }

        Some(Self::with_bus(unsafe { Hardware::new() }, spi::read_microphone))
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
#[panic_handler]
fn panic_implementation(info: &core::panic::PanicInfo) -> ! {
    if let Some(mut nocash) = nocash::NoCash::new(unsafe { Hardware::new() }) {
        let _ = nocash.print(format_args!("{info}"), nocash::DebugLevel::Fatal);
    }

    #[allow(clippy::empty_loop)]
    loop {}
}

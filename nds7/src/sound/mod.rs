//! The sixteen sound channels, the mixer and the microphone.
//!
//! Channels play samples straight out of memory. Each one has its own
//! register set and its own timer, so configuring a channel is a handful of
//! register writes and the hardware does the rest.
//!
//! ```rust,no_run
//! # fn test(arm7: &mut nds7::Arm7<nds7::Hardware>) -> Result<(), nds7::Error> {
//! use nds7::sound::{ChannelSettings, SampleFormat};
//!
//! arm7.sound.enable();
//! arm7.sound.set_master_volume(127);
//!
//! arm7.sound.channel(3)?.try_configure(&ChannelSettings {
//!     volume: 100,
//!     format: SampleFormat::Pcm16,
//!     ..Default::default()
//! })?;
//! # Ok(())
//! # }
//! ```

use nds7_reg::{
    SOUND_BIAS, SOUND_CAPTURE_0_CONTROL, SOUND_CAPTURE_0_DESTINATION, SOUND_CAPTURE_0_LENGTH,
    SOUND_CAPTURE_1_DESTINATION, SOUND_CAPTURE_1_LENGTH, SOUND_CHANNEL_COUNT, SOUND_CONTROL,
    SOUND_MASTER_VOLUME, SoundControl,
};

use crate::{
    Error,
    memory_mapped::{Bus, MemoryMapped},
};

mod channel;
mod microphone;

pub use channel::{ChannelSettings, SoundChannel};
#[cfg(test)]
pub(crate) use microphone::exclusive_session;
pub use microphone::{
    Amplifier, AmplifierState, MICROPHONE_SAMPLE_RATE, MICROPHONE_TIMER_TICKS, Microphone,
    Recorded, Recording, Sampler, process_microphone_timer_irq,
};
pub use nds7_reg::{RepeatMode, SampleFormat};

/// The clock the channel timers count from, in Hz.
pub const SOUND_CLOCK: u32 = 0x100_0000;

/// The lowest and highest sample rates a channel timer can produce.
pub const FREQUENCY_RANGE: (u32, u32) = (SOUND_CLOCK >> 16, SOUND_CLOCK);

/// The bias the firmware sets up, half way through the 10 bit range.
pub const DEFAULT_BIAS: u16 = 0x200;

/// The channel timer value for a sample rate of `frequency` Hz.
///
/// Frequencies outside [`FREQUENCY_RANGE`] wrap silently, and 0 gives 0.
#[must_use]
pub const fn frequency_to_timer(frequency: u32) -> u16 {
    match (-(SOUND_CLOCK as i64)).checked_div(frequency as i64) {
        Some(timer) => timer as u16,
        None => 0,
    }
}

pub fn checked_frequency_to_timer(frequency: u32) -> Result<u16, Error> {
    let (min, max) = FREQUENCY_RANGE;
    if (min..=max).contains(&frequency) {
        Ok(frequency_to_timer(frequency))
    } else {
        Err(Error::FrequencyOutOfRange {
            frequency,
            min,
            max,
        })
    }
}

/// The sample rate produced by the channel timer value `timer`.
#[must_use]
pub const fn timer_to_frequency(timer: u16) -> u32 {
    SOUND_CLOCK / (0x1_0000 - timer as u32)
}

/// The sound registers past the bias, only available as raw values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureRegister {
    Control,
    Capture0Destination,
    Capture0Length,
    Capture1Destination,
    Capture1Length,
}

impl CaptureRegister {
    const fn address(self) -> usize {
        match self {
            CaptureRegister::Control => SOUND_CAPTURE_0_CONTROL,
            CaptureRegister::Capture0Destination => SOUND_CAPTURE_0_DESTINATION,
            CaptureRegister::Capture0Length => SOUND_CAPTURE_0_LENGTH,
            CaptureRegister::Capture1Destination => SOUND_CAPTURE_1_DESTINATION,
            CaptureRegister::Capture1Length => SOUND_CAPTURE_1_LENGTH,
        }
    }
}

/// The mixer and the way in to the channels.
#[derive(Debug)]
#[non_exhaustive]
pub struct SoundController<B> {
    bus: B,
}

impl<B: Bus> SoundController<B> {
    pub(crate) const fn new(bus: B) -> Self {
        Self { bus }
    }

    fn control_register(&self) -> MemoryMapped<&B, u16> {
        MemoryMapped::new(&self.bus, SOUND_CONTROL)
    }

    fn master_volume_register(&self) -> MemoryMapped<&B, u8> {
        MemoryMapped::new(&self.bus, SOUND_MASTER_VOLUME)
    }

    fn bias_register(&self) -> MemoryMapped<&B, u16> {
        MemoryMapped::new(&self.bus, SOUND_BIAS)
    }

    /// Turns the mixer on. Nothing is heard until this is done.
    pub fn enable(&mut self) {
        self.control_register().set_bits(1, 1, 15);
        log::debug!("sound enabled");
    }

    pub fn disable(&mut self) {
        self.control_register().set_bits(0, 1, 15);
        log::debug!("sound disabled");
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.control().enable()
    }

    /// Sets the master volume, `0..=127`. Larger values are masked.
    pub fn set_master_volume(&mut self, volume: u8) {
        self.master_volume_register().set(volume & 0x7f);
    }

    #[must_use]
    pub fn master_volume(&self) -> u8 {
        self.master_volume_register().get() & 0x7f
    }

    /// Sets the output bias, `0..=0x3ff`. See [`DEFAULT_BIAS`].
    pub fn set_bias(&mut self, bias: u16) {
        self.bias_register().set(bias & 0x3ff);
    }

    #[must_use]
    pub fn bias(&self) -> u16 {
        self.bias_register().get() & 0x3ff
    }

    #[must_use]
    pub fn control(&self) -> SoundControl {
        self.control_register().get_as()
    }

    pub fn set_control(&mut self, control: SoundControl) {
        self.control_register().set_as(control);
    }

    #[must_use]
    pub fn capture_register(&self, register: CaptureRegister) -> u16 {
        MemoryMapped::<_, u16>::new(&self.bus, register.address()).get()
    }

    pub fn set_capture_register(&mut self, register: CaptureRegister, value: u16) {
        MemoryMapped::<_, u16>::new(&self.bus, register.address()).set(value);
    }

    /// Gets channel `index`, which must be in `0..=15`.
    pub fn channel(&mut self, index: usize) -> Result<SoundChannel<'_, B>, Error> {
        if index < SOUND_CHANNEL_COUNT {
            Ok(SoundChannel::new(&self.bus, index))
        } else {
            Err(Error::InvalidSoundChannel(index))
        }
    }

    /// Gets channel `index` without checking it.
    ///
    /// # Safety
    ///
    /// `index` must be in `0..=15`, otherwise the channel's registers are
    /// wherever the stride puts them and writes land on unrelated hardware or
    /// memory.
    pub unsafe fn channel_unchecked(&mut self, index: usize) -> SoundChannel<'_, B> {
        SoundChannel::new(&self.bus, index)
    }
}

use bilge::prelude::*;
use nds7_reg::{
    RepeatMode, SampleFormat, SoundChannelControl, sound_channel_control_unchecked,
    sound_channel_length_unchecked, sound_channel_pan_unchecked,
    sound_channel_repeat_point_unchecked, sound_channel_source_unchecked,
    sound_channel_timer_unchecked, sound_channel_volume_unchecked,
};

use crate::{
    Error,
    memory_mapped::{Bus, MemoryMapped},
};

use super::{checked_frequency_to_timer, frequency_to_timer};

/// Everything [`SoundChannel::configure`] needs to set a channel up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSettings {
    /// `0..=127`
    pub volume: u8,
    /// `0..=127`, 0 is fully left and 64 is centred.
    pub pan: u8,
    /// Sample rate in Hz.
    pub frequency: u32,
    pub format: SampleFormat,
    pub repeat: RepeatMode,
    /// Start playing as soon as the channel is configured.
    pub start: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            volume: 127,
            pan: 64,
            frequency: 22_050,
            format: SampleFormat::Pcm8,
            repeat: RepeatMode::OneShot,
            start: true,
        }
    }
}

impl ChannelSettings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.volume > 127 {
            return Err(Error::InvalidVolume(self.volume));
        }

        if self.pan > 127 {
            return Err(Error::InvalidPan(self.pan));
        }

        checked_frequency_to_timer(self.frequency)?;

        Ok(())
    }

    /// The control word for these settings. Volume and pan are masked to 7
    /// bits.
    #[must_use]
    pub fn control(&self) -> SoundChannelControl {
        let mut control = SoundChannelControl::from(0u32);
        control.set_volume(u7::new(self.volume & 0x7f));
        control.set_pan(u7::new(self.pan & 0x7f));
        control.set_format(self.format);
        control.set_repeat(self.repeat);
        control.set_start(self.start);
        control
    }
}

/// One of the sixteen hardware sound channels.
///
/// Register writes take effect on the channel's next sample. Changing several
/// registers of a playing channel is not atomic, stop it first or do it in a
/// critical section if the intermediate state matters.
#[derive(Debug)]
pub struct SoundChannel<'a, B> {
    bus: &'a B,
    index: usize,
}

impl<'a, B: Bus> SoundChannel<'a, B> {
    pub(super) fn new(bus: &'a B, index: usize) -> Self {
        Self { bus, index }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    fn control_register(&self) -> MemoryMapped<&'a B, u32> {
        MemoryMapped::new(self.bus, sound_channel_control_unchecked(self.index))
    }

    fn volume_register(&self) -> MemoryMapped<&'a B, u8> {
        MemoryMapped::new(self.bus, sound_channel_volume_unchecked(self.index))
    }

    fn pan_register(&self) -> MemoryMapped<&'a B, u8> {
        MemoryMapped::new(self.bus, sound_channel_pan_unchecked(self.index))
    }

    fn source_register(&self) -> MemoryMapped<&'a B, u32> {
        MemoryMapped::new(self.bus, sound_channel_source_unchecked(self.index))
    }

    fn timer_register(&self) -> MemoryMapped<&'a B, u16> {
        MemoryMapped::new(self.bus, sound_channel_timer_unchecked(self.index))
    }

    fn repeat_point_register(&self) -> MemoryMapped<&'a B, u16> {
        MemoryMapped::new(self.bus, sound_channel_repeat_point_unchecked(self.index))
    }

    fn length_register(&self) -> MemoryMapped<&'a B, u32> {
        MemoryMapped::new(self.bus, sound_channel_length_unchecked(self.index))
    }

    /// Writes the channel timer and then the control word. If
    /// `settings.start` is set the channel starts playing straight away.
    ///
    /// Out of range values are masked or wrapped rather than rejected, use
    /// [`try_configure`](Self::try_configure) to have them checked.
    pub fn configure(&mut self, settings: &ChannelSettings) {
        self.set_frequency(settings.frequency);
        self.set_control(settings.control());

        log::trace!("sound channel {} configured: {:?}", self.index, settings);
    }

    pub fn try_configure(&mut self, settings: &ChannelSettings) -> Result<(), Error> {
        settings.validate()?;
        self.configure(settings);
        Ok(())
    }

    /// Points the channel at `sample` and configures it.
    ///
    /// The length register counts words, so a trailing partial word of
    /// `sample` is not played.
    pub fn play(&mut self, sample: &'static [u8], settings: &ChannelSettings) {
        self.stop();
        self.set_source(sample.as_ptr() as usize as u32);
        self.set_length((sample.len() / 4) as u32);
        self.set_repeat_point(0);
        self.configure(settings);
    }

    /// Sets the volume, `0..=127`, without touching the rest of the control
    /// word.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume_register().set(volume & 0x7f);
    }

    /// Sets the pan, `0..=127`, without touching the rest of the control
    /// word.
    pub fn set_pan(&mut self, pan: u8) {
        self.pan_register().set(pan & 0x7f);
    }

    /// Sets the sample rate in Hz. See [`frequency_to_timer`] for what
    /// happens outside [`FREQUENCY_RANGE`](super::FREQUENCY_RANGE).
    pub fn set_frequency(&mut self, frequency: u32) {
        self.set_timer(frequency_to_timer(frequency));
    }

    pub fn set_timer(&mut self, timer: u16) {
        self.timer_register().set(timer);
    }

    /// The address of the sample data. Must be word aligned.
    pub fn set_source(&mut self, address: u32) {
        self.source_register().set(address & 0x07ff_fffc);
    }

    /// Where looping restarts, in words from the source.
    pub fn set_repeat_point(&mut self, words: u16) {
        self.repeat_point_register().set(words);
    }

    /// The length after the repeat point, in words.
    pub fn set_length(&mut self, words: u32) {
        self.length_register().set(words & 0x003f_ffff);
    }

    pub fn start(&mut self) {
        self.control_register().set_bits(1, 1, 31);
    }

    pub fn stop(&mut self) {
        self.control_register().set_bits(0, 1, 31);
    }

    /// Whether the channel is playing. One shot channels stop by themselves
    /// at the end of the sample.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.control().start()
    }

    #[must_use]
    pub fn control(&self) -> SoundChannelControl {
        self.control_register().get_as()
    }

    pub fn set_control(&mut self, control: SoundChannelControl) {
        self.control_register().set_as(control);
    }
}

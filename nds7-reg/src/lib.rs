#![no_std]
#![deny(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(missing_debug_implementations)]
#![deny(missing_copy_implementations)]

//! This crate contains definitions of the hardware registers used by the
//! sound, timer, interrupt and serial (SPI) hardware of the Nintendo DS ARM7.
//! It contains bitfields that define the registers as well as their physical
//! addresses.
//!
//! Nothing in here touches memory. Addresses are plain `usize` values so the
//! same map can drive real hardware and the in-memory register file used in
//! tests.
//!
//! Do note that some registers overlap: the low byte of a sound channel's
//! control word is also its volume register, and the low byte of the sound
//! control register is the master volume.

use bilge::prelude::*;

/// Number of hardware sound channels.
pub const SOUND_CHANNEL_COUNT: usize = 16;
/// Number of hardware timers.
pub const TIMER_COUNT: usize = 4;

const SOUND_CHANNEL_BASE: usize = 0x0400_0400;
const SOUND_CHANNEL_STRIDE: usize = 0x10;

pub const fn sound_channel_control(channel: usize) -> usize {
    assert!(
        channel < SOUND_CHANNEL_COUNT,
        "sound channel must be in range 0..=15"
    );

    sound_channel_control_unchecked(channel)
}

pub const fn sound_channel_control_unchecked(channel: usize) -> usize {
    SOUND_CHANNEL_BASE + channel * SOUND_CHANNEL_STRIDE
}

/// The byte register aliasing bits 0..=7 of the channel control word.
pub const fn sound_channel_volume(channel: usize) -> usize {
    sound_channel_control(channel)
}

pub const fn sound_channel_volume_unchecked(channel: usize) -> usize {
    sound_channel_control_unchecked(channel)
}

/// The byte register aliasing bits 16..=23 of the channel control word.
pub const fn sound_channel_pan(channel: usize) -> usize {
    sound_channel_control(channel) + 0x2
}

pub const fn sound_channel_pan_unchecked(channel: usize) -> usize {
    sound_channel_control_unchecked(channel) + 0x2
}

pub const fn sound_channel_source(channel: usize) -> usize {
    sound_channel_control(channel) + 0x4
}

pub const fn sound_channel_source_unchecked(channel: usize) -> usize {
    sound_channel_control_unchecked(channel) + 0x4
}

pub const fn sound_channel_timer(channel: usize) -> usize {
    sound_channel_control(channel) + 0x8
}

pub const fn sound_channel_timer_unchecked(channel: usize) -> usize {
    sound_channel_control_unchecked(channel) + 0x8
}

pub const fn sound_channel_repeat_point(channel: usize) -> usize {
    sound_channel_control(channel) + 0xA
}

pub const fn sound_channel_repeat_point_unchecked(channel: usize) -> usize {
    sound_channel_control_unchecked(channel) + 0xA
}

pub const fn sound_channel_length(channel: usize) -> usize {
    sound_channel_control(channel) + 0xC
}

pub const fn sound_channel_length_unchecked(channel: usize) -> usize {
    sound_channel_control_unchecked(channel) + 0xC
}

pub const SOUND_CONTROL: usize = 0x0400_0500;
pub const SOUND_MASTER_VOLUME: usize = 0x0400_0500;
pub const SOUND_BIAS: usize = 0x0400_0504;

// The registers past the bias are the capture units. Only raw 16 bit access
// is offered for them.
pub const SOUND_CAPTURE_0_CONTROL: usize = 0x0400_0508;
pub const SOUND_CAPTURE_0_DESTINATION: usize = 0x0400_0510;
pub const SOUND_CAPTURE_0_LENGTH: usize = 0x0400_0514;
pub const SOUND_CAPTURE_1_DESTINATION: usize = 0x0400_0518;
pub const SOUND_CAPTURE_1_LENGTH: usize = 0x0400_051C;

const TIMER_BASE: usize = 0x0400_0100;
const TIMER_STRIDE: usize = 0x4;

pub const fn timer_data(timer: usize) -> usize {
    assert!(timer < TIMER_COUNT, "timer must be in range 0..=3");

    timer_data_unchecked(timer)
}

pub const fn timer_data_unchecked(timer: usize) -> usize {
    TIMER_BASE + timer * TIMER_STRIDE
}

pub const fn timer_control(timer: usize) -> usize {
    assert!(timer < TIMER_COUNT, "timer must be in range 0..=3");

    timer_control_unchecked(timer)
}

pub const fn timer_control_unchecked(timer: usize) -> usize {
    TIMER_BASE + timer * TIMER_STRIDE + 0x2
}

pub const TIMER_0_DATA: usize = timer_data(0);
pub const TIMER_1_DATA: usize = timer_data(1);
pub const TIMER_2_DATA: usize = timer_data(2);
pub const TIMER_3_DATA: usize = timer_data(3);

pub const TIMER_0_CONTROL: usize = timer_control(0);
pub const TIMER_1_CONTROL: usize = timer_control(1);
pub const TIMER_2_CONTROL: usize = timer_control(2);
pub const TIMER_3_CONTROL: usize = timer_control(3);

pub const SPI_CONTROL: usize = 0x0400_01C0;
pub const SPI_DATA: usize = 0x0400_01C2;

pub const INTERRUPT_MASTER_ENABLE: usize = 0x0400_0208;
pub const INTERRUPT_ENABLE: usize = 0x0400_0210;
pub const INTERRUPT_FLAGS: usize = 0x0400_0214;

#[bitsize(2)]
#[derive(FromBits, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VolumeDivider {
    #[default]
    Full,
    Half,
    Quarter,
    Sixteenth,
}

#[bitsize(2)]
#[derive(FromBits, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RepeatMode {
    /// Loops from the repeat point forever, the length is ignored.
    Manual,
    /// Plays the whole sample, then loops from the repeat point.
    Loop,
    /// Plays the sample once and clears the start bit.
    #[default]
    OneShot,
    Reserved,
}

#[bitsize(2)]
#[derive(FromBits, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SampleFormat {
    #[default]
    Pcm8,
    Pcm16,
    ImaAdpcm,
    /// Square wave on channels 8..=13, noise on 14 and 15.
    Psg,
}

#[bitsize(32)]
#[derive(FromBits, Clone, Copy, PartialEq, Eq, DebugBits)]
pub struct SoundChannelControl {
    pub volume: u7,
    reserved: u1,
    pub volume_divider: VolumeDivider,
    reserved: u5,
    pub hold: bool,
    pub pan: u7,
    reserved: u1,
    pub psg_duty: u3,
    pub repeat: RepeatMode,
    pub format: SampleFormat,
    pub start: bool,
}

#[bitsize(2)]
#[derive(FromBits, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputSource {
    #[default]
    Mixer,
    Channel1,
    Channel3,
    Channel1And3,
}

#[bitsize(16)]
#[derive(FromBits, Clone, Copy, PartialEq, Eq, DebugBits)]
pub struct SoundControl {
    pub master_volume: u7,
    reserved: u1,
    pub left_output: OutputSource,
    pub right_output: OutputSource,
    pub skip_channel_1: bool,
    pub skip_channel_3: bool,
    reserved: u1,
    pub enable: bool,
}

#[bitsize(16)]
#[derive(FromBits, Clone, Copy, PartialEq, Eq, DebugBits)]
pub struct SoundBias {
    pub level: u10,
    reserved: u6,
}

#[bitsize(2)]
#[derive(FromBits, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TimerDivider {
    #[default]
    Divider1,
    Divider64,
    Divider256,
    Divider1024,
}

#[bitsize(16)]
#[derive(FromBits, Clone, Copy, PartialEq, Eq, DebugBits)]
pub struct TimerControl {
    pub divider: TimerDivider,
    /// Count when the previous timer overflows rather than on the clock.
    /// Unavailable on timer 0.
    pub cascade: bool,
    reserved: u3,
    pub interrupt: bool,
    pub enable: bool,
    reserved: u8,
}

#[bitsize(2)]
#[derive(FromBits, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpiBaudRate {
    Mhz4,
    Mhz2,
    Mhz1,
    Khz512,
}

#[bitsize(2)]
#[derive(FromBits, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpiDevice {
    PowerManagement,
    Firmware,
    /// The touch screen controller, which also digitises the microphone.
    Touchscreen,
    Reserved,
}

#[bitsize(1)]
#[derive(FromBits, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpiTransferSize {
    Byte,
    Halfword,
}

#[bitsize(16)]
#[derive(FromBits, Clone, Copy, PartialEq, Eq, DebugBits)]
pub struct SpiControl {
    pub baud_rate: SpiBaudRate,
    reserved: u5,
    pub busy: bool,
    pub device: SpiDevice,
    pub transfer_size: SpiTransferSize,
    /// Keep chip select low after the transfer.
    pub chip_select_hold: bool,
    reserved: u2,
    pub interrupt: bool,
    pub enable: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn channel_registers_are_sixteen_bytes_apart() {
        assert_eq!(sound_channel_control(0), 0x0400_0400);
        assert_eq!(sound_channel_control(15), 0x0400_04F0);
        assert_eq!(sound_channel_pan(3), 0x0400_0432);
        assert_eq!(sound_channel_source(1), 0x0400_0414);
        assert_eq!(sound_channel_timer(2), 0x0400_0428);
        assert_eq!(sound_channel_repeat_point(4), 0x0400_044A);
        assert_eq!(sound_channel_length(5), 0x0400_045C);
    }

    #[test]
    fn timer_registers_are_four_bytes_apart() {
        assert_eq!(TIMER_0_DATA, 0x0400_0100);
        assert_eq!(TIMER_1_DATA, 0x0400_0104);
        assert_eq!(TIMER_2_CONTROL, 0x0400_010A);
        assert_eq!(TIMER_3_CONTROL, 0x0400_010E);
    }

    #[test]
    #[should_panic(expected = "sound channel must be in range")]
    fn channel_out_of_range_panics() {
        sound_channel_control(16);
    }

    #[test]
    fn sound_channel_control_bit_positions() {
        let mut control = SoundChannelControl::from(0u32);
        control.set_start(true);
        assert_eq!(u32::from(control), 1 << 31);

        let mut control = SoundChannelControl::from(0u32);
        control.set_repeat(RepeatMode::Loop);
        assert_eq!(u32::from(control), 1 << 27);

        let mut control = SoundChannelControl::from(0u32);
        control.set_repeat(RepeatMode::OneShot);
        assert_eq!(u32::from(control), 1 << 28);

        let mut control = SoundChannelControl::from(0u32);
        control.set_format(SampleFormat::Pcm16);
        assert_eq!(u32::from(control), 1 << 29);

        let mut control = SoundChannelControl::from(0u32);
        control.set_pan(u7::new(0x7f));
        assert_eq!(u32::from(control), 0x7f << 16);
    }

    #[test]
    fn timer_control_bit_positions() {
        let mut control = TimerControl::from(0u16);
        control.set_enable(true);
        control.set_interrupt(true);
        control.set_divider(TimerDivider::Divider1024);
        assert_eq!(u16::from(control), (1 << 7) | (1 << 6) | 3);
    }

    #[test]
    fn spi_control_matches_the_documented_layout() {
        let mut control = SpiControl::from(0u16);
        control.set_enable(true);
        control.set_device(SpiDevice::Touchscreen);
        control.set_baud_rate(SpiBaudRate::Mhz2);
        control.set_chip_select_hold(true);
        assert_eq!(u16::from(control), 0x8A01);
    }
}

//! The serial bus to the power management chip and the touch screen
//! controller, which is also the microphone's analog to digital converter.

use nds7_reg::{SPI_CONTROL, SPI_DATA, SpiBaudRate, SpiControl, SpiDevice, SpiTransferSize};

use crate::{
    memory_mapped::{Bus, MemoryMapped},
    sound::{Amplifier, AmplifierState},
};

/// The power management register switching the sound amplifier.
const AMPLIFIER_REGISTER: u8 = 2;

/// Touch screen controller command: 8 bit conversion of the AUX input.
const MICROPHONE_COMMAND: u16 = 0xEC;

fn control(device: SpiDevice, baud_rate: SpiBaudRate, hold: bool) -> SpiControl {
    let mut control = SpiControl::from(0u16);
    control.set_enable(true);
    control.set_device(device);
    control.set_baud_rate(baud_rate);
    control.set_transfer_size(SpiTransferSize::Byte);
    control.set_chip_select_hold(hold);
    control
}

struct Spi<'a, B> {
    bus: &'a B,
}

impl<'a, B: Bus> Spi<'a, B> {
    fn control_register(&self) -> MemoryMapped<&'a B, u16> {
        MemoryMapped::new(self.bus, SPI_CONTROL)
    }

    fn data_register(&self) -> MemoryMapped<&'a B, u16> {
        MemoryMapped::new(self.bus, SPI_DATA)
    }

    fn wait_while_busy(&self) {
        while self.control_register().get_as::<SpiControl>().busy() {}
    }

    fn send(&self, control: SpiControl, value: u16) {
        self.control_register().set_as(control);
        self.data_register().set(value);
        self.wait_while_busy();
    }

    fn transfer(&self, control: SpiControl, value: u16) -> u16 {
        self.send(control, value);
        self.data_register().get()
    }
}

/// The power management chip.
#[derive(Debug)]
pub struct PowerManagement<B> {
    bus: B,
}

impl<B: Bus> PowerManagement<B> {
    pub const fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Writes `value` to the chip's `register`.
    pub fn write(&mut self, register: u8, value: u8) {
        let spi = Spi { bus: &self.bus };

        spi.send(
            control(SpiDevice::PowerManagement, SpiBaudRate::Mhz1, true),
            register.into(),
        );
        spi.send(
            control(SpiDevice::PowerManagement, SpiBaudRate::Mhz1, false),
            value.into(),
        );
    }
}

impl<B: Bus> Amplifier for PowerManagement<B> {
    fn set_amplifier(&mut self, state: AmplifierState) {
        log::trace!("amplifier {:?}", state);
        self.write(AMPLIFIER_REGISTER, state as u8);
    }
}

/// Reads the microphone through the touch screen controller.
#[derive(Debug)]
pub struct TouchMicrophone<B> {
    bus: B,
}

impl<B: Bus> TouchMicrophone<B> {
    pub const fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Reads one unsigned 8 bit sample.
    pub fn read_sample(&mut self) -> u8 {
        let spi = Spi { bus: &self.bus };

        spi.send(
            control(SpiDevice::Touchscreen, SpiBaudRate::Mhz2, true),
            MICROPHONE_COMMAND,
        );
        let high = spi.transfer(control(SpiDevice::Touchscreen, SpiBaudRate::Mhz2, true), 0);
        let low = spi.transfer(control(SpiDevice::Touchscreen, SpiBaudRate::Mhz2, false), 0);

        // The conversion is clocked out one bit late, so it straddles the
        // two bytes.
        (((high & 0x7f) << 1) | ((low >> 7) & 1)) as u8
    }
}

/// Reads one sample from the real microphone. This is the
/// [`Sampler`](crate::sound::Sampler) [`Arm7::take`](crate::Arm7::take)
/// records with.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn read_microphone() -> u8 {
    TouchMicrophone::new(unsafe { crate::memory_mapped::Hardware::new() }).read_sample()
}

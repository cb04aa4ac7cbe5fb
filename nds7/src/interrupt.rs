use core::cell::Cell;

use bitflags::bitflags;
use critical_section::Mutex;
use nds7_reg::{INTERRUPT_ENABLE, INTERRUPT_FLAGS, INTERRUPT_MASTER_ENABLE};

use crate::memory_mapped::{Bus, MemoryMapped};

/// The interrupt sources of the ARM7, numbered by their bit in `IE` and `IF`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 0,
    HBlank = 1,
    VCounter = 2,
    Timer0 = 3,
    Timer1 = 4,
    Timer2 = 5,
    Timer3 = 6,
    Serial = 7,
    Dma0 = 8,
    Dma1 = 9,
    Dma2 = 10,
    Dma3 = 11,
    Keypad = 12,
    Gamepak = 13,
    IpcSync = 16,
    IpcSendEmpty = 17,
    IpcReceiveNotEmpty = 18,
    CardTransferComplete = 19,
    CardLine = 20,
    LidOpened = 22,
    Spi = 23,
    Wifi = 24,
}

const INTERRUPT_COUNT: usize = 25;

impl Interrupt {
    const ALL: [Interrupt; 22] = [
        Interrupt::VBlank,
        Interrupt::HBlank,
        Interrupt::VCounter,
        Interrupt::Timer0,
        Interrupt::Timer1,
        Interrupt::Timer2,
        Interrupt::Timer3,
        Interrupt::Serial,
        Interrupt::Dma0,
        Interrupt::Dma1,
        Interrupt::Dma2,
        Interrupt::Dma3,
        Interrupt::Keypad,
        Interrupt::Gamepak,
        Interrupt::IpcSync,
        Interrupt::IpcSendEmpty,
        Interrupt::IpcReceiveNotEmpty,
        Interrupt::CardTransferComplete,
        Interrupt::CardLine,
        Interrupt::LidOpened,
        Interrupt::Spi,
        Interrupt::Wifi,
    ];

    /// The overflow interrupt of timer `index`, which must be in `0..=3`.
    pub(crate) const fn timer(index: usize) -> Self {
        match index {
            0 => Interrupt::Timer0,
            1 => Interrupt::Timer1,
            2 => Interrupt::Timer2,
            _ => Interrupt::Timer3,
        }
    }

    #[must_use]
    pub const fn flag(self) -> InterruptFlags {
        InterruptFlags::from_bits_retain(1 << self as u32)
    }
}

bitflags! {
    /// A set of interrupts, laid out like `IE` and `IF`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct InterruptFlags: u32 {
        const VBLANK = 1 << 0;
        const HBLANK = 1 << 1;
        const VCOUNTER = 1 << 2;
        const TIMER0 = 1 << 3;
        const TIMER1 = 1 << 4;
        const TIMER2 = 1 << 5;
        const TIMER3 = 1 << 6;
        const SERIAL = 1 << 7;
        const DMA0 = 1 << 8;
        const DMA1 = 1 << 9;
        const DMA2 = 1 << 10;
        const DMA3 = 1 << 11;
        const KEYPAD = 1 << 12;
        const GAMEPAK = 1 << 13;
        const IPC_SYNC = 1 << 16;
        const IPC_SEND_EMPTY = 1 << 17;
        const IPC_RECEIVE_NOT_EMPTY = 1 << 18;
        const CARD_TRANSFER_COMPLETE = 1 << 19;
        const CARD_LINE = 1 << 20;
        const LID_OPENED = 1 << 22;
        const SPI = 1 << 23;
        const WIFI = 1 << 24;
    }
}

impl From<Interrupt> for InterruptFlags {
    fn from(interrupt: Interrupt) -> Self {
        interrupt.flag()
    }
}

/// An interrupt handler. Runs in interrupt context, so it must be short and
/// must not wait for other interrupts.
pub type Handler = fn();

/// Something that can route an interrupt to a handler.
///
/// The timer and sound code only ever ask for a handler to be attached, how
/// interrupts actually get dispatched is up to the implementation.
pub trait InterruptController {
    /// Installs `handler` for `interrupt`, or removes the current one.
    fn set_handler(&self, interrupt: Interrupt, handler: Option<Handler>);
    /// Unmasks `interrupt`.
    fn enable(&self, interrupt: Interrupt);
    /// Masks `interrupt`.
    fn disable(&self, interrupt: Interrupt);
}

impl<T: InterruptController + ?Sized> InterruptController for &T {
    fn set_handler(&self, interrupt: Interrupt, handler: Option<Handler>) {
        (**self).set_handler(interrupt, handler);
    }

    fn enable(&self, interrupt: Interrupt) {
        (**self).enable(interrupt);
    }

    fn disable(&self, interrupt: Interrupt) {
        (**self).disable(interrupt);
    }
}

/// A table of handlers called straight from [`service`](Self::service).
///
/// The platform's IRQ vector is expected to call `service`, which keeps the
/// latency down to reading `IE` and `IF` and a table lookup.
#[derive(Debug)]
pub struct InterruptTable<B> {
    bus: B,
    handlers: [Mutex<Cell<Option<Handler>>>; INTERRUPT_COUNT],
}

impl<B: Bus> InterruptTable<B> {
    pub const fn new(bus: B) -> Self {
        Self {
            bus,
            handlers: [const { Mutex::new(Cell::new(None)) }; INTERRUPT_COUNT],
        }
    }

    fn master_enable_register(&self) -> MemoryMapped<&B, u16> {
        MemoryMapped::new(&self.bus, INTERRUPT_MASTER_ENABLE)
    }

    fn enable_register(&self) -> MemoryMapped<&B, u32> {
        MemoryMapped::new(&self.bus, INTERRUPT_ENABLE)
    }

    fn flags_register(&self) -> MemoryMapped<&B, u32> {
        MemoryMapped::new(&self.bus, INTERRUPT_FLAGS)
    }

    pub fn set_master_enable(&self, enabled: bool) {
        self.master_enable_register().set(enabled.into());
    }

    #[must_use]
    pub fn master_enabled(&self) -> bool {
        self.master_enable_register().get() & 1 != 0
    }

    /// The unmasked interrupts.
    #[must_use]
    pub fn enabled(&self) -> InterruptFlags {
        InterruptFlags::from_bits_retain(self.enable_register().get())
    }

    /// The interrupts the hardware has raised and nobody has acknowledged.
    #[must_use]
    pub fn pending(&self) -> InterruptFlags {
        InterruptFlags::from_bits_retain(self.flags_register().get())
    }

    /// Acknowledges the raised, unmasked interrupts and runs their handlers.
    ///
    /// Returns the interrupts that were serviced, so callers can drive work
    /// that doesn't fit in a plain [`Handler`].
    pub fn service(&self) -> InterruptFlags {
        let serviced = self.enabled() & self.pending();
        self.flags_register().set(serviced.bits());

        for interrupt in Interrupt::ALL {
            if serviced.contains(interrupt.flag()) {
                let handler =
                    critical_section::with(|cs| self.handlers[interrupt as usize].borrow(cs).get());

                if let Some(handler) = handler {
                    handler();
                }
            }
        }

        serviced
    }
}

impl<B: Bus> InterruptController for InterruptTable<B> {
    fn set_handler(&self, interrupt: Interrupt, handler: Option<Handler>) {
        critical_section::with(|cs| {
            self.handlers[interrupt as usize].borrow(cs).set(handler);
        });
    }

    fn enable(&self, interrupt: Interrupt) {
        critical_section::with(|_| {
            self.enable_register()
                .update(|enabled| *enabled |= interrupt.flag().bits());
        });
    }

    fn disable(&self, interrupt: Interrupt) {
        critical_section::with(|_| {
            self.enable_register()
                .update(|enabled| *enabled &= !interrupt.flag().bits());
        });
    }
}

/// The handler table for the real interrupt registers.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub static INTERRUPTS: InterruptTable<crate::memory_mapped::Hardware> =
    InterruptTable::new(unsafe { crate::memory_mapped::Hardware::new() });

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod critical_section_impl {
    use crate::memory_mapped::{Bus, Hardware};
    use critical_section::RawRestoreState;
    use nds7_reg::INTERRUPT_MASTER_ENABLE;

    struct InterruptMasterEnable;
    critical_section::set_impl!(InterruptMasterEnable);

    // Safety: the ARM7 has one core, so masking interrupts excludes everyone.
    unsafe impl critical_section::Impl for InterruptMasterEnable {
        unsafe fn acquire() -> RawRestoreState {
            let hardware = unsafe { Hardware::new() };
            let previous = hardware.read_u16(INTERRUPT_MASTER_ENABLE);
            hardware.write_u16(INTERRUPT_MASTER_ENABLE, 0);
            previous
        }

        unsafe fn release(restore: RawRestoreState) {
            let hardware = unsafe { Hardware::new() };
            hardware.write_u16(INTERRUPT_MASTER_ENABLE, restore);
        }
    }
}

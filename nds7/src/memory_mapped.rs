use core::marker::PhantomData;
use core::ops;

/// Volatile access to the ARM7 I/O space.
///
/// Every register read and write in this crate goes through a `Bus`. On the
/// console this is [`Hardware`], which performs volatile pointer accesses so
/// the compiler never merges, reorders or elides them. In tests it is an
/// in-memory register file.
pub trait Bus {
    fn read_u8(&self, address: usize) -> u8;
    fn read_u16(&self, address: usize) -> u16;
    fn read_u32(&self, address: usize) -> u32;

    fn write_u8(&self, address: usize, value: u8);
    fn write_u16(&self, address: usize, value: u16);
    fn write_u32(&self, address: usize, value: u32);
}

impl<T: Bus + ?Sized> Bus for &T {
    #[inline(always)]
    fn read_u8(&self, address: usize) -> u8 {
        (**self).read_u8(address)
    }

    #[inline(always)]
    fn read_u16(&self, address: usize) -> u16 {
        (**self).read_u16(address)
    }

    #[inline(always)]
    fn read_u32(&self, address: usize) -> u32 {
        (**self).read_u32(address)
    }

    #[inline(always)]
    fn write_u8(&self, address: usize, value: u8) {
        (**self).write_u8(address, value);
    }

    #[inline(always)]
    fn write_u16(&self, address: usize, value: u16) {
        (**self).write_u16(address, value);
    }

    #[inline(always)]
    fn write_u32(&self, address: usize, value: u32) {
        (**self).write_u32(address, value);
    }
}

/// The real memory mapped registers of the console.
#[derive(Clone, Copy, Debug)]
pub struct Hardware {
    _private: (),
}

impl Hardware {
    /// # Safety
    ///
    /// Must only be used when running on the ARM7 of a Nintendo DS, and only
    /// with addresses of memory mapped registers. Anywhere else this
    /// dereferences arbitrary integers as pointers.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Hardware { _private: () }
    }
}

impl Bus for Hardware {
    #[inline(always)]
    fn read_u8(&self, address: usize) -> u8 {
        unsafe { (address as *const u8).read_volatile() }
    }

    #[inline(always)]
    fn read_u16(&self, address: usize) -> u16 {
        unsafe { (address as *const u16).read_volatile() }
    }

    #[inline(always)]
    fn read_u32(&self, address: usize) -> u32 {
        unsafe { (address as *const u32).read_volatile() }
    }

    #[inline(always)]
    fn write_u8(&self, address: usize, value: u8) {
        unsafe { (address as *mut u8).write_volatile(value) }
    }

    #[inline(always)]
    fn write_u16(&self, address: usize, value: u16) {
        unsafe { (address as *mut u16).write_volatile(value) }
    }

    #[inline(always)]
    fn write_u32(&self, address: usize, value: u32) {
        unsafe { (address as *mut u32).write_volatile(value) }
    }
}

/// The widths a register can have.
pub trait RegisterValue: Copy {
    fn read<B: Bus + ?Sized>(bus: &B, address: usize) -> Self;
    fn write<B: Bus + ?Sized>(bus: &B, address: usize, value: Self);
}

macro_rules! register_value {
    ($ty: ty, $read: ident, $write: ident) => {
        impl RegisterValue for $ty {
            #[inline(always)]
            fn read<B: Bus + ?Sized>(bus: &B, address: usize) -> Self {
                bus.$read(address)
            }

            #[inline(always)]
            fn write<B: Bus + ?Sized>(bus: &B, address: usize, value: Self) {
                bus.$write(address, value)
            }
        }
    };
}

register_value!(u8, read_u8, write_u8);
register_value!(u16, read_u16, write_u16);
register_value!(u32, read_u32, write_u32);

/// A single register of type `T` at a fixed address.
#[derive(Clone, Copy, Debug)]
pub struct MemoryMapped<B, T> {
    bus: B,
    address: usize,
    _register: PhantomData<T>,
}

impl<B: Bus, T: RegisterValue> MemoryMapped<B, T> {
    pub const fn new(bus: B, address: usize) -> Self {
        MemoryMapped {
            bus,
            address,
            _register: PhantomData,
        }
    }

    #[must_use]
    pub const fn address(&self) -> usize {
        self.address
    }

    pub fn get(&self) -> T {
        T::read(&self.bus, self.address)
    }

    pub fn set(&self, value: T) {
        T::write(&self.bus, self.address, value);
    }

    /// Performs a read, lets you modify it, then writes the updated value
    /// back. This is not atomic with respect to interrupts.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let mut value = self.get();
        f(&mut value);
        self.set(value);
    }

    /// Reads the register as one of the bitfield types in [`nds7_reg`].
    pub fn get_as<R>(&self) -> R
    where
        R: From<T>,
    {
        R::from(self.get())
    }

    pub fn set_as<R>(&self, value: R)
    where
        T: From<R>,
    {
        self.set(T::from(value));
    }

    /// Like [`update`](Self::update) but through a bitfield type.
    pub fn update_as<R, F>(&self, f: F)
    where
        R: From<T>,
        T: From<R>,
        F: FnOnce(&mut R),
    {
        let mut value = R::from(self.get());
        f(&mut value);
        self.set(T::from(value));
    }
}

impl<B: Bus, T> MemoryMapped<B, T>
where
    T: RegisterValue
        + From<u8>
        + ops::Shl<Output = T>
        + ops::BitAnd<Output = T>
        + ops::Sub<Output = T>
        + ops::BitOr<Output = T>
        + ops::Not<Output = T>,
{
    pub fn set_bits(&self, value: T, length: T, shift: T) {
        let one: T = 1u8.into();
        let mask: T = (one << length) - one;
        let current_val = self.get();
        self.set((current_val & !(mask << shift)) | ((value & mask) << shift));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_bus::TestBus;

    #[test]
    fn set_bits_only_touches_the_field() {
        let bus = TestBus::new();
        let register = MemoryMapped::<_, u16>::new(&bus, 0x0400_0500);

        register.set(0b1010_0000_0000_0101);
        register.set_bits(0b11, 2, 1);

        assert_eq!(register.get(), 0b1010_0000_0000_0111);

        register.set_bits(0, 1, 15);
        assert_eq!(register.get(), 0b0010_0000_0000_0111);
    }

    #[test]
    fn set_bits_masks_oversized_values() {
        let bus = TestBus::new();
        let register = MemoryMapped::<_, u32>::new(&bus, 0x0400_0400);

        register.set_bits(0xff, 7, 16);

        assert_eq!(register.get(), 0x7f << 16);
    }

    #[test]
    fn update_round_trips_through_bitfields() {
        let bus = TestBus::new();
        let register = MemoryMapped::<_, u16>::new(&bus, 0x0400_0102);

        register.update_as(|control: &mut nds7_reg::TimerControl| {
            control.set_enable(true);
            control.set_divider(nds7_reg::TimerDivider::Divider256);
        });

        assert_eq!(register.get(), (1 << 7) | 2);
        let control: nds7_reg::TimerControl = register.get_as();
        assert!(control.enable());
    }
}

extern crate std;

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::vec::Vec;

use nds7_reg::{INTERRUPT_FLAGS, TIMER_COUNT, TimerControl, timer_control, timer_data};

use crate::memory_mapped::Bus;

/// A test implementation of [`Bus`] backed by an in-memory register file.
///
/// Plain registers behave like little endian memory that starts zeroed, so
/// the byte registers aliasing a wider register see its bytes. On top of that
/// it models the parts of the hardware the crate relies on:
///
/// * timer data registers latch the reload value on write and return the
///   running counter on read, and enabling a timer restarts its counter from
///   the reload value;
/// * [`advance_timer`](TestBus::advance_timer) counts, reloads on overflow,
///   feeds cascaded timers and raises the timer interrupt in `IF`;
/// * writing a one to a bit of `IF` acknowledges it;
/// * 16 bit reads can be scripted with [`queue_reads`](TestBus::queue_reads),
///   which is how serial transfers are faked.
///
/// Every write is recorded so tests can check the exact sequence the crate
/// produced.
#[derive(Debug, Default)]
pub struct TestBus {
    state: RefCell<State>,
}

#[derive(Debug, Default)]
struct State {
    memory: BTreeMap<usize, u8>,
    timers: [SimulatedTimer; TIMER_COUNT],
    read_queues: BTreeMap<usize, VecDeque<u16>>,
    writes: Vec<Access>,
}

#[derive(Debug, Default, Clone, Copy)]
struct SimulatedTimer {
    reload: u16,
    counter: u16,
    control: u16,
}

impl SimulatedTimer {
    fn control(&self) -> TimerControl {
        TimerControl::from(self.control)
    }

    /// Counts `ticks` and returns how many times the counter overflowed.
    fn count(&mut self, ticks: u32) -> u32 {
        let to_overflow = 0x1_0000 - u32::from(self.counter);
        if ticks < to_overflow {
            self.counter += ticks as u16;
            return 0;
        }

        let remaining = ticks - to_overflow;
        let period = 0x1_0000 - u32::from(self.reload);
        self.counter = self.reload + (remaining % period) as u16;

        1 + remaining / period
    }
}

/// The width of a recorded access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Halfword,
    Word,
}

/// A write performed through the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub address: usize,
    pub value: u32,
    pub width: Width,
}

enum TimerRegister {
    Data(usize),
    Control(usize),
}

fn timer_register(address: usize) -> Option<TimerRegister> {
    (0..TIMER_COUNT).find_map(|timer| {
        if address == timer_data(timer) {
            Some(TimerRegister::Data(timer))
        } else if address == timer_control(timer) {
            Some(TimerRegister::Control(timer))
        } else {
            None
        }
    })
}

impl State {
    fn read_memory(&self, address: usize, bytes: usize) -> u32 {
        (0..bytes).rev().fold(0, |value, offset| {
            (value << 8) | u32::from(self.memory.get(&(address + offset)).copied().unwrap_or(0))
        })
    }

    fn write_memory(&mut self, address: usize, value: u32, bytes: usize) {
        for offset in 0..bytes {
            self.memory
                .insert(address + offset, (value >> (8 * offset)) as u8);
        }
    }

    fn read_halfword(&mut self, address: usize) -> u16 {
        if let Some(value) = self
            .read_queues
            .get_mut(&address)
            .and_then(VecDeque::pop_front)
        {
            return value;
        }

        match timer_register(address) {
            Some(TimerRegister::Data(timer)) => self.timers[timer].counter,
            Some(TimerRegister::Control(timer)) => self.timers[timer].control,
            None => self.read_memory(address, 2) as u16,
        }
    }

    fn write_halfword(&mut self, address: usize, value: u16) {
        match timer_register(address) {
            Some(TimerRegister::Data(timer)) => self.timers[timer].reload = value,
            Some(TimerRegister::Control(timer)) => {
                let timer = &mut self.timers[timer];
                let was_enabled = timer.control().enable();
                timer.control = value;
                if !was_enabled && timer.control().enable() {
                    timer.counter = timer.reload;
                }
            }
            None => self.write_memory(address, u32::from(value), 2),
        }
    }

    fn advance_timer(&mut self, timer: usize, ticks: u32, from_cascade: bool) -> u32 {
        let control = self.timers[timer].control();
        let counts_clock = timer == 0 || !control.cascade();
        if !control.enable() || counts_clock == from_cascade {
            return 0;
        }

        let overflows = self.timers[timer].count(ticks);
        if overflows == 0 {
            return 0;
        }

        if control.interrupt() {
            let flags = self.read_memory(INTERRUPT_FLAGS, 4);
            self.write_memory(INTERRUPT_FLAGS, flags | (1 << (3 + timer)), 4);
        }

        if timer + 1 < TIMER_COUNT {
            self.advance_timer(timer + 1, overflows, true);
        }

        overflows
    }
}

impl TestBus {
    /// Create a register file where every register reads as zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets `ticks` prescaled clock ticks pass on `timer` and returns how
    /// many times it overflowed.
    ///
    /// Disabled timers and timers in cascade mode do not count. Overflows
    /// are passed on to the next timer if that one is in cascade mode.
    pub fn advance_timer(&self, timer: usize, ticks: u32) -> u32 {
        self.state.borrow_mut().advance_timer(timer, ticks, false)
    }

    /// Makes the next 16 bit reads of `address` return `values`, in order,
    /// before falling back to the stored value.
    pub fn queue_reads(&self, address: usize, values: impl IntoIterator<Item = u16>) {
        self.state
            .borrow_mut()
            .read_queues
            .entry(address)
            .or_default()
            .extend(values);
    }

    /// Sets bits in `IF` as if the hardware raised those interrupts.
    pub fn raise_interrupts(&self, flags: u32) {
        let mut state = self.state.borrow_mut();
        let current = state.read_memory(INTERRUPT_FLAGS, 4);
        state.write_memory(INTERRUPT_FLAGS, current | flags, 4);
    }

    /// Every write since creation or the last [`clear_writes`](Self::clear_writes).
    #[must_use]
    pub fn writes(&self) -> Vec<Access> {
        self.state.borrow().writes.clone()
    }

    /// The values written to `address`, in order.
    #[must_use]
    pub fn writes_to(&self, address: usize) -> Vec<u32> {
        self.state
            .borrow()
            .writes
            .iter()
            .filter(|access| access.address == address)
            .map(|access| access.value)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.state.borrow_mut().writes.clear();
    }

    fn record(&self, address: usize, value: u32, width: Width) {
        self.state.borrow_mut().writes.push(Access {
            address,
            value,
            width,
        });
    }
}

impl Bus for TestBus {
    fn read_u8(&self, address: usize) -> u8 {
        let aligned = address & !1;
        let halfword = self.read_u16(aligned);
        (halfword >> (8 * (address - aligned))) as u8
    }

    fn read_u16(&self, address: usize) -> u16 {
        self.state.borrow_mut().read_halfword(address)
    }

    fn read_u32(&self, address: usize) -> u32 {
        let low = self.read_u16(address);
        let high = self.read_u16(address + 2);
        u32::from(low) | (u32::from(high) << 16)
    }

    fn write_u8(&self, address: usize, value: u8) {
        self.record(address, u32::from(value), Width::Byte);

        let mut state = self.state.borrow_mut();
        if timer_register(address & !1).is_some() {
            let aligned = address & !1;
            let shift = 8 * (address - aligned);
            let current = state.read_halfword(aligned);
            let merged = (current & !(0xff << shift)) | (u16::from(value) << shift);
            state.write_halfword(aligned, merged);
        } else {
            state.write_memory(address, u32::from(value), 1);
        }
    }

    fn write_u16(&self, address: usize, value: u16) {
        self.record(address, u32::from(value), Width::Halfword);
        self.state.borrow_mut().write_halfword(address, value);
    }

    fn write_u32(&self, address: usize, value: u32) {
        self.record(address, value, Width::Word);

        let mut state = self.state.borrow_mut();
        if address == INTERRUPT_FLAGS {
            let current = state.read_memory(INTERRUPT_FLAGS, 4);
            state.write_memory(INTERRUPT_FLAGS, current & !value, 4);
        } else {
            state.write_halfword(address, value as u16);
            state.write_halfword(address + 2, (value >> 16) as u16);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMER_ENABLE: u16 = 1 << 7;
    const TIMER_IRQ: u16 = 1 << 6;
    const TIMER_CASCADE: u16 = 1 << 2;

    #[test]
    fn plain_registers_behave_like_memory() {
        let bus = TestBus::new();

        bus.write_u32(0x0400_0400, 0x1234_5678);

        assert_eq!(bus.read_u32(0x0400_0400), 0x1234_5678);
        assert_eq!(bus.read_u16(0x0400_0402), 0x1234);
        assert_eq!(bus.read_u8(0x0400_0400), 0x78);

        bus.write_u8(0x0400_0402, 0xff);
        assert_eq!(bus.read_u32(0x0400_0400), 0x12ff_5678);
    }

    #[test]
    fn timer_data_latches_reload_and_reads_counter() {
        let bus = TestBus::new();

        bus.write_u16(timer_data(1), 0xff00);
        assert_eq!(bus.read_u16(timer_data(1)), 0, "counter is untouched");

        bus.write_u16(timer_control(1), TIMER_ENABLE);
        assert_eq!(bus.read_u16(timer_data(1)), 0xff00);
    }

    #[test]
    fn counting_reloads_on_overflow() {
        let bus = TestBus::new();

        bus.write_u16(timer_data(0), 0xfff0);
        bus.write_u16(timer_control(0), TIMER_ENABLE);

        assert_eq!(bus.advance_timer(0, 0xf), 0);
        assert_eq!(bus.read_u16(timer_data(0)), 0xffff);

        assert_eq!(bus.advance_timer(0, 1), 1);
        assert_eq!(bus.read_u16(timer_data(0)), 0xfff0);

        assert_eq!(bus.advance_timer(0, 0x10 * 3 + 2), 3);
        assert_eq!(bus.read_u16(timer_data(0)), 0xfff2);
    }

    #[test]
    fn disabled_timers_do_not_count() {
        let bus = TestBus::new();

        assert_eq!(bus.advance_timer(2, 0x2_0000), 0);
        assert_eq!(bus.read_u16(timer_data(2)), 0);
    }

    #[test]
    fn overflow_requests_interrupt_when_asked_to() {
        let bus = TestBus::new();

        bus.write_u16(timer_data(2), 0xffff);
        bus.write_u16(timer_control(2), TIMER_ENABLE | TIMER_IRQ);
        bus.advance_timer(2, 1);

        assert_eq!(bus.read_u32(INTERRUPT_FLAGS), 1 << 5);

        bus.write_u32(INTERRUPT_FLAGS, 1 << 5);
        assert_eq!(bus.read_u32(INTERRUPT_FLAGS), 0);
    }

    #[test]
    fn cascade_counts_overflows_of_previous_timer() {
        let bus = TestBus::new();

        bus.write_u16(timer_data(0), 0xff00);
        bus.write_u16(timer_control(0), TIMER_ENABLE);
        bus.write_u16(timer_control(1), TIMER_ENABLE | TIMER_CASCADE);

        bus.advance_timer(0, 0x100 * 5);
        assert_eq!(bus.read_u16(timer_data(1)), 5);

        assert_eq!(
            bus.advance_timer(1, 100),
            0,
            "cascaded timers ignore the clock"
        );
    }

    #[test]
    fn queued_reads_come_first() {
        let bus = TestBus::new();

        bus.write_u16(0x0400_01C2, 7);
        bus.queue_reads(0x0400_01C2, [1, 2]);

        assert_eq!(bus.read_u16(0x0400_01C2), 1);
        assert_eq!(bus.read_u16(0x0400_01C2), 2);
        assert_eq!(bus.read_u16(0x0400_01C2), 7);
    }

    #[test]
    fn writes_are_recorded_in_order() {
        let bus = TestBus::new();

        bus.write_u16(0x0400_01C0, 1);
        bus.write_u8(0x0400_0400, 2);
        bus.write_u16(0x0400_01C0, 3);

        assert_eq!(bus.writes_to(0x0400_01C0), [1, 3]);
        assert_eq!(
            bus.writes()[1],
            Access {
                address: 0x0400_0400,
                value: 2,
                width: Width::Byte
            }
        );

        bus.clear_writes();
        assert!(bus.writes().is_empty());
    }
}

use nds7_reg::{
    TIMER_COUNT, TimerControl, TimerDivider, timer_control_unchecked, timer_data_unchecked,
};

use crate::{
    Error,
    interrupt::{Handler, Interrupt, InterruptController},
    memory_mapped::{Bus, MemoryMapped},
};

/// The ARM7 bus clock timers count from, in Hz.
pub const BUS_CLOCK: u32 = 0x200_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Divider {
    // 33.514MHz or 29.8ns
    Divider1,
    // 523.7kHz or 1.91us
    Divider64,
    // 130.9kHz or 7.64us
    Divider256,
    // 32.73kHz or 30.55us
    Divider1024,
}

impl Divider {
    fn bits(self) -> TimerDivider {
        match self {
            Divider::Divider1 => TimerDivider::Divider1,
            Divider::Divider64 => TimerDivider::Divider64,
            Divider::Divider256 => TimerDivider::Divider256,
            Divider::Divider1024 => TimerDivider::Divider1024,
        }
    }

    const fn shift(self) -> u32 {
        match self {
            Divider::Divider1 => 0,
            Divider::Divider64 => 6,
            Divider::Divider256 => 8,
            Divider::Divider1024 => 10,
        }
    }

    /// The frequency the counter ticks at.
    #[must_use]
    pub const fn clock(self) -> u32 {
        BUS_CLOCK >> self.shift()
    }

    /// The lowest and highest overflow frequencies this divider can produce.
    ///
    /// The lowest frequency of [`Divider1024`](Divider::Divider1024) is
    /// really half a hertz, which rounds up to 1.
    #[must_use]
    pub const fn frequency_range(self) -> (u32, u32) {
        let max = self.clock();
        let min = max >> 16;
        (if min == 0 { 1 } else { min }, max)
    }

    /// The reload value which makes the timer overflow `frequency` times a
    /// second.
    ///
    /// Frequencies outside [`frequency_range`](Self::frequency_range) give
    /// wrapped, meaningless reload values, and 0 gives 0.
    #[must_use]
    pub const fn frequency_to_ticks(self, frequency: u32) -> u16 {
        let clock = self.clock() as i64;
        match (-clock).checked_div(frequency as i64) {
            Some(ticks) => ticks as u16,
            None => 0,
        }
    }

    pub fn checked_frequency_to_ticks(self, frequency: u32) -> Result<u16, Error> {
        let (min, max) = self.frequency_range();
        if (min..=max).contains(&frequency) {
            Ok(self.frequency_to_ticks(frequency))
        } else {
            Err(Error::FrequencyOutOfRange {
                frequency,
                min,
                max,
            })
        }
    }

    /// The overflow frequency produced by the reload value `ticks`.
    #[must_use]
    pub const fn ticks_to_frequency(self, ticks: u16) -> u32 {
        let period = 0x1_0000 - ticks as u32;
        self.clock() / period
    }
}

pub const fn frequency_to_ticks_1(frequency: u32) -> u16 {
    Divider::Divider1.frequency_to_ticks(frequency)
}

pub const fn frequency_to_ticks_64(frequency: u32) -> u16 {
    Divider::Divider64.frequency_to_ticks(frequency)
}

pub const fn frequency_to_ticks_256(frequency: u32) -> u16 {
    Divider::Divider256.frequency_to_ticks(frequency)
}

pub const fn frequency_to_ticks_1024(frequency: u32) -> u16 {
    Divider::Divider1024.frequency_to_ticks(frequency)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Disabled,
    Running,
}

/// One of the four hardware timers.
///
/// Reading the data register gives the running counter while writing it sets
/// the value the counter is reloaded with on overflow. The reload value can't
/// be read back, so the last value written through this type is remembered.
#[derive(Debug)]
pub struct Timer<B> {
    bus: B,
    index: usize,
    reload: u16,
    last: u16,
}

#[derive(Debug)]
#[non_exhaustive]
pub struct TimerController<B> {
    pub timer0: Timer<B>,
    pub timer1: Timer<B>,
    pub timer2: Timer<B>,
    pub timer3: Timer<B>,
}

impl<B: Bus + Clone> TimerController<B> {
    pub(crate) fn new(bus: B) -> Self {
        Self {
            timer0: Timer::new(bus.clone(), 0),
            timer1: Timer::new(bus.clone(), 1),
            timer2: Timer::new(bus.clone(), 2),
            timer3: Timer::new(bus, 3),
        }
    }
}

impl<B> TimerController<B> {
    pub fn timer(&mut self, index: usize) -> Result<&mut Timer<B>, Error> {
        match index {
            0 => Ok(&mut self.timer0),
            1 => Ok(&mut self.timer1),
            2 => Ok(&mut self.timer2),
            3 => Ok(&mut self.timer3),
            _ => Err(Error::InvalidTimer(index)),
        }
    }
}

impl<B: Bus> Timer<B> {
    fn new(bus: B, index: usize) -> Self {
        debug_assert!(index < TIMER_COUNT);

        Self {
            bus,
            index,
            reload: 0,
            last: 0,
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The interrupt raised when this timer overflows.
    #[must_use]
    pub fn interrupt(&self) -> Interrupt {
        Interrupt::timer(self.index)
    }

    /// Sets the timer up to count from `ticks` with `divider` and starts it.
    ///
    /// With a handler, the handler is installed and the timer interrupt
    /// unmasked, so the handler runs on every overflow. Without one the timer
    /// requests no interrupt and its interrupt stays masked. The interrupt is
    /// masked while the handler is swapped.
    pub fn create(
        &mut self,
        divider: Divider,
        ticks: u16,
        handler: Option<Handler>,
        interrupts: &impl InterruptController,
    ) {
        let interrupt = self.interrupt();
        interrupts.disable(interrupt);
        interrupts.set_handler(interrupt, handler);

        self.configure(divider, ticks, handler.is_some());

        if handler.is_some() {
            interrupts.enable(interrupt);
        }
    }

    /// Like [`create`](Self::create), but leaves the interrupt table alone.
    /// `interrupt` only decides whether the timer requests an interrupt on
    /// overflow.
    pub fn configure(&mut self, divider: Divider, ticks: u16, interrupt: bool) {
        self.control_register().set(0);
        self.set_reload(ticks);

        let mut control = TimerControl::from(0u16);
        control.set_divider(divider.bits());
        control.set_interrupt(interrupt);
        control.set_enable(true);
        self.control_register().set_as(control);

        self.last = ticks;

        log::trace!(
            "timer {} running with {:?} from {:#06x}",
            self.index,
            divider,
            ticks
        );
    }

    /// The number of ticks since the previous call, or since the timer was
    /// configured.
    ///
    /// The counter is only 16 bits wide, so this is only correct if it was
    /// called at least once per 65536 ticks. With a non-zero reload, an
    /// overflow in between undercounts by the reload value.
    pub fn elapsed(&mut self) -> u16 {
        let current = self.value();
        let elapsed = current.wrapping_sub(self.last);
        self.last = current;
        elapsed
    }

    #[must_use]
    pub fn value(&self) -> u16 {
        self.data_register().get()
    }

    #[must_use]
    pub fn reload(&self) -> u16 {
        self.reload
    }

    pub fn set_reload(&mut self, ticks: u16) {
        self.reload = ticks;
        self.data_register().set(ticks);
    }

    /// Overflow every `n` ticks.
    pub fn set_overflow_amount(&mut self, n: u16) {
        let count_up_value = 0u16.wrapping_sub(n);
        self.set_reload(count_up_value);
    }

    pub fn set_divider(&mut self, divider: Divider) {
        self.control_register()
            .update_as(|control: &mut TimerControl| control.set_divider(divider.bits()));
    }

    pub fn set_cascade(&mut self, cascade: bool) {
        self.control_register().set_bits(cascade.into(), 1, 2);
    }

    pub fn set_interrupt(&mut self, interrupt: bool) {
        self.control_register().set_bits(interrupt.into(), 1, 6);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.control_register().set_bits(enabled.into(), 1, 7);
    }

    pub fn start(&mut self) {
        self.set_enabled(true);
    }

    pub fn stop(&mut self) {
        self.set_enabled(false);
    }

    #[must_use]
    pub fn state(&self) -> TimerState {
        if self.control().enable() {
            TimerState::Running
        } else {
            TimerState::Disabled
        }
    }

    #[must_use]
    pub fn control(&self) -> TimerControl {
        self.control_register().get_as()
    }

    pub fn set_control(&mut self, control: TimerControl) {
        self.control_register().set_as(control);
    }

    fn data_register(&self) -> MemoryMapped<&B, u16> {
        MemoryMapped::new(&self.bus, timer_data_unchecked(self.index))
    }

    fn control_register(&self) -> MemoryMapped<&B, u16> {
        MemoryMapped::new(&self.bus, timer_control_unchecked(self.index))
    }
}

#[cfg(test)]
mod test {
    use core::sync::atomic::{AtomicU32, Ordering};

    use quickcheck::quickcheck;

    use super::*;
    use crate::{interrupt::InterruptTable, test_bus::TestBus};

    fn in_range(divider: Divider, frequency: u32) -> u32 {
        let (min, max) = divider.frequency_range();
        min + frequency % (max - min + 1)
    }

    const DIVIDERS: [Divider; 4] = [
        Divider::Divider1,
        Divider::Divider64,
        Divider::Divider256,
        Divider::Divider1024,
    ];

    #[test]
    fn sixteen_kilohertz_reload_matches_hardware_value() {
        assert_eq!(frequency_to_ticks_1(16_000), 0xF7CF);
        assert_eq!(frequency_to_ticks_64(8), 0);
        assert_eq!(frequency_to_ticks_256(2), 0);
        assert_eq!(frequency_to_ticks_1024(32_768), 0xFFFF);
    }

    #[test]
    fn documented_ranges() {
        assert_eq!(Divider::Divider1.frequency_range(), (512, 33_554_432));
        assert_eq!(Divider::Divider64.frequency_range(), (8, 524_288));
        assert_eq!(Divider::Divider256.frequency_range(), (2, 131_072));
        assert_eq!(Divider::Divider1024.frequency_range(), (1, 32_768));
    }

    #[test]
    fn out_of_range_frequencies_are_rejected_only_when_checked() {
        assert_eq!(
            Divider::Divider1.checked_frequency_to_ticks(100),
            Err(Error::FrequencyOutOfRange {
                frequency: 100,
                min: 512,
                max: 33_554_432
            })
        );
        assert_eq!(Divider::Divider1.frequency_to_ticks(0), 0);
        assert_eq!(
            Divider::Divider1.frequency_to_ticks(100),
            (-0x200_0000i32 / 100) as u16
        );
        assert_eq!(
            Divider::Divider256.checked_frequency_to_ticks(1000),
            Ok(0xFF7D)
        );
    }

    quickcheck! {
        fn period_shrinks_as_frequency_grows(a: u32, b: u32, divider: u8) -> bool {
            let divider = DIVIDERS[usize::from(divider % 4)];
            let a = in_range(divider, a);
            let b = in_range(divider, b);
            let (low, high) = if a <= b { (a, b) } else { (b, a) };

            let period = |frequency| 0x1_0000 - u32::from(divider.frequency_to_ticks(frequency));
            period(low) >= period(high)
        }

        fn ticks_survive_a_round_trip(frequency: u32, divider: u8) -> bool {
            let divider = DIVIDERS[usize::from(divider % 4)];
            let ticks = divider.frequency_to_ticks(in_range(divider, frequency));

            divider.frequency_to_ticks(divider.ticks_to_frequency(ticks)) == ticks
        }

        fn elapsed_is_the_forward_distance(start: u16, distance: u16) -> bool {
            let bus = TestBus::new();
            let mut timers = TimerController::new(&bus);
            let timer = &mut timers.timer1;

            timer.configure(Divider::Divider1, 0, false);
            bus.advance_timer(1, u32::from(start));
            timer.elapsed();

            bus.advance_timer(1, u32::from(distance));
            timer.elapsed() == distance
        }
    }

    #[test]
    fn elapsed_spans_a_wrap() {
        let bus = TestBus::new();
        let mut timers = TimerController::new(&bus);
        let timer = &mut timers.timer2;

        timer.configure(Divider::Divider64, 0, false);
        bus.advance_timer(2, 0xFFF0);
        assert_eq!(timer.elapsed(), 0xFFF0);

        bus.advance_timer(2, 0x20);
        assert_eq!(timer.value(), 0x10);
        assert_eq!(timer.elapsed(), 0x20);
    }

    #[test]
    fn elapsed_over_a_reload_misses_the_reload_value() {
        let bus = TestBus::new();
        let mut timers = TimerController::new(&bus);
        let timer = &mut timers.timer2;

        timer.configure(Divider::Divider64, 0xFFF0, false);
        assert_eq!(timer.elapsed(), 0);

        bus.advance_timer(2, 0x18);
        assert_eq!(timer.value(), 0xFFF8);
        assert_eq!(timer.elapsed(), 0x8);
    }

    static SIXTEEN_KHZ_OVERFLOWS: AtomicU32 = AtomicU32::new(0);

    fn count_overflow() {
        SIXTEEN_KHZ_OVERFLOWS.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn sixteen_kilohertz_timer_overflows_once_per_period() {
        let bus = TestBus::new();
        let interrupts = InterruptTable::new(&bus);
        interrupts.set_master_enable(true);
        let mut timers = TimerController::new(&bus);
        let timer = &mut timers.timer0;

        let ticks = frequency_to_ticks_1(16_000);
        timer.create(Divider::Divider1, ticks, Some(count_overflow), &interrupts);

        let period = 0x1_0000 - u32::from(ticks);
        assert_eq!(period, 2097);

        assert_eq!(bus.advance_timer(0, period), 1);
        interrupts.service();

        assert_eq!(SIXTEEN_KHZ_OVERFLOWS.load(Ordering::Relaxed), 1);
        assert_eq!(timer.value(), ticks);
        assert_eq!(timer.elapsed(), 0);

        bus.advance_timer(0, 10);
        interrupts.service();
        assert_eq!(timer.elapsed(), 10);
        assert_eq!(SIXTEEN_KHZ_OVERFLOWS.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn create_without_handler_requests_no_interrupt() {
        let bus = TestBus::new();
        let interrupts = InterruptTable::new(&bus);
        let mut timers = TimerController::new(&bus);

        timers
            .timer3
            .create(Divider::Divider1024, 0xFF00, None, &interrupts);

        let control = timers.timer3.control();
        assert!(control.enable());
        assert!(!control.interrupt());
        assert_eq!(control.divider(), TimerDivider::Divider1024);
        assert!(!interrupts.enabled().contains(Interrupt::Timer3.into()));

        bus.advance_timer(3, 0x100);
        assert_eq!(bus.read_u32(nds7_reg::INTERRUPT_FLAGS), 0);
    }

    #[test]
    fn create_stops_before_reprogramming() {
        let bus = TestBus::new();
        let interrupts = InterruptTable::new(&bus);
        let mut timers = TimerController::new(&bus);

        timers
            .timer1
            .create(Divider::Divider64, 0x1234, None, &interrupts);

        assert_eq!(bus.writes_to(nds7_reg::TIMER_1_CONTROL), [0, (1 << 7) | 1]);
        assert_eq!(bus.writes_to(nds7_reg::TIMER_1_DATA), [0x1234]);
        assert_eq!(timers.timer1.reload(), 0x1234);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let bus = TestBus::new();
        let mut timers = TimerController::new(&bus);
        let timer = &mut timers.timer0;

        timer.configure(Divider::Divider256, 0, true);
        let running = timer.control();

        timer.start();
        timer.start();
        assert_eq!(timer.state(), TimerState::Running);
        assert_eq!(timer.control(), running);

        timer.stop();
        let stopped = timer.control();
        timer.stop();
        assert_eq!(timer.state(), TimerState::Disabled);
        assert_eq!(timer.control(), stopped);
        assert!(stopped.interrupt(), "stop only touches the enable bit");
    }

    #[test]
    fn restarting_reloads_the_counter() {
        let bus = TestBus::new();
        let mut timers = TimerController::new(&bus);
        let timer = &mut timers.timer0;

        timer.configure(Divider::Divider1, 0x8000, false);
        bus.advance_timer(0, 0x100);
        timer.stop();
        timer.start();

        assert_eq!(timer.value(), 0x8000);
    }

    #[test]
    fn field_setters_touch_only_their_bits() {
        let bus = TestBus::new();
        let mut timers = TimerController::new(&bus);
        let timer = &mut timers.timer1;

        timer.set_divider(Divider::Divider256);
        timer.set_cascade(true);
        timer.set_interrupt(true);
        assert_eq!(u16::from(timer.control()), 2 | (1 << 2) | (1 << 6));

        timer.set_cascade(false);
        assert_eq!(u16::from(timer.control()), 2 | (1 << 6));
    }

    #[test]
    fn overflow_amount_is_the_negated_reload() {
        let bus = TestBus::new();
        let mut timers = TimerController::new(&bus);

        timers.timer2.set_overflow_amount(100);

        assert_eq!(timers.timer2.reload(), 0xFF9C);
        assert_eq!(bus.writes_to(nds7_reg::TIMER_2_DATA), [0xFF9C]);
    }

    #[test]
    fn timers_are_looked_up_by_index() {
        let bus = TestBus::new();
        let mut timers = TimerController::new(&bus);

        assert_eq!(timers.timer(2).map(|timer| timer.index()), Ok(2));
        assert_eq!(
            timers.timer(4).map(|timer| timer.index()),
            Err(Error::InvalidTimer(4))
        );
    }
}

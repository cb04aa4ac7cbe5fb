use core::cell::RefCell;

use critical_section::Mutex;

use crate::{
    Error,
    interrupt::InterruptController,
    memory_mapped::Bus,
    timer::{Divider, Timer, frequency_to_ticks_1},
};

/// The rate [`Microphone::start_recording`] samples at, in Hz.
pub const MICROPHONE_SAMPLE_RATE: u32 = 16_000;

/// The reload value giving [`MICROPHONE_SAMPLE_RATE`] with [`Divider::Divider1`].
pub const MICROPHONE_TIMER_TICKS: u16 = frequency_to_ticks_1(MICROPHONE_SAMPLE_RATE);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmplifierState {
    Off = 0,
    On = 1,
}

/// Powers the microphone amplifier.
pub trait Amplifier {
    fn set_amplifier(&mut self, state: AmplifierState);
}

/// Reads one unsigned 8 bit microphone sample, centred on `0x80`.
///
/// While recording it is called from the timer interrupt, so it has to find
/// the hardware by itself.
pub type Sampler = fn() -> u8;

/// The microphone: an amplifier and somewhere to read samples from.
#[derive(Debug)]
pub struct Microphone<A> {
    amplifier: A,
    sampler: Sampler,
}

impl<A: Amplifier> Microphone<A> {
    pub const fn new(amplifier: A, sampler: Sampler) -> Self {
        Self { amplifier, sampler }
    }

    pub fn turn_on(&mut self) {
        self.amplifier.set_amplifier(AmplifierState::On);
    }

    pub fn turn_off(&mut self) {
        self.amplifier.set_amplifier(AmplifierState::Off);
    }

    /// Reads a single sample, converted to signed.
    #[must_use]
    pub fn read_sample(&self) -> i8 {
        to_signed((self.sampler)())
    }

    /// Starts recording into `buffer` at 16kHz.
    ///
    /// The amplifier is turned on and `timer` is set to overflow at
    /// [`MICROPHONE_SAMPLE_RATE`]. [`process_microphone_timer_irq`] is
    /// installed as the timer's interrupt handler and takes one sample per
    /// overflow until `buffer` is full. Later samples are dropped.
    ///
    /// There is only one recording at a time. If another one is running this
    /// returns [`Error::RecordingInProgress`] and `buffer` is dropped.
    ///
    /// ```rust,no_run
    /// # fn test(arm7: &mut nds7::Arm7<nds7::Hardware>) -> Result<(), nds7::Error> {
    /// # let interrupts = nds7::interrupt::InterruptTable::new(unsafe { nds7::Hardware::new() });
    /// static mut BUFFER: [i8; 4096] = [0; 4096];
    ///
    /// // Safety: nothing else refers to BUFFER
    /// let buffer = unsafe { &mut *(&raw mut BUFFER) };
    /// let recording = arm7
    ///     .microphone
    ///     .start_recording(&mut arm7.timers.timer0, buffer, &interrupts)?;
    ///
    /// while recording.samples_recorded() < 4096 {}
    ///
    /// let recorded = recording.stop();
    /// assert_eq!(recorded.samples().len(), 4096);
    /// # Ok(())
    /// # }
    /// ```
    pub fn start_recording<'a, B: Bus, I: InterruptController>(
        &'a mut self,
        timer: &'a mut Timer<B>,
        buffer: &'static mut [i8],
        interrupts: &'a I,
    ) -> Result<Recording<'a, A, B, I>, Error> {
        let length = buffer.len();
        let session = Session {
            sampler: self.sampler,
            buffer,
            offset: 0,
        };

        critical_section::with(|cs| {
            let mut slot = SESSION.borrow_ref_mut(cs);
            if slot.is_some() {
                return Err(Error::RecordingInProgress);
            }

            *slot = Some(session);
            Ok(())
        })?;

        self.turn_on();
        timer.create(
            Divider::Divider1,
            MICROPHONE_TIMER_TICKS,
            Some(process_microphone_timer_irq),
            interrupts,
        );

        log::debug!("recording {} samples on timer {}", length, timer.index());

        Ok(Recording {
            amplifier: &mut self.amplifier,
            timer,
            interrupts,
            stopped: false,
        })
    }
}

fn to_signed(sample: u8) -> i8 {
    (sample ^ 0x80) as i8
}

struct Session {
    sampler: Sampler,
    buffer: &'static mut [i8],
    offset: usize,
}

impl Session {
    fn advance(&mut self) {
        if let Some(slot) = self.buffer.get_mut(self.offset) {
            *slot = to_signed((self.sampler)());
            self.offset += 1;
        }
    }
}

static SESSION: Mutex<RefCell<Option<Session>>> = Mutex::new(RefCell::new(None));

/// Takes one sample into the running recording.
///
/// This is the timer handler [`Microphone::start_recording`] installs. It
/// does nothing when no recording is running or its buffer is full.
pub fn process_microphone_timer_irq() {
    critical_section::with(|cs| {
        if let Some(session) = SESSION.borrow_ref_mut(cs).as_mut() {
            session.advance();
        }
    });
}

/// The buffer of a finished recording, see [`Recording::stop`].
#[derive(Debug)]
pub struct Recorded {
    buffer: &'static mut [i8],
    length: usize,
}

impl Recorded {
    /// The number of samples captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The captured samples, the start of the buffer.
    #[must_use]
    pub fn samples(&self) -> &[i8] {
        &self.buffer[..self.length]
    }

    /// The whole buffer, to record into again.
    #[must_use]
    pub fn into_buffer(self) -> &'static mut [i8] {
        self.buffer
    }
}

/// A recording in progress, see [`Microphone::start_recording`].
///
/// Dropping it stops the recording the same way [`stop`](Self::stop) does,
/// but the buffer is lost.
pub struct Recording<'a, A: Amplifier, B: Bus, I: InterruptController> {
    amplifier: &'a mut A,
    timer: &'a mut Timer<B>,
    interrupts: &'a I,
    stopped: bool,
}

impl<A: Amplifier, B: Bus, I: InterruptController> Recording<'_, A, B, I> {
    #[must_use]
    pub fn samples_recorded(&self) -> usize {
        critical_section::with(|cs| {
            SESSION
                .borrow_ref(cs)
                .as_ref()
                .map_or(0, |session| session.offset)
        })
    }

    /// Stops the timer, removes its handler, turns the amplifier off and
    /// hands the buffer back.
    pub fn stop(mut self) -> Recorded {
        match self.finish() {
            Some(session) => {
                log::debug!("recorded {} samples", session.offset);

                Recorded {
                    buffer: session.buffer,
                    length: session.offset,
                }
            }
            None => Recorded {
                buffer: Default::default(),
                length: 0,
            },
        }
    }

    fn finish(&mut self) -> Option<Session> {
        if self.stopped {
            return None;
        }
        self.stopped = true;

        self.timer.stop();
        let interrupt = self.timer.interrupt();
        self.interrupts.disable(interrupt);
        self.interrupts.set_handler(interrupt, None);
        self.amplifier.set_amplifier(AmplifierState::Off);

        critical_section::with(|cs| SESSION.borrow_ref_mut(cs).take())
    }
}

impl<A: Amplifier, B: Bus, I: InterruptController> Drop for Recording<'_, A, B, I> {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

impl<A: Amplifier, B: Bus, I: InterruptController> core::fmt::Debug for Recording<'_, A, B, I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Recording")
            .field("timer", &self.timer.index())
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

/// Serialises the tests using the recording slot, which is shared by every
/// test thread.
#[cfg(test)]
pub(crate) fn exclusive_session() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

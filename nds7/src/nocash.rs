//! Debug output for the no$gba emulator.
//!
//! no$gba exposes a character output port in unused I/O space. Writes to it
//! show up in the emulator's debug message window. On hardware, and in
//! emulators without the port, the identification string isn't there and
//! nothing is written.

use core::fmt::{self, Write};

use crate::memory_mapped::Bus;

const EMULATOR_ID: usize = 0x04FF_FA00;
const CHARACTER_OUTPUT: usize = 0x04FF_FA1C;

const EXPECTED_ID: &[u8] = b"no$gba";

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum DebugLevel {
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
}

impl DebugLevel {
    fn prefix(self) -> &'static str {
        match self {
            DebugLevel::Fatal => "[FATAL] ",
            DebugLevel::Error => "[ERROR] ",
            DebugLevel::Warning => "[WARN] ",
            DebugLevel::Info => "",
            DebugLevel::Debug => "[DEBUG] ",
        }
    }
}

impl From<log::Level> for DebugLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => DebugLevel::Error,
            log::Level::Warn => DebugLevel::Warning,
            log::Level::Info => DebugLevel::Info,
            log::Level::Debug | log::Level::Trace => DebugLevel::Debug,
        }
    }
}

fn is_running_in_nocash<B: Bus>(bus: &B) -> bool {
    EXPECTED_ID
        .iter()
        .enumerate()
        .all(|(offset, &expected)| bus.read_u8(EMULATOR_ID + offset) == expected)
}

#[derive(Debug)]
pub struct NoCash<B> {
    bus: B,
}

impl<B: Bus> NoCash<B> {
    #[must_use]
    pub fn new(bus: B) -> Option<Self> {
        if is_running_in_nocash(&bus) {
            Some(NoCash { bus })
        } else {
            None
        }
    }

    /// Prints one line.
    pub fn print(&mut self, output: fmt::Arguments, level: DebugLevel) -> fmt::Result {
        let mut writer = NoCashWriter { bus: &self.bus };
        writeln!(&mut writer, "{}{output}", level.prefix())
    }

    /// Prints a record from the `log` crate, prefixed with its target.
    pub fn log(&mut self, record: &log::Record) -> fmt::Result {
        self.print(
            format_args!("{}: {}", record.target(), record.args()),
            record.level().into(),
        )
    }
}

struct NoCashWriter<'a, B> {
    bus: &'a B,
}

impl<B: Bus> Write for NoCashWriter<'_, B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.bus.write_u8(CHARACTER_OUTPUT, b);
        }
        Ok(())
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod logger {
    use crate::memory_mapped::Hardware;

    use super::NoCash;

    pub(super) struct Logger;

    pub(super) static LOGGER: Logger = Logger;

    impl log::Log for Logger {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &log::Record) {
            if !self.enabled(record.metadata()) {
                return;
            }

            if let Some(mut nocash) = NoCash::new(unsafe { Hardware::new() }) {
                let _ = nocash.log(record);
            }
        }

        fn flush(&self) {}
    }
}

/// Sends the `log` crate's output to the no$gba debug window.
///
/// # Safety
///
/// Must not race with anything else setting the logger or the maximum level,
/// so call it once at start up before enabling interrupts.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub unsafe fn init(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    unsafe {
        log::set_logger_racy(&logger::LOGGER)?;
        log::set_max_level_racy(level);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::{string::String, vec::Vec};

    use super::*;
    use crate::test_bus::TestBus;

    fn emulated() -> TestBus {
        let bus = TestBus::new();
        for (offset, &byte) in b"no$gba v3.05".iter().enumerate() {
            bus.write_u8(EMULATOR_ID + offset, byte);
        }
        bus.clear_writes();
        bus
    }

    fn output(bus: &TestBus) -> String {
        let bytes: Vec<u8> = bus
            .writes_to(CHARACTER_OUTPUT)
            .into_iter()
            .map(|byte| byte as u8)
            .collect();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn not_detected_without_id() {
        let bus = TestBus::new();
        assert!(NoCash::new(&bus).is_none());
    }

    #[test]
    fn prints_a_line_per_call() {
        let bus = emulated();
        let mut nocash = NoCash::new(&bus).unwrap();

        nocash
            .print(format_args!("{} samples", 42), DebugLevel::Info)
            .unwrap();
        nocash
            .print(format_args!("out of range"), DebugLevel::Error)
            .unwrap();

        assert_eq!(output(&bus), "42 samples\n[ERROR] out of range\n");
    }

    #[test]
    fn log_records_carry_their_target() {
        let bus = emulated();
        let mut nocash = NoCash::new(&bus).unwrap();

        nocash
            .log(
                &log::Record::builder()
                    .args(format_args!("timer 0 running"))
                    .level(log::Level::Trace)
                    .target("nds7::timer")
                    .build(),
            )
            .unwrap();

        assert_eq!(output(&bus), "[DEBUG] nds7::timer: timer 0 running\n");
    }
}

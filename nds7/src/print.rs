use core::fmt::Arguments;

use crate::{
    memory_mapped::Hardware,
    nocash::{DebugLevel, NoCash},
};

fn print(args: Arguments, level: DebugLevel) {
    if let Some(mut nocash) = NoCash::new(unsafe { Hardware::new() }) {
        let _ = nocash.print(args, level);
    }
}

#[doc(hidden)]
pub fn println(args: Arguments) {
    print(args, DebugLevel::Info);
}

#[doc(hidden)]
pub fn eprintln(args: Arguments) {
    print(args, DebugLevel::Error);
}

/// Works like [`std::println`](https://doc.rust-lang.org/stable/std/macro.println.html).
///
/// Prints to the debug window when running under the no$gba emulator.
/// This is mainly useful for debugging, and is reasonably slow.
///
/// ```rust,ignore
/// nds7::println!("Hello, World!");
///
/// let variable = 5;
/// nds7::println!("format {variable} argument");
/// ```
#[macro_export]
macro_rules! println {
    ($( $x:expr ),*) => {
        $crate::print::println(format_args!($($x,)*))
    };
}

/// Works like [`std::println`](https://doc.rust-lang.org/stable/std/macro.println.html).
///
/// Prints to the debug window when running under no$gba but with the error
/// level. This is mainly intended for debugging, and is reasonably slow.
///
/// ```rust,ignore
/// nds7::eprintln!("error: microphone buffer is empty");
/// ```
#[macro_export]
macro_rules! eprintln {
    ($( $x:expr ),*) => {
        $crate::print::eprintln(format_args!($($x,)*))
    };
}

#![cfg_attr(not(test), no_std)]

use core::fmt;

#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($level:ident, $($args:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::$level!($($args)*);
        #[cfg(feature = "log")]
        log::$level!($($args)*);
    }
}

#[macro_export]
macro_rules! trace {
    ($($args:tt)*) => {
        $crate::__log!(trace, $($args)*)
    }
}

#[macro_export]
macro_rules! debug {
    ($($args:tt)*) => {
        $crate::__log!(debug, $($args)*)
    }
}

#[macro_export]
macro_rules! info {
    ($($args:tt)*) => {
        $crate::__log!(info, $($args)*)
    }
}

#[macro_export]
macro_rules! warn {
    ($($args:tt)*) => {
        $crate::__log!(warn, $($args)*)
    }
}

#[macro_export]
macro_rules! error {
    ($($args:tt)*) => {
        $crate::__log!(error, $($args)*)
    }
}

/// Formats a byte slice as space separated hex pairs, for register and SRAM dumps.
#[derive(Clone, Copy)]
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Hex<'_> {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{=[u8]:x}", self.0)
    }
}

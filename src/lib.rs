#![cfg_attr(not(test), no_std)]

//! Polling driver for an NMEA GPS receiver on one serial port.
//!
//! [`GpsSession`] powers the receiver through an output pin, paces fix checks
//! with an interval timer and pulls the coordinate text out of `$GPRMC`
//! sentences. Every wait is bounded; see [`Config`].

#[macro_use]
mod fmt;

pub mod acquisition;
pub mod config;
pub mod error;
pub mod gps;
pub mod nmea;
pub mod rb;
pub mod transport;

#[cfg(test)]
mod mock;

pub use acquisition::{FixState, FixStatus};
pub use config::Config;
pub use error::GpsError;
pub use gps::GpsSession;
pub use nmea::{Location, Position};
pub use transport::{IntervalTimer, SerialTransport};

#[cfg(feature = "firmware")]
mod firmware {
    use core::sync::atomic::{AtomicUsize, Ordering};
    use defmt_brtt as _; // global logger
    use panic_probe as _;
    use stm32l4xx_hal as _; // memory layout

    // same panicking *behavior* as `panic-probe` but doesn't print a panic message
    // this prevents the panic message being printed *twice* when `defmt::panic` is invoked
    #[defmt::panic_handler]
    fn panic() -> ! {
        cortex_m::asm::udf()
    }

    static COUNT: AtomicUsize = AtomicUsize::new(0);
    defmt::timestamp!("{=usize}", {
        // NOTE(no-CAS) `timestamps` runs with interrupts disabled
        let n = COUNT.load(Ordering::Relaxed);
        COUNT.store(n + 1, Ordering::Relaxed);
        n
    });
}

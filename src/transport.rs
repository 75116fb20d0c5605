//! Hardware the session drives.
//!
//! Receiver power goes through an `embedded_hal::digital::v2::OutputPin` and
//! pacing delays through `embedded_hal::blocking::delay::DelayUs`; the two
//! traits here cover what `embedded-hal` has no shape for.

use embedded_hal::serial;

/// Asynchronous serial link to the receiver.
///
/// Reads and writes are the usual non-blocking `embedded-hal` ones. A read
/// with nothing buffered returns `nb::Error::WouldBlock`.
pub trait SerialTransport: serial::Read<u8> + serial::Write<u8> {
    fn set_baud_rate(&mut self, baud_rate: u32);
    fn enable(&mut self);
    fn disable(&mut self);
    /// Bytes received and not yet read
    fn available(&self) -> usize;
    /// Drops everything received so far
    fn clear_rx(&mut self);
}

/// Periodic timer pacing the fix checks.
pub trait IntervalTimer {
    /// (Re)starts the timer with a new period, discarding a pending expiry
    fn arm(&mut self, period_ms: u32);
    fn disarm(&mut self);
    /// Reports and clears an elapsed period. Always `false` while disarmed.
    fn expired(&mut self) -> bool;
}

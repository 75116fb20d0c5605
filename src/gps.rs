use embedded_hal::{blocking::delay::DelayUs, digital::v2::OutputPin};

use crate::{
    acquisition::{Acquisition, FixProbe, FixState, FixStatus, Rearm},
    config::Config,
    error::{GpsError, Result},
    nmea::{Location, SentenceScanner, COORDINATE_LEN, MAX_SENTENCE_LEN},
    transport::{IntervalTimer, SerialTransport},
};

/// Buffer length `read_message` requires: a full sentence plus one spare byte
pub const MESSAGE_BUF_LEN: usize = MAX_SENTENCE_LEN + 1;
/// Buffer length `get_location` requires: the coordinates plus one spare byte
pub const LOCATION_BUF_LEN: usize = COORDINATE_LEN + 1;

/// One receiver on one serial port, with its power switch and pacing timer.
///
/// All blocking calls give up after `Config::read_timeout_us` of silence and
/// sentence searches after `Config::scan_limit` bytes.
pub struct GpsSession<S, P, T, D> {
    serial: S,
    power: P,
    timer: T,
    delay: D,
    config: Config,
    powered: bool,
    acquisition: Acquisition,
    probe: FixProbe,
}

impl<S, P, T, D> GpsSession<S, P, T, D>
where
    S: SerialTransport,
    P: OutputPin,
    T: IntervalTimer,
    D: DelayUs<u32>,
{
    pub fn new(serial: S, power: P, timer: T, delay: D, config: Config) -> Self {
        Self {
            serial,
            power,
            timer,
            delay,
            config,
            powered: false,
            acquisition: Acquisition::new(config.fix_attempts),
            probe: FixProbe::new(),
        }
    }

    /// Releases the hardware. The receiver is left as it is.
    pub fn free(self) -> (S, P, T, D) {
        (self.serial, self.power, self.timer, self.delay)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn fix_state(&self) -> FixState {
        self.acquisition.state()
    }

    ////////////////////////////////////////////////////////////////////////////
    // Lifecycle ///////////////////////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    /// Powers the receiver and starts the cold fix search.
    pub fn start(&mut self) -> Result<()> {
        trace!("start enter");
        self.serial.set_baud_rate(self.config.baud_rate);
        self.power.set_high().map_err(|_| GpsError::Power)?;
        self.serial.enable();
        self.timer.arm(self.config.cold_interval_ms);

        self.powered = true;
        self.acquisition.power_on();
        self.probe.restart();
        info!("receiver on at {=u32} baud", self.config.baud_rate);
        Ok(())
    }

    /// Stops the timer and the port and cuts receiver power. Safe to repeat.
    pub fn end(&mut self) -> Result<()> {
        trace!("end enter");
        self.timer.disarm();
        self.serial.disable();
        self.powered = false;
        self.acquisition.power_off();
        self.power.set_low().map_err(|_| GpsError::Power)?;
        info!("receiver off");
        Ok(())
    }

    /// Runs one fix check step if the timer period has elapsed.
    ///
    /// Never waits: call it from the timer interrupt or a scheduler tick.
    /// Returns the check result, `None` when no period had elapsed.
    pub fn service(&mut self) -> Result<Option<FixStatus>> {
        // Always consume the expiry so a stale timer event cannot repeat
        let elapsed = self.timer.expired();
        if !self.powered || !elapsed {
            return Ok(None);
        }

        let status = self.probe.poll(&mut self.serial)?;
        match self.acquisition.record(status) {
            Some(Rearm::Warm) => self.timer.arm(self.config.warm_interval_ms),
            Some(Rearm::Cold) => self.timer.arm(self.config.cold_interval_ms),
            None => (),
        }
        Ok(Some(status))
    }

    ////////////////////////////////////////////////////////////////////////////
    // Byte and line access ////////////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    pub fn available(&self) -> usize {
        self.serial.available()
    }

    pub fn read(&mut self) -> Result<u8> {
        self.ensure_powered()?;
        let mut waited = 0;
        loop {
            match self.serial.read() {
                Ok(b) => return Ok(b),
                Err(nb::Error::WouldBlock) => self.idle(&mut waited)?,
                Err(nb::Error::Other(_)) => {
                    error!("serial read failed");
                    return Err(GpsError::Transport);
                }
            }
        }
    }

    /// Reads until a newline has been stored or `buf.len() - 1` bytes are
    /// written, and returns the count. The newline is kept; nothing is
    /// appended after the last byte read.
    pub fn read_string(&mut self, buf: &mut [u8]) -> Result<usize> {
        let limit = buf.len().saturating_sub(1);
        let mut count = 0;
        while count < limit {
            let b = self.read()?;
            buf[count] = b;
            count += 1;
            if b == b'\n' {
                break;
            }
        }
        Ok(count)
    }

    /// Reads the next whole sentence, without its `$`, into `buf`.
    ///
    /// `buf` must hold at least [`MESSAGE_BUF_LEN`] bytes; a shorter buffer is
    /// refused before anything is read.
    pub fn read_message(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < MESSAGE_BUF_LEN {
            return Err(GpsError::BufferLength {
                expected: MESSAGE_BUF_LEN,
                actual: buf.len(),
            });
        }
        self.ensure_powered()?;

        let mut skipped = 0;
        while self.read()? != b'$' {
            skipped += 1;
            if skipped >= self.config.scan_limit {
                return Err(GpsError::SentenceNotFound);
            }
        }
        self.read_string(&mut buf[..MAX_SENTENCE_LEN])
    }

    pub fn write(&mut self, b: u8) -> Result<()> {
        self.ensure_powered()?;
        nb::block!(self.serial.write(b)).map_err(|_| GpsError::Transport)
    }

    ////////////////////////////////////////////////////////////////////////////
    // Fix and location ////////////////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    /// Drops the receive backlog and reports the status flag of the next
    /// GPRMC sentence.
    pub fn has_fix(&mut self) -> Result<bool> {
        trace!("has_fix enter");
        self.ensure_powered()?;
        self.probe.restart();
        self.serial.clear_rx();
        self.wait_for_data()?;

        self.seek(SentenceScanner::rmc_status())?;
        let flag = self.read()?;
        Ok(FixStatus::from_flag(flag) == FixStatus::Fix)
    }

    /// Powers the receiver up, waits for a fix, copies the coordinates into
    /// `buf` and powers down again. Returns the number of bytes copied; the
    /// rest of `buf` is zeroed.
    ///
    /// `buf` must be exactly [`LOCATION_BUF_LEN`] bytes; any other length is
    /// refused before the receiver is powered.
    pub fn get_location(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() != LOCATION_BUF_LEN {
            return Err(GpsError::BufferLength {
                expected: LOCATION_BUF_LEN,
                actual: buf.len(),
            });
        }

        let location = self.location()?;
        let len = location.len();
        buf[..len].copy_from_slice(location.as_bytes());
        buf[len..].fill(0);
        Ok(len)
    }

    /// Typed form of [`get_location`](Self::get_location).
    pub fn location(&mut self) -> Result<Location> {
        trace!("location enter");
        self.start()?;
        let captured = self.capture_location();
        // Power down on every path, but report the capture error first
        let ended = self.end();
        let location = captured?;
        ended?;

        debug!("location {}", location);
        Ok(location)
    }

    fn capture_location(&mut self) -> Result<Location> {
        self.serial.clear_rx();
        self.wait_for_data()?;
        self.wait_for_fix()?;

        self.seek(SentenceScanner::rmc_latitude())?;
        let mut raw = [0; LOCATION_BUF_LEN];
        let len = self.read_string(&mut raw)?;

        let mut location = Location::new();
        location.extend_from_slice(&raw[..len]);
        Ok(location)
    }

    /// Checks for a fix up to `fix_attempts` times. Checks that time out or
    /// find no GPRMC sentence count as misses.
    fn wait_for_fix(&mut self) -> Result<()> {
        let attempts = self.config.fix_attempts;
        for attempt in 1..=attempts {
            match self.has_fix() {
                Ok(true) => {
                    debug!("fix on check {=u8}", attempt);
                    return Ok(());
                }
                Ok(false) => (),
                Err(e @ (GpsError::Timeout | GpsError::SentenceNotFound)) => {
                    debug!("fix check {=u8} failed: {}", attempt, e);
                }
                Err(e) => return Err(e),
            }
        }
        warn!("no fix after {=u8} checks", attempts);
        Err(GpsError::NoFix { attempts })
    }

    ////////////////////////////////////////////////////////////////////////////
    // Helpers /////////////////////////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    fn ensure_powered(&self) -> Result<()> {
        if self.powered {
            Ok(())
        } else {
            Err(GpsError::NotStarted)
        }
    }

    fn wait_for_data(&mut self) -> Result<()> {
        let mut waited = 0;
        while self.serial.available() == 0 {
            self.idle(&mut waited)?;
        }
        Ok(())
    }

    // One poll interval of silence, failing once the read timeout is used up
    fn idle(&mut self, waited: &mut u32) -> Result<()> {
        if *waited >= self.config.read_timeout_us {
            warn!("receiver silent for {=u32} us", *waited);
            return Err(GpsError::Timeout);
        }
        self.delay.delay_us(self.config.poll_interval_us);
        *waited = waited.saturating_add(self.config.poll_interval_us);
        Ok(())
    }

    // Consumes bytes up to the start of the scanner's field
    fn seek(&mut self, mut scanner: SentenceScanner) -> Result<()> {
        for _ in 0..self.config.scan_limit {
            if scanner.feed(self.read()?) {
                return Ok(());
            }
        }
        warn!("no GPRMC sentence in {=usize} bytes", self.config.scan_limit);
        Err(GpsError::SentenceNotFound)
    }
}

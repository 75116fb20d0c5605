use crate::{
    error::{GpsError, Result},
    nmea::SentenceScanner,
    transport::SerialTransport,
};

/// Where the session is in acquiring a fix.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FixState {
    PoweredOff,
    /// Searching from an unknown state, checked at the cold interval
    AwaitingColdFix,
    /// A fix has been seen, rechecked at the warm interval
    AwaitingWarmFix,
}

/// Outcome of one non-blocking fix check.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FixStatus {
    /// The status byte of a GPRMC sentence has not arrived yet
    Pending,
    Fix,
    NoFix,
}

impl FixStatus {
    /// Interprets the first byte of the GPRMC status field. `V` is void, as is
    /// an empty field; anything else, canonically `A`, is a fix.
    pub fn from_flag(flag: u8) -> Self {
        match flag {
            b'V' | b',' | b'*' | b'\r' | b'\n' => FixStatus::NoFix,
            _ => FixStatus::Fix,
        }
    }
}

/// Fix check that never waits.
///
/// Each `poll` consumes only what the transport already holds. A new check
/// starts by dropping the receive backlog so it resynchronises on a fresh
/// sentence.
#[derive(Debug, Copy, Clone)]
pub struct FixProbe {
    scanner: SentenceScanner,
    fresh: bool,
}

impl Default for FixProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl FixProbe {
    pub const fn new() -> Self {
        Self {
            scanner: SentenceScanner::rmc_status(),
            fresh: true,
        }
    }

    /// Abandons a check in progress.
    pub fn restart(&mut self) {
        self.fresh = true;
    }

    pub fn poll<S: SerialTransport>(&mut self, serial: &mut S) -> Result<FixStatus> {
        if self.fresh {
            serial.clear_rx();
            self.scanner.reset();
            self.fresh = false;
        }

        loop {
            let b = match serial.read() {
                Ok(b) => b,
                Err(nb::Error::WouldBlock) => return Ok(FixStatus::Pending),
                Err(nb::Error::Other(_)) => {
                    error!("serial read failed during fix check");
                    self.fresh = true;
                    return Err(GpsError::Transport);
                }
            };

            if self.scanner.located() {
                self.fresh = true;
                return Ok(FixStatus::from_flag(b));
            }
            self.scanner.feed(b);
        }
    }
}

/// Timer change requested by a state transition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Rearm {
    Cold,
    Warm,
}

/// Cold/warm acquisition state machine.
///
/// Cold checks repeat until the first fix, however long that takes; misses
/// are only counted. Once warm, `max_misses` void checks in a row mean the
/// fix was lost and the search drops back to cold.
#[derive(Debug, Copy, Clone)]
pub struct Acquisition {
    state: FixState,
    misses: u8,
    max_misses: u8,
    checks: u32,
}

impl Acquisition {
    pub const fn new(max_misses: u8) -> Self {
        Self {
            state: FixState::PoweredOff,
            misses: 0,
            max_misses,
            checks: 0,
        }
    }

    pub fn state(&self) -> FixState {
        self.state
    }

    /// Completed checks since power on
    pub fn checks(&self) -> u32 {
        self.checks
    }

    pub fn power_on(&mut self) {
        self.state = FixState::AwaitingColdFix;
        self.misses = 0;
        self.checks = 0;
    }

    pub fn power_off(&mut self) {
        self.state = FixState::PoweredOff;
        self.misses = 0;
    }

    /// Feeds one check result; returns the timer change the caller must apply.
    pub fn record(&mut self, status: FixStatus) -> Option<Rearm> {
        if status == FixStatus::Pending {
            return None;
        }
        self.checks = self.checks.wrapping_add(1);

        match (self.state, status) {
            (FixState::PoweredOff, _) => None,
            (FixState::AwaitingColdFix, FixStatus::Fix) => {
                info!("fix acquired after {=u32} checks", self.checks);
                self.state = FixState::AwaitingWarmFix;
                self.misses = 0;
                Some(Rearm::Warm)
            }
            (FixState::AwaitingColdFix, _) => {
                self.misses = self.misses.saturating_add(1);
                if self.misses >= self.max_misses {
                    debug!("still no fix after {=u32} checks", self.checks);
                    self.misses = 0;
                }
                None
            }
            (FixState::AwaitingWarmFix, FixStatus::Fix) => {
                self.misses = 0;
                None
            }
            (FixState::AwaitingWarmFix, _) => {
                self.misses = self.misses.saturating_add(1);
                if self.misses >= self.max_misses {
                    warn!("fix lost, restarting cold search");
                    self.state = FixState::AwaitingColdFix;
                    self.misses = 0;
                    Some(Rearm::Cold)
                } else {
                    None
                }
            }
        }
    }
}

/// Session configuration.
///
/// The defaults match the receiver module on the watch board: 9600 baud, a
/// 1 ms cold-start cadence, a 100 ms warm cadence and 20 checks per fix wait.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub baud_rate: u32,
    /// Timer period while searching for the first fix
    pub cold_interval_ms: u32,
    /// Timer period once a fix has been seen
    pub warm_interval_ms: u32,
    /// Fix checks per `get_location` wait, and void checks tolerated while warm
    pub fix_attempts: u8,
    /// Longest silence tolerated while waiting for a single byte
    pub read_timeout_us: u32,
    /// Delay between two polls of an empty receive buffer
    pub poll_interval_us: u32,
    /// Bytes inspected while looking for a sentence before giving up
    pub scan_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            cold_interval_ms: 1,
            warm_interval_ms: 100,
            fix_attempts: 20,
            read_timeout_us: 2_000_000,
            poll_interval_us: 100,
            scan_limit: 2048,
        }
    }
}

impl Config {
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn cold_interval_ms(mut self, ms: u32) -> Self {
        self.cold_interval_ms = ms;
        self
    }

    pub fn warm_interval_ms(mut self, ms: u32) -> Self {
        self.warm_interval_ms = ms;
        self
    }

    pub fn fix_attempts(mut self, attempts: u8) -> Self {
        self.fix_attempts = attempts;
        self
    }

    pub fn read_timeout_us(mut self, us: u32) -> Self {
        self.read_timeout_us = us;
        self
    }

    pub fn poll_interval_us(mut self, us: u32) -> Self {
        // A zero interval would never advance the timeout clock
        self.poll_interval_us = us.max(1);
        self
    }

    pub fn scan_limit(mut self, bytes: usize) -> Self {
        self.scan_limit = bytes;
        self
    }
}

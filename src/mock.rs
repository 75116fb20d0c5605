//! Simulated collaborators for host tests.
//!
//! Every mock is a cheap handle onto shared state, so a test keeps a clone to
//! inspect the hardware after the session has taken ownership.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    convert::Infallible,
    rc::Rc,
    vec::Vec,
};

use embedded_hal::{blocking::delay::DelayUs, digital::v2::OutputPin, serial};

use crate::transport::{IntervalTimer, SerialTransport};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MockError;

#[derive(Default)]
struct SerialState {
    /// Received and buffered
    rx: VecDeque<u8>,
    /// Still on the wire; arrives one byte per poll of an empty buffer
    wire: VecDeque<u8>,
    tx: Vec<u8>,
    baud_rate: Option<u32>,
    enabled: bool,
    clears: usize,
    fail_reads: bool,
}

impl SerialState {
    fn trickle(&mut self) {
        if self.rx.is_empty() {
            if let Some(b) = self.wire.pop_front() {
                self.rx.push_back(b);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct MockSerial(Rc<RefCell<SerialState>>);

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes already sitting in the receive buffer
    pub fn arrive(&self, bytes: &[u8]) {
        self.0.borrow_mut().rx.extend(bytes.iter().copied());
    }

    /// Bytes the receiver will send after any backlog is cleared
    pub fn stream(&self, bytes: &[u8]) {
        self.0.borrow_mut().wire.extend(bytes.iter().copied());
    }

    /// Received plus still-to-arrive bytes
    pub fn unread(&self) -> usize {
        let state = self.0.borrow();
        state.rx.len() + state.wire.len()
    }

    pub fn sent(&self) -> Vec<u8> {
        self.0.borrow().tx.clone()
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.0.borrow().baud_rate
    }

    pub fn enabled(&self) -> bool {
        self.0.borrow().enabled
    }

    pub fn clears(&self) -> usize {
        self.0.borrow().clears
    }

    pub fn fail_reads(&self, fail: bool) {
        self.0.borrow_mut().fail_reads = fail;
    }
}

impl serial::Read<u8> for MockSerial {
    type Error = MockError;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        let mut state = self.0.borrow_mut();
        if state.fail_reads {
            return Err(nb::Error::Other(MockError));
        }
        state.trickle();
        state.rx.pop_front().ok_or(nb::Error::WouldBlock)
    }
}

impl serial::Write<u8> for MockSerial {
    type Error = MockError;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.0.borrow_mut().tx.push(word);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        Ok(())
    }
}

impl SerialTransport for MockSerial {
    fn set_baud_rate(&mut self, baud_rate: u32) {
        self.0.borrow_mut().baud_rate = Some(baud_rate);
    }

    fn enable(&mut self) {
        self.0.borrow_mut().enabled = true;
    }

    fn disable(&mut self) {
        self.0.borrow_mut().enabled = false;
    }

    fn available(&self) -> usize {
        let mut state = self.0.borrow_mut();
        state.trickle();
        state.rx.len()
    }

    fn clear_rx(&mut self) {
        let mut state = self.0.borrow_mut();
        state.rx.clear();
        state.clears += 1;
    }
}

#[derive(Clone, Default)]
pub struct MockPin {
    high: Rc<Cell<bool>>,
    rises: Rc<Cell<usize>>,
    fail: Rc<Cell<bool>>,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.high.get()
    }

    /// Times the pin was driven high
    pub fn rises(&self) -> usize {
        self.rises.get()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.set(fail);
    }
}

impl OutputPin for MockPin {
    type Error = MockError;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.fail.get() {
            return Err(MockError);
        }
        self.high.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.fail.get() {
            return Err(MockError);
        }
        self.high.set(true);
        self.rises.set(self.rises.get() + 1);
        Ok(())
    }
}

#[derive(Default)]
struct TimerState {
    period_ms: Option<u32>,
    pending: bool,
}

#[derive(Clone, Default)]
pub struct MockTimer(Rc<RefCell<TimerState>>);

impl MockTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn period_ms(&self) -> Option<u32> {
        self.0.borrow().period_ms
    }

    /// An expiry is flagged and not yet consumed
    pub fn pending(&self) -> bool {
        self.0.borrow().pending
    }

    /// Lets one period elapse
    pub fn fire(&self) {
        let mut state = self.0.borrow_mut();
        if state.period_ms.is_some() {
            state.pending = true;
        }
    }
}

impl IntervalTimer for MockTimer {
    fn arm(&mut self, period_ms: u32) {
        let mut state = self.0.borrow_mut();
        state.period_ms = Some(period_ms);
        state.pending = false;
    }

    // Like the hardware update flag, an expiry already flagged survives disarm
    fn disarm(&mut self) {
        self.0.borrow_mut().period_ms = None;
    }

    fn expired(&mut self) -> bool {
        core::mem::take(&mut self.0.borrow_mut().pending)
    }
}

/// Delay that only keeps count of the time it was asked to wait.
#[derive(Clone, Default)]
pub struct MockDelay(Rc<Cell<u64>>);

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_us(&self) -> u64 {
        self.0.get()
    }
}

impl DelayUs<u32> for MockDelay {
    fn delay_us(&mut self, us: u32) {
        self.0.set(self.0.get() + us as u64);
    }
}

// Keeps `Infallible` pins usable where a test does not care about faults
pub struct IdealPin;

impl OutputPin for IdealPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

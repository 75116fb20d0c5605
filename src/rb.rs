use core::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{
        AtomicBool, AtomicUsize,
        Ordering::{Acquire, Relaxed, Release},
    },
};

// Push at HEAD, pop at TAIL
pub struct Ringbuf<T, const N: usize> {
    is_split: AtomicBool,
    on_write: Option<fn()>,
    head: AtomicUsize,
    tail: AtomicUsize,
    buf: [UnsafeCell<MaybeUninit<T>>; N],
}

// SAFETY: The safety guarantees within later unsafe blocks in this implementation
// allow us to safely share the UnsafeCells over thread boundaries.
unsafe impl<T, const N: usize> Sync for Ringbuf<T, N> {}

impl<T, const N: usize> Default for Ringbuf<T, N> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T, const N: usize> Ringbuf<T, N> {
    /// `on_write` runs after every successful write, e.g. to pend the
    /// interrupt that drains the buffer.
    pub const fn new(on_write: Option<fn()>) -> Self {
        Self {
            is_split: AtomicBool::new(false),
            on_write,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            // SAFETY: This array only contains MaybeUninits, which are sound to
            // have hold an uninit value
            #[allow(clippy::uninit_assumed_init)]
            buf: unsafe { MaybeUninit::uninit().assume_init() },
        }
    }

    /// ## Safety
    /// Must only be called once, as only one Producer and Consumer may
    /// exist per Ringbuf.
    pub unsafe fn split(&'static self) -> (Producer<T, N>, Consumer<T, N>) {
        self.is_split.store(true, Relaxed);
        (Producer(self), Consumer(self))
    }

    pub fn try_split(&'static self) -> Option<(Producer<T, N>, Consumer<T, N>)> {
        if self.is_split.fetch_or(true, Relaxed) {
            None
        } else {
            // SAFETY: We have just checked to ensure that this Ringbuf has not
            // been split.
            Some(unsafe { self.split() })
        }
    }

    fn len(&self) -> usize {
        self.head.load(Acquire).wrapping_sub(self.tail.load(Acquire))
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self) -> bool {
        self.len() == N
    }
}

pub struct Consumer<T: 'static, const N: usize>(&'static Ringbuf<T, N>);

impl<T: 'static, const N: usize> Consumer<T, N> {
    pub fn try_read(&self) -> Option<T> {
        if self.is_empty() {
            None
        } else {
            // SAFETY: The buffer is not empty, and could not have become empty since
            // we checked it because only one Consumer may exist.
            let val = unsafe {
                self.0.buf[self.0.tail.load(Acquire) % N]
                    .get()
                    .read()
                    .assume_init()
            };
            self.0.tail.fetch_add(1, Release);
            Some(val)
        }
    }

    /// Drops everything currently buffered. Values written concurrently by
    /// the producer may survive.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        for _ in 0..self.len() {
            if self.try_read().is_none() {
                break;
            }
            dropped += 1;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct Producer<T: 'static, const N: usize>(&'static Ringbuf<T, N>);

impl<T: 'static, const N: usize> Producer<T, N> {
    pub fn try_write(&self, val: T) -> Result<(), T> {
        if self.is_full() {
            Err(val)
        } else {
            // SAFETY: The buffer is not full, and could not have become full since
            // we checked it because only one Producer may exist.
            unsafe {
                (*self.0.buf[self.0.head.load(Acquire) % N].get()).write(val);
            }
            self.0.head.fetch_add(1, Release);

            if let Some(on_write) = self.0.on_write {
                on_write();
            }
            Ok(())
        }
    }

    pub fn is_full(&self) -> bool {
        self.0.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

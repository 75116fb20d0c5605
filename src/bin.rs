#![no_main]
#![no_std]

use gps_session as _;
use gps_session::{
    rb::{Consumer, Producer, Ringbuf},
    Config, FixStatus, GpsSession, IntervalTimer, SerialTransport,
};

use core::{
    convert::Infallible,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use defmt::{debug, error, info, trace, warn};
use rtic_monotonics::{
    create_systick_token,
    systick::{ExtU32, Systick},
};
use stm32l4xx_hal::{
    delay::DelayCM,
    gpio::{Alternate, Output, PushPull, PA10, PA8, PA9},
    hal::timer::CountDown,
    pac::{Interrupt, NVIC, TIM2, USART1},
    prelude::*,
    serial::{self, Config as SerialConfig, Serial},
    timer::{self, Timer},
};

type GpsUart = Serial<USART1, (PA9<Alternate<PushPull, 7>>, PA10<Alternate<PushPull, 7>>)>;
type PowerPin = PA8<Output<PushPull>>;
type Gps = GpsSession<UartLink, PowerPin, GpsTimer, DelayCM>;

const UART_TX_BUFSIZE: usize = 16;
const UART_RX_BUFSIZE: usize = 256;
const BAUD_RATE: u32 = 9600;

// Received bytes are dropped while the session has the port disabled
static UART_ENABLED: AtomicBool = AtomicBool::new(false);
static UART_RX_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn pend_uart() {
    NVIC::pend(Interrupt::USART1);
}

struct UartStuff {
    uart: GpsUart,
    rx_send: Producer<u8, UART_RX_BUFSIZE>,
    tx_recv: Consumer<u8, UART_TX_BUFSIZE>,
    tx_pending: Option<u8>,
}

/// Session side of USART1, backed by the ring buffers `on_uart` services
pub struct UartLink {
    rx_recv: Consumer<u8, UART_RX_BUFSIZE>,
    tx_send: Producer<u8, UART_TX_BUFSIZE>,
}

impl embedded_hal::serial::Read<u8> for UartLink {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.rx_recv.try_read().ok_or(nb::Error::WouldBlock)
    }
}

impl embedded_hal::serial::Write<u8> for UartLink {
    type Error = Infallible;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.tx_send
            .try_write(word)
            .map_err(|_| nb::Error::WouldBlock)
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        if self.tx_send.is_empty() {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

impl SerialTransport for UartLink {
    fn set_baud_rate(&mut self, baud_rate: u32) {
        // USART1 is clocked once in init
        if baud_rate != BAUD_RATE {
            warn!("USART1 runs at {=u32} baud, {=u32} requested", BAUD_RATE, baud_rate);
        }
    }

    fn enable(&mut self) {
        UART_ENABLED.store(true, Ordering::Release);
    }

    fn disable(&mut self) {
        UART_ENABLED.store(false, Ordering::Release);
        self.rx_recv.clear();
    }

    fn available(&self) -> usize {
        self.rx_recv.len()
    }

    fn clear_rx(&mut self) {
        let dropped = self.rx_recv.clear();
        trace!("dropped {=usize} buffered bytes", dropped);
    }
}

/// TIM2 as the fix check pacer
pub struct GpsTimer {
    tim: Timer<TIM2>,
    armed: bool,
}

impl GpsTimer {
    fn new(mut tim: Timer<TIM2>) -> Self {
        tim.unlisten(timer::Event::TimeOut);
        Self { tim, armed: false }
    }
}

impl IntervalTimer for GpsTimer {
    fn arm(&mut self, period_ms: u32) {
        let rate = 1000 / period_ms.clamp(1, 1000);
        self.tim.start(rate.Hz());
        self.tim.listen(timer::Event::TimeOut);
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.tim.unlisten(timer::Event::TimeOut);
        self.armed = false;
    }

    fn expired(&mut self) -> bool {
        // `wait` clears the update flag, which also acknowledges the interrupt
        let fired = self.tim.wait().is_ok();
        fired && self.armed
    }
}

#[rtic::app(
    device = stm32l4xx_hal::pac,
    dispatchers = [EXTI2, EXTI3],
)]
mod app {
    use super::*;

    // Shared resources go here
    #[shared]
    struct Shared {
        gps: Gps,
    }

    // Local resources go here
    #[local]
    struct Local {
        uart: UartStuff,
    }

    ////////////////////////////////////////////////////////////////////////////
    // Main thread tasks ///////////////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        trace!("init enter");

        let mut flash = cx.device.FLASH.constrain();
        let mut rcc = cx.device.RCC.constrain();
        let mut pwr = cx.device.PWR.constrain(&mut rcc.apb1r1);
        let clocks = rcc.cfgr.freeze(&mut flash.acr, &mut pwr);

        // Create SysTick monotonic for task scheduling
        Systick::start(cx.core.SYST, clocks.sysclk().raw(), create_systick_token!());

        let mut gpioa = cx.device.GPIOA.split(&mut rcc.ahb2);

        // Receiver power switch, off until the session starts
        let mut power = gpioa
            .pa8
            .into_push_pull_output(&mut gpioa.moder, &mut gpioa.otyper);
        power.set_low();

        // Initialize UART for GPS
        let tx = gpioa
            .pa9
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrh);
        let rx = gpioa
            .pa10
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrh);
        let mut uart = Serial::usart1(
            cx.device.USART1,
            (tx, rx),
            SerialConfig::default().baudrate(BAUD_RATE.bps()),
            clocks,
            &mut rcc.apb2,
        );
        uart.listen(serial::Event::Rxne);

        // Create channels for communicating between the session and the UART interrupt
        static UART_RX: Ringbuf<u8, UART_RX_BUFSIZE> = Ringbuf::new(None);
        let (uart_rx_send, uart_rx_recv) = UART_RX.try_split().unwrap();
        static UART_TX: Ringbuf<u8, UART_TX_BUFSIZE> = Ringbuf::new(Some(pend_uart));
        let (uart_tx_send, uart_tx_recv) = UART_TX.try_split().unwrap();

        let tim2 = Timer::tim2(cx.device.TIM2, 1000.Hz(), clocks, &mut rcc.apb1r1);

        let mut gps = GpsSession::new(
            UartLink {
                rx_recv: uart_rx_recv,
                tx_send: uart_tx_send,
            },
            power,
            GpsTimer::new(tim2),
            DelayCM::new(clocks),
            Config::default().baud_rate(BAUD_RATE),
        );
        if let Err(e) = gps.start() {
            error!("could not power the receiver: {}", e);
        }

        location_task::spawn().unwrap();

        info!("done initializing!");
        trace!("init exit");
        (
            Shared { gps },
            Local {
                uart: UartStuff {
                    uart,
                    rx_send: uart_rx_send,
                    tx_recv: uart_tx_recv,
                    tx_pending: None,
                },
            },
        )
    }

    #[idle]
    fn idle(_: idle::Context) -> ! {
        trace!("idle enter");

        loop {
            // Only sleep in release mode, since the debugger doesn't interact with sleep very nicely
            #[cfg(debug_assertions)]
            cortex_m::asm::nop();
            #[cfg(not(debug_assertions))]
            cortex_m::asm::wfi();
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Hardware interrupt handlers /////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    // Transfer UART data to/from the buffers
    #[task(binds = USART1, priority = 10, local = [uart])]
    fn on_uart(cx: on_uart::Context) {
        let uart = cx.local.uart;

        // Rxne
        match uart.uart.read() {
            Ok(b) => {
                // If the recv buffer is full, then drop the received value
                if UART_ENABLED.load(Ordering::Acquire) {
                    let _ = uart.rx_send.try_write(b);
                    UART_RX_COUNTER.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(nb::Error::WouldBlock) => (),
            // Reading clears overrun and framing flags; the sentence scan resyncs on `$`
            Err(nb::Error::Other(_)) => debug!("UART receive error"),
        }

        // Txe
        if uart.tx_pending.is_none() {
            uart.tx_pending = uart.tx_recv.try_read();
        }
        if let Some(b) = uart.tx_pending {
            if uart.uart.write(b).is_ok() {
                uart.tx_pending = None;
            }
        }
        if uart.tx_pending.is_some() || !uart.tx_recv.is_empty() {
            uart.uart.listen(serial::Event::Txe);
        } else {
            uart.uart.unlisten(serial::Event::Txe);
        }
    }

    // One non-blocking fix check per timer period
    #[task(binds = TIM2, priority = 3, shared = [gps])]
    fn on_gps_timer(mut cx: on_gps_timer::Context) {
        match cx.shared.gps.lock(|gps| gps.service()) {
            Ok(Some(FixStatus::Pending)) | Ok(None) => (),
            Ok(Some(status)) => trace!("fix check: {}", status),
            Err(e) => error!("fix check failed: {}", e),
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Periodic tasks //////////////////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    // Read the receiver position every 10 seconds
    #[task(priority = 1, shared = [gps])]
    async fn location_task(mut cx: location_task::Context) {
        trace!("location_task enter");

        loop {
            Systick::delay(10.secs()).await;

            let (location, restarted, state) = cx.shared.gps.lock(|gps| {
                let location = gps.location();
                // Keep tracking the fix until the next read
                let restarted = gps.start();
                (location, restarted, gps.fix_state())
            });

            match location {
                Ok(location) => match location.position() {
                    Some(pos) => info!("position {}", pos),
                    None => warn!("void coordinates: {}", location),
                },
                Err(e) => warn!("no location ({}), session {}", e, state),
            }
            if let Err(e) = restarted {
                error!("could not restart the receiver: {}", e);
            }
            debug!(
                "{=usize} bytes received so far",
                UART_RX_COUNTER.load(Ordering::Relaxed)
            );
        }
    }
}

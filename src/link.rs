//! Radio link dispatch.
//!
//! The transport task hands every received syslink frame to
//! `RadioLink::dispatch`. Radio-raw frames become CRTP packets on the inbound
//! queue; each one also gives the link a chance to piggyback a single queued
//! outbound packet, since the radio only transmits in reply to traffic. RSSI
//! frames update the latest signal strength.
//!
//! ```text
//!   UART ──► SyslinkParser ──► dispatch ──► inbound (5) ──► receive()
//!                                  │
//!   send() ──► outbound (1) ───────┴──► FrameSink (reply)
//! ```

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_time::Duration;

use crate::config::{
    INBOUND_ENQUEUE_TIMEOUT, INBOUND_QUEUE_CAPACITY, OUTBOUND_QUEUE_CAPACITY, PIGGYBACK_TIMEOUT,
    QUEUE_TIMEOUT,
};
use crate::drivers::crtp::CrtpPacket;
use crate::drivers::syslink::{FrameType, SyslinkPacket};
use crate::queue::TimedQueue;
use crate::scheduler::{Subsystem, SubsystemKind};

/// Transmit side of the transport, used for piggybacked replies.
#[allow(async_fn_in_trait)]
pub trait FrameSink {
    type Error: core::fmt::Debug;

    async fn send_frame(&mut self, frame: &SyslinkPacket) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Delivery {
    Queued,
    /// Inbound queue was full; the new packet is lost
    Dropped,
    /// Radio-raw frame without a CRTP header
    Malformed,
}

/// What `dispatch` did with one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchOutcome {
    Packet { delivery: Delivery, replied: bool },
    SignalStrength(u8),
    Unhandled(FrameType),
}

pub struct RadioLink {
    inbound: TimedQueue<CrtpPacket, INBOUND_QUEUE_CAPACITY>,
    outbound: TimedQueue<CrtpPacket, OUTBOUND_QUEUE_CAPACITY>,
    rssi: AtomicU8,
    started: AtomicBool,
}

impl RadioLink {
    pub const fn new() -> Self {
        Self {
            inbound: TimedQueue::new(),
            outbound: TimedQueue::new(),
            rssi: AtomicU8::new(0),
            started: AtomicBool::new(false),
        }
    }

    pub async fn dispatch<S: FrameSink>(
        &self,
        frame: &SyslinkPacket,
        sink: &mut S,
    ) -> DispatchOutcome {
        match frame.kind() {
            FrameType::RadioRaw => {
                let delivery = match CrtpPacket::from_syslink(frame) {
                    Ok(packet) => self.deliver(packet).await,
                    Err(_) => {
                        crate::log_debug!("radio frame without CRTP header");
                        Delivery::Malformed
                    }
                };
                let replied = self.piggyback(sink).await;
                DispatchOutcome::Packet { delivery, replied }
            }
            FrameType::RadioRssi => match frame.data().first() {
                Some(&rssi) => {
                    self.rssi.store(rssi, Ordering::Relaxed);
                    DispatchOutcome::SignalStrength(rssi)
                }
                None => DispatchOutcome::Unhandled(FrameType::RadioRssi),
            },
            other => DispatchOutcome::Unhandled(other),
        }
    }

    async fn deliver(&self, packet: CrtpPacket) -> Delivery {
        match self.inbound.enqueue(packet, INBOUND_ENQUEUE_TIMEOUT).await {
            Ok(()) => Delivery::Queued,
            Err(_) => {
                crate::log_debug!("inbound queue full, packet dropped");
                Delivery::Dropped
            }
        }
    }

    /// At most one outbound packet per inbound frame, never blocking.
    async fn piggyback<S: FrameSink>(&self, sink: &mut S) -> bool {
        let Ok(packet) = self.outbound.dequeue(PIGGYBACK_TIMEOUT).await else {
            return false;
        };
        match sink.send_frame(&packet.to_syslink()).await {
            Ok(()) => true,
            Err(_) => {
                crate::log_warn!("reply frame lost on transport");
                false
            }
        }
    }

    /// Queue a packet for the next inbound frame to carry out. `false` when
    /// the outbound slot stayed occupied for `QUEUE_TIMEOUT`.
    pub async fn send(&self, packet: CrtpPacket) -> bool {
        self.outbound.enqueue(packet, QUEUE_TIMEOUT).await.is_ok()
    }

    pub async fn receive(&self, timeout: Duration) -> Option<CrtpPacket> {
        self.inbound.dequeue(timeout).await.ok()
    }

    pub fn latest_signal_strength(&self) -> u8 {
        self.rssi.load(Ordering::Relaxed)
    }

    pub fn handle(&self) -> LinkHandle<'_> {
        LinkHandle { link: self }
    }
}

impl Default for RadioLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed view of a static `RadioLink`: the Communication subsystem and
/// the send/receive surface handed to application code.
#[derive(Clone, Copy)]
pub struct LinkHandle<'a> {
    link: &'a RadioLink,
}

impl<'a> LinkHandle<'a> {
    pub async fn send(&self, packet: CrtpPacket) -> bool {
        self.link.send(packet).await
    }

    pub async fn receive(&self, timeout: Duration) -> Option<CrtpPacket> {
        self.link.receive(timeout).await
    }

    pub fn latest_signal_strength(&self) -> u8 {
        self.link.latest_signal_strength()
    }
}

impl Subsystem for LinkHandle<'_> {
    fn name(&self) -> &'static str {
        "radio link"
    }

    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Communication
    }

    fn init(&mut self) {
        self.link.rssi.store(0, Ordering::Relaxed);
        self.link.started.store(true, Ordering::Release);
    }

    fn self_test(&mut self) -> bool {
        self.link.started.load(Ordering::Acquire)
    }
}

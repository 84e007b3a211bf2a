//! Bit-level asynchronous link state machines
//!
//! Implements the Transputer's own wire protocol over a pair of abstract
//! transmit/receive pins: 11-bit data frames `1 1 b0 .. b7 0` (LSB first)
//! and 2-bit acknowledge frames `1 0`, oversampled 16× with a majority vote
//! over samples 7..9 of each bit and rising-edge start-of-frame detection.
//!
//! A sender is a state machine over {Idle, SendingData, SendingAck,
//! AckTimeout}; a receiver over {Idle, StartBit2, Data, Discard, StopBit}.
//! The receiver asks the sender to emit an ack as soon as it has seen the
//! second start bit of a data frame and the one-byte reception buffer is
//! free. A 16-bit status word reports framing error, overrun, read data
//! available, ready to send, and data-sent-not-acked (timeout), with the
//! received byte in its low bits.
//!
//! Transfers are described with workspace pointers so that completion can
//! reschedule the process the emulator descheduled when it issued the
//! instruction. A [`LinkClock`] ticks the state machines from a background
//! thread at a fixed interval; each link sits behind its own lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bitflags::bitflags;
use tracing::{debug, warn};

use crate::cpu::NOT_PROCESS;

/// Tick interval of the link clock.
pub const LINK_CLOCK_TICK_INTERVAL: Duration = Duration::from_micros(50);

/// Samples per transmitted bit.
const SAMPLES_PER_BIT: u32 = 16;

/// Bits in a data frame: two start bits, eight data bits, one stop bit.
const DATA_FRAME_BITS: u32 = 11;

/// Bits in an ack frame.
const ACK_FRAME_BITS: u32 = 2;

bitflags! {
    /// The link status word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LinkStatus: u16 {
        const FRAMING_ERROR        = 0x8000;
        const OVERRUN              = 0x4000;
        const READ_DATA_AVAILABLE  = 0x2000;
        const READY_TO_SEND        = 0x1000;
        const DATA_SENT_NOT_ACKED  = 0x0800;
    }
}

/// Mask of the received byte in the status word.
pub const STATUS_DATA_MASK: u16 = 0x00FF;

/// A pair of abstract pins: one transmit level we drive, one receive level
/// we sample.
pub trait TxRxPin: Send {
    fn get_rx(&mut self) -> bool;
    fn set_tx(&mut self, state: bool);
}

/// A crosswired pin pair for tests: whatever one side transmits, the other
/// receives.
pub struct CrosswiredPins;

struct WireState {
    a_to_b: bool,
    b_to_a: bool,
}

/// One endpoint of a crosswired pair.
pub struct CrosswiredPin {
    wire: Arc<Mutex<WireState>>,
    is_a: bool,
}

impl CrosswiredPins {
    /// Create the two endpoints of a crosswired wire.
    pub fn pair() -> (CrosswiredPin, CrosswiredPin) {
        let wire = Arc::new(Mutex::new(WireState {
            a_to_b: false,
            b_to_a: false,
        }));
        (
            CrosswiredPin {
                wire: wire.clone(),
                is_a: true,
            },
            CrosswiredPin { wire, is_a: false },
        )
    }
}

impl TxRxPin for CrosswiredPin {
    fn get_rx(&mut self) -> bool {
        let wire = self.wire.lock().unwrap();
        if self.is_a {
            wire.b_to_a
        } else {
            wire.a_to_b
        }
    }

    fn set_tx(&mut self, state: bool) {
        let mut wire = self.wire.lock().unwrap();
        if self.is_a {
            wire.a_to_b = state;
        } else {
            wire.b_to_a = state;
        }
    }
}

/// Majority-vote decoder over the oversampled receive pin.
///
/// Samples 7, 8 and 9 of each bit window vote; the result is latched at
/// sample 9. A rising edge outside a frame synchronises the bit windows,
/// and the first two decoded bits decide how long to stay synchronised
/// (an ack or a full data frame).
struct OversampledRx {
    resync_in_samples: u32,
    sample_index: u32,
    data_samples: u16,
    data_bits: u16,
    data_bits_length: u32,
    previous_rx: bool,
    latched: bool,
}

impl OversampledRx {
    fn new() -> Self {
        Self {
            resync_in_samples: 0,
            sample_index: 0,
            data_samples: 0,
            data_bits: 0,
            data_bits_length: 0,
            previous_rx: false,
            latched: false,
        }
    }

    /// Feed one raw sample. Returns the majority-voted bit when a bit
    /// window completes.
    fn sample(&mut self, rx: bool) -> Option<bool> {
        self.data_samples = (self.data_samples << 1) | rx as u16;

        let rising_edge = !self.previous_rx && rx;
        if self.resync_in_samples == 0 && rising_edge {
            self.data_bits = 0;
            self.data_bits_length = 0;
            // Until the first two bits arrive the frame kind is unknown;
            // resync pessimistically at the end of a possible ack. The
            // edge sample itself is one of the frame's samples, and the
            // count is decremented below.
            self.resync_in_samples = ACK_FRAME_BITS * SAMPLES_PER_BIT;
            self.sample_index = 0;
        }

        let mut decoded = None;
        if self.sample_index == 8 {
            let votes = self.data_samples & 0x0007;
            self.latched = votes.count_ones() >= 2;
            self.data_bits = (self.data_bits << 1) | self.latched as u16;
            self.data_bits_length += 1;
            if self.data_bits_length == 2 && self.data_bits == 0x0003 {
                // Two start bits: a data frame. Re-sync at its end. We are
                // 9 samples into the second bit window, so 25 samples of
                // the frame have already passed.
                self.resync_in_samples = DATA_FRAME_BITS * SAMPLES_PER_BIT - 25 + 1;
            }
            decoded = Some(self.latched);
        }

        self.sample_index += 1;
        if self.sample_index == SAMPLES_PER_BIT {
            self.sample_index = 0;
        }
        if self.resync_in_samples > 0 {
            self.resync_in_samples -= 1;
        }
        self.previous_rx = rx;
        decoded
    }
}

/// Sender states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    SendingAck,
    SendingData,
    AckTimeout,
}

/// Receiver states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    StartBit2,
    Data,
    Discard,
    StopBit,
}

/// What the receiver wants done after decoding a bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiverEvent {
    None,
    /// Second start bit of a data frame seen; send an ack.
    SendAck,
    /// An ack frame arrived.
    AckReceived,
    /// Data arrived with the reception buffer full.
    Overrun,
    /// The stop bit was high.
    FramingError,
    /// A complete data byte arrived.
    Data(u8),
}

struct Sender {
    state: SenderState,
    send_ack: bool,
    ack_rxed: bool,
    sample_count: u32,
    bits: u32,
    data: u16,
    enqueued: Option<u8>,
}

impl Sender {
    fn new() -> Self {
        Self {
            state: SenderState::Idle,
            send_ack: false,
            ack_rxed: false,
            sample_count: 0,
            bits: 0,
            data: 0,
            enqueued: None,
        }
    }

    /// Queue a byte. Returns false if the sender cannot take it.
    fn send_data(&mut self, byte: u8, status: &mut LinkStatus) -> bool {
        match self.state {
            SenderState::Idle => {
                if status.contains(LinkStatus::READY_TO_SEND) {
                    self.ack_rxed = false;
                    status.remove(LinkStatus::READY_TO_SEND);
                    self.load_data_frame(byte);
                    true
                } else {
                    false
                }
            }
            SenderState::SendingAck => {
                self.enqueued = Some(byte);
                self.ack_rxed = false;
                true
            }
            _ => {
                warn!("Sending data in {:?} state", self.state);
                false
            }
        }
    }

    fn load_data_frame(&mut self, byte: u8) {
        self.sample_count = 0;
        self.bits = DATA_FRAME_BITS;
        // Shifted out LSB first: two start bits, the byte, an implied
        // stop bit (zero).
        self.data = ((byte as u16) << 2) | 0x0003;
        debug!("Sender {:?} -> SendingData", self.state);
        if self.state == SenderState::SendingAck {
            self.send_ack = false;
        }
        self.state = SenderState::SendingData;
    }

    fn load_ack_frame(&mut self) {
        self.sample_count = 0;
        self.bits = ACK_FRAME_BITS;
        self.data = 0x0001;
    }

    /// The receiver has seen the start of a data frame; emit an ack.
    fn request_ack(&mut self, status: &mut LinkStatus) {
        match self.state {
            SenderState::Idle => {
                self.load_ack_frame();
                self.change_state(SenderState::SendingAck, status);
            }
            SenderState::SendingData => {
                self.send_ack = true;
            }
            _ => {}
        }
    }

    /// The receiver has decoded an ack frame.
    fn ack_received(&mut self) {
        match self.state {
            SenderState::Idle => warn!("Ack received in IDLE state"),
            _ => self.ack_rxed = true,
        }
    }

    /// Clock one sample out.
    fn clock(&mut self, pin: &mut dyn TxRxPin, status: &mut LinkStatus) {
        match self.state {
            SenderState::Idle | SenderState::AckTimeout => {}
            SenderState::SendingAck | SenderState::SendingData => {
                pin.set_tx(self.data & 0x0001 != 0);
                self.sample_count += 1;
                if self.sample_count == SAMPLES_PER_BIT {
                    self.sample_count = 0;
                    self.bits -= 1;
                    self.data >>= 1;
                    if self.bits == 0 {
                        self.end_of_frame(status);
                    }
                }
            }
        }
    }

    fn end_of_frame(&mut self, status: &mut LinkStatus) {
        debug!(
            "End of transmission, state is {:?}, ack_rxed {} enqueued {} send_ack {}",
            self.state,
            self.ack_rxed,
            self.enqueued.is_some(),
            self.send_ack
        );
        if self.state == SenderState::SendingAck {
            if let Some(byte) = self.enqueued.take() {
                self.ack_rxed = false;
                self.load_data_frame(byte);
            } else if self.send_ack {
                if self.ack_rxed {
                    self.change_state(SenderState::Idle, status);
                } else {
                    self.change_state(SenderState::AckTimeout, status);
                }
            } else {
                self.change_state(SenderState::Idle, status);
            }
        } else if self.send_ack {
            self.load_ack_frame();
            self.change_state(SenderState::SendingAck, status);
        } else if self.ack_rxed {
            self.change_state(SenderState::Idle, status);
        } else {
            self.change_state(SenderState::AckTimeout, status);
        }
    }

    fn change_state(&mut self, new_state: SenderState, status: &mut LinkStatus) {
        debug!("Sender {:?} -> {:?}", self.state, new_state);
        if self.state == SenderState::SendingAck {
            self.send_ack = false;
        }
        self.state = new_state;
        match new_state {
            SenderState::Idle => {
                if self.ack_rxed {
                    self.ack_rxed = false;
                    status.insert(LinkStatus::READY_TO_SEND);
                }
            }
            SenderState::SendingAck => {
                status.insert(LinkStatus::READY_TO_SEND);
                self.ack_rxed = false;
            }
            SenderState::SendingData => {}
            SenderState::AckTimeout => {
                status.insert(LinkStatus::DATA_SENT_NOT_ACKED);
            }
        }
    }
}

struct Receiver {
    state: ReceiverState,
    bit_count: u32,
    buffer: u8,
}

impl Receiver {
    fn new() -> Self {
        Self {
            state: ReceiverState::Idle,
            bit_count: 0,
            buffer: 0,
        }
    }

    /// Feed one decoded bit; say what should happen next.
    fn bit_received(&mut self, bit: bool, read_data_available: bool) -> ReceiverEvent {
        match self.state {
            ReceiverState::Idle => {
                if bit {
                    self.change_state(ReceiverState::StartBit2);
                }
                ReceiverEvent::None
            }
            ReceiverState::StartBit2 => {
                if bit {
                    self.bit_count = 0;
                    self.buffer = 0;
                    if read_data_available {
                        // No room to buffer another byte.
                        self.change_state(ReceiverState::Discard);
                        ReceiverEvent::Overrun
                    } else {
                        self.change_state(ReceiverState::Data);
                        ReceiverEvent::SendAck
                    }
                } else {
                    self.change_state(ReceiverState::Idle);
                    ReceiverEvent::AckReceived
                }
            }
            ReceiverState::Data => {
                if self.bit_count < 8 {
                    // LSB arrives first.
                    self.buffer >>= 1;
                    self.buffer |= (bit as u8) << 7;
                    self.bit_count += 1;
                }
                if self.bit_count == 8 {
                    self.change_state(ReceiverState::StopBit);
                }
                ReceiverEvent::None
            }
            ReceiverState::Discard => {
                if self.bit_count < 9 {
                    self.bit_count += 1;
                }
                if self.bit_count == 9 {
                    self.change_state(ReceiverState::Idle);
                }
                ReceiverEvent::None
            }
            ReceiverState::StopBit => {
                self.change_state(ReceiverState::Idle);
                if bit {
                    ReceiverEvent::FramingError
                } else {
                    ReceiverEvent::Data(self.buffer)
                }
            }
        }
    }

    fn change_state(&mut self, new_state: ReceiverState) {
        debug!("Receiver {:?} -> {:?}", self.state, new_state);
        self.state = new_state;
    }
}

/// A pending transfer, keyed by the workspace pointer of the descheduled
/// process that issued it.
struct Transfer {
    workspace: u32,
    remaining: VecDeque<u8>,
    received: Vec<u8>,
    wanted: usize,
}

/// One end of a bit-level link: pin, decoder, sender and receiver state
/// machines, status word and the async transfer registers.
pub struct AsyncLink {
    link_no: usize,
    pin: Box<dyn TxRxPin>,
    oversampler: OversampledRx,
    sender: Sender,
    receiver: Receiver,
    status: LinkStatus,
    write_transfer: Option<Transfer>,
    read_transfer: Option<Transfer>,
}

impl AsyncLink {
    pub fn new(link_no: usize, pin: Box<dyn TxRxPin>) -> Self {
        let mut link = Self {
            link_no,
            pin,
            oversampler: OversampledRx::new(),
            sender: Sender::new(),
            receiver: Receiver::new(),
            status: LinkStatus::empty(),
            write_transfer: None,
            read_transfer: None,
        };
        link.status.insert(LinkStatus::READY_TO_SEND);
        link
    }

    pub fn link_no(&self) -> usize {
        self.link_no
    }

    /// The status word: error and readiness flags plus the received byte.
    pub fn status_word(&self) -> u16 {
        self.status.bits() | (self.receiver_data() & STATUS_DATA_MASK)
    }

    fn receiver_data(&self) -> u16 {
        if self.status.contains(LinkStatus::READ_DATA_AVAILABLE) {
            self.receiver.buffer as u16
        } else {
            0
        }
    }

    pub fn sender_state(&self) -> SenderState {
        self.sender.state
    }

    pub fn receiver_state(&self) -> ReceiverState {
        self.receiver.state
    }

    /// Begin an asynchronous write on behalf of the process at
    /// `workspace`. Returns false if a write is already in flight.
    pub fn write_data_async(&mut self, workspace: u32, data: &[u8]) -> bool {
        if self.write_transfer.is_some() {
            return false;
        }
        self.write_transfer = Some(Transfer {
            workspace,
            remaining: data.iter().copied().collect(),
            received: Vec::new(),
            wanted: 0,
        });
        self.pump_write();
        true
    }

    /// Workspace pointer of a completed write, or NotProcess while the
    /// write is still in flight. A returned pointer resets the write
    /// registers; take it when you see it.
    pub fn write_complete(&mut self) -> u32 {
        let done = match &self.write_transfer {
            Some(t) => {
                t.remaining.is_empty()
                    && self.sender.state == SenderState::Idle
                    && self.status.contains(LinkStatus::READY_TO_SEND)
            }
            None => false,
        };
        if done {
            let t = self.write_transfer.take().expect("transfer checked above");
            t.workspace
        } else {
            NOT_PROCESS
        }
    }

    /// Begin an asynchronous read of `length` bytes on behalf of the
    /// process at `workspace`.
    pub fn read_data_async(&mut self, workspace: u32, length: usize) {
        self.read_transfer = Some(Transfer {
            workspace,
            remaining: VecDeque::new(),
            received: Vec::with_capacity(length),
            wanted: length,
        });
        self.drain_receive_buffer();
    }

    /// Workspace pointer and data of a completed read, or NotProcess while
    /// the read is still in flight.
    pub fn read_complete(&mut self) -> (u32, Option<Vec<u8>>) {
        let done = match &self.read_transfer {
            Some(t) => t.received.len() >= t.wanted,
            None => false,
        };
        if done {
            let t = self.read_transfer.take().expect("transfer checked above");
            (t.workspace, Some(t.received))
        } else {
            (NOT_PROCESS, None)
        }
    }

    /// One clock tick: clock the sender out and sample the receive pin.
    pub fn clock(&mut self) {
        self.sender.clock(self.pin.as_mut(), &mut self.status);
        self.pump_write();
        let rx = self.pin.get_rx();
        if let Some(bit) = self.oversampler.sample(rx) {
            let rda = self.status.contains(LinkStatus::READ_DATA_AVAILABLE);
            match self.receiver.bit_received(bit, rda) {
                ReceiverEvent::None => {}
                ReceiverEvent::SendAck => {
                    self.sender.request_ack(&mut self.status);
                }
                ReceiverEvent::AckReceived => {
                    self.sender.ack_received();
                }
                ReceiverEvent::Overrun => {
                    warn!("Link {}: receive overrun", self.link_no);
                    self.status.insert(LinkStatus::OVERRUN);
                }
                ReceiverEvent::FramingError => {
                    warn!("Link {}: framing error", self.link_no);
                    self.status.insert(LinkStatus::FRAMING_ERROR);
                }
                ReceiverEvent::Data(byte) => {
                    self.status.insert(LinkStatus::READ_DATA_AVAILABLE);
                    self.receiver.buffer = byte;
                    self.drain_receive_buffer();
                }
            }
        }
    }

    /// Feed the sender the next byte of a pending write once it is idle.
    fn pump_write(&mut self) {
        let Some(t) = &mut self.write_transfer else {
            return;
        };
        if t.remaining.is_empty() || self.sender.state != SenderState::Idle {
            return;
        }
        if !self.status.contains(LinkStatus::READY_TO_SEND) {
            return;
        }
        let byte = t.remaining.pop_front().expect("non-empty checked above");
        self.sender.send_data(byte, &mut self.status);
    }

    /// Move a buffered received byte into the pending read.
    fn drain_receive_buffer(&mut self) {
        let Some(t) = &mut self.read_transfer else {
            return;
        };
        if !self.status.contains(LinkStatus::READ_DATA_AVAILABLE) {
            return;
        }
        if t.received.len() < t.wanted {
            t.received.push(self.receiver.buffer);
            self.status.remove(LinkStatus::READ_DATA_AVAILABLE);
        }
    }
}

/// Ticks a set of links from a background thread at a fixed interval.
pub struct LinkClock {
    links: Vec<Arc<Mutex<AsyncLink>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl LinkClock {
    pub fn new(links: Vec<Arc<Mutex<AsyncLink>>>) -> Self {
        Self {
            links,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            interval: LINK_CLOCK_TICK_INTERVAL,
        }
    }

    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        let links = self.links.clone();
        let running = self.running.clone();
        let interval = self.interval;
        self.handle = Some(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                for link in &links {
                    link.lock().unwrap().clock();
                }
                std::thread::sleep(interval);
            }
        }));
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LinkClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A pin with a scripted receive level and an unconnected transmit.
    struct ScriptedPin {
        rx: VecDeque<bool>,
    }

    impl ScriptedPin {
        fn new() -> Self {
            Self { rx: VecDeque::new() }
        }
    }

    impl TxRxPin for ScriptedPin {
        fn get_rx(&mut self) -> bool {
            self.rx.pop_front().unwrap_or(false)
        }

        fn set_tx(&mut self, _state: bool) {}
    }

    fn clock_n(link: &mut AsyncLink, n: u32) {
        for _ in 0..n {
            link.clock();
        }
    }

    /// Clock both ends of a crosswired pair until the predicate holds.
    fn clock_pair_until(
        a: &mut AsyncLink,
        b: &mut AsyncLink,
        limit: u32,
        mut done: impl FnMut(&mut AsyncLink, &mut AsyncLink) -> bool,
    ) -> bool {
        for _ in 0..limit {
            a.clock();
            b.clock();
            if done(a, b) {
                return true;
            }
        }
        false
    }

    #[test]
    fn test_new_link_is_ready_to_send() {
        let (pin, _other) = CrosswiredPins::pair();
        let link = AsyncLink::new(0, Box::new(pin));
        assert_eq!(link.sender_state(), SenderState::Idle);
        assert_eq!(link.receiver_state(), ReceiverState::Idle);
        assert!(link.status_word() & LinkStatus::READY_TO_SEND.bits() != 0);
    }

    #[test]
    fn test_data_frame_is_clocked_out_lsb_first() {
        let (pin, mut other) = CrosswiredPins::pair();
        let mut link = AsyncLink::new(0, Box::new(pin));
        assert!(link.write_data_async(0x8000_1000, &[0xC9]));
        assert_eq!(link.sender_state(), SenderState::SendingData);

        // Sample the wire once per tick, 16 ticks per bit.
        let mut levels = Vec::new();
        for _ in 0..DATA_FRAME_BITS {
            let mut ones = 0;
            for _ in 0..SAMPLES_PER_BIT {
                link.clock();
                if other.get_rx() {
                    ones += 1;
                }
            }
            levels.push(ones > SAMPLES_PER_BIT / 2);
        }
        // 0xC9 = 0b11001001, LSB first after the two start bits, then the
        // stop bit.
        assert_eq!(
            levels,
            vec![true, true, true, false, false, true, false, false, true, true, false]
        );
    }

    #[test]
    fn test_byte_crosses_a_crosswired_pair() {
        let (pin_a, pin_b) = CrosswiredPins::pair();
        let mut a = AsyncLink::new(0, Box::new(pin_a));
        let mut b = AsyncLink::new(0, Box::new(pin_b));

        b.read_data_async(0x8000_2000, 1);
        assert!(a.write_data_async(0x8000_1000, &[0x5A]));

        let arrived = clock_pair_until(&mut a, &mut b, 10_000, |_, b| {
            let (w, data) = b.read_complete();
            if w != NOT_PROCESS {
                assert_eq!(w, 0x8000_2000);
                assert_eq!(data.unwrap(), vec![0x5A]);
                true
            } else {
                false
            }
        });
        assert!(arrived, "byte never crossed the wire");

        // The ack comes back and completes the write.
        let acked = clock_pair_until(&mut a, &mut b, 10_000, |a, _| {
            a.write_complete() == 0x8000_1000
        });
        assert!(acked, "write never completed");
    }

    #[test]
    fn test_multi_byte_write_completes_in_order() {
        let (pin_a, pin_b) = CrosswiredPins::pair();
        let mut a = AsyncLink::new(0, Box::new(pin_a));
        let mut b = AsyncLink::new(0, Box::new(pin_b));

        b.read_data_async(0x8000_2000, 3);
        assert!(a.write_data_async(0x8000_1000, &[0x01, 0x02, 0x03]));

        let done = clock_pair_until(&mut a, &mut b, 40_000, |a, b| {
            let (w, data) = b.read_complete();
            if w != NOT_PROCESS {
                assert_eq!(data.unwrap(), vec![0x01, 0x02, 0x03]);
                // The writer finishes once its last ack arrives.
                return a.write_complete() != NOT_PROCESS
                    || clock_pair_until(a, b, 2_000, |a, _| {
                        a.write_complete() == 0x8000_1000
                    });
            }
            false
        });
        assert!(done, "three bytes never crossed the wire");
    }

    #[test]
    fn test_unacked_data_times_out() {
        // The peer never answers: transmit into a scripted pin that stays
        // low.
        let mut link = AsyncLink::new(0, Box::new(ScriptedPin::new()));
        assert!(link.write_data_async(0x8000_1000, &[0xFF]));
        clock_n(&mut link, DATA_FRAME_BITS * SAMPLES_PER_BIT + 1);
        assert_eq!(link.sender_state(), SenderState::AckTimeout);
        assert!(link.status_word() & LinkStatus::DATA_SENT_NOT_ACKED.bits() != 0);
        assert_eq!(link.write_complete(), NOT_PROCESS);
    }

    #[test]
    fn test_receiver_acks_after_second_start_bit() {
        let mut receiver = Receiver::new();
        assert_eq!(receiver.bit_received(true, false), ReceiverEvent::None);
        assert_eq!(receiver.state, ReceiverState::StartBit2);
        assert_eq!(receiver.bit_received(true, false), ReceiverEvent::SendAck);
        assert_eq!(receiver.state, ReceiverState::Data);
    }

    #[test]
    fn test_receiver_decodes_ack() {
        let mut receiver = Receiver::new();
        receiver.bit_received(true, false);
        assert_eq!(
            receiver.bit_received(false, false),
            ReceiverEvent::AckReceived
        );
        assert_eq!(receiver.state, ReceiverState::Idle);
    }

    #[test]
    fn test_receiver_discards_on_overrun() {
        let mut receiver = Receiver::new();
        receiver.bit_received(true, true);
        assert_eq!(receiver.bit_received(true, true), ReceiverEvent::Overrun);
        assert_eq!(receiver.state, ReceiverState::Discard);
        // Eight data bits and the stop bit pass without effect.
        for _ in 0..8 {
            assert_eq!(receiver.bit_received(false, true), ReceiverEvent::None);
        }
        assert_eq!(receiver.bit_received(false, true), ReceiverEvent::None);
        assert_eq!(receiver.state, ReceiverState::Idle);
    }

    #[test]
    fn test_receiver_reports_framing_error_on_high_stop_bit() {
        let mut receiver = Receiver::new();
        receiver.bit_received(true, false);
        receiver.bit_received(true, false);
        for _ in 0..8 {
            receiver.bit_received(true, false);
        }
        assert_eq!(receiver.state, ReceiverState::StopBit);
        assert_eq!(
            receiver.bit_received(true, false),
            ReceiverEvent::FramingError
        );
    }

    #[test]
    fn test_receiver_assembles_byte_lsb_first() {
        let mut receiver = Receiver::new();
        receiver.bit_received(true, false);
        receiver.bit_received(true, false);
        // 0xA5 = 0b10100101, transmitted LSB first.
        for bit in [true, false, true, false, false, true, false, true] {
            receiver.bit_received(bit, false);
        }
        assert_eq!(receiver.bit_received(false, false), ReceiverEvent::Data(0xA5));
    }

    #[test]
    fn test_majority_vote_rejects_glitches() {
        let mut rx = OversampledRx::new();
        // A bit window of mostly-high samples with one glitch low in the
        // voting window still decodes high.
        let mut decoded = Vec::new();
        for i in 0..SAMPLES_PER_BIT {
            let level = i != 7;
            if let Some(bit) = rx.sample(level) {
                decoded.push(bit);
            }
        }
        assert_eq!(decoded, vec![true]);
    }

    #[test]
    fn test_link_clock_ticks_links() {
        let (pin, _other) = CrosswiredPins::pair();
        let link = Arc::new(Mutex::new(AsyncLink::new(0, Box::new(pin))));
        let mut clock = LinkClock::new(vec![link.clone()]);
        clock.start();
        std::thread::sleep(Duration::from_millis(5));
        clock.stop();
        // The link stayed idle but was safely shared with the tick thread.
        assert_eq!(link.lock().unwrap().sender_state(), SenderState::Idle);
    }
}

//! In-memory transport and clock for unit tests.
//!
//! [`MockTransport::scripted`] replays a fixed byte sequence, while
//! [`MockTransport::device`] parses host packets as they are written and
//! answers like the mmWave ROM bootloader would. [`MockClock`] advances only
//! when slept on, so timeouts elapse instantly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::port::{Clock, LineControl, ResetLine, Transport};
use crate::protocol::command::{Opcode, RET_SUCCESS};
use crate::protocol::frame::{self, ACK, NACK, SYNC};

/// Virtual millisecond clock shared between clones.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockClock {
    now: Arc<AtomicU64>,
}

impl MockClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now
            .load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, ms: u64) {
        self.now
            .fetch_add(ms, Ordering::SeqCst);
    }
}

/// How the simulated bootloader misbehaves.
#[derive(Debug, Clone)]
pub(crate) struct DeviceBehavior {
    /// Never answer anything.
    pub silent: bool,
    /// Answer this opcode with NACK.
    pub nack_opcode: Option<Opcode>,
    /// NACK the data chunk with this zero-based index.
    pub fail_chunk: Option<usize>,
    /// Payload of the GET_VERSION response.
    pub version: Vec<u8>,
    /// Number of pings to ignore before answering.
    pub ping_failures: usize,
    /// Bytes sent before every ACK.
    pub noise_before_ack: Vec<u8>,
    /// Send status responses with a wrong checksum.
    pub corrupt_status: bool,
}

impl Default for DeviceBehavior {
    fn default() -> Self {
        Self {
            silent: false,
            nack_opcode: None,
            fail_chunk: None,
            version: vec![
                0x02, 0x00, 0x04, 0x01, 0x19, 0x06, 0x11, 0x20, 0x00, 0x00, 0x00, 0x00,
            ],
            ping_failures: 0,
            noise_before_ack: Vec::new(),
            corrupt_status: false,
        }
    }
}

/// Modem line activity seen by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineEvent {
    Line(ResetLine, bool),
    Break(bool),
}

/// Everything the mock has observed, shared with the test.
#[derive(Debug, Default)]
pub(crate) struct DeviceState {
    /// Bytes queued for the host to read.
    pub tx: VecDeque<u8>,
    /// Every byte the host wrote.
    pub written: Vec<u8>,
    /// Host-to-device bytes not yet parsed into a packet.
    pub rx: Vec<u8>,
    /// Decoded payloads of every host packet, in order.
    pub packets: Vec<Vec<u8>>,
    /// Single ACK bytes written by the host outside a packet.
    pub host_acks: usize,
    /// Number of flush calls.
    pub flushes: usize,
    /// Modem line activity.
    pub line_events: Vec<LineEvent>,
    behavior: Option<DeviceBehavior>,
    last_opcode: Option<u8>,
    chunks_seen: usize,
}

impl DeviceState {
    /// Opcodes of every host packet, in order.
    pub(crate) fn opcodes(&self) -> Vec<u8> {
        self.packets
            .iter()
            .filter_map(|p| p.first().copied())
            .collect()
    }

    /// Payloads of host packets carrying `opcode`.
    pub(crate) fn packets_with(&self, opcode: Opcode) -> Vec<&Vec<u8>> {
        self.packets
            .iter()
            .filter(|p| p.first() == Some(&(opcode as u8)))
            .collect()
    }

    fn parse_rx(&mut self) {
        loop {
            match self
                .rx
                .first()
                .copied()
            {
                None => return,
                Some(SYNC) => {
                    if self
                        .rx
                        .len()
                        < 4
                    {
                        return;
                    }
                    let declared = usize::from(u16::from_be_bytes([self.rx[1], self.rx[2]]));
                    let total = 4 + declared.saturating_sub(2);
                    if self
                        .rx
                        .len()
                        < total
                    {
                        return;
                    }
                    let packet: Vec<u8> = self
                        .rx
                        .drain(..total)
                        .collect();
                    let payload = frame::decode(&packet)
                        .map(<[u8]>::to_vec)
                        .unwrap_or_default();
                    self.packets
                        .push(payload.clone());
                    self.respond(&payload);
                },
                Some(byte) => {
                    if byte == ACK {
                        self.host_acks += 1;
                    }
                    self.rx
                        .remove(0);
                },
            }
        }
    }

    fn respond(&mut self, payload: &[u8]) {
        let Some(behavior) = self
            .behavior
            .clone()
        else {
            return;
        };
        let Some(&opcode) = payload.first() else {
            return;
        };
        if behavior.silent {
            return;
        }

        if opcode == Opcode::Ping as u8 && behavior.ping_failures > 0 {
            if let Some(b) = self
                .behavior
                .as_mut()
            {
                b.ping_failures -= 1;
            }
            return;
        }

        if opcode == Opcode::GetLastStatus as u8 {
            let status = if self.last_opcode == Some(Opcode::SendDataRam as u8) {
                vec![0x00, 0x00, 0x00, RET_SUCCESS]
            } else {
                vec![RET_SUCCESS]
            };
            self.queue_response(&status, behavior.corrupt_status);
            return;
        }

        self.last_opcode = Some(opcode);

        let mut reject = behavior
            .nack_opcode
            .is_some_and(|o| o as u8 == opcode);
        if opcode == Opcode::SendData as u8 || opcode == Opcode::SendDataRam as u8 {
            reject |= behavior.fail_chunk == Some(self.chunks_seen);
            self.chunks_seen += 1;
        }

        self.tx
            .extend(
                behavior
                    .noise_before_ack
                    .iter()
                    .copied(),
            );
        if reject {
            self.tx
                .push_back(NACK);
            return;
        }
        self.tx
            .push_back(ACK);

        if opcode == Opcode::GetVersion as u8 {
            self.queue_response(&behavior.version, false);
        }
    }

    fn queue_response(&mut self, payload: &[u8], corrupt: bool) {
        let mut packet = response_packet(payload);
        if corrupt {
            packet[2] ^= 0xFF;
        }
        self.tx
            .extend(packet);
    }
}

/// Device-to-host packet: length(2, BE), checksum, payload.
pub(crate) fn response_packet(payload: &[u8]) -> Vec<u8> {
    let declared = u16::try_from(payload.len() + 2).unwrap_or(u16::MAX);
    let mut packet = declared
        .to_be_bytes()
        .to_vec();
    packet.push(frame::checksum(payload));
    packet.extend_from_slice(payload);
    packet
}

/// Transport backed by [`DeviceState`].
pub(crate) struct MockTransport {
    state: Arc<Mutex<DeviceState>>,
    entered: Option<Sender<()>>,
    release: Option<Receiver<()>>,
}

impl MockTransport {
    /// Replays `bytes` to the host and records writes.
    pub(crate) fn scripted(bytes: &[u8]) -> Self {
        let state = DeviceState {
            tx: bytes
                .iter()
                .copied()
                .collect(),
            ..Default::default()
        };
        Self::from_state(state)
    }

    /// Simulates a bootloader with the given behavior.
    pub(crate) fn device(behavior: DeviceBehavior) -> Self {
        let state = DeviceState {
            behavior: Some(behavior),
            ..Default::default()
        };
        Self::from_state(state)
    }

    fn from_state(state: DeviceState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            entered: None,
            release: None,
        }
    }

    /// Blocks the first write until `release` yields, signalling `entered`
    /// once the write has started.
    pub(crate) fn with_gate(mut self, entered: Sender<()>, release: Receiver<()>) -> Self {
        self.entered = Some(entered);
        self.release = Some(release);
        self
    }

    /// Shared view of the observed state.
    pub(crate) fn handle(&self) -> Arc<Mutex<DeviceState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Transport for MockTransport {
    fn bytes_available(&mut self) -> Result<bool> {
        Ok(!self
            .lock()
            .tx
            .is_empty())
    }

    fn read_byte(&mut self) -> Result<u8> {
        self.lock()
            .tx
            .pop_front()
            .ok_or_else(|| {
                Error::TransportIo(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "no data",
                ))
            })
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if let (Some(entered), Some(release)) = (
            self.entered
                .take(),
            self.release
                .take(),
        ) {
            let _ = entered.send(());
            let _ = release.recv();
        }
        let mut state = self.lock();
        state
            .written
            .extend_from_slice(data);
        state
            .rx
            .extend_from_slice(data);
        state.parse_rx();
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.lock()
            .flushes += 1;
        Ok(())
    }
}

impl LineControl for MockTransport {
    fn set_line(&mut self, line: ResetLine, level: bool) -> Result<()> {
        self.lock()
            .line_events
            .push(LineEvent::Line(line, level));
        Ok(())
    }

    fn set_break(&mut self, active: bool) -> Result<()> {
        self.lock()
            .line_events
            .push(LineEvent::Break(active));
        Ok(())
    }
}

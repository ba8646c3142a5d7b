//! Sender endpoint: three-way open, windowed data phase, four-way close.

use bytes::Bytes;
use log::{debug, info, trace, warn};
use std::iter::Peekable;
use std::net::SocketAddr;
use std::slice::Chunks;
use std::time::{Duration, Instant};

use crate::connection::ConnectionState;
use crate::consts::{
    ADVERTISED_WINDOW, MAX_CONSECUTIVE_TIMEOUTS, MAX_HANDSHAKE_RETRIES, MAX_PAYLOAD,
    RECV_POLL_INTERVAL, TIMEOUT_INTERVAL,
};
use crate::error::{PrtpError, Result};
use crate::reliability::{AckOutcome, SendWindow};
use crate::segment::Segment;
use crate::transport::PacketChannel;

/// Counters reported after a completed transfer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransferStats {
    pub payload_bytes: u64,
    pub data_segments: u64,
    pub retransmissions: u64,
    pub fast_retransmits: u64,
    pub timeouts: u64,
    pub duplicate_acks: u64,
    pub peak_cwnd: f64,
    pub elapsed: Duration,
}

pub struct Sender {
    transport: PacketChannel,
    peer: SocketAddr,
    state: ConnectionState,
    initial_cwnd: f64,
}

impl Sender {
    pub fn new(transport: PacketChannel, peer: SocketAddr, initial_cwnd: f64) -> Self {
        Self {
            transport,
            peer,
            state: ConnectionState::Closed,
            initial_cwnd,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs a complete transfer: open the connection, stream every byte of
    /// `data`, close. Returns once the peer has acknowledged everything.
    pub async fn transfer(&mut self, data: &[u8]) -> Result<TransferStats> {
        let started = Instant::now();
        self.open().await?;
        let mut stats = TransferStats::default();
        let fin_seq = self.push_data(data, &mut stats).await?;
        self.close(fin_seq).await?;
        stats.elapsed = started.elapsed();
        Ok(stats)
    }

    /// Three-way open. Loss injection is suspended for the exchange, so a
    /// single round normally suffices; the SYN is still retried a bounded
    /// number of times.
    async fn open(&mut self) -> Result<()> {
        self.transport.set_handshake_mode(true);
        for attempt in 1..=MAX_HANDSHAKE_RETRIES {
            self.transport
                .send_to(Segment::syn().encode(), self.peer)
                .await?;
            self.state = ConnectionState::SynSent;
            debug!(
                "[{}] SYN sent (attempt {attempt}/{MAX_HANDSHAKE_RETRIES})",
                self.peer
            );

            if self.await_syn_ack().await? {
                self.transport
                    .send_to(Segment::handshake_ack().encode(), self.peer)
                    .await?;
                self.state = ConnectionState::Established;
                self.transport.set_handshake_mode(false);
                info!("[{}] connection established", self.peer);
                return Ok(());
            }
        }
        self.state = ConnectionState::Closed;
        Err(PrtpError::HandshakeFailed {
            attempts: MAX_HANDSHAKE_RETRIES,
        })
    }

    /// Polls for the SYN|ACK until one retransmission interval lapses.
    async fn await_syn_ack(&mut self) -> Result<bool> {
        let deadline = Instant::now() + TIMEOUT_INTERVAL;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let poll = RECV_POLL_INTERVAL.min(deadline - now);
            let Some((frame, addr)) = self.transport.recv_from(poll).await? else {
                continue;
            };
            if addr != self.peer {
                continue;
            }
            match Segment::decode(frame) {
                Ok(segment) if segment.is_rst() => {
                    self.state = ConnectionState::Closed;
                    return Err(PrtpError::ConnectionReset);
                }
                Ok(segment) if segment.is_syn() && segment.is_ack() && segment.ack_num == 1 => {
                    return Ok(true);
                }
                Ok(segment) => trace!(
                    "[{}] ignoring segment with flags {:#06x} during open",
                    self.peer, segment.flags
                ),
                Err(e) => trace!("[{}] dropping undecodable segment: {e}", self.peer),
            }
        }
    }

    /// Data phase. Each iteration: one bounded receive plus a drain of the
    /// socket queue, then timer expiry, then new segments while the window
    /// has room. Returns the sequence number for the trailing FIN.
    async fn push_data(&mut self, data: &[u8], stats: &mut TransferStats) -> Result<u32> {
        let mut window = SendWindow::new(1, self.initial_cwnd, ADVERTISED_WINDOW);
        let mut chunks = data.chunks(MAX_PAYLOAD).peekable();
        let mut acked_bytes: usize = 0;
        let report_step = (data.len() / 4).max(1);
        let mut report_at = report_step;
        let mut consecutive_timeouts = 0u32;
        let phase_started = Instant::now();

        // Prime the pipe before the first poll.
        self.fill_window(&mut window, &mut chunks, stats).await?;
        stats.peak_cwnd = window.cwnd();

        while !(window.is_empty() && chunks.peek().is_none()) {
            if let Some((frame, addr)) = self.transport.recv_from(RECV_POLL_INTERVAL).await? {
                self.handle_ack_frame(
                    frame,
                    addr,
                    &mut window,
                    stats,
                    &mut acked_bytes,
                    &mut consecutive_timeouts,
                )
                .await?;
                // ACKs landing in the same batch are processed in arrival
                // order, before any timer runs.
                while let Some((frame, addr)) = self.transport.try_recv_from()? {
                    self.handle_ack_frame(
                        frame,
                        addr,
                        &mut window,
                        stats,
                        &mut acked_bytes,
                        &mut consecutive_timeouts,
                    )
                    .await?;
                }
            }

            if acked_bytes >= report_at && acked_bytes < data.len() {
                info!(
                    "[{}] progress: {acked_bytes}/{} bytes acknowledged",
                    self.peer,
                    data.len()
                );
                report_at += report_step;
            }

            let retransmit = window.tick(Instant::now());
            if !retransmit.is_empty() {
                consecutive_timeouts += 1;
                stats.timeouts += 1;
                stats.retransmissions += retransmit.len() as u64;
                if consecutive_timeouts >= MAX_CONSECUTIVE_TIMEOUTS {
                    self.state = ConnectionState::Closed;
                    return Err(PrtpError::RetransmitCeiling {
                        seq: window.send_base(),
                        elapsed: phase_started.elapsed(),
                    });
                }
                debug!(
                    "[{}] timeout {consecutive_timeouts}: go-back-n from {} ({} segments)",
                    self.peer,
                    window.send_base(),
                    retransmit.len()
                );
                for segment in retransmit {
                    self.transport.send_to(segment.encode(), self.peer).await?;
                }
            }

            self.fill_window(&mut window, &mut chunks, stats).await?;
            stats.peak_cwnd = stats.peak_cwnd.max(window.cwnd());
        }

        stats.payload_bytes = data.len() as u64;
        debug!(
            "[{}] all {} data segments acknowledged",
            self.peer, stats.data_segments
        );
        Ok(window.next_seq_num())
    }

    async fn handle_ack_frame(
        &mut self,
        frame: Bytes,
        addr: SocketAddr,
        window: &mut SendWindow,
        stats: &mut TransferStats,
        acked_bytes: &mut usize,
        consecutive_timeouts: &mut u32,
    ) -> Result<()> {
        if addr != self.peer {
            warn!("[{}] ignoring datagram from unrelated peer {addr}", self.peer);
            return Ok(());
        }
        let segment = match Segment::decode(frame) {
            Ok(segment) => segment,
            Err(e) => {
                trace!("[{}] dropping undecodable segment: {e}", self.peer);
                return Ok(());
            }
        };
        if segment.is_rst() {
            self.state = ConnectionState::Closed;
            return Err(PrtpError::ConnectionReset);
        }
        if !segment.is_ack() || segment.is_syn() || segment.is_fin() {
            trace!(
                "[{}] ignoring non-ACK segment (flags {:#06x}) in data phase",
                self.peer, segment.flags
            );
            return Ok(());
        }

        window.set_peer_window(segment.window_size);
        match window.on_ack(segment.ack_num, Instant::now()) {
            AckOutcome::Advanced {
                newly_acked,
                acked_bytes: bytes,
            } => {
                *consecutive_timeouts = 0;
                *acked_bytes += bytes;
                trace!(
                    "[{}] ack {} advanced the window by {newly_acked}",
                    self.peer, segment.ack_num
                );
            }
            AckOutcome::FastRetransmit(lost) => {
                stats.duplicate_acks += 1;
                stats.fast_retransmits += 1;
                stats.retransmissions += 1;
                debug!("[{}] fast retransmit of segment {}", self.peer, lost.seq_num);
                self.transport.send_to(lost.encode(), self.peer).await?;
            }
            AckOutcome::Duplicate => stats.duplicate_acks += 1,
            AckOutcome::Stale => {}
        }
        Ok(())
    }

    async fn fill_window(
        &mut self,
        window: &mut SendWindow,
        chunks: &mut Peekable<Chunks<'_, u8>>,
        stats: &mut TransferStats,
    ) -> Result<()> {
        while window.can_send() && chunks.peek().is_some() {
            let Some(chunk) = chunks.next() else { break };
            let Some(segment) = window.send_new(Bytes::copy_from_slice(chunk), Instant::now())
            else {
                break;
            };
            stats.data_segments += 1;
            self.transport.send_to(segment.encode(), self.peer).await?;
        }
        Ok(())
    }

    /// Four-way close, sender side: FIN out, peer's ACK and FIN back, final
    /// ACK out. Loss injection is suspended for the whole exchange.
    async fn close(&mut self, fin_seq: u32) -> Result<()> {
        self.transport.set_handshake_mode(true);
        let fin = Segment::fin(fin_seq);
        for attempt in 1..=MAX_HANDSHAKE_RETRIES {
            self.transport.send_to(fin.encode(), self.peer).await?;
            self.state = ConnectionState::FinSent;
            debug!(
                "[{}] FIN sent (attempt {attempt}/{MAX_HANDSHAKE_RETRIES})",
                self.peer
            );

            let deadline = Instant::now() + TIMEOUT_INTERVAL;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let poll = RECV_POLL_INTERVAL.min(deadline - now);
                let Some((frame, addr)) = self.transport.recv_from(poll).await? else {
                    continue;
                };
                if addr != self.peer {
                    continue;
                }
                let segment = match Segment::decode(frame) {
                    Ok(segment) => segment,
                    Err(e) => {
                        trace!("[{}] dropping undecodable segment: {e}", self.peer);
                        continue;
                    }
                };
                if segment.is_rst() {
                    self.state = ConnectionState::Closed;
                    return Err(PrtpError::ConnectionReset);
                }
                if segment.is_fin() {
                    // The peer's FIN, possibly folded with its ACK.
                    self.transport
                        .send_to(
                            Segment::ack(segment.seq_num.wrapping_add(1)).encode(),
                            self.peer,
                        )
                        .await?;
                    self.state = ConnectionState::Done;
                    self.transport.set_handshake_mode(false);
                    info!("[{}] connection closed", self.peer);
                    return Ok(());
                }
                if segment.is_ack() && segment.ack_num == fin_seq.wrapping_add(1) {
                    trace!("[{}] FIN acknowledged, awaiting peer FIN", self.peer);
                }
            }
        }
        self.state = ConnectionState::Closed;
        Err(PrtpError::CloseTimedOut)
    }
}

//! Receiver endpoint: handshake acceptance, in-order delivery into a byte
//! sink, and the tail of the four-way close.

use log::{debug, info, trace, warn};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::connection::ConnectionState;
use crate::consts::{MAX_HANDSHAKE_RETRIES, RECV_POLL_INTERVAL, SESSION_TIMEOUT, TIMEOUT_INTERVAL};
use crate::error::{PrtpError, Result};
use crate::reliability::{Delivery, ReceiveWindow};
use crate::segment::Segment;
use crate::transport::PacketChannel;

/// Sequence number of the receiver's own FIN; the receiver sends no data.
const RECEIVER_FIN_SEQ: u32 = 1;
/// Accepted-byte interval between progress lines.
const PROGRESS_STEP: u64 = 64 * 1024;

pub struct Receiver {
    transport: PacketChannel,
    state: ConnectionState,
    peer: Option<SocketAddr>,
    delivery: ReceiveWindow,
    /// A data segment that outran the handshake-completing ACK; replayed at
    /// the top of the data phase.
    pending: Option<Segment>,
}

impl Receiver {
    pub fn new(transport: PacketChannel) -> Self {
        Self {
            transport,
            state: ConnectionState::Closed,
            peer: None,
            delivery: ReceiveWindow::new(1),
            pending: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Waits for a sender to open a connection. Returns the peer address
    /// once the three-way handshake completes.
    pub async fn accept(&mut self) -> Result<SocketAddr> {
        self.transport.set_handshake_mode(true);
        let started = Instant::now();
        loop {
            if started.elapsed() >= SESSION_TIMEOUT {
                return Err(PrtpError::SessionTimeout(SESSION_TIMEOUT));
            }
            let Some((frame, addr)) = self.transport.recv_from(RECV_POLL_INTERVAL).await? else {
                continue;
            };
            let segment = match Segment::decode(frame) {
                Ok(segment) => segment,
                Err(e) => {
                    trace!("[{addr}] dropping undecodable segment: {e}");
                    continue;
                }
            };

            if segment.is_syn() && !segment.is_ack() {
                self.peer = Some(addr);
                self.transport
                    .send_to(Segment::syn_ack().encode(), addr)
                    .await?;
                self.state = ConnectionState::SynRcvd;
                debug!("[{addr}] SYN received, SYN|ACK sent");
                continue;
            }

            if self.state == ConnectionState::SynRcvd && self.peer == Some(addr) {
                if segment.is_ack() && !segment.is_fin() && segment.ack_num == 1 {
                    self.establish(addr);
                    return Ok(addr);
                }
                if segment.is_data() || segment.is_fin() {
                    // The completing ACK was outrun (or corrupted); the
                    // follow-up traffic itself proves the handshake landed.
                    self.establish(addr);
                    self.pending = Some(segment);
                    return Ok(addr);
                }
            }
            trace!(
                "[{addr}] ignoring segment with flags {:#06x} while accepting",
                segment.flags
            );
        }
    }

    fn establish(&mut self, peer: SocketAddr) {
        self.state = ConnectionState::Established;
        self.delivery = ReceiveWindow::new(1);
        self.transport.set_handshake_mode(false);
        info!("[{peer}] connection established");
    }

    /// Streams the data phase into `sink` until the peer's FIN arrives.
    /// Bytes hit the sink in order, exactly once. Returns the payload byte
    /// count on a clean close.
    pub async fn receive<W>(&mut self, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let peer = self.peer.ok_or(PrtpError::NotConnected)?;
        let mut bytes_written: u64 = 0;
        let mut next_report = PROGRESS_STEP;
        let mut last_activity = Instant::now();

        if let Some(segment) = self.pending.take() {
            if segment.is_fin() {
                sink.flush().await?;
                self.finish(peer, &segment).await?;
                info!("[{peer}] transfer complete: 0 bytes received");
                return Ok(0);
            }
            self.deliver(peer, segment, sink, &mut bytes_written).await?;
        }

        loop {
            if last_activity.elapsed() >= SESSION_TIMEOUT {
                self.state = ConnectionState::Closed;
                return Err(PrtpError::SessionTimeout(SESSION_TIMEOUT));
            }
            let Some((frame, addr)) = self.transport.recv_from(RECV_POLL_INTERVAL).await? else {
                continue;
            };
            if addr != peer {
                warn!("[{peer}] ignoring datagram from unrelated peer {addr}");
                continue;
            }
            let segment = match Segment::decode(frame) {
                Ok(segment) => segment,
                Err(e) => {
                    // No response at all: the sender's timer recovers it.
                    trace!("[{peer}] dropping undecodable segment: {e}");
                    continue;
                }
            };
            last_activity = Instant::now();

            if segment.is_rst() {
                self.state = ConnectionState::Closed;
                return Err(PrtpError::ConnectionReset);
            }
            if segment.is_syn() {
                self.transport
                    .send_to(Segment::syn_ack().encode(), peer)
                    .await?;
                continue;
            }
            if segment.is_fin() {
                sink.flush().await?;
                self.finish(peer, &segment).await?;
                info!("[{peer}] transfer complete: {bytes_written} bytes received");
                return Ok(bytes_written);
            }
            if segment.is_data() {
                self.deliver(peer, segment, sink, &mut bytes_written).await?;
                if bytes_written >= next_report {
                    info!("[{peer}] progress: {bytes_written} bytes accepted");
                    next_report += PROGRESS_STEP;
                }
            }
            // Pure ACKs are handshake residue here; nothing to do.
        }
    }

    async fn deliver<W>(
        &mut self,
        peer: SocketAddr,
        segment: Segment,
        sink: &mut W,
        bytes_written: &mut u64,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let seq = segment.seq_num;
        match self.delivery.on_data(seq, segment.payload) {
            Delivery::InOrder(payload) => {
                sink.write_all(&payload).await?;
                *bytes_written += payload.len() as u64;
                trace!(
                    "[{peer}] accepted segment {seq}, expecting {}",
                    self.delivery.expected_seq()
                );
            }
            Delivery::Duplicate => trace!("[{peer}] duplicate segment {seq}"),
            Delivery::Gap => trace!(
                "[{peer}] out-of-order segment {seq} (expecting {})",
                self.delivery.expected_seq()
            ),
        }
        // Every valid data segment is answered with the cumulative ACK;
        // for duplicates and gaps that repeats the last one.
        self.transport
            .send_to(Segment::ack(self.delivery.ack_num()).encode(), peer)
            .await?;
        Ok(())
    }

    /// Tail of the four-way close: ACK the sender's FIN, send our own FIN,
    /// await the final ACK.
    async fn finish(&mut self, peer: SocketAddr, fin: &Segment) -> Result<()> {
        self.transport.set_handshake_mode(true);
        self.transport
            .send_to(Segment::ack(fin.seq_num.wrapping_add(1)).encode(), peer)
            .await?;
        self.state = ConnectionState::CloseWait;
        debug!("[{peer}] FIN received and acknowledged");

        let our_fin = Segment::fin(RECEIVER_FIN_SEQ);
        for attempt in 1..=MAX_HANDSHAKE_RETRIES {
            self.transport.send_to(our_fin.encode(), peer).await?;
            self.state = ConnectionState::LastAck;
            debug!(
                "[{peer}] FIN sent (attempt {attempt}/{MAX_HANDSHAKE_RETRIES})"
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
                if addr != peer {
                    continue;
                }
                let Ok(segment) = Segment::decode(frame) else {
                    continue;
                };
                if segment.is_fin() {
                    // The sender repeated its FIN: our ACK was lost to
                    // corruption. Answer again and resend our FIN.
                    self.transport
                        .send_to(
                            Segment::ack(segment.seq_num.wrapping_add(1)).encode(),
                            peer,
                        )
                        .await?;
                    break;
                }
                if segment.is_ack() && segment.ack_num == RECEIVER_FIN_SEQ + 1 {
                    self.state = ConnectionState::Done;
                    debug!("[{peer}] close complete");
                    return Ok(());
                }
            }
        }

        // Every byte is already in the sink at this point.
        warn!("[{peer}] final ACK never arrived, closing anyway");
        self.state = ConnectionState::Done;
        Ok(())
    }
}

//! Datagram transport with fault injection.
//!
//! Outgoing datagrams may be dropped, bit-flipped, or delayed according to
//! the configured [`Impairments`]. Handshake mode suppresses injected loss
//! only; corruption and delay still apply, which is what the connection
//! layer relies on for SYN and FIN exchanges.

use bytes::Bytes;
use log::trace;
use rand::Rng;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::error::Result;

const RECV_BUFFER_LEN: usize = 2048;

/// Fault-injection profile applied to outgoing datagrams.
#[derive(Debug, Clone, Copy, Default)]
pub struct Impairments {
    /// Probability in [0, 1] that a datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability in [0, 1] that one random bit of a datagram is flipped.
    pub corruption_rate: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Impairments {
    pub fn is_clean(&self) -> bool {
        self.loss_rate == 0.0 && self.corruption_rate == 0.0 && self.max_delay.is_zero()
    }
}

/// A bound UDP socket plus the impairment profile applied on send.
pub struct PacketChannel {
    socket: Arc<UdpSocket>,
    impairments: Impairments,
    handshake_mode: bool,
}

impl PacketChannel {
    pub async fn bind(addr: SocketAddr, impairments: Impairments) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            impairments,
            handshake_mode: false,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// While enabled, injected loss is suspended so that control exchanges
    /// reach the counterpart in a single transmission.
    pub fn set_handshake_mode(&mut self, enabled: bool) {
        self.handshake_mode = enabled;
    }

    pub async fn send_to(&self, frame: Bytes, peer: SocketAddr) -> Result<()> {
        let (should_drop, frame, delay) = {
            let mut rng = rand::rng();

            if !self.handshake_mode
                && self.impairments.loss_rate > 0.0
                && rng.random_bool(self.impairments.loss_rate)
            {
                (true, frame, None)
            } else {
                let frame = if self.impairments.corruption_rate > 0.0
                    && rng.random_bool(self.impairments.corruption_rate)
                {
                    let mut corrupted = frame.to_vec();
                    let byte = rng.random_range(0..corrupted.len());
                    let bit = rng.random_range(0..8);
                    corrupted[byte] ^= 1u8 << bit;
                    trace!("[{peer}] injected corruption: flipped bit {bit} of byte {byte}");
                    Bytes::from(corrupted)
                } else {
                    frame
                };

                let delay = if !self.impairments.max_delay.is_zero() {
                    let min = self.impairments.min_delay.as_secs_f64();
                    let max = self.impairments.max_delay.as_secs_f64();
                    Some(Duration::from_secs_f64(rng.random_range(min..=max)))
                } else {
                    None
                };

                (false, frame, delay)
            }
        };

        if should_drop {
            trace!("[{peer}] injected loss: dropped {} bytes", frame.len());
            return Ok(());
        }

        if let Some(delay) = delay {
            let socket = Arc::clone(&self.socket);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = socket.send_to(&frame, peer).await;
            });
            return Ok(());
        }

        self.socket.send_to(&frame, peer).await?;
        Ok(())
    }

    /// Waits up to `timeout` for a datagram. `None` signals poll expiry.
    pub async fn recv_from(&self, timeout: Duration) -> Result<Option<(Bytes, SocketAddr)>> {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        match tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, addr))) => Ok(Some((Bytes::copy_from_slice(&buf[..len]), addr))),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }

    /// Non-blocking drain of anything already queued on the socket, so a
    /// receive batch is processed before timers run.
    pub fn try_recv_from(&self) -> Result<Option<(Bytes, SocketAddr)>> {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        match self.socket.try_recv_from(&mut buf) {
            Ok((len, addr)) => Ok(Some((Bytes::copy_from_slice(&buf[..len]), addr))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;

    async fn pair(impairments: Impairments) -> (PacketChannel, PacketChannel, SocketAddr) {
        let a = PacketChannel::bind("127.0.0.1:0".parse().unwrap(), impairments)
            .await
            .unwrap();
        let b = PacketChannel::bind("127.0.0.1:0".parse().unwrap(), Impairments::default())
            .await
            .unwrap();
        let b_addr = b.local_addr().unwrap();
        (a, b, b_addr)
    }

    #[tokio::test]
    async fn clean_channel_delivers() {
        let (tx, rx, rx_addr) = pair(Impairments::default()).await;
        tx.send_to(Segment::syn().encode(), rx_addr).await.unwrap();
        let (frame, _) = rx
            .recv_from(Duration::from_secs(1))
            .await
            .unwrap()
            .expect("datagram should arrive");
        assert!(Segment::decode(frame).unwrap().is_syn());
    }

    #[tokio::test]
    async fn total_loss_drops_everything() {
        let impairments = Impairments {
            loss_rate: 1.0,
            ..Default::default()
        };
        let (tx, rx, rx_addr) = pair(impairments).await;
        for _ in 0..5 {
            tx.send_to(Segment::syn().encode(), rx_addr).await.unwrap();
        }
        assert!(
            rx.recv_from(Duration::from_millis(100)).await.unwrap().is_none(),
            "lossy channel should deliver nothing"
        );
    }

    #[tokio::test]
    async fn handshake_mode_suppresses_loss() {
        let impairments = Impairments {
            loss_rate: 1.0,
            ..Default::default()
        };
        let (mut tx, rx, rx_addr) = pair(impairments).await;
        tx.set_handshake_mode(true);
        tx.send_to(Segment::syn().encode(), rx_addr).await.unwrap();
        assert!(
            rx.recv_from(Duration::from_secs(1)).await.unwrap().is_some(),
            "handshake traffic must bypass injected loss"
        );
    }

    #[tokio::test]
    async fn corruption_fails_the_integrity_check() {
        let impairments = Impairments {
            corruption_rate: 1.0,
            ..Default::default()
        };
        let (tx, rx, rx_addr) = pair(impairments).await;
        tx.send_to(Segment::data(1, Bytes::from_static(b"payload")).encode(), rx_addr)
            .await
            .unwrap();
        let (frame, _) = rx
            .recv_from(Duration::from_secs(1))
            .await
            .unwrap()
            .expect("corrupted datagram still arrives");
        assert!(Segment::decode(frame).is_err());
    }

    #[tokio::test]
    async fn recv_times_out_on_silence() {
        let (_tx, rx, _addr) = pair(Impairments::default()).await;
        assert!(rx.recv_from(Duration::from_millis(50)).await.unwrap().is_none());
    }
}

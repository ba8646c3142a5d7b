//! Send-side sliding window: retained segments, per-segment timers,
//! cumulative ACK processing, Go-Back-N retransmission and fast retransmit.
//!
//! The window is a pure state machine: it decides what to (re)transmit and
//! hands segments back to the caller, which owns the socket. That keeps the
//! whole layer testable without any I/O.

use bytes::Bytes;
use log::trace;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::consts::{DUP_ACK_THRESHOLD, TIMEOUT_INTERVAL};
use crate::reliability::congestion::{CongestionController, CongestionState};
use crate::segment::Segment;

/// What an incoming cumulative ACK did to the window.
#[derive(Debug)]
pub enum AckOutcome {
    /// `send_base` advanced past `newly_acked` segments covering
    /// `acked_bytes` of payload.
    Advanced { newly_acked: u32, acked_bytes: usize },
    /// Third duplicate: the segment at `send_base` must go out again now.
    FastRetransmit(Segment),
    /// Duplicate ACK below the fast-retransmit threshold, or beyond it
    /// while already recovering.
    Duplicate,
    /// `ack_num` below `send_base`; ignored.
    Stale,
}

#[derive(Debug)]
pub struct SendWindow {
    /// Oldest unacknowledged data sequence number.
    send_base: u32,
    /// Sequence number the next new data segment will take.
    next_seq_num: u32,
    /// Retained copies of every in-flight segment, keyed by seq.
    buffer: BTreeMap<u32, Segment>,
    /// Last (re)transmission instant per in-flight seq. Same key set as
    /// `buffer` at every iteration boundary.
    timers: BTreeMap<u32, Instant>,
    dup_ack_count: u32,
    last_ack_num: u32,
    congestion: CongestionController,
    /// Most recent window advertisement seen from the peer.
    peer_window: u16,
}

impl SendWindow {
    pub fn new(first_seq: u32, initial_cwnd: f64, peer_window: u16) -> Self {
        Self {
            send_base: first_seq,
            next_seq_num: first_seq,
            buffer: BTreeMap::new(),
            timers: BTreeMap::new(),
            dup_ack_count: 0,
            last_ack_num: first_seq,
            congestion: CongestionController::new(initial_cwnd),
            peer_window,
        }
    }

    /// In-flight cap: the congestion window bounded by the peer's
    /// advertisement. With the fixed 8192 advertisement the congestion
    /// window is always the binding term.
    pub fn effective_window(&self) -> u32 {
        self.congestion.window().min(self.peer_window as u32).max(1)
    }

    pub fn in_flight(&self) -> u32 {
        self.next_seq_num - self.send_base
    }

    pub fn can_send(&self) -> bool {
        self.in_flight() < self.effective_window()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn send_base(&self) -> u32 {
        self.send_base
    }

    pub fn next_seq_num(&self) -> u32 {
        self.next_seq_num
    }

    pub fn cwnd(&self) -> f64 {
        self.congestion.cwnd()
    }

    pub fn congestion_state(&self) -> CongestionState {
        self.congestion.state()
    }

    pub fn set_peer_window(&mut self, window: u16) {
        self.peer_window = window;
    }

    /// Admits a new data segment if the window has room, retaining a copy
    /// for retransmission. Refusal is signalled by `None`.
    pub fn send_new(&mut self, payload: Bytes, now: Instant) -> Option<Segment> {
        if !self.can_send() {
            return None;
        }
        let segment = Segment::data(self.next_seq_num, payload);
        self.buffer.insert(self.next_seq_num, segment.clone());
        self.timers.insert(self.next_seq_num, now);
        self.next_seq_num += 1;
        Some(segment)
    }

    /// Processes one cumulative ACK in arrival order.
    pub fn on_ack(&mut self, ack_num: u32, now: Instant) -> AckOutcome {
        if ack_num > self.send_base {
            let newly_acked = ack_num - self.send_base;
            let mut acked_bytes = 0;
            for seq in self.send_base..ack_num {
                if let Some(segment) = self.buffer.remove(&seq) {
                    acked_bytes += segment.payload.len();
                }
                self.timers.remove(&seq);
            }
            self.send_base = ack_num;
            self.dup_ack_count = 0;
            self.last_ack_num = ack_num;
            // Per-segment accounting: slow-start growth depends on it.
            for _ in 0..newly_acked {
                self.congestion.on_new_ack();
            }
            AckOutcome::Advanced {
                newly_acked,
                acked_bytes,
            }
        } else if ack_num == self.send_base && !self.buffer.is_empty() {
            self.dup_ack_count += 1;
            if self.dup_ack_count == DUP_ACK_THRESHOLD {
                self.congestion.on_triple_dup();
                if let Some(segment) = self.buffer.get(&self.send_base) {
                    self.timers.insert(self.send_base, now);
                    return AckOutcome::FastRetransmit(segment.clone());
                }
                AckOutcome::Duplicate
            } else {
                if self.dup_ack_count > DUP_ACK_THRESHOLD {
                    self.congestion.on_dup_ack_in_recovery();
                }
                AckOutcome::Duplicate
            }
        } else {
            AckOutcome::Stale
        }
    }

    /// Expires retransmission timers. If any buffered segment has waited a
    /// full timeout interval, the whole window `[send_base, next_seq_num)`
    /// goes out again in ascending order and every timer restarts. Emits at
    /// most one timeout event to the controller per call.
    pub fn tick(&mut self, now: Instant) -> Vec<Segment> {
        let expired = self
            .timers
            .values()
            .any(|sent| now.duration_since(*sent) >= TIMEOUT_INTERVAL);
        if !expired {
            return Vec::new();
        }

        self.congestion.on_timeout();
        self.dup_ack_count = 0;
        trace!(
            "timeout at base {}: retransmitting {} segments",
            self.send_base,
            self.buffer.len()
        );

        for sent in self.timers.values_mut() {
            *sent = now;
        }
        self.buffer.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::ADVERTISED_WINDOW;
    use std::time::Duration;

    fn window(initial_cwnd: f64) -> SendWindow {
        SendWindow::new(1, initial_cwnd, ADVERTISED_WINDOW)
    }

    fn payload(seq: u32) -> Bytes {
        Bytes::from(vec![seq as u8; 16])
    }

    fn fill(w: &mut SendWindow, now: Instant) -> u32 {
        let mut sent = 0;
        while w.can_send() {
            let seq = w.next_seq_num();
            assert!(w.send_new(payload(seq), now).is_some());
            sent += 1;
        }
        sent
    }

    #[test]
    fn refuses_past_the_effective_window() {
        let mut w = window(2.0);
        let now = Instant::now();
        assert!(w.send_new(payload(1), now).is_some());
        assert!(w.send_new(payload(2), now).is_some());
        assert!(w.send_new(payload(3), now).is_none());
        assert_eq!(w.in_flight(), 2);
        assert!(w.in_flight() <= w.effective_window());
    }

    #[test]
    fn buffer_and_timers_share_keys() {
        let mut w = window(4.0);
        let now = Instant::now();
        fill(&mut w, now);
        w.on_ack(3, now);
        let buffered: Vec<u32> = w.buffer.keys().copied().collect();
        let timed: Vec<u32> = w.timers.keys().copied().collect();
        assert_eq!(buffered, timed);
        for seq in buffered {
            assert!(w.send_base() <= seq && seq < w.next_seq_num());
        }
    }

    #[test]
    fn cumulative_ack_advances_and_counts_per_segment() {
        let mut w = window(8.0);
        let now = Instant::now();
        fill(&mut w, now);
        match w.on_ack(4, now) {
            AckOutcome::Advanced {
                newly_acked,
                acked_bytes,
            } => {
                assert_eq!(newly_acked, 3);
                assert_eq!(acked_bytes, 48);
            }
            other => panic!("expected advance, got {other:?}"),
        }
        assert_eq!(w.send_base(), 4);
        // Slow start grew by one per acknowledged segment.
        assert_eq!(w.cwnd(), 11.0);
    }

    #[test]
    fn stale_ack_does_not_regress_send_base() {
        let mut w = window(4.0);
        let now = Instant::now();
        fill(&mut w, now);
        w.on_ack(3, now);
        assert!(matches!(w.on_ack(2, now), AckOutcome::Stale));
        assert!(matches!(w.on_ack(3, now), AckOutcome::Duplicate));
        assert_eq!(w.send_base(), 3);
    }

    #[test]
    fn third_duplicate_triggers_fast_retransmit() {
        let mut w = window(4.0);
        let now = Instant::now();
        fill(&mut w, now);
        assert!(matches!(w.on_ack(1, now), AckOutcome::Duplicate));
        assert!(matches!(w.on_ack(1, now), AckOutcome::Duplicate));
        match w.on_ack(1, now) {
            AckOutcome::FastRetransmit(segment) => assert_eq!(segment.seq_num, 1),
            other => panic!("expected fast retransmit, got {other:?}"),
        }
        assert_eq!(w.congestion_state(), CongestionState::FastRecovery);
        // A fourth duplicate inflates the window instead of retransmitting.
        let cwnd = w.cwnd();
        assert!(matches!(w.on_ack(1, now), AckOutcome::Duplicate));
        assert_eq!(w.cwnd(), cwnd + 1.0);
    }

    #[test]
    fn dup_acks_with_empty_window_are_stale() {
        let mut w = window(4.0);
        let now = Instant::now();
        assert!(matches!(w.on_ack(1, now), AckOutcome::Stale));
    }

    #[test]
    fn timeout_retransmits_exactly_the_outstanding_range() {
        let mut w = window(5.0);
        let start = Instant::now();
        fill(&mut w, start);
        w.on_ack(3, start);

        // Nothing expired yet.
        assert!(w.tick(start + Duration::from_millis(500)).is_empty());

        let later = start + TIMEOUT_INTERVAL;
        let retransmitted = w.tick(later);
        let seqs: Vec<u32> = retransmitted.iter().map(|s| s.seq_num).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
        // Collapse to one segment, single timeout event.
        assert_eq!(w.cwnd(), 1.0);
        // Timers were refreshed: an immediate second tick is silent.
        assert!(w.tick(later).is_empty());
    }

    #[test]
    fn timeout_does_not_reset_next_seq_num() {
        let mut w = window(3.0);
        let start = Instant::now();
        fill(&mut w, start);
        let next = w.next_seq_num();
        w.tick(start + TIMEOUT_INTERVAL);
        assert_eq!(w.next_seq_num(), next);
    }

    #[test]
    fn advance_resets_duplicate_counting() {
        let mut w = window(4.0);
        let now = Instant::now();
        fill(&mut w, now);
        w.on_ack(1, now);
        w.on_ack(1, now);
        w.on_ack(2, now);
        // The streak restarts: two more duplicates are not yet a triple.
        assert!(matches!(w.on_ack(2, now), AckOutcome::Duplicate));
        assert!(matches!(w.on_ack(2, now), AckOutcome::Duplicate));
        match w.on_ack(2, now) {
            AckOutcome::FastRetransmit(segment) => assert_eq!(segment.seq_num, 2),
            other => panic!("expected fast retransmit, got {other:?}"),
        }
    }

    #[test]
    fn peer_window_caps_the_effective_window() {
        let mut w = SendWindow::new(1, 64.0, 2);
        assert_eq!(w.effective_window(), 2);
        w.set_peer_window(ADVERTISED_WINDOW);
        assert_eq!(w.effective_window(), 64);
    }
}

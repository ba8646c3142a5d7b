//! AIMD congestion controller (Reno): slow start, congestion avoidance,
//! fast recovery.

use crate::consts::INITIAL_SSTHRESH;

/// Floor applied to ssthresh on every multiplicative decrease.
const MIN_SSTHRESH: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionState {
    SlowStart,
    CongestionAvoidance,
    FastRecovery,
}

/// Tracks the congestion window in segments. Consumes ACK, duplicate-ACK
/// and timeout events from the send window; never fails.
#[derive(Debug)]
pub struct CongestionController {
    cwnd: f64,
    ssthresh: f64,
    state: CongestionState,
}

impl CongestionController {
    pub fn new(initial_cwnd: f64) -> Self {
        Self {
            cwnd: initial_cwnd.max(1.0),
            ssthresh: INITIAL_SSTHRESH,
            state: CongestionState::SlowStart,
        }
    }

    /// One event per newly acknowledged segment: exponential growth in slow
    /// start, additive in congestion avoidance, deflation out of recovery.
    pub fn on_new_ack(&mut self) {
        match self.state {
            CongestionState::SlowStart => {
                self.cwnd += 1.0;
                if self.cwnd >= self.ssthresh {
                    self.state = CongestionState::CongestionAvoidance;
                }
            }
            CongestionState::CongestionAvoidance => {
                self.cwnd += 1.0 / self.cwnd;
            }
            CongestionState::FastRecovery => {
                self.cwnd = self.ssthresh;
                self.state = CongestionState::CongestionAvoidance;
            }
        }
    }

    /// Third duplicate ACK: halve, inflate by the three duplicates, enter
    /// recovery. Further triples inside recovery are ignored.
    pub fn on_triple_dup(&mut self) {
        if self.state == CongestionState::FastRecovery {
            return;
        }
        self.ssthresh = (self.cwnd / 2.0).max(MIN_SSTHRESH);
        self.cwnd = self.ssthresh + 3.0;
        self.state = CongestionState::FastRecovery;
    }

    /// Duplicate ACKs beyond the third inflate the window while recovering;
    /// outside recovery they carry no signal.
    pub fn on_dup_ack_in_recovery(&mut self) {
        if self.state == CongestionState::FastRecovery {
            self.cwnd += 1.0;
        }
    }

    /// A timeout signals sustained congestion: collapse to one segment and
    /// restart slow start.
    pub fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2.0).max(MIN_SSTHRESH);
        self.cwnd = 1.0;
        self.state = CongestionState::SlowStart;
    }

    /// Window usable by the reliability layer, in whole segments.
    pub fn window(&self) -> u32 {
        self.cwnd.floor().max(1.0) as u32
    }

    pub fn cwnd(&self) -> f64 {
        self.cwnd
    }

    pub fn ssthresh(&self) -> f64 {
        self.ssthresh
    }

    pub fn state(&self) -> CongestionState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_start_grows_exponentially_per_ack() {
        let mut cc = CongestionController::new(1.0);
        assert_eq!(cc.state(), CongestionState::SlowStart);
        cc.on_new_ack();
        cc.on_new_ack();
        assert_eq!(cc.cwnd(), 3.0);
        assert_eq!(cc.window(), 3);
    }

    #[test]
    fn crossing_ssthresh_enters_congestion_avoidance() {
        let mut cc = CongestionController::new(63.0);
        // One ACK below the threshold of 64.
        cc.on_new_ack();
        assert_eq!(cc.cwnd(), 64.0);
        assert_eq!(cc.state(), CongestionState::CongestionAvoidance);
        // Linear growth from here on.
        cc.on_new_ack();
        assert!((cc.cwnd() - (64.0 + 1.0 / 64.0)).abs() < 1e-9);
    }

    #[test]
    fn triple_dup_halves_and_inflates() {
        let mut cc = CongestionController::new(10.0);
        cc.on_triple_dup();
        assert_eq!(cc.ssthresh(), 5.0);
        assert_eq!(cc.cwnd(), 8.0);
        assert_eq!(cc.state(), CongestionState::FastRecovery);
        // A second triple while recovering changes nothing.
        cc.on_triple_dup();
        assert_eq!(cc.cwnd(), 8.0);
        assert_eq!(cc.ssthresh(), 5.0);
    }

    #[test]
    fn ssthresh_never_collapses_below_two() {
        let mut cc = CongestionController::new(1.0);
        cc.on_triple_dup();
        assert_eq!(cc.ssthresh(), 2.0);
        assert_eq!(cc.cwnd(), 5.0);
    }

    #[test]
    fn dup_acks_inflate_only_inside_recovery() {
        let mut cc = CongestionController::new(10.0);
        cc.on_dup_ack_in_recovery();
        assert_eq!(cc.cwnd(), 10.0);
        cc.on_triple_dup();
        let inflated = cc.cwnd();
        cc.on_dup_ack_in_recovery();
        assert_eq!(cc.cwnd(), inflated + 1.0);
    }

    #[test]
    fn new_ack_deflates_out_of_recovery() {
        let mut cc = CongestionController::new(10.0);
        cc.on_triple_dup();
        cc.on_dup_ack_in_recovery();
        cc.on_new_ack();
        assert_eq!(cc.cwnd(), 5.0);
        assert_eq!(cc.state(), CongestionState::CongestionAvoidance);
    }

    #[test]
    fn timeout_restarts_slow_start_from_one() {
        let mut cc = CongestionController::new(20.0);
        cc.on_timeout();
        assert_eq!(cc.ssthresh(), 10.0);
        assert_eq!(cc.cwnd(), 1.0);
        assert_eq!(cc.state(), CongestionState::SlowStart);
        // The floor still guards the usable window.
        assert_eq!(cc.window(), 1);
    }

    #[test]
    fn window_floors_fractional_cwnd() {
        let mut cc = CongestionController::new(10.0);
        cc.on_triple_dup();
        cc.on_new_ack();
        assert_eq!(cc.state(), CongestionState::CongestionAvoidance);
        assert_eq!(cc.cwnd(), 5.0);
        cc.on_new_ack();
        assert!(cc.cwnd() > 5.0 && cc.cwnd() < 6.0);
        assert_eq!(cc.window(), 5);
    }
}

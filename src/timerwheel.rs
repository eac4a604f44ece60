// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! Hashed timing wheel for retransmission and delayed-ack scheduling.
//!
//! Two parallel slot arrays share one sweep: `rxms` holds pending
//! retransmissions, `acks` holds pending delayed acks. A presence bitmap
//! dedups multiple ack requests for the same flow landing in the same
//! slot. Constants and the sweep algorithm follow the original timer
//! wheel: `S` slots addressed by the top bits of a nanosecond timestamp
//! shifted right by `R`, the resolution.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// log2 of the number of retransmission slots.
pub const RXMQ_S: u32 = 14;
/// log2 of the maximum representable delay, in nanoseconds.
pub const RXMQ_M: u32 = 34;
/// Resolution: each slot spans `2^RXMQ_R` nanoseconds.
pub const RXMQ_R: u32 = RXMQ_M - RXMQ_S;
/// Number of retransmission slots.
pub const RXMQ_SLOTS: usize = 1 << RXMQ_S;
/// Number of delayed-ack slots (coarser queue, smaller horizon).
pub const ACKQ_SLOTS: usize = 1 << 10;

fn ns_to_rxm_slot(ns: u64) -> usize {
    ((ns >> RXMQ_R) as usize) & (RXMQ_SLOTS - 1)
}

fn ns_to_ack_slot(ns: u64) -> usize {
    ((ns >> RXMQ_R) as usize) & (ACKQ_SLOTS - 1)
}

/// Live flow state and transport operations the wheel needs at sweep time.
///
/// The wheel never snapshots flow state at schedule time beyond the
/// `flow_id` it was handed: every other field (lower window edge, rto,
/// liveness) is re-read through this trait on each sweep, since a flow can
/// be deallocated and its `fd` reused between scheduling and firing.
pub trait FlowTransport: Send + Sync {
    /// Returns `(flow_id, send_lwe, recv_lwe, rto)` if `fd` still refers to
    /// a live flow, or `None` if it has been torn down or reused.
    fn flow_state(&self, fd: u32) -> Option<(u64, u32, u32, Duration)>;

    /// Resends `payload` with `ackno` patched in, returns whether it
    /// succeeded in being queued to the flow's egress.
    fn retransmit(&self, fd: u32, flow_id: u64, payload: &[u8], ackno: u32) -> bool;

    /// Marks both directions of a flow down, e.g. after the r-timer
    /// (absolute retransmission deadline) expires.
    fn mark_flow_down(&self, fd: u32);

    /// Sends a standalone ack for the flow's current receive window.
    fn send_ack(&self, fd: u32, flow_id: u64);
}

struct RxmEntry {
    seqno: u32,
    payload: Vec<u8>,
    t0: Duration,
    mul: u32,
    r_timeout: Duration,
    fd: u32,
    flow_id: u64,
}

struct AckEntry {
    fd: u32,
    flow_id: u64,
}

struct Inner {
    rxms: Vec<VecDeque<RxmEntry>>,
    acks: Vec<VecDeque<AckEntry>>,
    ack_present: Vec<HashSet<u32>>,
    prv: usize,
}

/// The timer wheel. One instance is shared (behind an `Arc`) by every flow
/// in a process; a single driver thread calls [`TimerWheel::sweep`]
/// periodically at the wheel's resolution.
pub struct TimerWheel {
    inner: Mutex<Inner>,
}

impl TimerWheel {
    /// Creates a wheel whose "last processed slot" is the one just before
    /// `now`, so the first sweep doesn't skip the slot `now` falls in.
    pub fn new(now: Duration) -> Self {
        let now_ns = now.as_nanos() as u64;
        let prv = (ns_to_rxm_slot(now_ns).wrapping_sub(1)) & (RXMQ_SLOTS - 1);
        let mut rxms = Vec::with_capacity(RXMQ_SLOTS);
        rxms.resize_with(RXMQ_SLOTS, VecDeque::new);
        let mut acks = Vec::with_capacity(ACKQ_SLOTS);
        acks.resize_with(ACKQ_SLOTS, VecDeque::new);
        let mut ack_present = Vec::with_capacity(ACKQ_SLOTS);
        ack_present.resize_with(ACKQ_SLOTS, HashSet::new);
        TimerWheel {
            inner: Mutex::new(Inner {
                rxms,
                acks,
                ack_present,
                prv,
            }),
        }
    }

    /// Schedules a retransmission of `payload` (already framed) at
    /// `rto` from `now`, tagged with `seqno` for window-edge comparison.
    #[allow(clippy::too_many_arguments)]
    pub fn rxm(
        &self,
        fd: u32,
        flow_id: u64,
        seqno: u32,
        payload: Vec<u8>,
        rto: Duration,
        r_timeout: Duration,
        now: Duration,
    ) {
        let now_ns = now.as_nanos() as u64;
        let fire_ns = now_ns + rto.as_nanos() as u64;
        let slot = (ns_to_rxm_slot(fire_ns) + 1) & (RXMQ_SLOTS - 1);
        let entry = RxmEntry {
            seqno,
            payload,
            t0: now,
            mul: 0,
            r_timeout,
            fd,
            flow_id,
        };
        let mut inner = self.inner.lock().unwrap();
        inner.rxms[slot].push_back(entry);
    }

    /// Schedules a delayed ack for `fd`, `delt_ack` from `now`. A second
    /// call for the same `(slot, fd)` pair before the first fires is a
    /// no-op: one ack covers everything received since the last one sent.
    pub fn ack(&self, fd: u32, flow_id: u64, delt_ack: Duration, now: Duration) {
        let now_ns = now.as_nanos() as u64;
        let fire_ns = now_ns + delt_ack.as_nanos() as u64;
        let slot = (ns_to_ack_slot(fire_ns) + 1) & (ACKQ_SLOTS - 1);

        let mut inner = self.inner.lock().unwrap();
        if !inner.ack_present[slot].insert(fd) {
            return;
        }
        inner.acks[slot].push_back(AckEntry { fd, flow_id });
    }

    /// Advances the wheel to `now`, firing every rxm/ack slot between the
    /// last processed slot and `now`'s slot (wrap-tolerant: if the target
    /// slot index is numerically behind `prv`, it's treated as having
    /// wrapped around the ring).
    pub fn sweep(&self, now: Duration, transport: &dyn FlowTransport) {
        let now_ns = now.as_nanos() as u64;
        let target = ns_to_rxm_slot(now_ns);
        let mut inner = self.inner.lock().unwrap();
        let prv = inner.prv;
        let mut target_unwrapped = target;
        if target_unwrapped < prv {
            target_unwrapped += RXMQ_SLOTS;
        }

        self.sweep_rxms(&mut inner, now, prv, target_unwrapped, transport);
        self.sweep_acks(&mut inner, prv, target_unwrapped, transport);
        inner.prv = target_unwrapped & (RXMQ_SLOTS - 1);
    }

    /// Fires every rxm slot in `(prv, target_unwrapped]`. Rescheduled
    /// entries are keyed off `target_unwrapped`, not the slot currently
    /// being drained, so a requeue can never land inside this same sweep's
    /// remaining range.
    fn sweep_rxms(
        &self,
        inner: &mut Inner,
        now: Duration,
        prv: usize,
        target_unwrapped: usize,
        transport: &dyn FlowTransport,
    ) {
        let mut i = prv;
        while i < target_unwrapped {
            i += 1;
            let slot = i & (RXMQ_SLOTS - 1);
            let pending: Vec<RxmEntry> = inner.rxms[slot].drain(..).collect();
            let mut requeue: Vec<(usize, RxmEntry)> = Vec::new();

            for mut r in pending {
                let Some((flow_id, snd_lwe, rcv_lwe, rto)) = transport.flow_state(r.fd) else {
                    continue;
                };
                if flow_id != r.flow_id {
                    continue;
                }
                // Already acked: the window has advanced past this seqno.
                if (r.seqno.wrapping_sub(snd_lwe) as i32) < 0 {
                    continue;
                }
                if now.saturating_sub(r.t0) > r.r_timeout {
                    transport.mark_flow_down(r.fd);
                    continue;
                }
                if !transport.retransmit(r.fd, r.flow_id, &r.payload, rcv_lwe) {
                    transport.mark_flow_down(r.fd);
                    continue;
                }
                r.mul += 1;
                r.t0 = now;
                let delay_slots = ((rto.as_nanos() as u64 * r.mul as u64) >> RXMQ_R).max(1);
                let rslot = (target_unwrapped as u64 + delay_slots) as usize & (RXMQ_SLOTS - 1);
                requeue.push((rslot, r));
            }

            for (rslot, r) in requeue {
                inner.rxms[rslot].push_back(r);
            }
        }
    }

    /// Fires every ack slot in the same `(prv, target_unwrapped]` range as
    /// [`Self::sweep_rxms`], masked into the coarser ack ring.
    fn sweep_acks(
        &self,
        inner: &mut Inner,
        prv: usize,
        target_unwrapped: usize,
        transport: &dyn FlowTransport,
    ) {
        let mut j = prv;
        while j < target_unwrapped {
            j += 1;
            let slot = j & (ACKQ_SLOTS - 1);
            let pending: Vec<AckEntry> = inner.acks[slot].drain(..).collect();
            inner.ack_present[slot].clear();
            for a in pending {
                if let Some((flow_id, ..)) = transport.flow_state(a.fd)
                    && flow_id == a.flow_id
                {
                    transport.send_ack(a.fd, a.flow_id);
                }
            }
        }
    }

    /// Number of rxm entries currently pending, for tests/introspection.
    pub fn pending_rxm_count(&self) -> usize {
        self.inner.lock().unwrap().rxms.iter().map(|q| q.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct TestFlow {
        flow_id: u64,
        lwe: AtomicU32,
        retransmits: AtomicU32,
        acks_sent: AtomicU32,
        down: std::sync::atomic::AtomicBool,
    }

    impl FlowTransport for TestFlow {
        fn flow_state(&self, _fd: u32) -> Option<(u64, u32, u32, Duration)> {
            if self.down.load(Ordering::SeqCst) {
                return None;
            }
            Some((
                self.flow_id,
                self.lwe.load(Ordering::SeqCst),
                0,
                Duration::from_millis(10),
            ))
        }

        fn retransmit(&self, _fd: u32, _flow_id: u64, _payload: &[u8], _ackno: u32) -> bool {
            self.retransmits.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn mark_flow_down(&self, _fd: u32) {
            self.down.store(true, Ordering::SeqCst);
        }

        fn send_ack(&self, _fd: u32, _flow_id: u64) {
            self.acks_sent.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn unacked_entry_is_retransmitted_on_sweep() {
        let t0 = Duration::from_secs(1);
        let wheel = TimerWheel::new(t0);
        let flow = TestFlow {
            flow_id: 1,
            lwe: AtomicU32::new(0),
            retransmits: AtomicU32::new(0),
            acks_sent: AtomicU32::new(0),
            down: std::sync::atomic::AtomicBool::new(false),
        };

        wheel.rxm(
            7,
            1,
            0,
            vec![1, 2, 3],
            Duration::from_millis(5),
            Duration::from_secs(5),
            t0,
        );
        assert_eq!(wheel.pending_rxm_count(), 1);

        let later = t0 + Duration::from_millis(20);
        wheel.sweep(later, &flow);
        assert_eq!(flow.retransmits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn acked_entry_is_dropped_not_retransmitted() {
        let t0 = Duration::from_secs(1);
        let wheel = TimerWheel::new(t0);
        let flow = TestFlow {
            flow_id: 1,
            lwe: AtomicU32::new(5),
            retransmits: AtomicU32::new(0),
            acks_sent: AtomicU32::new(0),
            down: std::sync::atomic::AtomicBool::new(false),
        };

        wheel.rxm(
            7,
            1,
            0,
            vec![1],
            Duration::from_millis(5),
            Duration::from_secs(5),
            t0,
        );
        let later = t0 + Duration::from_millis(20);
        wheel.sweep(later, &flow);
        assert_eq!(flow.retransmits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn r_timer_expiry_marks_flow_down() {
        let t0 = Duration::from_secs(1);
        let wheel = TimerWheel::new(t0);
        let flow = TestFlow {
            flow_id: 1,
            lwe: AtomicU32::new(0),
            retransmits: AtomicU32::new(0),
            acks_sent: AtomicU32::new(0),
            down: std::sync::atomic::AtomicBool::new(false),
        };

        wheel.rxm(
            7,
            1,
            0,
            vec![1],
            Duration::from_millis(5),
            Duration::from_millis(10),
            t0,
        );
        let later = t0 + Duration::from_millis(50);
        wheel.sweep(later, &flow);
        assert_eq!(flow.retransmits.load(Ordering::SeqCst), 0);
        assert!(flow.down.load(Ordering::SeqCst));
    }

    #[test]
    fn duplicate_ack_requests_in_same_slot_dedup() {
        let t0 = Duration::from_secs(1);
        let wheel = TimerWheel::new(t0);
        let flow = TestFlow {
            flow_id: 1,
            lwe: AtomicU32::new(0),
            retransmits: AtomicU32::new(0),
            acks_sent: AtomicU32::new(0),
            down: std::sync::atomic::AtomicBool::new(false),
        };

        wheel.ack(9, 1, Duration::from_millis(2), t0);
        wheel.ack(9, 1, Duration::from_millis(2), t0);

        let later = t0 + Duration::from_millis(20);
        wheel.sweep(later, &flow);
        assert_eq!(flow.acks_sent.load(Ordering::SeqCst), 1);
    }
}

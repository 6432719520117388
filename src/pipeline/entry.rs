//! Flow entries and what is reported about them.

use pipeline::instructions::InstructionSet;
use pipeline::matching::MatchSet;

use std::time::{Duration, Instant};

/// Value used in `idle_timeout` and `hard_timeout` to indicate that the entry is permanent.
pub const OFP_FLOW_PERMANENT: u32 = 0;

/// The largest timeout the protocol can carry, in seconds.
pub const OFP_MAX_TIMEOUT: u32 = 0xffff;

/// By default, choose a priority in the middle.
pub const OFP_DEFAULT_PRIORITY: u16 = 0x8000;

bitflags! {
    /// Flow-mod flags as carried by the protocol layer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FlowModFlags: u16 {
        /// Send flow removed message when flow expires or is deleted.
        const SEND_FLOW_REM = 1 << 0;
        /// Check for overlapping entries first.
        const CHECK_OVERLAP = 1 << 1;
        /// Reset flow packet and byte counts.
        const RESET_COUNTS = 1 << 2;
        /// Don't keep track of packet count.
        const NO_PKT_COUNTS = 1 << 3;
        /// Don't keep track of byte count.
        const NO_BYT_COUNTS = 1 << 4;
    }
}

/// Why a flow entry was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// Flow idle time exceeded idle_timeout.
    IdleTimeout = 0,
    /// Time exceeded hard_timeout.
    HardTimeout = 1,
    /// Evicted by a DELETE flow mod.
    Delete = 2,
}

/// Lifecycle state of an entry at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryState {
    Active,
    ExpiredIdle,
    ExpiredHard,
}

/// Reported upstream when an entry leaves a table.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRemovedEvent {
    pub table_id: u8,
    pub match_set: MatchSet,
    pub cookie: u64,
    pub priority: u16,
    pub reason: RemovalReason,
    /// Time the entry was alive
    pub duration: Duration,
    pub idle_timeout: u32,
    pub hard_timeout: u32,
    pub packet_count: u64,
    pub byte_count: u64,
}

/// A copy of an entry's state taken under the table lock
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEntrySnapshot {
    pub table_id: u8,
    pub priority: u16,
    pub match_set: MatchSet,
    pub instructions: InstructionSet,
    pub cookie: u64,
    pub flags: FlowModFlags,
    pub idle_timeout: u32,
    pub hard_timeout: u32,
    pub duration: Duration,
    pub packet_count: u64,
    pub byte_count: u64,
}

/// A rule owned by exactly one flow table.
#[derive(Debug, Clone)]
pub struct FlowEntry {
    pub(crate) priority: u16,
    pub(crate) match_set: MatchSet,
    pub(crate) instructions: InstructionSet,
    pub(crate) cookie: u64,
    pub(crate) flags: FlowModFlags,
    pub(crate) idle_timeout: u32,
    pub(crate) hard_timeout: u32,
    pub(crate) install_time: Instant,
    pub(crate) last_hit: Instant,
    pub(crate) packet_count: u64,
    pub(crate) byte_count: u64,
    /// Insertion sequence, the tie breaker among equal priorities
    pub(crate) seq: u64,
}

impl FlowEntry {
    pub fn priority(&self) -> u16 {
        self.priority
    }

    pub fn match_set(&self) -> &MatchSet {
        &self.match_set
    }

    pub fn instructions(&self) -> &InstructionSet {
        &self.instructions
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    /// Identical priority and match: the entry a strict flow-mod targets
    pub fn is_same_rule(&self, priority: u16, match_set: &MatchSet) -> bool {
        self.priority == priority && self.match_set.is_identical(match_set)
    }

    /// The masked cookie comparison of MODIFY and DELETE requests
    pub fn cookie_matches(&self, cookie: u64, cookie_mask: u64) -> bool {
        self.cookie & cookie_mask == cookie & cookie_mask
    }

    /// Counts a packet hit
    pub(crate) fn hit(&mut self, frame_len: usize, now: Instant) {
        self.last_hit = now;
        if !self.flags.contains(FlowModFlags::NO_PKT_COUNTS) {
            self.packet_count += 1;
        }
        if !self.flags.contains(FlowModFlags::NO_BYT_COUNTS) {
            self.byte_count += frame_len as u64;
        }
    }

    /// Restarts both timeouts
    pub(crate) fn rearm(&mut self, now: Instant) {
        self.install_time = now;
        self.last_hit = now;
    }

    pub(crate) fn reset_counts(&mut self) {
        self.packet_count = 0;
        self.byte_count = 0;
    }

    /// Where the entry stands at `now`. A hard timeout wins over an idle one.
    pub fn expiry_state(&self, now: Instant) -> ExpiryState {
        let elapsed = |since: Instant| now.checked_duration_since(since).unwrap_or_default();
        if self.hard_timeout != OFP_FLOW_PERMANENT
            && elapsed(self.install_time) >= Duration::from_secs(self.hard_timeout as u64)
        {
            return ExpiryState::ExpiredHard;
        }
        if self.idle_timeout != OFP_FLOW_PERMANENT
            && elapsed(self.last_hit) >= Duration::from_secs(self.idle_timeout as u64)
        {
            return ExpiryState::ExpiredIdle;
        }
        ExpiryState::Active
    }

    /// The notification for this entry's removal, if its flags ask for one
    pub(crate) fn removed_event(
        &self,
        table_id: u8,
        reason: RemovalReason,
        now: Instant,
    ) -> Option<FlowRemovedEvent> {
        if !self.flags.contains(FlowModFlags::SEND_FLOW_REM) {
            return None;
        }
        Some(FlowRemovedEvent {
            table_id,
            match_set: self.match_set.clone(),
            cookie: self.cookie,
            priority: self.priority,
            reason,
            duration: now.checked_duration_since(self.install_time).unwrap_or_default(),
            idle_timeout: self.idle_timeout,
            hard_timeout: self.hard_timeout,
            packet_count: self.packet_count,
            byte_count: self.byte_count,
        })
    }

    pub(crate) fn snapshot(&self, table_id: u8, now: Instant) -> FlowEntrySnapshot {
        FlowEntrySnapshot {
            table_id,
            priority: self.priority,
            match_set: self.match_set.clone(),
            instructions: self.instructions.clone(),
            cookie: self.cookie,
            flags: self.flags,
            idle_timeout: self.idle_timeout,
            hard_timeout: self.hard_timeout,
            duration: now.checked_duration_since(self.install_time).unwrap_or_default(),
            packet_count: self.packet_count,
            byte_count: self.byte_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::matching::MatchField;

    fn entry(idle: u32, hard: u32, now: Instant) -> FlowEntry {
        FlowEntry {
            priority: 1,
            match_set: MatchSet::new().with(MatchField::in_port(1)),
            instructions: InstructionSet::new(),
            cookie: 0xabcd,
            flags: FlowModFlags::SEND_FLOW_REM,
            idle_timeout: idle,
            hard_timeout: hard,
            install_time: now,
            last_hit: now,
            packet_count: 0,
            byte_count: 0,
            seq: 0,
        }
    }

    #[test]
    fn permanent_entries_never_expire() {
        let now = Instant::now();
        let e = entry(0, 0, now);
        assert_eq!(ExpiryState::Active, e.expiry_state(now + Duration::from_secs(100_000)));
    }

    #[test]
    fn idle_timeout_follows_hits() {
        let t0 = Instant::now();
        let mut e = entry(10, 0, t0);
        assert_eq!(ExpiryState::Active, e.expiry_state(t0 + Duration::from_secs(9)));
        e.hit(100, t0 + Duration::from_secs(9));
        assert_eq!(ExpiryState::Active, e.expiry_state(t0 + Duration::from_secs(18)));
        assert_eq!(ExpiryState::ExpiredIdle, e.expiry_state(t0 + Duration::from_secs(19)));
    }

    #[test]
    fn hard_timeout_ignores_hits() {
        let t0 = Instant::now();
        let mut e = entry(10, 15, t0);
        e.hit(100, t0 + Duration::from_secs(9));
        e.hit(100, t0 + Duration::from_secs(14));
        assert_eq!(ExpiryState::ExpiredHard, e.expiry_state(t0 + Duration::from_secs(15)));
    }

    #[test]
    fn counters_respect_flags() {
        let now = Instant::now();
        let mut e = entry(0, 0, now);
        e.hit(60, now);
        e.hit(40, now);
        assert_eq!((2, 100), (e.packet_count, e.byte_count));
        e.flags |= FlowModFlags::NO_BYT_COUNTS;
        e.hit(40, now);
        assert_eq!((3, 100), (e.packet_count, e.byte_count));
    }

    #[test]
    fn removed_event_only_when_requested() {
        let now = Instant::now();
        let mut e = entry(0, 0, now);
        e.hit(64, now);
        let ev = e.removed_event(3, RemovalReason::Delete, now).unwrap();
        assert_eq!(3, ev.table_id);
        assert_eq!(0xabcd, ev.cookie);
        assert_eq!(1, ev.packet_count);
        e.flags = FlowModFlags::empty();
        assert_eq!(None, e.removed_event(3, RemovalReason::Delete, now));
    }

    #[test]
    fn masked_cookie() {
        let e = entry(0, 0, Instant::now());
        assert!(e.cookie_matches(0x00cd, 0x00ff));
        assert!(!e.cookie_matches(0x00ce, 0x00ff));
        assert!(e.cookie_matches(0, 0));
    }
}

/*!
A single flow table: priority ordered entries, the lookup and the flow-mod
state machine.

A `FlowTable` is never shared by itself. The pipeline keeps each one behind
its own lock, so every method here runs with exclusive access and can treat
an operation as atomic: a request is fully checked before the first entry is
touched.
*/

use pipeline::entry::*;
use pipeline::error::{FlowModError, Result, ValidationError};
use pipeline::instructions::{InstructionSet, OFPG_ANY, OFPP_ANY};
use pipeline::matching::{MatchSet, PacketFields};

use std::time::Instant;

/// Default bound for the number of entries in one table
pub const DEFAULT_MAX_ENTRIES: usize = 4096;

/// Wildcard table used for table statistics requests and deletes.
pub const OFPTT_ALL: u8 = 0xff;
/// Last usable table number.
pub const OFPTT_MAX: u8 = 0xfe;

/// What happens to a packet no entry matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissPolicy {
    /// The packet is dropped
    Drop,
    /// The packet is sent to the controller
    Controller,
}

/// Per table settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableConfig {
    pub miss_policy: MissPolicy,
    pub max_entries: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            miss_policy: MissPolicy::Drop,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// The command that is embedded in a flow mod request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowModCommand {
    /// New flow.
    Add = 0,
    /// Modify all matching flows.
    Modify = 1,
    /// Modify entry strictly matching wildcards and priority.
    ModifyStrict = 2,
    /// Delete all matching flows.
    Delete = 3,
    /// Delete entry strictly matching wildcards and priority.
    DeleteStrict = 4,
}

impl FlowModCommand {
    fn is_strict(self) -> bool {
        self == FlowModCommand::ModifyStrict || self == FlowModCommand::DeleteStrict
    }

    fn is_delete(self) -> bool {
        self == FlowModCommand::Delete || self == FlowModCommand::DeleteStrict
    }
}

/// An already parsed flow-mod as handed over by the protocol layer.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowModRequest {
    pub command: FlowModCommand,
    /// Fields to match.
    pub match_set: MatchSet,
    /// Priority level of flow entry. Ignored by the non-strict MODIFY and DELETE.
    pub priority: u16,
    pub instructions: InstructionSet,
    /// Opaque controller-issued identifier.
    pub cookie: u64,
    /// Mask used to restrict the cookie bits that must match for MODIFY* and DELETE*.
    /// A value of 0 indicates no restriction.
    pub cookie_mask: u64,
    /// Idle time before discarding (seconds). `None` leaves a modified entry's value alone.
    pub idle_timeout: Option<u32>,
    /// Max time before discarding (seconds). `None` leaves a modified entry's value alone.
    pub hard_timeout: Option<u32>,
    /// For DELETE*, require matching entries to include this as an output port.
    /// `OFPP_ANY` indicates no restriction.
    pub out_port: u32,
    /// For DELETE*, require matching entries to include this as an output group.
    /// `OFPG_ANY` indicates no restriction.
    pub out_group: u32,
    pub flags: FlowModFlags,
}

impl FlowModRequest {
    /// Constructs a request with no cookie, timeouts, flags or instructions
    pub fn new(command: FlowModCommand, priority: u16, match_set: MatchSet) -> FlowModRequest {
        FlowModRequest {
            command,
            match_set,
            priority,
            instructions: InstructionSet::new(),
            cookie: 0,
            cookie_mask: 0,
            idle_timeout: None,
            hard_timeout: None,
            out_port: OFPP_ANY,
            out_group: OFPG_ANY,
            flags: FlowModFlags::empty(),
        }
    }

    pub fn add(priority: u16, match_set: MatchSet) -> FlowModRequest {
        Self::new(FlowModCommand::Add, priority, match_set)
    }

    pub fn modify(match_set: MatchSet) -> FlowModRequest {
        Self::new(FlowModCommand::Modify, OFP_DEFAULT_PRIORITY, match_set)
    }

    pub fn modify_strict(priority: u16, match_set: MatchSet) -> FlowModRequest {
        Self::new(FlowModCommand::ModifyStrict, priority, match_set)
    }

    pub fn delete(match_set: MatchSet) -> FlowModRequest {
        Self::new(FlowModCommand::Delete, OFP_DEFAULT_PRIORITY, match_set)
    }

    pub fn delete_strict(priority: u16, match_set: MatchSet) -> FlowModRequest {
        Self::new(FlowModCommand::DeleteStrict, priority, match_set)
    }

    pub fn with_instructions(mut self, instructions: InstructionSet) -> FlowModRequest {
        self.instructions = instructions;
        self
    }

    pub fn with_cookie(mut self, cookie: u64, cookie_mask: u64) -> FlowModRequest {
        self.cookie = cookie;
        self.cookie_mask = cookie_mask;
        self
    }

    pub fn with_timeouts(mut self, idle_timeout: u32, hard_timeout: u32) -> FlowModRequest {
        self.idle_timeout = Some(idle_timeout);
        self.hard_timeout = Some(hard_timeout);
        self
    }

    pub fn with_flags(mut self, flags: FlowModFlags) -> FlowModRequest {
        self.flags = flags;
        self
    }

    pub fn with_out_port(mut self, out_port: u32) -> FlowModRequest {
        self.out_port = out_port;
        self
    }

    pub fn with_out_group(mut self, out_group: u32) -> FlowModRequest {
        self.out_group = out_group;
        self
    }

    /// Checks everything that does not depend on the table's content.
    /// `table_id` is the table the instructions will live in.
    pub fn validate(&self, table_id: u8, n_tables: usize) -> ::std::result::Result<(), ValidationError> {
        self.match_set.validate()?;
        for timeout in self.idle_timeout.iter().chain(self.hard_timeout.iter()) {
            if *timeout > OFP_MAX_TIMEOUT {
                return Err(ValidationError::BadTimeout(*timeout));
            }
        }
        if !self.command.is_delete() {
            self.instructions.validate(table_id, n_tables)?;
        }
        Ok(())
    }

    /// Whether a MODIFY or DELETE selects `entry` by match and cookie.
    /// A non-strict MODIFY reaches entries looser than or equal to the
    /// request, a non-strict DELETE entries at least as specific.
    fn selects(&self, entry: &FlowEntry) -> bool {
        let by_match = match self.command {
            _ if self.command.is_strict() => entry.is_same_rule(self.priority, &self.match_set),
            FlowModCommand::Modify => self.match_set.is_subset_of(&entry.match_set),
            _ => entry.match_set.is_subset_of(&self.match_set),
        };
        by_match && entry.cookie_matches(self.cookie, self.cookie_mask)
    }
}

fn outputs_match(entry: &FlowEntry, out_port: u32, out_group: u32) -> bool {
    (out_port == OFPP_ANY || entry.instructions.references_port(out_port))
        && (out_group == OFPG_ANY || entry.instructions.references_group(out_group))
}

/// Selects entries for flow statistics, like a non-strict DELETE would
#[derive(Debug, Clone, PartialEq)]
pub struct FlowStatsFilter {
    pub match_set: MatchSet,
    pub cookie: u64,
    pub cookie_mask: u64,
    pub out_port: u32,
    pub out_group: u32,
}

impl Default for FlowStatsFilter {
    fn default() -> Self {
        FlowStatsFilter {
            match_set: MatchSet::new(),
            cookie: 0,
            cookie_mask: 0,
            out_port: OFPP_ANY,
            out_group: OFPG_ANY,
        }
    }
}

impl FlowStatsFilter {
    fn selects(&self, entry: &FlowEntry) -> bool {
        entry.match_set.is_subset_of(&self.match_set)
            && entry.cookie_matches(self.cookie, self.cookie_mask)
            && outputs_match(entry, self.out_port, self.out_group)
    }
}

/// Table counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    pub table_id: u8,
    /// Number of active entries.
    pub active_count: usize,
    /// Number of packets looked up in table.
    pub lookup_count: u64,
    /// Number of packets that hit table.
    pub matched_count: u64,
}

/// The entries of one pipeline stage.
/// Entries are kept by descending priority, ties in insertion order.
#[derive(Debug)]
pub struct FlowTable {
    id: u8,
    config: TableConfig,
    entries: Vec<FlowEntry>,
    next_seq: u64,
    lookup_count: u64,
    matched_count: u64,
}

impl FlowTable {
    pub fn new(id: u8, config: TableConfig) -> FlowTable {
        FlowTable {
            id,
            config,
            entries: vec![],
            next_seq: 0,
            lookup_count: 0,
            matched_count: 0,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn config(&self) -> TableConfig {
        self.config
    }

    /// Replaces the miss policy and the entry bound.
    /// Entries beyond a lowered bound stay; only new ones are refused.
    pub fn set_config(&mut self, config: TableConfig) {
        self.config = config;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries in lookup order
    pub fn entries(&self) -> &[FlowEntry] {
        &self.entries
    }

    /// Finds the highest priority entry matching the packet and counts the hit.
    pub fn lookup(&mut self, packet: &PacketFields, now: Instant) -> Option<&FlowEntry> {
        self.lookup_count += 1;
        let pos = self.entries.iter().position(|e| e.match_set.matches(packet))?;
        self.matched_count += 1;
        let entry = &mut self.entries[pos];
        entry.hit(packet.frame_len(), now);
        Some(entry)
    }

    /// Applies a validated flow-mod.
    /// Notifications for removed entries are appended to `events`.
    /// Returns the number of entries installed, changed or removed.
    pub fn flow_mod(
        &mut self,
        req: &FlowModRequest,
        now: Instant,
        events: &mut Vec<FlowRemovedEvent>,
    ) -> Result<usize> {
        match req.command {
            FlowModCommand::Add => self.add(req, now),
            FlowModCommand::Modify | FlowModCommand::ModifyStrict => self.modify(req),
            FlowModCommand::Delete | FlowModCommand::DeleteStrict => {
                Ok(self.delete(req, now, events))
            }
        }
    }

    fn add(&mut self, req: &FlowModRequest, now: Instant) -> Result<usize> {
        if req.flags.contains(FlowModFlags::CHECK_OVERLAP)
            && self.entries.iter().any(|e| e.match_set.overlaps(&req.match_set))
        {
            return Err(FlowModError::Overlap {
                table_id: self.id,
                priority: req.priority,
            });
        }

        let idle_timeout = req.idle_timeout.unwrap_or(OFP_FLOW_PERMANENT);
        let hard_timeout = req.hard_timeout.unwrap_or(OFP_FLOW_PERMANENT);

        let same = self
            .entries
            .iter_mut()
            .find(|e| e.is_same_rule(req.priority, &req.match_set));
        if let Some(entry) = same {
            entry.instructions = req.instructions.clone();
            entry.cookie = req.cookie;
            entry.flags = req.flags;
            entry.idle_timeout = idle_timeout;
            entry.hard_timeout = hard_timeout;
            if req.flags.contains(FlowModFlags::RESET_COUNTS) {
                entry.reset_counts();
            }
            entry.rearm(now);
            debug!(
                "Table {}: replaced flow priority {} match {}",
                self.id, req.priority, req.match_set
            );
            return Ok(1);
        }

        if self.entries.len() >= self.config.max_entries {
            return Err(FlowModError::TableFull {
                table_id: self.id,
                max_entries: self.config.max_entries,
            });
        }

        let entry = FlowEntry {
            priority: req.priority,
            match_set: req.match_set.clone(),
            instructions: req.instructions.clone(),
            cookie: req.cookie,
            flags: req.flags,
            idle_timeout,
            hard_timeout,
            install_time: now,
            last_hit: now,
            packet_count: 0,
            byte_count: 0,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        // behind every entry of the same or a higher priority
        let pos = self
            .entries
            .iter()
            .position(|e| e.priority < req.priority)
            .unwrap_or_else(|| self.entries.len());
        self.entries.insert(pos, entry);
        debug!(
            "Table {}: installed flow priority {} match {} -> {}",
            self.id, req.priority, req.match_set, req.instructions
        );
        Ok(1)
    }

    fn modify(&mut self, req: &FlowModRequest) -> Result<usize> {
        let mut modified = 0;
        for entry in self.entries.iter_mut().filter(|e| req.selects(e)) {
            entry.instructions = req.instructions.clone();
            if let Some(t) = req.idle_timeout {
                entry.idle_timeout = t;
            }
            if let Some(t) = req.hard_timeout {
                entry.hard_timeout = t;
            }
            if req.flags.contains(FlowModFlags::RESET_COUNTS) {
                entry.reset_counts();
            }
            modified += 1;
        }
        if modified == 0 && req.command.is_strict() {
            return Err(FlowModError::NotFound {
                table_id: self.id,
                priority: req.priority,
            });
        }
        debug!("Table {}: modified {} flow(s) matching {}", self.id, modified, req.match_set);
        Ok(modified)
    }

    fn delete(&mut self, req: &FlowModRequest, now: Instant, events: &mut Vec<FlowRemovedEvent>) -> usize {
        let table_id = self.id;
        let before = self.entries.len();
        self.entries.retain(|e| {
            if !req.selects(e) || !outputs_match(e, req.out_port, req.out_group) {
                return true;
            }
            events.extend(e.removed_event(table_id, RemovalReason::Delete, now));
            false
        });
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Table {}: deleted {} flow(s) matching {}", self.id, removed, req.match_set);
        }
        removed
    }

    /// Removes every entry whose idle or hard timeout has run out at `now`.
    /// Notifications are appended to `events`.
    /// Returns the number of removed entries.
    pub fn expire(&mut self, now: Instant, events: &mut Vec<FlowRemovedEvent>) -> usize {
        let table_id = self.id;
        let before = self.entries.len();
        self.entries.retain(|e| {
            let reason = match e.expiry_state(now) {
                ExpiryState::Active => return true,
                ExpiryState::ExpiredIdle => RemovalReason::IdleTimeout,
                ExpiryState::ExpiredHard => RemovalReason::HardTimeout,
            };
            trace!("Table {}: flow priority {} match {} expired ({:?})", table_id, e.priority, e.match_set, reason);
            events.extend(e.removed_event(table_id, reason, now));
            false
        });
        before - self.entries.len()
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            table_id: self.id,
            active_count: self.entries.len(),
            lookup_count: self.lookup_count,
            matched_count: self.matched_count,
        }
    }

    pub fn flow_stats(&self, filter: &FlowStatsFilter, now: Instant) -> Vec<FlowEntrySnapshot> {
        self.entries
            .iter()
            .filter(|e| filter.selects(e))
            .map(|e| e.snapshot(self.id, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::instructions::Action;
    use pipeline::matching::{FieldKind, MatchField};
    use std::time::Duration;

    const MAC_X: [u8; 6] = [0x02, 0, 0, 0, 0, 0x0a];
    const MAC_Y: [u8; 6] = [0x02, 0, 0, 0, 0, 0x0b];

    fn table() -> FlowTable {
        FlowTable::new(0, TableConfig::default())
    }

    fn to_x() -> MatchSet {
        MatchSet::new().with(MatchField::eth_dst(MAC_X))
    }

    fn output(port: u32) -> InstructionSet {
        InstructionSet::new().with_apply_actions(vec![Action::output(port)])
    }

    fn packet(dst: [u8; 6]) -> PacketFields {
        PacketFields::new(100).with_bytes(FieldKind::EthDst, &dst).unwrap()
    }

    fn apply(t: &mut FlowTable, req: FlowModRequest) -> Result<usize> {
        let mut events = vec![];
        t.flow_mod(&req, Instant::now(), &mut events)
    }

    #[test]
    fn priority_decides() {
        let mut t = table();
        apply(&mut t, FlowModRequest::add(5, MatchSet::new()).with_instructions(output(1))).unwrap();
        apply(&mut t, FlowModRequest::add(10, to_x()).with_instructions(output(2))).unwrap();
        let now = Instant::now();
        assert_eq!(10, t.lookup(&packet(MAC_X), now).unwrap().priority());
        assert_eq!(5, t.lookup(&packet(MAC_Y), now).unwrap().priority());
    }

    #[test]
    fn ties_break_by_insertion() {
        let mut t = table();
        let first = MatchSet::new().with(MatchField::in_port(1));
        apply(&mut t, FlowModRequest::add(7, first).with_instructions(output(1))).unwrap();
        apply(&mut t, FlowModRequest::add(7, to_x()).with_instructions(output(2))).unwrap();
        let p = packet(MAC_X).with_u64(FieldKind::InPort, 1);
        let hit = t.lookup(&p, Instant::now()).unwrap();
        assert_eq!(&output(1), hit.instructions());
    }

    #[test]
    fn miss_and_counters() {
        let mut t = table();
        apply(&mut t, FlowModRequest::add(10, to_x())).unwrap();
        let now = Instant::now();
        assert!(t.lookup(&packet(MAC_Y), now).is_none());
        assert!(t.lookup(&packet(MAC_X), now).is_some());
        assert!(t.lookup(&packet(MAC_X), now).is_some());
        let stats = t.stats();
        assert_eq!((3, 2, 1), (stats.lookup_count, stats.matched_count, stats.active_count));
        assert_eq!((2, 200), (t.entries()[0].packet_count, t.entries()[0].byte_count));
    }

    #[test]
    fn readd_replaces() {
        let mut t = table();
        apply(&mut t, FlowModRequest::add(10, to_x()).with_instructions(output(1))).unwrap();
        t.lookup(&packet(MAC_X), Instant::now());
        let readd = FlowModRequest::add(10, to_x()).with_instructions(output(2)).with_cookie(9, 0);
        apply(&mut t, readd).unwrap();
        assert_eq!(1, t.len());
        assert_eq!(&output(2), t.entries()[0].instructions());
        assert_eq!(9, t.entries()[0].cookie());
        // counters survive unless a reset is asked for
        assert_eq!(1, t.entries()[0].packet_count);
        let reset = FlowModRequest::add(10, to_x()).with_flags(FlowModFlags::RESET_COUNTS);
        apply(&mut t, reset).unwrap();
        assert_eq!(0, t.entries()[0].packet_count);
    }

    #[test]
    fn readd_identical_is_idempotent() {
        let mut t = table();
        let req = FlowModRequest::add(10, to_x()).with_instructions(output(1));
        apply(&mut t, req.clone()).unwrap();
        t.lookup(&packet(MAC_X), Instant::now());
        apply(&mut t, req).unwrap();
        assert_eq!(1, t.len());
        assert_eq!((1, 100), (t.entries()[0].packet_count, t.entries()[0].byte_count));
    }

    #[test]
    fn same_match_other_priority_is_new_entry() {
        let mut t = table();
        apply(&mut t, FlowModRequest::add(10, to_x())).unwrap();
        apply(&mut t, FlowModRequest::add(11, to_x())).unwrap();
        assert_eq!(2, t.len());
        assert_eq!(11, t.entries()[0].priority());
    }

    #[test]
    fn check_overlap() {
        let mut t = table();
        let from_1 = MatchSet::new().with(MatchField::in_port(1));
        apply(&mut t, FlowModRequest::add(10, from_1)).unwrap();

        // a packet from port 1 to X would match both
        let req = FlowModRequest::add(20, to_x()).with_flags(FlowModFlags::CHECK_OVERLAP);
        assert_eq!(Err(FlowModError::Overlap { table_id: 0, priority: 20 }), apply(&mut t, req));
        assert_eq!(1, t.len());

        let from_2 = MatchSet::new().with(MatchField::in_port(2));
        let req = FlowModRequest::add(10, from_2).with_flags(FlowModFlags::CHECK_OVERLAP);
        assert_eq!(Ok(1), apply(&mut t, req));

        // without the flag the overlap is fine
        assert_eq!(Ok(1), apply(&mut t, FlowModRequest::add(20, to_x())));
    }

    #[test]
    fn masked_overlap() {
        let mut t = table();
        let meta = |v, m| MatchSet::new().with(MatchField::masked_u64(FieldKind::Metadata, v, m));
        apply(&mut t, FlowModRequest::add(1, meta(0x10, 0xf0))).unwrap();
        let disjoint = FlowModRequest::add(1, meta(0x20, 0xf0)).with_flags(FlowModFlags::CHECK_OVERLAP);
        assert_eq!(Ok(1), apply(&mut t, disjoint));
        let crossing = FlowModRequest::add(1, meta(0x01, 0x0f)).with_flags(FlowModFlags::CHECK_OVERLAP);
        assert!(apply(&mut t, crossing).is_err());
    }

    #[test]
    fn table_full() {
        let mut t = FlowTable::new(3, TableConfig { miss_policy: MissPolicy::Drop, max_entries: 1 });
        apply(&mut t, FlowModRequest::add(1, to_x())).unwrap();
        let full = apply(&mut t, FlowModRequest::add(2, to_x()));
        assert_eq!(Err(FlowModError::TableFull { table_id: 3, max_entries: 1 }), full);
        // replacing needs no room
        assert_eq!(Ok(1), apply(&mut t, FlowModRequest::add(1, to_x())));
    }

    #[test]
    fn modify_non_strict() {
        let mut t = table();
        let x_from_1 = to_x().with(MatchField::in_port(1));
        apply(&mut t, FlowModRequest::add(5, MatchSet::new()).with_timeouts(30, 0)).unwrap();
        apply(&mut t, FlowModRequest::add(6, x_from_1.clone())).unwrap();
        apply(&mut t, FlowModRequest::add(20, to_x())).unwrap();

        let n = apply(&mut t, FlowModRequest::modify(to_x()).with_instructions(output(9))).unwrap();
        assert_eq!(2, n);
        let by_prio = |p: u16| t.entries().iter().find(|e| e.priority() == p).unwrap();
        assert_eq!(&output(9), by_prio(5).instructions());
        assert_eq!(&output(9), by_prio(20).instructions());
        // tighter than the request
        assert!(by_prio(6).instructions().is_empty());
        // timeouts untouched
        assert_eq!(30, by_prio(5).idle_timeout);
    }

    #[test]
    fn empty_modify_hits_catch_alls_only() {
        let mut t = table();
        apply(&mut t, FlowModRequest::add(10, to_x())).unwrap();
        apply(&mut t, FlowModRequest::add(20, MatchSet::new().with(MatchField::in_port(1)))).unwrap();
        assert_eq!(Ok(0), apply(&mut t, FlowModRequest::modify(MatchSet::new())));
        apply(&mut t, FlowModRequest::add(0, MatchSet::new())).unwrap();
        assert_eq!(Ok(1), apply(&mut t, FlowModRequest::modify(MatchSet::new())));
        let from_1_to_x = to_x().with(MatchField::in_port(1));
        assert_eq!(Ok(3), apply(&mut t, FlowModRequest::modify(from_1_to_x)));
    }

    #[test]
    fn modify_strict() {
        let mut t = table();
        apply(&mut t, FlowModRequest::add(10, to_x())).unwrap();
        apply(&mut t, FlowModRequest::add(11, to_x())).unwrap();
        let req = FlowModRequest::modify_strict(11, to_x()).with_instructions(output(4));
        assert_eq!(Ok(1), apply(&mut t, req));
        assert_eq!(&output(4), t.entries()[0].instructions());
        assert!(t.entries()[1].instructions().is_empty());

        let missing = FlowModRequest::modify_strict(12, to_x());
        assert_eq!(Err(FlowModError::NotFound { table_id: 0, priority: 12 }), apply(&mut t, missing));
    }

    #[test]
    fn modify_filters_cookies() {
        let mut t = table();
        apply(&mut t, FlowModRequest::add(10, to_x()).with_cookie(0x1_00, 0)).unwrap();
        apply(&mut t, FlowModRequest::add(11, to_x()).with_cookie(0x2_00, 0)).unwrap();
        let req = FlowModRequest::modify(to_x())
            .with_cookie(0x2_00, 0xf_00)
            .with_instructions(output(5));
        assert_eq!(Ok(1), apply(&mut t, req));
        assert_eq!(&output(5), t.entries()[0].instructions());
        assert_eq!(0x2_00, t.entries()[0].cookie());
    }

    #[test]
    fn delete_non_strict() {
        let mut t = table();
        apply(&mut t, FlowModRequest::add(10, to_x().with(MatchField::in_port(1)))).unwrap();
        apply(&mut t, FlowModRequest::add(20, to_x())).unwrap();
        apply(&mut t, FlowModRequest::add(30, MatchSet::new())).unwrap();
        // the catch-all is looser than the request and stays
        assert_eq!(Ok(2), apply(&mut t, FlowModRequest::delete(to_x())));
        assert_eq!(1, t.len());
        assert!(t.entries()[0].match_set().is_empty());
        assert_eq!(Ok(1), apply(&mut t, FlowModRequest::delete(MatchSet::new())));
        assert!(t.is_empty());
    }

    #[test]
    fn delete_strict() {
        let mut t = table();
        apply(&mut t, FlowModRequest::add(10, to_x())).unwrap();
        apply(&mut t, FlowModRequest::add(20, to_x())).unwrap();
        assert_eq!(Ok(1), apply(&mut t, FlowModRequest::delete_strict(20, to_x())));
        assert_eq!(10, t.entries()[0].priority());
        // missing entry: success, nothing removed
        assert_eq!(Ok(0), apply(&mut t, FlowModRequest::delete_strict(20, to_x())));
        assert_eq!(Ok(0), apply(&mut t, FlowModRequest::delete_strict(10, MatchSet::new())));
        assert_eq!(1, t.len());
    }

    #[test]
    fn delete_filters_out_port_and_group() {
        let mut t = table();
        apply(&mut t, FlowModRequest::add(1, to_x()).with_instructions(output(1))).unwrap();
        let grouped = InstructionSet::new().with_write_actions(vec![Action::Group(4)]);
        apply(&mut t, FlowModRequest::add(2, to_x()).with_instructions(grouped)).unwrap();
        apply(&mut t, FlowModRequest::add(3, to_x()).with_instructions(output(2))).unwrap();

        assert_eq!(Ok(0), apply(&mut t, FlowModRequest::delete(MatchSet::new()).with_out_port(7)));
        assert_eq!(Ok(1), apply(&mut t, FlowModRequest::delete(MatchSet::new()).with_out_port(2)));
        assert_eq!(Ok(1), apply(&mut t, FlowModRequest::delete(MatchSet::new()).with_out_group(4)));
        assert_eq!(&output(1), t.entries()[0].instructions());
    }

    #[test]
    fn delete_reports_flagged_entries() {
        let mut t = table();
        let flagged = FlowModRequest::add(10, to_x()).with_flags(FlowModFlags::SEND_FLOW_REM).with_cookie(7, 0);
        apply(&mut t, flagged).unwrap();
        apply(&mut t, FlowModRequest::add(20, to_x())).unwrap();
        let mut events = vec![];
        let n = t.flow_mod(&FlowModRequest::delete(MatchSet::new()), Instant::now(), &mut events).unwrap();
        assert_eq!(2, n);
        assert_eq!(1, events.len());
        assert_eq!(RemovalReason::Delete, events[0].reason);
        assert_eq!((10, 7), (events[0].priority, events[0].cookie));
    }

    #[test]
    fn expire_by_idle_and_hard() {
        let mut t = table();
        let t0 = Instant::now();
        let mut events = vec![];
        let idle = FlowModRequest::add(1, to_x()).with_timeouts(1, 0).with_flags(FlowModFlags::SEND_FLOW_REM);
        let hard = FlowModRequest::add(2, to_x()).with_timeouts(0, 5).with_flags(FlowModFlags::SEND_FLOW_REM);
        t.flow_mod(&idle, t0, &mut events).unwrap();
        t.flow_mod(&hard, t0, &mut events).unwrap();
        t.flow_mod(&FlowModRequest::add(3, MatchSet::new()), t0, &mut events).unwrap();

        assert_eq!(0, t.expire(t0, &mut events));
        assert_eq!(1, t.expire(t0 + Duration::from_millis(1500), &mut events));
        assert_eq!(RemovalReason::IdleTimeout, events[0].reason);
        assert_eq!(1, events[0].priority);

        assert_eq!(1, t.expire(t0 + Duration::from_secs(5), &mut events));
        assert_eq!(RemovalReason::HardTimeout, events[1].reason);
        assert_eq!(1, t.len());
        // already gone: nothing to do
        assert_eq!(0, t.expire(t0 + Duration::from_secs(5), &mut events));
        assert_eq!(2, events.len());
    }

    #[test]
    fn flow_stats_filter() {
        let mut t = table();
        apply(&mut t, FlowModRequest::add(1, to_x()).with_cookie(1, 0).with_instructions(output(1))).unwrap();
        apply(&mut t, FlowModRequest::add(2, MatchSet::new()).with_cookie(2, 0)).unwrap();
        let now = Instant::now();
        assert_eq!(2, t.flow_stats(&FlowStatsFilter::default(), now).len());
        let narrow = FlowStatsFilter {
            match_set: to_x(),
            ..FlowStatsFilter::default()
        };
        let snaps = t.flow_stats(&narrow, now);
        assert_eq!(1, snaps.len());
        assert_eq!(1, snaps[0].cookie);
        let by_cookie = FlowStatsFilter {
            cookie: 2,
            cookie_mask: 0xff,
            ..FlowStatsFilter::default()
        };
        assert_eq!(2, t.flow_stats(&by_cookie, now)[0].priority);
        let by_port = FlowStatsFilter {
            out_port: 1,
            ..FlowStatsFilter::default()
        };
        assert_eq!(1, t.flow_stats(&by_port, now)[0].priority);
    }
}

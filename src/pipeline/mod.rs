/*!
The flow-table pipeline of one datapath.

A `Pipeline` owns tables `0..n`, each behind its own lock. Flow-mods are
checked first and then applied to one table (or to every table for
`OFPTT_ALL` deletes) under that table's lock. A packet enters at table 0 and
follows goto-table instructions forward until a table has no goto or misses.
*/

pub mod entry;
pub mod error;
pub mod events;
pub mod instructions;
pub mod matching;
pub mod table;
pub mod timeout;

pub use self::entry::*;
pub use self::error::{FlowModError, ValidationError};
pub use self::events::*;
pub use self::instructions::*;
pub use self::matching::*;
pub use self::table::*;
pub use self::timeout::*;

use self::error::Result;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Table layout of a new pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// One entry per table, table 0 first
    pub tables: Vec<TableConfig>,
}

impl PipelineConfig {
    /// `n` tables with default settings
    pub fn with_tables(n: usize) -> PipelineConfig {
        PipelineConfig {
            tables: vec![TableConfig::default(); n],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_tables(1)
    }
}

/// Where traversal stopped without a matching entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableMiss {
    pub table_id: u8,
    pub policy: MissPolicy,
}

/// The outcome of running a packet through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Apply-actions in execution order followed by the executed action set.
    /// An empty list means drop.
    pub actions: Vec<Action>,
    /// The packet after all actions were applied
    pub packet: PacketFields,
    /// Set when a table missed
    pub miss: Option<TableMiss>,
}

pub struct Pipeline {
    dpid: u64,
    tables: Vec<Mutex<FlowTable>>,
    sink: Arc<dyn PipelineEventSink>,
}

impl Pipeline {
    /// Creates the tables given by `config`. At least one table is always created
    /// and at most `OFPTT_MAX + 1`.
    pub fn new(dpid: u64, config: &PipelineConfig, sink: Arc<dyn PipelineEventSink>) -> Pipeline {
        let mut configs = config.tables.clone();
        if configs.is_empty() {
            configs.push(TableConfig::default());
        }
        configs.truncate(OFPTT_MAX as usize + 1);
        let tables = configs
            .into_iter()
            .enumerate()
            .map(|(id, c)| Mutex::new(FlowTable::new(id as u8, c)))
            .collect();
        Pipeline { dpid, tables, sink }
    }

    pub fn dpid(&self) -> u64 {
        self.dpid
    }

    pub fn n_tables(&self) -> usize {
        self.tables.len()
    }

    // A panic while holding the lock cannot leave a table half changed, so a
    // poisoned lock is still usable.
    fn table(&self, table_id: u8) -> MutexGuard<FlowTable> {
        self.tables[table_id as usize]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_table(&self, table_id: u8) -> ::std::result::Result<(), ValidationError> {
        if (table_id as usize) < self.tables.len() {
            Ok(())
        }
        else {
            Err(ValidationError::BadTableId(table_id))
        }
    }

    /// The tables a request for `table_id` addresses
    fn targets(&self, table_id: u8, all_allowed: bool) -> ::std::result::Result<Vec<u8>, ValidationError> {
        if table_id == OFPTT_ALL && all_allowed {
            return Ok((0..self.tables.len()).map(|t| t as u8).collect());
        }
        self.check_table(table_id)?;
        Ok(vec![table_id])
    }

    /// Applies a flow-mod. On error no table has been changed.
    pub fn submit_flow_mod(&self, table_id: u8, req: FlowModRequest) -> Result<()> {
        debug!(
            "Datapath {:016x}: {:?} in table {} priority {} match {}",
            self.dpid, req.command, table_id, req.priority, req.match_set
        );
        let is_delete = req.command == FlowModCommand::Delete || req.command == FlowModCommand::DeleteStrict;
        let targets = self.targets(table_id, is_delete)?;
        for &t in &targets {
            req.validate(t, self.tables.len())?;
        }

        let now = Instant::now();
        let mut events = vec![];
        for t in targets {
            self.table(t).flow_mod(&req, now, &mut events)?;
        }
        for event in &events {
            self.sink.flow_removed(self.dpid, event);
        }
        Ok(())
    }

    /// Runs a packet through the pipeline starting at `table_id`.
    pub fn match_packet(&self, table_id: u8, packet: &PacketFields) -> Result<Verdict> {
        self.check_table(table_id)?;
        Ok(self.traverse(table_id, packet))
    }

    /// Runs a packet through the pipeline starting at table 0.
    pub fn process(&self, packet: &PacketFields) -> Verdict {
        self.traverse(0, packet)
    }

    fn traverse(&self, start: u8, packet: &PacketFields) -> Verdict {
        let now = Instant::now();
        let mut view = packet.clone();
        if view.get(FieldKind::Metadata).is_none() {
            view = view.with_u64(FieldKind::Metadata, 0);
        }
        let mut action_set = ActionSet::new();
        let mut actions = vec![];
        let mut packet_ins = vec![];
        let mut table_id = start;
        let mut miss = None;
        let mut last_cookie = None;

        loop {
            let hit = {
                let mut table = self.table(table_id);
                let policy = table.config().miss_policy;
                let hit = table
                    .lookup(&view, now)
                    .map(|e| (e.instructions().clone(), e.cookie()))
                    .ok_or(policy);
                hit
            };
            let (instructions, cookie) = match hit {
                Ok(hit) => hit,
                Err(policy) => {
                    trace!("Datapath {:016x}: miss in table {}", self.dpid, table_id);
                    miss = Some(TableMiss { table_id, policy });
                    break;
                }
            };
            last_cookie = Some(cookie);

            if let Some((metadata, mask)) = instructions.write_metadata() {
                view.write_masked_u64(FieldKind::Metadata, metadata, mask);
            }
            for action in instructions.apply_actions() {
                action.apply_to(&mut view);
                if action.outputs_to(OFPP_CONTROLLER) {
                    packet_ins.push(self.packet_in(table_id, PacketInReason::Action, Some(cookie), &view));
                }
                actions.push(action.clone());
            }
            action_set.write(instructions.write_actions());
            if instructions.clears_actions() {
                action_set.clear();
            }

            match instructions.goto_table() {
                // forward only, checked when the entry was installed
                Some(next) if next > table_id && (next as usize) < self.tables.len() => table_id = next,
                _ => break,
            }
        }

        match miss {
            None => {
                for action in action_set.to_list() {
                    action.apply_to(&mut view);
                    if action.outputs_to(OFPP_CONTROLLER) {
                        packet_ins.push(self.packet_in(table_id, PacketInReason::Action, last_cookie, &view));
                    }
                    actions.push(action);
                }
            }
            Some(TableMiss {
                table_id,
                policy: MissPolicy::Controller,
            }) => {
                packet_ins.push(self.packet_in(table_id, PacketInReason::NoMatch, None, &view));
                actions.push(Action::output(OFPP_CONTROLLER));
            }
            Some(_) => {}
        }

        for event in &packet_ins {
            self.sink.packet_in(self.dpid, event);
        }
        Verdict {
            actions,
            packet: view,
            miss,
        }
    }

    fn packet_in(&self, table_id: u8, reason: PacketInReason, cookie: Option<u64>, view: &PacketFields) -> PacketInEvent {
        PacketInEvent {
            table_id,
            reason,
            cookie,
            packet: view.clone(),
        }
    }

    /// Replaces a table's miss policy and entry bound
    pub fn configure_table(&self, table_id: u8, config: TableConfig) -> Result<()> {
        self.check_table(table_id)?;
        debug!("Datapath {:016x}: table {} now {:?}", self.dpid, table_id, config);
        self.table(table_id).set_config(config);
        Ok(())
    }

    pub fn table_stats(&self, table_id: u8) -> Result<TableStats> {
        self.check_table(table_id)?;
        Ok(self.table(table_id).stats())
    }

    /// Snapshots of the selected entries, one table at a time.
    /// `OFPTT_ALL` covers every table.
    pub fn flow_stats(&self, table_id: u8, filter: &FlowStatsFilter) -> Result<Vec<FlowEntrySnapshot>> {
        let now = Instant::now();
        let mut snapshots = vec![];
        for t in self.targets(table_id, true)? {
            snapshots.extend(self.table(t).flow_stats(filter, now));
        }
        Ok(snapshots)
    }

    /// Removes all entries expired at `now` from every table.
    /// Each table is locked for its own sweep only.
    pub fn expire(&self, now: Instant) -> usize {
        let mut events = vec![];
        let mut expired = 0;
        for table in &self.tables {
            expired += table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .expire(now, &mut events);
        }
        for event in &events {
            self.sink.flow_removed(self.dpid, event);
        }
        self.sink.timeout(self.dpid, expired);
        expired
    }
}

/*!
Upward notifications and the per-datapath registry.

Events are handed to a `PipelineEventSink` after the table locks are
released, so a sink may call back into the pipeline.
*/

use pipeline::entry::FlowRemovedEvent;
use pipeline::matching::PacketFields;
use pipeline::{Pipeline, PipelineConfig};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Why a packet is sent to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketInReason {
    /// No matching flow (table-miss flow entry).
    NoMatch = 0,
    /// Output to controller in action set.
    Action = 1,
}

/// A packet on its way to the controller
#[derive(Debug, Clone, PartialEq)]
pub struct PacketInEvent {
    /// The table the packet was in
    pub table_id: u8,
    pub reason: PacketInReason,
    /// Cookie of the entry that sent the packet, `None` on a miss
    pub cookie: Option<u64>,
    /// The packet as it looked when it was sent
    pub packet: PacketFields,
}

/// Receives everything the pipeline reports upstream.
/// All hooks default to doing nothing.
pub trait PipelineEventSink: Send + Sync {
    fn dpath_open(&self, _dpid: u64) {}

    fn dpath_close(&self, _dpid: u64) {}

    fn packet_in(&self, _dpid: u64, _event: &PacketInEvent) {}

    fn flow_removed(&self, _dpid: u64, _event: &FlowRemovedEvent) {}

    /// Called after every sweep of a datapath with the number of expired entries
    fn timeout(&self, _dpid: u64, _expired: usize) {}
}

/// Drops all events
pub struct NullSink;

impl NullSink {
    pub fn shared() -> Arc<dyn PipelineEventSink> {
        Arc::new(NullSink)
    }
}

impl PipelineEventSink for NullSink {}

/// Writes events to the log
pub struct LogSink;

impl PipelineEventSink for LogSink {
    fn dpath_open(&self, dpid: u64) {
        info!("Datapath {:016x} is up", dpid);
    }

    fn dpath_close(&self, dpid: u64) {
        info!("Datapath {:016x} is down", dpid);
    }

    fn packet_in(&self, dpid: u64, event: &PacketInEvent) {
        info!(
            "Datapath {:016x}: packet-in from table {} ({:?}), {} bytes",
            dpid,
            event.table_id,
            event.reason,
            event.packet.frame_len()
        );
    }

    fn flow_removed(&self, dpid: u64, event: &FlowRemovedEvent) {
        info!(
            "Datapath {:016x}: flow removed from table {} ({:?}): priority {} match {} after {}s, {} packets",
            dpid,
            event.table_id,
            event.reason,
            event.priority,
            event.match_set,
            event.duration.as_secs(),
            event.packet_count
        );
    }

    fn timeout(&self, dpid: u64, expired: usize) {
        if expired > 0 {
            debug!("Datapath {:016x}: {} flow(s) timed out", dpid, expired);
        }
    }
}

/// The pipelines of all connected datapaths, keyed by datapath id
pub struct DatapathRegistry {
    sink: Arc<dyn PipelineEventSink>,
    datapaths: Mutex<HashMap<u64, Arc<Pipeline>>>,
}

impl DatapathRegistry {
    pub fn new(sink: Arc<dyn PipelineEventSink>) -> DatapathRegistry {
        DatapathRegistry {
            sink,
            datapaths: Mutex::new(HashMap::new()),
        }
    }

    fn datapaths(&self) -> MutexGuard<HashMap<u64, Arc<Pipeline>>> {
        self.datapaths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the pipeline for a newly connected datapath.
    /// A datapath that is already known keeps its pipeline.
    pub fn connect(&self, dpid: u64, config: &PipelineConfig) -> Arc<Pipeline> {
        let pipeline = {
            let mut datapaths = self.datapaths();
            if let Some(existing) = datapaths.get(&dpid) {
                debug!("Datapath {:016x} reconnected", dpid);
                return Arc::clone(existing);
            }
            let pipeline = Arc::new(Pipeline::new(dpid, config, Arc::clone(&self.sink)));
            datapaths.insert(dpid, Arc::clone(&pipeline));
            pipeline
        };
        self.sink.dpath_open(dpid);
        pipeline
    }

    /// Forgets a datapath. Its flows go with it without flow-removed events.
    pub fn disconnect(&self, dpid: u64) -> Option<Arc<Pipeline>> {
        let removed = self.datapaths().remove(&dpid);
        if removed.is_some() {
            self.sink.dpath_close(dpid);
        }
        removed
    }

    pub fn get(&self, dpid: u64) -> Option<Arc<Pipeline>> {
        self.datapaths().get(&dpid).cloned()
    }

    pub fn dpids(&self) -> Vec<u64> {
        let mut dpids: Vec<u64> = self.datapaths().keys().cloned().collect();
        dpids.sort();
        dpids
    }

    /// The pipelines at this moment, without holding the registry lock afterwards
    pub fn pipelines(&self) -> Vec<Arc<Pipeline>> {
        self.datapaths().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.datapaths().len()
    }

    pub fn is_empty(&self) -> bool {
        self.datapaths().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Lifecycle {
        seen: Mutex<Vec<(bool, u64)>>,
    }

    impl PipelineEventSink for Lifecycle {
        fn dpath_open(&self, dpid: u64) {
            self.seen.lock().unwrap().push((true, dpid));
        }

        fn dpath_close(&self, dpid: u64) {
            self.seen.lock().unwrap().push((false, dpid));
        }
    }

    #[test]
    fn connect_and_disconnect() {
        let sink = Arc::new(Lifecycle::default());
        let registry = DatapathRegistry::new(sink.clone());
        let config = PipelineConfig::with_tables(2);

        let first = registry.connect(7, &config);
        let again = registry.connect(7, &config);
        assert!(Arc::ptr_eq(&first, &again));
        registry.connect(3, &config);
        assert_eq!(vec![3, 7], registry.dpids());
        assert_eq!(2, registry.get(7).unwrap().n_tables());

        assert!(registry.disconnect(7).is_some());
        assert!(registry.disconnect(7).is_none());
        assert!(registry.get(7).is_none());
        assert_eq!(1, registry.len());
        assert_eq!(vec![(true, 7), (true, 3), (false, 7)], *sink.seen.lock().unwrap());
    }
}

/*!
A software OpenFlow datapath.

The crate keeps a pipeline of flow tables per switch, resolves the single best
match for a packet's header fields and applies the matching entry's
instructions to produce a forwarding decision. Flow-mods (add, modify and
delete in their strict and non-strict flavours) arrive already parsed from a
protocol layer, which also consumes the flow-removed and packet-in
notifications the pipeline raises through a `PipelineEventSink`.

```
use ofdatapath::pipeline::*;

let pipeline = Pipeline::new(1, &PipelineConfig::with_tables(2), NullSink::shared());

let mut flow = FlowModRequest::add(10, MatchSet::new());
flow.instructions = InstructionSet::new().with_apply_actions(vec![Action::output(3)]);
pipeline.submit_flow_mod(0, flow).unwrap();

let verdict = pipeline.process(&PacketFields::new(64));
assert_eq!(vec![Action::output(3)], verdict.actions);
```
*/

#[macro_use]
extern crate bitflags;
extern crate byteorder;
extern crate ini;
extern crate ipnetwork;
#[macro_use]
extern crate log;
extern crate notify;

pub mod conf;
pub mod flows_csv;
pub mod pipeline;

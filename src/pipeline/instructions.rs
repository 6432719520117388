/*!
Actions, instructions and the action set a packet accumulates on its way
through the pipeline.
*/

use pipeline::error::ValidationError;
use pipeline::matching::{FieldKind, MatchField, PacketFields, OFPVID_PRESENT};

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

/// Maximum number of physical and logical switch ports. Ports are numbered starting from 1.
pub const OFPP_MAX: u32 = 0xffff_ff00;
/// Send the packet out the input port.
pub const OFPP_IN_PORT: u32 = 0xffff_fff8;
/// Submit the packet to the first flow table.
pub const OFPP_TABLE: u32 = 0xffff_fff9;
/// Forward using non-OpenFlow pipeline.
pub const OFPP_NORMAL: u32 = 0xffff_fffa;
/// Flood using non-OpenFlow pipeline.
pub const OFPP_FLOOD: u32 = 0xffff_fffb;
/// All standard ports except input port.
pub const OFPP_ALL: u32 = 0xffff_fffc;
/// Send to controller.
pub const OFPP_CONTROLLER: u32 = 0xffff_fffd;
/// Local OpenFlow "port".
pub const OFPP_LOCAL: u32 = 0xffff_fffe;
/// Special value used in some requests when no port is specified (i.e. wildcarded).
pub const OFPP_ANY: u32 = 0xffff_ffff;

/// Wildcard group used only for flow stats requests and deletes.
pub const OFPG_ANY: u32 = 0xffff_ffff;

/// Indicates that no buffering should be applied and the whole packet is to be
/// sent to the controller.
pub const OFPCML_NO_BUFFER: u16 = 0xffff;

/// Actions associated with flows and packets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Output to switch port.
    Output { port: u32, max_len: u16 },
    /// Copy TTL "outwards" -- from next-to-outermost to outermost
    CopyTtlOut,
    /// Copy TTL "inwards" -- from outermost to next-to-outermost
    CopyTtlIn,
    /// MPLS TTL
    SetMplsTtl(u8),
    /// Decrement MPLS TTL
    DecMplsTtl,
    /// Push a new VLAN tag with the given ethertype
    PushVlan(u16),
    /// Pop the outer VLAN tag
    PopVlan,
    /// Push a new MPLS tag with the given ethertype
    PushMpls(u16),
    /// Pop the outer MPLS tag, the payload has the given ethertype
    PopMpls(u16),
    /// Set queue id when outputting to a port
    SetQueue(u32),
    /// Apply group.
    Group(u32),
    /// IP TTL.
    SetNwTtl(u8),
    /// Decrement IP TTL.
    DecNwTtl,
    /// Set a header field.
    SetField { kind: FieldKind, value: Vec<u8> },
}

/// The position of an action in the action set.
/// The derived order is the order of execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionSlot {
    CopyTtlIn,
    PopVlan,
    PopMpls,
    PushMpls,
    PushVlan,
    CopyTtlOut,
    DecMplsTtl,
    DecNwTtl,
    SetMplsTtl,
    SetNwTtl,
    SetField(FieldKind),
    SetQueue,
    Group,
    Output,
}

impl Action {
    /// Output to `port`, sending whole packets if it is the controller
    pub fn output(port: u32) -> Action {
        Action::Output {
            port,
            max_len: OFPCML_NO_BUFFER,
        }
    }

    /// Set-field from an integer value
    pub fn set_field_u64(kind: FieldKind, value: u64) -> Action {
        Action::SetField {
            kind,
            value: kind.encode(value),
        }
    }

    /// The action set slot this action occupies
    pub fn slot(&self) -> ActionSlot {
        match *self {
            Action::Output { .. } => ActionSlot::Output,
            Action::CopyTtlOut => ActionSlot::CopyTtlOut,
            Action::CopyTtlIn => ActionSlot::CopyTtlIn,
            Action::SetMplsTtl(_) => ActionSlot::SetMplsTtl,
            Action::DecMplsTtl => ActionSlot::DecMplsTtl,
            Action::PushVlan(_) => ActionSlot::PushVlan,
            Action::PopVlan => ActionSlot::PopVlan,
            Action::PushMpls(_) => ActionSlot::PushMpls,
            Action::PopMpls(_) => ActionSlot::PopMpls,
            Action::SetQueue(_) => ActionSlot::SetQueue,
            Action::Group(_) => ActionSlot::Group,
            Action::SetNwTtl(_) => ActionSlot::SetNwTtl,
            Action::DecNwTtl => ActionSlot::DecNwTtl,
            Action::SetField { kind, .. } => ActionSlot::SetField(kind),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            Action::Output { port, .. } => {
                if port == 0 || port == OFPP_ANY {
                    return Err(ValidationError::BadOutPort(port));
                }
                Ok(())
            }
            Action::SetField { kind, ref value } => {
                MatchField::exact(kind, value.clone())?.validate()
            }
            _ => Ok(()),
        }
    }

    /// Rewrites the packet's header view the way the action changes the packet.
    /// Actions that only forward leave the view untouched.
    pub fn apply_to(&self, packet: &mut PacketFields) {
        match *self {
            Action::SetField { kind, ref value } => {
                if let Err(e) = packet.set(kind, value.clone()) {
                    debug!("Skipping set-field on the packet view: {}", e);
                }
            }
            Action::PushVlan(_) => {
                let vid = packet.get_u64(FieldKind::VlanVid).unwrap_or(0) & 0x0fff;
                packet.write_masked_u64(FieldKind::VlanVid, vid | OFPVID_PRESENT as u64, 0xffff);
                if packet.get(FieldKind::VlanPcp).is_none() {
                    packet.write_masked_u64(FieldKind::VlanPcp, 0, 0xff);
                }
            }
            Action::PopVlan => {
                packet.remove(FieldKind::VlanVid);
                packet.remove(FieldKind::VlanPcp);
            }
            Action::PushMpls(eth_type) => {
                packet.write_masked_u64(FieldKind::EthType, eth_type as u64, 0xffff);
                if packet.get(FieldKind::MplsLabel).is_none() {
                    packet.write_masked_u64(FieldKind::MplsLabel, 0, 0xffff_ffff);
                }
            }
            Action::PopMpls(eth_type) => {
                packet.write_masked_u64(FieldKind::EthType, eth_type as u64, 0xffff);
                packet.remove(FieldKind::MplsLabel);
                packet.remove(FieldKind::MplsTc);
                packet.remove(FieldKind::MplsBos);
            }
            _ => {}
        }
    }

    /// Whether the action sends the packet to `port`
    pub fn outputs_to(&self, port: u32) -> bool {
        match *self {
            Action::Output { port: p, .. } => p == port,
            _ => false,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Action::Output { port, .. } => match port {
                OFPP_IN_PORT => write!(f, "output=in_port"),
                OFPP_TABLE => write!(f, "output=table"),
                OFPP_NORMAL => write!(f, "output=normal"),
                OFPP_FLOOD => write!(f, "output=flood"),
                OFPP_ALL => write!(f, "output=all"),
                OFPP_CONTROLLER => write!(f, "output=controller"),
                OFPP_LOCAL => write!(f, "output=local"),
                _ => write!(f, "output={}", port),
            },
            Action::CopyTtlOut => write!(f, "copy_ttl_out"),
            Action::CopyTtlIn => write!(f, "copy_ttl_in"),
            Action::SetMplsTtl(ttl) => write!(f, "set_mpls_ttl={}", ttl),
            Action::DecMplsTtl => write!(f, "dec_mpls_ttl"),
            Action::PushVlan(t) => write!(f, "push_vlan=0x{:04x}", t),
            Action::PopVlan => write!(f, "pop_vlan"),
            Action::PushMpls(t) => write!(f, "push_mpls=0x{:04x}", t),
            Action::PopMpls(t) => write!(f, "pop_mpls=0x{:04x}", t),
            Action::SetQueue(q) => write!(f, "queue={}", q),
            Action::Group(g) => write!(f, "group={}", g),
            Action::SetNwTtl(ttl) => write!(f, "set_nw_ttl={}", ttl),
            Action::DecNwTtl => write!(f, "dec_nw_ttl"),
            Action::SetField { kind, ref value } => {
                write!(f, "set:{}=0x", kind)?;
                for b in value {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// The type of an OpenFlow Instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionType {
    /// Setup the next table in the lookup pipeline
    GotoTable = 1,
    /// Setup the metadata field for use later in pipeline
    WriteMetadata = 2,
    /// Write the action(s) onto the datapath action set
    WriteActions = 3,
    /// Applies the action(s) immediately
    ApplyActions = 4,
    /// Clears all actions from the datapath action set
    ClearActions = 5,
}

/// A single OpenFlow Instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
    GotoTable(u8),
    WriteMetadata { metadata: u64, mask: u64 },
    WriteActions(Vec<Action>),
    ApplyActions(Vec<Action>),
    ClearActions,
}

impl Instruction {
    /// Gets the instruction's type
    pub fn typ(&self) -> InstructionType {
        match *self {
            Instruction::GotoTable(_) => InstructionType::GotoTable,
            Instruction::WriteMetadata { .. } => InstructionType::WriteMetadata,
            Instruction::WriteActions(_) => InstructionType::WriteActions,
            Instruction::ApplyActions(_) => InstructionType::ApplyActions,
            Instruction::ClearActions => InstructionType::ClearActions,
        }
    }
}

/// The right-hand side of a flow rule.
/// Holds each instruction type at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InstructionSet {
    write_metadata: Option<(u64, u64)>,
    apply_actions: Option<Vec<Action>>,
    write_actions: Option<Vec<Action>>,
    clear_actions: bool,
    goto_table: Option<u8>,
}

impl InstructionSet {
    /// An empty instruction set, which drops matching packets
    pub fn new() -> InstructionSet {
        InstructionSet::default()
    }

    /// Collects a list of instructions.
    /// Fails if an instruction type occurs twice.
    pub fn from_instructions(instructions: Vec<Instruction>) -> Result<InstructionSet, ValidationError> {
        let mut set = InstructionSet::new();
        for instr in instructions {
            let typ = instr.typ();
            let duplicate = match instr {
                Instruction::GotoTable(t) => set.goto_table.replace(t).is_some(),
                Instruction::WriteMetadata { metadata, mask } => {
                    set.write_metadata.replace((metadata, mask)).is_some()
                }
                Instruction::WriteActions(a) => set.write_actions.replace(a).is_some(),
                Instruction::ApplyActions(a) => set.apply_actions.replace(a).is_some(),
                Instruction::ClearActions => {
                    let seen = set.clear_actions;
                    set.clear_actions = true;
                    seen
                }
            };
            if duplicate {
                return Err(ValidationError::DuplicateInstruction(typ));
            }
        }
        Ok(set)
    }

    pub fn with_apply_actions(mut self, actions: Vec<Action>) -> InstructionSet {
        self.apply_actions = Some(actions);
        self
    }

    pub fn with_write_actions(mut self, actions: Vec<Action>) -> InstructionSet {
        self.write_actions = Some(actions);
        self
    }

    pub fn with_clear_actions(mut self) -> InstructionSet {
        self.clear_actions = true;
        self
    }

    pub fn with_write_metadata(mut self, metadata: u64, mask: u64) -> InstructionSet {
        self.write_metadata = Some((metadata, mask));
        self
    }

    pub fn with_goto_table(mut self, table_id: u8) -> InstructionSet {
        self.goto_table = Some(table_id);
        self
    }

    pub fn goto_table(&self) -> Option<u8> {
        self.goto_table
    }

    pub fn write_metadata(&self) -> Option<(u64, u64)> {
        self.write_metadata
    }

    pub fn apply_actions(&self) -> &[Action] {
        self.apply_actions.as_ref().map(|a| &a[..]).unwrap_or(&[])
    }

    pub fn write_actions(&self) -> &[Action] {
        self.write_actions.as_ref().map(|a| &a[..]).unwrap_or(&[])
    }

    pub fn clears_actions(&self) -> bool {
        self.clear_actions
    }

    pub fn is_empty(&self) -> bool {
        *self == InstructionSet::default()
    }

    /// Lists the instructions in the order they execute
    pub fn instructions(&self) -> Vec<Instruction> {
        let mut list = vec![];
        if let Some((metadata, mask)) = self.write_metadata {
            list.push(Instruction::WriteMetadata { metadata, mask });
        }
        if let Some(ref a) = self.apply_actions {
            list.push(Instruction::ApplyActions(a.clone()));
        }
        if let Some(ref a) = self.write_actions {
            list.push(Instruction::WriteActions(a.clone()));
        }
        if self.clear_actions {
            list.push(Instruction::ClearActions);
        }
        if let Some(t) = self.goto_table {
            list.push(Instruction::GotoTable(t));
        }
        list
    }

    /// Checks the actions and that a goto-table points forward,
    /// to a table below `n_tables`.
    pub fn validate(&self, table_id: u8, n_tables: usize) -> Result<(), ValidationError> {
        if let Some(goto) = self.goto_table {
            if goto <= table_id || goto as usize >= n_tables {
                return Err(ValidationError::BadGotoTable { table_id, goto });
            }
        }
        for action in self.apply_actions().iter().chain(self.write_actions()) {
            action.validate()?;
        }
        Ok(())
    }

    /// Whether any action outputs to `port`
    pub fn references_port(&self, port: u32) -> bool {
        self.apply_actions()
            .iter()
            .chain(self.write_actions())
            .any(|a| a.outputs_to(port))
    }

    /// Whether any action applies `group`
    pub fn references_group(&self, group: u32) -> bool {
        self.apply_actions()
            .iter()
            .chain(self.write_actions())
            .any(|a| *a == Action::Group(group))
    }
}

impl fmt::Display for InstructionSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "drop");
        }
        let mut parts = vec![];
        if let Some((metadata, mask)) = self.write_metadata {
            parts.push(format!("meta=0x{:x}/0x{:x}", metadata, mask));
        }
        if let Some(ref a) = self.apply_actions {
            let actions: Vec<_> = a.iter().map(|a| a.to_string()).collect();
            parts.push(format!("apply:{}", actions.join("|")));
        }
        if let Some(ref a) = self.write_actions {
            let actions: Vec<_> = a.iter().map(|a| a.to_string()).collect();
            parts.push(format!("write:{}", actions.join("|")));
        }
        if self.clear_actions {
            parts.push("clear".to_owned());
        }
        if let Some(t) = self.goto_table {
            parts.push(format!("goto={}", t));
        }
        write!(f, "{}", parts.join(","))
    }
}

/// The actions a packet accumulates through write-actions instructions.
/// A later write of the same action type replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSet {
    actions: BTreeMap<ActionSlot, Action>,
}

impl ActionSet {
    pub fn new() -> ActionSet {
        ActionSet::default()
    }

    /// Merges actions into the set, keyed by their slot
    pub fn write(&mut self, actions: &[Action]) {
        for action in actions {
            self.actions.insert(action.slot(), action.clone());
        }
    }

    /// Empties the set
    pub fn clear(&mut self) {
        self.actions.clear()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, slot: ActionSlot) -> Option<&Action> {
        self.actions.get(&slot)
    }

    pub fn iter(&self) -> btree_map::Values<ActionSlot, Action> {
        self.actions.values()
    }

    /// The actions in execution order.
    /// A group action takes precedence over an output action.
    pub fn to_list(&self) -> Vec<Action> {
        let has_group = self.actions.contains_key(&ActionSlot::Group);
        self.iter()
            .filter(|a| !(has_group && a.slot() == ActionSlot::Output))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_instructions() {
        let instrs = vec![Instruction::GotoTable(1), Instruction::GotoTable(2)];
        assert_eq!(
            Err(ValidationError::DuplicateInstruction(InstructionType::GotoTable)),
            InstructionSet::from_instructions(instrs)
        );
        let instrs = vec![Instruction::ClearActions, Instruction::ClearActions];
        assert!(InstructionSet::from_instructions(instrs).is_err());
    }

    #[test]
    fn instructions_are_listed_in_execution_order() {
        let set = InstructionSet::from_instructions(vec![
            Instruction::GotoTable(3),
            Instruction::WriteActions(vec![Action::output(1)]),
            Instruction::ClearActions,
            Instruction::ApplyActions(vec![]),
            Instruction::WriteMetadata { metadata: 1, mask: 1 },
        ])
        .unwrap();
        let types: Vec<_> = set.instructions().iter().map(|i| i.typ()).collect();
        assert_eq!(
            vec![
                InstructionType::WriteMetadata,
                InstructionType::ApplyActions,
                InstructionType::WriteActions,
                InstructionType::ClearActions,
                InstructionType::GotoTable,
            ],
            types
        );
    }

    #[test]
    fn goto_must_point_forward() {
        let set = InstructionSet::new().with_goto_table(1);
        assert_eq!(Ok(()), set.validate(0, 4));
        assert_eq!(
            Err(ValidationError::BadGotoTable {
                table_id: 1,
                goto: 1
            }),
            set.validate(1, 4)
        );
        assert_eq!(
            Err(ValidationError::BadGotoTable {
                table_id: 0,
                goto: 1
            }),
            set.validate(0, 1)
        );
    }

    #[test]
    fn bad_output_ports() {
        let zero = InstructionSet::new().with_apply_actions(vec![Action::output(0)]);
        assert_eq!(Err(ValidationError::BadOutPort(0)), zero.validate(0, 1));
        let any = InstructionSet::new().with_write_actions(vec![Action::output(OFPP_ANY)]);
        assert_eq!(Err(ValidationError::BadOutPort(OFPP_ANY)), any.validate(0, 1));
        let ctrl = InstructionSet::new().with_write_actions(vec![Action::output(OFPP_CONTROLLER)]);
        assert_eq!(Ok(()), ctrl.validate(0, 1));
    }

    #[test]
    fn later_write_replaces_same_type() {
        let mut set = ActionSet::new();
        set.write(&[Action::output(1), Action::SetQueue(7)]);
        set.write(&[Action::output(2)]);
        assert_eq!(vec![Action::SetQueue(7), Action::output(2)], set.to_list());
    }

    #[test]
    fn set_fields_are_kept_per_field() {
        let mut set = ActionSet::new();
        set.write(&[
            Action::set_field_u64(FieldKind::Ipv4Dst, 1),
            Action::set_field_u64(FieldKind::TcpDst, 2),
        ]);
        set.write(&[Action::set_field_u64(FieldKind::Ipv4Dst, 3)]);
        assert_eq!(2, set.len());
        assert_eq!(
            Some(&Action::set_field_u64(FieldKind::Ipv4Dst, 3)),
            set.get(ActionSlot::SetField(FieldKind::Ipv4Dst))
        );
    }

    #[test]
    fn execution_order_and_group_precedence() {
        let mut set = ActionSet::new();
        set.write(&[Action::output(4), Action::DecNwTtl, Action::PopVlan, Action::CopyTtlIn]);
        assert_eq!(
            vec![Action::CopyTtlIn, Action::PopVlan, Action::DecNwTtl, Action::output(4)],
            set.to_list()
        );
        set.write(&[Action::Group(9)]);
        assert_eq!(
            vec![Action::CopyTtlIn, Action::PopVlan, Action::DecNwTtl, Action::Group(9)],
            set.to_list()
        );
    }

    #[test]
    fn port_and_group_references() {
        let set = InstructionSet::new()
            .with_apply_actions(vec![Action::output(3)])
            .with_write_actions(vec![Action::Group(5)]);
        assert!(set.references_port(3));
        assert!(!set.references_port(4));
        assert!(set.references_group(5));
        assert!(!set.references_group(3));
    }

    #[test]
    fn vlan_push_and_pop() {
        let mut p = PacketFields::new(64);
        Action::PushVlan(0x8100).apply_to(&mut p);
        assert_eq!(Some(OFPVID_PRESENT as u64), p.get_u64(FieldKind::VlanVid));
        Action::set_field_u64(FieldKind::VlanVid, (OFPVID_PRESENT | 42) as u64).apply_to(&mut p);
        assert_eq!(Some((OFPVID_PRESENT | 42) as u64), p.get_u64(FieldKind::VlanVid));
        Action::PopVlan.apply_to(&mut p);
        assert_eq!(None, p.get(FieldKind::VlanVid));
    }

    #[test]
    fn display_uses_flow_file_syntax() {
        let set = InstructionSet::new()
            .with_apply_actions(vec![
                Action::set_field_u64(FieldKind::TcpDst, 8080),
                Action::output(OFPP_CONTROLLER),
            ])
            .with_write_actions(vec![Action::Group(2)])
            .with_goto_table(1);
        assert_eq!(
            "apply:set:tcp_dst=0x1f90|output=controller,write:group=2,goto=1",
            set.to_string()
        );
        assert_eq!("drop", InstructionSet::new().to_string());
    }
}

/*!
A CSV parser for files with flow rules and for packet descriptors.

# Syntax

The CSV is separated by semicolons.
Empty lines and lines beginning with `#` are ignored.
Whitespaces surrounding the values are ignored.

Each line describes one flow entry:

```csv
# table;priority;match                          ;instructions                 ;idle;hard;cookie;flags
0      ;100     ;eth_type=0x800,ipv4_dst=192.0.2.0/24;apply:output=2,goto=1 ;30  ;0   ;0x10  ;send_flow_rem
1      ;0       ;*                              ;apply:output=controller
```

The first four values are required.

A match is `*` or a comma separated list of `field=value[/mask]`.
Field names are the OXM names in lower case, e.g. `in_port`, `eth_dst` or `tcp_dst`.
Values are decimal or `0x` prefixed hexadecimal numbers, MAC addresses
for the Ethernet and link-layer fields and CIDR networks for IP addresses.

Instructions are `drop` (or `*`) or a comma separated list of
`apply:ACTIONS`, `write:ACTIONS`, `clear`, `meta=value[/mask]` and `goto=table`,
where `ACTIONS` is a `|` separated list like `set:tcp_dst=8080|output=3`.

Flags are a `|` separated list of `send_flow_rem`, `check_overlap`,
`reset_counts`, `no_pkt_counts` and `no_byt_counts`.

A packet descriptor is a comma separated list of `field=value`,
optionally followed by `;` and the frame length in bytes.
*/

use pipeline::*;

use ipnetwork::{IpNetworkError, Ipv4Network, Ipv6Network};

use notify;
use notify::{DebouncedEvent, RecursiveMode, Watcher};

use std::collections::HashSet;
use std::convert::From;
use std::error;
use std::fmt;
use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::str::FromStr;
use std::sync::mpsc;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;

/// The polling frequency
const NOTIFY_SECONDS: u64 = 1;

/// The CSV delimiter.
const DELIMITER: char = ';';

/// The char introducing a line comment.
const COMMENT: char = '#';

const WILDCARD: &str = "*";

/// Frame length of a packet descriptor without one
pub const DEFAULT_FRAME_LEN: usize = 64;

/// Represents all errors that can occur while
/// parsing flow rules or packet descriptors
#[derive(Debug, PartialEq)]
pub enum Error {
    /// A line does not have between 4 and 8 values
    ValueCount(String),
    /// A line does have an empty value
    EmptyValue(String),
    /// A number cannot be parsed or is too large
    InvalidNumber(String),
    /// A field name that is not known
    UnknownField(String),
    /// An invalid CIDR form occured
    InvalidCidr(IpNetworkError, String),
    /// A MAC address that is not 6 hex bytes
    InvalidMac(String),
    /// An item is not of the form `name=value`
    InvalidAssignment(String),
    UnknownAction(String),
    UnknownInstruction(String),
    UnknownFlag(String),
    /// The rule is well-formed but not a valid flow
    InvalidFlow(ValidationError, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ValueCount(ref s) => {
                write!(f, "The following line does not have 4 to 8 values: {}", s)
            }
            Error::EmptyValue(ref s) => write!(f, "The following line has an empty value: {}", s),
            Error::InvalidNumber(ref n) => write!(f, "{} is an invalid number.", n),
            Error::UnknownField(ref n) => write!(f, "{} is an unknown match field.", n),
            Error::InvalidCidr(ref e, ref s) => write!(f, "{} -- Violating value: {}", e, s),
            Error::InvalidMac(ref m) => write!(f, "{} is an invalid MAC address.", m),
            Error::InvalidAssignment(ref a) => write!(f, "{} is not of the form name=value.", a),
            Error::UnknownAction(ref a) => write!(f, "{} is an unknown action.", a),
            Error::UnknownInstruction(ref i) => write!(f, "{} is an unknown instruction.", i),
            Error::UnknownFlag(ref fl) => write!(f, "{} is an unknown flow-mod flag.", fl),
            Error::InvalidFlow(ref e, ref s) => write!(f, "{} -- Violating line: {}", e, s),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "flows_csv parser error"
    }
}

/// Represents one flow rule of a file
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub struct FlowRecord {
    pub table_id: u8,
    pub priority: u16,
    pub match_set: MatchSet,
    pub instructions: InstructionSet,
    pub idle_timeout: u32,
    pub hard_timeout: u32,
    pub cookie: u64,
    pub flags: FlowModFlags,
}

impl FlowRecord {
    /// The flow-mod installing this rule
    pub fn to_add(&self) -> FlowModRequest {
        FlowModRequest::add(self.priority, self.match_set.clone())
            .with_instructions(self.instructions.clone())
            .with_timeouts(self.idle_timeout, self.hard_timeout)
            .with_cookie(self.cookie, 0)
            .with_flags(self.flags)
    }

    /// The flow-mod removing exactly this rule
    pub fn to_delete(&self) -> FlowModRequest {
        FlowModRequest::delete_strict(self.priority, self.match_set.clone())
    }
}

/// The rules to remove and the rules to install to get from `old` to `new`
pub fn diff<'a>(
    old: &'a HashSet<FlowRecord>,
    new: &'a HashSet<FlowRecord>,
) -> (Vec<&'a FlowRecord>, Vec<&'a FlowRecord>) {
    (old.difference(new).collect(), new.difference(old).collect())
}

fn parse_number(s: &str) -> Result<u64, Error> {
    let parsed = if s.starts_with("0x") || s.starts_with("0X") {
        u64::from_str_radix(&s[2..], 16)
    }
    else {
        s.parse()
    };
    parsed.map_err(|_| Error::InvalidNumber(s.to_owned()))
}

/// Parses a number that has to fit in `bits` bits
fn parse_bounded(s: &str, bits: u32) -> Result<u64, Error> {
    let n = parse_number(s)?;
    if bits < 64 && n >> bits != 0 {
        return Err(Error::InvalidNumber(s.to_owned()));
    }
    Ok(n)
}

fn parse_mac(s: &str) -> Result<Vec<u8>, Error> {
    let bytes = s
        .split(':')
        .map(|b| u8::from_str_radix(b, 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| Error::InvalidMac(s.to_owned()))?;
    if bytes.len() != 6 {
        return Err(Error::InvalidMac(s.to_owned()));
    }
    Ok(bytes)
}

fn split_assignment(item: &str) -> Result<(&str, &str), Error> {
    let mut parts = item.splitn(2, '=');
    match (parts.next(), parts.next()) {
        (Some(name), Some(value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
            Ok((name.trim(), value.trim()))
        }
        _ => Err(Error::InvalidAssignment(item.to_owned())),
    }
}

fn field_kind(name: &str) -> Result<FieldKind, Error> {
    FieldKind::from_name(name).ok_or_else(|| Error::UnknownField(name.to_owned()))
}

fn is_mac_field(kind: FieldKind) -> bool {
    kind.width() == 6
}

/// The bytes of a plain value of `kind`
fn parse_value(kind: FieldKind, s: &str) -> Result<Vec<u8>, Error> {
    if is_mac_field(kind) {
        return parse_mac(s);
    }
    match kind {
        FieldKind::Ipv4Src | FieldKind::Ipv4Dst | FieldKind::ArpSpa | FieldKind::ArpTpa => {
            let net = Ipv4Network::from_str(s).map_err(|e| Error::InvalidCidr(e, s.to_owned()))?;
            Ok(net.ip().octets().to_vec())
        }
        FieldKind::Ipv6Src | FieldKind::Ipv6Dst | FieldKind::Ipv6NdTarget => {
            let net = Ipv6Network::from_str(s).map_err(|e| Error::InvalidCidr(e, s.to_owned()))?;
            Ok(net.ip().octets().to_vec())
        }
        _ => Ok(kind.encode(parse_bounded(s, 8 * kind.width() as u32)?)),
    }
}

/// Parses one `value[/mask]` for a match field
fn parse_match_field(kind: FieldKind, s: &str) -> Result<MatchField, Error> {
    let invalid = |e: ValidationError| Error::InvalidFlow(e, s.to_owned());
    match kind {
        FieldKind::Ipv4Src | FieldKind::Ipv4Dst | FieldKind::ArpSpa | FieldKind::ArpTpa => {
            let net = Ipv4Network::from_str(s).map_err(|e| Error::InvalidCidr(e, s.to_owned()))?;
            return Ok(MatchField::ipv4(kind, &net));
        }
        FieldKind::Ipv6Src | FieldKind::Ipv6Dst | FieldKind::Ipv6NdTarget => {
            let net = Ipv6Network::from_str(s).map_err(|e| Error::InvalidCidr(e, s.to_owned()))?;
            return Ok(MatchField::ipv6(kind, &net));
        }
        // a plain VLAN id means a tagged frame with that id
        FieldKind::VlanVid if !s.contains('/') => {
            return Ok(MatchField::vlan_vid(parse_bounded(s, 12)? as u16));
        }
        _ => {}
    }

    let mut parts = s.splitn(2, '/');
    let value = parse_value(kind, parts.next().unwrap_or(""))?;
    match parts.next() {
        Some(mask) => MatchField::masked(kind, value, parse_value(kind, mask)?).map_err(invalid),
        None => MatchField::exact(kind, value).map_err(invalid),
    }
}

/// Parses `*` or a comma separated list of match fields
pub fn parse_match(s: &str) -> Result<MatchSet, Error> {
    let mut match_set = MatchSet::new();
    if s == WILDCARD {
        return Ok(match_set);
    }
    for item in s.split(',') {
        let (name, value) = split_assignment(item)?;
        match_set.add(parse_match_field(field_kind(name)?, value)?);
    }
    Ok(match_set)
}

fn parse_port(s: &str) -> Result<u32, Error> {
    match s {
        "in_port" => Ok(OFPP_IN_PORT),
        "table" => Ok(OFPP_TABLE),
        "normal" => Ok(OFPP_NORMAL),
        "flood" => Ok(OFPP_FLOOD),
        "all" => Ok(OFPP_ALL),
        "controller" => Ok(OFPP_CONTROLLER),
        "local" => Ok(OFPP_LOCAL),
        _ => Ok(parse_bounded(s, 32)? as u32),
    }
}

fn parse_action(s: &str) -> Result<Action, Error> {
    let s = s.trim();
    if s.starts_with("set:") {
        let (name, value) = split_assignment(&s[4..])?;
        let kind = field_kind(name)?;
        return Ok(Action::SetField {
            kind,
            value: parse_value(kind, value)?,
        });
    }

    let mut parts = s.splitn(2, '=');
    let name = parts.next().unwrap_or("").trim();
    let arg = parts.next().map(str::trim);
    let number = |bits| match arg {
        Some(a) => parse_bounded(a, bits),
        None => Err(Error::InvalidAssignment(s.to_owned())),
    };
    let eth_type_or = |default: u64| match arg {
        Some(a) => parse_bounded(a, 16).map(|t| t as u16),
        None => Ok(default as u16),
    };

    let action = match name {
        "output" => match arg {
            Some(port) => Action::output(parse_port(port)?),
            None => return Err(Error::InvalidAssignment(s.to_owned())),
        },
        "group" => Action::Group(number(32)? as u32),
        "queue" => Action::SetQueue(number(32)? as u32),
        "push_vlan" => Action::PushVlan(eth_type_or(0x8100)?),
        "pop_vlan" => Action::PopVlan,
        "push_mpls" => Action::PushMpls(eth_type_or(ETH_TYPE_MPLS)?),
        "pop_mpls" => Action::PopMpls(eth_type_or(ETH_TYPE_IPV4)?),
        "set_mpls_ttl" => Action::SetMplsTtl(number(8)? as u8),
        "dec_mpls_ttl" => Action::DecMplsTtl,
        "set_nw_ttl" => Action::SetNwTtl(number(8)? as u8),
        "dec_nw_ttl" => Action::DecNwTtl,
        "copy_ttl_out" => Action::CopyTtlOut,
        "copy_ttl_in" => Action::CopyTtlIn,
        _ => return Err(Error::UnknownAction(s.to_owned())),
    };
    Ok(action)
}

fn parse_actions(s: &str) -> Result<Vec<Action>, Error> {
    s.split('|').map(parse_action).collect()
}

/// Parses `drop`, `*` or a comma separated list of instructions
pub fn parse_instructions(s: &str) -> Result<InstructionSet, Error> {
    if s == "drop" || s == WILDCARD {
        return Ok(InstructionSet::new());
    }
    let mut instructions = vec![];
    for item in s.split(',').map(str::trim) {
        let instruction = if item.starts_with("apply:") {
            Instruction::ApplyActions(parse_actions(&item[6..])?)
        }
        else if item.starts_with("write:") {
            Instruction::WriteActions(parse_actions(&item[6..])?)
        }
        else if item == "clear" {
            Instruction::ClearActions
        }
        else if item.starts_with("meta=") {
            let mut parts = item[5..].splitn(2, '/');
            let metadata = parse_number(parts.next().unwrap_or(""))?;
            let mask = match parts.next() {
                Some(m) => parse_number(m)?,
                None => u64::max_value(),
            };
            Instruction::WriteMetadata { metadata, mask }
        }
        else if item.starts_with("goto=") {
            Instruction::GotoTable(parse_bounded(&item[5..], 8)? as u8)
        }
        else {
            return Err(Error::UnknownInstruction(item.to_owned()));
        };
        instructions.push(instruction);
    }
    InstructionSet::from_instructions(instructions).map_err(|e| Error::InvalidFlow(e, s.to_owned()))
}

/// Parses a `|` separated list of flow-mod flag names
pub fn parse_flags(s: &str) -> Result<FlowModFlags, Error> {
    let mut flags = FlowModFlags::empty();
    if s == WILDCARD {
        return Ok(flags);
    }
    for name in s.split('|').map(str::trim) {
        flags |= match name {
            "send_flow_rem" => FlowModFlags::SEND_FLOW_REM,
            "check_overlap" => FlowModFlags::CHECK_OVERLAP,
            "reset_counts" => FlowModFlags::RESET_COUNTS,
            "no_pkt_counts" => FlowModFlags::NO_PKT_COUNTS,
            "no_byt_counts" => FlowModFlags::NO_BYT_COUNTS,
            _ => return Err(Error::UnknownFlag(name.to_owned())),
        };
    }
    Ok(flags)
}

/// Splits a line at the delimiter, trimming the values
fn split_line(line: &str) -> Result<Vec<&str>, Error> {
    let mut values = vec![];
    for item in line.split(DELIMITER) {
        match item.trim() {
            "" => return Err(Error::EmptyValue(line.to_owned())),
            trimmed => values.push(trimmed),
        }
    }
    Ok(values)
}

/// Parses a packet descriptor line
pub fn parse_packet(line: &str) -> Result<PacketFields, Error> {
    let values = split_line(line.trim())?;
    if values.len() > 2 {
        return Err(Error::ValueCount(line.to_owned()));
    }
    let frame_len = match values.get(1) {
        Some(len) => parse_bounded(len, 32)? as usize,
        None => DEFAULT_FRAME_LEN,
    };
    let mut packet = PacketFields::new(frame_len);
    if values[0] == WILDCARD {
        return Ok(packet);
    }
    for item in values[0].split(',') {
        let (name, value) = split_assignment(item)?;
        let kind = field_kind(name)?;
        let bytes = match kind {
            FieldKind::VlanVid => kind.encode(parse_bounded(value, 12)? | OFPVID_PRESENT as u64),
            _ => parse_value(kind, value)?,
        };
        packet
            .set(kind, bytes)
            .map_err(|e| Error::InvalidFlow(e, line.to_owned()))?;
    }
    Ok(packet)
}

/// The line oriented parser for CSV flow rules
pub struct CsvParser {
    path: String,
}

impl CsvParser {
    /// Gets the path of the file that this parser operates on
    pub fn path(&self) -> &str {
        &self.path
    }
    /// Constructs a new `CsvParser`
    pub fn new(path: String) -> CsvParser {
        CsvParser { path }
    }

    /// Parses one CSV line and validates its match.
    fn parse_line(&self, line: &str) -> Result<Option<FlowRecord>, Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT) {
            return Ok(None);
        }

        let values = split_line(line)?;
        if values.len() < 4 || values.len() > 8 {
            return Err(Error::ValueCount(line.to_owned()));
        }
        let optional = |i: usize, bits| match values.get(i) {
            Some(v) if *v != WILDCARD => parse_bounded(v, bits),
            _ => Ok(0),
        };

        let record = FlowRecord {
            table_id: parse_bounded(values[0], 8)? as u8,
            priority: parse_bounded(values[1], 16)? as u16,
            match_set: parse_match(values[2])?,
            instructions: parse_instructions(values[3])?,
            idle_timeout: optional(4, 32)? as u32,
            hard_timeout: optional(5, 32)? as u32,
            cookie: optional(6, 64)?,
            flags: match values.get(7) {
                Some(flags) => parse_flags(flags)?,
                None => FlowModFlags::empty(),
            },
        };
        record
            .match_set
            .validate()
            .map_err(|e| Error::InvalidFlow(e, line.to_owned()))?;

        debug!("Got {:?}", record);
        Ok(Some(record))
    }

    /// Parses a CSV file and returns its records
    pub fn parse_file(&self) -> io::Result<HashSet<FlowRecord>> {
        info!("Reading CSV file {}", self.path);

        let file = File::open(&self.path).map_err(|e| {
            io::Error::new(e.kind(), format!("Unable to open `{:?}`: {}", self.path, e))
        })?;
        let reader = io::BufReader::new(file);

        let mut records = HashSet::new();

        for line_res in reader.lines() {
            let line = line_res?;
            if let Some(rec) = self.parse_line(&line)? {
                records.insert(rec);
            }
        }

        Ok(records)
    }

    /// Registers a file as notify target.
    /// If the registering fails, the file is tried to be reregistered
    /// until nobody receives the records anymore.
    pub fn watch_file(&self, record_tx: &Sender<HashSet<FlowRecord>>) {
        loop {
            let (tx, rx) = mpsc::channel();
            if let Ok(mut watcher) = notify::watcher(tx, Duration::from_secs(NOTIFY_SECONDS)) {
                if watcher
                    .watch(&self.path(), RecursiveMode::NonRecursive)
                    .is_ok()
                {
                    info!("Watching file {}", self.path());
                    match self.handle_file_events(&rx, record_tx) {
                        Ok(WatchEnd::Removed) => warn!("file watch removed"),
                        Ok(WatchEnd::Unsubscribed) => return,
                        Err(e) => error!("{}", e),
                    }
                }
            }
            // do not spin while the file is missing
            ::std::thread::sleep(Duration::from_secs(NOTIFY_SECONDS));
        }
    }

    /// Reads inode events and parses the corresponding file.
    /// If the inode is removed, it is unregistered from notify.
    /// A file with errors is reported and skipped, the rules stay as they are.
    fn handle_file_events(
        &self,
        rx: &Receiver<DebouncedEvent>,
        tx: &Sender<HashSet<FlowRecord>>,
    ) -> notify::Result<WatchEnd> {
        // the watcher owns the sender, so the channel only closes with it
        while let Ok(event) = rx.recv() {
            match event {
                DebouncedEvent::NoticeRemove(_) | DebouncedEvent::Remove(_) => {
                    return Ok(WatchEnd::Removed);
                }
                DebouncedEvent::Error(error, _) => {
                    return Err(error);
                }
                DebouncedEvent::NoticeWrite(_) | DebouncedEvent::Chmod(_) => {}
                _ => match self.parse_file() {
                    Ok(recs) => {
                        if tx.send(recs).is_err() {
                            return Ok(WatchEnd::Unsubscribed);
                        }
                    }
                    Err(e) => error!("Keeping the installed flows: {}", e),
                },
            }
        }
        Ok(WatchEnd::Removed)
    }
}

/// Why a file watch ended without an error
enum WatchEnd {
    /// The file is gone
    Removed,
    /// The record receiver is gone
    Unsubscribed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_parser() -> CsvParser {
        CsvParser::new("".to_string())
    }

    #[test]
    fn wrong_value_count() {
        let testee = test_parser().parse_line("0;1;*");
        assert_eq!(Error::ValueCount("0;1;*".to_string()), testee.unwrap_err());
    }

    #[test]
    fn empty_value() {
        let testee = test_parser().parse_line("0;1;*;");
        let expected = Error::EmptyValue("0;1;*;".to_string());
        assert_eq!(expected, testee.unwrap_err());
    }

    #[test]
    fn comment() {
        assert_eq!(Ok(None), test_parser().parse_line("# comment"));
    }

    #[test]
    fn empty() {
        assert_eq!(Ok(None), test_parser().parse_line(""));
    }

    #[test]
    fn minimal_line() {
        let rec = test_parser().parse_line("1 ; 0 ; * ; drop").unwrap().unwrap();
        assert_eq!(1, rec.table_id);
        assert_eq!(0, rec.priority);
        assert!(rec.match_set.is_empty());
        assert!(rec.instructions.is_empty());
        assert_eq!((0, 0, 0), (rec.idle_timeout, rec.hard_timeout, rec.cookie));
    }

    #[test]
    fn full_line() {
        let line = "0;100;eth_type=0x800,ip_proto=6,ipv4_dst=192.0.2.0/24,tcp_dst=80;\
                    apply:set:tcp_dst=8080|output=2,write:group=7,meta=0x5/0xf,goto=1;30;60;0x10;send_flow_rem|check_overlap";
        let rec = test_parser().parse_line(line).unwrap().unwrap();
        let net = Ipv4Network::from_str("192.0.2.0/24").unwrap();
        let expected_match = MatchSet::new()
            .with(MatchField::eth_type(0x800))
            .with(MatchField::ip_proto(6))
            .with(MatchField::ipv4(FieldKind::Ipv4Dst, &net))
            .with(MatchField::exact_u64(FieldKind::TcpDst, 80));
        assert_eq!(expected_match, rec.match_set);
        let expected_instructions = InstructionSet::new()
            .with_apply_actions(vec![Action::set_field_u64(FieldKind::TcpDst, 8080), Action::output(2)])
            .with_write_actions(vec![Action::Group(7)])
            .with_write_metadata(0x5, 0xf)
            .with_goto_table(1);
        assert_eq!(expected_instructions, rec.instructions);
        assert_eq!((30, 60, 0x10), (rec.idle_timeout, rec.hard_timeout, rec.cookie));
        assert_eq!(FlowModFlags::SEND_FLOW_REM | FlowModFlags::CHECK_OVERLAP, rec.flags);
    }

    #[test]
    fn mac_and_vlan() {
        let m = parse_match("eth_dst=02:00:00:00:00:0a,vlan_vid=100").unwrap();
        assert_eq!(Some(&MatchField::eth_dst([2, 0, 0, 0, 0, 0x0a])), m.get(FieldKind::EthDst));
        assert_eq!(Some(&MatchField::vlan_vid(100)), m.get(FieldKind::VlanVid));
        assert_eq!(
            Error::InvalidMac("02:00:00:00:0a".to_string()),
            parse_match("eth_src=02:00:00:00:0a").unwrap_err()
        );
    }

    #[test]
    fn zero_mask_is_wildcard() {
        assert!(parse_match("metadata=0/0").unwrap().is_empty());
        assert!(parse_match("ipv4_src=0.0.0.0/0").unwrap().is_empty());
    }

    #[test]
    fn unknown_names() {
        assert_eq!(Error::UnknownField("foo".to_string()), parse_match("foo=1").unwrap_err());
        assert_eq!(Error::UnknownAction("fly".to_string()), parse_instructions("apply:fly").unwrap_err());
        assert_eq!(Error::UnknownInstruction("jump".to_string()), parse_instructions("jump").unwrap_err());
        assert_eq!(Error::UnknownFlag("loud".to_string()), parse_flags("loud").unwrap_err());
        assert_eq!(Error::InvalidAssignment("in_port".to_string()), parse_match("in_port").unwrap_err());
    }

    #[test]
    fn number_out_of_range() {
        assert_eq!(Error::InvalidNumber("70000".to_string()), parse_match("tcp_dst=70000").unwrap_err());
        assert_eq!(
            Error::InvalidNumber("300".to_string()),
            test_parser().parse_line("300;1;*;drop").unwrap_err()
        );
    }

    #[test]
    fn invalid_cidr() {
        let expected = Error::InvalidCidr(IpNetworkError::InvalidPrefix, "192.0.2.0/50".to_string());
        assert_eq!(expected, parse_match("ipv4_dst=192.0.2.0/50").unwrap_err());
    }

    #[test]
    fn missing_prerequisite() {
        let line = "0;1;tcp_dst=80;drop";
        let expected = Error::InvalidFlow(ValidationError::BadPrerequisite(FieldKind::TcpDst), line.to_string());
        assert_eq!(expected, test_parser().parse_line(line).unwrap_err());
    }

    #[test]
    fn duplicate_instruction() {
        match parse_instructions("goto=1,goto=2") {
            Err(Error::InvalidFlow(ValidationError::DuplicateInstruction(InstructionType::GotoTable), _)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn reserved_ports() {
        let set = parse_instructions("apply:output=controller|output=in_port").unwrap();
        assert_eq!(&[Action::output(OFPP_CONTROLLER), Action::output(OFPP_IN_PORT)], set.apply_actions());
    }

    #[test]
    fn packet_descriptor() {
        let p = parse_packet("in_port=1,eth_dst=02:00:00:00:00:0a,ipv4_src=192.0.2.1,vlan_vid=5;128").unwrap();
        assert_eq!(128, p.frame_len());
        assert_eq!(Some(1), p.get_u64(FieldKind::InPort));
        assert_eq!(Some(&[192, 0, 2, 1][..]), p.get(FieldKind::Ipv4Src));
        assert_eq!(Some(5 | OFPVID_PRESENT as u64), p.get_u64(FieldKind::VlanVid));
        assert_eq!(DEFAULT_FRAME_LEN, parse_packet("*").unwrap().frame_len());
    }

    #[test]
    fn diff_rules() {
        let parser = test_parser();
        let a = parser.parse_line("0;1;in_port=1;apply:output=2").unwrap().unwrap();
        let b = parser.parse_line("0;1;in_port=2;apply:output=1").unwrap().unwrap();
        let b2 = parser.parse_line("0;1;in_port=2;apply:output=3").unwrap().unwrap();
        let old: HashSet<_> = vec![a.clone(), b.clone()].into_iter().collect();
        let new: HashSet<_> = vec![a, b2.clone()].into_iter().collect();
        let (removed, added) = diff(&old, &new);
        assert_eq!(vec![&b], removed);
        assert_eq!(vec![&b2], added);
    }

    #[test]
    fn records_become_flow_mods() {
        let rec = test_parser()
            .parse_line("0;7;in_port=1;apply:output=2;5;0;0x9;send_flow_rem")
            .unwrap()
            .unwrap();
        let add = rec.to_add();
        assert_eq!(FlowModCommand::Add, add.command);
        assert_eq!((7, 9, Some(5), Some(0)), (add.priority, add.cookie, add.idle_timeout, add.hard_timeout));
        assert_eq!(FlowModFlags::SEND_FLOW_REM, add.flags);
        let delete = rec.to_delete();
        assert_eq!(FlowModCommand::DeleteStrict, delete.command);
        assert_eq!(rec.match_set, delete.match_set);
    }
}

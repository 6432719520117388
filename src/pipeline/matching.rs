/*!
Match fields, match sets and the masked comparison algorithms.

Values are kept as big-endian byte strings of the field's width, exactly as
they appear in an OXM TLV. All comparisons are byte-for-byte under the mask;
nothing is normalized behind the caller's back.

The field catalogue is based on the OpenFlow Switch Specification 1.3.5.
*/

use byteorder::{ByteOrder, NetworkEndian};
use ipnetwork::{Ipv4Network, Ipv6Network};
use pipeline::error::ValidationError;

use std::cmp;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

/// The VLAN id bit that marks a tagged frame.
pub const OFPVID_PRESENT: u16 = 0x1000;

/// Ethernet types used by the field prerequisites
pub const ETH_TYPE_IPV4: u64 = 0x0800;
pub const ETH_TYPE_ARP: u64 = 0x0806;
pub const ETH_TYPE_IPV6: u64 = 0x86dd;
pub const ETH_TYPE_MPLS: u64 = 0x8847;
pub const ETH_TYPE_MPLS_MCAST: u64 = 0x8848;
pub const ETH_TYPE_PBB: u64 = 0x88e7;

/// IP protocol numbers used by the field prerequisites
pub const IP_PROTO_ICMP: u64 = 1;
pub const IP_PROTO_TCP: u64 = 6;
pub const IP_PROTO_UDP: u64 = 17;
pub const IP_PROTO_ICMPV6: u64 = 58;
pub const IP_PROTO_SCTP: u64 = 132;

const IP_ETH_TYPES: &[u64] = &[ETH_TYPE_IPV4, ETH_TYPE_IPV6];
const MPLS_ETH_TYPES: &[u64] = &[ETH_TYPE_MPLS, ETH_TYPE_MPLS_MCAST];
const ND_SOLICIT: u64 = 135;
const ND_ADVERT: u64 = 136;

/// OXM flow match field types for the OpenFlow basic class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKind {
    /// Switch input port.
    InPort = 0,
    /// Switch physical input port.
    InPhyPort = 1,
    /// Metadata passed between tables.
    Metadata = 2,
    /// Ethernet destination address.
    EthDst = 3,
    /// Ethernet source address.
    EthSrc = 4,
    /// Ethernet frame type.
    EthType = 5,
    /// VLAN id, including the `OFPVID_PRESENT` bit.
    VlanVid = 6,
    /// VLAN priority.
    VlanPcp = 7,
    /// IP DSCP (6 bits in ToS field).
    IpDscp = 8,
    /// IP ECN (2 bits in ToS field).
    IpEcn = 9,
    /// IP protocol.
    IpProto = 10,
    /// IPv4 source address.
    Ipv4Src = 11,
    /// IPv4 destination address.
    Ipv4Dst = 12,
    /// TCP source port.
    TcpSrc = 13,
    /// TCP destination port.
    TcpDst = 14,
    /// UDP source port.
    UdpSrc = 15,
    /// UDP destination port.
    UdpDst = 16,
    /// SCTP source port.
    SctpSrc = 17,
    /// SCTP destination port.
    SctpDst = 18,
    /// ICMP type.
    Icmpv4Type = 19,
    /// ICMP code.
    Icmpv4Code = 20,
    /// ARP opcode.
    ArpOp = 21,
    /// ARP source IPv4 address.
    ArpSpa = 22,
    /// ARP target IPv4 address.
    ArpTpa = 23,
    /// ARP source hardware address.
    ArpSha = 24,
    /// ARP target hardware address.
    ArpTha = 25,
    /// IPv6 source address.
    Ipv6Src = 26,
    /// IPv6 destination address.
    Ipv6Dst = 27,
    /// IPv6 Flow Label
    Ipv6Flabel = 28,
    /// ICMPv6 type.
    Icmpv6Type = 29,
    /// ICMPv6 code.
    Icmpv6Code = 30,
    /// Target address for ND.
    Ipv6NdTarget = 31,
    /// Source link-layer for ND.
    Ipv6NdSll = 32,
    /// Target link-layer for ND.
    Ipv6NdTll = 33,
    /// MPLS label.
    MplsLabel = 34,
    /// MPLS TC.
    MplsTc = 35,
    /// MPLS BoS bit.
    MplsBos = 36,
    /// PBB I-SID.
    PbbIsid = 37,
    /// Logical Port Metadata.
    TunnelId = 38,
    /// IPv6 Extension Header pseudo-field
    Ipv6Exthdr = 39,
}

/// What has to be present in a match before a field may be used.
enum Prerequisite {
    /// The field must be matched exactly on one of the values.
    Field(FieldKind, &'static [u64]),
    /// A VLAN tag must be required by the VLAN id match.
    VlanPresent,
}

impl FieldKind {
    /// Every field kind in OXM code order
    pub const ALL: [FieldKind; 40] = [
        FieldKind::InPort,
        FieldKind::InPhyPort,
        FieldKind::Metadata,
        FieldKind::EthDst,
        FieldKind::EthSrc,
        FieldKind::EthType,
        FieldKind::VlanVid,
        FieldKind::VlanPcp,
        FieldKind::IpDscp,
        FieldKind::IpEcn,
        FieldKind::IpProto,
        FieldKind::Ipv4Src,
        FieldKind::Ipv4Dst,
        FieldKind::TcpSrc,
        FieldKind::TcpDst,
        FieldKind::UdpSrc,
        FieldKind::UdpDst,
        FieldKind::SctpSrc,
        FieldKind::SctpDst,
        FieldKind::Icmpv4Type,
        FieldKind::Icmpv4Code,
        FieldKind::ArpOp,
        FieldKind::ArpSpa,
        FieldKind::ArpTpa,
        FieldKind::ArpSha,
        FieldKind::ArpTha,
        FieldKind::Ipv6Src,
        FieldKind::Ipv6Dst,
        FieldKind::Ipv6Flabel,
        FieldKind::Icmpv6Type,
        FieldKind::Icmpv6Code,
        FieldKind::Ipv6NdTarget,
        FieldKind::Ipv6NdSll,
        FieldKind::Ipv6NdTll,
        FieldKind::MplsLabel,
        FieldKind::MplsTc,
        FieldKind::MplsBos,
        FieldKind::PbbIsid,
        FieldKind::TunnelId,
        FieldKind::Ipv6Exthdr,
    ];

    /// Gets the kind for an OXM field code
    pub fn from_code(code: u8) -> Option<FieldKind> {
        FieldKind::ALL.get(code as usize).cloned()
    }

    /// Gets the OXM field code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The field's width in bytes on the wire
    pub fn width(self) -> usize {
        use self::FieldKind::*;
        match self {
            VlanPcp | IpDscp | IpEcn | IpProto | Icmpv4Type | Icmpv4Code | Icmpv6Type
            | Icmpv6Code | MplsTc | MplsBos => 1,
            EthType | VlanVid | TcpSrc | TcpDst | UdpSrc | UdpDst | SctpSrc | SctpDst | ArpOp
            | Ipv6Exthdr => 2,
            PbbIsid => 3,
            InPort | InPhyPort | Ipv4Src | Ipv4Dst | ArpSpa | ArpTpa | Ipv6Flabel
            | MplsLabel => 4,
            EthDst | EthSrc | ArpSha | ArpTha | Ipv6NdSll | Ipv6NdTll => 6,
            Metadata | TunnelId => 8,
            Ipv6Src | Ipv6Dst | Ipv6NdTarget => 16,
        }
    }

    /// The number of significant (low order) bits of the field
    pub fn bits(self) -> u32 {
        use self::FieldKind::*;
        match self {
            MplsBos => 1,
            IpEcn => 2,
            VlanPcp | MplsTc => 3,
            IpDscp => 6,
            Ipv6Exthdr => 9,
            VlanVid => 13,
            Ipv6Flabel | MplsLabel => 20,
            _ => self.width() as u32 * 8,
        }
    }

    /// Whether the protocol allows an arbitrary bitmask on this field
    pub fn maskable(self) -> bool {
        use self::FieldKind::*;
        match self {
            Metadata | EthDst | EthSrc | VlanVid | Ipv4Src | Ipv4Dst | ArpSpa | ArpTpa
            | ArpSha | ArpTha | Ipv6Src | Ipv6Dst | Ipv6Flabel | PbbIsid | TunnelId
            | Ipv6Exthdr => true,
            _ => false,
        }
    }

    /// The field's lower case name, as used in flow files
    pub fn name(self) -> &'static str {
        use self::FieldKind::*;
        match self {
            InPort => "in_port",
            InPhyPort => "in_phy_port",
            Metadata => "metadata",
            EthDst => "eth_dst",
            EthSrc => "eth_src",
            EthType => "eth_type",
            VlanVid => "vlan_vid",
            VlanPcp => "vlan_pcp",
            IpDscp => "ip_dscp",
            IpEcn => "ip_ecn",
            IpProto => "ip_proto",
            Ipv4Src => "ipv4_src",
            Ipv4Dst => "ipv4_dst",
            TcpSrc => "tcp_src",
            TcpDst => "tcp_dst",
            UdpSrc => "udp_src",
            UdpDst => "udp_dst",
            SctpSrc => "sctp_src",
            SctpDst => "sctp_dst",
            Icmpv4Type => "icmpv4_type",
            Icmpv4Code => "icmpv4_code",
            ArpOp => "arp_op",
            ArpSpa => "arp_spa",
            ArpTpa => "arp_tpa",
            ArpSha => "arp_sha",
            ArpTha => "arp_tha",
            Ipv6Src => "ipv6_src",
            Ipv6Dst => "ipv6_dst",
            Ipv6Flabel => "ipv6_flabel",
            Icmpv6Type => "icmpv6_type",
            Icmpv6Code => "icmpv6_code",
            Ipv6NdTarget => "ipv6_nd_target",
            Ipv6NdSll => "ipv6_nd_sll",
            Ipv6NdTll => "ipv6_nd_tll",
            MplsLabel => "mpls_label",
            MplsTc => "mpls_tc",
            MplsBos => "mpls_bos",
            PbbIsid => "pbb_isid",
            TunnelId => "tunnel_id",
            Ipv6Exthdr => "ipv6_exthdr",
        }
    }

    /// Looks a field kind up by its name
    pub fn from_name(name: &str) -> Option<FieldKind> {
        FieldKind::ALL.iter().cloned().find(|k| k.name() == name)
    }

    fn prerequisite(self) -> Option<Prerequisite> {
        use self::FieldKind::*;
        use self::Prerequisite::*;
        let pre = match self {
            InPhyPort => Field(InPort, &[]),
            VlanPcp => VlanPresent,
            IpDscp | IpEcn | IpProto => Field(EthType, IP_ETH_TYPES),
            Ipv4Src | Ipv4Dst => Field(EthType, &[ETH_TYPE_IPV4]),
            TcpSrc | TcpDst => Field(IpProto, &[IP_PROTO_TCP]),
            UdpSrc | UdpDst => Field(IpProto, &[IP_PROTO_UDP]),
            SctpSrc | SctpDst => Field(IpProto, &[IP_PROTO_SCTP]),
            Icmpv4Type | Icmpv4Code => Field(IpProto, &[IP_PROTO_ICMP]),
            ArpOp | ArpSpa | ArpTpa | ArpSha | ArpTha => Field(EthType, &[ETH_TYPE_ARP]),
            Ipv6Src | Ipv6Dst | Ipv6Flabel | Ipv6Exthdr => Field(EthType, &[ETH_TYPE_IPV6]),
            Icmpv6Type | Icmpv6Code => Field(IpProto, &[IP_PROTO_ICMPV6]),
            Ipv6NdTarget => Field(Icmpv6Type, &[ND_SOLICIT, ND_ADVERT]),
            Ipv6NdSll => Field(Icmpv6Type, &[ND_SOLICIT]),
            Ipv6NdTll => Field(Icmpv6Type, &[ND_ADVERT]),
            MplsLabel | MplsTc | MplsBos => Field(EthType, MPLS_ETH_TYPES),
            PbbIsid => Field(EthType, &[ETH_TYPE_PBB]),
            InPort | Metadata | EthDst | EthSrc | EthType | VlanVid | TunnelId => return None,
        };
        Some(pre)
    }

    /// Encodes `value` as a big-endian byte string of this field's width.
    /// Bits beyond the field's width are cut off.
    pub fn encode(self, value: u64) -> Vec<u8> {
        let width = self.width();
        let n = cmp::min(width, 8);
        let truncated = if n < 8 { value & ((1u64 << (n * 8)) - 1) } else { value };
        let mut buf = vec![0; width];
        NetworkEndian::write_uint(&mut buf[width - n..], truncated, n);
        buf
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Reads the low order 8 bytes of a big-endian byte string.
pub fn decode_u64(bytes: &[u8]) -> u64 {
    let n = cmp::min(bytes.len(), 8);
    if n == 0 {
        return 0;
    }
    NetworkEndian::read_uint(&bytes[bytes.len() - n..], n)
}

/// A typed, optionally masked value for one header field.
///
/// A missing mask means the field matches exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchField {
    kind: FieldKind,
    value: Vec<u8>,
    mask: Option<Vec<u8>>,
}

impl MatchField {
    fn check_len(kind: FieldKind, bytes: &[u8]) -> Result<(), ValidationError> {
        if bytes.len() != kind.width() {
            return Err(ValidationError::BadLength {
                kind,
                expected: kind.width(),
                found: bytes.len(),
            });
        }
        Ok(())
    }

    /// Constructs an exact match on `value`
    pub fn exact(kind: FieldKind, value: Vec<u8>) -> Result<MatchField, ValidationError> {
        Self::check_len(kind, &value)?;
        Ok(MatchField {
            kind,
            value,
            mask: None,
        })
    }

    /// Constructs a masked match.
    /// An all-ones mask is stored as an exact match.
    pub fn masked(
        kind: FieldKind,
        value: Vec<u8>,
        mask: Vec<u8>,
    ) -> Result<MatchField, ValidationError> {
        Self::check_len(kind, &value)?;
        Self::check_len(kind, &mask)?;
        let mask = if mask.iter().all(|b| *b == 0xff) { None } else { Some(mask) };
        Ok(MatchField { kind, value, mask })
    }

    /// Exact match on an integer value
    pub fn exact_u64(kind: FieldKind, value: u64) -> MatchField {
        MatchField {
            kind,
            value: kind.encode(value),
            mask: None,
        }
    }

    /// Masked match on an integer value
    pub fn masked_u64(kind: FieldKind, value: u64, mask: u64) -> MatchField {
        let mask = kind.encode(mask);
        let mask = if mask.iter().all(|b| *b == 0xff) { None } else { Some(mask) };
        MatchField {
            kind,
            value: kind.encode(value),
            mask,
        }
    }

    /// OpenFlow port on which the packet was received.
    pub fn in_port(port: u32) -> MatchField {
        Self::exact_u64(FieldKind::InPort, port as u64)
    }

    /// Packet's Ethernet type.
    pub fn eth_type(eth_type: u16) -> MatchField {
        Self::exact_u64(FieldKind::EthType, eth_type as u64)
    }

    /// The "protocol" byte in the IP header.
    pub fn ip_proto(proto: u8) -> MatchField {
        Self::exact_u64(FieldKind::IpProto, proto as u64)
    }

    /// Ethernet destination address, exact.
    pub fn eth_dst(mac: [u8; 6]) -> MatchField {
        MatchField {
            kind: FieldKind::EthDst,
            value: mac.to_vec(),
            mask: None,
        }
    }

    /// Ethernet source address, exact.
    pub fn eth_src(mac: [u8; 6]) -> MatchField {
        MatchField {
            kind: FieldKind::EthSrc,
            value: mac.to_vec(),
            mask: None,
        }
    }

    /// VLAN id of a tagged frame.
    pub fn vlan_vid(vid: u16) -> MatchField {
        Self::exact_u64(FieldKind::VlanVid, (vid | OFPVID_PRESENT) as u64)
    }

    /// The source or destination address in the IPv4 header as a CIDR match.
    pub fn ipv4(kind: FieldKind, cidr: &Ipv4Network) -> MatchField {
        Self::cidr(kind, cidr.network().octets().to_vec(), cidr.mask().octets().to_vec())
    }

    /// The source or destination address in the IPv6 header as a CIDR match.
    pub fn ipv6(kind: FieldKind, cidr: &Ipv6Network) -> MatchField {
        let network = cidr.network().octets().to_vec();
        Self::cidr(kind, network, cidr.mask().octets().to_vec())
    }

    fn cidr(kind: FieldKind, value: Vec<u8>, mask: Vec<u8>) -> MatchField {
        let mask = if mask.iter().all(|b| *b == 0xff) { None } else { Some(mask) };
        MatchField { kind, value, mask }
    }

    /// The field kind
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// The value as stored
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The mask, `None` for exact matches
    pub fn mask(&self) -> Option<&[u8]> {
        self.mask.as_ref().map(|m| &m[..])
    }

    /// Whether the mask has no bit set, i.e. the field matches anything
    pub fn is_wildcard(&self) -> bool {
        match self.mask {
            Some(ref m) => m.iter().all(|b| *b == 0),
            None => false,
        }
    }

    fn mask_byte(&self, i: usize) -> u8 {
        match self.mask {
            Some(ref m) => m[i],
            None => 0xff,
        }
    }

    /// Checks a packet's value of this field against the masked value
    pub fn matches_value(&self, packet_value: &[u8]) -> bool {
        packet_value.len() == self.value.len()
            && (0..self.value.len()).all(|i| {
                let m = self.mask_byte(i);
                packet_value[i] & m == self.value[i] & m
            })
    }

    /// `self` is at least as specific as `other`:
    /// every value accepted by `self` is accepted by `other`.
    fn narrows(&self, other: &MatchField) -> bool {
        self.value.len() == other.value.len()
            && (0..self.value.len()).all(|i| {
                let (ma, mb) = (self.mask_byte(i), other.mask_byte(i));
                ma & mb == mb && self.value[i] & mb == other.value[i] & mb
            })
    }

    /// Some value is accepted by both `self` and `other`
    fn intersects(&self, other: &MatchField) -> bool {
        self.value.len() == other.value.len()
            && (0..self.value.len()).all(|i| {
                let m = self.mask_byte(i) & other.mask_byte(i);
                self.value[i] & m == other.value[i] & m
            })
    }

    fn same_as(&self, other: &MatchField) -> bool {
        self.value.len() == other.value.len()
            && (0..self.value.len()).all(|i| {
                let m = self.mask_byte(i);
                m == other.mask_byte(i) && self.value[i] & m == other.value[i] & m
            })
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        Self::check_len(self.kind, &self.value)?;
        if let Some(ref mask) = self.mask {
            if !self.kind.maskable() {
                return Err(ValidationError::BadMask(self.kind));
            }
            Self::check_len(self.kind, mask)?;
            if self.value.iter().zip(mask).any(|(v, m)| v & !m != 0) {
                return Err(ValidationError::BadWildcards(self.kind));
            }
        }
        let spare_bits = self.kind.width() as u32 * 8 - self.kind.bits();
        if spare_bits > 0 {
            let fields = Some(&self.value).into_iter().chain(self.mask.as_ref());
            for bytes in fields {
                if leading_bits_set(bytes, spare_bits) {
                    return Err(ValidationError::BadValue(self.kind));
                }
            }
        }
        Ok(())
    }

    /// Whether the value, seen through the mask, equals one of `values`
    fn exactly_one_of(&self, values: &[u64]) -> bool {
        self.mask.is_none() && (values.is_empty() || values.contains(&decode_u64(&self.value)))
    }
}

fn leading_bits_set(bytes: &[u8], count: u32) -> bool {
    let mut remaining = count;
    for b in bytes {
        if remaining == 0 {
            break;
        }
        let take = cmp::min(remaining, 8);
        let high = !(0xffu8.checked_shr(take).unwrap_or(0));
        if b & high != 0 {
            return true;
        }
        remaining -= take;
    }
    false
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}=0x", self.kind)?;
        for b in &self.value {
            write!(f, "{:02x}", b)?;
        }
        if let Some(ref mask) = self.mask {
            write!(f, "/0x")?;
            for b in mask {
                write!(f, "{:02x}", b)?;
            }
        }
        Ok(())
    }
}

/// The left-hand side of a flow rule: at most one field per kind.
/// Absent kinds are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MatchSet {
    fields: BTreeMap<FieldKind, MatchField>,
}

impl MatchSet {
    /// Constructs an empty match, which matches every packet.
    pub fn new() -> MatchSet {
        MatchSet::default()
    }

    /// Adds a single match field, replacing one of the same kind.
    /// A field with an all-zero mask is a wildcard and is left out.
    pub fn add(&mut self, field: MatchField) -> &mut MatchSet {
        if field.is_wildcard() {
            self.fields.remove(&field.kind);
        }
        else {
            self.fields.insert(field.kind, field);
        }
        self
    }

    /// Builder flavour of `add`
    pub fn with(mut self, field: MatchField) -> MatchSet {
        self.add(field);
        self
    }

    /// Removes the field of the given kind, turning it into a wildcard
    pub fn remove(&mut self, kind: FieldKind) -> Option<MatchField> {
        self.fields.remove(&kind)
    }

    /// Gets the field of the given kind
    pub fn get(&self, kind: FieldKind) -> Option<&MatchField> {
        self.fields.get(&kind)
    }

    /// Number of non-wildcard fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if this match is a full wildcard
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates the fields in OXM code order
    pub fn iter(&self) -> btree_map::Values<FieldKind, MatchField> {
        self.fields.values()
    }

    /// Checks every field's encoding and prerequisites.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for field in self.iter() {
            field.validate()?;
            let satisfied = match field.kind.prerequisite() {
                None => true,
                Some(Prerequisite::Field(kind, values)) => {
                    self.get(kind).map_or(false, |p| p.exactly_one_of(values))
                }
                Some(Prerequisite::VlanPresent) => self.get(FieldKind::VlanVid).map_or(false, |v| {
                    // OFPVID_PRESENT is bit 4 of the first byte
                    v.mask_byte(0) & v.value[0] & 0x10 != 0
                }),
            };
            if !satisfied {
                return Err(ValidationError::BadPrerequisite(field.kind));
            }
        }
        Ok(())
    }

    /// Packet lookup: every field of this match is present in the packet
    /// and equal under the field's mask.
    pub fn matches(&self, packet: &PacketFields) -> bool {
        self.iter().all(|f| match packet.get(f.kind) {
            Some(value) => f.matches_value(value),
            None => false,
        })
    }

    /// `self` is at least as specific as `other`: every packet matching
    /// `self` also matches `other`.
    pub fn is_subset_of(&self, other: &MatchSet) -> bool {
        other.iter().all(|b| match self.get(b.kind) {
            Some(a) => a.narrows(b),
            None => false,
        })
    }

    /// There is at least one packet matching both `self` and `other`.
    pub fn overlaps(&self, other: &MatchSet) -> bool {
        self.iter().all(|a| match other.get(a.kind) {
            Some(b) => a.intersects(b),
            None => true,
        })
    }

    /// The same fields with the same masks and the same masked values
    pub fn is_identical(&self, other: &MatchSet) -> bool {
        self.len() == other.len()
            && self.iter().all(|a| other.get(a.kind).map_or(false, |b| a.same_as(b)))
    }
}

impl fmt::Display for MatchSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "*");
        }
        let mut first = true;
        for field in self.iter() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", field)?;
            first = false;
        }
        Ok(())
    }
}

/// The header fields extracted from one packet, used as a lookup key.
/// The frame length feeds the byte counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketFields {
    fields: BTreeMap<FieldKind, Vec<u8>>,
    frame_len: usize,
}

impl PacketFields {
    /// Constructs a packet view without any header field
    pub fn new(frame_len: usize) -> PacketFields {
        PacketFields {
            fields: BTreeMap::new(),
            frame_len,
        }
    }

    /// The frame length in bytes
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Sets a field's value
    pub fn set(&mut self, kind: FieldKind, value: Vec<u8>) -> Result<&mut PacketFields, ValidationError> {
        MatchField::check_len(kind, &value)?;
        self.fields.insert(kind, value);
        Ok(self)
    }

    /// Builder to set a field from an integer
    pub fn with_u64(mut self, kind: FieldKind, value: u64) -> PacketFields {
        self.fields.insert(kind, kind.encode(value));
        self
    }

    /// Builder to set a field from raw bytes
    pub fn with_bytes(mut self, kind: FieldKind, value: &[u8]) -> Result<PacketFields, ValidationError> {
        self.set(kind, value.to_vec())?;
        Ok(self)
    }

    /// Gets a field's value
    pub fn get(&self, kind: FieldKind) -> Option<&[u8]> {
        self.fields.get(&kind).map(|v| &v[..])
    }

    /// Gets a field's value as integer
    pub fn get_u64(&self, kind: FieldKind) -> Option<u64> {
        self.get(kind).map(decode_u64)
    }

    /// Removes a field, e.g. when a header is popped
    pub fn remove(&mut self, kind: FieldKind) -> Option<Vec<u8>> {
        self.fields.remove(&kind)
    }

    /// Iterates the present fields in OXM code order
    pub fn iter(&self) -> btree_map::Iter<FieldKind, Vec<u8>> {
        self.fields.iter()
    }

    /// Writes the bits of `value` selected by `mask` into an integer field
    pub(crate) fn write_masked_u64(&mut self, kind: FieldKind, value: u64, mask: u64) {
        let old = self.get_u64(kind).unwrap_or(0);
        let new = (old & !mask) | (value & mask);
        self.fields.insert(kind, kind.encode(new));
    }
}

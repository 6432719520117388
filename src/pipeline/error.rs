use pipeline::instructions::InstructionType;
use pipeline::matching::FieldKind;
use std::error;
use std::fmt;
use std::result;

/// A flow-mod that is rejected before the table is touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A value or mask does not have the field's width
    BadLength {
        kind: FieldKind,
        expected: usize,
        found: usize,
    },
    /// A value or mask has bits set beyond the field's significant bits
    BadValue(FieldKind),
    /// A mask on a field that cannot be masked
    BadMask(FieldKind),
    /// A value bit is set where the mask is zero
    BadWildcards(FieldKind),
    /// A field's prerequisite is missing from the match
    BadPrerequisite(FieldKind),
    /// The table does not exist
    BadTableId(u8),
    /// A goto-table does not point forward to an existing table
    BadGotoTable { table_id: u8, goto: u8 },
    /// A timeout exceeds the protocol maximum
    BadTimeout(u32),
    /// An instruction type occurs more than once
    DuplicateInstruction(InstructionType),
    /// An output to a port number that cannot be an output
    BadOutPort(u32),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ValidationError::BadLength {
                kind,
                expected,
                found,
            } => write!(f, "{} needs {} bytes, got {}", kind, expected, found),
            ValidationError::BadValue(k) => write!(f, "{} has bits set beyond its width", k),
            ValidationError::BadMask(k) => write!(f, "{} cannot be masked", k),
            ValidationError::BadWildcards(k) => {
                write!(f, "{} has value bits set outside its mask", k)
            }
            ValidationError::BadPrerequisite(k) => write!(f, "the prerequisite of {} is not met", k),
            ValidationError::BadTableId(t) => write!(f, "table {} does not exist", t),
            ValidationError::BadGotoTable { table_id, goto } => {
                write!(f, "table {} cannot go to table {}", table_id, goto)
            }
            ValidationError::BadTimeout(t) => write!(f, "timeout of {} seconds is too large", t),
            ValidationError::DuplicateInstruction(t) => {
                write!(f, "instruction {:?} occurs more than once", t)
            }
            ValidationError::BadOutPort(p) => write!(f, "port {} is no valid output port", p),
        }
    }
}

impl error::Error for ValidationError {
    fn description(&self) -> &str {
        "flow-mod validation error"
    }
}

/// All the ways a flow-mod can fail.
/// The table is left exactly as it was on any of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowModError {
    /// Malformed request
    Validation(ValidationError),
    /// ADD with check-overlap hit an overlapping entry
    Overlap { table_id: u8, priority: u16 },
    /// MODIFY_STRICT found no entry with the exact priority and match
    NotFound { table_id: u8, priority: u16 },
    /// The table holds its maximum number of entries
    TableFull { table_id: u8, max_entries: usize },
}

impl fmt::Display for FlowModError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FlowModError::Validation(ref e) => write!(f, "invalid flow-mod: {}", e),
            FlowModError::Overlap { table_id, priority } => write!(
                f,
                "flow with priority {} overlaps an existing flow in table {}",
                priority, table_id
            ),
            FlowModError::NotFound { table_id, priority } => write!(
                f,
                "no flow with priority {} and the given match in table {}",
                priority, table_id
            ),
            FlowModError::TableFull {
                table_id,
                max_entries,
            } => write!(f, "table {} is full ({} entries)", table_id, max_entries),
        }
    }
}

impl error::Error for FlowModError {
    fn description(&self) -> &str {
        "flow-mod error"
    }
}

impl From<ValidationError> for FlowModError {
    fn from(e: ValidationError) -> Self {
        FlowModError::Validation(e)
    }
}

pub type Result<T> = result::Result<T, FlowModError>;

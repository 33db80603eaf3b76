//! Record abstraction over typed vital-event records.
//!
//! The engine never owns production records: it sees them through the
//! [`VitalRecord`] trait, a narrow capability surface over whatever record
//! store holds the data. Fields are addressed by small integer indices
//! ([`FieldIndex`]) resolved once at configuration time from the per-type
//! constant modules ([`birth`], [`death`], [`marriage`]).
//!
//! [`MemoryRecord`] is the in-crate implementation used by tests and small
//! runs.

use serde::{Deserialize, Serialize};

/// Stable numeric identity of a record within a run.
pub type RecordId = u64;

/// Index of one logical attribute of a record type.
pub type FieldIndex = usize;

/// Sentinel strings treated as a missing field value, besides the empty string.
pub const MISSING_SENTINELS: [&str; 3] = ["missing", "--", "----"];

/// Whether a field value counts as missing for imputation purposes.
#[must_use]
pub fn is_missing(value: &str) -> bool {
    value.is_empty() || MISSING_SENTINELS.contains(&value)
}

/// Vital-event record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// Birth registration record
    Birth,
    /// Death registration record
    Death,
    /// Marriage registration record
    Marriage,
}

impl RecordType {
    /// Standard label string.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            RecordType::Birth => "birth",
            RecordType::Death => "death",
            RecordType::Marriage => "marriage",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// Capability surface exposed by the external record store.
///
/// Records are immutable once read by this engine. Implementations must
/// return the empty string for unpopulated fields rather than failing.
pub trait VitalRecord: Send + Sync {
    /// Read one field as a string. Out-of-range indices yield `""`.
    fn get_field(&self, index: FieldIndex) -> &str;

    /// The record's type tag.
    fn record_type(&self) -> RecordType;

    /// Stable numeric identity within the run.
    fn id(&self) -> RecordId;

    /// Standardized external identifier, used to address the record in the
    /// link graph store.
    fn standardized_id(&self) -> &str;
}

/// Field indices for birth records.
pub mod birth {
    #![allow(missing_docs)]

    use super::FieldIndex;

    pub const STANDARDISED_ID: FieldIndex = 0;
    pub const FORENAME: FieldIndex = 1;
    pub const SURNAME: FieldIndex = 2;
    pub const BIRTH_YEAR: FieldIndex = 3;
    pub const MOTHER_FORENAME: FieldIndex = 4;
    pub const MOTHER_MAIDEN_SURNAME: FieldIndex = 5;
    pub const FATHER_FORENAME: FieldIndex = 6;
    pub const FATHER_SURNAME: FieldIndex = 7;
    pub const PARENTS_PLACE_OF_MARRIAGE: FieldIndex = 8;
    pub const PARENTS_DAY_OF_MARRIAGE: FieldIndex = 9;
    pub const PARENTS_MONTH_OF_MARRIAGE: FieldIndex = 10;
    pub const PARENTS_YEAR_OF_MARRIAGE: FieldIndex = 11;
    pub const MOTHER_IDENTITY: FieldIndex = 12;
    pub const FATHER_IDENTITY: FieldIndex = 13;
    pub const PARENT_MARRIAGE_RECORD_IDENTITY: FieldIndex = 14;
    pub const MOTHER_BIRTH_RECORD_IDENTITY: FieldIndex = 15;
    pub const FATHER_BIRTH_RECORD_IDENTITY: FieldIndex = 16;

    /// Number of fields in a birth record.
    pub const FIELD_COUNT: usize = 17;
}

/// Field indices for death records.
pub mod death {
    #![allow(missing_docs)]

    use super::FieldIndex;

    pub const STANDARDISED_ID: FieldIndex = 0;
    pub const FORENAME: FieldIndex = 1;
    pub const SURNAME: FieldIndex = 2;
    pub const DEATH_YEAR: FieldIndex = 3;
    pub const AGE_AT_DEATH: FieldIndex = 4;
    pub const MOTHER_FORENAME: FieldIndex = 5;
    pub const MOTHER_MAIDEN_SURNAME: FieldIndex = 6;
    pub const FATHER_FORENAME: FieldIndex = 7;
    pub const FATHER_SURNAME: FieldIndex = 8;
    pub const MOTHER_IDENTITY: FieldIndex = 9;
    pub const FATHER_IDENTITY: FieldIndex = 10;
    pub const BIRTH_RECORD_IDENTITY: FieldIndex = 11;

    /// Number of fields in a death record.
    pub const FIELD_COUNT: usize = 12;
}

/// Field indices for marriage records.
pub mod marriage {
    #![allow(missing_docs)]

    use super::FieldIndex;

    pub const STANDARDISED_ID: FieldIndex = 0;
    pub const GROOM_FORENAME: FieldIndex = 1;
    pub const GROOM_SURNAME: FieldIndex = 2;
    pub const BRIDE_FORENAME: FieldIndex = 3;
    pub const BRIDE_MAIDEN_SURNAME: FieldIndex = 4;
    pub const PLACE_OF_MARRIAGE: FieldIndex = 5;
    pub const YEAR_OF_MARRIAGE: FieldIndex = 6;
    pub const GROOM_IDENTITY: FieldIndex = 7;
    pub const BRIDE_IDENTITY: FieldIndex = 8;
    pub const MARRIAGE_RECORD_IDENTITY: FieldIndex = 9;

    /// Number of fields in a marriage record.
    pub const FIELD_COUNT: usize = 10;
}

/// An owned record value backed by a plain field vector.
///
/// Used by tests and by callers whose record volumes fit in memory. Field 0
/// doubles as the standardized identifier by convention of the constant
/// modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    id: RecordId,
    record_type: RecordType,
    fields: Vec<String>,
}

impl MemoryRecord {
    /// Create a record with every field empty.
    #[must_use]
    pub fn empty(id: RecordId, record_type: RecordType) -> Self {
        let field_count = match record_type {
            RecordType::Birth => birth::FIELD_COUNT,
            RecordType::Death => death::FIELD_COUNT,
            RecordType::Marriage => marriage::FIELD_COUNT,
        };
        Self {
            id,
            record_type,
            fields: vec![String::new(); field_count],
        }
    }

    /// Set one field, returning self for chaining.
    #[must_use]
    pub fn with_field(mut self, index: FieldIndex, value: impl Into<String>) -> Self {
        if index < self.fields.len() {
            self.fields[index] = value.into();
        }
        self
    }

    /// Set one field in place.
    pub fn set_field(&mut self, index: FieldIndex, value: impl Into<String>) {
        if index < self.fields.len() {
            self.fields[index] = value.into();
        }
    }
}

impl VitalRecord for MemoryRecord {
    fn get_field(&self, index: FieldIndex) -> &str {
        self.fields.get(index).map_or("", String::as_str)
    }

    fn record_type(&self) -> RecordType {
        self.record_type
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn standardized_id(&self) -> &str {
        self.get_field(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_missing() {
        assert!(is_missing(""));
        assert!(is_missing("missing"));
        assert!(is_missing("--"));
        assert!(is_missing("----"));
        assert!(!is_missing("SMITH"));
        assert!(!is_missing("-"));
    }

    #[test]
    fn test_memory_record_fields() {
        let record = MemoryRecord::empty(7, RecordType::Birth)
            .with_field(birth::STANDARDISED_ID, "B100")
            .with_field(birth::FATHER_SURNAME, "NÄS");

        assert_eq!(record.id(), 7);
        assert_eq!(record.record_type(), RecordType::Birth);
        assert_eq!(record.standardized_id(), "B100");
        assert_eq!(record.get_field(birth::FATHER_SURNAME), "NÄS");
        assert_eq!(record.get_field(birth::MOTHER_FORENAME), "");
    }

    #[test]
    fn test_out_of_range_field_is_empty() {
        let record = MemoryRecord::empty(1, RecordType::Death);
        assert_eq!(record.get_field(999), "");
    }
}

//! Enum registry: name <-> small-integer code tables for tape and participant columns.
//!
//! Upstream reports tapes and participants as integer ids; storage keeps the same
//! compact codes in `UInt8` columns and the schema-management side renders the
//! names into `Enum8(...)` definitions. The registry is loaded once and only
//! read afterwards. A code that does not resolve means the registry is stale
//! relative to upstream, so lookups fail instead of defaulting.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::SchemaError;

/// Built-in tape table. Names can't contain commas (they end up in DDL).
const TAPES: &[(&str, u8)] = &[("A-NYSE", 1), ("B-ARCA", 2), ("C-NASD", 3)];

/// Built-in participant table.
const PARTICIPANTS: &[(&str, u8)] = &[
    ("None", 0),
    ("NYSE American LLC", 1),
    ("Nasdaq OMX BX Inc.", 2),
    ("NYSE National Inc.", 3),
    ("FINRA Alternative Display Facility", 4),
    ("Unlisted Trading Privileges", 5),
    ("International Securities Exchange LLC - Stocks", 6),
    ("Cboe EDGA", 7),
    ("Cboe EDGX", 8),
    ("NYSE Chicago Inc.", 9),
    ("New York Stock Exchange", 10),
    ("NYSE Arca Inc.", 11),
    ("Nasdaq", 12),
    ("Consolidated Tape Association", 13),
    ("Long-Term Stock Exchange", 14),
    ("Investors Exchange", 15),
    ("Cboe Stock Exchange", 16),
    ("Nasdaq Philadelphia Exchange LLC", 17),
    ("Cboe BYX", 18),
    ("Cboe BZX", 19),
    ("MIAX Pearl", 20),
    ("Members Exchange", 21),
    ("OTC Equity Security", 62),
];

/// Which enum column a table describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumKind {
    Tape,
    Participant,
}

impl fmt::Display for EnumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumKind::Tape => f.write_str("tape"),
            EnumKind::Participant => f.write_str("participant"),
        }
    }
}

/// Immutable bidirectional mapping for one enum column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumTable {
    kind: EnumKind,
    by_code: BTreeMap<u8, String>,
    by_name: HashMap<String, u8>,
}

impl EnumTable {
    /// Build a table from (name, code) pairs, rejecting duplicates and codes outside a byte.
    pub fn from_pairs<I, S>(kind: EnumKind, pairs: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut by_code = BTreeMap::new();
        let mut by_name = HashMap::new();

        for (name, code) in pairs {
            let name = name.into();
            let code = u8::try_from(code).map_err(|_| SchemaError::CodeOutOfRange {
                kind,
                name: name.clone(),
                code,
            })?;
            if by_code.contains_key(&code) {
                return Err(SchemaError::DuplicateCode { kind, code });
            }
            if by_name.contains_key(&name) {
                return Err(SchemaError::DuplicateName { kind, name });
            }
            by_code.insert(code, name.clone());
            by_name.insert(name, code);
        }

        Ok(Self {
            kind,
            by_code,
            by_name,
        })
    }

    fn from_static(kind: EnumKind, pairs: &[(&str, u8)]) -> Self {
        let by_code = pairs
            .iter()
            .map(|(name, code)| (*code, (*name).to_string()))
            .collect();
        let by_name = pairs
            .iter()
            .map(|(name, code)| ((*name).to_string(), *code))
            .collect();
        Self {
            kind,
            by_code,
            by_name,
        }
    }

    pub fn kind(&self) -> EnumKind {
        self.kind
    }

    /// Resolve an upstream code to its name.
    pub fn name(&self, code: i64) -> Result<&str, SchemaError> {
        u8::try_from(code)
            .ok()
            .and_then(|c| self.by_code.get(&c))
            .map(String::as_str)
            .ok_or(SchemaError::UnknownCode {
                kind: self.kind,
                code,
            })
    }

    /// Resolve a name to its storage code.
    pub fn code(&self, name: &str) -> Result<u8, SchemaError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SchemaError::UnknownName {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    /// Validate an upstream code and narrow it to its storage representation.
    pub fn storage_code(&self, code: i64) -> Result<u8, SchemaError> {
        self.name(code)?;
        // name() succeeded, so the code fits in a byte
        Ok(code as u8)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Entries in ascending code order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.by_code.iter().map(|(code, name)| (*code, name.as_str()))
    }

    /// Render `'name' = code,...` for an `Enum8(...)` column definition.
    pub fn enum_definition(&self) -> String {
        self.iter()
            .map(|(code, name)| format!("'{}' = {}", name.replace('\'', "\\'"), code))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    tapes: BTreeMap<String, i64>,
    participants: BTreeMap<String, i64>,
}

/// Tape and participant tables, passed explicitly to every component that translates codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumRegistry {
    tapes: EnumTable,
    participants: EnumTable,
}

impl EnumRegistry {
    pub fn new(tapes: EnumTable, participants: EnumTable) -> Self {
        Self {
            tapes,
            participants,
        }
    }

    /// Registry from the compiled-in tables.
    pub fn builtin() -> Self {
        Self {
            tapes: EnumTable::from_static(EnumKind::Tape, TAPES),
            participants: EnumTable::from_static(EnumKind::Participant, PARTICIPANTS),
        }
    }

    /// Load a registry from a YAML file with `tapes:` and `participants:` maps.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, SchemaError> {
        let file: RegistryFile =
            serde_yaml::from_str(content).map_err(|e| SchemaError::Registry(e.to_string()))?;
        Ok(Self {
            tapes: EnumTable::from_pairs(EnumKind::Tape, file.tapes)?,
            participants: EnumTable::from_pairs(EnumKind::Participant, file.participants)?,
        })
    }

    pub fn tapes(&self) -> &EnumTable {
        &self.tapes
    }

    pub fn participants(&self) -> &EnumTable {
        &self.participants
    }

    pub fn table(&self, kind: EnumKind) -> &EnumTable {
        match kind {
            EnumKind::Tape => &self.tapes,
            EnumKind::Participant => &self.participants,
        }
    }
}

impl Default for EnumRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

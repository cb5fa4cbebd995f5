use thiserror::Error;

use crate::enums::EnumKind;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("unknown {kind} enum code {code}")]
    UnknownCode { kind: EnumKind, code: i64 },

    #[error("unknown {kind} enum name '{name}'")]
    UnknownName { kind: EnumKind, name: String },

    #[error("duplicate {kind} enum code {code}")]
    DuplicateCode { kind: EnumKind, code: u8 },

    #[error("duplicate {kind} enum name '{name}'")]
    DuplicateName { kind: EnumKind, name: String },

    #[error("{kind} enum code {code} for '{name}' does not fit in a byte")]
    CodeOutOfRange {
        kind: EnumKind,
        name: String,
        code: i64,
    },

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

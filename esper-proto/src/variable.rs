//! Typed records for the HTTP variable interface.
//!
//! Everything here decodes from the node's JSON with serde; a missing
//! required field is a decode failure, never a silent default.

use std::fmt;

use serde::Deserialize;

/// Option bit: variable is readable.
pub const OPT_READ: u32 = 0x01;
/// Option bit: variable is writable.
pub const OPT_WRITE: u32 = 0x02;
/// Option bit: variable is hidden from listings.
pub const OPT_HIDDEN: u32 = 0x04;

/// Status bit: variable is locked against writes.
pub const STAT_LOCKED: u32 = 0x01;
/// Status bit: variable value has been saved to non-volatile storage.
pub const STAT_SAVED: u32 = 0x02;
/// Status bit: variable value changed since the last save.
pub const STAT_DIRTY: u32 = 0x04;

/// Element type of a variable, as carried in descriptor `type` fields.
/// Codes this crate does not know pass through as [`VarType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "u8")]
pub enum VarType {
    Null,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Sint8,
    Sint16,
    Sint32,
    Sint64,
    Float32,
    Float64,
    Ascii,
    Bool,
    Raw,
    Unknown(u8),
}

impl From<u8> for VarType {
    fn from(code: u8) -> Self {
        match code {
            0 => VarType::Null,
            1 => VarType::Uint8,
            2 => VarType::Uint16,
            3 => VarType::Uint32,
            4 => VarType::Uint64,
            5 => VarType::Sint8,
            6 => VarType::Sint16,
            7 => VarType::Sint32,
            8 => VarType::Sint64,
            9 => VarType::Float32,
            10 => VarType::Float64,
            11 => VarType::Ascii,
            12 => VarType::Bool,
            13 => VarType::Raw,
            other => VarType::Unknown(other),
        }
    }
}

impl VarType {
    pub fn code(self) -> u8 {
        match self {
            VarType::Null => 0,
            VarType::Uint8 => 1,
            VarType::Uint16 => 2,
            VarType::Uint32 => 3,
            VarType::Uint64 => 4,
            VarType::Sint8 => 5,
            VarType::Sint16 => 6,
            VarType::Sint32 => 7,
            VarType::Sint64 => 8,
            VarType::Float32 => 9,
            VarType::Float64 => 10,
            VarType::Ascii => 11,
            VarType::Bool => 12,
            VarType::Raw => 13,
            VarType::Unknown(code) => code,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VarType::Null => "null",
            VarType::Uint8 => "uint8",
            VarType::Uint16 => "uint16",
            VarType::Uint32 => "uint32",
            VarType::Uint64 => "uint64",
            VarType::Sint8 => "sint8",
            VarType::Sint16 => "sint16",
            VarType::Sint32 => "sint32",
            VarType::Sint64 => "sint64",
            VarType::Float32 => "float32",
            VarType::Float64 => "float64",
            VarType::Ascii => "ascii",
            VarType::Bool => "bool",
            VarType::Raw => "raw",
            VarType::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variable metadata returned by `read_var`. `data` is present only when the
/// request asked for element data.
#[derive(Debug, Clone, Deserialize)]
pub struct VariableDescriptor {
    pub id: u32,
    pub key: String,
    #[serde(rename = "type")]
    pub var_type: VarType,
    #[serde(rename = "opt")]
    pub options: u32,
    #[serde(rename = "stat")]
    pub status: u32,
    #[serde(rename = "len")]
    pub len: u64,
    pub max_req_size: u64,
    #[serde(rename = "d", default)]
    pub data: Option<serde_json::Value>,
}

impl VariableDescriptor {
    pub fn is_readable(&self) -> bool {
        self.options & OPT_READ != 0
    }

    pub fn is_writable(&self) -> bool {
        self.options & OPT_WRITE != 0
    }

    pub fn is_hidden(&self) -> bool {
        self.options & OPT_HIDDEN != 0
    }

    pub fn is_locked(&self) -> bool {
        self.status & STAT_LOCKED != 0
    }
}

/// Acknowledgement returned by a successful `write_var`.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteAck {
    pub mid: u32,
    pub id: u32,
    pub ts: u64,
    pub wc: u64,
    pub stat: u32,
}

/// Error body returned by the node on a failed request.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorReply {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub status: u32,
    pub code: u32,
    pub meaning: String,
    pub message: String,
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {}: {} ({})", self.status, self.meaning, self.code)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

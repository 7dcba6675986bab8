/// `scripting/value.rs` — values exchanged between the host and a Lua VM
///
/// `Value` is a closed set: the Lua primitives the host understands, plus an
/// opaque reference for everything else (tables, functions, userdata, ...).
/// Conversion to and from `mlua::Value` lives here so both the call path and
/// host-function bindings marshal the same way.
use std::fmt;

use mlua::Lua;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Lua `nil`, or "no value returned".
    None,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Address identity of a non-primitive Lua value. Never dereferenced.
    OpaqueRef(usize),
}

impl Value {
    /// Short kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::String(_) => "string",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::OpaqueRef(_) => "opaque reference",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view: integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert a value produced by the VM. Never fails: anything that is
    /// not a primitive collapses into `OpaqueRef`.
    pub(crate) fn from_lua(value: &mlua::Value) -> Self {
        match value {
            mlua::Value::Nil => Value::None,
            mlua::Value::Boolean(b) => Value::Bool(*b),
            mlua::Value::Integer(i) => Value::Int(*i),
            mlua::Value::Number(n) => Value::Float(*n),
            mlua::Value::String(s) => Value::String(s.to_string_lossy()),
            other => Value::OpaqueRef(other.to_pointer() as usize),
        }
    }

    /// Convert into a VM value. `None` becomes nil and `OpaqueRef` becomes
    /// light userdata carrying the same address.
    pub(crate) fn to_lua(&self, lua: &Lua) -> mlua::Result<mlua::Value> {
        Ok(match self {
            Value::None => mlua::Value::Nil,
            Value::String(s) => mlua::Value::String(lua.create_string(s)?),
            Value::Int(i) => mlua::Value::Integer(*i),
            Value::Float(f) => mlua::Value::Number(*f),
            Value::Bool(b) => mlua::Value::Boolean(*b),
            Value::OpaqueRef(addr) => {
                mlua::Value::LightUserData(mlua::LightUserData(*addr as *mut std::ffi::c_void))
            }
        })
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "nil"),
            Value::String(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::OpaqueRef(addr) => write!(f, "<ref {addr:#x}>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

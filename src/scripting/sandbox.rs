/// `scripting/sandbox.rs` — Lua state construction and engine configuration
///
/// Every script VM is created with a restricted set of standard libraries.
/// Dangerous libraries (io, os, package) are omitted unless the engine is
/// configured with a higher trust level.
use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib};
use serde::{Deserialize, Serialize};

/// Controls which Lua standard libraries are available to a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Default: string, table, math, coroutine, utf8. No I/O or OS
    Basic,
    /// Basic + io
    FileRead,
    /// Full safe standard library, only for trusted scripts
    Elevated,
}

impl Default for TrustLevel {
    fn default() -> Self {
        Self::Basic
    }
}

impl TrustLevel {
    pub fn std_libs(self) -> StdLib {
        let basic = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE | StdLib::UTF8;
        match self {
            TrustLevel::Basic => basic,
            TrustLevel::FileRead => basic | StdLib::IO,
            TrustLevel::Elevated => basic | StdLib::IO | StdLib::OS | StdLib::PACKAGE,
        }
    }
}

/// Settings applied to every script the engine loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub trust: TrustLevel,
    /// Upper bound on memory a single Lua state may allocate, in bytes.
    pub memory_limit: Option<usize>,
    /// Install the `log.info/warn/error` table into each VM.
    pub install_log_api: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trust: TrustLevel::Basic,
            memory_limit: None,
            install_log_api: true,
        }
    }
}

impl EngineConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("invalid engine config: {e}"))
    }
}

/// Creates a new Lua VM with sandbox restrictions applied.
pub fn create_sandboxed_vm(config: &EngineConfig) -> LuaResult<Lua> {
    let lua = Lua::new_with(config.trust.std_libs(), LuaOptions::default())?;

    if let Some(limit) = config.memory_limit {
        lua.set_memory_limit(limit)?;
    }

    Ok(lua)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

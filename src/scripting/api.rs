/// `scripting/api.rs` — host functions exposed to Lua
///
/// Host callables take and return marshaled `Value`s, so they never see an
/// `mlua` type. The built-in `log` table forwards script output to the `log`
/// facade under the script's filename.
use std::sync::Arc;

use mlua::{Lua, MultiValue, Result as LuaResult};

use super::value::Value;

/// A host function callable from Lua. Returning `Err` raises a Lua error
/// carrying the message.
pub type HostFunction = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Wrap a closure as a `HostFunction`.
pub fn host_fn<F>(f: F) -> HostFunction
where
    F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Bind `f` as global `name` in `lua`.
pub fn register_host_function(lua: &Lua, name: &str, f: HostFunction) -> LuaResult<()> {
    let func = lua.create_function(move |lua_ctx, args: MultiValue| {
        let args: Vec<Value> = args.iter().map(Value::from_lua).collect();
        let ret = f(&args).map_err(mlua::Error::RuntimeError)?;
        ret.to_lua(lua_ctx)
    })?;
    lua.globals().set(name, func)
}

// ── log ───────────────────────────────────────────────────────────────────────

pub fn register_log(lua: &Lua, script_name: &str) -> LuaResult<()> {
    let log_tbl = lua.create_table()?;

    macro_rules! log_fn {
        ($level:expr) => {{
            let script_name = script_name.to_string();
            lua.create_function(move |_, msg: String| {
                log::log!($level, "[script][{}] {}", script_name, msg);
                Ok(())
            })?
        }};
    }

    log_tbl.set("info", log_fn!(log::Level::Info))?;
    log_tbl.set("warn", log_fn!(log::Level::Warn))?;
    log_tbl.set("error", log_fn!(log::Level::Error))?;
    lua.globals().set("log", log_tbl)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// `scripting/vm.rs` — narrow wrapper over a single Lua state
///
/// `LuaVm` is the only place that touches `mlua` directly for script
/// execution. Call arguments are staged on a working frame before a call; the
/// frame's length is the VM's working depth, which callers snapshot with
/// `depth()` and roll back with `restore_depth()`.
///
/// Chunks and calls run through the base library's `pcall`, so a failure
/// surfaces as the raw error value the script raised rather than mlua's
/// rendered error with its traceback.
///
/// A `LuaVm` has no internal synchronisation story of its own: the owning
/// `Script` sits behind an `RwLock` and every mutating call needs the
/// exclusive side of it.
use mlua::{Function, Lua, MultiValue};

use super::{
    api::{register_host_function, register_log, HostFunction},
    error::{vm_error_text, CallResult, ScriptError, NULL_ERROR_TEXT},
    sandbox::{create_sandboxed_vm, EngineConfig},
    value::Value,
};

/// What a global name resolves to.
#[derive(Debug)]
pub enum Global {
    Absent,
    Function(Function),
    Other(&'static str),
}

pub struct LuaVm {
    lua: Lua,
    /// Captured at construction so scripts reassigning the global cannot
    /// change how calls are protected.
    pcall: Function,
    frame: Vec<mlua::Value>,
}

impl LuaVm {
    pub fn new(config: &EngineConfig) -> CallResult<Self> {
        let lua = create_sandboxed_vm(config).map_err(|e| ScriptError::Vm(vm_error_text(&e)))?;
        let pcall: Function = lua
            .globals()
            .get("pcall")
            .map_err(|e| ScriptError::Vm(vm_error_text(&e)))?;
        Ok(Self { lua, pcall, frame: Vec::new() })
    }

    /// Install the `log` table, tagging messages with `name`.
    pub fn install_log_api(&self, name: &str) -> CallResult<()> {
        register_log(&self.lua, name).map_err(|e| ScriptError::Vm(vm_error_text(&e)))
    }

    pub fn depth(&self) -> usize {
        self.frame.len()
    }

    /// Drop everything staged above `depth`.
    pub fn restore_depth(&mut self, depth: usize) {
        self.frame.truncate(depth);
    }

    /// Parse and run `source` as one top-level chunk.
    pub fn exec(&self, name: &str, source: &[u8]) -> CallResult<()> {
        let chunk = self
            .lua
            .load(source)
            .set_name(format!("@{name}"))
            .into_function()
            .map_err(|e| match e {
                mlua::Error::SyntaxError { .. } => ScriptError::Compile(vm_error_text(&e)),
                mlua::Error::MemoryError(_) => ScriptError::Vm(vm_error_text(&e)),
                _ => ScriptError::Runtime(vm_error_text(&e)),
            })?;
        self.protected_call(&chunk, MultiValue::new()).map(|_| ())
    }

    pub fn global(&self, name: &str) -> CallResult<Global> {
        let value: mlua::Value = self
            .lua
            .globals()
            .get(name)
            .map_err(|e| ScriptError::Vm(vm_error_text(&e)))?;
        Ok(match value {
            mlua::Value::Nil => Global::Absent,
            mlua::Value::Function(f) => Global::Function(f),
            other => Global::Other(other.type_name()),
        })
    }

    /// Stage one argument. Only string, integer, float and boolean are
    /// accepted; `index` is used for the error message.
    pub fn push(&mut self, index: usize, arg: &Value) -> CallResult<()> {
        let value = match arg {
            Value::String(s) => mlua::Value::String(
                self.lua
                    .create_string(s)
                    .map_err(|e| ScriptError::Vm(vm_error_text(&e)))?,
            ),
            Value::Int(i) => mlua::Value::Integer(*i),
            Value::Float(f) => mlua::Value::Number(*f),
            Value::Bool(b) => mlua::Value::Boolean(*b),
            Value::None | Value::OpaqueRef(_) => {
                return Err(ScriptError::UnsupportedArgument { index, kind: arg.kind() })
            }
        };
        self.frame.push(value);
        Ok(())
    }

    /// Call `function` with every argument staged above `base`, expecting
    /// exactly one result. The staged arguments are consumed.
    pub fn call(&mut self, function: &Function, base: usize) -> CallResult<Value> {
        let args: MultiValue = self.frame.drain(base..).collect();
        let ret = self.protected_call(function, args)?;
        Ok(Value::from_lua(&ret))
    }

    /// `pcall(function, args...)`, returning the first result on success
    /// and the error value's text on failure.
    fn protected_call(&self, function: &Function, args: MultiValue) -> CallResult<mlua::Value> {
        let args: MultiValue = std::iter::once(mlua::Value::Function(function.clone()))
            .chain(args)
            .collect();
        let mut results = self
            .pcall
            .call::<MultiValue>(args)
            .map_err(|e| ScriptError::Vm(vm_error_text(&e)))?
            .into_iter();
        let ok = matches!(results.next(), Some(mlua::Value::Boolean(true)));
        let value = results.next().unwrap_or(mlua::Value::Nil);
        if ok {
            Ok(value)
        } else {
            Err(self.error_from_value(value))
        }
    }

    /// Strings and numbers keep their text; any other error value (nil,
    /// tables, booleans) has none and becomes the `(null)` placeholder.
    fn error_from_value(&self, value: mlua::Value) -> ScriptError {
        if let mlua::Value::Error(err) = &value {
            return match err.as_ref() {
                mlua::Error::MemoryError(_) => ScriptError::Vm(vm_error_text(err)),
                other => ScriptError::Runtime(vm_error_text(other)),
            };
        }
        let text = match self.lua.coerce_string(value) {
            Ok(Some(s)) => s.to_string_lossy(),
            _ => String::new(),
        };
        if text.is_empty() {
            ScriptError::Runtime(NULL_ERROR_TEXT.to_string())
        } else {
            ScriptError::Runtime(text)
        }
    }

    pub fn register_function(&self, name: &str, f: HostFunction) -> CallResult<()> {
        register_host_function(&self.lua, name, f).map_err(|e| ScriptError::Vm(vm_error_text(&e)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

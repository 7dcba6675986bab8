/// `scripting/script.rs` — a single Lua script with its own VM
///
/// A `Script` is not thread-safe by itself. It is shared as a `ScriptHandle`
/// whose `RwLock` must be held for any access: `write()` for loading,
/// calling and binding functions, `read()` for queries.
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use super::{
    api::HostFunction,
    defer::Defer,
    error::{CallResult, ScriptError},
    sandbox::EngineConfig,
    value::Value,
    vm::{Global, LuaVm},
};

pub struct Script {
    filename: PathBuf,
    buffer: Vec<u8>,
    loaded: bool,
    install_log_api: bool,
    vm: LuaVm,
}

impl Script {
    pub fn new(config: &EngineConfig) -> CallResult<Self> {
        Ok(Self {
            filename: PathBuf::new(),
            buffer: Vec::new(),
            loaded: false,
            install_log_api: config.install_log_api,
            vm: LuaVm::new(config)?,
        })
    }

    /// Sets the script's identity. Needs to happen before `load()` and can
    /// only happen once.
    ///
    /// The `log` table is installed here, tagged with the filename, so that
    /// host functions bound afterwards can replace it.
    pub fn set_filename(&mut self, filename: impl Into<PathBuf>) -> CallResult<()> {
        if self.loaded {
            return Err(ScriptError::InvalidScript("script is already loaded".into()));
        }
        if !self.filename.as_os_str().is_empty() {
            return Err(ScriptError::InvalidScript("script filename is already set".into()));
        }
        let filename = filename.into();
        if self.install_log_api && !filename.as_os_str().is_empty() {
            self.vm.install_log_api(&filename.display().to_string())?;
        }
        self.filename = filename;
        Ok(())
    }

    /// Sets the Lua source. Needs to happen before `load()`.
    pub fn set_buffer(&mut self, buffer: Vec<u8>) -> CallResult<()> {
        if self.loaded {
            return Err(ScriptError::InvalidScript("script is already loaded".into()));
        }
        self.buffer = buffer;
        Ok(())
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Runs the buffer's top-level chunk once, binding whatever globals it
    /// defines.
    pub fn load(&mut self) -> CallResult<()> {
        if self.loaded {
            return Err(ScriptError::AlreadyLoaded);
        }
        if self.filename.as_os_str().is_empty() {
            return Err(ScriptError::InvalidScript("script has no filename".into()));
        }
        if self.buffer.is_empty() {
            return Err(ScriptError::InvalidScript("script buffer is empty".into()));
        }

        let name = self.filename.display().to_string();
        self.vm.exec(&name, &self.buffer)?;
        self.loaded = true;
        log::debug!("[script] loaded {name}");
        Ok(())
    }

    pub fn has_function_with_name(&self, name: &str) -> bool {
        matches!(self.vm.global(name), Ok(Global::Function(_)))
    }

    /// Calls global function `name` with `args` and returns its first result.
    ///
    /// Only string, integer, float and boolean arguments can be passed. Any
    /// non-primitive return value comes back as `Value::OpaqueRef`. The VM's
    /// working depth is the same after this returns as before, whatever the
    /// outcome.
    pub fn call_function(&mut self, name: &str, args: &[Value]) -> CallResult<Value> {
        if !self.loaded {
            return Err(ScriptError::NotLoaded);
        }

        let base = self.vm.depth();
        let mut vm = Defer::new(&mut self.vm, move |vm| vm.restore_depth(base));

        let function = match vm.global(name)? {
            Global::Function(f) => f,
            Global::Absent => return Err(ScriptError::NoSuchFunction(name.to_string())),
            Global::Other(_) => return Err(ScriptError::NotCallable(name.to_string())),
        };
        for (index, arg) in args.iter().enumerate() {
            vm.push(index, arg)?;
        }
        vm.call(&function, base)
    }

    /// Binds a host function as global `name` in this script's VM.
    pub fn register_function(&self, name: &str, f: HostFunction) -> CallResult<()> {
        self.vm.register_function(name, f)
    }

    #[cfg(test)]
    pub(crate) fn working_depth(&self) -> usize {
        self.vm.depth()
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("filename", &self.filename)
            .field("buffer_len", &self.buffer.len())
            .field("loaded", &self.loaded)
            .finish()
    }
}

// ── ScriptHandle ──────────────────────────────────────────────────────────────

struct Shared {
    path: PathBuf,
    script: RwLock<Script>,
}

/// Shared ownership of a script. Stays valid after the script is unloaded
/// from the engine; the Lua state closes when the last handle drops.
#[derive(Clone)]
pub struct ScriptHandle {
    inner: Arc<Shared>,
}

impl ScriptHandle {
    pub fn new(script: Script) -> Self {
        Self {
            inner: Arc::new(Shared {
                path: script.filename().to_path_buf(),
                script: RwLock::new(script),
            }),
        }
    }

    /// Canonical path the script was registered under.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Shared lock on the script.
    pub fn read(&self) -> RwLockReadGuard<'_, Script> {
        self.inner.script.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive lock on the script. Required for any call into its VM.
    pub fn write(&self) -> RwLockWriteGuard<'_, Script> {
        self.inner.script.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn call_function(&self, name: &str, args: &[Value]) -> CallResult<Value> {
        self.write().call_function(name, args)
    }

    pub fn has_function_with_name(&self, name: &str) -> bool {
        self.read().has_function_with_name(name)
    }

    pub fn ptr_eq(&self, other: &ScriptHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScriptHandle").field(&self.inner.path).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::error::NULL_ERROR_TEXT;

    fn loaded(source: &str) -> Script {
        let mut script = Script::new(&EngineConfig::default()).unwrap();
        script.set_filename("/scripts/test.lua").unwrap();
        script.set_buffer(source.as_bytes().to_vec()).unwrap();
        script.load().unwrap();
        script
    }

    // ── load ─────────────────────────────────────────────────────────────

    #[test]
    fn load_requires_filename_and_buffer() {
        let mut script = Script::new(&EngineConfig::default()).unwrap();
        script.set_buffer(b"x = 1".to_vec()).unwrap();
        assert!(matches!(script.load(), Err(ScriptError::InvalidScript(_))));

        let mut script = Script::new(&EngineConfig::default()).unwrap();
        script.set_filename("/scripts/empty.lua").unwrap();
        assert!(matches!(script.load(), Err(ScriptError::InvalidScript(_))));
        assert!(!script.is_loaded());
    }

    #[test]
    fn second_load_fails_and_keeps_state() {
        let mut script = loaded("counter = 0 function bump() counter = counter + 1 return counter end");
        assert_eq!(script.load(), Err(ScriptError::AlreadyLoaded));
        assert!(script.is_loaded());
        // the chunk did not run again
        assert_eq!(script.call_function("bump", &[]).unwrap(), Value::Int(1));
    }

    #[test]
    fn compile_error_leaves_unit_unloaded() {
        let mut script = Script::new(&EngineConfig::default()).unwrap();
        script.set_filename("/scripts/bad.lua").unwrap();
        script.set_buffer(b"function broken(".to_vec()).unwrap();
        let err = script.load().unwrap_err();
        assert!(matches!(err, ScriptError::Compile(_)), "got {err:?}");
        assert!(err.to_string().starts_with("load error"));
        assert!(!script.is_loaded());
    }

    #[test]
    fn top_level_runtime_error_is_reported_verbatim() {
        let mut script = Script::new(&EngineConfig::default()).unwrap();
        script.set_filename("/scripts/throws.lua").unwrap();
        script.set_buffer(b"error('top level failure')".to_vec()).unwrap();
        match script.load() {
            Err(ScriptError::Runtime(msg)) => {
                assert_eq!(msg, "/scripts/throws.lua:1: top level failure")
            }
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn setters_refuse_after_load() {
        let mut script = loaded("x = 1");
        assert!(script.set_buffer(b"x = 2".to_vec()).is_err());
        assert!(script.set_filename("/elsewhere.lua").is_err());
        assert_eq!(script.buffer(), b"x = 1");
        assert_eq!(script.filename(), Path::new("/scripts/test.lua"));
    }

    // ── call_function ────────────────────────────────────────────────────

    #[test]
    fn call_before_load_fails() {
        let mut script = Script::new(&EngineConfig::default()).unwrap();
        assert_eq!(script.call_function("f", &[]), Err(ScriptError::NotLoaded));
    }

    #[test]
    fn missing_function_then_valid_call() {
        let mut script = loaded("function ok() return true end");
        assert_eq!(
            script.call_function("nope", &[]),
            Err(ScriptError::NoSuchFunction("nope".into()))
        );
        assert_eq!(script.working_depth(), 0);
        assert_eq!(script.call_function("ok", &[]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn non_function_global_is_not_callable() {
        let mut script = loaded("answer = 42");
        let err = script.call_function("answer", &[]).unwrap_err();
        assert_eq!(err.to_string(), "attempt to call object that isn't a function");
        assert!(!script.has_function_with_name("answer"));
    }

    #[test]
    fn unsupported_argument_never_reaches_the_function() {
        let mut script = loaded(
            "calls = 0
             function record(...) calls = calls + 1 return calls end
             function count() return calls end",
        );
        let err = script
            .call_function("record", &[Value::Int(1), Value::None])
            .unwrap_err();
        assert_eq!(err, ScriptError::UnsupportedArgument { index: 1, kind: "none" });
        assert_eq!(script.working_depth(), 0, "staged args must be rolled back");
        assert_eq!(script.call_function("count", &[]).unwrap(), Value::Int(0));

        assert!(script.call_function("record", &[Value::OpaqueRef(1)]).is_err());
        assert_eq!(script.call_function("count", &[]).unwrap(), Value::Int(0));
    }

    #[test]
    fn primitives_round_trip() {
        let mut script = loaded("function echo(v) return v end");
        for value in [
            Value::from("hello"),
            Value::Int(42),
            Value::Float(3.5),
            Value::Bool(true),
        ] {
            let back = script.call_function("echo", std::slice::from_ref(&value)).unwrap();
            assert_eq!(back, value, "round trip changed {value:?}");
        }
        assert_eq!(script.call_function("echo", &[]).unwrap(), Value::None);
    }

    #[test]
    fn only_first_return_value_is_kept() {
        let mut script = loaded("function pair(a, b) return b, a end");
        let ret = script
            .call_function("pair", &[Value::Int(1), Value::from("two")])
            .unwrap();
        assert_eq!(ret, Value::from("two"));
    }

    #[test]
    fn tables_come_back_as_opaque_refs() {
        let mut script = loaded("shared = {} function get() return shared end");
        let a = script.call_function("get", &[]).unwrap();
        let b = script.call_function("get", &[]).unwrap();
        assert!(matches!(a, Value::OpaqueRef(_)));
        assert_eq!(a, b, "the same table should keep its identity");
    }

    #[test]
    fn runtime_error_in_call_keeps_vm_usable() {
        let mut script = loaded(
            "function boom(msg) error(msg) end
             function fine() return 'fine' end",
        );
        match script.call_function("boom", &[Value::from("exploded")]) {
            Err(ScriptError::Runtime(msg)) => assert!(msg.contains("exploded"), "got {msg}"),
            other => panic!("expected runtime error, got {other:?}"),
        }
        assert_eq!(script.working_depth(), 0);
        assert_eq!(script.call_function("fine", &[]).unwrap(), Value::from("fine"));
    }

    #[test]
    fn call_error_text_is_the_raised_message() {
        let mut script = loaded(
            "function bare() error('kaboom', 0) end
             function numeric() error(7, 0) end",
        );
        assert_eq!(script.call_function("bare", &[]), Err(ScriptError::Runtime("kaboom".into())));
        assert_eq!(script.call_function("numeric", &[]), Err(ScriptError::Runtime("7".into())));
        assert_eq!(
            script.call_function("bare", &[]).unwrap_err().to_string(),
            "runtime error: kaboom"
        );
    }

    #[test]
    fn error_without_text_uses_null_placeholder() {
        let mut script = loaded(
            "function nothing() error(nil) end
             function tabled() error({}) end
             function empty() error('', 0) end",
        );
        for name in ["nothing", "tabled", "empty"] {
            assert_eq!(
                script.call_function(name, &[]),
                Err(ScriptError::Runtime(NULL_ERROR_TEXT.into())),
                "{name} raised no text"
            );
            assert_eq!(script.working_depth(), 0);
        }

        let mut top = Script::new(&EngineConfig::default()).unwrap();
        top.set_filename("/scripts/nil.lua").unwrap();
        top.set_buffer(b"error(nil)".to_vec()).unwrap();
        assert_eq!(top.load(), Err(ScriptError::Runtime(NULL_ERROR_TEXT.into())));
        assert!(!top.is_loaded());
    }

    #[test]
    fn log_table_exists_once_filename_is_set() {
        let mut script = Script::new(&EngineConfig::default()).unwrap();
        assert!(matches!(script.vm.global("log").unwrap(), Global::Absent));
        script.set_filename("/scripts/logged.lua").unwrap();
        assert!(matches!(script.vm.global("log").unwrap(), Global::Other("table")));

        let quiet = EngineConfig { install_log_api: false, ..EngineConfig::default() };
        let mut script = Script::new(&quiet).unwrap();
        script.set_filename("/scripts/quiet.lua").unwrap();
        assert!(matches!(script.vm.global("log").unwrap(), Global::Absent));
    }

    // ── ScriptHandle ─────────────────────────────────────────────────────

    #[test]
    fn handle_exposes_path_and_locks() {
        let handle = ScriptHandle::new(loaded("function twice(x) return x * 2 end"));
        assert_eq!(handle.path(), Path::new("/scripts/test.lua"));
        assert!(handle.has_function_with_name("twice"));
        assert_eq!(handle.call_function("twice", &[Value::Int(21)]).unwrap(), Value::Int(42));

        let clone = handle.clone();
        assert!(clone.ptr_eq(&handle));
        assert!(clone.read().is_loaded());
    }
}

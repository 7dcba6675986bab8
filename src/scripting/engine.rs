/// `scripting/engine.rs` — script registry and fan-out calls
///
/// `Engine` owns every loaded script, keyed by canonical path, behind one
/// `RwLock`. Lookups and broadcasts take it shared; load, unload and global
/// function registration take it exclusive. Each script keeps its own lock,
/// always acquired after the registry lock.
///
/// All methods are thread-safe; share the engine with `Arc<Engine>`.
use std::{
    collections::HashMap,
    ops::BitOr,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use super::{
    api::HostFunction,
    error::{CallResult, ScriptError},
    sandbox::EngineConfig,
    script::{Script, ScriptHandle},
    source::{canonical_key, read_source},
    value::Value,
};

// ── Call flags ────────────────────────────────────────────────────────────────

/// Options for `Engine::call_in_all_scripts`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallFlags(u8);

impl CallFlags {
    pub const NONE: Self = Self(0);
    /// Skip scripts that don't define the function instead of reporting an
    /// error for them.
    pub const IGNORE_NOT_EXISTS: Self = Self(1 << 0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CallFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ── Broadcast result ──────────────────────────────────────────────────────────

/// Outcome of a fan-out call: one entry per script that was called.
#[derive(Debug)]
pub struct Broadcast {
    /// Canonical path → that script's result. Iteration order is unspecified.
    pub results: HashMap<PathBuf, CallResult<Value>>,
    all_ok: bool,
}

impl Broadcast {
    /// True iff every recorded call succeeded (vacuously true when empty).
    pub fn all_ok(&self) -> bool {
        self.all_ok
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&CallResult<Value>> {
        self.results.get(path.as_ref())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &ScriptError)> + '_ {
        self.results
            .iter()
            .filter_map(|(path, result)| result.as_ref().err().map(|e| (path.as_path(), e)))
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Registry {
    scripts: Vec<ScriptHandle>,
    /// Every host function registered so far, in order. Replayed into
    /// scripts loaded later.
    functions: Vec<(String, HostFunction)>,
}

impl Registry {
    fn find(&self, path: &Path) -> Option<&ScriptHandle> {
        self.scripts.iter().find(|s| s.path() == path)
    }
}

#[derive(Default)]
pub struct Engine {
    config: EngineConfig,
    registry: RwLock<Registry>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self { config, registry: RwLock::default() }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the script at `path`, runs its top-level chunk and registers it.
    ///
    /// The script is only visible to other callers once it has loaded
    /// successfully. A failed load leaves the registry unchanged.
    pub fn load_script(&self, path: impl AsRef<Path>) -> CallResult<ScriptHandle> {
        let source = read_source(path.as_ref())?;
        if self.read().find(&source.path).is_some() {
            return Err(ScriptError::AlreadyRegistered(source.path));
        }

        // Snapshot the host functions, then build and run the script without
        // holding the registry lock.
        let functions: Vec<(String, HostFunction)> = self.read().functions.clone();

        let mut script = Script::new(&self.config)?;
        script.set_filename(source.path.clone())?;
        script.set_buffer(source.bytes)?;
        for (name, f) in &functions {
            script.register_function(name, f.clone())?;
        }
        if let Err(e) = script.load() {
            log::warn!("[engine] failed to load {}: {e}", source.path.display());
            return Err(e);
        }

        let handle = ScriptHandle::new(script);
        let mut registry = self.write();
        if registry.find(&source.path).is_some() {
            return Err(ScriptError::AlreadyRegistered(source.path));
        }
        // functions registered while this script was loading
        for (name, f) in &registry.functions[functions.len()..] {
            handle.write().register_function(name, f.clone())?;
        }
        registry.scripts.push(handle.clone());
        drop(registry);

        log::info!("[engine] loaded {}", source.path.display());
        Ok(handle)
    }

    /// Whether a script with this path is currently registered.
    pub fn is_loaded(&self, path: impl AsRef<Path>) -> bool {
        self.get_script_by_name(path).is_some()
    }

    /// `None` if nothing was found.
    pub fn get_script_by_name(&self, path: impl AsRef<Path>) -> Option<ScriptHandle> {
        let key = canonical_key(path.as_ref());
        self.read().find(&key).cloned()
    }

    /// Removes the script from the engine. Other handles to it stay usable.
    pub fn unload_script(&self, script: &ScriptHandle) -> bool {
        let mut registry = self.write();
        let before = registry.scripts.len();
        registry.scripts.retain(|s| !s.ptr_eq(script));
        let removed = registry.scripts.len() != before;
        if removed {
            log::info!("[engine] unloaded {}", script.path().display());
        }
        removed
    }

    pub fn unload_script_by_name(&self, path: impl AsRef<Path>) -> bool {
        let key = canonical_key(path.as_ref());
        let mut registry = self.write();
        let Some(index) = registry.scripts.iter().position(|s| s.path() == key) else {
            return false;
        };
        registry.scripts.remove(index);
        log::info!("[engine] unloaded {}", key.display());
        true
    }

    pub fn len(&self) -> usize {
        self.read().scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().scripts.is_empty()
    }

    /// Snapshot of the registered scripts, in load order.
    pub fn scripts(&self) -> Vec<ScriptHandle> {
        self.read().scripts.clone()
    }

    /// Calls `function_name` in every registered script.
    ///
    /// The registry stays share-locked for the whole broadcast, so scripts
    /// loaded or unloaded concurrently don't change the set being called.
    /// A failing script never stops the remaining calls.
    pub fn call_in_all_scripts(
        &self,
        function_name: &str,
        args: &[Value],
        flags: CallFlags,
    ) -> Broadcast {
        let registry = self.read();
        let mut broadcast = Broadcast { results: HashMap::new(), all_ok: true };

        for handle in &registry.scripts {
            let mut script = handle.write();
            if flags.contains(CallFlags::IGNORE_NOT_EXISTS)
                && !script.has_function_with_name(function_name)
            {
                continue;
            }
            let result = script.call_function(function_name, args);
            drop(script);

            if let Err(e) = &result {
                log::warn!("[engine] {}: {function_name}: {e}", handle.path().display());
                broadcast.all_ok = false;
            }
            broadcast.results.insert(handle.path().to_path_buf(), result);
        }

        broadcast
    }

    /// Registers `f` as global `name` in every registered script and in every
    /// script loaded afterwards. All scripts are attempted; the first error
    /// is returned.
    pub fn register_global_function(&self, name: &str, f: HostFunction) -> CallResult<()> {
        let mut registry = self.write();
        let mut first_err = None;
        for handle in &registry.scripts {
            if let Err(e) = handle.write().register_function(name, f.clone()) {
                log::warn!("[engine] could not bind {name} in {}: {e}", handle.path().display());
                first_err.get_or_insert(e);
            }
        }
        registry.functions.push((name.to_string(), f));
        first_err.map_or(Ok(()), Err)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

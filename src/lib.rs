pub mod scripting;

pub use scripting::{
    api::{host_fn, HostFunction},
    engine::{Broadcast, CallFlags, Engine},
    error::{CallResult, ScriptError},
    sandbox::{EngineConfig, TrustLevel},
    script::{Script, ScriptHandle},
    value::Value,
};

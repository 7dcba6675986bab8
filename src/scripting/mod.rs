/// `scripting/` — Lua script registry
///
/// Each script runs in its own isolated Lua VM (mlua).
/// The `Engine` owns every loaded script and broadcasts function calls into
/// all of them; a failing script is reported, never fatal to the others.
pub mod api;
pub mod defer;
pub mod engine;
pub mod error;
pub mod sandbox;
pub mod script;
pub mod source;
pub mod value;
pub mod vm;

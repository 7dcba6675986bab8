/// `scripting/error.rs` — error type shared by scripts and the engine
///
/// Every fallible operation returns `CallResult<T>`. Errors render as plain
/// text so callers can log or display them without matching on the variant.
use std::path::PathBuf;

use thiserror::Error;

pub type CallResult<T> = Result<T, ScriptError>;

/// Placeholder used when the VM reports an error without any text.
pub const NULL_ERROR_TEXT: &str = "(null)";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    // ── I/O (before any VM exists) ────────────────────────────────────────
    #[error("file does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("given path is not a file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("could not open file {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },
    #[error("error reading file {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    // ── Input validation ──────────────────────────────────────────────────
    /// Missing filename or buffer, or mutation after load.
    #[error("{0}")]
    InvalidScript(String),
    #[error("already loaded")]
    AlreadyLoaded,
    /// Another unit with the same canonical path is registered.
    #[error("script is already registered: {}", .0.display())]
    AlreadyRegistered(PathBuf),
    #[error("script was never loaded")]
    NotLoaded,
    #[error("no such function \"{0}\"")]
    NoSuchFunction(String),
    #[error("attempt to call object that isn't a function")]
    NotCallable(String),
    #[error("argument #{} has unsupported type {kind}", index + 1)]
    UnsupportedArgument { index: usize, kind: &'static str },

    // ── VM ────────────────────────────────────────────────────────────────
    #[error("load error: {0}")]
    Compile(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    /// VM construction or allocation failure.
    #[error("lua state error: {0}")]
    Vm(String),
}

impl ScriptError {
    /// Text used as the human-readable message.
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn is_runtime(&self) -> bool {
        matches!(self, ScriptError::Runtime(_))
    }
}

/// Extract the VM's own text from an `mlua` error.
///
/// Callback errors are unwrapped to their cause so a host function's message
/// reaches the caller without the traceback wrapper.
pub(crate) fn vm_error_text(err: &mlua::Error) -> String {
    let text = match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::CallbackError { cause, .. } => vm_error_text(cause),
        mlua::Error::MemoryError(msg) => msg.clone(),
        mlua::Error::WithContext { cause, .. } => vm_error_text(cause),
        other => other.to_string(),
    };
    if text.is_empty() {
        NULL_ERROR_TEXT.to_string()
    } else {
        text
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

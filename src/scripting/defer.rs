/// `scripting/defer.rs` — run-on-exit guard
///
/// `Defer` owns a value and runs a closure on it when the guard goes out of
/// scope, on every exit path including `?` returns and unwinding. The value
/// stays usable through `Deref`/`DerefMut` while the guard is alive, so a
/// guard can wrap `&mut LuaVm` and still let the body drive the VM.
use std::ops::{Deref, DerefMut};

pub struct Defer<T, F>
where
    F: FnOnce(&mut T),
{
    value: T,
    on_exit: Option<F>,
}

impl<T, F> Defer<T, F>
where
    F: FnOnce(&mut T),
{
    pub fn new(value: T, on_exit: F) -> Self {
        Self { value, on_exit: Some(on_exit) }
    }
}

/// Guard without a carried value: `let _close = defer(|| ...);`
pub fn defer<F: FnOnce()>(f: F) -> Defer<(), impl FnOnce(&mut ())> {
    Defer::new((), move |_| f())
}

impl<T, F> Deref for Defer<T, F>
where
    F: FnOnce(&mut T),
{
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T, F> DerefMut for Defer<T, F>
where
    F: FnOnce(&mut T),
{
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T, F> Drop for Defer<T, F>
where
    F: FnOnce(&mut T),
{
    fn drop(&mut self) {
        if let Some(on_exit) = self.on_exit.take() {
            on_exit(&mut self.value);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn runs_at_scope_end() {
        let ran = Cell::new(false);
        {
            let _guard = defer(|| ran.set(true));
            assert!(!ran.get(), "must not run before scope end");
        }
        assert!(ran.get(), "must run at scope end");
    }

    #[test]
    fn runs_on_early_error_return() {
        fn work(stack: &mut Vec<i32>, fail: bool) -> Result<(), String> {
            let depth = stack.len();
            let mut stack = Defer::new(stack, move |s| s.truncate(depth));
            stack.push(1);
            stack.push(2);
            if fail {
                return Err("boom".into());
            }
            stack.push(3);
            Ok(())
        }

        let mut stack = vec![0];
        assert!(work(&mut stack, true).is_err());
        assert_eq!(stack, vec![0], "error path should restore depth");
        assert!(work(&mut stack, false).is_ok());
        assert_eq!(stack, vec![0], "success path should restore depth");
    }
}

//! Panic reporting through `tracing`.
//!
//! Probe panics are already caught by the probe runner; this hook covers
//! everything else, such as a panic inside the engine or a worker task.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, PanicHookInfo};
use std::thread;

/// Install a hook that logs the panic as a structured event on
/// `warden::panic`, then hands over to the previously installed hook.
pub fn install() {
    let previous = panic::take_hook();

    panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        // Logging must never turn a panic into an abort.
        let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| report(info)));
        previous(info);
    }));
}

fn report(info: &PanicHookInfo<'_>) {
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let current = thread::current();
    let thread_name = current.name().unwrap_or("unnamed");

    tracing::error!(
        target: "warden::panic",
        thread = thread_name,
        location = %location,
        payload = payload_str(info.payload()).unwrap_or("non-string payload"),
        backtrace = %Backtrace::capture(),
        "Supervisor panicked"
    );
}

/// The message carried by a panic payload, if it is a string.
pub fn payload_str(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return Some(*s);
    }
    payload.downcast_ref::<String>().map(String::as_str)
}

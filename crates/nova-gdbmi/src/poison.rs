use std::panic::Location;
use std::sync::{Mutex, MutexGuard};

/// Lock a session table, recovering from poisoning.
///
/// A panic inside one caller must not wedge the whole debug session, so the
/// recovered guard is used after logging where the poison was observed.
#[track_caller]
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, context: &'static str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(err) => {
            let loc = Location::caller();
            tracing::error!(
                target: "nova.gdbmi",
                context,
                file = loc.file(),
                line = loc.line(),
                error = %err,
                "session table mutex poisoned; continuing with recovered guard"
            );
            err.into_inner()
        }
    }
}

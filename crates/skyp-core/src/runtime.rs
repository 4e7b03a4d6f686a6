//! Capabilities the core consumes from its host: OS integration and a
//! status sink, plus the generic retry helper used around locked files.

use std::thread;
use std::time::Duration;
use tracing::info;

/// Runs `func` up to `count` times, sleeping between failed attempts.
///
/// Returns the first success, or the last error once attempts run out.
/// A `count` of zero still makes one attempt.
pub fn try_until<T, E, F>(mut func: F, count: usize, sleep: Duration) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
{
    let attempts = count.max(1);
    let mut tries = 0;
    loop {
        tries += 1;
        match func() {
            Ok(value) => return Ok(value),
            Err(err) if tries >= attempts => return Err(err),
            Err(_) => {
                if !sleep.is_zero() {
                    thread::sleep(sleep);
                }
            }
        }
    }
}

/// "1 message", "3 messages".
pub fn plural(word: &str, count: usize) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// Control over the Skype client holding a database file lock.
pub trait OsHandler: Send + Sync {
    fn launch(&self) -> bool;
    fn shutdown(&self) -> bool;
    fn is_running(&self) -> bool;
}

/// Handler for hosts without a client to control.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOsHandler;

impl OsHandler for NoopOsHandler {
    fn launch(&self) -> bool {
        false
    }

    fn shutdown(&self) -> bool {
        false
    }

    fn is_running(&self) -> bool {
        false
    }
}

/// Diagnostic and user-facing progress messages.
pub trait StatusSink: Send + Sync {
    fn log(&self, message: &str);
    fn status(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn log(&self, message: &str) {
        info!(event = "log", "{message}");
    }

    fn status(&self, message: &str) {
        info!(event = "status", "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn try_until_stops_at_first_success() {
        let calls = Cell::new(0);
        let result: Result<usize, &str> = try_until(
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err("locked")
                } else {
                    Ok(calls.get())
                }
            },
            5,
            Duration::ZERO,
        );
        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn try_until_returns_last_error_when_exhausted() {
        let calls = Cell::new(0);
        let result: Result<(), String> = try_until(
            || {
                calls.set(calls.get() + 1);
                Err(format!("attempt {}", calls.get()))
            },
            2,
            Duration::ZERO,
        );
        assert_eq!(result, Err("attempt 2".to_string()));
    }

    #[test]
    fn try_until_with_zero_count_tries_once() {
        let calls = Cell::new(0);
        let _: Result<(), ()> = try_until(
            || {
                calls.set(calls.get() + 1);
                Err(())
            },
            0,
            Duration::ZERO,
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn plural_handles_singular() {
        assert_eq!(plural("message", 1), "1 message");
        assert_eq!(plural("new participant", 3), "3 new participants");
        assert_eq!(plural("chat", 0), "0 chats");
    }
}

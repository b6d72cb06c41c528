//! The admission algorithms
//!
//! Each engine owns its Lua script, its constructor, and its reply-parsing
//! logic. The helpers here are the shared parsing discipline: every field
//! read out of a script reply either coerces cleanly or produces a protocol
//! error identifying the failing position.

pub mod sliding_window_counter;
pub mod sliding_window_log;
pub mod token_bucket;

use crate::error::{Error, Result};
use crate::store::ScriptValue;

/// Registry name of the token bucket strategy.
pub const TOKEN_BUCKET: &str = "token_bucket";
/// Registry name of the sliding-window log strategy.
pub const SLIDING_WINDOW_LOG: &str = "sliding_window_log";
/// Registry name of the sliding-window counter strategy.
pub const SLIDING_WINDOW_COUNTER: &str = "sliding_window_counter";

pub(crate) fn check_arity(
    strategy: &'static str,
    reply: &[ScriptValue],
    expected: usize,
) -> Result<()> {
    if reply.len() < expected {
        return Err(Error::protocol(
            strategy,
            format!(
                "reply array has {} elements, expected at least {expected}",
                reply.len()
            ),
        ));
    }
    Ok(())
}

pub(crate) fn reply_i64(
    strategy: &'static str,
    reply: &[ScriptValue],
    index: usize,
    what: &str,
) -> Result<i64> {
    let value = &reply[index];
    value.as_i64().ok_or_else(|| {
        Error::protocol(
            strategy,
            format!(
                "failed to parse {what} at position {index}: expected number, got {} ({value:?})",
                value.type_name()
            ),
        )
    })
}

pub(crate) fn reply_f64(
    strategy: &'static str,
    reply: &[ScriptValue],
    index: usize,
    what: &str,
) -> Result<f64> {
    let value = &reply[index];
    value.as_f64().ok_or_else(|| {
        Error::protocol(
            strategy,
            format!(
                "failed to parse {what} at position {index}: expected number, got {} ({value:?})",
                value.type_name()
            ),
        )
    })
}

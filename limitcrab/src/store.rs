//! Store abstraction for atomic script evaluation
//!
//! Engines never talk to Redis directly; they go through the [`ScriptStore`]
//! trait so tests can swap in in-memory fakes. The production implementation,
//! [`RedisScriptStore`], issues `EVAL` and `DEL` over a multiplexed
//! connection manager.

use async_trait::async_trait;
use redis::Value;
use redis::aio::ConnectionManager;
use thiserror::Error;

/// Errors from the store client itself (as opposed to malformed script
/// replies, which engines report as protocol errors).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The underlying Redis command failed, including connection loss and
    /// deadline expiry.
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store returned something other than the reply array every script
    /// is contracted to produce.
    #[error("unexpected reply from store: {0}")]
    UnexpectedReply(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A numeric argument passed to a script.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptArg {
    Int(i64),
    Float(f64),
}

impl From<i64> for ScriptArg {
    fn from(value: i64) -> Self {
        ScriptArg::Int(value)
    }
}

impl From<f64> for ScriptArg {
    fn from(value: f64) -> Self {
        ScriptArg::Float(value)
    }
}

/// One element of a script's reply array.
///
/// The store's scripting layer coerces numbers on the way out: Lua floats are
/// truncated to integers, and scripts that need fractional precision to
/// survive the boundary return decimal strings instead. Engines therefore
/// never rely on the runtime type of an element; the [`as_i64`] and
/// [`as_f64`] accessors accept any numeric form.
///
/// [`as_i64`]: ScriptValue::as_i64
/// [`as_f64`]: ScriptValue::as_f64
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Nil,
    Int(i64),
    Float(f64),
    Str(String),
}

impl ScriptValue {
    /// Coerce to an integer, truncating floats and parsing decimal strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScriptValue::Int(v) => Some(*v),
            ScriptValue::Float(v) => Some(*v as i64),
            ScriptValue::Str(s) => s
                .parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64)),
            ScriptValue::Nil => None,
        }
    }

    /// Coerce to a float, widening integers and parsing decimal strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScriptValue::Int(v) => Some(*v as f64),
            ScriptValue::Float(v) => Some(*v),
            ScriptValue::Str(s) => s.parse::<f64>().ok(),
            ScriptValue::Nil => None,
        }
    }

    /// Human-readable type name for protocol error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Nil => "nil",
            ScriptValue::Int(_) => "integer",
            ScriptValue::Float(_) => "float",
            ScriptValue::Str(_) => "string",
        }
    }
}

impl TryFrom<Value> for ScriptValue {
    type Error = StoreError;

    fn try_from(value: Value) -> StoreResult<Self> {
        match value {
            Value::Nil => Ok(ScriptValue::Nil),
            Value::Int(v) => Ok(ScriptValue::Int(v)),
            Value::Double(v) => Ok(ScriptValue::Float(v)),
            Value::Boolean(v) => Ok(ScriptValue::Int(v as i64)),
            Value::BulkString(bytes) => Ok(ScriptValue::Str(
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
            Value::SimpleString(s) => Ok(ScriptValue::Str(s)),
            Value::Okay => Ok(ScriptValue::Str("OK".to_string())),
            other => Err(StoreError::UnexpectedReply(format!(
                "unsupported reply element: {other:?}"
            ))),
        }
    }
}

/// Atomic script evaluation and key deletion.
///
/// This is the engines' entire view of the store. Each admission decision is
/// a single `eval` call, which is the serialization point that makes
/// concurrent calls from many stateless replicas safe. Cancellation is the
/// caller's: dropping the returned future abandons the in-flight command.
#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// Evaluate `script` atomically against `keys` with numeric `args`,
    /// returning the script's reply array.
    async fn eval(
        &self,
        script: &str,
        keys: &[&str],
        args: &[ScriptArg],
    ) -> StoreResult<Vec<ScriptValue>>;

    /// Delete `keys`, returning how many existed. Deleting absent keys is
    /// not an error.
    async fn del(&self, keys: &[&str]) -> StoreResult<i64>;
}

/// Production [`ScriptStore`] backed by Redis.
///
/// Holds a [`ConnectionManager`], which multiplexes commands over one
/// connection and reconnects on failure. Cloning the manager per call is
/// cheap; it is an `Arc` around the shared connection state.
#[derive(Clone)]
pub struct RedisScriptStore {
    conn: ConnectionManager,
}

impl RedisScriptStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Open a client for `url` (e.g. `redis://127.0.0.1:6379/0`) and
    /// establish the managed connection.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Round-trip a `PING`, for startup checks.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl ScriptStore for RedisScriptStore {
    async fn eval(
        &self,
        script: &str,
        keys: &[&str],
        args: &[ScriptArg],
    ) -> StoreResult<Vec<ScriptValue>> {
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(script).arg(keys.len());
        for key in keys {
            cmd.arg(*key);
        }
        for arg in args {
            match arg {
                ScriptArg::Int(v) => cmd.arg(*v),
                ScriptArg::Float(v) => cmd.arg(*v),
            };
        }

        let mut conn = self.conn.clone();
        let reply: Value = cmd.query_async(&mut conn).await?;
        match reply {
            Value::Array(items) => items.into_iter().map(ScriptValue::try_from).collect(),
            other => Err(StoreError::UnexpectedReply(format!(
                "expected reply array, got {other:?}"
            ))),
        }
    }

    async fn del(&self, keys: &[&str]) -> StoreResult<i64> {
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(*key);
        }

        let mut conn = self.conn.clone();
        let removed: i64 = cmd.query_async(&mut conn).await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_i64_coercions() {
        assert_eq!(ScriptValue::Int(42).as_i64(), Some(42));
        assert_eq!(ScriptValue::Float(2.9).as_i64(), Some(2));
        assert_eq!(ScriptValue::Str("17".to_string()).as_i64(), Some(17));
        assert_eq!(ScriptValue::Str("2.5".to_string()).as_i64(), Some(2));
        assert_eq!(ScriptValue::Str("not_a_number".to_string()).as_i64(), None);
        assert_eq!(ScriptValue::Nil.as_i64(), None);
    }

    #[test]
    fn test_as_f64_coercions() {
        assert_eq!(ScriptValue::Int(42).as_f64(), Some(42.0));
        assert_eq!(ScriptValue::Float(2.5).as_f64(), Some(2.5));
        assert_eq!(ScriptValue::Str("2.5".to_string()).as_f64(), Some(2.5));
        assert_eq!(ScriptValue::Str("3".to_string()).as_f64(), Some(3.0));
        assert_eq!(ScriptValue::Nil.as_f64(), None);
    }

    #[test]
    fn test_reply_element_conversion() {
        assert_eq!(
            ScriptValue::try_from(Value::Int(5)).unwrap(),
            ScriptValue::Int(5)
        );
        assert_eq!(
            ScriptValue::try_from(Value::BulkString(b"2.75".to_vec())).unwrap(),
            ScriptValue::Str("2.75".to_string())
        );
        assert_eq!(
            ScriptValue::try_from(Value::Double(1.5)).unwrap(),
            ScriptValue::Float(1.5)
        );
        assert_eq!(
            ScriptValue::try_from(Value::Nil).unwrap(),
            ScriptValue::Nil
        );
        assert!(ScriptValue::try_from(Value::Array(vec![])).is_err());
    }

    #[test]
    fn test_script_arg_conversions() {
        assert_eq!(ScriptArg::from(7i64), ScriptArg::Int(7));
        assert_eq!(ScriptArg::from(0.25f64), ScriptArg::Float(0.25));
    }
}

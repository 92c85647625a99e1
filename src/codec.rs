//! Payload codec contract
//!
//! The engine never interprets workflow or activity payloads; it moves
//! opaque strings produced by a [`Codec`] between user functions and the
//! store. [`Json`] is the reference implementation; a custom codec can be
//! attached per workflow or activity when a different encoding (or extra
//! validation) is needed.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Codec failure wrapping the underlying serializer error
#[derive(Debug, thiserror::Error)]
#[error("codec error: {0}")]
pub struct CodecError(#[from] serde_json::Error);

/// Serializes and deserializes one function's input and output payloads.
///
/// Round-trip stability is part of the contract: `load_input(dump_input(x))`
/// and `load_output(dump_output(y))` must reproduce the original values,
/// since stored inputs key the replay cache and stored outputs feed
/// replayed steps.
pub trait Codec<I, O>: Send + Sync {
    fn dump_input(&self, input: &I) -> Result<String, CodecError>;
    fn load_input(&self, raw: &str) -> Result<I, CodecError>;
    fn dump_output(&self, output: &O) -> Result<String, CodecError>;
    fn load_output(&self, raw: &str) -> Result<O, CodecError>;
}

/// JSON reference codec over serde-enabled types
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl<I, O> Codec<I, O> for Json
where
    I: Serialize + DeserializeOwned,
    O: Serialize + DeserializeOwned,
{
    fn dump_input(&self, input: &I) -> Result<String, CodecError> {
        Ok(serde_json::to_string(input)?)
    }

    fn load_input(&self, raw: &str) -> Result<I, CodecError> {
        Ok(serde_json::from_str(raw)?)
    }

    fn dump_output(&self, output: &O) -> Result<String, CodecError> {
        Ok(serde_json::to_string(output)?)
    }

    fn load_output(&self, raw: &str) -> Result<O, CodecError> {
        Ok(serde_json::from_str(raw)?)
    }
}

use std::marker::PhantomData;

use chatbridge_types::LlmError;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::partial::parse_partial_json;
use crate::repair::repair_json;
use crate::schema::ObjectSchema;

/// Turns raw model text into a schema-validated `T`.
///
/// `parse_final` is used once the whole response is known and fails hard;
/// `parse_partial` is used while a stream is still growing and never fails.
pub struct ResponseParser<T> {
    schema: ObjectSchema,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ResponseParser<T> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for ResponseParser<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseParser")
            .field("schema", &self.schema.name())
            .finish()
    }
}

impl<T: DeserializeOwned + JsonSchema> ResponseParser<T> {
    pub fn for_type() -> Self {
        Self::new(ObjectSchema::for_type::<T>())
    }
}

impl<T: DeserializeOwned> ResponseParser<T> {
    pub fn new(schema: ObjectSchema) -> Self {
        Self {
            schema,
            _marker: PhantomData,
        }
    }

    pub fn schema(&self) -> &ObjectSchema {
        &self.schema
    }

    pub fn parse_final(&self, text: &str) -> Result<T, LlmError> {
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let repaired = repair_json(text).map_err(|e| {
            tracing::error!("Failed to repair {} output: {}", self.schema.name(), e);
            LlmError::ParseFailure(e.to_string())
        })?;
        let value: Value = serde_json::from_str(&repaired)
            .map_err(|e| LlmError::ParseFailure(e.to_string()))?;

        // repaired-but-invalid output is a failure, not something to patch up
        self.schema.validate(&value).map_err(|e| {
            tracing::error!("{} output failed validation: {}", self.schema.name(), e);
            LlmError::ParseFailure(format!("schema validation failed: {}", e))
        })?;

        serde_json::from_value(value).map_err(|e| {
            LlmError::ParseFailure(format!("failed to deserialize {}: {}", self.schema.name(), e))
        })
    }

    /// Reconstruct whatever the buffer holds so far, or `{}` if nothing yet.
    pub fn parse_partial(&self, buffer: &str) -> Value {
        match parse_partial_json(buffer) {
            Some(value) => value,
            None => {
                tracing::trace!("No partial object in {} buffered chars", buffer.len());
                Value::Object(Map::new())
            }
        }
    }
}

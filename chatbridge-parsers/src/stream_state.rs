use chatbridge_types::{LlmError, ToolCall};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::response::ResponseParser;
use crate::tool_calls::{ToolCallAccumulator, ToolCallDelta, ToolCallSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Idle,
    Accumulating,
    Done,
    Errored,
}

/// Everything a finished stream produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOutput {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Buffers owned by a single streaming request.
///
/// Idle -> Accumulating on the first delta, then Done or Errored once.
/// Pushing after the stream has ended is an error; `reset` goes back to Idle.
#[derive(Debug, Default)]
pub struct StreamState {
    phase: StreamPhase,
    buffer: String,
    tool_calls: ToolCallAccumulator,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    fn accept(&mut self) -> Result<(), LlmError> {
        match self.phase {
            StreamPhase::Idle | StreamPhase::Accumulating => {
                self.phase = StreamPhase::Accumulating;
                Ok(())
            }
            phase => Err(LlmError::InvalidState(format!(
                "stream received data after it ended ({:?})",
                phase
            ))),
        }
    }

    pub fn push_text(&mut self, delta: &str) -> Result<(), LlmError> {
        self.accept()?;
        self.buffer.push_str(delta);
        Ok(())
    }

    pub fn push_tool_call(&mut self, delta: ToolCallDelta) -> Result<&ToolCallSlot, LlmError> {
        self.accept()?;
        match self.tool_calls.apply(delta) {
            Ok(slot) => Ok(slot),
            Err(e) => {
                self.phase = StreamPhase::Errored;
                Err(e)
            }
        }
    }

    /// End the stream, handing the buffers to `f`. The phase becomes Done
    /// when `f` succeeds and Errored otherwise.
    pub fn finish_with<R>(
        &mut self,
        f: impl FnOnce(StreamOutput) -> Result<R, LlmError>,
    ) -> Result<R, LlmError> {
        if matches!(self.phase, StreamPhase::Done | StreamPhase::Errored) {
            return Err(LlmError::InvalidState("stream already finished".to_string()));
        }
        let output = StreamOutput {
            content: std::mem::take(&mut self.buffer),
            tool_calls: self.tool_calls.finish(),
        };
        let result = f(output);
        self.phase = if result.is_ok() {
            StreamPhase::Done
        } else {
            StreamPhase::Errored
        };
        result
    }

    pub fn finish(&mut self) -> Result<StreamOutput, LlmError> {
        self.finish_with(Ok)
    }

    pub fn fail(&mut self) {
        self.phase = StreamPhase::Errored;
    }

    pub fn reset(&mut self) {
        self.phase = StreamPhase::Idle;
        self.buffer.clear();
        self.tool_calls.reset();
    }
}

/// Stream state for a structured generation: text is buffered and a
/// partial object is reconstructed after every chunk.
#[derive(Debug)]
pub struct ObjectStreamState<T> {
    state: StreamState,
    parser: ResponseParser<T>,
    last_partial: Option<Value>,
}

impl<T: DeserializeOwned> ObjectStreamState<T> {
    pub fn new(parser: ResponseParser<T>) -> Self {
        Self {
            state: StreamState::new(),
            parser,
            last_partial: None,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.state.phase()
    }

    /// Buffer a chunk and return the partial object if it changed.
    pub fn push(&mut self, chunk: &str) -> Result<Option<Value>, LlmError> {
        self.state.push_text(chunk)?;
        let partial = self.parser.parse_partial(self.state.buffer());
        if self.last_partial.as_ref() == Some(&partial) {
            return Ok(None);
        }
        self.last_partial = Some(partial.clone());
        Ok(Some(partial))
    }

    /// Parse the complete buffer, returning the object and the raw text.
    pub fn finish(&mut self) -> Result<(T, String), LlmError> {
        let parser = &self.parser;
        self.state.finish_with(|output| {
            let object = parser.parse_final(&output.content)?;
            Ok((object, output.content))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_phases() {
        let mut state = StreamState::new();
        assert_eq!(state.phase(), StreamPhase::Idle);
        state.push_text("Hel").unwrap();
        state.push_text("lo").unwrap();
        assert_eq!(state.phase(), StreamPhase::Accumulating);

        let output = state.finish().unwrap();
        assert_eq!(output.content, "Hello");
        assert_eq!(state.phase(), StreamPhase::Done);

        let err = state.push_text("late").unwrap_err();
        assert!(matches!(err, LlmError::InvalidState(_)));
        assert!(state.finish().is_err());

        state.reset();
        assert_eq!(state.phase(), StreamPhase::Idle);
        assert_eq!(state.buffer(), "");
    }

    #[test]
    fn test_failed_finish_is_errored() {
        let mut state = StreamState::new();
        state.push_text("x").unwrap();
        let result: Result<(), _> =
            state.finish_with(|_| Err(LlmError::ParseFailure("bad".into())));
        assert!(result.is_err());
        assert_eq!(state.phase(), StreamPhase::Errored);
    }

    #[test]
    fn test_tool_calls_collected_on_finish() {
        let mut state = StreamState::new();
        state
            .push_tool_call(ToolCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some("lookup".into()),
                arguments: Some(r#"{"q": "#.into()),
            })
            .unwrap();
        state
            .push_tool_call(ToolCallDelta {
                index: 0,
                arguments: Some(r#""x"}"#.into()),
                ..Default::default()
            })
            .unwrap();

        let output = state.finish().unwrap();
        assert_eq!(output.content, "");
        assert_eq!(output.tool_calls.len(), 1);
        assert_eq!(output.tool_calls[0].input, json!({"q": "x"}));
    }

    #[test]
    fn test_bad_slot_errors_stream() {
        let mut state = StreamState::new();
        let err = state
            .push_tool_call(ToolCallDelta {
                index: 500,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidToolCallSlot(500)));
        assert_eq!(state.phase(), StreamPhase::Errored);
    }

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Movie {
        title: String,
        year: u32,
    }

    #[test]
    fn test_object_stream_emits_changed_partials() {
        let mut state = ObjectStreamState::new(ResponseParser::<Movie>::for_type());

        assert_eq!(state.push("```json\n").unwrap(), Some(json!({})));
        assert_eq!(state.push("{\"ti").unwrap(), None);
        assert_eq!(
            state.push("tle\": \"Alien\"").unwrap(),
            Some(json!({"title": "Alien"}))
        );
        assert_eq!(
            state.push(", \"year\": 1979}\n```").unwrap(),
            Some(json!({"title": "Alien", "year": 1979}))
        );

        let (movie, raw) = state.finish().unwrap();
        assert_eq!(
            movie,
            Movie {
                title: "Alien".into(),
                year: 1979
            }
        );
        assert!(raw.starts_with("```json"));
        assert_eq!(state.phase(), StreamPhase::Done);
    }

    #[test]
    fn test_object_stream_final_validation_failure() {
        let mut state = ObjectStreamState::new(ResponseParser::<Movie>::for_type());
        state.push(r#"{"title": "Alien"}"#).unwrap();
        assert!(matches!(state.finish(), Err(LlmError::ParseFailure(_))));
        assert_eq!(state.phase(), StreamPhase::Errored);
    }
}

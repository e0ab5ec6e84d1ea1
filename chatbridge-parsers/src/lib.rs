//! Parsing of raw model output: fenced blocks, JSON repair, tolerant partial
//! JSON, streamed tool-call arguments and schema-validated objects.

mod fence;
mod partial;
mod repair;
mod response;
mod schema;
mod stream_state;
mod tool_calls;

pub use fence::strip_code_fence;
pub use partial::{complete_partial_json, parse_partial_json};
pub use repair::{RepairError, repair_json};
pub use response::ResponseParser;
pub use schema::ObjectSchema;
pub use stream_state::{ObjectStreamState, StreamOutput, StreamPhase, StreamState};
pub use tool_calls::{MAX_TOOL_CALL_SLOTS, ToolCallAccumulator, ToolCallDelta, ToolCallSlot};

#[cfg(test)]
mod tests;

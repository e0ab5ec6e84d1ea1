use std::path::PathBuf;

use async_openai::types::chat::CreateChatCompletionRequest;
use chatbridge_types::Usage;
use comfy_table::{
    Cell, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};
use tracing::info;

/// Setting this variable turns on request dumps and summary tables
pub const ENV_LOG_MESSAGES: &str = "CHATBRIDGE_LOG_MESSAGES";

const REQUEST_DIR: &str = ".chatbridge/requests";

#[derive(Debug, Clone)]
pub struct ModelLogger {
    verbose: bool,
    request_dir: PathBuf,
}

impl ModelLogger {
    pub fn new(verbose: Option<bool>) -> Self {
        let verbose = verbose.unwrap_or(std::env::var(ENV_LOG_MESSAGES).is_ok());
        Self {
            verbose,
            request_dir: PathBuf::from(REQUEST_DIR),
        }
    }

    pub fn with_request_dir(mut self, request_dir: impl Into<PathBuf>) -> Self {
        self.request_dir = request_dir.into();
        self
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Dump the request body to `<request_dir>/<timestamp>.json`.
    pub fn log_openai_messages(&self, request: &CreateChatCompletionRequest) -> Option<PathBuf> {
        if !self.verbose {
            return None;
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        let path = self.request_dir.join(format!("{timestamp}.json"));
        let body = match serde_json::to_string(&request) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Failed to serialize request for logging: {}", e);
                return None;
            }
        };
        if let Err(e) =
            std::fs::create_dir_all(&self.request_dir).and_then(|_| std::fs::write(&path, body))
        {
            tracing::warn!("Failed to write request log {}: {}", path.display(), e);
            return None;
        }
        Some(path)
    }

    fn truncate_for_display(&self, text: &str, max_len: usize) -> String {
        if text.len() <= max_len {
            return text.to_string();
        }
        let mut end = max_len;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}\n\n[Content truncated - {} chars total]",
            &text[..end],
            text.len()
        )
    }

    pub fn log_model_execution(
        &self,
        llm_name: &str,
        model_name: &str,
        messages_count: usize,
        settings: Option<&str>,
        usage: Option<&Usage>,
    ) {
        if !self.verbose {
            return;
        }

        let mut table = Table::new()
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .to_owned();
        table.set_header(vec!["LLM", "Model", "Messages", "Settings", "Token Usage"]);

        let settings_str = settings.unwrap_or("None");
        let token_str = usage.map_or("None".to_string(), |u| {
            format!(
                "{} ({} in / {} out)",
                u.total_tokens, u.prompt_tokens, u.completion_tokens
            )
        });

        table.add_row(vec![
            llm_name,
            model_name,
            &messages_count.to_string(),
            settings_str,
            &token_str,
        ]);

        info!("\n{}", table);
    }

    pub fn log_parsing_error(&self, schema_name: &str, input: &str, error: &str) {
        if !self.verbose {
            return;
        }

        let mut table = Table::new()
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(120)
            .to_owned();

        table.set_header(vec![
            Cell::new("Parsing Error Debug").fg(Color::Red),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Schema").fg(Color::Blue),
            Cell::new(schema_name),
        ]);
        table.add_row(vec![
            Cell::new("Input").fg(Color::Yellow),
            Cell::new(self.truncate_for_display(input, 400)),
        ]);
        table.add_row(vec![
            Cell::new("Error").fg(Color::Red),
            Cell::new(error),
        ]);

        tracing::info!("\n❌ PARSING ERROR:\n{}", table);
    }
}

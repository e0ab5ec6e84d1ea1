use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chatbridge_core::{ChatModel, logging::init_logging, verbose_log};
use chatbridge_parsers::{ObjectSchema, ResponseParser};
use chatbridge_types::{
    CallOptions, ChatStreamEvent, ChatbridgeConfig, Message, ObjectStreamEvent, ToolDefinition,
};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde_json::Value;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
struct Cli {
    /// Path to chatbridge.toml (defaults to ./chatbridge.toml, then ~/.chatbridge/config.toml)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Model name (overrides config and CHATBRIDGE_MODEL)
    #[clap(long)]
    model: Option<String>,

    #[clap(long)]
    temperature: Option<f32>,

    #[clap(long)]
    max_tokens: Option<u32>,

    /// System prompt sent before the user prompt
    #[clap(long)]
    system: Option<String>,

    #[clap(long, short)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// One-shot text generation
    Generate {
        prompt: String,
        #[clap(long, help = "JSON file with an array of tool definitions")]
        tools: Option<PathBuf>,
    },

    /// Stream text as it is generated
    Stream {
        prompt: String,
        #[clap(long, help = "JSON file with an array of tool definitions")]
        tools: Option<PathBuf>,
    },

    /// Generate a JSON object matching a schema
    Object {
        prompt: String,
        #[clap(long, help = "JSON schema file")]
        schema: PathBuf,
        #[clap(long, help = "Schema name (defaults to the file stem)")]
        name: Option<String>,
        #[clap(long, help = "Print partial objects to stderr while streaming")]
        stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_logging(if cli.verbose { "debug" } else { "warn" });

    let mut config = ChatbridgeConfig::load(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config.llm.model_settings.model = model.clone();
    }
    verbose_log!(
        cli.verbose,
        "Using model {} via {}",
        config.llm.model_settings.model,
        config.llm.model_settings.provider.base_url()
    );

    let model = ChatModel::from_config(&config);
    let options = call_options(&cli);
    let messages = build_messages(cli.system.clone(), prompt(&cli.command));

    match cli.command {
        Commands::Generate { tools, .. } => {
            let tools = load_tools(tools.as_deref())?;
            let response = model.generate_text(&messages, &tools, &options).await?;
            if !response.content.is_empty() {
                println!("{}", response.content);
            }
            for tool_call in &response.tool_calls {
                println!("{}", serde_json::to_string_pretty(tool_call)?);
            }
            verbose_log!(cli.verbose, "Finish reason: {:?}", response.finish_reason);
        }
        Commands::Stream { tools, .. } => {
            let tools = load_tools(tools.as_deref())?;
            let mut stream = model.stream_text(&messages, &tools, &options).await?;
            let mut stdout = std::io::stdout();
            while let Some(event) = stream.next().await {
                match event? {
                    ChatStreamEvent::TextDelta { delta } => {
                        write!(stdout, "{delta}")?;
                        stdout.flush()?;
                    }
                    ChatStreamEvent::FunctionCall { .. } => {}
                    ChatStreamEvent::Done {
                        finish_reason,
                        tool_calls,
                        usage,
                    } => {
                        writeln!(stdout)?;
                        for tool_call in &tool_calls {
                            println!("{}", serde_json::to_string_pretty(tool_call)?);
                        }
                        verbose_log!(
                            cli.verbose,
                            "Finish reason: {:?}, usage: {:?}",
                            finish_reason,
                            usage
                        );
                    }
                }
            }
        }
        Commands::Object {
            schema,
            name,
            stream,
            ..
        } => {
            let schema = load_schema(&schema, name)?;
            let parser: ResponseParser<Value> = ResponseParser::new(schema);
            let object = if stream {
                let mut events = model
                    .stream_object_with(parser, &messages, &options)
                    .await?;
                let mut last = None;
                while let Some(event) = events.next().await {
                    match event? {
                        ObjectStreamEvent::Partial(partial) => eprintln!("{partial}"),
                        ObjectStreamEvent::Final(response) => last = Some(response),
                    }
                }
                last.context("stream ended without a final object")?
            } else {
                model
                    .generate_object_with(&parser, &messages, &options)
                    .await?
            };
            println!("{}", serde_json::to_string_pretty(&object.object)?);
            verbose_log!(cli.verbose, "Generated with {:?} decoding", object.mode);
        }
    }

    Ok(())
}

fn prompt(command: &Commands) -> String {
    match command {
        Commands::Generate { prompt, .. }
        | Commands::Stream { prompt, .. }
        | Commands::Object { prompt, .. } => prompt.clone(),
    }
}

fn call_options(cli: &Cli) -> CallOptions {
    let mut options = CallOptions::default();
    if let Some(temperature) = cli.temperature {
        options = options.with_temperature(temperature);
    }
    if let Some(max_tokens) = cli.max_tokens {
        options = options.with_max_tokens(max_tokens);
    }
    options
}

fn build_messages(system: Option<String>, prompt: String) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(prompt));
    messages
}

fn load_tools(path: Option<&Path>) -> Result<Vec<ToolDefinition>> {
    let Some(path) = path else {
        return Ok(vec![]);
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tools file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("invalid tool definitions in {}", path.display()))
}

fn load_schema(path: &Path, name: Option<String>) -> Result<ObjectSchema> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file {}", path.display()))?;
    let schema: Value = serde_json::from_str(&contents)
        .with_context(|| format!("invalid JSON schema in {}", path.display()))?;
    let name = name
        .or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_default();
    Ok(ObjectSchema::new(name, schema))
}

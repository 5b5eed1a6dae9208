//! Send a chat request through one role's client and print the response.
//!
//! API keys come from the roles file or from `OPENAI_API_KEY` /
//! `ANTHROPIC_API_KEY` / `LOCAL_LLM_API_KEY`.
//!
//! # Examples
//!
//! ```sh
//! # Ask the executor
//! rolecall --config roles.json --user "Summarize the failing test output"
//!
//! # Plan with a system prompt, streaming tokens as they arrive
//! rolecall --config roles.json --role planner \
//!   --system "You plan software changes." \
//!   --user "Split the auth module into two crates." --stream
//!
//! # Pipe content from stdin and offer tools
//! cat diff.patch | rolecall --config roles.json --role reflector --stdin \
//!   --tools tools.json
//!
//! # Which backends exist
//! rolecall --list-providers
//! ```

use clap::Parser;
use futures::StreamExt;
use rolecall::factory::ClientFactory;
use rolecall::{ChatRequest, Message, Role, RoleManager, RolesConfig, ToolDefinition};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Send a chat request through a planner, executor, or reflector client.
#[derive(Parser)]
#[command(name = "rolecall", version)]
struct Cli {
    // ── Configuration ──────────────────────────────────────────
    /// Path to a JSON roles file (planner, executor, reflector)
    #[arg(long, required_unless_present = "list_providers")]
    config: Option<PathBuf>,

    /// Role whose client handles the request
    #[arg(long, default_value = "executor")]
    role: Role,

    // ── Message content ────────────────────────────────────────
    /// System prompt to set the assistant's behavior
    #[arg(long)]
    system: Option<String>,

    /// User message to send
    #[arg(long)]
    user: Option<String>,

    /// Read user content from stdin
    #[arg(long)]
    stdin: bool,

    /// Path to a JSON file with an array of tool definitions
    #[arg(long)]
    tools: Option<PathBuf>,

    // ── Sampling parameters ────────────────────────────────────
    /// Sampling temperature (0.0 – 2.0), overrides the roles file
    #[arg(long)]
    temperature: Option<f32>,

    /// Maximum tokens in the response, overrides the roles file
    #[arg(long)]
    max_tokens: Option<u32>,

    // ── Output mode ────────────────────────────────────────────
    /// Print text fragments as they arrive
    #[arg(long)]
    stream: bool,

    /// List supported providers and exit
    #[arg(long)]
    list_providers: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Join the `--user` text and piped stdin into one user turn.
fn combine_user_content(flag: Option<&str>, piped: Option<String>) -> Result<String, String> {
    let parts: Vec<String> = flag
        .map(str::to_string)
        .into_iter()
        .chain(piped)
        .collect();
    if parts.is_empty() {
        return Err("nothing to send: pass --user, --stdin, or both".to_string());
    }
    Ok(parts.join("\n\n"))
}

fn user_content(cli: &Cli) -> Result<String, String> {
    let piped = if cli.stdin {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        Some(buf)
    } else {
        None
    };
    combine_user_content(cli.user.as_deref(), piped)
}

fn load_tools(path: &Path) -> Result<Vec<ToolDefinition>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read tools file '{}': {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse tools file '{}': {e}", path.display()))
}

fn build_request(cli: &Cli) -> Result<ChatRequest, String> {
    let mut messages = Vec::new();
    if let Some(system) = &cli.system {
        messages.push(Message::system(system.clone()));
    }
    messages.push(Message::user(user_content(cli)?));

    let mut request = ChatRequest::new(messages);
    if let Some(path) = &cli.tools {
        request = request.with_tools(load_tools(path)?);
    }
    request.temperature = cli.temperature;
    request.max_tokens = cli.max_tokens;
    Ok(request)
}

async fn run(cli: Cli) -> Result<(), String> {
    if cli.list_providers {
        for provider in ClientFactory::supported_providers() {
            println!("{provider}\t{}", provider.default_base_url());
        }
        return Ok(());
    }

    let Some(path) = &cli.config else {
        return Err("--config is required".to_string());
    };
    let roles = RolesConfig::from_file(path).map_err(|e| e.to_string())?;
    let manager = RoleManager::new(&roles).map_err(|e| e.to_string())?;
    let request = build_request(&cli)?;
    let role = cli.role;

    if cli.stream {
        let client = manager.client(role);
        let mut stream = client
            .chat_stream(&request)
            .await
            .map_err(|e| e.user_message())?;
        let mut stdout = io::stdout();
        while let Some(fragment) = stream.next().await {
            let text = fragment.map_err(|e| e.user_message())?;
            print!("{text}");
            let _ = stdout.flush();
        }
        println!();
        if stream.skipped_chunks() > 0 {
            eprintln!("  ({} malformed chunk(s) skipped)", stream.skipped_chunks());
        }
        return Ok(());
    }

    let response = manager
        .chat(role, &request)
        .await
        .map_err(|e| e.user_message())?;

    if response.tool_calls.is_empty() {
        println!("{}", response.content);
    } else {
        if !response.content.is_empty() {
            println!("{}", response.content);
        }
        let calls = serde_json::to_string_pretty(&response.tool_calls)
            .map_err(|e| format!("failed to encode tool calls: {e}"))?;
        println!("{calls}");
    }

    let client = manager.client(role);
    eprintln!(
        "  [{role}] {}/{} finish={} | {}",
        client.provider(),
        client.model(),
        response.finish_reason,
        manager.usage_stats(role).summary()
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

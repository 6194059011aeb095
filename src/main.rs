//! tandem CLI: wires the config, LLM client, tools, and soul into a
//! line-oriented REPL.

use anyhow::{Context, Result};
use clap::Parser;
use std::fmt::Write as _;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tandem::approval::ApprovalDecision;
use tandem::config::Config;
use tandem::llm::http::ClientConfig;
use tandem::llm::{HttpClient, LlmClient, RetryingClient};
use tandem::session::Session;
use tandem::soul::{Agent, Runtime, Soul};
use tandem::tools::{file::FileTool, shell::ShellTool};
use tandem::transcript::Transcript;
use tandem::wire::{MessageKind, WireMessage};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

const REPLY_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_PROJECT_DOC_CHARS: usize = 4_000;

#[derive(Parser)]
#[command(name = "tandem", version, about = "tandem — an interactive coding agent")]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Working directory
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Session ID to continue
    #[arg(long)]
    session: Option<String>,

    /// Model to use, overriding the configuration
    #[arg(long)]
    model: Option<String>,

    /// Auto-approve all tool executions
    #[arg(long)]
    yolo: bool,

    /// Directory for log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tandem::logging::init(level, cli.log_dir.as_deref())?;

    let config = Config::load(cli.config.as_deref())?;

    let mut session = match &cli.session {
        Some(id) => Session::resume(id)?,
        None => {
            let mut session = Session::create(cli.workdir.clone())?;
            session.save()?;
            session
        }
    };

    println!("Session: {}", session.id);
    println!("WorkDir: {}", session.workdir.display());

    let yolo = cli.yolo || config.default_yolo;
    let mut runtime = Runtime::new(session.workdir.clone(), yolo);
    runtime.max_steps = config.loop_control.max_steps_per_turn;
    runtime.max_retries = config.loop_control.max_retries_per_step;
    runtime.llm = build_client(&config, cli.model.as_deref())?;

    runtime
        .register_tool(Arc::new(ShellTool::new(&session.workdir, Duration::ZERO)))
        .context("failed to register shell tool")?;
    runtime
        .register_tool(Arc::new(FileTool::new(&session.workdir)))
        .context("failed to register file tool")?;

    let mut agent = Agent::new(
        "tandem",
        build_system_prompt(&session.workdir),
        Arc::new(runtime),
    );
    agent.add_tool("shell");
    agent.add_tool("file");

    let transcript = Arc::new(Transcript::with_path(&session.transcript_file));
    transcript
        .restore()
        .context("failed to restore transcript")?;

    let mut soul = Soul::new(agent, Arc::clone(&transcript));
    for (name, model_cfg) in &config.models {
        if Some(name.as_str()) == cli.model.as_deref() || *name == config.default_model {
            soul.set_max_context(model_cfg.max_context_size);
        }
    }
    soul.set_reserved_context(config.loop_control.reserved_context_size);

    install_handlers(&mut soul);

    let handle = soul.handle();
    let mut done = soul.take_done().expect("fresh soul has a done receiver");
    let shutdown = CancellationToken::new();
    let loop_shutdown = shutdown.clone();
    let soul_task = tokio::spawn(async move { soul.run(loop_shutdown).await });

    println!();
    println!("tandem — type your message and press Enter.");
    println!("Commands: /quit, /clear, /cancel");
    println!();

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        match input {
            "" => continue,
            "/quit" | "exit" | "quit" => break,
            "/cancel" => {
                if let Err(err) = handle.send(WireMessage::new(MessageKind::Cancel, vec![])) {
                    eprintln!("Error sending cancel: {err}");
                }
                continue;
            }
            "/clear" => {
                transcript.clear();
                println!("Transcript cleared.");
                continue;
            }
            _ => {}
        }

        // Drop stale done signals from commands processed without a wait.
        while done.try_recv().is_ok() {}

        let msg = WireMessage::text(MessageKind::UserInput, input);
        if let Err(err) = handle.send(msg) {
            eprintln!("Error sending message: {err}");
            continue;
        }

        match tokio::time::timeout(REPLY_TIMEOUT, done.recv()).await {
            Ok(Some(())) => {}
            Ok(None) => break,
            Err(_) => eprintln!("Timeout waiting for response"),
        }
    }

    println!("Goodbye!");
    shutdown.cancel();
    let _ = soul_task.await;
    transcript.save().ok();
    session.save().ok();
    Ok(())
}

/// Resolve the LLM client from environment variables first, then the
/// configuration. Returns `None` when no usable provider is configured;
/// the soul replies with a configuration hint in that case.
fn build_client(config: &Config, model_override: Option<&str>) -> Result<Option<Arc<dyn LlmClient>>> {
    let mut base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_default();
    let mut api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let mut model = model_override
        .map(String::from)
        .or_else(|| std::env::var("OPENAI_MODEL").ok())
        .unwrap_or_default();
    let mut timeout = Duration::ZERO;

    if base_url.is_empty() || api_key.is_empty() || model.is_empty() {
        if let Some(provider) = config.default_provider() {
            if base_url.is_empty() {
                base_url = provider.base_url.clone();
            }
            if api_key.is_empty() {
                api_key = provider.api_key().unwrap_or_default();
            }
            if model.is_empty() {
                model = config.default_model.clone();
            }
            timeout = provider.timeout_duration();
        }
    }

    if base_url.is_empty() || api_key.is_empty() || model.is_empty() {
        eprintln!(
            "Warning: LLM not configured. Set OPENAI_BASE_URL, OPENAI_API_KEY, OPENAI_MODEL."
        );
        return Ok(None);
    }

    let mut retry = config.retry_config(&config.default_provider);
    if config.loop_control.max_retries_per_step > 0 {
        retry.max_retries = config.loop_control.max_retries_per_step;
    }
    println!("LLM: {model} @ {base_url} (retries: {})", retry.max_retries);

    let http = HttpClient::new(ClientConfig {
        base_url,
        api_key,
        model,
        timeout,
    })?;
    Ok(Some(Arc::new(RetryingClient::new(Arc::new(http), retry))))
}

fn install_handlers(soul: &mut Soul) {
    soul.handlers.on_message = Some(Box::new(|msg| match msg.kind {
        MessageKind::Assistant => println!("\nAssistant: {}", msg.first_text()),
        MessageKind::ToolCall => println!("\n[Tool Call] {}", msg.first_text()),
        MessageKind::ToolResult => println!("[Tool Result] {}", msg.first_text()),
        _ => {}
    }));

    soul.handlers.on_error = Some(Box::new(|err| {
        eprintln!("\nError: {err}");
    }));

    soul.handlers.on_approval_needed = Some(Box::new(|request| {
        println!("\nApproval needed: {request}");
        print!("Approve? [y]es once / [s]ession / [n]o: ");
        std::io::stdout().flush().ok();

        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return ApprovalDecision::Deny;
        }
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => ApprovalDecision::ApproveOnce,
            "s" | "session" => ApprovalDecision::ApproveSession,
            _ => ApprovalDecision::Deny,
        }
    }));
}

/// A system prompt carrying the runtime context: tools, OS, time, working
/// directory, and the project's AGENTS.md or README.md when present.
fn build_system_prompt(workdir: &Path) -> String {
    let mut prompt = String::from(
        "You are tandem, an interactive AI coding agent running on the user's computer.\n\
\n\
Your primary goal is to help the user with programming tasks safely and efficiently, \
leveraging available tools when needed.\n\
\n\
# Tool Use\n\
\n\
You have access to the following tools:\n\
\n\
- **shell**: Execute shell commands in the working directory. Use this for running builds, \
tests, git operations, package management, file searching, and any command-line tasks.\n\
- **file**: Perform file operations including read, write, list, delete, and exists checks. \
Use this for reading source code, writing new files, listing directory contents, and \
managing files.\n\
\n\
When handling the user's request, call available tools to accomplish the task. After tool \
calls return results, determine your next action: continue working, report \
completion/failure, or ask for clarification.\n\
\n\
When responding, use the SAME language as the user unless explicitly instructed otherwise.\n\
\n\
# Working Environment\n\n",
    );

    let _ = writeln!(
        prompt,
        "## Operating System\n\nThe operating system is `{}/{}`. This is NOT a sandbox — \
actions immediately affect the user's system. Be cautious. Unless explicitly instructed, \
do not access files outside the working directory.\n",
        std::env::consts::OS,
        std::env::consts::ARCH
    );

    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let _ = writeln!(
        prompt,
        "## Date and Time\n\nCurrent date and time: `{now}`. Use this as reference when \
needed. For exact time, use the shell tool.\n"
    );

    let _ = writeln!(
        prompt,
        "## Working Directory\n\nThe working directory is `{}`. This is the project root. \
File operations use relative paths from here.\n",
        workdir.display()
    );

    prompt.push_str("Directory listing:\n\n```\n");
    match std::fs::read_dir(workdir) {
        Ok(entries) => {
            let mut names: Vec<(bool, String)> = entries
                .flatten()
                .map(|e| {
                    (
                        e.file_type().map(|t| t.is_dir()).unwrap_or(false),
                        e.file_name().to_string_lossy().into_owned(),
                    )
                })
                .collect();
            names.sort_by(|a, b| a.1.cmp(&b.1));
            for (is_dir, name) in names {
                let prefix = if is_dir { "d " } else { "  " };
                let _ = writeln!(prompt, "{prefix}{name}");
            }
        }
        Err(_) => prompt.push_str("(unable to list directory)\n"),
    }
    prompt.push_str("```\n\n# Project Information\n\n");

    let mut doc_added = false;
    for doc in ["AGENTS.md", "README.md"] {
        if let Ok(content) = std::fs::read_to_string(workdir.join(doc)) {
            if content.is_empty() {
                continue;
            }
            let trimmed = if content.chars().count() > MAX_PROJECT_DOC_CHARS {
                let cut: String = content.chars().take(MAX_PROJECT_DOC_CHARS).collect();
                format!("{cut}\n... (truncated)")
            } else {
                content
            };
            let _ = writeln!(prompt, "The project `{doc}`:\n\n```\n{trimmed}\n```\n");
            doc_added = true;
            break;
        }
    }
    if !doc_added {
        prompt.push_str("No AGENTS.md or README.md found. Explore the project structure as needed.\n\n");
    }

    prompt.push_str(
        "# Reminders\n\
\n\
- Be HELPFUL, CONCISE, and ACCURATE.\n\
- Never diverge from the task requirements. Stay on track.\n\
- Make minimal changes — do not over-engineer.\n\
- Verify facts with tools when possible.\n\
- Think before you act. Do not give up too early.\n\
- Keep it simple.\n",
    );

    prompt
}

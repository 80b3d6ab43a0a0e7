// crates/command-gate-cli/src/main.rs
// ============================================================================
// Module: Command Gate CLI Entry Point
// Description: Command dispatcher for config, handshake, and serve workflows.
// Purpose: Provide a safe CLI for operators hosting a Command Gate gateway.
// Dependencies: clap, command-gate-config, command-gate-core, command-gate-gateway, tokio.
// ============================================================================

//! ## Overview
//! The Command Gate CLI validates configuration, issues and checks handshake
//! envelopes for local adapters, and hosts the gateway over a stdio
//! JSON-lines channel. All user-facing strings are routed through the message
//! catalog. Security posture: inputs are untrusted and must be validated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use command_gate_cli::serve::build_runtime;
use command_gate_cli::serve::startup_warnings;
use command_gate_cli::t;
use command_gate_config::CommandGateConfig;
use command_gate_config::config_toml_example;
use command_gate_core::HandshakeIssuer;
use command_gate_core::HandshakeSeed;
use command_gate_core::Role;
use command_gate_core::SandboxDecision;
use command_gate_core::SandboxPolicy;
use command_gate_core::SandboxRequest;
use command_gate_core::core::handshake;
use command_gate_core::core::time::system_clock;
use command_gate_gateway::StdioChannel;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a handshake envelope file.
const MAX_HANDSHAKE_BYTES: usize = 64 * 1024;
/// Maximum size of inline `--metadata` JSON.
const MAX_METADATA_BYTES: usize = 16 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "command-gate", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Host the gateway over a stdio JSON-lines channel.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Handshake envelope utilities.
    Handshake {
        /// Selected handshake subcommand.
        #[command(subcommand)]
        command: HandshakeCommand,
    },
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to command-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a configuration file and print a redacted summary.
    Check(ConfigCheckCommand),
    /// Print a canonical example configuration.
    Example,
}

/// Arguments for `config check`.
#[derive(Args, Debug)]
struct ConfigCheckCommand {
    /// Optional config file path (defaults to command-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Handshake subcommands.
#[derive(Subcommand, Debug)]
enum HandshakeCommand {
    /// Issue a handshake envelope.
    Issue(HandshakeIssueCommand),
    /// Validate a handshake envelope and optionally evaluate sandbox access.
    Verify(HandshakeVerifyCommand),
}

/// Role values accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum RoleArg {
    /// Privileged operator.
    Host,
    /// Restricted participant.
    Student,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Host => Self::Host,
            RoleArg::Student => Self::Student,
        }
    }
}

/// Arguments for `handshake issue`.
#[derive(Args, Debug)]
struct HandshakeIssueCommand {
    /// Adapter the envelope authorizes.
    #[arg(long, value_name = "ID")]
    adapter: String,
    /// Restrict the envelope to one tool.
    #[arg(long, value_name = "ID")]
    tool: Option<String>,
    /// Holder role.
    #[arg(long, value_enum, default_value = "host")]
    role: RoleArg,
    /// Lifetime in milliseconds (clamped to 24 hours).
    #[arg(long, value_name = "MS")]
    ttl_ms: Option<u64>,
    /// Session id (generated when omitted).
    #[arg(long, value_name = "ID")]
    session: Option<String>,
    /// Metadata JSON embedded after sanitization.
    #[arg(long, value_name = "JSON")]
    metadata: Option<String>,
}

/// Arguments for `handshake verify`.
#[derive(Args, Debug)]
struct HandshakeVerifyCommand {
    /// Path to the envelope JSON.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
    /// Adapter to evaluate sandbox access for.
    #[arg(long, value_name = "ID", requires = "tool")]
    adapter: Option<String>,
    /// Tool to evaluate sandbox access for.
    #[arg(long, value_name = "ID", requires = "adapter")]
    tool: Option<String>,
    /// Role the caller claims.
    #[arg(long, value_enum)]
    role: Option<RoleArg>,
    /// Config file whose `[sandbox]` prefixes drive the decision.
    #[arg(long, value_name = "PATH", requires = "adapter")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing failures.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a catalog message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => command_config(command),
        Commands::Handshake {
            command,
        } => command_handshake(command),
    }
}

/// Writes top-level help to stdout.
fn show_help() -> CliResult<()> {
    let help = Cli::command().render_help().to_string();
    write_stdout_line(&help).map_err(|err| CliError::new(output_error("stdout", &err)))
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Hosts the gateway until stdin closes.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = CommandGateConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(t!("serve.config.load_failed", error = err)))?;
    let runtime =
        build_runtime(&config).map_err(|err| CliError::new(t!("serve.start_failed", error = err)))?;
    for warning in startup_warnings(runtime.options()) {
        write_stderr_line(&warning).map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    let channel = StdioChannel::stdio();
    let handle =
        runtime.start(&channel).map_err(|err| CliError::new(t!("serve.start_failed", error = err)))?;
    write_stderr_line(&t!("serve.ready", channel = runtime.options().channel))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    handle.wait().await;
    channel.flushed().await;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Check(command) => command_config_check(&command),
        ConfigCommand::Example => {
            write_stdout_bytes(config_toml_example().as_bytes())
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Validates a config file and prints its redacted summary.
fn command_config_check(command: &ConfigCheckCommand) -> CliResult<ExitCode> {
    let config = CommandGateConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    write_stdout_line(&t!("config.check.ok")).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_json(&config.redacted_summary())?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Handshake Commands
// ============================================================================

/// Dispatches handshake subcommands.
fn command_handshake(command: HandshakeCommand) -> CliResult<ExitCode> {
    match command {
        HandshakeCommand::Issue(command) => command_handshake_issue(command),
        HandshakeCommand::Verify(command) => command_handshake_verify(&command),
    }
}

/// Issues an envelope at the current time.
fn command_handshake_issue(command: HandshakeIssueCommand) -> CliResult<ExitCode> {
    let metadata = match command.metadata.as_deref() {
        Some(raw) => Some(parse_json_limited("metadata", raw, MAX_METADATA_BYTES)?),
        None => None,
    };
    let seed = HandshakeSeed {
        session_id: command.session,
        adapter_id: command.adapter,
        tool_id: command.tool,
        role: command.role.into(),
        ttl_ms: command.ttl_ms,
        metadata,
    };
    let envelope = HandshakeIssuer::new(system_clock())
        .issue(seed)
        .map_err(|err| CliError::new(t!("handshake.issue_failed", error = err)))?;
    write_json(&envelope.to_value())?;
    Ok(ExitCode::SUCCESS)
}

/// Validates an envelope file and reports expiry and sandbox access.
fn command_handshake_verify(command: &HandshakeVerifyCommand) -> CliResult<ExitCode> {
    let raw = read_file_limited(&command.file, MAX_HANDSHAKE_BYTES)?;
    let candidate = parse_json_limited("handshake", &raw, MAX_HANDSHAKE_BYTES)?;
    let envelope = handshake::validate(&candidate)
        .map_err(|err| CliError::new(t!("handshake.verify_failed", error = err)))?;
    let now_ms = system_clock().now_ms();
    let mut report = json!({
        "valid": true,
        "expired": envelope.is_expired(now_ms),
        "remainingMs": u64::try_from(envelope.remaining(now_ms).as_millis()).unwrap_or(u64::MAX),
        "envelope": envelope.to_value(),
    });
    let mut allowed = true;
    if let (Some(adapter_id), Some(tool_id)) = (command.adapter.as_deref(), command.tool.as_deref()) {
        let policy = match command.config.as_deref() {
            Some(path) => CommandGateConfig::load(Some(path))
                .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?
                .sandbox_policy(),
            None => SandboxPolicy::default(),
        };
        let decision = policy.decide(&SandboxRequest {
            adapter_id,
            tool_id,
            role: command.role.map(Role::from),
            handshake: Some(&candidate),
            now_ms,
        });
        allowed = decision.is_allowed();
        report["sandbox"] = decision_report(&decision);
    }
    write_json(&report)?;
    Ok(if allowed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Renders a sandbox decision for output.
fn decision_report(decision: &SandboxDecision) -> Value {
    match decision {
        SandboxDecision::Allow {
            reason,
            requires_handshake,
            session_id,
        } => json!({
            "allowed": true,
            "reason": reason.label(),
            "requiresHandshake": requires_handshake,
            "sessionId": session_id,
        }),
        SandboxDecision::Deny {
            reason,
            message,
            ..
        } => json!({
            "allowed": false,
            "reason": reason.label(),
            "message": message,
        }),
    }
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Reads a UTF-8 file, refusing anything over `limit` bytes.
fn read_file_limited(path: &Path, limit: usize) -> CliResult<String> {
    let display = path.display();
    let metadata = fs::metadata(path)
        .map_err(|err| CliError::new(t!("input.read_failed", path = display, error = err)))?;
    let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
    if size > limit {
        return Err(CliError::new(t!("input.read_too_large", path = display, size = size, limit = limit)));
    }
    fs::read_to_string(path).map_err(|err| CliError::new(t!("input.read_failed", path = display, error = err)))
}

/// Parses JSON text, refusing anything over `limit` bytes.
fn parse_json_limited(kind: &str, raw: &str, limit: usize) -> CliResult<Value> {
    if raw.len() > limit {
        return Err(CliError::new(t!("input.read_too_large", path = kind, size = raw.len(), limit = limit)));
    }
    serde_json::from_str(raw).map_err(|err| CliError::new(t!("input.parse_failed", kind = kind, error = err)))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes pretty JSON followed by a newline to stdout.
fn write_json(value: &Value) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(t!("output.serialize_failed", error = err)))?;
    write_stdout_line(&rendered).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    let stream_label = match stream {
        "stdout" => t!("output.stream.stdout"),
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.unknown"),
    };
    t!("output.write_failed", stream = stream_label, error = error)
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}

// crates/fieldpack-cli/src/main.rs
// ============================================================================
// Module: Fieldpack CLI Entry Point
// Description: Command dispatcher for producer and consumer bundle workflows.
// Purpose: Provide a safe CLI with stable exit codes for sealing and acceptance.
// Dependencies: clap, fieldpack-core, fieldpack-store-sqlite, fieldpack-config, serde, thiserror.
// ============================================================================

//! ## Overview
//! The Fieldpack CLI drives both sides of the bundle protocol: producer
//! commands manage keys, the content store, and sealing; consumer commands
//! verify, import, review, and replay. Structured results are written to
//! stdout as canonical JSON and every other user-facing string is routed
//! through the i18n catalog.
//!
//! Exit codes: `0` success, `2` a verdict or refusal described in the JSON
//! output, `1` any environment failure (config, keys, store, I/O).

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use fieldpack_cli::t;
use fieldpack_config::AuditSinkKind;
use fieldpack_config::FieldpackConfig;
use fieldpack_core::Allowlist;
use fieldpack_core::BundleSealer;
use fieldpack_core::BundleVerifier;
use fieldpack_core::CasKind;
use fieldpack_core::Clock;
use fieldpack_core::ContentStore;
use fieldpack_core::ContractKind;
use fieldpack_core::FieldpackAuditSink;
use fieldpack_core::FileAuditSink;
use fieldpack_core::MeapPolicy;
use fieldpack_core::NoopAuditSink;
use fieldpack_core::PolicyMode;
use fieldpack_core::SealRequest;
use fieldpack_core::ShapeSet;
use fieldpack_core::StderrAuditSink;
use fieldpack_core::SystemClock;
use fieldpack_core::UtcTimestamp;
use fieldpack_core::canonical_json_bytes;
use fieldpack_core::core::keys::load_signing_key;
use fieldpack_core::load_or_create;
use fieldpack_store_sqlite::AcceptError;
use fieldpack_store_sqlite::AcceptRequest;
use fieldpack_store_sqlite::AcceptanceEngine;
use fieldpack_store_sqlite::FieldpackStore;
use fieldpack_store_sqlite::ReviewOutcome;
use fieldpack_store_sqlite::StagedStatus;
use fieldpack_store_sqlite::replay_verify;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a file stored into the CAS.
const MAX_CAS_INPUT_BYTES: usize = 256 * 1024 * 1024;
/// Maximum size of a delta, provenance log, or contract input.
const MAX_DOCUMENT_BYTES: usize = 64 * 1024 * 1024;
/// Exit code for verdicts and refusals described on stdout.
const EXIT_REFUSED: u8 = 2;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "fieldpack", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Config file (overrides `FIELDPACK_CONFIG` and `./fieldpack.toml`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Producer key management.
    Keys {
        /// Selected keys subcommand.
        #[command(subcommand)]
        command: KeysCommand,
    },
    /// Content-addressable store utilities.
    Cas {
        /// Selected CAS subcommand.
        #[command(subcommand)]
        command: CasCommand,
    },
    /// Seal the CAS into a signed bundle.
    Seal(SealCommand),
    /// Verify a bundle against local governance.
    Verify(VerifyCommand),
    /// Offer a bundle to the local graph.
    Import(ImportCommand),
    /// Review staged bundles.
    Staged {
        /// Selected staged subcommand.
        #[command(subcommand)]
        command: StagedCommand,
    },
    /// Replay the delta ledger and verify every chain.
    Replay,
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Key subcommands.
#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Load the producer key pair, generating it when absent.
    Init,
}

/// CAS subcommands.
#[derive(Subcommand, Debug)]
enum CasCommand {
    /// Create the CAS directory layout.
    Init,
    /// Store a file and print its digest.
    Put(CasPutCommand),
    /// Copy a stored object to a file.
    Get(CasGetCommand),
}

/// CAS partition argument.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum CasKindArg {
    /// Raw ingested input.
    Raw,
    /// Derived or extracted text.
    Extract,
    /// Auxiliary material.
    Aux,
}

impl From<CasKindArg> for CasKind {
    fn from(value: CasKindArg) -> Self {
        match value {
            CasKindArg::Raw => Self::Raw,
            CasKindArg::Extract => Self::Extract,
            CasKindArg::Aux => Self::Aux,
        }
    }
}

/// Arguments for `cas put`.
#[derive(Args, Debug)]
struct CasPutCommand {
    /// CAS partition.
    #[arg(long, value_enum)]
    kind: CasKindArg,
    /// File to store.
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

/// Arguments for `cas get`.
#[derive(Args, Debug)]
struct CasGetCommand {
    /// CAS partition.
    #[arg(long, value_enum)]
    kind: CasKindArg,
    /// Object digest (64 lowercase hex characters).
    #[arg(value_name = "DIGEST")]
    digest: String,
    /// Output file.
    #[arg(long, value_name = "FILE")]
    out: PathBuf,
}

/// Arguments for `seal`.
#[derive(Args, Debug)]
struct SealCommand {
    /// Bundle label (`[A-Za-z0-9._-]`, 1 to 64 characters).
    #[arg(long)]
    label: String,
    /// Sealing time as unix seconds; defaults to now.
    #[arg(long, value_name = "N")]
    created_unix_secs: Option<i64>,
    /// Provenance JSONL to embed; a seal event log is generated otherwise.
    #[arg(long, value_name = "FILE")]
    provenance: Option<PathBuf>,
    /// Graph delta JSONL to embed.
    #[arg(long, value_name = "FILE")]
    delta: Option<PathBuf>,
    /// Interface contract named `studspec.json` or `tubespec.json`.
    #[arg(long, value_name = "FILE")]
    contract: Vec<PathBuf>,
}

/// Arguments for `verify`.
#[derive(Args, Debug)]
struct VerifyCommand {
    /// Bundle archive.
    #[arg(long, value_name = "PATH")]
    bundle: PathBuf,
}

/// Arguments for `import`.
#[derive(Args, Debug)]
struct ImportCommand {
    /// Bundle archive.
    #[arg(long, value_name = "PATH")]
    bundle: PathBuf,
    /// Mode overriding the policy default.
    #[arg(long, value_name = "MODE", value_parser = parse_mode)]
    mode: Option<PolicyMode>,
    /// Report already recorded bundles instead of re-applying them.
    #[arg(long, action = ArgAction::SetTrue)]
    idempotent: bool,
    /// Actor recorded on staged rows.
    #[arg(long)]
    actor: Option<String>,
    /// Notes recorded with the outcome.
    #[arg(long)]
    notes: Option<String>,
}

/// Staged review subcommands.
#[derive(Subcommand, Debug)]
enum StagedCommand {
    /// List staged bundles, newest first.
    List(StagedListCommand),
    /// Approve a staged bundle.
    Approve(StagedDecisionCommand),
    /// Reject a staged bundle.
    Reject(StagedDecisionCommand),
}

/// Arguments for `staged list`.
#[derive(Args, Debug)]
struct StagedListCommand {
    /// Effective status filter.
    #[arg(long, value_name = "STATUS", value_parser = parse_status)]
    status: Option<StagedStatus>,
}

/// Arguments for `staged approve` and `staged reject`.
#[derive(Args, Debug)]
struct StagedDecisionCommand {
    /// Staged row id.
    #[arg(long)]
    id: i64,
    /// Reviewer.
    #[arg(long)]
    actor: String,
    /// Reviewer notes.
    #[arg(long)]
    notes: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration.
    Validate,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for localized error messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a localized message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Refusal document written to stdout.
#[derive(Serialize)]
struct Refusal<'a> {
    /// Always false.
    ok: bool,
    /// Machine-readable reason.
    reason: &'a str,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
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

    let config = FieldpackConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    if let Commands::Config {
        command: ConfigCommand::Validate,
    } = command
    {
        write_stdout_line(&t!("config.validate.ok"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = Context {
        audit: build_audit_sink(&config)?,
        config,
    };
    match command {
        Commands::Keys {
            command: KeysCommand::Init,
        } => command_keys_init(&ctx),
        Commands::Cas {
            command,
        } => command_cas(&ctx, command),
        Commands::Seal(command) => command_seal(&ctx, &command),
        Commands::Verify(command) => command_verify(&ctx, &command),
        Commands::Import(command) => command_import(&ctx, command),
        Commands::Staged {
            command,
        } => command_staged(&ctx, command),
        Commands::Replay => command_replay(&ctx),
        Commands::Config {
            ..
        } => Ok(ExitCode::SUCCESS),
    }
}

/// Prints CLI help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Loaded configuration and the audit sink built from it.
struct Context {
    /// Validated configuration.
    config: FieldpackConfig,
    /// Audit sink shared by every command.
    audit: Arc<dyn FieldpackAuditSink>,
}

impl Context {
    /// Content store rooted at the configured path.
    fn cas(&self) -> ContentStore {
        ContentStore::new(self.config.resolve(&self.config.paths.cas_root))
    }

    /// Loads the local policy.
    fn policy(&self) -> CliResult<MeapPolicy> {
        let path = self.config.resolve(&self.config.governance.policy);
        MeapPolicy::load(&path).map_err(|err| {
            CliError::new(t!("governance.policy_failed", path = path.display(), error = err))
        })
    }

    /// Loads the local allowlist.
    fn allowlist(&self) -> CliResult<Allowlist> {
        let path = self.config.resolve(&self.config.governance.allowlist);
        Allowlist::load(&path).map_err(|err| {
            CliError::new(t!("governance.allowlist_failed", path = path.display(), error = err))
        })
    }

    /// Loads configured graph shapes, or the built-in set.
    fn shapes(&self) -> CliResult<ShapeSet> {
        let Some(path) = self.config.governance.shapes.as_deref() else {
            return Ok(ShapeSet::default());
        };
        let path = self.config.resolve(path);
        ShapeSet::load(&path).map_err(|err| {
            CliError::new(t!("governance.shapes_failed", path = path.display(), error = err))
        })
    }

    /// Opens the consumer store.
    fn store(&self) -> CliResult<FieldpackStore> {
        let config = self.config.store_config();
        let path = config.path.display().to_string();
        FieldpackStore::open(config)
            .map_err(|err| CliError::new(t!("store.open_failed", path = path, error = err)))
    }

    /// Builds the acceptance engine from local governance.
    fn engine(&self) -> CliResult<AcceptanceEngine> {
        Ok(AcceptanceEngine::new(self.store()?, self.policy()?, self.allowlist()?)
            .with_limits(self.config.accept.limits())
            .with_shapes(self.shapes()?)
            .with_clock(Arc::new(SystemClock))
            .with_audit(Arc::clone(&self.audit))
            .with_graph_ledger(self.config.graph_ledger_path()))
    }
}

/// Builds the configured audit sink.
fn build_audit_sink(config: &FieldpackConfig) -> CliResult<Arc<dyn FieldpackAuditSink>> {
    match (config.audit.sink, config.audit.path.as_deref()) {
        (AuditSinkKind::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
        (AuditSinkKind::None, _) => Ok(Arc::new(NoopAuditSink)),
        (AuditSinkKind::File, Some(path)) => {
            let path = config.resolve(path);
            let sink = FileAuditSink::new(&path).map_err(|err| {
                CliError::new(t!("audit.open_failed", path = path.display(), error = err))
            })?;
            Ok(Arc::new(sink))
        }
        (AuditSinkKind::File, None) => Ok(Arc::new(NoopAuditSink)),
    }
}

// ============================================================================
// SECTION: Producer Commands
// ============================================================================

/// Key pair summary.
#[derive(Serialize)]
struct KeyInfo {
    /// Key identifier.
    key_id: String,
    /// Base64 public key.
    public_key: String,
    /// Public key file.
    public_key_path: String,
}

/// Executes `keys init`.
fn command_keys_init(ctx: &Context) -> CliResult<ExitCode> {
    let paths = &ctx.config.paths;
    let public_path = ctx.config.resolve(&paths.public_key);
    let pair = load_or_create(&ctx.config.resolve(&paths.signing_key), &public_path)
        .map_err(|err| CliError::new(t!("keys.failed", error = err)))?;
    write_json(&KeyInfo {
        key_id: pair.key_id(),
        public_key: pair.public_key().to_base64(),
        public_key_path: public_path.display().to_string(),
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Stored CAS object summary.
#[derive(Serialize)]
struct CasObject {
    /// Partition.
    kind: CasKind,
    /// Object digest.
    digest: String,
    /// Object size in bytes.
    bytes: usize,
}

/// Dispatches CAS subcommands.
fn command_cas(ctx: &Context, command: CasCommand) -> CliResult<ExitCode> {
    let cas = ctx.cas();
    let cas_error = |err: fieldpack_core::CasError| CliError::new(t!("cas.failed", error = err));
    match command {
        CasCommand::Init => {
            cas.init().map_err(cas_error)?;
            write_stdout_line(&cas.root().display().to_string())
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
        CasCommand::Put(command) => {
            let bytes = read_input(&command.file, &t!("input.kind.cas"), MAX_CAS_INPUT_BYTES)?;
            let kind = CasKind::from(command.kind);
            let digest = cas.put(&bytes, kind).map_err(cas_error)?;
            write_json(&CasObject {
                kind,
                digest,
                bytes: bytes.len(),
            })?;
        }
        CasCommand::Get(command) => {
            let kind = CasKind::from(command.kind);
            let bytes = cas.get(&command.digest, kind).map_err(cas_error)?;
            fs::write(&command.out, &bytes).map_err(|err| {
                CliError::new(t!("cas.write_failed", path = command.out.display(), error = err))
            })?;
            write_json(&CasObject {
                kind,
                digest: command.digest,
                bytes: bytes.len(),
            })?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `seal`.
fn command_seal(ctx: &Context, command: &SealCommand) -> CliResult<ExitCode> {
    let producer = &ctx.config.producer;
    let signer = if producer.signing_enabled {
        let path = ctx.config.resolve(&ctx.config.paths.signing_key);
        Some(load_signing_key(&path).map_err(|err| CliError::new(t!("keys.failed", error = err)))?)
    } else {
        None
    };
    let request = SealRequest {
        toolchain_id: producer.toolchain_id.clone(),
        label: command.label.clone(),
        created_utc: command
            .created_unix_secs
            .map_or_else(|| SystemClock.now(), UtcTimestamp::from_unix_seconds),
        policy_hash: optional_policy_hash(ctx)?,
        allowlist_hash: optional_allowlist_hash(ctx)?,
        provenance_jsonl: command
            .provenance
            .as_deref()
            .map(|path| read_text(path, &t!("input.kind.provenance")))
            .transpose()?,
        kg_delta_jsonl: command
            .delta
            .as_deref()
            .map(|path| read_text(path, &t!("input.kind.delta")))
            .transpose()?,
        contracts: read_contracts(&command.contract)?,
    };
    let cas = ctx.cas();
    let sealer = BundleSealer::new(
        &cas,
        producer.inclusion_flags(),
        producer.signing_enabled,
        signer.as_ref(),
        ctx.audit.as_ref(),
    );
    let out_dir = ctx.config.resolve(&ctx.config.paths.bundles_dir);
    let sealed = sealer
        .seal(&request, &out_dir)
        .map_err(|err| CliError::new(t!("seal.failed", error = err)))?;
    write_json(&sealed)?;
    Ok(ExitCode::SUCCESS)
}

/// Hash of the producer's policy document, when present.
fn optional_policy_hash(ctx: &Context) -> CliResult<Option<String>> {
    if !ctx.config.resolve(&ctx.config.governance.policy).is_file() {
        return Ok(None);
    }
    let hash = ctx
        .policy()?
        .canonical_hash()
        .map_err(|err| CliError::new(t!("seal.failed", error = err)))?;
    Ok(Some(hash))
}

/// Hash of the producer's allowlist document, when present.
fn optional_allowlist_hash(ctx: &Context) -> CliResult<Option<String>> {
    if !ctx.config.resolve(&ctx.config.governance.allowlist).is_file() {
        return Ok(None);
    }
    let hash = ctx
        .allowlist()?
        .canonical_hash()
        .map_err(|err| CliError::new(t!("seal.failed", error = err)))?;
    Ok(Some(hash))
}

/// Reads contract files, inferring their kind from the file name.
fn read_contracts(paths: &[PathBuf]) -> CliResult<Vec<(ContractKind, Vec<u8>)>> {
    paths
        .iter()
        .map(|path| {
            let kind = contract_kind(path).ok_or_else(|| {
                CliError::new(t!("seal.contract_unknown", path = path.display()))
            })?;
            Ok((kind, read_input(path, &t!("input.kind.contract"), MAX_DOCUMENT_BYTES)?))
        })
        .collect()
}

/// Contract kind whose archive entry name matches the file name.
fn contract_kind(path: &Path) -> Option<ContractKind> {
    let name = path.file_name()?.to_str()?;
    ContractKind::ALL.into_iter().find(|kind| kind.entry_name() == name)
}

// ============================================================================
// SECTION: Consumer Commands
// ============================================================================

/// Executes `verify`.
fn command_verify(ctx: &Context, command: &VerifyCommand) -> CliResult<ExitCode> {
    let policy = ctx.policy()?;
    let allowlist = ctx.allowlist()?;
    let result = BundleVerifier::new(&policy, &allowlist, ctx.audit.as_ref())
        .verify(&command.bundle)
        .map_err(|err| CliError::new(t!("verify.failed", error = err)))?;
    write_json(&result)?;
    Ok(verdict_code(result.ok))
}

/// Executes `import`.
fn command_import(ctx: &Context, command: ImportCommand) -> CliResult<ExitCode> {
    let engine = ctx.engine()?;
    let request = AcceptRequest {
        bundle_path: command.bundle,
        mode_override: command.mode,
        idempotent: command.idempotent,
        actor: command.actor,
        notes: command.notes,
    };
    match engine.accept(&request) {
        Ok(outcome) => {
            write_json(&outcome)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(AcceptError::Refused {
            reason,
        }) => write_refusal(&reason),
        Err(err) => Err(CliError::new(t!("accept.failed", error = err))),
    }
}

/// Dispatches staged review subcommands.
fn command_staged(ctx: &Context, command: StagedCommand) -> CliResult<ExitCode> {
    match command {
        StagedCommand::List(command) => {
            let entries = ctx
                .store()?
                .list_staged(command.status)
                .map_err(|err| CliError::new(t!("staged.list_failed", error = err)))?;
            write_json(&entries)?;
            Ok(ExitCode::SUCCESS)
        }
        StagedCommand::Approve(command) => {
            let engine = ctx.engine()?;
            review_result(engine.approve(command.id, &command.actor, command.notes.as_deref()))
        }
        StagedCommand::Reject(command) => {
            let engine = ctx.engine()?;
            review_result(engine.reject(command.id, &command.actor, command.notes.as_deref()))
        }
    }
}

/// Renders a review decision.
fn review_result(result: Result<ReviewOutcome, AcceptError>) -> CliResult<ExitCode> {
    match result {
        Ok(outcome) => {
            write_json(&outcome)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(AcceptError::Refused {
            reason,
        }) => write_refusal(&reason),
        Err(err) => Err(CliError::new(t!("review.failed", error = err))),
    }
}

/// Executes `replay`.
fn command_replay(ctx: &Context) -> CliResult<ExitCode> {
    let store = ctx.store()?;
    let ledger = ctx.config.graph_ledger_path();
    let report = replay_verify(&store, ledger.as_deref(), ctx.audit.as_ref())
        .map_err(|err| CliError::new(t!("replay.failed", error = err)))?;
    write_json(&report)?;
    Ok(verdict_code(report.ok()))
}

/// Maps a verdict onto the success or refusal exit code.
fn verdict_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::from(EXIT_REFUSED) }
}

/// Writes a refusal document and returns the refusal exit code.
fn write_refusal(reason: &str) -> CliResult<ExitCode> {
    write_json(&Refusal {
        ok: false,
        reason,
    })?;
    Ok(ExitCode::from(EXIT_REFUSED))
}

// ============================================================================
// SECTION: Argument Parsers
// ============================================================================

/// Parses a policy mode label, case-insensitively.
fn parse_mode(value: &str) -> Result<PolicyMode, String> {
    value.parse::<PolicyMode>().map_err(|err| err.to_string())
}

/// Parses a staged status label, case-insensitively.
fn parse_status(value: &str) -> Result<StagedStatus, String> {
    value.parse::<StagedStatus>().map_err(|err| err.to_string())
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Errors raised while reading bounded inputs.
#[derive(Debug)]
enum ReadLimitError {
    /// I/O failure.
    Io(std::io::Error),
    /// Input exceeds the limit.
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Reads a bounded input file, mapping failures to localized errors.
fn read_input(path: &Path, kind: &str, max_bytes: usize) -> CliResult<Vec<u8>> {
    read_bytes_with_limit(path, max_bytes).map_err(|err| match err {
        ReadLimitError::Io(error) => CliError::new(t!(
            "input.read_failed",
            kind = kind,
            path = path.display(),
            error = error
        )),
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(t!(
            "input.read_too_large",
            kind = kind,
            path = path.display(),
            size = size,
            limit = limit
        )),
    })
}

/// Reads a bounded UTF-8 document.
fn read_text(path: &Path, kind: &str) -> CliResult<String> {
    let bytes = read_input(path, kind, MAX_DOCUMENT_BYTES)?;
    String::from_utf8(bytes)
        .map_err(|_| CliError::new(t!("input.not_utf8", kind = kind, path = path.display())))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

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

/// Writes canonical JSON followed by a newline to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = canonical_json_bytes(value)
        .map_err(|err| CliError::new(t!("output.serialize_failed", error = err)))?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats a localized output error message.
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

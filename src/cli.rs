use crate::config::settings::PipelineConfig;
use crate::config::types::{HostEnvironment, Operand, PipelineError};
use crate::exec::strategy::{CommandStep, ToolInvocation};
use crate::pipeline::wire::{self, CompileRequestBody};
use crate::pipeline::{CompileRequest, Pipeline, PipelineResult};
use crate::safety::workspace::WorkspaceManager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INVALID: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./compilebox.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Toolchain installation root
    #[arg(long, global = true)]
    toolchain_root: Option<PathBuf>,
    /// Host environment: auto, native or delegated
    #[arg(long, global = true)]
    host: Option<HostEnvironment>,
    /// Compile stage wall-clock limit in milliseconds
    #[arg(long, global = true)]
    compile_timeout_ms: Option<u64>,
    /// Assemble-and-run stage wall-clock limit in milliseconds
    #[arg(long, global = true)]
    run_timeout_ms: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile and run one source and print the JSON response
    Compile {
        /// Read the source from a file
        #[arg(long, conflicts_with_all = ["code", "request"])]
        file: Option<PathBuf>,
        /// Source code as string
        #[arg(long, conflicts_with = "request")]
        code: Option<String>,
        /// JSON request body (`{"kotlin_code": ...}` or `{"code": ...}`), `-` for stdin
        #[arg(long)]
        request: Option<String>,
        /// Pretty-print the response
        #[arg(long)]
        pretty: bool,
    },
    /// Run every source file in a directory through the pipeline
    Batch {
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        output_dir: PathBuf,
        /// Maximum concurrent pipeline runs
        #[arg(long, default_value_t = 4)]
        jobs: usize,
    },
    /// Check that the compiler, assembler and shell are usable
    CheckToolchain {
        /// Verbose output showing probe details
        #[arg(long)]
        verbose: bool,
    },
    /// Remove workspaces left behind under the scratch root
    Sweep {
        /// Only remove workspaces older than this many seconds
        #[arg(long, default_value_t = 3600)]
        max_age_secs: u64,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let code = runtime.block_on(dispatch(cli.command, config))?;
    // Drop the runtime first so in-flight cleanup finishes before exiting
    drop(runtime);

    if code != EXIT_OK {
        std::process::exit(code);
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load_from_file(path)?,
        None => PipelineConfig::load_default()?,
    };

    if let Some(root) = &cli.toolchain_root {
        config.toolchain.root = root.clone();
    }
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(ms) = cli.compile_timeout_ms {
        config.limits.compile_timeout_ms = ms;
    }
    if let Some(ms) = cli.run_timeout_ms {
        config.limits.run_timeout_ms = ms;
    }

    config.validate()?;
    config.resolve_paths()?;
    Ok(config)
}

async fn dispatch(command: Commands, config: PipelineConfig) -> Result<i32> {
    match command {
        Commands::Compile {
            file,
            code,
            request,
            pretty,
        } => {
            let pipeline = Pipeline::new(config)?;
            compile_one(&pipeline, file, code, request, pretty).await
        }
        Commands::Batch {
            input_dir,
            output_dir,
            jobs,
        } => {
            let pipeline = Arc::new(Pipeline::new(config)?);
            run_batch(pipeline, &input_dir, &output_dir, jobs).await
        }
        Commands::CheckToolchain { verbose } => {
            let pipeline = Pipeline::new(config)?;
            check_toolchain(&pipeline, verbose).await
        }
        Commands::Sweep { max_age_secs } => {
            let manager = WorkspaceManager::new(config.scratch_root(), config.workspace_prefix())?;
            let removed = manager.sweep_stale(Duration::from_secs(max_age_secs))?;
            info!(
                "Swept {} stale workspace(s) under {}",
                removed,
                manager.scratch_root().display()
            );
            let report = serde_json::json!({
                "scratch_root": manager.scratch_root().display().to_string(),
                "removed": removed,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(EXIT_OK)
        }
    }
}

fn read_request(
    file: Option<PathBuf>,
    code: Option<String>,
    request: Option<String>,
) -> Result<std::result::Result<CompileRequest, PipelineError>> {
    let source = if let Some(path) = file {
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?
    } else if let Some(code) = code {
        code
    } else if let Some(request) = request {
        let json = if request == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request from stdin")?;
            buf
        } else {
            request
        };
        return Ok(CompileRequestBody::from_json(&json).and_then(CompileRequestBody::into_request));
    } else {
        anyhow::bail!("one of --file, --code or --request is required");
    };

    Ok(CompileRequest::new(source))
}

async fn compile_one(
    pipeline: &Pipeline,
    file: Option<PathBuf>,
    code: Option<String>,
    request: Option<String>,
    pretty: bool,
) -> Result<i32> {
    let outcome = match read_request(file, code, request)? {
        Ok(request) => {
            tokio::select! {
                outcome = pipeline.execute(&request) => outcome,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted, cancelling pipeline run");
                    return Ok(EXIT_INTERRUPTED);
                }
            }
        }
        Err(e) => Err(e),
    };

    let (status, body) = wire::respond(&outcome);
    println!("{}", body.to_json(pretty));
    info!("compile finished with status {}", status.code());

    Ok(exit_code_for(&outcome))
}

fn exit_code_for(outcome: &crate::Result<PipelineResult>) -> i32 {
    match outcome {
        Ok(result) if result.is_success() => EXIT_OK,
        Ok(_) => EXIT_FAILURE,
        Err(e) if e.is_validation() => EXIT_INVALID,
        Err(_) => EXIT_FAILURE,
    }
}

#[derive(Debug, Serialize)]
struct BatchItem {
    input: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct BatchSummary {
    total: usize,
    succeeded: usize,
    failed: usize,
    items: Vec<BatchItem>,
}

impl BatchSummary {
    fn record(&mut self, item: BatchItem) {
        self.total += 1;
        if item.status == "ok" {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.items.push(item);
    }
}

fn batch_inputs(input_dir: &Path, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(input_dir)
        .with_context(|| format!("failed to read {}", input_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = match extension {
            Some(ext) => path.extension().and_then(|e| e.to_str()) == Some(ext),
            None => true,
        };
        if matches {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}

async fn run_batch(
    pipeline: Arc<Pipeline>,
    input_dir: &Path,
    output_dir: &Path,
    jobs: usize,
) -> Result<i32> {
    let extension = pipeline
        .config()
        .toolchain
        .source_extension()
        .map(str::to_string);
    let inputs = batch_inputs(input_dir, extension.as_deref())?;
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    info!("Batch of {} input(s), {} job(s)", inputs.len(), jobs.max(1));

    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let mut set = JoinSet::new();
    for input in inputs {
        let permit = semaphore.clone().acquire_owned().await?;
        let pipeline = pipeline.clone();
        let output_dir = output_dir.to_path_buf();
        set.spawn(async move {
            let _permit = permit;
            batch_item(&pipeline, &input, &output_dir).await
        });
    }

    let mut summary = BatchSummary::default();
    loop {
        let joined = tokio::select! {
            joined = set.join_next() => Some(joined),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(joined) = joined else {
            warn!("Interrupted, cancelling {} batch run(s)", set.len());
            set.shutdown().await;
            return Ok(EXIT_INTERRUPTED);
        };
        match joined {
            Some(Ok(item)) => summary.record(item),
            Some(Err(e)) => warn!("Batch task failed: {}", e),
            None => break,
        }
    }
    summary.items.sort_by(|a, b| a.input.cmp(&b.input));

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(if summary.failed == 0 { EXIT_OK } else { EXIT_FAILURE })
}

async fn batch_item(pipeline: &Pipeline, input: &Path, output_dir: &Path) -> BatchItem {
    let name = input.display().to_string();
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());

    let outcome = match tokio::fs::read_to_string(input).await {
        Ok(source) => pipeline.execute_source(&source).await,
        Err(e) => Err(PipelineError::Io(e)),
    };

    let (status, error) = match &outcome {
        Ok(result) if result.is_success() => {
            let writes = async {
                tokio::fs::write(output_dir.join(format!("{stem}.s")), &result.assembly).await?;
                tokio::fs::write(
                    output_dir.join(format!("{stem}.stdout.txt")),
                    &result.program_output,
                )
                .await?;
                Ok::<(), std::io::Error>(())
            };
            match writes.await {
                Ok(()) => ("ok", None),
                Err(e) => ("error", Some(format!("failed to write outputs: {e}"))),
            }
        }
        Ok(result) => ("compile_error", result.error.clone()),
        Err(e) if e.is_validation() => ("invalid", Some(e.to_string())),
        Err(e) => ("error", Some(e.to_string())),
    };

    if let Some(message) = &error {
        let path = output_dir.join(format!("{stem}.error.txt"));
        if let Err(e) = tokio::fs::write(&path, message).await {
            warn!("Failed to write {}: {}", path.display(), e);
        }
    }

    BatchItem {
        input: name,
        status,
        error,
    }
}

async fn check_toolchain(pipeline: &Pipeline, verbose: bool) -> Result<i32> {
    let config = &pipeline.config().toolchain;
    let root = pipeline.toolchain().root().to_path_buf();

    println!("🔍 Checking toolchain ({})...", pipeline.toolchain().name());
    println!("   host: {}, strategy: {}", pipeline.config().host.resolve(), pipeline.strategy_name());
    println!();

    let mut all_ok = true;

    let compiler = config.compiler_path();
    if compiler.is_file() {
        println!("✅ compiler - OK");
        if verbose {
            println!("  {}", compiler.display());
        }
    } else {
        println!("❌ compiler - MISSING");
        if verbose {
            println!("  {} -> NOT FOUND", compiler.display());
        }
        all_ok = false;
    }

    let probes = [
        (
            "assembler",
            ToolInvocation::single(
                "Assembler",
                CommandStep::new(Operand::literal(&config.assembler)).arg(Operand::literal("--version")),
                root.clone(),
            ),
        ),
        (
            "shell",
            ToolInvocation::chain(
                "Shell",
                vec![
                    CommandStep::new(Operand::literal("true")),
                    CommandStep::new(Operand::literal("true")),
                ],
                root.clone(),
            ),
        ),
    ];

    for (name, invocation) in &probes {
        match pipeline.invoker().run(invocation, PROBE_TIMEOUT).await {
            Ok(output) => {
                println!("✅ {} - OK", name);
                if verbose {
                    let version = if output.stdout.trim().is_empty() {
                        &output.stderr
                    } else {
                        &output.stdout
                    };
                    println!("  -> {}", version.lines().next().unwrap_or("").trim());
                }
            }
            Err(e) => {
                println!("❌ {} - MISSING", name);
                if verbose {
                    println!("  -> {}", e.to_string().trim_end());
                }
                all_ok = false;
            }
        }
    }

    println!();
    if all_ok {
        println!("🎉 Toolchain is ready to use");
        Ok(EXIT_OK)
    } else {
        println!("⚠️  Toolchain is incomplete");
        Ok(EXIT_FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunStatus;

    #[test]
    fn test_parse_compile_with_global_flags() {
        let cli = Cli::try_parse_from([
            "compilebox",
            "compile",
            "--code",
            "fun main() {}",
            "--host",
            "wsl",
            "--run-timeout-ms",
            "500",
        ])
        .unwrap();
        assert_eq!(cli.host, Some(HostEnvironment::Delegated));
        assert_eq!(cli.run_timeout_ms, Some(500));
        assert!(matches!(cli.command, Commands::Compile { code: Some(_), .. }));
    }

    #[test]
    fn test_source_flags_conflict() {
        assert!(Cli::try_parse_from(["compilebox", "compile", "--code", "x", "--file", "a.kt"]).is_err());
    }

    #[test]
    fn test_batch_defaults() {
        let cli = Cli::try_parse_from(["compilebox", "batch", "--input-dir", "in", "--output-dir", "out"])
            .unwrap();
        match cli.command {
            Commands::Batch { jobs, .. } => assert_eq!(jobs, 4),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_exit_codes() {
        let ok = PipelineResult {
            assembly: "mov".into(),
            program_output: "7".into(),
            error: None,
            run_status: RunStatus::Succeeded,
            transitions: Vec::new(),
        };
        let failed = PipelineResult {
            error: Some("syntax error".into()),
            ..ok.clone()
        };
        assert_eq!(exit_code_for(&Ok(ok)), EXIT_OK);
        assert_eq!(exit_code_for(&Ok(failed)), EXIT_FAILURE);
        assert_eq!(
            exit_code_for(&Err(PipelineError::Validation("empty".into()))),
            EXIT_INVALID
        );
        assert_eq!(
            exit_code_for(&Err(PipelineError::Workspace("gone".into()))),
            EXIT_FAILURE
        );
    }

    #[test]
    fn test_read_request_from_json() {
        let request = read_request(None, None, Some(r#"{"code":"fun main() {}"}"#.into()))
            .unwrap()
            .unwrap();
        assert_eq!(request.source(), "fun main() {}");

        let err = read_request(None, Some("  ".into()), None).unwrap().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_batch_inputs_filter_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.kt"), "x").unwrap();
        std::fs::write(dir.path().join("a.kt"), "x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub.kt")).unwrap();

        let inputs = batch_inputs(dir.path(), Some("kt")).unwrap();
        let names: Vec<_> = inputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.kt", "b.kt"]);
    }
}

//! Invocation strategies.
//!
//! A [`ToolInvocation`] describes *what* to run: one or more command steps
//! chained with `&&`, and the directory they run in. A strategy decides *how*
//! that turns into an actual process launch on this host:
//!
//! - [`DirectInvocation`] launches a single step as-is, and chains multiple
//!   steps through the configured shell.
//! - [`DelegatedInvocation`] hands the whole chain, with translated paths, to
//!   a broker (`wsl bash -lc "cd ... && ..."`).
//!
//! The strategy is picked once from the resolved [`HostEnvironment`].

use crate::config::settings::ToolchainConfig;
use crate::config::types::{HostEnvironment, Operand, PipelineError, Result};
use crate::exec::translate::PathTranslator;
use std::path::PathBuf;
use std::sync::Arc;

/// One program plus its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStep {
    pub program: Operand,
    pub args: Vec<Operand>,
}

impl CommandStep {
    pub fn new(program: Operand) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: Operand) -> Self {
        self.args.push(arg);
        self
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.program).chain(self.args.iter())
    }
}

/// Logical description of an external tool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Human label used in generic failure messages ("Compiler", "Runner")
    pub label: String,
    /// Steps chained with `&&`; a failing step stops the chain
    pub steps: Vec<CommandStep>,
    pub working_dir: PathBuf,
}

impl ToolInvocation {
    pub fn single(label: impl Into<String>, step: CommandStep, working_dir: PathBuf) -> Self {
        Self {
            label: label.into(),
            steps: vec![step],
            working_dir,
        }
    }

    pub fn chain(label: impl Into<String>, steps: Vec<CommandStep>, working_dir: PathBuf) -> Self {
        Self {
            label: label.into(),
            steps,
            working_dir,
        }
    }
}

/// Concrete process launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Turns a logical invocation into a concrete launch for this host
pub trait InvocationStrategy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;
    fn command_line(&self, invocation: &ToolInvocation) -> Result<CommandLine>;
}

#[derive(Debug, Clone)]
pub struct DirectInvocation {
    shell: String,
    shell_args: Vec<String>,
}

impl DirectInvocation {
    pub fn new(shell: impl Into<String>, shell_args: Vec<String>) -> Self {
        Self {
            shell: shell.into(),
            shell_args,
        }
    }
}

impl InvocationStrategy for DirectInvocation {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn command_line(&self, invocation: &ToolInvocation) -> Result<CommandLine> {
        match invocation.steps.as_slice() {
            [] => Err(empty_invocation(invocation)),
            [step] => Ok(CommandLine {
                program: step.program.to_native(),
                args: step.args.iter().map(Operand::to_native).collect(),
                working_dir: Some(invocation.working_dir.clone()),
            }),
            steps => {
                let script = join_steps(steps, Operand::to_native);
                let mut args = self.shell_args.clone();
                args.push(script);
                Ok(CommandLine {
                    program: self.shell.clone(),
                    args,
                    working_dir: Some(invocation.working_dir.clone()),
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DelegatedInvocation {
    broker: String,
    shell: String,
    shell_args: Vec<String>,
    translator: PathTranslator,
}

impl DelegatedInvocation {
    pub fn new(
        broker: impl Into<String>,
        shell: impl Into<String>,
        shell_args: Vec<String>,
        translator: PathTranslator,
    ) -> Self {
        Self {
            broker: broker.into(),
            shell: shell.into(),
            shell_args,
            translator,
        }
    }

    fn render(&self, operand: &Operand) -> String {
        match operand {
            Operand::Path(p) => self.translator.path_to_guest(p),
            Operand::Literal(s) => s.clone(),
        }
    }
}

impl InvocationStrategy for DelegatedInvocation {
    fn name(&self) -> &'static str {
        "delegated"
    }

    fn command_line(&self, invocation: &ToolInvocation) -> Result<CommandLine> {
        if invocation.steps.is_empty() {
            return Err(empty_invocation(invocation));
        }

        let guest_dir = self.translator.path_to_guest(&invocation.working_dir);
        let script = format!(
            "cd {} && {}",
            shell_quote(&guest_dir),
            join_steps(&invocation.steps, |op| self.render(op))
        );

        let mut args = Vec::with_capacity(self.shell_args.len() + 2);
        args.push(self.shell.clone());
        args.extend(self.shell_args.iter().cloned());
        args.push(script);

        Ok(CommandLine {
            program: self.broker.clone(),
            args,
            // the broker resolves its own working directory via `cd`
            working_dir: None,
        })
    }
}

/// Select the strategy for a resolved host capability.
pub fn strategy_for(host: HostEnvironment, toolchain: &ToolchainConfig) -> Arc<dyn InvocationStrategy> {
    match host.resolve() {
        HostEnvironment::Delegated => Arc::new(DelegatedInvocation::new(
            toolchain.broker.clone(),
            toolchain.shell.clone(),
            toolchain.shell_args.clone(),
            PathTranslator::new(toolchain.guest_mount_root.clone()),
        )),
        _ => Arc::new(DirectInvocation::new(
            toolchain.shell.clone(),
            toolchain.shell_args.clone(),
        )),
    }
}

fn empty_invocation(invocation: &ToolInvocation) -> PipelineError {
    PipelineError::Config(format!("{} invocation has no command steps", invocation.label))
}

fn join_steps<F>(steps: &[CommandStep], mut render: F) -> String
where
    F: FnMut(&Operand) -> String,
{
    steps
        .iter()
        .map(|step| {
            step.operands()
                .map(|op| shell_quote(&render(op)))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join(" && ")
}

/// POSIX single-quote quoting.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

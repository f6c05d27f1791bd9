//! External toolchain invocation
//!
//! The dependency installer and the Prisma CLI are opaque collaborators. Every
//! call goes through [`ToolRunner`] so the working directory is always passed
//! explicitly and the exit status is always checked.

use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::config::LayerLayout;
use crate::error::ToolError;
use crate::process_guard::{self, ActiveTool, CommandProcessGroup};
use crate::sanity;

/// How often a running tool is polled while a timeout is armed
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Time a timed-out tool gets between SIGTERM and SIGKILL
const KILL_GRACE: Duration = Duration::from_secs(5);

/// One external command of the toolchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Short name used in logs and errors
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(label: impl Into<String>, program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    /// Full command line, for logs and dry runs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Install dependencies, then format and generate the Prisma client with the
/// staged env file loaded.
pub fn prisma_toolchain(layout: &LayerLayout) -> Vec<ToolCommand> {
    let schema = format!("./{}", layout.schema_file);
    let with_env = |label: &str, prisma_cmd: &str| {
        ToolCommand::new(
            label,
            "npx",
            &[
                "dotenv",
                "-e",
                layout.staged_env_file,
                "--",
                "npx",
                "prisma",
                prisma_cmd,
                "--schema",
                schema.as_str(),
            ],
        )
    };

    vec![
        ToolCommand::new("npm install", "npm", &["install"]),
        with_env("prisma format", "format"),
        with_env("prisma generate", "generate"),
    ]
}

/// Executes toolchain commands.
///
/// Implementors must run `tool` with `cwd` as its working directory and report
/// any unsuccessful termination as an error.
pub trait ToolRunner {
    /// Verify the given programs can be started. Called before staging is modified.
    fn preflight(&self, _programs: &[&str]) -> Result<(), ToolError> {
        Ok(())
    }

    fn run(&self, tool: &ToolCommand, cwd: &Path) -> Result<(), ToolError>;
}

/// Runs tools as real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// `None` waits for each tool indefinitely
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl ToolRunner for ProcessRunner {
    fn preflight(&self, programs: &[&str]) -> Result<(), ToolError> {
        match sanity::missing_binaries(programs).into_iter().next() {
            Some(program) => {
                error!("Required tool not found on PATH: {}", program);
                Err(ToolError::NotFound { program })
            }
            None => Ok(()),
        }
    }

    fn run(&self, tool: &ToolCommand, cwd: &Path) -> Result<(), ToolError> {
        info!("Running {} in {}", tool.command_line(), cwd.display());

        let mut child = Command::new(&tool.program)
            .args(&tool.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .in_new_process_group()
            .spawn()
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    ToolError::NotFound {
                        program: tool.program.clone(),
                    }
                } else {
                    ToolError::Spawn {
                        label: tool.label.clone(),
                        source,
                    }
                }
            })?;

        let _active = ActiveTool::register(child.id());
        let status = wait_for(&mut child, tool, self.timeout)?;

        if status.success() {
            info!("{} finished successfully", tool.label);
            Ok(())
        } else {
            error!("{} failed with exit code {:?}", tool.label, status.code());
            Err(ToolError::ExitedNonZero {
                label: tool.label.clone(),
                code: status.code(),
            })
        }
    }
}

fn wait_for(
    child: &mut Child,
    tool: &ToolCommand,
    timeout: Option<Duration>,
) -> Result<ExitStatus, ToolError> {
    let wait_err = |source| ToolError::Wait {
        label: tool.label.clone(),
        source,
    };

    let Some(limit) = timeout else {
        return child.wait().map_err(wait_err);
    };

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(wait_err)? {
            return Ok(status);
        }
        if start.elapsed() >= limit {
            error!("{} exceeded {}s, terminating", tool.label, limit.as_secs());
            process_guard::terminate_group(child.id(), KILL_GRACE);
            // Reap the leader; the group signal may have raced with its exit
            let _ = child.kill();
            let _ = child.wait();
            return Err(ToolError::TimedOut {
                label: tool.label.clone(),
                after: limit,
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Run each command in order, stopping at the first failure.
pub fn run_toolchain(
    runner: &dyn ToolRunner,
    tools: &[ToolCommand],
    cwd: &Path,
) -> Result<(), ToolError> {
    for tool in tools {
        debug!("Toolchain step: {}", tool.label);
        runner.run(tool, cwd)?;
    }
    Ok(())
}

use crate::{Error, Operation, Phase, PhaseRecord, PhaseStatus, RecordCell, Result};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodelet_config::Config;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Wrapper every phase script is launched through.
pub const SCRIPT_WRAPPER: [&str; 2] = ["sudo", "/opt/pf9/pf9-kube/setup_env_and_run_script.sh"];

/// Prefix that confines a command to the status-check cgroup.
pub const CGROUP_PREFIX: [&str; 3] = ["cgexec", "-g", "cpu:pf9-kube-status"];

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How phase scripts are launched.
///
/// The default runs every script through [`SCRIPT_WRAPPER`]; any other
/// launcher (for instance plain `sh`) can be substituted.
#[derive(Clone, Debug)]
pub struct ScriptLauncher {
    base: Vec<String>,
}

impl ScriptLauncher {
    /// Creates a launcher that prefixes every script with `base`.
    pub fn new<I, S>(base: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            base: base.into_iter().map(Into::into).collect(),
        }
    }

    fn command_line(&self, script: &Path, op: Operation, config: &Config) -> Vec<String> {
        let mut line = Vec::new();
        if op == Operation::Status && config.use_cgroups {
            line.extend(CGROUP_PREFIX.iter().map(ToString::to_string));
        }
        line.extend(self.base.iter().cloned());
        line.push(script.to_string_lossy().into_owned());
        line.push(op.as_str().to_string());
        if config.debug {
            line.push("--debug".to_string());
        }
        line
    }
}

impl Default for ScriptLauncher {
    fn default() -> Self {
        Self::new(SCRIPT_WRAPPER)
    }
}

struct ScriptOutput {
    success: bool,
    lines: Vec<String>,
}

/// A phase implemented by a shell script taking `start`, `stop` or `status`.
pub struct ScriptPhase {
    name: String,
    order: u32,
    record: RecordCell,
    file: String,
    launcher: Arc<ScriptLauncher>,
}

impl ScriptPhase {
    /// Creates a phase backed by `file` inside the configured scripts directory.
    pub fn new(
        name: impl Into<String>,
        order: u32,
        file: impl Into<String>,
        launcher: Arc<ScriptLauncher>,
    ) -> Self {
        let name = name.into();
        Self {
            record: RecordCell::new(name.clone(), order),
            name,
            order,
            file: file.into(),
            launcher,
        }
    }

    /// Script file name relative to the scripts directory.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Runs the script once. Without `ctx` the script always runs to
    /// completion.
    async fn run_once(
        &self,
        ctx: Option<&CancellationToken>,
        op: Operation,
        config: &Config,
    ) -> Result<ScriptOutput> {
        let script = config.phase_scripts_dir.join(&self.file);
        let line = self.launcher.command_line(&script, op, config);
        let Some((program, args)) = line.split_first() else {
            return Ok(ScriptOutput {
                success: false,
                lines: vec!["empty command line".to_string()],
            });
        };

        debug!("running {}", line.join(" "));

        let mut command = Command::new(program);
        command.args(args);

        let output = match ctx {
            Some(ctx) => {
                command.kill_on_drop(true);
                tokio::select! {
                    () = ctx.cancelled() => {
                        return Err(Error::Cancelled(op, self.name.clone()));
                    }
                    output = command.output() => output,
                }
            }
            None => command.output().await,
        };

        match output {
            Ok(output) => {
                let mut lines = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>();
                lines.extend(
                    String::from_utf8_lossy(&output.stderr)
                        .lines()
                        .map(ToString::to_string),
                );
                Ok(ScriptOutput {
                    success: output.status.success(),
                    lines,
                })
            }
            Err(e) => Ok(ScriptOutput {
                success: false,
                lines: vec![format!("failed to run {program}: {e}")],
            }),
        }
    }

    async fn run_with_retry(
        &self,
        ctx: &CancellationToken,
        op: Operation,
        config: &Config,
    ) -> Result<ScriptOutput> {
        let attempts = config.phase_retry.max(1);
        let mut delay = INITIAL_RETRY_DELAY;
        let mut attempt = 1;

        loop {
            let output = self.run_once(Some(ctx), op, config).await?;
            if output.success || attempt >= attempts {
                return Ok(output);
            }

            warn!(
                "{} of {} failed (attempt {}/{}), retrying in {:?}",
                op, self.file, attempt, attempts, delay
            );

            tokio::select! {
                () = ctx.cancelled() => {
                    return Err(Error::Cancelled(op, self.name.clone()));
                }
                () = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
            delay *= 2;
        }
    }

    /// Marks `op` as in progress and runs it with retries. A cancelled run
    /// puts the record back to the status it had before.
    async fn run_recorded(
        &self,
        ctx: &CancellationToken,
        op: Operation,
        config: &Config,
    ) -> Result<ScriptOutput> {
        let previous = self.record.snapshot().status;
        self.record.begin(op);

        let result = self.run_with_retry(ctx, op, config).await;
        if let Err(e) = &result {
            info!("{e}");
            self.record.finish(previous, e.to_string());
        }
        result
    }

    fn failed(&self, op: Operation, message: String) -> Error {
        Error::PhaseFailed {
            name: self.name.clone(),
            operation: op,
            message,
        }
    }
}

/// Keeps the last `max_lines` lines, logs them, and joins them into a message.
pub fn prune_and_log_output(lines: &[String], max_lines: usize) -> String {
    let start = lines.len().saturating_sub(max_lines);
    let kept = &lines[start..];
    for line in kept {
        info!("{line}");
    }
    kept.join("\n")
}

#[async_trait]
impl Phase for ScriptPhase {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> u32 {
        self.order
    }

    fn record(&self) -> PhaseRecord {
        self.record.snapshot()
    }

    // Start scripts are never interrupted; a shutdown takes effect between
    // phases.
    async fn start(&self, _ctx: &CancellationToken, config: &Config) -> Result<()> {
        self.record.begin(Operation::Start);
        let output = self.run_once(None, Operation::Start, config).await?;
        if output.success {
            self.record.finish(PhaseStatus::Running, "");
            return Ok(());
        }

        error!("error running phase {}", self.file);
        let message = prune_and_log_output(&output.lines, config.num_cmd_output_lines_to_log);
        self.record.finish(PhaseStatus::Failed, message.clone());
        Err(self.failed(Operation::Start, message))
    }

    async fn stop(&self, ctx: &CancellationToken, config: &Config) -> Result<()> {
        let output = self.run_recorded(ctx, Operation::Stop, config).await?;
        if output.success {
            self.record.finish(PhaseStatus::Stopped, "");
            return Ok(());
        }

        let message = prune_and_log_output(&output.lines, config.num_cmd_output_lines_to_log);
        self.record.finish(PhaseStatus::Stopped, message.clone());
        Err(self.failed(Operation::Stop, message))
    }

    async fn status(&self, ctx: &CancellationToken, config: &Config) -> Result<()> {
        let output = self.run_recorded(ctx, Operation::Status, config).await?;
        if output.success {
            self.record.finish(PhaseStatus::Running, "");
            return Ok(());
        }

        let message = prune_and_log_output(&output.lines, config.num_cmd_output_lines_to_log);
        self.record.finish(PhaseStatus::Failed, message.clone());
        Err(self.failed(Operation::Status, message))
    }
}

use crate::config::{default_result_files, Config};
use crate::error::FleetError;
use crate::executor::{shell_escape, Executor};
use crate::job::{Job, JobId, PollOutcome};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File the remote side appends to when the simulation finishes.
pub const COMPLETION_MARKER: &str = "completed.txt";
/// Line written into the marker file.
pub const COMPLETION_LINE: &str = "completed";
/// Remote file capturing the simulation's stdout and stderr.
pub const RUN_LOG: &str = "run.log";

/// A single COMPAS population-synthesis batch run on one VM.
#[derive(Debug, Clone)]
pub struct SimulationJob {
    id: JobId,
    command: String,
    output_path: PathBuf,
    executable: PathBuf,
    result_files: Vec<String>,
}

impl SimulationJob {
    pub fn new(id: JobId, command: String, output_path: PathBuf, executable: PathBuf) -> Self {
        Self {
            id,
            command,
            output_path,
            executable,
            result_files: default_result_files(),
        }
    }

    pub fn with_result_files(mut self, result_files: Vec<String>) -> Self {
        self.result_files = result_files;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn result_files(&self) -> &[String] {
        &self.result_files
    }

    /// The job command with its output captured and the completion marker
    /// appended once it exits.
    pub fn remote_command(&self) -> String {
        format!(
            "({}) > {} 2>&1; echo {} >> {}",
            self.command, RUN_LOG, COMPLETION_LINE, COMPLETION_MARKER
        )
    }

    fn executable_name(&self) -> Result<String, FleetError> {
        self.executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                FleetError::Config(format!(
                    "executable path has no file name: {}",
                    self.executable.display()
                ))
            })
    }
}

#[async_trait::async_trait]
impl Job for SimulationJob {
    fn id(&self) -> JobId {
        self.id
    }

    fn output_path(&self) -> &Path {
        &self.output_path
    }

    async fn activate(&mut self, executor: &dyn Executor) -> Result<(), FleetError> {
        let binary = self.executable_name()?;
        executor.upload_file(&self.executable, ".").await?;
        executor
            .send_command(&format!("chmod +x {}", shell_escape(&binary)), true)
            .await?;

        info!("Starting job {} on {}", self.id, executor.name());
        executor.send_command(&self.remote_command(), false).await?;
        Ok(())
    }

    async fn poll(&mut self, executor: &dyn Executor) -> PollOutcome {
        let probe = format!(
            "test -f {} && echo present || echo absent",
            COMPLETION_MARKER
        );
        match executor.send_command(&probe, true).await {
            Ok(out) if out.trim() == "present" => {}
            Ok(_) => return PollOutcome::Pending,
            Err(e) => return PollOutcome::TransportError(e.to_string()),
        }

        let local = match executor
            .download_file(COMPLETION_MARKER, &self.output_path)
            .await
        {
            Ok(path) => path,
            Err(e) => return PollOutcome::TransportError(e.to_string()),
        };

        match std::fs::read_to_string(&local) {
            Ok(text) if text.lines().any(|l| l.trim() == COMPLETION_LINE) => {
                PollOutcome::Complete
            }
            // Marker exists but the line has not been flushed yet.
            Ok(_) => PollOutcome::Pending,
            Err(e) => PollOutcome::TransportError(format!(
                "reading {}: {}",
                local.display(),
                e
            )),
        }
    }

    async fn collect(&mut self, executor: &dyn Executor) -> Result<(), FleetError> {
        let mut failures = Vec::new();
        for file in &self.result_files {
            match executor.download_file(file, &self.output_path).await {
                Ok(path) => debug!("Job {}: collected {}", self.id, path.display()),
                Err(e) => failures.push(format!("{}: {}", file, e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(FleetError::Transfer(failures.join("; ")))
        }
    }

    async fn status_message(&self, executor: &dyn Executor) -> Result<String, FleetError> {
        let out = executor
            .send_command(&format!("tail -n 1 {} 2>/dev/null", RUN_LOG), true)
            .await
            .map_err(|e| FleetError::StatusQuery(e.to_string()))?;
        let line = out.trim();
        if line.is_empty() {
            Ok("running".to_string())
        } else {
            Ok(line.to_string())
        }
    }
}

/// Parse a commands file: one command per line, blank lines and `#`
/// comments skipped.
pub fn parse_commands(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn load_commands(path: &Path) -> Result<Vec<String>, FleetError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_commands(&contents))
}

/// Build one job per command, creating `<output_root>/output<i>` for each.
pub fn jobs_from_config(config: &Config) -> Result<Vec<SimulationJob>, FleetError> {
    let commands = load_commands(&config.jobs.commands_file)?;
    let mut jobs = Vec::with_capacity(commands.len());
    for (i, command) in commands.into_iter().enumerate() {
        let output = config.jobs.output_root.join(format!("output{}", i));
        std::fs::create_dir_all(&output)?;
        jobs.push(
            SimulationJob::new(
                JobId(i as u64),
                command,
                output,
                config.jobs.executable.clone(),
            )
            .with_result_files(config.jobs.result_files.clone()),
        );
    }
    Ok(jobs)
}

use anyhow::Context;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};

use crate::utils::workspace::TempWorkspace;

/// Runs one fully substituted command line and reports its exit code.
/// Output should be forwarded while the command runs, not after it ends.
pub trait CommandExecutor {
    fn execute(&mut self, command_line: &str) -> io::Result<i32>;
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for &mut E {
    fn execute(&mut self, command_line: &str) -> io::Result<i32> {
        (**self).execute(command_line)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template `{template}` references ${parameter}, which was never set")]
    MissingParameter {
        template: &'static str,
        parameter: String,
    },
    #[error("template `{template}` has an invalid placeholder at byte {position}")]
    InvalidPlaceholder {
        template: &'static str,
        position: usize,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("could not launch stage `{stage}` ({command}): {source}")]
    Launch {
        stage: &'static str,
        command: String,
        source: io::Error,
    },
    #[error("stage `{stage}` failed with exit code {exit_code}: {command}")]
    StageFailed {
        stage: &'static str,
        exit_code: i32,
        command: String,
    },
}

// `$$`, `$name`, `${name}`, or a `$` that starts none of these.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(?P<escaped>\$)|(?P<named>[_A-Za-z][_A-Za-z0-9]*)|\{(?P<braced>[_A-Za-z][_A-Za-z0-9]*)\}|(?P<invalid>))")
        .expect("placeholder pattern is a valid regex")
});

/// Named parameter values substituted into command templates. Filesystem
/// paths are expected to be absolute before they are inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn set_path<K: Into<String>>(&mut self, name: K, path: &Path) -> &mut Self {
        debug_assert!(
            path.is_absolute(),
            "relative path {} passed as a command parameter",
            path.display()
        );
        self.set(name, path.display().to_string())
    }

    /// Joins a list of paths with single spaces, as multi-file arguments of
    /// the wrapped tools expect.
    pub fn set_paths<K: Into<String>>(&mut self, name: K, paths: &[PathBuf]) -> &mut Self {
        let joined = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<String>>()
            .join(" ");
        self.set(name, joined)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }
}

/// A shell command with `$name` / `${name}` placeholders; `$$` stands for a
/// literal dollar sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTemplate {
    pub name: &'static str,
    pub template: &'static str,
}

impl CommandTemplate {
    pub const fn new(name: &'static str, template: &'static str) -> Self {
        Self { name, template }
    }

    /// Replaces every placeholder with its value from `params`. Fails on the
    /// first placeholder that has no value; nothing is ever left unexpanded.
    pub fn substitute(&self, params: &Params) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.template.len());
        let mut last = 0;
        for caps in PLACEHOLDER_RE.captures_iter(self.template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            out.push_str(&self.template[last..whole.start()]);
            last = whole.end();

            if caps.name("escaped").is_some() {
                out.push('$');
                continue;
            }
            let name = match caps.name("named").or_else(|| caps.name("braced")) {
                Some(n) => n.as_str(),
                None => {
                    return Err(TemplateError::InvalidPlaceholder {
                        template: self.name,
                        position: whole.start(),
                    })
                }
            };
            let value = params
                .get(name)
                .ok_or_else(|| TemplateError::MissingParameter {
                    template: self.name,
                    parameter: name.to_string(),
                })?;
            out.push_str(value);
        }
        out.push_str(&self.template[last..]);
        Ok(out)
    }
}

/// What was run for one successful stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: &'static str,
    #[serde(rename = "cmd")]
    pub command: String,
    #[serde(skip)]
    pub duration: Duration,
}

/// Executes stages strictly in order and stops at the first failure.
pub struct PipelineRunner<E: CommandExecutor> {
    executor: E,
}

impl<E: CommandExecutor> PipelineRunner<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    #[allow(dead_code)]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Runs `stages` one after the other. Every command line is built before
    /// the first one is launched, so a template error never leaves a pipeline
    /// half-run. Completed stages are not rolled back when a later one fails.
    pub fn run(
        &mut self,
        stages: &[(CommandTemplate, &Params)],
    ) -> Result<Vec<StageRecord>, PipelineError> {
        let commands = stages
            .iter()
            .map(|(t, p)| t.substitute(p).map(|c| (t.name, c)))
            .collect::<Result<Vec<(&'static str, String)>, TemplateError>>()?;

        let mut records = Vec::with_capacity(commands.len());
        for (stage, command) in commands {
            info!("+{}", command);
            let start = Instant::now();
            let exit_code = self
                .executor
                .execute(&command)
                .map_err(|source| PipelineError::Launch {
                    stage,
                    command: command.clone(),
                    source,
                })?;
            let duration = start.elapsed();

            if exit_code != 0 {
                error!("stage `{}` exited with code {}", stage, exit_code);
                return Err(PipelineError::StageFailed {
                    stage,
                    exit_code,
                    command,
                });
            }
            records.push(StageRecord {
                stage,
                command,
                duration,
            });
        }
        Ok(records)
    }

    /// Runs several templates sharing one parameter mapping.
    pub fn run_templates(
        &mut self,
        templates: &[CommandTemplate],
        params: &Params,
    ) -> Result<Vec<StageRecord>, PipelineError> {
        let stages = templates
            .iter()
            .map(|t| (*t, params))
            .collect::<Vec<(CommandTemplate, &Params)>>();
        self.run(&stages)
    }
}

/// Everything one top-level operation owns while it runs: its scratch
/// workspace, the stage runner and the record of the stages completed.
pub struct PipelineRun<E: CommandExecutor> {
    operation: &'static str,
    out_dir: PathBuf,
    workspace: TempWorkspace,
    runner: PipelineRunner<E>,
    records: Vec<StageRecord>,
    start: Instant,
}

impl<E: CommandExecutor> PipelineRun<E> {
    pub fn new(
        operation: &'static str,
        out_dir: &Path,
        workspace: TempWorkspace,
        executor: E,
    ) -> Self {
        Self {
            operation,
            out_dir: out_dir.to_path_buf(),
            workspace,
            runner: PipelineRunner::new(executor),
            records: Vec::new(),
            start: Instant::now(),
        }
    }

    pub fn workspace(&mut self) -> &mut TempWorkspace {
        &mut self.workspace
    }

    pub fn run_templates(
        &mut self,
        templates: &[CommandTemplate],
        params: &Params,
    ) -> Result<(), PipelineError> {
        let done = self.runner.run_templates(templates, params)?;
        self.records.extend(done);
        Ok(())
    }

    #[allow(dead_code)]
    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    #[allow(dead_code)]
    pub fn runner(&self) -> &PipelineRunner<E> {
        &self.runner
    }

    /// Closes the workspace and writes `cgprna_<operation>_log.json` into the
    /// output directory. Only reached when every stage succeeded.
    pub fn finish(self) -> anyhow::Result<PathBuf> {
        let PipelineRun {
            operation,
            out_dir,
            workspace,
            records,
            start,
            ..
        } = self;

        workspace.close()?;

        let log_file = out_dir.join(format!("cgprna_{}_log.json", operation));
        let log_info = json!({
            "command" : operation,
            "time_info" : {
                "total_time" : start.elapsed(),
                "stages" : records
                    .iter()
                    .map(|r| json!({ "stage" : r.stage, "time" : r.duration }))
                    .collect::<Vec<_>>(),
            },
            "cmd_info" : records,
        });

        std::fs::write(&log_file, serde_json::to_string_pretty(&log_info)?)
            .with_context(|| format!("could not write {}", log_file.display()))?;
        Ok(log_file)
    }
}

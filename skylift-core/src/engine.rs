//! Engine - Hand a rendered program to the deployment engine
//!
//! The composition never talks to AWS to create anything. It writes the
//! program into a work directory and drives the engine CLI, which owns
//! state, diffing and provisioning.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use async_trait::async_trait;
use log::{debug, info};
use thiserror::Error;
use tokio::process::Command;

use crate::program::{Program, RenderError};

/// File name the engine reads the program from
pub const PROGRAM_FILE: &str = "Pulumi.yaml";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to render program: {0}")]
    Render(#[from] RenderError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch '{binary}': {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}")]
    Failed { command: String, status: ExitStatus },
}

/// Lifecycle operation requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Preview,
    Up,
    Destroy,
}

impl Action {
    pub fn command(&self) -> &'static str {
        match self {
            Action::Preview => "preview",
            Action::Up => "up",
            Action::Destroy => "destroy",
        }
    }

    /// Whether the action changes infrastructure
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Action::Preview)
    }
}

#[async_trait]
pub trait Engine: Send + Sync {
    /// Run `action` against the program in `workdir`
    async fn run(&self, action: Action, workdir: &Path) -> Result<(), EngineError>;
}

/// Write `program` into `dir`, creating it if needed
pub async fn write_program(dir: &Path, program: &Program) -> Result<PathBuf, EngineError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| EngineError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    let path = dir.join(PROGRAM_FILE);
    let yaml = program.to_yaml()?;
    tokio::fs::write(&path, yaml)
        .await
        .map_err(|source| EngineError::Io {
            path: path.clone(),
            source,
        })?;
    info!("Wrote program to {}", path.display());
    Ok(path)
}

/// Engine backed by the `pulumi` CLI
#[derive(Debug, Clone)]
pub struct PulumiEngine {
    binary: String,
    stack: String,
    auto_approve: bool,
}

impl PulumiEngine {
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            binary: "pulumi".to_string(),
            stack: stack.into(),
            auto_approve: false,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    fn select_args(&self, workdir: &Path) -> Vec<String> {
        vec![
            "stack".to_string(),
            "select".to_string(),
            "--create".to_string(),
            self.stack.clone(),
            "--cwd".to_string(),
            workdir.display().to_string(),
            "--non-interactive".to_string(),
        ]
    }

    /// Arguments for `action`
    ///
    /// Mutating actions without auto-approval stay interactive so the engine
    /// can ask for confirmation.
    pub fn action_args(&self, action: Action, workdir: &Path) -> Vec<String> {
        let mut args = vec![
            action.command().to_string(),
            "--stack".to_string(),
            self.stack.clone(),
            "--cwd".to_string(),
            workdir.display().to_string(),
        ];
        if !action.is_mutating() {
            args.push("--non-interactive".to_string());
        } else if self.auto_approve {
            args.push("--yes".to_string());
            args.push("--non-interactive".to_string());
        }
        args
    }

    async fn invoke(&self, args: Vec<String>) -> Result<(), EngineError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("Running {}", command);

        let status = Command::new(&self.binary)
            .args(&args)
            .status()
            .await
            .map_err(|source| EngineError::Launch {
                binary: self.binary.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Failed { command, status })
        }
    }
}

#[async_trait]
impl Engine for PulumiEngine {
    async fn run(&self, action: Action, workdir: &Path) -> Result<(), EngineError> {
        self.invoke(self.select_args(workdir)).await?;
        info!("Running {} on stack {}", action.command(), self.stack);
        self.invoke(self.action_args(action, workdir)).await
    }
}

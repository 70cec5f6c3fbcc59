//! Host subprocess backend.
//!
//! Runs a program directly in the scratch directory. There is no filesystem
//! or network isolation, so this is for development and tests only.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use crate::backend::{which_binary, SandboxBackend};
use crate::ExecutorError;

/// Runs `<program> <args...>` with the scratch directory as working directory.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: PathBuf,
    args: Vec<String>,
    file_name: String,
}

impl ProcessBackend {
    /// Backend running `program` with `args`; the source is written to
    /// `file_name`, which `args` is expected to reference.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, file_name: impl Into<String>) -> Self {
        Self { program: program.into(), args, file_name: file_name.into() }
    }

    /// `go run main.go` using the host toolchain.
    #[must_use]
    pub fn go() -> Self {
        Self::new("go", vec!["run".to_owned(), "main.go".to_owned()], "main.go")
    }

    /// `sh main.sh`; useful where no Go toolchain is installed.
    #[must_use]
    pub fn shell() -> Self {
        Self::new("sh", vec!["main.sh".to_owned()], "main.sh")
    }
}

#[async_trait]
impl SandboxBackend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    fn source_file_name(&self) -> &str {
        &self.file_name
    }

    fn command(&self, scratch: &Path, _run_id: Uuid) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(scratch);
        cmd
    }

    async fn health_check(&self) -> Result<(), ExecutorError> {
        which_binary(&self.program)
    }
}

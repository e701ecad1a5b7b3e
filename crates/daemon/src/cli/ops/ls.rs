use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use remotefs::FsError;
use remotefs_object_store::FileMeta;

use crate::cli::op::{Op, OpContext};

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Local directory path; defaults to the local root
    pub path: Option<String>,
}

#[derive(Debug)]
pub struct LsOutput {
    pub entries: Vec<FileMeta>,
}

impl fmt::Display for LsOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            if entry.is_dir {
                writeln!(f, "{}\t{}", "[dir]".blue(), entry.path)?;
            } else {
                writeln!(f, "{}\t{}", entry.size, entry.path)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("operation timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

#[async_trait::async_trait]
impl Op for Ls {
    type Error = LsError;
    type Output = LsOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| ctx.fs.local_root().to_string());
        let entries = tokio::time::timeout(ctx.timeout, ctx.fs.read_dir(&path)).await??;
        Ok(LsOutput { entries })
    }
}

use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use remotefs::FsError;
use remotefs_object_store::FileMeta;

use crate::cli::op::{Op, OpContext};

#[derive(Args, Debug, Clone)]
pub struct Stat {
    /// Local path to inspect (e.g. /remote/docs/report.txt)
    pub path: String,
}

#[derive(Debug)]
pub struct StatOutput {
    pub meta: FileMeta,
}

impl fmt::Display for StatOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.meta.is_dir { "dir" } else { "file" };
        let modified = self
            .meta
            .last_modified
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{} {}  {} {}  {} {} bytes  {} {}  {} {}",
            "Path:".dimmed(),
            self.meta.path.bold(),
            "Type:".dimmed(),
            kind,
            "Size:".dimmed(),
            self.meta.size,
            "Modified:".dimmed(),
            modified,
            "ETag:".dimmed(),
            self.meta.etag,
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatError {
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("operation timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

#[async_trait::async_trait]
impl Op for Stat {
    type Error = StatError;
    type Output = StatOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let meta = tokio::time::timeout(ctx.timeout, ctx.fs.stat(&self.path)).await??;
        Ok(StatOutput { meta })
    }
}

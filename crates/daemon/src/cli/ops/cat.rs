use std::fmt;

use clap::Args;
use tokio::io::AsyncReadExt;

use remotefs::FsError;

use crate::cli::op::{Op, OpContext};

#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// Local file path to read
    pub path: String,
}

/// Raw file content; rendered lossily when the terminal asks for text.
#[derive(Debug)]
pub struct CatOutput {
    pub bytes: Vec<u8>,
}

impl fmt::Display for CatOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("read cached file: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

#[async_trait::async_trait]
impl Op for Cat {
    type Error = CatError;
    type Output = CatOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut handle = tokio::time::timeout(ctx.timeout, ctx.fs.read_file(&self.path)).await??;
        let mut bytes = Vec::new();
        handle.read_to_end(&mut bytes).await?;
        Ok(CatOutput { bytes })
    }
}

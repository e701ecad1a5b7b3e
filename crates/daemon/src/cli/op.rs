//! The CLI operation trait: parse into an op, execute against the facade,
//! render the output through `Display`.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use remotefs::RemoteFs;

/// Context handed to every op.
pub struct OpContext {
    pub fs: Arc<RemoteFs>,
    /// Per-operation deadline.
    pub timeout: Duration,
}

#[async_trait]
pub trait Op {
    type Error: std::error::Error;
    type Output: Display;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

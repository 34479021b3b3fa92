//! Trait abstractions for runtime I/O
//!
//! The core never talks to the outside world; the runtime hands completed
//! workflows to a [`SideEffectSink`]. Tests swap in the mocks from
//! `runtime::testing`.

use crate::orchestrator::{SideEffectReceipt, SideEffectRequest};
use async_trait::async_trait;
use std::sync::Arc;

/// Executes side effects requested by completed workflows (create the
/// client, issue the invoice, render the report)
#[async_trait]
pub trait SideEffectSink: Send + Sync {
    /// Execute `request`. `Err` carries a reason suitable for showing the user.
    async fn execute(&self, request: &SideEffectRequest) -> Result<SideEffectReceipt, String>;
}

#[async_trait]
impl<T: SideEffectSink + ?Sized> SideEffectSink for Arc<T> {
    async fn execute(&self, request: &SideEffectRequest) -> Result<SideEffectReceipt, String> {
        (**self).execute(request).await
    }
}

/// Sink that logs each request and accepts it, using the request id as the
/// reference
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

#[async_trait]
impl SideEffectSink for LoggingSink {
    async fn execute(&self, request: &SideEffectRequest) -> Result<SideEffectReceipt, String> {
        tracing::info!(
            session_id = %request.conversation_id,
            workflow = %request.workflow,
            request_id = %request.id,
            payload = %request.payload(),
            "Side effect requested"
        );
        Ok(SideEffectReceipt::new(request.id.to_string()))
    }
}

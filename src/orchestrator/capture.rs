use crate::types::RunContext;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Turns a finished run's output into the result object written back to
/// the store.
#[async_trait]
pub trait ResultExtractor: Send + Sync {
    async fn extract(&self, run: &RunContext, stdout: &str) -> Value;
}

/// Writes back nothing: the playbook's reported facts are not parsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyResultExtractor;

#[async_trait]
impl ResultExtractor for EmptyResultExtractor {
    async fn extract(&self, _run: &RunContext, _stdout: &str) -> Value {
        json!({})
    }
}

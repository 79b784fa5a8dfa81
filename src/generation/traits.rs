//! Generation invoker trait definition.

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;

use super::request::GenerationRequest;
use crate::Result;

/// One call to one model.
///
/// Implementations map provider failures onto [`crate::Error`] before
/// returning: capacity exhaustion must surface as
/// [`crate::Error::RateLimited`], everything else as a different variant.
#[async_trait]
pub trait GenerationInvoker: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Returns the structured JSON answer.
    async fn invoke(&self, model: &str, request: &GenerationRequest) -> Result<Value>;
}

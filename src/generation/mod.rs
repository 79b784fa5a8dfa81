//! Generation invocation boundary and the Gemini HTTP implementation.

pub mod gemini;
mod request;
mod schema;
mod traits;

pub use gemini::GeminiInvoker;
pub use request::{Content, GenerationRequest, InlineImage};
pub use schema::{output_schema, sanitize_for_gemini};
pub use traits::GenerationInvoker;

//! Model registry: the ordered set of generation backends and their quotas.

mod builtin;
mod descriptor;
mod registry;

pub use descriptor::{ModelDescriptor, ModelId};
pub use registry::ModelRegistry;

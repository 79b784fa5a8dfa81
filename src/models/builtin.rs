use std::time::Duration;

use super::descriptor::ModelDescriptor;

const MINUTE: Duration = Duration::from_secs(60);

/// Default models, cheapest and highest-quota first.
pub fn models() -> Vec<ModelDescriptor> {
    vec![flash_lite_2_0(), flash_2_0(), flash_1_5()]
}

fn flash_lite_2_0() -> ModelDescriptor {
    ModelDescriptor::new("gemini-2.0-flash-lite", "Gemini 2.0 Flash-Lite", 30, MINUTE)
}

fn flash_2_0() -> ModelDescriptor {
    ModelDescriptor::new("gemini-2.0-flash", "Gemini 2.0 Flash", 15, MINUTE)
}

fn flash_1_5() -> ModelDescriptor {
    ModelDescriptor::new("gemini-1.5-flash", "Gemini 1.5 Flash", 15, MINUTE)
}

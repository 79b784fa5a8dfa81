use std::time::Duration;

use serde::{Deserialize, Serialize};

pub type ModelId = String;

/// A generation backend with its own client-side request quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: ModelId,
    pub display_name: String,
    pub max_requests: u32,
    #[serde(rename = "reset_interval_ms", with = "duration_ms")]
    pub reset_interval: Duration,
}

impl ModelDescriptor {
    pub fn new(
        id: impl Into<ModelId>,
        display_name: impl Into<String>,
        max_requests: u32,
        reset_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            max_requests,
            reset_interval,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("model id must not be empty".into());
        }
        if self.max_requests == 0 {
            return Err(format!("model {}: max_requests must be positive", self.id));
        }
        if self.reset_interval.is_zero() {
            return Err(format!(
                "model {}: reset_interval_ms must be positive",
                self.id
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

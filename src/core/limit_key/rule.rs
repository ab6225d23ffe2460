use crate::{base::GuardRule, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule limits the passes of every distinct key of a resource within one limit-key window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// unique id
    pub id: String,
    /// resource name
    pub resource: String,
    /// allowed passes per key in the window
    pub threshold: u64,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            id: uuid::Uuid::new_v4().to_string(),
            resource: String::default(),
            threshold: 0,
        }
    }
}

impl GuardRule for Rule {
    fn resource_name(&self) -> String {
        self.resource.clone()
    }

    fn is_valid(&self) -> Result<()> {
        if self.resource.is_empty() {
            return Err(Error::msg("empty resource name"));
        }
        Ok(())
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource && self.threshold == other.threshold
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap_or_default();
        write!(f, "{}", fmtted)
    }
}

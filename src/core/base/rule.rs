use crate::{utils::AsAny, Result};
use std::fmt;

/// Common behaviors of flow, fuse and limit-key rules.
pub trait GuardRule: AsAny + fmt::Debug + fmt::Display + Send + Sync {
    fn resource_name(&self) -> String;

    fn is_valid(&self) -> Result<()> {
        Ok(())
    }
}

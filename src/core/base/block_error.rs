use super::{BlockType, GuardRule};
use crate::utils;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub trait SnapshotTrait: Any + fmt::Debug + utils::AsAny + Send + Sync {}
impl<T: Any + fmt::Debug + utils::AsAny + Send + Sync> SnapshotTrait for T {}
/// The value that triggered a block, e.g. the current pass count or the error ratio.
pub type Snapshot = dyn SnapshotTrait;

/// BlockError indicates the request was denied admission.
/// It is an expected control signal, never a defect; callers usually map it to a rejection response.
#[derive(Debug, Clone, Default)]
pub struct BlockError {
    block_type: BlockType,
    /// additional message for the block error
    block_msg: String,
    rule: Option<Arc<dyn GuardRule>>,
    /// the triggered "snapshot" value
    snapshot_value: Option<Arc<Snapshot>>,
}

impl PartialEq for BlockError {
    fn eq(&self, other: &BlockError) -> bool {
        self.block_type == other.block_type && self.block_msg == other.block_msg
    }
}

impl BlockError {
    pub fn new(block_type: BlockType) -> Self {
        Self {
            block_type,
            ..Self::default()
        }
    }

    pub fn new_with_msg(block_type: BlockType, block_msg: String) -> Self {
        Self {
            block_type,
            block_msg,
            ..Self::default()
        }
    }

    pub fn new_with_cause(
        block_type: BlockType,
        block_msg: String,
        rule: Arc<dyn GuardRule>,
        snapshot_value: Arc<Snapshot>,
    ) -> Self {
        Self {
            block_type,
            block_msg,
            rule: Some(rule),
            snapshot_value: Some(snapshot_value),
        }
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn block_msg(&self) -> String {
        self.block_msg.clone()
    }

    pub fn triggered_rule(&self) -> Option<Arc<dyn GuardRule>> {
        self.rule.clone()
    }

    /// Downcasts the triggered rule to a concrete rule type, e.g. `flow::Rule`.
    pub fn triggered_rule_as<R: Any>(&self) -> Option<&R> {
        self.rule
            .as_ref()
            .and_then(|rule| (**rule).as_any().downcast_ref::<R>())
    }

    pub fn triggered_value(&self) -> Option<Arc<Snapshot>> {
        self.snapshot_value.clone()
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.block_msg.is_empty() {
            write!(f, "BlockError: {}", self.block_type)
        } else {
            write!(
                f,
                "BlockError: {}, message: {}",
                self.block_type, self.block_msg
            )
        }
    }
}

impl std::error::Error for BlockError {}

#[cfg(test)]
mod test {
    #![allow(clippy::vtable_address_comparisons)]

    use super::*;
    use crate::Error;

    #[derive(Debug, Default)]
    struct MockRule {}

    impl GuardRule for MockRule {
        fn resource_name(&self) -> String {
            "mock resource".into()
        }
    }

    impl fmt::Display for MockRule {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "mock rule")
        }
    }

    #[test]
    fn create_plain() {
        let block_err = BlockError::new(BlockType::Flow);
        assert_eq!(block_err.block_type(), BlockType::Flow);
        assert_eq!(block_err.block_msg(), String::default());
        assert!(block_err.triggered_rule().is_none());
        assert!(block_err.triggered_value().is_none());
        assert_eq!(format!("{}", block_err), "BlockError: Flow");
    }

    #[test]
    fn create_with_msg() {
        let block_err = BlockError::new_with_msg(BlockType::LimitKey, "mock msg".into());
        assert_eq!(block_err.block_type(), BlockType::LimitKey);
        assert_eq!(block_err.block_msg(), "mock msg");
        assert!(block_err.triggered_rule().is_none());
        assert_eq!(
            format!("{}", block_err),
            "BlockError: LimitKey, message: mock msg"
        );
    }

    #[test]
    fn create_with_cause() {
        let rule: Arc<dyn GuardRule> = Arc::new(MockRule::default());
        let snapshot: Arc<Snapshot> = Arc::new(0.5f64);
        let block_err = BlockError::new_with_cause(
            BlockType::Fuse,
            "mock msg".into(),
            rule.clone(),
            snapshot.clone(),
        );
        assert!(Arc::ptr_eq(&block_err.triggered_rule().unwrap(), &rule));
        assert!(Arc::ptr_eq(&block_err.triggered_value().unwrap(), &snapshot));
        assert!(block_err.triggered_rule_as::<MockRule>().is_some());
        assert!(block_err.triggered_rule_as::<String>().is_none());
        assert_eq!(
            (*block_err.triggered_value().unwrap())
                .as_any()
                .downcast_ref::<f64>(),
            Some(&0.5)
        );
    }

    #[test]
    fn into_anyhow() {
        let err: Error = BlockError::new(BlockType::Flow).into();
        assert!(err.downcast_ref::<BlockError>().is_some());
    }
}

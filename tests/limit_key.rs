use std::sync::{Arc, Barrier};
use warden::{base::BlockType, rule_manager::RuleConfig, EntryBuilder, Registry};

fn call(registry: &Registry, key: &str) -> bool {
    match EntryBuilder::new("limit_key".into())
        .with_slot_chain(registry.slot_chain())
        .with_args(vec![key.into()])
        .build()
    {
        Ok(token) => {
            token.exit();
            true
        }
        Err(block_err) => {
            assert_eq!(block_err.block_type(), BlockType::LimitKey);
            false
        }
    }
}

#[test]
fn keys_are_isolated() {
    let registry = Registry::new().unwrap();
    assert!(registry.load_rule(&RuleConfig::limit_key("limit_key", 6)));

    let passed_a = (0..10).filter(|_| call(&registry, "tenant-a")).count();
    assert_eq!(passed_a, 6);
    // saturating tenant-a leaves tenant-b untouched
    let passed_b = (0..6).filter(|_| call(&registry, "tenant-b")).count();
    assert_eq!(passed_b, 6);
    assert!(!call(&registry, "tenant-b"));

    // no key, no limit
    for _ in 0..10 {
        let token = EntryBuilder::new("limit_key".into())
            .with_slot_chain(registry.slot_chain())
            .build()
            .unwrap();
        token.exit();
    }
}

#[test]
fn batch_counts_against_key() {
    let registry = Registry::new().unwrap();
    assert!(registry.load_rule(&RuleConfig::limit_key("limit_key", 6)));
    let batch = |count: u32| {
        EntryBuilder::new("limit_key".into())
            .with_resource_type(warden::base::ResourceType::RPC)
            .with_slot_chain(registry.slot_chain())
            .with_batch_count(count)
            .with_args(vec!["tenant-a".into()])
            .build()
            .map(|token| token.exit())
            .is_ok()
    };
    assert!(batch(4));
    assert!(!batch(3));
    assert!(batch(2));
}

#[test]
fn concurrent_callers_share_key_quota() {
    let registry = Arc::new(Registry::new().unwrap());
    assert!(registry.load_rule(&RuleConfig::limit_key("limit_key", 6)));
    let barrier = Arc::new(Barrier::new(16));
    let mut handlers = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        let barrier = barrier.clone();
        handlers.push(std::thread::spawn(move || {
            barrier.wait();
            // tokens stay open until every caller has been admitted or refused
            let res = EntryBuilder::new("limit_key".into())
                .with_slot_chain(registry.slot_chain())
                .with_args(vec!["tenant-a".into()])
                .build();
            barrier.wait();
            match res {
                Ok(token) => {
                    token.exit();
                    true
                }
                Err(block_err) => {
                    assert_eq!(block_err.block_type(), BlockType::LimitKey);
                    false
                }
            }
        }));
    }
    let passed = handlers
        .into_iter()
        .map(|h| h.join().expect("Couldn't join on the associated thread"))
        .filter(|passed| *passed)
        .count();
    assert_eq!(passed, 6);
}

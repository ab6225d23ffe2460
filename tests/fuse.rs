use std::sync::Arc;
use warden::{
    base::BlockType,
    fuse::{FuseGrade, Rule, State},
    utils::sleep_for_ms,
    Error, EntryBuilder, Registry,
};

const RES: &str = "fuse_cycle";

fn call(registry: &Registry, fail: bool) -> bool {
    match EntryBuilder::new(RES.into())
        .with_slot_chain(registry.slot_chain())
        .build()
    {
        Ok(token) => {
            if fail {
                warden::trace_error(&token, Error::msg("biz error"), 1);
            }
            token.exit();
            true
        }
        Err(block_err) => {
            assert_eq!(block_err.block_type(), BlockType::Fuse);
            false
        }
    }
}

#[test]
fn trip_and_restore() {
    let registry = Registry::new().unwrap();
    let fuse = registry.rule_manager().fuse().clone();
    fuse.load_rules_of_resource(
        RES,
        vec![Arc::new(Rule {
            resource: RES.into(),
            grade: FuseGrade::ExceptionRate,
            threshold: 0.2,
            warning_line: 10,
            restore_time_ms: 2000,
            stat_interval_ms: 10000,
            stat_sliding_window_bucket_count: 10,
            ..Default::default()
        })],
    )
    .unwrap();

    // up to the warning line every call passes, even though all of them fail
    for _ in 0..11 {
        assert!(call(&registry, true));
    }
    // 11 passes exceed the warning line, with a failure rate of 1.0
    assert!(!call(&registry, false));
    let breaker = fuse.get_breakers_of_resource(RES).unwrap()[0].clone();
    assert_eq!(breaker.current_state(), State::Open);
    for _ in 0..5 {
        assert!(!call(&registry, false));
    }

    sleep_for_ms(2100);
    // the probe succeeds
    assert!(call(&registry, false));
    assert_eq!(breaker.current_state(), State::Closed);
    for _ in 0..10 {
        assert!(call(&registry, false));
    }
}

#[test]
fn loaded_from_flat_record() {
    let registry = Registry::new().unwrap();
    assert!(registry.load_rule(&warden::rule_manager::RuleConfig::fuse(
        RES,
        FuseGrade::ExceptionCount,
        3.0,
        5,
        2000
    )));
    for _ in 0..6 {
        assert!(call(&registry, true));
    }
    assert!(!call(&registry, false));
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use warden::{
    base::{BlockType, ConcurrencyStat},
    flow,
    fuse::FuseGrade,
    rule_manager::RuleConfig,
    EntryBuilder, Registry,
};

fn rules(generation: u32) -> Vec<Arc<flow::Rule>> {
    (0..3)
        .map(|idx| {
            Arc::new(flow::Rule {
                resource: "swap".into(),
                threshold: (generation * 10 + idx + 1) as f64,
                ..Default::default()
            })
        })
        .collect()
}

#[test]
fn rule_swap_is_atomic() {
    let registry = Registry::new().unwrap();
    let manager = registry.rule_manager().flow().clone();
    manager.load_rules_of_resource("swap", rules(0)).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let mut readers = Vec::new();
    for _ in 0..4 {
        let manager = manager.clone();
        let stop = stop.clone();
        readers.push(std::thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                let tcs = manager.get_traffic_controller_list_for("swap").unwrap();
                assert_eq!(tcs.len(), 3);
                let generation = tcs[0].rule().threshold as u32 / 10;
                for tc in tcs.iter() {
                    assert_eq!(tc.rule().threshold as u32 / 10, generation);
                }
            }
        }));
    }
    for generation in 1..200 {
        manager
            .load_rules_of_resource("swap", rules(generation))
            .unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    for h in readers {
        h.join().expect("Couldn't join on the associated thread");
    }
}

fn reload_all(registry: &Registry, generation: u32) {
    assert!(registry.load_rule(&RuleConfig::flow("reload", (1000 + generation) as f64)));
    assert!(registry.load_rule(&RuleConfig::fuse(
        "reload",
        FuseGrade::ExceptionRate,
        0.5 + (generation % 40) as f64 / 100.0,
        10,
        1000
    )));
    assert!(registry.load_rule(&RuleConfig::limit_key("reload", (1000 + generation) as u64)));
}

#[test]
fn reload_while_admitting() {
    let registry = Arc::new(Registry::new().unwrap());
    reload_all(&registry, 0);
    let stop = Arc::new(AtomicBool::new(false));

    let mut callers = Vec::new();
    for idx in 0..4 {
        let registry = registry.clone();
        let stop = stop.clone();
        callers.push(std::thread::spawn(move || {
            let key = format!("tenant-{}", idx);
            while !stop.load(Ordering::SeqCst) {
                match EntryBuilder::new("reload".into())
                    .with_slot_chain(registry.slot_chain())
                    .with_args(vec![key.clone()])
                    .build()
                {
                    Ok(token) => token.exit(),
                    Err(block_err) => assert!(matches!(
                        block_err.block_type(),
                        BlockType::Flow | BlockType::Fuse | BlockType::LimitKey
                    )),
                }
                let rules = registry.rule_manager();
                assert_eq!(rules.flow().get_rules_of_resource("reload").len(), 1);
                assert_eq!(rules.fuse().get_rules_of_resource("reload").len(), 1);
                assert_eq!(rules.limit_key().get_rules_of_resource("reload").len(), 1);
                assert_eq!(rules.fuse().get_breakers_of_resource("reload").unwrap().len(), 1);
            }
        }));
    }
    for generation in 1..200 {
        reload_all(&registry, generation);
    }
    stop.store(true, Ordering::SeqCst);
    for h in callers {
        h.join().expect("Couldn't join on the associated thread");
    }
    let node = registry.nodes().get_resource_node("reload").unwrap();
    assert_eq!(node.current_concurrency(), 0);
}

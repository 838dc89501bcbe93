use policy_core::{AsyncPolicyManager, EnforcerConfig, PolicyError, PolicyManager, Rule};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
[sections]
p = ["sub", "obj", "act"]
p2 = ["sub", "act"]
g = ["_", "_"]
g2 = ["_", "_", "_"]

[[seed]]
ptype = "p"
fields = ["admin", "data1", "read"]

[[seed]]
ptype = "g"
fields = ["alice", "admin"]
"#;

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("policy_core=debug"))
        .with_test_writer()
        .with_thread_ids(true)
        .try_init();
}

fn manager_from_sample() -> PolicyManager {
    init_test_logging();
    let config = EnforcerConfig::from_toml_str(CONFIG).unwrap();
    PolicyManager::from_config(&config).unwrap()
}

#[test]
fn test_seeded_model() {
    let manager = manager_from_sample();

    assert_eq!(manager.get_policy(), vec![Rule::from(["admin", "data1", "read"])]);
    assert!(manager.has_role_for_user("alice", "admin"));
    assert!(manager.get_named_policy("p2").is_empty());
}

#[test]
fn test_declared_arity_enforced() {
    let manager = manager_from_sample();

    assert!(matches!(
        manager.add_policy(["bob", "data2"]),
        Err(PolicyError::MalformedRule(_))
    ));
    assert!(manager.add_named_policy("p2", ["bob", "write"]).unwrap());
    assert!(matches!(
        manager.get_filtered_named_policy("p2", 2, &["x"]),
        Err(PolicyError::IndexOutOfRange { .. })
    ));
}

#[test]
fn test_batch_is_all_or_nothing() {
    let manager = manager_from_sample();

    let added = manager
        .add_policies([["bob", "data2", "write"], ["admin", "data1", "read"]])
        .unwrap();
    assert!(!added);
    assert!(!manager.has_policy(["bob", "data2", "write"]));

    let removed = manager
        .remove_policies([["admin", "data1", "read"], ["nobody", "x", "y"]])
        .unwrap();
    assert!(!removed);
    assert!(manager.has_policy(["admin", "data1", "read"]));
}

#[test]
fn test_grouping_mutations_rebuild_roles() {
    let manager = manager_from_sample();

    manager
        .add_grouping_policies([["bob", "admin"], ["carol", "admin"]])
        .unwrap();
    assert_eq!(manager.get_users_for_role("admin"), vec!["alice", "bob", "carol"]);

    assert!(manager.update_grouping_policy(["bob", "admin"], ["bob", "viewer"]).unwrap());
    assert!(!manager.has_role_for_user("bob", "admin"));
    assert!(manager.has_role_for_user("bob", "viewer"));

    assert!(manager.remove_filtered_grouping_policy(1, &["admin"]).unwrap());
    assert!(!manager.has_role_for_user("alice", "admin"));
    assert!(!manager.has_role_for_user("carol", "admin"));
    assert_eq!(manager.get_grouping_policy(), vec![Rule::from(["bob", "viewer"])]);
}

#[test]
fn test_named_grouping_section_has_own_graph() {
    let manager = manager_from_sample();

    manager
        .add_named_grouping_policy("g2", ["dave", "auditor", "tenant1"])
        .unwrap();

    assert!(manager.has_named_link("g2", "dave", "auditor", Some("tenant1")));
    assert!(!manager.has_named_link("g2", "dave", "auditor", Some("tenant2")));
    assert!(!manager.has_role_for_user("dave", "auditor"));
}

#[test]
fn test_policy_writes_leave_roles_alone() {
    let manager = manager_from_sample();
    manager.enable_auto_build_role_links(false);

    // Rebuild never runs for authorization rules, with or without auto build.
    manager.add_policy(["alice", "data9", "read"]).unwrap();
    assert!(manager.has_role_for_user("alice", "admin"));
}

#[test]
fn test_readers_see_consistent_roles_during_grouping_writes() {
    init_test_logging();
    let manager = PolicyManager::new();
    let done = Arc::new(AtomicBool::new(false));
    let link = Rule::from(["alice", "admin"]);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            let done = Arc::clone(&done);
            let link = link.clone();
            thread::spawn(move || {
                let mut checks = 0;
                loop {
                    manager.with_state(|state| {
                        let stored = state.store().has_rule("g", &link);
                        let linked = state
                            .links()
                            .manager("g")
                            .is_some_and(|rm| rm.has_link("alice", "admin", None));
                        assert_eq!(stored, linked);
                    });
                    checks += 1;
                    if done.load(Ordering::Acquire) {
                        break checks;
                    }
                }
            })
        })
        .collect();

    for _ in 0..200 {
        manager.add_grouping_policy(link.clone()).unwrap();
        manager.remove_grouping_policy(link.clone()).unwrap();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
}

#[test]
fn test_writer_progresses_under_read_pressure() {
    let manager = PolicyManager::new();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    manager.with_state(|_| thread::sleep(Duration::from_micros(200)));
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    for i in 0..20 {
        let object = format!("data{}", i);
        assert!(manager.add_policy(vec!["alice", object.as_str(), "read"]).unwrap());
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(manager.get_policy().len(), 20);
}

#[test]
fn test_reload_swaps_model() {
    let manager = manager_from_sample();
    let mut snapshot = manager.snapshot();
    snapshot.add_rule("g", Rule::from(["erin", "admin"])).unwrap();

    manager.clear_policy();
    assert!(manager.get_policy().is_empty());
    assert!(matches!(
        manager.add_policy(["x", "y"]),
        Err(PolicyError::MalformedRule(_))
    ));

    manager.reload(snapshot);
    assert!(manager.has_role_for_user("erin", "admin"));
    assert!(manager.has_role_for_user("alice", "admin"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_concurrent_writes() {
    let manager = AsyncPolicyManager::new(manager_from_sample());

    let mut handles = Vec::new();
    for i in 0..16 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .add_grouping_policy(vec![format!("user{}", i), "admin".to_string()])
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    let users = manager.run(|m| m.get_users_for_role("admin")).await.unwrap();
    assert_eq!(users.len(), 17);
    assert!(manager.has_role_for_user("user7", "admin").await.unwrap());
}

//! Port registry allocation properties

use bridge::{BindProbe, DeviceIdentity, PortRegistry, RegistryError};
use bridge_config::RegistrySettings;
use proptest::prelude::*;
use std::collections::HashSet;
use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

fn always_free() -> Arc<dyn bridge::PortProbe> {
    Arc::new(|_: u16| true)
}

#[test]
fn test_scenario_allocation_is_idempotent_on_real_ports() {
    let registry = PortRegistry::new(&RegistrySettings::default(), Arc::new(BindProbe::default()));
    let key = DeviceIdentity::new("LASER", "robot1", "front_scan")
        .with_sub_part("")
        .key();
    assert_eq!(key, "LASERrobot1front_scan");

    let first = registry.allocate(&key).unwrap();
    assert!((49152..=65535).contains(&first));

    let second = registry.allocate(&key).unwrap();
    assert_eq!(first, second);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_scenario_exhausted_range_reports_sentinel() {
    let registry = PortRegistry::new(&RegistrySettings::default(), Arc::new(|_: u16| false));
    let before = registry.len();
    assert_eq!(registry.allocate_or_zero("LASERrobot1front_scan"), 0);
    assert_eq!(
        registry.allocate("LASERrobot1front_scan"),
        Err(RegistryError::Exhausted {
            key: "LASERrobot1front_scan".into(),
            start: 49152,
            end: 65535,
        })
    );
    assert_eq!(registry.len(), before);
    assert_eq!(registry.lookup("LASERrobot1front_scan"), None);
}

#[test]
fn test_small_range_exhausts_then_recovers_after_release() {
    let registry = PortRegistry::with_range(60000..=60002, always_free());
    let ports: Vec<u16> = ["a", "b", "c"]
        .iter()
        .map(|key| registry.allocate(key).unwrap())
        .collect();
    assert_eq!(ports, vec![60000, 60001, 60002]);

    assert!(matches!(registry.allocate("d"), Err(RegistryError::Exhausted { .. })));

    assert!(registry.deallocate("b"));
    // A different key may legitimately get the released port
    assert_eq!(registry.allocate("d"), Ok(60001));
}

#[test]
fn test_probe_skips_ports_held_outside_the_registry() {
    let held = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = held.local_addr().unwrap().port();

    let registry = PortRegistry::with_range(port..=port, Arc::new(BindProbe::default()));
    assert!(matches!(registry.allocate("x"), Err(RegistryError::Exhausted { .. })));

    drop(held);
    assert_eq!(registry.allocate("x"), Ok(port));
}

#[test]
fn test_port_left_in_time_wait_counts_as_free() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let (accepted, _) = listener.accept().unwrap();

    // The listening side closes first, so its end of the connection lingers in TIME_WAIT
    drop(accepted);
    drop(listener);
    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).unwrap(), 0);
    drop(client);

    let registry = PortRegistry::with_range(port..=port, Arc::new(BindProbe::default()));
    assert_eq!(registry.allocate("x"), Ok(port));
    assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
}

#[test]
fn test_concurrent_registrations_get_distinct_ports() {
    let registry = Arc::new(PortRegistry::with_range(55000..=55999, always_free()));

    let handles: Vec<_> = (0..8)
        .map(|thread_id| {
            let registry = registry.clone();
            thread::spawn(move || {
                (0..50)
                    .map(|i| {
                        // Every thread also races on the shared keys
                        let key = if i % 5 == 0 {
                            format!("shared{}", i)
                        } else {
                            format!("device{}-{}", thread_id, i)
                        };
                        (key.clone(), registry.allocate(&key).unwrap())
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let results: Vec<(String, u16)> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();

    for (key, port) in &results {
        assert_eq!(registry.lookup(key), Some(*port));
    }

    let assignments = registry.list_assignments(None);
    let unique: HashSet<u16> = assignments.values().copied().collect();
    assert_eq!(unique.len(), assignments.len());
    assert_eq!(assignments.len(), 8 * 40 + 10);
}

proptest! {
    #[test]
    fn prop_live_keys_never_share_a_port(
        keys in prop::collection::hash_set("[A-Za-z0-9_]{1,12}", 1..40),
    ) {
        let registry = PortRegistry::with_range(49152..=49300, always_free());
        let mut seen = HashSet::new();

        for key in &keys {
            let port = registry.allocate(key).unwrap();
            prop_assert!((49152..=49300).contains(&port));
            prop_assert!(seen.insert(port));
            prop_assert_eq!(registry.allocate(key).unwrap(), port);
        }
        prop_assert_eq!(registry.len(), keys.len());
    }

    #[test]
    fn prop_ports_stay_in_range_across_release_cycles(
        ops in prop::collection::vec((0usize..6, any::<bool>()), 1..120),
    ) {
        let registry = PortRegistry::with_range(49152..=49157, always_free());

        for (slot, allocate) in ops {
            let key = format!("device{}", slot);
            if allocate {
                let port = registry.allocate(&key).unwrap();
                prop_assert!((49152..=49157).contains(&port));
            } else {
                registry.deallocate(&key);
            }

            let assignments = registry.list_assignments(None);
            let unique: HashSet<u16> = assignments.values().copied().collect();
            prop_assert_eq!(unique.len(), assignments.len());
        }
    }
}

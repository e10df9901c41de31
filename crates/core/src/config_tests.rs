// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_are_valid() {
    let config = RmConfig::default();
    config.validate().unwrap();
    assert_eq!(config.max_placement_retries, 3);
    assert_eq!(config.placing_timeout(), Duration::from_secs(600));
}

#[test]
fn toml_overrides_defaults() {
    let config = RmConfig::from_toml(
        r#"
        placing_timeout_ms = 1000
        max_placement_retries = 5
        backoff_policy = "exponential"
        event_buckets = 4
        "#,
    )
    .unwrap();
    assert_eq!(config.placing_timeout(), Duration::from_secs(1));
    assert_eq!(config.max_placement_retries, 5);
    assert_eq!(config.backoff_policy, BackoffPolicyKind::Exponential);
    assert_eq!(config.event_buckets, 4);
    // untouched field keeps its default
    assert_eq!(config.launching_timeout_ms, 1_200_000);
}

#[test]
fn zero_buckets_rejected() {
    let err = RmConfig::from_toml("event_buckets = 0").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn pool_spec_tree_from_toml() {
    let spec: PoolSpec = toml::from_str(
        r#"
        id = "root"
        limit = { cpu = 100.0, mem_mb = 65536.0 }

        [[children]]
        id = "batch"
        share = 3.0
        limit = { cpu = 80.0, mem_mb = 32768.0 }
        reservation = { cpu = 10.0, mem_mb = 4096.0 }

        [[children]]
        id = "svc"
        limit = { cpu = 40.0, mem_mb = 32768.0 }
        preemptible = false
        "#,
    )
    .unwrap();

    assert_eq!(spec.id, "root");
    assert_eq!(spec.children.len(), 2);
    assert_eq!(spec.children[0].share, 3.0);
    assert_eq!(spec.children[1].share, 1.0, "share defaults to 1.0");
    assert!(!spec.children[1].preemptible);
    assert_eq!(spec.children[0].reservation, Resources::cpu_mem(10.0, 4096.0));
}

#[test]
fn pool_spec_builders() {
    let spec = PoolSpec::new("root", Resources::cpu_mem(10.0, 1024.0))
        .with_child(PoolSpec::new("a", Resources::cpu_mem(5.0, 512.0)).with_share(2.0));
    assert_eq!(spec.children[0].share, 2.0);
}

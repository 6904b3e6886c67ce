use std::time::Duration;

use shepherd_core::ActionType;
use shepherd_worker::ProducerCriticality;

use super::*;

#[test]
fn empty_document_uses_defaults() {
    let config = ShepherdConfig::from_toml("").unwrap();
    assert_eq!(config.state.backend, "memory");
    assert!(config.state.url.is_none());
    assert_eq!(config.keyspace.namespace, "shepherd");
    assert_eq!(config.keyspace.prefix, "jobs");
    assert_eq!(config.keyspace.rate_prefix, "ratelimit");
    assert_eq!(config.worker.workers, 4);
    assert_eq!(config.worker.channel_buffer, 100);
    assert_eq!(config.worker.push_timeout(), Duration::from_secs(5));
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.delay_ms, 5_000);
    assert_eq!(
        config.retry.terminal_substrings,
        vec!["banned", "suspended", "disabled by the user"]
    );
    assert_eq!(config.semaphore.max_trackers_per_org, 3);
    assert_eq!(config.semaphore.heartbeat_ttl(), Duration::from_secs(60));
    assert!(config.work_classes.is_empty());
    assert_eq!(config.rate_limit.mode, RateLimitMode::Shared);
    assert_eq!(config.notifier.kind, NotifierKind::Log);
    assert!(!config.telemetry.json);
    assert_eq!(config.telemetry.filter, "info");
    config.validate().unwrap();
}

#[test]
fn full_document() {
    let toml = r#"
        [state]
        backend = "redis"
        url = "redis://cache:6379/1"
        pool_size = 32

        [keyspace]
        namespace = "acme"

        [worker]
        workers = 8
        channel_buffer = 50
        push_timeout_ms = 2000

        [retry]
        max_attempts = 5
        delay_ms = 250
        terminal_substrings = ["banned"]

        [semaphore]
        max_trackers_per_org = 2
        heartbeat_ttl_seconds = 45

        [[work_class]]
        name = "trackers"
        poll_interval_seconds = 300
        lock_ttl_seconds = 3600
        criticality = "fatal"

        [[work_class]]
        name = "posts"
        workers = 2

        [rate_limit]
        mode = "local"
        cooldown_seconds = 900
        default_max = 3

        [rate_limit.limits]
        comment = 20
        direct_message = 5

        [notifier]
        kind = "webhook"
        url = "https://alerts.example.com/hook"
        timeout_ms = 1500

        [telemetry]
        json = true
        filter = "debug"
    "#;

    let config = ShepherdConfig::from_toml(toml).unwrap();
    config.validate().unwrap();

    assert_eq!(config.state.backend, "redis");
    assert_eq!(config.state.pool_size, Some(32));
    assert_eq!(config.keyspace.to_keyspace().namespace, "acme");
    assert_eq!(config.worker.pool_config().workers, 8);
    assert_eq!(config.worker.pool_config().channel_buffer, 50);

    let policy = config.retry.to_policy();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.delay, Duration::from_millis(250));
    assert_eq!(policy.terminal_substrings, vec!["banned"]);

    let trackers = config.work_class("trackers").unwrap();
    assert_eq!(trackers.criticality, ProducerCriticality::Fatal);
    assert_eq!(trackers.lock_ttl(), Duration::from_secs(3600));
    let poller = trackers.poller_config(config.worker.push_timeout());
    assert_eq!(poller.interval, Duration::from_secs(300));
    assert_eq!(poller.push_timeout, Duration::from_secs(2));

    let posts = config.work_class("posts").unwrap();
    assert_eq!(posts.criticality, ProducerCriticality::BestEffort);
    assert_eq!(posts.poll_interval_seconds, 60);
    assert_eq!(posts.workers, Some(2));

    let limits = config.rate_limit.to_config();
    assert_eq!(limits.cooldown, Duration::from_secs(900));
    assert_eq!(limits.max_for(&ActionType::Comment), Some(20));
    assert_eq!(limits.max_for(&ActionType::DirectMessage), Some(5));
    assert_eq!(limits.max_for(&ActionType::Like), Some(3));

    assert_eq!(config.notifier.kind, NotifierKind::Webhook);
    assert_eq!(config.notifier.timeout(), Duration::from_millis(1500));
    assert!(config.telemetry.json);
}

#[cfg(feature = "redis")]
#[test]
fn redis_settings_fall_back_to_backend_defaults() {
    let state: StateConfig = toml::from_str(
        r#"
        backend = "redis"
        url = "redis://cache:6379"
        connection_timeout_ms = 750
        "#,
    )
    .unwrap();
    let redis = state.redis_config();
    assert_eq!(redis.url, "redis://cache:6379");
    assert_eq!(redis.pool_size, 10);
    assert!(redis.prefix.is_empty());
    assert_eq!(redis.connection_timeout, Duration::from_millis(750));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let (config, found) = ShepherdConfig::load(Path::new("/nonexistent/shepherd.toml")).unwrap();
    assert!(!found);
    assert_eq!(config.worker.workers, 4);
}

#[test]
fn malformed_document_is_a_config_error() {
    let err = ShepherdConfig::from_toml("[worker]\nworkers = \"many\"").unwrap_err();
    assert!(matches!(err, ServerError::Config(_)));
}

#[test]
fn unknown_criticality_is_rejected() {
    let toml = r#"
        [[work_class]]
        name = "posts"
        criticality = "sometimes"
    "#;
    assert!(ShepherdConfig::from_toml(toml).is_err());
}

#[test]
fn validate_rejects_duplicate_work_class() {
    let toml = r#"
        [[work_class]]
        name = "posts"

        [[work_class]]
        name = "posts"
    "#;
    let err = ShepherdConfig::from_toml(toml).unwrap().validate().unwrap_err();
    assert!(err.to_string().contains("duplicate work_class"));
}

#[test]
fn validate_rejects_redis_without_url() {
    let config = ShepherdConfig::from_toml("[state]\nbackend = \"redis\"").unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_unknown_backend() {
    let config = ShepherdConfig::from_toml("[state]\nbackend = \"etcd\"").unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("unknown state backend"));
}

#[test]
fn validate_rejects_zero_sizes() {
    for toml in [
        "[worker]\nworkers = 0",
        "[worker]\nchannel_buffer = 0",
        "[semaphore]\nmax_trackers_per_org = 0",
        "[rate_limit]\ncooldown_seconds = 0",
        "[[work_class]]\nname = \"p\"\nlock_ttl_seconds = 0",
        "[[work_class]]\nname = \"p\"\nworkers = 0",
    ] {
        let config = ShepherdConfig::from_toml(toml).unwrap();
        assert!(config.validate().is_err(), "accepted: {toml}");
    }
}

#[test]
fn validate_rejects_webhook_without_url() {
    let config = ShepherdConfig::from_toml("[notifier]\nkind = \"webhook\"").unwrap();
    assert!(config.validate().is_err());
}

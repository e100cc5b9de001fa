// tests/config_env.rs
use serial_test::serial;
use std::io::Write;

use content_curator::{Bucket, PipelineConfig, RunSize};

const KEYS: &[&str] = &[
    "PIPELINE_CONFIG_PATH",
    "RUN_SIZE",
    "SHORTLIST_COUNT_TEST",
    "SHORTLIST_COUNT_PROD",
    "FULLTEXT_FETCH_PER_BUCKET_TEST",
    "FULLTEXT_FETCH_PER_BUCKET_PROD",
    "BACKUPS_PER_BUCKET",
];

fn clear_env() {
    for k in KEYS {
        std::env::remove_var(k);
    }
}

#[test]
#[serial]
fn file_then_env_overrides() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let block = dir.path().join("blocked.json");
    std::fs::write(&block, r#"["Spam.example", "www.prnewswire.com"]"#).unwrap();

    let path = dir.path().join("pipeline.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        r#"
run_size = "TEST"
shortlist_count_test = 3
blocked_domains = ["newswire.ca"]
blocked_domains_path = "blocked.json"
max_age_days = 10

[guardrails]
ai_automation = ["AI"]
"#
    )
    .unwrap();

    std::env::set_var("PIPELINE_CONFIG_PATH", &path);
    std::env::set_var("RUN_SIZE", "PROD");
    std::env::set_var("SHORTLIST_COUNT_PROD", "7");
    std::env::set_var("BACKUPS_PER_BUCKET", "0");

    let cfg = PipelineConfig::from_env().unwrap();
    clear_env();

    assert_eq!(cfg.run_size, RunSize::Prod);
    assert_eq!(cfg.shortlist_count_test, 3);
    assert_eq!(cfg.shortlist_count(), 7);
    assert_eq!(cfg.backups_per_bucket, 0);
    assert_eq!(cfg.max_age_days, Some(10));
    assert_eq!(
        cfg.blocked_domains,
        vec![
            "newswire.ca".to_string(),
            "prnewswire.com".to_string(),
            "spam.example".to_string()
        ]
    );
    assert_eq!(cfg.guardrails[&Bucket::AiAutomation], vec!["ai".to_string()]);
}

#[test]
#[serial]
fn missing_explicit_config_path_is_an_error() {
    clear_env();
    std::env::set_var("PIPELINE_CONFIG_PATH", "/definitely/not/here.toml");
    let res = PipelineConfig::load_default();
    clear_env();
    assert!(res.is_err());
}

#[test]
#[serial]
fn invalid_override_keeps_previous_value() {
    clear_env();
    let mut cfg = PipelineConfig::default();
    std::env::set_var("RUN_SIZE", "enormous");
    std::env::set_var("FULLTEXT_FETCH_PER_BUCKET_TEST", "-1");
    cfg.apply_overrides(|k| std::env::var(k).ok());
    clear_env();
    assert_eq!(cfg.run_size, RunSize::Test);
    assert_eq!(cfg.fulltext_fetch_limit(), 1);
}

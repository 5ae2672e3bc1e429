use std::fs;

use chainstore::config::{EngineConfig, LoggingConfig, init_logging};
use chainstore::error::ChainError;
use chainstore::evaluate::EvaluationOptions;

#[test]
fn empty_settings_are_the_defaults() {
    let config = EngineConfig::from_toml("").expect("empty is valid");
    assert_eq!(config, EngineConfig::default());
    assert!(config.evaluation.performant);
    assert!(config.pipeline.enabled);
    assert_eq!(config.evaluation.join_batch_size, 1000);
    assert_eq!(config.scheduler.max_passes, None);
}

#[test]
fn toml_overrides_selected_values() {
    let config = EngineConfig::from_toml(
        r#"
        [evaluation]
        performant = false
        join_batch_size = 64

        [pipeline]
        enabled = false
        allow_large_intermediate_results = false

        [writer]
        batch_size = 10

        [scheduler]
        max_passes = 3
        visibility = "internal"
        "#,
    )
    .expect("valid settings");
    assert!(!config.evaluation.performant);
    assert_eq!(config.evaluation.join_batch_size, 64);
    assert!(!config.evaluation.display_query_plan, "untouched values keep their default");
    assert!(!config.pipeline.enabled);
    assert!(!config.pipeline.allow_large_intermediate_results);
    assert_eq!(config.writer.batch_size, 10);
    assert_eq!(config.writer.queue_capacity, 10_000);
    assert_eq!(config.scheduler.max_passes, Some(3));
    assert_eq!(config.scheduler.visibility, "internal");

    let options = EvaluationOptions::from_config(&config.evaluation);
    assert!(!options.performant);
    assert_eq!(options.join_batch_size, 64);
}

#[test]
fn zero_sizes_are_rejected() {
    for text in [
        "[evaluation]\njoin_batch_size = 0",
        "[pipeline]\nbatch_size = 0",
        "[writer]\nbatch_size = 0",
        "[writer]\nqueue_capacity = 0",
    ] {
        let outcome = EngineConfig::from_toml(text);
        assert!(matches!(outcome, Err(ChainError::Config(_))), "{:?} gave {:?}", text, outcome);
    }
}

#[test]
fn malformed_settings_are_rejected() {
    assert!(matches!(EngineConfig::from_toml("[writer\nbatch_size = 1"), Err(ChainError::Config(_))));
    assert!(matches!(
        EngineConfig::from_toml("[writer]\nbatch_size = \"lots\""),
        Err(ChainError::Config(_))
    ));
    assert!(matches!(
        EngineConfig::from_toml("[logging]\nfilter = \"chainstore=loud\""),
        Err(ChainError::Config(_))
    ));
}

#[test]
fn settings_load_from_a_file() {
    let path = std::env::temp_dir().join(format!("chainstore-settings-{}.toml", std::process::id()));
    fs::write(&path, "[pipeline]\nbatch_size = 5\n\n[logging]\nfilter = \"chainstore=debug\"\n").expect("write settings");
    let loaded = EngineConfig::load(Some(&path));
    fs::remove_file(&path).expect("remove settings");
    let config = loaded.expect("valid file");
    assert_eq!(config.pipeline.batch_size, 5);
    assert_eq!(config.logging.filter, "chainstore=debug");
}

#[test]
fn missing_file_is_an_error() {
    let path = std::env::temp_dir().join("chainstore-no-such-settings.toml");
    assert!(matches!(EngineConfig::load(Some(&path)), Err(ChainError::Config(_))));
}

#[test]
fn logging_can_be_initialized_twice() {
    let config = LoggingConfig::default();
    init_logging(&config).expect("first");
    init_logging(&config).expect("second is a no-op");
}

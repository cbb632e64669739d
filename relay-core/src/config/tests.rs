use std::collections::HashMap;
use std::sync::Arc;
use relay_llm::LlmClient;

use crate::backend::ModelBackend;
use crate::roundtrip::{HistoryMode, RoundTripBuilder, DEFAULT_MAX_ROUNDS};
use super::*;

fn openai_env() -> HashMap<String, String> {
    HashMap::from([(String::from("OPENAI_API_KEY"), String::from("sk-test"))])
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".relay.config");

    let mut config = RelayConfig::default();
    config.add_provider("openai".into(), openai_env(), "gpt-4.1".into());
    config.backend = BackendKind::Chat;
    config.history = HistoryMode::Chain;
    config.max_output_tokens = Some(512);
    config.save_to(&path).unwrap();

    let loaded = RelayConfig::load_from(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(RelayConfig::load_from(&dir.path().join("missing")).is_err());
}

#[test]
fn test_load_fills_defaults_and_resets_selection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".relay.config");
    std::fs::write(
        &path,
        r#"{"providers": [{"provider": "openai", "env_vars": {}}], "selected_provider": 4}"#,
    )
    .unwrap();

    let config = RelayConfig::load_from(&path).unwrap();
    assert_eq!(config.selected_provider, 0);
    assert_eq!(config.backend, BackendKind::Responses);
    assert_eq!(config.history, HistoryMode::Resend);
    assert_eq!(config.max_rounds, DEFAULT_MAX_ROUNDS);
    assert_eq!(config.providers[0].model, "");
}

#[test]
fn test_provider_management() {
    let mut config = RelayConfig::default();
    config.add_provider("openai".into(), openai_env(), "gpt-4.1".into());
    config.add_provider("openai_compatible".into(), HashMap::new(), "llama".into());
    config.add_provider("openai".into(), openai_env(), "o4-mini".into());

    assert!(config.is_duplicate_config("openai", &openai_env(), "gpt-4.1"));
    assert!(!config.is_duplicate_config("openai", &openai_env(), "gpt-5"));

    config.set_selected_provider(2).unwrap();
    assert!(config.set_selected_provider(3).is_err());

    let removed = config.remove_provider(0).unwrap();
    assert_eq!(removed.model, "gpt-4.1");
    assert_eq!(config.selected_provider, 1);
    assert_eq!(config.get_selected_provider().unwrap().model, "o4-mini");

    assert_eq!(config.list_providers(), vec![(0, "openai_compatible", "llama"), (1, "openai", "o4-mini")]);
    assert!(config.remove_provider(5).is_err());
}

#[test]
fn test_backend_kind_parsing() {
    assert_eq!("chat".parse::<BackendKind>().unwrap(), BackendKind::Chat);
    assert_eq!("responses".parse::<BackendKind>().unwrap(), BackendKind::Responses);
    assert!("assistants".parse::<BackendKind>().is_err());
    assert_eq!(serde_json::to_value(BackendKind::Chat).unwrap(), serde_json::json!("chat"));
}

#[test]
fn test_backend_selection() {
    let config = RelayConfig::default();

    let openai = Arc::new(LlmClient::openai("sk-test".into()));
    assert_eq!(config.backend(openai.clone()).unwrap().name(), "responses");
    assert_eq!(config.backend_of(BackendKind::Chat, openai).unwrap().name(), "chat");

    let compatible = Arc::new(LlmClient::compatible("sk-test".into(), "http://localhost:8000/v1".into()));
    assert!(config.backend(compatible).is_err());
}

#[test]
fn test_configure_builder() {
    let config = RelayConfig {
        history: HistoryMode::Chain,
        max_rounds: 3,
        max_output_tokens: Some(64),
        ..RelayConfig::default()
    };
    let backend = config.backend_of(BackendKind::Chat, Arc::new(LlmClient::openai("sk-test".into()))).unwrap();

    let builder = config.configure(RoundTripBuilder::new(backend, "gpt-4.1"));
    assert_eq!(builder.history, HistoryMode::Chain);
    assert_eq!(builder.max_rounds, 3);
    assert_eq!(builder.max_output_tokens, Some(64));
}

#[test]
fn test_error_messages() {
    let mut config = RelayConfig::default();
    let error = config.set_selected_provider(1).unwrap_err();
    assert_eq!(error.to_string(), "provider index 1 out of bounds (have 0 providers)");

    let compatible = Arc::new(LlmClient::compatible("sk-test".into(), "http://localhost:8000/v1".into()));
    let error = config.backend(compatible).err().unwrap();
    assert_eq!(error.to_string(), "provider openai_compatible has no responses API");

    let error = RelayConfig::load_from(std::path::Path::new("/nonexistent/.relay.config")).unwrap_err();
    assert!(matches!(error, ConfigError::Missing(_)));
}

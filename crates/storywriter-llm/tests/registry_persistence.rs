#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use storywriter_llm::{
    BackendConfig, BackendKind, BackendRegistry, ClientSettings, KoboldConfig, OpenAiConfig,
};

fn sample_configs() -> Vec<BackendConfig> {
    vec![
        BackendConfig::Kobold(KoboldConfig {
            name: "Local Kobold".into(),
            address: "http://localhost:5001".into(),
            system_prompt: String::new(),
        }),
        BackendConfig::OpenAi(OpenAiConfig {
            name: "OpenAI".into(),
            address: String::new(),
            api_key: "OPENAI_API_KEY".into(),
            system_prompt: "You are a helpful assistant.".into(),
            use_env_var: true,
            model: None,
        }),
        BackendConfig::OpenAi(OpenAiConfig {
            name: "llama.cpp".into(),
            address: "http://localhost:8080/v1".into(),
            api_key: String::new(),
            system_prompt: String::new(),
            use_env_var: false,
            model: Some("mistral-7b".into()),
        }),
    ]
}

// ---------------------------------------------------------------------------
// 1. Save then load reproduces order, fields and token counter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("llm_config.json");

    let mut registry = BackendRegistry::default();
    for config in sample_configs() {
        registry.add(config).unwrap();
    }
    registry.set_token_count_llm_name(Some("Local Kobold".into()));
    registry.save(&path).await.unwrap();

    let loaded = BackendRegistry::load(&path, ClientSettings::default())
        .await
        .unwrap();
    assert_eq!(loaded.configs(), sample_configs());
    assert_eq!(loaded.token_count_llm_name(), Some("Local Kobold"));
    assert_eq!(loaded.token_counter().unwrap().kind(), BackendKind::Kobold);
}

// ---------------------------------------------------------------------------
// 2. Missing file is an empty registry, not an error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_file_is_empty_registry() {
    let dir = tempfile::tempdir().unwrap();
    let registry = BackendRegistry::load(&dir.path().join("absent.json"), ClientSettings::default())
        .await
        .unwrap();
    assert!(registry.is_empty());
    assert!(registry.token_count_llm_name().is_none());
}

// ---------------------------------------------------------------------------
// 3. Files written by earlier versions load as-is
// ---------------------------------------------------------------------------

#[tokio::test]
async fn loads_existing_file_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("llm_config.json");
    let doc = json!({
        "llms": [
            {"name": "k", "type": "Kobold", "address": "http://localhost:5001", "system_prompt": ""},
            {"name": "o", "type": "OpenAI", "address": "", "api_key": "sk-x",
             "system_prompt": "", "use_env_var": false}
        ],
        "token_count_llm_name": null
    });
    tokio::fs::write(&path, doc.to_string()).await.unwrap();

    let registry = BackendRegistry::load(&path, ClientSettings::default())
        .await
        .unwrap();
    assert_eq!(registry.names(), vec!["k", "o"]);
    assert!(registry.token_counter().is_none());

    // Writing it back keeps the same records.
    registry.save(&path).await.unwrap();
    let saved: serde_json::Value =
        serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
    assert_eq!(saved["llms"], doc["llms"]);
    assert!(saved["token_count_llm_name"].is_null());
}

// ---------------------------------------------------------------------------
// 4. Unknown backend types are skipped, dangling counter names tolerated
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_type_skipped_and_dangling_name_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("llm_config.json");
    let doc = json!({
        "llms": [
            {"name": "future", "type": "Gemini", "address": ""},
            {"name": "k", "type": "Kobold", "address": "http://localhost:5001", "system_prompt": ""}
        ],
        "token_count_llm_name": "future"
    });
    tokio::fs::write(&path, doc.to_string()).await.unwrap();

    let registry = BackendRegistry::load(&path, ClientSettings::default())
        .await
        .unwrap();
    assert_eq!(registry.names(), vec!["k"]);
    assert_eq!(registry.token_count_llm_name(), Some("future"));
    assert!(registry.token_counter().is_none());
}

// ---------------------------------------------------------------------------
// 5. A corrupt file is a config error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn corrupt_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("llm_config.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let err = BackendRegistry::load(&path, ClientSettings::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, storywriter_core::StoryError::Config(_)));
}

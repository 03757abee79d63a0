use conductor::agents::{AgentHandler, MemoryBackend, ProviderKind};
use conductor::config::{LogFormat, Settings};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_toml_config() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("conductor.toml");

    let toml = r#"
[logging]
format = "json"

[tools]
default_timeout_ms = 5000
max_concurrent = 2

[[agents]]
id = "researcher"
name = "Researcher"
system_prompt = "You research {{topic}}."
tools = ["calculator", "json_parse"]
max_iterations = 4

[agents.model]
provider = "openai"
model = "gpt-4o-mini"
temperature = 0.3

[agents.memory]
backend = "hybrid"
max_messages = 50

[agents.memory.embedder]
type = "hashing"
dimensions = 64
"#;
    fs::write(&path, toml)?;

    let settings = Settings::load(Some(&path))?;
    assert_eq!(settings.logging.format, LogFormat::Json);
    assert_eq!(settings.tools.default_timeout_ms, 5000);
    assert_eq!(settings.tools.max_concurrent, 2);

    assert_eq!(settings.agents.len(), 1);
    let agent = &settings.agents[0];
    assert_eq!(agent.id, "researcher");
    assert_eq!(agent.model.provider, ProviderKind::OpenAI);
    assert_eq!(agent.model.temperature, Some(0.3));
    assert_eq!(agent.max_iterations, 4);
    assert_eq!(agent.max_concurrent_tools, 4);
    assert_eq!(agent.memory.backend, MemoryBackend::Hybrid);
    assert_eq!(agent.memory.max_messages, 50);
    assert_eq!(agent.memory.recent_limit, 20);

    let handler = AgentHandler::from_settings(&settings);
    let tools: Vec<String> = handler
        .agent_tools("researcher")?
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(tools, vec!["calculator", "json_parse"]);

    Ok(())
}

#[test]
fn test_env_overrides_file() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("conductor.toml");
    fs::write(&path, "[logging]\nlevel = \"warn\"\n")?;

    std::env::set_var("CONDUCTOR__LOGGING__LEVEL", "debug");
    let loaded = Settings::load(Some(&path));
    std::env::remove_var("CONDUCTOR__LOGGING__LEVEL");

    assert_eq!(loaded?.logging.level, "debug");
    Ok(())
}

#[test]
fn test_validation_failure_is_reported() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("conductor.yaml");

    let yaml = r#"
agents:
  - id: hot
    name: Hot
    system_prompt: "Be creative."
    tools: ["web_search"]
    model:
      provider: mock
      model: mock
      temperature: 3.5
"#;
    fs::write(&path, yaml)?;

    let err = Settings::load(Some(&path)).unwrap_err().to_string();
    assert!(err.contains("Configuration validation failed"));
    assert!(err.contains("agents.hot.model.temperature"));
    assert!(err.contains("unknown tool 'web_search'"));
    Ok(())
}

#[test]
fn test_missing_explicit_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.toml");
    assert!(Settings::load(Some(&path)).is_err());
}

#[test]
fn test_defaults_when_no_agents_configured() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("conductor.toml");
    fs::write(&path, "[tools]\nmax_concurrent = 8\n")?;

    let settings = Settings::load(Some(&path))?;
    assert!(settings.agents.is_empty());
    assert_eq!(settings.tools.default_timeout_ms, 30_000);

    let handler = AgentHandler::from_settings(&settings);
    let ids: Vec<String> = handler.list_agents().into_iter().map(|a| a.id).collect();
    assert_eq!(ids, vec!["assistant", "coder"]);

    let assistant = handler.get_agent("assistant")?;
    assert_eq!(assistant.model.provider, ProviderKind::Anthropic);
    assert_eq!(assistant.tools, vec!["calculator", "current_time"]);
    Ok(())
}

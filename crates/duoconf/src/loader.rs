//! Config file discovery, loading, and environment variable overlay.

use crate::{BackendKind, ConfigError, DuoConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided it replaces the local override and is returned
/// even when missing, so reading it reports the bad path.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/duologue/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("duologue/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        files.push(path.to_path_buf());
        return files;
    }

    let local = PathBuf::from("duologue.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file as a raw TOML table.
pub fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

/// Parse a TOML document into a raw table.
pub fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Merge `overlay` into `base`, with `overlay` taking precedence.
///
/// Nested tables merge key by key; any other value replaces the base value.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                merge_tables(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Deserialize a merged table, then fill in backend defaults that depend on `kind`.
pub fn table_to_config(table: toml::Table, origin: Option<&PathBuf>) -> Result<DuoConfig, ConfigError> {
    let mut config: DuoConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: origin.cloned().unwrap_or_default(),
                message: e.to_string(),
            })?;

    config.backend.apply_kind_defaults();
    config.output.dir = expand_path(&config.output.dir.to_string_lossy());
    Ok(config)
}

/// Apply environment variable overrides to config.
///
/// `vars` is normally `std::env::vars()`; tests pass a fixed list.
pub fn apply_env_overrides<I>(config: &mut DuoConfig, sources: &mut ConfigSources, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: Vec<(String, String)> = vars.into_iter().collect();
    let lookup = |name: &str| {
        vars.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    // Backend kind first, so the credential variable below is the new kind's
    if let Some(v) = lookup("DUOLOGUE_BACKEND") {
        if let Ok(kind) = v.parse::<BackendKind>() {
            config.backend.switch_kind(kind);
            sources.env_overrides.push("DUOLOGUE_BACKEND".to_string());
        }
    }
    if let Some(v) = lookup("DUOLOGUE_BASE_URL") {
        config.backend.base_url = v;
        sources.env_overrides.push("DUOLOGUE_BASE_URL".to_string());
    }
    if let Some(v) = lookup("DUOLOGUE_MODEL") {
        config.backend.default_model = v;
        sources.env_overrides.push("DUOLOGUE_MODEL".to_string());
    }
    if let Some(v) = lookup("DUOLOGUE_SUMMARY_MODEL") {
        config.backend.summary_model = Some(v);
        sources.env_overrides.push("DUOLOGUE_SUMMARY_MODEL".to_string());
    }
    config.backend.apply_kind_defaults();

    // Credential: the configured variable first, DUOLOGUE_API_KEY wins
    if let Some(key_env) = config.backend.api_key_env.clone() {
        if let Some(v) = lookup(&key_env).filter(|v| !v.trim().is_empty()) {
            config.backend.api_key = Some(v);
            sources.env_overrides.push(key_env);
        }
    }
    if let Some(v) = lookup("DUOLOGUE_API_KEY").filter(|v| !v.trim().is_empty()) {
        config.backend.api_key = Some(v);
        sources.env_overrides.push("DUOLOGUE_API_KEY".to_string());
    }

    // Dialogue
    if let Some(v) = lookup("DUOLOGUE_ROUNDS") {
        if let Ok(rounds) = v.parse() {
            config.conversation.rounds = rounds;
            sources.env_overrides.push("DUOLOGUE_ROUNDS".to_string());
        }
    }

    // Output
    if let Some(v) = lookup("DUOLOGUE_OUTPUT_DIR") {
        config.output.dir = expand_path(&v);
        sources.env_overrides.push("DUOLOGUE_OUTPUT_DIR".to_string());
    }

    // Telemetry
    if let Some(v) = lookup("DUOLOGUE_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("DUOLOGUE_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
    if let Some(v) = lookup("DUOLOGUE_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = Some(v);
        sources.env_overrides.push("DUOLOGUE_OTLP_ENDPOINT".to_string());
    }
}

/// Expand a leading `~/` or `$VAR` in an output path.
///
/// Unknown variables and a missing home directory leave the path untouched.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        return directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(rest))
            .unwrap_or_else(|| PathBuf::from(path));
    }

    if let Some(var_and_rest) = path.strip_prefix('$') {
        let (var, rest) = var_and_rest
            .split_once('/')
            .unwrap_or((var_and_rest, ""));
        if let Ok(value) = env::var(var) {
            let base = PathBuf::from(value);
            return if rest.is_empty() { base } else { base.join(rest) };
        }
    }

    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FailurePolicy;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parse(toml: &str) -> DuoConfig {
        let table = parse_table(toml, Path::new("test.toml")).unwrap();
        table_to_config(table, None).unwrap()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = parse("[conversation]\nrounds = 5\n");
        assert_eq!(config.conversation.rounds, 5);
        // Other values should be defaults
        assert_eq!(config.backend.default_model, "gemini-2.5-flash-lite");
        assert_eq!(config.output.dir, PathBuf::from("output"));
    }

    #[test]
    fn test_parse_full_toml() {
        let config = parse(
            r#"
[backend]
kind = "openai"
summary_model = "big-model"
max_tokens = 512

[conversation]
rounds = 3
initial_prompt = "Hi there"
on_failure = "placeholder"
stop_phrase = "GOODBYE"

[conversation.speaker_a]
label = "Alice"
system_prompt = "You are Alice."

[conversation.speaker_b]
label = "Bob"
model = "other-model"

[consent]
enabled = false

[output]
dir = "/data/runs"
log_file = "log.md"

[telemetry]
log_level = "debug"
"#,
        );

        assert_eq!(config.backend.kind, BackendKind::OpenAi);
        assert_eq!(config.backend.base_url, "http://127.0.0.1:1234");
        assert_eq!(config.backend.default_model, "local-model");
        assert_eq!(config.backend.summary_model(), "big-model");
        assert_eq!(config.backend.max_tokens, Some(512));
        assert_eq!(config.conversation.rounds, 3);
        assert_eq!(config.conversation.on_failure, FailurePolicy::Placeholder);
        assert_eq!(config.conversation.stop_phrase.as_deref(), Some("GOODBYE"));
        assert_eq!(config.conversation.speaker_a.label, "Alice");
        assert_eq!(config.conversation.speaker_a.system_prompt.as_deref(), Some("You are Alice."));
        assert_eq!(config.conversation.speaker_b.model.as_deref(), Some("other-model"));
        assert!(!config.consent.enabled);
        assert_eq!(config.output.log_path(), PathBuf::from("/data/runs/log.md"));
        assert_eq!(config.output.summary_file, "conversation_summary.md");
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_parse_error_reports_path() {
        let err = parse_table("[conversation\nrounds = 1", Path::new("broken.toml")).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, PathBuf::from("broken.toml")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_merge_tables_nested() {
        let mut base = parse_table(
            "[conversation]\nrounds = 10\n[conversation.speaker_a]\nlabel = \"A\"\n",
            Path::new("base.toml"),
        )
        .unwrap();
        let overlay = parse_table(
            "[conversation.speaker_a]\nsystem_prompt = \"poet\"\n",
            Path::new("overlay.toml"),
        )
        .unwrap();

        merge_tables(&mut base, overlay);
        let config = table_to_config(base, None).unwrap();

        assert_eq!(config.conversation.rounds, 10);
        assert_eq!(config.conversation.speaker_a.label, "A");
        assert_eq!(config.conversation.speaker_a.system_prompt.as_deref(), Some("poet"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = DuoConfig::default();
        let mut sources = ConfigSources::default();

        apply_env_overrides(
            &mut config,
            &mut sources,
            vars(&[
                ("GEMINI_API_KEY", "from-gemini-var"),
                ("DUOLOGUE_ROUNDS", "4"),
                ("DUOLOGUE_OUTPUT_DIR", "/tmp/duo"),
                ("DUOLOGUE_LOG_LEVEL", "warn"),
                ("UNRELATED", "x"),
            ]),
        );

        assert_eq!(config.backend.api_key.as_deref(), Some("from-gemini-var"));
        assert_eq!(config.conversation.rounds, 4);
        assert_eq!(config.output.dir, PathBuf::from("/tmp/duo"));
        assert_eq!(config.telemetry.log_level, "warn");
        assert_eq!(sources.env_overrides.len(), 4);
    }

    #[test]
    fn test_duologue_api_key_wins() {
        let mut config = DuoConfig::default();
        let mut sources = ConfigSources::default();

        apply_env_overrides(
            &mut config,
            &mut sources,
            vars(&[("GEMINI_API_KEY", "one"), ("DUOLOGUE_API_KEY", "two")]),
        );

        assert_eq!(config.backend.api_key.as_deref(), Some("two"));
    }

    #[test]
    fn test_backend_switch_resets_kind_defaults() {
        let mut config = DuoConfig::default();
        let mut sources = ConfigSources::default();

        apply_env_overrides(&mut config, &mut sources, vars(&[("DUOLOGUE_BACKEND", "llamacpp")]));

        assert_eq!(config.backend.kind, BackendKind::OpenAi);
        assert_eq!(config.backend.base_url, "http://127.0.0.1:1234");
        assert_eq!(config.backend.default_model, "local-model");
    }

    #[test]
    fn test_backend_switch_ignores_gemini_key() {
        let mut config = DuoConfig::default();
        let mut sources = ConfigSources::default();

        apply_env_overrides(
            &mut config,
            &mut sources,
            vars(&[
                ("DUOLOGUE_BACKEND", "openai"),
                ("DUOLOGUE_BASE_URL", "http://127.0.0.1:9999"),
                ("GEMINI_API_KEY", "GOOGLE-SECRET"),
            ]),
        );

        assert_eq!(config.backend.kind, BackendKind::OpenAi);
        assert_eq!(config.backend.api_key_env, None);
        assert_eq!(config.backend.api_key, None);
        assert!(!sources.env_overrides.contains(&"GEMINI_API_KEY".to_string()));
    }

    #[test]
    fn test_backend_switch_drops_local_sampling() {
        let mut config = parse("[backend]\nkind = \"openai\"\n");
        assert_eq!(config.backend.temperature, Some(0.9));
        let mut sources = ConfigSources::default();

        apply_env_overrides(
            &mut config,
            &mut sources,
            vars(&[("DUOLOGUE_BACKEND", "gemini"), ("GEMINI_API_KEY", "g-key")]),
        );

        assert_eq!(config.backend.kind, BackendKind::Gemini);
        assert_eq!(config.backend.temperature, None);
        assert_eq!(config.backend.top_p, None);
        assert_eq!(config.backend.api_key.as_deref(), Some("g-key"));
    }

    #[test]
    fn test_missing_cli_path_is_kept() {
        let missing = Path::new("/nonexistent/duologue-typo.toml");
        let files = discover_config_files_with_override(Some(missing));
        assert_eq!(files.last().map(PathBuf::as_path), Some(missing));

        match read_table(missing).unwrap_err() {
            ConfigError::FileRead { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unparseable_rounds_ignored() {
        let mut config = DuoConfig::default();
        let mut sources = ConfigSources::default();

        apply_env_overrides(&mut config, &mut sources, vars(&[("DUOLOGUE_ROUNDS", "many")]));

        assert_eq!(config.conversation.rounds, 100);
        assert!(sources.env_overrides.is_empty());
    }
}

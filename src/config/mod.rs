use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use directories::BaseDirs;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

/// Which model profile a request should use. Mirrors the default/fast/
/// reasoning model selections exposed through the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTask {
    Default,
    Fast,
    Reasoning,
}

#[derive(Debug, Clone)]
pub struct ModelProfile {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        // Read .askdfrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().flatten() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    /// A config with only the built-in defaults, ignoring the rc file and
    /// the environment. Used by tests for reproducible settings.
    pub fn defaults() -> Self {
        Self { inner: default_map(), config_path: default_config_path() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        // ENV first
        if let Ok(v) = env::var(key) {
            return Some(v);
        }
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn api_key(&self) -> Option<String> {
        self.get("MISTRAL_API_KEY").filter(|v| !v.trim().is_empty())
    }

    pub fn max_iterations(&self) -> usize {
        self.get_usize("MAX_ITERATIONS").unwrap_or(3).max(1)
    }

    pub fn transport_retries(&self) -> usize {
        self.get_usize("TRANSPORT_RETRIES").unwrap_or(2)
    }

    pub fn execution_timeout_secs(&self) -> u64 {
        self.get("EXECUTION_TIMEOUT")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10)
    }

    pub fn max_csv_size_mb(&self) -> u64 {
        self.get("MAX_CSV_SIZE_MB")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(100)
    }

    pub fn sample_size(&self) -> usize {
        self.get_usize("DEFAULT_SAMPLE_SIZE").unwrap_or(5)
    }

    pub fn history_length(&self) -> usize {
        self.get_usize("HISTORY_LENGTH").unwrap_or(20)
    }

    /// Per-task model settings: which model to call and with what budget.
    pub fn model_for(&self, task: ModelTask) -> ModelProfile {
        let get_model =
            |key: &str, fallback: &str| self.get(key).unwrap_or_else(|| fallback.to_string());
        match task {
            ModelTask::Default => ModelProfile {
                model: get_model("MISTRAL_MODEL", "mistral-medium-latest"),
                temperature: 0.5,
                max_tokens: 2000,
            },
            ModelTask::Fast => ModelProfile {
                model: get_model("MISTRAL_FAST_MODEL", "mistral-small-latest"),
                temperature: 0.5,
                max_tokens: 1000,
            },
            ModelTask::Reasoning => ModelProfile {
                model: get_model("MISTRAL_REASONING_MODEL", "magistral-small-latest"),
                temperature: 0.5,
                max_tokens: 3000,
            },
        }
    }
}

fn is_config_key(k: &str) -> bool {
    // Accept known keys or ASKDF_*/MISTRAL_* for forward-compat
    const KEYS: &[&str] = &[
        "MISTRAL_API_KEY",
        "MISTRAL_MODEL",
        "MISTRAL_FAST_MODEL",
        "MISTRAL_REASONING_MODEL",
        "API_BASE_URL",
        "REQUEST_TIMEOUT",
        "MAX_ITERATIONS",
        "TRANSPORT_RETRIES",
        "EXECUTION_TIMEOUT",
        "VERBOSE",
        "MAX_CSV_SIZE_MB",
        "DEFAULT_SAMPLE_SIZE",
        "HISTORY_LENGTH",
        "PRETTIFY_MARKDOWN",
    ];

    KEYS.contains(&k) || k.starts_with("ASKDF_") || k.starts_with("MISTRAL_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("askdf").join(".askdfrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Models
    m.insert("MISTRAL_MODEL".into(), "mistral-medium-latest".into());
    m.insert("MISTRAL_FAST_MODEL".into(), "mistral-small-latest".into());
    m.insert("MISTRAL_REASONING_MODEL".into(), "magistral-small-latest".into());
    m.insert("API_BASE_URL".into(), "default".into());

    // Numbers
    m.insert("REQUEST_TIMEOUT".into(), "60".into());
    m.insert("MAX_ITERATIONS".into(), "3".into());
    m.insert("TRANSPORT_RETRIES".into(), "2".into());
    m.insert("EXECUTION_TIMEOUT".into(), "10".into());
    m.insert("MAX_CSV_SIZE_MB".into(), "100".into());
    m.insert("DEFAULT_SAMPLE_SIZE".into(), "5".into());
    m.insert("HISTORY_LENGTH".into(), "20".into());

    // Bools as strings
    m.insert("VERBOSE".into(), "false".into());
    m.insert("PRETTIFY_MARKDOWN".into(), "true".into());

    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_knob() {
        let cfg = Config::defaults();
        assert_eq!(cfg.max_iterations(), 3);
        assert_eq!(cfg.transport_retries(), 2);
        assert_eq!(cfg.execution_timeout_secs(), 10);
        assert_eq!(cfg.max_csv_size_mb(), 100);
        assert_eq!(cfg.sample_size(), 5);
        assert_eq!(cfg.history_length(), 20);
    }

    #[test]
    fn model_profiles_differ_per_task() {
        let cfg = Config::defaults();
        let default = cfg.model_for(ModelTask::Default);
        let fast = cfg.model_for(ModelTask::Fast);
        let reasoning = cfg.model_for(ModelTask::Reasoning);
        assert_eq!(default.model, "mistral-medium-latest");
        assert_eq!(fast.model, "mistral-small-latest");
        assert!(reasoning.max_tokens > default.max_tokens);
        assert!(fast.max_tokens < default.max_tokens);
    }
}

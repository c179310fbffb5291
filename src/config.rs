//! Configuration
//!
//! Settings consumed by the pipeline, stored in TOML. Every field has a default so a
//! partial file (or no file at all) is valid. Secrets come from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// OCR engine settings
    pub ocr: OcrSettings,
    /// Translation settings
    pub translate: TranslateSettings,
    /// Capture loop settings
    pub pipeline: PipelineSettings,
}

/// OCR engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Tesseract binary name or absolute path
    pub tesseract_cmd: String,
    /// Tesseract language codes, e.g. "eng" or "eng+jpn"
    pub language: String,
    /// Page segmentation mode
    pub psm: u32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            tesseract_cmd: "tesseract".to_string(),
            language: "eng".to_string(),
            psm: 3,
        }
    }
}

/// Which translation service to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Google,
    Deepseek,
}

/// Translation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateSettings {
    pub backend: BackendKind,
    /// Source language code, or "auto"
    pub source_lang: String,
    /// Target language code
    pub target_lang: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub deepseek_base_url: String,
}

impl Default for TranslateSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Google,
            source_lang: "auto".to_string(),
            target_lang: "pt".to_string(),
            timeout_secs: 30,
            cache_capacity: 512,
            cache_ttl_secs: 600,
            deepseek_base_url: crate::translate::deepseek::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl TranslateSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Capture loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Target time between tick starts
    pub interval_secs: f64,
    /// Minimum pause between ticks, however slow the previous one was
    pub min_sleep_secs: f64,
    /// Words must score strictly above this
    pub min_confidence: f32,
    /// Selections must be strictly wider and taller than this
    pub min_selection_px: u32,
    /// How long `stop` waits for the worker before detaching it
    pub stop_timeout_secs: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            interval_secs: 1.0,
            min_sleep_secs: 0.1,
            min_confidence: 0.0,
            min_selection_px: 10,
            stop_timeout_secs: 2.0,
        }
    }
}

fn secs(value: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(fallback)
}

impl PipelineSettings {
    pub fn interval(&self) -> Duration {
        secs(self.interval_secs, Duration::from_secs(1))
    }

    pub fn min_sleep(&self) -> Duration {
        secs(self.min_sleep_secs, Duration::from_millis(100))
    }

    pub fn stop_timeout(&self) -> Duration {
        secs(self.stop_timeout_secs, Duration::from_secs(2))
    }

    /// Sleep before the next tick: `max(min_sleep, interval - elapsed)`.
    pub fn sleep_after(&self, elapsed: Duration) -> Duration {
        self.interval()
            .saturating_sub(elapsed)
            .max(self.min_sleep())
    }
}

impl AppConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        for (name, value) in [
            ("pipeline.interval_secs", p.interval_secs),
            ("pipeline.min_sleep_secs", p.min_sleep_secs),
            ("pipeline.stop_timeout_secs", p.stop_timeout_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")));
            }
        }
        if self.ocr.language.trim().is_empty() {
            return Err(ConfigError::Invalid("ocr.language is empty".into()));
        }
        if self.ocr.tesseract_cmd.trim().is_empty() {
            return Err(ConfigError::Invalid("ocr.tesseract_cmd is empty".into()));
        }
        let t = &self.translate;
        if t.source_lang.trim().is_empty() {
            return Err(ConfigError::Invalid("translate.source_lang is empty".into()));
        }
        if t.target_lang.trim().is_empty() || t.target_lang == "auto" {
            return Err(ConfigError::Invalid(
                "translate.target_lang must be an explicit language".into(),
            ));
        }
        Ok(())
    }
}

/// Default config location, e.g. `~/.config/screen-translator/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "screen-translator")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load `path` (or the default location); a missing file yields defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => return Ok(AppConfig::default()),
    };
    if !path.exists() {
        info!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    info!(path = %path.display(), "loading config");
    load_config(&path)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.ocr.tesseract_cmd, "tesseract");
        assert_eq!(config.ocr.language, "eng");
        assert_eq!(config.translate.backend, BackendKind::Google);
        assert_eq!(config.translate.source_lang, "auto");
        assert_eq!(config.translate.target_lang, "pt");
        assert_eq!(config.pipeline.interval(), Duration::from_secs(1));
        assert_eq!(config.pipeline.min_sleep(), Duration::from_millis(100));
        assert_eq!(config.pipeline.min_selection_px, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sleep_after_respects_floor() {
        let p = PipelineSettings::default();
        assert_eq!(p.sleep_after(Duration::from_millis(300)), Duration::from_millis(700));
        assert_eq!(p.sleep_after(Duration::from_millis(950)), Duration::from_millis(100));
        assert_eq!(p.sleep_after(Duration::from_secs(5)), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[translate]\ntarget_lang = \"ja\"\nbackend = \"deepseek\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.translate.target_lang, "ja");
        assert_eq!(config.translate.backend, BackendKind::Deepseek);
        assert_eq!(config.translate.source_lang, "auto");
        assert_eq!(config.pipeline, PipelineSettings::default());
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.pipeline.interval_secs = 0.5;
        config.ocr.language = "eng+por".into();
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = load_or_default(Some(Path::new("/nonexistent/path/config.toml"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not [valid toml").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.pipeline.interval_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.min_sleep_secs = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.translate.target_lang = "auto".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.ocr.language = " ".into();
        assert!(config.validate().is_err());
    }
}

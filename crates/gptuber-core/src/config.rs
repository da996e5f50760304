use crate::error::{GptuberError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "gptuber.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: f64,
    /// Wait between report ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: f64,
    /// Poll interval of the dispatch drain loop.
    #[serde(default = "default_drain_interval")]
    pub drain_interval_secs: f64,
    /// A report tick is skipped while this many actions are pending.
    #[serde(default = "default_backlog_limit")]
    pub backlog_limit: usize,
    #[serde(default = "default_boredom_patience")]
    pub boredom_patience_secs: f64,
}

fn default_startup_delay() -> f64 {
    5.0
}

fn default_tick_interval() -> f64 {
    10.0
}

fn default_drain_interval() -> f64 {
    1.0
}

fn default_backlog_limit() -> usize {
    3
}

fn default_boredom_patience() -> f64 {
    120.0
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            startup_delay_secs: default_startup_delay(),
            tick_interval_secs: default_tick_interval(),
            drain_interval_secs: default_drain_interval(),
            backlog_limit: default_backlog_limit(),
            boredom_patience_secs: default_boredom_patience(),
        }
    }
}

impl SchedulerConfig {
    pub fn startup_delay(&self) -> Duration {
        secs(self.startup_delay_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        secs(self.tick_interval_secs)
    }

    pub fn drain_interval(&self) -> Duration {
        secs(self.drain_interval_secs)
    }
}

fn secs(s: f64) -> Duration {
    if s.is_finite() && s > 0.0 {
        Duration::from_secs_f64(s)
    } else {
        Duration::ZERO
    }
}

// ---------------------------------------------------------------------------
// ReportConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_max_chat_chars")]
    pub max_chat_chars: usize,
}

fn default_max_chat_chars() -> usize {
    256
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_chat_chars: default_max_chat_chars(),
        }
    }
}

// ---------------------------------------------------------------------------
// TimelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    #[serde(default = "default_seconds_per_mora")]
    pub seconds_per_mora: f64,
    #[serde(default = "default_agent_caption_prefix")]
    pub agent_caption_prefix: String,
    /// argv of the morphological analyzer.
    #[serde(default = "default_mecab_command")]
    pub mecab_command: Vec<String>,
}

fn default_seconds_per_mora() -> f64 {
    crate::mora::DEFAULT_SECONDS_PER_MORA
}

fn default_agent_caption_prefix() -> String {
    "(Google Home) ".to_string()
}

fn default_mecab_command() -> Vec<String> {
    vec!["mecab".to_string()]
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            seconds_per_mora: default_seconds_per_mora(),
            agent_caption_prefix: default_agent_caption_prefix(),
            mecab_command: default_mecab_command(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Use the neural voice for the streamer.
    #[serde(default = "default_true")]
    pub neural: bool,
    /// Command that renders its last argument to audio and prints the file path.
    #[serde(default = "default_neural_command")]
    pub neural_command: Vec<String>,
    #[serde(default = "default_player_command")]
    pub player_command: Vec<String>,
    #[serde(default = "default_say_command")]
    pub say_command: String,
    #[serde(default = "default_jp_voice")]
    pub classic_jp_voice: String,
    #[serde(default = "default_en_voice")]
    pub classic_en_voice: String,
    /// Speak nothing; wait out the estimated duration instead.
    #[serde(default)]
    pub silent: bool,
}

fn default_true() -> bool {
    true
}

fn default_neural_command() -> Vec<String> {
    vec!["sh".to_string(), "./tts.sh".to_string()]
}

fn default_player_command() -> Vec<String> {
    vec!["mpg123".to_string(), "-q".to_string()]
}

fn default_say_command() -> String {
    "say".to_string()
}

fn default_jp_voice() -> String {
    "Kyoko".to_string()
}

fn default_en_voice() -> String {
    "Samantha".to_string()
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            neural: true,
            neural_command: default_neural_command(),
            player_command: default_player_command(),
            say_command: default_say_command(),
            classic_jp_voice: default_jp_voice(),
            classic_en_voice: default_en_voice(),
            silent: false,
        }
    }
}

// ---------------------------------------------------------------------------
// AgentConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mock: bool,
    /// argv of the agent; the query is appended as the last argument.
    #[serde(default = "default_agent_command")]
    pub command: Vec<String>,
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,
}

fn default_agent_command() -> Vec<String> {
    vec![
        "python".to_string(),
        "-u".to_string(),
        "./agent.py".to_string(),
    ]
}

fn default_agent_timeout() -> u64 {
    80
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mock: false,
            command: default_agent_command(),
            timeout_secs: default_agent_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// CommandConfig (brain / distraction)
// ---------------------------------------------------------------------------

/// An optional external command. Absent means the canned stand-in is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// ExpressionsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpressionsConfig {
    /// Emoji → expression asset file name.
    #[serde(default)]
    pub table: HashMap<String, String>,
    #[serde(default)]
    pub assets_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// YoutubeConfig
// ---------------------------------------------------------------------------

/// Live chat from a YouTube stream, merged with local chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    /// Watch URL of the live stream. Unset means no YouTube chat.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the Data API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_key_env() -> String {
    "YOUTUBE_API_KEY".to_string()
}

fn default_api_base() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key_env: default_api_key_env(),
            api_base: default_api_base(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub brain: CommandConfig,
    #[serde(default)]
    pub distraction: CommandConfig,
    #[serde(default)]
    pub expressions: ExpressionsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub youtube: YoutubeConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GptuberError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(GptuberError::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let s = &self.scheduler;

        if s.backlog_limit == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "scheduler.backlog_limit is 0: no report will ever be generated".into(),
            });
        }

        for (name, value) in [
            ("tick_interval_secs", s.tick_interval_secs),
            ("drain_interval_secs", s.drain_interval_secs),
        ] {
            if !(value.is_finite() && value > 0.0) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("scheduler.{name} should be positive, got {value}"),
                });
            }
        }

        if !(self.timeline.seconds_per_mora.is_finite() && self.timeline.seconds_per_mora > 0.0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "timeline.seconds_per_mora must be positive, got {}",
                    self.timeline.seconds_per_mora
                ),
            });
        }

        if self.timeline.mecab_command.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "timeline.mecab_command is empty".into(),
            });
        }

        if self.agent.enabled && !self.agent.mock && self.agent.command.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "agent.command is empty".into(),
            });
        }

        for (section, cmd) in [("brain", &self.brain), ("distraction", &self.distraction)] {
            if matches!(&cmd.command, Some(argv) if argv.is_empty()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("{section}.command is empty; the canned stand-in is used"),
                });
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_the_streamer_timing() {
        let cfg = Config::default();
        assert_eq!(cfg.scheduler.tick_interval(), Duration::from_secs(10));
        assert_eq!(cfg.scheduler.drain_interval(), Duration::from_secs(1));
        assert_eq!(cfg.scheduler.backlog_limit, 3);
        assert_eq!(cfg.scheduler.boredom_patience_secs, 120.0);
        assert_eq!(cfg.report.max_chat_chars, 256);
        assert!((cfg.timeline.seconds_per_mora - 0.14).abs() < 1e-12);
        assert_eq!(cfg.agent.timeout_secs, 80);
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.youtube.url.is_none());
        assert_eq!(cfg.youtube.api_key_env, "YOUTUBE_API_KEY");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "scheduler:\n  backlog_limit: 5\nspeech:\n  neural: false\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.scheduler.backlog_limit, 5);
        assert_eq!(cfg.scheduler.tick_interval_secs, 10.0);
        assert!(!cfg.speech.neural);
        assert_eq!(cfg.speech.classic_jp_voice, "Kyoko");
    }

    #[test]
    fn missing_file_is_an_error_for_load() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, GptuberError::ConfigNotFound(_)));
    }

    #[test]
    fn missing_file_defaults_for_load_or_default() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load_or_default(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(cfg.scheduler.backlog_limit, 3);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let mut cfg = Config::default();
        cfg.expressions
            .table
            .insert("😊".to_string(), "smile.png".to_string());
        cfg.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.expressions.table.get("😊").map(String::as_str), Some("smile.png"));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn validate_zero_backlog() {
        let mut cfg = Config::default();
        cfg.scheduler.backlog_limit = 0;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("backlog_limit")));
    }

    #[test]
    fn validate_non_positive_mora_coefficient() {
        let mut cfg = Config::default();
        cfg.timeline.seconds_per_mora = 0.0;
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("seconds_per_mora")));
    }

    #[test]
    fn validate_empty_brain_command() {
        let mut cfg = Config::default();
        cfg.brain.command = Some(vec![]);
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("brain.command")));
    }
}

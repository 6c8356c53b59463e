use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pgroup::{PlatformPolicy, ProcessGroupPolicy, SingleProcessPolicy};
use serde::{Deserialize, Deserializer};

// ── Global config (~/.config/pgroup/config.toml) ────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
	#[serde(default)]
	pub terminate: TerminateConfig,
	#[serde(default)]
	pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminateConfig {
	#[serde(default = "default_patience", deserialize_with = "duration_str")]
	pub patience: Duration,
	#[serde(default)]
	pub policy: PolicyKind,
}

impl Default for TerminateConfig {
	fn default() -> Self {
		Self { patience: default_patience(), policy: PolicyKind::default() }
	}
}

fn default_patience() -> Duration { Duration::from_secs(5) }

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogConfig {
	pub level: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
	/// Signal the whole process group
	#[default]
	Group,
	/// Signal only the launched process
	Single,
}

impl PolicyKind {
	pub fn policy(self) -> Arc<dyn PlatformPolicy> {
		match self {
			PolicyKind::Group => Arc::new(ProcessGroupPolicy),
			PolicyKind::Single => Arc::new(SingleProcessPolicy),
		}
	}
}

pub fn config_dir() -> PathBuf {
	if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
		PathBuf::from(dir).join("pgroup")
	} else if let Ok(home) = std::env::var("HOME") {
		PathBuf::from(home).join(".config").join("pgroup")
	} else {
		PathBuf::from("/tmp").join("pgroup").join("config")
	}
}

pub fn parse_config(content: &str) -> Result<GlobalConfig, String> {
	toml::from_str(content).map_err(|e| e.to_string())
}

/// Load `path`, or the default config file when `None`. Problems are
/// reported on stderr and fall back to defaults.
pub fn load_global_config(path: Option<&Path>) -> GlobalConfig {
	let path = path
		.map(Path::to_path_buf)
		.unwrap_or_else(|| config_dir().join("config.toml"));
	if path.exists() {
		match std::fs::read_to_string(&path) {
			Ok(content) => match parse_config(&content) {
				Ok(config) => return config,
				Err(e) => eprintln!("warning: failed to parse {}: {}", path.display(), e),
			},
			Err(e) => eprintln!("warning: failed to read {}: {}", path.display(), e),
		}
	}
	GlobalConfig::default()
}

fn duration_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
	let s = String::deserialize(deserializer)?;
	parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Parse `"250ms"`, `"3s"`, `"1m"` or `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
	let s = s.trim();
	let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
	let (digits, unit) = s.split_at(split);
	if digits.is_empty() {
		return Err(format!("bad duration '{}': expected a number and ms, s, m or h", s));
	}
	let n: u64 = digits
		.parse()
		.map_err(|e| format!("bad duration '{}': {}", s, e))?;

	let secs_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
		"ms" => return Ok(Duration::from_millis(n)),
		"s" => 1,
		"m" => 60,
		"h" => 3600,
		"" => return Err(format!("duration '{}' needs a unit: ms, s, m or h", s)),
		other => return Err(format!("unknown duration unit '{}': use ms, s, m or h", other)),
	};
	n.checked_mul(secs_per_unit)
		.map(Duration::from_secs)
		.ok_or_else(|| "duration too large".to_string())
}

pub fn parse_level(s: &str) -> Option<tracing::Level> {
	match s.trim().to_lowercase().as_str() {
		"error" => Some(tracing::Level::ERROR),
		"warn" | "warning" => Some(tracing::Level::WARN),
		"info" => Some(tracing::Level::INFO),
		"debug" => Some(tracing::Level::DEBUG),
		"trace" => Some(tracing::Level::TRACE),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn durations() {
		assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
		assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
		assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
		assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
		assert!(parse_duration("").is_err());
		assert!(parse_duration("10").is_err());
		assert!(parse_duration("5d").is_err());
		assert!(parse_duration("ms").is_err());
	}

	#[test]
	fn huge_durations_are_rejected() {
		let too_large = Err("duration too large".to_string());
		assert_eq!(parse_duration("400000000000000000m"), too_large);
		assert_eq!(parse_duration("10000000000000000h"), too_large);
		assert_eq!(
			parse_duration("18446744073709551615s"),
			Ok(Duration::from_secs(u64::MAX))
		);
		assert!(parse_duration("99999999999999999999s").is_err());
	}

	#[test]
	fn empty_config_uses_defaults() {
		let config = parse_config("").unwrap();
		assert_eq!(config.terminate.patience, Duration::from_secs(5));
		assert_eq!(config.terminate.policy, PolicyKind::Group);
		assert_eq!(config.log.level, None);
	}

	#[test]
	fn full_config() {
		let config = parse_config(
			r#"
			[terminate]
			patience = "750ms"
			policy = "single"

			[log]
			level = "debug"
			"#,
		)
		.unwrap();
		assert_eq!(config.terminate.patience, Duration::from_millis(750));
		assert_eq!(config.terminate.policy, PolicyKind::Single);
		assert_eq!(config.log.level.as_deref(), Some("debug"));
	}

	#[test]
	fn bad_patience_is_rejected() {
		let err = parse_config("[terminate]\npatience = \"soon\"\n").unwrap_err();
		assert!(err.contains("duration"), "got {}", err);
	}

	#[test]
	fn missing_file_falls_back_to_defaults() {
		let path = std::env::temp_dir().join("pgroup-no-such-config.toml");
		let config = load_global_config(Some(&path));
		assert_eq!(config.terminate.patience, Duration::from_secs(5));
	}

	#[test]
	fn levels() {
		assert_eq!(parse_level("WARNING"), Some(tracing::Level::WARN));
		assert_eq!(parse_level("trace"), Some(tracing::Level::TRACE));
		assert_eq!(parse_level("loud"), None);
	}
}

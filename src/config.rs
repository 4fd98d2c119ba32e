use crate::reconnect::ReconnectPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeConfigSnapshot {
    pub source: Option<String>,
    pub base_url: Option<String>,
    pub resource_path: Option<String>,
    pub member_param: Option<String>,
    pub settle_delay: Option<Duration>,
    pub reconnect: ReconnectPolicy,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfigWatcher {
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct NswatchConfigFile {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    resource_path: Option<String>,
    #[serde(default, alias = "query_param")]
    member_param: Option<String>,
    #[serde(default, alias = "settle_ms")]
    settle_delay_ms: Option<u64>,
    #[serde(default)]
    reconnect: ReconnectSpec,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ReconnectSpec {
    #[serde(default, alias = "delay_ms")]
    initial_delay_ms: Option<u64>,
    #[serde(default)]
    max_delay_ms: Option<u64>,
    #[serde(default)]
    multiplier: Option<f64>,
}

impl RuntimeConfigWatcher {
    pub fn discover() -> Self {
        Self {
            path: discover_config_path(),
            modified: None,
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load_current(&mut self) -> Result<RuntimeConfigSnapshot> {
        let Some(path) = self.path.clone() else {
            return Ok(RuntimeConfigSnapshot::default());
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read runtime config {}", path.display()))?;
        let snapshot = parse_config(&raw, &path.display().to_string())
            .with_context(|| format!("failed to parse runtime config {}", path.display()))?;
        self.modified = fs::metadata(&path)
            .ok()
            .and_then(|meta| meta.modified().ok());

        Ok(snapshot)
    }

    pub fn reload_if_changed(&mut self) -> Result<Option<RuntimeConfigSnapshot>> {
        let Some(current_path) = self.path.clone() else {
            self.path = discover_config_path();
            if self.path.is_some() {
                return self.load_current().map(Some);
            }
            return Ok(None);
        };

        if !current_path.exists() {
            self.path = discover_config_path();
            self.modified = None;
            if self.path.is_some() {
                return self.load_current().map(Some);
            }
            return Ok(Some(RuntimeConfigSnapshot::default()));
        }

        let modified = fs::metadata(&current_path)
            .ok()
            .and_then(|meta| meta.modified().ok());
        if modified != self.modified {
            return self.load_current().map(Some);
        }

        Ok(None)
    }
}

pub fn parse_config(raw: &str, source: &str) -> Result<RuntimeConfigSnapshot> {
    let parsed: NswatchConfigFile = if raw.trim().is_empty() {
        NswatchConfigFile::default()
    } else {
        serde_yaml::from_str(raw)?
    };

    let defaults = ReconnectPolicy::default();
    let reconnect = ReconnectPolicy {
        initial_delay: parsed
            .reconnect
            .initial_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_delay),
        max_delay: parsed
            .reconnect
            .max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_delay),
        multiplier: parsed.reconnect.multiplier.unwrap_or(defaults.multiplier),
    };
    if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
        anyhow::bail!(
            "reconnect.multiplier must be at least 1.0, got {}",
            reconnect.multiplier
        );
    }

    Ok(RuntimeConfigSnapshot {
        source: Some(source.to_string()),
        base_url: non_empty(parsed.base_url),
        resource_path: non_empty(parsed.resource_path),
        member_param: non_empty(parsed.member_param),
        settle_delay: parsed.settle_delay_ms.map(Duration::from_millis),
        reconnect,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("NSWATCH_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("nswatch.yaml"),
        PathBuf::from("nswatch.yml"),
        PathBuf::from(".nswatch.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/nswatch/config.yaml"),
            PathBuf::from(&home).join(".nswatch.yaml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{RuntimeConfigWatcher, parse_config};
    use crate::reconnect::ReconnectPolicy;
    use std::time::Duration;

    #[test]
    fn full_config_parses() {
        let raw = r#"
base_url: https://dash.example/api/v1
resource_path: /api/v1/namespaces/
member_param: ns
settle_delay_ms: 100
reconnect:
  initial_delay_ms: 2000
  max_delay_ms: 30000
  multiplier: 1.5
"#;
        let snapshot = parse_config(raw, "nswatch.yaml").expect("config should parse");

        assert_eq!(snapshot.source.as_deref(), Some("nswatch.yaml"));
        assert_eq!(
            snapshot.base_url.as_deref(),
            Some("https://dash.example/api/v1")
        );
        assert_eq!(
            snapshot.resource_path.as_deref(),
            Some("/api/v1/namespaces/")
        );
        assert_eq!(snapshot.member_param.as_deref(), Some("ns"));
        assert_eq!(snapshot.settle_delay, Some(Duration::from_millis(100)));
        assert_eq!(
            snapshot.reconnect,
            ReconnectPolicy {
                initial_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(30),
                multiplier: 1.5,
            }
        );
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let snapshot = parse_config("member_param: '  '\n", "x").expect("config should parse");
        assert!(snapshot.base_url.is_none());
        assert!(snapshot.member_param.is_none());
        assert!(snapshot.settle_delay.is_none());
        assert_eq!(snapshot.reconnect, ReconnectPolicy::default());

        let empty = parse_config("", "x").expect("empty config should parse");
        assert_eq!(empty.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn fixed_interval_policy_is_expressible() {
        let raw = "reconnect:\n  delay_ms: 5000\n  max_delay_ms: 5000\n  multiplier: 1.0\n";
        let snapshot = parse_config(raw, "x").expect("config should parse");
        assert_eq!(
            snapshot.reconnect,
            ReconnectPolicy {
                initial_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(5),
                multiplier: 1.0,
            }
        );
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(parse_config("reconnect:\n  multiplier: 0.5\n", "x").is_err());
        assert!(parse_config("plugins: []\n", "x").is_err());
        assert!(parse_config("settle_delay_ms: soon\n", "x").is_err());
    }

    #[test]
    fn watcher_without_file_yields_defaults() {
        let mut watcher = RuntimeConfigWatcher {
            path: None,
            modified: None,
        };
        let snapshot = watcher.load_current().expect("no file is fine");
        assert!(snapshot.source.is_none());
        assert_eq!(snapshot.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn watcher_reads_file_and_reports_missing_one() {
        let path = std::env::temp_dir().join(format!(
            "nswatch-config-test-{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "member_param: project\n").expect("write config");

        let mut watcher = RuntimeConfigWatcher {
            path: Some(path.clone()),
            modified: None,
        };
        let snapshot = watcher.load_current().expect("config should load");
        assert_eq!(snapshot.member_param.as_deref(), Some("project"));
        assert!(watcher.reload_if_changed().expect("reload").is_none());

        std::fs::remove_file(&path).expect("remove config");
        let mut missing = RuntimeConfigWatcher {
            path: Some(path.with_extension("missing")),
            modified: None,
        };
        assert!(missing.load_current().is_err());
    }
}

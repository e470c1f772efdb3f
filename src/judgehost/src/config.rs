use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "kebab-case")]
pub struct JudgehostConfig {
    /// Group which owns staging directories. Sandboxed users must be
    /// members of it. If unset, ownership is left as created.
    #[serde(default)]
    pub judge_group_id: Option<u32>,
    /// Privileged helper invoked as `<program> --path <dir>` to hand shared
    /// files back to the judge user. If unset, permissions are never reset.
    #[serde(default)]
    pub fix_permissions: Option<PathBuf>,
    /// Limits for output validators. Validators are trusted, so these are
    /// generous.
    #[serde(default)]
    pub validator_limits: LimitsConfig,
    /// Settings of the process sandbox backend
    #[serde(default)]
    pub process_backend: ProcessBackendConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "kebab-case")]
pub struct LimitsConfig {
    #[serde(default = "LimitsConfig::default_time_limit_ms")]
    pub time_limit_ms: u64,
    #[serde(default = "LimitsConfig::default_memory_limit_kb")]
    pub memory_limit_kb: u64,
}

impl LimitsConfig {
    fn default_time_limit_ms() -> u64 {
        60_000
    }

    fn default_memory_limit_kb() -> u64 {
        1000 * 1000
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            time_limit_ms: Self::default_time_limit_ms(),
            memory_limit_kb: Self::default_memory_limit_kb(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "kebab-case")]
pub struct ProcessBackendConfig {
    /// How often a running child is polled for exit
    #[serde(default = "ProcessBackendConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl ProcessBackendConfig {
    fn default_poll_interval_ms() -> u64 {
        5
    }
}

impl Default for ProcessBackendConfig {
    fn default() -> Self {
        ProcessBackendConfig {
            poll_interval_ms: Self::default_poll_interval_ms(),
        }
    }
}

impl JudgehostConfig {
    pub fn load(path: &Path) -> anyhow::Result<JudgehostConfig> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_yaml::from_str(&data)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Loads config from `path` if given, otherwise from `$JUDGEHOST_CONFIG`,
    /// otherwise returns defaults.
    pub fn discover(path: Option<&Path>) -> anyhow::Result<JudgehostConfig> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match std::env::var_os("JUDGEHOST_CONFIG") {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(JudgehostConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg: JudgehostConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.judge_group_id, None);
        assert_eq!(cfg.fix_permissions, None);
        assert_eq!(cfg.validator_limits.time_limit_ms, 60_000);
        assert_eq!(cfg.validator_limits.memory_limit_kb, 1_000_000);
        assert_eq!(cfg.process_backend.poll_interval_ms, 5);
    }

    #[test]
    fn full() {
        let cfg: JudgehostConfig = serde_yaml::from_str(
            "judge-group-id: 1500\n\
             fix-permissions: /usr/bin/judgehost-fixpermissions\n\
             validator-limits:\n  time-limit-ms: 10000\n",
        )
        .unwrap();
        assert_eq!(cfg.judge_group_id, Some(1500));
        assert_eq!(
            cfg.fix_permissions.as_deref(),
            Some(Path::new("/usr/bin/judgehost-fixpermissions"))
        );
        assert_eq!(cfg.validator_limits.time_limit_ms, 10_000);
        assert_eq!(cfg.validator_limits.memory_limit_kb, 1_000_000);
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(serde_yaml::from_str::<JudgehostConfig>("workers: 3\n").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("judgehost.yaml");
        std::fs::write(&path, "judge-group-id: 7\n").unwrap();
        let cfg = JudgehostConfig::discover(Some(&path)).unwrap();
        assert_eq!(cfg.judge_group_id, Some(7));
        assert!(JudgehostConfig::load(&dir.path().join("missing.yaml")).is_err());
    }
}

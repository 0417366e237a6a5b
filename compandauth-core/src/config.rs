use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Environment variable naming a TOML or JSON policy file.
pub const POLICY_PATH_ENV: &str = "CAA_POLICY_PATH";
/// Environment variable holding an inline JSON policy.
pub const POLICY_JSON_ENV: &str = "CAA_POLICY_JSON";

/// Largest accepted validation window. Keeps `revoke_outstanding` within
/// reach for every counter below `i64::MAX - MAX_WINDOW`.
pub const MAX_WINDOW: i64 = 1 << 32;

/// Source that produced the validation policy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PolicySource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
}

/// Validation settings applied by
/// [`CounterRegistry`](crate::registry::CounterRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationPolicy {
    /// Slack handed to the counter's validity check. A session stays valid
    /// while fewer than `window` issuances or revocations have happened after
    /// it, so `1` accepts only the latest session and `0` accepts none.
    /// Raise it to let a credential keep several concurrent sessions.
    pub window: i64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self { window: 1 }
    }
}

impl ValidationPolicy {
    pub fn new(window: i64) -> anyhow::Result<Self> {
        let policy = Self { window };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window < 0 {
            bail!(
                "validation window must be non-negative, got {}",
                self.window
            );
        }
        if self.window > MAX_WINDOW {
            bail!(
                "validation window must be at most {MAX_WINDOW}, got {}",
                self.window
            );
        }
        Ok(())
    }

    /// Load policy overrides using environment variables.
    /// Evaluation order:
    /// 1) `$CAA_POLICY_PATH` (TOML or JSON file),
    /// 2) `$CAA_POLICY_JSON` (inline JSON),
    /// 3) defaults if neither is set.
    pub fn load_from_env() -> anyhow::Result<(Self, PolicySource)> {
        Self::load_from_vars(
            env::var(POLICY_PATH_ENV).ok().as_deref(),
            env::var(POLICY_JSON_ENV).ok().as_deref(),
        )
    }

    fn load_from_vars(
        path: Option<&str>,
        inline: Option<&str>,
    ) -> anyhow::Result<(Self, PolicySource)> {
        if let Some(path_str) = path
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let policy = Self::load_from_file(&path)?;
            return Ok((policy, PolicySource::EnvPath(path)));
        }

        if let Some(raw) = inline
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(raw).with_context(|| {
                format!("failed to parse {POLICY_JSON_ENV}")
            })?;
            return Ok((parsed, PolicySource::EnvInline));
        }

        Ok((Self::default(), PolicySource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read validation policy from {}", path.display())
        })?;

        let policy = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid validation policy {}", path.display())
            })?,
            Some("toml") | Some("tml") => {
                let policy: Self = toml::from_str(&contents).map_err(|err| {
                    anyhow!(
                        "invalid validation policy {}: {}",
                        path.display(),
                        err
                    )
                })?;
                policy.validate().with_context(|| {
                    format!("invalid validation policy {}", path.display())
                })?;
                policy
            }
            _ => Self::parse_from_str(&contents, &path.display().to_string())?,
        };

        Ok(policy)
    }

    pub fn parse_from_str(
        contents: &str,
        origin: &str,
    ) -> anyhow::Result<Self> {
        // Try TOML first, then JSON for convenience.
        let policy: Self = toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse validation policy {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        let policy: Self = serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid validation policy json: {err}"))?;
        policy.validate()?;
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_window_accepts_latest_session_only() {
        assert_eq!(ValidationPolicy::default().window, 1);
    }

    #[test]
    fn test_parse_toml_and_json() {
        let toml = ValidationPolicy::parse_from_str("window = 3", "inline")
            .unwrap();
        assert_eq!(toml.window, 3);

        let json =
            ValidationPolicy::parse_from_str(r#"{"window": 4}"#, "inline")
                .unwrap();
        assert_eq!(json.window, 4);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let policy = ValidationPolicy::parse_json("{}").unwrap();
        assert_eq!(policy, ValidationPolicy::default());
    }

    #[test]
    fn test_rejects_negative_window() {
        assert!(ValidationPolicy::new(-1).is_err());
        assert!(ValidationPolicy::parse_json(r#"{"window": -2}"#).is_err());
        assert!(ValidationPolicy::parse_from_str("window = -2", "x").is_err());
    }

    #[test]
    fn test_window_upper_bound() {
        let widest = ValidationPolicy::new(MAX_WINDOW).unwrap();
        assert_eq!(widest.window, MAX_WINDOW);
        assert!(ValidationPolicy::new(MAX_WINDOW + 1).is_err());
        assert!(ValidationPolicy::new(i64::MAX).is_err());
        assert!(
            ValidationPolicy::parse_json(&format!(
                r#"{{"window": {}}}"#,
                i64::MAX
            ))
            .is_err()
        );
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err =
            ValidationPolicy::parse_json(r#"{"windw": 2}"#).unwrap_err();
        assert!(err.to_string().contains("invalid validation policy json"));
    }

    #[test]
    fn test_load_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("policy.toml");
        fs::write(&toml_path, "window = 2\n").unwrap();
        let policy = ValidationPolicy::load_from_file(&toml_path).unwrap();
        assert_eq!(policy.window, 2);

        let json_path = dir.path().join("policy.json");
        let mut file = fs::File::create(&json_path).unwrap();
        write!(file, r#"{{"window": 5}}"#).unwrap();
        let policy = ValidationPolicy::load_from_file(&json_path).unwrap();
        assert_eq!(policy.window, 5);

        let bad_path = dir.path().join("policy.toml.bak");
        fs::write(&bad_path, "window = -1\n").unwrap();
        assert!(ValidationPolicy::load_from_file(&bad_path).is_err());
    }

    #[test]
    fn test_env_path_takes_precedence_over_inline_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caa.toml");
        fs::write(&path, "window = 7\n").unwrap();
        let path_str = path.to_str().unwrap();

        let (policy, source) = ValidationPolicy::load_from_vars(
            Some(path_str),
            Some(r#"{"window": 2}"#),
        )
        .unwrap();
        assert_eq!(policy.window, 7);
        assert_eq!(source, PolicySource::EnvPath(path));
    }

    #[test]
    fn test_inline_json_used_when_path_blank() {
        let (policy, source) = ValidationPolicy::load_from_vars(
            Some("  "),
            Some(r#"{"window": 2}"#),
        )
        .unwrap();
        assert_eq!(policy.window, 2);
        assert_eq!(source, PolicySource::EnvInline);

        let err = ValidationPolicy::load_from_vars(None, Some("{"))
            .unwrap_err();
        assert!(format!("{err:#}").contains(POLICY_JSON_ENV));
    }

    #[test]
    fn test_defaults_when_no_overrides() {
        let (policy, source) =
            ValidationPolicy::load_from_vars(None, Some("")).unwrap();
        assert_eq!(policy, ValidationPolicy::default());
        assert_eq!(source, PolicySource::Default);
    }

    #[test]
    fn test_load_from_missing_file_reports_path() {
        let err = ValidationPolicy::load_from_file(Path::new(
            "/nonexistent/caa.toml",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/caa.toml"));
    }
}

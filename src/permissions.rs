//! Per-upload POSIX permission resolution.
//!
//! Deploy configurations either pin one mode for every uploaded file or map
//! glob patterns to modes. Rules are scanned in declaration order and the
//! first matching pattern wins; later, broader patterns act as fallbacks.

use globset::GlobBuilder;
use serde::{Deserialize, Serialize};

use crate::error::FerryError;

/// A configured permission value: a raw integer, or a string parsed as octal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModeValue {
    /// Used as the mode bits directly.
    Numeric(u32),
    /// Parsed as octal after trimming whitespace.
    Octal(String),
}

impl ModeValue {
    fn as_mode(&self) -> Option<u32> {
        match self {
            ModeValue::Numeric(value) => Some(*value),
            ModeValue::Octal(text) => u32::from_str_radix(text.trim(), 8).ok(),
        }
    }

    fn describe(&self) -> String {
        match self {
            ModeValue::Numeric(value) => value.to_string(),
            ModeValue::Octal(text) => text.clone(),
        }
    }
}

/// One permission rule: a glob pattern and the mode it applies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModeRule {
    pub pattern: String,
    pub mode: ModeValue,
}

/// Permission specification for uploaded files.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadMode {
    /// A single mode applied to every uploaded file.
    Fixed(ModeValue),
    /// Ordered glob rules; the first matching pattern wins.
    Rules(Vec<ModeRule>),
}

impl UploadMode {
    /// Resolve the mode to apply to `remote_path`.
    ///
    /// `Ok(None)` means no rule matched and the permission step should be
    /// skipped. A value that does not parse as octal fails with
    /// [`FerryError::InvalidMode`]; for a fixed single value the reported
    /// pattern is `*`.
    pub fn resolve(&self, remote_path: &str) -> Result<Option<u32>, FerryError> {
        match self {
            UploadMode::Fixed(value) => match value.as_mode() {
                Some(mode) => Ok(Some(mode)),
                None => Err(FerryError::InvalidMode {
                    pattern: "*".to_string(),
                    mode: value.describe(),
                }),
            },
            UploadMode::Rules(rules) => {
                for rule in rules {
                    if !pattern_matches(&rule.pattern, remote_path) {
                        continue;
                    }
                    return match rule.mode.as_mode() {
                        Some(mode) => Ok(Some(mode)),
                        None => Err(FerryError::InvalidMode {
                            pattern: rule.pattern.clone(),
                            mode: rule.mode.describe(),
                        }),
                    };
                }
                Ok(None)
            }
        }
    }
}

/// Case-insensitive glob match against an absolute remote path.
///
/// Patterns without a leading `/` are implicitly rooted. Dotfiles match like
/// any other name. A pattern that fails to parse matches nothing.
fn pattern_matches(pattern: &str, remote_path: &str) -> bool {
    let rooted = if pattern.starts_with('/') {
        pattern.to_string()
    } else {
        format!("/{pattern}")
    };
    match GlobBuilder::new(&rooted)
        .case_insensitive(true)
        .literal_separator(true)
        .build()
    {
        Ok(glob) => glob.compile_matcher().is_match(remote_path),
        Err(err) => {
            log::warn!("ignoring unparseable permission pattern {pattern:?}: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)]) -> UploadMode {
        UploadMode::Rules(
            pairs
                .iter()
                .map(|(pattern, mode)| ModeRule {
                    pattern: pattern.to_string(),
                    mode: ModeValue::Octal(mode.to_string()),
                })
                .collect(),
        )
    }

    #[test]
    fn test_first_match_wins() {
        let spec = rules(&[("**/*.sh", "755"), ("**/*", "644")]);
        assert_eq!(spec.resolve("/a/b.sh").unwrap(), Some(0o755));
        assert_eq!(spec.resolve("/a/b.txt").unwrap(), Some(0o644));
    }

    #[test]
    fn test_declaration_order_not_specificity() {
        let spec = rules(&[("**/*", "644"), ("**/*.sh", "755")]);
        assert_eq!(spec.resolve("/a/b.sh").unwrap(), Some(0o644));
    }

    #[test]
    fn test_no_match_is_none() {
        let spec = rules(&[("**/*.sh", "755")]);
        assert_eq!(spec.resolve("/a/b.txt").unwrap(), None);
    }

    #[test]
    fn test_fixed_numeric_matches_everything() {
        let spec = UploadMode::Fixed(ModeValue::Numeric(0o600));
        assert_eq!(spec.resolve("/a/b.txt").unwrap(), Some(0o600));
        assert_eq!(spec.resolve("/").unwrap(), Some(0o600));
    }

    #[test]
    fn test_fixed_octal_string() {
        let spec = UploadMode::Fixed(ModeValue::Octal("644".to_string()));
        assert_eq!(spec.resolve("/a/b.txt").unwrap(), Some(0o644));
    }

    #[test]
    fn test_fixed_non_octal_string_is_error() {
        let spec = UploadMode::Fixed(ModeValue::Octal("full-access".to_string()));
        match spec.resolve("/a") {
            Err(FerryError::InvalidMode { pattern, mode }) => {
                assert_eq!(pattern, "*");
                assert_eq!(mode, "full-access");
            }
            other => panic!("expected InvalidMode, got {other:?}"),
        }
    }

    #[test]
    fn test_numeric_rule_value_used_directly() {
        let spec = UploadMode::Rules(vec![ModeRule {
            pattern: "**/*.sh".to_string(),
            mode: ModeValue::Numeric(0o500),
        }]);
        assert_eq!(spec.resolve("/a/run.sh").unwrap(), Some(0o500));
    }

    #[test]
    fn test_case_insensitive() {
        let spec = rules(&[("**/*.SH", "755")]);
        assert_eq!(spec.resolve("/deploy/run.sh").unwrap(), Some(0o755));
    }

    #[test]
    fn test_matches_dotfiles() {
        let spec = rules(&[("**/*", "600")]);
        assert_eq!(spec.resolve("/app/.env").unwrap(), Some(0o600));
    }

    #[test]
    fn test_implicit_rooting() {
        let spec = rules(&[("uploads/**", "644")]);
        assert_eq!(spec.resolve("/uploads/img.png").unwrap(), Some(0o644));
        assert_eq!(spec.resolve("/var/uploads/img.png").unwrap(), None);
    }

    #[test]
    fn test_mode_whitespace_trimmed() {
        let spec = rules(&[("**/*", " 755 ")]);
        assert_eq!(spec.resolve("/a").unwrap(), Some(0o755));
    }

    #[test]
    fn test_non_octal_rule_value_is_error() {
        let spec = rules(&[("**/*", "rwxr-xr-x")]);
        match spec.resolve("/a") {
            Err(FerryError::InvalidMode { pattern, mode }) => {
                assert_eq!(pattern, "**/*");
                assert_eq!(mode, "rwxr-xr-x");
            }
            other => panic!("expected InvalidMode, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_pattern_skipped() {
        let spec = rules(&[("a[", "755"), ("**/*", "644")]);
        assert_eq!(spec.resolve("/a").unwrap(), Some(0o644));
    }

    #[test]
    fn test_spec_from_json() {
        let fixed: UploadMode = serde_json::from_str("420").unwrap();
        assert!(matches!(fixed, UploadMode::Fixed(ModeValue::Numeric(420))));

        let fixed_text: UploadMode = serde_json::from_str(r#""755""#).unwrap();
        assert_eq!(fixed_text.resolve("/any").unwrap(), Some(0o755));

        let listed: UploadMode = serde_json::from_str(
            r#"[{"pattern": "**/*.sh", "mode": "755"}, {"pattern": "**/*", "mode": 420}]"#,
        )
        .unwrap();
        match &listed {
            UploadMode::Rules(rules) => {
                assert_eq!(rules.len(), 2);
                assert_eq!(rules[0].pattern, "**/*.sh");
            }
            other => panic!("expected rules, got {other:?}"),
        }
        assert_eq!(listed.resolve("/a/run.sh").unwrap(), Some(0o755));
        assert_eq!(listed.resolve("/a/data.bin").unwrap(), Some(420));
    }
}

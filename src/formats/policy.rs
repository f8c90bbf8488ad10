use crate::error::PolicyError;
use globset::{Glob, GlobMatcher, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

/// Maps artifacts to the policy that governs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Glob over the artifact's file name.
    pub pattern: String,
    /// Optional substring the artifact content must contain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    pub policy: String,
}

impl PolicyRule {
    pub fn new(pattern: &str, contains: Option<&str>, policy: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            contains: contains.map(str::to_string),
            policy: policy.to_string(),
        }
    }

    fn accepts_content(&self, content: &str) -> bool {
        self.contains
            .as_deref()
            .is_none_or(|needle| content.contains(needle))
    }
}

pub fn default_policy_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::new(
            "application.properties",
            None,
            "policy/deny-application-properties.rego",
        ),
        PolicyRule::new("*.tf", Some("aws_s3_bucket"), "policy/deny-s3.rego"),
        PolicyRule::new("*.tf", Some("aws_ecr_repository"), "policy/deny-ecr.rego"),
    ]
}

/// Compile one glob; `*` and `?` do not stop at `/`.
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher, PolicyError> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|source| PolicyError::BadPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Any-of matcher over several globs.
pub fn compile_glob_set(patterns: &[String]) -> Result<GlobSet, PolicyError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| PolicyError::BadPattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| PolicyError::BadPattern {
        pattern: patterns.join(", "),
        source,
    })
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: PolicyRule,
    matcher: GlobMatcher,
}

/// Policy rules with their globs compiled, in match order.
#[derive(Debug, Clone)]
pub struct PolicySet {
    rules: Vec<CompiledRule>,
}

impl PolicySet {
    pub fn compile(rules: &[PolicyRule]) -> Result<Self, PolicyError> {
        let rules = rules
            .iter()
            .map(|rule| {
                Ok(CompiledRule {
                    matcher: compile_glob(&rule.pattern)?,
                    rule: rule.clone(),
                })
            })
            .collect::<Result<Vec<_>, PolicyError>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First matching rule wins. Only the final path segment is matched.
    pub fn select(&self, path: &str, content: &str) -> Result<&str, PolicyError> {
        let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        self.rules
            .iter()
            .find(|compiled| {
                compiled.matcher.is_match(file_name) && compiled.rule.accepts_content(content)
            })
            .map(|compiled| compiled.rule.policy.as_str())
            .ok_or_else(|| PolicyError::NoMatch {
                filename: path.to_string(),
            })
    }
}

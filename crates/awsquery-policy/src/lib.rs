//! Read-only action policy gate.
//!
//! Every API call, including resolver source listings, passes through this
//! gate before any request leaves the process. Rules are `service:Action`
//! patterns with `*` matching a run of identifier characters; a built-in
//! denylist of mutation verbs dominates whatever the allowlist says.

use std::path::{Path, PathBuf};

use thiserror::Error;

use awsquery_core::to_pascal_case;

/// Environment variable naming an explicit policy file.
pub const POLICY_ENV: &str = "AWSQUERY_POLICY";

/// Default policy file name probed in the working directory and next to the
/// executable.
pub const POLICY_FILE_NAME: &str = "policy.json";

/// Action prefixes that are never allowed, regardless of the allowlist.
const MUTATION_PREFIXES: &[&str] = &[
    "Create",
    "Put",
    "Delete",
    "Update",
    "Modify",
    "Reboot",
    "Start",
    "Stop",
    "Terminate",
    "Send",
    "Attach",
    "Detach",
    "Run",
    "Cancel",
    "Restore",
    "Reset",
];

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy file not found (tried ${POLICY_ENV}, ./{POLICY_FILE_NAME}, and next to the executable)")]
    NotFound,
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("policy file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("policy file {path} contains no allow rules")]
    Empty { path: PathBuf },
}

/// Outcome of gating one `(service, action)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allowed,
    /// The action carries a mutation verb; the denylist dominates.
    DeniedMutation,
    /// No allow rule matched.
    DeniedUnlisted,
}

impl PolicyDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, PolicyDecision::Allowed)
    }
}

/// One parsed `service:Action` allow rule.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PolicyRule {
    service: String,
    action: String,
}

impl PolicyRule {
    fn parse(raw: &str) -> Option<Self> {
        let (service, action) = raw.split_once(':')?;
        if service.is_empty() || action.is_empty() {
            return None;
        }
        Some(Self {
            service: service.to_string(),
            action: action.to_string(),
        })
    }
}

/// Immutable rule set loaded once at startup.
#[derive(Debug, Clone)]
pub struct PolicyGate {
    rules: Vec<PolicyRule>,
}

impl PolicyGate {
    /// Builds a gate from raw `service:Action` rule strings. Malformed rules
    /// are skipped with a warning rather than failing the whole set.
    pub fn from_rules<I, S>(raw_rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Vec::new();
        for raw in raw_rules {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            match PolicyRule::parse(raw) {
                Some(rule) => rules.push(rule),
                None => tracing::warn!(rule = raw, "skipping malformed policy rule"),
            }
        }
        Self { rules }
    }

    /// Locates and loads the policy file: `$AWSQUERY_POLICY`, then
    /// `./policy.json`, then a file bundled next to the executable.
    pub fn load_default() -> Result<Self, PolicyError> {
        let path = locate_policy_file().ok_or(PolicyError::NotFound)?;
        Self::load_from(&path)
    }

    /// Loads a policy document from a specific path. Accepts a flat array of
    /// rule strings or an IAM policy document export (optionally wrapped in
    /// `PolicyVersion.Document`); `Allow` statements contribute their actions.
    pub fn load_from(path: &Path) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: serde_json::Value =
            serde_json::from_str(&raw).map_err(|source| PolicyError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let rules = rules_from_document(&document);
        if rules.is_empty() {
            return Err(PolicyError::Empty {
                path: path.to_path_buf(),
            });
        }
        tracing::debug!(path = %path.display(), rules = rules.len(), "loaded policy");
        Ok(Self::from_rules(rules))
    }

    /// Gates one service/action pair. The action may arrive in kebab, snake,
    /// or Camel form; it is normalized to canonical casing before matching.
    pub fn evaluate(&self, service: &str, action: &str) -> PolicyDecision {
        let canonical = to_pascal_case(action);
        if MUTATION_PREFIXES
            .iter()
            .any(|prefix| canonical.starts_with(prefix))
        {
            return PolicyDecision::DeniedMutation;
        }
        let allowed = self.rules.iter().any(|rule| {
            wildcard_match(&rule.service, service) && wildcard_match(&rule.action, &canonical)
        });
        if allowed {
            PolicyDecision::Allowed
        } else {
            PolicyDecision::DeniedUnlisted
        }
    }

    pub fn allows(&self, service: &str, action: &str) -> bool {
        self.evaluate(service, action).is_allowed()
    }

    /// True when at least one rule could allow some action on this service.
    pub fn covers_service(&self, service: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| wildcard_match(&rule.service, service))
    }
}

fn locate_policy_file() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(POLICY_ENV) {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from(POLICY_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    let bundled = std::env::current_exe()
        .ok()?
        .parent()?
        .join(POLICY_FILE_NAME);
    bundled.is_file().then_some(bundled)
}

fn rules_from_document(document: &serde_json::Value) -> Vec<String> {
    if let Some(entries) = document.as_array() {
        return entries
            .iter()
            .filter_map(|entry| entry.as_str())
            .map(str::to_string)
            .collect();
    }
    let statements = document
        .pointer("/PolicyVersion/Document/Statement")
        .or_else(|| document.pointer("/Statement"));
    let Some(statements) = statements.and_then(serde_json::Value::as_array) else {
        return Vec::new();
    };
    let mut rules = Vec::new();
    for statement in statements {
        if statement.get("Effect").and_then(serde_json::Value::as_str) != Some("Allow") {
            continue;
        }
        match statement.get("Action") {
            Some(serde_json::Value::String(action)) => rules.push(action.clone()),
            Some(serde_json::Value::Array(actions)) => rules.extend(
                actions
                    .iter()
                    .filter_map(|action| action.as_str())
                    .map(str::to_string),
            ),
            _ => {}
        }
    }
    rules
}

/// Matches `pattern` against `text` where `*` spans any run of identifier
/// characters and everything else matches literally.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let Some((prefix, rest)) = pattern.split_once('*') else {
        return pattern == text;
    };
    let Some(remainder) = text.strip_prefix(prefix) else {
        return false;
    };
    (0..=remainder.len()).filter(|&taken| remainder.is_char_boundary(taken)).any(|taken| {
        remainder[..taken]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && wildcard_match(rest, &remainder[taken..])
    })
}

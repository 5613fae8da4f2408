//! Access policy: maps request paths to role requirements.
//!
//! # Design
//!
//! Rules are evaluated in declaration order and the **first matching rule**
//! wins. A path matched by no rule requires an authenticated caller, so new
//! endpoints are closed by default.
//!
//! ## Patterns
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | `/auth/login` | exactly that path |
//! | `/reports/**` | `/reports` itself and every path below it |
//!
//! ## Built-in table
//!
//! | Path | Requirement |
//! |------|-------------|
//! | `/auth/jwks.json`, `/auth/login`, `/health` | public |
//! | `/sample/data-a` | `ROLE_A` |
//! | `/sample/data-b` | `ROLE_B` |
//! | `/sample/data-c` | `ROLE_A` or `ROLE_B` |
//! | anything else | authenticated |

use tracing::debug;

/// Path matcher for one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches only this exact path.
    Exact(String),
    /// Matches every path starting with this prefix, which ends in `/`,
    /// and the prefix without its trailing slash.
    Prefix(String),
}

impl PathPattern {
    /// Parse a configured pattern: a trailing `/**` makes it a prefix match.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix("**") {
            Some(prefix) if prefix.ends_with('/') => Self::Prefix(prefix.to_string()),
            _ => Self::Exact(pattern.to_string()),
        }
    }

    /// Whether `path` is matched.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(p) => p == path,
            Self::Prefix(p) => path.starts_with(p.as_str()) || p.strip_suffix('/') == Some(path),
        }
    }
}

/// What a caller must present to reach a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Nothing; no token is inspected.
    Public,
    /// Any valid token.
    Authenticated,
    /// A valid token holding this role.
    Role(String),
    /// A valid token holding at least one of these roles.
    AnyRole(Vec<String>),
}

impl Requirement {
    /// Whether a verified token is needed at all.
    #[must_use]
    pub fn needs_token(&self) -> bool {
        !matches!(self, Self::Public)
    }

    /// Whether `roles` satisfies this requirement.
    ///
    /// Role names are compared verbatim, with no prefix normalization.
    #[must_use]
    pub fn is_satisfied_by(&self, roles: &[String]) -> bool {
        match self {
            Self::Public | Self::Authenticated => true,
            Self::Role(required) => roles.iter().any(|r| r == required),
            Self::AnyRole(accepted) => roles.iter().any(|r| accepted.contains(r)),
        }
    }
}

/// One `(pattern, requirement)` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    /// Which paths the rule covers.
    pub pattern: PathPattern,
    /// What those paths require.
    pub requirement: Requirement,
}

impl PolicyRule {
    /// Create a rule.
    #[must_use]
    pub fn new(pattern: PathPattern, requirement: Requirement) -> Self {
        Self {
            pattern,
            requirement,
        }
    }
}

/// Outcome of [`AccessPolicy::authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// The request may proceed.
    Allow,
    /// The caller is authenticated but lacks the required role.
    Deny,
}

/// Ordered rule table.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    rules: Vec<PolicyRule>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        let exact = |path: &str| PathPattern::Exact(path.to_string());
        let role = |name: &str| name.to_string();

        Self::new(vec![
            PolicyRule::new(exact("/auth/jwks.json"), Requirement::Public),
            PolicyRule::new(exact("/auth/login"), Requirement::Public),
            PolicyRule::new(exact("/health"), Requirement::Public),
            PolicyRule::new(exact("/sample/data-a"), Requirement::Role(role("ROLE_A"))),
            PolicyRule::new(exact("/sample/data-b"), Requirement::Role(role("ROLE_B"))),
            PolicyRule::new(
                exact("/sample/data-c"),
                Requirement::AnyRole(vec![role("ROLE_A"), role("ROLE_B")]),
            ),
        ])
    }
}

impl AccessPolicy {
    /// Build a policy from an ordered rule list.
    #[must_use]
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// The rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Requirement of the first rule matching `path`, or
    /// [`Requirement::Authenticated`] when none does.
    #[must_use]
    pub fn requirement_for(&self, path: &str) -> &Requirement {
        const FALLBACK: &Requirement = &Requirement::Authenticated;

        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(path))
            .map_or(FALLBACK, |rule| &rule.requirement)
    }

    /// Decide whether a caller holding `roles` may reach `path`.
    ///
    /// The caller is assumed to be authenticated already; public and
    /// authenticated paths always allow.
    #[must_use]
    pub fn authorize(&self, path: &str, roles: &[String]) -> AccessDecision {
        let requirement = self.requirement_for(path);
        if requirement.is_satisfied_by(roles) {
            AccessDecision::Allow
        } else {
            debug!(path = %path, required = ?requirement, roles = ?roles, "Role requirement not met");
            AccessDecision::Deny
        }
    }
}

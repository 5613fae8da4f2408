//! Configuration management

use std::{env, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::auth::policy::{PathPattern, PolicyRule, Requirement};
use crate::auth::verifier::AudienceValidation;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Access policy configuration
    pub policy: PolicyConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Authentication configuration: issuer identity, principals and key material
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Process-wide issuer identifier written to `iss` and `aud`.
    /// A random UUID is generated at startup when unset.
    #[serde(deserialize_with = "optional_string_from_scalar")]
    pub issuer: Option<String>,
    /// Username of the system principal (supports `${VAR}` expansion)
    #[serde(deserialize_with = "string_from_scalar")]
    pub system_username: String,
    /// Password of the system principal (supports `${VAR}` expansion).
    /// Must be set; startup fails when it is empty.
    #[serde(deserialize_with = "string_from_scalar")]
    pub system_password: String,
    /// Roles granted to the system principal
    pub system_roles: Vec<String>,
    /// Register the `USER_A` / `USER_B` demo principals
    pub demo_users: bool,
    /// Argon2 iteration count used when hashing principal passwords
    pub hash_cost: u32,
    /// Argon2 memory cost in KiB
    pub hash_memory_kib: u32,
    /// Path to the PKCS#8 PEM signing key
    pub key_path: PathBuf,
    /// Whether the `aud` claim is checked during verification
    pub audience_validation: AudienceValidation,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            system_username: "system".to_string(),
            system_password: String::new(),
            system_roles: vec!["ROLES_SYSTEM".to_string()],
            demo_users: true,
            hash_cost: 2,
            hash_memory_kib: 19 * 1024,
            key_path: PathBuf::from("keys/signing-key.pem"),
            audience_validation: AudienceValidation::Ignore,
        }
    }
}

impl AuthConfig {
    /// Resolve the issuer identifier, generating a random UUID if unset
    #[must_use]
    pub fn resolve_issuer(&self) -> String {
        match self.issuer.as_deref().map(str::trim) {
            Some(issuer) if !issuer.is_empty() => issuer.to_string(),
            _ => {
                let generated = uuid::Uuid::new_v4().to_string();
                tracing::warn!(issuer = %generated, "No auth.issuer configured, generated one for this process");
                generated
            }
        }
    }
}

/// Any scalar, kept as text: `system_password: 123456` is a number to YAML.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bool(bool),
}

impl From<Scalar> for String {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Text(s) => s,
            Scalar::Unsigned(n) => n.to_string(),
            Scalar::Signed(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

fn string_from_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Scalar::deserialize(deserializer).map(String::from)
}

fn optional_string_from_scalar<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Option::<Scalar>::deserialize(deserializer).map(|scalar| scalar.map(String::from))
}

/// Auth keys read from the environment verbatim instead of through figment's
/// value parser, which turns `007` into the number 7.
const VERBATIM_ENV_KEYS: [&str; 3] = ["auth.issuer", "auth.system_username", "auth.system_password"];

/// Access policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PolicyConfig {
    /// Ordered rule list. When empty the built-in table is used.
    pub rules: Vec<PolicyRuleConfig>,
}

/// One access rule as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRuleConfig {
    /// Exact path, or a prefix ending in `/**`
    pub pattern: String,
    /// Requirement kind
    pub require: RequirementKind,
    /// Roles consulted by `role` / `any_role`
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Requirement kind as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    /// No authentication needed
    Public,
    /// Any valid token
    Authenticated,
    /// Exactly one named role
    Role,
    /// Any of the listed roles
    AnyRole,
}

impl PolicyRuleConfig {
    /// Convert into a policy rule, validating the role list
    pub fn to_rule(&self) -> Result<PolicyRule> {
        let requirement = match self.require {
            RequirementKind::Public => Requirement::Public,
            RequirementKind::Authenticated => Requirement::Authenticated,
            RequirementKind::Role => match self.roles.as_slice() {
                [role] => Requirement::Role(role.clone()),
                _ => {
                    return Err(Error::Config(format!(
                        "Policy rule '{}' requires exactly one role, got {}",
                        self.pattern,
                        self.roles.len()
                    )));
                }
            },
            RequirementKind::AnyRole => {
                if self.roles.is_empty() {
                    return Err(Error::Config(format!(
                        "Policy rule '{}' requires at least one role",
                        self.pattern
                    )));
                }
                Requirement::AnyRole(self.roles.clone())
            }
        };

        Ok(PolicyRule::new(PathPattern::parse(&self.pattern), requirement))
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (UAC_ prefix)
        figment = figment.merge(Env::prefixed("UAC_").split("__").ignore(&VERBATIM_ENV_KEYS));
        for key in VERBATIM_ENV_KEYS {
            if let Some(value) = Env::var(&format!("UAC_{}", key.replace('.', "__"))) {
                figment = figment.merge(Serialized::default(key, value));
            }
        }

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();

        config.expand_env_vars();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in the system credentials
    fn expand_env_vars(&mut self) {
        let Ok(re) = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") else {
            return;
        };

        self.auth.system_username = Self::expand_string(&re, &self.auth.system_username);
        self.auth.system_password = Self::expand_string(&re, &self.auth.system_password);
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }

    /// Build the ordered policy rule list from configuration.
    ///
    /// Returns `None` when no rules are configured (use the built-in table).
    pub fn policy_rules(&self) -> Result<Option<Vec<PolicyRule>>> {
        if self.policy.rules.is_empty() {
            return Ok(None);
        }
        self.policy
            .rules
            .iter()
            .map(PolicyRuleConfig::to_rule)
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_demo_deployment() {
        let config = Config::default();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.system_roles, vec!["ROLES_SYSTEM".to_string()]);
        assert!(config.auth.demo_users);
        assert_eq!(config.auth.audience_validation, AudienceValidation::Ignore);
        assert!(config.policy.rules.is_empty());
    }

    #[test]
    fn test_load_env_files_sets_env_vars() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("test.env");
        let mut f = std::fs::File::create(&env_path).unwrap();
        writeln!(f, "UAC_TEST_KEY_A=hello_from_env_file").unwrap();
        drop(f);

        let config = Config {
            env_files: vec![env_path.to_string_lossy().to_string()],
            ..Default::default()
        };
        config.load_env_files();

        assert_eq!(env::var("UAC_TEST_KEY_A").unwrap(), "hello_from_env_file");
    }

    #[test]
    fn test_load_env_files_skips_missing() {
        let config = Config {
            env_files: vec!["/nonexistent/path/.env".to_string()],
            ..Default::default()
        };
        config.load_env_files();
    }

    #[test]
    fn expand_string_uses_default_when_unset() {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
        let value = Config::expand_string(&re, "${UAC_TEST_SURELY_UNSET_VAR:-fallback}");
        assert_eq!(value, "fallback");
    }

    #[test]
    fn resolve_issuer_prefers_configured_value() {
        let auth = AuthConfig {
            issuer: Some("4f1c2b9e-issuer".to_string()),
            ..Default::default()
        };
        assert_eq!(auth.resolve_issuer(), "4f1c2b9e-issuer");
    }

    #[test]
    fn resolve_issuer_generates_uuid_when_blank() {
        let auth = AuthConfig {
            issuer: Some("   ".to_string()),
            ..Default::default()
        };
        let issuer = auth.resolve_issuer();
        assert!(uuid::Uuid::parse_str(&issuer).is_ok());
    }

    #[test]
    fn config_deserialized_from_yaml() {
        let yaml = r#"
server:
  host: "0.0.0.0"
  port: 9090
  request_timeout: 5s
auth:
  issuer: "c0ffee00-0000-4000-8000-000000000000"
  system_username: "root"
  system_password: "hunter2"
  hash_cost: 3
  audience_validation: enforce
policy:
  rules:
    - pattern: "/auth/login"
      require: public
    - pattern: "/reports/**"
      require: any_role
      roles: ["ROLE_A", "ROLE_B"]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.request_timeout, Duration::from_secs(5));
        assert_eq!(config.auth.hash_cost, 3);
        assert_eq!(config.auth.audience_validation, AudienceValidation::Enforce);

        let rules = config.policy_rules().unwrap().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].requirement, Requirement::Public);
        assert_eq!(rules[1].pattern, PathPattern::Prefix("/reports/".to_string()));
    }

    #[test]
    fn numeric_yaml_credentials_are_read_as_text() {
        let yaml = "auth:\n  issuer: 42\n  system_username: 1001\n  system_password: 123456\n";

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.auth.issuer.as_deref(), Some("42"));
        assert_eq!(config.auth.system_username, "1001");
        assert_eq!(config.auth.system_password, "123456");
    }

    #[test]
    fn numeric_env_credentials_keep_their_exact_text() {
        // GIVEN: digits-only credentials exported under the UAC_ prefix
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("uac.env");
        std::fs::write(
            &env_path,
            "UAC_AUTH__ISSUER=42\nUAC_AUTH__SYSTEM_USERNAME=1001\nUAC_AUTH__SYSTEM_PASSWORD=007123\n",
        )
        .unwrap();
        dotenvy::from_path(&env_path).unwrap();

        // WHEN: configuration is loaded from the environment alone
        let config = Config::load(None).unwrap();

        // THEN: the values arrive as the exact strings, leading zero included
        assert_eq!(config.auth.issuer.as_deref(), Some("42"));
        assert_eq!(config.auth.system_username, "1001");
        assert_eq!(config.auth.system_password, "007123");
    }

    #[test]
    fn role_rule_without_exactly_one_role_is_rejected() {
        let rule = PolicyRuleConfig {
            pattern: "/sample/data-a".to_string(),
            require: RequirementKind::Role,
            roles: vec![],
        };
        assert!(matches!(rule.to_rule(), Err(Error::Config(_))));
    }

    #[test]
    fn load_rejects_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/uac.yaml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uac.yaml");
        std::fs::write(&path, "server:\n  port: 18080\nauth:\n  demo_users: false\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 18080);
        assert!(!config.auth.demo_users);
    }
}

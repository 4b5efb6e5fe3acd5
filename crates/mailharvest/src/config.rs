//! Session configuration and credential resolution.

use log::warn;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{MailboxError, Result};

/// How the connection to the mail store is protected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Cleartext TCP. Only suitable for test servers on trusted networks.
    None,
    /// Implicit TLS, negotiated as soon as the connection opens.
    #[default]
    Ssl,
    /// Accepted for configuration compatibility. The underlying client has
    /// no STARTTLS upgrade, so this negotiates implicit TLS like `Ssl`.
    Tls,
}

/// Connection settings for one mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxConfig {
    /// IMAP server hostname (e.g. "imap.example.com").
    pub host: String,

    /// IMAP server port (default: 993; use 143 with [`SecurityMode::None`]).
    #[serde(default = "default_imap_port")]
    pub port: u16,

    /// Transport security mode.
    #[serde(default)]
    pub security: SecurityMode,

    /// Mailbox username (typically the email address).
    pub username: String,

    /// Password sources.
    pub auth: AuthSettings,

    /// Folder opened by `select_configured_folder` (default: "INBOX").
    #[serde(default = "default_inbox")]
    pub folder: String,

    /// Upper bound in seconds for any single network operation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Password for the mailbox account, resolved from one of three sources
/// checked in order: direct value, file contents, environment variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSettings {
    /// Password given directly in configuration. Discouraged outside tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_insecure: Option<String>,

    /// Path to a file holding the password (Docker secrets pattern).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<String>,

    /// Name of an environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env_var: Option<String>,
}

impl AuthSettings {
    /// Resolves the password from the configured sources.
    pub fn resolve_password(&self) -> Result<SecretString> {
        if let Some(value) = self.password_insecure.as_deref() {
            if !value.is_empty() {
                warn!(
                    "Using a direct password value (passwordInsecure) is not recommended. \
                     Consider passwordFile or passwordEnvVar instead."
                );
                return Ok(SecretString::from(value.to_string()));
            }
        }

        if let Some(path) = self.password_file.as_deref() {
            if !path.is_empty() {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    MailboxError::CredentialsNotFound(format!(
                        "could not read password file '{}': {}",
                        path, e
                    ))
                })?;
                return Ok(SecretString::from(contents.trim().to_string()));
            }
        }

        if let Some(name) = self.password_env_var.as_deref() {
            if !name.is_empty() {
                return match std::env::var(name) {
                    Ok(value) => Ok(SecretString::from(value.trim().to_string())),
                    Err(_) => Err(MailboxError::CredentialsNotFound(format!(
                        "environment variable '{}' is not set",
                        name
                    ))),
                };
            }
        }

        Err(MailboxError::CredentialsNotFound(
            "no password source configured (need passwordInsecure, passwordFile, or passwordEnvVar)"
                .to_string(),
        ))
    }
}

fn default_imap_port() -> u16 {
    993
}

fn default_inbox() -> String {
    "INBOX".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    #[test]
    fn config_defaults_apply() {
        let config: MailboxConfig = serde_json::from_str(
            r#"{
                "host": "imap.example.com",
                "username": "test@example.com",
                "auth": { "passwordEnvVar": "MAILBOX_PASSWORD" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.port, 993);
        assert_eq!(config.security, SecurityMode::Ssl);
        assert_eq!(config.folder, "INBOX");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(
            config.auth.password_env_var.as_deref(),
            Some("MAILBOX_PASSWORD")
        );
    }

    #[test]
    fn security_mode_parses_lowercase() {
        let config: MailboxConfig = serde_json::from_str(
            r#"{
                "host": "mail.example.com",
                "port": 143,
                "security": "none",
                "username": "test@example.com",
                "auth": {}
            }"#,
        )
        .unwrap();

        assert_eq!(config.security, SecurityMode::None);
        assert_eq!(config.port, 143);
    }

    #[test]
    fn direct_password_takes_priority() {
        let auth = AuthSettings {
            password_insecure: Some("direct".to_string()),
            password_file: Some("/does/not/exist".to_string()),
            password_env_var: Some("UNSET_VAR_FOR_PRIORITY_TEST".to_string()),
        };

        let password = auth.resolve_password().unwrap();
        assert_eq!(password.expose_secret(), "direct");
    }

    #[test]
    fn password_file_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "from-file").unwrap();

        let auth = AuthSettings {
            password_insecure: None,
            password_file: Some(file.path().to_string_lossy().into_owned()),
            password_env_var: None,
        };

        let password = auth.resolve_password().unwrap();
        assert_eq!(password.expose_secret(), "from-file");
    }

    #[test]
    fn env_var_fallback_resolves() {
        std::env::set_var("MAILHARVEST_TEST_PASSWORD", "from-env");

        let auth = AuthSettings {
            password_insecure: None,
            password_file: None,
            password_env_var: Some("MAILHARVEST_TEST_PASSWORD".to_string()),
        };

        let password = auth.resolve_password().unwrap();
        assert_eq!(password.expose_secret(), "from-env");
    }

    #[test]
    fn missing_sources_report_credentials_error() {
        let auth = AuthSettings::default();
        let result = auth.resolve_password();
        assert!(matches!(result, Err(MailboxError::CredentialsNotFound(_))));
    }

    #[test]
    fn unset_env_var_reports_credentials_error() {
        let auth = AuthSettings {
            password_insecure: None,
            password_file: None,
            password_env_var: Some("MAILHARVEST_TEST_UNSET_VAR".to_string()),
        };

        let result = auth.resolve_password();
        assert!(matches!(result, Err(MailboxError::CredentialsNotFound(_))));
    }
}

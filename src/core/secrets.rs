//! Credential resolution for connector auth.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use base64::Engine;

use crate::artifact::ConnectorAuth;
use crate::error::{Error, Result};

const SECRET_ENV_PREFIX: &str = "COURIER_SECRET_";

/// Reference to an encrypted secret. Never holds the plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub identifier: String,
}

pub trait SecretDecryptor: Send + Sync {
    fn decrypt(&self, secret: &SecretRef) -> Result<String>;
}

/// Reads `COURIER_SECRET_<IDENTIFIER>` from the process environment.
#[derive(Debug, Default)]
pub struct EnvSecretDecryptor;

impl EnvSecretDecryptor {
    pub fn variable_name(identifier: &str) -> String {
        let normalized: String = identifier
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", SECRET_ENV_PREFIX, normalized)
    }
}

impl SecretDecryptor for EnvSecretDecryptor {
    fn decrypt(&self, secret: &SecretRef) -> Result<String> {
        let name = Self::variable_name(&secret.identifier);
        std::env::var(&name).map_err(|_| {
            Error::secret_decryption_failed(&secret.identifier, format!("{} is not set", name))
        })
    }
}

/// Fixed identifier-to-secret table.
#[derive(Debug, Default, Clone)]
pub struct StaticSecretDecryptor {
    secrets: HashMap<String, String>,
}

impl StaticSecretDecryptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, identifier: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(identifier.into(), value.into());
        self
    }
}

impl SecretDecryptor for StaticSecretDecryptor {
    fn decrypt(&self, secret: &SecretRef) -> Result<String> {
        self.secrets.get(&secret.identifier).cloned().ok_or_else(|| {
            Error::secret_decryption_failed(&secret.identifier, "unknown secret identifier")
        })
    }
}

/// Connector auth with secrets decrypted.
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedAuth {
    Anonymous,
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedAuth::Anonymous => f.write_str("Anonymous"),
            ResolvedAuth::Basic { username, .. } => {
                write!(f, "Basic {{ username: {:?}, password: <redacted> }}", username)
            }
            ResolvedAuth::Bearer { .. } => f.write_str("Bearer { token: <redacted> }"),
        }
    }
}

impl ResolvedAuth {
    pub fn resolve(auth: &ConnectorAuth, decryptor: &dyn SecretDecryptor) -> Result<Self> {
        match auth {
            ConnectorAuth::Anonymous => Ok(ResolvedAuth::Anonymous),
            ConnectorAuth::UsernamePassword {
                username,
                password_ref,
            } => Ok(ResolvedAuth::Basic {
                username: username.clone(),
                password: decryptor.decrypt(password_ref)?,
            }),
            ConnectorAuth::Token { token_ref } => Ok(ResolvedAuth::Bearer {
                token: decryptor.decrypt(token_ref)?,
            }),
        }
    }

    /// `Authorization` header value, if any.
    pub fn header_value(&self) -> Option<String> {
        match self {
            ResolvedAuth::Anonymous => None,
            ResolvedAuth::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                Some(format!("Basic {}", encoded))
            }
            ResolvedAuth::Bearer { token } => Some(format!("Bearer {}", token)),
        }
    }

    /// Plaintext values that must never appear in logs or errors.
    pub fn secrets(&self) -> Vec<String> {
        match self {
            ResolvedAuth::Anonymous => Vec::new(),
            ResolvedAuth::Basic { password, .. } => {
                let mut secrets = vec![password.clone()];
                if let Some(header) = self.header_value() {
                    secrets.push(header);
                }
                secrets
            }
            ResolvedAuth::Bearer { token } => vec![token.clone()],
        }
    }
}

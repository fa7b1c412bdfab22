//! Credential lookup for repository access.
//!
//! Only presence is checked here. Whether a token is valid or has enough
//! scope shows up later as an auth error from the remote.

use std::collections::HashMap;

/// Resolves an agent's credential reference to a bearer token.
pub trait CredentialSource: Send + Sync {
    fn resolve(&self, reference: Option<&str>) -> Option<String>;
}

/// Reads the referenced environment variable, falling back to a default
/// token when the agent names none.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    fallback: Option<String>,
}

impl EnvCredentials {
    pub fn new(fallback: Option<String>) -> Self {
        Self {
            fallback: fallback.filter(|t| !t.trim().is_empty()),
        }
    }
}

impl CredentialSource for EnvCredentials {
    fn resolve(&self, reference: Option<&str>) -> Option<String> {
        match reference {
            Some(var) => std::env::var(var).ok().filter(|t| !t.trim().is_empty()),
            None => self.fallback.clone(),
        }
    }
}

/// Fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    default: Option<String>,
    named: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new(default: Option<&str>) -> Self {
        Self {
            default: default.map(str::to_string),
            named: HashMap::new(),
        }
    }

    pub fn with(mut self, reference: &str, token: &str) -> Self {
        self.named.insert(reference.to_string(), token.to_string());
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn resolve(&self, reference: Option<&str>) -> Option<String> {
        match reference {
            Some(name) => self.named.get(name).cloned(),
            None => self.default.clone(),
        }
    }
}

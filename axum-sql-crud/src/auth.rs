//! Authorization gate
//!
//! Identity lives in the host application; this module only asks it two
//! questions through [`AuthProvider`] and applies the per-action rules of a
//! [`AuthConfig`].

use crate::error::CrudError;
use async_trait::async_trait;
use axum::http::request::Parts;
use serde::{Deserialize, Deserializer};

/// Answers identity questions about the current request
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    async fn is_logged_in(&self, parts: &Parts) -> bool;

    async fn user_has_role(&self, parts: &Parts, role: &str) -> bool;
}

/// Provider that treats every request as a logged in user holding every role
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AuthProvider for AllowAll {
    async fn is_logged_in(&self, _parts: &Parts) -> bool {
        true
    }

    async fn user_has_role(&self, _parts: &Parts, _role: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// List and view pages, downloads
    View,
    /// Add, edit and delete
    Edit,
}

/// Requirements for one action
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessRule {
    #[serde(default)]
    pub require_login: bool,
    /// Any one of these roles grants access; accepts a single string too
    #[serde(default, deserialize_with = "one_or_many")]
    pub require_role: Vec<String>,
}

impl AccessRule {
    pub fn login() -> Self {
        Self {
            require_login: true,
            require_role: Vec::new(),
        }
    }

    pub fn any_role<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            require_login: false,
            require_role: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_unconditional(&self) -> bool {
        !self.require_login && self.require_role.is_empty()
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(role) => vec![role],
        OneOrMany::Many(roles) => roles,
    })
}

fn default_login_url() -> String {
    "/login".to_string()
}

/// Access policy of one endpoint set; no configuration means unconditional access
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Applies to every action, in addition to `view` / `edit`
    #[serde(flatten)]
    pub all: AccessRule,
    #[serde(default)]
    pub view: AccessRule,
    #[serde(default)]
    pub edit: AccessRule,
    /// Where anonymous users are sent
    #[serde(default = "default_login_url")]
    pub login_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            all: AccessRule::default(),
            view: AccessRule::default(),
            edit: AccessRule::default(),
            login_url: default_login_url(),
        }
    }
}

impl AuthConfig {
    fn rules(&self, permission: Permission) -> [&AccessRule; 2] {
        match permission {
            Permission::View => [&self.all, &self.view],
            Permission::Edit => [&self.all, &self.edit],
        }
    }

    fn login_redirect(&self, parts: &Parts) -> String {
        let return_url = parts
            .uri
            .path_and_query()
            .map(|path| path.as_str())
            .unwrap_or("/");
        match serde_urlencoded::to_string(&[("return_url", return_url)]) {
            Ok(query) if self.login_url.contains('?') => format!("{}&{}", self.login_url, query),
            Ok(query) => format!("{}?{}", self.login_url, query),
            Err(_) => self.login_url.clone(),
        }
    }
}

/// Check `permission` for the current request
///
/// Anonymous users hitting a rule are sent to the login page; logged in
/// users lacking every listed role get 403.
pub async fn authorize(
    provider: &dyn AuthProvider,
    config: &AuthConfig,
    permission: Permission,
    parts: &Parts,
) -> Result<(), CrudError> {
    let rules = config.rules(permission);
    if rules.iter().all(|rule| rule.is_unconditional()) {
        return Ok(());
    }

    if !provider.is_logged_in(parts).await {
        tracing::debug!(path = %parts.uri.path(), ?permission, "login required");
        return Err(CrudError::LoginRequired {
            login_url: config.login_redirect(parts),
        });
    }

    for rule in rules {
        if rule.require_role.is_empty() {
            continue;
        }
        let mut granted = false;
        for role in &rule.require_role {
            if provider.user_has_role(parts, role).await {
                granted = true;
                break;
            }
        }
        if !granted {
            tracing::debug!(path = %parts.uri.path(), ?permission, roles = ?rule.require_role, "missing role");
            return Err(CrudError::Forbidden);
        }
    }

    Ok(())
}

/// Whether `permission` would be granted, for deciding which links to show
pub async fn permits(
    provider: &dyn AuthProvider,
    config: &AuthConfig,
    permission: Permission,
    parts: &Parts,
) -> bool {
    authorize(provider, config, permission, parts).await.is_ok()
}

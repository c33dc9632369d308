// Authentication: the current identity, and how it is obtained.
//
// With the hosted store the identity comes from the auth endpoint of the same
// project, looked up with the configured access token. With the local SQLite
// store it is whatever credentials.toml names.

use anyhow::Context;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::info;

use touchline_core::access::Identity;

use crate::config::CredentialsConfig;

/// Holds the signed-in identity and notifies subscribers on sign-in and
/// sign-out.
#[derive(Debug)]
pub struct AuthState {
    tx: watch::Sender<Option<Identity>>,
}

impl AuthState {
    pub fn new(initial: Option<Identity>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    pub fn sign_in(&self, identity: Identity) {
        info!("Signed in as {}", identity.email);
        self.tx.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            info!("Signed out");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Look up the user behind `access_token`.
pub async fn fetch_identity(
    base_url: &str,
    api_key: &str,
    access_token: &str,
) -> anyhow::Result<Identity> {
    let url = format!("{}/auth/v1/user", base_url.trim_end_matches('/'));
    let user: UserResponse = reqwest::Client::new()
        .get(&url)
        .header("apikey", api_key)
        .bearer_auth(access_token)
        .send()
        .await
        .context("auth request failed")?
        .error_for_status()
        .context("access token rejected")?
        .json()
        .await
        .context("unreadable auth response")?;

    Ok(Identity {
        id: user.id,
        email: user.email.unwrap_or_default(),
    })
}

/// Static identity configured for local use, if any.
pub fn identity_from_config(credentials: &CredentialsConfig) -> Option<Identity> {
    let id = credentials.user_id.as_deref()?.trim();
    if id.is_empty() {
        return None;
    }
    Some(Identity {
        id: id.to_string(),
        email: credentials.email.clone().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity {
            id: "u1".into(),
            email: "alice@example.com".into(),
        }
    }

    #[test]
    fn sign_in_and_out_notify_subscribers() {
        let auth = AuthState::new(None);
        let mut rx = auth.subscribe();
        assert!(auth.current().is_none());

        auth.sign_in(alice());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref(), Some(&alice()));
        assert_eq!(auth.current(), Some(alice()));

        auth.sign_out();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());
    }

    #[test]
    fn config_identity_requires_user_id() {
        let mut credentials = CredentialsConfig::default();
        assert!(identity_from_config(&credentials).is_none());

        credentials.user_id = Some("  ".into());
        assert!(identity_from_config(&credentials).is_none());

        credentials.user_id = Some("u1".into());
        credentials.email = Some("alice@example.com".into());
        assert_eq!(identity_from_config(&credentials), Some(alice()));
    }

    #[test]
    fn missing_email_becomes_empty() {
        let credentials = CredentialsConfig {
            user_id: Some("u9".into()),
            ..Default::default()
        };
        assert_eq!(identity_from_config(&credentials).unwrap().email, "");
    }
}

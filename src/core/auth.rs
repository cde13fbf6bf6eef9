//! # Auth Slice
//!
//! Sign-in state. Credentials are validated locally before any request;
//! the token itself is persisted by the runtime through `SecureStorage`.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::api::ApiError;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Rider,
    Driver,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    #[serde(default)]
    pub role: UserRole,
}

/// Loose shape check: something@something.tld
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !email.chars().any(char::is_whitespace)
}

pub fn validate_credentials(email: &str, password: &str) -> Result<(), String> {
    if email.trim().is_empty() || password.is_empty() {
        return Err("Email and password are required.".to_string());
    }
    if !is_valid_email(email.trim()) {
        return Err("Please enter a valid email address.".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!("Password must be at least {MIN_PASSWORD_LEN} characters."));
    }
    Ok(())
}

pub fn validate_registration(request: &RegisterRequest) -> Result<(), String> {
    let mut missing = Vec::new();
    for (name, value) in [
        ("name", &request.name),
        ("email", &request.email),
        ("phone", &request.phone),
        ("password", &request.password),
    ] {
        if value.trim().is_empty() {
            missing.push(name);
        }
    }
    if !missing.is_empty() {
        return Err(format!("Please provide: {}.", missing.join(", ")));
    }
    if !is_valid_email(request.email.trim()) {
        return Err("Please enter a valid email address.".to_string());
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!("Password must be at least {MIN_PASSWORD_LEN} characters."));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct AuthSlice {
    pub user: Option<User>,
    pub token: Option<String>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl AuthSlice {
    /// Returns false if a request is in flight or validation failed.
    pub fn begin(&mut self, validation: Result<(), String>) -> bool {
        if self.is_loading {
            return false;
        }
        if let Err(msg) = validation {
            self.error = Some(msg);
            return false;
        }
        self.is_loading = true;
        self.error = None;
        true
    }

    /// Returns the session to persist on success.
    pub fn finish(&mut self, result: Result<AuthSession, ApiError>) -> Option<AuthSession> {
        self.is_loading = false;
        match result {
            Ok(session) => {
                info!("Signed in as {}", session.user.email);
                self.restore(session.clone());
                Some(session)
            }
            Err(e) => {
                warn!("Sign-in failed: {}", e);
                self.error = Some(match &e {
                    ApiError::Api { status: 401, .. } => "Invalid email or password.".to_string(),
                    other => other.user_message(),
                });
                None
            }
        }
    }

    pub fn restore(&mut self, session: AuthSession) {
        self.user = Some(session.user);
        self.token = Some(session.token);
        self.is_authenticated = true;
        self.error = None;
    }

    pub fn logout(&mut self) {
        *self = AuthSlice::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::auth_session;

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("rider@example.com"));
        assert!(!is_valid_email("rider@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a b@example.com"));
        assert!(!is_valid_email("a@b@c.com"));
    }

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials("", "password1").is_err());
        assert!(validate_credentials("nope", "password1").is_err());
        assert_eq!(
            validate_credentials("a@b.co", "pw"),
            Err("Password must be at least 8 characters.".to_string())
        );
        assert!(validate_credentials("a@b.co", "password1").is_ok());
    }

    #[test]
    fn test_validate_registration() {
        let mut request = RegisterRequest {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            phone: String::new(),
            password: "short".into(),
            role: UserRole::Rider,
        };
        assert_eq!(validate_registration(&request).unwrap_err(), "Please provide: phone.");
        request.phone = "+15550100".into();
        assert!(validate_registration(&request).unwrap_err().contains("at least 8"));
        request.password = "long enough".into();
        assert!(validate_registration(&request).is_ok());
    }

    #[test]
    fn test_begin_guards() {
        let mut slice = AuthSlice::default();
        assert!(!slice.begin(Err("bad".into())));
        assert_eq!(slice.error.as_deref(), Some("bad"));
        assert!(slice.begin(Ok(())));
        assert!(!slice.begin(Ok(())));
    }

    #[test]
    fn test_finish_and_logout() {
        let mut slice = AuthSlice::default();
        slice.begin(Ok(()));
        assert!(slice.finish(Ok(auth_session())).is_some());
        assert!(slice.is_authenticated);
        assert_eq!(slice.token.as_deref(), Some("token-abc"));

        slice.logout();
        assert!(!slice.is_authenticated);
        assert!(slice.user.is_none());
    }

    #[test]
    fn test_unauthorized_message() {
        let mut slice = AuthSlice::default();
        slice.begin(Ok(()));
        let result = slice.finish(Err(ApiError::Api { status: 401, message: "no".into() }));
        assert!(result.is_none());
        assert_eq!(slice.error.as_deref(), Some("Invalid email or password."));
    }
}

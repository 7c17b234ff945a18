//! Authentication credentials.

use std::fmt;

/// Credentials for `AUTH`.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Username and password (PLAIN or LOGIN).
    Password {
        /// Username.
        user: String,
        /// Password.
        pass: String,
    },
    /// `OAuth2` bearer token (`XOAUTH2` or `OAUTHBEARER`).
    OAuth2(OAuth2Token),
}

impl Credentials {
    /// Username and password credentials.
    #[must_use]
    pub fn password(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self::Password {
            user: user.into(),
            pass: pass.into(),
        }
    }

    /// `OAuth2` access token credentials.
    #[must_use]
    pub fn oauth2(user: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::OAuth2(OAuth2Token {
            user: user.into(),
            access_token: access_token.into(),
        })
    }

    /// Returns the user being authenticated.
    #[must_use]
    pub fn user(&self) -> &str {
        match self {
            Self::Password { user, .. } => user,
            Self::OAuth2(token) => &token.user,
        }
    }
}

// Secrets never reach logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { user, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .field("pass", &"<redacted>")
                .finish(),
            Self::OAuth2(token) => f.debug_tuple("OAuth2").field(token).finish(),
        }
    }
}

/// `OAuth2` access token for a user.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuth2Token {
    /// User email address.
    pub user: String,
    /// Access token presented to the server.
    pub access_token: String,
}

impl fmt::Debug for OAuth2Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Token")
            .field("user", &self.user)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

use std::fmt;

/// Bitbucket username and app password used for HTTP Basic authentication.
///
/// The password is never printed by `Debug`.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    app_password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, app_password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            app_password: app_password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn app_password(&self) -> &str {
        &self.app_password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("app_password", &"***")
            .finish()
    }
}

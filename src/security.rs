use subtle::{Choice, ConstantTimeEq};

/// Constant-time string comparison to prevent timing attacks.
/// Unequal lengths return early; only the contents are compared in constant time.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// The single operator account allowed through the login gate.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both fields are always compared, so a wrong username takes as long
    /// as a wrong password.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let username_ok = Choice::from(u8::from(constant_time_compare(&self.username, username)));
        let password_ok = Choice::from(u8::from(constant_time_compare(&self.password, password)));
        (username_ok & password_ok).into()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

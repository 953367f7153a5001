use serde::Deserialize;

/// Registration form body.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Login form body. `remember` arrives as "on" from an HTML checkbox and is
/// absent when unchecked.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub remember: Option<String>,
}

impl LoginForm {
    pub fn remember(&self) -> bool {
        self.remember.is_some()
    }
}

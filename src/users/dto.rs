use serde::{Deserialize, Serialize};

/// Editable profile shown on the settings page. The hash never leaves the
/// server.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// Body of `POST /update_profile`.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileForm {
    #[serde(default)]
    pub email: String,
}

/// Body of `POST /change_password`.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_serializes_public_fields() {
        let profile = ProfileResponse {
            id: 7,
            username: "alice".into(),
            email: "a@x.com".into(),
        };
        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("alice"));
        assert!(json.contains("a@x.com"));
    }
}

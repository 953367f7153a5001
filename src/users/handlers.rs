use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Form, Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        extractors::CurrentUser,
        handlers::{flash_failure, is_valid_email},
        password::{hash_password, meets_policy, verify_password},
    },
    error::AuthError,
    flash::{redirect_with_flash, FlashKind},
    state::AppState,
    users::{
        dto::{ChangePasswordForm, ProfileResponse, UpdateProfileForm},
        repo::{StoreError, User},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/settings", get(settings))
        .route("/update_profile", post(update_profile))
        .route("/change_password", post(change_password))
}

#[instrument(skip(user))]
pub async fn settings(CurrentUser(user): CurrentUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        id: user.id,
        username: user.username,
        email: user.email,
    })
}

async fn try_update_email(state: &AppState, user: &User, email: &str) -> Result<(), AuthError> {
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required.".into()));
    }
    if !is_valid_email(email) {
        return Err(AuthError::Validation(
            "Please enter a valid email address.".into(),
        ));
    }

    // Fast-path check; the unique constraint catches a concurrent claim.
    if let Some(existing) = User::find_by_email(&state.db, email).await? {
        if existing.id != user.id {
            return Err(AuthError::Conflict(
                "Email address is already in use by another account.".into(),
            ));
        }
    }

    let mut updated = user.clone();
    updated.email = email.to_string();
    updated.update(&state.db).await.map_err(|e| match e {
        StoreError::Conflict { .. } => AuthError::Conflict(
            "Email address is already in use by another account.".into(),
        ),
        StoreError::Other(e) => AuthError::Store(e),
    })?;
    Ok(())
}

#[instrument(skip(state, user, form))]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<UpdateProfileForm>,
) -> Response {
    let email = form.email.trim().to_lowercase();

    match try_update_email(&state, &user, &email).await {
        Ok(()) => {
            info!(user_id = user.id, "profile updated");
            redirect_with_flash("/settings", FlashKind::Success, "Profile updated successfully!")
        }
        Err(err) => {
            warn!(user_id = user.id, error = %err, "profile update rejected");
            flash_failure(&err, "/settings", "Profile update failed. Please try again.")
        }
    }
}

async fn try_change_password(
    state: &AppState,
    user: &User,
    form: &ChangePasswordForm,
) -> Result<(), AuthError> {
    if form.current_password.is_empty() || form.new_password.is_empty() {
        return Err(AuthError::Validation(
            "Both current and new passwords are required.".into(),
        ));
    }

    // The stored hash stays untouched unless the caller proves they know the
    // current password.
    if !verify_password(&form.current_password, &user.password_hash)? {
        return Err(AuthError::Validation("Current password is incorrect.".into()));
    }

    if !meets_policy(&form.new_password, &state.config.password) {
        return Err(AuthError::Validation(format!(
            "New password must be at least {} characters long.",
            state.config.password.min_length
        )));
    }

    let mut updated = user.clone();
    updated.password_hash = hash_password(&form.new_password)?;
    updated.update(&state.db).await.map_err(|e| match e {
        // No uniqueness applies to the hash column; treat any conflict as a
        // plain store failure.
        StoreError::Conflict { .. } => AuthError::Store(sqlx::Error::Protocol(
            "unexpected conflict on password update".into(),
        )),
        StoreError::Other(e) => AuthError::Store(e),
    })?;
    Ok(())
}

#[instrument(skip(state, user, form))]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<ChangePasswordForm>,
) -> Response {
    match try_change_password(&state, &user, &form).await {
        Ok(()) => {
            // Existing sessions stay valid until their tokens expire; tokens
            // are stateless and carry no password version.
            info!(user_id = user.id, "password changed");
            redirect_with_flash("/settings", FlashKind::Success, "Password changed successfully!")
        }
        Err(err) => {
            warn!(user_id = user.id, error = %err, "password change rejected");
            flash_failure(&err, "/settings", "Password change failed. Please try again.")
        }
    }
}

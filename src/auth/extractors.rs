use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::Redirect,
};
use tracing::{error, warn};

use crate::{
    auth::session::{extract_session_token, SessionKeys},
    state::AppState,
    users::repo::User,
};

/// Authentication guard: verifies the session cookie and reloads the user row
/// by id on every request. Anonymous requests are redirected to the login
/// page instead of reaching the handler.
pub struct CurrentUser(pub User);

fn login_redirect() -> Redirect {
    Redirect::to("/login")
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(&parts.headers).ok_or_else(login_redirect)?;

        let keys = SessionKeys::from_ref(state);
        let claims = keys.verify(&token).map_err(|_| {
            warn!("invalid or expired session token");
            login_redirect()
        })?;

        // Identity is resolved against the store on every request, never
        // cached from the token.
        let user = User::find_by_id(&state.db, claims.sub)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = claims.sub, "session user lookup failed");
                login_redirect()
            })?
            .ok_or_else(|| {
                warn!(user_id = claims.sub, "session bound to unknown user");
                login_redirect()
            })?;

        Ok(CurrentUser(user))
    }
}

use axum::{
    extract::{FromRef, State},
    http::header::SET_COOKIE,
    response::{Html, Response},
    routing::get,
    Form, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginForm, RegisterForm},
        extractors::CurrentUser,
        password::{hash_password, meets_policy, verify_password},
        session::{clear_session_cookie, SessionKeys},
    },
    error::{AuthError, DUPLICATE_EMAIL, DUPLICATE_USERNAME},
    flash::{redirect_with_flash, FlashKind},
    state::AppState,
    users::repo::User,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", get(register_form).post(register))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Redirect-plus-flash for a failed operation. Infrastructure failures get the
/// handler's generic retry wording; everything else keeps its own message.
pub(crate) fn flash_failure(err: &AuthError, to: &str, infra_message: &str) -> Response {
    match err {
        AuthError::Store(e) => error!(error = %e, "store failure"),
        AuthError::Internal(e) => error!(error = %e, "internal failure"),
        _ => {}
    }
    let message = if err.is_infrastructure() {
        infra_message.to_string()
    } else {
        err.user_message()
    };
    redirect_with_flash(to, FlashKind::Error, &message)
}

// Template rendering is a client concern; these are bare placeholder forms so
// the flow works end to end in a browser.
async fn register_form() -> Html<&'static str> {
    Html(
        r#"<form method="post" action="/register">
  <input name="username" placeholder="username">
  <input name="email" placeholder="email">
  <input name="password" type="password" placeholder="password">
  <button>Register</button>
</form>"#,
    )
}

async fn login_form() -> Html<&'static str> {
    Html(
        r#"<form method="post" action="/login">
  <input name="username" placeholder="username">
  <input name="password" type="password" placeholder="password">
  <label><input name="remember" type="checkbox"> remember me</label>
  <button>Log in</button>
</form>"#,
    )
}

fn validate_registration(form: &RegisterForm, state: &AppState) -> Result<(), AuthError> {
    if form.username.is_empty() || form.email.is_empty() || form.password.is_empty() {
        return Err(AuthError::Validation("All fields are required.".into()));
    }
    if !is_valid_email(&form.email) {
        return Err(AuthError::Validation(
            "Please enter a valid email address.".into(),
        ));
    }
    if !meets_policy(&form.password, &state.config.password) {
        return Err(AuthError::Validation(format!(
            "Password must be at least {} characters long.",
            state.config.password.min_length
        )));
    }
    Ok(())
}

async fn try_register(state: &AppState, form: &RegisterForm) -> Result<User, AuthError> {
    validate_registration(form, state)?;

    // Fast-path duplicate checks for precise messages; the database
    // constraints are what actually close the race.
    if User::find_by_username(&state.db, &form.username)
        .await?
        .is_some()
    {
        return Err(AuthError::Conflict(DUPLICATE_USERNAME.into()));
    }
    if User::find_by_email(&state.db, &form.email).await?.is_some() {
        return Err(AuthError::Conflict(DUPLICATE_EMAIL.into()));
    }

    let hash = hash_password(&form.password)?;
    let user = User::create(&state.db, &form.username, &form.email, &hash).await?;
    Ok(user)
}

#[instrument(skip(state, form))]
pub async fn register(State(state): State<AppState>, Form(mut form): Form<RegisterForm>) -> Response {
    form.username = form.username.trim().to_string();
    form.email = form.email.trim().to_lowercase();

    match try_register(&state, &form).await {
        Ok(user) => {
            info!(user_id = user.id, username = %user.username, "user registered");
            redirect_with_flash(
                "/login",
                FlashKind::Success,
                "Registration successful! Please log in.",
            )
        }
        Err(err) => {
            warn!(username = %form.username, error = %err, "registration rejected");
            flash_failure(&err, "/register", "Registration failed. Please try again.")
        }
    }
}

async fn authenticate(state: &AppState, form: &LoginForm) -> Result<User, AuthError> {
    if form.username.is_empty() || form.password.is_empty() {
        // Merged with the lookup/verify failures below; the caller learns
        // nothing about which part was wrong.
        return Err(AuthError::InvalidCredentials);
    }
    let user = User::find_by_username(&state.db, &form.username)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !verify_password(&form.password, &user.password_hash)? {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(user)
}

#[instrument(skip(state, form))]
pub async fn login(State(state): State<AppState>, Form(mut form): Form<LoginForm>) -> Response {
    form.username = form.username.trim().to_string();
    let remember = form.remember();

    let user = match authenticate(&state, &form).await {
        Ok(user) => user,
        Err(err) => {
            warn!(username = %form.username, "login rejected");
            return flash_failure(&err, "/login", "Something went wrong. Please try again.");
        }
    };

    let keys = SessionKeys::from_ref(&state);
    let cookie = match keys
        .sign(user.id, remember)
        .and_then(|token| keys.session_cookie(&token, remember).map_err(Into::into))
    {
        Ok(cookie) => cookie,
        Err(e) => {
            error!(error = %e, user_id = user.id, "session token signing failed");
            return redirect_with_flash(
                "/login",
                FlashKind::Error,
                "Something went wrong. Please try again.",
            );
        }
    };

    info!(user_id = user.id, username = %user.username, remember, "user logged in");
    let mut response = redirect_with_flash(
        "/settings",
        FlashKind::Success,
        &format!("Welcome back, {}!", user.username),
    );
    response.headers_mut().append(SET_COOKIE, cookie);
    response
}

#[instrument(skip(user))]
pub async fn logout(CurrentUser(user): CurrentUser) -> Response {
    info!(user_id = user.id, username = %user.username, "user logged out");
    let mut response = redirect_with_flash(
        "/login",
        FlashKind::Info,
        &format!("Goodbye, {}! You have been logged out.", user.username),
    );
    response
        .headers_mut()
        .append(SET_COOKIE, clear_session_cookie());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BAD_CREDENTIALS;

    fn make_form(username: &str, email: &str, password: &str) -> RegisterForm {
        RegisterForm {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn registration_requires_all_fields() {
        let state = AppState::fake();
        let err = validate_registration(&make_form("alice", "", "secret1"), &state).unwrap_err();
        assert_eq!(err.user_message(), "All fields are required.");
    }

    #[tokio::test]
    async fn registration_rejects_short_password() {
        let state = AppState::fake();
        let err =
            validate_registration(&make_form("alice", "a@x.com", "abc"), &state).unwrap_err();
        assert_eq!(
            err.user_message(),
            "Password must be at least 6 characters long."
        );
    }

    #[tokio::test]
    async fn registration_rejects_bad_email_shape() {
        let state = AppState::fake();
        let err =
            validate_registration(&make_form("alice", "not-an-email", "secret1"), &state)
                .unwrap_err();
        assert_eq!(err.user_message(), "Please enter a valid email address.");
    }

    #[tokio::test]
    async fn registration_accepts_valid_input() {
        let state = AppState::fake();
        assert!(validate_registration(&make_form("alice", "a@x.com", "secret1"), &state).is_ok());
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user example@x.com"));
        assert!(!is_valid_email("userexample.com"));
    }

    #[tokio::test]
    async fn empty_login_fields_fail_with_the_generic_message() {
        let state = AppState::fake();
        let form = LoginForm {
            username: "".into(),
            password: "".into(),
            remember: None,
        };
        // Must match the message for unknown-user and wrong-password byte for
        // byte, so none of the three cases is distinguishable.
        let err = authenticate(&state, &form).await.unwrap_err();
        assert_eq!(err.user_message(), BAD_CREDENTIALS);
    }

    #[test]
    fn flash_failure_hides_store_errors_behind_context_message() {
        let err = AuthError::Store(sqlx::Error::PoolTimedOut);
        let response = flash_failure(&err, "/register", "Registration failed. Please try again.");
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let value = cookie
            .strip_prefix("flash=")
            .and_then(|v| v.split(';').next())
            .unwrap();
        let (kind, message) = crate::flash::decode_flash(value).unwrap();
        assert_eq!(kind, FlashKind::Error);
        assert_eq!(message, "Registration failed. Please try again.");
    }
}

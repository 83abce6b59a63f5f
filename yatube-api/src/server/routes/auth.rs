use crate::server::{
    Result, ServerError, ServerRouter, SessionSettings,
    auth::{AuthenticatedUser, end_session, is_local_path, start_session},
    forms::{FieldErrors, LoginForm, SignupForm},
    html::{Form, Found, Html, Query},
    templates::{Layout, LoginTemplate, SignupTemplate},
};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::{
    extract::CookieJar,
    routing::{RouterExt, TypedPath},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use yatube_common::model::{
    auth::PasswordDigest,
    user::{NewUser, User, Username},
};
use yatube_db::client::DbClient;

const INVALID_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";
const USERNAME_TAKEN: &str = "A user with that username already exists.";

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(login_form)
        .typed_post(login)
        .typed_get(signup_form)
        .typed_post(signup)
        .typed_get(logout)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/login/", rejection(ServerError))]
struct LoginPath();

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct NextQuery {
    next: Option<String>,
}

async fn login_form(
    LoginPath(): LoginPath,
    Query(query): Query<NextQuery>,
    viewer: Option<AuthenticatedUser>,
) -> Html<LoginTemplate> {
    Html(LoginTemplate {
        layout: Layout::new(viewer.as_ref()),
        username: String::new(),
        next: query.next.unwrap_or_default(),
        errors: Vec::new(),
    })
}

/// The user whose password matches, if any.
async fn check_credentials(db: &DbClient, form: &LoginForm) -> Result<Option<User>> {
    let Ok(username) = Username::new(form.username.trim().to_owned()) else {
        return Ok(None);
    };
    let Some((user, digest)) = db.fetch_credentials(&username).await? else {
        return Ok(None);
    };

    Ok(digest.verify(&form.password).then_some(user))
}

async fn login(
    LoginPath(): LoginPath,
    State(db): State<Arc<DbClient>>,
    State(sessions): State<Arc<SessionSettings>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let Some(user) = check_credentials(&db, &form).await? else {
        debug!(username = %form.username, "Rejected login");
        return Ok(Html(LoginTemplate {
            layout: Layout::anonymous(),
            username: form.username,
            next: form.next,
            errors: vec![INVALID_LOGIN.to_owned()],
        })
        .into_response());
    };

    let cookie = start_session(&db, &sessions, user.id).await?;
    info!(user = %user.username, "Logged in");

    let target = if is_local_path(&form.next) {
        form.next
    } else {
        "/".to_owned()
    };
    Ok((jar.add(cookie), Found(target)).into_response())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/signup/", rejection(ServerError))]
struct SignupPath();

fn signup_page(form: &SignupForm, errors: &FieldErrors) -> Html<SignupTemplate> {
    Html(SignupTemplate {
        layout: Layout::anonymous(),
        username: form.username.clone(),
        username_errors: errors.field("username"),
        password1_errors: errors.field("password1"),
        password2_errors: errors.field("password2"),
    })
}

async fn signup_form(SignupPath(): SignupPath) -> Html<SignupTemplate> {
    signup_page(&SignupForm::default(), &FieldErrors::default())
}

async fn signup(
    SignupPath(): SignupPath,
    State(db): State<Arc<DbClient>>,
    State(sessions): State<Arc<SessionSettings>>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response> {
    let username = match form.validate() {
        Ok(username) => username,
        Err(errors) => return Ok(signup_page(&form, &errors).into_response()),
    };

    let new_user = NewUser {
        username,
        password: PasswordDigest::hash(&form.password1)?,
    };
    let Some(user) = db.create_user(&new_user).await? else {
        let mut errors = FieldErrors::default();
        errors.add("username", USERNAME_TAKEN);
        return Ok(signup_page(&form, &errors).into_response());
    };
    info!(user = %user.username, "Signed up");

    let cookie = start_session(&db, &sessions, user.id).await?;
    Ok((jar.add(cookie), Found("/".to_owned())).into_response())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/logout/", rejection(ServerError))]
struct LogoutPath();

async fn logout(
    LogoutPath(): LogoutPath,
    State(db): State<Arc<DbClient>>,
    jar: CookieJar,
) -> Result<Response> {
    let jar = end_session(&db, jar).await?;

    Ok((jar, Found("/".to_owned())).into_response())
}

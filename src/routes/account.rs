//! Account endpoints for the current user
//!
//! Registration and activation, JWT login (`/api/authenticate`), profile and
//! password management, and logout.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{debug, warn};
use utoipa::IntoParams;

use super::AppState;
use crate::auth::{create_auth_cookie, create_logout_cookie, generate_token, Auth, AuthConfig};
use crate::email::MailKind;
use crate::error::{AppError, AppResult};
use crate::models::user::is_password_length_invalid;
use crate::models::{
    AdminUserDto, ApiError, ApiResponse, JwtToken, KeyAndPasswordVm, LoginVm, ManagedUserVm,
    PasswordChangeDto, UserRecord,
};
use crate::service::{AccountUpdate, ServiceError};

/// Query parameters for `GET /api/activate`
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivationQuery {
    /// Activation key from the activation mail
    pub key: String,
}

/// Hand a mail to the email service, or log that it was skipped
pub(super) fn send_mail(data: &AppState, kind: MailKind, user: &UserRecord) {
    match &data.email_service {
        Some(service) => service.dispatch(kind, user.clone()),
        None => warn!(
            "SMTP is not configured, {:?} mail for user '{}' was not sent",
            kind, user.login
        ),
    }
}

fn check_password_length(password: &str) -> AppResult<()> {
    if is_password_length_invalid(password) {
        return Err(ServiceError::InvalidPassword.into());
    }
    Ok(())
}

// ============================================================================
// Registration
// ============================================================================

/// POST /api/register - register a new account
///
/// The account stays inactive until the link from the activation mail is used.
#[utoipa::path(
    post,
    path = "/api/register",
    tag = "account",
    request_body = ManagedUserVm,
    responses(
        (status = 201, description = "User registered"),
        (status = 400, description = "Invalid password, login or email already used", body = ApiError)
    )
)]
pub async fn register_account(
    data: web::Data<AppState>,
    body: web::Json<ManagedUserVm>,
) -> AppResult<HttpResponse> {
    let vm = body.into_inner();
    let password = vm.password.clone().unwrap_or_default();
    check_password_length(&password)?;
    vm.user.validate().map_err(AppError::validation)?;

    let user = data.user_service.register_user(&vm, &password).await?;
    send_mail(&data, MailKind::Activation, &user);

    Ok(HttpResponse::Created().finish())
}

/// GET /api/activate?key= - activate a registered account
#[utoipa::path(
    get,
    path = "/api/activate",
    tag = "account",
    params(ActivationQuery),
    responses(
        (status = 200, description = "Account activated"),
        (status = 500, description = "No user was found for this activation key", body = ApiError)
    )
)]
pub async fn activate_account(
    data: web::Data<AppState>,
    query: web::Query<ActivationQuery>,
) -> AppResult<HttpResponse> {
    match data.user_service.activate_registration(&query.key).await? {
        Some(_) => Ok(HttpResponse::Ok().finish()),
        None => Err(AppError::internal("No user was found for this activation key")),
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// POST /api/authenticate - exchange credentials for a JWT
///
/// The token is returned in the body, in the `Authorization` header and as an
/// HTTP-only cookie.
#[utoipa::path(
    post,
    path = "/api/authenticate",
    tag = "account",
    request_body = LoginVm,
    responses(
        (status = 200, description = "Authenticated", body = JwtToken),
        (status = 401, description = "Bad credentials or account not activated", body = ApiError)
    )
)]
pub async fn authorize(
    data: web::Data<AppState>,
    auth_config: web::Data<AuthConfig>,
    body: web::Json<LoginVm>,
) -> AppResult<HttpResponse> {
    let login = body.into_inner();
    let user = data
        .user_service
        .authenticate(&login.username, &login.password)
        .await?;

    let validity = auth_config.validity_seconds(login.remember_me);
    let token = generate_token(&user.login, &user.authorities, validity, &auth_config.jwt_secret)?;
    debug!("Issued token for user '{}'", user.login);

    Ok(HttpResponse::Ok()
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .cookie(create_auth_cookie(&token, validity))
        .json(JwtToken { id_token: token }))
}

/// GET /api/authenticate - login of the current user, or 204 when anonymous
#[utoipa::path(
    get,
    path = "/api/authenticate",
    tag = "account",
    responses(
        (status = 200, description = "Login of the authenticated user", body = String),
        (status = 204, description = "Not authenticated")
    )
)]
pub async fn is_authenticated(auth: Option<Auth>) -> HttpResponse {
    match auth {
        Some(auth) => HttpResponse::Ok().content_type("text/plain").body(auth.login),
        None => HttpResponse::NoContent().finish(),
    }
}

/// POST /api/logout - clear the auth cookie
#[utoipa::path(
    post,
    path = "/api/logout",
    tag = "account",
    responses(
        (status = 200, description = "Logout successful", body = ApiResponse<String>)
    )
)]
pub async fn logout() -> HttpResponse {
    HttpResponse::Ok()
        .cookie(create_logout_cookie())
        .json(ApiResponse::new("Logged out successfully".to_string()))
}

// ============================================================================
// Current account
// ============================================================================

/// GET /api/account - the current user with authorities
#[utoipa::path(
    get,
    path = "/api/account",
    tag = "account",
    responses(
        (status = 200, description = "Current user", body = AdminUserDto),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 500, description = "User could not be found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_account(data: web::Data<AppState>, auth: Auth) -> AppResult<HttpResponse> {
    let user = data
        .user_service
        .get_user_with_authorities_by_login(&auth.login)
        .await?
        .ok_or_else(|| ServiceError::UserNotFound(auth.login.clone()))?;

    Ok(HttpResponse::Ok().json(AdminUserDto::from(&user)))
}

/// POST /api/account - update the current user's profile
#[utoipa::path(
    post,
    path = "/api/account",
    tag = "account",
    request_body = AdminUserDto,
    responses(
        (status = 200, description = "Account updated"),
        (status = 400, description = "Invalid data or email already used", body = ApiError),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 500, description = "User could not be found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn save_account(
    data: web::Data<AppState>,
    auth: Auth,
    body: web::Json<AdminUserDto>,
) -> AppResult<HttpResponse> {
    let dto = body.into_inner();
    dto.validate().map_err(AppError::validation)?;

    let update = AccountUpdate {
        first_name: dto.first_name,
        last_name: dto.last_name,
        email: dto.email,
        lang_key: dto.lang_key,
        image_url: dto.image_url,
    };

    data.user_service
        .update_current_user(&auth.login, update)
        .await?
        .ok_or(ServiceError::UserNotFound(auth.login))?;

    Ok(HttpResponse::Ok().finish())
}

/// POST /api/account/change-password
#[utoipa::path(
    post,
    path = "/api/account/change-password",
    tag = "account",
    request_body = PasswordChangeDto,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Incorrect password", body = ApiError),
        (status = 401, description = "Not authenticated", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    data: web::Data<AppState>,
    auth: Auth,
    body: web::Json<PasswordChangeDto>,
) -> AppResult<HttpResponse> {
    check_password_length(&body.new_password)?;

    data.user_service
        .change_password(&auth.login, &body.current_password, &body.new_password)
        .await?;

    Ok(HttpResponse::Ok().finish())
}

// ============================================================================
// Password reset
// ============================================================================

/// POST /api/account/reset-password/init - mail a reset link
///
/// The body is the plain-text email address. The response does not reveal
/// whether the address belongs to an account.
#[utoipa::path(
    post,
    path = "/api/account/reset-password/init",
    tag = "account",
    request_body(content = String, content_type = "text/plain"),
    responses(
        (status = 200, description = "Reset mail sent if the address is registered")
    )
)]
pub async fn request_password_reset(
    data: web::Data<AppState>,
    body: String,
) -> AppResult<HttpResponse> {
    let mail = body.trim();

    match data.user_service.request_password_reset(mail).await? {
        Some(user) => send_mail(&data, MailKind::PasswordReset, &user),
        None => warn!("Password reset requested for non existing mail"),
    }

    Ok(HttpResponse::Ok().finish())
}

/// POST /api/account/reset-password/finish - set a new password with a reset key
#[utoipa::path(
    post,
    path = "/api/account/reset-password/finish",
    tag = "account",
    request_body = KeyAndPasswordVm,
    responses(
        (status = 200, description = "Password reset"),
        (status = 400, description = "Incorrect password", body = ApiError),
        (status = 500, description = "No user was found for this reset key", body = ApiError)
    )
)]
pub async fn finish_password_reset(
    data: web::Data<AppState>,
    body: web::Json<KeyAndPasswordVm>,
) -> AppResult<HttpResponse> {
    check_password_length(&body.new_password)?;

    match data
        .user_service
        .complete_password_reset(&body.new_password, &body.key)
        .await?
    {
        Some(_) => Ok(HttpResponse::Ok().finish()),
        None => Err(AppError::internal("No user was found for this reset key")),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/register", web::post().to(register_account))
        .route("/activate", web::get().to(activate_account))
        .route("/authenticate", web::post().to(authorize))
        .route("/authenticate", web::get().to(is_authenticated))
        .route("/logout", web::post().to(logout))
        .service(
            web::scope("/account")
                .route("", web::get().to(get_account))
                .route("", web::post().to(save_account))
                .route("/change-password", web::post().to(change_password))
                .route("/reset-password/init", web::post().to(request_password_reset))
                .route("/reset-password/finish", web::post().to(finish_password_reset)),
        );
}

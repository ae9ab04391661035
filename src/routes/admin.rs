//! User administration
//!
//! - `/api/admin/users` - create, update, list, get and delete accounts (admin)
//! - `/api/authorities` - known authorities (admin)
//! - `/api/users` - public view of activated users

use actix_web::http::header::LOCATION;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::debug;

use super::account::send_mail;
use super::headers;
use super::AppState;
use crate::auth::{Auth, ROLE_ADMIN};
use crate::email::MailKind;
use crate::error::{AppError, AppResult, USER_MANAGEMENT};
use crate::models::user::is_valid_login;
use crate::models::{AdminUserDto, ApiError, PageParams, Pageable, UserDto};

fn check_login(login: &str) -> AppResult<()> {
    if !is_valid_login(login) {
        return Err(AppError::validation(format!("Invalid login: {}", login)));
    }
    Ok(())
}

/// POST /api/admin/users - create an activated account
///
/// The new user receives a mail with a link to choose a password.
#[utoipa::path(
    post,
    path = "/api/admin/users",
    tag = "user-management",
    request_body = AdminUserDto,
    responses(
        (status = 201, description = "User created", body = AdminUserDto),
        (status = 400, description = "Id set, login or email already used", body = ApiError),
        (status = 403, description = "Not an administrator", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    data: web::Data<AppState>,
    auth: Auth,
    body: web::Json<AdminUserDto>,
) -> AppResult<HttpResponse> {
    auth.require(ROLE_ADMIN)?;
    let dto = body.into_inner();
    debug!("REST request to save User : {}", dto.login);

    if dto.id.is_some() {
        return Err(AppError::bad_request_alert(
            "A new user cannot already have an ID",
            USER_MANAGEMENT,
            "idexists",
        ));
    }
    dto.validate().map_err(AppError::validation)?;

    let user = data.user_service.create_user(&dto, &auth.login).await?;
    send_mail(&data, MailKind::Creation, &user);

    let location = format!("/api/admin/users/{}", urlencoding::encode(&user.login));
    Ok(headers::alert(
        HttpResponse::Created().insert_header((LOCATION, location)),
        "userManagement.created",
        &user.login,
    )
    .json(AdminUserDto::from(&user)))
}

/// PUT /api/admin/users/{login} - replace an account's fields and authorities
#[utoipa::path(
    put,
    path = "/api/admin/users/{login}",
    tag = "user-management",
    params(("login" = String, Path, description = "Login of the user")),
    request_body = AdminUserDto,
    responses(
        (status = 200, description = "User updated", body = AdminUserDto),
        (status = 400, description = "Login or email already used", body = ApiError),
        (status = 403, description = "Not an administrator", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<String>,
    body: web::Json<AdminUserDto>,
) -> AppResult<HttpResponse> {
    auth.require(ROLE_ADMIN)?;
    let dto = body.into_inner();
    debug!("REST request to update User {} : {}", path.as_str(), dto.login);
    dto.validate().map_err(AppError::validation)?;

    let user = data
        .user_service
        .update_user(&dto, &auth.login)
        .await?
        .ok_or_else(|| AppError::not_found(format!("User {} not found", dto.login)))?;

    Ok(
        headers::alert(&mut HttpResponse::Ok(), "userManagement.updated", &user.login)
            .json(AdminUserDto::from(&user)),
    )
}

/// GET /api/admin/users - one page of accounts
#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "user-management",
    params(PageParams),
    responses(
        (status = 200, description = "Page of users", body = Vec<AdminUserDto>),
        (status = 400, description = "Unknown sort property", body = ApiError),
        (status = 403, description = "Not an administrator", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_all_users(
    req: HttpRequest,
    data: web::Data<AppState>,
    auth: Auth,
    query: web::Query<PageParams>,
) -> AppResult<HttpResponse> {
    auth.require(ROLE_ADMIN)?;
    let pageable = Pageable::from_params(&query);
    let page = data.user_service.get_all_managed_users(&pageable).await?;

    Ok(headers::pagination(&mut HttpResponse::Ok(), &req, &page).json(&page.content))
}

/// GET /api/admin/users/{login}
#[utoipa::path(
    get,
    path = "/api/admin/users/{login}",
    tag = "user-management",
    params(("login" = String, Path, description = "Login of the user")),
    responses(
        (status = 200, description = "User found", body = AdminUserDto),
        (status = 403, description = "Not an administrator", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    auth.require(ROLE_ADMIN)?;
    let login = path.into_inner();
    check_login(&login)?;

    let user = data
        .user_service
        .get_user_with_authorities_by_login(&login)
        .await?
        .ok_or_else(|| AppError::not_found(format!("User {} not found", login)))?;

    Ok(HttpResponse::Ok().json(AdminUserDto::from(&user)))
}

/// DELETE /api/admin/users/{login}
#[utoipa::path(
    delete,
    path = "/api/admin/users/{login}",
    tag = "user-management",
    params(("login" = String, Path, description = "Login of the user")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Not an administrator", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    auth.require(ROLE_ADMIN)?;
    let login = path.into_inner();
    check_login(&login)?;
    debug!("REST request to delete User: {}", login);

    data.user_service.delete_user(&login).await?;

    Ok(headers::alert(&mut HttpResponse::NoContent(), "userManagement.deleted", &login).finish())
}

/// GET /api/authorities - every authority name
#[utoipa::path(
    get,
    path = "/api/authorities",
    tag = "user-management",
    responses(
        (status = 200, description = "Authority names", body = Vec<String>),
        (status = 403, description = "Not an administrator", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_authorities(data: web::Data<AppState>, auth: Auth) -> AppResult<HttpResponse> {
    auth.require(ROLE_ADMIN)?;
    let authorities = data.user_service.get_authorities().await?;
    Ok(HttpResponse::Ok().json(authorities))
}

/// GET /api/users - public view of activated users
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "user-management",
    params(PageParams),
    responses(
        (status = 200, description = "Page of users", body = Vec<UserDto>),
        (status = 400, description = "Unknown sort property", body = ApiError),
        (status = 401, description = "Not authenticated", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_public_users(
    req: HttpRequest,
    data: web::Data<AppState>,
    _auth: Auth,
    query: web::Query<PageParams>,
) -> AppResult<HttpResponse> {
    let pageable = Pageable::from_params(&query);
    let page = data.user_service.get_all_public_users(&pageable).await?;

    Ok(headers::pagination(&mut HttpResponse::Ok(), &req, &page).json(&page.content))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/users")
            .route("", web::post().to(create_user))
            .route("", web::get().to(get_all_users))
            .route("/{login}", web::get().to(get_user))
            .route("/{login}", web::put().to(update_user))
            .route("/{login}", web::delete().to(delete_user)),
    )
    .route("/authorities", web::get().to(get_authorities))
    .route("/users", web::get().to(get_public_users));
}

#[cfg(test)]
mod tests {
    use crate::routes::headers::ERROR_HEADER;
    use crate::routes::test_support::{bearer, test_app};
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::json;

    #[actix_rt::test]
    async fn test_admin_users_require_admin() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::get()
            .uri("/api/admin/users")
            .insert_header(bearer("ed", &["ROLE_USER"]))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn test_authorities_require_authentication() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::get().uri("/api/authorities").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_create_user_with_id_is_rejected() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::post()
            .uri("/api/admin/users")
            .insert_header(bearer("admin", &["ROLE_ADMIN"]))
            .set_json(json!({ "id": 1, "login": "vicious", "email": "vicious@red-dragon.example" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers().get(ERROR_HEADER).unwrap(), "error.idexists");
    }

    #[actix_rt::test]
    async fn test_create_user_with_invalid_email_is_rejected() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::post()
            .uri("/api/admin/users")
            .insert_header(bearer("admin", &["ROLE_ADMIN"]))
            .set_json(json!({ "login": "vicious", "email": "not-an-email" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_delete_user_with_invalid_login_is_rejected() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::delete()
            .uri("/api/admin/users/bad%20login")
            .insert_header(bearer("admin", &["ROLE_ADMIN"]))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

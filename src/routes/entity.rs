//! Generic REST resource for catalog entities
//!
//! Every entity gets the same seven endpoints under `/api/{path}` plus a search
//! endpoint under `/api/_search/{path}`. Handlers are generic over [`Entity`]
//! and registered once per entity by [`configure_entity`].

use actix_web::http::header::LOCATION;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use utoipa::IntoParams;

use super::headers;
use super::AppState;
use crate::auth::{Auth, AuthError};
use crate::db::{self, merge_patch, Entity, RepositoryError};
use crate::error::{AppError, AppResult};
use crate::models::{PageParams, Pageable};

/// Query parameters for `/api/_search/{path}`
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Text matched case-insensitively against the entity's text columns
    pub query: String,
}

/// Register the CRUD and search routes of `T`
pub fn configure_entity<T: Entity>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource(format!("/{}", T::PATH))
            .route(web::get().to(list_entities::<T>))
            .route(web::post().to(create_entity::<T>)),
    )
    .service(
        web::resource(format!("/{}/{{id}}", T::PATH))
            .route(web::get().to(get_entity::<T>))
            .route(web::put().to(update_entity::<T>))
            .route(web::patch().to(partial_update_entity::<T>))
            .route(web::delete().to(delete_entity::<T>)),
    )
    .service(
        web::resource(format!("/_search/{}", T::PATH)).route(web::get().to(search_entities::<T>)),
    );
}

/// Reference data may only be changed by administrators
fn check_write<T: Entity>(auth: &Auth) -> Result<(), AuthError> {
    if T::ADMIN_WRITES && !auth.is_admin() {
        return Err(AuthError::AccessDenied);
    }
    Ok(())
}

fn repository_error<T: Entity>(e: RepositoryError) -> AppError {
    AppError::from(e).for_entity(T::NAME)
}

fn invalid<T: Entity>(message: String) -> AppError {
    AppError::bad_request_alert(message, T::NAME, "validation")
}

/// Check the id in the body against the id in the path and that the row exists
async fn check_existing_id<T: Entity>(
    data: &AppState,
    path_id: i64,
    body_id: Option<i64>,
) -> AppResult<()> {
    let Some(body_id) = body_id else {
        return Err(AppError::bad_request_alert("Invalid id", T::NAME, "idnull"));
    };
    if body_id != path_id {
        return Err(AppError::bad_request_alert("Invalid ID", T::NAME, "idinvalid"));
    }
    if !db::exists_by_id::<T>(data.db.pool(), path_id)
        .await
        .map_err(repository_error::<T>)?
    {
        return Err(AppError::bad_request_alert("Entity not found", T::NAME, "idnotfound"));
    }
    Ok(())
}

/// POST /api/{path} - create a new entity
pub async fn create_entity<T: Entity>(
    data: web::Data<AppState>,
    auth: Auth,
    body: web::Json<T>,
) -> AppResult<HttpResponse> {
    check_write::<T>(&auth)?;
    debug!("REST request by {} to save {}", auth.login, T::NAME);

    let mut entity = body.into_inner();
    if entity.id().is_some() {
        return Err(AppError::bad_request_alert(
            format!("A new {} cannot already have an ID", T::NAME),
            T::NAME,
            "idexists",
        ));
    }
    entity.validate().map_err(invalid::<T>)?;
    entity.prepare_insert();

    let saved = db::insert(data.db.pool(), &entity)
        .await
        .map_err(repository_error::<T>)?;
    let id = saved.id().unwrap_or_default().to_string();

    Ok(headers::creation_alert(
        HttpResponse::Created().insert_header((LOCATION, format!("/api/{}/{}", T::PATH, id))),
        T::NAME,
        &id,
    )
    .json(saved))
}

/// PUT /api/{path}/{id} - replace an existing entity
pub async fn update_entity<T: Entity>(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<i64>,
    body: web::Json<T>,
) -> AppResult<HttpResponse> {
    check_write::<T>(&auth)?;
    let id = path.into_inner();
    debug!("REST request by {} to update {} {}", auth.login, T::NAME, id);

    let entity = body.into_inner();
    check_existing_id::<T>(&data, id, entity.id()).await?;
    entity.validate().map_err(invalid::<T>)?;

    let saved = db::update(data.db.pool(), &entity)
        .await
        .map_err(repository_error::<T>)?;

    Ok(headers::update_alert(&mut HttpResponse::Ok(), T::NAME, &id.to_string()).json(saved))
}

/// PATCH /api/{path}/{id} - update the properties present in the body
///
/// Absent and `null` properties keep their stored values.
pub async fn partial_update_entity<T: Entity>(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<i64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    check_write::<T>(&auth)?;
    let id = path.into_inner();
    debug!("REST request by {} to partially update {} {}", auth.login, T::NAME, id);

    let patch = body.into_inner();
    check_existing_id::<T>(&data, id, patch.get("id").and_then(Value::as_i64)).await?;

    let existing = db::find_by_id::<T>(data.db.pool(), id)
        .await
        .map_err(repository_error::<T>)?
        .ok_or_else(|| AppError::bad_request_alert("Entity not found", T::NAME, "idnotfound"))?;

    let merged = merge_patch(&existing, &patch)
        .map_err(|e| invalid::<T>(format!("Invalid {} payload: {}", T::NAME, e)))?;
    merged.validate().map_err(invalid::<T>)?;

    let saved = db::update(data.db.pool(), &merged)
        .await
        .map_err(repository_error::<T>)?;

    Ok(headers::update_alert(&mut HttpResponse::Ok(), T::NAME, &id.to_string()).json(saved))
}

/// GET /api/{path} - one page of entities
pub async fn list_entities<T: Entity>(
    req: HttpRequest,
    data: web::Data<AppState>,
    _auth: Auth,
    query: web::Query<PageParams>,
) -> AppResult<HttpResponse> {
    let pageable = Pageable::from_params(&query);
    let page = db::find_all::<T>(data.db.pool(), &pageable)
        .await
        .map_err(repository_error::<T>)?;

    Ok(headers::pagination(&mut HttpResponse::Ok(), &req, &page).json(&page.content))
}

/// GET /api/{path}/{id}
pub async fn get_entity<T: Entity>(
    data: web::Data<AppState>,
    _auth: Auth,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    match db::find_by_id::<T>(data.db.pool(), id)
        .await
        .map_err(repository_error::<T>)?
    {
        Some(entity) => Ok(HttpResponse::Ok().json(entity)),
        None => Err(AppError::not_found(format!("{} {} not found", T::NAME, id))),
    }
}

/// DELETE /api/{path}/{id}
pub async fn delete_entity<T: Entity>(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    check_write::<T>(&auth)?;
    let id = path.into_inner();

    let deleted = db::delete_by_id::<T>(data.db.pool(), id)
        .await
        .map_err(repository_error::<T>)?;
    debug!("REST request by {} to delete {} {}: deleted={}", auth.login, T::NAME, id, deleted);

    Ok(headers::deletion_alert(&mut HttpResponse::NoContent(), T::NAME, &id.to_string()).finish())
}

/// GET /api/_search/{path}?query= - paginated text search
pub async fn search_entities<T: Entity>(
    req: HttpRequest,
    data: web::Data<AppState>,
    _auth: Auth,
    search: web::Query<SearchQuery>,
    query: web::Query<PageParams>,
) -> AppResult<HttpResponse> {
    debug!("REST request to search for a page of {} for query {}", T::NAME, search.query);

    let pageable = Pageable::from_params(&query);
    let page = db::search::<T>(data.db.pool(), &search.query, &pageable)
        .await
        .map_err(repository_error::<T>)?;

    Ok(headers::pagination(&mut HttpResponse::Ok(), &req, &page).json(&page.content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Anime, Comment, Genre};
    use crate::routes::headers::ERROR_HEADER;
    use crate::routes::test_support::{bearer, test_app};
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::json;

    #[actix_rt::test]
    async fn test_list_without_token_is_unauthorized() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::get().uri("/api/animes").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_admin_entity_write_requires_admin() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::post()
            .uri("/api/genres")
            .insert_header(bearer("user", &["ROLE_USER"]))
            .set_json(json!({ "name": "Mecha" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn test_create_with_id_is_rejected() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::post()
            .uri("/api/animes")
            .insert_header(bearer("admin", &["ROLE_ADMIN", "ROLE_USER"]))
            .set_json(json!({ "id": 4, "title": "Mushishi" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers().get(ERROR_HEADER).unwrap(), "error.idexists");
    }

    #[actix_rt::test]
    async fn test_create_invalid_entity_is_rejected() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::post()
            .uri("/api/comments")
            .insert_header(bearer("user", &["ROLE_USER"]))
            .set_json(json!({ "animeId": 1, "userId": 2, "content": "" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_update_without_id_is_rejected() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::put()
            .uri("/api/genres/3")
            .insert_header(bearer("admin", &["ROLE_ADMIN"]))
            .set_json(json!({ "name": "Drama" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers().get(ERROR_HEADER).unwrap(), "error.idnull");
    }

    #[actix_rt::test]
    async fn test_update_with_mismatched_id_is_rejected() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::put()
            .uri("/api/genres/3")
            .insert_header(bearer("admin", &["ROLE_ADMIN"]))
            .set_json(json!({ "id": 4, "name": "Drama" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers().get(ERROR_HEADER).unwrap(), "error.idinvalid");
    }

    #[actix_rt::test]
    async fn test_patch_with_mismatched_id_is_rejected() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::patch()
            .uri("/api/comments/8")
            .insert_header(bearer("user", &["ROLE_USER"]))
            .set_json(json!({ "id": 9, "content": "edited" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers().get(ERROR_HEADER).unwrap(), "error.idinvalid");
    }

    #[actix_rt::test]
    async fn test_non_numeric_id_is_not_found() {
        let app = test::init_service(test_app()).await;

        let req = test::TestRequest::get()
            .uri("/api/animes/abc")
            .insert_header(bearer("user", &["ROLE_USER"]))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn test_check_write() {
        let user = Auth {
            login: "user".to_string(),
            authorities: ["ROLE_USER".to_string()].into_iter().collect(),
        };
        assert!(matches!(check_write::<Anime>(&user), Err(AuthError::AccessDenied)));
        assert!(matches!(check_write::<Genre>(&user), Err(AuthError::AccessDenied)));
        assert!(check_write::<Comment>(&user).is_ok());

        let admin = Auth {
            login: "admin".to_string(),
            authorities: ["ROLE_ADMIN".to_string()].into_iter().collect(),
        };
        assert!(check_write::<Anime>(&admin).is_ok());
        assert!(check_write::<Comment>(&admin).is_ok());
    }
}

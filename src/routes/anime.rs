//! Anime to genre links

use actix_web::{web, HttpResponse};
use tracing::debug;

use super::headers;
use super::AppState;
use crate::auth::{Auth, ROLE_ADMIN};
use crate::db::{self, Entity};
use crate::error::{AppError, AppResult};
use crate::models::{Anime, ApiError, Genre};

/// GET /api/animes/{id}/genres - genres linked to an anime
#[utoipa::path(
    get,
    path = "/api/animes/{id}/genres",
    tag = "anime",
    params(("id" = i64, Path, description = "Anime id")),
    responses(
        (status = 200, description = "Genres of the anime", body = Vec<Genre>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 404, description = "Anime not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_anime_genres(
    data: web::Data<AppState>,
    _auth: Auth,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let anime_id = path.into_inner();
    let pool = data.db.pool();

    if !db::exists_by_id::<Anime>(pool, anime_id).await? {
        return Err(AppError::not_found(format!("anime {} not found", anime_id)));
    }

    let genres = db::get_anime_genres(pool, anime_id).await?;
    Ok(HttpResponse::Ok().json(genres))
}

/// PUT /api/animes/{id}/genres - replace the genres linked to an anime
#[utoipa::path(
    put,
    path = "/api/animes/{id}/genres",
    tag = "anime",
    params(("id" = i64, Path, description = "Anime id")),
    request_body = Vec<i64>,
    responses(
        (status = 200, description = "Genres replaced", body = Vec<Genre>),
        (status = 400, description = "Unknown genre id", body = ApiError),
        (status = 403, description = "Not an administrator", body = ApiError),
        (status = 404, description = "Anime not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn set_anime_genres(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<i64>,
    body: web::Json<Vec<i64>>,
) -> AppResult<HttpResponse> {
    auth.require(ROLE_ADMIN)?;
    let anime_id = path.into_inner();
    let genre_ids = body.into_inner();
    debug!("REST request to set genres {:?} of anime {}", genre_ids, anime_id);

    let genres = db::set_anime_genres(data.db.pool(), anime_id, &genre_ids)
        .await
        .map_err(|e| AppError::from(e).for_entity(<Anime as Entity>::NAME))?;

    Ok(
        headers::update_alert(&mut HttpResponse::Ok(), <Anime as Entity>::NAME, &anime_id.to_string())
            .json(genres),
    )
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/animes/{id}/genres")
            .route(web::get().to(get_anime_genres))
            .route(web::put().to(set_anime_genres)),
    );
}

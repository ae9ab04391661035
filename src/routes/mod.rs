//! API Routes module for the Anime Catalog API
//!
//! - `entity`: generic CRUD + search resources for every catalog entity
//! - `anime`: anime to genre links
//! - `account`: registration, login and the current user's account
//! - `admin`: user administration and authorities
//! - `headers`: alert and pagination headers

pub mod account;
pub mod admin;
pub mod anime;
pub mod entity;
pub mod headers;

use actix_web::web;
use utoipa::openapi::path::{HttpMethod, Operation, OperationBuilder, ParameterBuilder, ParameterIn, PathItem};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityRequirement, SecurityScheme};
use utoipa::openapi::{Required, Response};
use utoipa::{Modify, OpenApi};

use crate::config::Config;
use crate::db::{Database, Entity};
use crate::email::EmailService;
use crate::error::AppError;
use crate::models::{
    AdminUserDto, Anime, AnimeStatus, AnimeType, ApiError, Character, CharacterRole, Comment,
    Episode, Favorite, Genre, JwtToken, KeyAndPasswordVm, LoginVm, ManagedUserVm,
    PasswordChangeDto, Review, Season, SeasonOfYear, Studio, UserDto, UserProfile, WatchHistory,
};
use crate::service::UserService;

pub use entity::configure_entity;

/// Application state shared across handlers
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub user_service: UserService,
    /// `None` when SMTP is not configured; mails are then skipped with a warning
    pub email_service: Option<EmailService>,
}

/// Registers the bearer token scheme referenced by the operations
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Documents the generic entity resources, which cannot carry `#[utoipa::path]`
struct EntityPaths;

impl Modify for EntityPaths {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        document_entity::<Anime>(openapi);
        document_entity::<Season>(openapi);
        document_entity::<Episode>(openapi);
        document_entity::<Character>(openapi);
        document_entity::<Genre>(openapi);
        document_entity::<Studio>(openapi);
        document_entity::<Comment>(openapi);
        document_entity::<Favorite>(openapi);
        document_entity::<WatchHistory>(openapi);
        document_entity::<UserProfile>(openapi);
        document_entity::<Review>(openapi);
    }
}

fn entity_operation<T: Entity>(summary: String, with_id: bool, responses: &[(&str, &str)]) -> Operation {
    let mut builder = OperationBuilder::new()
        .tag(T::NAME)
        .summary(Some(summary))
        .security(SecurityRequirement::new("bearer_auth", Vec::<String>::new()));

    if with_id {
        builder = builder.parameter(
            ParameterBuilder::new()
                .name("id")
                .parameter_in(ParameterIn::Path)
                .required(Required::True)
                .build(),
        );
    }

    for (status, description) in responses {
        builder = builder.response(*status, Response::new(*description));
    }
    builder.build()
}

fn document_entity<T: Entity>(openapi: &mut utoipa::openapi::OpenApi) {
    let write_denied = if T::ADMIN_WRITES {
        ("403", "Not an administrator")
    } else {
        ("401", "Not authenticated")
    };

    let mut collection = PathItem::new(
        HttpMethod::Get,
        entity_operation::<T>(
            format!("Get a page of {}", T::PATH),
            false,
            &[("200", "Page of entities with X-Total-Count and Link headers"), ("400", "Unknown sort property")],
        ),
    );
    collection.post = Some(entity_operation::<T>(
        format!("Create a {}", T::NAME),
        false,
        &[("201", "Created"), ("400", "Id set, invalid data or constraint violation"), write_denied],
    ));

    let mut item = PathItem::new(
        HttpMethod::Get,
        entity_operation::<T>(format!("Get a {}", T::NAME), true, &[("200", "Found"), ("404", "Not found")]),
    );
    item.put = Some(entity_operation::<T>(
        format!("Update a {}", T::NAME),
        true,
        &[("200", "Updated"), ("400", "Id missing, mismatched or unknown"), write_denied],
    ));
    item.patch = Some(entity_operation::<T>(
        format!("Partially update a {}", T::NAME),
        true,
        &[("200", "Updated"), ("400", "Id missing, mismatched or unknown"), write_denied],
    ));
    item.delete = Some(entity_operation::<T>(
        format!("Delete a {}", T::NAME),
        true,
        &[("204", "Deleted"), write_denied],
    ));

    let search = PathItem::new(
        HttpMethod::Get,
        entity_operation::<T>(
            format!("Search {}", T::PATH),
            false,
            &[("200", "Page of matches with X-Total-Count and Link headers")],
        ),
    );

    let paths = &mut openapi.paths.paths;
    paths.insert(format!("/api/{}", T::PATH), collection);
    paths.insert(format!("/api/{}/{{id}}", T::PATH), item);
    paths.insert(format!("/api/_search/{}", T::PATH), search);
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Anime Catalog API",
        version = "0.1.0",
        description = "Catalog of anime titles, seasons, episodes and characters with user comments, favorites, reviews and watch history",
        license(
            name = "MIT"
        )
    ),
    paths(
        account::register_account,
        account::activate_account,
        account::authorize,
        account::is_authenticated,
        account::logout,
        account::get_account,
        account::save_account,
        account::change_password,
        account::request_password_reset,
        account::finish_password_reset,
        admin::create_user,
        admin::update_user,
        admin::get_all_users,
        admin::get_user,
        admin::delete_user,
        admin::get_authorities,
        admin::get_public_users,
        anime::get_anime_genres,
        anime::set_anime_genres
    ),
    components(
        schemas(
            Anime,
            AnimeType,
            AnimeStatus,
            Season,
            SeasonOfYear,
            Episode,
            Character,
            CharacterRole,
            Genre,
            Studio,
            Comment,
            Favorite,
            WatchHistory,
            UserProfile,
            Review,
            AdminUserDto,
            UserDto,
            ManagedUserVm,
            LoginVm,
            JwtToken,
            PasswordChangeDto,
            KeyAndPasswordVm,
            ApiError
        )
    ),
    modifiers(&SecurityAddon, &EntityPaths),
    tags(
        (name = "account", description = "Registration, login and the current account"),
        (name = "user-management", description = "User administration"),
        (name = "anime", description = "Anime titles and their genres")
    )
)]
pub struct ApiDoc;

/// Report malformed JSON bodies in the common error envelope
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        AppError::validation(format!("Invalid JSON payload: {}", err)).into()
    })
}

/// Configure API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(json_config())
            .configure(account::configure)
            .configure(admin::configure)
            .configure(anime::configure)
            .configure(configure_entity::<Anime>)
            .configure(configure_entity::<Season>)
            .configure(configure_entity::<Episode>)
            .configure(configure_entity::<Character>)
            .configure(configure_entity::<Genre>)
            .configure(configure_entity::<Studio>)
            .configure(configure_entity::<Comment>)
            .configure(configure_entity::<Favorite>)
            .configure(configure_entity::<WatchHistory>)
            .configure(configure_entity::<UserProfile>)
            .configure(configure_entity::<Review>),
    );
}

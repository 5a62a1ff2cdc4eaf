use std::sync::Arc;

use axum::{
    extract::FromRef,
    routing::{get, post, put},
    Router,
};

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod posts;
pub mod response;
pub mod social;
pub mod store;
pub mod users;

use config::settings::Settings;
use store::{DynStore, Store};

#[derive(Clone)]
pub struct AppState {
    store: DynStore,
    settings: Settings,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, settings: Settings) -> Self {
        Self { store, settings }
    }
}

impl FromRef<AppState> for DynStore {
    fn from_ref(app_state: &AppState) -> DynStore {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for Settings {
    fn from_ref(app_state: &AppState) -> Settings {
        app_state.settings.clone()
    }
}

pub fn app(app_state: AppState) -> Router {
    let auth_router = Router::new()
        .route("/register", post(auth::handler::register))
        .route("/login", post(auth::handler::login))
        .route("/me", get(auth::handler::get_me));

    let post_router = Router::new()
        .route(
            "/",
            post(posts::handler::create_post).get(posts::handler::get_posts),
        )
        .route("/feed", get(posts::handler::get_feed))
        .route(
            "/:id",
            put(posts::handler::update_post).delete(posts::handler::delete_post),
        )
        .route("/:id/like", post(posts::handler::toggle_like));

    let user_router = Router::new()
        .route("/profile", put(users::handler::update_profile))
        .route("/search/:query", get(users::handler::search_users))
        .route("/:username", get(users::handler::get_profile))
        .route("/:username/follow", post(users::handler::toggle_follow));

    Router::new()
        .route("/", get(|| async { "MicroBlog API" }))
        .nest("/api/auth", auth_router)
        .nest("/api/posts", post_router)
        .nest("/api/users", user_router)
        .with_state(app_state)
}

pub mod auth;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod posts;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use tracing::error;

use pinboard_db::Store;

use crate::auth::{AuthConfig, AuthService};
use crate::error::ApiError;
use crate::posts::PostService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub auth: AuthService,
    pub posts: PostService,
}

impl AppStateInner {
    pub fn new(store: Arc<Store>, auth: &AuthConfig) -> anyhow::Result<AppState> {
        Ok(Arc::new(Self {
            auth: AuthService::new(store.clone(), auth)?,
            posts: PostService::new(store),
        }))
    }
}

/// All HTTP routes. `GET /posts`, `/register` and `/login` are public; every
/// other route goes through [`middleware::require_auth`].
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/posts", get(posts::list_posts));

    let protected_routes = Router::new()
        .route("/posts", post(posts::create_post))
        .route("/posts/{post_id}", put(posts::edit_post))
        .route("/posts/{post_id}/like", post(posts::like_post))
        .route("/posts/{post_id}/comment", post(posts::comment_post))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Run storage and hashing work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> error::Result<T>
where
    F: FnOnce() -> error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.into())
    })?
}

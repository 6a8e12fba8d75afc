use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{debug, info};

use pinboard_db::{Store, next_id};
use pinboard_types::api::{Claims, CommentRequest, MessageResponse, PostContentRequest};
use pinboard_types::models::{Comment, Post, PostId, Role};

use crate::error::{ApiError, Result};
use crate::extract::ApiJson;
use crate::{AppState, run_blocking};

const GUEST_CANNOT_POST: &str = "Guests cannot create posts... Not Allowed";
const GUEST_CANNOT_COMMENT: &str = "Guests cannot comment";
const NOT_OWNER: &str = "Not authorized";

/// Post creation, listing and mutation with role/ownership checks.
///
/// Post ids arrive as raw path text. Text that is not an integer never
/// matches a post and is reported as not found.
pub struct PostService {
    store: Arc<Store>,
}

impl PostService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn create_post(&self, claims: &Claims, content: String) -> Result<Post> {
        if claims.role == Role::Guest {
            return Err(ApiError::Forbidden(GUEST_CANNOT_POST));
        }

        self.store.update(|posts: &mut Vec<Post>| {
            let post = Post {
                id: next_id(posts)?,
                user_id: claims.id,
                content,
                likes: 0,
                comments: vec![],
                timestamp: Utc::now(),
            };
            posts.push(post.clone());
            Ok(post)
        })
    }

    pub fn list_posts(&self) -> Result<Vec<Post>> {
        Ok(self.store.read::<Post>()?)
    }

    /// Replace a post's content. Only the owner or an admin may edit.
    pub fn edit_post(&self, claims: &Claims, post_id: &str, content: String) -> Result<Post> {
        self.store.update(|posts: &mut Vec<Post>| {
            let post = find_post_mut(posts, post_id)?;
            if post.user_id != claims.id && claims.role != Role::Admin {
                return Err(ApiError::Forbidden(NOT_OWNER));
            }

            post.content = content;
            Ok(post.clone())
        })
    }

    /// Add one like. Any authenticated caller may like any post, any number
    /// of times. Returns the new like count.
    pub fn like_post(&self, post_id: &str) -> Result<u64> {
        self.store.update(|posts: &mut Vec<Post>| {
            let post = find_post_mut(posts, post_id)?;
            post.likes += 1;
            Ok(post.likes)
        })
    }

    pub fn comment_post(&self, claims: &Claims, post_id: &str, comment: String) -> Result<()> {
        if claims.role == Role::Guest {
            return Err(ApiError::Forbidden(GUEST_CANNOT_COMMENT));
        }

        self.store.update(|posts: &mut Vec<Post>| {
            let post = find_post_mut(posts, post_id)?;
            post.comments.push(Comment {
                user_id: claims.id,
                comment,
            });
            Ok(())
        })
    }
}

fn find_post_mut<'a>(posts: &'a mut [Post], post_id: &str) -> Result<&'a mut Post> {
    let id: PostId = post_id.parse().map_err(|_| ApiError::PostNotFound)?;
    posts
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or(ApiError::PostNotFound)
}

/// POST /posts
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<PostContentRequest>,
) -> Result<impl IntoResponse> {
    let post = run_blocking(move || state.posts.create_post(&claims, req.content)).await?;
    info!("User {} created post {}", post.user_id, post.id);

    Ok((StatusCode::CREATED, Json(MessageResponse::new("New Post created"))))
}

/// GET /posts
pub async fn list_posts(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let posts = run_blocking(move || state.posts.list_posts()).await?;
    Ok(Json(posts))
}

/// PUT /posts/{post_id}
pub async fn edit_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<PostContentRequest>,
) -> Result<impl IntoResponse> {
    let editor = claims.id;
    let post = run_blocking(move || state.posts.edit_post(&claims, &post_id, req.content)).await?;
    info!("User {} edited post {}", editor, post.id);

    Ok(Json(MessageResponse::new("Post updated")))
}

/// POST /posts/{post_id}/like
pub async fn like_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let likes = {
        let post_id = post_id.clone();
        run_blocking(move || state.posts.like_post(&post_id)).await?
    };
    debug!("User {} liked post {} ({} likes)", claims.id, post_id, likes);

    Ok(Json(MessageResponse::new("Post liked")))
}

/// POST /posts/{post_id}/comment
pub async fn comment_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CommentRequest>,
) -> Result<impl IntoResponse> {
    let author = claims.id;
    let target = post_id.clone();
    run_blocking(move || state.posts.comment_post(&claims, &post_id, req.comment)).await?;
    info!("User {} commented on post {}", author, target);

    Ok(Json(MessageResponse::new("Comment added")))
}

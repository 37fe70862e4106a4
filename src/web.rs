//! HTTP surface: bearer login and sign-up, a `/me` view of effective
//! grants, and CRUD for permissions, roles and users. Every management route
//! is gated on a permission code checked through `rbac::guard`.
use crate::auth;
use crate::rbac::errors::{EntityKind, RbacError};
use crate::rbac::{effective_permissions, effective_roles, guard, manage};
use crate::settings::Settings;
use crate::storage::{self, NewRole, NewUser, PermissionPatch, RolePatch, User, UserPatch};
use crate::users;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: DatabaseConnection,
}

// Security headers middleware
async fn security_headers(request: Request, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    // Responses carry account data and grants
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );

    response
}

/// JSON request body whose rejections use the API error format.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = RbacError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| RbacError::InvalidInput(rejection.body_text()))?;
        Ok(JsonBody(value))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/token", post(issue_token))
        .route("/auth/register", post(register))
        .route("/auth/logout", post(logout))
        .route("/me", get(me))
        .route(
            "/permissions",
            get(list_permissions)
                .post(create_permission)
                .delete(delete_all_permissions),
        )
        .route(
            "/permissions/{id}",
            get(get_permission)
                .put(update_permission)
                .delete(delete_permission),
        )
        .route(
            "/roles",
            get(list_roles).post(create_role).delete(delete_all_roles),
        )
        .route(
            "/roles/{id}",
            get(get_role).put(update_role).delete(delete_role),
        )
        .route("/roles/{id}/permissions", patch(add_role_permissions))
        .route(
            "/roles/{id}/permissions/remove",
            patch(remove_role_permissions),
        )
        .route("/roles/{id}/inherit", patch(add_inherited_role))
        .route("/roles/{id}/inherit/remove", patch(remove_inherited_role))
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{id}/roles", patch(add_user_roles))
        .route("/users/{id}/roles/remove", patch(remove_user_roles))
        .route("/users/{id}/permissions", patch(add_user_permissions))
        .route(
            "/users/{id}/permissions/remove",
            patch(remove_user_permissions),
        )
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

pub async fn serve(settings: Settings, db: DatabaseConnection) -> miette::Result<()> {
    let addr: SocketAddr = settings
        .listen_addr()
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let state = AppState {
        settings: Arc::new(settings),
        db,
    };

    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    tracing::info!(%addr, "rolegate listening");
    axum::serve(listener, router(state)).await.into_diagnostic()?;
    Ok(())
}

/// Resolves the bearer token to a user.
async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User, RbacError> {
    let token = auth::bearer_token(headers)
        .ok_or_else(|| RbacError::Unauthenticated("missing bearer token".into()))?;
    auth::authenticate(&state.db, token).await
}

/// Authenticates the caller and requires `code` among their effective permissions.
async fn gate(state: &AppState, headers: &HeaderMap, code: &str) -> Result<User, RbacError> {
    let user = current_user(state, headers).await?;
    if let Err(err) = guard::ensure_permission(&state.db, &user, code).await {
        tracing::info!(user_id = %user.id, permission = %code, "Denied request");
        return Err(err);
    }
    Ok(user)
}

fn object_id(kind: EntityKind, id: &str) -> Result<(), RbacError> {
    if storage::is_object_id(id) {
        Ok(())
    } else {
        Err(RbacError::InvalidInput(format!("`{id}` is not a valid {kind} id")))
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// Authentication

#[derive(Debug, Deserialize)]
struct TokenRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: i64,
    expires_at: i64,
}

async fn issue_token(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TokenRequest>,
) -> Result<Json<TokenResponse>, RbacError> {
    let ttl = state.settings.auth.token_ttl_secs;
    let (_user, issued) = auth::login(&state.db, &req.email, &req.password, ttl).await?;

    Ok(Json(TokenResponse {
        access_token: issued.token,
        token_type: "Bearer",
        expires_in: ttl,
        expires_at: issued.expires_at,
    }))
}

#[derive(Debug, Serialize)]
struct RegisteredResponse {
    #[serde(flatten)]
    token: TokenResponse,
    user: User,
}

async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<auth::Registration>,
) -> Result<impl IntoResponse, RbacError> {
    let ttl = state.settings.auth.token_ttl_secs;
    let (user, issued) = auth::register(&state.db, req, ttl).await?;

    let response = RegisteredResponse {
        token: TokenResponse {
            access_token: issued.token,
            token_type: "Bearer",
            expires_in: ttl,
            expires_at: issued.expires_at,
        },
        user,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, RbacError> {
    let token = auth::bearer_token(&headers)
        .ok_or_else(|| RbacError::Unauthenticated("missing bearer token".into()))?;
    auth::logout(&state.db, token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct MeResponse {
    user: User,
    roles: Vec<String>,
    permissions: Vec<String>,
}

async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, RbacError> {
    let user = current_user(&state, &headers).await?;

    let mut roles: Vec<String> = effective_roles(&state.db, &user).await?.into_iter().collect();
    roles.sort();
    let mut permissions: Vec<String> = effective_permissions(&state.db, &user)
        .await?
        .into_iter()
        .collect();
    permissions.sort();

    Ok(Json(MeResponse {
        user,
        roles,
        permissions,
    }))
}

// Permissions

#[derive(Debug, Deserialize)]
struct CreatePermissionRequest {
    code: String,
    #[serde(default)]
    description: String,
}

async fn list_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "permission:list").await?;
    Ok(Json(manage::list_permissions(&state.db).await?))
}

async fn create_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<CreatePermissionRequest>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "permission:create").await?;
    let permission = manage::create_permission(&state.db, &req.code, &req.description).await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

async fn delete_all_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, RbacError> {
    gate(&state, &headers, "permission:delete").await?;
    manage::delete_all_permissions(&state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "permission:read").await?;
    object_id(EntityKind::Permission, &id)?;
    Ok(Json(manage::get_permission(&state.db, &id).await?))
}

async fn update_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<PermissionPatch>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "permission:update").await?;
    object_id(EntityKind::Permission, &id)?;
    Ok(Json(manage::update_permission(&state.db, &id, patch).await?))
}

async fn delete_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, RbacError> {
    gate(&state, &headers, "permission:delete").await?;
    object_id(EntityKind::Permission, &id)?;
    manage::delete_permission(&state.db, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Roles

#[derive(Debug, Deserialize)]
struct PermissionCodes {
    permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RoleName {
    role: String,
}

async fn list_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "role:list").await?;
    Ok(Json(manage::list_roles(&state.db).await?))
}

async fn create_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(input): JsonBody<NewRole>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "role:create").await?;
    let role = manage::create_role(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

async fn delete_all_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, RbacError> {
    gate(&state, &headers, "role:delete").await?;
    manage::delete_all_roles(&state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "role:read").await?;
    object_id(EntityKind::Role, &id)?;
    Ok(Json(manage::get_role(&state.db, &id).await?))
}

async fn update_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<RolePatch>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "role:update").await?;
    object_id(EntityKind::Role, &id)?;
    Ok(Json(manage::update_role(&state.db, &id, patch).await?))
}

async fn delete_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, RbacError> {
    gate(&state, &headers, "role:delete").await?;
    object_id(EntityKind::Role, &id)?;
    manage::delete_role(&state.db, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_role_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<PermissionCodes>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "role:assign_permissions").await?;
    object_id(EntityKind::Role, &id)?;
    Ok(Json(
        manage::add_permissions_to_role(&state.db, &id, &req.permissions).await?,
    ))
}

async fn remove_role_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<PermissionCodes>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "role:remove_permissions").await?;
    object_id(EntityKind::Role, &id)?;
    Ok(Json(
        manage::remove_permissions_from_role(&state.db, &id, &req.permissions).await?,
    ))
}

async fn add_inherited_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<RoleName>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "role:assign_inherited_role").await?;
    object_id(EntityKind::Role, &id)?;
    Ok(Json(manage::add_inherited_role(&state.db, &id, &req.role).await?))
}

async fn remove_inherited_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<RoleName>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "role:remove_inherited_role").await?;
    object_id(EntityKind::Role, &id)?;
    Ok(Json(
        manage::remove_inherited_role(&state.db, &id, &req.role).await?,
    ))
}

// Users

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    skip: u64,
    #[serde(default = "default_limit")]
    limit: u64,
}

fn default_limit() -> u64 {
    users::DEFAULT_PAGE_SIZE
}

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "user:list").await?;
    Ok(Json(users::list_users(&state.db, page.skip, page.limit).await?))
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(input): JsonBody<NewUser>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "user:create").await?;
    let user = users::create_user(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "user:read").await?;
    object_id(EntityKind::User, &id)?;
    Ok(Json(users::get_user(&state.db, &id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<UserPatch>,
) -> Result<impl IntoResponse, RbacError> {
    let caller = gate(&state, &headers, "user:update").await?;
    // Replacing grants needs the same rights as the grant-edit routes
    if patch.roles.is_some() {
        guard::ensure_permission(&state.db, &caller, "user:assign_roles").await?;
    }
    if patch.permissions.is_some() {
        guard::ensure_permission(&state.db, &caller, "user:assign_permissions").await?;
    }
    object_id(EntityKind::User, &id)?;
    Ok(Json(users::update_user(&state.db, &id, patch).await?))
}

#[derive(Debug, Deserialize)]
struct RoleNames {
    roles: Vec<String>,
}

async fn add_user_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<RoleNames>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "user:assign_roles").await?;
    object_id(EntityKind::User, &id)?;
    Ok(Json(users::add_roles_to_user(&state.db, &id, &req.roles).await?))
}

async fn remove_user_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<RoleNames>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "user:remove_roles").await?;
    object_id(EntityKind::User, &id)?;
    Ok(Json(
        users::remove_roles_from_user(&state.db, &id, &req.roles).await?,
    ))
}

async fn add_user_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<PermissionCodes>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "user:assign_permissions").await?;
    object_id(EntityKind::User, &id)?;
    Ok(Json(
        users::add_permissions_to_user(&state.db, &id, &req.permissions).await?,
    ))
}

async fn remove_user_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<PermissionCodes>,
) -> Result<impl IntoResponse, RbacError> {
    gate(&state, &headers, "user:remove_permissions").await?;
    object_id(EntityKind::User, &id)?;
    Ok(Json(
        users::remove_permissions_from_user(&state.db, &id, &req.permissions).await?,
    ))
}

async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, RbacError> {
    gate(&state, &headers, "user:delete").await?;
    object_id(EntityKind::User, &id)?;
    users::delete_user(&state.db, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

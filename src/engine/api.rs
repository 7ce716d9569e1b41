//! Rolegate API Module
//! REST surface over the role service, with OpenAPI documentation

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use utoipa::OpenApi;

use crate::engine::rbac::{
    Module, RegistryError, RoleError, RoleId, RoleInput, RoleService, RoleUpdate, RoleView,
};

#[derive(Clone)]
pub struct ApiState {
    pub roles: Arc<RoleService>,
}

impl ApiState {
    pub fn new(roles: RoleService) -> Self {
        Self {
            roles: Arc::new(roles),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_modules,
        list_roles,
        create_role,
        get_role,
        replace_role,
        update_role,
        delete_role,
    ),
    tags(
        (name = "modules", description = "Module registry"),
        (name = "roles", description = "Roles and their module access"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/openapi.json", get(openapi))
        .route("/api/modules", get(list_modules))
        .route("/api/roles", get(list_roles).post(create_role))
        .route(
            "/api/roles/{id}",
            get(get_role)
                .put(replace_role)
                .patch(update_role)
                .delete(delete_role),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response. Validation failures list every offending field; internal
/// failures return a generic message and are logged.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": code, "message": message.into() }),
        }
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "Internal server error",
        )
    }
}

impl From<RoleError> for ApiError {
    fn from(err: RoleError) -> Self {
        match err {
            RoleError::Decode(e) => ApiError {
                status: StatusCode::BAD_REQUEST,
                body: json!({ "error": "validation", "fields": e.errors }),
            },
            RoleError::InvalidName(msg) => ApiError {
                status: StatusCode::BAD_REQUEST,
                body: json!({
                    "error": "validation",
                    "fields": [{ "field": "name", "kind": "invalid_name", "message": msg }],
                }),
            },
            RoleError::NotFound(id) => {
                ApiError::new(StatusCode::NOT_FOUND, "not_found", format!("Role {id} not found"))
            }
            RoleError::NameTaken(name) => ApiError::new(
                StatusCode::CONFLICT,
                "name_taken",
                format!("Role name {name:?} is already taken"),
            ),
            RoleError::Registry(RegistryError::ModuleNotFound(name)) => ApiError::new(
                StatusCode::NOT_FOUND,
                "module_not_found",
                format!("Module {name} not found"),
            ),
            other => {
                if other.is_configuration_error() {
                    error!(error = %other, "permission configuration error");
                } else {
                    error!(error = %other, "role storage error");
                }
                ApiError::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Run a role service call off the async runtime
async fn with_roles<T, F>(state: &ApiState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&RoleService) -> Result<T, RoleError> + Send + 'static,
    T: Send + 'static,
{
    let roles = Arc::clone(&state.roles);
    tokio::task::spawn_blocking(move || f(&roles))
        .await
        .map_err(|e| {
            error!(error = %e, "role service task failed");
            ApiError::internal()
        })?
        .map_err(ApiError::from)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/api/modules",
    responses(
        (status = 200, description = "Registered modules and their resource types", body = Value)
    ),
    tag = "modules"
)]
async fn list_modules(State(state): State<ApiState>) -> Result<Json<Vec<Module>>, ApiError> {
    let registry = with_roles(&state, |roles| roles.registry()).await?;
    Ok(Json(registry.modules().cloned().collect()))
}

#[utoipa::path(
    get,
    path = "/api/roles",
    responses(
        (status = 200, description = "All roles with their access", body = Value)
    ),
    tag = "roles"
)]
async fn list_roles(State(state): State<ApiState>) -> Result<Json<Vec<RoleView>>, ApiError> {
    with_roles(&state, |roles| roles.list_roles()).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/api/roles",
    request_body = Value,
    responses(
        (status = 201, description = "Role created", body = Value),
        (status = 400, description = "Invalid name or access payload", body = Value),
        (status = 409, description = "Role name taken", body = Value)
    ),
    tag = "roles"
)]
async fn create_role(
    State(state): State<ApiState>,
    Json(input): Json<RoleInput>,
) -> Result<(StatusCode, Json<RoleView>), ApiError> {
    let role = with_roles(&state, move |roles| roles.create_role(input)).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/api/roles/{id}",
    params(
        ("id" = i64, Path, description = "Role ID"),
    ),
    responses(
        (status = 200, description = "Role with its access", body = Value),
        (status = 404, description = "Role not found", body = Value)
    ),
    tag = "roles"
)]
async fn get_role(
    State(state): State<ApiState>,
    Path(id): Path<RoleId>,
) -> Result<Json<RoleView>, ApiError> {
    with_roles(&state, move |roles| roles.get_role(id)).await.map(Json)
}

#[utoipa::path(
    put,
    path = "/api/roles/{id}",
    params(
        ("id" = i64, Path, description = "Role ID"),
    ),
    request_body = Value,
    responses(
        (status = 200, description = "Role replaced", body = Value),
        (status = 400, description = "Invalid name or access payload", body = Value),
        (status = 404, description = "Role not found", body = Value)
    ),
    tag = "roles"
)]
async fn replace_role(
    State(state): State<ApiState>,
    Path(id): Path<RoleId>,
    Json(input): Json<RoleInput>,
) -> Result<Json<RoleView>, ApiError> {
    let update = RoleUpdate {
        name: Some(input.name),
        access: input.access,
    };
    with_roles(&state, move |roles| roles.update_role(id, update)).await.map(Json)
}

#[utoipa::path(
    patch,
    path = "/api/roles/{id}",
    params(
        ("id" = i64, Path, description = "Role ID"),
    ),
    request_body = Value,
    responses(
        (status = 200, description = "Role updated", body = Value),
        (status = 400, description = "Invalid name or access payload", body = Value),
        (status = 404, description = "Role not found", body = Value)
    ),
    tag = "roles"
)]
async fn update_role(
    State(state): State<ApiState>,
    Path(id): Path<RoleId>,
    Json(update): Json<RoleUpdate>,
) -> Result<Json<RoleView>, ApiError> {
    with_roles(&state, move |roles| roles.update_role(id, update)).await.map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/roles/{id}",
    params(
        ("id" = i64, Path, description = "Role ID"),
    ),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found", body = Value)
    ),
    tag = "roles"
)]
async fn delete_role(
    State(state): State<ApiState>,
    Path(id): Path<RoleId>,
) -> Result<StatusCode, ApiError> {
    with_roles(&state, move |roles| roles.delete_role(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

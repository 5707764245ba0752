use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Bearer token accepted from clients that have not logged in.
pub const API_KEY: &str = "jooycar";
pub const DEMO_EMAIL: &str = "demo@example.com";
pub const DEMO_PASSWORD: &str = "secret";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub brand_id: u64,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateBrand {
    pub name: String,
}

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
}

pub struct Store {
    brands: BTreeMap<u64, Brand>,
    models: Vec<Model>,
    sessions: HashSet<String>,
    next_id: u64,
}

impl Default for Store {
    fn default() -> Self {
        let brands = [(1, "Fiat"), (2, "Ford")]
            .into_iter()
            .map(|(id, name)| (id, Brand { id, name: name.to_string() }))
            .collect();
        let models = [(1, "Uno"), (1, "Punto"), (2, "Focus")]
            .into_iter()
            .map(|(brand_id, name)| Model {
                brand_id,
                name: name.to_string(),
            })
            .collect();
        Self {
            brands,
            models,
            sessions: HashSet::new(),
            next_id: 3,
        }
    }
}

pub type Db = Arc<RwLock<Store>>;

type ApiError = (StatusCode, Json<Value>);

fn error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Public,
    User,
}

/// The resource catalog served to clients on bootstrap. The `broken` entry
/// has neither a command nor a module and must be skipped by clients.
pub fn catalog() -> Value {
    json!({ "endpoints": [
        { "model": "brand", "action": "list", "command": "brands" },
        { "model": "brand", "action": "get", "command": "brands/:id" },
        { "model": "brand", "action": "create", "command": "brands", "method": "POST" },
        { "model": "models", "command": "brands/:brandId/models" },
        { "model": "broken", "method": "GET" },
    ]})
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/api/v1/core/resources", get(resources))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/core/brands", get(list_brands).post(create_brand))
        .route("/api/v1/core/brands/{id}", get(get_brand))
        .route("/api/v1/core/brands/{id}/models", get(list_models))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn authorize(db: &Db, headers: &HeaderMap) -> Result<Access, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "missing bearer token"))?;
    if token == API_KEY {
        return Ok(Access::Public);
    }
    if db.read().await.sessions.contains(token) {
        return Ok(Access::User);
    }
    tracing::debug!(token, "rejected unknown token");
    Err(error(StatusCode::UNAUTHORIZED, "unknown token"))
}

async fn resources(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&db, &headers).await?;
    Ok(Json(catalog()))
}

async fn login(State(db): State<Db>, Json(input): Json<Credentials>) -> Result<Json<Session>, ApiError> {
    if input.email != DEMO_EMAIL || input.password != DEMO_PASSWORD {
        tracing::debug!(email = %input.email, "login rejected");
        return Err(error(StatusCode::UNAUTHORIZED, "invalid credentials"));
    }
    let token = Uuid::new_v4().to_string();
    db.write().await.sessions.insert(token.clone());
    tracing::info!(email = %input.email, "session opened");
    Ok(Json(Session { token }))
}

async fn list_brands(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Vec<Brand>>, ApiError> {
    authorize(&db, &headers).await?;
    Ok(Json(db.read().await.brands.values().cloned().collect()))
}

async fn get_brand(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Brand>, ApiError> {
    authorize(&db, &headers).await?;
    let store = db.read().await;
    store
        .brands
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "brand not found"))
}

/// Creating brands needs a logged-in session.
async fn create_brand(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateBrand>,
) -> Result<(StatusCode, Json<Brand>), ApiError> {
    if authorize(&db, &headers).await? != Access::User {
        return Err(error(StatusCode::FORBIDDEN, "login required"));
    }
    let mut store = db.write().await;
    let brand = Brand {
        id: store.next_id,
        name: input.name,
    };
    store.next_id += 1;
    store.brands.insert(brand.id, brand.clone());
    Ok((StatusCode::CREATED, Json(brand)))
}

async fn list_models(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Vec<Model>>, ApiError> {
    authorize(&db, &headers).await?;
    let store = db.read().await;
    if !store.brands.contains_key(&id) {
        return Err(error(StatusCode::NOT_FOUND, "brand not found"));
    }
    Ok(Json(store.models.iter().filter(|m| m.brand_id == id).cloned().collect()))
}

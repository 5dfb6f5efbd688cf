use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::Method,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use directorio_store::{Client, ClientFields, Database, HistoryEntry, Identity, Role};

use crate::auth;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::logo_store::{sanitized_extension, LogoStore};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub logo_store: Arc<LogoStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Lock the store.  Guards are only held for the duration of a single
    /// synchronous store call; never across an await point.
    pub(crate) fn db(&self) -> Result<MutexGuard<'_, Database>, ServerError> {
        self.db
            .lock()
            .map_err(|_| ServerError::Internal("database lock poisoned".to_string()))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let protected = Router::new()
        .route("/clients", get(clients_list).post(client_create))
        .route("/clients/deleted", get(clients_deleted))
        .route(
            "/clients/:id",
            get(client_detail).put(client_update).delete(client_delete),
        )
        .route("/clients/:id/restore", post(client_restore))
        .route("/clients/:id/history", get(client_history))
        .route("/clients/:id/logo", post(client_logo_upload))
        .route("/logos/:name", get(logo_download))
        .route("/users", post(user_create))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_identity,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    instance: String,
    version: &'static str,
}

#[derive(Deserialize)]
struct ListQuery {
    q: Option<String>,
}

/// Editable text fields accepted on create and update.  The logo travels
/// through its own multipart endpoint and is never settable here.
#[derive(Deserialize)]
struct ClientPayload {
    name: String,
    company: Option<String>,
    business_identifier: Option<String>,
    email: Option<String>,
    country_code: Option<String>,
    address: Option<String>,
}

impl ClientPayload {
    fn into_fields(self, logo_reference: Option<String>) -> ClientFields {
        ClientFields {
            name: self.name,
            company: self.company,
            business_identifier: self.business_identifier,
            email: self.email,
            country_code: self.country_code,
            address: self.address,
            logo_reference,
        }
    }
}

#[derive(Serialize)]
struct ClientDetailResponse {
    client: Client,
    history: Vec<HistoryEntry>,
}

#[derive(Deserialize)]
struct CreateUserRequest {
    username: String,
    role: Role,
    #[serde(default)]
    is_superuser: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        instance: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn clients_list(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<Client>>, ServerError> {
    let clients = state.db()?.list_active_clients(params.q.as_deref())?;
    Ok(Json(clients))
}

async fn clients_deleted(
    State(state): State<AppState>,
) -> Result<Json<Vec<Client>>, ServerError> {
    let clients = state.db()?.list_deleted_clients()?;
    Ok(Json(clients))
}

async fn client_create(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Json(payload): Json<ClientPayload>,
) -> Result<(axum::http::StatusCode, Json<Client>), ServerError> {
    let client = state
        .db()?
        .create_client(&payload.into_fields(None), &actor)?;
    Ok((axum::http::StatusCode::CREATED, Json(client)))
}

async fn client_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClientDetailResponse>, ServerError> {
    let db = state.db()?;
    let client = db.get_client(id)?;
    let history = db.client_history(id)?;
    Ok(Json(ClientDetailResponse { client, history }))
}

async fn client_update(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ClientPayload>,
) -> Result<Json<Client>, ServerError> {
    let db = state.db()?;
    // The logo is managed through the upload endpoint; carry it over.
    let current = db.get_client(id)?;
    let fields = payload.into_fields(current.logo_reference.clone());
    let client = db.save_client(id, &fields, &actor)?;
    Ok(Json(client))
}

async fn client_delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, ServerError> {
    let client = state.db()?.soft_delete_client(id, &actor)?;
    Ok(Json(client))
}

async fn client_restore(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, ServerError> {
    let client = state.db()?.restore_client(id, &actor)?;
    Ok(Json(client))
}

async fn client_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<HistoryEntry>>, ServerError> {
    let db = state.db()?;
    // Surface NotFound for a bogus id rather than an empty list.
    db.get_client(id)?;
    let history = db.client_history(id)?;
    Ok(Json(history))
}

async fn client_logo_upload(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<Client>, ServerError> {
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name().unwrap_or("") == "file" {
            let original_name = field.file_name().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;
            upload = Some((original_name, data.to_vec()));
            break;
        }
    }

    let Some((original_name, data)) = upload else {
        return Err(ServerError::BadRequest(
            "Missing 'file' field in multipart form".to_string(),
        ));
    };

    let client = { state.db()?.get_client(id)? };
    let file_name = format!(
        "{}.{}",
        client.external_code,
        sanitized_extension(original_name.as_deref())
    );

    state.logo_store.store_logo(&file_name, &data).await?;

    let updated = {
        let db = state.db()?;
        let mut fields = ClientFields::from(&client);
        fields.logo_reference = Some(file_name.clone());
        db.save_client(id, &fields, &actor)?
    };

    info!(
        id = %updated.id,
        logo = %file_name,
        size = data.len(),
        "Logo uploaded via API"
    );

    Ok(Json(updated))
}

async fn logo_download(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Vec<u8>, ServerError> {
    let data = state.logo_store.get_logo(&name).await?;
    Ok(data)
}

async fn user_create(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(axum::http::StatusCode, Json<Identity>), ServerError> {
    if !(actor.is_superuser || actor.role == Role::Superadmin) {
        return Err(ServerError::Forbidden(format!(
            "'{}' may not manage identities",
            actor.username
        )));
    }

    let identity = state
        .db()?
        .create_identity(&req.username, req.role, req.is_superuser)?;

    info!(username = %identity.username, role = %identity.role, "Identity created via API");

    // The response is the only place the access token is ever shown.
    Ok((axum::http::StatusCode::CREATED, Json(identity)))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

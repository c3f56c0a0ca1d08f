//! Axum router and HTTP handlers for smk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! tracing and CORS so tests can drive the bare router. Everything except
//! `/api/health` sits behind Basic-Auth.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use smk_reconcile::{validate_program, validate_report};
use smk_schemas::{Measurement, SmokeProgram, SmokeReport, SmokeState, SmokeStep, StatePatch, TempChannel};
use smk_store::{get_json, set_json, KeyValueStore};
use tracing::info;
use uuid::Uuid;

use crate::{
    api_types::{
        ClientResponse, DeviceTokenRequest, HealthResponse, HeartbeatResponse, PasswordRequest,
        ProgramIdResponse, ProgramIndexBody, TargetRequest, TimerBody,
    },
    auth::{self, Principal},
    error::{ApiError, AppJson},
    heartbeat, keys, realtime,
    state::AppContext,
};

const FIRMWARE_VERSION_HEADER: &str = "Firmware-Version";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let protected = Router::new()
        .route("/api/client", post(client_register).delete(client_unregister))
        .route("/api/client/password", post(client_password))
        .route("/api/client/ws", get(realtime::ws_upgrade))
        .route("/api/client/upgrade", get(realtime::ws_upgrade))
        .route("/api/smoker/boot", post(smoker_boot))
        .route("/api/smoker/heartbeat", post(smoker_heartbeat))
        .route("/api/smoker/target", patch(smoker_target))
        .route("/api/smoker/power", post(power_on).delete(power_off))
        .route(
            "/api/program",
            get(program_id).post(program_set).delete(program_delete),
        )
        .route(
            "/api/program/index",
            get(program_index_get).post(program_index_set),
        )
        .route("/api/program/:id", get(program_steps))
        .route("/api/state", get(state_get).put(state_put).patch(state_patch))
        .route(
            "/api/timer/program/started",
            get(timer_get).post(timer_set).delete(timer_delete),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&ctx),
            auth::require_basic_auth,
        ));

    Router::new()
        .route("/api/health", get(health))
        .merge(protected)
        .with_state(ctx)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

async fn load_state(store: &dyn KeyValueStore) -> Result<SmokeState, ApiError> {
    get_json(store, keys::STATE)
        .await?
        .ok_or_else(|| ApiError::not_found("no smoker state"))
}

async fn load_program(store: &dyn KeyValueStore) -> Result<SmokeProgram, ApiError> {
    get_json(store, keys::PROGRAM)
        .await?
        .ok_or_else(|| ApiError::not_found("no program"))
}

/// Persist a command-side state change and leave it pending for the device.
async fn write_command_state(store: &dyn KeyValueStore, state: &SmokeState) -> Result<(), ApiError> {
    set_json(store, keys::STATE, state).await?;
    store.set(keys::STATE_PENDING, keys::FLAG).await?;
    Ok(())
}

fn firmware_version(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(FIRMWARE_VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::validation("missing Firmware-Version header"))
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(ctx): State<Arc<AppContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: ctx.build.service.to_string(),
        version: ctx.build.version.to_string(),
    })
}

// ---------------------------------------------------------------------------
// /api/client
// ---------------------------------------------------------------------------

pub(crate) async fn client_register(
    State(ctx): State<Arc<AppContext>>,
    AppJson(body): AppJson<DeviceTokenRequest>,
) -> Result<Json<ClientResponse>, ApiError> {
    body.validate()?;
    ctx.notifier.register(&body.device_token).await?;
    let firmware_version = ctx.store.get(keys::FIRMWARE_VERSION).await?;
    Ok(Json(ClientResponse {
        software_version: ctx.build.version.to_string(),
        firmware_version,
    }))
}

pub(crate) async fn client_unregister(
    State(ctx): State<Arc<AppContext>>,
    AppJson(body): AppJson<DeviceTokenRequest>,
) -> Result<StatusCode, ApiError> {
    body.validate()?;
    ctx.notifier.unregister(&body.device_token).await?;
    Ok(StatusCode::ACCEPTED)
}

pub(crate) async fn client_password(
    State(ctx): State<Arc<AppContext>>,
    Extension(principal): Extension<Principal>,
    AppJson(body): AppJson<PasswordRequest>,
) -> Result<StatusCode, ApiError> {
    body.validate()?;
    auth::set_password(ctx.store.as_ref(), principal.name(), &body.new_password).await?;
    info!(principal = %principal.name(), "password rotated");
    Ok(StatusCode::ACCEPTED)
}

// ---------------------------------------------------------------------------
// /api/smoker
// ---------------------------------------------------------------------------

/// Firmware boot: drop the previous session and start from the reported
/// state.
pub(crate) async fn smoker_boot(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    AppJson(report): AppJson<SmokeState>,
) -> Result<StatusCode, ApiError> {
    validate_report(&report)?;
    let firmware_version = firmware_version(&headers)?;

    let store = ctx.store.as_ref();
    store.delete(&[keys::ONLINE, keys::STATE]).await?;
    set_json(store, keys::STATE, &report).await?;
    store.set(keys::FIRMWARE_VERSION, &firmware_version).await?;

    info!(firmware_version = %firmware_version, "smoker boot");
    Ok(StatusCode::OK)
}

pub(crate) async fn smoker_heartbeat(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    AppJson(report): AppJson<SmokeState>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let firmware_version = firmware_version(&headers)?;
    let outcome = heartbeat::reconcile_heartbeat(&ctx, report, &firmware_version).await?;
    Ok(Json(outcome.response))
}

pub(crate) async fn smoker_target(
    State(ctx): State<Arc<AppContext>>,
    AppJson(body): AppJson<TargetRequest>,
) -> Result<StatusCode, ApiError> {
    body.validate()?;
    let store = ctx.store.as_ref();
    let mut state = load_state(store).await?;

    if body.probe.is_some() && !state.probe_connected {
        return Err(ApiError::conflict("probe target rejected: probe not connected"));
    }
    if let Some(grill) = body.grill {
        state.set_temp(TempChannel::GrillTarget, Measurement::fahrenheit(grill as f64));
    }
    if let Some(probe) = body.probe {
        state.set_temp(TempChannel::ProbeTarget, Measurement::fahrenheit(probe as f64));
    }

    write_command_state(store, &state).await?;
    info!(grill = ?body.grill, probe = ?body.probe, "target set");
    Ok(StatusCode::ACCEPTED)
}

/// Power on. Only meaningful once a program is loaded.
pub(crate) async fn power_on(State(ctx): State<Arc<AppContext>>) -> Result<StatusCode, ApiError> {
    let store = ctx.store.as_ref();
    let mut state = load_state(store).await?;
    if !store.exists(keys::PROGRAM).await? {
        return Err(ApiError::conflict("no program set; refusing power on"));
    }
    if state.power {
        return Err(ApiError::conflict("already on"));
    }
    state.power = true;
    write_command_state(store, &state).await?;
    info!("power on requested");
    Ok(StatusCode::OK)
}

pub(crate) async fn power_off(State(ctx): State<Arc<AppContext>>) -> Result<StatusCode, ApiError> {
    let store = ctx.store.as_ref();
    let mut state = load_state(store).await?;
    if !state.power {
        return Err(ApiError::conflict("already off"));
    }
    state.power = false;
    write_command_state(store, &state).await?;
    info!("power off requested");
    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// /api/program
// ---------------------------------------------------------------------------

pub(crate) async fn program_id(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<ProgramIdResponse>, ApiError> {
    let program = load_program(ctx.store.as_ref()).await?;
    Ok(Json(ProgramIdResponse { id: program.id }))
}

pub(crate) async fn program_set(
    State(ctx): State<Arc<AppContext>>,
    AppJson(program): AppJson<SmokeProgram>,
) -> Result<StatusCode, ApiError> {
    validate_program(&program)?;
    let store = ctx.store.as_ref();
    set_json(store, keys::PROGRAM, &program).await?;
    store.set(keys::PROGRAM_PENDING, keys::FLAG).await?;
    info!(id = %program.id, steps = program.steps.len(), "program set");
    Ok(StatusCode::OK)
}

pub(crate) async fn program_delete(
    State(ctx): State<Arc<AppContext>>,
) -> Result<StatusCode, ApiError> {
    ctx.store
        .delete(&[keys::PROGRAM, keys::PROGRAM_PENDING])
        .await?;
    info!("program deleted");
    Ok(StatusCode::ACCEPTED)
}

/// Firmware fetch of the program steps. Acknowledges `program:pending`.
pub(crate) async fn program_steps(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SmokeStep>>, ApiError> {
    let store = ctx.store.as_ref();
    let program = load_program(store).await?;

    let requested = Uuid::parse_str(&id).map_err(|_| ApiError::validation("invalid ID"))?;
    if Uuid::parse_str(&program.id).ok() != Some(requested) {
        return Err(ApiError::validation("invalid ID"));
    }

    store.delete(&[keys::PROGRAM_PENDING]).await?;
    Ok(Json(program.steps))
}

pub(crate) async fn program_index_get(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<ProgramIndexBody>, ApiError> {
    let program = load_program(ctx.store.as_ref()).await?;
    Ok(Json(ProgramIndexBody {
        index: program.index,
    }))
}

pub(crate) async fn program_index_set(
    State(ctx): State<Arc<AppContext>>,
    AppJson(body): AppJson<ProgramIndexBody>,
) -> Result<StatusCode, ApiError> {
    let store = ctx.store.as_ref();
    let mut program = load_program(store).await?;
    if body.index >= program.steps.len() {
        return Err(ApiError::validation(format!(
            "index {} out of range for {} steps",
            body.index,
            program.steps.len()
        )));
    }

    program.index = body.index;
    set_json(store, keys::PROGRAM, &program).await?;
    ctx.notifier.notify(SmokeReport::program_index(body.index));
    info!(index = body.index, "program index advanced");
    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// /api/state
// ---------------------------------------------------------------------------

pub(crate) async fn state_get(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<SmokeState>, ApiError> {
    Ok(Json(load_state(ctx.store.as_ref()).await?))
}

pub(crate) async fn state_put(
    State(ctx): State<Arc<AppContext>>,
    Extension(principal): Extension<Principal>,
    AppJson(state): AppJson<SmokeState>,
) -> Result<StatusCode, ApiError> {
    validate_report(&state)?;
    let store = ctx.store.as_ref();
    if principal.is_firmware() {
        set_json(store, keys::STATE, &state).await?;
    } else {
        write_command_state(store, &state).await?;
    }
    Ok(StatusCode::ACCEPTED)
}

pub(crate) async fn state_patch(
    State(ctx): State<Arc<AppContext>>,
    Extension(principal): Extension<Principal>,
    AppJson(patch): AppJson<StatePatch>,
) -> Result<StatusCode, ApiError> {
    let store = ctx.store.as_ref();
    let mut state = load_state(store).await?;
    patch.apply_to(&mut state);
    if principal.is_firmware() {
        set_json(store, keys::STATE, &state).await?;
    } else {
        write_command_state(store, &state).await?;
    }
    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// /api/timer/program/started
// ---------------------------------------------------------------------------

pub(crate) async fn timer_get(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<TimerBody>, ApiError> {
    let raw = ctx
        .store
        .get(keys::TIMER_PROGRAM_STARTED)
        .await?
        .ok_or_else(|| ApiError::not_found("no program start time"))?;
    let last_program_started = raw.parse::<f64>().map_err(|e| {
        ApiError::from(anyhow::anyhow!(
            "'{}' holds non-numeric '{raw}': {e}",
            keys::TIMER_PROGRAM_STARTED
        ))
    })?;
    Ok(Json(TimerBody {
        last_program_started,
    }))
}

pub(crate) async fn timer_set(
    State(ctx): State<Arc<AppContext>>,
    AppJson(body): AppJson<TimerBody>,
) -> Result<StatusCode, ApiError> {
    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    body.validate(now)?;
    ctx.store
        .set(
            keys::TIMER_PROGRAM_STARTED,
            &body.last_program_started.to_string(),
        )
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub(crate) async fn timer_delete(
    State(ctx): State<Arc<AppContext>>,
) -> Result<StatusCode, ApiError> {
    ctx.store.delete(&[keys::TIMER_PROGRAM_STARTED]).await?;
    Ok(StatusCode::OK)
}

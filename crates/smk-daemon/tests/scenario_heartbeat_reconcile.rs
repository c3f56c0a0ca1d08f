//! Scenario: heartbeat reconciliation through the daemon.
//!
//! The pure merge rules are covered in smk-reconcile; here the focus is what
//! the heartbeat does to the store and what it returns to the firmware:
//!
//! 1. The response always carries both keys, `null` when nothing is pending.
//! 2. A pending command overrides the report and is consumed exactly once.
//! 3. A pending program is delivered once.
//! 4. The first heartbeat brings the device online and arms the TTL.
//! 5. Reports without a grill reading are rejected before any store write.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use smk_daemon::{heartbeat::reconcile_heartbeat, keys, routes, state::AppContext};
use smk_reconcile::ReconcileCase;
use smk_schemas::{
    Measurement, SmokeMode, SmokeProgram, SmokeState, SmokeStep, StepTrigger, TempChannel,
};
use smk_store::{get_json, set_json};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

async fn make_ctx() -> Arc<AppContext> {
    let ctx = AppContext::in_memory();
    smk_daemon::auth::set_password(ctx.store.as_ref(), "firmware", "firmware-password")
        .await
        .expect("set firmware password");
    smk_daemon::auth::set_password(ctx.store.as_ref(), "app", "app-password")
        .await
        .expect("set app password");
    ctx
}

fn basic(user: &str, password: &str) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

fn heartbeat_req(report: &SmokeState) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri("/api/smoker/heartbeat")
        .header("authorization", basic("firmware", "firmware-password"))
        .header("Firmware-Version", "2.0.1")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(report).unwrap()))
        .unwrap()
}

fn report(grill_target: f64) -> SmokeState {
    SmokeState {
        mode: SmokeMode::Smoke,
        power: true,
        probe_connected: true,
        online: true,
        ..SmokeState::default()
    }
    .with_temp(TempChannel::GrillCurrent, 219.6)
    .with_temp(TempChannel::GrillTarget, grill_target)
    .with_temp(TempChannel::ProbeCurrent, 141.0)
}

// ---------------------------------------------------------------------------
// 1. Null keys are kept in the response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn idle_heartbeat_returns_explicit_nulls() {
    let ctx = make_ctx().await;

    let (status, body) = call(routes::build_router(Arc::clone(&ctx)), heartbeat_req(&report(225.0))).await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let obj = json.as_object().expect("object");
    assert_eq!(obj.len(), 2);
    assert!(obj["state"].is_null());
    assert!(obj["program"].is_null());

    let stored: Option<SmokeState> = get_json(ctx.store.as_ref(), keys::STATE).await.unwrap();
    assert_eq!(stored, Some(report(225.0)));
    assert_eq!(
        ctx.store.get(keys::FIRMWARE_VERSION).await.unwrap().as_deref(),
        Some("2.0.1")
    );

    // The app reads back exactly what the device reported.
    let get = Request::builder()
        .uri("/api/state")
        .header("authorization", basic("app", "app-password"))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = call(routes::build_router(ctx), get).await;
    assert_eq!(status, StatusCode::OK);
    let served: SmokeState = serde_json::from_slice(&body).unwrap();
    assert_eq!(served, report(225.0));
}

// ---------------------------------------------------------------------------
// 2. Pending command overrides once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_command_overrides_report_once() {
    let ctx = make_ctx().await;

    // App asked for 275 while the device still runs 225.
    let commanded = report(275.0);
    set_json(ctx.store.as_ref(), keys::STATE, &commanded).await.unwrap();
    ctx.store.set(keys::STATE_PENDING, keys::FLAG).await.unwrap();

    let first = reconcile_heartbeat(&ctx, report(225.0), "2.0.1").await.unwrap();
    assert_eq!(first.reconciled.case, ReconcileCase::PendingOverride);
    let returned = first.response.state.expect("pending state returned to firmware");
    assert_eq!(
        returned.temp(TempChannel::GrillTarget),
        Some(Measurement::fahrenheit(275.0))
    );
    // Readings still come from the device.
    assert_eq!(
        returned.temp(TempChannel::GrillCurrent),
        Some(Measurement::fahrenheit(219.6))
    );
    assert!(!ctx.store.exists(keys::STATE_PENDING).await.unwrap());

    let second = reconcile_heartbeat(&ctx, report(275.0), "2.0.1").await.unwrap();
    assert_eq!(second.reconciled.case, ReconcileCase::Merge);
    assert!(second.response.state.is_none());
}

#[tokio::test]
async fn pending_without_stored_state_takes_the_report() {
    let ctx = make_ctx().await;
    ctx.store.set(keys::STATE_PENDING, keys::FLAG).await.unwrap();

    let out = reconcile_heartbeat(&ctx, report(225.0), "2.0.1").await.unwrap();
    assert_eq!(out.reconciled.case, ReconcileCase::PendingWithoutState);
    assert_eq!(out.response.state, Some(report(225.0)));
}

// ---------------------------------------------------------------------------
// 3. Pending program delivered once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_program_is_delivered_once() {
    let ctx = make_ctx().await;
    let program = SmokeProgram {
        id: "0b6e9a42-0f57-4d8e-b1c4-3f0e2a7d9b15".to_string(),
        index: 0,
        steps: vec![SmokeStep::new(SmokeMode::Smoke, StepTrigger::Temp, 165, 225.0)],
    };
    set_json(ctx.store.as_ref(), keys::PROGRAM, &program).await.unwrap();
    ctx.store.set(keys::PROGRAM_PENDING, keys::FLAG).await.unwrap();

    let first = reconcile_heartbeat(&ctx, report(225.0), "2.0.1").await.unwrap();
    assert_eq!(first.response.program.as_ref(), Some(&program));

    let second = reconcile_heartbeat(&ctx, report(225.0), "2.0.1").await.unwrap();
    assert!(second.response.program.is_none());
    // The program itself stays.
    assert!(ctx.store.exists(keys::PROGRAM).await.unwrap());
}

// ---------------------------------------------------------------------------
// 4. Presence transition
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_heartbeat_brings_device_online() {
    let ctx = make_ctx().await;

    let first = reconcile_heartbeat(&ctx, report(225.0), "2.0.1").await.unwrap();
    assert!(first.came_online);
    assert!(ctx.presence.is_online().await.unwrap());

    let ttl = ctx
        .store
        .ttl(keys::ONLINE)
        .await
        .unwrap()
        .expect("online marker must carry a TTL");
    assert!(ttl <= Duration::from_secs(13) && ttl > Duration::from_secs(12));

    let second = reconcile_heartbeat(&ctx, report(225.0), "2.0.1").await.unwrap();
    assert!(!second.came_online);
}

#[tokio::test]
async fn unplugged_probe_is_purged_from_stored_state() {
    let ctx = make_ctx().await;
    let mut stored = report(225.0).with_temp(TempChannel::ProbeTarget, 165.0);
    stored.probe_connected = true;
    set_json(ctx.store.as_ref(), keys::STATE, &stored).await.unwrap();

    let mut unplugged = report(225.0);
    unplugged.probe_connected = false;
    unplugged.clear_probe();

    let out = reconcile_heartbeat(&ctx, unplugged, "2.0.1").await.unwrap();
    assert!(out.reconciled.probe_purged);

    let now: SmokeState = get_json(ctx.store.as_ref(), keys::STATE).await.unwrap().unwrap();
    assert_eq!(now.temp(TempChannel::ProbeCurrent), None);
    assert_eq!(now.temp(TempChannel::ProbeTarget), None);
    assert!(!now.probe_connected);
}

// ---------------------------------------------------------------------------
// 5. Validation happens first
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_without_grill_reading_is_rejected_without_side_effects() {
    let ctx = make_ctx().await;
    ctx.store.set(keys::STATE_PENDING, keys::FLAG).await.unwrap();

    let bad = SmokeState::default().with_temp(TempChannel::ProbeCurrent, 100.0);
    let (status, _) = call(routes::build_router(Arc::clone(&ctx)), heartbeat_req(&bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(
        ctx.store.exists(keys::STATE_PENDING).await.unwrap(),
        "pending marker must survive a rejected report"
    );
    assert!(!ctx.presence.is_online().await.unwrap());
}

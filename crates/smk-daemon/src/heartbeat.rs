//! Heartbeat handling: snapshot the store, reconcile, persist, notify.

use smk_reconcile::{reconcile, validate_report, HeartbeatInputs, ReconcileCase, Reconciled};
use smk_schemas::{SmokeProgram, SmokeReport, SmokeState, TemperatureUpdate};
use smk_store::{get_json, set_json};
use tracing::{debug, info};

use crate::{api_types::HeartbeatResponse, error::ApiError, keys, state::AppContext};

#[derive(Clone, Debug)]
pub struct HeartbeatOutcome {
    pub reconciled: Reconciled,
    /// The presence marker was absent before this heartbeat.
    pub came_online: bool,
    /// Returned to the firmware.
    pub response: HeartbeatResponse,
}

/// Run one heartbeat.
///
/// Pending markers are consumed with GETDEL and presence is flipped with
/// GETSET, so a command written concurrently lands either before this
/// snapshot (and is honoured here) or after it (and is honoured next time).
/// Store writes are not transactional: a failure part-way leaves earlier
/// writes committed and surfaces as an internal error.
pub async fn reconcile_heartbeat(
    ctx: &AppContext,
    report: SmokeState,
    firmware_version: &str,
) -> Result<HeartbeatOutcome, ApiError> {
    validate_report(&report)?;

    let store = ctx.store.as_ref();
    let state_pending = store.get_del(keys::STATE_PENDING).await?.is_some();
    let authoritative: Option<SmokeState> = get_json(store, keys::STATE).await?;
    let program_pending = store.get_del(keys::PROGRAM_PENDING).await?.is_some();
    let program: Option<SmokeProgram> = get_json(store, keys::PROGRAM).await?;
    let came_online = ctx.presence.mark_heartbeat().await?;
    store.set(keys::FIRMWARE_VERSION, firmware_version).await?;

    let reconciled = reconcile(HeartbeatInputs {
        report: &report,
        authoritative: authoritative.as_ref(),
        state_pending,
        came_online,
    });
    set_json(store, keys::STATE, &reconciled.state).await?;

    debug!(
        case = ?reconciled.case,
        overridden = ?reconciled.overridden,
        probe_purged = reconciled.probe_purged,
        came_online,
        "heartbeat reconciled"
    );
    if reconciled.case == ReconcileCase::PendingWithoutState {
        info!("pending command without stored state; report taken as authoritative");
    }

    if came_online {
        info!(firmware_version = %firmware_version, "device online");
        ctx.notifier.notify(SmokeReport::came_online(
            reconciled.state.clone(),
            Some(firmware_version.to_string()),
        ));
    }
    ctx.notifier.notify_realtime(SmokeReport::temperatures(
        TemperatureUpdate::from_state(&report),
        program.as_ref().map(|p| p.index),
    ));

    let response = HeartbeatResponse {
        state: state_pending.then(|| reconciled.state.clone()),
        program: if program_pending { program } else { None },
    };

    Ok(HeartbeatOutcome {
        reconciled,
        came_online,
        response,
    })
}

use smk_reconcile::*;
use smk_schemas::{SmokeMode, SmokeState, TempChannel};

fn stored_with_probe() -> SmokeState {
    SmokeState {
        mode: SmokeMode::Smoke,
        power: true,
        probe_connected: true,
        online: true,
        ..SmokeState::default()
    }
    .with_temp(TempChannel::GrillCurrent, 225.0)
    .with_temp(TempChannel::GrillTarget, 225.0)
    .with_temp(TempChannel::ProbeCurrent, 150.0)
    .with_temp(TempChannel::ProbeTarget, 203.0)
}

fn report_without_probe() -> SmokeState {
    SmokeState {
        mode: SmokeMode::Smoke,
        power: true,
        probe_connected: false,
        online: true,
        ..SmokeState::default()
    }
    .with_temp(TempChannel::GrillCurrent, 226.0)
}

#[test]
fn merge_purges_probe_channels_when_report_lacks_probe_current() {
    let auth = stored_with_probe();
    let report = report_without_probe();

    let r = reconcile(HeartbeatInputs {
        report: &report,
        authoritative: Some(&auth),
        state_pending: false,
        came_online: false,
    });

    assert!(r.probe_purged);
    assert!(!r.state.temps.contains_key(&TempChannel::ProbeCurrent));
    assert!(!r.state.temps.contains_key(&TempChannel::ProbeTarget));
    assert!(r.state.temps.contains_key(&TempChannel::GrillTarget));
}

#[test]
fn pending_override_does_not_resurrect_probe_target() {
    let auth = stored_with_probe();
    let report = report_without_probe();

    let r = reconcile(HeartbeatInputs {
        report: &report,
        authoritative: Some(&auth),
        state_pending: true,
        came_online: false,
    });

    assert_eq!(r.case, ReconcileCase::PendingOverride);
    assert!(!r.state.temps.contains_key(&TempChannel::ProbeTarget));
    assert!(!r.state.temps.contains_key(&TempChannel::ProbeCurrent));
}

#[test]
fn probe_reading_present_keeps_channels() {
    let auth = stored_with_probe();
    let report = report_without_probe().with_temp(TempChannel::ProbeCurrent, 151.0);

    let r = reconcile(HeartbeatInputs {
        report: &report,
        authoritative: Some(&auth),
        state_pending: false,
        came_online: false,
    });

    assert!(!r.probe_purged);
    assert_eq!(r.state.temp(TempChannel::ProbeCurrent).map(|m| m.value), Some(151.0));
    assert_eq!(r.state.temp(TempChannel::ProbeTarget).map(|m| m.value), Some(203.0));
}

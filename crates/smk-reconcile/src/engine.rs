use smk_schemas::{SmokeState, StatePatch, TempChannel};

use crate::{HeartbeatInputs, ReconcileCase, Reconciled, ReportError, Settable};

/// Reject reports that cannot drive a heartbeat. `mode`, `power`,
/// `probeConnected` and `online` are enforced by decoding; the grill reading
/// is the one temperature the firmware must always send.
pub fn validate_report(report: &SmokeState) -> Result<(), ReportError> {
    if report.temp(TempChannel::GrillCurrent).is_none() {
        return Err(ReportError::MissingTemperature(TempChannel::GrillCurrent));
    }
    Ok(())
}

fn select_case(inputs: &HeartbeatInputs<'_>) -> ReconcileCase {
    match (inputs.state_pending, inputs.authoritative.is_some()) {
        (true, false) => ReconcileCase::PendingWithoutState,
        (true, true) => ReconcileCase::PendingOverride,
        (false, true) => ReconcileCase::Merge,
        // Also covers "coming online"; with a stored state Merge already
        // matched above.
        (false, false) => ReconcileCase::Replace,
    }
}

/// Copy authoritative settable values over the report wherever they differ.
/// A settable the authoritative state does not carry is left as reported.
fn override_settables(
    report: &SmokeState,
    authoritative: &SmokeState,
) -> (SmokeState, Vec<Settable>) {
    let mut out = report.clone();
    let mut overridden = Vec::new();

    if authoritative.power != report.power {
        out.power = authoritative.power;
        overridden.push(Settable::Power);
    }

    for (channel, settable) in [
        (TempChannel::GrillTarget, Settable::GrillTarget),
        (TempChannel::ProbeTarget, Settable::ProbeTarget),
    ] {
        if let Some(target) = authoritative.temp(channel) {
            if report.temp(channel) != Some(target) {
                out.set_temp(channel, target);
                overridden.push(settable);
            }
        }
    }

    (out, overridden)
}

/// Merge one heartbeat report with the stored state.
///
/// Callers must have run [`validate_report`] first.
pub fn reconcile(inputs: HeartbeatInputs<'_>) -> Reconciled {
    let case = select_case(&inputs);

    let (mut state, overridden) = match (case, inputs.authoritative) {
        (ReconcileCase::PendingOverride, Some(auth)) => override_settables(inputs.report, auth),
        (ReconcileCase::Merge, Some(auth)) => {
            let mut merged = auth.clone();
            StatePatch::from(inputs.report).apply_to(&mut merged);
            (merged, Vec::new())
        }
        _ => (inputs.report.clone(), Vec::new()),
    };

    // Missing probe reading means the probe was unplugged: purge rather than
    // keep stale values around.
    let probe_purged = !inputs.report.has_probe_reading();
    if probe_purged {
        state.clear_probe();
    }

    Reconciled {
        state,
        case,
        overridden,
        probe_purged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smk_schemas::SmokeMode;

    fn report() -> SmokeState {
        SmokeState {
            mode: SmokeMode::Smoke,
            power: true,
            probe_connected: true,
            online: true,
            ..SmokeState::default()
        }
        .with_temp(TempChannel::GrillCurrent, 210.0)
        .with_temp(TempChannel::ProbeCurrent, 120.0)
    }

    #[test]
    fn case_selection_table() {
        let r = report();
        let stored = report();
        let cases = [
            (true, None, ReconcileCase::PendingWithoutState),
            (true, Some(&stored), ReconcileCase::PendingOverride),
            (false, Some(&stored), ReconcileCase::Merge),
            (false, None, ReconcileCase::Replace),
        ];
        for (pending, auth, expected) in cases {
            let got = select_case(&HeartbeatInputs {
                report: &r,
                authoritative: auth,
                state_pending: pending,
                came_online: false,
            });
            assert_eq!(got, expected, "pending={pending} auth={}", auth.is_some());
        }
    }

    #[test]
    fn missing_grill_current_is_rejected() {
        let r = SmokeState::default().with_temp(TempChannel::ProbeCurrent, 100.0);
        assert_eq!(
            validate_report(&r),
            Err(ReportError::MissingTemperature(TempChannel::GrillCurrent))
        );
        assert!(validate_report(&report()).is_ok());
    }
}

use smk_schemas::{SmokeState, TempChannel};

/// Everything one heartbeat needs, read from the store before merging.
#[derive(Clone, Copy, Debug)]
pub struct HeartbeatInputs<'a> {
    /// Freshly decoded device report.
    pub report: &'a SmokeState,
    /// Authoritative state, if one is stored.
    pub authoritative: Option<&'a SmokeState>,
    /// `state:pending` was set (and has now been consumed).
    pub state_pending: bool,
    /// The presence marker was absent before this heartbeat.
    pub came_online: bool,
}

/// Which merge rule produced the result. Evaluated in declaration order;
/// first match wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileCase {
    /// Pending marker set but nothing stored: take the report as-is.
    PendingWithoutState,
    /// Pending marker set and state stored: settable fields keep the
    /// authoritative value.
    PendingOverride,
    /// No pending marker, state stored: report applied onto stored state.
    Merge,
    /// No pending marker and no stored state (or coming online): report
    /// replaces everything.
    Replace,
}

/// A settable field whose authoritative value replaced the reported one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Settable {
    Power,
    GrillTarget,
    ProbeTarget,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled {
    pub state: SmokeState,
    pub case: ReconcileCase,
    /// Settable fields that were overridden (only for `PendingOverride`).
    pub overridden: Vec<Settable>,
    /// The report had no `probeCurrent`, probe channels were dropped.
    pub probe_purged: bool,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A device report that cannot be reconciled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportError {
    MissingTemperature(TempChannel),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::MissingTemperature(c) => {
                write!(f, "report is missing required temperature '{}'", c.as_str())
            }
        }
    }
}

impl std::error::Error for ReportError {}

/// A program that fails validation.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgramError {
    NoSteps,
    /// Temperature-triggered step whose limit is at or beyond its target.
    LimitNotBelowTarget {
        step: usize,
        limit: i64,
        target_grill: f64,
    },
}

impl std::fmt::Display for ProgramError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgramError::NoSteps => write!(f, "program has no steps"),
            ProgramError::LimitNotBelowTarget {
                step,
                limit,
                target_grill,
            } => write!(
                f,
                "step {step}: temp trigger limit {limit} must be below targetGrill {target_grill}"
            ),
        }
    }
}

impl std::error::Error for ProgramError {}

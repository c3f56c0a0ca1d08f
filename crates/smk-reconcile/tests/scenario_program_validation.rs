use smk_reconcile::{validate_program, ProgramError};
use smk_schemas::{SmokeMode, SmokeProgram, SmokeStep, StepTrigger};

fn program(steps: Vec<SmokeStep>) -> SmokeProgram {
    SmokeProgram {
        id: "5B4E7B0C-6C1A-4E55-9E37-2D0C1B1E7A10".to_string(),
        index: 0,
        steps,
    }
}

#[test]
fn temp_limit_at_or_above_target_is_rejected() {
    let p = program(vec![
        SmokeStep::new(SmokeMode::Start, StepTrigger::Time, 600, 150.0),
        SmokeStep::new(SmokeMode::Smoke, StepTrigger::Temp, 250, 225.0),
    ]);
    assert_eq!(
        validate_program(&p),
        Err(ProgramError::LimitNotBelowTarget {
            step: 1,
            limit: 250,
            target_grill: 225.0
        })
    );

    let equal = program(vec![SmokeStep::new(SmokeMode::Hold, StepTrigger::Temp, 225, 225.0)]);
    assert!(validate_program(&equal).is_err());
}

#[test]
fn temp_limit_below_target_is_accepted() {
    let p = program(vec![SmokeStep::new(SmokeMode::Smoke, StepTrigger::Temp, 200, 225.0)]);
    assert!(validate_program(&p).is_ok());
}

#[test]
fn time_trigger_limit_is_not_compared_to_target() {
    let p = program(vec![
        SmokeStep::new(SmokeMode::Start, StepTrigger::Time, 600, 150.0),
        SmokeStep::new(SmokeMode::Hold, StepTrigger::Time, 7200, 225.0),
        SmokeStep::new(SmokeMode::Shutdown, StepTrigger::Time, 900, 0.0),
    ]);
    assert!(validate_program(&p).is_ok());
}

#[test]
fn empty_program_is_rejected() {
    assert_eq!(validate_program(&program(vec![])), Err(ProgramError::NoSteps));
}

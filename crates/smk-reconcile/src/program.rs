use smk_schemas::{SmokeProgram, StepTrigger};

use crate::ProgramError;

/// Internal consistency check run before a program is accepted.
///
/// Reports the first offending step only.
pub fn validate_program(program: &SmokeProgram) -> Result<(), ProgramError> {
    if program.steps.is_empty() {
        return Err(ProgramError::NoSteps);
    }

    for (i, step) in program.steps.iter().enumerate() {
        if step.trigger == StepTrigger::Temp && step.limit as f64 >= step.target_grill.value {
            return Err(ProgramError::LimitNotBelowTarget {
                step: i,
                limit: step.limit,
                target_grill: step.target_grill.value,
            });
        }
    }

    Ok(())
}

use crate::launch::LaunchError;
use std::{fmt, panic::Location};
use thiserror::Error;

/// Which step of the offload failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initialization,
    Allocation,
    Transfer,
    Launch,
    Execution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Initialization => "initialization",
            Stage::Allocation => "allocation",
            Stage::Transfer => "transfer",
            Stage::Launch => "launch",
            Stage::Execution => "execution",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum DotError {
    /// A device call returned a failure status.
    #[error("{stage} error in `{operation}` at {location}: {status}")]
    Device {
        stage: Stage,
        operation: &'static str,
        location: &'static Location<'static>,
        status: String,
    },

    #[error("invalid launch configuration: {0}")]
    Config(#[from] LaunchError),

    #[error("vectors differ in length: a has {a} elements, b has {b}")]
    LengthMismatch { a: usize, b: usize },

    #[error("result mismatch: expected {expected}, device returned {actual}")]
    Mismatch { expected: i32, actual: i32 },
}

impl DotError {
    /// The failing stage, for errors that came from a device call.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            DotError::Device { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Inspects the status of a device call. A failure becomes a `DotError`
/// naming the stage, the operation and the source location of the call site.
///
/// Every device call in the pipeline goes through here, so no status is
/// dropped on the floor.
#[track_caller]
pub fn check<T, E>(stage: Stage, operation: &'static str, result: Result<T, E>) -> Result<T, DotError>
where
    E: fmt::Display,
{
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            let location = Location::caller();
            tracing::error!(%stage, operation, %location, status = %err, "device call failed");
            Err(DotError::Device {
                stage,
                operation,
                location,
                status: err.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{check, DotError, Stage};

    #[test]
    fn check_passes_values_through() {
        let value = check::<_, String>(Stage::Transfer, "copy", Ok(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn check_records_call_site() {
        let line = line!() + 1;
        let err = check::<(), _>(Stage::Allocation, "alloc a", Err("out of memory")).unwrap_err();
        match err {
            DotError::Device {
                stage,
                operation,
                location,
                status,
            } => {
                assert_eq!(stage, Stage::Allocation);
                assert_eq!(operation, "alloc a");
                assert_eq!(location.file(), file!());
                assert_eq!(location.line(), line);
                assert_eq!(status, "out of memory");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn display_names_stage_and_operation() {
        let err = check::<(), _>(Stage::Launch, "launch kernel", Err("too many threads")).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("launch error in `launch kernel` at "));
        assert!(message.ends_with(": too many threads"));
    }
}

//! Exit code tables for each script kind. Every integer maps to a variant; codes outside a
//! table land in `Unexpected`.

use std::fmt::Debug;

pub trait ScriptStatus: From<i32> + Copy + Debug + Send + 'static {
    fn metric_label(&self) -> String;
}

fn unexpected_label(code: i32) -> String {
    format!("unexpected_{}", code)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Success,
    ValidationFailure,
    Unexpected(i32),
}

impl From<i32> for ImportStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Success,
            99 => Self::ValidationFailure,
            other => Self::Unexpected(other),
        }
    }
}

impl ScriptStatus for ImportStatus {
    fn metric_label(&self) -> String {
        match self {
            Self::Success => "success".to_string(),
            Self::ValidationFailure => "validation_failure".to_string(),
            Self::Unexpected(code) => unexpected_label(*code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallDataStatus {
    Success,
    ValidationFailure,
    Unexpected(i32),
}

impl From<i32> for InstallDataStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Success,
            99 => Self::ValidationFailure,
            other => Self::Unexpected(other),
        }
    }
}

impl ScriptStatus for InstallDataStatus {
    fn metric_label(&self) -> String {
        match self {
            Self::Success => "success".to_string(),
            Self::ValidationFailure => "validation_failure".to_string(),
            Self::Unexpected(code) => unexpected_label(*code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityStatus {
    Compatible,
    Incompatible,
    Unexpected(i32),
}

impl From<i32> for CompatibilityStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Compatible,
            1 => Self::Incompatible,
            other => Self::Unexpected(other),
        }
    }
}

impl ScriptStatus for CompatibilityStatus {
    fn metric_label(&self) -> String {
        match self {
            Self::Compatible => "success".to_string(),
            Self::Incompatible => "incompatible".to_string(),
            Self::Unexpected(code) => unexpected_label(*code),
        }
    }
}

/// install-meta and uninstall only define success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessOnlyStatus {
    Success,
    Unexpected(i32),
}

impl From<i32> for SuccessOnlyStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Success,
            other => Self::Unexpected(other),
        }
    }
}

impl ScriptStatus for SuccessOnlyStatus {
    fn metric_label(&self) -> String {
        match self {
            Self::Success => "success".to_string(),
            Self::Unexpected(code) => unexpected_label(*code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_has_exactly_one_outcome() {
        for code in -1..=255 {
            match ImportStatus::from(code) {
                ImportStatus::Success => assert_eq!(code, 0),
                ImportStatus::ValidationFailure => assert_eq!(code, 99),
                ImportStatus::Unexpected(raw) => assert_eq!(raw, code),
            }
            match CompatibilityStatus::from(code) {
                CompatibilityStatus::Compatible => assert_eq!(code, 0),
                CompatibilityStatus::Incompatible => assert_eq!(code, 1),
                CompatibilityStatus::Unexpected(raw) => assert_eq!(raw, code),
            }
            match SuccessOnlyStatus::from(code) {
                SuccessOnlyStatus::Success => assert_eq!(code, 0),
                SuccessOnlyStatus::Unexpected(raw) => assert_eq!(raw, code),
            }
        }
    }

    #[test]
    fn labels_name_the_outcome() {
        assert_eq!(InstallDataStatus::from(99).metric_label(), "validation_failure");
        assert_eq!(CompatibilityStatus::from(1).metric_label(), "incompatible");
        assert_eq!(SuccessOnlyStatus::from(-1).metric_label(), "unexpected_-1");
    }
}

//! Error types for articulated_planning

use std::fmt;

/// Main error type for chain construction, constraint registration and
/// signal reconstruction
#[derive(Debug, Clone, PartialEq)]
pub enum PlanningError {
    /// A link was initialized before the node it wraps
    ChildNotInitialized(String),
    /// Number of splines handed to a node differs from what it declares
    SplineCountMismatch { expected: usize, found: usize },
    /// Two nodes of the chain registered the same parameter name
    DuplicateParameter(String),
    /// Shape kind without a connector sizing rule
    UnsupportedShape(String),
    /// Invalid construction option
    InvalidParameter(String),
    /// Vector or matrix of the wrong size
    DimensionMismatch(String),
    /// Expression refers to a symbol or parameter without a numeric value
    UnboundSymbol(String),
    /// Planning cycle operation called in the wrong phase
    PhaseError(String),
    /// Numerical computation failed (least squares fit, etc.)
    NumericalError(String),
    /// Visualization error
    VisualizationError(String),
}

impl PlanningError {
    /// Errors raised by an inconsistent chain setup
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PlanningError::ChildNotInitialized(_)
                | PlanningError::SplineCountMismatch { .. }
                | PlanningError::DuplicateParameter(_)
        )
    }
}

impl fmt::Display for PlanningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanningError::ChildNotInitialized(msg) => {
                write!(f, "Configuration error: child not initialized: {}", msg)
            }
            PlanningError::SplineCountMismatch { expected, found } => write!(
                f,
                "Configuration error: expected {} splines, found {}",
                expected, found
            ),
            PlanningError::DuplicateParameter(name) => {
                write!(f, "Configuration error: duplicate parameter '{}'", name)
            }
            PlanningError::UnsupportedShape(msg) => write!(f, "Unsupported shape: {}", msg),
            PlanningError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            PlanningError::DimensionMismatch(msg) => write!(f, "Dimension mismatch: {}", msg),
            PlanningError::UnboundSymbol(name) => write!(f, "Unbound symbol: {}", name),
            PlanningError::PhaseError(msg) => write!(f, "Phase error: {}", msg),
            PlanningError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
            PlanningError::VisualizationError(msg) => write!(f, "Visualization error: {}", msg),
        }
    }
}

impl std::error::Error for PlanningError {}

/// Result type alias for planning operations
pub type PlanningResult<T> = Result<T, PlanningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlanningError::SplineCountMismatch { expected: 4, found: 3 };
        assert_eq!(
            format!("{}", err),
            "Configuration error: expected 4 splines, found 3"
        );
    }

    #[test]
    fn test_configuration_family() {
        assert!(PlanningError::DuplicateParameter("a".into()).is_configuration_error());
        assert!(PlanningError::ChildNotInitialized("b".into()).is_configuration_error());
        assert!(!PlanningError::UnsupportedShape("c".into()).is_configuration_error());
    }
}

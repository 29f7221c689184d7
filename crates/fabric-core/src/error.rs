//! Error taxonomy for the fabric control plane

use thiserror::Error;

/// Errors returned by caller-facing control plane operations
#[derive(Error, Debug)]
pub enum FabricError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Link not found: {0}")]
    LinkNotFound(String),
    #[error("Job not found: {0}")]
    JobNotFound(String),
    #[error("No path found between {0} and {1}")]
    NoPath(String, String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Insufficient data: need {required} points, have {available}")]
    InsufficientData { required: usize, available: usize },
    #[error("Telemetry failure on link {link}: {reason}")]
    Telemetry { link: String, reason: String },
    #[error("Metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl FabricError {
    /// True for unknown node, link or job ids
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FabricError::NodeNotFound(_) | FabricError::LinkNotFound(_) | FabricError::JobNotFound(_)
        )
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        FabricError::InvalidParameter(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FabricError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_family() {
        assert!(FabricError::NodeNotFound("C9".into()).is_not_found());
        assert!(FabricError::LinkNotFound("C0-S0".into()).is_not_found());
        assert!(FabricError::JobNotFound("job_1".into()).is_not_found());
        assert!(!FabricError::NoPath("C0".into(), "C1".into()).is_not_found());
        assert!(!FabricError::invalid("nodes").is_not_found());
    }

    #[test]
    fn test_error_messages() {
        let err = FabricError::InsufficientData {
            required: 10,
            available: 3,
        };
        assert_eq!(err.to_string(), "Insufficient data: need 10 points, have 3");
        assert_eq!(
            FabricError::NoPath("C0".into(), "C5".into()).to_string(),
            "No path found between C0 and C5"
        );
    }
}

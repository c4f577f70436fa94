use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures raised by the catalog, the scheduler and their collaborators.
#[derive(Debug, Error)]
pub enum FlockError {
    /// A filename did not decode into a segment descriptor.
    #[error("Malformed segment descriptor {}: {reason}", locator.display())]
    MalformedDescriptor { locator: PathBuf, reason: String },

    /// Lookup or discard of a key the catalog does not hold.
    #[error("Segment {generation}:{identity} not found")]
    NotFound { generation: u64, identity: u64 },

    /// The catalog holds no segment to choose from.
    #[error("Segment catalog is empty")]
    EmptyCatalog,

    /// The segment directory could not be listed.
    #[error("Failed to list segment directory {}: {source}", root.display())]
    Listing {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FlockError {
    pub fn malformed(locator: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        FlockError::MalformedDescriptor {
            locator: locator.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn not_found(generation: u64, identity: u64) -> Self {
        FlockError::NotFound {
            generation,
            identity,
        }
    }

    pub fn listing(root: impl AsRef<Path>, source: std::io::Error) -> Self {
        FlockError::Listing {
            root: root.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        FlockError::InvalidConfig(reason.into())
    }
}

pub type FlockResult<T> = std::result::Result<T, FlockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let malformed = FlockError::malformed("/sheep/bad.mp4", "expected 4 or 5 fields");
        assert_eq!(
            malformed.to_string(),
            "Malformed segment descriptor /sheep/bad.mp4: expected 4 or 5 fields"
        );

        assert_eq!(
            FlockError::not_found(3, 14).to_string(),
            "Segment 3:14 not found"
        );
        assert_eq!(FlockError::EmptyCatalog.to_string(), "Segment catalog is empty");
    }

    #[test]
    fn listing_error_keeps_io_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = FlockError::listing("/srv/sheep", io);
        assert!(err.to_string().contains("/srv/sheep"));
        assert!(err.source().is_some());
    }
}

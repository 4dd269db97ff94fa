//! Input validation for ingest parameters and paths.

use std::path::Path;

use anyhow::{anyhow, Result};

/// Validation utilities for ingest-facing inputs
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a batch size for ingestion
    pub fn validate_batch_size(batch_size: usize) -> Result<()> {
        if batch_size == 0 {
            return Err(anyhow!("Batch size must be greater than 0"));
        }

        if batch_size > 100_000 {
            return Err(anyhow!("Batch size too large (max 100,000)"));
        }

        Ok(())
    }

    /// Validate a source export database path
    pub fn validate_source_db_path(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(anyhow!("Source database path does not exist: {path:?}"));
        }

        if !path.is_file() {
            return Err(anyhow!("Source database path is not a file: {path:?}"));
        }

        Ok(())
    }

    /// Validate the base directory for the prepared store
    pub fn validate_base_dir(path: &Path) -> Result<()> {
        if path.to_string_lossy().is_empty() {
            return Err(anyhow!("Base directory cannot be empty"));
        }

        if path.exists() && !path.is_dir() {
            return Err(anyhow!("Base directory is not a directory: {path:?}"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_bounds() {
        assert!(InputValidator::validate_batch_size(0).is_err());
        assert!(InputValidator::validate_batch_size(1).is_ok());
        assert!(InputValidator::validate_batch_size(100_000).is_ok());
        assert!(InputValidator::validate_batch_size(100_001).is_err());
    }

    #[test]
    fn missing_source_path_is_rejected() {
        assert!(
            InputValidator::validate_source_db_path(Path::new("/does/not/exist.db")).is_err()
        );
    }

    #[test]
    fn empty_base_dir_is_rejected() {
        assert!(InputValidator::validate_base_dir(Path::new("")).is_err());
        assert!(InputValidator::validate_base_dir(Path::new("/tmp")).is_ok());
    }
}

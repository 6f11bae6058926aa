use crate::services::error::TransferError;

/// Default upload limit: 100 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Limit used by the older single-request upload path: 10 MiB
pub const LEGACY_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Rejects empty names, empty payloads and payloads over `max_size`.
pub fn validate_upload(filename: &str, size: u64, max_size: u64) -> Result<(), TransferError> {
    if filename.trim().is_empty() {
        return Err(TransferError::validation("File must have a name"));
    }

    if size == 0 {
        return Err(TransferError::validation("Cannot upload empty file"));
    }

    if size > max_size {
        return Err(TransferError::Validation(format!(
            "File size {} bytes exceeds limit of {} bytes ({} MB)",
            size,
            max_size,
            max_size / 1024 / 1024
        )));
    }

    Ok(())
}

/// Longest accepted expiration: ten years.
pub const MAX_EXPIRATION_HOURS: i64 = 10 * 366 * 24;

pub fn validate_expiration_hours(hours: Option<i64>) -> Result<(), TransferError> {
    match hours {
        Some(h) if h <= 0 => Err(TransferError::Validation(format!(
            "expiresInHours must be positive, got {}",
            h
        ))),
        Some(h) if h > MAX_EXPIRATION_HOURS => Err(TransferError::Validation(format!(
            "expiresInHours must be at most {}, got {}",
            MAX_EXPIRATION_HOURS, h
        ))),
        _ => Ok(()),
    }
}

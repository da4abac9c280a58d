use mime::Mime;
use crate::config::QueueConfig;
use super::errors::ValidationError;
use super::types::UploadFile;

/// Checks a batch against the configured limits.
///
/// Checks run in order (empty batch, file count, file size, MIME type) and stop at
/// the first failing class, reporting every file of that class. Accepted files are
/// returned unchanged and in order.
pub fn validate(files: Vec<UploadFile>, config: &QueueConfig) -> Result<Vec<UploadFile>, ValidationError> {
    if files.is_empty() {
        return Err(ValidationError::NoFilesSelected);
    }

    if files.len() > config.max_file_count {
        return Err(ValidationError::TooManyFiles { limit: config.max_file_count });
    }

    let max_size = config.max_file_size_bytes();
    let too_large: Vec<String> = files
        .iter()
        .filter(|file| file.size() > max_size)
        .map(|file| file.name.clone())
        .collect();
    if !too_large.is_empty() {
        return Err(ValidationError::FilesTooLarge {
            files: too_large,
            limit_mb: config.max_file_size_mb,
        });
    }

    let invalid: Vec<String> = files
        .iter()
        .filter(|file| !is_allowed_type(&file.mime_type, &config.allowed_mime_types))
        .map(|file| file.name.clone())
        .collect();
    if !invalid.is_empty() {
        return Err(ValidationError::InvalidFileTypes {
            files: invalid,
            allowed: display_types(&config.allowed_mime_types),
        });
    }

    Ok(files)
}

fn essence(mime_type: &str) -> Option<String> {
    mime_type
        .trim()
        .parse::<Mime>()
        .ok()
        .map(|mime| mime.essence_str().to_ascii_lowercase())
}

fn is_allowed_type(mime_type: &str, allowed: &[String]) -> bool {
    let Some(candidate) = essence(mime_type) else {
        return false;
    };

    allowed
        .iter()
        .filter_map(|allowed| essence(allowed))
        .any(|allowed| allowed == candidate)
}

/// `image/jpeg` renders as `JPEG`.
fn display_types(allowed: &[String]) -> Vec<String> {
    allowed
        .iter()
        .map(|mime_type| {
            let subtype = mime_type
                .split(';')
                .next()
                .and_then(|essence| essence.rsplit('/').next())
                .unwrap_or(mime_type);
            subtype.trim().to_ascii_uppercase()
        })
        .collect()
}

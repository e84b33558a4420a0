use micloud_protocol::MAX_FILE_SIZE;

use crate::TransferError;

/// Checks that a file may be uploaded at all.
///
/// Rejects:
/// - Empty files
/// - Files of [`MAX_FILE_SIZE`] bytes or more
///
/// Runs on the size alone so that nothing is hashed for an upload the
/// server would refuse.
pub fn validate_file_size(size: u64) -> Result<(), TransferError> {
    if size == 0 {
        return Err(TransferError::EmptyFile);
    }
    if size >= MAX_FILE_SIZE {
        return Err(TransferError::SizeLimitExceeded {
            size,
            limit: MAX_FILE_SIZE,
        });
    }
    Ok(())
}

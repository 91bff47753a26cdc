use std::path::PathBuf;

use tokio::{fs, io::AsyncWriteExt};

use crate::{
    error::{CustomCssError, ErrorAction, ErrorKind},
    CustomCssResult,
};

/// Writes content to a specified file, creating the necessary directories and handling errors gracefully.
///
/// The content is first written to a sibling `.tmp` file and then renamed over the target,
/// so readers never observe a half-written file.
///
/// # Arguments
/// - `folder_path` (`PathBuf`): The path to the folder where the file will be created.
///   If the folder doesn't exist, it will be created.
/// - `file_path` (`PathBuf`): The path to the file to be written.
/// - `write_context` (`&[u8]`): The content to be written to the file.
/// - `error_action` (`ErrorAction`): Specifies the action to take if an error occurs.
///
/// # Errors
/// - `FileDirCreationError`: If the directory cannot be created.
/// - `error_file_creation_kind`: If the file cannot be created.
/// - `error_file_write_kind`: If writing or syncing the file fails.
/// - `FileRenameError`: If the temporary file cannot be moved into place.
pub async fn write_file(
    folder_path: PathBuf,
    file_path: PathBuf,
    write_context: &[u8],
    error_action: ErrorAction,
    error_file_creation_kind: ErrorKind,
    error_file_write_kind: ErrorKind,
) -> CustomCssResult<()> {
    tracing::info!("Starting the write operation for file: {:?}", file_path);

    // Ensure the folder path exists or create it.
    fs::create_dir_all(&folder_path).await.map_err(|err| {
        CustomCssError::raise_critical_other_error(
            ErrorKind::FileDirCreationError,
            &err.to_string(),
            error_action.to_owned(),
        )
    })?;

    let mut temp_path = file_path.clone().into_os_string();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    tracing::debug!("Attempting to create file: {:?}", temp_path);

    let mut file = fs::File::create(&temp_path).await.map_err(|err| {
        CustomCssError::raise_critical_other_error(
            error_file_creation_kind,
            &err.to_string(),
            error_action.to_owned(),
        )
    })?;

    tracing::debug!(
        "Writing content to file. Content size: {} bytes.",
        write_context.len()
    );

    file.write_all(write_context).await.map_err(|err| {
        CustomCssError::raise_critical_other_error(
            error_file_write_kind.to_owned(),
            &err.to_string(),
            error_action.to_owned(),
        )
    })?;

    // Ensure all written content is flushed and synced to the storage.
    file.sync_all().await.map_err(|err| {
        CustomCssError::raise_critical_other_error(
            error_file_write_kind,
            &err.to_string(),
            error_action.to_owned(),
        )
    })?;

    drop(file);

    fs::rename(&temp_path, &file_path).await.map_err(|err| {
        CustomCssError::raise_critical_other_error(
            ErrorKind::FileRenameError,
            &err.to_string(),
            error_action,
        )
    })?;

    tracing::info!("Write operation completed successfully for file.");

    Ok(())
}

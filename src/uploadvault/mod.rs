use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexMap;

use crate::{
    error::{CustomCssError, ErrorAction, ErrorKind},
    timekeeper::Timekeeper,
    utils::write_file::write_file,
    CustomCssResult,
};

/// Extensions accepted by default, mapped to their MIME type. Stylesheets are deliberately absent,
/// callers that need them pass them through `extra_mimes` for a single upload.
const DEFAULT_MIMES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("jpe", "image/jpeg"),
    ("gif", "image/gif"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
];

/// Result of a successful upload.
#[derive(Clone, PartialEq, Debug)]
pub struct UploadedFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Public URL.
    pub url: String,
    /// Path relative to the uploads root, with a leading `/` (e.g. `/2012/02/custom-1329690974.css`).
    pub relative: String,
    pub mime: String,
}

/// File storage for uploaded assets.
///
/// Files land in `base_dir`, optionally bucketed into `YYYY/MM` folders, and are served from
/// `base_url`. Uploads never overwrite an existing file: a clashing name gets a `-N` suffix.
#[derive(Debug)]
pub struct UploadVault {
    base_dir: PathBuf,
    base_url: String,
    use_year_month_folders: bool,
    allowed_mimes: IndexMap<String, String>,
    timekeeper: Arc<dyn Timekeeper>,
}

impl UploadVault {
    /// Creates a vault writing below `base_dir` and serving from `base_url` (a trailing `/` is
    /// dropped). The default MIME allow-list is installed.
    pub fn new(
        base_dir: PathBuf,
        base_url: &str,
        use_year_month_folders: bool,
        timekeeper: Arc<dyn Timekeeper>,
    ) -> Self {
        let allowed_mimes = DEFAULT_MIMES
            .iter()
            .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
            .collect();

        tracing::info!(
            "Upload vault rooted at {:?}, served from {}, year/month folders: {}",
            base_dir,
            base_url,
            use_year_month_folders
        );

        Self {
            base_dir,
            base_url: base_url.trim_end_matches('/').to_string(),
            use_year_month_folders,
            allowed_mimes,
            timekeeper,
        }
    }

    /// Absolute URL of a storage-relative path.
    pub fn url_for(&self, relative: &str) -> String {
        format!("{}{}", self.base_url, relative)
    }

    /// Looks up the MIME type for `filename` in the default allow-list extended by `extra_mimes`.
    pub fn mime_for(&self, filename: &str, extra_mimes: &[(&str, &str)]) -> Option<String> {
        let (_, extension) = filename.rsplit_once('.')?;
        let extension = extension.to_ascii_lowercase();

        extra_mimes
            .iter()
            .find(|(ext, _)| ext.eq_ignore_ascii_case(&extension))
            .map(|(_, mime)| mime.to_string())
            .or_else(|| self.allowed_mimes.get(&extension).cloned())
    }

    /// The folder new uploads go to, relative to the root (`""` or `/YYYY/MM`).
    pub fn current_subdir(&self) -> String {
        if self.use_year_month_folders {
            self.timekeeper.now().format("/%Y/%m").to_string()
        } else {
            String::new()
        }
    }

    /// Writes `bits` under `filename` into the current upload folder.
    ///
    /// `extra_mimes` widens the allow-list for this call only.
    pub async fn upload_bits(
        &self,
        filename: &str,
        bits: &[u8],
        extra_mimes: &[(&str, &str)],
    ) -> CustomCssResult<UploadedFile> {
        if filename.is_empty()
            || filename.starts_with('.')
            || filename.contains(['/', '\\'])
        {
            return Err(CustomCssError::raise_general_storage_error(
                ErrorKind::InvalidUploadPath,
                &format!("Invalid file name: {}", filename),
                ErrorAction::Fix,
            ));
        }

        let mime = self.mime_for(filename, extra_mimes).ok_or_else(|| {
            CustomCssError::raise_general_storage_error(
                ErrorKind::DisallowedFileType,
                &format!("Sorry, this file type is not permitted: {}", filename),
                ErrorAction::Notify,
            )
        })?;

        let subdir = self.current_subdir();
        let folder_path = self.base_dir.join(subdir.trim_start_matches('/'));

        tokio::fs::create_dir_all(&folder_path).await.map_err(|err| {
            CustomCssError::raise_general_storage_error(
                ErrorKind::UploadDirCreationFailed,
                &format!(
                    "Unable to create directory {}. Is its parent directory writable by the server? ({})",
                    folder_path.display(),
                    err
                ),
                ErrorAction::Notify,
            )
        })?;

        let unique_name = self.unique_filename(&folder_path, filename).await;
        let file_path = folder_path.join(&unique_name);

        tracing::debug!("Uploading {} bytes to {:?}", bits.len(), file_path);

        write_file(
            folder_path,
            file_path.clone(),
            bits,
            ErrorAction::Notify,
            ErrorKind::FileCreationError,
            ErrorKind::UploadFileWriteError,
        )
        .await
        .map_err(|err| {
            CustomCssError::raise_general_storage_error(
                ErrorKind::UploadFileWriteError,
                &format!("Could not write file {}: {}", unique_name, err.get_message()),
                ErrorAction::Notify,
            )
        })?;

        let relative = format!("{}/{}", subdir, unique_name);

        tracing::info!("Uploaded {} ({})", relative, mime);

        Ok(UploadedFile {
            path: file_path,
            url: self.url_for(&relative),
            relative,
            mime,
        })
    }

    /// Picks `filename` when no file in `folder_path` shares its stem, otherwise `stem-N.ext` with
    /// `N` one past the highest suffix present. A name freed by a deletion is not handed out again
    /// while a later sibling still exists.
    async fn unique_filename(&self, folder_path: &Path, filename: &str) -> String {
        let (stem, extension) = match filename.rsplit_once('.') {
            Some((stem, extension)) => (stem, format!(".{}", extension)),
            None => (filename, String::new()),
        };

        let mut highest: Option<u64> = None;

        if let Ok(mut entries) = tokio::fs::read_dir(folder_path).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name().to_string_lossy().into_owned();

                let Some(suffix) = name
                    .strip_prefix(stem)
                    .and_then(|rest| rest.strip_suffix(extension.as_str()))
                else {
                    continue;
                };

                let index = if suffix.is_empty() {
                    Some(0)
                } else {
                    suffix
                        .strip_prefix('-')
                        .and_then(|counter| counter.parse::<u64>().ok())
                };

                if let Some(index) = index {
                    highest = Some(highest.map_or(index, |current| current.max(index)));
                }
            }
        }

        match highest {
            None => filename.to_string(),
            Some(index) => format!("{}-{}{}", stem, index + 1, extension),
        }
    }

    /// Maps a storage-relative path to an absolute one, refusing anything that escapes the root.
    pub fn resolve(&self, relative: &str) -> CustomCssResult<PathBuf> {
        let mut resolved = self.base_dir.clone();

        for component in relative.split(['/', '\\']).filter(|c| !c.is_empty()) {
            if component == ".." || component == "." {
                return Err(CustomCssError::raise_general_storage_error(
                    ErrorKind::InvalidUploadPath,
                    &format!("Refusing to resolve upload path: {}", relative),
                    ErrorAction::Ignore,
                ));
            }

            resolved.push(component);
        }

        Ok(resolved)
    }

    /// Whether anything (file or folder) exists at `relative`. Paths escaping the root never exist.
    pub async fn exists(&self, relative: &str) -> bool {
        match self.resolve(relative) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Whether `relative` names a regular file inside the root.
    pub async fn is_file(&self, relative: &str) -> bool {
        match self.resolve(relative) {
            Ok(path) => tokio::fs::metadata(path)
                .await
                .map(|metadata| metadata.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Removes the file at `relative`.
    ///
    /// # Errors
    ///
    /// `InvalidUploadPath` when the path escapes the root, `FileDeletionFailed` when the file
    /// cannot be removed (including when it does not exist).
    pub async fn delete(&self, relative: &str) -> CustomCssResult<()> {
        let path = self.resolve(relative)?;

        tokio::fs::remove_file(&path).await.map_err(|err| {
            CustomCssError::raise_general_storage_error(
                ErrorKind::FileDeletionFailed,
                &format!("Could not delete {}: {}", path.display(), err),
                ErrorAction::Ignore,
            )
        })
    }

    /// Reads the whole file at `relative`.
    ///
    /// # Errors
    ///
    /// `InvalidUploadPath` when the path escapes the root, `FileReadFailed` otherwise.
    pub async fn read(&self, relative: &str) -> CustomCssResult<Vec<u8>> {
        let path = self.resolve(relative)?;

        tokio::fs::read(&path).await.map_err(|err| {
            CustomCssError::raise_general_storage_error(
                ErrorKind::FileReadFailed,
                &format!("Could not read {}: {}", path.display(), err),
                ErrorAction::Ignore,
            )
        })
    }
}

use std::fmt;

use tracing::error;

/// Enum representing errors in the Custom CSS system. It can be either a `CriticalError` or a `GeneralError`,
/// each wrapping a specific type of error information.
#[derive(Clone, PartialEq, Debug)]
pub enum CustomCssError {
    /// A critical error, often representing a severe issue in the system.
    CriticalError(CustomCssErrorType),
    /// A general error, usually representing non-fatal issues that can be handled more gracefully.
    GeneralError(CustomCssErrorType),
}

impl fmt::Display for CustomCssError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TYPE: {:?}\nKIND: {:?}\nACTION: {:?}\nMESSAGE: {}",
            self.get_type(),
            self.get_kind(),
            self.get_action(),
            self.get_message()
        )
    }
}

impl std::error::Error for CustomCssError {}

impl From<CustomCssError> for std::io::Error {
    fn from(err: CustomCssError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
    }
}

impl CustomCssError {
    /// Checks if the error is a critical error.
    pub fn is_critical(&self) -> bool {
        matches!(self, CustomCssError::CriticalError(_))
    }

    /// Checks if the error is a general error.
    pub fn is_general(&self) -> bool {
        matches!(self, CustomCssError::GeneralError(_))
    }

    /// Returns the action associated with this error.
    pub fn get_action(&self) -> ErrorAction {
        match self {
            CustomCssError::CriticalError(err) => err.get_action(),
            CustomCssError::GeneralError(err) => err.get_action(),
        }
    }

    /// Retrieves the error message associated with the error.
    pub fn get_message(&self) -> String {
        match self {
            CustomCssError::CriticalError(err) => err.get_message(),
            CustomCssError::GeneralError(err) => err.get_message(),
        }
    }

    /// Retrieves the kind of the error.
    pub fn get_kind(&self) -> ErrorKind {
        match self {
            CustomCssError::CriticalError(err) => err.get_kind(),
            CustomCssError::GeneralError(err) => err.get_kind(),
        }
    }

    /// Retrieves the type of the error.
    pub fn get_type(&self) -> ErrorType {
        match self {
            CustomCssError::CriticalError(err) => err.get_type(),
            CustomCssError::GeneralError(err) => err.get_type(),
        }
    }

    /// ==============================================================================================================
    ///
    /// Each `raise_*` function pins both the severity (critical vs. general) and the layer the error
    /// comes from (option store, upload storage, dashboard screen, server, runtime), so a call site such as
    ///
    /// fn publish() -> CustomCssResult<()> {
    ///     Err(CustomCssError::raise_general_storage_error(kind, message, action))
    /// }
    ///
    /// reads as "a recoverable upload storage failure" without inspecting the payload.
    ///
    /// ==============================================================================================================

    /// Raises a critical error related to the option store.
    pub fn raise_critical_store_error(kind: ErrorKind, message: &str, action: ErrorAction) -> Self {
        error!(
            "Critical Option Store Error raised. Kind: {:?}, Message: '{}', Action: {:?}",
            kind, message, action
        );

        CustomCssError::CriticalError(CustomCssErrorType::StoreError {
            kind,
            message: message.to_string(),
            action,
        })
    }

    /// Raises a critical error related to the HTTP server.
    pub fn raise_critical_server_error(
        kind: ErrorKind,
        message: &str,
        action: ErrorAction,
    ) -> Self {
        error!(
            "Critical Server Error raised. Kind: {:?}, Message: '{}', Action: {:?}",
            kind, message, action
        );

        CustomCssError::CriticalError(CustomCssErrorType::ServerError {
            kind,
            message: message.to_string(),
            action,
        })
    }

    /// Raises a critical error related to a runtime issue.
    pub fn raise_critical_runtime_error(
        kind: ErrorKind,
        message: &str,
        action: ErrorAction,
    ) -> Self {
        error!(
            "Critical Custom CSS Runtime Error raised. Kind: {:?}, Message: '{}', Action: {:?}",
            kind, message, action
        );

        CustomCssError::CriticalError(CustomCssErrorType::RuntimeError {
            kind,
            message: message.to_string(),
            action,
        })
    }

    /// Raises a critical error related to an unspecified issue.
    pub fn raise_critical_other_error(kind: ErrorKind, message: &str, action: ErrorAction) -> Self {
        error!(
            "Critical Error raised. Kind: {:?}, Message: '{}', Action: {:?}",
            kind, message, action
        );

        CustomCssError::CriticalError(CustomCssErrorType::OtherError {
            kind,
            message: message.to_string(),
            action,
        })
    }

    /// Raises a general error related to the option store.
    pub fn raise_general_store_error(kind: ErrorKind, message: &str, action: ErrorAction) -> Self {
        error!(
            "General Option Store Error raised. Kind: {:?}, Message: '{}', Action: {:?}",
            kind, message, action
        );

        CustomCssError::GeneralError(CustomCssErrorType::StoreError {
            kind,
            message: message.to_string(),
            action,
        })
    }

    /// Raises a general error related to the upload storage.
    pub fn raise_general_storage_error(
        kind: ErrorKind,
        message: &str,
        action: ErrorAction,
    ) -> Self {
        error!(
            "General Upload Storage Error raised. Kind: {:?}, Message: '{}', Action: {:?}",
            kind, message, action
        );

        CustomCssError::GeneralError(CustomCssErrorType::StorageError {
            kind,
            message: message.to_string(),
            action,
        })
    }

    /// Raises a general error related to a dashboard screen.
    ///
    /// Access denials land here, they are shown inline on the screen and never mutate state.
    pub fn raise_general_screen_error(
        kind: ErrorKind,
        message: &str,
        action: ErrorAction,
    ) -> Self {
        error!(
            "General Dashboard Screen Error raised. Kind: {:?}, Message: '{}', Action: {:?}",
            kind, message, action
        );

        CustomCssError::GeneralError(CustomCssErrorType::ScreenError {
            kind,
            message: message.to_string(),
            action,
        })
    }

    /// Raises a general error related to the HTTP server.
    pub fn raise_general_server_error(
        kind: ErrorKind,
        message: &str,
        action: ErrorAction,
    ) -> Self {
        error!(
            "General Server Error raised. Kind: {:?}, Message: '{}', Action: {:?}",
            kind, message, action
        );

        CustomCssError::GeneralError(CustomCssErrorType::ServerError {
            kind,
            message: message.to_string(),
            action,
        })
    }
}

/// The `CustomCssErrorType` enum represents the layer an error originated from.
/// Each variant contains information about the error kind, message, and action to take upon encountering the error.
#[derive(Clone, PartialEq, Debug)]
pub enum CustomCssErrorType {
    /// Represents an error that occurred while reading or persisting options.
    StoreError {
        kind: ErrorKind,
        message: String,
        action: ErrorAction,
    },
    /// Represents an error that occurred while writing, reading or deleting uploaded files.
    StorageError {
        kind: ErrorKind,
        message: String,
        action: ErrorAction,
    },
    /// Represents an error that occurred while serving or saving a dashboard screen.
    ScreenError {
        kind: ErrorKind,
        message: String,
        action: ErrorAction,
    },
    /// Represents an error that occurred in the HTTP server.
    ServerError {
        kind: ErrorKind,
        message: String,
        action: ErrorAction,
    },
    /// Represents an error that occurred during runtime setup.
    RuntimeError {
        kind: ErrorKind,
        message: String,
        action: ErrorAction,
    },
    /// Represents any other type of error that doesn't fit the above categories.
    OtherError {
        kind: ErrorKind,
        message: String,
        action: ErrorAction,
    },
}

impl CustomCssErrorType {
    /// Retrieves the action to take for this error.
    pub fn get_action(&self) -> ErrorAction {
        match self {
            CustomCssErrorType::StoreError { action, .. } => action.clone(),
            CustomCssErrorType::StorageError { action, .. } => action.clone(),
            CustomCssErrorType::ScreenError { action, .. } => action.clone(),
            CustomCssErrorType::ServerError { action, .. } => action.clone(),
            CustomCssErrorType::RuntimeError { action, .. } => action.clone(),
            CustomCssErrorType::OtherError { action, .. } => action.clone(),
        }
    }

    /// Retrieves the message describing the error.
    pub fn get_message(&self) -> String {
        match self {
            CustomCssErrorType::StoreError { message, .. } => message.clone(),
            CustomCssErrorType::StorageError { message, .. } => message.clone(),
            CustomCssErrorType::ScreenError { message, .. } => message.clone(),
            CustomCssErrorType::ServerError { message, .. } => message.clone(),
            CustomCssErrorType::RuntimeError { message, .. } => message.clone(),
            CustomCssErrorType::OtherError { message, .. } => message.clone(),
        }
    }

    /// Retrieves the kind of error that occurred.
    pub fn get_kind(&self) -> ErrorKind {
        match self {
            CustomCssErrorType::StoreError { kind, .. } => kind.clone(),
            CustomCssErrorType::StorageError { kind, .. } => kind.clone(),
            CustomCssErrorType::ScreenError { kind, .. } => kind.clone(),
            CustomCssErrorType::ServerError { kind, .. } => kind.clone(),
            CustomCssErrorType::RuntimeError { kind, .. } => kind.clone(),
            CustomCssErrorType::OtherError { kind, .. } => kind.clone(),
        }
    }

    /// Retrieves the layer the error came from.
    pub fn get_type(&self) -> ErrorType {
        match self {
            CustomCssErrorType::StoreError { .. } => ErrorType::StoreError,
            CustomCssErrorType::StorageError { .. } => ErrorType::StorageError,
            CustomCssErrorType::ScreenError { .. } => ErrorType::ScreenError,
            CustomCssErrorType::ServerError { .. } => ErrorType::ServerError,
            CustomCssErrorType::RuntimeError { .. } => ErrorType::RuntimeError,
            CustomCssErrorType::OtherError { .. } => ErrorType::OtherError,
        }
    }
}

/// The `ErrorAction` enum defines possible actions to take when an error occurs.
#[derive(Clone, PartialEq, Debug)]
pub enum ErrorAction {
    /// Ignore the error and continue without intervention.
    Ignore,
    /// Notify the user or system administrator of the error.
    Notify,
    Exit,
    Fix,
}

/// The `ErrorType` enum categorizes errors by the layer they originated from.
#[derive(Clone, PartialEq, Debug)]
pub enum ErrorType {
    StoreError,
    StorageError,
    ScreenError,
    ServerError,
    RuntimeError,
    OtherError,
}

/// The `ErrorKind` enum defines the specific kind of error that occurred.
#[derive(Clone, PartialEq, Debug)]
pub enum ErrorKind {
    TracingSubscriberInitializationFailed,
    ConfigFileReadError,
    ConfigFileParsingError,
    OptionsFileReadError,
    OptionsFileParsingError,
    OptionsSerializationError,
    OptionsFileWriteError,
    FileDirCreationError,
    FileCreationError,
    FileWriteError,
    FileRenameError,
    FileReadFailed,
    FileDeletionFailed,
    DisallowedFileType,
    InvalidUploadPath,
    UploadDirCreationFailed,
    UploadFileWriteError,
    PublishFailed,
    AccessDenied,
    NonceVerificationFailed,
    UnknownAdminAction,
    SocketAddressBindingError,
    ServerLocalAddrFetchFailed,
    ServerRunFailed,
    Other,
}

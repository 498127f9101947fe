//! Error types for hcrt

use crate::runtime::DeviceType;
use std::fmt;
use thiserror::Error;

/// Result type alias using hcrt's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Error classification delivered to the process-wide error callback.
///
/// Values are stable: they are part of the C ABI.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No error
    NoError = 0,
    /// Failure of unknown origin (panics, unclassified errors)
    UnknownError = 1,
    /// An argument value is out of range
    InvalidArgument = 2,
    /// Precondition or logic violation
    InvalidOperation = 3,
    /// The requested back-end or feature is not available in this build
    NotSupported = 4,
    /// The back-end driver reported a failure
    DeviceFailure = 5,
    /// Host or device memory exhausted
    OutOfMemory = 6,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NoError => "no error",
            ErrorKind::UnknownError => "unknown error",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::InvalidOperation => "invalid operation",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::DeviceFailure => "device failure",
            ErrorKind::OutOfMemory => "out of memory",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in hcrt operations
#[derive(Error, Debug)]
pub enum Error {
    /// Back-end was not compiled into this build
    #[error("{0} support not enabled")]
    BackendNotEnabled(DeviceType),

    /// Back-end compiled in but unusable on this machine
    #[error("{device_type} back-end unavailable: {reason}")]
    BackendUnavailable {
        /// Back-end family
        device_type: DeviceType,
        /// Why initialization failed
        reason: String,
    },

    /// Raw device type value outside the known set
    #[error("Unknown device type queried ({0})")]
    UnknownDeviceType(u32),

    /// AUTO was passed where an explicit back-end is required
    #[error("Device type must be specified")]
    DeviceTypeRequired,

    /// Device index outside the enumerated range
    #[error("Device index {index} out of range: {count} {device_type} device(s) available")]
    DeviceIndexOutOfRange {
        /// Back-end family
        device_type: DeviceType,
        /// Requested index
        index: u32,
        /// Number of devices
        count: u32,
    },

    /// Required pointer argument was null
    #[error("{0} cannot be null")]
    NullPointer(&'static str),

    /// Handle does not name a live object
    #[error("Invalid handle {0:#x}: object does not exist or was released")]
    InvalidHandle(u64),

    /// Handle names an object of another kind
    #[error("Handle {handle:#x} refers to a {found}, expected a {expected}")]
    HandleKindMismatch {
        /// Raw handle value
        handle: u64,
        /// Kind expected by the caller
        expected: &'static str,
        /// Kind stored in the registry
        found: &'static str,
    },

    /// Object belongs to another back-end family
    #[error("Object created by a {found} back-end cannot be used with a {expected} device")]
    BackendMismatch {
        /// Back-end of the device in use
        expected: DeviceType,
        /// Back-end that created the object
        found: DeviceType,
    },

    /// Allocation type not acceptable for a device memory view
    #[error("Unsupported memory allocation type requested ({0})")]
    UnsupportedAllocationType(u32),

    /// Context memory views must be shared
    #[error("Only shared memory allocation is allowed for context")]
    ContextRequiresShared,

    /// Copy larger than the destination view
    #[error("Requested copy size is bigger than destination buffer size ({size} > {capacity})")]
    CopyExceedsDestination {
        /// Requested bytes
        size: usize,
        /// Destination view size
        capacity: usize,
    },

    /// Copy larger than the source view
    #[error("Requested copy size is bigger than source buffer size ({size} > {capacity})")]
    CopyExceedsSource {
        /// Requested bytes
        size: usize,
        /// Source view size
        capacity: usize,
    },

    /// Host transfer requested on a view without host memory
    #[error("Memory view of {size} bytes has no host side; {operation} requires a shared view")]
    NoHostMemory {
        /// Operation attempted
        operation: &'static str,
        /// View size
        size: usize,
    },

    /// Module file could not be loaded
    #[error("Failed to load module '{path}': {reason}")]
    ModuleLoad {
        /// Path as given or resolved
        path: String,
        /// Loader message
        reason: String,
    },

    /// Linking requested with no modules
    #[error("At least one module is required for linking")]
    EmptyModuleList,

    /// Symbol missing from a module and its link peers
    #[error("Symbol '{0}' not found in module")]
    SymbolNotFound(String),

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },

    /// Back-end specific error
    #[error("Backend error: {0}")]
    Backend(String),

    /// An enqueued operation failed while executing
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Typed runtime failure with an explicit kind
    #[error("{message}")]
    Runtime {
        /// Classification forwarded to the callback
        kind: ErrorKind,
        /// Message forwarded to the callback
        message: String,
    },

    /// Runtime machinery failed, such as a worker thread that could not start
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a typed runtime error
    pub fn runtime(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Runtime {
            kind,
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Create a module load error
    pub fn module_load(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::ModuleLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Classification reported across the C boundary
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BackendNotEnabled(_) | Error::BackendUnavailable { .. } => {
                ErrorKind::NotSupported
            }
            Error::UnknownDeviceType(_)
            | Error::DeviceIndexOutOfRange { .. }
            | Error::SymbolNotFound(_)
            | Error::ModuleLoad { .. }
            | Error::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Error::DeviceTypeRequired
            | Error::NullPointer(_)
            | Error::InvalidHandle(_)
            | Error::HandleKindMismatch { .. }
            | Error::BackendMismatch { .. }
            | Error::UnsupportedAllocationType(_)
            | Error::ContextRequiresShared
            | Error::EmptyModuleList
            | Error::CopyExceedsDestination { .. }
            | Error::CopyExceedsSource { .. }
            | Error::NoHostMemory { .. } => ErrorKind::InvalidOperation,
            Error::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Error::Backend(_) | Error::Execution(_) => ErrorKind::DeviceFailure,
            Error::Runtime { kind, .. } => *kind,
            Error::Internal(_) => ErrorKind::UnknownError,
        }
    }
}

/// Message carried by a caught panic, if it is a `&str` or `String`
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> Option<String> {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Some((*s).to_string())
    } else {
        payload.downcast_ref::<String>().cloned()
    }
}

#[cfg(feature = "cuda")]
impl From<cudarc::driver::DriverError> for Error {
    fn from(err: cudarc::driver::DriverError) -> Self {
        Error::Backend(format!("CUDA driver error: {:?}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_errors_are_invalid_operation() {
        let errors = [
            Error::DeviceTypeRequired,
            Error::NullPointer("info"),
            Error::ContextRequiresShared,
            Error::CopyExceedsDestination {
                size: 16,
                capacity: 8,
            },
            Error::CopyExceedsSource {
                size: 16,
                capacity: 8,
            },
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::InvalidOperation, "{}", err);
        }
    }

    #[test]
    fn test_runtime_error_keeps_kind_and_message() {
        let err = Error::runtime(ErrorKind::DeviceFailure, "queue lost");
        assert_eq!(err.kind(), ErrorKind::DeviceFailure);
        assert_eq!(err.to_string(), "queue lost");
    }

    #[test]
    fn test_internal_error_is_unknown_at_the_boundary() {
        let err = Error::Internal("thread spawn failed".to_string());
        assert_eq!(err.kind(), ErrorKind::UnknownError);
        assert!(err.to_string().contains("thread spawn failed"));
    }

    #[test]
    fn test_messages_match_boundary_contract() {
        assert_eq!(
            Error::BackendNotEnabled(DeviceType::Gpu).to_string(),
            "GPU support not enabled"
        );
        assert_eq!(
            Error::ContextRequiresShared.to_string(),
            "Only shared memory allocation is allowed for context"
        );
        assert!(
            Error::CopyExceedsSource {
                size: 9,
                capacity: 4
            }
            .to_string()
            .starts_with("Requested copy size is bigger than source buffer size")
        );
    }
}

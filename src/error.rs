//! The error model shared by every layer of the runtime.
//!
//! An [`ErrorCode`] is the on-wire representation of a failure: a
//! `(category_index, value)` pair that is resolved against a per-context
//! [`CategoryRegistry`]. [`RpcError`] is the typed, in-process error raised
//! by the engine itself; it knows how to fold itself into an [`ErrorCode`]
//! for transmission, and a registry knows how to substitute a safe fallback
//! when asked to transmit a code from a category it was never told about.
//!
//! This mirrors the categorized-errno design the original C++ `logicmill`
//! project used (`util::error_context`), but replaces the singleton default
//! category table with an explicit, constructible registry per §9's
//! "avoid process-globals" design note.

use thiserror::Error;

/// Category index reserved for portable OS/errno-space errors.
pub const CATEGORY_OS: u32 = 0;
/// Category index reserved for the POSIX-generic error domain.
pub const CATEGORY_POSIX: u32 = 1;

/// A categorized error code as carried on the wire: `[category_index, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    pub category_index: u32,
    pub value: i32,
}

impl ErrorCode {
    pub fn new(category_index: u32, value: i32) -> Self {
        Self { category_index, value }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error[{}:{}]", self.category_index, self.value)
    }
}

/// Discriminant values within the built-in RPC-runtime category.
///
/// These are stable across versions of this crate: they are transmitted
/// on the wire and must mean the same thing to every peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RuntimeErrorValue {
    InvalidChannelId = 1,
    ChannelClosed = 2,
    ContextClosed = 3,
    NoEventLoop = 4,
    NoTargetProvided = 5,
    NoImplementationInstanceRegistered = 6,
    InvalidArgumentCount = 7,
    UncaughtServerException = 8,
    ExceptionThrownByMethodStub = 9,
    ClientClosed = 10,
    InvalidErrCategory = 11,
    TimedOut = 12,
    NotWritable = 13,
    AlreadyReading = 14,
    CannotResumeRead = 15,
}

/// Discriminant values within the built-in codec category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CodecErrorValue {
    ReadPastEndOfStream = 1,
    TypeError = 2,
    MemberCountError = 3,
    InvalidPtrDowncast = 4,
    NoBufferSpace = 5,
    OperationNotSupported = 6,
}

/// The RPC-runtime error taxonomy (§7).
///
/// Every variant here is a local programming error or a cancellation
/// reason; none of these are thrown across an async boundary, per the
/// propagation policy in §7 — they are always folded into an error reply
/// or a handler cancellation before they leave the reactor turn that
/// produced them.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("channel id {0} does not resolve in this context")]
    InvalidChannelId(u64),
    #[error("channel {0} was closed while a request was in flight")]
    ChannelClosed(u64),
    #[error("the enclosing context was shut down")]
    ContextClosed,
    #[error("the reactor was torn down; there is no way to dispatch")]
    NoEventLoop,
    #[error("a connection was accepted but no target handler was registered")]
    NoTargetProvided,
    #[error("no implementation instance is registered for channel {0}")]
    NoImplementationInstanceRegistered(u64),
    #[error("method expected {expected} arguments, request carried {actual}")]
    InvalidArgumentCount { expected: usize, actual: usize },
    #[error("uncaught exception escaped a server method body")]
    UncaughtServerException,
    #[error("argument decode failed in method stub: {0}")]
    ExceptionThrownByMethodStub(String),
    #[error("client context was dropped with handlers still outstanding")]
    ClientClosed,
    #[error("attempted to transmit an error whose category is not registered")]
    InvalidErrCategory,
    #[error("request timed out")]
    TimedOut,
    #[error("write attempted while the downstream back-pressure signal is stopped")]
    NotWritable,
    #[error("start_read called while a read pump is already running")]
    AlreadyReading,
    #[error("resume_read called without a prior stop_read")]
    CannotResumeRead,
    #[error(transparent)]
    Codec(#[from] crate::codec::CodecError),
    /// A user method's own failure, carrying a category/value pair from a
    /// category declared in the context's [`CategoryRegistry`] (§7
    /// "application errors"). Passed through unchanged by `to_error_code`
    /// except for the registry's usual unregistered-category substitution.
    #[error("application error {0}")]
    Application(ErrorCode),
}

impl RpcError {
    /// Folds this error into a wire-ready [`ErrorCode`] using `registry` to
    /// resolve the runtime/codec category indices.
    pub fn to_error_code(&self, registry: &CategoryRegistry) -> ErrorCode {
        use RpcError::*;
        if let Codec(c) = self {
            return c.to_error_code(registry);
        }
        if let Application(code) = self {
            return registry.encode_error(*code);
        }
        let value = match self {
            InvalidChannelId(_) => RuntimeErrorValue::InvalidChannelId,
            ChannelClosed(_) => RuntimeErrorValue::ChannelClosed,
            ContextClosed => RuntimeErrorValue::ContextClosed,
            NoEventLoop => RuntimeErrorValue::NoEventLoop,
            NoTargetProvided => RuntimeErrorValue::NoTargetProvided,
            NoImplementationInstanceRegistered(_) => {
                RuntimeErrorValue::NoImplementationInstanceRegistered
            }
            InvalidArgumentCount { .. } => RuntimeErrorValue::InvalidArgumentCount,
            UncaughtServerException => RuntimeErrorValue::UncaughtServerException,
            ExceptionThrownByMethodStub(_) => RuntimeErrorValue::ExceptionThrownByMethodStub,
            ClientClosed => RuntimeErrorValue::ClientClosed,
            InvalidErrCategory => RuntimeErrorValue::InvalidErrCategory,
            TimedOut => RuntimeErrorValue::TimedOut,
            NotWritable => RuntimeErrorValue::NotWritable,
            AlreadyReading => RuntimeErrorValue::AlreadyReading,
            CannotResumeRead => RuntimeErrorValue::CannotResumeRead,
            Codec(_) => unreachable!("handled above"),
            Application(_) => unreachable!("handled above"),
        };
        ErrorCode::new(registry.runtime_index(), value as i32)
    }
}

/// Per-[`StreamContext`](crate::codec::StreamContext) table mapping a
/// category index to its name.
///
/// Index 0 is always the OS category, index 1 the POSIX-generic category
/// (§6). Indices from there are the user-declared categories, in the order
/// passed to [`CategoryRegistry::new`]. The RPC-runtime and codec
/// categories are appended automatically if the caller did not declare them
/// under those exact names, so there is always a safe index to fall back to
/// (§4.1 "Error codes on the wire").
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    names: Vec<String>,
    runtime_index: u32,
    codec_index: u32,
}

const RUNTIME_CATEGORY_NAME: &str = "armi_rpc::runtime";
const CODEC_CATEGORY_NAME: &str = "armi_rpc::codec";

impl CategoryRegistry {
    /// Builds a registry with the OS and POSIX-generic categories fixed at
    /// indices 0 and 1, the given user categories appended in order, and
    /// the runtime/codec categories reserved at the end unless the caller
    /// already declared them under their reserved names.
    pub fn new<I, S>(user_categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = vec!["os".to_string(), "posix".to_string()];
        names.extend(user_categories.into_iter().map(Into::into));

        let runtime_index = Self::reserve(&mut names, RUNTIME_CATEGORY_NAME);
        let codec_index = Self::reserve(&mut names, CODEC_CATEGORY_NAME);

        Self { names, runtime_index, codec_index }
    }

    fn reserve(names: &mut Vec<String>, reserved_name: &str) -> u32 {
        match names.iter().position(|n| n == reserved_name) {
            Some(pos) => pos as u32,
            None => {
                names.push(reserved_name.to_string());
                (names.len() - 1) as u32
            }
        }
    }

    pub fn runtime_index(&self) -> u32 {
        self.runtime_index
    }

    pub fn codec_index(&self) -> u32 {
        self.codec_index
    }

    pub fn is_registered(&self, category_index: u32) -> bool {
        (category_index as usize) < self.names.len()
    }

    pub fn name(&self, category_index: u32) -> Option<&str> {
        self.names.get(category_index as usize).map(String::as_str)
    }

    /// Resolves `code` for transmission: passes it through unchanged if its
    /// category is registered, otherwise substitutes
    /// `[runtime_index, invalid_err_category]` per §4.1/§6.
    pub fn encode_error(&self, code: ErrorCode) -> ErrorCode {
        if self.is_registered(code.category_index) {
            code
        } else {
            ErrorCode::new(self.runtime_index, RuntimeErrorValue::InvalidErrCategory as i32)
        }
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_error_passes_through_a_registered_category() {
        let reg = CategoryRegistry::new(["sun"]);
        let code = RpcError::Application(ErrorCode::new(2, 2)).to_error_code(&reg);
        assert_eq!(code, ErrorCode::new(2, 2));
    }

    #[test]
    fn application_error_falls_back_when_category_is_unregistered() {
        let reg = CategoryRegistry::default();
        let code = RpcError::Application(ErrorCode::new(2, 2)).to_error_code(&reg);
        assert_eq!(code.category_index, reg.runtime_index());
        assert_eq!(code.value, RuntimeErrorValue::InvalidErrCategory as i32);
    }

    #[test]
    fn registry_reserves_runtime_and_codec_categories() {
        let reg = CategoryRegistry::new(["billing"]);
        assert_eq!(reg.name(0), Some("os"));
        assert_eq!(reg.name(1), Some("posix"));
        assert_eq!(reg.name(2), Some("billing"));
        assert!(reg.is_registered(reg.runtime_index()));
        assert!(reg.is_registered(reg.codec_index()));
    }

    #[test]
    fn unregistered_category_falls_back_to_invalid_err_category() {
        let reg = CategoryRegistry::new(std::iter::empty::<String>());
        let bogus = ErrorCode::new(99, 2);
        let resolved = reg.encode_error(bogus);
        assert_eq!(resolved.category_index, reg.runtime_index());
        assert_eq!(resolved.value, RuntimeErrorValue::InvalidErrCategory as i32);
    }

    #[test]
    fn registered_category_passes_through_unchanged() {
        let reg = CategoryRegistry::new(["sun"]);
        let code = ErrorCode::new(2, 2);
        assert_eq!(reg.encode_error(code), code);
    }
}

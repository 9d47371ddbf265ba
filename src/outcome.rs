use crate::error::GraphError;
use core::any::Any;
use core::fmt;
use core::num::NonZeroI32;
use derive_more::Display;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// An opaque failure code paired with a namespace tag.
///
/// The code is `NonZeroI32`: a "no-error error" cannot be constructed, the
/// same way a zero task id cannot exist.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash)]
#[display("{domain}:{code}")]
pub struct ErrorCode {
    domain: &'static str,
    code: NonZeroI32,
}

impl ErrorCode {
    /// Build an error code in the given namespace.
    #[must_use]
    pub const fn new(domain: &'static str, code: NonZeroI32) -> Self {
        Self { domain, code }
    }

    /// The namespace tag.
    #[must_use]
    pub const fn domain(&self) -> &'static str {
        self.domain
    }

    /// The numeric code.
    #[must_use]
    pub const fn code(&self) -> NonZeroI32 {
        self.code
    }
}

/// A captured failure: the graph-side stand-in for a thrown exception.
///
/// Faults are cheaply cloneable shared handles. Propagating a fault through
/// several downstream operations shares the captured error rather than
/// copying it, and consumers can recover the concrete type with
/// [`downcast_ref`](Self::downcast_ref).
#[derive(Clone)]
pub struct Fault(Arc<dyn StdError + Send + Sync + 'static>);

impl Fault {
    /// Capture a concrete error.
    pub fn new(err: impl StdError + Send + Sync + 'static) -> Self {
        Self(Arc::new(err))
    }

    /// Capture an ad-hoc message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(AdHocFault(message.into()))
    }

    /// Capture the payload of a caught panic.
    ///
    /// String payloads (the `panic!` macro's usual output) keep their
    /// message; anything else is recorded as opaque.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(s) => *s,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(s) => (*s).to_owned(),
                Err(_) => "panic with non-string payload".to_owned(),
            },
        };
        Self::new(CapturedPanic { message })
    }

    /// Is the captured error of concrete type `E`?
    #[must_use]
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.0.downcast_ref::<E>().is_some()
    }

    /// Borrow the captured error as its concrete type, if it is one.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// Do two fault handles share the same captured error?
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fault").field(&format_args!("{}", self.0)).finish()
    }
}

impl StdError for Fault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        let inner: &(dyn StdError + 'static) = self.0.as_ref();
        Some(inner)
    }
}

/// The payload of a panic that escaped a deferred callable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CapturedPanic {
    message: String,
}

impl CapturedPanic {
    /// The panic message, as far as it could be recovered.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct AdHocFault(String);

/// Why a value reader produced no value.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum Failure {
    /// The outcome slot holds nothing.
    #[error("no result is available")]
    Unset,
    /// The operation failed with an error code.
    #[error("operation failed with code {0}")]
    Code(ErrorCode),
    /// The operation failed with a captured fault.
    #[error(transparent)]
    Fault(Fault),
}

impl From<ErrorCode> for Failure {
    fn from(code: ErrorCode) -> Self {
        Self::Code(code)
    }
}

impl From<Fault> for Failure {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

/// The four-state result slot of a typed operation.
///
/// A slot starts [`Empty`](Outcome::Empty) and moves to exactly one of the
/// other states at most once; after that, only destructive reads change it
/// (back to `Empty`). Setting an already-set slot is
/// [`GraphError::InvalidResult`].
///
/// Value reads are non-destructive (the value is cloned out). Fault reads
/// through [`result`](Self::result) are destructive: a captured fault is
/// surfaced exactly once, subsequent reads see `Empty`.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// No result yet (or the result was destructively consumed).
    Empty,
    /// The operation succeeded.
    Value(T),
    /// The operation failed with an error code.
    Error(ErrorCode),
    /// The operation failed with a captured fault.
    Fault(Fault),
}

impl<T> Default for Outcome<T> {
    fn default() -> Self {
        Self::Empty
    }
}

impl<T> Outcome<T> {
    /// Does the slot hold anything?
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Empty)
    }

    /// Does the slot hold a success value?
    #[must_use]
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Does the slot hold an error code?
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Does the slot hold a captured fault?
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    /// Fetch the result.
    ///
    /// A value is cloned out and the slot keeps it. An error code is
    /// surfaced as [`Failure::Code`] and also kept. A fault is *moved* out:
    /// the slot is `Empty` afterwards and the fault is surfaced exactly
    /// once. An empty slot yields [`Failure::Unset`].
    pub fn result(&mut self) -> Result<T, Failure>
    where
        T: Clone,
    {
        match self {
            Self::Empty => Err(Failure::Unset),
            Self::Value(v) => Ok(v.clone()),
            Self::Error(code) => Err(Failure::Code(*code)),
            Self::Fault(_) => match core::mem::take(self) {
                Self::Fault(fault) => Err(Failure::Fault(fault)),
                _ => unreachable!("Outcome::result"),
            },
        }
    }

    /// Like [`result`](Self::result), but destructive for every state: the
    /// slot is `Empty` afterwards.
    pub fn destroy_result(&mut self) -> Result<T, Failure> {
        match core::mem::take(self) {
            Self::Empty => Err(Failure::Unset),
            Self::Value(v) => Ok(v),
            Self::Error(code) => Err(Failure::Code(code)),
            Self::Fault(fault) => Err(Failure::Fault(fault)),
        }
    }

    /// Fetch the error code.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if the slot does not hold an error code.
    pub fn error(&self) -> Result<ErrorCode, GraphError> {
        match self {
            Self::Error(code) => Ok(*code),
            Self::Empty => Err(GraphError::InvalidResult("no result is available")),
            _ => Err(GraphError::InvalidResult("result is not an error code")),
        }
    }

    /// Fetch the captured fault, non-destructively (the handle is shared).
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if the slot does not hold a fault.
    pub fn fault(&self) -> Result<Fault, GraphError> {
        match self {
            Self::Fault(fault) => Ok(fault.clone()),
            Self::Empty => Err(GraphError::InvalidResult("no result is available")),
            _ => Err(GraphError::InvalidResult("result is not a fault")),
        }
    }

    /// Like [`error`](Self::error), but moves the code out, leaving `Empty`.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if the slot does not hold an error code.
    pub fn destroy_error(&mut self) -> Result<ErrorCode, GraphError> {
        let code = self.error()?;
        *self = Self::Empty;
        Ok(code)
    }

    /// Like [`fault`](Self::fault), but moves the fault out, leaving `Empty`.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if the slot does not hold a fault.
    pub fn destroy_fault(&mut self) -> Result<Fault, GraphError> {
        let fault = self.fault()?;
        *self = Self::Empty;
        Ok(fault)
    }

    /// Store a success value.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if the slot is already set.
    pub fn set_value(&mut self, value: T) -> Result<(), GraphError> {
        self.check_unset()?;
        *self = Self::Value(value);
        Ok(())
    }

    /// Store an error code.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if the slot is already set.
    pub fn set_error(&mut self, code: ErrorCode) -> Result<(), GraphError> {
        self.check_unset()?;
        *self = Self::Error(code);
        Ok(())
    }

    /// Store a captured fault.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if the slot is already set.
    pub fn set_fault(&mut self, fault: Fault) -> Result<(), GraphError> {
        self.check_unset()?;
        *self = Self::Fault(fault);
        Ok(())
    }

    /// Move the whole slot out, leaving `Empty`.
    #[must_use]
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }

    /// Copy the tagged contents into another slot through its single-set
    /// surface.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if this slot is `Empty` or the
    /// destination is already set.
    pub fn copy_into(&self, dst: &mut Self) -> Result<(), GraphError>
    where
        T: Clone,
    {
        match self {
            Self::Empty => Err(GraphError::InvalidResult("cannot transfer an empty result")),
            Self::Value(v) => dst.set_value(v.clone()),
            Self::Error(code) => dst.set_error(*code),
            Self::Fault(fault) => dst.set_fault(fault.clone()),
        }
    }

    /// Move the tagged contents into another slot, leaving this one `Empty`.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if this slot is `Empty` or the
    /// destination is already set; on error this slot is left untouched.
    pub fn move_into(&mut self, dst: &mut Self) -> Result<(), GraphError> {
        dst.check_unset()?;
        match core::mem::take(self) {
            Self::Empty => Err(GraphError::InvalidResult("cannot transfer an empty result")),
            moved => {
                *dst = moved;
                Ok(())
            }
        }
    }

    fn check_unset(&self) -> Result<(), GraphError> {
        if self.is_valid() {
            Err(GraphError::InvalidResult("result has already been set"))
        } else {
            Ok(())
        }
    }
}

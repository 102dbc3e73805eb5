use crate::partition::NotFound;

/// Failure of a memory interface operation, generic over the transport error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Rejected before touching the hardware: offset, address or length out of range.
    InvalidArgument,
    /// The SRAM address is not covered by the partition table.
    NotFound,
    /// The access window stayed busy for the whole poll budget.
    Busy,
    /// A grant or status bit was never observed.
    Timeout,
    /// The hardware reported an exception or an inconsistent transaction.
    Hardware,
    /// The register transport failed.
    Transport(E),
}

impl<E> Error<E> {
    /// Whether an IMA operation may start another attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Busy | Error::Timeout | Error::Hardware)
    }
}

impl<E> From<NotFound> for Error<E> {
    fn from(_: NotFound) -> Self {
        Error::NotFound
    }
}

/// Outcome of an error latch check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[must_use]
pub enum ErrorCheck {
    /// No error was latched.
    Clean,
    /// An error was latched and has been cleared. The interrupted transaction
    /// must be started over.
    Cleared,
}

impl ErrorCheck {
    pub fn needs_retry(self) -> bool {
        self == ErrorCheck::Cleared
    }
}

/// Combines a transaction result with the result of releasing the window.
///
/// A failed release is always reported, as the window may still be held.
pub(crate) fn with_release<T, E>(
    result: Result<T, Error<E>>,
    released: Result<(), Error<E>>,
) -> Result<T, Error<E>> {
    match released {
        Ok(()) => result,
        Err(error) => {
            error!("Failed to release SRAM access");
            Err(error)
        }
    }
}

/// Like [`with_release`], but a failed release only replaces a failed result.
///
/// The transaction already completed when it succeeded, so its result stands.
pub(crate) fn with_release_on_error<T, E>(
    result: Result<T, Error<E>>,
    released: Result<(), Error<E>>,
) -> Result<T, Error<E>> {
    match (result, released) {
        (Err(_), Err(error)) => {
            error!("Failed to release SRAM access");
            Err(error)
        }
        (Ok(value), Err(_)) => {
            warn!("Failed to release SRAM access after a completed transaction");
            Ok(value)
        }
        (result, Ok(())) => result,
    }
}

use std::fmt::{Display, Formatter};

/// The default maximum size of a single chunk read from stdout or stderr.
pub const DEFAULT_CHUNK_SIZE: NumBytes = NumBytes(16 * 1024); // 16 kb

/// A wrapper type representing a number of bytes.
///
/// Use the [`NumBytesExt`] trait to conveniently create instances:
///
/// ```
/// use tokio_process_mux::NumBytesExt;
/// let kb = 16.kilobytes();
/// let mb = 2.megabytes();
/// assert_eq!(kb.bytes(), 16 * 1024);
/// assert_eq!(mb.bytes(), 2 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NumBytes(usize);

impl NumBytes {
    /// Creates a `NumBytes` value of zero.
    pub fn zero() -> Self {
        Self(0)
    }

    /// The amount of bytes represented by this instance.
    pub fn bytes(&self) -> usize {
        self.0
    }

    pub(crate) fn assert_non_zero(&self, parameter_name: &str) {
        assert!(self.0 > 0, "{parameter_name} must be greater than zero bytes");
    }
}

impl Display for NumBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

impl From<usize> for NumBytes {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

/// Extension trait providing convenience-functions for creation of [`NumBytes`] of certain sizes.
pub trait NumBytesExt {
    /// Interprets the value as literal bytes.
    fn bytes(self) -> NumBytes;

    /// Interprets the value as kilobytes (value * 1024).
    fn kilobytes(self) -> NumBytes;

    /// Interprets the value as megabytes (value * 1024 * 1024).
    fn megabytes(self) -> NumBytes;
}

impl NumBytesExt for usize {
    fn bytes(self) -> NumBytes {
        NumBytes(self)
    }

    fn kilobytes(self) -> NumBytes {
        NumBytes(self * 1024)
    }

    fn megabytes(self) -> NumBytes {
        NumBytes(self * 1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn conversions() {
        assert_that(3.bytes().bytes()).is_equal_to(3);
        assert_that(2.kilobytes().bytes()).is_equal_to(2048);
        assert_that(1.megabytes().bytes()).is_equal_to(1024 * 1024);
        assert_that(DEFAULT_CHUNK_SIZE).is_equal_to(16.kilobytes());
    }

    #[test]
    #[should_panic(expected = "chunk_size must be greater than zero bytes")]
    fn zero_is_rejected_where_a_size_is_required() {
        NumBytes::zero().assert_non_zero("chunk_size");
    }
}

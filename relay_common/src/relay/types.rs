//! Command record type.
//!
//! A [`CommandRecord`] is the fixed-shape unit moved from the non-real-time
//! producer to the real-time consumer: one `f64` per axis, in the order of
//! the component's axis list. Storage is inline (`heapless::Vec`), so
//! copying a record never touches the heap.

use crate::consts::MAX_AXES;
use static_assertions::const_assert;
use thiserror::Error;

// A full record copy stays within one page.
const_assert!(MAX_AXES * core::mem::size_of::<f64>() <= 4096);

/// Fixed-capacity inline storage for one record.
pub type RecordValues = heapless::Vec<f64, MAX_AXES>;

/// Errors building a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordError {
    /// More values than the record can hold.
    #[error("record holds at most {capacity} values, received {received}")]
    CapacityExceeded {
        /// Maximum number of values.
        capacity: usize,
        /// Number of values offered.
        received: usize,
    },
}

/// Ordered per-axis command values.
#[derive(Debug, Clone, Default)]
pub struct CommandRecord {
    values: RecordValues,
}

impl CommandRecord {
    /// Empty record.
    pub const fn new() -> Self {
        Self {
            values: heapless::Vec::new(),
        }
    }

    /// Build a record from a slice.
    ///
    /// # Errors
    /// `RecordError::CapacityExceeded` if `values.len() > MAX_AXES`.
    pub fn from_slice(values: &[f64]) -> Result<Self, RecordError> {
        let mut record = Self::new();
        record.set_from_slice(values)?;
        Ok(record)
    }

    /// Record of `len` sentinel (NaN) values: "no command on any axis".
    ///
    /// `len` is clamped to `MAX_AXES`.
    pub fn sentinel(len: usize) -> Self {
        let mut record = Self::new();
        record.fill_sentinel(len);
        record
    }

    /// Replace the content with `values` without reallocating.
    ///
    /// On error the previous content is left untouched.
    pub fn set_from_slice(&mut self, values: &[f64]) -> Result<(), RecordError> {
        if values.len() > MAX_AXES {
            return Err(RecordError::CapacityExceeded {
                capacity: MAX_AXES,
                received: values.len(),
            });
        }
        self.values.clear();
        for &v in values {
            // Length checked above; push cannot fail.
            let _ = self.values.push(v);
        }
        Ok(())
    }

    /// Replace the content with `len` sentinel values.
    pub fn fill_sentinel(&mut self, len: usize) {
        self.values.clear();
        for _ in 0..len.min(MAX_AXES) {
            let _ = self.values.push(f64::NAN);
        }
    }

    /// Copy another record's content into this one. Bounded, no allocation.
    #[inline]
    pub fn copy_from(&mut self, other: &CommandRecord) {
        self.values.clear();
        for &v in other.values.iter() {
            let _ = self.values.push(v);
        }
    }

    /// Values as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Number of values.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` if the record holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `true` for a non-empty record whose every value is NaN.
    ///
    /// A sentinel record means "no command", which is distinct from a
    /// record carrying an invalid value.
    pub fn is_sentinel(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|v| v.is_nan())
    }

    /// Index of the first non-finite value, if any.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.values.iter().position(|v| !v.is_finite())
    }
}

impl PartialEq for CommandRecord {
    /// Bitwise comparison so that sentinel records compare equal.
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_preserves_order() {
        let record = CommandRecord::from_slice(&[1.0, -2.5, 3.0]).unwrap();
        assert_eq!(record.as_slice(), &[1.0, -2.5, 3.0]);
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn oversize_record_is_refused_and_content_kept() {
        let mut record = CommandRecord::from_slice(&[7.0]).unwrap();
        let too_long = vec![0.0; MAX_AXES + 1];
        let err = record.set_from_slice(&too_long).unwrap_err();
        assert_eq!(
            err,
            RecordError::CapacityExceeded {
                capacity: MAX_AXES,
                received: MAX_AXES + 1
            }
        );
        assert_eq!(record.as_slice(), &[7.0]);
    }

    #[test]
    fn sentinel_detection() {
        assert!(CommandRecord::sentinel(3).is_sentinel());
        assert!(!CommandRecord::new().is_sentinel());
        let partial = CommandRecord::from_slice(&[f64::NAN, 2.0]).unwrap();
        assert!(!partial.is_sentinel());
        assert_eq!(partial.first_non_finite(), Some(0));
    }

    #[test]
    fn infinity_is_non_finite_but_not_sentinel() {
        let record = CommandRecord::from_slice(&[1.0, f64::INFINITY]).unwrap();
        assert_eq!(record.first_non_finite(), Some(1));
        assert!(!record.is_sentinel());
    }

    #[test]
    fn sentinel_records_compare_equal() {
        assert_eq!(CommandRecord::sentinel(2), CommandRecord::sentinel(2));
        assert_ne!(CommandRecord::sentinel(2), CommandRecord::sentinel(3));
    }

    #[test]
    fn copy_from_replaces_content() {
        let mut dst = CommandRecord::sentinel(5);
        let src = CommandRecord::from_slice(&[4.0, 5.0]).unwrap();
        dst.copy_from(&src);
        assert_eq!(dst, src);
    }
}

//! Size classes.
//!
//! Partition `n` stores collections of up to `load_factor^(n+1)` elements.
//! With a load factor of 4 the capacities are 4, 16, 64, 256, 1024, ...
//! A collection always lives in the smallest class that can hold it.

use crate::error::{CoreError, CoreResult};

/// The size-class geometry of one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClasses {
    load_factor: u32,
    max_partitions: u8,
}

impl SizeClasses {
    /// Creates the geometry for `max_partitions` classes growing by `load_factor`.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidConfig`] when the load factor is below
    /// 2, there are no classes, or the top capacity does not fit in a `u32`.
    pub fn new(load_factor: u32, max_partitions: u8) -> CoreResult<Self> {
        if load_factor < 2 {
            return Err(CoreError::invalid_config(format!(
                "load factor must be at least 2, got {load_factor}"
            )));
        }
        if max_partitions == 0 {
            return Err(CoreError::invalid_config("at least one partition is required"));
        }
        if load_factor.checked_pow(u32::from(max_partitions)).is_none() {
            return Err(CoreError::invalid_config(format!(
                "load factor {load_factor} with {max_partitions} partitions overflows the row capacity"
            )));
        }
        Ok(Self {
            load_factor,
            max_partitions,
        })
    }

    /// Returns the load factor.
    #[must_use]
    pub const fn load_factor(&self) -> u32 {
        self.load_factor
    }

    /// Returns the number of size classes.
    #[must_use]
    pub const fn max_partitions(&self) -> u8 {
        self.max_partitions
    }

    /// Returns the highest size class.
    #[must_use]
    pub const fn top_class(&self) -> u8 {
        self.max_partitions - 1
    }

    /// Returns the number of elements a record of `size_class` can hold.
    ///
    /// Classes beyond the top class are still computed (saturating) so that
    /// foreign partition files can be described.
    #[must_use]
    pub fn capacity(&self, size_class: u8) -> usize {
        let mut load = self.load_factor as usize;
        for _ in 0..size_class {
            load = load.saturating_mul(self.load_factor as usize);
        }
        load
    }

    /// Returns the capacity of the top size class.
    #[must_use]
    pub fn top_capacity(&self) -> usize {
        self.capacity(self.top_class())
    }

    /// Returns the smallest size class whose capacity is at least `requested`.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::CapacityExceeded`] when `requested` exceeds
    /// the top capacity.
    pub fn classify(&self, requested: usize) -> CoreResult<u8> {
        let mut load = 1usize;
        for class in 0..self.max_partitions {
            load = load.saturating_mul(self.load_factor as usize);
            if load >= requested {
                return Ok(class);
            }
        }
        Err(CoreError::CapacityExceeded {
            requested,
            max: self.top_capacity(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classes() -> SizeClasses {
        SizeClasses::new(4, 7).unwrap()
    }

    #[test]
    fn capacities_grow_by_load_factor() {
        let sizes = classes();
        let caps: Vec<_> = (0..7).map(|n| sizes.capacity(n)).collect();
        assert_eq!(caps, vec![4, 16, 64, 256, 1024, 4096, 16384]);
        assert_eq!(sizes.top_capacity(), 16384);
    }

    #[test]
    fn classify_boundaries() {
        let sizes = classes();
        assert_eq!(sizes.classify(0).unwrap(), 0);
        assert_eq!(sizes.classify(1).unwrap(), 0);
        assert_eq!(sizes.classify(4).unwrap(), 0);
        assert_eq!(sizes.classify(5).unwrap(), 1);
        assert_eq!(sizes.classify(16).unwrap(), 1);
        assert_eq!(sizes.classify(17).unwrap(), 2);
        assert_eq!(sizes.classify(16384).unwrap(), 6);
    }

    #[test]
    fn classify_rejects_oversized() {
        let err = classes().classify(16385).unwrap_err();
        assert!(matches!(
            err,
            CoreError::CapacityExceeded {
                requested: 16385,
                max: 16384
            }
        ));
        assert!(classes().classify(usize::MAX).is_err());
    }

    #[test]
    fn invalid_geometries() {
        assert!(SizeClasses::new(1, 4).is_err());
        assert!(SizeClasses::new(4, 0).is_err());
        assert!(SizeClasses::new(4, 17).is_err());
        assert!(SizeClasses::new(2, 31).is_ok());
    }

    proptest! {
        #[test]
        fn classify_is_smallest_fitting_class(lf in 2u32..9, parts in 1u8..8, size in 0usize..300_000) {
            let sizes = SizeClasses::new(lf, parts).unwrap();
            match sizes.classify(size) {
                Ok(class) => {
                    prop_assert!(class < parts);
                    prop_assert!(sizes.capacity(class) >= size);
                    if class > 0 {
                        prop_assert!(sizes.capacity(class - 1) < size);
                    }
                }
                Err(CoreError::CapacityExceeded { .. }) => {
                    prop_assert!(size > sizes.top_capacity());
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
    }
}

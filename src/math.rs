
// calculations inspired by
// https://github.com/AcademySoftwareFoundation/openexr/blob/master/src/lib/OpenEXR/ImfMisc.cpp

//! Simple math utilities.

use std::convert::TryFrom;
use crate::error::usize_to_i32;
use crate::error::Result;

/// Simple two-dimensional vector of any numerical type.
/// Supports only few mathematical operations
/// as this is used mainly as data struct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Vec2<T> (pub T, pub T);

impl<T> Vec2<T> {

    /// Maps all components of this vector to a new type, yielding a vector of that new type.
    pub fn map<B>(self, map: impl Fn(T) -> B) -> Vec2<B> {
        Vec2(map(self.0), map(self.1))
    }

    /// Try to convert all components of this vector to a new type,
    /// yielding either a vector of that new type, or an error.
    pub fn try_from<S>(value: Vec2<S>) -> std::result::Result<Self, T::Error> where T: TryFrom<S> {
        let x = T::try_from(value.0)?;
        let y = T::try_from(value.1)?;
        Ok(Vec2(x, y))
    }

    /// Seeing this vector as a dimension or size (width and height),
    /// this returns the area that this dimensions contains (`width * height`).
    #[inline] pub fn area(self) -> T where T: std::ops::Mul<T, Output = T> {
        self.0 * self.1
    }

    /// The first component of this 2D vector.
    #[inline] pub fn x(self) -> T { self.0 }

    /// The second component of this 2D vector.
    #[inline] pub fn y(self) -> T { self.1 }

    /// The first component of this 2D vector.
    #[inline] pub fn width(self) -> T { self.0 }

    /// The second component of this 2D vector.
    #[inline] pub fn height(self) -> T { self.1 }
}


impl Vec2<usize> {

    /// Try to convert to `Vec2<i32>`, returning an error on too large numbers.
    pub fn to_i32(self, error_message: &'static str) -> Result<Vec2<i32>> {
        let x = usize_to_i32(self.0, error_message)?;
        let y = usize_to_i32(self.1, error_message)?;
        Ok(Vec2(x, y))
    }
}


impl<T> From<(T, T)> for Vec2<T> {
    fn from((x, y): (T, T)) -> Self { Vec2(x, y) }
}

impl<T> From<Vec2<T>> for (T, T) {
    fn from(vec2: Vec2<T>) -> Self { (vec2.0, vec2.1) }
}


/// Integer division rounding towards negative infinity, for positive divisors.
/// Sampled pixel coordinates of negative positions depend on this.
#[inline]
pub fn div_p(dividend: i32, divisor: i32) -> i32 {
    debug_assert!(divisor > 0, "divisor must be positive");
    dividend.div_euclid(divisor)
}

/// The remainder of `div_p`, always in `0 .. divisor`.
#[inline]
pub fn mod_p(dividend: i32, divisor: i32) -> i32 {
    debug_assert!(divisor > 0, "divisor must be positive");
    dividend.rem_euclid(divisor)
}


/// The number of blocks of the specified size that cover the full resolution.
/// The last block may be smaller.
#[inline]
pub fn compute_block_count(full_res: usize, block_size: usize) -> usize {
    debug_assert!(block_size > 0, "block size must not be zero");
    (full_res + block_size - 1) / block_size // only works for positive numbers
}

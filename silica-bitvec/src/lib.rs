//! Arbitrary-width bit-vector values for the Silica HDL.
//!
//! [`BitVector`] models a hardware value: an arbitrary-precision integer
//! carrying an optional bit width and optional numeric bounds. Arithmetic
//! follows HDL conventions — binary operators return *unsized* results, while
//! compound assignment on a sized vector preserves its width and bounds and
//! treats a range violation like Rust treats integer overflow.
//!
//! Bit indexing is LSB-0 and slices are half-open from the high index down to
//! the low one: `bv.slice(6, 2)` reads bits `[2, 6)` as a 4-bit vector.
//!
//! ```
//! use silica_bitvec::BitVector;
//!
//! let bv = BitVector::with_width(0b1011_0100, 8).unwrap();
//! assert_eq!(bv.slice(6, 2).unwrap(), 0b1101);
//! ```

#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::ops;

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Violations of a [`BitVector`]'s declared domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitVectorError {
    /// A value fell outside the declared `[min, max)` range.
    #[error("value {value} out of range [{min}, {max})")]
    ValueOutOfRange {
        /// The offending value.
        value: BigInt,
        /// Inclusive lower bound.
        min: BigInt,
        /// Exclusive upper bound.
        max: BigInt,
    },
    /// A value does not fit in the number of bits it is assigned to.
    #[error("value {value} does not fit in {width} bits")]
    WidthMismatch {
        /// The offending value.
        value: BigInt,
        /// The target width in bits.
        width: usize,
    },
    /// A bit index beyond the declared width of a sized vector.
    #[error("bit index {index} out of range for width {width}")]
    IndexOutOfBounds {
        /// The requested bit position.
        index: usize,
        /// The declared width.
        width: usize,
    },
    /// Slice bounds must satisfy `high > low`.
    #[error("slice requires high > low, got [{high}:{low}]")]
    SliceBounds {
        /// The high (exclusive) bit position.
        high: usize,
        /// The low (inclusive) bit position.
        low: usize,
    },
    /// An operand had the wrong shape for the operation.
    #[error("expected {expected}, got {found}")]
    TypeMismatch {
        /// What the operation required.
        expected: &'static str,
        /// What it was given.
        found: String,
    },
}

/// An arbitrary-precision integer with an optional bit width and bounds.
///
/// Three shapes exist:
///
/// - **unsized** (`width() == 0`, no bounds): a plain integer, as produced by
///   [`BitVector::new`] and by every binary operator;
/// - **sized** (`width() > 0`): holds `width` bits, `0 <= v < 2^width` unless
///   bounds narrow it further;
/// - **bounded**: carries an explicit `[min, max)` range, with the width
///   derived from the bounds (two's complement when `min < 0`).
#[derive(Debug, Clone, Default)]
pub struct BitVector {
    val: BigInt,
    width: usize,
    min: Option<BigInt>,
    max: Option<BigInt>,
}

/// Number of bits needed to represent values in `[0, x)`, i.e. `⌈log2(x)⌉`.
fn ceil_log2(x: &BigInt) -> usize {
    debug_assert!(x.is_positive());
    (x - 1u8).bits() as usize
}

fn mask(width: usize) -> BigInt {
    (BigInt::one() << width) - 1
}

impl BitVector {
    /// Creates an unsized bit vector from an integer value.
    pub fn new(val: impl Into<BigInt>) -> Self {
        Self {
            val: val.into(),
            width: 0,
            min: None,
            max: None,
        }
    }

    /// Parses a string of `0`/`1` digits; the resulting width is the string
    /// length.
    pub fn from_bin(s: &str) -> Result<Self, BitVectorError> {
        if s.is_empty() || !s.bytes().all(|b| b == b'0' || b == b'1') {
            return Err(BitVectorError::TypeMismatch {
                expected: "a non-empty string of 0/1 digits",
                found: s.to_owned(),
            });
        }
        // Digits are pre-validated, so parsing cannot fail.
        let val = BigInt::parse_bytes(s.as_bytes(), 2).unwrap_or_default();
        Ok(Self {
            val,
            width: s.len(),
            min: None,
            max: None,
        })
    }

    /// Parses an unsized bit vector from hexadecimal digits (an optional
    /// leading `-` is accepted).
    pub fn from_hex(s: &str) -> Result<Self, BitVectorError> {
        BigInt::parse_bytes(s.as_bytes(), 16)
            .map(Self::new)
            .ok_or_else(|| BitVectorError::TypeMismatch {
                expected: "hexadecimal digits",
                found: s.to_owned(),
            })
    }

    /// Creates a bounded bit vector over `[min, max)`.
    ///
    /// The width is derived from the bounds: `⌈log2(max)⌉` bits when
    /// `min >= 0`, one more (two's complement sign) otherwise.
    pub fn bounded(
        val: impl Into<BigInt>,
        min: impl Into<BigInt>,
        max: impl Into<BigInt>,
    ) -> Result<Self, BitVectorError> {
        let (val, min, max) = (val.into(), min.into(), max.into());
        if min >= max {
            return Err(BitVectorError::TypeMismatch {
                expected: "bounds with min < max",
                found: format!("[{min}, {max})"),
            });
        }
        let width = if min.is_negative() {
            let magnitude = min.abs().max(&max - 1u8);
            if magnitude.is_zero() {
                1
            } else {
                ceil_log2(&magnitude) + 1
            }
        } else if max > BigInt::one() {
            ceil_log2(&max)
        } else {
            1
        };
        let this = Self {
            val,
            width,
            min: Some(min),
            max: Some(max),
        };
        this.range_check(&this.val)?;
        Ok(this)
    }

    /// Creates a sized, unsigned bit vector: shorthand for
    /// `bounded(val, 0, 2^width)`.
    pub fn with_width(val: impl Into<BigInt>, width: usize) -> Result<Self, BitVectorError> {
        if width == 0 {
            return Err(BitVectorError::TypeMismatch {
                expected: "a nonzero width",
                found: "0".to_owned(),
            });
        }
        Self::bounded(val, BigInt::zero(), BigInt::one() << width)
    }

    /// The declared width in bits; 0 means unsized.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Whether this vector carries a declared width.
    pub fn is_sized(&self) -> bool {
        self.width > 0
    }

    /// Inclusive lower bound, if bounded.
    pub fn min(&self) -> Option<&BigInt> {
        self.min.as_ref()
    }

    /// Exclusive upper bound, if bounded.
    pub fn max(&self) -> Option<&BigInt> {
        self.max.as_ref()
    }

    /// The numeric value.
    pub fn value(&self) -> &BigInt {
        &self.val
    }

    /// The value as a `u64`, when it fits.
    pub fn to_u64(&self) -> Option<u64> {
        self.val.to_u64()
    }

    /// The value as an `i64`, when it fits.
    pub fn to_i64(&self) -> Option<i64> {
        self.val.to_i64()
    }

    /// Checks a candidate value against this vector's declared domain.
    ///
    /// Bounded vectors check `min <= v < max`; sized unbounded vectors check
    /// `0 <= v < 2^width`; unsized vectors accept anything.
    pub fn range_check(&self, candidate: &BigInt) -> Result<(), BitVectorError> {
        let (min, max) = match (&self.min, &self.max) {
            (Some(min), Some(max)) => (min.clone(), max.clone()),
            _ if self.width > 0 => (BigInt::zero(), BigInt::one() << self.width),
            _ => return Ok(()),
        };
        if *candidate < min || *candidate >= max {
            return Err(BitVectorError::ValueOutOfRange {
                value: candidate.clone(),
                min,
                max,
            });
        }
        Ok(())
    }

    /// Reads bit `i` (LSB-0) as a 1-bit vector.
    ///
    /// On a sized vector an index at or beyond the width is an error; on an
    /// unsized vector the high side reads as the sign extension.
    pub fn bit(&self, i: usize) -> Result<BitVector, BitVectorError> {
        if self.width > 0 && i >= self.width {
            return Err(BitVectorError::IndexOutOfBounds {
                index: i,
                width: self.width,
            });
        }
        let bit = (&self.val >> i) & BigInt::one();
        BitVector::with_width(bit, 1)
    }

    /// Reads bits `[low, high)` as a vector of width `high - low`.
    ///
    /// `low = 0` reads the low `high` bits, matching the `bv[i:]` HDL idiom.
    pub fn slice(&self, high: usize, low: usize) -> Result<BitVector, BitVectorError> {
        if high <= low {
            return Err(BitVectorError::SliceBounds { high, low });
        }
        let bits = (&self.val & mask(high)) >> low;
        BitVector::with_width(bits, high - low)
    }

    /// Writes bit `i` in place; width and bounds are preserved.
    pub fn set_bit(&mut self, i: usize, bit: bool) -> Result<(), BitVectorError> {
        if self.width > 0 && i >= self.width {
            return Err(BitVectorError::IndexOutOfBounds {
                index: i,
                width: self.width,
            });
        }
        let m = BigInt::one() << i;
        if bit {
            self.val = &self.val | &m;
        } else {
            self.val = &self.val & &(-m - 1u8);
        }
        Ok(())
    }

    /// Writes bits `[low, high)` in place; the value must satisfy
    /// `0 <= v < 2^(high - low)`.
    pub fn set_slice(
        &mut self,
        high: usize,
        low: usize,
        value: impl Into<BigInt>,
    ) -> Result<(), BitVectorError> {
        if high <= low {
            return Err(BitVectorError::SliceBounds { high, low });
        }
        if self.width > 0 && high > self.width {
            return Err(BitVectorError::IndexOutOfBounds {
                index: high,
                width: self.width,
            });
        }
        let value = value.into();
        let width = high - low;
        if value.is_negative() || value.bits() as usize > width {
            return Err(BitVectorError::WidthMismatch { value, width });
        }
        let m = mask(width) << low;
        self.val = (&self.val & &(-m - 1u8)) | (value << low);
        Ok(())
    }

    /// Concatenates parts left-to-right (first part lands in the high bits).
    ///
    /// Every part but the first must be sized; the result is sized when the
    /// first part is, with width equal to the sum of all widths.
    pub fn concat<'a>(
        parts: impl IntoIterator<Item = &'a BitVector>,
    ) -> Result<BitVector, BitVectorError> {
        let mut parts = parts.into_iter();
        let first = parts.next().ok_or(BitVectorError::TypeMismatch {
            expected: "at least one part",
            found: "an empty sequence".to_owned(),
        })?;
        let base_width = first.width;
        let mut val = if base_width > 0 {
            &first.val & mask(base_width)
        } else {
            first.val.clone()
        };
        let mut added = 0usize;
        for part in parts {
            if part.width == 0 {
                return Err(BitVectorError::TypeMismatch {
                    expected: "a sized bit vector",
                    found: format!("unsized value {}", part.val),
                });
            }
            val = (val << part.width) | (&part.val & mask(part.width));
            added += part.width;
        }
        if base_width > 0 {
            BitVector::with_width(val, base_width + added)
        } else {
            Ok(BitVector::new(val))
        }
    }

    /// Exponentiation; the result is unsized.
    pub fn pow(&self, exp: u32) -> BitVector {
        BitVector::new(num_traits::pow(self.val.clone(), exp as usize))
    }

    /// The value as a two's-complement binary string of `width` digits.
    ///
    /// With `width = 0` the plain (signed decimal-free) binary form of the
    /// value is returned instead.
    pub fn to_bin(&self, width: usize) -> String {
        if width == 0 {
            return format!("{:b}", self.val);
        }
        let masked = &self.val & mask(width);
        let digits = format!("{masked:b}");
        let mut out = String::with_capacity(width);
        for _ in digits.len()..width {
            out.push('0');
        }
        out.push_str(&digits);
        out
    }

    fn apply_in_place(&mut self, result: BigInt, op: &str) {
        if let Err(error) = self.range_check(&result) {
            panic!("in-place `{op}` on a sized bit vector: {error}");
        }
        self.val = result;
    }
}

// Python-style floor division and modulo, matching the numeric conventions the
// simulation semantics were defined with.

fn floor_div(a: &BigInt, b: &BigInt) -> BigInt {
    let q = a / b;
    let r = a % b;
    if !r.is_zero() && (r.is_negative() != b.is_negative()) {
        q - 1u8
    } else {
        q
    }
}

fn floor_mod(a: &BigInt, b: &BigInt) -> BigInt {
    let r = a % b;
    if !r.is_zero() && (r.is_negative() != b.is_negative()) {
        r + b
    } else {
        r
    }
}

macro_rules! binary_op {
    ($trait:ident, $method:ident, |$a:ident, $b:ident| $body:expr) => {
        impl ops::$trait for &BitVector {
            type Output = BitVector;

            fn $method(self, rhs: &BitVector) -> BitVector {
                let ($a, $b) = (&self.val, &rhs.val);
                BitVector::new($body)
            }
        }

        impl ops::$trait for BitVector {
            type Output = BitVector;

            fn $method(self, rhs: BitVector) -> BitVector {
                ops::$trait::$method(&self, &rhs)
            }
        }

        impl ops::$trait<i64> for &BitVector {
            type Output = BitVector;

            fn $method(self, rhs: i64) -> BitVector {
                let rhs = BigInt::from(rhs);
                let ($a, $b) = (&self.val, &rhs);
                BitVector::new($body)
            }
        }

        impl ops::$trait<i64> for BitVector {
            type Output = BitVector;

            fn $method(self, rhs: i64) -> BitVector {
                ops::$trait::$method(&self, rhs)
            }
        }

        impl ops::$trait<BitVector> for i64 {
            type Output = BitVector;

            fn $method(self, rhs: BitVector) -> BitVector {
                let lhs = BigInt::from(self);
                let ($a, $b) = (&lhs, &rhs.val);
                BitVector::new($body)
            }
        }
    };
}

binary_op!(Add, add, |a, b| a + b);
binary_op!(Sub, sub, |a, b| a - b);
binary_op!(Mul, mul, |a, b| a * b);
binary_op!(Div, div, |a, b| floor_div(a, b));
binary_op!(Rem, rem, |a, b| floor_mod(a, b));
binary_op!(BitAnd, bitand, |a, b| a & b);
binary_op!(BitOr, bitor, |a, b| a | b);
binary_op!(BitXor, bitxor, |a, b| a ^ b);

macro_rules! assign_op {
    ($trait:ident, $method:ident, $name:literal, |$a:ident, $b:ident| $body:expr) => {
        impl ops::$trait<&BitVector> for BitVector {
            fn $method(&mut self, rhs: &BitVector) {
                let ($a, $b) = (&self.val, &rhs.val);
                let result = $body;
                self.apply_in_place(result, $name);
            }
        }

        impl ops::$trait<i64> for BitVector {
            fn $method(&mut self, rhs: i64) {
                let rhs = BigInt::from(rhs);
                let ($a, $b) = (&self.val, &rhs);
                let result = $body;
                self.apply_in_place(result, $name);
            }
        }
    };
}

assign_op!(AddAssign, add_assign, "+=", |a, b| a + b);
assign_op!(SubAssign, sub_assign, "-=", |a, b| a - b);
assign_op!(MulAssign, mul_assign, "*=", |a, b| a * b);
assign_op!(DivAssign, div_assign, "/=", |a, b| floor_div(a, b));
assign_op!(RemAssign, rem_assign, "%=", |a, b| floor_mod(a, b));
assign_op!(BitAndAssign, bitand_assign, "&=", |a, b| a & b);
assign_op!(BitOrAssign, bitor_assign, "|=", |a, b| a | b);
assign_op!(BitXorAssign, bitxor_assign, "^=", |a, b| a ^ b);

impl ops::Shl<usize> for &BitVector {
    type Output = BitVector;

    fn shl(self, rhs: usize) -> BitVector {
        BitVector::new(&self.val << rhs)
    }
}

impl ops::Shl<usize> for BitVector {
    type Output = BitVector;

    fn shl(self, rhs: usize) -> BitVector {
        &self << rhs
    }
}

impl ops::Shr<usize> for &BitVector {
    type Output = BitVector;

    fn shr(self, rhs: usize) -> BitVector {
        BitVector::new(&self.val >> rhs)
    }
}

impl ops::Shr<usize> for BitVector {
    type Output = BitVector;

    fn shr(self, rhs: usize) -> BitVector {
        &self >> rhs
    }
}

impl ops::ShlAssign<usize> for BitVector {
    fn shl_assign(&mut self, rhs: usize) {
        let result = &self.val << rhs;
        self.apply_in_place(result, "<<=");
    }
}

impl ops::ShrAssign<usize> for BitVector {
    fn shr_assign(&mut self, rhs: usize) {
        let result = &self.val >> rhs;
        self.apply_in_place(result, ">>=");
    }
}

impl ops::Neg for &BitVector {
    type Output = BitVector;

    fn neg(self) -> BitVector {
        BitVector::new(-&self.val)
    }
}

impl ops::Neg for BitVector {
    type Output = BitVector;

    fn neg(self) -> BitVector {
        -&self
    }
}

impl ops::Not for &BitVector {
    type Output = BitVector;

    /// Bitwise complement: masked to the declared width on a sized vector,
    /// two's complement (`-v - 1`) on an unsized one.
    fn not(self) -> BitVector {
        let inverted = -&self.val - 1u8;
        if self.width > 0 {
            BitVector::new(inverted & mask(self.width))
        } else {
            BitVector::new(inverted)
        }
    }
}

impl ops::Not for BitVector {
    type Output = BitVector;

    fn not(self) -> BitVector {
        !&self
    }
}

// Comparisons are numeric: width and bounds never participate.

impl PartialEq for BitVector {
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val
    }
}

impl Eq for BitVector {}

impl PartialOrd for BitVector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BitVector {
    fn cmp(&self, other: &Self) -> Ordering {
        self.val.cmp(&other.val)
    }
}

impl PartialEq<i64> for BitVector {
    fn eq(&self, other: &i64) -> bool {
        self.val == BigInt::from(*other)
    }
}

impl PartialEq<BitVector> for i64 {
    fn eq(&self, other: &BitVector) -> bool {
        other == self
    }
}

impl PartialOrd<i64> for BitVector {
    fn partial_cmp(&self, other: &i64) -> Option<Ordering> {
        self.val.partial_cmp(&BigInt::from(*other))
    }
}

impl PartialOrd<BitVector> for i64 {
    fn partial_cmp(&self, other: &BitVector) -> Option<Ordering> {
        BigInt::from(*self).partial_cmp(&other.val)
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.val, f)
    }
}

impl fmt::Binary for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bin(self.width))
    }
}

impl fmt::LowerHex for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.val, f)
    }
}

impl From<BigInt> for BitVector {
    fn from(val: BigInt) -> Self {
        BitVector::new(val)
    }
}

impl From<&BitVector> for BigInt {
    fn from(bv: &BitVector) -> Self {
        bv.val.clone()
    }
}

impl From<BitVector> for BigInt {
    fn from(bv: BitVector) -> Self {
        bv.val
    }
}

macro_rules! from_primitive {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for BitVector {
                fn from(val: $ty) -> Self {
                    BitVector::new(BigInt::from(val))
                }
            }
        )*
    };
}

from_primitive!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

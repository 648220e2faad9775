#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MICROS_PER_DAY: i64 = 86_400_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Null,
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    Binary,
    Date,
    Timestamp,
}

impl DType {
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }

    #[must_use]
    pub fn is_floating(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_floating()
    }

    #[must_use]
    pub fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::Timestamp)
    }
}

/// One typed value. `Null` is the only missing marker: a NaN float is a
/// *valid* value and is only distinguished by the NaN-fill kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
    /// Days since the Unix epoch.
    Date(i32),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
}

impl Scalar {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null => DType::Null,
            Self::Bool(_) => DType::Bool,
            Self::Int32(_) => DType::Int32,
            Self::Int64(_) => DType::Int64,
            Self::Float32(_) => DType::Float32,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
            Self::Binary(_) => DType::Binary,
            Self::Date(_) => DType::Date,
            Self::Timestamp(_) => DType::Timestamp,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        match self {
            Self::Float32(v) => v.is_nan(),
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Equality that treats NaN as equal to NaN, so arrays containing NaN
    /// can be compared slot by slot.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float32(a), Self::Float32(b)) => (a.is_nan() && b.is_nan()) || (a == b),
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || (a == b),
            _ => self == other,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("no common supertype for {left:?} and {right:?}")]
    NoCommonSupertype { left: DType, right: DType },
    #[error("cannot cast scalar of dtype {from:?} to {to:?}")]
    InvalidCast { from: DType, to: DType },
}

/// Minimal common supertype of two dtypes, or `None` when the categories
/// are incompatible. Commutative and reflexive; `Null` is the bottom of
/// the lattice. This is the sole cross-type compatibility rule the fill
/// subsystem consults.
#[must_use]
pub fn supertype(left: DType, right: DType) -> Option<DType> {
    use DType::{Bool, Date, Float32, Float64, Int32, Int64, Null, Timestamp};

    if left == right {
        return Some(left);
    }

    let out = match (left, right) {
        (Null, other) | (other, Null) => other,
        (Int32, Int64) | (Int64, Int32) => Int64,
        // Integer/float unification always lands on Float64: Float32
        // cannot represent every Int32, so there is no narrower choice.
        (Int32 | Int64, Float32 | Float64) | (Float32 | Float64, Int32 | Int64) => Float64,
        (Float32, Float64) | (Float64, Float32) => Float64,
        (Bool, other @ (Int32 | Int64 | Float32 | Float64))
        | (other @ (Int32 | Int64 | Float32 | Float64), Bool) => other,
        (Date, Timestamp) | (Timestamp, Date) => Timestamp,
        _ => return None,
    };

    Some(out)
}

/// Fold `supertype` over a sequence of values, starting from `Null`.
pub fn infer_dtype(values: &[Scalar]) -> Result<DType, TypeError> {
    let mut current = DType::Null;
    for value in values {
        let next = value.dtype();
        current = supertype(current, next).ok_or(TypeError::NoCommonSupertype {
            left: current,
            right: next,
        })?;
    }
    Ok(current)
}

/// Widening conversion of a scalar into `target`. The conversions here
/// cover exactly what the supertype lattice can produce; anything else is
/// an `InvalidCast`. Null casts to the target's null.
pub fn cast_scalar(value: Scalar, target: DType) -> Result<Scalar, TypeError> {
    let from = value.dtype();
    if value.is_null() {
        return Ok(Scalar::Null);
    }
    if from == target {
        return Ok(value);
    }

    match (value, target) {
        (Scalar::Bool(v), DType::Int32) => Ok(Scalar::Int32(i32::from(v))),
        (Scalar::Bool(v), DType::Int64) => Ok(Scalar::Int64(i64::from(v))),
        (Scalar::Bool(v), DType::Float32) => Ok(Scalar::Float32(if v { 1.0 } else { 0.0 })),
        (Scalar::Bool(v), DType::Float64) => Ok(Scalar::Float64(if v { 1.0 } else { 0.0 })),
        (Scalar::Int32(v), DType::Int64) => Ok(Scalar::Int64(i64::from(v))),
        (Scalar::Int32(v), DType::Float64) => Ok(Scalar::Float64(f64::from(v))),
        (Scalar::Int64(v), DType::Float64) => Ok(Scalar::Float64(v as f64)),
        (Scalar::Float32(v), DType::Float64) => Ok(Scalar::Float64(f64::from(v))),
        (Scalar::Date(days), DType::Timestamp) => {
            Ok(Scalar::Timestamp(i64::from(days) * MICROS_PER_DAY))
        }
        (_, _) => Err(TypeError::InvalidCast { from, to: target }),
    }
}

#[cfg(test)]
mod tests {
    use super::{DType, Scalar, TypeError, cast_scalar, infer_dtype, supertype};

    const ALL: [DType; 10] = [
        DType::Null,
        DType::Bool,
        DType::Int32,
        DType::Int64,
        DType::Float32,
        DType::Float64,
        DType::Utf8,
        DType::Binary,
        DType::Date,
        DType::Timestamp,
    ];

    #[test]
    fn supertype_is_reflexive() {
        for dtype in ALL {
            assert_eq!(supertype(dtype, dtype), Some(dtype));
        }
    }

    #[test]
    fn supertype_is_commutative() {
        for left in ALL {
            for right in ALL {
                assert_eq!(
                    supertype(left, right),
                    supertype(right, left),
                    "asymmetry at {left:?} / {right:?}"
                );
            }
        }
    }

    #[test]
    fn null_is_bottom() {
        for dtype in ALL {
            assert_eq!(supertype(DType::Null, dtype), Some(dtype));
        }
    }

    #[test]
    fn numeric_promotions() {
        assert_eq!(supertype(DType::Int32, DType::Int64), Some(DType::Int64));
        assert_eq!(supertype(DType::Int64, DType::Float32), Some(DType::Float64));
        assert_eq!(supertype(DType::Int32, DType::Float32), Some(DType::Float64));
        assert_eq!(supertype(DType::Float32, DType::Float64), Some(DType::Float64));
        assert_eq!(supertype(DType::Bool, DType::Int32), Some(DType::Int32));
        assert_eq!(supertype(DType::Bool, DType::Float32), Some(DType::Float32));
    }

    #[test]
    fn temporal_promotions() {
        assert_eq!(supertype(DType::Date, DType::Timestamp), Some(DType::Timestamp));
        assert_eq!(supertype(DType::Date, DType::Int64), None);
        assert_eq!(supertype(DType::Timestamp, DType::Float64), None);
    }

    #[test]
    fn incompatible_categories_have_no_supertype() {
        assert_eq!(supertype(DType::Utf8, DType::Int64), None);
        assert_eq!(supertype(DType::Binary, DType::Bool), None);
        assert_eq!(supertype(DType::Binary, DType::Utf8), None);
        assert_eq!(supertype(DType::Utf8, DType::Float64), None);
    }

    #[test]
    fn supertype_of_strings_is_string() {
        assert_eq!(supertype(DType::Utf8, DType::Utf8), Some(DType::Utf8));
        assert_eq!(supertype(DType::Binary, DType::Binary), Some(DType::Binary));
    }

    #[test]
    fn cast_realizes_every_reachable_supertype() {
        for left in ALL {
            for right in ALL {
                let Some(out) = supertype(left, right) else {
                    continue;
                };
                let sample = sample_of(left);
                assert!(
                    cast_scalar(sample, out).is_ok(),
                    "cast {left:?} -> {out:?} must exist"
                );
            }
        }
    }

    fn sample_of(dtype: DType) -> Scalar {
        match dtype {
            DType::Null => Scalar::Null,
            DType::Bool => Scalar::Bool(true),
            DType::Int32 => Scalar::Int32(7),
            DType::Int64 => Scalar::Int64(7),
            DType::Float32 => Scalar::Float32(1.5),
            DType::Float64 => Scalar::Float64(1.5),
            DType::Utf8 => Scalar::Utf8("x".to_owned()),
            DType::Binary => Scalar::Binary(vec![1]),
            DType::Date => Scalar::Date(19_000),
            DType::Timestamp => Scalar::Timestamp(1_700_000_000_000_000),
        }
    }

    #[test]
    fn cast_widens_date_to_timestamp_at_micro_scale() {
        let cast = cast_scalar(Scalar::Date(2), DType::Timestamp).expect("date widens");
        assert_eq!(cast, Scalar::Timestamp(2 * 86_400_000_000));
    }

    #[test]
    fn cast_null_is_target_null() {
        let cast = cast_scalar(Scalar::Null, DType::Float64).expect("null casts anywhere");
        assert_eq!(cast, Scalar::Null);
    }

    #[test]
    fn cast_rejects_cross_category() {
        let err = cast_scalar(Scalar::Utf8("a".to_owned()), DType::Int64)
            .expect_err("utf8 must not cast to int");
        assert_eq!(
            err,
            TypeError::InvalidCast {
                from: DType::Utf8,
                to: DType::Int64
            }
        );
    }

    #[test]
    fn infer_dtype_folds_to_widest() {
        let values = vec![Scalar::Null, Scalar::Int32(1), Scalar::Float32(0.5)];
        assert_eq!(infer_dtype(&values).expect("dtype infers"), DType::Float64);
    }

    #[test]
    fn infer_dtype_of_empty_and_all_null_is_null() {
        assert_eq!(infer_dtype(&[]).expect("empty"), DType::Null);
        assert_eq!(
            infer_dtype(&[Scalar::Null, Scalar::Null]).expect("all null"),
            DType::Null
        );
    }

    #[test]
    fn infer_dtype_rejects_mixed_categories() {
        let values = vec![Scalar::Utf8("a".to_owned()), Scalar::Int64(1)];
        assert!(infer_dtype(&values).is_err());
    }

    #[test]
    fn nan_is_a_valid_value_not_a_null() {
        let nan = Scalar::Float64(f64::NAN);
        assert!(!nan.is_null());
        assert!(nan.is_nan());
        assert!(!Scalar::Null.is_nan());
    }

    #[test]
    fn semantic_eq_matches_nan_against_nan() {
        assert!(Scalar::Float64(f64::NAN).semantic_eq(&Scalar::Float64(f64::NAN)));
        assert!(!Scalar::Float64(f64::NAN).semantic_eq(&Scalar::Float64(1.0)));
        assert!(Scalar::Null.semantic_eq(&Scalar::Null));
    }
}

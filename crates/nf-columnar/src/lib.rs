#![forbid(unsafe_code)]

use nf_types::{DType, Scalar, TypeError, cast_scalar, infer_dtype, supertype};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Packed per-slot null/non-null marker. Bit set means the slot is valid.
/// Bits past the logical length are always zero, so structural equality is
/// well defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validity {
    words: Vec<u64>,
    len: usize,
}

impl Validity {
    #[must_use]
    pub fn from_scalars(values: &[Scalar]) -> Self {
        let mut out = Self::all_null(values.len());
        for (idx, value) in values.iter().enumerate() {
            if !value.is_null() {
                out.words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        out
    }

    #[must_use]
    pub fn all_valid(len: usize) -> Self {
        let mut words = vec![u64::MAX; len.div_ceil(64)];
        let tail = len % 64;
        if tail > 0 {
            if let Some(last) = words.last_mut() {
                *last = (1_u64 << tail) - 1;
            }
        }
        Self { words, len }
    }

    #[must_use]
    pub fn all_null(len: usize) -> Self {
        Self {
            words: vec![0_u64; len.div_ceil(64)],
            len,
        }
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> bool {
        idx < self.len && (self.words[idx / 64] >> (idx % 64)) & 1 == 1
    }

    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        self.len - self.valid_count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Unpacked view, one bool per slot.
    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.get(idx))
    }

    fn from_bits(bits: &[bool]) -> Self {
        let mut out = Self::all_null(bits.len());
        for (idx, &valid) in bits.iter().enumerate() {
            if valid {
                out.words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        out
    }
}

impl Serialize for Validity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let bits: Vec<bool> = self.bits().collect();
        let mut state = serializer.serialize_struct("Validity", 1)?;
        state.serialize_field("bits", &bits)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Validity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            bits: Vec<bool>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(Self::from_bits(&raw.bits))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArrayError {
    #[error("array length mismatch outside broadcasting rules: left={left}, right={right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("{operator} is only defined for floating-point arrays; found {dtype:?}")]
    ExpectedFloat {
        operator: &'static str,
        dtype: DType,
    },
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Fixed-length sequence of typed slots, each valid or null. Invariant:
/// `values[i]` is `Scalar::Null` exactly where the validity bit is clear,
/// and every non-null value is an instance of `dtype`. Kernels never
/// mutate an array in place; each returns a fresh one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    dtype: DType,
    values: Vec<Scalar>,
    validity: Validity,
}

impl Array {
    /// Build an array of `dtype`, coercing each value through the widening
    /// cast table. A value that cannot become an instance of `dtype` is a
    /// construction error, never a silent null.
    pub fn new(dtype: DType, values: Vec<Scalar>) -> Result<Self, ArrayError> {
        let coerced = values
            .into_iter()
            .map(|value| cast_scalar(value, dtype))
            .collect::<Result<Vec<_>, _>>()?;
        let validity = Validity::from_scalars(&coerced);
        Ok(Self {
            dtype,
            values: coerced,
            validity,
        })
    }

    /// Build from a plain scalar sequence, inferring the dtype by folding
    /// the supertype lattice over the values.
    pub fn from_scalars(values: Vec<Scalar>) -> Result<Self, ArrayError> {
        let dtype = infer_dtype(&values).map_err(ArrayError::from)?;
        Self::new(dtype, values)
    }

    #[must_use]
    pub fn full_null(dtype: DType, len: usize) -> Self {
        Self {
            dtype,
            values: vec![Scalar::Null; len],
            validity: Validity::all_null(len),
        }
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Ordered scalar view of the array, nulls included.
    #[must_use]
    pub fn scalars(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(idx)
    }

    #[must_use]
    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        self.validity.null_count()
    }

    /// Slot-wise equality with NaN treated as equal to NaN.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.dtype == other.dtype
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(left, right)| left.semantic_eq(right))
    }

    /// Boolean mask of null slots. Total: the output is all-valid.
    #[must_use]
    pub fn is_null(&self) -> Self {
        let values: Vec<Scalar> = self
            .values
            .iter()
            .map(|value| Scalar::Bool(value.is_null()))
            .collect();
        Self {
            dtype: DType::Bool,
            validity: Validity::all_valid(values.len()),
            values,
        }
    }

    /// Boolean mask of valid slots. Total: the output is all-valid.
    #[must_use]
    pub fn not_null(&self) -> Self {
        let values: Vec<Scalar> = self
            .values
            .iter()
            .map(|value| Scalar::Bool(!value.is_null()))
            .collect();
        Self {
            dtype: DType::Bool,
            validity: Validity::all_valid(values.len()),
            values,
        }
    }

    /// Replace null slots with the corresponding `fill` slot. The output
    /// dtype is the supertype of both operand dtypes; a missing supertype
    /// is the same failure the resolver predicts statically. A length-1
    /// operand broadcasts against the other side; a null fill slot leaves
    /// the output slot null.
    pub fn fill_value(&self, fill: &Self) -> Result<Self, ArrayError> {
        let out_dtype = supertype(self.dtype, fill.dtype).ok_or(TypeError::NoCommonSupertype {
            left: self.dtype,
            right: fill.dtype,
        })?;

        let out_len = broadcast_len(self.len(), fill.len())?;
        let mut values = Vec::with_capacity(out_len);
        for idx in 0..out_len {
            let data_slot = broadcast_slot(&self.values, idx);
            let fill_slot = broadcast_slot(&fill.values, idx);
            let picked = if data_slot.is_null() { fill_slot } else { data_slot };
            values.push(cast_scalar(picked.clone(), out_dtype)?);
        }

        let validity = Validity::from_scalars(&values);
        Ok(Self {
            dtype: out_dtype,
            values,
            validity,
        })
    }

    /// Replace each null slot with the nearest valid value to its left,
    /// in one left-to-right pass. A leading run with no prior valid value
    /// stays null. The dtype is preserved exactly.
    #[must_use]
    pub fn fill_forward(&self) -> Self {
        let mut values = Vec::with_capacity(self.values.len());
        let mut last_valid: Option<&Scalar> = None;
        for slot in &self.values {
            if slot.is_null() {
                values.push(last_valid.cloned().unwrap_or(Scalar::Null));
            } else {
                last_valid = Some(slot);
                values.push(slot.clone());
            }
        }
        let validity = Validity::from_scalars(&values);
        Self {
            dtype: self.dtype,
            values,
            validity,
        }
    }

    /// Mirror of `fill_forward`: one right-to-left pass, trailing runs
    /// with no following valid value stay null.
    #[must_use]
    pub fn fill_backward(&self) -> Self {
        let mut values = vec![Scalar::Null; self.values.len()];
        let mut next_valid: Option<&Scalar> = None;
        for (idx, slot) in self.values.iter().enumerate().rev() {
            if slot.is_null() {
                if let Some(fill) = next_valid {
                    values[idx] = fill.clone();
                }
            } else {
                next_valid = Some(slot);
                values[idx] = slot.clone();
            }
        }
        let validity = Validity::from_scalars(&values);
        Self {
            dtype: self.dtype,
            values,
            validity,
        }
    }

    /// Replace slots holding the IEEE NaN pattern with the corresponding
    /// `fill` slot. Null slots are not NaN slots: they pass through
    /// untouched. Defined only for floating-point arrays and fills; the
    /// output dtype is exactly the input's.
    pub fn fill_nan(&self, fill: &Self) -> Result<Self, ArrayError> {
        if !self.dtype.is_floating() {
            return Err(ArrayError::ExpectedFloat {
                operator: "fill_nan",
                dtype: self.dtype,
            });
        }
        if !fill.dtype.is_floating() {
            return Err(ArrayError::ExpectedFloat {
                operator: "fill_nan",
                dtype: fill.dtype,
            });
        }

        let out_len = broadcast_len(self.len(), fill.len())?;
        let mut values = Vec::with_capacity(out_len);
        for idx in 0..out_len {
            let data_slot = broadcast_slot(&self.values, idx);
            if data_slot.is_nan() {
                values.push(refloat(broadcast_slot(&fill.values, idx), self.dtype));
            } else {
                values.push(data_slot.clone());
            }
        }

        let validity = Validity::from_scalars(&values);
        Ok(Self {
            dtype: self.dtype,
            values,
            validity,
        })
    }

    /// Compacting copy without the null slots.
    #[must_use]
    pub fn drop_null(&self) -> Self {
        let values: Vec<Scalar> = self
            .values
            .iter()
            .filter(|value| !value.is_null())
            .cloned()
            .collect();
        let validity = Validity::all_valid(values.len());
        Self {
            dtype: self.dtype,
            values,
            validity,
        }
    }
}

fn broadcast_len(left: usize, right: usize) -> Result<usize, ArrayError> {
    match (left, right) {
        (l, r) if l == r => Ok(l),
        (1, r) => Ok(r),
        (l, 1) => Ok(l),
        (left, right) => Err(ArrayError::LengthMismatch { left, right }),
    }
}

fn broadcast_slot(values: &[Scalar], idx: usize) -> &Scalar {
    if values.len() == 1 { &values[0] } else { &values[idx] }
}

/// Carry a float fill slot into the target float width. Both arrays are
/// float-typed when this runs, so non-null slots are Float32 or Float64.
fn refloat(slot: &Scalar, target: DType) -> Scalar {
    match (target, slot) {
        (_, Scalar::Null) => Scalar::Null,
        (DType::Float32, Scalar::Float64(v)) => Scalar::Float32(*v as f32),
        (DType::Float64, Scalar::Float32(v)) => Scalar::Float64(f64::from(*v)),
        (_, other) => other.clone(),
    }
}

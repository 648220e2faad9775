#![forbid(unsafe_code)]

//! Conformance harness for the null-handling subsystem.
//!
//! The central contract: for every (operator, operand-dtype) combination,
//! static resolution must predict exactly whether evaluation succeeds, and
//! when it succeeds the produced array's dtype must equal the prediction.
//! This crate provides the sample-data generators, the pairwise dtype
//! matrix sweep, and the assertion helper the test suites and the
//! `nf-matrix` binary share.

use nf_columnar::Array;
use nf_expr::{EvalContext, Expr, Schema, col, evaluate, resolve};
use nf_types::{DType, Scalar, supertype};
use serde::Serialize;

/// The full dtype catalog, in lattice-bottom-first order, for matrix
/// iteration.
pub const ALL_DTYPES: [DType; 10] = [
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

/// Deterministic non-null representative of `dtype`, varied by `seed`.
#[must_use]
pub fn sample_scalar(dtype: DType, seed: usize) -> Scalar {
    match dtype {
        DType::Null => Scalar::Null,
        DType::Bool => Scalar::Bool(seed % 2 == 0),
        DType::Int32 => Scalar::Int32(seed as i32 - 3),
        DType::Int64 => Scalar::Int64(seed as i64 * 10),
        DType::Float32 => Scalar::Float32(seed as f32 * 0.5),
        DType::Float64 => Scalar::Float64(seed as f64 * 2.5),
        DType::Utf8 => Scalar::Utf8(format!("s{seed}")),
        DType::Binary => Scalar::Binary(vec![seed as u8, 0xff]),
        DType::Date => Scalar::Date(19_000 + seed as i32),
        DType::Timestamp => Scalar::Timestamp(1_700_000_000_000_000 + seed as i64),
    }
}

/// Representative array of `dtype`: every `null_every`-th slot is null
/// (`0` disables nulls). A `Null`-dtyped array is all-null whatever the
/// pattern says.
#[must_use]
pub fn sample_array(dtype: DType, len: usize, null_every: usize) -> Array {
    if dtype == DType::Null {
        return Array::full_null(dtype, len);
    }
    let values = (0..len)
        .map(|idx| {
            if null_every != 0 && idx % null_every == 0 {
                Scalar::Null
            } else {
                sample_scalar(dtype, idx)
            }
        })
        .collect();
    Array::new(dtype, values).expect("sample values are instances of their dtype")
}

/// Build the schema/context pair for a set of named columns.
#[must_use]
pub fn batch(columns: Vec<(&str, Array)>) -> (Schema, EvalContext) {
    let mut schema = Schema::new();
    let mut context = EvalContext::new();
    for (name, array) in columns {
        schema.insert(name, array.dtype());
        context.bind_array(name, array);
    }
    (schema, context)
}

/// Assert the resolve/runtime contract for one expression over one
/// well-shaped context: resolution succeeds iff `resolvable`, evaluation
/// agrees with resolution, and a successful evaluation produces exactly
/// the resolved dtype.
pub fn check_resolve_vs_runtime(
    expr: &Expr,
    schema: &Schema,
    context: &EvalContext,
    resolvable: bool,
) {
    let resolved = resolve(expr, schema);
    let produced = evaluate(expr, context);
    match (resolved, produced) {
        (Ok(dtype), Ok(array)) => {
            assert!(
                resolvable,
                "resolver accepted {expr:?} but the harness expected a resolution failure"
            );
            assert_eq!(
                array.dtype(),
                dtype,
                "evaluate produced {:?} where resolve predicted {dtype:?} for {expr:?}",
                array.dtype()
            );
        }
        (Err(err), Err(_)) => {
            assert!(
                !resolvable,
                "resolver rejected {expr:?} unexpectedly: {err}"
            );
        }
        (Ok(dtype), Err(err)) => {
            panic!("resolve predicted {dtype:?} for {expr:?} but evaluate failed: {err}");
        }
        (Err(err), Ok(array)) => {
            panic!(
                "resolve failed for {expr:?} ({err}) but evaluate produced a {:?} array",
                array.dtype()
            );
        }
    }
}

/// One cell of the value-based `fill_null` dtype matrix.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixOutcome {
    pub left: DType,
    pub right: DType,
    pub expected_resolvable: bool,
    pub resolved: Option<DType>,
    pub produced: Option<DType>,
    pub agrees: bool,
}

/// Sweep every (data dtype, fill dtype) pair through value-based
/// `fill_null` on representative arrays, recording whether resolution,
/// evaluation, and the supertype predicate tell the same story.
#[must_use]
pub fn run_fill_null_matrix() -> Vec<MatrixOutcome> {
    let mut outcomes = Vec::with_capacity(ALL_DTYPES.len() * ALL_DTYPES.len());
    for left in ALL_DTYPES {
        for right in ALL_DTYPES {
            let data = sample_array(left, 6, 3);
            let fill = sample_array(right, 6, 4);
            let (schema, context) = batch(vec![("data", data), ("fill", fill)]);
            let expr = col("data").fill_null(col("fill"));

            let expected_resolvable = supertype(left, right).is_some();
            let resolved = resolve(&expr, &schema).ok();
            let produced = evaluate(&expr, &context).ok().map(|array| array.dtype());
            let agrees = resolved.is_some() == expected_resolvable && resolved == produced;

            outcomes.push(MatrixOutcome {
                left,
                right,
                expected_resolvable,
                resolved,
                produced,
                agrees,
            });
        }
    }
    outcomes
}

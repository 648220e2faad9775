#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::str::FromStr;

use nf_columnar::{Array, ArrayError};
use nf_types::{DType, Scalar, supertype};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Null replacement by nearest valid neighbor in a fixed scan direction.
/// Not a dtype: selecting a strategy never changes the output type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    Forward,
    Backward,
}

impl FromStr for FillStrategy {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            other => Err(ResolveError::UnknownStrategy(other.to_owned())),
        }
    }
}

/// Exactly one of a fill value or a fill strategy. The tagged union makes
/// the mutual exclusivity a construction-time fact instead of a runtime
/// branch over optional parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FillSpec {
    Value { fill: Box<Expr> },
    Strategy { strategy: FillStrategy },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Column { name: String },
    Literal { value: Scalar },
    IsNull { input: Box<Expr> },
    NotNull { input: Box<Expr> },
    FillNull { input: Box<Expr>, fill: FillSpec },
    FillNan { input: Box<Expr>, fill: Box<Expr> },
}

#[must_use]
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column { name: name.into() }
}

#[must_use]
pub fn lit(value: Scalar) -> Expr {
    Expr::Literal { value }
}

impl Expr {
    #[must_use]
    pub fn is_null(self) -> Self {
        Self::IsNull {
            input: Box::new(self),
        }
    }

    #[must_use]
    pub fn not_null(self) -> Self {
        Self::NotNull {
            input: Box::new(self),
        }
    }

    #[must_use]
    pub fn fill_null(self, fill: Self) -> Self {
        Self::FillNull {
            input: Box::new(self),
            fill: FillSpec::Value {
                fill: Box::new(fill),
            },
        }
    }

    #[must_use]
    pub fn fill_null_with_strategy(self, strategy: FillStrategy) -> Self {
        Self::FillNull {
            input: Box::new(self),
            fill: FillSpec::Strategy { strategy },
        }
    }

    #[must_use]
    pub fn fill_nan(self, fill: Self) -> Self {
        Self::FillNan {
            input: Box::new(self),
            fill: Box::new(fill),
        }
    }
}

/// Column name to dtype mapping used by static resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: BTreeMap<String, DType>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, dtype: DType) {
        self.fields.insert(name.into(), dtype);
    }

    #[must_use]
    pub fn dtype(&self, name: &str) -> Option<DType> {
        self.fields.get(name).copied()
    }
}

impl FromIterator<(String, DType)> for Schema {
    fn from_iter<I: IntoIterator<Item = (String, DType)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Static resolution failure: produced before any kernel runs, never
/// recovered from.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown column reference: {0}")]
    UnknownColumn(String),
    #[error("{operator}: no common supertype for {left:?} and {right:?}")]
    NoCommonSupertype {
        operator: &'static str,
        left: DType,
        right: DType,
    },
    #[error("{operator} expects a floating-point operand; found {dtype:?}")]
    ExpectedFloat {
        operator: &'static str,
        dtype: DType,
    },
    #[error("unknown fill strategy {0:?}; expected \"forward\" or \"backward\"")]
    UnknownStrategy(String),
}

/// Determine the output dtype of `expr` against `schema` from operand
/// types alone. Referentially transparent; an `Err` here must mean the
/// adapter would fail on well-shaped data, and an `Ok` that it would
/// succeed with exactly this dtype.
pub fn resolve(expr: &Expr, schema: &Schema) -> Result<DType, ResolveError> {
    match expr {
        Expr::Column { name } => schema
            .dtype(name)
            .ok_or_else(|| ResolveError::UnknownColumn(name.clone())),
        Expr::Literal { value } => Ok(value.dtype()),
        Expr::IsNull { input } | Expr::NotNull { input } => {
            resolve(input, schema)?;
            Ok(DType::Bool)
        }
        Expr::FillNull { input, fill } => {
            let input_dtype = resolve(input, schema)?;
            match fill {
                // Strategy fill never promotes: the output is the input's
                // dtype for both directions.
                FillSpec::Strategy { .. } => Ok(input_dtype),
                FillSpec::Value { fill } => {
                    let fill_dtype = resolve(fill, schema)?;
                    supertype(input_dtype, fill_dtype).ok_or(ResolveError::NoCommonSupertype {
                        operator: "fill_null",
                        left: input_dtype,
                        right: fill_dtype,
                    })
                }
            }
        }
        Expr::FillNan { input, fill } => {
            let input_dtype = resolve(input, schema)?;
            if !input_dtype.is_floating() {
                return Err(ResolveError::ExpectedFloat {
                    operator: "fill_nan",
                    dtype: input_dtype,
                });
            }
            let fill_dtype = resolve(fill, schema)?;
            if !fill_dtype.is_floating() {
                return Err(ResolveError::ExpectedFloat {
                    operator: "fill_nan",
                    dtype: fill_dtype,
                });
            }
            Ok(input_dtype)
        }
    }
}

/// An expression annotated with its statically determined output dtype.
/// Never mutated after creation: re-resolution builds a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolved {
    expr: Expr,
    dtype: DType,
}

impl Resolved {
    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Dispatch the annotated expression against concrete columns.
    pub fn evaluate(&self, context: &EvalContext) -> Result<Array, EvalError> {
        evaluate(&self.expr, context)
    }
}

/// Two-phase entry point: annotate `expr` with its resolved output dtype,
/// consuming it into an immutable [`Resolved`] node.
pub fn resolve_expr(expr: Expr, schema: &Schema) -> Result<Resolved, ResolveError> {
    let dtype = resolve(&expr, schema)?;
    Ok(Resolved { expr, dtype })
}

/// A bound column in the loosely-typed exchange format: either a proper
/// array, or a plain scalar sequence that was ingested but never
/// converted. Kernels require arrays; meeting a `Cells` binding where an
/// array is needed is the operand-kind runtime violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnValue {
    Array(Array),
    Cells(Vec<Scalar>),
}

impl ColumnValue {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Array(_) => "array",
            Self::Cells(_) => "cell sequence",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    columns: BTreeMap<String, ColumnValue>,
}

impl EvalContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: ColumnValue) {
        self.columns.insert(name.into(), value);
    }

    pub fn bind_array(&mut self, name: impl Into<String>, array: Array) {
        self.bind(name, ColumnValue::Array(array));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.columns.get(name)
    }
}

/// Runtime failure class, disjoint from `ResolveError`: operand-kind and
/// shape violations the schema cannot see, plus kernel errors passed
/// through unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("unknown column reference: {0}")]
    UnknownColumn(String),
    #[error("column {column:?}: expected an array operand but got a {received}")]
    ExpectedArray {
        column: String,
        received: &'static str,
    },
    #[error(transparent)]
    Array(#[from] ArrayError),
}

/// Bind `expr` to concrete columns and dispatch to the matching kernel.
/// On well-typed, well-shaped inputs this must succeed whenever `resolve`
/// does; that agreement is the contract the conformance suite sweeps.
pub fn evaluate(expr: &Expr, context: &EvalContext) -> Result<Array, EvalError> {
    match expr {
        Expr::Column { name } => match context.get(name) {
            Some(ColumnValue::Array(array)) => Ok(array.clone()),
            Some(other) => Err(EvalError::ExpectedArray {
                column: name.clone(),
                received: other.kind(),
            }),
            None => Err(EvalError::UnknownColumn(name.clone())),
        },
        // A literal evaluates to the length-1 broadcastable form.
        Expr::Literal { value } => {
            Array::new(value.dtype(), vec![value.clone()]).map_err(EvalError::from)
        }
        Expr::IsNull { input } => Ok(evaluate(input, context)?.is_null()),
        Expr::NotNull { input } => Ok(evaluate(input, context)?.not_null()),
        Expr::FillNull { input, fill } => {
            let data = evaluate(input, context)?;
            match fill {
                FillSpec::Strategy {
                    strategy: FillStrategy::Forward,
                } => Ok(data.fill_forward()),
                FillSpec::Strategy {
                    strategy: FillStrategy::Backward,
                } => Ok(data.fill_backward()),
                FillSpec::Value { fill } => {
                    let fill = evaluate(fill, context)?;
                    data.fill_value(&fill).map_err(EvalError::from)
                }
            }
        }
        Expr::FillNan { input, fill } => {
            let data = evaluate(input, context)?;
            let fill = evaluate(fill, context)?;
            data.fill_nan(&fill).map_err(EvalError::from)
        }
    }
}

/// Evaluate a batch of expressions against one context, failing on the
/// first error.
pub fn evaluate_all(exprs: &[Expr], context: &EvalContext) -> Result<Vec<Array>, EvalError> {
    exprs.iter().map(|expr| evaluate(expr, context)).collect()
}

//! Input canonicalization for transforms and running statistics
//!
//! Transforms accept scalars, flat sequences and `ndarray` arrays. Everything
//! is funnelled through [`IntoSignal`] (rank ≤ 1, for the elementwise
//! transforms) or [`IntoBatch`] (rank ≥ 2 after canonicalization, for
//! [`RunningMeanStd`](crate::RunningMeanStd)).

use ndarray::{Array1, ArrayBase, ArrayD, Data, Dimension, IxDyn};
use num_traits::ToPrimitive;

use crate::{RLError, Result};

/// A canonicalized rank-0 or rank-1 numeric signal
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// A single value
    Scalar(f64),
    /// A flat sequence of values
    Vector(Array1<f64>),
}

impl Signal {
    /// Number of elements (1 for a scalar)
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector(v) => v.len(),
        }
    }

    /// Whether the signal holds no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value if this is a scalar
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(x) => Some(*x),
            Self::Vector(_) => None,
        }
    }

    /// The values if this is a vector
    #[must_use]
    pub fn as_vector(&self) -> Option<&Array1<f64>> {
        match self {
            Self::Scalar(_) => None,
            Self::Vector(v) => Some(v),
        }
    }

    /// Flatten into a vector (a scalar becomes a length-1 vector)
    #[must_use]
    pub fn into_array(self) -> Array1<f64> {
        match self {
            Self::Scalar(x) => Array1::from_elem(1, x),
            Self::Vector(v) => v,
        }
    }

    /// Copy the values into a `Vec`
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Self::Scalar(x) => vec![*x],
            Self::Vector(v) => v.to_vec(),
        }
    }

    /// Apply `f` to every element, keeping the scalar/vector form
    #[must_use]
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        match self {
            Self::Scalar(x) => Self::Scalar(f(*x)),
            Self::Vector(v) => Self::Vector(v.mapv(f)),
        }
    }

    /// Unwrap a vector, rejecting scalars for operations that only make sense over a sequence
    pub fn require_sequence(self, op: &str) -> Result<Array1<f64>> {
        match self {
            Self::Scalar(_) => Err(RLError::Type(format!(
                "{op} requires a sequence, got a scalar"
            ))),
            Self::Vector(v) => Ok(v),
        }
    }
}

impl From<f64> for Signal {
    fn from(x: f64) -> Self {
        Self::Scalar(x)
    }
}

impl From<Array1<f64>> for Signal {
    fn from(v: Array1<f64>) -> Self {
        Self::Vector(v)
    }
}

impl PartialEq<f64> for Signal {
    fn eq(&self, other: &f64) -> bool {
        self.as_scalar() == Some(*other)
    }
}

fn to_f64<T: ToPrimitive>(x: &T) -> Result<f64> {
    x.to_f64()
        .ok_or_else(|| RLError::Type("value is not representable as f64".to_string()))
}

fn collect_f64<'a, T, I>(iter: I) -> Result<Array1<f64>>
where
    T: ToPrimitive + 'a,
    I: IntoIterator<Item = &'a T>,
{
    iter.into_iter()
        .map(to_f64)
        .collect::<Result<Vec<_>>>()
        .map(Array1::from_vec)
}

/// Conversion into a rank ≤ 1 [`Signal`]
pub trait IntoSignal {
    /// Canonicalize, failing with [`RLError::Shape`] for rank > 1 input
    fn into_signal(self) -> Result<Signal>;
}

impl IntoSignal for Signal {
    fn into_signal(self) -> Result<Signal> {
        Ok(self)
    }
}

macro_rules! impl_scalar_signal {
    ($($t:ty),*) => {
        $(
            impl IntoSignal for $t {
                fn into_signal(self) -> Result<Signal> {
                    to_f64(&self).map(Signal::Scalar)
                }
            }

            impl IntoBatch for $t {
                fn into_batch(self) -> Result<ArrayD<f64>> {
                    let x = to_f64(&self)?;
                    Ok(ArrayD::from_elem(IxDyn(&[1, 1]), x))
                }
            }
        )*
    };
}

impl_scalar_signal!(f64, f32, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl<T: ToPrimitive> IntoSignal for Vec<T> {
    fn into_signal(self) -> Result<Signal> {
        collect_f64(&self).map(Signal::Vector)
    }
}

impl<T: ToPrimitive> IntoSignal for &Vec<T> {
    fn into_signal(self) -> Result<Signal> {
        collect_f64(self).map(Signal::Vector)
    }
}

impl<T: ToPrimitive> IntoSignal for &[T] {
    fn into_signal(self) -> Result<Signal> {
        collect_f64(self).map(Signal::Vector)
    }
}

impl<T: ToPrimitive, const N: usize> IntoSignal for [T; N] {
    fn into_signal(self) -> Result<Signal> {
        collect_f64(&self).map(Signal::Vector)
    }
}

impl<T: ToPrimitive, const N: usize> IntoSignal for &[T; N] {
    fn into_signal(self) -> Result<Signal> {
        collect_f64(self).map(Signal::Vector)
    }
}

impl<A, S, D> IntoSignal for &ArrayBase<S, D>
where
    A: ToPrimitive,
    S: Data<Elem = A>,
    D: Dimension,
{
    fn into_signal(self) -> Result<Signal> {
        match self.ndim() {
            0 => self
                .iter()
                .next()
                .ok_or_else(|| RLError::Shape("empty rank-0 array".to_string()))
                .and_then(to_f64)
                .map(Signal::Scalar),
            1 => collect_f64(self.iter()).map(Signal::Vector),
            n => Err(RLError::Shape(format!(
                "expected an array with at most 1 dimension, got {n} dimensions (shape {:?})",
                self.shape()
            ))),
        }
    }
}

impl<A, S, D> IntoSignal for ArrayBase<S, D>
where
    A: ToPrimitive,
    S: Data<Elem = A>,
    D: Dimension,
{
    fn into_signal(self) -> Result<Signal> {
        (&self).into_signal()
    }
}

/// Conversion into a batch whose first axis indexes samples
///
/// Scalars become shape `(1, 1)`, flat sequences of length `N` become
/// `(N, 1)`, and arrays of rank ≥ 2 are used as-is.
pub trait IntoBatch {
    /// Canonicalize into a batch of rank ≥ 2
    fn into_batch(self) -> Result<ArrayD<f64>>;
}

fn column(values: Array1<f64>) -> Result<ArrayD<f64>> {
    let n = values.len();
    values
        .into_shape(IxDyn(&[n, 1]))
        .map_err(|e| RLError::Shape(e.to_string()))
}

impl<T: ToPrimitive> IntoBatch for Vec<T> {
    fn into_batch(self) -> Result<ArrayD<f64>> {
        collect_f64(&self).and_then(column)
    }
}

impl<T: ToPrimitive> IntoBatch for &[T] {
    fn into_batch(self) -> Result<ArrayD<f64>> {
        collect_f64(self).and_then(column)
    }
}

impl<T: ToPrimitive, const N: usize> IntoBatch for [T; N] {
    fn into_batch(self) -> Result<ArrayD<f64>> {
        collect_f64(&self).and_then(column)
    }
}

impl<A, S, D> IntoBatch for &ArrayBase<S, D>
where
    A: ToPrimitive,
    S: Data<Elem = A>,
    D: Dimension,
{
    fn into_batch(self) -> Result<ArrayD<f64>> {
        match self.ndim() {
            0 | 1 => collect_f64(self.iter()).and_then(column),
            _ => {
                let values = self.iter().map(to_f64).collect::<Result<Vec<_>>>()?;
                ArrayD::from_shape_vec(IxDyn(self.shape()), values)
                    .map_err(|e| RLError::Shape(e.to_string()))
            }
        }
    }
}

impl<A, S, D> IntoBatch for ArrayBase<S, D>
where
    A: ToPrimitive,
    S: Data<Elem = A>,
    D: Dimension,
{
    fn into_batch(self) -> Result<ArrayD<f64>> {
        (&self).into_batch()
    }
}

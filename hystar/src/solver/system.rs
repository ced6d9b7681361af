//! Incremental construction of linear programs.
//!
//! [`ConstraintSystem`] is the typed replacement for building solver models
//! term by term: callers allocate variables, push sparse rows, set an
//! objective, and lower the whole system to a [`LinearProgram`] once.
use std::ops::Range;

use nalgebra::{DMatrix, DVector};
use strum::EnumIs;

use crate::solver::{LinearProgram, Sense};

/// Lower bound attached to a variable.
#[derive(Debug, Clone, Copy, PartialEq, EnumIs)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VarBound {
    Free,
    AtLeast(f64),
}

impl VarBound {
    pub const NONNEGATIVE: VarBound = VarBound::AtLeast(0.0);
}

/// State of a membership encoding: either a constant point or existing variables.
#[derive(Debug, Clone, Copy)]
pub enum StateRef<'a> {
    Point(&'a DVector<f64>),
    Variables(&'a [usize]),
}

impl StateRef<'_> {
    pub fn len(&self) -> usize {
        match self {
            StateRef::Point(p) => p.len(),
            StateRef::Variables(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct Row {
    terms: Vec<(usize, f64)>,
    rhs: f64,
}

/// Accumulator of variables, constraints and an objective.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSystem {
    bounds: Vec<VarBound>,
    le: Vec<Row>,
    eq: Vec<Row>,
    objective: Vec<(usize, f64)>,
    sense: Sense,
}

impl ConstraintSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `count` variables sharing the same bound.
    pub fn add_variables(&mut self, count: usize, bound: VarBound) -> Range<usize> {
        let start = self.bounds.len();
        self.bounds.extend(std::iter::repeat_n(bound, count));
        start..self.bounds.len()
    }

    pub fn add_variable(&mut self, bound: VarBound) -> usize {
        self.add_variables(1, bound).start
    }

    pub fn num_vars(&self) -> usize {
        self.bounds.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.le.len() + self.eq.len()
    }

    /// Push `Σ coeff·x ≤ rhs`.
    pub fn add_le(&mut self, terms: impl IntoIterator<Item = (usize, f64)>, rhs: f64) {
        self.le.push(Row {
            terms: terms.into_iter().collect(),
            rhs,
        });
    }

    /// Push `Σ coeff·x = rhs`.
    pub fn add_eq(&mut self, terms: impl IntoIterator<Item = (usize, f64)>, rhs: f64) {
        self.eq.push(Row {
            terms: terms.into_iter().collect(),
            rhs,
        });
    }

    pub fn minimize(&mut self, terms: impl IntoIterator<Item = (usize, f64)>) {
        self.sense = Sense::Minimize;
        self.objective = terms.into_iter().collect();
    }

    pub fn maximize(&mut self, terms: impl IntoIterator<Item = (usize, f64)>) {
        self.sense = Sense::Maximize;
        self.objective = terms.into_iter().collect();
    }

    /// Lower the accumulated system to a dense program.
    ///
    /// Repeated terms on the same variable are summed.
    pub fn into_program(self) -> LinearProgram {
        let n = self.bounds.len();
        let dense = |rows: &[Row]| {
            let mut a = DMatrix::zeros(rows.len(), n);
            let mut b = DVector::zeros(rows.len());
            for (i, row) in rows.iter().enumerate() {
                for &(j, v) in &row.terms {
                    a[(i, j)] += v;
                }
                b[i] = row.rhs;
            }
            (a, b)
        };

        let (a_ub, b_ub) = dense(&self.le);
        let (a_eq, b_eq) = dense(&self.eq);
        let mut objective = DVector::zeros(n);
        for (j, v) in self.objective {
            objective[j] += v;
        }

        LinearProgram {
            sense: self.sense,
            objective,
            a_ub,
            b_ub,
            a_eq,
            b_eq,
            bounds: self.bounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowering_sums_repeated_terms() {
        let mut sys = ConstraintSystem::new();
        let xs = sys.add_variables(2, VarBound::Free);
        let mu = sys.add_variable(VarBound::NONNEGATIVE);
        sys.add_le([(xs.start, 1.0), (xs.start, 2.0), (mu, -1.0)], 4.0);
        sys.add_eq([(xs.start + 1, 1.0)], 0.5);
        sys.minimize([(mu, 1.0)]);

        let program = sys.into_program();
        assert_eq!(program.num_vars(), 3);
        assert_eq!(program.a_ub[(0, 0)], 3.0);
        assert_eq!(program.a_ub[(0, 2)], -1.0);
        assert_eq!(program.b_eq[0], 0.5);
        assert_eq!(program.objective[2], 1.0);
        assert!(program.bounds[2].is_at_least());
        assert!(program.validate().is_ok());
    }

    #[test]
    fn allocation_ranges_are_contiguous() {
        let mut sys = ConstraintSystem::new();
        let a = sys.add_variables(3, VarBound::Free);
        let b = sys.add_variables(2, VarBound::Free);
        assert_eq!(a, 0..3);
        assert_eq!(b, 3..5);
        assert_eq!(sys.num_vars(), 5);
    }
}

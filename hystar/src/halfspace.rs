use nalgebra::DVector;

/// Closed half-space `{ x : H·x ≤ g }`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HalfSpace {
    pub normal: DVector<f64>,
    pub bound: f64,
}

impl HalfSpace {
    pub fn new(normal: DVector<f64>, bound: f64) -> Self {
        Self { normal, bound }
    }

    pub fn dimension(&self) -> usize {
        self.normal.len()
    }

    /// The closure of the complement, `{ x : -H·x ≤ -g }`.
    pub fn negated(&self) -> Self {
        Self {
            normal: -&self.normal,
            bound: -self.bound,
        }
    }

    pub fn contains(&self, point: &DVector<f64>) -> bool {
        self.normal.dot(point) <= self.bound
    }
}

use std::{fmt::Display, ops::Deref};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Percentage {
    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value < 0. || value.is_nan() {
            None
        } else {
            Some(Percentage(value))
        }
    }

    pub fn zero() -> Percentage {
        Percentage(0.)
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Share of `part` in `whole`. An empty or negative whole has no meaningful share and yields 0%.
pub fn share_percentage(part: i64, whole: i64) -> Percentage {
    if whole <= 0 || part <= 0 {
        return Percentage::zero();
    }
    Percentage::new_opt(part as f64 / whole as f64 * 100.)
        .expect("Percentage of two positive values is always at least 0")
}

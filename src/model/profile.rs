use std::ops::Range;

/// The class a builder assigns to one binary variable in one period.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VarClass {
    /// Pinned to a known value.
    Fixed(f64),
    /// Genuine binary.
    Integer,
    /// Relaxed to the unit interval.
    Relaxed,
}

/// Per-(variable, period) class profile for the setup structure. The
/// continuous variables (x, b, I, P) are never anything but continuous, so
/// only y, lambda and u are profiled.
#[derive(Clone, Debug)]
pub struct SetupClasses {
    pub y: Vec<Vec<VarClass>>,
    pub lambda: Vec<Vec<VarClass>>,
    pub unmet: VarClass,
}

impl SetupClasses {
    /// Everything binary; the profile of a monolithic solve.
    pub fn all_integer(groups: usize, periods: usize) -> SetupClasses {
        SetupClasses {
            y: vec![vec![VarClass::Integer; periods]; groups],
            lambda: vec![vec![VarClass::Integer; periods]; groups],
            unmet: VarClass::Integer,
        }
    }

    /// The RF sub-problem SP(k, W): `[0, front)` fixed to the committed
    /// values, `[front, front + window)` integer, the tail relaxed. The
    /// unmet indicator stays relaxed during the sweep.
    pub fn rolling(
        front: usize,
        window: usize,
        y_fixed: &[Vec<u8>],
        lambda_fixed: &[Vec<u8>],
    ) -> SetupClasses {
        let periods = y_fixed.first().map_or(0, Vec::len);
        let win_end = (front + window).min(periods);

        let grid = |fixed: &[Vec<u8>]| {
            fixed
                .iter()
                .map(|row| {
                    (0..periods)
                        .map(|t| {
                            if t < front {
                                VarClass::Fixed(row[t] as f64)
                            } else if t < win_end {
                                VarClass::Integer
                            } else {
                                VarClass::Relaxed
                            }
                        })
                        .collect()
                })
                .collect()
        };

        SetupClasses {
            y: grid(y_fixed),
            lambda: grid(lambda_fixed),
            unmet: VarClass::Relaxed,
        }
    }

    /// Every setup decision pinned; used by the final passes that derive
    /// the continuous plan, with the unmet indicator back to integer.
    pub fn fixed_to(y_fixed: &[Vec<u8>], lambda_fixed: &[Vec<u8>]) -> SetupClasses {
        let pin = |fixed: &[Vec<u8>]| {
            fixed
                .iter()
                .map(|row| row.iter().map(|&v| VarClass::Fixed(v as f64)).collect())
                .collect()
        };

        SetupClasses {
            y: pin(y_fixed),
            lambda: pin(lambda_fixed),
            unmet: VarClass::Integer,
        }
    }

    /// The FO neighborhood NSP(a): integer inside the buffered window,
    /// pinned to the incumbent outside it.
    pub fn neighborhood(
        window: Range<usize>,
        y_incumbent: &[Vec<u8>],
        lambda_incumbent: &[Vec<u8>],
    ) -> SetupClasses {
        let grid = |incumbent: &[Vec<u8>]| {
            incumbent
                .iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(t, &v)| {
                            if window.contains(&t) {
                                VarClass::Integer
                            } else {
                                VarClass::Fixed(v as f64)
                            }
                        })
                        .collect()
                })
                .collect()
        };

        SetupClasses {
            y: grid(y_incumbent),
            lambda: grid(lambda_incumbent),
            unmet: VarClass::Integer,
        }
    }

    /// Pin every carryover to zero (RR Stage 1 removes the variable).
    pub fn without_carryover(mut self) -> SetupClasses {
        for row in &mut self.lambda {
            row.fill(VarClass::Fixed(0.0));
        }
        self
    }
}

/// Optional objective / constraint augmentations of the canonical model.
#[derive(Clone, Debug)]
pub struct Augment {
    /// kappa: scales C in the machine-capacity and family-activation rows.
    pub capacity_factor: f64,
    /// alpha: reward for keeping a family's setup alive in adjacent
    /// periods; zero leaves the z variables out entirely.
    pub consecutive_setup_bonus: f64,
}

impl Default for Augment {
    fn default() -> Self {
        Augment {
            capacity_factor: 1.0,
            consecutive_setup_bonus: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_profile_partitions_the_horizon() {
        let y_fixed = vec![vec![1u8, 0, 0, 0, 0]];
        let l_fixed = vec![vec![0u8; 5]];
        let classes = SetupClasses::rolling(1, 2, &y_fixed, &l_fixed);

        assert_eq!(classes.y[0][0], VarClass::Fixed(1.0));
        assert_eq!(classes.y[0][1], VarClass::Integer);
        assert_eq!(classes.y[0][2], VarClass::Integer);
        assert_eq!(classes.y[0][3], VarClass::Relaxed);
        assert_eq!(classes.unmet, VarClass::Relaxed);
    }

    #[test]
    fn neighborhood_pins_outside_the_window() {
        let inc = vec![vec![1u8, 1, 0, 0]];
        let classes = SetupClasses::neighborhood(1..3, &inc, &inc);

        assert_eq!(classes.y[0][0], VarClass::Fixed(1.0));
        assert_eq!(classes.y[0][1], VarClass::Integer);
        assert_eq!(classes.y[0][2], VarClass::Integer);
        assert_eq!(classes.y[0][3], VarClass::Fixed(0.0));
        assert_eq!(classes.unmet, VarClass::Integer);
    }

    #[test]
    fn without_carryover_pins_lambda_to_zero() {
        let classes = SetupClasses::all_integer(2, 3).without_carryover();
        assert!(classes
            .lambda
            .iter()
            .flatten()
            .all(|c| *c == VarClass::Fixed(0.0)));
        assert!(classes.y.iter().flatten().all(|c| *c == VarClass::Integer));
    }
}

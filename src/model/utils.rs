use std::ops::Range;

use super::{Assignment, Expr, Model, Var, VarType};

/// Create tensors of variables from dimension tuples.
pub trait AddVars {
    type Out;

    fn vars(
        &self,
        model: &mut Model,
        base_name: &str,
        vtype: VarType,
        bounds: &Range<f64>,
    ) -> Self::Out;

    /// Binary variables
    fn binary(&self, model: &mut Model, base_name: &str) -> Self::Out {
        self.vars(model, base_name, VarType::Integer, &(0.0..1.0))
    }

    /// A continuous non-negative variable
    fn cont(&self, model: &mut Model, base_name: &str) -> Self::Out {
        self.vars(model, base_name, VarType::Continuous, &(0.0..f64::INFINITY))
    }

    /// A continuous variable confined to the unit interval (a relaxed binary)
    fn unit(&self, model: &mut Model, base_name: &str) -> Self::Out {
        self.vars(model, base_name, VarType::Continuous, &(0.0..1.0))
    }
}

impl AddVars for usize {
    type Out = Vec<Var>;

    fn vars(
        &self,
        model: &mut Model,
        base_name: &str,
        vtype: VarType,
        bounds: &Range<f64>,
    ) -> Self::Out {
        let mut vec = Vec::with_capacity(*self);
        for i in 0..*self {
            vec.push(model.add_var(
                format!("{}_{}", base_name, i),
                vtype,
                bounds.start,
                bounds.end,
            ));
        }

        vec
    }
}

impl AddVars for (usize, usize) {
    type Out = Vec<<usize as AddVars>::Out>;

    fn vars(
        &self,
        model: &mut Model,
        base_name: &str,
        vtype: VarType,
        bounds: &Range<f64>,
    ) -> Self::Out {
        let mut out = Vec::with_capacity(self.0);
        for i in 0..self.0 {
            out.push(
                self.1
                    .vars(model, &format!("{}_{}", base_name, i), vtype, bounds),
            )
        }

        out
    }
}

/// Sum an iterator of expressions or variables into one linear expression.
pub trait LpSum {
    fn lp_sum(self) -> Expr;
}

impl<I, E> LpSum for I
where
    I: Iterator<Item = E>,
    E: Into<Expr>,
{
    fn lp_sum(self) -> Expr {
        self.fold(Expr::default(), |acc, e| acc + e.into())
    }
}

/// Trait that converts variable tensors to their solved values.
pub trait ConvertVars {
    type Out;
    fn convert(&self, solution: &Assignment) -> Self::Out;
}

impl ConvertVars for Var {
    type Out = f64;

    fn convert(&self, solution: &Assignment) -> Self::Out {
        solution.value(*self)
    }
}

impl<T: ConvertVars> ConvertVars for Vec<T> {
    type Out = Vec<T::Out>;

    fn convert(&self, solution: &Assignment) -> Self::Out {
        self.iter().map(|e| e.convert(solution)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_creation_and_readback() {
        let mut model = Model::new("t");
        let x: Vec<Vec<Var>> = (2, 3).cont(&mut model, "x");
        assert_eq!(model.num_vars(), 6);
        assert_eq!(model.vars()[4].name, "x_1_1");

        let solution = Assignment::new((0..6).map(|i| i as f64).collect());
        let values = x.convert(&solution);
        assert_eq!(values[1][2], 5.0);
    }

    #[test]
    fn lp_sum_over_vars_and_products() {
        let mut model = Model::new("t");
        let x: Vec<Var> = 3.cont(&mut model, "x");

        let plain = x.iter().copied().lp_sum();
        assert_eq!(plain.terms().len(), 3);

        let weighted = x.iter().map(|v| 2.0 * *v).lp_sum();
        let solution = Assignment::new(vec![1.0, 2.0, 3.0]);
        assert!((weighted.eval(&solution) - 12.0).abs() < 1e-12);
    }
}

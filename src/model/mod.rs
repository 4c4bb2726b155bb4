pub mod carryover;
pub mod lot_sizing;
pub mod profile;
pub mod utils;

/// Handle to a decision variable inside a [`Model`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Var(usize);

impl Var {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VarType {
    Continuous,
    Integer,
}

#[derive(Clone, Debug)]
pub struct VarDef {
    pub name: String,
    pub vtype: VarType,
    pub lb: f64,
    pub ub: f64,
}

/// A linear expression: sum of coefficient * variable plus a constant.
#[derive(Clone, Debug, Default)]
pub struct Expr {
    terms: Vec<(Var, f64)>,
    constant: f64,
}

impl Expr {
    pub fn terms(&self) -> &[(Var, f64)] {
        &self.terms
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn eval(&self, values: &Assignment) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|(v, c)| c * values.value(*v))
                .sum::<f64>()
    }

    pub fn leq(self, rhs: f64) -> Constr {
        Constr {
            expr: self,
            cmp: Cmp::Le,
            rhs,
        }
    }

    pub fn geq(self, rhs: f64) -> Constr {
        Constr {
            expr: self,
            cmp: Cmp::Ge,
            rhs,
        }
    }

    pub fn eq(self, rhs: f64) -> Constr {
        Constr {
            expr: self,
            cmp: Cmp::Eq,
            rhs,
        }
    }
}

impl From<Var> for Expr {
    fn from(v: Var) -> Self {
        Expr {
            terms: vec![(v, 1.0)],
            constant: 0.0,
        }
    }
}

impl From<f64> for Expr {
    fn from(c: f64) -> Self {
        Expr {
            terms: Vec::new(),
            constant: c,
        }
    }
}

impl std::ops::Add<Expr> for Expr {
    type Output = Expr;
    fn add(mut self, rhs: Expr) -> Expr {
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
        self
    }
}

impl std::ops::Add<Var> for Expr {
    type Output = Expr;
    fn add(mut self, rhs: Var) -> Expr {
        self.terms.push((rhs, 1.0));
        self
    }
}

impl std::ops::Add<f64> for Expr {
    type Output = Expr;
    fn add(mut self, rhs: f64) -> Expr {
        self.constant += rhs;
        self
    }
}

impl std::ops::Sub<Expr> for Expr {
    type Output = Expr;
    fn sub(mut self, rhs: Expr) -> Expr {
        self.terms
            .extend(rhs.terms.into_iter().map(|(v, c)| (v, -c)));
        self.constant -= rhs.constant;
        self
    }
}

impl std::ops::Sub<Var> for Expr {
    type Output = Expr;
    fn sub(mut self, rhs: Var) -> Expr {
        self.terms.push((rhs, -1.0));
        self
    }
}

impl std::ops::Sub<f64> for Expr {
    type Output = Expr;
    fn sub(mut self, rhs: f64) -> Expr {
        self.constant -= rhs;
        self
    }
}

impl std::ops::Mul<f64> for Expr {
    type Output = Expr;
    fn mul(mut self, rhs: f64) -> Expr {
        for (_, c) in &mut self.terms {
            *c *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

impl std::ops::Add<Var> for Var {
    type Output = Expr;
    fn add(self, rhs: Var) -> Expr {
        Expr::from(self) + rhs
    }
}

impl std::ops::Sub<Var> for Var {
    type Output = Expr;
    fn sub(self, rhs: Var) -> Expr {
        Expr::from(self) - rhs
    }
}

impl std::ops::Mul<Var> for f64 {
    type Output = Expr;
    fn mul(self, rhs: Var) -> Expr {
        Expr {
            terms: vec![(rhs, self)],
            constant: 0.0,
        }
    }
}

impl std::ops::Mul<Expr> for f64 {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        rhs * self
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        self * -1.0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cmp {
    Le,
    Ge,
    Eq,
}

#[derive(Clone, Debug)]
pub struct Constr {
    pub expr: Expr,
    pub cmp: Cmp,
    pub rhs: f64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sense {
    Minimize,
    Maximize,
}

/// A solver-brand-free MILP. Built once per sub-problem by the builders,
/// handed to the [`crate::oracle::Oracle`] for solving.
#[derive(Clone, Debug)]
pub struct Model {
    name: String,
    vars: Vec<VarDef>,
    constrs: Vec<(String, Constr)>,
    objective: Expr,
    sense: Sense,
}

impl Model {
    pub fn new(name: &str) -> Model {
        Model {
            name: name.to_string(),
            vars: Vec::new(),
            constrs: Vec::new(),
            objective: Expr::default(),
            sense: Sense::Minimize,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_var(&mut self, name: String, vtype: VarType, lb: f64, ub: f64) -> Var {
        self.vars.push(VarDef {
            name,
            vtype,
            lb,
            ub,
        });
        Var(self.vars.len() - 1)
    }

    pub fn add_constr(&mut self, name: String, constr: Constr) {
        self.constrs.push((name, constr));
    }

    pub fn set_objective(&mut self, expr: Expr, sense: Sense) {
        self.objective = expr;
        self.sense = sense;
    }

    pub fn vars(&self) -> &[VarDef] {
        &self.vars
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn constrs(&self) -> &[(String, Constr)] {
        &self.constrs
    }

    pub fn objective(&self) -> &Expr {
        &self.objective
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }
}

/// Dense variable-value lookup returned by an oracle.
#[derive(Clone, Debug)]
pub struct Assignment {
    values: Vec<f64>,
}

impl Assignment {
    pub fn new(values: Vec<f64>) -> Assignment {
        Assignment { values }
    }

    pub fn zeros(n: usize) -> Assignment {
        Assignment {
            values: vec![0.0; n],
        }
    }

    pub fn value(&self, v: Var) -> f64 {
        self.values[v.0]
    }

    /// Binary read-back through the 0.5 threshold.
    pub fn is_one(&self, v: Var) -> bool {
        self.values[v.0] > 0.5
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

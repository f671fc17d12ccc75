use crate::diagnostics::Span;
use crate::types::Signature;

pub const ROOT_UNIT: &str = "base";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub source_name: String,
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            statements: Vec::new(),
        }
    }

    /// Unit declarations in source order.
    pub fn units(&self) -> impl Iterator<Item = &UnitDecl> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Unit(u) => Some(u),
            _ => None,
        })
    }

    /// Statements paired with the name of the unit they belong to. Statements before the
    /// first `#program` belong to the root unit.
    pub fn statements_by_unit(&self) -> Vec<(&str, &Statement)> {
        let mut out = Vec::new();
        let mut current = ROOT_UNIT;
        for statement in &self.statements {
            match statement {
                Statement::Unit(u) => current = &u.name,
                other => out.push((current, other)),
            }
        }
        out
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new("<string>")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Unit(UnitDecl),
    Rule(Rule),
    External(External),
    Show(ShowDecl),
    Defined(Signature, Span),
}

/// `#program name(p1, p2(1)).`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDecl {
    pub name: String,
    pub params: Vec<UnitParam>,
    pub span: Span,
}

impl UnitDecl {
    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }
}

/// A unit parameter. For ordinary units only `name` matters; test units read their
/// parameters as dependency references, where `args` are the bound values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitParam {
    pub name: String,
    pub args: Vec<Term>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub head: Head,
    pub body: Vec<BodyLiteral>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    Atom(Term),
    Disjunction(Vec<Term>),
    Choice(Vec<Term>),
    Falsity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyLiteral {
    Literal { negated: bool, atom: Term },
    Comparison { lhs: Term, op: CmpOp, rhs: Term },
    Count { elements: Vec<Term>, op: CmpOp, bound: Term },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn holds<T: Ord>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct External {
    pub atom: Term,
    pub span: Span,
}

/// `#show.` hides everything, `#show p/1.` selects signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowDecl {
    pub signature: Option<Signature>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Number(i64),
    String(String),
    Var(String),
    Function { name: String, args: Vec<Term> },
    Call { name: String, args: Vec<Term> },
    Interval(Box<Term>, Box<Term>),
    Pool(Vec<Term>),
}

impl Term {
    pub fn constant(name: impl Into<String>) -> Self {
        Term::Function {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Term::Number(_) | Term::String(_) => true,
            Term::Var(_) => false,
            Term::Function { args, .. } | Term::Call { args, .. } | Term::Pool(args) => {
                args.iter().all(Term::is_ground)
            }
            Term::Interval(lo, hi) => lo.is_ground() && hi.is_ground(),
        }
    }

    pub fn collect_vars(&self, out: &mut Vec<String>) {
        match self {
            Term::Var(v) => {
                if v != "_" && !out.contains(v) {
                    out.push(v.clone());
                }
            }
            Term::Number(_) | Term::String(_) => {}
            Term::Function { args, .. } | Term::Call { args, .. } | Term::Pool(args) => {
                for a in args {
                    a.collect_vars(out);
                }
            }
            Term::Interval(lo, hi) => {
                lo.collect_vars(out);
                hi.collect_vars(out);
            }
        }
    }
}

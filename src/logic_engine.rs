//! Reference grounder and solver.
//!
//! Small and exhaustive: grounding instantiates rules by fixpoint over the atoms that may
//! become true, solving enumerates every interpretation of the undetermined atoms and
//! keeps the stable ones. Good enough for test programs; not meant for real workloads.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, trace};

use crate::ast::{BodyLiteral, CmpOp, Head, Program, ROOT_UNIT, Rule, Statement, Term};
use crate::diagnostics::Span;
use crate::error::TestError;
use crate::solver::{
    AtomId, Context, Control, GroundHandler, Lit, Model, Observer, Part, SolveSummary, Solver,
};
use crate::types::{Signature, Symbol};

pub const DEFAULT_MAX_UNDETERMINED: usize = 22;
/// Candidate models are enumerated as `u64` bit masks.
pub const MAX_SEARCH_ATOMS: usize = 63;
const MAX_GROUND_ATOMS: usize = 100_000;
const MAX_INTERVAL: i64 = 10_000;

type Binding = BTreeMap<String, Symbol>;

#[derive(Debug, Clone, Copy)]
pub struct ReferenceSolver {
    max_undetermined: usize,
}

impl ReferenceSolver {
    pub fn new() -> Self {
        Self {
            max_undetermined: DEFAULT_MAX_UNDETERMINED,
        }
    }

    /// Limits are capped at [`MAX_SEARCH_ATOMS`].
    pub fn with_max_undetermined(mut self, max: usize) -> Self {
        self.max_undetermined = max.min(MAX_SEARCH_ATOMS);
        self
    }
}

impl Default for ReferenceSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for ReferenceSolver {
    fn load(&self, program: &Program) -> Result<Box<dyn Control>, TestError> {
        Ok(Box::new(ReferenceControl::new(
            program.clone(),
            self.max_undetermined,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Grounded,
    Spent,
}

pub struct ReferenceControl {
    program: Program,
    max_undetermined: usize,
    state: State,
    ground: GroundProgram,
}

impl ReferenceControl {
    pub fn new(program: Program, max_undetermined: usize) -> Self {
        Self {
            program,
            max_undetermined: max_undetermined.min(MAX_SEARCH_ATOMS),
            state: State::Fresh,
            ground: GroundProgram::default(),
        }
    }
}

impl Control for ReferenceControl {
    fn ground(
        &mut self,
        parts: &[Part],
        handler: &mut dyn GroundHandler,
    ) -> Result<(), TestError> {
        match self.state {
            State::Spent => return Err(TestError::SpentControl),
            State::Grounded => {
                return Err(TestError::Ground {
                    message: "control is already grounded".to_string(),
                });
            }
            State::Fresh => {}
        }
        let selection = select_parts(&self.program, parts)?;
        let mut grounder = Grounder {
            handler,
            possible: BTreeSet::new(),
            memo: HashMap::new(),
        };
        let ground = grounder.run(selection)?;
        debug!(
            atoms = ground.symbols.len(),
            rules = ground.rules.len(),
            "grounded"
        );
        self.ground = ground;
        self.state = State::Grounded;
        Ok(())
    }

    fn solve(
        &mut self,
        on_model: &mut dyn FnMut(&dyn Model) -> bool,
    ) -> Result<SolveSummary, TestError> {
        if self.state == State::Spent {
            return Err(TestError::SpentControl);
        }
        self.state = State::Spent;
        let ground = &self.ground;
        let undetermined = ground.undetermined();
        if undetermined.len() > self.max_undetermined {
            return Err(TestError::Solve {
                message: format!(
                    "{} undetermined atoms exceed the limit of {} for exhaustive search",
                    undetermined.len(),
                    self.max_undetermined
                ),
            });
        }

        let mut found = 0u64;
        for mask in 0u64..(1u64 << undetermined.len()) {
            let mut candidate = ground.facts.clone();
            for (bit, id) in undetermined.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    candidate[*id as usize] = true;
                }
            }
            if !ground.is_model(&candidate) || !ground.is_stable(&candidate, &undetermined) {
                continue;
            }
            found += 1;
            let model = ground.model(found, &candidate);
            trace!(number = found, atoms = model.atoms.len(), "model");
            if !on_model(&model) {
                return Ok(SolveSummary {
                    models: found,
                    exhausted: false,
                });
            }
        }
        Ok(SolveSummary {
            models: found,
            exhausted: true,
        })
    }

    fn atoms(&self) -> Vec<Symbol> {
        self.ground.symbols.clone()
    }
}

/// Statements of the requested parts with parameters substituted and pools expanded.
#[derive(Debug, Default)]
struct Selection {
    rules: Vec<Rule>,
    externals: Vec<(Term, Span)>,
    show: Option<BTreeSet<Signature>>,
}

fn select_parts(program: &Program, parts: &[Part]) -> Result<Selection, TestError> {
    let mut params: HashMap<&str, Vec<String>> = HashMap::new();
    for decl in program.units() {
        params
            .entry(decl.name.as_str())
            .or_insert_with(|| decl.param_names());
    }

    let mut selection = Selection::default();
    let mut done: Vec<&Part> = Vec::new();
    for part in parts {
        if done.contains(&part) {
            continue;
        }
        done.push(part);
        let names: &[String] = if part.name == ROOT_UNIT {
            &[]
        } else {
            params
                .get(part.name.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[])
        };
        if names.len() != part.args.len() {
            return Err(TestError::Ground {
                message: format!(
                    "part {part} does not match the {} parameter(s) of #program {}",
                    names.len(),
                    part.name
                ),
            });
        }
        let subst: HashMap<&str, &Symbol> = names
            .iter()
            .map(String::as_str)
            .zip(part.args.iter())
            .collect();

        for (unit, statement) in program.statements_by_unit() {
            if unit != part.name {
                continue;
            }
            match statement {
                Statement::Rule(rule) => {
                    let rule = substitute_rule(rule, &subst);
                    selection.rules.extend(unpool_rule(&rule));
                }
                Statement::External(ext) => {
                    for atom in unpool(&substitute_atom(&ext.atom, &subst)) {
                        selection.externals.push((atom, ext.span.clone()));
                    }
                }
                Statement::Show(show) => {
                    let shown = selection.show.get_or_insert_with(BTreeSet::new);
                    if let Some(sig) = &show.signature {
                        shown.insert(sig.clone());
                    }
                }
                Statement::Defined(..) | Statement::Unit(_) => {}
            }
        }
    }
    Ok(selection)
}

fn symbol_to_term(symbol: &Symbol) -> Term {
    match symbol {
        Symbol::Number(n) => Term::Number(*n),
        Symbol::String(s) => Term::String(s.clone()),
        Symbol::Function { name, args } => Term::Function {
            name: name.clone(),
            args: args.iter().map(symbol_to_term).collect(),
        },
    }
}

fn substitute(term: &Term, subst: &HashMap<&str, &Symbol>) -> Term {
    match term {
        Term::Function { name, args } if args.is_empty() => match subst.get(name.as_str()) {
            Some(value) => symbol_to_term(value),
            None => term.clone(),
        },
        Term::Function { name, args } => Term::Function {
            name: name.clone(),
            args: args.iter().map(|a| substitute(a, subst)).collect(),
        },
        Term::Call { name, args } => Term::Call {
            name: name.clone(),
            args: args.iter().map(|a| substitute(a, subst)).collect(),
        },
        Term::Interval(lo, hi) => Term::Interval(
            Box::new(substitute(lo, subst)),
            Box::new(substitute(hi, subst)),
        ),
        Term::Pool(alts) => Term::Pool(alts.iter().map(|a| substitute(a, subst)).collect()),
        Term::Number(_) | Term::String(_) | Term::Var(_) => term.clone(),
    }
}

/// Like [`substitute`] but leaves the predicate name of an atom alone.
fn substitute_atom(atom: &Term, subst: &HashMap<&str, &Symbol>) -> Term {
    match atom {
        Term::Function { name, args } => Term::Function {
            name: name.clone(),
            args: args.iter().map(|a| substitute(a, subst)).collect(),
        },
        Term::Pool(alts) => Term::Pool(alts.iter().map(|a| substitute_atom(a, subst)).collect()),
        other => substitute(other, subst),
    }
}

fn substitute_rule(rule: &Rule, subst: &HashMap<&str, &Symbol>) -> Rule {
    if subst.is_empty() {
        return rule.clone();
    }
    let head = match &rule.head {
        Head::Atom(t) => Head::Atom(substitute_atom(t, subst)),
        Head::Disjunction(ts) => {
            Head::Disjunction(ts.iter().map(|t| substitute_atom(t, subst)).collect())
        }
        Head::Choice(ts) => Head::Choice(ts.iter().map(|t| substitute_atom(t, subst)).collect()),
        Head::Falsity => Head::Falsity,
    };
    let body = rule
        .body
        .iter()
        .map(|lit| match lit {
            BodyLiteral::Literal { negated, atom } => BodyLiteral::Literal {
                negated: *negated,
                atom: substitute_atom(atom, subst),
            },
            BodyLiteral::Comparison { lhs, op, rhs } => BodyLiteral::Comparison {
                lhs: substitute(lhs, subst),
                op: *op,
                rhs: substitute(rhs, subst),
            },
            BodyLiteral::Count {
                elements,
                op,
                bound,
            } => BodyLiteral::Count {
                elements: elements.iter().map(|e| substitute_atom(e, subst)).collect(),
                op: *op,
                bound: substitute(bound, subst),
            },
        })
        .collect();
    Rule {
        head,
        body,
        span: rule.span.clone(),
    }
}

fn cartesian<T: Clone>(lists: &[Vec<T>]) -> Vec<Vec<T>> {
    let mut out: Vec<Vec<T>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(out.len() * list.len());
        for prefix in &out {
            for item in list {
                let mut row = prefix.clone();
                row.push(item.clone());
                next.push(row);
            }
        }
        out = next;
    }
    out
}

/// Expands `a(1;2)` into its alternatives, at any depth.
fn unpool(term: &Term) -> Vec<Term> {
    match term {
        Term::Pool(alts) => alts.iter().flat_map(unpool).collect(),
        Term::Function { name, args } => {
            let lists: Vec<Vec<Term>> = args.iter().map(unpool).collect();
            cartesian(&lists)
                .into_iter()
                .map(|args| Term::Function {
                    name: name.clone(),
                    args,
                })
                .collect()
        }
        Term::Call { name, args } => {
            let lists: Vec<Vec<Term>> = args.iter().map(unpool).collect();
            cartesian(&lists)
                .into_iter()
                .map(|args| Term::Call {
                    name: name.clone(),
                    args,
                })
                .collect()
        }
        Term::Interval(lo, hi) => {
            let mut out = Vec::new();
            for lo in unpool(lo) {
                for hi in unpool(hi) {
                    out.push(Term::Interval(Box::new(lo.clone()), Box::new(hi)));
                }
            }
            out
        }
        Term::Number(_) | Term::String(_) | Term::Var(_) => vec![term.clone()],
    }
}

/// Pools in a normal head or in a body literal split the rule; pools inside disjunctive,
/// choice and count elements add elements.
fn unpool_rule(rule: &Rule) -> Vec<Rule> {
    let heads: Vec<Head> = match &rule.head {
        Head::Atom(t) => unpool(t).into_iter().map(Head::Atom).collect(),
        Head::Disjunction(ts) => vec![Head::Disjunction(ts.iter().flat_map(unpool).collect())],
        Head::Choice(ts) => vec![Head::Choice(ts.iter().flat_map(unpool).collect())],
        Head::Falsity => vec![Head::Falsity],
    };
    let alternatives: Vec<Vec<BodyLiteral>> = rule
        .body
        .iter()
        .map(|lit| match lit {
            BodyLiteral::Literal { negated, atom } => unpool(atom)
                .into_iter()
                .map(|atom| BodyLiteral::Literal {
                    negated: *negated,
                    atom,
                })
                .collect(),
            BodyLiteral::Comparison { lhs, op, rhs } => {
                let mut out = Vec::new();
                for l in unpool(lhs) {
                    for r in unpool(rhs) {
                        out.push(BodyLiteral::Comparison {
                            lhs: l.clone(),
                            op: *op,
                            rhs: r,
                        });
                    }
                }
                out
            }
            BodyLiteral::Count {
                elements,
                op,
                bound,
            } => unpool(bound)
                .into_iter()
                .map(|bound| BodyLiteral::Count {
                    elements: elements.iter().flat_map(unpool).collect(),
                    op: *op,
                    bound,
                })
                .collect(),
        })
        .collect();

    let mut out = Vec::new();
    for head in heads {
        for body in cartesian(&alternatives) {
            out.push(Rule {
                head: head.clone(),
                body,
                span: rule.span.clone(),
            });
        }
    }
    out
}

fn ground_error(span: &Span, message: impl std::fmt::Display) -> TestError {
    TestError::Ground {
        message: format!(
            "{}:{}:{}: {message}",
            span.file_name(),
            span.line,
            span.column
        ),
    }
}

fn contains_call(term: &Term) -> bool {
    match term {
        Term::Call { .. } => true,
        Term::Function { args, .. } | Term::Pool(args) => args.iter().any(contains_call),
        Term::Interval(lo, hi) => contains_call(lo) || contains_call(hi),
        Term::Number(_) | Term::String(_) | Term::Var(_) => false,
    }
}

fn vars_of(term: &Term) -> Vec<String> {
    let mut out = Vec::new();
    term.collect_vars(&mut out);
    out
}

fn bound_number(term: &Term, binding: &Binding) -> Option<i64> {
    match term {
        Term::Number(n) => Some(*n),
        Term::Var(v) => binding.get(v).and_then(Symbol::number),
        _ => None,
    }
}

fn match_term(pattern: &Term, value: &Symbol, binding: &Binding) -> Option<Binding> {
    let mut out = binding.clone();
    if match_into(pattern, value, &mut out) {
        Some(out)
    } else {
        None
    }
}

fn match_into(pattern: &Term, value: &Symbol, binding: &mut Binding) -> bool {
    match (pattern, value) {
        (Term::Var(v), _) if v == "_" => true,
        (Term::Var(v), _) => match binding.get(v) {
            Some(bound) => bound == value,
            None => {
                binding.insert(v.clone(), value.clone());
                true
            }
        },
        (Term::Number(n), Symbol::Number(m)) => n == m,
        (Term::String(s), Symbol::String(t)) => s == t,
        (
            Term::Function { name, args },
            Symbol::Function {
                name: vname,
                args: vargs,
            },
        ) => {
            name == vname
                && args.len() == vargs.len()
                && args
                    .iter()
                    .zip(vargs)
                    .all(|(p, v)| match_into(p, v, binding))
        }
        (Term::Interval(lo, hi), Symbol::Number(n)) => {
            match (bound_number(lo, binding), bound_number(hi, binding)) {
                (Some(lo), Some(hi)) => lo <= *n && *n <= hi,
                _ => false,
            }
        }
        (Term::Pool(alts), _) => {
            for alt in alts {
                let mut trial = binding.clone();
                if match_into(alt, value, &mut trial) {
                    *binding = trial;
                    return true;
                }
            }
            false
        }
        _ => false,
    }
}

fn is_atom(symbol: &Symbol) -> bool {
    matches!(symbol, Symbol::Function { name, .. } if !name.is_empty())
}

#[derive(Debug, Clone, Default)]
struct Match {
    binding: Binding,
    positives: Vec<Symbol>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum HeadKind {
    Normal,
    Disjunction,
    Choice,
    Falsity,
}

#[derive(Debug)]
struct PendingCount {
    elements: Vec<Term>,
    binding: Binding,
    op: CmpOp,
    bound: Symbol,
}

#[derive(Debug)]
struct GroundRule {
    kind: HeadKind,
    head: Vec<Symbol>,
    positives: Vec<Symbol>,
    negatives: Vec<Symbol>,
    counts: Vec<PendingCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CountLit {
    atoms: Vec<AtomId>,
    op: CmpOp,
    bound: Symbol,
}

impl CountLit {
    fn holds(&self, interpretation: &[bool]) -> bool {
        let count = self
            .atoms
            .iter()
            .filter(|id| interpretation[**id as usize])
            .count();
        self.op
            .holds(&Symbol::Number(count as i64), &self.bound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Instance {
    kind: HeadKind,
    head: Vec<AtomId>,
    pos: Vec<AtomId>,
    neg: Vec<AtomId>,
    counts: Vec<CountLit>,
}

struct Grounder<'a> {
    handler: &'a mut dyn GroundHandler,
    possible: BTreeSet<Symbol>,
    memo: HashMap<(usize, String, Vec<Symbol>), Symbol>,
}

impl Grounder<'_> {
    fn run(&mut self, selection: Selection) -> Result<GroundProgram, TestError> {
        let mut externals = BTreeSet::new();
        for (atom, span) in &selection.externals {
            let values = self
                .eval(usize::MAX, atom, &Binding::new(), false)
                .map_err(|e| ground_error(span, e))?;
            for value in values {
                if !is_atom(&value) {
                    return Err(ground_error(span, format!("{value} is not an atom")));
                }
                externals.insert(value);
            }
        }
        self.possible.extend(externals.iter().cloned());

        let ground_rules = self.instantiate(&selection.rules)?;
        Ok(self.finish(ground_rules, selection.show))
    }

    fn instantiate(&mut self, rules: &[Rule]) -> Result<Vec<GroundRule>, TestError> {
        let mut seen: HashSet<(usize, Vec<(String, Symbol)>, Vec<Symbol>)> = HashSet::new();
        let mut out = Vec::new();
        loop {
            let mut derived = Vec::new();
            for (idx, rule) in rules.iter().enumerate() {
                for m in self.matches(idx, rule)? {
                    let key = (
                        idx,
                        m.binding
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                        m.positives.clone(),
                    );
                    if !seen.insert(key) {
                        continue;
                    }
                    let ground = self.instance(idx, rule, &m)?;
                    derived.extend(ground.head.iter().cloned());
                    out.push(ground);
                }
            }
            let before = self.possible.len();
            self.possible.extend(derived);
            if self.possible.len() > MAX_GROUND_ATOMS {
                return Err(TestError::Ground {
                    message: format!("grounding exceeds {MAX_GROUND_ATOMS} atoms"),
                });
            }
            if self.possible.len() == before {
                return Ok(out);
            }
        }
    }

    fn matches(&mut self, idx: usize, rule: &Rule) -> Result<Vec<Match>, TestError> {
        let mut pending: Vec<(&Term, CmpOp, &Term)> = rule
            .body
            .iter()
            .filter_map(|lit| match lit {
                BodyLiteral::Comparison { lhs, op, rhs } => Some((lhs, *op, rhs)),
                _ => None,
            })
            .collect();
        let mut bound: BTreeSet<String> = BTreeSet::new();
        let mut current = vec![Match::default()];
        current = self.apply_comparisons(idx, rule, &mut pending, &mut bound, current)?;

        for lit in &rule.body {
            let BodyLiteral::Literal {
                negated: false,
                atom,
            } = lit
            else {
                continue;
            };
            if contains_call(atom) {
                return Err(ground_error(
                    &rule.span,
                    "external calls are not supported in positive body literals",
                ));
            }
            let mut next = Vec::new();
            for m in &current {
                for candidate in &self.possible {
                    if let Some(binding) = match_term(atom, candidate, &m.binding) {
                        let mut positives = m.positives.clone();
                        positives.push(candidate.clone());
                        next.push(Match {
                            binding,
                            positives,
                        });
                    }
                }
            }
            bound.extend(vars_of(atom));
            if next.is_empty() {
                return Ok(next);
            }
            current = self.apply_comparisons(idx, rule, &mut pending, &mut bound, next)?;
        }

        if let Some((lhs, _, rhs)) = pending.first() {
            let mut unbound: Vec<String> = vars_of(lhs);
            unbound.extend(vars_of(rhs));
            unbound.retain(|v| !bound.contains(v));
            return Err(ground_error(
                &rule.span,
                format!("unsafe variables in comparison: {}", unbound.join(", ")),
            ));
        }
        Ok(current)
    }

    /// Filters by every comparison whose variables are bound and binds `X = expr` when
    /// `expr` can be evaluated. Repeats until nothing changes.
    fn apply_comparisons(
        &mut self,
        idx: usize,
        rule: &Rule,
        pending: &mut Vec<(&Term, CmpOp, &Term)>,
        bound: &mut BTreeSet<String>,
        mut current: Vec<Match>,
    ) -> Result<Vec<Match>, TestError> {
        loop {
            let mut progressed = false;
            let mut i = 0;
            while i < pending.len() {
                let (lhs, op, rhs) = pending[i];
                let lhs_ready = vars_of(lhs).iter().all(|v| bound.contains(v));
                let rhs_ready = vars_of(rhs).iter().all(|v| bound.contains(v));
                let assignment = match (lhs, rhs) {
                    (Term::Var(v), expr) if op == CmpOp::Eq && !lhs_ready && rhs_ready => {
                        Some((v, expr))
                    }
                    (expr, Term::Var(v)) if op == CmpOp::Eq && !rhs_ready && lhs_ready => {
                        Some((v, expr))
                    }
                    _ => None,
                };

                if lhs_ready && rhs_ready {
                    let mut kept = Vec::new();
                    for m in current {
                        let left = self
                            .eval(idx, lhs, &m.binding, true)
                            .map_err(|e| ground_error(&rule.span, e))?;
                        let right = self
                            .eval(idx, rhs, &m.binding, true)
                            .map_err(|e| ground_error(&rule.span, e))?;
                        if left.iter().any(|l| right.iter().any(|r| op.holds(l, r))) {
                            kept.push(m);
                        }
                    }
                    current = kept;
                } else if let Some((var, expr)) = assignment {
                    if var == "_" {
                        i += 1;
                        continue;
                    }
                    let mut next = Vec::new();
                    for m in current {
                        let values = self
                            .eval(idx, expr, &m.binding, true)
                            .map_err(|e| ground_error(&rule.span, e))?;
                        for value in values {
                            let mut binding = m.binding.clone();
                            binding.insert(var.clone(), value);
                            next.push(Match {
                                binding,
                                positives: m.positives.clone(),
                            });
                        }
                    }
                    current = next;
                    bound.insert(var.clone());
                } else {
                    i += 1;
                    continue;
                }
                pending.remove(i);
                progressed = true;
            }
            if !progressed {
                return Ok(current);
            }
        }
    }

    fn instance(&mut self, idx: usize, rule: &Rule, m: &Match) -> Result<GroundRule, TestError> {
        let (mut kind, elements): (HeadKind, &[Term]) = match &rule.head {
            Head::Atom(t) => (HeadKind::Normal, std::slice::from_ref(t)),
            Head::Disjunction(ts) => (HeadKind::Disjunction, ts.as_slice()),
            Head::Choice(ts) => (HeadKind::Choice, ts.as_slice()),
            Head::Falsity => (HeadKind::Falsity, &[][..]),
        };
        let mut head = Vec::new();
        for element in elements {
            let values = self
                .eval(idx, element, &m.binding, false)
                .map_err(|e| ground_error(&rule.span, e))?;
            for value in values {
                if !is_atom(&value) {
                    return Err(ground_error(&rule.span, format!("{value} is not an atom")));
                }
                if !head.contains(&value) {
                    head.push(value);
                }
            }
        }
        if kind == HeadKind::Disjunction && head.len() == 1 {
            kind = HeadKind::Normal;
        }

        let mut negatives = Vec::new();
        let mut counts = Vec::new();
        for lit in &rule.body {
            match lit {
                BodyLiteral::Literal {
                    negated: true,
                    atom,
                } => {
                    let values = self
                        .eval(idx, atom, &m.binding, false)
                        .map_err(|e| ground_error(&rule.span, e))?;
                    negatives.extend(values);
                }
                BodyLiteral::Count {
                    elements,
                    op,
                    bound,
                } => {
                    let values = self
                        .eval(idx, bound, &m.binding, true)
                        .map_err(|e| ground_error(&rule.span, e))?;
                    let [bound] = values.as_slice() else {
                        return Err(ground_error(
                            &rule.span,
                            "count bound must be a single value",
                        ));
                    };
                    counts.push(PendingCount {
                        elements: elements.clone(),
                        binding: m.binding.clone(),
                        op: *op,
                        bound: bound.clone(),
                    });
                }
                BodyLiteral::Literal { negated: false, .. } | BodyLiteral::Comparison { .. } => {}
            }
        }
        Ok(GroundRule {
            kind,
            head,
            positives: m.positives.clone(),
            negatives,
            counts,
        })
    }

    /// Evaluates a term under `binding`. Intervals and pools make it set valued. Calls in
    /// rule bodies are memoized per rule so repeated fixpoint rounds do not repeat them.
    fn eval(
        &mut self,
        rule: usize,
        term: &Term,
        binding: &Binding,
        memoize: bool,
    ) -> Result<Vec<Symbol>, String> {
        match term {
            Term::Number(n) => Ok(vec![Symbol::Number(*n)]),
            Term::String(s) => Ok(vec![Symbol::String(s.clone())]),
            Term::Var(v) => binding
                .get(v)
                .map(|value| vec![value.clone()])
                .ok_or_else(|| format!("unsafe variable {v}")),
            Term::Function { name, args } => {
                let lists = self.eval_args(rule, args, binding, memoize)?;
                Ok(cartesian(&lists)
                    .into_iter()
                    .map(|args| Symbol::function(name.clone(), args))
                    .collect())
            }
            Term::Call { name, args } => {
                let lists = self.eval_args(rule, args, binding, memoize)?;
                let mut out = Vec::new();
                for args in cartesian(&lists) {
                    out.push(self.call(rule, name, args, memoize)?);
                }
                Ok(out)
            }
            Term::Interval(lo, hi) => {
                let lo = self.eval_number(rule, lo, binding, memoize)?;
                let hi = self.eval_number(rule, hi, binding, memoize)?;
                if hi.saturating_sub(lo) > MAX_INTERVAL {
                    return Err(format!("interval {lo}..{hi} is too large"));
                }
                Ok((lo..=hi).map(Symbol::Number).collect())
            }
            Term::Pool(alts) => {
                let mut out = Vec::new();
                for alt in alts {
                    out.extend(self.eval(rule, alt, binding, memoize)?);
                }
                Ok(out)
            }
        }
    }

    fn eval_args(
        &mut self,
        rule: usize,
        args: &[Term],
        binding: &Binding,
        memoize: bool,
    ) -> Result<Vec<Vec<Symbol>>, String> {
        let mut lists = Vec::with_capacity(args.len());
        for arg in args {
            lists.push(self.eval(rule, arg, binding, memoize)?);
        }
        Ok(lists)
    }

    fn eval_number(
        &mut self,
        rule: usize,
        term: &Term,
        binding: &Binding,
        memoize: bool,
    ) -> Result<i64, String> {
        match self.eval(rule, term, binding, memoize)?.as_slice() {
            [Symbol::Number(n)] => Ok(*n),
            _ => Err("interval bounds must be integers".to_string()),
        }
    }

    fn call(
        &mut self,
        rule: usize,
        name: &str,
        args: Vec<Symbol>,
        memoize: bool,
    ) -> Result<Symbol, String> {
        let key = (rule, name.to_string(), args);
        if memoize {
            if let Some(value) = self.memo.get(&key) {
                return Ok(value.clone());
            }
        }
        let value = self
            .handler
            .call(name, &key.2)
            .map_err(|e| format!("error in @{name}: {e}"))?;
        if memoize {
            self.memo.insert(key, value.clone());
        }
        Ok(value)
    }

    fn finish(
        &mut self,
        ground_rules: Vec<GroundRule>,
        show: Option<BTreeSet<Signature>>,
    ) -> GroundProgram {
        let symbols: Vec<Symbol> = self.possible.iter().cloned().collect();
        let ids: HashMap<&Symbol, AtomId> = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s, i as AtomId + 1))
            .collect();
        let id = |s: &Symbol| ids[s];

        let mut instances = Vec::new();
        for rule in &ground_rules {
            let pos: Vec<AtomId> = rule.positives.iter().map(id).collect();
            let neg: Vec<AtomId> = rule
                .negatives
                .iter()
                .filter_map(|s| ids.get(s).copied())
                .collect();
            let counts: Vec<CountLit> = rule
                .counts
                .iter()
                .map(|count| {
                    let mut atoms = BTreeSet::new();
                    for element in &count.elements {
                        for candidate in &symbols {
                            if match_term(element, candidate, &count.binding).is_some() {
                                atoms.insert(id(candidate));
                            }
                        }
                    }
                    CountLit {
                        atoms: atoms.into_iter().collect(),
                        op: count.op,
                        bound: count.bound.clone(),
                    }
                })
                .collect();
            let head: Vec<AtomId> = rule.head.iter().map(id).collect();
            if rule.kind == HeadKind::Normal {
                for atom in head {
                    instances.push(Instance {
                        kind: HeadKind::Normal,
                        head: vec![atom],
                        pos: pos.clone(),
                        neg: neg.clone(),
                        counts: counts.clone(),
                    });
                }
            } else {
                instances.push(Instance {
                    kind: rule.kind,
                    head,
                    pos,
                    neg,
                    counts,
                });
            }
        }

        let mut facts = vec![false; symbols.len() + 1];
        let mut changed = true;
        while changed {
            changed = false;
            for inst in &instances {
                if inst.kind == HeadKind::Normal
                    && inst.neg.is_empty()
                    && inst.counts.is_empty()
                    && !facts[inst.head[0] as usize]
                    && inst.pos.iter().all(|p| facts[*p as usize])
                {
                    facts[inst.head[0] as usize] = true;
                    changed = true;
                }
            }
        }

        let mut seen = HashSet::new();
        let mut rules = Vec::new();
        for mut inst in instances {
            if inst.neg.iter().any(|n| facts[*n as usize]) {
                continue;
            }
            inst.pos.retain(|p| !facts[*p as usize]);
            inst.pos.sort_unstable();
            inst.pos.dedup();
            inst.neg.sort_unstable();
            inst.neg.dedup();
            if seen.insert(inst.clone()) {
                rules.push(inst);
            }
        }

        let mut aux: HashMap<&CountLit, AtomId> = HashMap::new();
        let mut next_aux = symbols.len() as AtomId + 1;
        for inst in &rules {
            let mut body: Vec<Lit> = inst.pos.iter().map(|p| Lit::from(*p)).collect();
            body.extend(inst.neg.iter().map(|n| -Lit::from(*n)));
            for count in &inst.counts {
                let aux_id = *aux.entry(count).or_insert_with(|| {
                    let assigned = next_aux;
                    next_aux += 1;
                    assigned
                });
                body.push(Lit::from(aux_id));
            }
            self.handler
                .rule(inst.kind == HeadKind::Choice, &inst.head, &body);
        }
        for (i, symbol) in symbols.iter().enumerate() {
            self.handler.output_atom(symbol, i as AtomId + 1);
        }

        GroundProgram {
            symbols,
            facts,
            rules,
            show,
        }
    }
}

/// Ground rules over atom ids `1..=symbols.len()`; interpretations are indexed by id.
#[derive(Debug)]
struct GroundProgram {
    symbols: Vec<Symbol>,
    facts: Vec<bool>,
    rules: Vec<Instance>,
    show: Option<BTreeSet<Signature>>,
}

impl Default for GroundProgram {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            facts: vec![false],
            rules: Vec::new(),
            show: None,
        }
    }
}

impl GroundProgram {
    fn undetermined(&self) -> Vec<AtomId> {
        let mut out: BTreeSet<AtomId> = BTreeSet::new();
        for inst in &self.rules {
            for atom in &inst.head {
                if !self.facts[*atom as usize] {
                    out.insert(*atom);
                }
            }
        }
        out.into_iter().collect()
    }

    fn body_holds(inst: &Instance, interpretation: &[bool]) -> bool {
        inst.pos.iter().all(|p| interpretation[*p as usize])
            && inst.neg.iter().all(|n| !interpretation[*n as usize])
            && inst.counts.iter().all(|c| c.holds(interpretation))
    }

    fn is_model(&self, interpretation: &[bool]) -> bool {
        self.rules.iter().all(|inst| {
            if !Self::body_holds(inst, interpretation) {
                return true;
            }
            match inst.kind {
                HeadKind::Normal | HeadKind::Disjunction => {
                    inst.head.iter().any(|h| interpretation[*h as usize])
                }
                HeadKind::Choice => true,
                HeadKind::Falsity => false,
            }
        })
    }

    /// Rules that survive the reduct with respect to `model`: negation and counts are
    /// fixed by the model.
    fn reduct<'a>(&'a self, model: &'a [bool]) -> impl Iterator<Item = &'a Instance> + 'a {
        self.rules.iter().filter(move |inst| {
            inst.kind != HeadKind::Falsity
                && inst.neg.iter().all(|n| !model[*n as usize])
                && inst.counts.iter().all(|c| c.holds(model))
        })
    }

    fn is_stable(&self, model: &[bool], undetermined: &[AtomId]) -> bool {
        if self.rules.iter().any(|r| r.kind == HeadKind::Disjunction) {
            return self.is_minimal(model, undetermined);
        }
        let mut least = vec![false; model.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for inst in self.reduct(model) {
                if !inst.pos.iter().all(|p| least[*p as usize]) {
                    continue;
                }
                for h in &inst.head {
                    let derivable = inst.kind == HeadKind::Normal || model[*h as usize];
                    if derivable && !least[*h as usize] {
                        least[*h as usize] = true;
                        changed = true;
                    }
                }
            }
        }
        least == model
    }

    /// No proper subset of the model satisfies the reduct.
    fn is_minimal(&self, model: &[bool], undetermined: &[AtomId]) -> bool {
        let chosen: Vec<AtomId> = undetermined
            .iter()
            .copied()
            .filter(|a| model[*a as usize])
            .collect();
        let full = 1u64 << chosen.len();
        for mask in 0..full - 1 {
            let mut subset = self.facts.clone();
            for (bit, atom) in chosen.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    subset[*atom as usize] = true;
                }
            }
            if self.satisfies_reduct(&subset, model) {
                return false;
            }
        }
        true
    }

    fn satisfies_reduct(&self, subset: &[bool], model: &[bool]) -> bool {
        self.reduct(model).all(|inst| {
            if !inst.pos.iter().all(|p| subset[*p as usize]) {
                return true;
            }
            match inst.kind {
                HeadKind::Normal | HeadKind::Disjunction => {
                    inst.head.iter().any(|h| subset[*h as usize])
                }
                HeadKind::Choice => inst
                    .head
                    .iter()
                    .all(|h| !model[*h as usize] || subset[*h as usize]),
                HeadKind::Falsity => true,
            }
        })
    }

    fn model(&self, number: u64, interpretation: &[bool]) -> ReferenceModel {
        let atoms: BTreeSet<Symbol> = self
            .symbols
            .iter()
            .enumerate()
            .filter(|(i, _)| interpretation[i + 1])
            .map(|(_, s)| s.clone())
            .collect();
        let shown = match &self.show {
            None => atoms.iter().cloned().collect(),
            Some(signatures) => atoms
                .iter()
                .filter(|a| a.signature().is_some_and(|s| signatures.contains(&s)))
                .cloned()
                .collect(),
        };
        ReferenceModel {
            number,
            atoms,
            shown,
        }
    }
}

#[derive(Debug)]
struct ReferenceModel {
    number: u64,
    atoms: BTreeSet<Symbol>,
    shown: Vec<Symbol>,
}

impl Model for ReferenceModel {
    fn number(&self) -> u64 {
        self.number
    }

    fn contains(&self, symbol: &Symbol) -> bool {
        self.atoms.contains(symbol)
    }

    fn atoms(&self) -> Vec<Symbol> {
        self.atoms.iter().cloned().collect()
    }

    fn shown(&self) -> Vec<Symbol> {
        self.shown.clone()
    }
}

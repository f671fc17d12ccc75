use tracing::debug;

use crate::ast::ROOT_UNIT;
use crate::error::TestError;
use crate::solver::Part;
use crate::types::Symbol;
use crate::units::{Unit, UnitRegistry};

/// Value bound to a unit's own parameter when the unit itself is grounded. Using the
/// parameter name keeps the unit's text unchanged after substitution.
pub fn placeholder(parameter: &str) -> Symbol {
    Symbol::constant(parameter)
}

/// Parts to ground for `unit`: the root unit, the unit itself, then its direct
/// dependencies in declaration order. Identical parts appear once.
pub fn resolve(registry: &UnitRegistry, unit: &Unit) -> Result<Vec<Part>, TestError> {
    let mut parts = vec![Part::new(ROOT_UNIT, Vec::new())];
    let own = Part::new(
        unit.name.clone(),
        unit.parameters.iter().map(|p| placeholder(p)).collect(),
    );
    push_unique(&mut parts, own);

    for dep in &unit.dependencies {
        let Some(target) = registry.get(&dep.target) else {
            return Err(TestError::UnknownDependency {
                unit: unit.name.clone(),
                dependency: dep.target.clone(),
            });
        };
        if target.parameters.len() != dep.bound_args.len() {
            return Err(TestError::ArgumentMismatch {
                unit: unit.name.clone(),
                dependency: dep.target.clone(),
                required: target.parameters.clone(),
                given: dep.bound_args.clone(),
            });
        }
        push_unique(
            &mut parts,
            Part::new(target.name.clone(), dep.bound_args.clone()),
        );
    }
    debug!(
        unit = %unit.name,
        parts = %parts.iter().map(Part::to_string).collect::<Vec<_>>().join(", "),
        "resolved parts"
    );
    Ok(parts)
}

fn push_unique(parts: &mut Vec<Part>, part: Part) {
    if !parts.contains(&part) {
        parts.push(part);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::DependencyRef;

    fn unit(name: &str, params: &[&str], deps: Vec<DependencyRef>) -> Unit {
        Unit {
            name: name.to_string(),
            parameters: params.iter().map(|p| p.to_string()).collect(),
            dependencies: deps,
            file: "t.lp".to_string(),
            line: 1,
        }
    }

    #[test]
    fn root_only_dependency_is_not_repeated() {
        let mut registry = UnitRegistry::new("t.lp");
        let test = unit(
            "test_x",
            &["base"],
            vec![DependencyRef {
                target: "base".into(),
                bound_args: vec![],
            }],
        );
        registry.register(test.clone(), true).expect("register");
        let parts = resolve(&registry, &test).expect("resolve");
        assert_eq!(
            parts,
            vec![
                Part::new("base", vec![]),
                Part::new("test_x", vec![Symbol::constant("base")]),
            ]
        );
    }
}

use std::fmt;

/// A ground value as produced by grounding: numbers, strings and (possibly nullary)
/// function terms. Tuples are functions with an empty name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Number(i64),
    String(String),
    Function { name: String, args: Vec<Symbol> },
}

impl Symbol {
    pub fn constant(name: impl Into<String>) -> Self {
        Symbol::Function {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Symbol>) -> Self {
        Symbol::Function {
            name: name.into(),
            args,
        }
    }

    pub fn tuple(args: Vec<Symbol>) -> Self {
        Symbol::Function {
            name: String::new(),
            args,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Symbol::String(value.into())
    }

    pub fn number(&self) -> Option<i64> {
        match self {
            Symbol::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Symbol::Function { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn args(&self) -> &[Symbol] {
        match self {
            Symbol::Function { args, .. } => args,
            _ => &[],
        }
    }

    pub fn has_signature(&self, pred: &str, arity: usize) -> bool {
        match self {
            Symbol::Function { name, args } => name == pred && args.len() == arity,
            _ => false,
        }
    }

    pub fn signature(&self) -> Option<Signature> {
        match self {
            Symbol::Function { name, args } => Some(Signature {
                name: name.clone(),
                arity: args.len(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    pub name: String,
    pub arity: usize,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Number(n) => write!(f, "{n}"),
            Symbol::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Symbol::Function { name, args } => {
                if args.is_empty() {
                    if name.is_empty() {
                        return write!(f, "()");
                    }
                    return write!(f, "{name}");
                }
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                if name.is_empty() && args.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
        }
    }
}

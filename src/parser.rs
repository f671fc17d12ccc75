use crate::ast::{
    BodyLiteral, CmpOp, External, Head, Program, Rule, ShowDecl, Statement, Term, UnitDecl,
    UnitParam,
};
use crate::diagnostics::{Diagnostic, Span};
use crate::types::Signature;

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Var(String),
    Number(i64),
    Str(String),
    At(String),
    Directive(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Dot,
    DotDot,
    If,
    Colon,
    Slash,
    Cmp(CmpOp),
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("identifier '{s}'"),
            TokenKind::Var(s) => format!("variable '{s}'"),
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Str(s) => format!("string \"{s}\""),
            TokenKind::At(s) => format!("'@{s}'"),
            TokenKind::Directive(s) => format!("'#{s}'"),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Semi => "';'".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::DotDot => "'..'".to_string(),
            TokenKind::If => "':-'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::Cmp(_) => "comparison".to_string(),
        }
    }
}

pub fn parse_program(src: &str) -> Result<Program, Vec<Diagnostic>> {
    parse_program_with_source(src, None)
}

pub fn parse_program_with_source(
    src: &str,
    file_id: Option<&str>,
) -> Result<Program, Vec<Diagnostic>> {
    let tokens = lex(src, file_id)?;
    let mut parser = Parser {
        src,
        file_id,
        tokens,
        pos: 0,
    };
    let mut program = Program::new(file_id.unwrap_or("<string>"));
    let mut errors = Vec::new();

    while !parser.at_end() {
        match parser.statement() {
            Ok(mut statements) => program.statements.append(&mut statements),
            Err(e) => {
                errors.push(e);
                parser.recover();
            }
        }
    }

    if errors.is_empty() {
        Ok(program)
    } else {
        Err(errors)
    }
}

fn lex(src: &str, file_id: Option<&str>) -> Result<Vec<Token>, Vec<Diagnostic>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let bytes = src.as_bytes();
    let mut i = 0usize;

    let err = |start: usize, end: usize, msg: String| {
        Diagnostic::new(
            "E-PARSE",
            msg,
            Some(Span::locate(src, start, end, file_id)),
        )
    };

    while i < bytes.len() {
        let ch = bytes[i] as char;
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if ch == '%' {
            if bytes.get(i + 1) == Some(&b'*') {
                let start = i;
                i += 2;
                loop {
                    if i + 1 >= bytes.len() {
                        errors.push(err(start, bytes.len(), "unterminated block comment".into()));
                        i = bytes.len();
                        break;
                    }
                    if bytes[i] == b'*' && bytes[i + 1] == b'%' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
                continue;
            }
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        let start = i;
        let single = match ch {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            ',' => Some(TokenKind::Comma),
            ';' => Some(TokenKind::Semi),
            '/' => Some(TokenKind::Slash),
            '=' => Some(TokenKind::Cmp(CmpOp::Eq)),
            _ => None,
        };
        if let Some(kind) = single {
            tokens.push(Token {
                kind,
                start,
                end: i + 1,
            });
            i += 1;
            continue;
        }

        let next = bytes.get(i + 1).copied();
        let (kind, len) = match (ch, next) {
            ('.', Some(b'.')) => (Some(TokenKind::DotDot), 2),
            ('.', _) => (Some(TokenKind::Dot), 1),
            (':', Some(b'-')) => (Some(TokenKind::If), 2),
            (':', _) => (Some(TokenKind::Colon), 1),
            ('!', Some(b'=')) => (Some(TokenKind::Cmp(CmpOp::Ne)), 2),
            ('<', Some(b'=')) => (Some(TokenKind::Cmp(CmpOp::Le)), 2),
            ('<', _) => (Some(TokenKind::Cmp(CmpOp::Lt)), 1),
            ('>', Some(b'=')) => (Some(TokenKind::Cmp(CmpOp::Ge)), 2),
            ('>', _) => (Some(TokenKind::Cmp(CmpOp::Gt)), 1),
            _ => (None, 0),
        };
        if let Some(kind) = kind {
            tokens.push(Token {
                kind,
                start,
                end: i + len,
            });
            i += len;
            continue;
        }

        if ch == '"' {
            i += 1;
            let mut value = String::new();
            let mut closed = false;
            while i < bytes.len() {
                let c = bytes[i] as char;
                if c == '\\' && i + 1 < bytes.len() {
                    let escaped = src[i + 1..].chars().next().unwrap_or('\\');
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                    i += 1 + escaped.len_utf8();
                    continue;
                }
                if c == '"' {
                    closed = true;
                    i += 1;
                    break;
                }
                let c = src[i..].chars().next().unwrap_or(c);
                value.push(c);
                i += c.len_utf8();
            }
            if !closed {
                errors.push(err(start, i, "unterminated string".into()));
            }
            tokens.push(Token {
                kind: TokenKind::Str(value),
                start,
                end: i,
            });
            continue;
        }

        let negative = ch == '-' && next.is_some_and(|b| b.is_ascii_digit());
        if ch.is_ascii_digit() || negative {
            if negative {
                i += 1;
            }
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let text = &src[start..i];
            match text.parse::<i64>() {
                Ok(n) => tokens.push(Token {
                    kind: TokenKind::Number(n),
                    start,
                    end: i,
                }),
                Err(_) => errors.push(err(start, i, format!("integer out of range: {text}"))),
            }
            continue;
        }

        if ch == '@' || ch == '#' || ch.is_ascii_alphabetic() || ch == '_' {
            let prefixed = ch == '@' || ch == '#';
            if prefixed {
                i += 1;
            }
            let word_start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let word = src[word_start..i].to_string();
            if word.is_empty() {
                errors.push(err(start, i, format!("expected a name after '{ch}'")));
                continue;
            }
            let first = word.as_bytes()[0] as char;
            let kind = match ch {
                '@' => TokenKind::At(word),
                '#' => TokenKind::Directive(word),
                _ if first.is_ascii_uppercase() || first == '_' => TokenKind::Var(word),
                _ => TokenKind::Ident(word),
            };
            tokens.push(Token { kind, start, end: i });
            continue;
        }

        let c = src[i..].chars().next().unwrap_or(ch);
        errors.push(err(i, i + c.len_utf8(), format!("unexpected character '{c}'")));
        i += c.len_utf8();
    }

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

struct Parser<'a> {
    src: &'a str,
    file_id: Option<&'a str>,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn span_from(&self, start: usize) -> Span {
        let end = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.end)
            .unwrap_or(start);
        Span::locate(self.src, start, end.max(start), self.file_id)
    }

    fn current_start(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.start)
            .unwrap_or(self.src.len())
    }

    fn error(&self, message: impl Into<String>) -> Diagnostic {
        let (start, end) = self
            .tokens
            .get(self.pos)
            .map(|t| (t.start, t.end))
            .unwrap_or((self.src.len(), self.src.len()));
        Diagnostic::new(
            "E-PARSE",
            message,
            Some(Span::locate(self.src, start, end, self.file_id)),
        )
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        match self.peek() {
            Some(kind) => self.error(format!("expected {expected}, found {}", kind.describe())),
            None => self.error(format!("expected {expected}, found end of input")),
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<(), Diagnostic> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn recover(&mut self) {
        while let Some(token) = self.bump() {
            if token.kind == TokenKind::Dot {
                break;
            }
        }
    }

    fn statement(&mut self) -> Result<Vec<Statement>, Diagnostic> {
        let start = self.current_start();
        if let Some(TokenKind::Directive(name)) = self.peek().cloned() {
            self.pos += 1;
            return match name.as_str() {
                "program" => self.unit_decl(start).map(|u| vec![Statement::Unit(u)]),
                "external" => {
                    let atom = self.atom()?;
                    self.expect(&TokenKind::Dot, "'.'")?;
                    Ok(vec![Statement::External(External {
                        atom,
                        span: self.span_from(start),
                    })])
                }
                "show" => {
                    if self.eat(&TokenKind::Dot) {
                        return Ok(vec![Statement::Show(ShowDecl {
                            signature: None,
                            span: self.span_from(start),
                        })]);
                    }
                    let signature = self.signature()?;
                    self.expect(&TokenKind::Dot, "'.'")?;
                    Ok(vec![Statement::Show(ShowDecl {
                        signature: Some(signature),
                        span: self.span_from(start),
                    })])
                }
                "defined" => {
                    let signature = self.signature()?;
                    self.expect(&TokenKind::Dot, "'.'")?;
                    Ok(vec![Statement::Defined(signature, self.span_from(start))])
                }
                other => Err(Diagnostic::new(
                    "E-PARSE",
                    format!("unsupported directive: #{other}"),
                    Some(self.span_from(start)),
                )),
            };
        }
        self.rule(start).map(|r| vec![Statement::Rule(r)])
    }

    fn unit_decl(&mut self, start: usize) -> Result<UnitDecl, Diagnostic> {
        let name = match self.peek().cloned() {
            Some(TokenKind::Ident(name)) => {
                self.pos += 1;
                name
            }
            _ => return Err(self.unexpected("a program name")),
        };
        let mut params = Vec::new();
        if self.eat(&TokenKind::LParen) {
            loop {
                let param_start = self.current_start();
                let param_name = match self.peek().cloned() {
                    Some(TokenKind::Ident(n)) => {
                        self.pos += 1;
                        n
                    }
                    _ => return Err(self.unexpected("a parameter name")),
                };
                let mut args = Vec::new();
                if self.eat(&TokenKind::LParen) {
                    loop {
                        args.push(self.term()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen, "')'")?;
                }
                params.push(UnitParam {
                    name: param_name,
                    args,
                    span: self.span_from(param_start),
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "')'")?;
        }
        self.expect(&TokenKind::Dot, "'.'")?;
        Ok(UnitDecl {
            name,
            params,
            span: self.span_from(start),
        })
    }

    fn signature(&mut self) -> Result<Signature, Diagnostic> {
        let name = match self.peek().cloned() {
            Some(TokenKind::Ident(n)) => {
                self.pos += 1;
                n
            }
            _ => return Err(self.unexpected("a predicate name")),
        };
        self.expect(&TokenKind::Slash, "'/'")?;
        match self.peek().cloned() {
            Some(TokenKind::Number(n)) if n >= 0 => {
                self.pos += 1;
                Ok(Signature {
                    name,
                    arity: n as usize,
                })
            }
            _ => Err(self.unexpected("an arity")),
        }
    }

    fn rule(&mut self, start: usize) -> Result<Rule, Diagnostic> {
        let head = if self.peek() == Some(&TokenKind::If) {
            Head::Falsity
        } else if self.eat(&TokenKind::LBrace) {
            let mut elements = Vec::new();
            if !self.eat(&TokenKind::RBrace) {
                loop {
                    elements.push(self.atom()?);
                    if !self.eat(&TokenKind::Semi) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace, "'}'")?;
            }
            Head::Choice(elements)
        } else {
            let first = self.atom()?;
            if self.peek() == Some(&TokenKind::Semi) {
                let mut alternatives = vec![first];
                while self.eat(&TokenKind::Semi) {
                    alternatives.push(self.atom()?);
                }
                Head::Disjunction(alternatives)
            } else {
                Head::Atom(first)
            }
        };

        let mut body = Vec::new();
        if self.eat(&TokenKind::If) {
            if self.peek() != Some(&TokenKind::Dot) {
                loop {
                    body.push(self.body_literal()?);
                    if !(self.eat(&TokenKind::Comma) || self.eat(&TokenKind::Semi)) {
                        break;
                    }
                }
            }
        }
        self.expect(&TokenKind::Dot, "'.'")?;
        Ok(Rule {
            head,
            body,
            span: self.span_from(start),
        })
    }

    fn body_literal(&mut self) -> Result<BodyLiteral, Diagnostic> {
        if self.peek() == Some(&TokenKind::Ident("not".to_string())) {
            let negates = !matches!(
                self.peek_at(1),
                Some(TokenKind::LParen)
                    | Some(TokenKind::Comma)
                    | Some(TokenKind::Dot)
                    | Some(TokenKind::Semi)
                    | Some(TokenKind::Cmp(_))
            );
            if negates {
                self.pos += 1;
                let atom = self.atom()?;
                return Ok(BodyLiteral::Literal {
                    negated: true,
                    atom,
                });
            }
        }
        if self.peek() == Some(&TokenKind::Directive("count".to_string())) {
            self.pos += 1;
        }
        if self.eat(&TokenKind::LBrace) {
            let mut elements = Vec::new();
            if !self.eat(&TokenKind::RBrace) {
                loop {
                    elements.push(self.atom()?);
                    if !self.eat(&TokenKind::Semi) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace, "'}'")?;
            }
            let op = match self.peek().cloned() {
                Some(TokenKind::Cmp(op)) => {
                    self.pos += 1;
                    op
                }
                _ => return Err(self.unexpected("a comparison after the count aggregate")),
            };
            let bound = self.term()?;
            return Ok(BodyLiteral::Count {
                elements,
                op,
                bound,
            });
        }

        let term = self.term()?;
        if let Some(TokenKind::Cmp(op)) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            return Ok(BodyLiteral::Comparison { lhs: term, op, rhs });
        }
        self.check_atom(&term)?;
        Ok(BodyLiteral::Literal {
            negated: false,
            atom: term,
        })
    }

    fn atom(&mut self) -> Result<Term, Diagnostic> {
        let term = self.term()?;
        self.check_atom(&term)?;
        Ok(term)
    }

    fn check_atom(&self, term: &Term) -> Result<(), Diagnostic> {
        let ok = match term {
            Term::Function { name, .. } => !name.is_empty(),
            Term::Pool(alternatives) => alternatives
                .iter()
                .all(|t| matches!(t, Term::Function { name, .. } if !name.is_empty())),
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            let start = self
                .tokens
                .get(self.pos.saturating_sub(1))
                .map(|t| t.start)
                .unwrap_or(0);
            Err(Diagnostic::new(
                "E-PARSE",
                "expected an atom",
                Some(Span::locate(self.src, start, start, self.file_id)),
            ))
        }
    }

    fn term(&mut self) -> Result<Term, Diagnostic> {
        let lhs = self.primary()?;
        if self.eat(&TokenKind::DotDot) {
            let rhs = self.primary()?;
            return Ok(Term::Interval(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn primary(&mut self) -> Result<Term, Diagnostic> {
        match self.peek().cloned() {
            Some(TokenKind::Number(n)) => {
                self.pos += 1;
                Ok(Term::Number(n))
            }
            Some(TokenKind::Str(s)) => {
                self.pos += 1;
                Ok(Term::String(s))
            }
            Some(TokenKind::Var(v)) => {
                self.pos += 1;
                Ok(Term::Var(v))
            }
            Some(TokenKind::Ident(name)) => {
                self.pos += 1;
                if self.eat(&TokenKind::LParen) {
                    let alternatives = self.argument_pool()?;
                    self.expect(&TokenKind::RParen, "')'")?;
                    Ok(pooled(alternatives, |args| Term::Function {
                        name: name.clone(),
                        args,
                    }))
                } else {
                    Ok(Term::constant(name))
                }
            }
            Some(TokenKind::At(name)) => {
                self.pos += 1;
                let mut args = Vec::new();
                if self.eat(&TokenKind::LParen) {
                    if !self.eat(&TokenKind::RParen) {
                        loop {
                            args.push(self.term()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(&TokenKind::RParen, "')'")?;
                    }
                }
                Ok(Term::Call { name, args })
            }
            Some(TokenKind::LParen) => {
                self.pos += 1;
                let alternatives = self.argument_pool()?;
                self.expect(&TokenKind::RParen, "')'")?;
                if alternatives.len() == 1 && alternatives[0].len() == 1 {
                    let mut only = alternatives;
                    return Ok(only.remove(0).remove(0));
                }
                Ok(pooled(alternatives, |args| Term::Function {
                    name: String::new(),
                    args,
                }))
            }
            _ => Err(self.unexpected("a term")),
        }
    }

    /// Comma separated argument lists, alternatives separated by ';'.
    fn argument_pool(&mut self) -> Result<Vec<Vec<Term>>, Diagnostic> {
        let mut alternatives = Vec::new();
        loop {
            let mut args = Vec::new();
            if !matches!(self.peek(), Some(TokenKind::RParen) | Some(TokenKind::Semi)) {
                loop {
                    args.push(self.term()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            alternatives.push(args);
            if !self.eat(&TokenKind::Semi) {
                break;
            }
        }
        Ok(alternatives)
    }
}

fn pooled(alternatives: Vec<Vec<Term>>, build: impl Fn(Vec<Term>) -> Term) -> Term {
    if alternatives.len() == 1 {
        let mut alternatives = alternatives;
        return build(alternatives.remove(0));
    }
    Term::Pool(alternatives.into_iter().map(build).collect())
}

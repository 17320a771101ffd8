//! schema::xpath
//!
//! Schema-level XPath atomization.
//!
//! # Overview
//!
//! Atomizing an expression means finding every schema node it can touch,
//! without evaluating it against instance data. [`PathAtomizer`] tokenizes
//! the expression, finds every location path in it (including paths inside
//! predicates and function arguments), and walks each path over the schema
//! tree. Operators, literals and function names are skipped.
//!
//! Supported steps: `/`, `//`, `.`, `..`, `*`, `prefix:name`, `name`,
//! `current()`, predicates. Prefixes are module names and must name the
//! expression's module or one of its imports. Unprefixed names belong to
//! the expression's module.
//!
//! # Example
//!
//! ```
//! use yangmods::schema::source::JsonSchemaParser;
//! use yangmods::schema::tree::{NoImports, SchemaContext};
//! use yangmods::schema::xpath::{AtomizeOptions, Atomizer, PathAtomizer};
//!
//! let mut ctx = SchemaContext::new();
//! let m = ctx.load_module(&JsonSchemaParser, r#"{"name": "m", "data": [
//!     {"kind": "leaf", "name": "a", "type": {"base": "string"}},
//!     {"kind": "leaf", "name": "b", "type": {"base": "string"}, "must": ["../a = 'x'"]}
//! ]}"#, true, &NoImports).unwrap();
//! ctx.finalize().unwrap();
//!
//! let b = ctx.module(m).data[1];
//! let atoms = PathAtomizer.atomize(&ctx, b, "../a = 'x'", AtomizeOptions::default()).unwrap();
//! let paths: Vec<_> = atoms.iter().map(|n| ctx.data_path(*n)).collect();
//! assert!(paths.contains(&"/m:a".to_string()));
//! ```

use tracing::trace;

use super::tree::{ModuleId, NodeId, SchemaContext};
use super::SchemaError;
use crate::schema::source::NodeKind;

/// Options for one atomization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AtomizeOptions {
    /// Resolve children of RPCs/actions in their output instead of input.
    pub output: bool,
}

/// Finds the schema nodes an expression can touch.
pub trait Atomizer {
    /// Atomize `expr` evaluated at `ctx_node`. The result includes the
    /// context node itself, in first-seen order without duplicates.
    fn atomize(
        &self,
        ctx: &SchemaContext,
        ctx_node: NodeId,
        expr: &str,
        opts: AtomizeOptions,
    ) -> Result<Vec<NodeId>, SchemaError>;
}

/// Atomizer that walks the location paths of an expression.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathAtomizer;

impl Atomizer for PathAtomizer {
    fn atomize(
        &self,
        ctx: &SchemaContext,
        ctx_node: NodeId,
        expr: &str,
        opts: AtomizeOptions,
    ) -> Result<Vec<NodeId>, SchemaError> {
        let tokens = tokenize(expr)?;
        let mut walker = Walker::new(ctx, expr, tokens, ctx_node, opts.output, false);
        walker.scan(Pos::Node(ctx_node), false)?;
        trace!(expr, atoms = walker.atoms.len(), "atomized");
        Ok(walker.atoms)
    }
}

/// Resolve a leafref path to its single target leaf or leaf-list.
///
/// Unlike atomization, every step must resolve.
pub fn resolve_target(ctx: &SchemaContext, node: NodeId, path: &str) -> Result<NodeId, SchemaError> {
    let module = ctx.node(node).module;
    let unresolved = |message: String| SchemaError::UnresolvedPath {
        module: ctx.module(module).name.clone(),
        path: path.to_string(),
        message,
    };

    let tokens = tokenize(path)?;
    let mut walker = Walker::new(ctx, path, tokens, node, false, true);
    let targets = match walker.peek() {
        Some(Token::Slash) | Some(Token::DoubleSlash) => walker.path(vec![Pos::Root], true)?,
        Some(Token::Function(name)) if name == "current" => {
            walker.current_call()?;
            if walker.peek() == Some(&Token::Slash) {
                walker.pos += 1;
                walker.path(vec![Pos::Node(node)], false)?
            } else {
                vec![Pos::Node(node)]
            }
        }
        Some(_) => walker.path(vec![Pos::Node(node)], false)?,
        None => return Err(unresolved("empty path".into())),
    };
    if walker.peek().is_some() {
        return Err(unresolved("trailing tokens after path".into()));
    }

    let nodes: Vec<NodeId> = targets
        .into_iter()
        .filter_map(|p| match p {
            Pos::Node(n) => Some(n),
            Pos::Root => None,
        })
        .collect();
    match nodes.as_slice() {
        [one] if ctx.node(*one).kind.is_terminal() => Ok(*one),
        [one] => Err(unresolved(format!(
            "target is a {}, not a leaf",
            ctx.node(*one).kind.as_str()
        ))),
        [] => Err(unresolved("no target".into())),
        _ => Err(unresolved("more than one target".into())),
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    Star,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    /// Any operator, including `and`, `or`, `div`, `mod` and multiply.
    Operator,
    Literal,
    Number,
    Variable,
    Name {
        prefix: Option<String>,
        local: String,
    },
    /// A name followed by `(`.
    Function(String),
}

impl Token {
    /// Whether a following `*` or name is an operator (XPath 1.0 §3.7).
    fn ends_operand(&self) -> bool {
        !matches!(
            self,
            Token::At
                | Token::LParen
                | Token::LBracket
                | Token::Comma
                | Token::Operator
                | Token::Slash
                | Token::DoubleSlash
        )
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn tokenize(expr: &str) -> Result<Vec<Token>, SchemaError> {
    let err = |message: String| SchemaError::XPath {
        expr: expr.to_string(),
        message,
    };
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    let read_name = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_name_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    while i < chars.len() {
        let c = chars[i];
        let operator_position = tokens.last().map(Token::ends_operand).unwrap_or(false);
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
                continue;
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::DoubleSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '.' if chars.get(i + 1) == Some(&'.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' if chars.get(i + 1).map(|d| d.is_ascii_digit()).unwrap_or(false) => {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                tokens.push(Token::Number);
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '*' => {
                tokens.push(if operator_position {
                    Token::Operator
                } else {
                    Token::Star
                });
                i += 1;
            }
            '|' | '+' | '-' | '=' => {
                tokens.push(Token::Operator);
                i += 1;
            }
            '!' | '<' | '>' => {
                if c == '!' && chars.get(i + 1) != Some(&'=') {
                    return Err(err(format!("unexpected '!' at offset {}", i)));
                }
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
                tokens.push(Token::Operator);
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| err("unterminated string literal".into()))?;
                i += end + 2;
                tokens.push(Token::Literal);
            }
            '$' => {
                i += 1;
                read_name(&mut i);
                tokens.push(Token::Variable);
            }
            d if d.is_ascii_digit() => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number);
            }
            n if is_name_start(n) => {
                let first = read_name(&mut i);
                if operator_position && matches!(first.as_str(), "and" | "or" | "div" | "mod") {
                    tokens.push(Token::Operator);
                    continue;
                }
                if chars.get(i) == Some(&':') {
                    if chars.get(i + 1) == Some(&':') {
                        return Err(err(format!("axis '{}::' is not supported", first)));
                    }
                    if chars.get(i + 1).map(|c| is_name_start(*c)).unwrap_or(false) {
                        i += 1;
                        let local = read_name(&mut i);
                        tokens.push(Token::Name {
                            prefix: Some(first),
                            local,
                        });
                        continue;
                    }
                    if chars.get(i + 1) == Some(&'*') {
                        i += 2;
                        tokens.push(Token::Star);
                        continue;
                    }
                    return Err(err(format!("dangling ':' after '{}'", first)));
                }
                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if chars.get(j) == Some(&'(') {
                    tokens.push(Token::Function(first));
                } else {
                    tokens.push(Token::Name {
                        prefix: None,
                        local: first,
                    });
                }
            }
            other => return Err(err(format!("unexpected '{}' at offset {}", other, i))),
        }
    }
    Ok(tokens)
}

// =============================================================================
// Walker
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pos {
    Root,
    Node(NodeId),
}

struct Walker<'a> {
    ctx: &'a SchemaContext,
    expr: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    /// Node `current()` refers to.
    origin: NodeId,
    /// Module unprefixed names and prefixes are resolved in.
    module: ModuleId,
    output: bool,
    /// Every step must match at least one node.
    strict: bool,
    atoms: Vec<NodeId>,
}

impl<'a> Walker<'a> {
    fn new(
        ctx: &'a SchemaContext,
        expr: &'a str,
        tokens: Vec<Token>,
        origin: NodeId,
        output: bool,
        strict: bool,
    ) -> Self {
        Self {
            ctx,
            expr,
            tokens,
            pos: 0,
            origin,
            module: ctx.node(origin).module,
            output,
            strict,
            atoms: vec![origin],
        }
    }

    fn error(&self, message: impl Into<String>) -> SchemaError {
        SchemaError::XPath {
            expr: self.expr.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn record(&mut self, set: &[Pos]) {
        for p in set {
            if let Pos::Node(n) = p {
                if !self.atoms.contains(n) {
                    self.atoms.push(*n);
                }
            }
        }
    }

    /// Scan an expression (or a predicate body when `in_predicate`),
    /// walking every location path found with `base` as the context.
    fn scan(&mut self, base: Pos, in_predicate: bool) -> Result<(), SchemaError> {
        loop {
            let token = match self.peek() {
                Some(t) => t.clone(),
                None if in_predicate => return Err(self.error("unterminated predicate")),
                None => return Ok(()),
            };
            match token {
                Token::RBracket if in_predicate => {
                    self.pos += 1;
                    return Ok(());
                }
                Token::RBracket => return Err(self.error("unbalanced ']'")),
                Token::LBracket => {
                    self.pos += 1;
                    self.scan(base, true)?;
                }
                Token::Slash | Token::DoubleSlash => {
                    self.path(vec![Pos::Root], true)?;
                }
                Token::Name { .. } | Token::Star | Token::Dot | Token::DotDot | Token::At => {
                    self.path(vec![base], false)?;
                }
                Token::Function(name) if name == "current" => {
                    self.current_call()?;
                    self.record(&[Pos::Node(self.origin)]);
                    if matches!(self.peek(), Some(Token::Slash) | Some(Token::DoubleSlash)) {
                        let start = vec![Pos::Node(self.origin)];
                        if self.peek() == Some(&Token::Slash) {
                            self.pos += 1;
                            self.path(start, false)?;
                        } else {
                            self.path(start, true)?;
                        }
                    }
                }
                _ => self.pos += 1,
            }
        }
    }

    fn current_call(&mut self) -> Result<(), SchemaError> {
        self.pos += 1;
        if self.peek() != Some(&Token::LParen) {
            return Err(self.error("expected '(' after current"));
        }
        self.pos += 1;
        if self.peek() != Some(&Token::RParen) {
            return Err(self.error("current() takes no arguments"));
        }
        self.pos += 1;
        Ok(())
    }

    /// Walk one location path from `start`. When `separator_first`, the
    /// next token is the `/` or `//` introducing the first step.
    fn path(&mut self, start: Vec<Pos>, separator_first: bool) -> Result<Vec<Pos>, SchemaError> {
        let mut current = start;
        let mut need_step = true;

        if separator_first {
            match self.peek() {
                Some(Token::Slash) => self.pos += 1,
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    current = self.descendants_or_self(&current);
                }
                _ => {}
            }
            if !self.starts_step() {
                // Bare "/" selects the root.
                return Ok(current);
            }
        }

        while need_step {
            current = self.step(&current)?;
            self.record(&current);
            match self.peek() {
                Some(Token::Slash) => self.pos += 1,
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    current = self.descendants_or_self(&current);
                }
                _ => need_step = false,
            }
        }
        Ok(current)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name { .. } | Token::Star | Token::Dot | Token::DotDot | Token::At)
        )
    }

    fn step(&mut self, current: &[Pos]) -> Result<Vec<Pos>, SchemaError> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| self.error("expected a path step"))?;
        self.pos += 1;

        let next = match token {
            Token::Dot => current.to_vec(),
            Token::DotDot => {
                let mut out = Vec::new();
                for p in current {
                    let parent = match p {
                        Pos::Root => Pos::Root,
                        Pos::Node(n) => self.ctx.data_parent(*n).map(Pos::Node).unwrap_or(Pos::Root),
                    };
                    if !out.contains(&parent) {
                        out.push(parent);
                    }
                }
                out
            }
            Token::Star => {
                let mut out = Vec::new();
                for p in current {
                    for c in self.children(*p) {
                        if !out.contains(&Pos::Node(c)) {
                            out.push(Pos::Node(c));
                        }
                    }
                }
                out
            }
            Token::At => {
                // Attributes have no schema nodes.
                if matches!(self.peek(), Some(Token::Name { .. } | Token::Star)) {
                    self.pos += 1;
                }
                Vec::new()
            }
            Token::Name { prefix, local } => {
                let module = match &prefix {
                    Some(p) => self.ctx.resolve_prefix(self.module, p)?,
                    None => self.module,
                };
                let mut out = Vec::new();
                for p in current {
                    let found = match p {
                        Pos::Root => self.ctx.find_data_child(None, module, &local, self.output),
                        Pos::Node(n) => self.ctx.find_data_child(Some(*n), module, &local, self.output),
                    };
                    if let Some(c) = found {
                        if !out.contains(&Pos::Node(c)) {
                            out.push(Pos::Node(c));
                        }
                    }
                }
                if out.is_empty() && self.strict {
                    return Err(self.error(format!(
                        "no schema node '{}'",
                        prefix.map(|p| format!("{}:{}", p, local)).unwrap_or(local)
                    )));
                }
                out
            }
            Token::Function(_) => {
                // Node tests such as node() or text().
                self.skip_call()?;
                current.to_vec()
            }
            other => return Err(self.error(format!("unexpected {:?} in path", other))),
        };

        self.predicates(&next)?;
        Ok(next)
    }

    fn predicates(&mut self, set: &[Pos]) -> Result<(), SchemaError> {
        while self.peek() == Some(&Token::LBracket) {
            self.pos += 1;
            let body = self.pos;
            if set.is_empty() {
                self.skip_to_close(Token::LBracket, Token::RBracket)?;
                continue;
            }
            for p in set {
                self.pos = body;
                self.scan(*p, true)?;
            }
        }
        Ok(())
    }

    fn skip_call(&mut self) -> Result<(), SchemaError> {
        if self.peek() != Some(&Token::LParen) {
            return Err(self.error("expected '('"));
        }
        self.pos += 1;
        self.skip_to_close(Token::LParen, Token::RParen)
    }

    /// Advance past the closer matching an already consumed opener.
    fn skip_to_close(&mut self, open: Token, close: Token) -> Result<(), SchemaError> {
        let mut depth = 1;
        while let Some(t) = self.peek() {
            if *t == open {
                depth += 1;
            } else if *t == close {
                depth -= 1;
            }
            self.pos += 1;
            if depth == 0 {
                return Ok(());
            }
        }
        Err(self.error("unbalanced brackets"))
    }

    fn children(&self, p: Pos) -> Vec<NodeId> {
        match p {
            Pos::Root => self
                .ctx
                .top_level_nodes()
                .into_iter()
                .filter(|n| self.ctx.node(*n).kind != NodeKind::Rpc)
                .collect(),
            Pos::Node(n) => self.ctx.data_children(n, self.output),
        }
    }

    fn descendants_or_self(&self, set: &[Pos]) -> Vec<Pos> {
        let mut out: Vec<Pos> = Vec::new();
        let mut stack: Vec<Pos> = set.iter().rev().copied().collect();
        while let Some(p) = stack.pop() {
            if out.contains(&p) {
                continue;
            }
            out.push(p);
            for c in self.children(p).into_iter().rev() {
                stack.push(Pos::Node(c));
            }
        }
        out
    }
}

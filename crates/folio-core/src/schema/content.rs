// SPDX-License-Identifier: AGPL-3.0-or-later
//! Content expressions
//!
//! A content expression constrains the ordered children of a node type. The
//! grammar follows the familiar ProseMirror notation:
//!
//! ```text
//! expr    := seq ('|' seq)*
//! seq     := postfix*
//! postfix := atom ('*' | '+' | '?' | '{n}' | '{n,}' | '{n,m}')*
//! atom    := name | '(' expr ')'
//! ```
//!
//! Names refer to either a node type or a group. Expressions compile to a
//! Thompson NFA which is simulated over the child sequence.

use logos::Logos;
use std::collections::{BTreeSet, VecDeque};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum Token<'src> {
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Name(&'src str),

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("|")]
    Pipe,

    #[token("*")]
    Star,

    #[token("+")]
    Plus,

    #[token("?")]
    Question,

    #[regex(r"\{[0-9]+(,[0-9]*)?\}", |lex| lex.slice())]
    Range(&'src str),
}

/// Error raised while parsing a content expression
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentExprError {
    #[error("unexpected character at offset {0}")]
    InvalidCharacter(usize),

    #[error("unexpected `{found}` at token {position}")]
    UnexpectedToken { position: usize, found: String },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("invalid repetition range `{0}`")]
    InvalidRange(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Name(String),
    Seq(Vec<Expr>),
    Choice(Vec<Expr>),
    Repeat {
        expr: Box<Expr>,
        min: usize,
        max: Option<usize>,
    },
}

struct ExprParser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
}

impl<'src> ExprParser<'src> {
    fn new(source: &'src str) -> Result<Self, ContentExprError> {
        let mut lexer = Token::lexer(source);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next() {
            match token {
                Ok(t) => tokens.push(t),
                Err(()) => return Err(ContentExprError::InvalidCharacter(lexer.span().start)),
            }
        }
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos)
    }

    fn unexpected(&self) -> ContentExprError {
        match self.peek() {
            Some(t) => ContentExprError::UnexpectedToken {
                position: self.pos,
                found: format!("{t:?}"),
            },
            None => ContentExprError::UnexpectedEnd,
        }
    }

    fn parse(mut self) -> Result<Expr, ContentExprError> {
        let expr = self.parse_choice()?;
        if self.peek().is_some() {
            return Err(self.unexpected());
        }
        Ok(expr)
    }

    fn parse_choice(&mut self) -> Result<Expr, ContentExprError> {
        let mut alternatives = vec![self.parse_seq()?];
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            alternatives.push(self.parse_seq()?);
        }
        Ok(if alternatives.len() == 1 {
            alternatives.remove(0)
        } else {
            Expr::Choice(alternatives)
        })
    }

    fn parse_seq(&mut self) -> Result<Expr, ContentExprError> {
        let mut items = Vec::new();
        while matches!(self.peek(), Some(Token::Name(_) | Token::LParen)) {
            items.push(self.parse_postfix()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Seq(items)
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ContentExprError> {
        let mut expr = self.parse_atom()?;
        loop {
            let (min, max) = match self.peek() {
                Some(Token::Star) => (0, None),
                Some(Token::Plus) => (1, None),
                Some(Token::Question) => (0, Some(1)),
                Some(Token::Range(raw)) => parse_range(raw)?,
                _ => break,
            };
            self.pos += 1;
            expr = Expr::Repeat {
                expr: Box::new(expr),
                min,
                max,
            };
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expr, ContentExprError> {
        match self.peek() {
            Some(Token::Name(name)) => {
                let expr = Expr::Name((*name).to_string());
                self.pos += 1;
                Ok(expr)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let expr = self.parse_choice()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(self.unexpected());
                }
                self.pos += 1;
                Ok(expr)
            }
            _ => Err(self.unexpected()),
        }
    }
}

fn parse_range(raw: &str) -> Result<(usize, Option<usize>), ContentExprError> {
    let invalid = || ContentExprError::InvalidRange(raw.to_string());
    let inner = &raw[1..raw.len() - 1];
    let (min, max) = match inner.split_once(',') {
        None => {
            let n = inner.parse().map_err(|_| invalid())?;
            (n, Some(n))
        }
        Some((lo, "")) => (lo.parse().map_err(|_| invalid())?, None),
        Some((lo, hi)) => (
            lo.parse().map_err(|_| invalid())?,
            Some(hi.parse().map_err(|_| invalid())?),
        ),
    };
    if max.is_some_and(|m| m < min) {
        return Err(invalid());
    }
    Ok((min, max))
}

#[derive(Debug, Clone, Default)]
struct State {
    /// Labelled transitions: (label index, target)
    edges: Vec<(usize, usize)>,
    /// Epsilon transitions
    epsilon: Vec<usize>,
}

/// Labels a child presents to the matcher: its type name and its groups
#[derive(Debug, Clone, Copy)]
pub struct ChildLabel<'a> {
    pub name: &'a str,
    pub groups: &'a [String],
}

impl ChildLabel<'_> {
    fn matches(&self, label: &str) -> bool {
        self.name == label || self.groups.iter().any(|g| g == label)
    }
}

/// Compiled content expression
#[derive(Debug, Clone)]
pub struct ContentExpr {
    source: String,
    labels: Vec<String>,
    states: Vec<State>,
    accept: usize,
}

/// Set of live NFA states after consuming a prefix of children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchState(BTreeSet<usize>);

impl MatchState {
    /// No continuation of this prefix can ever match
    pub fn is_dead(&self) -> bool {
        self.0.is_empty()
    }
}

impl ContentExpr {
    pub fn parse(source: &str) -> Result<Self, ContentExprError> {
        let expr = ExprParser::new(source)?.parse()?;
        let mut compiled = Self {
            source: source.trim().to_string(),
            labels: Vec::new(),
            states: vec![State::default()],
            accept: 0,
        };
        compiled.accept = compiled.compile(&expr, 0);
        Ok(compiled)
    }

    /// The expression as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the expression only admits an empty child list
    pub fn is_leaf(&self) -> bool {
        self.labels.is_empty()
    }

    /// Names (types or groups) mentioned by the expression
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn new_state(&mut self) -> usize {
        self.states.push(State::default());
        self.states.len() - 1
    }

    fn intern(&mut self, label: &str) -> usize {
        if let Some(i) = self.labels.iter().position(|l| l == label) {
            return i;
        }
        self.labels.push(label.to_string());
        self.labels.len() - 1
    }

    /// Compile `expr` starting at state `from`, returning its exit state
    fn compile(&mut self, expr: &Expr, from: usize) -> usize {
        match expr {
            Expr::Name(name) => {
                let label = self.intern(name);
                let to = self.new_state();
                self.states[from].edges.push((label, to));
                to
            }
            Expr::Seq(items) => items.iter().fold(from, |cur, item| self.compile(item, cur)),
            Expr::Choice(alternatives) => {
                let to = self.new_state();
                for alt in alternatives {
                    let end = self.compile(alt, from);
                    self.states[end].epsilon.push(to);
                }
                to
            }
            Expr::Repeat { expr, min, max } => {
                let mut cur = from;
                for _ in 0..*min {
                    cur = self.compile(expr, cur);
                }
                match max {
                    None => {
                        let loop_start = self.new_state();
                        self.states[cur].epsilon.push(loop_start);
                        let end = self.compile(expr, loop_start);
                        self.states[end].epsilon.push(loop_start);
                        loop_start
                    }
                    Some(max) => {
                        let to = self.new_state();
                        self.states[cur].epsilon.push(to);
                        for _ in *min..*max {
                            cur = self.compile(expr, cur);
                            self.states[cur].epsilon.push(to);
                        }
                        to
                    }
                }
            }
        }
    }

    fn closure(&self, seed: impl IntoIterator<Item = usize>) -> BTreeSet<usize> {
        let mut set = BTreeSet::new();
        let mut stack: Vec<usize> = seed.into_iter().collect();
        while let Some(s) = stack.pop() {
            if set.insert(s) {
                stack.extend(self.states[s].epsilon.iter().copied());
            }
        }
        set
    }

    pub fn start(&self) -> MatchState {
        MatchState(self.closure([0]))
    }

    /// Advance the match by one child
    pub fn step(&self, state: &MatchState, child: ChildLabel<'_>) -> MatchState {
        let next = state.0.iter().flat_map(|&s| {
            self.states[s]
                .edges
                .iter()
                .filter(|(label, _)| child.matches(&self.labels[*label]))
                .map(|&(_, to)| to)
        });
        MatchState(self.closure(next.collect::<Vec<_>>()))
    }

    pub fn is_accepting(&self, state: &MatchState) -> bool {
        state.0.contains(&self.accept)
    }

    /// Match a complete child sequence
    pub fn matches<'a>(&self, children: impl IntoIterator<Item = ChildLabel<'a>>) -> bool {
        let mut state = self.start();
        for child in children {
            state = self.step(&state, child);
            if state.is_dead() {
                return false;
            }
        }
        self.is_accepting(&state)
    }

    /// Shortest sequence of labels that takes `state` to acceptance
    pub fn fill_end(&self, state: &MatchState) -> Option<Vec<String>> {
        if self.is_accepting(state) {
            return Some(Vec::new());
        }
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        seen.insert(state.0.clone());
        queue.push_back((state.0.clone(), Vec::new()));
        while let Some((set, path)) = queue.pop_front() {
            for &s in &set {
                for &(label, to) in &self.states[s].edges {
                    let next = self.closure([to]);
                    let mut next_path: Vec<usize> = path.clone();
                    next_path.push(label);
                    if next.contains(&self.accept) {
                        return Some(next_path.iter().map(|&l| self.labels[l].clone()).collect());
                    }
                    if seen.insert(next.clone()) {
                        queue.push_back((next, next_path));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label<'a>(name: &'a str, groups: &'a [String]) -> ChildLabel<'a> {
        ChildLabel { name, groups }
    }

    fn names<'a>(items: &'a [&'a str], groups: &'a [String]) -> Vec<ChildLabel<'a>> {
        items.iter().map(|n| label(n, groups)).collect()
    }

    #[test]
    fn test_one_or_more_group() {
        let expr = ContentExpr::parse("block+").unwrap();
        let block = vec!["block".to_string()];
        assert!(expr.matches(names(&["paragraph", "heading"], &block)));
        assert!(!expr.matches(names(&[], &block)));
        assert!(!expr.matches(names(&["text"], &[])));
    }

    #[test]
    fn test_sequence_and_star() {
        let expr = ContentExpr::parse("paragraph block*").unwrap();
        let block = vec!["block".to_string()];
        assert!(expr.matches(names(&["paragraph"], &block)));
        assert!(expr.matches(names(&["paragraph", "bulletList", "paragraph"], &block)));
        assert!(!expr.matches(names(&["bulletList"], &block)));
    }

    #[test]
    fn test_choice_in_parens() {
        let expr = ContentExpr::parse("(tableCell | tableHeader)+").unwrap();
        assert!(expr.matches(names(&["tableHeader", "tableCell"], &[])));
        assert!(!expr.matches(names(&["tableCell", "table"], &[])));
    }

    #[test]
    fn test_bounded_range() {
        let expr = ContentExpr::parse("item{2,3}").unwrap();
        assert!(!expr.matches(names(&["item"], &[])));
        assert!(expr.matches(names(&["item", "item"], &[])));
        assert!(expr.matches(names(&["item", "item", "item"], &[])));
        assert!(!expr.matches(names(&["item", "item", "item", "item"], &[])));
    }

    #[test]
    fn test_empty_expression_is_leaf() {
        let expr = ContentExpr::parse("").unwrap();
        assert!(expr.is_leaf());
        assert!(expr.matches(Vec::new()));
        assert!(!expr.matches(names(&["text"], &[])));
    }

    #[test]
    fn test_fill_end() {
        let expr = ContentExpr::parse("paragraph block*").unwrap();
        assert_eq!(expr.fill_end(&expr.start()), Some(vec!["paragraph".to_string()]));
        let star = ContentExpr::parse("inline*").unwrap();
        assert_eq!(star.fill_end(&star.start()), Some(Vec::new()));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            ContentExpr::parse("(block").unwrap_err(),
            ContentExprError::UnexpectedEnd
        );
        assert!(matches!(
            ContentExpr::parse("block{3,1}").unwrap_err(),
            ContentExprError::InvalidRange(_)
        ));
        assert!(matches!(
            ContentExpr::parse("block $").unwrap_err(),
            ContentExprError::InvalidCharacter(6)
        ));
    }
}

//! Dynamic-operator parser (C3).
//!
//! Implemented as a precedence-climbing descent over the token stream
//! rather than a literal shift/reduce table; the two are equivalent for
//! this grammar (`T → t | op T | T op | T op T`) and climbing reads more
//! naturally in Rust, matching the recursive-descent style of the
//! teacher's `interface::term_parser`.

pub mod clause;

use crate::arena::Arena;
use crate::error::{ParseError, ParseErrorKind};
use crate::intern::{Interner, Symbol};
use crate::lexer::Lexer;
use crate::term::{Term, VarId};
use crate::token::{Span, Token, TokenKind, VarName};
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OpType {
    Xfx,
    Xfy,
    Yfx,
    Fy,
    Fx,
    Xf,
    Yf,
}

impl OpType {
    fn is_prefix(self) -> bool {
        matches!(self, OpType::Fy | OpType::Fx)
    }
    fn is_infix(self) -> bool {
        matches!(self, OpType::Xfx | OpType::Xfy | OpType::Yfx)
    }
    fn is_postfix(self) -> bool {
        matches!(self, OpType::Xf | OpType::Yf)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OpDef {
    pub priority: u16,
    pub optype: OpType,
}

/// The operator table, keyed by name and fixity class. Prefix
/// and infix/postfix definitions for the same name coexist (e.g. unary and
/// binary `-`); postfix and infix for the *same* name do not.
pub struct OpTable {
    prefix: HashMap<String, OpDef>,
    infix: HashMap<String, OpDef>,
    postfix: HashMap<String, OpDef>,
}

impl OpTable {
    pub fn empty() -> Self {
        OpTable { prefix: HashMap::new(), infix: HashMap::new(), postfix: HashMap::new() }
    }

    /// The ISO default table.
    pub fn standard() -> Self {
        let mut t = OpTable::empty();
        let defs: &[(u16, OpType, &[&str])] = &[
            (1200, OpType::Xfx, &[":-", "-->"]),
            (1200, OpType::Fx, &[":-", "?-"]),
            (1100, OpType::Xfy, &[";", "|"]),
            (1050, OpType::Xfy, &["->", "*->"]),
            (1000, OpType::Xfy, &[","]),
            (990, OpType::Xfy, &[":="]),
            (900, OpType::Fy, &["\\+"]),
            (700, OpType::Xfx, &[
                "=", "\\=", "==", "\\==", "@<", "@=<", "@>", "@>=", "is", "=..", "<", ">",
                "=<", ">=", "=:=", "=\\=",
            ]),
            (500, OpType::Yfx, &["+", "-", "/\\", "\\/", "xor"]),
            (500, OpType::Fx, &["?"]),
            (400, OpType::Yfx, &["*", "/", "//", "mod", "rem", "div", "<<", ">>"]),
            (200, OpType::Xfy, &["**"]),
            (200, OpType::Xfx, &["^"]),
            (200, OpType::Fy, &["-", "+", "\\"]),
            (100, OpType::Yfx, &["."]),
            (1, OpType::Fx, &["$"]),
        ];
        for (priority, optype, names) in defs {
            for name in *names {
                t.define(*priority, *optype, name).expect("standard table is self-consistent");
            }
        }
        t
    }

    /// Defines or redefines `name` with `priority`/`optype`. Priority `0`
    /// removes the definition. Returns an error if `optype` is
    /// postfix and an infix definition already exists for `name`, or
    /// vice versa.
    pub fn define(&mut self, priority: u16, optype: OpType, name: &str) -> Result<(), String> {
        if optype.is_postfix() && self.infix.contains_key(name) {
            return Err(format!("'{name}' cannot be both infix and postfix"));
        }
        if optype.is_infix() && self.postfix.contains_key(name) {
            return Err(format!("'{name}' cannot be both infix and postfix"));
        }
        let table = if optype.is_prefix() {
            &mut self.prefix
        } else if optype.is_infix() {
            &mut self.infix
        } else {
            &mut self.postfix
        };
        if priority == 0 {
            table.remove(name);
        } else {
            table.insert(name.to_string(), OpDef { priority, optype });
        }
        Ok(())
    }

    pub fn prefix(&self, name: &str) -> Option<OpDef> {
        self.prefix.get(name).copied()
    }
    pub fn infix(&self, name: &str) -> Option<OpDef> {
        self.infix.get(name).copied()
    }
    pub fn postfix(&self, name: &str) -> Option<OpDef> {
        self.postfix.get(name).copied()
    }
}

impl Default for OpTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Per-clause variable scope: maps a source name to the [`VarId`] shared by
/// every occurrence, and records each id's display name for bindings
/// lookups.
#[derive(Default)]
struct VarScope {
    by_name: HashMap<Symbol, VarId>,
    names: Vec<Option<Symbol>>,
}

impl VarScope {
    fn named(&mut self, name: Symbol) -> VarId {
        if let Some(&id) = self.by_name.get(&name) {
            return id;
        }
        let id = VarId(self.names.len() as u32);
        self.names.push(Some(name));
        self.by_name.insert(name, id);
        id
    }

    fn anonymous(&mut self) -> VarId {
        let id = VarId(self.names.len() as u32);
        self.names.push(None);
        id
    }
}

pub struct Parser<'src, 'arena> {
    lexer: Lexer<'src>,
    lookahead: Option<Token>,
    arena: &'arena Arena<Term<'arena>>,
    ops: &'arena OpTable,
    scope: VarScope,
}

/// Maximum priority an argument of a functor call or a list element may
/// carry without parentheses (ISO `arg priority = 999`).
const ARG_PRIORITY: u16 = 999;
const MAX_PRIORITY: u16 = 1200;

impl<'src, 'arena> Parser<'src, 'arena> {
    pub fn new(src: &'src str, ops: &'arena OpTable, arena: &'arena Arena<Term<'arena>>) -> Self {
        Parser { lexer: Lexer::new(src), lookahead: None, arena, ops, scope: VarScope::default() }
    }

    fn peek(&mut self, interner: &mut Interner) -> Result<&Token, ParseError> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lexer.next_token(interner)?);
        }
        Ok(self.lookahead.as_ref().unwrap())
    }

    fn advance(&mut self, interner: &mut Interner) -> Result<Token, ParseError> {
        self.peek(interner)?;
        Ok(self.lookahead.take().unwrap())
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str, interner: &mut Interner) -> Result<Span, ParseError> {
        let tok = self.advance(interner)?;
        if &tok.kind == kind {
            Ok(tok.span)
        } else {
            Err(ParseError::unexpected(expected, &tok.kind, tok.span))
        }
    }

    /// Parses one sentence (a clause or query terminated by `.`),
    /// producing a single term per call. Returns `None` at
    /// end of input.
    pub fn next_term(&mut self, interner: &mut Interner) -> Result<Option<(Term<'arena>, VarScopeInfo)>, ParseError> {
        self.scope = VarScope::default();
        if matches!(self.peek(interner)?.kind, TokenKind::Eof) {
            return Ok(None);
        }
        let (term, _prio) = self.parse_expr(MAX_PRIORITY, interner)?;
        self.expect(&TokenKind::End, "'.'", interner)?;
        let info = VarScopeInfo { names: std::mem::take(&mut self.scope.names) };
        Ok(Some((term, info)))
    }

    fn name_of(&self, sym: Symbol, interner: &Interner) -> String {
        interner.resolve(sym).to_string()
    }

    /// Attempts to read an atom-shaped token (`Atom` or `Symbolic`) as a
    /// plain name, without consuming it. Used to look operators up before
    /// deciding fixity.
    fn atom_text<'a>(&self, tok: &TokenKind, interner: &'a Interner) -> Option<&'a str> {
        match tok {
            TokenKind::Atom(s) | TokenKind::Symbolic(s) => Some(interner.resolve(*s)),
            TokenKind::Comma => Some(","),
            TokenKind::Bar => Some("|"),
            _ => None,
        }
    }

    fn parse_expr(&mut self, max_prio: u16, interner: &mut Interner) -> Result<(Term<'arena>, u16), ParseError> {
        let (mut left, mut left_prio) = self.parse_primary(max_prio, interner)?;
        loop {
            let tok = self.peek(interner)?.clone();
            let Some(name) = self.atom_text(&tok.kind, interner) else { break };
            let name = name.to_string();
            let Some(def) = self.ops.infix(&name).or_else(|| self.ops.postfix(&name)) else { break };
            if def.priority > max_prio {
                break;
            }
            let left_max = match def.optype {
                OpType::Yfx | OpType::Yf => def.priority,
                _ => def.priority.saturating_sub(1),
            };
            if left_prio > left_max {
                break;
            }
            self.advance(interner)?;
            if def.optype.is_postfix() {
                let name_sym = interner.intern(&name);
                let args = self.arena.alloc_slice([left]);
                left = Term::Functor { name: name_sym, args };
                left_prio = def.priority;
                continue;
            }
            let right_max = match def.optype {
                OpType::Xfy => def.priority,
                _ => def.priority.saturating_sub(1),
            };
            let (right, _) = self.parse_expr(right_max, interner)?;
            let name_sym = interner.intern(&name);
            let args = self.arena.alloc_slice([left, right]);
            left = Term::Functor { name: name_sym, args };
            left_prio = def.priority;
        }
        Ok((left, left_prio))
    }

    fn parse_primary(&mut self, max_prio: u16, interner: &mut Interner) -> Result<(Term<'arena>, u16), ParseError> {
        let tok = self.advance(interner)?;
        match tok.kind {
            TokenKind::Int(v) => Ok((Term::Int(v), 0)),
            TokenKind::Real(v) => Ok((Term::Real(v), 0)),
            TokenKind::Str(s) => Ok((Term::Str(s), 0)),
            TokenKind::Var(VarName::Anonymous) => Ok((Term::Var(self.scope.anonymous()), 0)),
            TokenKind::Var(VarName::Named(s)) => Ok((Term::Var(self.scope.named(s)), 0)),
            TokenKind::LParen => {
                let (inner, _) = self.parse_expr(MAX_PRIORITY, interner)?;
                self.expect(&TokenKind::RParen, "')'", interner)?;
                Ok((inner, 0))
            }
            TokenKind::LBracket => self.parse_list(interner),
            TokenKind::LBrace => self.parse_curly(interner),
            TokenKind::Atom(s) | TokenKind::Symbolic(s) => self.parse_atom_or_prefix(s, max_prio, interner, tok.span),
            other => Err(ParseError::unexpected("a term", &other, tok.span)),
        }
    }

    fn parse_atom_or_prefix(
        &mut self,
        s: Symbol,
        max_prio: u16,
        interner: &mut Interner,
        span: Span,
    ) -> Result<(Term<'arena>, u16), ParseError> {
        if matches!(self.peek(interner)?.kind, TokenKind::LParenFunctor) {
            self.advance(interner)?;
            let args = self.parse_arg_list(interner)?;
            self.expect(&TokenKind::RParen, "')'", interner)?;
            let args = self.arena.alloc_slice(args);
            return Ok((Term::Functor { name: s, args }, 0));
        }

        let name = self.name_of(s, interner);

        // `- 1` folds into a negative literal; ordinary numeric negation
        // otherwise goes through the generic prefix-operator path below.
        if name == "-" {
            if let TokenKind::Int(v) = self.peek(interner)?.kind {
                self.advance(interner)?;
                return Ok((Term::Int(-v), 0));
            }
            if let TokenKind::Real(v) = self.peek(interner)?.kind {
                self.advance(interner)?;
                return Ok((Term::Real(-v), 0));
            }
        }

        if let Some(def) = self.ops.prefix(&name) {
            if def.priority <= max_prio && self.starts_a_term(interner)? {
                let right_max = match def.optype {
                    OpType::Fy => def.priority,
                    _ => def.priority.saturating_sub(1),
                };
                let (operand, _) = self.parse_expr(right_max, interner)?;
                let args = self.arena.alloc_slice([operand]);
                return Ok((Term::Functor { name: s, args }, def.priority));
            }
        }
        let _ = span;
        Ok((Term::Atom(s), 0))
    }

    /// True if the next token could begin a term — used to tell a prefix
    /// operator used as an operator from the same atom used bare (e.g.
    /// trailing `-` before `)` is the atom `-`, not an application).
    fn starts_a_term(&mut self, interner: &mut Interner) -> Result<bool, ParseError> {
        Ok(!matches!(
            self.peek(interner)?.kind,
            TokenKind::End
                | TokenKind::Eof
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Comma
                | TokenKind::Bar
        ))
    }

    fn parse_arg_list(&mut self, interner: &mut Interner) -> Result<Vec<Term<'arena>>, ParseError> {
        let mut args = Vec::new();
        if matches!(self.peek(interner)?.kind, TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            let (arg, _) = self.parse_expr(ARG_PRIORITY, interner)?;
            args.push(arg);
            if matches!(self.peek(interner)?.kind, TokenKind::Comma) {
                self.advance(interner)?;
                continue;
            }
            break;
        }
        Ok(args)
    }

    fn parse_list(&mut self, interner: &mut Interner) -> Result<(Term<'arena>, u16), ParseError> {
        if matches!(self.peek(interner)?.kind, TokenKind::RBracket) {
            self.advance(interner)?;
            let nil = interner.intern("nil");
            return Ok((Term::Atom(nil), 0));
        }
        let mut elems = Vec::new();
        loop {
            let (elem, _) = self.parse_expr(ARG_PRIORITY, interner)?;
            elems.push(elem);
            if matches!(self.peek(interner)?.kind, TokenKind::Comma) {
                self.advance(interner)?;
                continue;
            }
            break;
        }
        let tail = if matches!(self.peek(interner)?.kind, TokenKind::Bar) {
            self.advance(interner)?;
            let (t, _) = self.parse_expr(ARG_PRIORITY, interner)?;
            t
        } else {
            let nil = interner.intern("nil");
            Term::Atom(nil)
        };
        self.expect(&TokenKind::RBracket, "']'", interner)?;
        let mut list = tail;
        for elem in elems.into_iter().rev() {
            let head = self.arena.alloc(elem);
            let tail_ref = self.arena.alloc(list);
            list = Term::List { head, tail: tail_ref };
        }
        Ok((list, 0))
    }

    fn parse_curly(&mut self, interner: &mut Interner) -> Result<(Term<'arena>, u16), ParseError> {
        if matches!(self.peek(interner)?.kind, TokenKind::RBrace) {
            self.advance(interner)?;
            let sym = interner.intern("{}");
            return Ok((Term::Atom(sym), 0));
        }
        let (inner, _) = self.parse_expr(MAX_PRIORITY, interner)?;
        self.expect(&TokenKind::RBrace, "'}'", interner)?;
        let sym = interner.intern("{}");
        let args = self.arena.alloc_slice([inner]);
        Ok((Term::Functor { name: sym, args }, 0))
    }
}

/// The per-sentence variable table handed back alongside a parsed term,
/// consumed by [`clause`](crate::parser::clause) to build a [`crate::term::Clause`].
pub struct VarScopeInfo {
    pub names: Vec<Option<Symbol>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one<'a>(src: &str, arena: &'a Arena<Term<'a>>, interner: &mut Interner) -> Term<'a> {
        let ops = OpTable::standard();
        // leak the table for the 'a lifetime inside this test helper
        let ops: &'a OpTable = Box::leak(Box::new(ops));
        let mut parser = Parser::new(src, ops, arena);
        parser.next_term(interner).unwrap().unwrap().0
    }

    #[test]
    fn parses_plain_fact() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let t = parse_one("foo(bar, baz).", &arena, &mut interner);
        match t {
            Term::Functor { args, .. } => assert_eq!(args.len(), 2),
            other => panic!("expected functor, got {other:?}"),
        }
    }

    #[test]
    fn respects_infix_priority_and_associativity() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        // 1 + 2 * 3 should parse as 1 + (2 * 3): '*' binds tighter than '+'
        let t = parse_one("X = 1 + 2 * 3.", &arena, &mut interner);
        let Term::Functor { name, args } = t else { panic!("expected =/2") };
        assert_eq!(interner.resolve(name), "=");
        let Term::Functor { name: plus_name, args: plus_args } = args[1] else {
            panic!("expected +/2 on the right of =")
        };
        assert_eq!(interner.resolve(plus_name), "+");
        match plus_args[1] {
            Term::Functor { name, .. } => assert_eq!(interner.resolve(name), "*"),
            other => panic!("expected * term, got {other:?}"),
        }
    }

    #[test]
    fn yfx_is_left_associative() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        // 1 - 2 - 3 parses as (1 - 2) - 3
        let t = parse_one("X = 1 - 2 - 3.", &arena, &mut interner);
        let Term::Functor { args, .. } = t else { panic!() };
        let Term::Functor { name, args: minus_args } = args[1] else { panic!() };
        assert_eq!(interner.resolve(name), "-");
        assert!(matches!(minus_args[0], Term::Functor { .. }));
        assert!(matches!(minus_args[1], Term::Int(3)));
    }

    #[test]
    fn parses_list_with_tail() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let t = parse_one("X = [1,2|T].", &arena, &mut interner);
        let Term::Functor { args, .. } = t else { panic!() };
        assert!(matches!(args[1], Term::List { .. }));
    }

    #[test]
    fn negative_number_literal() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let t = parse_one("X = -5.", &arena, &mut interner);
        let Term::Functor { args, .. } = t else { panic!() };
        assert!(matches!(args[1], Term::Int(-5)));
    }

    #[test]
    fn same_precedence_xfx_without_brackets_errors() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let ops = OpTable::standard();
        let mut parser = Parser::new("X = Y = Z.", &ops, &arena);
        let result = parser.next_term(&mut interner);
        assert!(result.is_err());
    }

    #[test]
    fn defining_postfix_over_existing_infix_is_rejected() {
        let mut ops = OpTable::standard();
        assert!(ops.define(200, OpType::Xf, "+").is_err());
    }
}

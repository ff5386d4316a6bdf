//! Recursive-descent parser producing the predicate tree

use std::collections::BTreeSet;

use super::lexer::{Token, TokenKind, tokenize};
use super::predicate::{Expr, Field, MatchOp};
use crate::types::PacketKind;
use crate::{FeedError, Result};

/// Field names accepted in expressions, for error messages.
const FIELD_NAMES: &str = "from, to, call, type, text, path";

/// Deepest nesting of parentheses and negations accepted.
const MAX_DEPTH: usize = 64;

pub(crate) fn parse(input: &str) -> Result<Expr> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "*" {
        return Ok(Expr::All);
    }

    let tokens = tokenize(input)?;
    let end_column = input.chars().count() + 1;
    let mut parser = Parser { tokens, pos: 0, end_column, depth: 0 };

    let expr = parser.or_expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(FeedError::filter_syntax(
            token.column,
            format!("unexpected {}", describe(&token.kind)),
        )),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end_column: usize,
    depth: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Keyword {
    And,
    Or,
    Not,
}

fn keyword(kind: &TokenKind) -> Option<Keyword> {
    match kind {
        TokenKind::AndSymbol => Some(Keyword::And),
        TokenKind::OrSymbol => Some(Keyword::Or),
        TokenKind::NotSymbol => Some(Keyword::Not),
        TokenKind::Word(word) if word.eq_ignore_ascii_case("and") => Some(Keyword::And),
        TokenKind::Word(word) if word.eq_ignore_ascii_case("or") => Some(Keyword::Or),
        TokenKind::Word(word) if word.eq_ignore_ascii_case("not") => Some(Keyword::Not),
        _ => None,
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::LParen => "'('".into(),
        TokenKind::RParen => "')'".into(),
        TokenKind::Equals => "'='".into(),
        TokenKind::Tilde => "'~'".into(),
        TokenKind::Comma => "','".into(),
        TokenKind::AndSymbol => "'&&'".into(),
        TokenKind::OrSymbol => "'||'".into(),
        TokenKind::NotSymbol => "'!'".into(),
        TokenKind::Word(word) => format!("'{word}'"),
        TokenKind::Quoted(value) => format!("\"{value}\""),
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_keyword(&mut self, wanted: Keyword) -> bool {
        match self.peek() {
            Some(token) if keyword(&token.kind) == Some(wanted) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn unexpected_end(&self, expected: &str) -> FeedError {
        FeedError::filter_syntax(self.end_column, format!("expected {expected}, found end of input"))
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut terms = vec![self.and_expr()?];
        while self.eat_keyword(Keyword::Or) {
            terms.push(self.and_expr()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { Expr::Or(terms) })
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut terms = vec![self.unary()?];
        while self.eat_keyword(Keyword::And) {
            terms.push(self.unary()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { Expr::And(terms) })
    }

    /// Enter one level of nesting; `column` is where it opens.
    fn descend(&mut self, column: usize) -> Result<()> {
        if self.depth == MAX_DEPTH {
            return Err(FeedError::filter_syntax(
                column,
                format!("expression nested too deeply (limit {MAX_DEPTH})"),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn unary(&mut self) -> Result<Expr> {
        let column = self.peek().map_or(self.end_column, |token| token.column);
        if self.eat_keyword(Keyword::Not) {
            self.descend(column)?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }

        let token = self.advance().ok_or_else(|| self.unexpected_end("a filter term"))?;
        match token.kind {
            TokenKind::LParen => {
                self.descend(token.column)?;
                let inner = self.or_expr()?;
                self.depth -= 1;
                match self.advance() {
                    Some(Token { kind: TokenKind::RParen, .. }) => Ok(inner),
                    Some(other) => Err(FeedError::filter_syntax(
                        other.column,
                        format!("expected ')', found {}", describe(&other.kind)),
                    )),
                    None => Err(self.unexpected_end("')'")),
                }
            }
            TokenKind::Word(ref name) if keyword(&token.kind).is_none() => {
                self.term(name, token.column)
            }
            other => Err(FeedError::filter_syntax(
                token.column,
                format!("expected a filter term, found {}", describe(&other)),
            )),
        }
    }

    fn term(&mut self, name: &str, column: usize) -> Result<Expr> {
        let field = match name.to_ascii_lowercase().as_str() {
            "from" => Some(Field::From),
            "to" => Some(Field::To),
            "call" => Some(Field::Call),
            "text" => Some(Field::Text),
            "path" => Some(Field::Path),
            "type" => None,
            _ => {
                return Err(FeedError::filter_syntax(
                    column,
                    format!("unknown field '{name}' (expected one of {FIELD_NAMES})"),
                ));
            }
        };

        let op_token = self.advance().ok_or_else(|| self.unexpected_end("'=' or '~'"))?;
        let op = match op_token.kind {
            TokenKind::Equals => MatchOp::Exact,
            TokenKind::Tilde => MatchOp::Contains,
            other => {
                return Err(FeedError::filter_syntax(
                    op_token.column,
                    format!("expected '=' or '~' after '{name}', found {}", describe(&other)),
                ));
            }
        };

        let values = self.values()?;

        match field {
            Some(field) => {
                let values = values.into_iter().map(|(value, _)| value).collect();
                Ok(Expr::Match { field, op, values })
            }
            None => {
                if op != MatchOp::Exact {
                    return Err(FeedError::filter_syntax(
                        op_token.column,
                        "'type' only supports '='",
                    ));
                }
                let mut kinds = BTreeSet::new();
                for (value, value_column) in values {
                    let kind = PacketKind::from_name(&value).ok_or_else(|| {
                        FeedError::filter_syntax(
                            value_column,
                            format!(
                                "unknown packet type '{value}' (expected position, message, status, telemetry or other)"
                            ),
                        )
                    })?;
                    kinds.insert(kind);
                }
                Ok(Expr::Kinds(kinds))
            }
        }
    }

    /// One or more comma-separated values.
    fn values(&mut self) -> Result<Vec<(String, usize)>> {
        let mut values = vec![self.value()?];
        while matches!(self.peek(), Some(Token { kind: TokenKind::Comma, .. })) {
            self.pos += 1;
            values.push(self.value()?);
        }
        Ok(values)
    }

    fn value(&mut self) -> Result<(String, usize)> {
        let token = self.advance().ok_or_else(|| self.unexpected_end("a value"))?;
        match token.kind {
            TokenKind::Word(word) => Ok((word, token.column)),
            TokenKind::Quoted(value) if !value.is_empty() => Ok((value, token.column)),
            TokenKind::Quoted(_) => Err(FeedError::filter_syntax(token.column, "empty value")),
            other => Err(FeedError::filter_syntax(
                token.column,
                format!("expected a value, found {}", describe(&other)),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_match(field: Field, op: MatchOp, value: &str) -> Expr {
        Expr::Match { field, op, values: vec![value.to_string()] }
    }

    #[test]
    fn empty_and_star_match_all() {
        assert_eq!(parse("").unwrap(), Expr::All);
        assert_eq!(parse("   ").unwrap(), Expr::All);
        assert_eq!(parse(" * ").unwrap(), Expr::All);
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("from=A or from=B and not to=C").unwrap();
        assert_eq!(
            expr,
            Expr::Or(vec![
                text_match(Field::From, MatchOp::Exact, "A"),
                Expr::And(vec![
                    text_match(Field::From, MatchOp::Exact, "B"),
                    Expr::Not(Box::new(text_match(Field::To, MatchOp::Exact, "C"))),
                ]),
            ])
        );
    }

    #[test]
    fn parentheses_and_symbol_aliases() {
        let expr = parse("!(path~WIDE || text~\"hello\")").unwrap();
        assert_eq!(
            expr,
            Expr::Not(Box::new(Expr::Or(vec![
                text_match(Field::Path, MatchOp::Contains, "WIDE"),
                text_match(Field::Text, MatchOp::Contains, "hello"),
            ])))
        );
    }

    #[test]
    fn type_sets() {
        let expr = parse("TYPE = message, Status").unwrap();
        assert_eq!(expr, Expr::Kinds(BTreeSet::from([PacketKind::Message, PacketKind::Status])));
    }

    #[test]
    fn keywords_are_values_after_operator() {
        let expr = parse("text~and").unwrap();
        assert_eq!(expr, text_match(Field::Text, MatchOp::Contains, "and"));
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let parens = format!("{}from=A{}", "(".repeat(100_000), ")".repeat(100_000));
        let bangs = format!("{}from=A", "! ".repeat(200_000));
        let nots = format!("{}from=A", "not ".repeat(100_000));

        for (input, column) in [(parens, MAX_DEPTH + 1), (bangs, 2 * MAX_DEPTH + 1), (nots, 4 * MAX_DEPTH + 1)] {
            match parse(&input) {
                Err(FeedError::FilterSyntax { position, message }) => {
                    assert_eq!(position, column);
                    assert!(message.contains("nested too deeply"), "{message}");
                }
                other => panic!("expected a syntax error, got {other:?}"),
            }
        }
    }

    #[test]
    fn nesting_up_to_the_limit_is_accepted() {
        let input = format!("{}from=A{}", "(".repeat(MAX_DEPTH / 2), ")".repeat(MAX_DEPTH / 2));
        let input = format!("{}{input}", "not ".repeat(MAX_DEPTH / 2));
        let mut expr = parse(&input).unwrap();
        for _ in 0..MAX_DEPTH / 2 {
            expr = match expr {
                Expr::Not(inner) => *inner,
                other => panic!("expected a negation, got {other:?}"),
            };
        }
        assert_eq!(expr, text_match(Field::From, MatchOp::Exact, "A"));
    }

    #[test]
    fn syntax_errors_report_columns() {
        let cases: [(&str, usize); 10] = [
            ("frm=N0CALL", 1),
            ("from N0CALL", 6),
            ("from=", 6),
            ("from=A and", 11),
            ("(from=A", 8),
            ("from=A)", 7),
            ("type~message", 5),
            ("type=weather", 6),
            ("from=A from=B", 8),
            ("text=\"\"", 6),
        ];

        for (input, column) in cases {
            match parse(input) {
                Err(FeedError::FilterSyntax { position, .. }) => {
                    assert_eq!(position, column, "column for {input:?}")
                }
                other => panic!("{input:?} should fail, got {other:?}"),
            }
        }
    }
}

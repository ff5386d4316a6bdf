//! Tokenizer for filter expressions

use crate::{FeedError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    LParen,
    RParen,
    /// `=`
    Equals,
    /// `~`
    Tilde,
    Comma,
    /// `&&`
    AndSymbol,
    /// `||`
    OrSymbol,
    /// `!`
    NotSymbol,
    /// Bare word; keywords are recognised by the parser
    Word(String),
    /// Double-quoted string with escapes resolved
    Quoted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// 1-based character column of the token start
    pub column: usize,
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '=' | '~' | ',' | '!' | '&' | '|' | '"')
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().enumerate().peekable();

    while let Some((index, c)) = chars.next() {
        let column = index + 1;
        let kind = match c {
            c if c.is_whitespace() => continue,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '=' => TokenKind::Equals,
            '~' => TokenKind::Tilde,
            ',' => TokenKind::Comma,
            '!' => TokenKind::NotSymbol,
            '&' | '|' => {
                if chars.next_if(|&(_, next)| next == c).is_none() {
                    return Err(FeedError::filter_syntax(
                        column,
                        format!("expected '{c}{c}', found a single '{c}'"),
                    ));
                }
                if c == '&' { TokenKind::AndSymbol } else { TokenKind::OrSymbol }
            }
            '"' => {
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, next)) = chars.next() {
                    match next {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(FeedError::filter_syntax(column, "unterminated string"));
                }
                TokenKind::Quoted(value)
            }
            c => {
                let mut word = String::from(c);
                while let Some((_, next)) = chars.next_if(|&(_, next)| is_word_char(next)) {
                    word.push(next);
                }
                TokenKind::Word(word)
            }
        };
        tokens.push(Token { kind, column });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_terms_and_operators() {
        assert_eq!(
            kinds("from=N0CALL-9 && !(text~\"hi there\")"),
            vec![
                TokenKind::Word("from".into()),
                TokenKind::Equals,
                TokenKind::Word("N0CALL-9".into()),
                TokenKind::AndSymbol,
                TokenKind::NotSymbol,
                TokenKind::LParen,
                TokenKind::Word("text".into()),
                TokenKind::Tilde,
                TokenKind::Quoted("hi there".into()),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn tracks_columns() {
        let tokens = tokenize("  type = message").unwrap();
        let columns: Vec<_> = tokens.iter().map(|t| t.column).collect();
        assert_eq!(columns, vec![3, 8, 10]);
    }

    #[test]
    fn resolves_escapes_in_quotes() {
        assert_eq!(kinds(r#""say \"hi\"""#), vec![TokenKind::Quoted("say \"hi\"".into())]);
    }

    #[test]
    fn reports_lexical_errors() {
        let err = tokenize("text~\"open").unwrap_err();
        assert!(matches!(err, FeedError::FilterSyntax { position: 6, .. }), "{err:?}");

        let err = tokenize("a=b & c=d").unwrap_err();
        assert!(matches!(err, FeedError::FilterSyntax { position: 5, .. }), "{err:?}");
    }
}

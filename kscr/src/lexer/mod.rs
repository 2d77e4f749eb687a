//! Lexer implementation using logos

mod token;

pub use token::Token;

use crate::error::{CompileError, Result};
use crate::span::Span;
use logos::Logos;

/// Tokenize source code
pub fn tokenize(source: &str) -> Result<Vec<(Token, Span)>> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        let span = Span::new(lexer.span().start, lexer.span().end);
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(_) => {
                return Err(CompileError::lexer(
                    format!("unexpected character: {:?}", lexer.slice()),
                    span,
                ));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_empty() {
        let tokens = tokenize("").unwrap();
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_tokenize_spans() {
        let tokens = tokenize("int x = 5;").unwrap();
        let spans: Vec<_> = tokens.iter().map(|(_, s)| (s.start, s.end)).collect();
        assert_eq!(spans, vec![(0, 3), (4, 5), (6, 7), (8, 9), (9, 10)]);
    }

    #[test]
    fn test_tokenize_operators() {
        let tokens = tokenize("+ - * / % ^").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(
            kinds,
            vec![Token::Plus, Token::Minus, Token::Star, Token::Slash, Token::Percent, Token::Caret]
        );
    }

    #[test]
    fn test_tokenize_comparison_operators() {
        let tokens = tokenize("== != < > <= >=").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(
            kinds,
            vec![Token::EqEq, Token::NotEq, Token::Lt, Token::Gt, Token::LtEq, Token::GtEq]
        );
    }

    #[test]
    fn test_tokenize_invalid_character() {
        let err = tokenize("int x = #;").unwrap_err();
        assert_eq!(err.span(), Some(Span::new(8, 9)));
        assert!(err.message().contains('#'));
    }

    #[test]
    fn test_token_stream_snapshot() {
        let tokens = tokenize("return a ?? 2 + 3;").unwrap();
        let rendered: Vec<String> = tokens.iter().map(|(t, s)| format!("{t:?}@{s}")).collect();
        insta::assert_snapshot!(rendered.join("\n"), @r###"
        Return@0..6
        Ident("a")@7..8
        QuestionQuestion@9..11
        NumLit("2")@12..13
        Plus@14..15
        NumLit("3")@16..17
        Semi@17..18
        "###);
    }
}

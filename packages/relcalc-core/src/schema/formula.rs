//! Aggregation formulas.
//!
//! A formula is a single aggregate call over one relation hop:
//!
//! ```text
//! sum(orders.amount)
//! concat(customers.name, " / ")
//! count(orders)
//! ```
//!
//! Identifiers are column ids. Paths deeper than `relation.field` are
//! rejected; there is no arithmetic and no cell references.

use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

use crate::aggregate::AggregateFunction;
use crate::row::ColumnId;

/// Formula parse errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Formula is empty")]
    Empty,

    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Expected {expected}, found {found}")]
    UnexpectedToken { expected: &'static str, found: String },

    #[error("Unterminated string literal")]
    UnterminatedString,

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Path '{0}' crosses more than one relation")]
    MultiHop(String),

    #[error("{0} requires a target field")]
    MissingField(AggregateFunction),

    #[error("{0} does not take a separator")]
    SeparatorNotAllowed(AggregateFunction),
}

/// A parsed aggregation formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    /// Source text
    pub expression: String,
    /// Aggregate applied to the linked rows
    pub function: AggregateFunction,
    /// Relation column on the same table
    pub relation_column_id: ColumnId,
    /// Column in the target table (None only for `count`)
    pub target_field_id: Option<ColumnId>,
    /// Separator for `concat`
    pub separator: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    Dot,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("identifier '{}'", s),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Dot => "'.'".to_string(),
        }
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '-'
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<CharIndices<'_>> = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(FormulaError::UnterminatedString);
                }
                tokens.push(Token::Str(value));
            }
            c if is_ident_char(c) => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !is_ident_char(c) {
                        break;
                    }
                    ident.push(c);
                    chars.next();
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(FormulaError::UnexpectedChar { ch: other, pos }),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: std::vec::IntoIter<Token>,
}

impl Parser {
    fn next_or_end(&mut self) -> Result<Token, FormulaError> {
        self.tokens.next().ok_or(FormulaError::UnexpectedToken {
            expected: "more input",
            found: "end of formula".to_string(),
        })
    }

    fn expect(&mut self, expected: Token, label: &'static str) -> Result<(), FormulaError> {
        let token = self.next_or_end()?;
        if token == expected {
            Ok(())
        } else {
            Err(FormulaError::UnexpectedToken {
                expected: label,
                found: token.describe(),
            })
        }
    }

    fn ident(&mut self, label: &'static str) -> Result<String, FormulaError> {
        match self.next_or_end()? {
            Token::Ident(name) => Ok(name),
            other => Err(FormulaError::UnexpectedToken {
                expected: label,
                found: other.describe(),
            }),
        }
    }
}

impl Formula {
    /// Parses a formula expression.
    pub fn parse(expression: &str) -> Result<Self, FormulaError> {
        if expression.trim().is_empty() {
            return Err(FormulaError::Empty);
        }
        let mut parser = Parser {
            tokens: tokenize(expression)?.into_iter(),
        };

        let name = parser.ident("function name")?;
        let function = AggregateFunction::from_name(&name)
            .ok_or_else(|| FormulaError::UnknownFunction(name.clone()))?;
        parser.expect(Token::LParen, "'('")?;

        let mut path = vec![parser.ident("relation column")?];
        let mut separator = None;
        loop {
            match parser.next_or_end()? {
                Token::Dot => path.push(parser.ident("field name")?),
                Token::Comma => {
                    match parser.next_or_end()? {
                        Token::Str(s) => separator = Some(s),
                        other => {
                            return Err(FormulaError::UnexpectedToken {
                                expected: "separator string",
                                found: other.describe(),
                            })
                        }
                    }
                    parser.expect(Token::RParen, "')'")?;
                    break;
                }
                Token::RParen => break,
                other => {
                    return Err(FormulaError::UnexpectedToken {
                        expected: "'.', ',' or ')'",
                        found: other.describe(),
                    })
                }
            }
        }
        if let Some(extra) = parser.tokens.next() {
            return Err(FormulaError::UnexpectedToken {
                expected: "end of formula",
                found: extra.describe(),
            });
        }

        if path.len() > 2 {
            return Err(FormulaError::MultiHop(path.join(".")));
        }
        let mut path = path.into_iter();
        let relation_column_id = ColumnId::new(path.next().unwrap_or_default());
        let target_field_id = path.next().map(ColumnId::new);

        if target_field_id.is_none() && function != AggregateFunction::Count {
            return Err(FormulaError::MissingField(function));
        }
        if separator.is_some() && function != AggregateFunction::Concat {
            return Err(FormulaError::SeparatorNotAllowed(function));
        }

        Ok(Self {
            expression: expression.to_string(),
            function,
            relation_column_id,
            target_field_id,
            separator,
        })
    }
}

//! FILENAME: core/mdx-parser/src/parser.rs
//! PURPOSE: Clause parser that converts a stream of Tokens into a PartialQuery.
//! CONTEXT: Second stage of the parsing pipeline. The helper language is a flat
//! list of clauses separated by semicolons; the first identifier of each clause
//! selects the clause kind (case-insensitive).
//!
//! GRAMMAR:
//!   helper      --> clause ( ";" clause )* ";"?
//!   clause      --> "MEASURES" name_list
//!                 | "ROWS" axis_list
//!                 | "COLUMNS" axis_list
//!                 | "SLICE" axis "=" scalar
//!                 | "DICE" axis "IN" "(" scalar_list ")"
//!                 | "FILTER" axis op scalar
//!                 | "DRILL" IDENT IDENT ("->" | "to") IDENT [ "PATH" scalar_list ]
//!                 | "ROLLUP" IDENT IDENT
//!   axis        --> IDENT ( "." IDENT )?
//!   axis_list   --> axis ( "," axis )*
//!   name_list   --> IDENT ( "," IDENT )*
//!   scalar_list --> scalar ( "," scalar )*
//!   scalar      --> NUMBER | STRING | IDENT+
//!   op          --> "=" | "!=" | ">" | ">=" | "<" | "<="

use crate::ast::{
    AxisRef, ComparisonOp, DrillClause, FilterClause, PartialQuery, RollupClause, ScalarLit,
};
use crate::lexer::Lexer;
use crate::token::Token;

/// Parser errors with descriptive messages.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parses a full helper string into a PartialQuery.
pub fn parse(input: &str) -> ParseResult<PartialQuery> {
    Parser::new(input).parse()
}

/// The Parser struct holds the lexer and current token state.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser from an input string.
    /// Automatically advances to the first token.
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token();
        Parser {
            lexer,
            current_token,
        }
    }

    /// Parses the entire input and returns the accumulated PartialQuery.
    pub fn parse(&mut self) -> ParseResult<PartialQuery> {
        let mut query = PartialQuery::default();

        loop {
            // Skip empty clauses (";;", trailing ";")
            while self.current_token == Token::Semicolon {
                self.advance();
            }
            if self.current_token == Token::EOF {
                break;
            }

            self.parse_clause(&mut query)?;

            match &self.current_token {
                Token::Semicolon => self.advance(),
                Token::EOF => break,
                other => {
                    return Err(ParseError::new(format!(
                        "Expected ';' or end of input after clause, found {}",
                        other
                    )))
                }
            }
        }

        Ok(query)
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        self.current_token = self.lexer.next_token();
    }

    /// Checks if the current token matches the expected token.
    /// If it matches, advances and returns Ok. Otherwise returns an error.
    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current_token == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(format!(
                "Expected {}, found {}",
                expected, self.current_token
            )))
        }
    }

    /// Consumes the current token as an identifier and returns its text.
    fn expect_identifier(&mut self, what: &str) -> ParseResult<String> {
        match &self.current_token {
            Token::Identifier(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            other => Err(ParseError::new(format!(
                "Expected {}, found {}",
                what, other
            ))),
        }
    }

    // ========================================================================
    // CLAUSES
    // ========================================================================

    fn parse_clause(&mut self, query: &mut PartialQuery) -> ParseResult<()> {
        let keyword = self
            .current_token
            .as_identifier()
            .map(str::to_ascii_uppercase)
            .ok_or_else(|| {
                ParseError::new(format!(
                    "Expected clause keyword, found {}",
                    self.current_token
                ))
            })?;
        self.advance();

        match keyword.as_str() {
            "MEASURES" => {
                query.measures = self.parse_name_list()?;
                Ok(())
            }
            "ROWS" => {
                query.rows = self.parse_axis_list()?;
                Ok(())
            }
            "COLUMNS" => {
                query.columns = self.parse_axis_list()?;
                Ok(())
            }
            "SLICE" => {
                let clause = self.parse_slice()?;
                query.slices.push(clause);
                Ok(())
            }
            "DICE" => {
                let clause = self.parse_dice()?;
                query.dices.push(clause);
                Ok(())
            }
            "FILTER" => {
                let clause = self.parse_filter()?;
                query.filters.push(clause);
                Ok(())
            }
            "DRILL" => {
                query.drill = Some(self.parse_drill()?);
                Ok(())
            }
            "ROLLUP" => {
                query.rollup = Some(self.parse_rollup()?);
                Ok(())
            }
            other => Err(ParseError::new(format!("Unknown clause keyword: {}", other))),
        }
    }

    /// MEASURES revenue, units
    fn parse_name_list(&mut self) -> ParseResult<Vec<String>> {
        let mut names = Vec::new();
        // An empty measure list is tolerated; the structured payload is
        // validated after the merge.
        if self.at_clause_end() {
            return Ok(names);
        }
        loop {
            names.push(self.expect_identifier("a name")?);
            if self.current_token == Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        Ok(names)
    }

    /// ROWS time.year, geography.region
    fn parse_axis_list(&mut self) -> ParseResult<Vec<AxisRef>> {
        let mut axes = Vec::new();
        loop {
            axes.push(self.parse_axis()?);
            if self.current_token == Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        Ok(axes)
    }

    /// A `dim` or `dim.level` reference.
    fn parse_axis(&mut self) -> ParseResult<AxisRef> {
        let dimension = self.expect_identifier("a dimension name")?;
        let level = if self.current_token == Token::Dot {
            self.advance();
            Some(self.expect_identifier("a level name")?)
        } else {
            None
        };
        Ok(AxisRef { dimension, level })
    }

    /// SLICE geography.region = "North America"
    fn parse_slice(&mut self) -> ParseResult<FilterClause> {
        let axis = self.parse_axis()?;
        self.expect(Token::Equals)?;
        let value = self.parse_scalar()?;
        Ok(FilterClause {
            dimension: axis.dimension,
            level: axis.level,
            operator: ComparisonOp::Eq,
            values: vec![value],
        })
    }

    /// DICE product.category IN (Electronics, Furniture)
    fn parse_dice(&mut self) -> ParseResult<FilterClause> {
        let axis = self.parse_axis()?;
        let kw = self.expect_identifier("IN")?;
        if !kw.eq_ignore_ascii_case("in") {
            return Err(ParseError::new(format!("Expected IN, found {}", kw)));
        }
        self.expect(Token::LParen)?;
        let values = self.parse_scalar_list()?;
        self.expect(Token::RParen)?;
        if values.is_empty() {
            return Err(ParseError::new("DICE requires a non-empty value list"));
        }
        Ok(FilterClause {
            dimension: axis.dimension,
            level: axis.level,
            operator: ComparisonOp::In,
            values,
        })
    }

    /// FILTER time.year >= 2023
    fn parse_filter(&mut self) -> ParseResult<FilterClause> {
        let axis = self.parse_axis()?;
        let operator = match &self.current_token {
            Token::Equals => ComparisonOp::Eq,
            Token::NotEqual => ComparisonOp::Neq,
            Token::GreaterThan => ComparisonOp::Gt,
            Token::GreaterEqual => ComparisonOp::Gte,
            Token::LessThan => ComparisonOp::Lt,
            Token::LessEqual => ComparisonOp::Lte,
            other => {
                return Err(ParseError::new(format!(
                    "Unsupported filter operator: {}",
                    other
                )))
            }
        };
        self.advance();
        let value = self.parse_scalar()?;
        Ok(FilterClause {
            dimension: axis.dimension,
            level: axis.level,
            operator,
            values: vec![value],
        })
    }

    /// DRILL time year -> month PATH 2023
    /// The arrow may also be spelled `to`.
    fn parse_drill(&mut self) -> ParseResult<DrillClause> {
        let dimension = self.expect_identifier("a dimension name")?;
        let from_level = self.expect_identifier("a level name")?;

        let is_separator = match &self.current_token {
            Token::Arrow => true,
            Token::Identifier(s) => s.eq_ignore_ascii_case("to"),
            _ => false,
        };
        if !is_separator {
            return Err(ParseError::new(format!(
                "Expected -> or to in DRILL, found {}",
                self.current_token
            )));
        }
        self.advance();

        let to_level = self.expect_identifier("a level name")?;

        let mut path = Vec::new();
        let at_path = matches!(&self.current_token, Token::Identifier(s) if s.eq_ignore_ascii_case("path"));
        if at_path {
            self.advance();
            path = self.parse_scalar_list()?;
            if path.is_empty() {
                return Err(ParseError::new("PATH requires at least one value"));
            }
        }

        Ok(DrillClause {
            dimension,
            from_level,
            to_level,
            path,
        })
    }

    /// ROLLUP time quarter
    fn parse_rollup(&mut self) -> ParseResult<RollupClause> {
        let dimension = self.expect_identifier("a dimension name")?;
        let level = self.expect_identifier("a level name")?;
        Ok(RollupClause { dimension, level })
    }

    // ========================================================================
    // SCALARS
    // ========================================================================

    fn parse_scalar_list(&mut self) -> ParseResult<Vec<ScalarLit>> {
        let mut values = Vec::new();
        if self.at_clause_end() || self.current_token == Token::RParen {
            return Ok(values);
        }
        loop {
            values.push(self.parse_scalar()?);
            if self.current_token == Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        Ok(values)
    }

    /// A single scalar value. Quoted strings and numbers map directly;
    /// consecutive bare identifiers are joined with spaces so that
    /// `SLICE geography.region = North America` reads naturally.
    fn parse_scalar(&mut self) -> ParseResult<ScalarLit> {
        match self.current_token.clone() {
            Token::Number(n) => {
                self.advance();
                Ok(ScalarLit::Number(n))
            }
            Token::String(s) => {
                self.advance();
                Ok(ScalarLit::Text(s))
            }
            Token::Identifier(first) => {
                self.advance();
                let mut text = first;
                while let Token::Identifier(next) = &self.current_token {
                    text.push(' ');
                    text.push_str(next);
                    self.advance();
                }
                Ok(ScalarLit::Text(text))
            }
            other => Err(ParseError::new(format!(
                "Expected a scalar value, found {}",
                other
            ))),
        }
    }

    fn at_clause_end(&self) -> bool {
        matches!(self.current_token, Token::Semicolon | Token::EOF)
    }
}

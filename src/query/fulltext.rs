use std::fmt;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map, opt, verify},
    multi::separated_list1,
    sequence::{delimited, pair},
};
use crate::core::error::{Error, Result};

/// Parsed CMIS `CONTAINS()` expression.
///
/// Terms separated by whitespace are conjunctive, `OR` binds looser than the implicit
/// `AND`, a leading `-` negates a term and double quotes delimit a phrase.
#[derive(Debug, Clone, PartialEq)]
pub enum FullTextExpression {
    Word(String),
    Phrase(String),
    Not(Box<FullTextExpression>),
    And(Vec<FullTextExpression>),
    Or(Vec<FullTextExpression>),
}

impl FullTextExpression {
    pub fn parse(input: &str) -> Result<Self> {
        match all_consuming(delimited(multispace0, disjunction, multispace0)).parse(input) {
            Ok((_, expression)) => Ok(expression),
            Err(e) => Err(Error::query_compile(format!(
                "invalid full-text expression '{}': {}", input, e
            ))),
        }
    }
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && c != '"'
}

fn word(input: &str) -> IResult<&str, FullTextExpression> {
    map(
        verify(take_while1(is_word_char), |w: &str| w != "OR"),
        |w: &str| FullTextExpression::Word(w.to_string()),
    ).parse(input)
}

fn phrase(input: &str) -> IResult<&str, FullTextExpression> {
    map(
        delimited(char('"'), take_till(|c: char| c == '"'), char('"')),
        |p: &str| FullTextExpression::Phrase(p.to_string()),
    ).parse(input)
}

fn term(input: &str) -> IResult<&str, FullTextExpression> {
    map(pair(opt(char('-')), alt((phrase, word))), |(negated, t)| {
        if negated.is_some() {
            FullTextExpression::Not(Box::new(t))
        } else {
            t
        }
    }).parse(input)
}

fn conjunction(input: &str) -> IResult<&str, FullTextExpression> {
    map(separated_list1(multispace1, term), |mut terms| {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            FullTextExpression::And(terms)
        }
    }).parse(input)
}

fn disjunction(input: &str) -> IResult<&str, FullTextExpression> {
    map(
        separated_list1(delimited(multispace1, tag("OR"), multispace1), conjunction),
        |mut parts| {
            if parts.len() == 1 {
                parts.remove(0)
            } else {
                FullTextExpression::Or(parts)
            }
        },
    ).parse(input)
}

impl fmt::Display for FullTextExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FullTextExpression::Word(w) => f.write_str(w),
            FullTextExpression::Phrase(p) => write!(f, "\"{}\"", p),
            FullTextExpression::Not(inner) => write!(f, "-{}", inner),
            FullTextExpression::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
            FullTextExpression::Or(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" OR ")?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
        }
    }
}

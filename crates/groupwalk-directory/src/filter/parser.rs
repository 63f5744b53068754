//! Parser for OPATH-style recipient filters.
//!
//! Supported grammar (keywords and attribute names are case-insensitive):
//!
//! ```text
//! filter     := or_expr
//! or_expr    := and_expr ( "-or" and_expr )*
//! and_expr   := unary ( "-and" unary )*
//! unary      := "-not" unary | primary
//! primary    := "(" or_expr ")" | comparison
//! comparison := attribute ( "-eq" | "-ne" | "-like" | "-notlike" ) value
//! value      := 'single' | "double" | $null | bare-word
//! ```
//!
//! Quotes inside a quoted value are escaped by doubling them.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, multispace0, multispace1, none_of, satisfy},
    combinator::{all_consuming, map, not, value},
    error::{context, ContextError, ParseError},
    multi::many0,
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use super::{CompareOp, FilterValue, RecipientFilter};
use crate::error::{DirectoryError, DirectoryResult};

// ============ Helper Parsers ============

/// Parse a keyword that is not immediately followed by a word character.
fn keyword<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    kw: &'static str,
) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str, E> {
    terminated(tag_no_case(kw), not(satisfy(|c: char| c.is_alphanumeric() || c == '_')))
}

/// Parse an attribute name.
fn attribute<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, &'a str, E> {
    context(
        "attribute",
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.'),
    )(input)
}

fn operator<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, CompareOp, E> {
    context(
        "operator",
        alt((
            value(CompareOp::NotLike, keyword("-notlike")),
            value(CompareOp::Like, keyword("-like")),
            value(CompareOp::Eq, keyword("-eq")),
            value(CompareOp::Ne, keyword("-ne")),
        )),
    )(input)
}

// ============ Value Parsers ============

fn quoted<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    quote: char,
) -> impl FnMut(&'a str) -> IResult<&'a str, String, E> {
    let doubled: &'static str = if quote == '\'' { "''" } else { "\"\"" };
    let quote_set: &'static str = if quote == '\'' { "'" } else { "\"" };
    map(
        delimited(
            char(quote),
            many0(alt((value(quote, tag(doubled)), none_of(quote_set)))),
            char(quote),
        ),
        |chars: Vec<char>| chars.into_iter().collect(),
    )
}

fn bare_word<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, &'a str, E> {
    take_while1(|c: char| !c.is_whitespace() && c != '(' && c != ')' && c != '\'' && c != '"')(
        input,
    )
}

fn filter_value<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, FilterValue, E> {
    context(
        "value",
        alt((
            map(quoted('\''), FilterValue::Text),
            map(quoted('"'), FilterValue::Text),
            value(FilterValue::Null, keyword("$null")),
            map(bare_word, |s: &str| FilterValue::Text(s.to_string())),
        )),
    )(input)
}

// ============ Expression Parsers ============

fn comparison<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RecipientFilter, E> {
    context(
        "comparison",
        map(
            tuple((attribute, multispace1, operator, multispace1, filter_value)),
            |(attribute, _, op, _, value)| RecipientFilter::Compare {
                attribute: attribute.to_string(),
                op,
                value,
            },
        ),
    )(input)
}

fn primary<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RecipientFilter, E> {
    alt((
        delimited(
            terminated(char('('), multispace0),
            or_expr,
            preceded(multispace0, char(')')),
        ),
        comparison,
    ))(input)
}

fn unary<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RecipientFilter, E> {
    alt((
        map(preceded(terminated(keyword("-not"), multispace0), unary), |inner| {
            RecipientFilter::Not(Box::new(inner))
        }),
        primary,
    ))(input)
}

/// Parse `-and` chains (binds tighter than `-or`).
fn and_expr<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RecipientFilter, E> {
    let (rest, first) = unary(input)?;
    let (rest, others) = many0(preceded(
        delimited(multispace0, keyword("-and"), multispace0),
        unary,
    ))(rest)?;

    if others.is_empty() {
        Ok((rest, first))
    } else {
        let mut children = vec![first];
        children.extend(others);
        Ok((rest, RecipientFilter::And(children)))
    }
}

fn or_expr<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RecipientFilter, E> {
    let (rest, first) = and_expr(input)?;
    let (rest, others) = many0(preceded(
        delimited(multispace0, keyword("-or"), multispace0),
        and_expr,
    ))(rest)?;

    if others.is_empty() {
        Ok((rest, first))
    } else {
        let mut children = vec![first];
        children.extend(others);
        Ok((rest, RecipientFilter::Or(children)))
    }
}

fn filter_expr<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RecipientFilter, E> {
    delimited(multispace0, or_expr, multispace0)(input)
}

/// Parse a recipient filter expression.
pub fn parse_filter(input: &str) -> DirectoryResult<RecipientFilter> {
    match all_consuming(filter_expr::<nom::error::VerboseError<&str>>)(input) {
        Ok((_, filter)) => Ok(filter),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(DirectoryError::InvalidFilter {
            filter: input.to_string(),
            message: nom::error::convert_error(input, e),
        }),
        Err(nom::Err::Incomplete(_)) => Err(DirectoryError::InvalidFilter {
            filter: input.to_string(),
            message: "incomplete input".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compare(attribute: &str, op: CompareOp, value: &str) -> RecipientFilter {
        RecipientFilter::Compare {
            attribute: attribute.to_string(),
            op,
            value: FilterValue::Text(value.to_string()),
        }
    }

    // ========== Comparison Tests ==========

    #[test]
    fn test_parses_single_quoted_equality() {
        let filter = parse_filter("Department -eq 'Sales'").unwrap();
        assert_eq!(filter, compare("Department", CompareOp::Eq, "Sales"));
    }

    #[test]
    fn test_parses_double_quoted_and_bare_values() {
        assert_eq!(
            parse_filter(r#"Office -ne "New York""#).unwrap(),
            compare("Office", CompareOp::Ne, "New York")
        );
        assert_eq!(
            parse_filter("Title -like Eng*").unwrap(),
            compare("Title", CompareOp::Like, "Eng*")
        );
    }

    #[test]
    fn test_operators_are_case_insensitive() {
        assert_eq!(
            parse_filter("Title -NotLike '*Intern*'").unwrap(),
            compare("Title", CompareOp::NotLike, "*Intern*")
        );
        assert_eq!(
            parse_filter("Title -EQ 'x'").unwrap(),
            compare("Title", CompareOp::Eq, "x")
        );
    }

    #[test]
    fn test_doubled_quote_is_an_escape() {
        assert_eq!(
            parse_filter("Company -eq 'O''Reilly'").unwrap(),
            compare("Company", CompareOp::Eq, "O'Reilly")
        );
    }

    #[test]
    fn test_parses_null_value() {
        let filter = parse_filter("Manager -ne $null").unwrap();
        assert_eq!(
            filter,
            RecipientFilter::Compare {
                attribute: "Manager".to_string(),
                op: CompareOp::Ne,
                value: FilterValue::Null,
            }
        );
    }

    // ========== Boolean Operator Tests ==========

    #[test]
    fn test_and_binds_tighter_than_or() {
        let filter = parse_filter("A -eq 1 -or B -eq 2 -and C -eq 3").unwrap();
        assert_eq!(
            filter,
            RecipientFilter::Or(vec![
                compare("A", CompareOp::Eq, "1"),
                RecipientFilter::And(vec![
                    compare("B", CompareOp::Eq, "2"),
                    compare("C", CompareOp::Eq, "3"),
                ]),
            ])
        );
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let filter = parse_filter("(A -eq 1 -or B -eq 2) -and C -eq 3").unwrap();
        assert_eq!(
            filter,
            RecipientFilter::And(vec![
                RecipientFilter::Or(vec![
                    compare("A", CompareOp::Eq, "1"),
                    compare("B", CompareOp::Eq, "2"),
                ]),
                compare("C", CompareOp::Eq, "3"),
            ])
        );
    }

    #[test]
    fn test_not_applies_to_group() {
        let filter = parse_filter("-not(Department -eq 'HR')").unwrap();
        assert_eq!(
            filter,
            RecipientFilter::Not(Box::new(compare("Department", CompareOp::Eq, "HR")))
        );
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert!(parse_filter("  ( Department -eq 'Sales' )  ").is_ok());
    }

    // ========== Error Tests ==========

    #[test]
    fn test_rejects_missing_value() {
        let err = parse_filter("Department -eq").unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidFilter { .. }));
    }

    #[test]
    fn test_rejects_unknown_operator() {
        assert!(parse_filter("Department -gt 'Sales'").is_err());
    }

    #[test]
    fn test_rejects_unbalanced_parentheses() {
        assert!(parse_filter("(Department -eq 'Sales'").is_err());
        assert!(parse_filter("Department -eq 'Sales')").is_err());
    }

    #[test]
    fn test_rejects_empty_filter() {
        assert!(parse_filter("").is_err());
    }
}

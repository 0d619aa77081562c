use crate::error::{CompileError, CompileResult};
use crate::metadata::EntityResolver;
use crate::predicate::{Conjunction, IgnoreCase, Operator};

use super::{Direction, Order, QueryShape, QuerySpec, Token};

const PREFIXES: &[(&str, QueryShape)] = &[
    ("find", QueryShape::Select),
    ("read", QueryShape::Select),
    ("get", QueryShape::Select),
    ("query", QueryShape::Select),
    ("search", QueryShape::Select),
    ("stream", QueryShape::Select),
    ("count", QueryShape::Count),
    ("exists", QueryShape::Exists),
    ("delete", QueryShape::Delete),
    ("remove", QueryShape::Delete),
];

/// Operator keywords, matched as suffixes of a predicate part. Longer keywords must come
/// before any keyword they end with.
const KEYWORDS: &[(&str, Operator)] = &[
    ("IsNotNull", Operator::IsNotNull),
    ("NotNull", Operator::IsNotNull),
    ("IsNull", Operator::IsNull),
    ("Null", Operator::IsNull),
    ("IsLessThanEqual", Operator::LessThanEqual),
    ("LessThanEqual", Operator::LessThanEqual),
    ("IsLessThan", Operator::LessThan),
    ("LessThan", Operator::LessThan),
    ("IsGreaterThanEqual", Operator::GreaterThanEqual),
    ("GreaterThanEqual", Operator::GreaterThanEqual),
    ("IsGreaterThan", Operator::GreaterThan),
    ("GreaterThan", Operator::GreaterThan),
    ("IsBefore", Operator::Before),
    ("Before", Operator::Before),
    ("IsAfter", Operator::After),
    ("After", Operator::After),
    ("IsBetween", Operator::Between),
    ("Between", Operator::Between),
    ("IsNotLike", Operator::NotLike),
    ("NotLike", Operator::NotLike),
    ("IsLike", Operator::Like),
    ("Like", Operator::Like),
    ("IsStartingWith", Operator::StartingWith),
    ("StartingWith", Operator::StartingWith),
    ("StartsWith", Operator::StartingWith),
    ("IsEndingWith", Operator::EndingWith),
    ("EndingWith", Operator::EndingWith),
    ("EndsWith", Operator::EndingWith),
    ("IsNotContaining", Operator::NotContaining),
    ("NotContaining", Operator::NotContaining),
    ("NotContains", Operator::NotContaining),
    ("IsContaining", Operator::Containing),
    ("Containing", Operator::Containing),
    ("Contains", Operator::Containing),
    ("IsNotIn", Operator::NotIn),
    ("NotIn", Operator::NotIn),
    ("IsIn", Operator::In),
    ("In", Operator::In),
    ("IsNotEmpty", Operator::IsNotEmpty),
    ("NotEmpty", Operator::IsNotEmpty),
    ("IsEmpty", Operator::IsEmpty),
    ("Empty", Operator::IsEmpty),
    ("IsTrue", Operator::True),
    ("True", Operator::True),
    ("IsFalse", Operator::False),
    ("False", Operator::False),
    ("IsNear", Operator::Near),
    ("Near", Operator::Near),
    ("IsWithin", Operator::Within),
    ("Within", Operator::Within),
    ("MatchesRegex", Operator::Regex),
    ("Matches", Operator::Regex),
    ("Regex", Operator::Regex),
    ("Exists", Operator::Exists),
    ("IsNot", Operator::NegatingSimpleProperty),
    ("Not", Operator::NegatingSimpleProperty),
    ("Is", Operator::SimpleProperty),
    ("Equals", Operator::SimpleProperty),
];

/// A repository method name split into subject, predicate tokens and ordering.
///
/// ```text
/// findDistinctFirst3ByNameContainingIgnoreCaseAndAgeGreaterThanOrderByNameDesc
/// ^^^^ ^^^^^^^^^^^^^  ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ ^^^^^^^^^
/// shape   subject              predicate                            ordering
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartTree {
    pub shape: QueryShape,
    pub distinct: bool,
    pub limit: Option<u64>,
    pub tokens: Vec<Token>,
    pub sort: Vec<Order>,
}

impl PartTree {
    /// Parse `method`, resolving property names against `resolver`.
    pub fn parse(method: &str, resolver: &dyn EntityResolver) -> CompileResult<Self> {
        let (shape, rest) = PREFIXES
            .iter()
            .find_map(|&(prefix, shape)| {
                let rest = method.strip_prefix(prefix)?;
                starts_word(rest).then_some((shape, rest))
            })
            .ok_or_else(|| {
                CompileError::method_name(method, "expected a find/count/exists/delete prefix")
            })?;

        let (subject, predicate) = match find_keyword(rest, "By") {
            Some(at) => (&rest[..at], &rest[at + 2..]),
            None => (rest, ""),
        };
        let distinct = subject.contains("Distinct");
        let limit = parse_limit(method, subject)?;

        let (predicate, ordering) = match find_keyword(predicate, "OrderBy") {
            Some(at) => (&predicate[..at], Some(&predicate[at + 7..])),
            None => (predicate, None),
        };
        let (predicate, all_ignore_case) =
            strip_any(predicate, &["AllIgnoreCase", "AllIgnoringCase"]);

        let mut tokens = Vec::new();
        if !predicate.is_empty() {
            for (i, disjunct) in split_keyword(predicate, "Or").into_iter().enumerate() {
                for (j, part) in split_keyword(disjunct, "And").into_iter().enumerate() {
                    if part.is_empty() {
                        return Err(CompileError::method_name(method, "empty predicate part"));
                    }
                    let mut token = parse_part(method, part, resolver)?;
                    if all_ignore_case && token.ignore_case == IgnoreCase::Never {
                        token.ignore_case = IgnoreCase::WhenPossible;
                    }
                    token.conjunction = match (i, j) {
                        (0, 0) => None,
                        (_, 0) => Some(Conjunction::Or),
                        _ => Some(Conjunction::And),
                    };
                    tokens.push(token);
                }
            }
        }

        let sort = match ordering {
            Some(ordering) => parse_ordering(method, ordering, resolver)?,
            None => Vec::new(),
        };

        Ok(Self {
            shape,
            distinct,
            limit,
            tokens,
            sort,
        })
    }

    pub fn spec(&self) -> QuerySpec {
        QuerySpec {
            shape: self.shape,
            distinct: self.distinct,
            limit: self.limit,
            sort: self.sort.clone(),
        }
    }
}

/// Resolve a capitalized property expression such as `DepartmentName` or `Department_Name`
/// to a dotted path. Camel-case splits are tried with the longest head first.
pub fn resolve_path(source: &str, resolver: &dyn EntityResolver) -> Option<String> {
    if source.contains('_') {
        let path = source
            .split('_')
            .map(decapitalize)
            .collect::<Vec<_>>()
            .join(".");
        return resolver.property(&path).map(|_| path);
    }
    let words = camel_words(source);
    resolve_words(&words, "", resolver)
}

fn resolve_words(words: &[&str], prefix: &str, resolver: &dyn EntityResolver) -> Option<String> {
    for split in (1..=words.len()).rev() {
        let head = decapitalize(&words[..split].concat());
        let path = if prefix.is_empty() {
            head
        } else {
            format!("{prefix}.{head}")
        };
        if split == words.len() {
            if resolver.property(&path).is_some() {
                return Some(path);
            }
        } else if let Some(found) = resolve_words(&words[split..], &path, resolver) {
            return Some(found);
        }
    }
    None
}

fn parse_part(method: &str, part: &str, resolver: &dyn EntityResolver) -> CompileResult<Token> {
    let (part, ignore_case) = strip_any(part, &["IgnoreCase", "IgnoringCase"]);
    let ignore_case = if ignore_case {
        IgnoreCase::Always
    } else {
        IgnoreCase::Never
    };

    let candidates = KEYWORDS
        .iter()
        .filter(|(keyword, _)| part.len() > keyword.len() && part.ends_with(keyword))
        .map(|(keyword, operator)| (&part[..part.len() - keyword.len()], *operator))
        .chain(std::iter::once((part, Operator::SimpleProperty)));

    let mut first_source = None;
    for (source, operator) in candidates {
        first_source.get_or_insert(source);
        if let Some(path) = resolve_path(source, resolver) {
            return Ok(Token {
                property: path,
                operator,
                conjunction: None,
                ignore_case,
            });
        }
    }

    let source = first_source.unwrap_or(part);
    if source.is_empty() {
        return Err(CompileError::method_name(method, "predicate part without a property"));
    }
    Err(CompileError::UnknownProperty {
        entity: resolver.entity().name.clone(),
        path: decapitalize(source),
    })
}

fn parse_ordering(
    method: &str,
    ordering: &str,
    resolver: &dyn EntityResolver,
) -> CompileResult<Vec<Order>> {
    let mut orders = Vec::new();
    let mut rest = ordering;
    while !rest.is_empty() {
        let cut = ["Asc", "Desc"]
            .iter()
            .filter_map(|dir| find_keyword(rest, dir).map(|at| (at, *dir)))
            .min_by_key(|(at, _)| *at);
        let (source, direction, consumed) = match cut {
            Some((at, "Desc")) => (&rest[..at], Direction::Desc, at + 4),
            Some((at, _)) => (&rest[..at], Direction::Asc, at + 3),
            None => (rest, Direction::Asc, rest.len()),
        };
        if source.is_empty() {
            return Err(CompileError::method_name(method, "order clause without a property"));
        }
        let property =
            resolve_path(source, resolver).ok_or_else(|| CompileError::UnknownProperty {
                entity: resolver.entity().name.clone(),
                path: decapitalize(source),
            })?;
        orders.push(Order {
            property,
            direction,
        });
        rest = &rest[consumed..];
    }
    Ok(orders)
}

fn parse_limit(method: &str, subject: &str) -> CompileResult<Option<u64>> {
    for keyword in ["First", "Top"] {
        let Some(at) = find_keyword_loose(subject, keyword) else {
            continue;
        };
        let digits: String = subject[at + keyword.len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if digits.is_empty() {
            return Ok(Some(1));
        }
        let limit = digits
            .parse::<u64>()
            .map_err(|_| CompileError::method_name(method, "limit out of range"))?;
        if limit == 0 {
            return Err(CompileError::method_name(method, "limit must be positive"));
        }
        return Ok(Some(limit));
    }
    Ok(None)
}

fn starts_word(s: &str) -> bool {
    s.chars().next().is_none_or(|c| c.is_ascii_uppercase())
}

/// Position of `keyword` followed by an uppercase letter or the end of `s`.
fn find_keyword(s: &str, keyword: &str) -> Option<usize> {
    s.match_indices(keyword)
        .map(|(at, _)| at)
        .find(|at| starts_word(&s[at + keyword.len()..]))
}

/// Like [`find_keyword`] but also accepts a following digit (`First10`).
fn find_keyword_loose(s: &str, keyword: &str) -> Option<usize> {
    s.match_indices(keyword).map(|(at, _)| at).find(|at| {
        s[at + keyword.len()..]
            .chars()
            .next()
            .is_none_or(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    })
}

/// Split on `keyword` where it starts a new word. A trailing keyword stays part of the
/// last piece.
fn split_keyword<'s>(s: &'s str, keyword: &str) -> Vec<&'s str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(at) = find_keyword(rest, keyword).filter(|at| at + keyword.len() < rest.len()) {
        parts.push(&rest[..at]);
        rest = &rest[at + keyword.len()..];
    }
    parts.push(rest);
    parts
}

fn strip_any<'s>(s: &'s str, suffixes: &[&str]) -> (&'s str, bool) {
    suffixes
        .iter()
        .find_map(|suffix| s.strip_suffix(suffix))
        .map_or((s, false), |stripped| (stripped, true))
}

fn camel_words(s: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = 0;
    for (i, c) in s.char_indices().skip(1) {
        if c.is_uppercase() {
            words.push(&s[start..i]);
            start = i;
        }
    }
    if start < s.len() {
        words.push(&s[start..]);
    }
    words
}

/// `Name` -> `name`, while acronyms such as `URL` stay as they are.
fn decapitalize(s: &str) -> String {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(a), Some(b)) if a.is_uppercase() && b.is_uppercase() => s.to_string(),
        (Some(a), _) => a.to_lowercase().chain(s[a.len_utf8()..].chars()).collect(),
        (None, _) => String::new(),
    }
}

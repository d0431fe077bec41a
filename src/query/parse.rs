//! Path compiler — turns a query string into a step sequence.
//!
//! ```text
//! path       := [".."] segment ( ".." segment )*
//! segment    := shallow ( "." shallow )*
//! shallow    := "*" | identifier | "(@" prop-name op value ")"
//! op         := "==" | "!=" | "<" | "<=" | ">" | ">="
//! ```
//!
//! A `".."` separator makes the following step recursive (matched at any
//! depth); a `"."` separator keeps it among immediate children. A leading
//! `".."` makes the very first step recursive.

use crate::{Error, Result};
use super::expr::{CmpOp, QueryExpression, Step};

/// Compile a path string into steps.
pub fn compile(path: &str) -> Result<Vec<Step>> {
    let bytes = path.as_bytes();
    let mut pos = 0usize;
    let mut steps = Vec::new();

    let mut recursive = if path.starts_with("..") {
        pos += 2;
        true
    } else {
        false
    };

    loop {
        let (expr, end) = parse_shallow(path, pos)?;
        steps.push(Step { expr, recursive });
        pos = end;

        if pos >= bytes.len() {
            break;
        }
        // Check ".." before "." — the longer separator wins.
        if bytes[pos..].starts_with(b"..") {
            recursive = true;
            pos += 2;
        } else if bytes[pos] == b'.' {
            recursive = false;
            pos += 1;
        } else {
            // `pos` sits on a char boundary, but the char may be multi-byte.
            let got = path[pos..].chars().next().unwrap_or('?');
            return Err(syntax(pos, format!("expected '.' or '..', got '{got}'")));
        }
    }

    Ok(steps)
}

/// Parse one shallow predicate starting at `pos`. Returns the expression
/// and the position just past it.
fn parse_shallow(path: &str, pos: usize) -> Result<(QueryExpression, usize)> {
    let rest = &path[pos..];

    if rest.starts_with('(') {
        let Some(close) = rest.find(')') else {
            return Err(syntax(pos, "unterminated property predicate".into()));
        };
        let expr = parse_compare(&rest[1..close], pos + 1)?;
        return Ok((expr, pos + close + 1));
    }

    // Identifier or wildcard: everything up to the next separator. A dot
    // may not appear inside an identifier.
    let len = rest.find('.').unwrap_or(rest.len());
    let token = &rest[..len];
    if token.is_empty() {
        return Err(syntax(pos, "empty path segment".into()));
    }
    if token.contains('(') || token.contains(')') {
        return Err(syntax(pos, format!("malformed segment '{token}'")));
    }

    let expr = if token == "*" {
        QueryExpression::Wildcard
    } else {
        QueryExpression::Name(token.to_owned())
    };
    Ok((expr, pos + len))
}

/// Parse the inside of `(@name op value)` (parens already stripped).
fn parse_compare(body: &str, pos: usize) -> Result<QueryExpression> {
    let Some(body) = body.strip_prefix('@') else {
        return Err(syntax(pos, "property predicate must start with '@'".into()));
    };

    // Two-character operators first so "<=" does not lex as "<" + "=".
    const OPS: [(&str, CmpOp); 6] = [
        ("==", CmpOp::Eq),
        ("!=", CmpOp::Ne),
        ("<=", CmpOp::Le),
        (">=", CmpOp::Ge),
        ("<", CmpOp::Lt),
        (">", CmpOp::Gt),
    ];

    let (at, (sym, op)) = OPS
        .iter()
        .filter_map(|entry| body.find(entry.0).map(|at| (at, entry)))
        .min_by_key(|(at, entry)| (*at, std::cmp::Reverse(entry.0.len())))
        .ok_or_else(|| syntax(pos, format!("no comparison operator in '{body}'")))?;

    let name = body[..at].trim();
    let operand = body[at + sym.len()..].trim();
    if name.is_empty() {
        return Err(syntax(pos, "empty property name".into()));
    }
    if operand.is_empty() {
        return Err(syntax(pos, "empty comparison operand".into()));
    }

    Ok(QueryExpression::Compare {
        name: name.to_owned(),
        op: *op,
        operand: operand.to_owned(),
    })
}

fn syntax(position: usize, message: String) -> Error {
    Error::QuerySyntax { position, message: message.into() }
}

use crate::errors::{AppError, AppResult};
use crate::models::QueryLimits;
use std::collections::BTreeSet;

const MIN_MAX_ROWS: usize = 1;
const MAX_MAX_ROWS: usize = 100_000;
const MIN_TIMEOUT_MS: u64 = 50;
const MAX_TIMEOUT_MS: u64 = 60_000;
const MIN_QUERY_BYTES: usize = 64;
const MAX_QUERY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    With,
    Values,
    Explain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    pub sql: String,
    pub kind: StatementKind,
}

/// Gate in front of the ad-hoc SQL box. Only single read-only statements get
/// through; everything else is a `Forbidden` error naming the reason.
#[derive(Debug, Clone)]
pub struct QueryPolicy {
    limits: QueryLimits,
    forbidden_keywords: BTreeSet<&'static str>,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self::new(QueryLimits::default())
    }
}

impl QueryPolicy {
    pub fn new(limits: QueryLimits) -> Self {
        let forbidden_keywords = [
            "insert",
            "update",
            "delete",
            "upsert",
            "create",
            "alter",
            "drop",
            "truncate",
            "attach",
            "detach",
            "pragma",
            "vacuum",
            "reindex",
            "analyze",
            "begin",
            "commit",
            "rollback",
            "savepoint",
            "release",
        ]
        .into_iter()
        .collect();

        Self {
            limits,
            forbidden_keywords,
        }
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    pub fn validate_limits(limits: &QueryLimits) -> AppResult<()> {
        if !(MIN_MAX_ROWS..=MAX_MAX_ROWS).contains(&limits.max_rows) {
            return Err(AppError::Config(format!(
                "Row cap {} is out of allowed range ({}..={})",
                limits.max_rows, MIN_MAX_ROWS, MAX_MAX_ROWS
            )));
        }
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&limits.timeout_ms) {
            return Err(AppError::Config(format!(
                "Query timeout {}ms is out of allowed range ({}..={})",
                limits.timeout_ms, MIN_TIMEOUT_MS, MAX_TIMEOUT_MS
            )));
        }
        if !(MIN_QUERY_BYTES..=MAX_QUERY_BYTES).contains(&limits.max_query_bytes) {
            return Err(AppError::Config(format!(
                "Query size limit {} bytes is out of allowed range ({}..={})",
                limits.max_query_bytes, MIN_QUERY_BYTES, MAX_QUERY_BYTES
            )));
        }
        Ok(())
    }

    pub fn validate(&self, raw_sql: &str) -> AppResult<ValidatedQuery> {
        if raw_sql.len() > self.limits.max_query_bytes {
            return Err(AppError::Forbidden(format!(
                "Query is {} bytes; the limit is {}",
                raw_sql.len(),
                self.limits.max_query_bytes
            )));
        }

        let mut tokens = tokenize(raw_sql)?;
        while matches!(tokens.last(), Some(token) if token.kind == TokenKind::Semicolon) {
            tokens.pop();
        }
        let Some(last) = tokens.last() else {
            return Err(AppError::Forbidden(
                "Query is empty; submit one SELECT, WITH, VALUES or EXPLAIN statement".to_string(),
            ));
        };
        let statement_end = last.end;

        if tokens.iter().any(|token| token.kind == TokenKind::Semicolon) {
            return Err(AppError::Forbidden(
                "Multiple statements are not allowed; submit exactly one read-only statement".to_string(),
            ));
        }

        for (index, token) in tokens.iter().enumerate() {
            let TokenKind::Word(word) = &token.kind else {
                continue;
            };
            if self.forbidden_keywords.contains(word.as_str()) {
                return Err(AppError::Forbidden(format!("Mutating keyword `{}` is not allowed", word)));
            }
            if word == "replace" {
                let is_function_call =
                    matches!(tokens.get(index + 1), Some(next) if next.kind == TokenKind::OpenParen);
                if !is_function_call {
                    return Err(AppError::Forbidden("Mutating keyword `replace` is not allowed".to_string()));
                }
            }
        }

        let kind = statement_kind(&tokens)?;
        Ok(ValidatedQuery {
            sql: raw_sql[..statement_end].trim().to_string(),
            kind,
        })
    }
}

fn statement_kind(tokens: &[Token]) -> AppResult<StatementKind> {
    let words = tokens
        .iter()
        .take(4)
        .map(|token| match &token.kind {
            TokenKind::Word(word) => word.as_str(),
            _ => "",
        })
        .collect::<Vec<_>>();

    let leading = |word: &str| match word {
        "select" => Some(StatementKind::Select),
        "with" => Some(StatementKind::With),
        "values" => Some(StatementKind::Values),
        _ => None,
    };

    match words.first().copied() {
        Some("explain") => {
            let inner = if words.get(1) == Some(&"query") && words.get(2) == Some(&"plan") {
                words.get(3).copied()
            } else {
                words.get(1).copied()
            };
            match inner.and_then(leading) {
                Some(_) => Ok(StatementKind::Explain),
                None => Err(AppError::Forbidden(
                    "EXPLAIN is only allowed in front of a SELECT, WITH or VALUES statement".to_string(),
                )),
            }
        }
        Some(word) => leading(word).ok_or_else(|| {
            AppError::Forbidden(format!(
                "Statements starting with `{}` are not allowed; only SELECT, WITH, VALUES and EXPLAIN are",
                if word.is_empty() { "?" } else { word }
            ))
        }),
        None => Err(AppError::Forbidden("Query is empty".to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Word(String),
    Semicolon,
    OpenParen,
    Other,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    end: usize,
}

/// Splits query text into words and punctuation, dropping comments, string
/// literals and quoted identifiers so their contents never count as keywords.
fn tokenize(sql: &str) -> AppResult<Vec<Token>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < bytes.len() {
        let byte = bytes[index];
        match byte {
            b if b.is_ascii_whitespace() => index += 1,
            b'-' if bytes.get(index + 1) == Some(&b'-') => {
                while index < bytes.len() && bytes[index] != b'\n' {
                    index += 1;
                }
            }
            b'/' if bytes.get(index + 1) == Some(&b'*') => {
                let Some(close) = sql[index + 2..].find("*/") else {
                    return Err(AppError::Forbidden("Unterminated block comment".to_string()));
                };
                index += close + 4;
            }
            b'\'' | b'"' | b'`' => {
                let end = skip_quoted(bytes, index, byte)?;
                tokens.push(Token {
                    kind: TokenKind::Other,
                    end,
                });
                index = end;
            }
            b'[' => {
                let Some(close) = sql[index..].find(']') else {
                    return Err(AppError::Forbidden("Unterminated bracket identifier".to_string()));
                };
                index += close + 1;
                tokens.push(Token {
                    kind: TokenKind::Other,
                    end: index,
                });
            }
            b';' => {
                index += 1;
                tokens.push(Token {
                    kind: TokenKind::Semicolon,
                    end: index,
                });
            }
            b'(' => {
                index += 1;
                tokens.push(Token {
                    kind: TokenKind::OpenParen,
                    end: index,
                });
            }
            b if b.is_ascii_alphanumeric() || b == b'_' => {
                let start = index;
                while index < bytes.len() && (bytes[index].is_ascii_alphanumeric() || bytes[index] == b'_') {
                    index += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Word(sql[start..index].to_ascii_lowercase()),
                    end: index,
                });
            }
            _ => {
                // Advance over the whole UTF-8 character so slicing stays on a boundary.
                let width = sql[index..].chars().next().map(char::len_utf8).unwrap_or(1);
                index += width;
                tokens.push(Token {
                    kind: TokenKind::Other,
                    end: index,
                });
            }
        }
    }

    Ok(tokens)
}

/// Returns the index just past the closing quote; a doubled quote is an escape.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> AppResult<usize> {
    let mut index = start + 1;
    while index < bytes.len() {
        if bytes[index] == quote {
            if bytes.get(index + 1) == Some(&quote) {
                index += 2;
                continue;
            }
            return Ok(index + 1);
        }
        index += 1;
    }
    Err(AppError::Forbidden("Unterminated quoted literal".to_string()))
}

use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    error::LineageWarning,
    parser::{Parser, token_depths, token_span_text},
    scanner::{Token, TokenType, TokenTypeVariant, tokenize},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CteDefinition {
    /// Lower-cased CTE name.
    pub name: String,
    /// Text between the parentheses of `name AS ( ... )`.
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct CteExtraction {
    /// CTE definitions keyed by lower-cased name, in definition order.
    pub ctes: IndexMap<String, CteDefinition>,
    /// Query following the `WITH` clause, or the whole text when there is none.
    pub main_query: String,
    pub warnings: Vec<LineageWarning>,
}

/// Splits a normalized query into its CTE definitions and main query.
pub fn extract_ctes(sql: &str) -> CteExtraction {
    let tokens = tokenize(sql);
    extract_ctes_from_tokens(sql, &tokens)
}

pub(crate) fn extract_ctes_from_tokens(sql: &str, tokens: &[Token]) -> CteExtraction {
    let mut extraction = CteExtraction {
        main_query: sql.trim().to_owned(),
        ..Default::default()
    };

    // The WITH clause may follow a wrapper such as `CREATE VIEW v AS` or
    // `INSERT INTO t`, which stays part of the main query.
    let depths = token_depths(tokens);
    let Some(with_idx) =
        (0..tokens.len()).find(|&idx| tokens[idx].kind == TokenType::With && depths[idx] == 0)
    else {
        return extraction;
    };
    let prefix = sql[..tokens[with_idx].start].trim();
    let tokens = &tokens[with_idx..];
    let mut parser = Parser::new(tokens);
    parser.advance();
    parser.match_token_type(TokenTypeVariant::Recursive);

    loop {
        let Some(cte) = parse_cte(&mut parser, sql, tokens) else {
            if !prefix.is_empty() && extraction.ctes.is_empty() {
                // `WITH` inside a statement that is not a CTE list, e.g.
                // `timestamp with time zone`.
                log::debug!("WITH after `{}` does not open a CTE list", prefix);
                return extraction;
            }
            log::warn!(
                "Malformed WITH clause near token `{}`, analyzing the whole text as the main query.",
                parser.peek().lexeme
            );
            extraction.warnings.push(LineageWarning::NoWithClauseTerminator);
            return extraction;
        };
        log::debug!("Found CTE `{}`", cte.name);
        if extraction.ctes.contains_key(&cte.name) {
            log::debug!("CTE `{}` is defined more than once, keeping the last definition", cte.name);
        }
        extraction.ctes.insert(cte.name.clone(), cte);

        if !parser.match_token_type(TokenTypeVariant::Comma) {
            break;
        }
    }

    while parser.match_token_type(TokenTypeVariant::Semicolon) {}
    if parser.is_at_end() {
        log::warn!("WITH clause is not followed by a main query.");
        extraction.warnings.push(LineageWarning::NoWithClauseTerminator);
        return extraction;
    }

    let body = sql[parser.peek().start..].trim();
    extraction.main_query = if prefix.is_empty() {
        body.to_owned()
    } else {
        format!("{} {}", prefix, body)
    };
    extraction
}

// cte -> name ["(" columns ")"] AS [[NOT] MATERIALIZED] "(" body ")"
fn parse_cte(parser: &mut Parser, sql: &str, tokens: &[Token]) -> Option<CteDefinition> {
    let name = parser.match_identifier()?.to_lowercase();

    if parser.check_token_type(TokenTypeVariant::LeftParen) {
        parser.skip_parenthesized()?;
    }
    if !parser.match_token_type(TokenTypeVariant::As) {
        return None;
    }
    parser.match_non_reserved_keyword("not");
    parser.match_non_reserved_keyword("materialized");

    if !parser.check_token_type(TokenTypeVariant::LeftParen) {
        return None;
    }
    let open = parser.position();
    let close = parser.skip_parenthesized()?;
    let body = token_span_text(sql, tokens, open + 1, close).to_owned();

    Some(CteDefinition { name, body })
}

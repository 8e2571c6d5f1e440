use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    config::AnalyzerConfig,
    parser::{Parser, with_eof},
    scanner::{Token, TokenType, TokenTypeVariant, tokenize},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableReference {
    pub schema: String,
    pub table: String,
    pub alias: String,
}

#[derive(Debug, Clone)]
struct ResolvedTable {
    reference: TableReference,
    /// Whether the source text named a schema for the table.
    qualified: bool,
    /// Alias of a parenthesized subquery in a FROM list rather than a table.
    derived: bool,
}

/// Tables met in one scope, with the aliases visible in it.
///
/// A reused alias rebinds to the last table named with it while keeping the
/// position of its first binding. Tables read inside a derived table are
/// recorded but their aliases stay private to the subquery.
#[derive(Debug, Clone, Default)]
pub struct ScopeTables {
    entries: Vec<ResolvedTable>,
    /// Lower-cased alias to its entry.
    aliases: IndexMap<String, usize>,
}

impl ScopeTables {
    /// Every table named in the scope, in source order. Derived table aliases
    /// are not tables and are left out.
    pub fn references(&self) -> impl Iterator<Item = &TableReference> {
        self.entries
            .iter()
            .filter(|resolved| !resolved.derived)
            .map(|resolved| &resolved.reference)
    }

    pub fn resolve(&self, alias: &str) -> Option<&TableReference> {
        self.aliases
            .get(&alias.to_lowercase())
            .map(|&idx| &self.entries[idx].reference)
    }

    pub fn table_for(&self, alias: &str) -> Option<&str> {
        self.resolve(alias).map(|reference| reference.table.as_str())
    }

    pub fn schema_for(&self, alias: &str) -> Option<&str> {
        self.resolve(alias).map(|reference| reference.schema.as_str())
    }

    /// First alias bound in the scope, used for unqualified columns.
    pub fn default_table(&self) -> Option<&TableReference> {
        self.aliases
            .first()
            .map(|(_, &idx)| &self.entries[idx].reference)
    }

    /// Number of visible aliases.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// References that name a stored table rather than one of `cte_names`.
    /// An unqualified name equal to a CTE name refers to the CTE.
    pub fn physical_tables<'a>(
        &'a self,
        cte_names: &'a [String],
    ) -> impl Iterator<Item = &'a TableReference> + 'a {
        self.entries.iter().filter_map(move |resolved| {
            let is_cte = !resolved.qualified
                && cte_names
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(&resolved.reference.table));
            (!resolved.derived && !is_cte).then_some(&resolved.reference)
        })
    }

    fn bind(&mut self, resolved: ResolvedTable) {
        let key = resolved.reference.alias.to_lowercase();
        log::debug!(
            "Binding alias `{}` to {}.{}",
            resolved.reference.alias,
            resolved.reference.schema,
            resolved.reference.table
        );
        self.entries.push(resolved);
        self.aliases.insert(key, self.entries.len() - 1);
    }

    /// Records the tables of a derived table without exposing their aliases.
    fn absorb(&mut self, nested: ScopeTables) {
        self.entries.extend(nested.entries);
    }
}

/// Collects the tables named after `FROM`/`JOIN` (and `UPDATE`/`INTO` when
/// enabled) in one SQL fragment.
pub fn resolve_tables(sql: &str, config: &AnalyzerConfig) -> ScopeTables {
    let tokens = tokenize(sql);
    resolve_token_tables(&tokens, config)
}

pub(crate) fn resolve_token_tables(tokens: &[Token], config: &AnalyzerConfig) -> ScopeTables {
    let mut scope = ScopeTables::default();
    let mut parser = Parser::new(tokens);
    // One entry per open parenthesis (plus the fragment itself): whether a
    // SELECT was seen at that level. `FROM` inside a function call such as
    // `EXTRACT(YEAR FROM ts)` does not introduce tables.
    let mut select_levels = vec![true];

    while !parser.is_at_end() {
        let prev_is_distinct = parser
            .peek_prev()
            .is_some_and(|prev| prev.kind == TokenType::Distinct);
        let token = parser.advance();
        match token.kind {
            TokenType::LeftParen => select_levels.push(false),
            TokenType::RightParen => {
                if select_levels.len() > 1 {
                    select_levels.pop();
                }
            }
            TokenType::Select | TokenType::With | TokenType::Values => {
                if let Some(level) = select_levels.last_mut() {
                    *level = true;
                }
            }
            // `IS DISTINCT FROM` is a comparison
            TokenType::From if !prev_is_distinct => {
                if select_levels.last().copied().unwrap_or(true) {
                    parse_table_list(&mut parser, &mut scope, config, ClauseKind::From);
                }
            }
            TokenType::Join => parse_table_list(&mut parser, &mut scope, config, ClauseKind::Join),
            TokenType::Update | TokenType::Into if config.scan_dml_targets => {
                parse_table_list(&mut parser, &mut scope, config, ClauseKind::DmlTarget)
            }
            _ => {}
        }
    }

    scope
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClauseKind {
    From,
    Join,
    /// `UPDATE t` / `INTO t`, where a parenthesis after the name opens a column list.
    DmlTarget,
}

// table_list -> table_ref ("," table_ref)*
fn parse_table_list(
    parser: &mut Parser,
    scope: &mut ScopeTables,
    config: &AnalyzerConfig,
    clause: ClauseKind,
) {
    loop {
        parse_table_ref(parser, scope, config, clause);
        if !(clause == ClauseKind::From && parser.match_token_type(TokenTypeVariant::Comma)) {
            break;
        }
    }
}

// table_ref -> [LATERAL] (name ("." name)* | "(" ... ")") [[AS] alias]
fn parse_table_ref(
    parser: &mut Parser,
    scope: &mut ScopeTables,
    config: &AnalyzerConfig,
    clause: ClauseKind,
) {
    parser.match_token_type(TokenTypeVariant::Lateral);
    parser.match_non_reserved_keyword("only");

    if parser.check_token_type(TokenTypeVariant::LeftParen) {
        parse_derived_table(parser, scope, config);
        return;
    }

    let Some(first) = parser.match_identifier() else {
        return;
    };
    let mut parts = vec![first.to_owned()];
    while parser.check_token_type(TokenTypeVariant::Dot) && parser.peek_next_i(1).is_identifier() {
        parser.advance();
        if let Some(part) = parser.match_identifier() {
            parts.push(part.to_owned());
        }
    }

    if clause != ClauseKind::DmlTarget && parser.check_token_type(TokenTypeVariant::LeftParen) {
        // Table-valued function call, not a table.
        parser.skip_parenthesized();
        parse_alias(parser, config);
        return;
    }

    let qualified = parts.len() > 1;
    let Some(table) = parts.pop() else {
        return;
    };
    let schema = parts
        .pop()
        .unwrap_or_else(|| config.default_schema.clone());
    let alias = parse_alias(parser, config).unwrap_or_else(|| table.clone());

    scope.bind(ResolvedTable {
        reference: TableReference {
            schema,
            table,
            alias,
        },
        qualified,
        derived: false,
    });
}

// derived_table -> "(" query ")" [[AS] alias]
fn parse_derived_table(parser: &mut Parser, scope: &mut ScopeTables, config: &AnalyzerConfig) {
    let open = parser.position();
    let Some(close) = parser.skip_parenthesized() else {
        return;
    };
    let inner = with_eof(&parser.tokens()[open + 1..close]);
    scope.absorb(resolve_token_tables(&inner, config));

    if let Some(alias) = parse_alias(parser, config) {
        scope.bind(ResolvedTable {
            reference: TableReference {
                schema: config.default_schema.clone(),
                table: alias.clone(),
                alias,
            },
            qualified: false,
            derived: true,
        });
    }
}

fn parse_alias(parser: &mut Parser, config: &AnalyzerConfig) -> Option<String> {
    let explicit = parser.match_token_type(TokenTypeVariant::As);
    let token = parser.peek();
    let alias = match &token.kind {
        TokenType::QuotedIdentifier(name) => name,
        TokenType::Identifier(name) if explicit || !config.is_reserved(name) => name,
        _ => return None,
    };
    parser.advance();
    Some(alias.to_owned())
}

use serde::{Deserialize, Serialize};

use crate::{
    config::AnalyzerConfig,
    error::LineageWarning,
    parser::{token_depths, token_span_text, with_eof},
    resolver::{ScopeTables, TableReference, resolve_token_tables},
    scanner::{Token, TokenType, tokenize},
};

/// Table and alias used for unqualified columns of a scope without tables.
pub const UNKNOWN_TABLE: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnReference {
    pub schema: String,
    pub table: String,
    pub alias: String,
    /// Projected text after the alias qualifier. Expression decoration such as
    /// `AS name`, casts or arithmetic is kept.
    pub column: String,
}

#[derive(Debug, Clone, Default)]
pub struct ColumnMappings {
    pub columns: Vec<ColumnReference>,
    pub warnings: Vec<LineageWarning>,
}

/// One top-level `SELECT ... FROM` of a scope, as token indices.
#[derive(Debug, Clone, Copy)]
struct Branch {
    level: usize,
    items_start: usize,
    from: usize,
    end: usize,
}

/// Maps the projected columns of every top-level `SELECT` in `sql` to the
/// tables bound in `tables`.
pub fn extract_column_mappings(
    sql: &str,
    tables: &ScopeTables,
    config: &AnalyzerConfig,
) -> Result<ColumnMappings, LineageWarning> {
    let tokens = tokenize(sql);
    extract_token_column_mappings(sql, &tokens, tables, config)
}

/// Raw projection elements of every top-level `SELECT` in `sql`, split on
/// commas outside parentheses.
pub fn projection_items(sql: &str) -> Result<Vec<String>, LineageWarning> {
    let tokens = tokenize(sql);
    let depths = token_depths(&tokens);
    let branches = find_branches(&tokens, &depths);
    if branches.is_empty() {
        return Err(LineageWarning::NoProjectionFound);
    }
    Ok(branches
        .iter()
        .flat_map(|branch| split_items(&tokens, &depths, branch))
        .map(|(from, to)| token_span_text(sql, &tokens, from, to).to_owned())
        .collect())
}

pub(crate) fn extract_token_column_mappings(
    sql: &str,
    tokens: &[Token],
    tables: &ScopeTables,
    config: &AnalyzerConfig,
) -> Result<ColumnMappings, LineageWarning> {
    let depths = token_depths(tokens);
    let branches = find_branches(tokens, &depths);
    if branches.is_empty() {
        return Err(LineageWarning::NoProjectionFound);
    }

    let mut mappings = ColumnMappings::default();
    for branch in &branches {
        let branch_tables = resolve_token_tables(&with_eof(&tokens[branch.from..branch.end]), config);
        let default_table = branch_tables
            .default_table()
            .or_else(|| tables.default_table())
            .cloned()
            .unwrap_or_else(|| TableReference {
                schema: config.default_schema.clone(),
                table: UNKNOWN_TABLE.to_owned(),
                alias: UNKNOWN_TABLE.to_owned(),
            });

        for (from, to) in split_items(tokens, &depths, branch) {
            let column = map_item(sql, &tokens[from..to], tables, &default_table, config);
            match column {
                MappedItem::Resolved(column) => mappings.columns.push(column),
                MappedItem::Unresolved(column) => {
                    log::warn!(
                        "Alias `{}` of column `{}` is not bound in scope, using it as table name.",
                        column.alias,
                        column.column
                    );
                    mappings.warnings.push(LineageWarning::UnresolvedAlias {
                        alias: column.alias.clone(),
                        column: column.column.clone(),
                    });
                    mappings.columns.push(column);
                }
            }
        }
    }

    Ok(mappings)
}

/// Finds the `SELECT`s heading the set-operation branches of a scope, each
/// paired with the `FROM` that closes its projection. Branches sit at the
/// outermost level holding a `SELECT`, or one parenthesis group deeper when
/// written as `... UNION (SELECT ...)`. A `SELECT` without a `FROM` at its
/// level (e.g. `SELECT 1`) has no projection to map.
fn find_branches(tokens: &[Token], depths: &[usize]) -> Vec<Branch> {
    let Some(level) = tokens
        .iter()
        .zip(depths)
        .filter(|(tok, _)| tok.kind == TokenType::Select)
        .map(|(_, depth)| *depth)
        .min()
    else {
        return vec![];
    };

    let selects: Vec<(usize, usize)> = (0..tokens.len())
        .filter(|&idx| tokens[idx].kind == TokenType::Select)
        .filter_map(|idx| branch_level(tokens, depths, idx, level).map(|depth| (idx, depth)))
        .collect();

    let mut branches = vec![];
    for (i, &(select, branch_level)) in selects.iter().enumerate() {
        let next = selects
            .get(i + 1)
            .map_or(tokens.len() - 1, |(idx, _)| *idx);
        // A parenthesized branch ends at its closing parenthesis.
        let end = (select + 1..next)
            .find(|&idx| depths[idx] < branch_level)
            .unwrap_or(next);
        let from = (select + 1..end).find(|&idx| {
            tokens[idx].kind == TokenType::From
                && depths[idx] == branch_level
                && tokens[idx - 1].kind != TokenType::Distinct
        });
        let Some(from) = from else {
            log::debug!("SELECT at token {} has no FROM, skipping it", select);
            continue;
        };
        branches.push(Branch {
            level: branch_level,
            items_start: skip_select_modifiers(tokens, select + 1, from),
            from,
            end,
        });
    }
    branches
}

/// Depth of the branch headed by the `SELECT` at `select`, or `None` when it
/// belongs to a nested subquery.
fn branch_level(tokens: &[Token], depths: &[usize], select: usize, level: usize) -> Option<usize> {
    let depth = depths[select];
    if depth == level {
        return Some(level);
    }

    let mut open = select;
    while open > 0 && tokens[open - 1].kind == TokenType::LeftParen {
        open -= 1;
        if depths[open] == level {
            break;
        }
    }
    if open == select || depths[open] != level {
        return None;
    }

    let is_set_operator =
        |idx: usize| matches!(tokens[idx].kind, TokenType::Union | TokenType::Intersect | TokenType::Except);
    let heads_branch = match open.checked_sub(1) {
        None => true,
        Some(prev) => match tokens[prev].kind {
            TokenType::All | TokenType::Distinct => prev > 0 && is_set_operator(prev - 1),
            _ => is_set_operator(prev),
        },
    };
    heads_branch.then_some(depth)
}

// select [DISTINCT [ON "(" ... ")"] | ALL] items FROM
fn skip_select_modifiers(tokens: &[Token], mut idx: usize, from: usize) -> usize {
    match tokens[idx].kind {
        TokenType::All => idx += 1,
        TokenType::Distinct => {
            idx += 1;
            if tokens[idx].kind == TokenType::On && tokens[idx + 1].kind == TokenType::LeftParen {
                let mut depth = 0usize;
                idx += 1;
                while idx < from {
                    match tokens[idx].kind {
                        TokenType::LeftParen => depth += 1,
                        TokenType::RightParen => depth -= 1,
                        _ => {}
                    }
                    idx += 1;
                    if depth == 0 {
                        break;
                    }
                }
            }
        }
        _ => {}
    }
    std::cmp::min(idx, from)
}

fn split_items(tokens: &[Token], depths: &[usize], branch: &Branch) -> Vec<(usize, usize)> {
    let mut items = vec![];
    let mut item_start = branch.items_start;
    for idx in branch.items_start..branch.from {
        if tokens[idx].kind == TokenType::Comma && depths[idx] == branch.level {
            if idx > item_start {
                items.push((item_start, idx));
            }
            item_start = idx + 1;
        }
    }
    if branch.from > item_start {
        items.push((item_start, branch.from));
    }
    items
}

enum MappedItem {
    Resolved(ColumnReference),
    Unresolved(ColumnReference),
}

fn is_name_or_star(token: &Token) -> bool {
    token.is_identifier() || token.kind == TokenType::Star
}

/// Position of the alias and column tokens of a leading `a.b[.c...]` chain.
fn leading_qualifier(item: &[Token]) -> Option<(usize, usize)> {
    if !item.first()?.is_identifier() {
        return None;
    }
    let mut names = vec![0];
    let mut idx = 1;
    while idx + 1 < item.len() && item[idx].kind == TokenType::Dot && is_name_or_star(&item[idx + 1]) {
        names.push(idx + 1);
        idx += 2;
    }
    match names.as_slice() {
        [.., alias, column] => Some((*alias, *column)),
        _ => None,
    }
}

/// Position of the alias of the first `alias.column` pair inside an
/// expression, ignoring references made by nested subqueries.
fn inner_qualifier(item: &[Token]) -> Option<usize> {
    let mut subquery_levels: Vec<bool> = vec![];
    for (idx, tok) in item.iter().enumerate() {
        match tok.kind {
            TokenType::LeftParen => {
                let in_subquery = subquery_levels.last().copied().unwrap_or(false);
                let opens_query = item
                    .get(idx + 1)
                    .is_some_and(|next| matches!(next.kind, TokenType::Select | TokenType::With));
                subquery_levels.push(in_subquery || opens_query);
            }
            TokenType::RightParen => {
                subquery_levels.pop();
            }
            _ => {}
        }
        if subquery_levels.last().copied().unwrap_or(false) {
            continue;
        }
        if let Some(alias_idx) = qualifier_at(item, idx) {
            return Some(alias_idx);
        }
    }
    None
}

/// Alias position of an `a.b[.c...]` chain starting at `idx`: the second to
/// last name of the chain.
fn qualifier_at(tokens: &[Token], idx: usize) -> Option<usize> {
    if !tokens[idx].is_identifier() {
        return None;
    }
    let mut last = idx;
    while last + 2 < tokens.len()
        && tokens[last + 1].kind == TokenType::Dot
        && is_name_or_star(&tokens[last + 2])
    {
        last += 2;
    }
    (last > idx).then(|| last - 2)
}

/// Every `alias.column` reference of a scope whose alias is bound in `tables`,
/// wherever it appears: projection, join conditions, filters or grouping.
pub fn extract_referenced_columns(sql: &str, tables: &ScopeTables) -> Vec<ColumnReference> {
    referenced_token_columns(&tokenize(sql), tables)
}

pub(crate) fn referenced_token_columns(tokens: &[Token], tables: &ScopeTables) -> Vec<ColumnReference> {
    let mut columns = vec![];
    let mut idx = 0;
    while idx < tokens.len() {
        let Some(alias_idx) = qualifier_at(tokens, idx) else {
            idx += 1;
            continue;
        };
        let column_idx = alias_idx + 2;
        idx = column_idx + 1;

        // `schema.function(...)`
        if tokens.get(column_idx + 1).is_some_and(|next| next.kind == TokenType::LeftParen) {
            continue;
        }
        let (Some(alias), Some(column)) = (tokens[alias_idx].ident_name(), tokens[column_idx].ident_name())
        else {
            continue;
        };
        if let Some(reference) = tables.resolve(alias) {
            columns.push(ColumnReference {
                schema: reference.schema.clone(),
                table: reference.table.clone(),
                alias: reference.alias.clone(),
                column: column.to_owned(),
            });
        }
    }
    columns
}

fn map_item(
    sql: &str,
    item: &[Token],
    tables: &ScopeTables,
    default_table: &TableReference,
    config: &AnalyzerConfig,
) -> MappedItem {
    let item_end = item.last().map_or(0, |tok| tok.end);
    let raw = &sql[item[0].start..item_end];

    let qualified = match leading_qualifier(item) {
        Some((alias_idx, column_idx)) => Some((alias_idx, &sql[item[column_idx].start..item_end])),
        None => inner_qualifier(item).map(|alias_idx| (alias_idx, raw)),
    };

    let Some((alias_idx, column)) = qualified else {
        return MappedItem::Resolved(ColumnReference {
            schema: default_table.schema.clone(),
            table: default_table.table.clone(),
            alias: default_table.alias.clone(),
            column: raw.to_owned(),
        });
    };

    let alias = item[alias_idx].ident_name().unwrap_or_default();
    match tables.resolve(alias) {
        Some(reference) => MappedItem::Resolved(ColumnReference {
            schema: reference.schema.clone(),
            table: reference.table.clone(),
            alias: reference.alias.clone(),
            column: column.to_owned(),
        }),
        None => MappedItem::Unresolved(ColumnReference {
            schema: config.default_schema.clone(),
            table: alias.to_owned(),
            alias: alias.to_owned(),
            column: column.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve_tables;

    fn column(schema: &str, table: &str, alias: &str, column: &str) -> ColumnReference {
        ColumnReference {
            schema: schema.to_owned(),
            table: table.to_owned(),
            alias: alias.to_owned(),
            column: column.to_owned(),
        }
    }

    fn mappings(sql: &str, config: &AnalyzerConfig) -> Result<ColumnMappings, LineageWarning> {
        let tables = resolve_tables(sql, config);
        extract_column_mappings(sql, &tables, config)
    }

    #[test]
    fn test_split_respects_nesting() {
        assert_eq!(
            projection_items("SELECT a, COALESCE(b, c) AS d FROM t").unwrap(),
            vec!["a", "COALESCE(b, c) AS d"]
        );
    }

    #[test]
    fn test_split_skips_modifiers_and_subqueries() {
        assert_eq!(
            projection_items("select distinct on (a, b) a, (select max(x) from u) m from t").unwrap(),
            vec!["a", "(select max(x) from u) m"]
        );
        assert_eq!(
            projection_items("select all a from t").unwrap(),
            vec!["a"]
        );
    }

    #[test]
    fn test_qualified_columns_resolve_through_aliases() {
        let config = AnalyzerConfig::default().with_default_schema("pub_glbl_medical");
        let result = mappings(
            "SELECT x.col, y.other AS renamed FROM mytable x JOIN s.t2 y ON x.id = y.id",
            &config,
        )
        .unwrap();
        assert_eq!(
            result.columns,
            vec![
                column("pub_glbl_medical", "mytable", "x", "col"),
                column("s", "t2", "y", "other AS renamed"),
            ]
        );
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_unqualified_column_uses_default_table() {
        let config = AnalyzerConfig::default();
        let result = mappings("SELECT total FROM orders o", &config).unwrap();
        assert_eq!(result.columns, vec![column("public", "orders", "o", "total")]);
    }

    #[test]
    fn test_unqualified_column_without_tables() {
        let config = AnalyzerConfig::default();
        let tables = ScopeTables::default();
        let result = extract_column_mappings("select a from generate_series(1, 3)", &tables, &config)
            .unwrap();
        assert_eq!(
            result.columns,
            vec![column("public", UNKNOWN_TABLE, UNKNOWN_TABLE, "a")]
        );
    }

    #[test]
    fn test_unresolved_alias_falls_back_to_alias_text() {
        let config = AnalyzerConfig::default();
        let result = mappings("select z.a from s.t x", &config).unwrap();
        assert_eq!(result.columns, vec![column("public", "z", "z", "a")]);
        assert_eq!(
            result.warnings,
            vec![LineageWarning::UnresolvedAlias {
                alias: "z".to_owned(),
                column: "a".to_owned(),
            }]
        );
    }

    #[test]
    fn test_expression_keeps_whole_text() {
        let config = AnalyzerConfig::default();
        let result = mappings("select coalesce(o.a, 0) + 1 as v, o.* from s.orders o", &config).unwrap();
        assert_eq!(
            result.columns,
            vec![
                column("s", "orders", "o", "coalesce(o.a, 0) + 1 as v"),
                column("s", "orders", "o", "*"),
            ]
        );
    }

    #[test]
    fn test_union_branches_use_their_own_default_table() {
        let config = AnalyzerConfig::default();
        let result = mappings("select a from s.t1 union all select b from s.t2", &config).unwrap();
        assert_eq!(
            result.columns,
            vec![column("s", "t1", "t1", "a"), column("s", "t2", "t2", "b")]
        );
    }

    #[test]
    fn test_insert_select_uses_source_table() {
        let config = AnalyzerConfig::default();
        let result = mappings("insert into s.out (a) select a from s.src", &config).unwrap();
        assert_eq!(result.columns, vec![column("s", "src", "src", "a")]);
    }

    #[test]
    fn test_no_projection_found() {
        let config = AnalyzerConfig::default();
        assert_eq!(
            mappings("select 1", &config).unwrap_err(),
            LineageWarning::NoProjectionFound
        );
        assert_eq!(
            mappings("values (1), (2)", &config).unwrap_err(),
            LineageWarning::NoProjectionFound
        );
    }

    #[test]
    fn test_scalar_subquery_does_not_qualify_item() {
        let config = AnalyzerConfig::default();
        let result = mappings("select (select max(x) from s.u) m, total from s.orders o", &config).unwrap();
        assert_eq!(
            result.columns,
            vec![
                column("s", "orders", "o", "(select max(x) from s.u) m"),
                column("s", "orders", "o", "total"),
            ]
        );
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_qualifier_outside_subquery_is_used() {
        let config = AnalyzerConfig::default();
        let result = mappings(
            "select coalesce((select max(u.x) from s.u u), o.a) v from s.orders o",
            &config,
        )
        .unwrap();
        assert_eq!(
            result.columns,
            vec![column(
                "s",
                "orders",
                "o",
                "coalesce((select max(u.x) from s.u u), o.a) v"
            )]
        );
    }

    #[test]
    fn test_parenthesized_set_operation_branch() {
        let config = AnalyzerConfig::default();
        assert_eq!(
            projection_items("select a from s.t union (select b from s.u) order by 1").unwrap(),
            vec!["a", "b"]
        );
        let result = mappings("select a from s.t union (select b from s.u)", &config).unwrap();
        assert_eq!(
            result.columns,
            vec![column("s", "t", "t", "a"), column("s", "u", "u", "b")]
        );
        assert_eq!(
            projection_items("(select a from s.t) except all (select b from s.u)").unwrap(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_where_subquery_is_not_a_branch() {
        assert_eq!(
            projection_items("select a from s.t where a in (select b from s.u)").unwrap(),
            vec!["a"]
        );
    }

    #[test]
    fn test_referenced_columns_cover_every_clause() {
        let config = AnalyzerConfig::default();
        let sql = "select o.id, sum(l.qty) from s.orders o join s.lines l on l.order_id = o.id \
                   where o.status = 'open' and s.f(o.id) group by o.id, l.sku";
        let tables = resolve_tables(sql, &config);
        assert_eq!(
            extract_referenced_columns(sql, &tables),
            vec![
                column("s", "orders", "o", "id"),
                column("s", "lines", "l", "qty"),
                column("s", "lines", "l", "order_id"),
                column("s", "orders", "o", "id"),
                column("s", "orders", "o", "status"),
                column("s", "orders", "o", "id"),
                column("s", "orders", "o", "id"),
                column("s", "lines", "l", "sku"),
            ]
        );
    }

    #[test]
    fn test_referenced_columns_skip_unbound_qualifiers() {
        let config = AnalyzerConfig::default();
        let sql = "select x.a, db.s.t.c from s.t where z.b = 1";
        let tables = resolve_tables(sql, &config);
        assert_eq!(
            extract_referenced_columns(sql, &tables),
            vec![column("s", "t", "t", "c")]
        );
    }
}

/// Strips `--` and `/* */` comments and collapses whitespace runs into a single
/// space, producing one trimmed line of SQL.
///
/// Quoted text (`'...'`, `"..."` and `` `...` ``) is copied verbatim, so comment
/// markers or repeated spaces inside literals survive. A doubled quote inside a
/// literal is treated as an escaped quote. Normalizing already normalized text
/// returns it unchanged.
pub fn normalize(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut pending_space = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '-' && next == Some('-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            pending_space = true;
            continue;
        }

        if c == '/' && next == Some('*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = std::cmp::min(i + 2, chars.len());
            pending_space = true;
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            i += 1;
            continue;
        }

        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;

        if matches!(c, '\'' | '"' | '`') {
            i = copy_quoted(&chars, i, &mut out);
        } else {
            out.push(c);
            i += 1;
        }
    }

    out
}

/// Copies the literal opening at `chars[start]` into `out` and returns the index
/// just past its closing quote (or the end of input for an unterminated one).
fn copy_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    let delimiter = chars[start];
    out.push(delimiter);
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        if c == delimiter {
            if chars.get(i) == Some(&delimiter) {
                out.push(delimiter);
                i += 1;
                continue;
            }
            return i;
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(
            normalize("  select a,\n\t b\r\n  from   t  "),
            "select a, b from t"
        );
    }

    #[test]
    fn test_normalize_strips_comments() {
        let sql = "select a -- first column\n, b /* second\ncolumn */from t -- done";
        assert_eq!(normalize(sql), "select a , b from t");
    }

    #[test]
    fn test_normalize_keeps_literals() {
        let sql = "select '--not a comment', 'a  /* b */  c', \"odd  name\" from t";
        assert_eq!(normalize(sql), sql);
    }

    #[test]
    fn test_normalize_escaped_quote() {
        assert_eq!(
            normalize("select 'it''s  -- ok'   from t"),
            "select 'it''s  -- ok' from t"
        );
    }

    #[test]
    fn test_normalize_blank_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n\t "), "");
        assert_eq!(normalize("-- only a comment"), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let sqls = [
            "with a as (select 1) -- c\nselect * from a",
            "select 'x  y', /* z */ \"q\" from t",
            "select 'unterminated  --",
            "a/**/b",
            "  /* open comment",
        ];
        for sql in sqls {
            let once = normalize(sql);
            assert_eq!(normalize(&once), once, "input: {sql}");
        }
    }
}

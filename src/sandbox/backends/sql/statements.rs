//! Splitting a SQL script into statements.

/// Split `script` on statement-terminating semicolons.
///
/// Semicolons inside string literals, quoted identifiers (`"…"`, `` `…` ``,
/// `[…]`) and comments do not terminate. A `CREATE TRIGGER` body keeps its
/// inner semicolons until the closing `END`. Segments are trimmed; blank and
/// comment-only segments are dropped.
pub fn split(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                current.push(c);
                for next in chars.by_ref() {
                    current.push(next);
                    // A doubled quote is an escape; the second one reopens the literal.
                    if next == close {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                current.push(c);
                for next in chars.by_ref() {
                    current.push(next);
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                current.push(c);
                let mut prev = '\0';
                for next in chars.by_ref() {
                    current.push(next);
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            ';' if !is_open_trigger(&current) => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_statement(&mut statements, &current);

    statements
}

fn push_statement(statements: &mut Vec<String>, segment: &str) {
    let segment = segment.trim();
    if !strip_leading_comments(segment).is_empty() {
        statements.push(segment.to_string());
    }
}

/// `segment` is a trigger definition whose body has not reached its closing `END` yet.
///
/// `BEGIN` and `CASE` open a block that `END` closes, so a `CASE … END`
/// inside the body does not close it.
fn is_open_trigger(segment: &str) -> bool {
    let words = keywords(segment);
    if words.first().map(String::as_str) != Some("CREATE")
        || !words.iter().skip(1).take(2).any(|word| word == "TRIGGER")
    {
        return false;
    }

    let mut depth = 0usize;
    let mut began = false;
    for word in &words {
        match word.as_str() {
            "BEGIN" => {
                began = true;
                depth += 1;
            }
            "CASE" => depth += 1,
            "END" => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    !began || depth > 0
}

/// Upper-cased words of `segment`, skipping literals, quoted identifiers and comments.
fn keywords(segment: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut chars = segment.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c.to_ascii_uppercase());
            continue;
        }
        if !word.is_empty() {
            words.push(std::mem::take(&mut word));
        }
        match c {
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                chars.by_ref().find(|next| *next == close);
            }
            '-' if chars.peek() == Some(&'-') => {
                chars.by_ref().find(|next| *next == '\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => {}
        }
    }
    if !word.is_empty() {
        words.push(word);
    }
    words
}

/// Drop leading whitespace, `-- …` and `/* … */` comments.
pub fn strip_leading_comments(statement: &str) -> &str {
    let mut rest = statement.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(end) => after[end + 1..].trim_start(),
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(end) => after[end + 2..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}

/// Statements whose results are shown as a table.
pub fn is_query(statement: &str) -> bool {
    let text = strip_leading_comments(statement);
    text.get(..6)
        .map(|head| head.eq_ignore_ascii_case("select"))
        .unwrap_or(false)
        && !text[6..].starts_with(|c: char| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic() {
        assert_eq!(
            split("CREATE TABLE t(x);\nINSERT INTO t VALUES (1);\n\nSELECT * FROM t"),
            vec!["CREATE TABLE t(x)", "INSERT INTO t VALUES (1)", "SELECT * FROM t"]
        );
    }

    #[test]
    fn test_split_ignores_quoted_semicolons() {
        assert_eq!(
            split("INSERT INTO t VALUES ('a;b', 'it''s');SELECT \"we;ird\" FROM [x;y]"),
            vec!["INSERT INTO t VALUES ('a;b', 'it''s')", "SELECT \"we;ird\" FROM [x;y]"]
        );
    }

    #[test]
    fn test_split_drops_comment_only_segments() {
        let script = "-- setup;\nCREATE TABLE t(x); /* done; */ ;\n-- trailing";
        assert_eq!(split(script), vec!["-- setup;\nCREATE TABLE t(x)"]);
        assert!(split("  ;; -- nothing\n").is_empty());
    }

    #[test]
    fn test_split_keeps_trigger_body() {
        let script = "CREATE TRIGGER tr AFTER INSERT ON t BEGIN UPDATE c SET n = n + 1; END; SELECT 1";
        assert_eq!(
            split(script),
            vec![
                "CREATE TRIGGER tr AFTER INSERT ON t BEGIN UPDATE c SET n = n + 1; END",
                "SELECT 1"
            ]
        );
    }

    #[test]
    fn test_split_keeps_case_inside_trigger_body() {
        let script = "CREATE TRIGGER tr AFTER INSERT ON t BEGIN\n  UPDATE c SET n = CASE WHEN new.x > 0 THEN 1 ELSE 0 END;\n  DELETE FROM log WHERE note = 'END';\nEND;\nSELECT 1";
        let statements = split(script);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with("'END';\nEND"));
        assert_eq!(statements[1], "SELECT 1");
    }

    #[test]
    fn test_keywords_skip_literals_and_comments() {
        assert_eq!(
            keywords("begin 'end' -- end\n /* END */ [end] case_x End"),
            vec!["BEGIN", "CASE_X", "END"]
        );
    }

    #[test]
    fn test_is_query() {
        assert!(is_query("SELECT 1"));
        assert!(is_query("  select * from t"));
        assert!(is_query("-- rows\n/* all */ SeLeCt\n*\nFROM t"));
        assert!(is_query("SELECT"));
        assert!(!is_query("SELECTED"));
        assert!(!is_query("INSERT INTO t SELECT 1"));
        assert!(!is_query("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!is_query("-- SELECT\nDELETE FROM t"));
    }
}

//! Best-effort TypeScript to JavaScript stripping.
//!
//! This is a handful of regular expressions, not a compiler. It handles the
//! annotations that show up in typical exercise code (parameter, variable and
//! return annotations, interfaces, type aliases, generics on declarations,
//! access modifiers, `implements` clauses, `as` casts) and leaves anything else
//! for the JS engine to reject. Enums, namespaces, decorators and overloads
//! are not supported.
//!
//! Removed declarations are replaced by the same number of newlines so error
//! line numbers still point at the user's source.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("typescript stripping pattern is valid")
}

static INTERFACE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?m)^[ \t]*(?:export\s+)?interface\s+\w+[^{]*\{[^}]*\}[ \t]*;?"));
static TYPE_ALIAS: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?m)^[ \t]*(?:export\s+)?type\s+\w+\s*(?:<[^>]*>)?\s*=[^;]*;"));
static IMPLEMENTS: Lazy<Regex> = Lazy::new(|| pattern(r"\s+implements\s+[\w\s,.<>]+\{"));
static MODIFIERS: Lazy<Regex> =
    Lazy::new(|| pattern(r"\b(?:public|private|protected|readonly)\s+(\w)"));
static DECL_GENERICS: Lazy<Regex> =
    Lazy::new(|| pattern(r"\b((?:function\s*\*?\s*|class\s+)\w+)\s*<[^<>()]*(?:<[^<>()]*>[^<>()]*)*>"));
static VAR_ANNOTATION: Lazy<Regex> =
    Lazy::new(|| pattern(r"\b(let|const|var)\s+(\w+)\s*!?:\s*[^=;\n]+"));
static PARAM_LIST: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(\bfunction\s*\*?\s*\w*\s*|(?m:^[ \t]*(?:async\s+|static\s+|get\s+|set\s+)*\w+\s*)|\basync\s*|[=(,:?]\s*)\(([^()]*)\)(\s*:\s*[^={;]+?)?(\s*(?:\{|=>))")
});
static AS_CAST: Lazy<Regex> =
    Lazy::new(|| pattern(r"\s+as\s+(?:const\b|[A-Za-z_][\w.]*(?:<[^>]*>)?(?:\[\])*)"));

const CONTROL_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "catch", "return", "with"];

/// Strip type syntax from `source`, keeping its line structure.
pub fn strip_types(source: &str) -> String {
    let code = INTERFACE.replace_all(source, blank_lines);
    let code = TYPE_ALIAS.replace_all(&code, blank_lines);
    let code = IMPLEMENTS.replace_all(&code, " {");
    let code = MODIFIERS.replace_all(&code, "$1");
    let code = DECL_GENERICS.replace_all(&code, "$1");
    let code = VAR_ANNOTATION.replace_all(&code, "$1 $2 ");
    let code = PARAM_LIST.replace_all(&code, |caps: &Captures| {
        let head = &caps[1];
        if CONTROL_KEYWORDS.contains(&head.trim()) {
            return caps[0].to_string();
        }
        format!("{}({}){}", head, strip_params(&caps[2]), &caps[4])
    });
    let code = AS_CAST.replace_all(&code, "");
    code.into_owned()
}

fn blank_lines(caps: &Captures) -> String {
    "\n".repeat(caps[0].matches('\n').count())
}

/// Remove `: Type` from each parameter, keeping names, defaults and rest markers.
fn strip_params(params: &str) -> String {
    split_top_level(params, ',')
        .into_iter()
        .map(|param| {
            let (name, default) = match find_top_level(param, '=') {
                Some(eq) => (&param[..eq], Some(param[eq + 1..].trim())),
                None => (param, None),
            };
            let name = match find_top_level(name, ':') {
                Some(colon) => &name[..colon],
                None => name,
            };
            let name = name.trim().trim_end_matches('?');
            match default {
                Some(default) => format!("{} = {}", name, default),
                None => name.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth -= 1,
            c if c == separator && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if !text[start..].trim().is_empty() {
        parts.push(&text[start..]);
    }
    parts
}

fn find_top_level(text: &str, target: char) -> Option<usize> {
    let mut depth = 0i32;
    let mut prev = ' ';
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            // `=>` inside a function type is not a default value
            '>' if prev != '=' => depth -= 1,
            c if c == target && depth == 0 => {
                let next = text[i + c.len_utf8()..].chars().next();
                if !(target == '=' && next == Some('>')) {
                    return Some(i);
                }
            }
            _ => {}
        }
        prev = c;
    }
    None
}

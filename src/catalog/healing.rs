/*!
The bounded catalog-recovery pipeline (spec.md §4.8): a small, deterministic
set of textual repairs attempted on a catalog document that failed to
parse, before giving up. Never applied to a document that parsed
successfully; never mutates the original without a backup having been
written first (the caller's responsibility, [`crate::catalog::document::load`]).
*/

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TRAILING_COMMA: Regex = Regex::new(r",(\s*[}\]])").unwrap();
    static ref UNQUOTED_KEY: Regex = Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)"#).unwrap();
}

/// Run the repair pipeline over `raw`: strip trailing commas, quote bare
/// object keys, then balance any unclosed `{`/`[`.
pub fn repair(raw: &str) -> String {
    let stripped = TRAILING_COMMA.replace_all(raw, "$1");
    let quoted = UNQUOTED_KEY.replace_all(&stripped, "$1\"$2\"$3");
    balance_brackets(&quoted)
}

fn balance_brackets(input: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in input.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }
    let mut out = input.to_string();
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

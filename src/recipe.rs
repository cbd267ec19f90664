//! PKGBUILD dependency extraction.
//!
//! Build recipes are bash scripts, but dependency arrays are almost always
//! written as literal lists:
//!
//! ```text
//! depends=('glibc' 'openssl>=3.0')
//! makedepends=(
//!   'cmake'
//!   'git'
//! )
//! ```
//!
//! This module pulls those lists out with a line scanner. It is a heuristic,
//! not a shell interpreter: variable expansion, brace expansion, `+=`
//! appends and conditionals are not evaluated, so recipes that compute their
//! dependency lists are under-resolved.

/// Runtime dependency array.
pub const DEPENDS: &str = "depends";

/// Build-time dependency array.
pub const MAKEDEPENDS: &str = "makedepends";

/// Arrays consulted when resolving a package, in merge order.
pub const DEPENDENCY_VARS: [&str; 2] = [DEPENDS, MAKEDEPENDS];

/// Extract the bare package names declared in the array `var`.
///
/// Only the first declaration of `var` is read. A missing or empty array
/// yields an empty vector.
///
/// # Examples
///
/// ```
/// use aurpull::recipe::extract_array;
///
/// let deps = extract_array("depends=('foo>=1.2' 'bar')", "depends");
/// assert_eq!(deps, vec!["foo", "bar"]);
/// ```
pub fn extract_array(recipe: &str, var: &str) -> Vec<String> {
    let mut captured = String::new();
    let mut lines = recipe.lines();

    while let Some(line) = lines.next() {
        let Some(body) = assignment_body(line, var) else {
            continue;
        };

        let body = strip_comment(body);
        if let Some(end) = body.find(')') {
            captured.push_str(&body[..end]);
            break;
        }

        captured.push_str(body);
        for line in lines.by_ref() {
            let line = strip_comment(line);
            captured.push(' ');
            if let Some(end) = line.find(')') {
                captured.push_str(&line[..end]);
                break;
            }
            captured.push_str(line);
        }
        break;
    }

    captured
        .split_whitespace()
        .map(|token| token.replace(['\'', '"'], ""))
        .map(|token| strip_constraint(&token).trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// All dependencies a package needs to build and run, deduplicated in
/// declaration order.
pub fn dependencies(recipe: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for var in DEPENDENCY_VARS {
        for name in extract_array(recipe, var) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Drop a version constraint from a dependency token.
///
/// `>` is checked before `<`, which is checked before `=`, so `foo>=1` and
/// `foo=1` both become `foo`.
pub fn strip_constraint(token: &str) -> &str {
    for op in ['>', '<', '='] {
        if let Some(pos) = token.find(op) {
            return &token[..pos];
        }
    }
    token
}

/// Text after `var=(` if `line` declares `var`.
fn assignment_body<'a>(line: &'a str, var: &str) -> Option<&'a str> {
    line.strip_prefix(var)?
        .strip_prefix('=')?
        .trim_start()
        .strip_prefix('(')
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) if pos == 0 || line[..pos].ends_with(char::is_whitespace) => &line[..pos],
        _ => line,
    }
}

//! Post-conversion cleanup for Markdown rendered from page containers.
//!
//! Each pass is a `&str -> String` function applied in sequence.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Run every cleanup pass over freshly converted Markdown.
pub(crate) fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let mut result = collapse_blank_lines(md);
    result = strip_fence_language_prefix(&result);
    result = absolutize_links(&result, base_url);
    result = trim_line_ends(&result);
    ensure_trailing_newline(&result)
}

/// Collapse runs of 3+ blank lines into a single blank line.
fn collapse_blank_lines(md: &str) -> String {
    static BLANK_RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("valid regex"));

    BLANK_RUN_RE.replace_all(md, "\n\n").into_owned()
}

/// Turn fences like ```` ```language-rust ```` into ```` ```rust ````.
fn strip_fence_language_prefix(md: &str) -> String {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^```(?:language-|lang-|highlight-)(\w+)").expect("valid regex")
    });

    FENCE_RE.replace_all(md, "```$1").into_owned()
}

/// Resolve root-relative and relative link targets against the page URL.
fn absolutize_links(md: &str, base_url: Option<&Url>) -> String {
    let Some(base) = base_url else {
        return md.to_string();
    };

    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

    LINK_RE
        .replace_all(md, |caps: &regex::Captures| {
            let bang = &caps[1];
            let text = &caps[2];
            let href = &caps[3];

            let keep = href.starts_with('#') || href.contains("://") || href.starts_with("mailto:");
            if keep {
                return caps[0].to_string();
            }

            match base.join(href) {
                Ok(resolved) => format!("{bang}[{text}]({resolved})"),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Strip trailing whitespace outside fenced code. A hard break (two or more
/// trailing spaces before another text line) keeps exactly two spaces.
fn trim_line_ends(md: &str) -> String {
    let lines: Vec<&str> = md.lines().collect();
    let mut out = Vec::with_capacity(lines.len());
    let mut in_code_block = false;

    for (i, line) in lines.iter().enumerate() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            out.push(line.trim_end().to_string());
            continue;
        }
        if in_code_block {
            out.push((*line).to_string());
            continue;
        }

        let trimmed = line.trim_end();
        let hard_break = !trimmed.is_empty()
            && !trimmed.starts_with('#')
            && line.ends_with("  ")
            && lines.get(i + 1).is_some_and(|next| !next.trim().is_empty());
        if hard_break {
            out.push(format!("{trimmed}  "));
        } else {
            out.push(trimmed.to_string());
        }
    }

    out.join("\n")
}

/// Ensure the text ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}

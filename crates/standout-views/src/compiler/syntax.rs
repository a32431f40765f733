//! Echo, comment, verbatim and directive passes.
//!
//! Each pass takes dialect source and returns text that is closer to plain
//! minijinja. The directive scanner is hand-written because directive
//! arguments need balanced-parenthesis matching that regexes cannot express.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::ViewError;

static COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{--.*?--\}\}").expect("comment pattern is valid"));

static ECHO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(@)?\{\{(.+?)\}\}|\{!!(.+?)!!\}").expect("echo pattern is valid")
});

static VERBATIM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)@verbatim(.*?)@endverbatim|\{%-?\s*raw\s*-?%\}(.*?)\{%-?\s*endraw\s*-?%\}")
        .expect("verbatim pattern is valid")
});

const RAW_PLACEHOLDER: &str = "__STANDOUT_RAW_BLOCK_";

/// Directives understood without registration.
pub(crate) const BUILTIN_DIRECTIVES: &[&str] = &[
    "if",
    "elseif",
    "else",
    "endif",
    "unless",
    "endunless",
    "isset",
    "endisset",
    "empty",
    "endempty",
    "foreach",
    "forelse",
    "endforeach",
    "endforelse",
    "include",
    "extends",
    "section",
    "endsection",
    "stop",
    "show",
    "yield",
    "parent",
    "json",
];

/// Replaces verbatim and raw blocks with placeholders so later passes skip them.
pub(crate) fn extract_raw_blocks(source: &str, blocks: &mut Vec<String>) -> String {
    VERBATIM
        .replace_all(source, |caps: &Captures<'_>| {
            let content = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            blocks.push(content.to_string());
            format!("{RAW_PLACEHOLDER}{}__", blocks.len() - 1)
        })
        .into_owned()
}

/// Puts raw blocks back, wrapped so minijinja emits them untouched.
pub(crate) fn restore_raw_blocks(compiled: &str, blocks: &[String]) -> String {
    let mut out = compiled.to_string();
    for (i, content) in blocks.iter().enumerate() {
        let placeholder = format!("{RAW_PLACEHOLDER}{i}__");
        out = out.replace(&placeholder, &format!("{{% raw %}}{content}{{% endraw %}}"));
    }
    out
}

/// Drops `{{-- --}}` comments but keeps their line breaks, so render errors
/// still point at source lines.
pub(crate) fn strip_comments(source: &str) -> String {
    COMMENT
        .replace_all(source, |caps: &Captures<'_>| {
            let lines = caps[0].matches('\n').count();
            "\n".repeat(lines)
        })
        .into_owned()
}

/// Compiles `{{ e }}` (escaped), `{!! e !!}` (raw) and `@{{ e }}` (literal).
pub(crate) fn compile_echos(source: &str) -> String {
    ECHO.replace_all(source, |caps: &Captures<'_>| {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        if let Some(raw) = caps.get(3) {
            let expr = raw.as_str().trim();
            return if expr.is_empty() {
                whole.to_string()
            } else {
                format!("{{{{ {expr} }}}}")
            };
        }
        if caps.get(1).is_some() {
            return format!("{{% raw %}}{}{{% endraw %}}", &whole[1..]);
        }
        let expr = caps.get(2).map_or("", |m| m.as_str().trim());
        if expr.is_empty() {
            whole.to_string()
        } else {
            format!("{{{{ ({expr})|e }}}}")
        }
    })
    .into_owned()
}

/// Scans for `@word` and `@word(args)` and compiles the known ones.
///
/// `@` preceded by a word character (an e-mail address) is left alone, and
/// `@@word` is never compiled: it emits `@word`, or stays `@@word` after a
/// word character. Unknown words pass through unchanged.
pub(crate) fn compile_statements<K, C>(
    source: &str,
    known: K,
    compile: C,
) -> Result<String, ViewError>
where
    K: Fn(&str) -> bool,
    C: Fn(&str, Option<&str>) -> Result<String, ViewError>,
{
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        let preceded_by_word = out.chars().last().is_some_and(is_word_char);

        if let Some(escaped) = after.strip_prefix('@') {
            let len = word_len(escaped);
            if len > 0 {
                if preceded_by_word {
                    out.push('@');
                }
                out.push('@');
                out.push_str(&escaped[..len]);
                rest = &escaped[len..];
                continue;
            }
        }

        let len = word_len(after);
        let word = &after[..len];
        if len == 0 || preceded_by_word || !known(word) {
            out.push('@');
            rest = after;
            continue;
        }

        let tail = &after[len..];
        let trimmed = tail.trim_start_matches(|c: char| c == ' ' || c == '\t');
        let (args, remaining) = if trimmed.starts_with('(') {
            let close = matching_paren(trimmed).ok_or_else(|| {
                ViewError::Syntax(format!("unbalanced parentheses in @{word}"))
            })?;
            (Some(&trimmed[1..close]), &trimmed[close + 1..])
        } else {
            (None, tail)
        };

        out.push_str(&compile(word, args)?);
        rest = remaining;
    }

    out.push_str(rest);
    Ok(out)
}

/// Compiles a built-in directive into minijinja.
pub(crate) fn compile_builtin(word: &str, args: Option<&str>) -> Result<String, ViewError> {
    let compiled = match word {
        "if" => format!("{{% if {} %}}", required(word, args)?),
        "elseif" => format!("{{% elif {} %}}", required(word, args)?),
        "else" => "{% else %}".to_string(),
        "unless" => format!("{{% if not ({}) %}}", required(word, args)?),
        "isset" => {
            let expr = required(word, args)?;
            format!("{{% if ({expr}) is defined and ({expr}) is not none %}}")
        }
        "empty" => match args {
            Some(expr) if !expr.trim().is_empty() => format!("{{% if not ({}) %}}", expr.trim()),
            // bare @empty is the fallback branch of @forelse
            _ => "{% else %}".to_string(),
        },
        "endif" | "endunless" | "endisset" | "endempty" => "{% endif %}".to_string(),
        "foreach" | "forelse" => compile_loop(word, required(word, args)?)?,
        "endforeach" | "endforelse" => "{% endfor %}".to_string(),
        "include" => {
            let parts = split_top_level(required(word, args)?);
            if parts.len() != 1 {
                return Err(ViewError::Syntax(
                    "@include takes exactly one view name".to_string(),
                ));
            }
            format!("{{% include {} %}}", parts[0])
        }
        "extends" => format!("{{% extends {} %}}", required(word, args)?),
        "section" => {
            let parts = split_top_level(required(word, args)?);
            match parts.as_slice() {
                [name] => format!("{{% block {} %}}", block_name(name)?),
                [name, value] => format!(
                    "{{% block {} %}}{{{{ ({value})|e }}}}{{% endblock %}}",
                    block_name(name)?
                ),
                _ => {
                    return Err(ViewError::Syntax(
                        "@section takes a name and an optional value".to_string(),
                    ))
                }
            }
        }
        "endsection" | "stop" | "show" => "{% endblock %}".to_string(),
        "yield" => {
            let parts = split_top_level(required(word, args)?);
            match parts.as_slice() {
                [name] => format!("{{% block {} %}}{{% endblock %}}", block_name(name)?),
                [name, default] => format!(
                    "{{% block {} %}}{{{{ ({default})|e }}}}{{% endblock %}}",
                    block_name(name)?
                ),
                _ => {
                    return Err(ViewError::Syntax(
                        "@yield takes a name and an optional default".to_string(),
                    ))
                }
            }
        }
        "parent" => "{{ super() }}".to_string(),
        "json" => format!("{{{{ ({})|tojson }}}}", required(word, args)?),
        other => return Err(ViewError::Syntax(format!("unknown directive @{other}"))),
    };
    Ok(compiled)
}

/// `items as item` or `items as key => value`.
fn compile_loop(word: &str, args: &str) -> Result<String, ViewError> {
    let (iterable, binding) = args
        .rsplit_once(" as ")
        .ok_or_else(|| ViewError::Syntax(format!("@{word} expects `items as item`")))?;
    let iterable = iterable.trim();

    match binding.split_once("=>") {
        Some((key, value)) => Ok(format!(
            "{{% for {}, {} in ({iterable})|items %}}",
            identifier(key.trim())?,
            identifier(value.trim())?
        )),
        None => Ok(format!(
            "{{% for {} in {iterable} %}}",
            identifier(binding.trim())?
        )),
    }
}

fn required<'a>(word: &str, args: Option<&'a str>) -> Result<&'a str, ViewError> {
    match args.map(str::trim) {
        Some(args) if !args.is_empty() => Ok(args),
        _ => Err(ViewError::Syntax(format!("@{word} requires an argument"))),
    }
}

/// Block names may be quoted; the result must be a bare identifier.
fn block_name(raw: &str) -> Result<&str, ViewError> {
    let name = unquote(raw.trim());
    identifier(name)
}

fn identifier(name: &str) -> Result<&str, ViewError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(ViewError::Syntax(format!("[{name}] is not a valid name")))
    }
}

fn unquote(s: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

/// Splits on commas outside brackets and string literals.
pub(crate) fn split_top_level(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in args.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(args[start..].trim());
    parts
}

/// Index of the `)` closing the `(` at the start of `s`.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn word_len(s: &str) -> usize {
    s.find(|c: char| !is_word_char(c)).unwrap_or(s.len())
}

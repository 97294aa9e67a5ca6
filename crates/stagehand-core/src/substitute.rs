//! `[TOKEN]` placeholder substitution in project files.
//!
//! A placeholder on a commented-out line is a template for the line after
//! it: the comment is kept verbatim so the file can be substituted again,
//! and the following line is replaced by the substituted text with its
//! comment marker removed.
//!
//! ```text
//! # db.url=[DB_URL]        # db.url=[DB_URL]
//! db.url=localhost    =>   db.url=jdbc:postgresql://db/app
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::descriptor::SubstitutionRule;
use crate::error::{Result, StagehandError};
use crate::tokens::TokenTable;

/// Substitute every `[TOKEN]` in `text`, applying the comment-template rule.
pub fn substitute_text(text: &str, tokens: &TokenTable) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut pending: Option<String> = None;

    for line in text.split_inclusive('\n') {
        if let Some(next) = pending.take() {
            out.push(with_ending(next, line));
            continue;
        }

        let Some(substituted) = replace_placeholders(line, tokens) else {
            out.push(line.to_string());
            continue;
        };
        debug!(original = line.trim_end(), substituted = substituted.trim_end(), "substituted line");

        if is_comment(&substituted) {
            out.push(line.to_string());
            pending = Some(uncomment(&substituted));
        } else {
            out.push(substituted);
        }
    }

    if let Some(next) = pending {
        if let Some(last) = out.last_mut() {
            if !last.ends_with('\n') {
                last.push('\n');
            }
        }
        out.push(next);
    }

    out.concat()
}

/// Substitute placeholders in one file in place. Returns whether it changed.
pub fn substitute_file(path: &Path, tokens: &TokenTable) -> Result<bool> {
    if !path.is_file() {
        return Err(StagehandError::MissingFile(path.to_path_buf()));
    }
    info!(file = %path.display(), "substituting file");
    let original = std::fs::read_to_string(path)?;
    let updated = substitute_text(&original, tokens);
    if updated == original {
        return Ok(false);
    }
    std::fs::write(path, updated)?;
    Ok(true)
}

/// Apply the descriptor's substitution rules under `workdir`.
///
/// Each rule sees the build tokens plus any of its `env_tokens` that are set
/// according to `env`. Returns the files that were rewritten.
pub fn apply_rules(
    rules: &[SubstitutionRule],
    tokens: &TokenTable,
    workdir: &Path,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Vec<PathBuf>> {
    let mut changed = Vec::new();

    for rule in rules {
        let mut rule_tokens = tokens.clone();
        for var in &rule.env_tokens {
            if let Some(value) = env(var) {
                rule_tokens.insert(var.clone(), value);
            }
        }

        let mut files = Vec::new();
        if let Some(name) = &rule.name {
            files.push(workdir.join(name));
        }
        if let Some(pattern) = &rule.pattern {
            files.extend(expand_pattern(workdir, pattern)?);
        }

        for file in files {
            if substitute_file(&file, &rule_tokens)? {
                changed.push(file);
            }
        }
    }

    Ok(changed)
}

/// Files under `workdir` matching `dir/glob` (searched recursively below
/// `dir`) or a bare `glob` (searched recursively below `workdir`).
fn expand_pattern(workdir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let (dir, name) = match pattern.rsplit_once('/') {
        Some((dir, name)) => (workdir.join(dir), name),
        None => (workdir.to_path_buf(), pattern),
    };
    let full = dir.join("**").join(name);
    let full = full.to_string_lossy();

    let invalid = |message: String| StagehandError::InvalidPattern {
        pattern: pattern.to_string(),
        message,
    };
    let mut files = Vec::new();
    for entry in glob::glob(&full).map_err(|e| invalid(e.to_string()))? {
        let path = entry.map_err(|e| invalid(e.to_string()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Replace `[TOKEN]` placeholders in a single string, without the
/// comment-template rule. Unknown placeholders are left as they are.
pub fn expand_placeholders(text: &str, tokens: &TokenTable) -> String {
    replace_placeholders(text, tokens).unwrap_or_else(|| text.to_string())
}

fn replace_placeholders(line: &str, tokens: &TokenTable) -> Option<String> {
    let mut result = line.to_string();
    let mut matched = false;
    for (key, value) in tokens.iter() {
        let placeholder = format!("[{key}]");
        if result.contains(&placeholder) {
            matched = true;
            result = result.replace(&placeholder, value);
        }
    }
    matched.then_some(result)
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#') || trimmed.starts_with("<!--")
}

fn uncomment(line: &str) -> String {
    let (body, ending) = split_ending(line);
    let indent_len = body.len() - body.trim_start().len();
    let (indent, rest) = body.split_at(indent_len);

    let rest = if let Some(xml) = rest.strip_prefix("<!--") {
        let xml = xml.trim_end();
        xml.strip_suffix("-->").unwrap_or(xml).trim().to_string()
    } else {
        rest.strip_prefix("# ")
            .or_else(|| rest.strip_prefix('#'))
            .unwrap_or(rest)
            .to_string()
    };
    format!("{indent}{rest}{ending}")
}

fn split_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// Give `replacement` the line ending of the line it replaces.
fn with_ending(replacement: String, replaced: &str) -> String {
    let (body, _) = split_ending(&replacement);
    let (_, ending) = split_ending(replaced);
    format!("{body}{ending}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> TokenTable {
        let mut t = TokenTable::new();
        t.insert("PACKAGE_VERSION", "1.0.7");
        t.insert("DB_URL", "jdbc:postgresql://db/app");
        t
    }

    #[test]
    fn replaces_plain_placeholders() {
        let out = substitute_text("version=[PACKAGE_VERSION]\nother=[UNKNOWN]\n", &tokens());
        assert_eq!(out, "version=1.0.7\nother=[UNKNOWN]\n");
    }

    #[test]
    fn comment_template_replaces_following_line() {
        let input = "# db.url=[DB_URL]\ndb.url=localhost\nkeep=1\n";
        let out = substitute_text(input, &tokens());
        assert_eq!(
            out,
            "# db.url=[DB_URL]\ndb.url=jdbc:postgresql://db/app\nkeep=1\n"
        );
        // Idempotent: the template survives, so a second pass is stable.
        assert_eq!(substitute_text(&out, &tokens()), out);
    }

    #[test]
    fn xml_comment_template_is_uncommented() {
        let input = "  <!-- <version>[PACKAGE_VERSION]</version> -->\n  <version>0</version>\n";
        let out = substitute_text(input, &tokens());
        assert_eq!(
            out,
            "  <!-- <version>[PACKAGE_VERSION]</version> -->\n  <version>1.0.7</version>\n"
        );
    }

    #[test]
    fn template_on_last_line_appends_uncommented_line() {
        let out = substitute_text("#v=[PACKAGE_VERSION]", &tokens());
        assert_eq!(out, "#v=[PACKAGE_VERSION]\nv=1.0.7");
    }

    #[test]
    fn indented_hash_template_keeps_indent_and_drops_marker_space() {
        let input = "  # url: [DB_URL]\n  url: localhost\n";
        let out = substitute_text(input, &tokens());
        assert_eq!(out, "  # url: [DB_URL]\n  url: jdbc:postgresql://db/app\n");
        assert_eq!(substitute_text(&out, &tokens()), out);
    }

    #[test]
    fn comment_without_placeholder_is_untouched() {
        let input = "# plain comment\nvalue=1\n";
        assert_eq!(substitute_text(input, &tokens()), input);
    }

    #[test]
    fn apply_rules_handles_names_patterns_and_env_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("conf/nested")).unwrap();
        std::fs::write(root.join("app.properties"), "pw=[DB_PASSWORD]\n").unwrap();
        std::fs::write(root.join("conf/a.xml"), "<v>[PACKAGE_VERSION]</v>\n").unwrap();
        std::fs::write(root.join("conf/nested/b.xml"), "<v>[PACKAGE_VERSION]</v>\n").unwrap();
        std::fs::write(root.join("conf/c.txt"), "[PACKAGE_VERSION]\n").unwrap();

        let rules = vec![
            SubstitutionRule {
                name: Some("app.properties".to_string()),
                pattern: None,
                env_tokens: vec!["DB_PASSWORD".to_string(), "UNSET_VAR".to_string()],
            },
            SubstitutionRule {
                name: None,
                pattern: Some("conf/*.xml".to_string()),
                env_tokens: Vec::new(),
            },
        ];
        let env = |name: &str| (name == "DB_PASSWORD").then(|| "s3cret".to_string());

        let changed = apply_rules(&rules, &tokens(), root, &env).unwrap();
        assert_eq!(changed.len(), 3);
        assert_eq!(
            std::fs::read_to_string(root.join("app.properties")).unwrap(),
            "pw=s3cret\n"
        );
        assert_eq!(
            std::fs::read_to_string(root.join("conf/nested/b.xml")).unwrap(),
            "<v>1.0.7</v>\n"
        );
        assert_eq!(
            std::fs::read_to_string(root.join("conf/c.txt")).unwrap(),
            "[PACKAGE_VERSION]\n"
        );
    }

    #[test]
    fn apply_rules_missing_named_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let rules = vec![SubstitutionRule {
            name: Some("absent.properties".to_string()),
            pattern: None,
            env_tokens: Vec::new(),
        }];
        let err = apply_rules(&rules, &tokens(), dir.path(), &|_| None).unwrap_err();
        assert!(matches!(err, StagehandError::MissingFile(_)));
    }
}

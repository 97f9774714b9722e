//! Post-processing of model replies.
//!
//! The model's free text is never trusted as structured data: a
//! classification reply must name exactly one known subject, and generated
//! SQL is pulled out of a fenced block when one is present.

use regex::Regex;
use std::sync::LazyLock;

/// Word the classification prompt asks for when no subject applies.
pub const UNCLASSIFIED_SENTINEL: &str = "None";

static SQL_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```sql(.*?)```").expect("Invalid SQL fence regex"));

/// Outcome of the classification step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Canonical name of the matched subject.
    Subject(String),
    Unclassified,
}

/// Interpret a classification reply against the registered subjects.
///
/// Surrounding whitespace, quotes, backticks and sentence punctuation are
/// stripped first. An empty reply or one starting with `none`
/// (any case) is unclassified, as is anything that is not exactly one
/// known subject name (compared case-insensitively). Subject names that
/// themselves end in punctuation (`Acme Inc.`) match with or without it.
pub fn parse_classification<S: AsRef<str>>(reply: &str, subjects: &[S]) -> Classification {
    let cleaned = strip_decoration(reply);

    if cleaned.is_empty()
        || cleaned
            .get(..UNCLASSIFIED_SENTINEL.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(UNCLASSIFIED_SENTINEL))
    {
        return Classification::Unclassified;
    }

    let quoted = reply.trim_matches(|c: char| c.is_whitespace() || is_quote(c));
    let names = || subjects.iter().map(AsRef::as_ref);
    names()
        .find(|subject| subject.trim().eq_ignore_ascii_case(quoted))
        .or_else(|| {
            names().find(|subject| strip_decoration(subject).eq_ignore_ascii_case(cleaned))
        })
        .map(|subject| Classification::Subject(subject.to_string()))
        .unwrap_or(Classification::Unclassified)
}

fn is_quote(c: char) -> bool {
    matches!(c, '"' | '\'' | '`')
}

fn strip_decoration(text: &str) -> &str {
    text.trim_matches(|c: char| {
        c.is_whitespace() || is_quote(c) || matches!(c, '.' | '!' | '?' | ',' | ';' | ':')
    })
}

/// Pull the SQL statement out of a model reply.
///
/// Uses the first ```` ```sql ... ``` ```` block, trimmed, with newlines
/// flattened to spaces. Without a block the whole reply is the statement.
pub fn extract_sql(reply: &str) -> String {
    match SQL_FENCE.captures(reply).and_then(|c| c.get(1)) {
        Some(block) => block
            .as_str()
            .trim()
            .replace("\r\n", " ")
            .replace('\n', " "),
        None => reply.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBJECTS: &[&str] = &["Invoices", "Employee Handbook"];

    #[test]
    fn test_exact_subject() {
        assert_eq!(
            parse_classification("Invoices", SUBJECTS),
            Classification::Subject("Invoices".to_string())
        );
    }

    #[test]
    fn test_subject_case_and_decoration_insensitive() {
        for reply in ["invoices", "  INVOICES\n", "\"Invoices\"", "`invoices`.", "Invoices!"] {
            assert_eq!(
                parse_classification(reply, SUBJECTS),
                Classification::Subject("Invoices".to_string()),
                "reply {:?}",
                reply
            );
        }
    }

    #[test]
    fn test_multi_word_subject() {
        assert_eq!(
            parse_classification("employee handbook", SUBJECTS),
            Classification::Subject("Employee Handbook".to_string())
        );
    }

    #[test]
    fn test_subject_ending_in_punctuation() {
        let subjects = ["Acme Inc.", "Q&A?", "Invoices"];
        for (reply, expected) in [
            ("Acme Inc.", "Acme Inc."),
            ("acme inc", "Acme Inc."),
            ("\"Acme Inc.\"", "Acme Inc."),
            ("Q&A?", "Q&A?"),
            ("q&a", "Q&A?"),
        ] {
            assert_eq!(
                parse_classification(reply, &subjects),
                Classification::Subject(expected.to_string()),
                "reply {:?}",
                reply
            );
        }
    }

    #[test]
    fn test_none_sentinel() {
        for reply in ["None", "none.", "NONE of the above", "  None", "'none'"] {
            assert_eq!(parse_classification(reply, SUBJECTS), Classification::Unclassified);
        }
    }

    #[test]
    fn test_empty_reply_is_unclassified() {
        assert_eq!(parse_classification("", SUBJECTS), Classification::Unclassified);
        assert_eq!(parse_classification(" \n ", SUBJECTS), Classification::Unclassified);
    }

    #[test]
    fn test_unknown_or_verbose_reply_is_unclassified() {
        assert_eq!(parse_classification("Payroll", SUBJECTS), Classification::Unclassified);
        assert_eq!(
            parse_classification("The subject is Invoices", SUBJECTS),
            Classification::Unclassified
        );
        assert_eq!(
            parse_classification("Invoices, Employee Handbook", SUBJECTS),
            Classification::Unclassified
        );
    }

    #[test]
    fn test_no_subjects_registered() {
        let none: &[&str] = &[];
        assert_eq!(parse_classification("Invoices", none), Classification::Unclassified);
    }

    #[test]
    fn test_owned_subject_list() {
        let subjects = vec!["Invoices".to_string()];
        assert_eq!(
            parse_classification("invoices", &subjects),
            Classification::Subject("Invoices".to_string())
        );
    }

    #[test]
    fn test_extract_fenced_sql() {
        assert_eq!(extract_sql("```sql SELECT 1```"), "SELECT 1");
    }

    #[test]
    fn test_extract_multiline_sql() {
        let reply = "Here you go:\n```sql\nSELECT customer\nFROM invoices\nWHERE amount > 100;\n```\nLet me know.";
        assert_eq!(
            extract_sql(reply),
            "SELECT customer FROM invoices WHERE amount > 100;"
        );
    }

    #[test]
    fn test_extract_first_block_only() {
        let reply = "```sql SELECT 1```\n```sql SELECT 2```";
        assert_eq!(extract_sql(reply), "SELECT 1");
    }

    #[test]
    fn test_no_fence_uses_whole_reply() {
        assert_eq!(extract_sql("SELECT * FROM invoices"), "SELECT * FROM invoices");
    }

    #[test]
    fn test_other_fence_language_is_not_sql() {
        let reply = "```python\nprint(1)\n```";
        assert_eq!(extract_sql(reply), reply);
    }
}

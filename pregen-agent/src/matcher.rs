//! Detection of "dimension finished generating" server log lines.
//!
//! Templates are literal text with `{field}` placeholders, e.g.
//! `Pre-generating of {dimension} finished, took {time}min`. Literal segments
//! must match exactly, each placeholder matches a non-empty run of text, and
//! the whole line must be covered. `{{` and `}}` stand for literal braces and
//! a `:spec` suffix inside a placeholder is accepted and ignored.

use crate::utils::{PregenError, Result};
use regex::Regex;

/// Name of the placeholder whose value is reported
pub const DIMENSION_FIELD: &str = "dimension";

/// Ordered list of compiled templates
#[derive(Debug, Clone)]
pub struct DimensionMatcher {
    patterns: Vec<Regex>,
}

impl DimensionMatcher {
    pub fn new(templates: &[String]) -> Result<Self> {
        let patterns = templates
            .iter()
            .map(|template| compile_template(template))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Dimension named by the first template that matches `line`
    pub fn match_line(&self, line: &str) -> Option<String> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .captures(line)
                .and_then(|caps| caps.name(DIMENSION_FIELD))
                .map(|m| m.as_str().to_string())
        })
    }
}

/// Translate a template into an anchored regex
pub fn compile_template(template: &str) -> Result<Regex> {
    let mut pattern = String::from("^");
    let mut literal = String::new();
    let mut seen = Vec::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => {
                            return Err(PregenError::Pattern(format!(
                                "unclosed placeholder in \"{}\"",
                                template
                            )))
                        }
                    }
                }
                pattern.push_str(&regex::escape(&literal));
                literal.clear();

                let name = field.split(':').next().unwrap_or_default().trim();
                if name.is_empty() {
                    pattern.push_str("(.+?)");
                } else if seen.iter().any(|s| s == name) {
                    return Err(PregenError::Pattern(format!(
                        "placeholder {{{}}} repeated in \"{}\"",
                        name, template
                    )));
                } else if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    pattern.push_str(&format!("(?P<{}>.+?)", name));
                    seen.push(name.to_string());
                } else {
                    return Err(PregenError::Pattern(format!(
                        "invalid placeholder {{{}}} in \"{}\"",
                        name, template
                    )));
                }
            }
            '}' => {
                return Err(PregenError::Pattern(format!(
                    "unmatched '}}' in \"{}\"",
                    template
                )))
            }
            c => literal.push(c),
        }
    }

    pattern.push_str(&regex::escape(&literal));
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| PregenError::Pattern(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(templates: &[&str]) -> DimensionMatcher {
        let templates: Vec<String> = templates.iter().map(|t| t.to_string()).collect();
        DimensionMatcher::new(&templates).unwrap()
    }

    #[test]
    fn test_matches_default_template() {
        let m = matcher(&["Pre-generating of {dimension} finished, took {time}min"]);
        assert_eq!(
            m.match_line("Pre-generating of overworld finished, took 3.5min"),
            Some("overworld".to_string())
        );
        assert_eq!(
            m.match_line("Pre-generating of the_nether finished, took 12min"),
            Some("the_nether".to_string())
        );
    }

    #[test]
    fn test_literal_segments_must_match_exactly() {
        let m = matcher(&["Pre-generating of {dimension} finished, took {time}min"]);
        assert_eq!(m.match_line("Pre-generating of overworld started"), None);
        assert_eq!(m.match_line("pre-generating of overworld finished, took 1min"), None);
        assert_eq!(
            m.match_line("<Steve> Pre-generating of overworld finished, took 1min"),
            None
        );
        assert_eq!(m.match_line("Pre-generating of  finished, took 1min"), None);
    }

    #[test]
    fn test_templates_tried_in_order() {
        let m = matcher(&[
            "Generation of {dimension} done",
            "Pre-generating of {dimension} finished, took {time}min",
            "{dimension} done",
        ]);
        assert_eq!(m.match_line("Generation of the_end done"), Some("the_end".to_string()));
        assert_eq!(
            m.match_line("Pre-generating of overworld finished, took 2min"),
            Some("overworld".to_string())
        );
        assert_eq!(m.match_line("nether done"), Some("nether".to_string()));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let m = matcher(&["[PreGen] ({dimension}) finished. {{ok}}"]);
        assert_eq!(
            m.match_line("[PreGen] (overworld) finished. {ok}"),
            Some("overworld".to_string())
        );
        assert_eq!(m.match_line("[PreGen] (overworld) finishedX {ok}"), None);
    }

    #[test]
    fn test_format_spec_is_ignored() {
        let m = matcher(&["{dimension} finished in {time:d}s"]);
        assert_eq!(m.match_line("overworld finished in 42s"), Some("overworld".to_string()));
    }

    #[test]
    fn test_template_without_dimension_never_reports() {
        let m = matcher(&["Done ({time})!"]);
        assert_eq!(m.match_line("Done (3.2s)!"), None);
    }

    #[test]
    fn test_invalid_templates() {
        assert!(compile_template("broken {dimension").is_err());
        assert!(compile_template("broken }").is_err());
        assert!(compile_template("{dimension} and {dimension}").is_err());
        assert!(compile_template("{bad-name}").is_err());
    }
}

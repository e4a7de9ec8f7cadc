use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use sprig_compiler::DirectiveRegistry;
use sprig_parser::{
    has_interpolation, parse_expression, parse_for_clause, parse_markup, parse_statements, parse_template,
    parse_var_bindings, Delimiters, MarkupNode, ParseError,
};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Template file or directory (defaults to the template directory)
    pub input: Option<PathBuf>,

    /// Also list files without problems
    #[arg(short, long)]
    pub verbose: bool,
}

/// How an attribute value is parsed
#[derive(Debug, Clone, Copy, PartialEq)]
enum ValueKind {
    Expression,
    Statements,
    ForClause,
    VarBindings,
    Template,
    Plain,
}

/// One problem found in a template
#[derive(Debug)]
pub struct Finding {
    pub message: String,
    pub report: Option<String>,
    pub error: bool,
}

impl Finding {
    fn error(message: String, report: String) -> Self {
        Self {
            message,
            report: Some(report),
            error: true,
        }
    }

    fn warning(message: String) -> Self {
        Self {
            message,
            report: None,
            error: false,
        }
    }
}

pub fn check(args: CheckArgs, config: &Config, cwd: &Path) -> Result<()> {
    let input = match &args.input {
        Some(path) => cwd.join(path),
        None => config.template_dir(cwd),
    };
    println!("🔍 {} Sprig templates", "Checking".green().bold());
    println!("   Input: {}", input.display());
    println!();

    let files = if input.is_file() {
        vec![input.clone()]
    } else if input.is_dir() {
        find_templates(&input)
    } else {
        return Err(anyhow::anyhow!("Input path does not exist: {}", input.display()));
    };

    let directives = DirectiveRegistry::new();
    let mut errors = 0;
    let mut warnings = 0;
    for file in &files {
        let source = fs::read_to_string(file)?;
        let findings = check_source(&source, &directives);
        if findings.is_empty() {
            if args.verbose {
                println!("   {} {}", "✓".green(), file.display());
            }
            continue;
        }

        println!("   {} {}", "✗".red(), file.display());
        for finding in findings {
            if finding.error {
                errors += 1;
                println!("     {} {}", "error:".red().bold(), finding.message);
            } else {
                warnings += 1;
                println!("     {} {}", "warning:".yellow().bold(), finding.message);
            }
            if let Some(report) = finding.report {
                eprintln!("{}", report);
            }
        }
    }

    println!();
    println!("   Files checked: {}", files.len());
    if warnings > 0 {
        println!("   {} {}", "Warnings:".yellow(), warnings);
    }
    if errors > 0 {
        println!("   {} {}", "Errors:".red(), errors);
        return Err(anyhow::anyhow!("{} template error(s)", errors));
    }
    println!("✨ {}", "No errors".green().bold());
    Ok(())
}

fn find_templates(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "html"))
        .collect();
    files.sort();
    files
}

/// Parse the markup and every directive, binding and interpolation in it
pub fn check_source(source: &str, directives: &DirectiveRegistry) -> Vec<Finding> {
    let markup = match parse_markup(source) {
        Ok(markup) => markup,
        Err(err) => return vec![Finding::error(err.to_string(), err.report(source))],
    };

    let mut checker = Checker {
        source,
        directives,
        findings: Vec::new(),
        cursor: 0,
    };
    checker.visit_all(&markup, Delimiters::MUSTACHE);
    checker.findings
}

struct Checker<'a> {
    source: &'a str,
    directives: &'a DirectiveRegistry,
    findings: Vec<Finding>,
    /// Search start for locating attribute values, advanced in document order
    cursor: usize,
}

impl Checker<'_> {
    fn visit_all(&mut self, nodes: &[MarkupNode], delimiters: Delimiters) {
        for node in nodes {
            self.visit(node, delimiters);
        }
    }

    fn visit(&mut self, node: &MarkupNode, delimiters: Delimiters) {
        match node {
            MarkupNode::Element {
                tag,
                attributes,
                children,
            } => {
                let mut raw = false;
                for (name, value) in attributes {
                    if name == ":skip" || name == ":pre" {
                        raw = true;
                    }
                    self.check_attribute(tag, name, value);
                }
                if raw {
                    return;
                }
                let inner = if tag == "style" {
                    Delimiters::STYLE
                } else {
                    delimiters
                };
                self.visit_all(children, inner);
            }
            MarkupNode::Text { content } if has_interpolation(content, delimiters) => {
                if let Err(err) = parse_template(content, delimiters) {
                    self.report(format!("in text `{}`", content.trim()), content, err);
                }
            }
            _ => {}
        }
    }

    fn check_attribute(&mut self, tag: &str, name: &str, value: &str) {
        let kind = match self.classify(name) {
            Ok(kind) => kind,
            Err(message) => {
                self.findings
                    .push(Finding::warning(format!("{} on <{}>", message, tag)));
                return;
            }
        };

        let result = match kind {
            ValueKind::Expression => parse_expression(value).map(|_| ()),
            ValueKind::Statements => parse_statements(value).map(|_| ()),
            ValueKind::ForClause => parse_for_clause(value).map(|_| ()),
            ValueKind::VarBindings => parse_var_bindings(value).map(|_| ()),
            ValueKind::Template if has_interpolation(value, Delimiters::MUSTACHE) => {
                parse_template(value, Delimiters::MUSTACHE).map(|_| ())
            }
            ValueKind::Template | ValueKind::Plain => Ok(()),
        };
        if let Err(err) = result {
            self.report(format!("in {}=\"{}\" on <{}>", name, value, tag), value, err);
        }
    }

    fn classify(&self, name: &str) -> Result<ValueKind, String> {
        let Some(prefix) = name.chars().next() else {
            return Ok(ValueKind::Plain);
        };
        let rest = &name[prefix.len_utf8()..];
        let kind = match prefix {
            '@' => ValueKind::Statements,
            '$' | '!' | '.' => ValueKind::Expression,
            ':' => match rest {
                "for" => ValueKind::ForClause,
                "var" => ValueKind::VarBindings,
                "if" | "elseif" | "show" | "html" | "text" | "checked" | "model" | "state" => ValueKind::Expression,
                "exec" | "submit" => ValueKind::Statements,
                "else" | "elserouter" | "routerelse" => ValueKind::Plain,
                other => match self.directives.lookup(other) {
                    Some(_) => ValueKind::Plain,
                    None => return Err(format!("unknown directive :{}", other)),
                },
            },
            _ => ValueKind::Template,
        };
        Ok(kind)
    }

    /// Record `err`, rendered against the whole file when `fragment` can be found in it
    fn report(&mut self, message: String, fragment: &str, err: ParseError) {
        let found = self.source[self.cursor..].find(fragment).map(|i| i + self.cursor);
        let report = match found {
            Some(base) => {
                self.cursor = base;
                err.clone().offset_by(base).report(self.source)
            }
            None => err.report(fragment),
        };
        self.findings
            .push(Finding::error(format!("{}: {}", message, err), report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn findings(source: &str) -> Vec<Finding> {
        check_source(source, &DirectiveRegistry::new())
    }

    #[test]
    fn test_clean_template() {
        let source = r#"<ul><li :for="x, i of items" @click="pick(x)" .active="i == 0">{{ x.name#upper }}</li></ul>
<form :submit="save()"><input :model="user.email" :validate="required email"></form>
<p :router="/^/post/\d+$/">post</p><p :routerelse>home</p>"#;
        assert!(findings(source).is_empty());
    }

    #[test]
    fn test_bad_expression_is_reported() {
        let found = findings(r#"<p :if="a &&">x</p>"#);
        assert_eq!(found.len(), 1);
        assert!(found[0].error);
        assert!(found[0].message.contains(":if"));
    }

    #[test]
    fn test_bad_interpolation_in_text() {
        let found = findings("<p>{{ 1 + }}</p>");
        assert_eq!(found.len(), 1);
        assert!(found[0].message.contains("in text"));
    }

    #[test]
    fn test_unknown_directive_is_a_warning() {
        let found = findings(r#"<p :sparkle="yes">x</p>"#);
        assert_eq!(found.len(), 1);
        assert!(!found[0].error);
        assert!(found[0].message.contains(":sparkle"));
    }

    #[test]
    fn test_skipped_subtree_is_not_checked() {
        assert!(findings("<div :skip><p>{{ 1 + }}</p></div>").is_empty());
    }

    #[test]
    fn test_style_uses_percent_delimiters() {
        assert!(findings("<style>p { color: {% tone %}; }</style>").is_empty());
        assert_eq!(findings("<style>p { color: {% tone + %}; }</style>").len(), 1);
    }

    #[test]
    fn test_markup_error() {
        let found = findings("<p><!-- open");
        assert_eq!(found.len(), 1);
        assert!(found[0].report.is_some());
    }

    #[test]
    fn test_finds_html_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.html"), "<p></p>").unwrap();
        fs::write(dir.path().join("nested/b.html"), "<p></p>").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        assert_eq!(find_templates(dir.path()).len(), 2);
    }
}

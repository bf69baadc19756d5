use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding the crate's own sources. Nothing else is scanned.
const SOURCE_ROOTS: [&str; 4] = ["impute", "src", "tests", "benches"];

const FORBIDDEN_WORDS: [&str; 14] = [
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

#[derive(Clone, Copy)]
enum Rule {
    UnderscorePrefix,
    ForbiddenWord,
    StarsInComment,
    UppercaseComment,
    AllowDeadCode,
}

impl Rule {
    fn pattern(self) -> String {
        match self {
            Rule::UnderscorePrefix => r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            Rule::ForbiddenWord => format!(r"(//|/\*).*(?:{})", FORBIDDEN_WORDS.join("|")),
            Rule::StarsInComment => r"(//|/\*).*\*\*".to_string(),
            Rule::UppercaseComment => r"(//|/\*).*".to_string(),
            Rule::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
        }
    }

    fn explanation(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => {
                "Underscore-prefixed names are not allowed. Use the binding or remove it."
            }
            Rule::ForbiddenWord => {
                "Comments must not narrate edits (FIX, NEW, CHANGE, UPDATE and similar)."
            }
            Rule::StarsInComment => "The '**' pattern is only allowed in doc comments.",
            Rule::UppercaseComment => "Comments made only of uppercase letters are not allowed.",
            Rule::AllowDeadCode => "#[allow(dead_code)] is not allowed. Use the code or delete it.",
        }
    }
}

// Collects the offending lines of one file for one rule.
struct PolicyCollector {
    rule: Rule,
    violations: Vec<String>,
}

impl PolicyCollector {
    fn new(rule: Rule) -> Self {
        Self {
            rule,
            violations: Vec::new(),
        }
    }

    fn is_violation(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match self.rule {
            Rule::UnderscorePrefix => {
                let is_comment = trimmed.starts_with("//") || line.contains("/*");
                // Odd segments of a quote split sit inside string literals.
                let in_string = line
                    .split('"')
                    .enumerate()
                    .any(|(i, part)| i % 2 == 1 && part.contains('_'));
                !is_comment && !in_string
            }
            Rule::ForbiddenWord | Rule::AllowDeadCode => true,
            Rule::StarsInComment => !trimmed.starts_with("///") && !trimmed.starts_with("//!"),
            Rule::UppercaseComment => {
                let Some(idx) = line.find("//").or_else(|| line.find("/*")) else {
                    return false;
                };
                let text = line[idx..].trim_start_matches(['/', '*', '!']);
                // Code spans name constants and types; only the prose counts.
                let prose = text.split('`').step_by(2).collect::<String>();
                let letters: Vec<char> = prose.chars().filter(|c| c.is_alphabetic()).collect();
                !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
            }
        }
    }

    fn error_message(&self, path: &Path) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let mut msg = format!(
            "\n❌ ERROR: {} policy violation(s) in {}:\n",
            self.violations.len(),
            path.display()
        );
        for violation in &self.violations {
            msg.push_str(&format!("   {violation}\n"));
        }
        msg.push_str(&format!("\n⚠️ {}\n", self.rule.explanation()));
        Some(msg)
    }
}

impl Sink for PolicyCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.is_violation(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn source_files() -> Vec<PathBuf> {
    SOURCE_ROOTS
        .iter()
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn check(rule: Rule, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(&rule.pattern())?;
    let mut searcher = Searcher::new();
    for path in files {
        let mut collector = PolicyCollector::new(rule);
        searcher.search_path(&matcher, path, &mut collector)?;
        if let Some(message) = collector.error_message(path) {
            return Err(message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SOURCE_ROOTS {
        println!("cargo:rerun-if-changed={root}");
    }

    let files = source_files();
    for rule in [
        Rule::UnderscorePrefix,
        Rule::ForbiddenWord,
        Rule::StarsInComment,
        Rule::UppercaseComment,
        Rule::AllowDeadCode,
    ] {
        if let Err(e) = check(rule, &files) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

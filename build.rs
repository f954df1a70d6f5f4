use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Only the crate's own sources are policed; reference material elsewhere in the
// working tree is not ours to lint.
static SOURCE_ROOTS: [&str; 4] = ["predictor", "src", "tests", "benches"];

// Collects every offending line of a single file for one rule.
struct ViolationCollector {
    rule: &'static str,
    hint: &'static str,
    violations: Vec<String>,
    file_path: PathBuf,
}

impl ViolationCollector {
    fn new(file_path: &Path, rule: &'static str, hint: &'static str) -> Self {
        Self {
            rule,
            hint,
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule,
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!("\n⚠️ {}\n", self.hint));
        Some(error_msg)
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        // Comments and string literals may mention identifiers freely.
        let code = line_text.split("//").next().unwrap_or("");
        let outside_strings: String = code
            .split('"')
            .enumerate()
            .filter(|(i, _)| i % 2 == 0)
            .map(|(_, part)| part)
            .collect();

        if self.rule == "underscore-prefixed identifiers" && !has_underscore_identifier(&outside_strings)
        {
            return Ok(true);
        }

        self.violations.push(format!("{line_number}: {line_text}"));
        Ok(true)
    }
}

fn has_underscore_identifier(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.windows(2).enumerate().any(|(i, pair)| {
        let starts_word = i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_');
        starts_word && pair[0] == b'_' && (pair[1].is_ascii_alphanumeric() || pair[1] == b'_')
    })
}

fn rust_sources() -> impl Iterator<Item = PathBuf> {
    SOURCE_ROOTS
        .iter()
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
}

fn scan(pattern: &str, rule: &'static str, hint: &'static str) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(pattern)?;
    let mut searcher = Searcher::new();

    for path in rust_sources() {
        let mut collector = ViolationCollector::new(&path, rule, hint);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(error_message) = collector.check_and_get_error_message() {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SOURCE_ROOTS.iter() {
        println!("cargo:rerun-if-changed={root}");
    }

    // Underscore prefixes silence the unused-variable lint; use the binding or drop it.
    if let Err(e) = scan(
        r"\b_[a-zA-Z0-9_]+\b",
        "underscore-prefixed identifiers",
        "Underscore-prefixed names are not allowed. Use the value or remove it.",
    ) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    if let Err(e) = scan(
        r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        "#[allow(dead_code)] attributes",
        "Dead code must be deleted, not silenced.",
    ) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

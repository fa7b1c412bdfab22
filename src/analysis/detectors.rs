//! Heuristic detectors run by the code analyzer.
//!
//! Each detector inspects one fetched source file and, when it finds
//! something, returns a complete proposal including the rewritten content.
//! Detection and rewrite stay together so a syntax-aware implementation can
//! replace a detector without touching the analyzer or the pipeline.

use crate::types::{Category, EnhancementProposal, FileChange, FileOperation, Impact};
use regex::Regex;

/// Source languages the built-in detectors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    JavaScript,
    TypeScript,
    Rust,
    Python,
    Other,
}

impl Language {
    pub fn from_path(path: &str) -> Self {
        let ext = path.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        match ext.to_ascii_lowercase().as_str() {
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "rs" => Self::Rust,
            "py" => Self::Python,
            _ => Self::Other,
        }
    }

    fn is_js_family(self) -> bool {
        matches!(self, Self::JavaScript | Self::TypeScript)
    }

    fn line_comment(self) -> &'static str {
        match self {
            Self::Python => "#",
            _ => "//",
        }
    }
}

/// A fetched file handed to detectors.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub language: Language,
    pub content: String,
    pub sha: String,
}

impl SourceFile {
    pub fn new(path: &str, content: &str, sha: &str) -> Self {
        Self {
            path: path.to_string(),
            language: Language::from_path(path),
            content: content.to_string(),
            sha: sha.to_string(),
        }
    }
}

/// A pluggable heuristic.
pub trait Detector: Send + Sync {
    /// Stable slug, used in proposal ids and branch names.
    fn name(&self) -> &'static str;

    fn inspect(&self, file: &SourceFile) -> Option<EnhancementProposal>;
}

/// The built-in battery, in ranking order.
pub fn default_detectors() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(HardcodedSecretDetector::new()),
        Box::new(UnguardedAwaitDetector::new()),
        Box::new(StrayLoggingDetector::new()),
        Box::new(TodoMarkerDetector::new()),
        Box::new(EmptyFileDetector),
    ]
}

fn proposal_id(slug: &str) -> String {
    format!("{}-{}", slug, ulid::Ulid::new().to_string().to_lowercase())
}

fn update(file: &SourceFile, content: String) -> Vec<FileChange> {
    vec![FileChange {
        path: file.path.clone(),
        content,
        operation: FileOperation::Update,
    }]
}

fn indent_of(line: &str) -> &str {
    let trimmed = line.trim_start();
    &line[..line.len() - trimmed.len()]
}

/// Re-join lines, keeping the file's trailing newline if it had one.
fn join_lines(lines: &[String], original: &str) -> String {
    let mut out = lines.join("\n");
    if original.ends_with('\n') {
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Hardcoded secrets
// ---------------------------------------------------------------------------

/// Credentials written as string literals.
pub struct HardcodedSecretDetector {
    pattern: Regex,
}

impl HardcodedSecretDetector {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(
                r#"(?i)\b([A-Za-z0-9_]*(?:api_?key|secret|token|password|passwd))\s*[:=]\s*(["'][A-Za-z0-9_\-\.]{12,}["'])"#,
            )
            .expect("secret pattern is valid"),
        }
    }
}

impl Default for HardcodedSecretDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// `githubApiKey` / `github_api_key` -> `GITHUB_API_KEY`.
fn env_var_name(identifier: &str) -> String {
    let mut out = String::with_capacity(identifier.len() + 4);
    let mut prev_lower = false;
    for ch in identifier.chars() {
        if ch.is_ascii_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        out.push(ch.to_ascii_uppercase());
    }
    out
}

impl Detector for HardcodedSecretDetector {
    fn name(&self) -> &'static str {
        "hardcoded-secret"
    }

    fn inspect(&self, file: &SourceFile) -> Option<EnhancementProposal> {
        let comment = file.language.line_comment();
        let mut hits = Vec::new();
        let mut lines = Vec::new();

        for (idx, line) in file.content.lines().enumerate() {
            let Some(caps) = self.pattern.captures(line) else {
                lines.push(line.to_string());
                continue;
            };
            let ident = &caps[1];
            let var = env_var_name(ident);
            hits.push(format!("line {}: {}", idx + 1, ident));

            if file.language.is_js_family() {
                lines.push(line.replacen(&caps[2], &format!("process.env.{var}"), 1));
            } else {
                lines.push(format!(
                    "{}{} SECURITY: load {} from the environment ({})",
                    indent_of(line),
                    comment,
                    ident,
                    var
                ));
                lines.push(line.to_string());
            }
        }

        if hits.is_empty() {
            return None;
        }

        Some(EnhancementProposal {
            id: proposal_id(self.name()),
            title: format!("Move hardcoded credentials out of {}", file.path),
            description: format!(
                "{} credential literal(s) found in {}: {}",
                hits.len(),
                file.path,
                hits.join(", ")
            ),
            files: update(file, join_lines(&lines, &file.content)),
            rationale: "Secrets committed to source control leak through every clone and fork."
                .into(),
            estimated_impact: Impact::High,
            category: Category::Security,
        })
    }
}

// ---------------------------------------------------------------------------
// Unguarded awaits
// ---------------------------------------------------------------------------

/// Suspend points whose failure nothing handles.
pub struct UnguardedAwaitDetector {
    js_await: Regex,
    js_try: Regex,
    rust_unwrap: Regex,
}

impl UnguardedAwaitDetector {
    pub fn new() -> Self {
        Self {
            js_await: Regex::new(r"\bawait\b").expect("await pattern is valid"),
            js_try: Regex::new(r"\btry\s*\{").expect("try pattern is valid"),
            rust_unwrap: Regex::new(r"\.await\s*\.\s*(unwrap|expect)\s*\(")
                .expect("unwrap pattern is valid"),
        }
    }

    /// Line indexes of `await`s outside any try block.
    fn unguarded_js_lines(&self, content: &str) -> Vec<usize> {
        let mut depth: i64 = 0;
        let mut try_stack: Vec<i64> = Vec::new();
        let mut found = Vec::new();

        for (idx, raw) in content.lines().enumerate() {
            let code = raw.split("//").next().unwrap_or("");
            let trimmed = code.trim_start();
            if trimmed.starts_with('*') || trimmed.starts_with("/*") {
                continue;
            }

            if self.js_await.is_match(code)
                && try_stack.is_empty()
                && !code.contains(".catch(")
                && !self.js_try.is_match(code)
            {
                found.push(idx);
            }

            if self.js_try.is_match(code) {
                try_stack.push(depth);
            }
            depth += code.matches('{').count() as i64;
            depth -= code.matches('}').count() as i64;
            while try_stack.last().is_some_and(|&d| d >= depth) {
                try_stack.pop();
            }
        }

        found
    }

    fn rewrite_js(&self, file: &SourceFile, flagged: &[usize]) -> String {
        let mut out = Vec::new();
        for (idx, line) in file.content.lines().enumerate() {
            if !flagged.contains(&idx) {
                out.push(line.to_string());
                continue;
            }
            let indent = indent_of(line);
            let stmt = line.trim();
            if stmt.starts_with("await ") && stmt.ends_with(';') {
                out.push(format!("{indent}try {{"));
                out.push(format!("{indent}  {stmt}"));
                out.push(format!("{indent}}} catch (error) {{"));
                out.push(format!(
                    "{indent}  console.error('{}:{} awaited call failed', error);",
                    file.path,
                    idx + 1
                ));
                out.push(format!("{indent}  throw error;"));
                out.push(format!("{indent}}}"));
            } else {
                out.push(format!(
                    "{indent}// FIXME: a rejection from this awaited call is not handled"
                ));
                out.push(line.to_string());
            }
        }
        join_lines(&out, &file.content)
    }
}

impl Default for UnguardedAwaitDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for UnguardedAwaitDetector {
    fn name(&self) -> &'static str {
        "unguarded-await"
    }

    fn inspect(&self, file: &SourceFile) -> Option<EnhancementProposal> {
        let (flagged, content) = match file.language {
            Language::JavaScript | Language::TypeScript => {
                let flagged = self.unguarded_js_lines(&file.content);
                let content = self.rewrite_js(file, &flagged);
                (flagged, content)
            }
            Language::Rust => {
                let mut flagged = Vec::new();
                let mut out = Vec::new();
                for (idx, line) in file.content.lines().enumerate() {
                    if self.rust_unwrap.is_match(line) {
                        flagged.push(idx);
                        out.push(format!(
                            "{}// FIXME: propagate this error instead of panicking",
                            indent_of(line)
                        ));
                    }
                    out.push(line.to_string());
                }
                (flagged, join_lines(&out, &file.content))
            }
            _ => return None,
        };

        if flagged.is_empty() {
            return None;
        }

        let lines: Vec<String> = flagged.iter().map(|i| (i + 1).to_string()).collect();
        Some(EnhancementProposal {
            id: proposal_id(self.name()),
            title: format!("Handle failures of awaited calls in {}", file.path),
            description: format!(
                "Awaited calls without error handling at line(s) {} of {}",
                lines.join(", "),
                file.path
            ),
            files: update(file, content),
            rationale: "An unhandled rejection or panic at a suspend point aborts the whole task."
                .into(),
            estimated_impact: Impact::Medium,
            category: Category::BugFix,
        })
    }
}

// ---------------------------------------------------------------------------
// Stray logging
// ---------------------------------------------------------------------------

const DEBUG_PATH_MARKERS: &[&str] = &["debug", "test", "spec", "mock", "fixture"];

/// Logging calls left in production paths.
pub struct StrayLoggingDetector {
    js: Regex,
    rust: Regex,
    python: Regex,
}

impl StrayLoggingDetector {
    pub fn new() -> Self {
        Self {
            js: Regex::new(r"^\s*console\.(log|info|debug)\s*\(").expect("js pattern is valid"),
            rust: Regex::new(r"\b(e?println|dbg)!\s*\(").expect("rust pattern is valid"),
            python: Regex::new(r"^\s*print\s*\(").expect("python pattern is valid"),
        }
    }

    fn pattern(&self, language: Language) -> Option<&Regex> {
        match language {
            Language::JavaScript | Language::TypeScript => Some(&self.js),
            Language::Rust => Some(&self.rust),
            Language::Python => Some(&self.python),
            Language::Other => None,
        }
    }
}

impl Default for StrayLoggingDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// A directory or file-name token (split on `.`, `_`, `-`) names a debug
/// marker, singular or plural: `tests/`, `__mocks__/`, `app.spec.ts`.
fn is_debug_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower
        .split('/')
        .flat_map(|segment| segment.split(['.', '_', '-']))
        .any(|token| {
            let singular = token.strip_suffix('s').unwrap_or(token);
            DEBUG_PATH_MARKERS.contains(&token) || DEBUG_PATH_MARKERS.contains(&singular)
        })
}

impl Detector for StrayLoggingDetector {
    fn name(&self) -> &'static str {
        "stray-logging"
    }

    fn inspect(&self, file: &SourceFile) -> Option<EnhancementProposal> {
        let pattern = self.pattern(file.language)?;
        if is_debug_path(&file.path) {
            return None;
        }

        let mut hits = Vec::new();
        let mut out: Vec<String> = Vec::new();
        let mut prev_code = String::new();

        for (idx, line) in file.content.lines().enumerate() {
            let guarded = line.to_ascii_lowercase().contains("debug")
                && !line.contains("console.debug")
                || prev_code.to_ascii_lowercase().contains("debug");
            let stray = pattern.is_match(line) && !guarded;
            if !line.trim().is_empty() {
                prev_code = line.to_string();
            }

            if !stray {
                out.push(line.to_string());
                continue;
            }
            hits.push(idx + 1);

            match file.language {
                Language::JavaScript | Language::TypeScript => {
                    let stmt = line.trim_end();
                    // multi-line calls are left for a human
                    if !(stmt.ends_with(");") || stmt.ends_with(')')) {
                        out.push(line.to_string());
                    }
                }
                Language::Rust => out.push(
                    line.replace("eprintln!(", "tracing::debug!(")
                        .replace("println!(", "tracing::debug!("),
                ),
                Language::Python => out.push(line.replacen("print(", "logging.debug(", 1)),
                Language::Other => out.push(line.to_string()),
            }
        }

        if hits.is_empty() {
            return None;
        }

        if file.language == Language::Python
            && !file.content.lines().any(|l| l.trim() == "import logging")
        {
            out.insert(0, "import logging".to_string());
        }

        let content = join_lines(&out, &file.content);
        if content == file.content {
            return None;
        }

        let lines: Vec<String> = hits.iter().map(|n| n.to_string()).collect();
        Some(EnhancementProposal {
            id: proposal_id(self.name()),
            title: format!("Remove stray logging from {}", file.path),
            description: format!(
                "Logging calls outside a debug path at line(s) {} of {}",
                lines.join(", "),
                file.path
            ),
            files: update(file, content),
            rationale: "Unconditional console output adds noise and can leak data in production."
                .into(),
            estimated_impact: Impact::Low,
            category: Category::Refactor,
        })
    }
}

// ---------------------------------------------------------------------------
// TODO markers
// ---------------------------------------------------------------------------

/// Collects TODO/FIXME/HACK comments into a tracking document.
pub struct TodoMarkerDetector {
    pattern: Regex,
}

impl TodoMarkerDetector {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"(?://|#|/\*)\s*(TODO|FIXME|HACK)\b[:\s]*(.*)")
                .expect("marker pattern is valid"),
        }
    }
}

impl Default for TodoMarkerDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for TodoMarkerDetector {
    fn name(&self) -> &'static str {
        "todo-markers"
    }

    fn inspect(&self, file: &SourceFile) -> Option<EnhancementProposal> {
        if file.language == Language::Other {
            return None;
        }

        let rows: Vec<String> = file
            .content
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                self.pattern.captures(line).map(|caps| {
                    let note = caps[2].trim().trim_end_matches("*/").trim().replace('|', "\\|");
                    format!("| {} | {} | {} |", idx + 1, &caps[1], note)
                })
            })
            .collect();

        if rows.is_empty() {
            return None;
        }

        let doc_path = format!("docs/todo/{}.md", file.path.replace('/', "__"));
        let mut doc = format!(
            "# Open markers in `{}`\n\n| Line | Marker | Note |\n|------|--------|------|\n",
            file.path
        );
        for row in &rows {
            doc.push_str(row);
            doc.push('\n');
        }

        Some(EnhancementProposal {
            id: proposal_id(self.name()),
            title: format!("Track {} open marker(s) from {}", rows.len(), file.path),
            description: format!("Collects TODO/FIXME/HACK comments of {} into {}", file.path, doc_path),
            files: vec![FileChange {
                path: doc_path,
                content: doc,
                operation: FileOperation::Create,
            }],
            rationale: "Markers buried in code are invisible to planning.".into(),
            estimated_impact: Impact::Low,
            category: Category::Feature,
        })
    }
}

// ---------------------------------------------------------------------------
// Empty files
// ---------------------------------------------------------------------------

/// Source files with no content at all.
pub struct EmptyFileDetector;

impl Detector for EmptyFileDetector {
    fn name(&self) -> &'static str {
        "empty-file"
    }

    fn inspect(&self, file: &SourceFile) -> Option<EnhancementProposal> {
        let file_name = file.path.rsplit('/').next().unwrap_or(&file.path);
        // package markers are legitimately empty
        if matches!(file_name, "__init__.py" | "mod.rs" | "index.ts" | "index.js") {
            return None;
        }
        if !file.content.trim().is_empty() {
            return None;
        }

        Some(EnhancementProposal {
            id: proposal_id(self.name()),
            title: format!("Delete empty file {}", file.path),
            description: format!("{} contains no code", file.path),
            files: vec![FileChange {
                path: file.path.clone(),
                content: String::new(),
                operation: FileOperation::Delete,
            }],
            rationale: "Empty modules suggest unfinished work and clutter the tree.".into(),
            estimated_impact: Impact::Low,
            category: Category::Refactor,
        })
    }
}

//! ResponseExtractor: turns raw model text into typed, actionable content.
//!
//! Independent pattern passes over the text; malformed input never errors,
//! each pass just degrades to an empty result for its category.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

mod plan;

pub use plan::{ImplementationPlan, PlanPhase};
pub(crate) use plan::build_plan;

// ============================================================================
// Extracted Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Create,
    Modify,
    Delete,
}

impl FileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileAction::Create => "create",
            FileAction::Modify => "modify",
            FileAction::Delete => "delete",
        }
    }
}

/// A file the response wants touched, with the nearest code block attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileModification {
    pub path: String,
    pub action: FileAction,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    PackageManagement,
    VersionControl,
    Execution,
    Testing,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellCommand {
    pub command: String,
    pub category: CommandCategory,
}

/// Everything the extractor pulled out of one raw response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedResponse {
    pub code_blocks: Vec<CodeBlock>,
    pub file_modifications: Vec<FileModification>,
    pub commands: Vec<ShellCommand>,
    pub dependencies: Vec<String>,
    pub explanations: Vec<String>,
    pub validation_steps: Vec<String>,
    pub plan: ImplementationPlan,
    pub confidence: f64,
    pub warnings: Vec<String>,
}

impl ProcessedResponse {
    /// True when no pass produced anything actionable.
    pub fn is_empty(&self) -> bool {
        self.code_blocks.is_empty()
            && self.file_modifications.is_empty()
            && self.commands.is_empty()
            && self.dependencies.is_empty()
    }
}

// ============================================================================
// Patterns
// ============================================================================

static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```([a-zA-Z0-9_+-]*)[ \t]*\n(.*?)```").expect("fence regex"));

static FILE_DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(create|add|new file|modify|update|edit|change|delete|remove)\b[^\n`]{0,40}`([^`\n]+\.[a-zA-Z0-9]{1,8})`",
    )
    .expect("file directive regex")
});

static FILE_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^(?:file|path|filename)\s*:\s*([^\s`]+\.[a-zA-Z0-9]{1,8})\s*$")
        .expect("file header regex")
});

static COMMAND_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:\$|>)\s+(.+)$").expect("command line regex"));

static DEPENDENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:npm install|npm i|yarn add|pnpm add|pip install|pip3 install|cargo add|gem install|go get)[ \t]+((?:[\w@./-]+[ \t]*)+)",
    )
    .expect("dependency regex")
});

static NUMBERED_STEP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s+").expect("numbered step regex"));

const HEDGING_WORDS: &[&str] = &["maybe", "might", "could possibly", "perhaps", "not sure"];

const VALIDATION_VERBS: &[&str] = &["verify", "test", "check", "ensure", "confirm", "validate"];

const ACTIONABLE_VERBS: &[&str] = &[
    "create", "add", "install", "run", "modify", "update", "delete", "implement", "configure",
];

const LANGUAGE_NAMES: &[&str] = &[
    "rust",
    "python",
    "javascript",
    "typescript",
    "go",
    "java",
    "ruby",
    "bash",
    "sql",
];

// ============================================================================
// Extractor
// ============================================================================

#[derive(Debug, Default)]
pub struct ResponseExtractor;

impl ResponseExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Run every pass over the raw text. Never fails: an empty or
    /// unstructured input produces an empty response with confidence 0.
    pub fn process(&self, raw: &str) -> ProcessedResponse {
        let code_blocks = extract_code_blocks(raw);
        let file_modifications = extract_file_modifications(raw, &code_blocks);
        let commands = extract_commands(raw, &code_blocks);
        let dependencies = extract_dependencies(raw);
        let explanations = extract_explanations(raw);
        let validation_steps = extract_validation_steps(raw);

        let plan = plan::build_plan(
            &dependencies,
            &file_modifications,
            &commands,
            &validation_steps,
        );

        let confidence = score_confidence(raw, &code_blocks);
        let mut warnings = collect_warnings(raw);

        let response = ProcessedResponse {
            code_blocks,
            file_modifications,
            commands,
            dependencies,
            explanations,
            validation_steps,
            plan,
            confidence,
            warnings: Vec::new(),
        };

        if response.is_empty() && !raw.trim().is_empty() {
            warnings.push("no actionable content found in response".to_string());
        }

        ProcessedResponse {
            warnings,
            ..response
        }
    }
}

// ============================================================================
// Passes
// ============================================================================

fn extract_code_blocks(raw: &str) -> Vec<CodeBlock> {
    CODE_FENCE_RE
        .captures_iter(raw)
        .map(|cap| CodeBlock {
            language: cap
                .get(1)
                .map(|m| m.as_str().to_lowercase())
                .unwrap_or_default(),
            content: cap.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
        .collect()
}

fn parse_action(verb: &str) -> FileAction {
    match verb.to_lowercase().as_str() {
        "create" | "add" | "new file" => FileAction::Create,
        "delete" | "remove" => FileAction::Delete,
        _ => FileAction::Modify,
    }
}

/// Directive mentions paired with the nearest code block that follows them.
fn extract_file_modifications(raw: &str, blocks: &[CodeBlock]) -> Vec<FileModification> {
    let block_positions: Vec<(usize, usize)> = CODE_FENCE_RE
        .find_iter(raw)
        .enumerate()
        .map(|(i, m)| (m.start(), i))
        .collect();

    let nearest_block_after = |pos: usize| -> Option<String> {
        block_positions
            .iter()
            .find(|(start, _)| *start >= pos)
            .and_then(|(_, idx)| blocks.get(*idx))
            .map(|b| b.content.clone())
    };

    let mut modifications = Vec::new();

    for cap in FILE_DIRECTIVE_RE.captures_iter(raw) {
        let verb = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
        let path = cap.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        let pos = cap.get(0).map(|m| m.end()).unwrap_or(0);
        let action = parse_action(verb);
        modifications.push(FileModification {
            path,
            action,
            code: if action == FileAction::Delete {
                None
            } else {
                nearest_block_after(pos)
            },
        });
    }

    // "File: path" headers default to modify
    for cap in FILE_HEADER_RE.captures_iter(raw) {
        let path = cap.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        if modifications.iter().any(|m| m.path == path) {
            continue;
        }
        let pos = cap.get(0).map(|m| m.end()).unwrap_or(0);
        modifications.push(FileModification {
            path,
            action: FileAction::Modify,
            code: nearest_block_after(pos),
        });
    }

    modifications
}

fn classify_command(command: &str) -> CommandCategory {
    let first = command.split_whitespace().next().unwrap_or_default();
    let lower = command.to_lowercase();

    match first {
        "npm" | "yarn" | "pnpm" | "pip" | "pip3" | "gem" | "composer" => {
            CommandCategory::PackageManagement
        }
        "cargo" if lower.starts_with("cargo add") || lower.starts_with("cargo install") => {
            CommandCategory::PackageManagement
        }
        "cargo" if lower.starts_with("cargo test") => CommandCategory::Testing,
        "go" if lower.starts_with("go test") => CommandCategory::Testing,
        "git" => CommandCategory::VersionControl,
        "pytest" | "jest" | "vitest" | "rspec" => CommandCategory::Testing,
        "node" | "python" | "python3" | "ruby" | "make" | "cargo" | "go" => {
            CommandCategory::Execution
        }
        _ if first.starts_with("./") => CommandCategory::Execution,
        _ if lower.contains("test") => CommandCategory::Testing,
        _ => CommandCategory::General,
    }
}

fn extract_commands(raw: &str, blocks: &[CodeBlock]) -> Vec<ShellCommand> {
    let mut commands = Vec::new();

    // `$ command` lines anywhere in the text
    for cap in COMMAND_LINE_RE.captures_iter(raw) {
        if let Some(m) = cap.get(1) {
            let command = m.as_str().trim().to_string();
            if !command.is_empty() {
                commands.push(ShellCommand {
                    category: classify_command(&command),
                    command,
                });
            }
        }
    }

    // Every non-comment line of shell-tagged code blocks
    for block in blocks {
        if matches!(block.language.as_str(), "bash" | "sh" | "shell" | "zsh" | "console") {
            for line in block.content.lines() {
                let line = line.trim().trim_start_matches("$ ").trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if commands.iter().any(|c| c.command == line) {
                    continue;
                }
                commands.push(ShellCommand {
                    category: classify_command(line),
                    command: line.to_string(),
                });
            }
        }
    }

    commands
}

fn extract_dependencies(raw: &str) -> Vec<String> {
    let mut deps = Vec::new();
    for cap in DEPENDENCY_RE.captures_iter(raw) {
        if let Some(m) = cap.get(1) {
            for name in m.as_str().split_whitespace() {
                // Skip flags like --save-dev
                if name.starts_with('-') {
                    continue;
                }
                let name = name.to_string();
                if !deps.contains(&name) {
                    deps.push(name);
                }
            }
        }
    }
    deps
}

/// Prose paragraphs outside code fences.
fn extract_explanations(raw: &str) -> Vec<String> {
    let without_code = CODE_FENCE_RE.replace_all(raw, "\n");
    without_code
        .split("\n\n")
        .map(str::trim)
        .filter(|p| p.len() > 40 && !p.starts_with('$') && !p.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn extract_validation_steps(raw: &str) -> Vec<String> {
    let without_code = CODE_FENCE_RE.replace_all(raw, "\n");
    without_code
        .lines()
        .map(str::trim)
        .filter(|line| {
            let lower = line.to_lowercase();
            line.len() > 15 && VALIDATION_VERBS.iter().any(|v| lower.contains(v))
        })
        .map(|line| {
            line.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c == '-')
                .trim()
                .to_string()
        })
        .collect()
}

// ============================================================================
// Confidence & Warnings
// ============================================================================

/// Additive heuristic in [0,1]. Rewards structure, never punishes below zero.
fn score_confidence(raw: &str, blocks: &[CodeBlock]) -> f64 {
    if raw.trim().is_empty() {
        return 0.0;
    }

    let mut score: f64 = 0.0;
    let lower = raw.to_lowercase();

    // Substantial responses are more likely to be complete
    if raw.len() > 200 {
        score += 0.15;
    }
    if raw.len() > 1000 {
        score += 0.10;
    }

    if !blocks.is_empty() {
        score += 0.20;
    }
    if blocks.len() > 2 {
        score += 0.10;
    }

    if LANGUAGE_NAMES.iter().any(|l| lower.contains(l)) {
        score += 0.10;
    }

    if ACTIONABLE_VERBS.iter().any(|v| lower.contains(v)) {
        score += 0.15;
    }

    if NUMBERED_STEP_RE.is_match(raw) {
        score += 0.10;
    }

    // Paired fences indicate well-formed output
    if raw.matches("```").count() % 2 == 0 && raw.contains("```") {
        score += 0.10;
    }

    score.min(1.0)
}

fn collect_warnings(raw: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    if raw.trim().is_empty() {
        return warnings;
    }

    if raw.matches("```").count() % 2 != 0 {
        warnings.push("unterminated code fence in response".to_string());
    }

    let lower = raw.to_lowercase();
    if HEDGING_WORDS.iter().any(|w| lower.contains(w)) {
        warnings.push("response contains hedging language".to_string());
    }

    if !lower.contains("error") && !lower.contains("exception") && !lower.contains("fail") {
        warnings.push("response does not mention error handling".to_string());
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"Here's how to add the endpoint.

1. Create `src/routes/health.rs` with the handler:

```rust
pub async fn health() -> &'static str {
    "ok"
}
```

2. Install the dependencies:

```bash
$ cargo add axum
npm install express body-parser
```

3. Run `git add -A` and verify the endpoint responds before you commit.
Ensure error cases return 500.
"#;

    #[test]
    fn test_empty_input_is_safe() {
        let extractor = ResponseExtractor::new();
        let processed = extractor.process("");
        assert!(processed.is_empty());
        assert_eq!(processed.confidence, 0.0);
        assert!(processed.warnings.is_empty());
    }

    #[test]
    fn test_unstructured_input_is_safe() {
        let extractor = ResponseExtractor::new();
        let processed = extractor.process("no structure here");
        assert_eq!(processed.confidence, 0.0);
        assert!(processed.code_blocks.is_empty());
        assert!(processed.commands.is_empty());
        assert!(processed
            .warnings
            .iter()
            .any(|w| w.contains("no actionable content")));
        // Validation phase is still present (always last)
        assert_eq!(processed.plan.phases.last().unwrap().name, "validation");
    }

    #[test]
    fn test_code_blocks_by_language() {
        let extractor = ResponseExtractor::new();
        let processed = extractor.process(SAMPLE);

        assert_eq!(processed.code_blocks.len(), 2);
        assert_eq!(processed.code_blocks[0].language, "rust");
        assert!(processed.code_blocks[0].content.contains("health"));
        assert_eq!(processed.code_blocks[1].language, "bash");
    }

    #[test]
    fn test_file_modification_with_proximate_code() {
        let extractor = ResponseExtractor::new();
        let processed = extractor.process(SAMPLE);

        let health = processed
            .file_modifications
            .iter()
            .find(|m| m.path == "src/routes/health.rs")
            .expect("health.rs directive");
        assert_eq!(health.action, FileAction::Create);
        assert!(health.code.as_deref().unwrap().contains("pub async fn"));
    }

    #[test]
    fn test_delete_directive_has_no_code() {
        let extractor = ResponseExtractor::new();
        let processed = extractor.process("You should delete the old `src/legacy.rs` module.");
        assert_eq!(processed.file_modifications.len(), 1);
        assert_eq!(processed.file_modifications[0].action, FileAction::Delete);
        assert!(processed.file_modifications[0].code.is_none());
    }

    #[test]
    fn test_command_classification() {
        let extractor = ResponseExtractor::new();
        let processed = extractor.process(SAMPLE);

        let by_cmd = |needle: &str| {
            processed
                .commands
                .iter()
                .find(|c| c.command.contains(needle))
                .map(|c| c.category)
        };
        assert_eq!(by_cmd("cargo add"), Some(CommandCategory::PackageManagement));
        assert_eq!(by_cmd("npm install"), Some(CommandCategory::PackageManagement));
    }

    #[test]
    fn test_git_is_version_control() {
        assert_eq!(classify_command("git commit -m x"), CommandCategory::VersionControl);
        assert_eq!(classify_command("cargo test --all"), CommandCategory::Testing);
        assert_eq!(classify_command("python3 main.py"), CommandCategory::Execution);
        assert_eq!(classify_command("ls -la"), CommandCategory::General);
    }

    #[test]
    fn test_dependency_names() {
        let extractor = ResponseExtractor::new();
        let processed = extractor.process(SAMPLE);
        assert!(processed.dependencies.contains(&"axum".to_string()));
        assert!(processed.dependencies.contains(&"express".to_string()));
        assert!(processed.dependencies.contains(&"body-parser".to_string()));
    }

    #[test]
    fn test_validation_steps_found() {
        let extractor = ResponseExtractor::new();
        let processed = extractor.process(SAMPLE);
        assert!(processed
            .validation_steps
            .iter()
            .any(|s| s.contains("verify the endpoint")));
    }

    #[test]
    fn test_confidence_rewards_structure() {
        let extractor = ResponseExtractor::new();
        let structured = extractor.process(SAMPLE).confidence;
        let bare = extractor.process("short answer").confidence;
        assert!(structured > bare);
        assert!(structured <= 1.0);
    }

    #[test]
    fn test_unterminated_fence_warning() {
        let extractor = ResponseExtractor::new();
        let processed = extractor.process("```rust\nfn broken() {}");
        assert!(processed
            .warnings
            .iter()
            .any(|w| w.contains("unterminated")));
    }

    #[test]
    fn test_hedging_warning() {
        let extractor = ResponseExtractor::new();
        let processed =
            extractor.process("This might work, or maybe you need a different approach to errors.");
        assert!(processed.warnings.iter().any(|w| w.contains("hedging")));
    }
}

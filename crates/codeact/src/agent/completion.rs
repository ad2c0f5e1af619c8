//! Deciding whether a task is finished after a turn
//!
//! Rules are checked in priority order and the first one that applies
//! decides. An explicit `TASK_COMPLETE` marker beats every keyword heuristic.

use super::state::Task;
use crate::tools::{ToolCall, ToolKind, ToolResult};

/// Literal the model prints when it considers the task done
pub const COMPLETION_MARKER: &str = "TASK_COMPLETE";

const CONJUNCTIONS: &[&str] = &["and", "then", "after", "also", "finally"];

const CREATION_KEYWORDS: &[&str] = &["create", "write", "make", "generate", "build", "save", "add"];

const INSPECTION_KEYWORDS: &[&str] = &[
    "run",
    "execute",
    "list",
    "show",
    "read",
    "check",
    "print",
    "display",
    "compute",
    "calculate",
    "count",
    "find",
    "get",
];

const CREATION_EVIDENCE: &[&str] = &["created", "written", "wrote", "saved", "success", "done", "generated"];

/// Which rule produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    FailedResult,
    AwaitingInput,
    Marker,
    MultiStep,
    Creation,
    Inspection,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub complete: bool,
    pub rule: Rule,
}

impl Verdict {
    fn new(complete: bool, rule: Rule) -> Self {
        Self { complete, rule }
    }
}

/// Judge the latest turn of `task`
pub fn evaluate(task: &Task, calls: &[ToolCall], results: &[ToolResult], reply: &str) -> Verdict {
    if results.iter().any(|r| !r.success) {
        return Verdict::new(false, Rule::FailedResult);
    }
    if calls.iter().any(|c| c.kind == ToolKind::UserInput) {
        return Verdict::new(false, Rule::AwaitingInput);
    }
    if reply.contains(COMPLETION_MARKER) {
        return Verdict::new(true, Rule::Marker);
    }

    let words = words(&task.description);
    let creation = count_keywords(&words, CREATION_KEYWORDS);
    let inspection = count_keywords(&words, INSPECTION_KEYWORDS);

    let conjunction = task.description.contains(';') || words.iter().any(|w| CONJUNCTIONS.contains(&w.as_str()));
    if conjunction || creation + inspection > 1 {
        return Verdict::new(false, Rule::MultiStep);
    }

    if creation == 1 {
        let corroborated = results.iter().any(|r| {
            let text = r.combined_text().to_lowercase();
            CREATION_EVIDENCE.iter().any(|e| text.contains(e))
        });
        return Verdict::new(corroborated, Rule::Creation);
    }
    if inspection == 1 {
        return Verdict::new(results.iter().any(|r| r.success), Rule::Inspection);
    }

    let complete = !results.is_empty() && results.iter().all(|r| r.success) && task.current_step >= 1;
    Verdict::new(complete, Rule::Fallback)
}

pub fn is_complete(task: &Task, calls: &[ToolCall], results: &[ToolResult], reply: &str) -> bool {
    evaluate(task, calls, results, reply).complete
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Distinct keywords from `keywords` present in `words`
fn count_keywords(words: &[String], keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| words.iter().any(|w| w == *k)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FailureKind;

    fn task(description: &str, step: usize) -> Task {
        let mut task = Task::new(description);
        task.current_step = step;
        task
    }

    fn ok(kind: ToolKind, output: &str) -> (ToolCall, ToolResult) {
        let call = ToolCall::new(kind, "x");
        let result = ToolResult::success(&call, output);
        (call, result)
    }

    #[test]
    fn test_failure_blocks_marker() {
        let call = ToolCall::new(ToolKind::Bash, "false");
        let result = ToolResult::failure(&call, FailureKind::Execution, "Process exited with code 1");

        let verdict = evaluate(&task("list files", 1), &[call], &[result], "TASK_COMPLETE");
        assert_eq!(verdict, Verdict::new(false, Rule::FailedResult));
    }

    #[test]
    fn test_user_input_blocks_completion() {
        let (call, result) = ok(ToolKind::UserInput, "Which file?");
        let verdict = evaluate(&task("show a file", 1), &[call], &[result], "TASK_COMPLETE");
        assert_eq!(verdict.rule, Rule::AwaitingInput);
        assert!(!verdict.complete);
    }

    #[test]
    fn test_marker_beats_multi_step() {
        let (call, result) = ok(ToolKind::Bash, "");
        let verdict = evaluate(
            &task("create a file and then run it", 1),
            &[call],
            &[result],
            "All good. TASK_COMPLETE",
        );
        assert_eq!(verdict, Verdict::new(true, Rule::Marker));
    }

    #[test]
    fn test_multi_step_is_conservative() {
        let (call, result) = ok(ToolKind::Bash, "done");
        for description in ["create a file and run it", "write out.txt; show it", "build, then test"] {
            let verdict = evaluate(&task(description, 1), &[call.clone()], &[result.clone()], "");
            assert_eq!(verdict.rule, Rule::MultiStep, "{description}");
            assert!(!verdict.complete);
        }

        // Two distinct action keywords without a conjunction
        let verdict = evaluate(&task("list and count files", 1), &[call.clone()], &[result.clone()], "");
        assert_eq!(verdict.rule, Rule::MultiStep);
        let verdict = evaluate(&task("read config, print port", 1), &[call], &[result], "");
        assert_eq!(verdict.rule, Rule::MultiStep);
    }

    #[test]
    fn test_creation_needs_evidence() {
        let (call, silent) = ok(ToolKind::Bash, "");
        let verdict = evaluate(&task("create hello.txt", 1), &[call], &[silent], "");
        assert_eq!(verdict, Verdict::new(false, Rule::Creation));

        let (call, result) = ok(ToolKind::Python, "Saved to hello.txt");
        let verdict = evaluate(&task("create hello.txt", 1), &[call], &[result], "");
        assert_eq!(verdict, Verdict::new(true, Rule::Creation));
    }

    #[test]
    fn test_creation_evidence_in_logs() {
        let call = ToolCall::new(ToolKind::Bash, "x");
        let result = ToolResult::success(&call, "").with_logs(vec!["[stderr] file written".into()]);
        assert!(is_complete(&task("write notes.md", 1), &[call], &[result], ""));
    }

    #[test]
    fn test_inspection_completes_on_success() {
        let (call, result) = ok(ToolKind::JavaScript, "4");
        let verdict = evaluate(&task("compute 2+2", 1), &[call], &[result], "");
        assert_eq!(verdict, Verdict::new(true, Rule::Inspection));
    }

    #[test]
    fn test_fallback() {
        let (call, result) = ok(ToolKind::Bash, "ok");
        assert_eq!(
            evaluate(&task("tidy up the repo", 1), &[call.clone()], &[result.clone()], ""),
            Verdict::new(true, Rule::Fallback)
        );
        assert!(!is_complete(&task("tidy up the repo", 0), &[call], &[result], ""));
        assert!(!is_complete(&task("tidy up the repo", 1), &[], &[], ""));
    }

    #[test]
    fn test_keywords_match_whole_words() {
        // "address" contains "add", "targets" contains "get"
        let (call, result) = ok(ToolKind::Bash, "");
        let verdict = evaluate(&task("the address targets", 1), &[call], &[result], "");
        assert_eq!(verdict.rule, Rule::Fallback);
    }
}

//! Static code analysis over extracted code blocks:
//! unconditional flags for dangerous constructs in worker-authored code,
//! independent of whether the construct also appeared in the step's input
//! (that correlation is `vulnerability_echo`'s job).

use sentinel_types::{Finding, Severity};

use crate::code_extract::CodeBlock;

struct LanguageRule {
    languages: &'static [&'static str],
    needle: &'static str,
    rule_id: &'static str,
}

const RULES: &[LanguageRule] = &[
    LanguageRule { languages: &["python"], needle: "eval(", rule_id: "python_eval" },
    LanguageRule { languages: &["python"], needle: "exec(", rule_id: "python_exec" },
    LanguageRule { languages: &["python"], needle: "os.system(", rule_id: "python_os_system" },
    LanguageRule { languages: &["python"], needle: "pickle.loads(", rule_id: "python_pickle_loads" },
    LanguageRule { languages: &["python"], needle: "yaml.load(", rule_id: "python_yaml_unsafe_load" },
    LanguageRule { languages: &["javascript", "typescript"], needle: "eval(", rule_id: "js_eval" },
    LanguageRule {
        languages: &["javascript", "typescript"],
        needle: "child_process.exec(",
        rule_id: "js_child_process_exec",
    },
    LanguageRule {
        languages: &["javascript", "typescript"],
        needle: "innerHTML",
        rule_id: "js_innerhtml_assignment",
    },
    LanguageRule { languages: &["javascript", "typescript"], needle: "new Function(", rule_id: "js_new_function" },
    LanguageRule { languages: &["rust"], needle: "unsafe {", rule_id: "rust_unsafe_block" },
    LanguageRule { languages: &["rust"], needle: ".unwrap()", rule_id: "rust_unwrap_in_sample" },
    LanguageRule { languages: &["shell", "bash"], needle: "curl ", rule_id: "shell_curl" },
    LanguageRule { languages: &["java"], needle: "Runtime.getRuntime().exec(", rule_id: "java_runtime_exec" },
    LanguageRule { languages: &["php"], needle: "system(", rule_id: "php_system" },
];

/// One dangerous-construct hit within a specific code block.
pub struct StaticFinding {
    pub block_index: usize,
    pub finding: Finding,
    pub severity: Severity,
}

/// Runs applicable rules against each block, using its inferred/declared
/// language as a hint; rules with no language match for a block are
/// skipped. Findings from every block are merged into one list.
#[must_use]
pub fn analyze_blocks(blocks: &[CodeBlock]) -> Vec<StaticFinding> {
    let mut findings = Vec::new();
    for (index, block) in blocks.iter().enumerate() {
        let Some(language) = block.language.as_deref() else {
            continue;
        };
        for rule in RULES {
            if !rule.languages.contains(&language) {
                continue;
            }
            if let Some(pos) = block.content.find(rule.needle) {
                findings.push(StaticFinding {
                    block_index: index,
                    finding: Finding::new(rule.rule_id, (pos, pos + rule.needle.len())),
                    severity: Severity::Medium,
                });
            }
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(language: &str, content: &str) -> CodeBlock {
        CodeBlock {
            language: Some(language.to_string()),
            content: content.to_string(),
        }
    }

    #[test]
    fn flags_python_eval() {
        let blocks = vec![block("python", "result = eval(user_input)")];
        let findings = analyze_blocks(&blocks);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].finding.pattern_id, "python_eval");
    }

    #[test]
    fn ignores_blocks_with_no_language_hint() {
        let blocks = vec![CodeBlock { language: None, content: "eval(x)".to_string() }];
        assert!(analyze_blocks(&blocks).is_empty());
    }

    #[test]
    fn rule_for_one_language_does_not_fire_on_another() {
        let blocks = vec![block("rust", "let x = eval(1);")];
        assert!(analyze_blocks(&blocks).is_empty());
    }

    #[test]
    fn merges_findings_across_multiple_blocks() {
        let blocks = vec![
            block("python", "os.system('ls')"),
            block("javascript", "el.innerHTML = payload;"),
        ];
        let findings = analyze_blocks(&blocks);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].block_index, 0);
        assert_eq!(findings[1].block_index, 1);
    }
}

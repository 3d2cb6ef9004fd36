//! Fenced-code-block extraction and language inference.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub content: String,
}

/// Parses fenced (` ``` `) code blocks out of `text`, inferring a language
/// from the fence tag when present, else from keyword/shebang/comment-style
/// heuristics. Emoji are stripped from code content; prose is untouched by
/// this function (callers pass only the block content through it).
#[must_use]
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        if let Some(tag) = trimmed.strip_prefix("```") {
            let tag = tag.trim();
            let mut content_lines = Vec::new();
            for inner in lines.by_ref() {
                if inner.trim_start().starts_with("```") {
                    break;
                }
                content_lines.push(inner);
            }
            let content = strip_emoji(&content_lines.join("\n"));
            let language = if tag.is_empty() {
                infer_language(&content)
            } else {
                Some(tag.to_string())
            };
            blocks.push(CodeBlock { language, content });
        }
    }
    blocks
}

/// Code "regions" for the vulnerability-echo and sensitive-path scanners:
/// fenced blocks plus 4-space-indented paragraphs, both treated as code for
/// the purpose of restricting where a finding may fire.
#[must_use]
pub fn extract_code_regions(text: &str) -> Vec<String> {
    let mut regions: Vec<String> = extract_code_blocks(text).into_iter().map(|b| b.content).collect();

    let mut indented = Vec::new();
    for line in text.lines() {
        if line.starts_with("    ") && !line.trim().is_empty() {
            indented.push(line.trim_start_matches("    "));
        } else if !indented.is_empty() {
            regions.push(indented.join("\n"));
            indented.clear();
        }
    }
    if !indented.is_empty() {
        regions.push(indented.join("\n"));
    }
    regions
}

fn infer_language(content: &str) -> Option<String> {
    let trimmed = content.trim_start();
    if trimmed.starts_with("#!/usr/bin/env python") || trimmed.starts_with("#!/usr/bin/python") {
        return Some("python".to_string());
    }
    if trimmed.starts_with("#!/bin/bash") || trimmed.starts_with("#!/bin/sh") {
        return Some("bash".to_string());
    }
    if content.contains("fn main(") && content.contains("let ") {
        return Some("rust".to_string());
    }
    if content.contains("def ") && content.contains(':') && !content.contains(';') {
        return Some("python".to_string());
    }
    if content.contains("public static void main") || content.contains("System.out.println") {
        return Some("java".to_string());
    }
    if content.contains("<?php") {
        return Some("php".to_string());
    }
    if content.contains("#include") && (content.contains("int main(") || content.contains("printf(")) {
        return Some("c".to_string());
    }
    if content.contains("function ") || content.contains("const ") || content.contains("=>") {
        return Some("javascript".to_string());
    }
    None
}

/// Strips emoji from code blocks while leaving other text untouched.
#[must_use]
pub fn strip_emoji(text: &str) -> String {
    text.chars().filter(|c| !is_emoji(*c)).collect()
}

fn is_emoji(c: char) -> bool {
    let code = c as u32;
    matches!(code,
        0x1F300..=0x1FAFF
        | 0x2600..=0x26FF
        | 0x2700..=0x27BF
        | 0x1F1E6..=0x1F1FF
        | 0x2B00..=0x2BFF
        | 0xFE0F
    )
}

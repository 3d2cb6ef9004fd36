//! Shell-metacharacter patterns rejected outright in command arguments
//!: chaining, piping, substitution, and `find`'s exec flags,
//! none of which any allowlisted command in Sentinel's policy file needs.

/// Substrings that make a command string untokenizable-safely and are
/// rejected before `shell_words::split` ever runs, since `shell_words` has
/// no concept of `&&`/`|`/`` ` ``/`$()` as anything other than literal
/// characters — the policy engine, not the tokenizer, is what must refuse
/// them.
pub const BLOCKED_SUBSTRINGS: &[&str] = &["&&", "||", "|", "`", "$(", ";"];

/// Argument patterns that are fine as literal text but turn an otherwise
/// allowlisted command into an escape hatch.
pub const BLOCKED_ARGUMENT_PATTERNS: &[&str] = &["-exec", "-execdir", "-ok", "-okdir"];

/// Returns the first blocked substring found in `command`, if any.
#[must_use]
pub fn first_blocked_substring(command: &str) -> Option<&'static str> {
    BLOCKED_SUBSTRINGS
        .iter()
        .find(|needle| command.contains(*needle))
        .copied()
}

/// Returns the first blocked argument pattern found among `args`, if any.
#[must_use]
pub fn first_blocked_argument<'a>(args: &[String]) -> Option<&'static str> {
    args.iter().find_map(|arg| {
        BLOCKED_ARGUMENT_PATTERNS
            .iter()
            .find(|pattern| arg == *pattern)
            .copied()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_chaining_operators() {
        assert_eq!(first_blocked_substring("ls && rm -rf /tmp"), Some("&&"));
        assert_eq!(first_blocked_substring("echo `whoami`"), Some("`"));
        assert_eq!(first_blocked_substring("echo $(whoami)"), Some("$("));
    }

    #[test]
    fn allows_plain_command() {
        assert_eq!(first_blocked_substring("cat notes.txt"), None);
    }

    #[test]
    fn detects_find_exec() {
        let args = vec!["-name".to_string(), "*.sh".to_string(), "-exec".to_string()];
        assert_eq!(first_blocked_argument(&args), Some("-exec"));
    }
}

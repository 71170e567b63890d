//! Argument vectors supplied through the environment
//!
//! `VARIANT_RUN` carries a whole command line in one variable so that a
//! Taskfile can be driven from CI systems that only pass environment.

use crate::error::ConfigError;

/// Environment variable holding an extra command line
pub const RUN_ENV: &str = "VARIANT_RUN";

/// Environment variable holding a prefix stripped from [`RUN_ENV`]
pub const RUN_TRIM_PREFIX_ENV: &str = "VARIANT_RUN_TRIM_PREFIX";

/// Split a string into words the way a POSIX shell would.
///
/// Single quotes preserve everything literally, double quotes honor `\"`, `\\`,
/// `\$` and `` \` `` escapes, and a bare backslash escapes the next character.
pub fn split_shell_words(input: &str) -> Result<Vec<String>, ConfigError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(input, '\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$' | '`')) => current.push(ch),
                            Some('\n') => {}
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err(unterminated(input, '"')),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(input, '"')),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some('\n') | None => {}
                    Some(ch) => current.push(ch),
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn unterminated(input: &str, quote: char) -> ConfigError {
    ConfigError::Invalid(format!("unterminated {} quote in '{}'", quote, input))
}

/// Parse the command line carried by `run`, after removing `trim_prefix`
pub fn args_from_run(run: &str, trim_prefix: Option<&str>) -> Result<Vec<String>, ConfigError> {
    let run = match trim_prefix {
        Some(prefix) if !prefix.is_empty() => run.strip_prefix(prefix).unwrap_or(run),
        _ => run,
    };
    split_shell_words(run)
}

/// Extra arguments taken from `VARIANT_RUN`, if set
pub fn args_from_env() -> Result<Vec<String>, ConfigError> {
    match std::env::var(RUN_ENV) {
        Ok(run) if !run.trim().is_empty() => {
            let prefix = std::env::var(RUN_TRIM_PREFIX_ENV).ok();
            args_from_run(&run, prefix.as_deref())
        }
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_prefix_and_split() {
        let args = args_from_run("/foo bar --a=b", Some("/foo")).unwrap();
        assert_eq!(args, vec!["bar", "--a=b"]);
    }

    #[test]
    fn test_without_prefix() {
        let args = args_from_run("deploy app", None).unwrap();
        assert_eq!(args, vec!["deploy", "app"]);
    }

    #[test]
    fn test_quoting() {
        let args =
            split_shell_words(r#"run --msg="hello world" 'it''s' a\ b "q\"x""#).unwrap();
        assert_eq!(args, vec!["run", "--msg=hello world", "its", "a b", "q\"x"]);
    }

    #[test]
    fn test_empty_quotes_make_a_word() {
        let args = split_shell_words(r#"a "" b"#).unwrap();
        assert_eq!(args, vec!["a", "", "b"]);
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(split_shell_words("echo 'oops").is_err());
    }
}

use std::sync::LazyLock;

use regex::{Captures, Regex};

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Replace `${ENV_VAR}` placeholders in raw config text.
///
/// Unresolvable variables are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    PLACEHOLDER
        .replace_all(input, |caps: &Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "CROSSTALK_TOKEN" => Some("abc".into()),
            "DB" => Some("sqlite::memory:".into()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_vars() {
        let out = substitute_env_with("token = \"${CROSSTALK_TOKEN}\"\nurl = \"${DB}\"", lookup);
        assert_eq!(out, "token = \"abc\"\nurl = \"sqlite::memory:\"");
    }

    #[test]
    fn leaves_unknown_vars() {
        assert_eq!(substitute_env_with("${NOPE}", lookup), "${NOPE}");
    }

    #[test]
    fn ignores_malformed_placeholders() {
        assert_eq!(substitute_env_with("${unterminated", lookup), "${unterminated");
        assert_eq!(substitute_env_with("$CROSSTALK_TOKEN", lookup), "$CROSSTALK_TOKEN");
    }
}

//! Shell escaping and command templates
//!
//! Sensor write commands are configured as templates. `{value}` is replaced
//! by the value to write and `{id}` by the child id of a dynamic sensor.

/// Escape a string for use inside a single-quoted shell string
///
/// # Example
/// ```
/// use ssh_poller::ssh::sanitize::escape_for_shell;
///
/// let escaped = escape_for_shell("it's");
/// assert_eq!(escaped, "it'\"'\"'s");
/// ```
pub fn escape_for_shell(value: &str) -> String {
    // 'word' becomes '"'"'word'"'"'
    value.replace('\'', "'\"'\"'")
}

/// Quote a string as a single shell word
pub fn quote_for_shell(value: &str) -> String {
    format!("'{}'", escape_for_shell(value))
}

/// Render a sensor command template
///
/// `value` is inserted verbatim and must already be shell-safe; `id` is
/// quoted since it comes from remote output.
///
/// # Example
/// ```
/// use ssh_poller::ssh::sanitize::render_template;
///
/// let cmd = render_template("echo {value} > /sys/fan/{id}", "40", Some("fan1"));
/// assert_eq!(cmd, "echo 40 > /sys/fan/'fan1'");
/// ```
pub fn render_template(template: &str, value: &str, id: Option<&str>) -> String {
    let rendered = template.replace("{value}", value);
    match id {
        Some(id) => rendered.replace("{id}", &quote_for_shell(id)),
        None => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_no_quotes() {
        assert_eq!(escape_for_shell("ls -la"), "ls -la");
    }

    #[test]
    fn test_escape_multiple_quotes() {
        assert_eq!(
            escape_for_shell("echo 'a' 'b'"),
            "echo '\"'\"'a'\"'\"' '\"'\"'b'\"'\"'"
        );
    }

    #[test]
    fn test_quote_for_shell() {
        assert_eq!(quote_for_shell("hello world"), "'hello world'");
        assert_eq!(quote_for_shell("a'b"), "'a'\"'\"'b'");
    }

    #[test]
    fn test_render_without_id() {
        assert_eq!(
            render_template("brightness {value}", "7", None),
            "brightness 7"
        );
    }

    #[test]
    fn test_render_leaves_id_placeholder_without_id() {
        assert_eq!(render_template("set {id} {value}", "1", None), "set {id} 1");
    }

    #[test]
    fn test_render_quotes_hostile_id() {
        assert_eq!(
            render_template("kill {id}", "", Some("1; rm -rf /")),
            "kill '1; rm -rf /'"
        );
    }
}

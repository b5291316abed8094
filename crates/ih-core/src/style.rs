//! Terminal styling with NO_COLOR support.

use crate::assistant::Notice;

pub fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

#[derive(Debug, Clone, Copy)]
pub struct Style {
    enabled: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self::new()
    }
}

impl Style {
    pub fn new() -> Self {
        Self {
            enabled: color_enabled(),
        }
    }

    pub fn force_enabled() -> Self {
        Self { enabled: true }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    fn code(&self, code: &'static str) -> &'static str {
        if self.enabled {
            code
        } else {
            ""
        }
    }

    pub fn dim(&self) -> &'static str {
        self.code("\x1b[2m")
    }

    pub fn bold(&self) -> &'static str {
        self.code("\x1b[1m")
    }

    pub fn red(&self) -> &'static str {
        self.code("\x1b[31m")
    }

    pub fn cyan(&self) -> &'static str {
        self.code("\x1b[36m")
    }

    pub fn reset(&self) -> &'static str {
        self.code("\x1b[0m")
    }

    /// Assistant reply prefix.
    pub fn assistant_label(&self) -> String {
        format!("{}{}ihumure>{} ", self.bold(), self.cyan(), self.reset())
    }

    /// One-line toast: bold red title, plain description.
    pub fn notice(&self, notice: &Notice) -> String {
        format!(
            "{}{}{}{}: {}",
            self.bold(),
            self.red(),
            notice.title,
            self.reset(),
            notice.description
        )
    }

    pub fn hint(&self, text: &str) -> String {
        format!("{}{}{}", self.dim(), text, self.reset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_style_is_plain() {
        let style = Style::disabled();
        assert_eq!(style.red(), "");
        assert_eq!(style.reset(), "");
        assert_eq!(style.assistant_label(), "ihumure> ");
        assert_eq!(
            style.notice(&Notice::new("Connection issue", "timed out")),
            "Connection issue: timed out"
        );
    }

    #[test]
    fn enabled_style_wraps_in_escapes() {
        let style = Style::force_enabled();
        assert_eq!(style.hint("x"), "\x1b[2mx\x1b[0m");
        let line = style.notice(&Notice::new("Oops", "bad"));
        assert!(line.starts_with("\x1b[1m\x1b[31mOops\x1b[0m"));
        assert!(line.ends_with(": bad"));
    }
}

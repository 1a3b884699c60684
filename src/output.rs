//! Operator-facing status lines.

use console::Style;

#[derive(Debug, Clone)]
pub struct Theme {
    pub info: Style,
    pub success: Style,
    pub warning: Style,
    pub error: Style,
    pub header: Style,
    pub dim: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            info: Style::new().blue(),
            success: Style::new().green(),
            warning: Style::new().yellow(),
            error: Style::new().red().bold(),
            header: Style::new().cyan().bold(),
            dim: Style::new().dim(),
        }
    }
}

/// Writes colored lines to stdout. Colors switch off automatically when stdout is not a tty.
#[derive(Debug, Clone, Default)]
pub struct Printer {
    theme: Theme,
}

impl Printer {
    pub fn info(&self, msg: &str) {
        println!("{} {msg}", self.theme.info.apply_to("[INFO]"));
    }

    pub fn success(&self, msg: &str) {
        println!("{} {msg}", self.theme.success.apply_to("[OK]"));
    }

    pub fn warn(&self, msg: &str) {
        println!("{} {msg}", self.theme.warning.apply_to("[WARN]"));
    }

    pub fn error(&self, msg: &str) {
        println!("{} {msg}", self.theme.error.apply_to("[ERROR]"));
    }

    pub fn header(&self, msg: &str) {
        println!("{}", self.theme.header.apply_to(msg));
    }

    pub fn detail(&self, key: &str, value: &str) {
        println!("  {:<12} {}", self.theme.dim.apply_to(key), value);
    }

    pub fn plain(&self, msg: &str) {
        println!("{msg}");
    }
}

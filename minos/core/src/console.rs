//! Console abstraction the syscalls print through.
//!
//! The host decides what a console is (terminal, GUI pane, test buffer);
//! the kernel only needs these few operations.

pub trait Console {
    fn put_text(&mut self, text: &str);
    fn advance_line(&mut self);
    fn clear_screen(&mut self);
    fn reset_xy(&mut self);
    fn current_x_position(&self) -> usize;
}

/// Line-buffering console used by tests and available to embedders.
#[derive(Debug, Default)]
pub struct BufferConsole {
    lines: Vec<String>,
    current: String,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Everything printed so far, completed lines plus the open one.
    pub fn text(&self) -> String {
        let mut out = self.lines.join("\n");
        if !self.current.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&self.current);
        }
        out
    }
}

impl Console for BufferConsole {
    fn put_text(&mut self, text: &str) {
        self.current.push_str(text);
    }

    fn advance_line(&mut self) {
        self.lines.push(std::mem::take(&mut self.current));
    }

    fn clear_screen(&mut self) {
        self.lines.clear();
        self.current.clear();
    }

    fn reset_xy(&mut self) {
        self.current.clear();
    }

    fn current_x_position(&self) -> usize {
        self.current.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_console_tracks_lines_and_cursor() {
        let mut console = BufferConsole::new();
        console.put_text("4");
        console.put_text("2");
        assert_eq!(console.current_x_position(), 2);
        console.advance_line();
        console.put_text("done");
        assert_eq!(console.lines(), ["42"]);
        assert_eq!(console.text(), "42\ndone");
        console.clear_screen();
        assert_eq!(console.text(), "");
        assert_eq!(console.current_x_position(), 0);
    }
}

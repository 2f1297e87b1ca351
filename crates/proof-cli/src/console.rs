//! Operator console
//!
//! Every interaction is a [`Screen`] answered by a single [`Key`], or a line
//! of text. The session never touches stdin directly.

use std::io::{self, BufRead, Write};

/// Keypress accepted by a screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
}

impl Key {
    /// Parse one line of input. Letters are lowercased.
    pub fn parse(line: &str) -> Option<Key> {
        let line = line.trim();
        let mut chars = line.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Some(Key::Enter),
            (Some(c), None) => Some(Key::Char(c.to_ascii_lowercase())),
            _ => None,
        }
    }

    fn label(&self) -> String {
        match self {
            Key::Char(c) => c.to_string(),
            Key::Enter => "Enter".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub title: String,
    pub body: String,
    pub keys: Vec<Key>,
}

impl Screen {
    /// A screen dismissed with Enter
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            keys: vec![Key::Enter],
        }
    }

    /// Replace the accepted keys with the given characters
    pub fn keys(mut self, chars: &str) -> Self {
        self.keys = chars.chars().map(Key::Char).collect();
        self
    }

    pub fn with_enter(mut self) -> Self {
        if !self.keys.contains(&Key::Enter) {
            self.keys.push(Key::Enter);
        }
        self
    }

    pub fn accepts(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }

    pub fn render(&self) -> String {
        let rule = "=".repeat(self.title.chars().count().max(8));
        format!("\n{}\n{}\n\n{}\n", self.title, rule, self.body.trim_end())
    }
}

pub trait Console {
    /// Show `screen` and block until one of its keys is pressed.
    fn display(&mut self, screen: &Screen) -> io::Result<Key>;

    /// Prompt for one line of text, without the trailing newline.
    fn read_line(&mut self, prompt: &str) -> io::Result<String>;
}

/// Line-oriented console over any reader and writer.
///
/// Each keypress is entered as a line: an empty line is [`Key::Enter`].
pub struct TerminalConsole<R, W> {
    input: R,
    output: W,
}

impl TerminalConsole<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    fn next_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "console input closed",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl<R: BufRead, W: Write> Console for TerminalConsole<R, W> {
    fn display(&mut self, screen: &Screen) -> io::Result<Key> {
        write!(self.output, "{}", screen.render())?;
        let choices: Vec<String> = screen.keys.iter().map(Key::label).collect();
        loop {
            write!(self.output, "\n[{}] > ", choices.join("/"))?;
            self.output.flush()?;
            let line = self.next_line()?;
            match Key::parse(&line) {
                Some(key) if screen.accepts(key) => return Ok(key),
                _ => writeln!(self.output, "Not an option here: {:?}", line.trim())?,
            }
        }
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        write!(self.output, "{} ", prompt)?;
        self.output.flush()?;
        self.next_line()
    }
}

//! Lexical validators for languages without a bundled grammar.
//!
//! These scanners catch the breakage a truncated or garbled generation
//! produces (unterminated strings and comments, unbalanced delimiters, open
//! control blocks); they are not full parsers.

use tracing::debug;

use super::{Diagnostic, Validator};

fn closer_for(open: char) -> char {
    match open {
        '{' => '}',
        '(' => ')',
        _ => ']',
    }
}

/// CSS: comments, strings, and balanced braces, parentheses, and brackets.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssValidator;

impl Validator for CssValidator {
    fn name(&self) -> &str {
        "css"
    }

    fn validate(&self, content: &str) -> Result<(), Diagnostic> {
        let mut stack: Vec<(char, usize, usize)> = Vec::new();
        let mut line = 1;
        let mut col = 0;
        let mut chars = content.chars().peekable();

        while let Some(c) = chars.next() {
            col += 1;
            match c {
                '\n' => {
                    line += 1;
                    col = 0;
                }
                '/' if chars.peek() == Some(&'*') => {
                    let (start_line, start_col) = (line, col);
                    chars.next();
                    col += 1;
                    let mut closed = false;
                    let mut prev = '\0';
                    for c in chars.by_ref() {
                        col += 1;
                        if c == '\n' {
                            line += 1;
                            col = 0;
                        }
                        if prev == '*' && c == '/' {
                            closed = true;
                            break;
                        }
                        prev = c;
                    }
                    if !closed {
                        return Err(Diagnostic::at("unterminated comment", start_line, start_col));
                    }
                }
                '"' | '\'' => {
                    let (start_line, start_col) = (line, col);
                    let mut closed = false;
                    while let Some(s) = chars.next() {
                        col += 1;
                        match s {
                            '\\' => {
                                chars.next();
                                col += 1;
                            }
                            '\n' => break,
                            _ if s == c => {
                                closed = true;
                                break;
                            }
                            _ => {}
                        }
                    }
                    if !closed {
                        return Err(Diagnostic::at("unterminated string", start_line, start_col));
                    }
                }
                '{' | '(' | '[' => stack.push((c, line, col)),
                '}' | ')' | ']' => match stack.pop() {
                    Some((open, _, _)) if closer_for(open) == c => {}
                    Some((open, l, cl)) => {
                        return Err(Diagnostic::at(
                            format!("`{c}` does not close `{open}` opened at line {l}, column {cl}"),
                            line,
                            col,
                        ));
                    }
                    None => return Err(Diagnostic::at(format!("unexpected `{c}`"), line, col)),
                },
                _ => {}
            }
        }

        match stack.pop() {
            Some((open, l, c)) => Err(Diagnostic::at(format!("`{open}` is never closed"), l, c)),
            None => Ok(()),
        }
    }
}

/// Shell: quoting, heredocs, and `if/fi`, `case/esac`, `do/done`, `{}`, `()` nesting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Single,
    Double,
    Backtick,
}

/// A quoted string paused while a `$(...)` inside it is scanned.
struct Suspended {
    /// Stack depth of the substitution's `$(` frame.
    depth: usize,
    quote: (Quote, usize),
    word: String,
    at_command: bool,
}

struct ShellScanner {
    /// Expected closer, the opener that produced it, and its line.
    stack: Vec<(&'static str, &'static str, usize)>,
    word: String,
    at_command: bool,
    quote: Option<(Quote, usize)>,
    suspended: Vec<Suspended>,
    /// Open parenthesis depth inside `$((`/`((`, and the line it started on.
    arith: Option<(usize, usize)>,
    param_depth: usize,
    pending_heredocs: Vec<(String, bool)>,
}

impl ShellScanner {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            word: String::new(),
            at_command: true,
            quote: None,
            suspended: Vec::new(),
            arith: None,
            param_depth: 0,
            pending_heredocs: Vec::new(),
        }
    }

    fn close(&mut self, closer: &'static str, line: usize) -> Result<(), Diagnostic> {
        match self.stack.pop() {
            Some((expected, _, _)) if expected == closer => Ok(()),
            Some((expected, opener, l)) => Err(Diagnostic::at(
                format!("unexpected `{closer}`; `{opener}` at line {l} expects `{expected}`"),
                line,
                1,
            )),
            None => Err(Diagnostic::at(format!("unexpected `{closer}`"), line, 1)),
        }
    }

    fn open_substitution(&mut self, line: usize) {
        if let Some(quote) = self.quote.take() {
            self.stack.push((")", "$(", line));
            self.suspended.push(Suspended {
                depth: self.stack.len(),
                quote,
                word: std::mem::take(&mut self.word),
                at_command: self.at_command,
            });
        }
        self.at_command = true;
    }

    fn resume_quote(&mut self) {
        if self
            .suspended
            .last()
            .is_some_and(|s| s.depth == self.stack.len() + 1)
        {
            if let Some(s) = self.suspended.pop() {
                self.quote = Some(s.quote);
                self.word = s.word;
                self.at_command = s.at_command;
            }
        }
    }

    fn finish_word(&mut self, line: usize) -> Result<(), Diagnostic> {
        if self.word.is_empty() {
            return Ok(());
        }
        let word = std::mem::take(&mut self.word);
        if word == "{" {
            self.stack.push(("}", "{", line));
            self.at_command = true;
            return Ok(());
        }
        if word == "}" && self.at_command {
            return self.close("}", line);
        }
        if !self.at_command {
            return Ok(());
        }
        match word.as_str() {
            "if" => self.stack.push(("fi", "if", line)),
            "case" => {
                self.stack.push(("esac", "case", line));
                self.at_command = false;
                return Ok(());
            }
            "do" => self.stack.push(("done", "do", line)),
            "fi" => self.close("fi", line)?,
            "esac" => self.close("esac", line)?,
            "done" => self.close("done", line)?,
            "then" | "else" | "elif" | "while" | "until" | "!" | "time" => {}
            _ => {
                self.at_command = false;
                return Ok(());
            }
        }
        self.at_command = true;
        Ok(())
    }

    fn scan(&mut self, content: &str) -> Result<(), Diagnostic> {
        let lines: Vec<&str> = content.lines().collect();
        let mut index = 0;
        while index < lines.len() {
            let line_no = index + 1;
            self.scan_line(lines[index], line_no)?;
            index += 1;

            if self.quote.is_none() && !self.pending_heredocs.is_empty() {
                for (delimiter, strip_tabs) in std::mem::take(&mut self.pending_heredocs) {
                    let mut terminated = false;
                    while index < lines.len() {
                        let body = lines[index];
                        index += 1;
                        let candidate = if strip_tabs { body.trim_start_matches('\t') } else { body };
                        if candidate.trim_end() == delimiter {
                            terminated = true;
                            break;
                        }
                    }
                    if !terminated {
                        return Err(Diagnostic::at(
                            format!("heredoc `{delimiter}` is never terminated"),
                            line_no,
                            1,
                        ));
                    }
                }
            }
        }

        if let Some((_, line)) = self.arith {
            return Err(Diagnostic::at("unterminated arithmetic expansion", line, 1));
        }
        if let Some((quote, line)) = self.quote {
            let name = match quote {
                Quote::Single => "single quote",
                Quote::Double => "double quote",
                Quote::Backtick => "backtick",
            };
            return Err(Diagnostic::at(format!("unterminated {name}"), line, 1));
        }
        if let Some((expected, opener, line)) = self.stack.pop() {
            return Err(Diagnostic::at(
                format!("`{opener}` is never closed with `{expected}`"),
                line,
                1,
            ));
        }
        Ok(())
    }

    fn scan_line(&mut self, line: &str, line_no: usize) -> Result<(), Diagnostic> {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if let Some((depth, start)) = self.arith {
                match c {
                    '(' => self.arith = Some((depth + 1, start)),
                    ')' if depth == 1 => {
                        self.arith = None;
                        self.word.push('a');
                    }
                    ')' => self.arith = Some((depth - 1, start)),
                    _ => {}
                }
                i += 1;
                continue;
            }
            if let Some((quote, _)) = self.quote {
                match (quote, c) {
                    (Quote::Double, '$')
                        if chars.get(i + 1) == Some(&'(') && chars.get(i + 2) != Some(&'(') =>
                    {
                        self.open_substitution(line_no);
                        i += 2;
                        continue;
                    }
                    (Quote::Single, '\'') | (Quote::Double, '"') | (Quote::Backtick, '`') => {
                        self.quote = None;
                        self.word.push('q');
                    }
                    (Quote::Double | Quote::Backtick, '\\') => i += 1,
                    _ => {}
                }
                i += 1;
                continue;
            }

            match c {
                '\\' => {
                    self.word.push('x');
                    i += 1;
                }
                '\'' => self.quote = Some((Quote::Single, line_no)),
                '"' => self.quote = Some((Quote::Double, line_no)),
                '`' => self.quote = Some((Quote::Backtick, line_no)),
                '#' if self.word.is_empty() => break,
                '$' if chars.get(i + 1) == Some(&'(') && chars.get(i + 2) == Some(&'(') => {
                    self.arith = Some((2, line_no));
                    i += 3;
                    continue;
                }
                '(' if chars.get(i + 1) == Some(&'(') && self.word.is_empty() => {
                    self.arith = Some((2, line_no));
                    i += 2;
                    continue;
                }
                '$' if chars.get(i + 1) == Some(&'{') => {
                    self.param_depth += 1;
                    self.word.push('$');
                    i += 1;
                }
                '}' if self.param_depth > 0 => self.param_depth -= 1,
                '$' if chars.get(i + 1) == Some(&'(') => {
                    self.finish_word(line_no)?;
                    self.stack.push((")", "$(", line_no));
                    self.at_command = true;
                    i += 1;
                }
                '(' => {
                    let was_command = self.at_command;
                    self.finish_word(line_no)?;
                    self.stack.push((")", "(", line_no));
                    self.at_command = was_command || self.at_command;
                }
                ')' => {
                    self.finish_word(line_no)?;
                    if matches!(self.stack.last(), Some(("esac", _, _))) {
                        self.at_command = true;
                    } else {
                        self.close(")", line_no)?;
                        self.at_command = false;
                        self.resume_quote();
                    }
                }
                '<' if chars.get(i + 1) == Some(&'<') && chars.get(i + 2) != Some(&'<') => {
                    self.finish_word(line_no)?;
                    i += 2;
                    let strip_tabs = chars.get(i) == Some(&'-');
                    if strip_tabs {
                        i += 1;
                    }
                    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
                        i += 1;
                    }
                    let mut delimiter = String::new();
                    while let Some(&d) = chars.get(i) {
                        if d.is_whitespace() || matches!(d, ';' | '&' | '|' | '>' | '<' | ')') {
                            break;
                        }
                        if !matches!(d, '\'' | '"' | '\\') {
                            delimiter.push(d);
                        }
                        i += 1;
                    }
                    if delimiter.is_empty() {
                        return Err(Diagnostic::at("heredoc without a delimiter", line_no, i + 1));
                    }
                    self.pending_heredocs.push((delimiter, strip_tabs));
                    continue;
                }
                ';' | '&' | '|' => {
                    self.finish_word(line_no)?;
                    self.at_command = true;
                }
                c if c.is_whitespace() || c == '<' || c == '>' => self.finish_word(line_no)?,
                c => self.word.push(c),
            }
            i += 1;
        }

        if self.quote.is_none() {
            let continued = line.trim_end().ends_with('\\');
            self.finish_word(line_no)?;
            if !continued {
                self.at_command = true;
            }
        }
        Ok(())
    }
}

impl Validator for ShellValidator {
    fn name(&self) -> &str {
        "shell"
    }

    fn validate(&self, content: &str) -> Result<(), Diagnostic> {
        ShellScanner::new().scan(content)
    }
}

/// SQL: the script must end with a statement terminator and have balanced quotes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlValidator;

impl Validator for SqlValidator {
    fn name(&self) -> &str {
        "sql"
    }

    fn validate(&self, content: &str) -> Result<(), Diagnostic> {
        let mut chars = content.char_indices().peekable();
        let mut last_code: Option<char> = None;

        while let Some((offset, c)) = chars.next() {
            match c {
                '-' if chars.peek().map(|&(_, n)| n) == Some('-') => {
                    for (_, n) in chars.by_ref() {
                        if n == '\n' {
                            break;
                        }
                    }
                }
                '/' if chars.peek().map(|&(_, n)| n) == Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    let mut closed = false;
                    for (_, n) in chars.by_ref() {
                        if prev == '*' && n == '/' {
                            closed = true;
                            break;
                        }
                        prev = n;
                    }
                    if !closed {
                        return Err(Diagnostic::at_offset("unterminated comment", content, offset));
                    }
                }
                '\'' | '"' | '`' => {
                    if !chars.by_ref().any(|(_, n)| n == c) {
                        return Err(Diagnostic::at_offset(
                            "unterminated quoted string",
                            content,
                            offset,
                        ));
                    }
                    last_code = Some(c);
                }
                c if c.is_whitespace() => {}
                c => last_code = Some(c),
            }
        }

        match last_code {
            None => Err(Diagnostic::new("no SQL statements")),
            Some(';') => Ok(()),
            Some(_) => Err(Diagnostic::at_offset(
                "missing `;` after the last statement",
                content,
                content.trim_end().len(),
            )),
        }
    }
}

/// Markdown: always accepted; a missing heading is only noted in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownValidator;

impl Validator for MarkdownValidator {
    fn name(&self) -> &str {
        "markdown"
    }

    fn validate(&self, content: &str) -> Result<(), Diagnostic> {
        if !content.lines().any(|l| l.trim_start().starts_with('#')) {
            debug!("Markdown content has no headings");
        }
        Ok(())
    }
}

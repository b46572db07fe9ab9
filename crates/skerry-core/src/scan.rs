//! Module source scanner.
//!
//! Single-pass, comment- and string-aware scan of JavaScript module source
//! for dependency requests (`import`/`export … from`/`require()`/dynamic
//! `import()`), exported names, and top-level `await`. No full parse;
//! detection is best-effort and over-approximates in pathological sources
//! (e.g. `await` in a braceless arrow body reads as top-level).

use std::collections::HashSet;

/// Consumption kind of a scanned request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// ESM import edge (static, re-export, or dynamic).
    Import,
    /// CommonJS require edge.
    Require,
}

impl RequestKind {
    /// Condition name this kind contributes to exports-map resolution.
    #[must_use]
    pub fn condition(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Require => "require",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.condition())
    }
}

/// Dependency request found in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRequest {
    /// Specifier exactly as written.
    pub specifier: String,
    /// Edge kind.
    pub kind: RequestKind,
    /// Line number (1-indexed, best-effort).
    pub line: u32,
}

/// Result of scanning a module body.
#[derive(Debug, Clone, Default)]
pub struct SourceScan {
    /// Requests in first-appearance order, deduplicated by specifier.
    pub requests: Vec<ScannedRequest>,
    /// Names this module exports (ESM declarations or CJS assignments).
    pub export_names: Vec<String>,
    /// Static `import`/`export` statements were seen.
    pub has_esm_syntax: bool,
    /// `require`/`module.exports`/`exports.` markers were seen.
    pub has_cjs_markers: bool,
    /// An `await` outside any braced body was seen.
    pub has_top_level_await: bool,
}

/// Scan module source text.
#[must_use]
pub fn scan_source(source: &str) -> SourceScan {
    Scanner::new(source).run()
}

struct Scanner {
    chars: Vec<char>,
    i: usize,
    line: u32,
    depth: u32,
    seen_specifiers: HashSet<String>,
    seen_exports: HashSet<String>,
    out: SourceScan,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            i: 0,
            line: 1,
            depth: 0,
            seen_specifiers: HashSet::new(),
            seen_exports: HashSet::new(),
            out: SourceScan::default(),
        }
    }

    fn run(mut self) -> SourceScan {
        while self.i < self.chars.len() {
            let c = self.chars[self.i];

            match c {
                '\n' => {
                    self.line += 1;
                    self.i += 1;
                }
                '/' if self.peek(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek(1) == Some('*') => self.skip_block_comment(),
                '"' | '\'' | '`' => {
                    self.skip_string(c);
                }
                '{' => {
                    self.depth += 1;
                    self.i += 1;
                }
                '}' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.i += 1;
                }
                _ => {
                    if self.at_keyword("import") {
                        self.scan_import();
                    } else if self.at_keyword("export") {
                        self.scan_export();
                    } else if self.at_keyword("require") {
                        self.scan_require();
                    } else if self.at_keyword("module") {
                        self.scan_module_exports();
                    } else if self.at_keyword("exports") {
                        self.scan_exports_dot();
                    } else if self.at_keyword("await") {
                        if self.depth == 0 {
                            self.out.has_top_level_await = true;
                        }
                        self.i += 5;
                    } else {
                        self.i += 1;
                    }
                }
            }
        }
        self.out
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.i + ahead).copied()
    }

    fn skip_line_comment(&mut self) {
        while self.i < self.chars.len() && self.chars[self.i] != '\n' {
            self.i += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        self.i += 2;
        while self.i + 1 < self.chars.len() {
            if self.chars[self.i] == '*' && self.chars[self.i + 1] == '/' {
                self.i += 2;
                return;
            }
            if self.chars[self.i] == '\n' {
                self.line += 1;
            }
            self.i += 1;
        }
        self.i = self.chars.len();
    }

    /// Skip a string literal starting at the current quote character.
    fn skip_string(&mut self, quote: char) {
        self.i += 1;
        while self.i < self.chars.len() {
            let c = self.chars[self.i];
            if c == '\\' {
                self.i += 2;
                continue;
            }
            if c == '\n' {
                self.line += 1;
            }
            if c == quote {
                self.i += 1;
                return;
            }
            self.i += 1;
        }
    }

    /// Check for a keyword at the current position with word boundaries.
    fn at_keyword(&self, keyword: &str) -> bool {
        let kw: Vec<char> = keyword.chars().collect();
        if self.i + kw.len() > self.chars.len() {
            return false;
        }
        if self.i > 0 {
            let prev = self.chars[self.i - 1];
            if prev.is_alphanumeric() || prev == '_' || prev == '$' || prev == '.' {
                return false;
            }
        }
        for (j, &c) in kw.iter().enumerate() {
            if self.chars[self.i + j] != c {
                return false;
            }
        }
        match self.chars.get(self.i + kw.len()) {
            Some(&next) => !(next.is_alphanumeric() || next == '_' || next == '$'),
            None => true,
        }
    }

    /// Like `at_keyword` but without the preceding-character check, for
    /// matching the member name in `module.exports`.
    fn word_at(&self, word: &str) -> bool {
        let w: Vec<char> = word.chars().collect();
        if self.i + w.len() > self.chars.len() {
            return false;
        }
        for (j, &c) in w.iter().enumerate() {
            if self.chars[self.i + j] != c {
                return false;
            }
        }
        match self.chars.get(self.i + w.len()) {
            Some(&next) => !(next.is_alphanumeric() || next == '_' || next == '$'),
            None => true,
        }
    }

    fn skip_ws(&mut self) {
        while self.i < self.chars.len() {
            let c = self.chars[self.i];
            if c == '\n' {
                self.line += 1;
                self.i += 1;
            } else if c.is_whitespace() {
                self.i += 1;
            } else {
                break;
            }
        }
    }

    /// Read a quoted specifier at the current position.
    fn read_quoted(&mut self) -> Option<String> {
        let quote = self.chars.get(self.i).copied()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        self.i += 1;
        let mut value = String::new();
        while self.i < self.chars.len() {
            let c = self.chars[self.i];
            if c == '\\' {
                if let Some(&escaped) = self.chars.get(self.i + 1) {
                    value.push(escaped);
                }
                self.i += 2;
                continue;
            }
            if c == quote {
                self.i += 1;
                return Some(value);
            }
            if c == '\n' {
                return None;
            }
            value.push(c);
            self.i += 1;
        }
        None
    }

    /// Read an identifier at the current position.
    fn read_ident(&mut self) -> Option<String> {
        let mut name = String::new();
        while self.i < self.chars.len() {
            let c = self.chars[self.i];
            if c.is_alphanumeric() || c == '_' || c == '$' {
                name.push(c);
                self.i += 1;
            } else {
                break;
            }
        }
        (!name.is_empty()).then_some(name)
    }

    fn push_request(&mut self, specifier: String, kind: RequestKind) {
        if !specifier.is_empty() && self.seen_specifiers.insert(specifier.clone()) {
            self.out.requests.push(ScannedRequest {
                specifier,
                kind,
                line: self.line,
            });
        }
    }

    fn push_export(&mut self, name: String) {
        if !name.is_empty() && self.seen_exports.insert(name.clone()) {
            self.out.export_names.push(name);
        }
    }

    /// `import "spec"` / `import x from "spec"` / `import("spec")` / `import.meta`.
    fn scan_import(&mut self) {
        let start = self.i;
        self.i += 6;
        self.skip_ws();

        match self.chars.get(self.i) {
            // import.meta — not a request
            Some('.') => {}
            // Dynamic import: allowed in both module systems
            Some('(') => {
                self.i += 1;
                self.skip_ws();
                if let Some(spec) = self.read_quoted() {
                    self.push_request(spec, RequestKind::Import);
                }
            }
            // Side-effect import: import "spec"
            Some('"' | '\'') => {
                self.out.has_esm_syntax = true;
                if let Some(spec) = self.read_quoted() {
                    self.push_request(spec, RequestKind::Import);
                }
            }
            // Binding import: scan ahead for the quoted source before `;`
            Some(_) => {
                self.out.has_esm_syntax = true;
                if let Some(spec) = self.scan_to_quoted_before_semi() {
                    self.push_request(spec, RequestKind::Import);
                }
            }
            None => {}
        }

        if self.i <= start {
            self.i = start + 1;
        }
    }

    /// `export const x` / `export { a, b }` / `export * from "spec"` / ...
    fn scan_export(&mut self) {
        let start = self.i;
        self.i += 6;
        self.out.has_esm_syntax = true;
        self.skip_ws();

        if self.at_keyword("default") {
            self.i += 7;
            self.push_export("default".to_string());
        } else if self.at_keyword("const") || self.at_keyword("let") || self.at_keyword("var") {
            while self.i < self.chars.len() && self.chars[self.i].is_alphabetic() {
                self.i += 1;
            }
            self.skip_ws();
            if let Some(name) = self.read_ident() {
                self.push_export(name);
            }
        } else if self.at_keyword("async") || self.at_keyword("function") || self.at_keyword("class")
        {
            if self.at_keyword("async") {
                self.i += 5;
                self.skip_ws();
            }
            while self.i < self.chars.len() && self.chars[self.i].is_alphabetic() {
                self.i += 1;
            }
            // Generator marker
            self.skip_ws();
            if self.chars.get(self.i) == Some(&'*') {
                self.i += 1;
                self.skip_ws();
            }
            if let Some(name) = self.read_ident() {
                self.push_export(name);
            }
        } else if self.chars.get(self.i) == Some(&'{') {
            self.i += 1;
            let names = self.scan_export_clause();
            for name in names {
                self.push_export(name);
            }
            self.skip_ws();
            if self.at_keyword("from") {
                self.i += 4;
                self.skip_ws();
                if let Some(spec) = self.read_quoted() {
                    self.push_request(spec, RequestKind::Import);
                }
            }
        } else if self.chars.get(self.i) == Some(&'*') {
            if let Some(spec) = self.scan_to_quoted_before_semi() {
                self.push_request(spec, RequestKind::Import);
            }
        }

        if self.i <= start {
            self.i = start + 1;
        }
    }

    /// Names inside `export { a, b as c }` (position just past the `{`).
    fn scan_export_clause(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        loop {
            self.skip_ws();
            match self.chars.get(self.i) {
                Some('}') => {
                    self.i += 1;
                    break;
                }
                Some(',') => {
                    self.i += 1;
                }
                Some(_) => {
                    let Some(mut name) = self.read_ident() else {
                        self.i += 1;
                        continue;
                    };
                    self.skip_ws();
                    if self.at_keyword("as") {
                        self.i += 2;
                        self.skip_ws();
                        if let Some(alias) = self.read_ident() {
                            name = alias;
                        }
                    }
                    names.push(name);
                }
                None => break,
            }
        }
        names
    }

    /// `require("spec")`.
    fn scan_require(&mut self) {
        let start = self.i;
        self.i += 7;
        self.skip_ws();
        if self.chars.get(self.i) == Some(&'(') {
            self.i += 1;
            self.skip_ws();
            if let Some(spec) = self.read_quoted() {
                self.out.has_cjs_markers = true;
                self.push_request(spec, RequestKind::Require);
                return;
            }
        }
        self.i = start + 1;
    }

    /// `module.exports = …` (collects simple object-literal keys).
    fn scan_module_exports(&mut self) {
        let start = self.i;
        self.i += 6;
        if self.chars.get(self.i) != Some(&'.') {
            self.i = start + 1;
            return;
        }
        self.i += 1;
        if !self.word_at("exports") {
            self.i = start + 1;
            return;
        }
        self.i += 7;
        self.out.has_cjs_markers = true;
        self.skip_ws();

        // module.exports.name = …
        if self.chars.get(self.i) == Some(&'.') {
            self.i += 1;
            if let Some(name) = self.read_ident() {
                self.skip_ws();
                if self.chars.get(self.i) == Some(&'=') && self.peek(1) != Some('=') {
                    self.push_export(name);
                }
            }
            return;
        }

        // module.exports = { a, b: …, c }
        if self.chars.get(self.i) == Some(&'=') && self.peek(1) != Some('=') {
            self.i += 1;
            self.skip_ws();
            self.push_export("default".to_string());
            if self.chars.get(self.i) == Some(&'{') {
                self.i += 1;
                loop {
                    self.skip_ws();
                    match self.chars.get(self.i) {
                        Some('}') => {
                            // Consume so the main loop's depth tracking
                            // never sees this brace unbalanced.
                            self.i += 1;
                            break;
                        }
                        None => break,
                        Some(',') => self.i += 1,
                        Some('"' | '\'') => {
                            // Quoted key: skip it and its value.
                            let quote = self.chars[self.i];
                            self.skip_string(quote);
                            self.skip_ws();
                            if self.chars.get(self.i) == Some(&':') {
                                self.i += 1;
                                self.skip_object_value();
                            }
                        }
                        Some(_) => {
                            let Some(name) = self.read_ident() else {
                                self.i += 1;
                                continue;
                            };
                            self.skip_ws();
                            match self.chars.get(self.i) {
                                Some(',' | '}') => self.push_export(name),
                                Some(':') => {
                                    self.push_export(name);
                                    self.i += 1;
                                    self.skip_object_value();
                                }
                                // Shorthand method, spread tail, etc.; drop it.
                                _ => self.skip_object_value(),
                            }
                        }
                    }
                }
            }
        }
    }

    /// Skip an object-literal value up to the next `,` or `}` at this
    /// nesting level (neither is consumed).
    fn skip_object_value(&mut self) {
        let mut inner = 0u32;
        while self.i < self.chars.len() {
            match self.chars[self.i] {
                '"' | '\'' | '`' => {
                    let quote = self.chars[self.i];
                    self.skip_string(quote);
                    continue;
                }
                '{' | '(' | '[' => inner += 1,
                '}' | ')' | ']' if inner > 0 => inner -= 1,
                '}' | ',' if inner == 0 => return,
                '\n' => self.line += 1,
                _ => {}
            }
            self.i += 1;
        }
    }

    /// `exports.name = …`.
    fn scan_exports_dot(&mut self) {
        let start = self.i;
        self.i += 7;
        if self.chars.get(self.i) != Some(&'.') {
            self.i = start + 1;
            return;
        }
        self.i += 1;
        self.out.has_cjs_markers = true;
        if let Some(name) = self.read_ident() {
            self.skip_ws();
            if self.chars.get(self.i) == Some(&'=') && self.peek(1) != Some('=') {
                self.push_export(name);
            }
        }
    }

    /// Scan forward to the first quoted string before `;` or end of line
    /// pair, reading it as a specifier.
    fn scan_to_quoted_before_semi(&mut self) -> Option<String> {
        while self.i < self.chars.len() {
            let c = self.chars[self.i];
            match c {
                '"' | '\'' => return self.read_quoted(),
                ';' => return None,
                '\n' => {
                    self.line += 1;
                    self.i += 1;
                }
                _ => self.i += 1,
            }
        }
        None
    }
}

//! Grammar source front-end.
//!
//! A recursive-descent matcher over the textual grammar description. It
//! keeps no grammar state of its own: every recognized construct is
//! forwarded to the [`GrammarBuilder`] as a builder event. On a hard error
//! the parser reports, resynchronizes to end-of-input and lets the caller
//! abort table construction.

use crate::{
    diagnostics::{Detail, Diagnostic, Report},
    grammar::GrammarBuilder,
};

/// Parse `source`, driving `builder`; returns the number of syntax errors.
pub(crate) fn parse(source: &str, builder: &mut GrammarBuilder, report: &mut dyn Report) -> usize {
    let span = tracing::trace_span!("parse_grammar");
    let _entered = span.enter();

    let mut parser = SourceParser::new(source);
    if !parser.match_grammar(builder, report) && parser.errors == 0 {
        parser.error(report, 1, Detail::MalformedGrammar);
    }
    parser.errors
}

struct SourceParser<'s> {
    source: &'s str,
    position: usize,
    line: u32,
    lexeme: String,
    errors: usize,
}

fn is_newline(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

impl<'s> SourceParser<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            position: 0,
            line: 1,
            lexeme: String::new(),
            errors: 0,
        }
    }

    // grammar := IDENT '{' statement* '}'
    fn match_grammar(&mut self, builder: &mut GrammarBuilder, report: &mut dyn Report) -> bool {
        if self.match_identifier() {
            builder.grammar(&self.lexeme);
            self.expect("{", report);
            while self.match_statement(builder, report) {}
            self.expect("}", report);
            return self.match_end();
        }
        false
    }

    fn match_statement(&mut self, builder: &mut GrammarBuilder, report: &mut dyn Report) -> bool {
        self.match_associativity_statement(builder, report)
            || self.match_whitespace_statement(builder, report)
            || self.match_production_statement(builder, report)
    }

    fn match_associativity_statement(
        &mut self,
        builder: &mut GrammarBuilder,
        report: &mut dyn Report,
    ) -> bool {
        if self.match_associativity(builder) {
            while self.match_symbol(builder, report) {}
            self.expect(";", report);
            return true;
        }
        false
    }

    fn match_associativity(&mut self, builder: &mut GrammarBuilder) -> bool {
        if self.match_keyword("%left") {
            builder.left();
            true
        } else if self.match_keyword("%right") {
            builder.right();
            true
        } else if self.match_keyword("%none") {
            builder.none();
            true
        } else {
            false
        }
    }

    fn match_whitespace_statement(
        &mut self,
        builder: &mut GrammarBuilder,
        report: &mut dyn Report,
    ) -> bool {
        if self.match_keyword("%whitespace") {
            builder.whitespace();
            if self.match_regex(report) {
                builder.regex(&self.lexeme, self.line);
            }
            self.expect(";", report);
            return true;
        }
        false
    }

    fn match_production_statement(
        &mut self,
        builder: &mut GrammarBuilder,
        report: &mut dyn Report,
    ) -> bool {
        if self.match_identifier() {
            builder.production(&self.lexeme, self.line);
            self.expect(":", report);
            self.match_expressions(builder, report);
            self.expect(";", report);
            builder.end_production();
            return true;
        }
        false
    }

    fn match_expressions(&mut self, builder: &mut GrammarBuilder, report: &mut dyn Report) {
        self.match_expression(builder, report);
        while self.match_keyword("|") {
            self.match_expression(builder, report);
        }
    }

    fn match_expression(&mut self, builder: &mut GrammarBuilder, report: &mut dyn Report) {
        while self.match_symbol(builder, report) {}
        self.match_precedence(builder, report);
        self.match_action(builder, report);
    }

    fn match_precedence(&mut self, builder: &mut GrammarBuilder, report: &mut dyn Report) -> bool {
        if self.match_keyword("%precedence") {
            builder.precedence();
            self.match_symbol(builder, report);
            return true;
        }
        false
    }

    // The action closes the alternative either way: with a tag when one is
    // given, otherwise as a plain end of expression.
    fn match_action(&mut self, builder: &mut GrammarBuilder, report: &mut dyn Report) -> bool {
        if self.match_keyword("[") {
            if self.match_identifier() {
                builder.action(&self.lexeme, self.line);
            } else {
                builder.end_expression(self.line);
            }
            self.expect("]", report);
            return true;
        }
        builder.end_expression(self.line);
        false
    }

    fn match_symbol(&mut self, builder: &mut GrammarBuilder, report: &mut dyn Report) -> bool {
        if self.match_literal(report) {
            builder.literal(&self.lexeme, self.line);
            true
        } else if self.match_regex(report) {
            builder.regex(&self.lexeme, self.line);
            true
        } else if self.match_identifier() {
            if self.lexeme == "error" {
                builder.error(self.line);
            } else {
                builder.identifier(&self.lexeme, self.line);
            }
            true
        } else {
            false
        }
    }

    // LITERAL := ' ... ' with backslash escapes; may not span lines.
    fn match_literal(&mut self, report: &mut dyn Report) -> bool {
        self.skip_trivia();
        if !self.match_bytes("'") {
            return false;
        }
        let opening_line = self.line;
        let bytes = self.source.as_bytes();
        let start = self.position;
        let mut position = self.position;
        let mut escaped = false;
        while position < bytes.len() && (bytes[position] != b'\'' || escaped) {
            if is_newline(bytes[position]) {
                break;
            }
            escaped = bytes[position] == b'\\' && !escaped;
            position += 1;
        }
        if position == bytes.len() || bytes[position] != b'\'' {
            self.position = self.source.len();
            self.error(report, opening_line, Detail::UnterminatedLiteral);
            return false;
        }
        self.lexeme = self.source[start..position].to_owned();
        self.position = position + 1;
        true
    }

    // REGEX := " ... " with backslash escapes; may span lines.
    fn match_regex(&mut self, report: &mut dyn Report) -> bool {
        self.skip_trivia();
        if !self.match_bytes("\"") {
            return false;
        }
        let bytes = self.source.as_bytes();
        let start = self.position;
        let mut escaped = false;
        while self.position < bytes.len() && (bytes[self.position] != b'"' || escaped) {
            escaped = bytes[self.position] == b'\\' && !escaped;
            self.bump();
        }
        if self.position == bytes.len() {
            let line = self.line;
            self.error(report, line, Detail::Expected { expected: "\"" });
            return false;
        }
        self.lexeme = self.source[start..self.position].to_owned();
        self.position += 1;
        true
    }

    // IDENT := [A-Za-z_][A-Za-z0-9_]*
    fn match_identifier(&mut self) -> bool {
        self.skip_trivia();
        let bytes = self.source.as_bytes();
        let start = self.position;
        match bytes.get(self.position) {
            Some(&byte) if byte == b'_' || byte.is_ascii_alphabetic() => self.position += 1,
            _ => return false,
        }
        while matches!(
            bytes.get(self.position),
            Some(&byte) if byte == b'_' || byte.is_ascii_alphanumeric()
        ) {
            self.position += 1;
        }
        self.lexeme = self.source[start..self.position].to_owned();
        true
    }

    fn match_keyword(&mut self, keyword: &str) -> bool {
        self.skip_trivia();
        self.match_bytes(keyword)
    }

    fn match_end(&mut self) -> bool {
        self.skip_trivia();
        self.position == self.source.len()
    }

    fn expect(&mut self, expected: &'static str, report: &mut dyn Report) -> bool {
        if self.match_keyword(expected) {
            return true;
        }
        // Already resynchronized by an earlier hard error: fail silently
        // instead of piling an expectation failure onto every caller.
        if self.position == self.source.len() && self.errors > 0 {
            return false;
        }
        let line = self.line;
        self.position = self.source.len();
        self.error(report, line, Detail::Expected { expected });
        false
    }

    fn match_bytes(&mut self, expected: &str) -> bool {
        if self.source.as_bytes()[self.position..].starts_with(expected.as_bytes()) {
            self.position += expected.len();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) {
        while self.skip_whitespace() || self.skip_line_comment() || self.skip_block_comment() {}
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.position;
        while matches!(self.source.as_bytes().get(self.position), Some(byte) if byte.is_ascii_whitespace())
        {
            self.bump();
        }
        self.position != start
    }

    fn skip_line_comment(&mut self) -> bool {
        if !self.match_bytes("//") {
            return false;
        }
        let bytes = self.source.as_bytes();
        while matches!(bytes.get(self.position), Some(&byte) if !is_newline(byte)) {
            self.position += 1;
        }
        true
    }

    fn skip_block_comment(&mut self) -> bool {
        if !self.match_bytes("/*") {
            return false;
        }
        while self.position < self.source.len() {
            if self.match_bytes("*/") {
                return true;
            }
            self.bump();
        }
        true
    }

    /// Consume one byte, keeping the line count accurate; `\r\n` counts as a
    /// single line break.
    fn bump(&mut self) {
        let bytes = self.source.as_bytes();
        let byte = bytes[self.position];
        self.position += 1;
        if byte == b'\n' {
            self.line += 1;
        } else if byte == b'\r' && bytes.get(self.position) != Some(&b'\n') {
            self.line += 1;
        }
    }

    fn error(&mut self, report: &mut dyn Report, line: u32, detail: Detail) {
        self.errors += 1;
        report.report(Diagnostic::new(line, detail));
    }
}

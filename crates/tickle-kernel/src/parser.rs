//! Script structure.
//!
//! Parsing stops short of substitution: a [`Word`] is a sequence of
//! [`Part`]s that the evaluator later renders, honoring whatever
//! substitution flags are in force. Every part keeps its raw source text
//! so that a disabled substitution class can be passed through verbatim.
//!
//! A braced word is a single literal part with `braced` set; the
//! evaluator never substitutes inside it.

use crate::lexer::{ParseError, Scanner};

/// A parsed script: a flat list of commands.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub commands: Vec<ParsedCommand>,
}

/// One command: its words plus enough source context for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    pub words: Vec<Word>,
    /// 1-based line the command starts on.
    pub line: usize,
    /// Raw source text of the command, for error traces.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub parts: Vec<Part>,
    /// Braced words are literal; no substitution applies.
    pub braced: bool,
}

impl Word {
    fn literal(text: String, braced: bool) -> Self {
        Self {
            parts: vec![Part::Literal(text)],
            braced,
        }
    }
}

/// One substitutable fragment of a word.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Plain text.
    Literal(String),
    /// A backslash escape; `raw` is the source form, `decoded` the result.
    Backslash { raw: String, decoded: String },
    /// A `$name`, `$name(index)`, or `${name}` reference.
    Var(VarRef),
    /// A `[...]` command substitution; `body` is the inner script.
    Script { raw: String, body: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub name: String,
    /// Array element selector, itself substitutable.
    pub index: Option<Vec<Part>>,
    /// Source form, used when variable substitution is disabled.
    pub raw: String,
}

/// Where a run of parts ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    /// Bare word: blanks, separators, or end of input.
    Bare,
    /// Double-quoted word: the closing quote.
    Quote { open_line: usize },
    /// Array index: the closing paren.
    Paren { open_line: usize },
    /// Whole-string template: end of input.
    End,
}

/// Parse a whole string as one substitutable template, with no word
/// splitting. Blanks and separators are ordinary text; only `$`, `[`,
/// and `\` are special.
pub fn parse_template(source: &str) -> Result<Vec<Part>, ParseError> {
    let mut s = Scanner::new(source);
    parse_parts(&mut s, Stop::End)
}

/// Parse a script into commands. Comments (`#` at command start) and
/// blank commands are dropped.
pub fn parse_script(source: &str) -> Result<Script, ParseError> {
    let mut s = Scanner::new(source);
    let mut commands = Vec::new();

    loop {
        s.skip_separators();
        if s.eof() {
            break;
        }
        if s.peek() == Some('#') {
            s.skip_comment();
            continue;
        }

        let line = s.line();
        let start = s.pos();
        let mut words = Vec::new();
        loop {
            s.skip_blank();
            if s.eof() || s.at_separator() {
                break;
            }
            words.push(parse_word(&mut s)?);
        }
        let text = s.slice(start, s.pos()).trim().to_string();
        if !words.is_empty() {
            commands.push(ParsedCommand { words, line, text });
        }
    }

    Ok(Script { commands })
}

fn parse_word(s: &mut Scanner) -> Result<Word, ParseError> {
    match s.peek() {
        Some('{') => {
            let body = s.read_braced()?;
            check_word_boundary(s, true)?;
            Ok(Word::literal(body, true))
        }
        Some('"') => {
            let open_line = s.line();
            s.next();
            let parts = parse_parts(s, Stop::Quote { open_line })?;
            check_word_boundary(s, false)?;
            Ok(Word {
                parts,
                braced: false,
            })
        }
        _ => {
            let parts = parse_parts(s, Stop::Bare)?;
            Ok(Word {
                parts,
                braced: false,
            })
        }
    }
}

/// A closed brace or quote must be followed by a word or command
/// separator.
fn check_word_boundary(s: &Scanner, brace: bool) -> Result<(), ParseError> {
    match s.peek() {
        None | Some(' ' | '\t' | '\r' | '\n' | ';') => Ok(()),
        Some('\\') if s.peek_at(1) == Some('\n') => Ok(()),
        Some(_) if brace => Err(ParseError::ExtraAfterCloseBrace { line: s.line() }),
        Some(_) => Err(ParseError::ExtraAfterCloseQuote { line: s.line() }),
    }
}

fn parse_parts(s: &mut Scanner, stop: Stop) -> Result<Vec<Part>, ParseError> {
    let mut parts = Vec::new();
    let mut literal = String::new();

    macro_rules! flush {
        () => {
            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
        };
    }

    loop {
        let c = match s.peek() {
            Some(c) => c,
            None => match stop {
                Stop::Bare | Stop::End => break,
                Stop::Quote { open_line } => {
                    return Err(ParseError::MissingQuote { line: open_line })
                }
                Stop::Paren { open_line } => {
                    return Err(ParseError::MissingCloseParen { line: open_line })
                }
            },
        };

        match stop {
            Stop::Bare if matches!(c, ' ' | '\t' | '\r' | '\n' | ';') => break,
            Stop::Bare if c == '\\' && s.peek_at(1) == Some('\n') => break,
            Stop::Quote { .. } if c == '"' => {
                s.next();
                break;
            }
            Stop::Paren { .. } if c == ')' => {
                s.next();
                break;
            }
            _ => {}
        }

        match c {
            '\\' => {
                flush!();
                let (decoded, raw) = s.read_escape();
                parts.push(Part::Backslash { raw, decoded });
            }
            '$' => match parse_var_ref(s)? {
                Some(var) => {
                    flush!();
                    parts.push(Part::Var(var));
                }
                // A lone `$` with no name is literal.
                None => literal.push('$'),
            },
            '[' => {
                flush!();
                let start = s.pos();
                let body = s.read_bracket()?;
                let raw = s.slice(start, s.pos());
                parts.push(Part::Script { raw, body });
            }
            _ => {
                literal.push(c);
                s.next();
            }
        }
    }

    flush!();
    Ok(parts)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

/// Parse a `$` reference. The cursor sits on the `$`; returns None when
/// no variable name follows (the `$` is then literal text).
fn parse_var_ref(s: &mut Scanner) -> Result<Option<VarRef>, ParseError> {
    let start = s.pos();
    s.next(); // the `$`

    if s.peek() == Some('{') {
        let open_line = s.line();
        s.next();
        let mut name = String::new();
        loop {
            match s.next() {
                Some('}') => break,
                Some(c) => name.push(c),
                None => return Err(ParseError::MissingCloseBrace { line: open_line }),
            }
        }
        let raw = s.slice(start, s.pos());
        return Ok(Some(VarRef {
            name,
            index: None,
            raw,
        }));
    }

    let mut name = String::new();
    while let Some(c) = s.peek() {
        if is_name_char(c) {
            name.push(c);
            s.next();
        } else {
            break;
        }
    }
    if name.is_empty() {
        return Ok(None);
    }

    let index = if s.peek() == Some('(') {
        let open_line = s.line();
        s.next();
        Some(parse_parts(s, Stop::Paren { open_line })?)
    } else {
        None
    };

    let raw = s.slice(start, s.pos());
    Ok(Some(VarRef { name, index, raw }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Script {
        parse_script(src).unwrap()
    }

    fn lit(s: &str) -> Part {
        Part::Literal(s.to_string())
    }

    #[test]
    fn simple_command() {
        let script = parse("set x 5");
        assert_eq!(script.commands.len(), 1);
        let cmd = &script.commands[0];
        assert_eq!(cmd.line, 1);
        assert_eq!(cmd.text, "set x 5");
        assert_eq!(cmd.words.len(), 3);
        assert_eq!(cmd.words[0].parts, vec![lit("set")]);
        assert_eq!(cmd.words[2].parts, vec![lit("5")]);
    }

    #[test]
    fn separators_split_commands() {
        let script = parse("a; b\nc");
        let names: Vec<_> = script
            .commands
            .iter()
            .map(|c| c.text.clone())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(script.commands[2].line, 2);
    }

    #[test]
    fn comments_dropped() {
        let script = parse("# leading\nset x 1 ;# trailing\nputs hi");
        // `;` puts the scanner back at command start, so the trailing
        // `#` opens a comment too.
        assert_eq!(script.commands.len(), 2);
        assert_eq!(script.commands[0].text, "set x 1");
        assert_eq!(script.commands[1].text, "puts hi");
    }

    #[test]
    fn braced_word_is_literal() {
        let script = parse("set x {a $b [c]}");
        let word = &script.commands[0].words[2];
        assert!(word.braced);
        assert_eq!(word.parts, vec![lit("a $b [c]")]);
    }

    #[test]
    fn quoted_word_substitutes() {
        let script = parse("puts \"a $x b\"");
        let word = &script.commands[0].words[1];
        assert!(!word.braced);
        assert_eq!(word.parts.len(), 3);
        assert_eq!(word.parts[0], lit("a "));
        match &word.parts[1] {
            Part::Var(v) => {
                assert_eq!(v.name, "x");
                assert_eq!(v.raw, "$x");
                assert!(v.index.is_none());
            }
            other => panic!("expected var, got {other:?}"),
        }
        assert_eq!(word.parts[2], lit(" b"));
    }

    #[test]
    fn var_with_index() {
        let script = parse("puts $a($i)");
        match &script.commands[0].words[1].parts[0] {
            Part::Var(v) => {
                assert_eq!(v.name, "a");
                let index = v.index.as_ref().unwrap();
                assert!(matches!(&index[0], Part::Var(inner) if inner.name == "i"));
                assert_eq!(v.raw, "$a($i)");
            }
            other => panic!("expected var, got {other:?}"),
        }
    }

    #[test]
    fn braced_var_name() {
        let script = parse("puts ${a b}");
        match &script.commands[0].words[1].parts[0] {
            Part::Var(v) => {
                assert_eq!(v.name, "a b");
                assert_eq!(v.raw, "${a b}");
            }
            other => panic!("expected var, got {other:?}"),
        }
    }

    #[test]
    fn lone_dollar_is_literal() {
        let script = parse("puts a$ b");
        assert_eq!(script.commands[0].words[1].parts, vec![lit("a$")]);
    }

    #[test]
    fn bracket_part_keeps_raw() {
        let script = parse("set x [expr 1 + 2]");
        match &script.commands[0].words[2].parts[0] {
            Part::Script { raw, body } => {
                assert_eq!(raw, "[expr 1 + 2]");
                assert_eq!(body, "expr 1 + 2");
            }
            other => panic!("expected script, got {other:?}"),
        }
    }

    #[test]
    fn backslash_part() {
        let script = parse("puts a\\nb");
        let parts = &script.commands[0].words[1].parts;
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[1],
            Part::Backslash {
                raw: "\\n".to_string(),
                decoded: "\n".to_string()
            }
        );
    }

    #[test]
    fn continuation_joins_lines() {
        let script = parse("set x \\\n 5");
        assert_eq!(script.commands.len(), 1);
        assert_eq!(script.commands[0].words.len(), 3);
    }

    #[test]
    fn extra_after_close_brace() {
        let err = parse_script("set x {a}b").unwrap_err();
        assert_eq!(err, ParseError::ExtraAfterCloseBrace { line: 1 });
    }

    #[test]
    fn extra_after_close_quote() {
        let err = parse_script("set x \"a\"b").unwrap_err();
        assert_eq!(err, ParseError::ExtraAfterCloseQuote { line: 1 });
    }

    #[test]
    fn unterminated_quote_reports_open_line() {
        let err = parse_script("a\nputs \"oops").unwrap_err();
        assert_eq!(err, ParseError::MissingQuote { line: 2 });
    }

    #[test]
    fn unterminated_index() {
        let err = parse_script("puts $a(b").unwrap_err();
        assert_eq!(err, ParseError::MissingCloseParen { line: 1 });
    }

    #[test]
    fn command_line_numbers() {
        let script = parse("\n\nset a 1\nset b 2");
        assert_eq!(script.commands[0].line, 3);
        assert_eq!(script.commands[1].line, 4);
    }

    #[test]
    fn empty_and_blank_scripts() {
        assert!(parse("").commands.is_empty());
        assert!(parse("  \n ;; \t\n").commands.is_empty());
    }

    #[test]
    fn template_keeps_blanks_and_separators() {
        let parts = parse_template("a b; $x\n[cmd]").unwrap();
        assert_eq!(parts[0], lit("a b; "));
        assert!(matches!(&parts[1], Part::Var(v) if v.name == "x"));
        assert_eq!(parts[2], lit("\n"));
        assert!(matches!(&parts[3], Part::Script { body, .. } if body == "cmd"));
    }

    #[test]
    fn newline_inside_quotes_is_literal() {
        let script = parse("puts \"a\nb\"");
        assert_eq!(script.commands.len(), 1);
        assert_eq!(script.commands[0].words[1].parts, vec![lit("a\nb")]);
    }
}

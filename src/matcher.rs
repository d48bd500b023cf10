use std::fmt::Write as _;

use crate::ast::CharClass;
use crate::Error;

/// Bytecode operations. Jump operands are signed 16-bit offsets relative to
/// the word following the operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub(crate) enum Op {
    Nop = 0,
    Comment,
    Match,
    Reject,
    Jump,
    JumpIfCharIsNot,
    JumpIfCharNotMatches,
    JumpIfNotAtStart,
    JumpIfNotAtEnd,
    Advance,
    Backtrack,
    JumpIfOutOfBounds,
    PushPos,
    PopPos,
    Call,
    Return,
    PushLocal,
    IncLocal,
    PopLocal,
    DecLocalOrPopJump,
    JumpIfLocalZero,
    Switch,
    StartGroup,
    EndGroup,
}

impl Op {
    fn decode(word: u16) -> Option<Op> {
        use Op::*;
        Some(match word {
            0 => Nop,
            1 => Comment,
            2 => Match,
            3 => Reject,
            4 => Jump,
            5 => JumpIfCharIsNot,
            6 => JumpIfCharNotMatches,
            7 => JumpIfNotAtStart,
            8 => JumpIfNotAtEnd,
            9 => Advance,
            10 => Backtrack,
            11 => JumpIfOutOfBounds,
            12 => PushPos,
            13 => PopPos,
            14 => Call,
            15 => Return,
            16 => PushLocal,
            17 => IncLocal,
            18 => PopLocal,
            19 => DecLocalOrPopJump,
            20 => JumpIfLocalZero,
            21 => Switch,
            22 => StartGroup,
            23 => EndGroup,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        use Op::*;
        match self {
            Nop => "Nop",
            Comment => "Comment",
            Match => "Match",
            Reject => "Reject",
            Jump => "Jump",
            JumpIfCharIsNot => "JumpIfCharIsNot",
            JumpIfCharNotMatches => "JumpIfCharNotMatches",
            JumpIfNotAtStart => "JumpIfNotAtStart",
            JumpIfNotAtEnd => "JumpIfNotAtEnd",
            Advance => "Advance",
            Backtrack => "Backtrack",
            JumpIfOutOfBounds => "JumpIfOutOfBounds",
            PushPos => "PushPos",
            PopPos => "PopPos",
            Call => "Call",
            Return => "Return",
            PushLocal => "PushLocal",
            IncLocal => "IncLocal",
            PopLocal => "PopLocal",
            DecLocalOrPopJump => "DecLocalOrPopJump",
            JumpIfLocalZero => "JumpIfLocalZero",
            Switch => "Switch",
            StartGroup => "StartGroup",
            EndGroup => "EndGroup",
        }
    }
}

/// A half-open `[start, start + len)` span of character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub len: usize,
}

impl Region {
    pub fn from_offsets(start: usize, end: usize) -> Region {
        Region {
            start,
            len: end - start,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Extract the substring this region denotes from the subject text.
    /// Offsets are character offsets, so this walks the text to find the
    /// byte boundaries.
    pub fn text_in<'a>(&self, text: &'a str) -> &'a str {
        let byte_at = |offset: usize| {
            text.char_indices()
                .nth(offset)
                .map(|(i, _)| i)
                .unwrap_or(text.len())
        };
        &text[byte_at(self.start)..byte_at(self.end())]
    }
}

/// A successful match: the overall region plus one optional region per
/// capture group. Group 0 is the whole pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    region: Region,
    groups: Vec<Option<Region>>,
}

impl Match {
    pub fn region(&self) -> Region {
        self.region
    }

    pub fn start(&self) -> usize {
        self.region.start
    }

    pub fn end(&self) -> usize {
        self.region.end()
    }

    pub fn len(&self) -> usize {
        self.region.len
    }

    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    /// The region captured by group `index`, or `None` if the group never
    /// matched (or does not exist).
    pub fn group(&self, index: usize) -> Option<Region> {
        self.groups.get(index).copied().flatten()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// An immutable compiled pattern.
///
/// The program holds the instruction words, a side table of character
/// classes referenced by index, and (when compiled with diagnostics) a
/// table of comment strings. It carries no mutable state, so one program
/// can serve any number of concurrent matches.
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) code: Vec<u16>,
    pub(crate) classes: Vec<CharClass>,
    pub(crate) comments: Vec<String>,
    pub(crate) group_count: u16,
    pub(crate) local_count: u16,
}

impl Program {
    /// Find the first match at or after `start` (a character offset).
    ///
    /// Errors if `start` is outside `[0, text.chars().count()]`.
    pub fn match_from(&self, text: &str, start: usize) -> Result<Option<Match>, Error> {
        let chars: Vec<char> = text.chars().collect();
        if start > chars.len() {
            return Err(Error::StartOutOfRange {
                start,
                len: chars.len(),
            });
        }
        Ok(Vm::new(self, &chars, start).run())
    }

    /// True if the pattern matches anywhere at or after `start`.
    pub fn matches(&self, text: &str, start: usize) -> bool {
        matches!(self.match_from(text, start), Ok(Some(_)))
    }

    /// Iterate over every match at or after `start`, each search resuming
    /// at the previous match's end. An empty match advances the cursor by
    /// one so the iteration terminates.
    pub fn matches_all<'p, 't>(&'p self, text: &'t str, start: usize) -> Matches<'p, 't> {
        let len = text.chars().count();
        Matches {
            program: self,
            text,
            at: start,
            len,
            done: start > len,
        }
    }

    pub fn group_count(&self) -> usize {
        self.group_count as usize
    }

    /// Render the bytecode as text, one instruction per line, with jump
    /// operands resolved to absolute addresses.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let mut pos = 0;
        while pos < self.code.len() {
            let at = pos;
            let line = self.disassemble_one(&mut pos);
            let _ = writeln!(out, "{at:04X}: {line}");
        }
        out
    }

    fn read_word(&self, pos: &mut usize) -> Option<u16> {
        let word = self.code.get(*pos).copied();
        if word.is_some() {
            *pos += 1;
        }
        word
    }

    fn disassemble_one(&self, pos: &mut usize) -> String {
        let word = self.code[*pos];
        *pos += 1;
        let Some(op) = Op::decode(word) else {
            return format!("<unknown opcode {word:04X}>");
        };
        let name = op.name();
        match op {
            Op::Nop
            | Op::Match
            | Op::Reject
            | Op::Advance
            | Op::Backtrack
            | Op::PushPos
            | Op::PopPos
            | Op::Return => name.to_string(),
            Op::Jump
            | Op::Call
            | Op::JumpIfNotAtStart
            | Op::JumpIfNotAtEnd
            | Op::JumpIfOutOfBounds => match self.read_word(pos) {
                Some(offset) => format!("{name}\t{}", jump_target(offset as i16, *pos)),
                None => partial(name, &[]),
            },
            Op::JumpIfCharIsNot => {
                let Some(c) = self.read_word(pos) else {
                    return partial(name, &[]);
                };
                let c = char::from_u32(c as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
                match self.read_word(pos) {
                    Some(offset) => {
                        format!("{name} '{c}'\t{}", jump_target(offset as i16, *pos))
                    }
                    None => partial(name, &[format!("'{c}'")]),
                }
            }
            Op::JumpIfCharNotMatches => {
                let Some(index) = self.read_word(pos) else {
                    return partial(name, &[]);
                };
                let class = self
                    .classes
                    .get(index as usize)
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "<invalid class>".to_string());
                match self.read_word(pos) {
                    Some(offset) => {
                        format!("{name} {class}\t{}", jump_target(offset as i16, *pos))
                    }
                    None => partial(name, &[class]),
                }
            }
            Op::PushLocal | Op::IncLocal | Op::PopLocal => match self.read_word(pos) {
                Some(local) => format!(
                    "{name}\t{local:04X}{}",
                    if local < self.local_count {
                        ""
                    } else {
                        " <invalid local>"
                    }
                ),
                None => partial(name, &[]),
            },
            Op::DecLocalOrPopJump | Op::JumpIfLocalZero => {
                let Some(local) = self.read_word(pos) else {
                    return partial(name, &[]);
                };
                match self.read_word(pos) {
                    Some(offset) => format!(
                        "{name}\t{local:04X} {}",
                        jump_target(offset as i16, *pos)
                    ),
                    None => partial(name, &[format!("{local:04X}")]),
                }
            }
            Op::Switch => {
                let Some(local) = self.read_word(pos) else {
                    return partial(name, &[]);
                };
                let Some(count) = self.read_word(pos) else {
                    return partial(name, &[format!("{local:04X}")]);
                };
                let end = *pos + count as usize;
                let mut targets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let Some(offset) = self.read_word(pos) else {
                        return partial(name, &targets);
                    };
                    targets.push(jump_target(offset as i16, end));
                }
                format!("{name} {local:04X}\t{}", targets.join(", "))
            }
            Op::StartGroup | Op::EndGroup => match self.read_word(pos) {
                Some(index) => format!(
                    "{name}\t{index:04X}{}",
                    if index < self.group_count {
                        ""
                    } else {
                        " <invalid group>"
                    }
                ),
                None => partial(name, &[]),
            },
            Op::Comment => match self.read_word(pos) {
                Some(index) => {
                    let text = self
                        .comments
                        .get(index as usize)
                        .map(|s| format!("- {s}"))
                        .unwrap_or_else(|| "<invalid string>".to_string());
                    format!("{name} {index:04X} {text}")
                }
                None => partial(name, &[]),
            },
        }
    }
}

fn jump_target(offset: i16, pos: usize) -> String {
    format!("{offset:+} [{:04X}]", pos as i64 + offset as i64)
}

fn partial(name: &str, parts: &[String]) -> String {
    let mut s = format!("<partial {name}");
    for part in parts {
        s.push(' ');
        s.push_str(part);
    }
    s.push('>');
    s
}

/// Lazy iterator over non-overlapping matches. See [`Program::matches_all`].
pub struct Matches<'p, 't> {
    program: &'p Program,
    text: &'t str,
    at: usize,
    len: usize,
    done: bool,
}

impl Iterator for Matches<'_, '_> {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        if self.done {
            return None;
        }
        match self.program.match_from(self.text, self.at) {
            Ok(Some(found)) => {
                self.at = if found.is_empty() {
                    found.end() + 1
                } else {
                    found.end()
                };
                if self.at > self.len {
                    self.done = true;
                }
                Some(found)
            }
            _ => {
                self.done = true;
                None
            }
        }
    }
}

/// One match attempt's worth of execution state. All of it is owned by the
/// invocation, so concurrent matches over one shared [`Program`] never
/// interfere.
struct Vm<'a> {
    program: &'a Program,
    text: &'a [char],
    ip: usize,
    pos: isize,
    positions: Vec<isize>,
    calls: Vec<usize>,
    locals: Vec<Vec<i32>>,
    groups: Vec<Option<Region>>,
}

impl<'a> Vm<'a> {
    fn new(program: &'a Program, text: &'a [char], start: usize) -> Vm<'a> {
        Vm {
            program,
            text,
            ip: 0,
            pos: start as isize,
            positions: Vec::new(),
            calls: Vec::new(),
            locals: vec![Vec::new(); program.local_count as usize],
            groups: vec![None; program.group_count as usize],
        }
    }

    fn word(&mut self) -> u16 {
        let word = self.program.code[self.ip];
        self.ip += 1;
        word
    }

    fn offset(&mut self) -> i16 {
        self.word() as i16
    }

    fn branch(&mut self, offset: i16) {
        self.ip = self
            .ip
            .checked_add_signed(offset as isize)
            .expect("jump target out of range");
    }

    fn in_bounds(&self) -> bool {
        self.pos >= 0 && (self.pos as usize) < self.text.len()
    }

    fn current_char(&self) -> char {
        self.text[self.pos as usize]
    }

    fn run(mut self) -> Option<Match> {
        while self.ip < self.program.code.len() {
            let word = self.word();
            let op = Op::decode(word)
                .unwrap_or_else(|| panic!("unknown opcode {word:04X} at {:04X}", self.ip - 1));
            match op {
                Op::Nop => {}
                Op::Comment => {
                    self.ip += 1;
                }
                Op::Match => {
                    let start = *self
                        .positions
                        .first()
                        .expect("no scan position saved at match");
                    return Some(Match {
                        region: Region::from_offsets(start as usize, self.pos as usize),
                        groups: self.groups,
                    });
                }
                Op::Reject => return None,
                Op::PushPos => self.positions.push(self.pos),
                Op::PopPos => {
                    self.pos = self.positions.pop().expect("position stack underflow");
                }
                Op::Advance => self.pos += 1,
                Op::Backtrack => self.pos -= 1,
                Op::Jump => {
                    let offset = self.offset();
                    self.branch(offset);
                }
                Op::Call => {
                    let offset = self.offset();
                    self.calls.push(self.ip);
                    self.branch(offset);
                }
                // A no-op outside a call, so backtrack functions may be
                // entered by fallthrough as well as by Call.
                Op::Return => {
                    if let Some(addr) = self.calls.pop() {
                        self.ip = addr;
                    }
                }
                Op::JumpIfOutOfBounds => {
                    let offset = self.offset();
                    if !self.in_bounds() {
                        self.branch(offset);
                    }
                }
                Op::JumpIfCharIsNot => {
                    let expected = char::from_u32(self.word() as u32)
                        .expect("invalid literal in bytecode");
                    let offset = self.offset();
                    if self.current_char() != expected {
                        self.branch(offset);
                    }
                }
                Op::JumpIfCharNotMatches => {
                    let index = self.word() as usize;
                    let offset = self.offset();
                    let class = &self.program.classes[index];
                    if !class.matches(self.current_char()) {
                        self.branch(offset);
                    }
                }
                Op::JumpIfNotAtStart => {
                    let offset = self.offset();
                    if self.pos != 0 {
                        self.branch(offset);
                    }
                }
                Op::JumpIfNotAtEnd => {
                    let offset = self.offset();
                    if self.pos < self.text.len() as isize {
                        self.branch(offset);
                    }
                }
                Op::StartGroup => {
                    let index = self.word() as usize;
                    self.groups[index] = Some(Region {
                        start: self.pos as usize,
                        len: 0,
                    });
                }
                Op::EndGroup => {
                    let index = self.word() as usize;
                    let start = self.groups[index]
                        .expect("group closed before it was opened")
                        .start;
                    self.groups[index] = Some(Region::from_offsets(start, self.pos as usize));
                }
                Op::PushLocal => {
                    let index = self.word() as usize;
                    self.locals[index].push(0);
                }
                Op::IncLocal => {
                    let index = self.word() as usize;
                    *self.locals[index].last_mut().expect("local stack underflow") += 1;
                }
                Op::PopLocal => {
                    let index = self.word() as usize;
                    self.locals[index].pop().expect("local stack underflow");
                }
                Op::DecLocalOrPopJump => {
                    let index = self.word() as usize;
                    let offset = self.offset();
                    let stack = &mut self.locals[index];
                    match stack.pop() {
                        Some(value) if value > 0 => stack.push(value - 1),
                        // Frame absent or exhausted: nothing left to retry.
                        _ => self.branch(offset),
                    }
                }
                Op::JumpIfLocalZero => {
                    let index = self.word() as usize;
                    let offset = self.offset();
                    let top = *self.locals[index].last().expect("local stack underflow");
                    if top == 0 {
                        self.branch(offset);
                    }
                }
                Op::Switch => {
                    let index = self.word() as usize;
                    let count = self.word() as usize;
                    let table = self.ip;
                    self.ip += count;
                    if let Some(&value) = self.locals[index].last() {
                        let value = value as usize;
                        if value < count {
                            let offset = self.program.code[table + value] as i16;
                            self.branch(offset);
                        }
                    }
                }
            }
        }
        panic!("ran off the end of the program");
    }
}

use std::fmt;

/// A node of the parsed pattern tree.
///
/// The parser produces exactly one root `Group` (capturing, group 0)
/// containing the whole pattern; the compiler consumes the tree and
/// assumes it is well-formed.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Ordered sequence of sub-expressions. `is_open` is only meaningful
    /// while the parser is still building the node.
    Group {
        children: Vec<Expr>,
        is_capturing: bool,
        is_open: bool,
    },
    /// Ordered alternatives, tried left to right.
    Alternation(Vec<Expr>),
    /// `^` or `$`; matches a position, not a character.
    Anchor { at_start: bool },
    /// A single-character matcher: literal, `.`, or a bracket/predefined class.
    Class(CharClass),
    /// `*`, `+` or `?` applied to one target expression.
    Quantifier {
        target: Box<Expr>,
        kind: QuantKind,
        lazy: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantKind {
    ZeroOrMore,
    OneOrMore,
    Optional,
}

impl Expr {
    pub fn group(is_capturing: bool) -> Expr {
        Expr::Group {
            children: Vec::new(),
            is_capturing,
            is_open: true,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Group {
                children,
                is_capturing,
                ..
            } => {
                write!(f, "({}", if *is_capturing { "" } else { "?:" })?;
                for child in children {
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            Expr::Alternation(branches) => {
                write!(f, "(")?;
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    write!(f, "{branch}")?;
                }
                write!(f, ")")
            }
            Expr::Anchor { at_start } => write!(f, "{}", if *at_start { '^' } else { '$' }),
            Expr::Class(class) => write!(f, "{class}"),
            Expr::Quantifier { target, kind, lazy } => {
                let symbol = match kind {
                    QuantKind::ZeroOrMore => '*',
                    QuantKind::OneOrMore => '+',
                    QuantKind::Optional => '?',
                };
                write!(f, "{target}{symbol}{}", if *lazy { "?" } else { "" })
            }
        }
    }
}

/// A single-character matcher. Every variant can answer `matches(c)`.
#[derive(Debug, Clone)]
pub enum CharClass {
    /// `.` — matches every character.
    Any,
    /// An exact literal character.
    Single(char),
    /// `\s` (or `\S` when `inverse`).
    Whitespace { inverse: bool },
    /// A bracket expression: ranges plus nested predefined classes.
    Ranged(RangedClass),
}

impl CharClass {
    /// `\d` / `\D`.
    pub fn digit(inverse: bool) -> CharClass {
        let mut class = RangedClass::new(inverse);
        class.add_range('0', '9');
        CharClass::Ranged(class)
    }

    /// `\w` / `\W`: `[A-Za-z0-9_]` or its complement.
    pub fn word(inverse: bool) -> CharClass {
        let mut class = RangedClass::new(inverse);
        class.add_range('A', 'Z');
        class.add_range('a', 'z');
        class.add_range('0', '9');
        class.add('_');
        CharClass::Ranged(class)
    }

    /// `\s` / `\S`.
    pub fn whitespace(inverse: bool) -> CharClass {
        CharClass::Whitespace { inverse }
    }

    pub fn matches(&self, c: char) -> bool {
        match self {
            CharClass::Any => true,
            CharClass::Single(literal) => c == *literal,
            CharClass::Whitespace { inverse } => c.is_whitespace() ^ inverse,
            CharClass::Ranged(ranged) => ranged.matches(c),
        }
    }
}

impl fmt::Display for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharClass::Any => write!(f, "."),
            CharClass::Single(c) => write!(f, "{c}"),
            CharClass::Whitespace { inverse } => {
                write!(f, "\\{}", if *inverse { 'S' } else { 's' })
            }
            CharClass::Ranged(ranged) => write!(f, "{ranged}"),
        }
    }
}

/// A set of half-open `[min, max)` code point ranges plus nested class
/// matchers, built up incrementally while a bracket expression is parsed.
///
/// A character matches if it falls in any range XOR `inverse`, or if any
/// nested class matches it.
#[derive(Debug, Clone, Default)]
pub struct RangedClass {
    inverse: bool,
    ranges: Vec<(u32, u32)>,
    nested: Vec<CharClass>,
}

impl RangedClass {
    pub fn new(inverse: bool) -> RangedClass {
        RangedClass {
            inverse,
            ..RangedClass::default()
        }
    }

    /// Flip the class to its complement (`[^...]`).
    pub fn set_inverse(&mut self, inverse: bool) {
        self.inverse = inverse;
    }

    /// Add a single character as a degenerate range.
    pub fn add(&mut self, c: char) {
        self.add_range(c, c);
    }

    /// Add the inclusive range `min..=max`, stored half-open.
    pub fn add_range(&mut self, min: char, max: char) {
        self.ranges.push((min as u32, max as u32 + 1));
    }

    /// Merge another class into this one: plain non-inverted ranged classes
    /// contribute their ranges directly, single characters become degenerate
    /// ranges, anything else is kept as a nested matcher.
    pub fn add_class(&mut self, class: CharClass) {
        match class {
            CharClass::Ranged(other) if !other.inverse && other.nested.is_empty() => {
                self.ranges.extend(other.ranges);
            }
            CharClass::Single(c) => self.add(c),
            other => self.nested.push(other),
        }
    }

    pub fn matches(&self, c: char) -> bool {
        let code = c as u32;
        let in_range = self.ranges.iter().any(|&(min, max)| min <= code && code < max);
        (in_range ^ self.inverse) || self.nested.iter().any(|class| class.matches(c))
    }
}

impl fmt::Display for RangedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", if self.inverse { "^" } else { "" })?;
        for &(min, max) in &self.ranges {
            let min = char::from_u32(min).unwrap_or(char::REPLACEMENT_CHARACTER);
            let max = char::from_u32(max - 1).unwrap_or(char::REPLACEMENT_CHARACTER);
            write!(f, "{min}")?;
            if min != max {
                write!(f, "-{max}")?;
            }
        }
        for class in &self.nested {
            write!(f, "{class}")?;
        }
        write!(f, "]")
    }
}

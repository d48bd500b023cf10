use crate::ast::{CharClass, Expr, QuantKind, RangedClass};
use crate::Error;

/// Parse a pattern into its expression tree.
///
/// The returned tree is always a single capturing root group (group 0)
/// wrapping the whole pattern.
///
/// Example:
/// - Pattern: `a(b|c)` → `(a((?:b)|(?:c)))`
pub fn parse(pattern: &str) -> Result<Expr, Error> {
    Parser::new().run(pattern)
}

/// Resolve the character following a `\`, inside or outside a class.
fn resolve_escape(c: char) -> CharClass {
    match c {
        'd' => CharClass::digit(false),
        'D' => CharClass::digit(true),
        'w' => CharClass::word(false),
        'W' => CharClass::word(true),
        's' => CharClass::whitespace(false),
        'S' => CharClass::whitespace(true),
        'n' => CharClass::Single('\n'),
        'r' => CharClass::Single('\r'),
        't' => CharClass::Single('\t'),
        '0' => CharClass::Single('\0'),
        'b' => CharClass::Single('\u{0008}'),
        'f' => CharClass::Single('\u{000C}'),
        other => CharClass::Single(other),
    }
}

/// Single-pass, stack-based pattern scanner.
///
/// The stack holds in-progress expressions; a completed element sits on top
/// until the next element arrives and collapses it into the enclosing
/// composite. Paren depth is tracked separately because `|` replaces the
/// open group it splits.
struct Parser {
    stack: Vec<Expr>,
    depth: usize,
    class: Option<ClassBuilder>,
}

impl Parser {
    fn new() -> Parser {
        Parser {
            stack: vec![Expr::group(true)],
            depth: 0,
            class: None,
        }
    }

    fn run(mut self, pattern: &str) -> Result<Expr, Error> {
        if pattern.is_empty() {
            return Err(Error::EmptyPattern);
        }

        let mut chars = pattern.chars().peekable();
        let mut escape = false;
        let mut quant_on_top = false;

        while let Some(c) = chars.next() {
            let after_quantifier = quant_on_top;
            quant_on_top = false;

            if self.class.is_some() {
                self.class_char(c, &mut escape)?;
                continue;
            }

            if escape {
                escape = false;
                self.push_atom(Expr::Class(resolve_escape(c)));
                continue;
            }

            match c {
                '\\' => escape = true,
                '(' => {
                    let capturing = if chars.peek() == Some(&'?') {
                        chars.next();
                        if chars.next() != Some(':') {
                            return Err(Error::InvalidGroup);
                        }
                        false
                    } else {
                        true
                    };
                    self.collapse();
                    self.stack.push(Expr::group(capturing));
                    self.depth += 1;
                }
                ')' => self.close_group()?,
                '|' => self.alternate(),
                '[' => {
                    self.collapse();
                    self.class = Some(ClassBuilder::new());
                }
                ']' => return Err(Error::StrayClassEnd),
                '?' if after_quantifier => self.make_lazy(),
                '*' => {
                    self.quantify(QuantKind::ZeroOrMore)?;
                    quant_on_top = true;
                }
                '+' => {
                    self.quantify(QuantKind::OneOrMore)?;
                    quant_on_top = true;
                }
                '?' => {
                    self.quantify(QuantKind::Optional)?;
                    quant_on_top = true;
                }
                '.' => self.push_atom(Expr::Class(CharClass::Any)),
                '^' => self.push_atom(Expr::Anchor { at_start: true }),
                '$' => self.push_atom(Expr::Anchor { at_start: false }),
                other => self.push_atom(Expr::Class(CharClass::Single(other))),
            }
        }

        if escape {
            return Err(Error::DanglingEscape);
        }
        if self.class.is_some() {
            return Err(Error::UnterminatedClass);
        }

        self.collapse();
        self.fold_trailing_alternation();

        if self.depth != 0 || self.stack.len() != 1 {
            return Err(Error::UnclosedGroup);
        }

        let mut root = self.stack.pop().unwrap();
        if let Expr::Group { is_open, .. } = &mut root {
            *is_open = false;
        }
        Ok(root)
    }

    /// Fold the completed element on top of the stack into the composite
    /// beneath it. A still-open group on top is awaiting content and is
    /// left alone.
    fn collapse(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        if let Some(Expr::Group { is_open: true, .. }) = self.stack.last() {
            return;
        }
        let expr = self.stack.pop().unwrap();
        match self.stack.last_mut() {
            Some(Expr::Group { children, .. }) => children.push(expr),
            Some(Expr::Alternation(branches)) => branches.push(expr),
            _ => unreachable!("completed elements always sit on a composite"),
        }
    }

    fn push_atom(&mut self, expr: Expr) {
        self.collapse();
        self.stack.push(expr);
    }

    /// Handle `)`: close the innermost open group. If that group is an
    /// alternation branch, the branch is folded into the alternation and
    /// the alternation into its wrapper group, so code generation sees a
    /// uniform shape however deeply alternation nests under a capture.
    fn close_group(&mut self) -> Result<(), Error> {
        self.collapse();
        if self.depth == 0 {
            return Err(Error::UnmatchedParen);
        }
        let n = self.stack.len();
        if n >= 2 && matches!(self.stack[n - 2], Expr::Alternation(_)) {
            self.fold_trailing_alternation();
            match self.stack.last_mut() {
                Some(Expr::Group { is_open, .. }) => *is_open = false,
                _ => unreachable!("an alternation always sits on its wrapper group"),
            }
        } else {
            match self.stack.last_mut() {
                Some(Expr::Group {
                    is_open: is_open @ true,
                    ..
                }) => *is_open = false,
                _ => return Err(Error::UnmatchedParen),
            }
        }
        self.depth -= 1;
        Ok(())
    }

    /// Handle `|`: the open group on top becomes one finished branch. A
    /// capturing group is replaced by a capturing wrapper beneath the
    /// alternation so the capture spans every branch.
    fn alternate(&mut self) {
        self.collapse();
        let (children, is_capturing) = match self.stack.pop() {
            Some(Expr::Group {
                children,
                is_capturing,
                ..
            }) => (children, is_capturing),
            _ => unreachable!("`|` always splits an open group"),
        };
        let branch = Expr::Group {
            children,
            is_capturing: false,
            is_open: false,
        };
        match self.stack.last_mut() {
            Some(Expr::Alternation(branches)) => branches.push(branch),
            _ => {
                self.stack.push(Expr::group(is_capturing));
                self.stack.push(Expr::Alternation(vec![branch]));
            }
        }
        self.stack.push(Expr::group(false));
    }

    /// Close the open branch group on top of an alternation and fold the
    /// alternation into its wrapper group. No-op for any other stack shape.
    fn fold_trailing_alternation(&mut self) {
        let n = self.stack.len();
        if n < 3
            || !matches!(self.stack[n - 2], Expr::Alternation(_))
            || !matches!(self.stack[n - 1], Expr::Group { is_open: true, .. })
        {
            return;
        }
        let branch = match self.stack.pop() {
            Some(Expr::Group { children, .. }) => Expr::Group {
                children,
                is_capturing: false,
                is_open: false,
            },
            _ => unreachable!(),
        };
        match self.stack.last_mut() {
            Some(Expr::Alternation(branches)) => branches.push(branch),
            _ => unreachable!(),
        }
        let alternation = self.stack.pop().unwrap();
        match self.stack.last_mut() {
            Some(Expr::Group { children, .. }) => children.push(alternation),
            _ => unreachable!("an alternation always sits on its wrapper group"),
        }
    }

    /// Handle `*`, `+`, `?`: wrap the most recently completed element.
    fn quantify(&mut self, kind: QuantKind) -> Result<(), Error> {
        if self.stack.len() == 1 {
            return Err(Error::DanglingQuantifier);
        }
        let target = self.stack.pop().unwrap();
        if matches!(target, Expr::Group { is_open: true, .. }) {
            return Err(Error::DanglingQuantifier);
        }
        self.stack.push(Expr::Quantifier {
            target: Box::new(target),
            kind,
            lazy: false,
        });
        Ok(())
    }

    /// A `?` directly after a quantifier marks it lazy.
    fn make_lazy(&mut self) {
        match self.stack.last_mut() {
            Some(Expr::Quantifier { lazy, .. }) => *lazy = true,
            _ => unreachable!("lazy marker only follows a quantifier"),
        }
    }

    /// Handle one character inside `[...]`.
    fn class_char(&mut self, c: char, escape: &mut bool) -> Result<(), Error> {
        if !*escape {
            match c {
                '\\' => {
                    *escape = true;
                    return Ok(());
                }
                ']' => {
                    let built = self.class.take().unwrap().finish();
                    self.stack.push(Expr::Class(CharClass::Ranged(built)));
                    return Ok(());
                }
                '[' => return Err(Error::NestedClass),
                _ => {}
            }
        }

        let builder = self.class.as_mut().unwrap();
        if *escape {
            *escape = false;
            match resolve_escape(c) {
                CharClass::Single(literal) => builder.literal(literal),
                class => builder.nested(class),
            }
        } else {
            match c {
                '^' if builder.at_head => builder.class.set_inverse(true),
                '-' => builder.dash(),
                other => builder.literal(other),
            }
        }
        builder.at_head = false;
        Ok(())
    }
}

/// What a partially-scanned bracket expression is waiting on.
enum Pending {
    Nothing,
    /// A literal that may yet become the start of a range.
    Member(char),
    /// A literal followed by `-`; the next literal closes the range.
    RangeFrom(char),
}

/// In-progress bracket expression.
struct ClassBuilder {
    class: RangedClass,
    pending: Pending,
    /// True until the first member; only there does `^` mean negation.
    at_head: bool,
}

impl ClassBuilder {
    fn new() -> ClassBuilder {
        ClassBuilder {
            class: RangedClass::new(false),
            pending: Pending::Nothing,
            at_head: true,
        }
    }

    fn literal(&mut self, c: char) {
        match std::mem::replace(&mut self.pending, Pending::Nothing) {
            Pending::RangeFrom(min) => self.class.add_range(min, c),
            Pending::Member(prev) => {
                self.class.add(prev);
                self.pending = Pending::Member(c);
            }
            Pending::Nothing => self.pending = Pending::Member(c),
        }
    }

    fn dash(&mut self) {
        match std::mem::replace(&mut self.pending, Pending::Nothing) {
            Pending::Member(prev) => self.pending = Pending::RangeFrom(prev),
            // `a--` closes the range on the dash itself.
            Pending::RangeFrom(min) => self.class.add_range(min, '-'),
            // Nothing can start a range here, so the dash is a plain member.
            Pending::Nothing => self.class.add('-'),
        }
    }

    /// A predefined class cannot end a range; a pending `a-` decomposes
    /// into its two literals.
    fn nested(&mut self, class: CharClass) {
        match std::mem::replace(&mut self.pending, Pending::Nothing) {
            Pending::RangeFrom(min) => {
                self.class.add(min);
                self.class.add('-');
            }
            Pending::Member(prev) => self.class.add(prev),
            Pending::Nothing => {}
        }
        self.class.add_class(class);
    }

    fn finish(mut self) -> RangedClass {
        match self.pending {
            Pending::RangeFrom(min) => {
                self.class.add(min);
                self.class.add('-');
            }
            Pending::Member(prev) => self.class.add(prev),
            Pending::Nothing => {}
        }
        self.class
    }
}

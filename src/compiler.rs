use crate::ast::{CharClass, Expr, QuantKind};
use crate::matcher::{Op, Program};

/// What one node's emission hands back to its caller, with every address
/// still unresolved:
/// - `failure`: operand positions to patch to wherever this node should
///   send control when it cannot match;
/// - `cont`: operand positions to patch to wherever execution resumes once
///   this node has fully matched;
/// - `backtrack`: the entry address of this node's backtrack function, if
///   it has one — `Call`ed when a later failure needs this node to give an
///   alternative a try.
struct Emitted {
    failure: Vec<usize>,
    cont: Vec<usize>,
    backtrack: Option<usize>,
}

impl Emitted {
    fn plain(failure: Vec<usize>) -> Emitted {
        Emitted {
            failure,
            cont: Vec::new(),
            backtrack: None,
        }
    }
}

/// Translates an expression tree into a bytecode [`Program`].
///
/// Every node is compiled independently of its surroundings; forward
/// references are emitted as placeholder operands and patched once the
/// target address exists. `last_backtrace` threads the nearest enclosing
/// backtrack point through sequences, quantifiers and alternations so a
/// failing node knows where to send control.
pub struct Compiler {
    code: Vec<u16>,
    classes: Vec<CharClass>,
    comments: Vec<String>,
    group_count: u16,
    local_count: u16,
    last_backtrace: usize,
    diagnostics: bool,
}

impl Default for Compiler {
    fn default() -> Compiler {
        Compiler::new()
    }
}

impl Compiler {
    pub fn new() -> Compiler {
        Compiler {
            code: Vec::new(),
            classes: Vec::new(),
            comments: Vec::new(),
            group_count: 0,
            local_count: 0,
            last_backtrace: 0,
            diagnostics: false,
        }
    }

    /// Like [`Compiler::new`], but each emitted block is bracketed by
    /// `Comment` instructions naming the originating expression, for the
    /// disassembler.
    pub fn with_diagnostics() -> Compiler {
        Compiler {
            diagnostics: true,
            ..Compiler::new()
        }
    }

    /// Compile the tree, wrapped in the outer scanning loop that retries
    /// the whole pattern at successive start offsets until the cursor runs
    /// out of text.
    pub fn compile(mut self, expr: &Expr) -> Program {
        if self.diagnostics {
            // index 0 is the block-closing marker
            self.comments.push("}".to_string());
        }

        let start_jump = self.emit_partial_jump(Op::Jump);
        let reject_pos = self.here();
        self.emit_op(Op::Reject);
        let advance_iter = self.here();
        self.last_backtrace = advance_iter;
        self.emit_op(Op::PopPos);
        self.emit_op(Op::Advance);
        self.emit_jump(Op::JumpIfOutOfBounds, reject_pos);
        let here = self.here();
        self.patch(start_jump, here);
        self.emit_op(Op::PushPos);
        self.emit_op(Op::Return);

        let emitted = self.emit_expr(expr);
        self.patch_all(&emitted.failure, advance_iter);
        let here = self.here();
        self.patch_all(&emitted.cont, here);
        self.emit_op(Op::Match);

        Program {
            code: self.code,
            classes: self.classes,
            comments: self.comments,
            group_count: self.group_count,
            local_count: self.local_count,
        }
    }

    fn emit_expr(&mut self, expr: &Expr) -> Emitted {
        if self.diagnostics {
            let index = self.comments.len() as u16;
            self.emit_with(Op::Comment, index);
            self.comments.push(format!("{{ // {expr}"));
        }
        let emitted = match expr {
            Expr::Group {
                children,
                is_capturing,
                ..
            } => self.emit_group(children, *is_capturing),
            Expr::Alternation(branches) => self.emit_alternation(branches),
            Expr::Anchor { at_start } => self.emit_anchor(*at_start),
            Expr::Class(class) => self.emit_class(class),
            Expr::Quantifier { target, kind, lazy } => match kind {
                QuantKind::Optional => self.emit_optional(target, *lazy),
                QuantKind::ZeroOrMore => self.emit_zero_or_more(target, *lazy),
                QuantKind::OneOrMore => self.emit_one_or_more(target, *lazy),
            },
        };
        if self.diagnostics {
            self.emit_with(Op::Comment, 0);
        }
        emitted
    }

    /// Sequence compilation. Each child's failure list is patched to the
    /// backtrack point preceding it, so a failure deep in the sequence
    /// retries the most recently matched sibling first. The synthesized
    /// backtrack function unwinds the siblings in reverse order.
    fn emit_group(&mut self, children: &[Expr], is_capturing: bool) -> Emitted {
        let mut failure = Vec::new();
        let mut cont = Vec::new();
        let mut backtrack = None;
        let mut group_index = 0;

        if is_capturing {
            group_index = self.group_count;
            self.group_count += 1;
            self.emit_with(Op::StartGroup, group_index);
        }

        match children {
            [] => {}
            [only] => {
                let emitted = self.emit_expr(only);
                failure = emitted.failure;
                cont = emitted.cont;
                backtrack = emitted.backtrack;
            }
            _ => {
                let mut sibling_backtracks = Vec::with_capacity(children.len());
                for child in children {
                    let previous_backtrace = self.last_backtrace;
                    let emitted = self.emit_expr(child);
                    self.patch_all(&emitted.failure, previous_backtrace);
                    let here = self.here();
                    self.patch_all(&emitted.cont, here);
                    sibling_backtracks.push(emitted.backtrack);
                }

                let finished = self.emit_partial_jump(Op::Jump);

                backtrack = Some(self.here());
                for sibling in sibling_backtracks.iter().rev() {
                    if let Some(entry) = sibling {
                        self.emit_jump(Op::Call, *entry);
                    }
                }
                self.emit_op(Op::Return);

                cont = vec![finished];
            }
        }

        if is_capturing {
            let here = self.here();
            self.patch_all(&cont, here);
            cont.clear();
            self.emit_with(Op::EndGroup, group_index);
        }

        Emitted {
            failure,
            cont,
            backtrack,
        }
    }

    /// Bounds check, character test, advance. Consumed characters are
    /// never retried, so there is no backtrack function.
    fn emit_class(&mut self, class: &CharClass) -> Emitted {
        let bounds_check = self.emit_partial_jump(Op::JumpIfOutOfBounds);
        let exit_jump = self.emit_partial_test(class);
        self.emit_op(Op::Advance);
        Emitted::plain(vec![exit_jump, bounds_check])
    }

    fn emit_anchor(&mut self, at_start: bool) -> Emitted {
        let check = self.emit_partial_jump(if at_start {
            Op::JumpIfNotAtStart
        } else {
            Op::JumpIfNotAtEnd
        });
        Emitted::plain(vec![check])
    }

    /// Alternation compilation. Three blocks, in emission order:
    /// a `Switch` dispatch table (the externally visible backtrack
    /// function, routing to the current branch's own backtrack function);
    /// the backtrace-through block (entered when a branch fails outright:
    /// restore position, bump the branch index, run the next branch, or
    /// give up to the enclosing backtrack point); then the branches
    /// themselves.
    fn emit_alternation(&mut self, branches: &[Expr]) -> Emitted {
        let count = branches.len();
        let index_local = self.local_count;
        self.local_count += 1;
        self.emit_with(Op::PushLocal, index_local);
        self.emit_op(Op::PushPos);
        let entry_jump = self.emit_partial_jump(Op::Jump);

        let outer_backtrace = self.last_backtrace;

        // dispatch stubs, one per branch
        let mut stub_targets = Vec::with_capacity(count);
        let mut stub_calls = Vec::with_capacity(count);
        let mut stub_returns = Vec::with_capacity(count);
        for _ in 0..count {
            stub_targets.push(self.here());
            stub_calls.push(self.emit_partial_jump(Op::Call));
            stub_returns.push(self.emit_partial_jump(Op::Jump));
        }
        let backtrack = self.here();
        self.emit_switch(index_local, &stub_targets);
        let here = self.here();
        self.patch_all(&stub_returns, here);
        self.emit_with(Op::PopLocal, index_local);
        let if_no_backtrack = self.here();
        self.emit_op(Op::Return);

        // backtrace-through block
        let mut through_targets = Vec::with_capacity(count);
        let mut through_entries: Vec<Option<usize>> = vec![None; count];
        for i in 0..count {
            through_targets.push(self.here());
            if i + 1 < count {
                self.emit_op(Op::PushPos);
                self.emit_with(Op::IncLocal, index_local);
                through_entries[i + 1] = Some(self.emit_partial_jump(Op::Jump));
            } else {
                // branches exhausted
                self.emit_with(Op::PopLocal, index_local);
                self.emit_jump(Op::Jump, outer_backtrace);
            }
        }
        let on_backtrace_through = self.here();
        self.emit_op(Op::PopPos);
        self.emit_switch(index_local, &through_targets);

        // the branches
        let mut cont = Vec::new();
        let here = self.here();
        self.patch(entry_jump, here);
        let mut branch_tails = Vec::with_capacity(count);
        for (i, branch) in branches.iter().enumerate() {
            self.last_backtrace = on_backtrace_through;
            if let Some(entry) = through_entries[i] {
                let here = self.here();
                self.patch(entry, here);
            }
            let emitted = self.emit_expr(branch);
            let trailing = self.emit_partial_jump(Op::Jump);
            self.patch(stub_calls[i], emitted.backtrack.unwrap_or(if_no_backtrack));
            self.patch_all(&emitted.failure, on_backtrace_through);
            branch_tails.push(self.last_backtrace);
            cont.extend(emitted.cont);
            cont.push(trailing);
        }

        let on_backtrace = self.here();
        self.emit_switch(index_local, &branch_tails);
        self.emit_jump(Op::Jump, outer_backtrace);
        self.last_backtrace = on_backtrace;

        Emitted {
            failure: Vec::new(),
            cont,
            backtrack: Some(backtrack),
        }
    }

    /// `?`. A counter local records whether the body was attempted; its
    /// backtrack function decrements the counter or, once it would go
    /// negative, restores position and defers to the enclosing backtrack
    /// point.
    fn emit_optional(&mut self, target: &Expr, lazy: bool) -> Emitted {
        let counter = self.local_count;
        self.local_count += 1;
        self.emit_with(Op::PushLocal, counter);
        let entry_jump = self.emit_partial_jump(Op::Jump);

        // backtrack function
        let backtrack = self.here();
        let dec_jump = self.emit_partial_jump_local(Op::DecLocalOrPopJump, counter);
        self.emit_with(Op::PopLocal, counter);
        let backtrack_call = self.emit_partial_jump(Op::Call);
        let here = self.here();
        self.patch(dec_jump, here);
        self.emit_op(Op::PopPos);
        let if_no_backtrack = self.here();
        self.emit_op(Op::Return);

        let cont;
        if !lazy {
            let previous_backtrace = self.last_backtrace;
            self.last_backtrace = self.here();
            let through_dec = self.emit_partial_jump_local(Op::DecLocalOrPopJump, counter);
            // counter nonzero: the body already fully unwound, give it up
            self.emit_op(Op::PopPos);
            let cont_jump = self.emit_partial_jump(Op::Jump);
            // counter was zero and is popped: defer to the last backtrack point
            self.patch(through_dec, previous_backtrace);

            let here = self.here();
            self.patch(entry_jump, here);
            self.emit_op(Op::PushPos);
            // inc on entry, so the body runs on the already-attempted path
            self.emit_with(Op::IncLocal, counter);
            let body = self.emit_expr(target);
            self.patch(backtrack_call, body.backtrack.unwrap_or(if_no_backtrack));

            cont = body
                .failure
                .into_iter()
                .chain(body.cont)
                .chain([cont_jump])
                .collect();
        } else {
            let previous_backtrace = self.last_backtrace;
            self.last_backtrace = self.here();
            let if_zero = self.emit_partial_jump_local(Op::JumpIfLocalZero, counter);
            // counter nonzero: the body was already tried and failed
            self.emit_with(Op::PopLocal, counter);
            self.emit_jump(Op::Jump, previous_backtrace);

            let here = self.here();
            self.patch(if_zero, here);
            self.emit_op(Op::PushPos);
            self.emit_with(Op::IncLocal, counter);
            let body = self.emit_expr(target);
            self.patch(backtrack_call, body.backtrack.unwrap_or(if_no_backtrack));

            cont = body
                .failure
                .into_iter()
                .chain(body.cont)
                .chain([entry_jump])
                .collect();
        }

        Emitted {
            failure: Vec::new(),
            cont,
            backtrack: Some(backtrack),
        }
    }

    /// `*`. Same counter discipline as `?` but looping: the greedy form
    /// repeats "count, save position, match body" until the body fails;
    /// its backtrack function gives repetitions back one at a time, and
    /// once the counter is exhausted defers to whatever backtrack point
    /// preceded the quantifier.
    fn emit_zero_or_more(&mut self, target: &Expr, lazy: bool) -> Emitted {
        let counter = self.local_count;
        self.local_count += 1;
        self.emit_with(Op::PushLocal, counter);
        let entry_jump = self.emit_partial_jump(Op::Jump);

        // backtrack function
        let backtrack = self.here();
        let dec_jump = self.emit_partial_jump_local(Op::DecLocalOrPopJump, counter);
        let backtrack_call = self.emit_partial_jump(Op::Call);
        self.emit_op(Op::PopPos);
        self.emit_jump(Op::Jump, backtrack);
        let here = self.here();
        self.patch(dec_jump, here);
        let if_no_backtrack = self.here();
        self.emit_op(Op::Return);

        let cont;
        if !lazy {
            let previous_backtrace = self.last_backtrace;
            self.last_backtrace = self.here();
            let through_dec = self.emit_partial_jump_local(Op::DecLocalOrPopJump, counter);
            // counter nonzero: the body already fully unwound, give one back
            self.emit_op(Op::PopPos);
            let cont_jump = self.emit_partial_jump(Op::Jump);
            self.patch(through_dec, previous_backtrace);

            let here = self.here();
            self.patch(entry_jump, here);
            let loop_top = self.here();
            self.emit_with(Op::IncLocal, counter);
            self.emit_op(Op::PushPos);
            let body = self.emit_expr(target);
            self.patch(backtrack_call, body.backtrack.unwrap_or(if_no_backtrack));
            let here = self.here();
            self.patch_all(&body.cont, here);
            self.emit_jump(Op::Jump, loop_top);

            cont = body
                .failure
                .into_iter()
                .chain([cont_jump])
                .collect();
        } else {
            let previous_backtrace = self.last_backtrace;
            let on_body_failure = self.here();
            // a repetition was tried and failed: unwind it, then defer
            self.emit_jump(Op::Call, backtrack);
            self.emit_jump(Op::Jump, previous_backtrace);

            // the backtrace-through function is what attempts one more match
            self.last_backtrace = self.here();
            self.emit_with(Op::IncLocal, counter);
            self.emit_op(Op::PushPos);
            let body = self.emit_expr(target);
            self.patch(backtrack_call, body.backtrack.unwrap_or(if_no_backtrack));
            self.patch_all(&body.failure, on_body_failure);

            cont = body.cont.into_iter().chain([entry_jump]).collect();
        }

        Emitted {
            failure: Vec::new(),
            cont,
            backtrack: Some(backtrack),
        }
    }

    /// `+` is "match the body once unconditionally, then zero-or-more of
    /// it", sharing the repetition backtrack machinery.
    fn emit_one_or_more(&mut self, target: &Expr, lazy: bool) -> Emitted {
        let entry_jump = self.emit_partial_jump(Op::Jump);

        let backtrack = self.here();
        let first_call = self.emit_partial_jump(Op::Call);
        let rest_call = self.emit_partial_jump(Op::Call);
        let if_no_backtrack = self.here();
        self.emit_op(Op::Return);

        let here = self.here();
        self.patch(entry_jump, here);
        let first = self.emit_expr(target);
        let here = self.here();
        self.patch_all(&first.cont, here);
        self.patch(first_call, first.backtrack.unwrap_or(if_no_backtrack));

        let rest = self.emit_zero_or_more(target, lazy);
        self.patch(rest_call, rest.backtrack.unwrap_or(if_no_backtrack));

        Emitted {
            failure: first.failure,
            cont: rest.failure.into_iter().chain(rest.cont).collect(),
            backtrack: Some(backtrack),
        }
    }

    // -- emit helpers --

    fn here(&self) -> usize {
        self.code.len()
    }

    fn emit_op(&mut self, op: Op) {
        self.code.push(op as u16);
    }

    fn emit_with(&mut self, op: Op, operand: u16) {
        self.emit_op(op);
        self.code.push(operand);
    }

    fn emit_jump(&mut self, op: Op, target: usize) {
        self.emit_op(op);
        let pos = self.here();
        self.code.push(jump_arg(pos, target));
    }

    /// Emit a jump with a placeholder operand; returns the operand's
    /// position for later patching.
    fn emit_partial_jump(&mut self, op: Op) -> usize {
        self.emit_jump(op, 0);
        self.here() - 1
    }

    fn emit_partial_jump_local(&mut self, op: Op, local: u16) -> usize {
        self.emit_with(op, local);
        let pos = self.here();
        self.code.push(jump_arg(pos, 0));
        self.here() - 1
    }

    /// Character test against a literal or the class side table. Literals
    /// beyond the 16-bit operand range go through the side table too.
    fn emit_partial_test(&mut self, class: &CharClass) -> usize {
        match class {
            CharClass::Single(c) if (*c as u32) <= u16::MAX as u32 => {
                self.emit_with(Op::JumpIfCharIsNot, *c as u32 as u16);
            }
            _ => {
                let index = self.classes.len() as u16;
                self.emit_with(Op::JumpIfCharNotMatches, index);
                self.classes.push(class.clone());
            }
        }
        let pos = self.here();
        self.code.push(jump_arg(pos, 0));
        self.here() - 1
    }

    /// Inline jump table selected by the top of a local's stack. Entries
    /// are relative to the end of the table.
    fn emit_switch(&mut self, local: u16, targets: &[usize]) {
        self.emit_with(Op::Switch, local);
        self.code.push(targets.len() as u16);
        let end = self.here() + targets.len();
        for &target in targets {
            self.code.push(jump_arg(end - 1, target));
        }
    }

    fn patch(&mut self, pos: usize, target: usize) {
        self.code[pos] = jump_arg(pos, target);
    }

    fn patch_all(&mut self, positions: &[usize], target: usize) {
        for &pos in positions {
            self.patch(pos, target);
        }
    }
}

/// Relative operand for a jump whose operand sits at `pos`: the VM has
/// already advanced past the operand when it applies the offset.
fn jump_arg(pos: usize, target: usize) -> u16 {
    (target as i64 - (pos as i64 + 1)) as i16 as u16
}

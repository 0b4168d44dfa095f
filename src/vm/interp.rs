use crate::{
    capture::{self, Capture, CaptureKind, CaptureList},
    error::{Error, Result},
    program::{Inst, Program},
    resolve,
    util::search::Input,
    value::{Value, ValueEnv},
    vm::{Config, Match},
};

/// An entry on the backtrack stack.
///
/// Choice points save the position to resume at. Call frames have no saved
/// position and are discarded when backtracking.
#[derive(Clone, Copy, Debug)]
struct Frame {
    at: Option<usize>,
    pc: usize,
    caplevel: usize,
}

pub(super) fn exec<E: ValueEnv + ?Sized>(
    config: &Config,
    program: &Program,
    input: &Input<'_, '_>,
    env: &mut E,
) -> Result<Option<Match>> {
    let haystack = input.haystack();
    let end = core::cmp::min(input.end(), haystack.len());
    if input.start() > end {
        return Ok(None);
    }
    let stack_limit = config.get_stack_limit();
    let initial_stack = match stack_limit {
        None => config.get_initial_stack(),
        Some(limit) => core::cmp::min(config.get_initial_stack(), limit),
    };
    let machine = Machine {
        program,
        haystack,
        args: input.get_args(),
        end,
        stack: Vec::with_capacity(initial_stack),
        stack_limit,
        caps: CaptureList::new(
            config.get_initial_captures(),
            config.get_capture_limit(),
        ),
        subject: None,
    };
    machine.run(input.start(), env)
}

struct Machine<'a> {
    program: &'a Program,
    haystack: &'a [u8],
    args: &'a [Value],
    end: usize,
    stack: Vec<Frame>,
    stack_limit: Option<usize>,
    caps: CaptureList,
    /// The subject as a value, created the first time a match-time
    /// capture needs it.
    subject: Option<Value>,
}

impl<'a> Machine<'a> {
    fn run<E: ValueEnv + ?Sized>(
        mut self,
        start: usize,
        env: &mut E,
    ) -> Result<Option<Match>> {
        let program = self.program;
        let haystack = self.haystack;
        let end = self.end;
        let mut at = start;
        let mut pc = 0usize;

        // Backtrack to the most recent choice point, or report no match if
        // there is none.
        macro_rules! fail {
            () => {{
                match self.backtrack(env) {
                    None => return Ok(None),
                    Some((resume_at, resume_pc)) => {
                        at = resume_at;
                        pc = resume_pc;
                        continue;
                    }
                }
            }};
        }

        loop {
            let inst = program.inst(pc);
            trace!(
                "at: {}, stack: {}, caps: {}, pc: {:04}: {}",
                at,
                self.stack.len(),
                self.caps.len(),
                pc,
                inst,
            );
            match *inst {
                Inst::End => {
                    self.caps.push(Capture::close(at))?;
                    return Ok(Some(Match::new(
                        at,
                        false,
                        self.caps.into_vec(),
                    )));
                }
                Inst::Halt => {
                    self.caps.push(Capture::final_at(at))?;
                    return Ok(Some(Match::new(
                        at,
                        true,
                        self.caps.into_vec(),
                    )));
                }
                Inst::Giveup => return Ok(None),
                Inst::Ret => match self.stack.pop() {
                    Some(Frame { at: None, pc: ret, .. }) => pc = ret,
                    _ => {
                        return Err(Error::invalid_program(
                            Some(pc),
                            "return without a matching call",
                        ))
                    }
                },
                Inst::Any => {
                    if at < end {
                        at += 1;
                        pc += 1;
                    } else {
                        fail!()
                    }
                }
                Inst::TestAny { offset } => {
                    pc = if at < end { pc + 1 } else { jump(pc, offset) };
                }
                Inst::Char(byte) => {
                    if at < end && haystack[at] == byte {
                        at += 1;
                        pc += 1;
                    } else {
                        fail!()
                    }
                }
                Inst::TestChar { byte, offset } => {
                    pc = if at < end && haystack[at] == byte {
                        pc + 1
                    } else {
                        jump(pc, offset)
                    };
                }
                Inst::Set(ref set) => {
                    if at < end && set.contains(haystack[at]) {
                        at += 1;
                        pc += 1;
                    } else {
                        fail!()
                    }
                }
                Inst::TestSet { ref set, offset } => {
                    pc = if at < end && set.contains(haystack[at]) {
                        pc + 1
                    } else {
                        jump(pc, offset)
                    };
                }
                Inst::Behind(n) => {
                    let n = usize::from(n);
                    if n > at {
                        fail!()
                    }
                    at -= n;
                    pc += 1;
                }
                Inst::Span(ref set) => {
                    match program.accel(pc) {
                        Some(accel) => {
                            at = accel.find_fwd(&haystack[..end], at);
                        }
                        None => {
                            while at < end && set.contains(haystack[at]) {
                                at += 1;
                            }
                        }
                    }
                    pc += 1;
                }
                Inst::Jmp { offset } => pc = jump(pc, offset),
                Inst::Choice { offset } => {
                    self.push(Frame {
                        at: Some(at),
                        pc: jump(pc, offset),
                        caplevel: self.caps.len(),
                    })?;
                    pc += 1;
                }
                Inst::Call { offset } => {
                    self.push(Frame {
                        at: None,
                        pc: pc + 1,
                        caplevel: self.caps.len(),
                    })?;
                    pc = jump(pc, offset);
                }
                Inst::Commit { offset } => {
                    self.pop_choice(pc)?;
                    pc = jump(pc, offset);
                }
                Inst::PartialCommit { offset } => {
                    let caplevel = self.caps.len();
                    match self.stack.last_mut() {
                        Some(frame) if frame.at.is_some() => {
                            frame.at = Some(at);
                            frame.caplevel = caplevel;
                        }
                        _ => return Err(no_choice_point(pc)),
                    }
                    pc = jump(pc, offset);
                }
                Inst::BackCommit { offset } => {
                    let (saved, caplevel) = self.pop_choice(pc)?;
                    self.restore_captures(caplevel, env);
                    at = saved;
                    pc = jump(pc, offset);
                }
                Inst::FailTwice => {
                    self.stack.pop();
                    fail!()
                }
                Inst::Fail => fail!(),
                Inst::CloseRuntime => {
                    match self.close_runtime(pc, at, env)? {
                        None => fail!(),
                        Some(new_at) => at = new_at,
                    }
                    pc += 1;
                }
                Inst::OpenCapture { kind, key } => {
                    self.caps.push(Capture::open(kind, key, at))?;
                    pc += 1;
                }
                Inst::CloseCapture => {
                    // Turn the capture into a full one when possible.
                    match self.caps.last_mut() {
                        Some(last)
                            if last.is_open()
                                && at >= last.start
                                && at - last.start
                                    <= capture::MAX_FULL_LEN =>
                        {
                            last.size = (at - last.start + 1) as u8;
                        }
                        _ => self.caps.push(Capture::close(at))?,
                    }
                    pc += 1;
                }
                Inst::FullCapture { kind, key, len } => {
                    let start =
                        at.checked_sub(usize::from(len)).ok_or_else(|| {
                            Error::invalid_program(
                                Some(pc),
                                "full capture starts before the subject",
                            )
                        })?;
                    self.caps.push(Capture::full(
                        kind,
                        key,
                        start,
                        usize::from(len),
                    ))?;
                    pc += 1;
                }
            }
        }
    }

    fn push(&mut self, frame: Frame) -> Result<()> {
        if self.stack.len() == self.stack.capacity() {
            self.grow_stack()?;
        }
        self.stack.push(frame);
        Ok(())
    }

    fn grow_stack(&mut self) -> Result<()> {
        let len = self.stack.len();
        let mut new_len = core::cmp::max(1, len.saturating_mul(2));
        if let Some(limit) = self.stack_limit {
            if len >= limit {
                debug!("backtrack stack reached its limit of {}", limit);
                return Err(Error::stack_overflow(limit));
            }
            new_len = core::cmp::min(new_len, limit);
        }
        debug!("growing backtrack stack from {} to {}", len, new_len);
        self.stack
            .try_reserve_exact(new_len - len)
            .map_err(|_| Error::stack_overflow(new_len))
    }

    /// Pop the top entry, which must be a choice point, and return its saved
    /// position and capture level.
    fn pop_choice(&mut self, pc: usize) -> Result<(usize, usize)> {
        match self.stack.pop() {
            Some(Frame { at: Some(at), caplevel, .. }) => Ok((at, caplevel)),
            _ => Err(no_choice_point(pc)),
        }
    }

    /// Pop entries until a choice point is found, restore the state it saved
    /// and return the position and instruction to resume at.
    fn backtrack<E: ValueEnv + ?Sized>(
        &mut self,
        env: &mut E,
    ) -> Option<(usize, usize)> {
        loop {
            let frame = self.stack.pop()?;
            if let Some(at) = frame.at {
                self.restore_captures(frame.caplevel, env);
                return Some((at, frame.pc));
            }
        }
    }

    /// Truncate the capture list to `caplevel`, retracting the values of any
    /// match-time captures that are dropped with it.
    fn restore_captures<E: ValueEnv + ?Sized>(
        &mut self,
        caplevel: usize,
        env: &mut E,
    ) {
        let dropped = self.caps.as_slice().get(caplevel..).unwrap_or(&[]);
        if let Some(slot) = capture::first_runtime_slot(dropped) {
            trace!(
                "retracting {} match-time values",
                env.len().saturating_sub(slot),
            );
            env.truncate(slot);
        }
        self.caps.truncate(caplevel);
    }

    /// Close the innermost open group and call the match-time function it
    /// refers to.
    ///
    /// Returns the position to continue at, or `None` if the function
    /// rejected the match.
    fn close_runtime<E: ValueEnv + ?Sized>(
        &mut self,
        pc: usize,
        at: usize,
        env: &mut E,
    ) -> Result<Option<usize>> {
        let close = self.caps.len();
        self.caps.push(Capture::close(at))?;
        let open = capture::find_open(self.caps.as_slice(), close)
            .map(|i| (i, self.caps.as_slice()[i]))
            .filter(|&(_, cap)| cap.kind == CaptureKind::Group)
            .ok_or_else(|| {
                Error::invalid_program(
                    Some(pc),
                    "match-time capture without an open group",
                )
            })?;
        let (open, group) = open;
        let constant = self.program.constant(group.idx);
        let func = match constant.and_then(Value::as_function) {
            Some(f) => f.clone(),
            None => {
                return Err(Error::invalid_value(
                    "match-time function",
                    constant.map_or("nil", Value::type_name),
                ))
            }
        };
        let first_slot = capture::first_runtime_slot(
            &self.caps.as_slice()[open..close],
        );

        let haystack = self.haystack;
        let subject =
            self.subject.get_or_insert_with(|| Value::str(haystack)).clone();
        let mut args = vec![subject, Value::Int(at as i64 + 1)];
        resolve::nested_values(
            self.program,
            self.haystack,
            self.args,
            self.caps.as_slice(),
            open,
            env,
            &mut args,
        )?;
        trace!("calling match-time function with {} arguments", args.len());
        let results = env.call(&func, &args).map_err(Error::host)?;
        if let Some(slot) = first_slot {
            env.truncate(slot);
        }
        self.caps.truncate(open);

        let mut results = results.into_iter();
        let new_at = match results.next() {
            Some(ref first) if first.is_truthy() => match *first {
                Value::Bool(_) => at,
                Value::Int(n) => n
                    .checked_sub(1)
                    .filter(|&p| p >= at as i64 && p <= self.end as i64)
                    .ok_or_else(|| Error::invalid_runtime_position(n))?
                    as usize,
                _ => return Err(Error::invalid_runtime_position(0)),
            },
            _ => {
                trace!("match-time function rejected the match");
                return Ok(None);
            }
        };
        let values: Vec<Value> = results.collect();
        trace!(
            "match-time function moved from {} to {} with {} values",
            at,
            new_at,
            values.len(),
        );
        if !values.is_empty() {
            let base = env.len();
            if base + values.len() > usize::from(u16::MAX) {
                return Err(Error::too_many_captures(usize::from(u16::MAX)));
            }
            self.caps.push(Capture::open(CaptureKind::Group, 0, group.start))?;
            for (i, value) in values.into_iter().enumerate() {
                env.push(value);
                self.caps.push(Capture {
                    start: new_at,
                    idx: (base + i) as u16,
                    kind: CaptureKind::Runtime,
                    size: 1,
                })?;
            }
            self.caps.push(Capture::close(new_at))?;
        }
        Ok(Some(new_at))
    }
}

/// Compute the target of a jump. Programs are validated, so the result is
/// always a valid instruction index.
#[inline]
fn jump(pc: usize, offset: i32) -> usize {
    (pc as i64 + i64::from(offset)) as usize
}

fn no_choice_point(pc: usize) -> Error {
    Error::invalid_program(Some(pc), "commit without a choice point")
}

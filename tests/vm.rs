use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use pegvm::{
    capture::CaptureKind,
    program::{Builder, CharSet, Inst, Program},
    Engine, ErrorKind, Function, HostError, Input, Interpreter, Match, Value,
    ValueEnv, ValueStack,
};
use quickcheck::quickcheck;

use crate::util::{compile, find, star, word};

/// `S <- '(' S* ')'`
fn balanced() -> Program {
    let mut b = Builder::new();
    let s = b.label();
    b.jump(Inst::Call { offset: 0 }, s);
    b.push(Inst::End);
    b.bind(s);
    b.push(Inst::Char(b'('));
    star(&mut b, |b| {
        b.jump(Inst::Call { offset: 0 }, s);
    });
    b.push(Inst::Char(b')'));
    b.push(Inst::Ret);
    b.build().unwrap()
}

#[test]
fn span_stops_at_digits() {
    let program = compile(|b| {
        b.push(Inst::Span(CharSet::from_range(b'a', b'z')));
    });
    assert_eq!(3, find(&program, "abc123").unwrap().end());
    assert_eq!(0, find(&program, "123").unwrap().end());
}

#[test]
fn ordered_choice() {
    // 'ab' / 'a'
    let program = compile(|b| {
        let (alt, done) = (b.label(), b.label());
        b.jump(Inst::Choice { offset: 0 }, alt);
        b.push(Inst::Char(b'a'));
        b.push(Inst::Char(b'b'));
        b.jump(Inst::Commit { offset: 0 }, done);
        b.bind(alt);
        b.push(Inst::Char(b'a'));
        b.bind(done);
    });
    assert_eq!(2, find(&program, "abc").unwrap().end());
    assert_eq!(1, find(&program, "ac").unwrap().end());
    assert!(find(&program, "c").is_none());
}

#[test]
fn recursion() {
    let program = balanced();
    assert_eq!(6, find(&program, "(()())").unwrap().end());
    assert_eq!(2, find(&program, "()(").unwrap().end());
    assert!(find(&program, "(()").is_none());
}

#[test]
fn predicates() {
    // &'a'
    let and = compile(|b| {
        let (fail, ok) = (b.label(), b.label());
        b.jump(Inst::Choice { offset: 0 }, fail);
        b.push(Inst::Char(b'a'));
        b.jump(Inst::BackCommit { offset: 0 }, ok);
        b.bind(fail);
        b.push(Inst::Fail);
        b.bind(ok);
    });
    assert_eq!(0, find(&and, "ab").unwrap().end());
    assert!(find(&and, "b").is_none());

    // !'a'
    let not = compile(|b| {
        let ok = b.label();
        b.jump(Inst::Choice { offset: 0 }, ok);
        b.push(Inst::Char(b'a'));
        b.push(Inst::FailTwice);
        b.bind(ok);
    });
    assert_eq!(0, find(&not, "b").unwrap().end());
    assert!(find(&not, "a").is_none());
}

#[test]
fn test_instructions_jump_without_consuming() {
    // Skip to the first comma, if there is one.
    let program = compile(|b| {
        let (top, done) = (b.label(), b.label());
        b.bind(top);
        b.jump(Inst::TestChar { byte: b',', offset: 0 }, done);
        b.jump(Inst::TestAny { offset: 0 }, done);
        b.push(Inst::Any);
        b.jump(Inst::Jmp { offset: 0 }, top);
        b.bind(done);
    });
    // TestChar jumps when the byte is *not* a comma, so this loop only
    // consumes commas.
    assert_eq!(2, find(&program, ",,a").unwrap().end());
    assert_eq!(0, find(&program, "a,").unwrap().end());
}

#[test]
fn halt_ends_match_early() {
    let program = compile(|b| {
        b.push(Inst::OpenCapture { kind: CaptureKind::Simple, key: 0 });
        b.push(Inst::Any);
        b.push(Inst::Halt);
    });
    let m = find(&program, "xyz").unwrap();
    assert!(m.is_halted());
    assert_eq!(1, m.end());
    assert_eq!(CaptureKind::Final, m.captures().last().unwrap().kind);
}

#[test]
fn span_start_beyond_subject() {
    let program = compile(|_| {});
    let mut env = ValueStack::new();
    let vm = Interpreter::new();
    let input = Input::new("ab").span(5..5);
    assert!(vm.exec(&program, &input, &mut env).unwrap().is_none());
    let input = Input::new("ab").range(2..);
    assert_eq!(2, vm.exec(&program, &input, &mut env).unwrap().unwrap().end());
}

#[test]
fn span_end_limits_matching() {
    let program = compile(|b| word(b));
    let input = Input::new("abcdef").range(1..4);
    let mut env = ValueStack::new();
    let m = Interpreter::new().exec(&program, &input, &mut env).unwrap();
    assert_eq!(4, m.unwrap().end());
}

#[test]
fn stack_limit() {
    let program = balanced();
    let haystack = format!("{}{}", "(".repeat(100), ")".repeat(100));
    let vm = Interpreter::builder()
        .configure(Interpreter::config().stack_limit(Some(50)))
        .build();
    let mut env = ValueStack::new();
    let err = vm
        .exec(&program, &Input::new(&haystack), &mut env)
        .unwrap_err();
    assert!(matches!(*err.kind(), ErrorKind::StackOverflow { limit: 50 }));
    assert_eq!(
        "backtrack stack overflow (current limit is 50)",
        err.to_string(),
    );

    let vm = Interpreter::builder()
        .configure(Interpreter::config().initial_stack(1))
        .build();
    let m = vm.exec(&program, &Input::new(&haystack), &mut env).unwrap();
    assert_eq!(200, m.unwrap().end());
}

#[test]
fn capture_limit() {
    let program = compile(|b| {
        star(b, |b| {
            b.push(Inst::Any);
            b.push(Inst::FullCapture {
                kind: CaptureKind::Position,
                key: 0,
                len: 0,
            });
        });
    });
    let vm = Interpreter::builder()
        .configure(
            Interpreter::config().capture_limit(Some(5)).initial_captures(1),
        )
        .build();
    let mut env = ValueStack::new();
    let m = vm.exec(&program, &Input::new("abcd"), &mut env).unwrap();
    assert_eq!(5, m.unwrap().captures().len());
    let err =
        vm.exec(&program, &Input::new("abcde"), &mut env).unwrap_err();
    assert_eq!("too many captures (current limit is 5)", err.to_string());
}

/// Build `{f}(x 'y') / .` where the match-time capture `f` always succeeds
/// and produces one value.
fn runtime_then_fail(calls: Arc<AtomicUsize>) -> Program {
    let f = Function::new(move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Value::Bool(true), Value::str("kept?")])
    });
    compile(|b| {
        let f = b.constant(f);
        let (alt, done) = (b.label(), b.label());
        b.jump(Inst::Choice { offset: 0 }, alt);
        b.push(Inst::OpenCapture { kind: CaptureKind::Group, key: f });
        b.push(Inst::Char(b'x'));
        b.push(Inst::CloseRuntime);
        b.push(Inst::Char(b'y'));
        b.jump(Inst::Commit { offset: 0 }, done);
        b.bind(alt);
        b.push(Inst::Any);
        b.bind(done);
    })
}

#[test]
fn backtracking_retracts_runtime_values() {
    let calls = Arc::new(AtomicUsize::new(0));
    let program = runtime_then_fail(calls.clone());
    let mut env = ValueStack::new();
    env.push(Value::str("already here"));

    let m = Interpreter::new()
        .exec(&program, &Input::new("xz"), &mut env)
        .unwrap()
        .unwrap();
    assert_eq!(1, calls.load(Ordering::SeqCst));
    assert_eq!(1, m.end());
    assert_eq!(&[Value::str("already here")], env.values());

    let m = Interpreter::new()
        .exec(&program, &Input::new("xy"), &mut env)
        .unwrap()
        .unwrap();
    assert_eq!(2, m.end());
    assert_eq!(2, env.len());
    assert_eq!(Some(&Value::str("kept?")), env.get(1));
}

#[test]
fn runtime_position() {
    fn run(result: Value, haystack: &str) -> Result<Option<Match>, String> {
        let f = Function::new(move |_| Ok(vec![result.clone()]));
        let program = compile(|b| {
            let f = b.constant(f);
            b.push(Inst::OpenCapture { kind: CaptureKind::Group, key: f });
            b.push(Inst::CloseRuntime);
        });
        let mut env = ValueStack::new();
        Interpreter::new()
            .exec(&program, &Input::new(haystack), &mut env)
            .map_err(|e| e.to_string())
    }

    assert_eq!(3, run(Value::Int(4), "abc").unwrap().unwrap().end());
    assert_eq!(0, run(Value::Bool(true), "abc").unwrap().unwrap().end());
    assert!(run(Value::Bool(false), "abc").unwrap().is_none());
    assert!(run(Value::Nil, "abc").unwrap().is_none());
    assert_eq!(
        "invalid position 5 returned by match-time capture",
        run(Value::Int(5), "abc").unwrap_err(),
    );
    assert_eq!(
        "invalid position 0 returned by match-time capture",
        run(Value::str("3"), "abc").unwrap_err(),
    );
    assert_eq!(
        "invalid position -9223372036854775808 returned by match-time capture",
        run(Value::Int(i64::MIN), "abc").unwrap_err(),
    );
}

#[test]
fn runtime_group_consumes_inner_runtime_values() {
    let seen = Arc::new(Mutex::new(vec![]));
    let inner = |v: &'static str| {
        Function::new(move |_| Ok(vec![Value::Bool(true), Value::str(v)]))
    };
    let outer = {
        let seen = seen.clone();
        Function::new(move |args| {
            seen.lock().unwrap().extend_from_slice(&args[2..]);
            Ok(vec![Value::Bool(true), Value::str("o")])
        })
    };
    let program = compile(|b| {
        let (i1, i2) = (b.constant(inner("i1")), b.constant(inner("i2")));
        let outer = b.constant(outer);
        b.push(Inst::OpenCapture { kind: CaptureKind::Group, key: outer });
        b.push(Inst::OpenCapture { kind: CaptureKind::Group, key: i1 });
        b.push(Inst::Char(b'a'));
        b.push(Inst::CloseRuntime);
        b.push(Inst::OpenCapture { kind: CaptureKind::Group, key: i2 });
        b.push(Inst::Char(b'b'));
        b.push(Inst::CloseRuntime);
        b.push(Inst::CloseRuntime);
    });
    let mut env = ValueStack::new();
    let m = Interpreter::new()
        .exec(&program, &Input::new("ab"), &mut env)
        .unwrap()
        .unwrap();
    assert_eq!(2, m.end());
    assert_eq!(
        vec![Value::str("i1"), Value::str("i2")],
        *seen.lock().unwrap(),
    );
    assert_eq!(&[Value::str("o")], env.values());
}

#[test]
fn and_predicate_retracts_runtime_values() {
    // &({f} 'x')
    let calls = Arc::new(AtomicUsize::new(0));
    let f = {
        let calls = calls.clone();
        Function::new(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Value::Bool(true), Value::str("dropped")])
        })
    };
    let program = compile(|b| {
        let f = b.constant(f);
        let (fail, ok) = (b.label(), b.label());
        b.jump(Inst::Choice { offset: 0 }, fail);
        b.push(Inst::OpenCapture { kind: CaptureKind::Group, key: f });
        b.push(Inst::Char(b'x'));
        b.push(Inst::CloseRuntime);
        b.jump(Inst::BackCommit { offset: 0 }, ok);
        b.bind(fail);
        b.push(Inst::Fail);
        b.bind(ok);
    });
    let mut env = ValueStack::new();
    let m = Interpreter::new()
        .exec(&program, &Input::new("xy"), &mut env)
        .unwrap()
        .unwrap();
    assert_eq!(1, calls.load(Ordering::SeqCst));
    assert_eq!(0, m.end());
    assert!(env.is_empty());
    assert!(m.captures().iter().all(|cap| cap.kind != CaptureKind::Runtime));
}

#[test]
fn host_errors_are_propagated() {
    let f = Function::new(|_| Err(HostError::new("nope")));
    let program = compile(|b| {
        let f = b.constant(f);
        b.push(Inst::OpenCapture { kind: CaptureKind::Group, key: f });
        b.push(Inst::CloseRuntime);
    });
    let mut env = ValueStack::new();
    let err = Interpreter::new()
        .exec(&program, &Input::new(""), &mut env)
        .unwrap_err();
    assert_eq!("error in host function", err.to_string());
    let source = std::error::Error::source(&err).unwrap();
    assert_eq!("nope", source.to_string());
}

/// An environment that counts the host calls made through it.
#[derive(Debug, Default)]
struct CountingEnv {
    stack: ValueStack,
    calls: usize,
}

impl ValueEnv for CountingEnv {
    fn len(&self) -> usize {
        self.stack.len()
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value)
    }

    fn get(&self, slot: usize) -> Option<&Value> {
        self.stack.get(slot)
    }

    fn truncate(&mut self, len: usize) {
        self.stack.truncate(len)
    }

    fn call(
        &mut self,
        func: &Function,
        args: &[Value],
    ) -> Result<Vec<Value>, HostError> {
        self.calls += 1;
        func.call(args)
    }
}

#[test]
fn host_calls_go_through_env() {
    let program = runtime_then_fail(Arc::new(AtomicUsize::new(0)));
    let mut env = CountingEnv::default();
    Interpreter::new()
        .exec(&program, &Input::new("xy"), &mut env)
        .unwrap()
        .unwrap();
    assert_eq!(1, env.calls);
    assert_eq!(1, env.len());
}

#[test]
fn engine_trait() {
    fn end<M: Engine>(engine: &M, program: &Program, s: &str) -> usize {
        let mut env = ValueStack::new();
        engine
            .exec(program, &Input::new(s), &mut env)
            .unwrap()
            .map_or(0, |m| m.end())
    }
    assert_eq!(6, end(&Interpreter::new(), &balanced(), "(()())"));
}

quickcheck! {
    fn prop_span_matches_leading_run(haystack: Vec<u8>, stop: u8) -> bool {
        let expected = haystack
            .iter()
            .position(|&b| b == stop)
            .unwrap_or(haystack.len());
        // Excluding one byte makes a set that is scanned with memchr, while
        // also excluding bytes that never occur in the haystack makes one
        // that is scanned byte by byte. Both must agree.
        let mut excluded = vec![stop];
        excluded.extend(
            (0..=255u8).filter(|b| !haystack.contains(b)).take(8),
        );
        let fast = compile(|b| {
            b.push(Inst::Span(CharSet::from_bytes(&[stop]).negate()));
        });
        let slow = compile(|b| {
            b.push(Inst::Span(CharSet::from_bytes(&excluded).negate()));
        });
        find(&fast, &haystack).unwrap().end() == expected
            && find(&slow, &haystack).unwrap().end() == expected
    }
}

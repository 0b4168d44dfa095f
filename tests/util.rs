// Helpers shared by the integration tests: assembling small programs and
// running them end to end.

use bstr::ByteSlice;
use pegvm::{
    capture::CaptureKind,
    encode::MatchTree,
    program::{Builder, CharSet, Inst, Program},
    resolve, Input, Interpreter, Match, Value, ValueStack,
};

/// Assemble a program. The closure is given a fresh builder, and an `End`
/// instruction is appended after it returns.
pub fn compile<F: FnOnce(&mut Builder)>(f: F) -> Program {
    let mut b = Builder::new();
    f(&mut b);
    b.push(Inst::End);
    b.build().unwrap()
}

/// Run a program with a default interpreter and a fresh environment.
pub fn find<H: ?Sized + AsRef<[u8]>>(
    program: &Program,
    haystack: &H,
) -> Option<Match> {
    let mut env = ValueStack::new();
    Interpreter::new()
        .exec(program, &Input::new(haystack), &mut env)
        .unwrap()
}

/// Run a program and resolve the values of its captures.
pub fn values<H: ?Sized + AsRef<[u8]>>(
    program: &Program,
    haystack: &H,
) -> Result<Vec<Value>, pegvm::Error> {
    let input = Input::new(haystack);
    let mut env = ValueStack::new();
    let m = Interpreter::new()
        .exec(program, &input, &mut env)?
        .expect("program should match");
    resolve::captures(program, &input, &m, &mut env)
}

/// Wrap whatever `body` pushes into a capture of the given kind.
pub fn capture<F: FnOnce(&mut Builder)>(
    b: &mut Builder,
    kind: CaptureKind,
    key: u16,
    body: F,
) {
    b.push(Inst::OpenCapture { kind, key });
    body(b);
    b.push(Inst::CloseCapture);
}

/// Push `[a-z]+`.
pub fn word(b: &mut Builder) {
    let lower = CharSet::from_range(b'a', b'z');
    b.push(Inst::Set(lower));
    b.push(Inst::Span(lower));
}

/// Push `body*` using a choice point and a partial commit.
pub fn star<F: Fn(&mut Builder)>(b: &mut Builder, body: F) {
    let (top, done) = (b.label(), b.label());
    b.jump(Inst::Choice { offset: 0 }, done);
    b.bind(top);
    body(b);
    b.jump(Inst::PartialCommit { offset: 0 }, top);
    b.bind(done);
}

/// Render a tree the way the JSON encoder writes it, assuming every name
/// and the subject need no escaping.
pub fn tree_to_json(tree: &MatchTree, haystack: &[u8]) -> String {
    fn node(tree: &MatchTree, out: &mut String) {
        out.push_str(&format!(
            r#"{{"s":{},"type":"{}""#,
            tree.start,
            tree.name.to_str().unwrap(),
        ));
        if !tree.subs.is_empty() {
            out.push_str(r#","subs":["#);
            for (i, sub) in tree.subs.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                node(sub, out);
                out.push('}');
            }
            out.push(']');
        }
        out.push_str(&format!(r#","e":{}"#, tree.end));
    }

    let mut out = String::new();
    node(tree, &mut out);
    out.push_str(&format!(
        r#","text":"{}"}}"#,
        tree.text(haystack).to_str().unwrap(),
    ));
    out
}

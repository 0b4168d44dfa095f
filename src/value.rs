/*!
The host value environment.

Captures that are not plain spans of the subject (constants, results of
function and fold captures, tables, the values produced by match-time
captures) are represented by the dynamic [`Value`] type. Host code is plugged
in through [`Function`], a callable that receives and returns values.

Match-time (runtime) captures additionally need somewhere to keep their
values while the match is still running, since a later failure may have to
take them back. That store is abstracted by the [`ValueEnv`] trait, and
[`ValueStack`] is the standard implementation.
*/

use std::{collections::BTreeMap, fmt, sync::Arc};

use bstr::{BString, ByteSlice};

/// A dynamically typed value produced or consumed by captures.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// The absence of a value.
    Nil,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// An arbitrary byte string.
    Str(BString),
    /// A table with a sequence part and a keyed part.
    Table(Table),
    /// A host callable.
    Function(Function),
}

impl Value {
    /// Create a string value from anything that can be viewed as bytes.
    pub fn str<B: AsRef<[u8]>>(bytes: B) -> Value {
        Value::Str(BString::from(bytes.as_ref()))
    }

    /// Returns false only for `nil` and `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(*self, Value::Nil | Value::Bool(false))
    }

    /// The name of this value's type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match *self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
        }
    }

    /// Returns the bytes of a string value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match *self {
            Value::Str(ref s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match *self {
            Value::Table(ref t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match *self {
            Value::Function(ref f) => Some(f),
            _ => None,
        }
    }

    /// Convert this value to a table key. `nil`, tables and functions cannot
    /// be used as keys.
    pub fn to_key(&self) -> Option<Key> {
        match *self {
            Value::Bool(b) => Some(Key::Bool(b)),
            Value::Int(n) => Some(Key::Int(n)),
            Value::Str(ref s) => Some(Key::Str(s.clone())),
            Value::Nil | Value::Table(_) | Value::Function(_) => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::str(s)
    }
}

impl From<&[u8]> for Value {
    fn from(s: &[u8]) -> Value {
        Value::str(s)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Value {
        Value::Table(t)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Value {
        Value::Function(f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(ref s) => write!(f, "{}", s.as_bstr()),
            Value::Table(ref t) => write!(f, "table({})", t.len()),
            Value::Function(_) => write!(f, "function"),
        }
    }
}

/// A key in the keyed part of a [`Table`].
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Str(BString),
}

impl From<Key> for Value {
    fn from(key: Key) -> Value {
        match key {
            Key::Bool(b) => Value::Bool(b),
            Key::Int(n) => Value::Int(n),
            Key::Str(s) => Value::Str(s),
        }
    }
}

/// A table value.
///
/// Tables have a positional part (1-based, like the sequence produced by a
/// table capture) and a keyed part. Looking up an integer key consults the
/// positional part first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    seq: Vec<Value>,
    map: BTreeMap<Key, Value>,
}

impl Table {
    pub fn new() -> Table {
        Table::default()
    }

    /// Append a value to the positional part.
    pub fn push(&mut self, value: Value) {
        self.seq.push(value);
    }

    /// Set a keyed entry, replacing any previous value for the same key.
    pub fn insert<K: Into<Key>>(&mut self, key: K, value: Value) {
        let key = key.into();
        if let Key::Int(n) = key {
            if n >= 1 && (n as u64) <= self.seq.len() as u64 {
                self.seq[(n - 1) as usize] = value;
                return;
            }
        }
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        if let Key::Int(n) = *key {
            if n >= 1 && (n as u64) <= self.seq.len() as u64 {
                return self.seq.get((n - 1) as usize);
            }
        }
        self.map.get(key)
    }

    /// Convenience lookup of a string key.
    pub fn get_str<B: AsRef<[u8]>>(&self, key: B) -> Option<&Value> {
        self.get(&Key::Str(BString::from(key.as_ref())))
    }

    /// The positional part of this table.
    pub fn seq(&self) -> &[Value] {
        &self.seq
    }

    /// Iterate over the keyed part of this table, in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.map.iter()
    }

    /// The total number of entries in both parts.
    pub fn len(&self) -> usize {
        self.seq.len() + self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Key {
        Key::Str(BString::from(s))
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Key {
        Key::Int(n)
    }
}

/// An error returned by a host function.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostError {
    msg: String,
}

impl HostError {
    pub fn new<S: Into<String>>(msg: S) -> HostError {
        HostError { msg: msg.into() }
    }

    pub fn message(&self) -> &str {
        &self.msg
    }
}

impl std::error::Error for HostError {}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

type HostFn =
    dyn Fn(&[Value]) -> Result<Vec<Value>, HostError> + Send + Sync + 'static;

/// A host callable, used by function, fold and match-time captures.
///
/// A function receives its arguments as a slice and returns any number of
/// results. Two functions compare equal only if they are the same callable.
#[derive(Clone)]
pub struct Function(Arc<HostFn>);

impl Function {
    pub fn new<F>(f: F) -> Function
    where
        F: Fn(&[Value]) -> Result<Vec<Value>, HostError>
            + Send
            + Sync
            + 'static,
    {
        Function(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Result<Vec<Value>, HostError> {
        (self.0)(args)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// The store used for values produced while a match is still running.
///
/// The interpreter pushes the values returned by a match-time capture onto
/// the environment and records their slots in the capture list. When it
/// backtracks past such a capture, it truncates the environment back to the
/// first slot it no longer needs, so the number of values retracted always
/// equals the number of values added since.
///
/// All host calls made by the interpreter and the capture resolver go
/// through [`ValueEnv::call`], which lets an embedding intercept them.
pub trait ValueEnv {
    /// The number of values currently stored.
    fn len(&self) -> usize;

    /// Store a value in the next slot.
    fn push(&mut self, value: Value);

    /// Fetch the value at the given slot.
    fn get(&self, slot: usize) -> Option<&Value>;

    /// Remove every value at or above the given slot.
    fn truncate(&mut self, len: usize);

    /// Invoke a host function.
    fn call(
        &mut self,
        func: &Function,
        args: &[Value],
    ) -> Result<Vec<Value>, HostError> {
        func.call(args)
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A `Vec` backed [`ValueEnv`].
#[derive(Clone, Debug, Default)]
pub struct ValueStack {
    values: Vec<Value>,
}

impl ValueStack {
    pub fn new() -> ValueStack {
        ValueStack::default()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl ValueEnv for ValueStack {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    fn get(&self, slot: usize) -> Option<&Value> {
        self.values.get(slot)
    }

    fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }
}

impl<E: ValueEnv + ?Sized> ValueEnv for &mut E {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn push(&mut self, value: Value) {
        (**self).push(value)
    }

    fn get(&self, slot: usize) -> Option<&Value> {
        (**self).get(slot)
    }

    fn truncate(&mut self, len: usize) {
        (**self).truncate(len)
    }

    fn call(
        &mut self,
        func: &Function,
        args: &[Value],
    ) -> Result<Vec<Value>, HostError> {
        (**self).call(func, args)
    }
}

use core::cmp::Ordering;
use core::fmt;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use hashbrown::HashMap;
use indexmap::IndexMap;

use crate::graph::{Scalar, VarValue};
use crate::interpreter::error::{InterpreterError, bail_type_error};
use crate::interpreter::Interpreter;
use crate::parser::FunctionDef;

pub type Namespace = Rc<RefCell<IndexMap<String, Value>>>;

/// Keyword arguments in call order. Order matters: `Append(A=.., B=..)`
/// must record `A` before `B`.
pub type Kwargs = IndexMap<String, Value>;

pub fn namespace() -> Namespace {
    Rc::new(RefCell::new(IndexMap::new()))
}

/// Copies already made during one [`Value::deep_copy`], keyed by the
/// address of the original container. A self-referencing value copies to
/// a self-referencing value.
#[derive(Debug, Default)]
pub struct CopyMemo(HashMap<*const (), Value>);

impl CopyMemo {
    pub fn get(&self, key: *const ()) -> Option<Value> {
        self.0.get(&key).cloned()
    }

    pub fn insert(&mut self, key: *const (), copy: Value) {
        self.0.insert(key, copy);
    }
}

/// Containers currently being walked; a repeat is a back-reference.
pub type Visiting = Vec<*const ()>;

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Vec<Value>),
    /// Keys are stored in their string form.
    Dict(Rc<RefCell<IndexMap<String, Value>>>),
    Function(Rc<Function>),
    /// A global builtin, by its registered name.
    Builtin(&'static str),
    /// `receiver.name`, not yet called.
    Method(Box<Value>, String),
    Object(Rc<dyn ScriptObject>),
}

/// A `def` or `lambda` closed over its defining scopes.
#[derive(Debug)]
pub struct Function {
    pub def: Rc<FunctionDef>,
    pub defaults: Vec<Option<Value>>,
    pub globals: Weak<RefCell<IndexMap<String, Value>>>,
    pub closure: Vec<Namespace>,
}

/// Objects exposed to scripts: environments, nodes, fake modules, option
/// containers. Methods take `&self`; objects with state use interior
/// mutability and never hold a borrow across a call back into the
/// interpreter.
pub trait ScriptObject: fmt::Debug + as_any::AsAny {
    fn class_name(&self) -> &'static str;

    fn call_method(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        interp: &mut Interpreter,
    ) -> Result<Value, InterpreterError>;

    fn has_method(&self, name: &str) -> bool;

    /// Called for method names outside the object's fixed table.
    fn fallback_method(
        &self,
        name: &str,
        _args: Vec<Value>,
        _kwargs: Kwargs,
        _interp: &mut Interpreter,
    ) -> Result<Value, InterpreterError> {
        Err(InterpreterError::RuntimeError(
            format!("'{}' object has no attribute '{name}'", self.class_name()).into(),
        ))
    }

    fn has_fallback(&self, _name: &str) -> bool {
        false
    }

    /// Plain attribute lookup. `None` lets the caller fall back to a bound
    /// method.
    fn get_attr(
        &self,
        _name: &str,
        _interp: &mut Interpreter,
    ) -> Result<Option<Value>, InterpreterError> {
        Ok(None)
    }

    fn set_attr(
        &self,
        name: &str,
        _value: Value,
        _interp: &mut Interpreter,
    ) -> Result<(), InterpreterError> {
        bail_type_error!("cannot set attribute '{}' on '{}'", name, self.class_name())
    }

    fn get_item(&self, _key: &Value, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        bail_type_error!("'{}' object is not subscriptable", self.class_name())
    }

    fn set_item(
        &self,
        _key: &Value,
        _value: Value,
        _interp: &mut Interpreter,
    ) -> Result<(), InterpreterError> {
        bail_type_error!("'{}' object does not support item assignment", self.class_name())
    }

    fn contains(&self, _item: &Value, _interp: &mut Interpreter) -> Result<bool, InterpreterError> {
        bail_type_error!("argument of type '{}' is not iterable", self.class_name())
    }

    fn iterate(&self) -> Result<Vec<Value>, InterpreterError> {
        bail_type_error!("'{}' object is not iterable", self.class_name())
    }

    fn call(
        &self,
        _args: Vec<Value>,
        _kwargs: Kwargs,
        _interp: &mut Interpreter,
    ) -> Result<Value, InterpreterError> {
        bail_type_error!("'{}' object is not callable", self.class_name())
    }

    fn to_string(&self) -> String {
        format!("<{} object>", self.class_name())
    }

    fn truthy(&self) -> bool {
        true
    }

    /// Independent copy for scope import/export. `None` means the object
    /// is immutable and may be shared.
    fn deep_copy(&self, _memo: &mut CopyMemo) -> Option<Rc<dyn ScriptObject>> {
        None
    }

    /// Equality beyond identity, which the caller checks first.
    fn is_equal(&self, _other: &dyn ScriptObject) -> bool {
        false
    }

    /// Graph representation when bound at top scope.
    fn to_var(&self, _visiting: &mut Visiting) -> Option<VarValue> {
        None
    }

    fn into_object(self) -> Value
    where
        Self: Sized + 'static,
    {
        Value::Object(Rc::new(self))
    }
}

impl dyn ScriptObject {
    pub fn downcast<T: ScriptObject>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(items: IndexMap<String, Value>) -> Self {
        Value::Dict(Rc::new(RefCell::new(items)))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Boolean(_) => "bool",
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Method(..) => "method",
            Value::Object(obj) => obj.class_name(),
        }
    }

    pub fn as_string(&self) -> Result<&str, InterpreterError> {
        match self {
            Value::String(s) => Ok(s),
            other => bail_type_error!("expected str, got {}", other.type_name()),
        }
    }

    pub fn as_integer(&self) -> Result<i64, InterpreterError> {
        match self {
            Value::Integer(i) => Ok(*i),
            Value::Boolean(b) => Ok(*b as i64),
            other => bail_type_error!("expected int, got {}", other.type_name()),
        }
    }

    pub fn as_float(&self) -> Result<f64, InterpreterError> {
        match self {
            Value::Float(x) => Ok(*x),
            Value::Integer(i) => Ok(*i as f64),
            Value::Boolean(b) => Ok(*b as i64 as f64),
            other => bail_type_error!("expected a number, got {}", other.type_name()),
        }
    }

    pub fn as_object<T: ScriptObject>(&self) -> Option<&T> {
        match self {
            Value::Object(obj) => obj.downcast::<T>(),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Builtin(_) | Value::Method(..) | Value::Object(_)
        )
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(x) => *x != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => !dict.borrow().is_empty(),
            Value::Function(_) | Value::Builtin(_) | Value::Method(..) => true,
            Value::Object(obj) => obj.truthy(),
        }
    }

    /// `str(value)`.
    pub fn coerce_string(&self) -> String {
        self.format(false, &mut Visiting::new())
    }

    /// `repr(value)`.
    pub fn repr(&self) -> String {
        self.format(true, &mut Visiting::new())
    }

    fn format(&self, repr: bool, visiting: &mut Visiting) -> String {
        match self {
            Value::None => "None".into(),
            Value::Boolean(true) => "True".into(),
            Value::Boolean(false) => "False".into(),
            Value::Integer(i) => i.to_string(),
            Value::Float(x) => float_repr(*x),
            Value::String(s) if repr => {
                let escaped = s.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n");
                format!("'{escaped}'")
            }
            Value::String(s) => s.clone(),
            Value::List(items) => {
                let key = Rc::as_ptr(items).cast::<()>();
                if visiting.contains(&key) {
                    return "[...]".into();
                }
                visiting.push(key);
                let items: Vec<String> = items.borrow().iter().map(|v| v.format(true, visiting)).collect();
                visiting.pop();
                format!("[{}]", items.join(", "))
            }
            Value::Tuple(items) => {
                let items: Vec<String> = items.iter().map(|v| v.format(true, visiting)).collect();
                if items.len() == 1 {
                    format!("({},)", items[0])
                } else {
                    format!("({})", items.join(", "))
                }
            }
            Value::Dict(dict) => {
                let key = Rc::as_ptr(dict).cast::<()>();
                if visiting.contains(&key) {
                    return "{...}".into();
                }
                visiting.push(key);
                let items: Vec<String> = dict
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("'{k}': {}", v.format(true, visiting)))
                    .collect();
                visiting.pop();
                format!("{{{}}}", items.join(", "))
            }
            Value::Function(func) => format!("<function {}>", func.def.name),
            Value::Builtin(name) => format!("<built-in function {name}>"),
            Value::Method(_, name) => format!("<bound method {name}>"),
            Value::Object(obj) => obj.to_string(),
        }
    }

    /// Copy with no shared mutable state, used whenever a value crosses a
    /// script boundary.
    pub fn deep_copy(&self) -> Value {
        self.deep_copy_with(&mut CopyMemo::default())
    }

    pub fn deep_copy_with(&self, memo: &mut CopyMemo) -> Value {
        match self {
            Value::List(items) => {
                let key = Rc::as_ptr(items).cast::<()>();
                if let Some(copy) = memo.get(key) {
                    return copy;
                }
                let copy = Rc::new(RefCell::new(Vec::new()));
                memo.insert(key, Value::List(copy.clone()));
                let copied = items.borrow().iter().map(|v| v.deep_copy_with(memo)).collect();
                *copy.borrow_mut() = copied;
                Value::List(copy)
            }
            Value::Tuple(items) => Value::Tuple(items.iter().map(|v| v.deep_copy_with(memo)).collect()),
            Value::Dict(dict) => {
                let key = Rc::as_ptr(dict).cast::<()>();
                if let Some(copy) = memo.get(key) {
                    return copy;
                }
                let copy = Rc::new(RefCell::new(IndexMap::new()));
                memo.insert(key, Value::Dict(copy.clone()));
                let copied = dict
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy_with(memo)))
                    .collect();
                *copy.borrow_mut() = copied;
                Value::Dict(copy)
            }
            Value::Method(receiver, name) => {
                Value::Method(Box::new(receiver.deep_copy_with(memo)), name.clone())
            }
            Value::Object(obj) => match obj.deep_copy(memo) {
                Some(copy) => Value::Object(copy),
                None => Value::Object(obj.clone()),
            },
            other => other.clone(),
        }
    }

    /// Items of an iterable, snapshotted.
    pub fn iterate(&self) -> Result<Vec<Value>, InterpreterError> {
        match self {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
            Value::Dict(dict) => Ok(dict.borrow().keys().cloned().map(Value::String).collect()),
            Value::Object(obj) => obj.iterate(),
            other => bail_type_error!("'{}' object is not iterable", other.type_name()),
        }
    }

    /// The string form used for dictionary keys.
    pub fn dict_key(&self) -> Result<String, InterpreterError> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Integer(_) | Value::Boolean(_) | Value::None | Value::Float(_) => {
                Ok(self.coerce_string())
            }
            Value::Tuple(_) => Ok(self.repr()),
            Value::Object(obj) => Ok(obj.to_string()),
            other => bail_type_error!("unhashable type: '{}'", other.type_name()),
        }
    }

    /// Graph representation of a value bound at top scope. Functions,
    /// modules and other opaque objects have none, and neither does a
    /// reference back to a container that encloses it.
    pub fn to_var(&self) -> Option<VarValue> {
        self.to_var_with(&mut Visiting::new())
    }

    pub fn to_var_with(&self, visiting: &mut Visiting) -> Option<VarValue> {
        match self {
            Value::None | Value::Function(_) | Value::Builtin(_) | Value::Method(..) => None,
            Value::Boolean(b) => Some(VarValue::Scalar(Scalar::Boolean(*b))),
            Value::Integer(i) => Some(VarValue::Scalar(Scalar::Integer(*i))),
            Value::Float(x) => Some(VarValue::Scalar(Scalar::Float(*x))),
            Value::String(s) => Some(VarValue::from_string(s.clone())),
            Value::List(items) => {
                let key = Rc::as_ptr(items).cast::<()>();
                if visiting.contains(&key) {
                    return None;
                }
                visiting.push(key);
                let list = items.borrow().iter().filter_map(|v| v.to_var_with(visiting)).collect();
                visiting.pop();
                Some(VarValue::List(list))
            }
            Value::Tuple(items) => Some(VarValue::List(
                items.iter().filter_map(|v| v.to_var_with(visiting)).collect(),
            )),
            Value::Dict(dict) => {
                let key = Rc::as_ptr(dict).cast::<()>();
                if visiting.contains(&key) {
                    return None;
                }
                visiting.push(key);
                let map = dict
                    .borrow()
                    .iter()
                    .filter_map(|(k, v)| v.to_var_with(visiting).map(|v| (k.clone(), v)))
                    .collect();
                visiting.pop();
                Some(VarValue::Map(map))
            }
            Value::Object(obj) => obj.to_var(visiting),
        }
    }
}

pub fn float_repr(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

/// Python `==`.
pub fn py_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Integer(_) | Value::Boolean(_) | Value::Float(_), Value::Integer(_) | Value::Boolean(_) | Value::Float(_)) => {
            match (a, b) {
                (Value::Float(_), _) | (_, Value::Float(_)) => {
                    a.as_float().ok() == b.as_float().ok()
                }
                _ => a.as_integer().ok() == b.as_integer().ok(),
            }
        }
        (Value::List(a), Value::List(b)) => {
            Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow())
        }
        (Value::Tuple(a), Value::Tuple(b)) => seq_eq(a, b),
        (Value::Dict(a), Value::Dict(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len()
                && a.iter().all(|(k, v)| b.get(k).is_some_and(|other| py_eq(v, other)))
        }
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => {
            core::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)) || a.is_equal(b.as_ref())
        }
        _ => false,
    }
}

fn seq_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| py_eq(a, b))
}

/// Python ordering for `<`, `sorted`, `min`, `max`.
pub fn py_cmp(a: &Value, b: &Value) -> Result<Ordering, InterpreterError> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Integer(x), Value::Integer(y)) => Ok(x.cmp(y)),
        (
            Value::Integer(_) | Value::Boolean(_) | Value::Float(_),
            Value::Integer(_) | Value::Boolean(_) | Value::Float(_),
        ) => a
            .as_float()?
            .partial_cmp(&b.as_float()?)
            .ok_or_else(|| InterpreterError::TypeError("cannot order NaN".into())),
        (Value::List(a), Value::List(b)) => seq_cmp(&a.borrow(), &b.borrow()),
        (Value::Tuple(a), Value::Tuple(b)) => seq_cmp(a, b),
        _ => bail_type_error!(
            "'<' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ),
    }
}

fn seq_cmp(a: &[Value], b: &[Value]) -> Result<Ordering, InterpreterError> {
    for (x, y) in a.iter().zip(b) {
        match py_cmp(x, y)? {
            Ordering::Equal => continue,
            other => return Ok(other),
        }
    }
    Ok(a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_forms() {
        let list = Value::list(vec![Value::string("a"), Value::Integer(1), Value::None]);
        assert_eq!(list.coerce_string(), "['a', 1, None]");
        assert_eq!(Value::Tuple(vec![Value::Integer(1)]).coerce_string(), "(1,)");
        assert_eq!(Value::Float(2.0).coerce_string(), "2.0");
        assert_eq!(Value::Boolean(true).repr(), "True");
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let inner = Value::list(vec![Value::Integer(1)]);
        let outer = Value::list(vec![inner.clone()]);
        let copy = outer.deep_copy();
        if let Value::List(items) = &inner {
            items.borrow_mut().push(Value::Integer(2));
        }
        assert_eq!(copy.coerce_string(), "[[1]]");
        assert_eq!(outer.coerce_string(), "[[1, 2]]");
    }

    #[test]
    fn test_self_referencing_list() {
        let list = Value::list(vec![Value::Integer(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.coerce_string(), "[1, [...]]");
        assert_eq!(
            list.to_var(),
            Some(VarValue::List(vec![VarValue::Scalar(Scalar::Integer(1))]))
        );

        let copy = list.deep_copy();
        let Value::List(items) = &copy else {
            panic!("copy is not a list");
        };
        let second = items.borrow()[1].clone();
        let Value::List(inner) = &second else {
            panic!("second item is not a list");
        };
        assert!(Rc::ptr_eq(items, inner));
        assert_eq!(copy.coerce_string(), "[1, [...]]");
    }

    #[test]
    fn test_self_referencing_dict() {
        let dict = Value::dict(IndexMap::new());
        if let Value::Dict(map) = &dict {
            map.borrow_mut().insert("me".into(), dict.clone());
        }
        assert_eq!(dict.repr(), "{'me': {...}}");
        assert_eq!(dict.to_var(), Some(VarValue::Map(IndexMap::new())));
        assert_eq!(dict.deep_copy().coerce_string(), "{'me': {...}}");
    }

    #[test]
    fn test_equality_and_ordering() {
        assert!(py_eq(&Value::Integer(1), &Value::Float(1.0)));
        assert!(py_eq(&Value::Boolean(true), &Value::Integer(1)));
        assert!(!py_eq(&Value::string("1"), &Value::Integer(1)));
        let a = Value::Tuple(vec![Value::Integer(3), Value::Integer(6)]);
        let b = Value::Tuple(vec![Value::Integer(3), Value::Integer(10)]);
        assert_eq!(py_cmp(&a, &b).unwrap(), Ordering::Less);
        assert!(py_cmp(&Value::string("a"), &Value::Integer(1)).is_err());
    }

    #[test]
    fn test_to_var() {
        let value = Value::list(vec![Value::string("$CC"), Value::None, Value::Integer(2)]);
        assert_eq!(
            value.to_var(),
            Some(VarValue::List(vec![
                VarValue::Deferred("CC".into()),
                VarValue::Scalar(Scalar::Integer(2)),
            ]))
        );
        assert_eq!(Value::Builtin("len").to_var(), None);
    }
}

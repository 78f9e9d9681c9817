//! Operators, `%` formatting, format specs and slicing.

use indexmap::IndexMap;

use crate::interpreter::error::{InterpreterError, bail_runtime_error, bail_type_error};
use crate::interpreter::builtins::modules::Opaque;
use crate::interpreter::value::{Value, float_repr, py_cmp, py_eq};
use crate::parser::{BinaryOperator, CompareOperator, UnaryOperator};

pub fn binary(left: &Value, op: BinaryOperator, right: &Value) -> Result<Value, InterpreterError> {
    // Arithmetic on an opaque value stays opaque.
    for side in [left, right] {
        if side.as_object::<Opaque>().is_some() {
            return Ok(side.clone());
        }
    }

    match op {
        BinaryOperator::Add => add(left, right),
        BinaryOperator::Sub => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => checked(a.checked_sub(*b)),
            (Value::List(a), Value::List(b)) => {
                let b = b.borrow();
                let items = a
                    .borrow()
                    .iter()
                    .filter(|item| !b.iter().any(|other| py_eq(item, other)))
                    .cloned()
                    .collect();
                Ok(Value::list(items))
            }
            _ => float_op(left, right, "-", |a, b| a - b),
        },
        BinaryOperator::Mul => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => checked(a.checked_mul(*b)),
            (Value::String(s), Value::Integer(n)) | (Value::Integer(n), Value::String(s)) => {
                Ok(Value::String(s.repeat((*n).max(0) as usize)))
            }
            (Value::List(items), Value::Integer(n)) | (Value::Integer(n), Value::List(items)) => {
                let items = items.borrow();
                let mut out = Vec::new();
                for _ in 0..(*n).max(0) {
                    out.extend(items.iter().cloned());
                }
                Ok(Value::list(out))
            }
            _ => float_op(left, right, "*", |a, b| a * b),
        },
        BinaryOperator::Div => {
            let divisor = number(right, "/")?;
            if divisor == 0.0 {
                bail_runtime_error!("ZeroDivisionError: division by zero");
            }
            Ok(Value::Float(number(left, "/")? / divisor))
        }
        BinaryOperator::FloorDiv => match (left, right) {
            (Value::Integer(_), Value::Integer(0)) => {
                bail_runtime_error!("ZeroDivisionError: integer division by zero")
            }
            (Value::Integer(a), Value::Integer(b)) => checked(floor_div(*a, *b)),
            _ => {
                let divisor = number(right, "//")?;
                if divisor == 0.0 {
                    bail_runtime_error!("ZeroDivisionError: float floor division by zero");
                }
                Ok(Value::Float((number(left, "//")? / divisor).floor()))
            }
        },
        BinaryOperator::Mod => match (left, right) {
            (Value::String(fmt), args) => Ok(Value::String(percent_format(fmt, args)?)),
            (Value::Integer(_), Value::Integer(0)) => {
                bail_runtime_error!("ZeroDivisionError: integer modulo by zero")
            }
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(floor_mod(*a, *b))),
            _ => {
                let (a, b) = (number(left, "%")?, number(right, "%")?);
                if b == 0.0 {
                    bail_runtime_error!("ZeroDivisionError: float modulo");
                }
                Ok(Value::Float(a - b * (a / b).floor()))
            }
        },
        BinaryOperator::Pow => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) if *b >= 0 => {
                let exp = u32::try_from(*b)
                    .map_err(|_| InterpreterError::RuntimeError("exponent too large".into()))?;
                checked(a.checked_pow(exp))
            }
            _ => float_op(left, right, "**", f64::powf),
        },
        BinaryOperator::BitOr => match (left, right) {
            (Value::Dict(a), Value::Dict(b)) => {
                let mut merged = a.borrow().clone();
                merged.extend(b.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(Value::dict(merged))
            }
            (Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                for item in b.borrow().iter() {
                    if !items.iter().any(|other| py_eq(item, other)) {
                        items.push(item.clone());
                    }
                }
                Ok(Value::list(items))
            }
            _ => int_op(left, right, "|", |a, b| a | b),
        },
        BinaryOperator::BitAnd => match (left, right) {
            (Value::List(a), Value::List(b)) => {
                let b = b.borrow();
                let items = a
                    .borrow()
                    .iter()
                    .filter(|item| b.iter().any(|other| py_eq(item, other)))
                    .cloned()
                    .collect();
                Ok(Value::list(items))
            }
            _ => int_op(left, right, "&", |a, b| a & b),
        },
        BinaryOperator::BitXor => int_op(left, right, "^", |a, b| a ^ b),
        BinaryOperator::And | BinaryOperator::Or => {
            bail_runtime_error!("boolean operators are evaluated lazily")
        }
    }
}

fn add(left: &Value, right: &Value) -> Result<Value, InterpreterError> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => checked(a.checked_add(*b)),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (Value::List(a), Value::Tuple(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.iter().cloned());
            Ok(Value::list(items))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            let mut items = a.clone();
            items.extend(b.iter().cloned());
            Ok(Value::Tuple(items))
        }
        _ => float_op(left, right, "+", |a, b| a + b),
    }
}

fn checked(result: Option<i64>) -> Result<Value, InterpreterError> {
    result
        .map(Value::Integer)
        .ok_or_else(|| InterpreterError::RuntimeError("integer overflow".into()))
}

/// Rounds toward negative infinity. `None` on overflow; `b` is nonzero.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    let r = a.checked_rem(b)?;
    Some(if r != 0 && ((r < 0) != (b < 0)) { q - 1 } else { q })
}

/// Remainder with the divisor's sign. `i64::MIN % -1` is 0.
fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }
}

fn number(value: &Value, op: &str) -> Result<f64, InterpreterError> {
    match value {
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) => value.as_float(),
        other => bail_type_error!("unsupported operand type for {}: '{}'", op, other.type_name()),
    }
}

fn float_op(
    left: &Value,
    right: &Value,
    op: &str,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value, InterpreterError> {
    match (left, right) {
        (
            Value::Integer(_) | Value::Float(_) | Value::Boolean(_),
            Value::Integer(_) | Value::Float(_) | Value::Boolean(_),
        ) => {
            let result = f(left.as_float()?, right.as_float()?);
            if matches!(left, Value::Float(_)) || matches!(right, Value::Float(_)) {
                Ok(Value::Float(result))
            } else {
                Ok(Value::Integer(result as i64))
            }
        }
        _ => bail_type_error!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op,
            left.type_name(),
            right.type_name()
        ),
    }
}

fn int_op(
    left: &Value,
    right: &Value,
    op: &str,
    f: impl Fn(i64, i64) -> i64,
) -> Result<Value, InterpreterError> {
    match (left, right) {
        (Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(f(*a as i64, *b as i64) != 0)),
        (Value::Integer(_) | Value::Boolean(_), Value::Integer(_) | Value::Boolean(_)) => {
            Ok(Value::Integer(f(left.as_integer()?, right.as_integer()?)))
        }
        _ => bail_type_error!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op,
            left.type_name(),
            right.type_name()
        ),
    }
}

pub fn unary(op: UnaryOperator, value: &Value) -> Result<Value, InterpreterError> {
    match (op, value) {
        (UnaryOperator::Not, v) => Ok(Value::Boolean(!v.truthy())),
        (UnaryOperator::Minus, Value::Integer(i)) => checked(i.checked_neg()),
        (UnaryOperator::Minus, Value::Boolean(b)) => Ok(Value::Integer(-(*b as i64))),
        (UnaryOperator::Minus, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOperator::Plus, Value::Integer(_) | Value::Float(_)) => Ok(value.clone()),
        (UnaryOperator::Plus, Value::Boolean(b)) => Ok(Value::Integer(*b as i64)),
        (UnaryOperator::Invert, Value::Integer(i)) => Ok(Value::Integer(!i)),
        (_, v) if v.as_object::<Opaque>().is_some() => Ok(v.clone()),
        (_, v) => bail_type_error!("bad operand type for unary operator: '{}'", v.type_name()),
    }
}

/// Comparisons that do not need the interpreter (everything but `in` on
/// script objects).
pub fn compare(op: CompareOperator, left: &Value, right: &Value) -> Result<bool, InterpreterError> {
    use core::cmp::Ordering;
    Ok(match op {
        CompareOperator::Eq => py_eq(left, right),
        CompareOperator::Ne => !py_eq(left, right),
        CompareOperator::Lt => py_cmp(left, right)? == Ordering::Less,
        CompareOperator::Le => py_cmp(left, right)? != Ordering::Greater,
        CompareOperator::Gt => py_cmp(left, right)? == Ordering::Greater,
        CompareOperator::Ge => py_cmp(left, right)? != Ordering::Less,
        CompareOperator::Is => is_same(left, right),
        CompareOperator::IsNot => !is_same(left, right),
        CompareOperator::In | CompareOperator::NotIn => {
            let found = contains(right, left)?;
            if op == CompareOperator::In { found } else { !found }
        }
    })
}

fn is_same(left: &Value, right: &Value) -> bool {
    use std::rc::Rc;
    match (left, right) {
        (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
        (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
        (Value::Object(a), Value::Object(b)) => core::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
        (Value::None, Value::None) => true,
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::List(_) | Value::Dict(_) | Value::Object(_), _)
        | (_, Value::List(_) | Value::Dict(_) | Value::Object(_)) => false,
        _ => py_eq(left, right),
    }
}

/// `item in container` for builtin containers. Script objects are handled
/// by the interpreter before reaching here.
pub fn contains(container: &Value, item: &Value) -> Result<bool, InterpreterError> {
    match container {
        Value::List(items) => Ok(items.borrow().iter().any(|v| py_eq(v, item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| py_eq(v, item))),
        Value::String(s) => Ok(s.contains(item.as_string()?)),
        Value::Dict(dict) => Ok(dict.borrow().contains_key(&item.dict_key()?)),
        other => bail_type_error!("argument of type '{}' is not iterable", other.type_name()),
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

pub fn index(container: &Value, key: &Value) -> Result<Value, InterpreterError> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let i = normalize_index(key.as_integer()?, items.len())
                .ok_or_else(|| InterpreterError::RuntimeError("IndexError: list index out of range".into()))?;
            Ok(items[i].clone())
        }
        Value::Tuple(items) => {
            let i = normalize_index(key.as_integer()?, items.len())
                .ok_or_else(|| InterpreterError::RuntimeError("IndexError: tuple index out of range".into()))?;
            Ok(items[i].clone())
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(key.as_integer()?, chars.len())
                .ok_or_else(|| InterpreterError::RuntimeError("IndexError: string index out of range".into()))?;
            Ok(Value::String(chars[i].to_string()))
        }
        Value::Dict(dict) => {
            let key = key.dict_key()?;
            match dict.borrow().get(&key) {
                Some(value) => Ok(value.clone()),
                None => bail_runtime_error!("KeyError: '{}'", key),
            }
        }
        other => bail_type_error!("'{}' object is not subscriptable", other.type_name()),
    }
}

pub fn set_index(container: &Value, key: &Value, value: Value) -> Result<(), InterpreterError> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let len = items.len();
            let i = normalize_index(key.as_integer()?, len).ok_or_else(|| {
                InterpreterError::RuntimeError("IndexError: list assignment index out of range".into())
            })?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(dict) => {
            dict.borrow_mut().insert(key.dict_key()?, value);
            Ok(())
        }
        other => bail_type_error!("'{}' object does not support item assignment", other.type_name()),
    }
}

fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |v: i64, lo: i64, hi: i64| v.max(lo).min(hi);
    let resolve = |v: i64| if v < 0 { v + len } else { v };
    let mut out = Vec::new();
    if step > 0 {
        let start = clamp(start.map(resolve).unwrap_or(0), 0, len);
        let stop = clamp(stop.map(resolve).unwrap_or(len), 0, len);
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        let start = clamp(start.map(resolve).unwrap_or(len - 1), -1, len - 1);
        let stop = clamp(stop.map(resolve).unwrap_or(-1), -1, len - 1);
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            i += step;
        }
    }
    out
}

pub fn slice(
    container: &Value,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Value, InterpreterError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        bail_runtime_error!("ValueError: slice step cannot be zero");
    }
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let picked = slice_indices(items.len(), start, stop, step);
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let picked = slice_indices(items.len(), start, stop, step);
            Ok(Value::Tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_indices(chars.len(), start, stop, step);
            Ok(Value::String(picked.into_iter().map(|i| chars[i]).collect()))
        }
        other => bail_type_error!("'{}' object is not sliceable", other.type_name()),
    }
}

/// `fmt % args`.
pub fn percent_format(fmt: &str, args: &Value) -> Result<String, InterpreterError> {
    let (positional, named): (Vec<Value>, Option<IndexMap<String, Value>>) = match args {
        Value::Tuple(items) => (items.clone(), None),
        Value::Dict(dict) => (Vec::new(), Some(dict.borrow().clone())),
        other => (vec![other.clone()], None),
    };
    let mut positional = positional.into_iter();
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut key = None;
        if chars.peek() == Some(&'(') {
            chars.next();
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == ')' {
                    break;
                }
                name.push(c);
            }
            key = Some(name);
        }

        let mut spec = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | ' ' | '#' | '.') {
                spec.push(c);
                chars.next();
            } else {
                break;
            }
        }
        let conversion = chars
            .next()
            .ok_or_else(|| InterpreterError::RuntimeError("ValueError: incomplete format".into()))?;

        let value = match &key {
            Some(name) => named
                .as_ref()
                .and_then(|named| named.get(name).cloned())
                .ok_or_else(|| InterpreterError::RuntimeError(format!("KeyError: '{name}'").into()))?,
            None => positional.next().ok_or_else(|| {
                InterpreterError::TypeError("not enough arguments for format string".into())
            })?,
        };

        let (align_left, rest) = match spec.strip_prefix('-') {
            Some(rest) => (true, rest.to_string()),
            None => (false, spec.trim_start_matches(['+', ' ', '#']).to_string()),
        };
        let (width, precision) = match rest.split_once('.') {
            Some((w, p)) => (w.parse::<usize>().ok(), p.parse::<usize>().ok()),
            None => (rest.parse::<usize>().ok(), None),
        };
        let zero_pad = rest.starts_with('0') && !align_left;

        let text = match conversion {
            's' => value.coerce_string(),
            'r' => value.repr(),
            'd' | 'i' => match &value {
                Value::Float(x) => (x.trunc() as i64).to_string(),
                other => other.as_integer()?.to_string(),
            },
            'f' | 'F' => format!("{:.*}", precision.unwrap_or(6), value.as_float()?),
            'x' => format!("{:x}", value.as_integer()?),
            'X' => format!("{:X}", value.as_integer()?),
            'o' => format!("{:o}", value.as_integer()?),
            other => bail_runtime_error!("ValueError: unsupported format character '{}'", other),
        };
        out.push_str(&pad(&text, width.unwrap_or(0), if align_left { '<' } else { '>' }, if zero_pad { '0' } else { ' ' }));
    }

    if positional.next().is_some() {
        bail_type_error!("not all arguments converted during string formatting");
    }
    Ok(out)
}

fn pad(text: &str, width: usize, align: char, fill: char) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let padding = width - len;
    let fill_str = |n: usize| fill.to_string().repeat(n);
    match align {
        '<' => format!("{text}{}", fill_str(padding)),
        '^' => format!("{}{text}{}", fill_str(padding / 2), fill_str(padding - padding / 2)),
        _ => format!("{}{text}", fill_str(padding)),
    }
}

/// Applies a `format()` mini-language spec such as `>8`, `03d` or `.2f`.
pub fn format_spec(value: &Value, spec: &str) -> Result<String, InterpreterError> {
    if spec.is_empty() {
        return Ok(value.coerce_string());
    }
    let chars: Vec<char> = spec.chars().collect();
    let mut i = 0;
    let mut fill = ' ';
    let mut align = None;
    if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
        fill = chars[0];
        align = Some(chars[1]);
        i = 2;
    } else if matches!(chars.first(), Some('<' | '>' | '^')) {
        align = Some(chars[0]);
        i = 1;
    }
    if chars.get(i) == Some(&'0') && align.is_none() {
        fill = '0';
        align = Some('>');
        i += 1;
    }
    let mut width = String::new();
    while let Some(c) = chars.get(i).filter(|c| c.is_ascii_digit()) {
        width.push(*c);
        i += 1;
    }
    let mut precision = None;
    if chars.get(i) == Some(&'.') {
        i += 1;
        let mut digits = String::new();
        while let Some(c) = chars.get(i).filter(|c| c.is_ascii_digit()) {
            digits.push(*c);
            i += 1;
        }
        precision = digits.parse::<usize>().ok();
    }
    let kind: String = chars[i..].iter().collect();

    let text = match kind.as_str() {
        "f" | "F" => format!("{:.*}", precision.unwrap_or(6), value.as_float()?),
        "d" => value.as_integer()?.to_string(),
        "x" => format!("{:x}", value.as_integer()?),
        "X" => format!("{:X}", value.as_integer()?),
        "s" | "" => match (precision, value) {
            (Some(p), Value::Float(x)) => format!("{x:.p$}"),
            (Some(p), other) => other.coerce_string().chars().take(p).collect(),
            (None, Value::Float(x)) => float_repr(*x),
            (None, other) => other.coerce_string(),
        },
        other => bail_runtime_error!("ValueError: unknown format code '{}'", other),
    };
    let default_align = if matches!(value, Value::Integer(_) | Value::Float(_)) { '>' } else { '<' };
    Ok(pad(
        &text,
        width.parse::<usize>().unwrap_or(0),
        align.unwrap_or(default_align),
        fill,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::string(v)
    }

    #[test]
    fn test_arithmetic() {
        assert!(matches!(
            binary(&Value::Integer(-7), BinaryOperator::FloorDiv, &Value::Integer(2)).unwrap(),
            Value::Integer(-4)
        ));
        assert!(matches!(
            binary(&Value::Integer(-7), BinaryOperator::Mod, &Value::Integer(3)).unwrap(),
            Value::Integer(2)
        ));
        assert!(binary(&Value::Integer(1), BinaryOperator::Div, &Value::Integer(0)).is_err());
        assert!(binary(&Value::Integer(i64::MAX), BinaryOperator::Add, &Value::Integer(1)).is_err());
        assert!(matches!(
            binary(&Value::Integer(7), BinaryOperator::Mod, &Value::Integer(-3)).unwrap(),
            Value::Integer(-2)
        ));
        assert_eq!(
            binary(&s("ab"), BinaryOperator::Mul, &Value::Integer(2)).unwrap().coerce_string(),
            "abab"
        );
    }

    #[test]
    fn test_integer_division_overflow() {
        let err = binary(&Value::Integer(i64::MIN), BinaryOperator::FloorDiv, &Value::Integer(-1)).unwrap_err();
        assert!(err.to_string().contains("integer overflow"), "{err}");
        assert!(matches!(
            binary(&Value::Integer(i64::MIN), BinaryOperator::Mod, &Value::Integer(-1)).unwrap(),
            Value::Integer(0)
        ));
        assert!(matches!(
            binary(&Value::Integer(i64::MIN), BinaryOperator::FloorDiv, &Value::Integer(2)).unwrap(),
            Value::Integer(v) if v == i64::MIN / 2
        ));
    }

    #[test]
    fn test_percent_format() {
        let args = Value::Tuple(vec![s("core"), Value::Integer(3)]);
        assert_eq!(percent_format("%s has %d files", &args).unwrap(), "core has 3 files");
        assert_eq!(percent_format("%5.2f%%", &Value::Float(3.14159)).unwrap(), " 3.14%");
        let mut named = IndexMap::new();
        named.insert("name".to_string(), s("x"));
        assert_eq!(percent_format("-D%(name)s", &Value::dict(named)).unwrap(), "-Dx");
        assert!(percent_format("%s %s", &s("one")).is_err());
    }

    #[test]
    fn test_format_spec() {
        assert_eq!(format_spec(&Value::Integer(7), "03d").unwrap(), "007");
        assert_eq!(format_spec(&s("ab"), ">4").unwrap(), "  ab");
        assert_eq!(format_spec(&Value::Float(1.5), ".2f").unwrap(), "1.50");
    }

    #[test]
    fn test_slices() {
        let list = Value::list((0..5).map(Value::Integer).collect());
        assert_eq!(slice(&list, Some(1), Some(-1), None).unwrap().coerce_string(), "[1, 2, 3]");
        assert_eq!(slice(&list, None, None, Some(-2)).unwrap().coerce_string(), "[4, 2, 0]");
        assert_eq!(slice(&s("SConstruct"), Some(-9), None, None).unwrap().coerce_string(), "Construct");
    }

    #[test]
    fn test_membership_and_identity() {
        let list = Value::list(vec![s("a")]);
        assert!(compare(CompareOperator::In, &s("a"), &list).unwrap());
        assert!(compare(CompareOperator::NotIn, &s("b"), &list).unwrap());
        assert!(compare(CompareOperator::In, &s("on"), &s("Python")).unwrap());
        assert!(compare(CompareOperator::Is, &Value::None, &Value::None).unwrap());
        assert!(!compare(CompareOperator::Is, &list, &list.deep_copy()).unwrap());
    }
}

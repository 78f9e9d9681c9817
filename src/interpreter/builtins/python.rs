//! The slice of Python's builtin functions build scripts lean on.

use core::cmp::Ordering;

use indexmap::IndexMap;

use crate::interpreter::error::{ErrorContext, bail_runtime_error, bail_type_error};
use crate::interpreter::value::{py_cmp, py_eq};
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, Value};

fn first(args: &[Value], function: &str) -> Result<Value, InterpreterError> {
    args.first()
        .cloned()
        .with_context_type(|| format!("{function}() takes at least one argument"))
}

pub fn len(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let len = match first(&args, "len")? {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Dict(dict) => dict.borrow().len(),
        Value::Object(obj) => obj.iterate()?.len(),
        other => bail_type_error!("object of type '{}' has no len()", other.type_name()),
    };
    Ok(Value::Integer(len as i64))
}

pub fn str(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::String(
        args.first().map(Value::coerce_string).unwrap_or_default(),
    ))
}

pub fn repr(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::String(first(&args, "repr")?.repr()))
}

pub fn int(args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let base = match args.get(1).or(kwargs.get("base")) {
        Some(base) => u32::try_from(base.as_integer()?).context_type("invalid base")?,
        None => 10,
    };
    match args.first() {
        None => Ok(Value::Integer(0)),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            let digits = match base {
                16 => trimmed.trim_start_matches("0x").trim_start_matches("0X"),
                8 => trimmed.trim_start_matches("0o"),
                2 => trimmed.trim_start_matches("0b"),
                _ => trimmed,
            };
            i64::from_str_radix(digits, base)
                .map(Value::Integer)
                .with_context_runtime(|| format!("ValueError: invalid literal for int(): '{s}'"))
        }
        Some(Value::Float(x)) => Ok(Value::Integer(x.trunc() as i64)),
        Some(other) => other.as_integer().map(Value::Integer),
    }
}

pub fn float(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .with_context_runtime(|| format!("ValueError: could not convert string to float: '{s}'")),
        Some(other) => other.as_float().map(Value::Float),
    }
}

pub fn bool(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::Boolean(args.first().is_some_and(Value::truthy)))
}

pub fn list(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    match args.first() {
        Some(value) => Ok(Value::list(value.iterate()?)),
        None => Ok(Value::list(Vec::new())),
    }
}

pub fn tuple(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    match args.first() {
        Some(value) => Ok(Value::Tuple(value.iterate()?)),
        None => Ok(Value::Tuple(Vec::new())),
    }
}

/// Lists stand in for sets; `set()` removes duplicates and keeps first
/// occurrences in order.
pub fn set(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let mut unique: Vec<Value> = Vec::new();
    if let Some(value) = args.first() {
        for item in value.iterate()? {
            if !unique.iter().any(|seen| py_eq(seen, &item)) {
                unique.push(item);
            }
        }
    }
    Ok(Value::list(unique))
}

pub fn dict(args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let mut out = IndexMap::new();
    match args.first() {
        Some(Value::Dict(dict)) => out.extend(dict.borrow().iter().map(|(k, v)| (k.clone(), v.clone()))),
        Some(other) => {
            for pair in other.iterate()? {
                let pair = pair.iterate()?;
                let [key, value] = <[Value; 2]>::try_from(pair)
                    .ok()
                    .context_type("dict() sequence elements must be pairs")?;
                out.insert(key.dict_key()?, value);
            }
        }
        None => {}
    }
    out.extend(kwargs);
    Ok(Value::dict(out))
}

pub fn range(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let ints = args.iter().map(Value::as_integer).collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => bail_type_error!("range() expects 1 to 3 arguments"),
    };
    if step == 0 {
        bail_runtime_error!("ValueError: range() arg 3 must not be zero");
    }
    let mut items = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        items.push(Value::Integer(i));
        i += step;
    }
    Ok(Value::list(items))
}

/// Sorts `items` by `key` results, surfacing the first comparison error.
pub(crate) fn sort_values(
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
    interp: &mut Interpreter,
) -> Result<Vec<Value>, InterpreterError> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let k = match key {
            Some(key) if !key.is_none() => interp.call_value(key, vec![item.clone()], Kwargs::new())?,
            _ => item.clone(),
        };
        keyed.push((k, item));
    }
    let mut error = None;
    keyed.sort_by(|(a, _), (b, _)| match py_cmp(a, b) {
        Ok(ordering) => ordering,
        Err(err) => {
            error.get_or_insert(err);
            Ordering::Equal
        }
    });
    if let Some(err) = error {
        return Err(err);
    }
    if reverse {
        keyed.reverse();
    }
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

pub fn sorted(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let items = first(&args, "sorted")?.iterate()?;
    let reverse = kwargs.get("reverse").is_some_and(Value::truthy);
    let sorted = sort_values(items, kwargs.get("key"), reverse, interp)?;
    Ok(Value::list(sorted))
}

pub fn reversed(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let mut items = first(&args, "reversed")?.iterate()?;
    items.reverse();
    Ok(Value::list(items))
}

pub fn enumerate(args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let start = match args.get(1).or(kwargs.get("start")) {
        Some(start) => start.as_integer()?,
        None => 0,
    };
    let items = first(&args, "enumerate")?
        .iterate()?
        .into_iter()
        .zip(start..)
        .map(|(item, i)| Value::Tuple(vec![Value::Integer(i), item]))
        .collect();
    Ok(Value::list(items))
}

pub fn zip(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let columns = args.iter().map(Value::iterate).collect::<Result<Vec<_>, _>>()?;
    let len = columns.iter().map(Vec::len).min().unwrap_or(0);
    let rows = (0..len)
        .map(|i| Value::Tuple(columns.iter().map(|column| column[i].clone()).collect()))
        .collect();
    Ok(Value::list(rows))
}

fn extreme(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter, want: Ordering, name: &str) -> Result<Value, InterpreterError> {
    let items = match args.as_slice() {
        [single] => single.iterate()?,
        _ => args,
    };
    if items.is_empty() {
        return kwargs
            .get("default")
            .cloned()
            .with_context_runtime(|| format!("ValueError: {name}() arg is an empty sequence"));
    }
    // Ties keep the first occurrence.
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let k = match kwargs.get("key") {
            Some(key) if !key.is_none() => interp.call_value(key, vec![item.clone()], Kwargs::new())?,
            _ => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_key, _)) => py_cmp(&k, best_key)? == want,
        };
        if replace {
            best = Some((k, item));
        }
    }
    best.map(|(_, item)| item).context_runtime("empty sequence")
}

pub fn min(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    extreme(args, kwargs, interp, Ordering::Less, "min")
}

pub fn max(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    extreme(args, kwargs, interp, Ordering::Greater, "max")
}

pub fn sum(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let mut total = args.get(1).cloned().unwrap_or(Value::Integer(0));
    for item in first(&args, "sum")?.iterate()? {
        total = crate::interpreter::ops::binary(&total, crate::parser::BinaryOperator::Add, &item)?;
    }
    Ok(total)
}

pub fn any(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::Boolean(first(&args, "any")?.iterate()?.iter().any(Value::truthy)))
}

pub fn all(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::Boolean(first(&args, "all")?.iterate()?.iter().all(Value::truthy)))
}

pub fn map(args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let function = first(&args, "map")?;
    let columns = args[1..].iter().map(Value::iterate).collect::<Result<Vec<_>, _>>()?;
    let len = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let call_args = columns.iter().map(|column| column[i].clone()).collect();
        out.push(interp.call_value(&function, call_args, Kwargs::new())?);
    }
    Ok(Value::list(out))
}

pub fn filter(args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let function = first(&args, "filter")?;
    let items = args.get(1).context_type("filter() expects an iterable")?.iterate()?;
    let mut out = Vec::new();
    for item in items {
        let keep = if function.is_none() {
            item.truthy()
        } else {
            interp.call_value(&function, vec![item.clone()], Kwargs::new())?.truthy()
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

pub fn abs(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    match first(&args, "abs")? {
        Value::Integer(i) => Ok(Value::Integer(i.abs())),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        Value::Boolean(b) => Ok(Value::Integer(b as i64)),
        other => bail_type_error!("bad operand type for abs(): '{}'", other.type_name()),
    }
}

fn is_instance(value: &Value, class: &Value) -> bool {
    match class {
        Value::Tuple(classes) => classes.iter().any(|c| is_instance(value, c)),
        Value::Builtin(name) => matches!(
            (*name, value),
            ("str", Value::String(_))
                | ("int", Value::Integer(_) | Value::Boolean(_))
                | ("float", Value::Float(_))
                | ("bool", Value::Boolean(_))
                | ("list", Value::List(_))
                | ("tuple", Value::Tuple(_))
                | ("dict", Value::Dict(_))
        ),
        _ => false,
    }
}

pub fn isinstance(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let value = first(&args, "isinstance")?;
    let class = args.get(1).context_type("isinstance() expects two arguments")?;
    Ok(Value::Boolean(is_instance(&value, class)))
}

pub fn callable(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::Boolean(first(&args, "callable")?.is_callable()))
}

pub fn getattr(args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let object = first(&args, "getattr")?;
    let name = args
        .get(1)
        .context_type("getattr() expects an attribute name")?
        .as_string()?;
    match interp.get_attribute(&object, name) {
        Ok(value) => Ok(value),
        Err(err) => match args.get(2) {
            Some(default) => Ok(default.clone()),
            None => Err(err),
        },
    }
}

pub fn hasattr(args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let object = first(&args, "hasattr")?;
    let name = args
        .get(1)
        .context_type("hasattr() expects an attribute name")?
        .as_string()?;
    Ok(Value::Boolean(interp.get_attribute(&object, name).is_ok()))
}

/// Exception classes evaluate to their message; `raise` turns it into an
/// error.
pub fn exception(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let message = args.iter().map(Value::coerce_string).collect::<Vec<_>>().join(" ");
    Ok(Value::String(message))
}

#[cfg(test)]
mod tests {
    use crate::graph::{Scalar, VarValue};
    use crate::interpreter::tests::{run, var};

    #[test]
    fn test_sequences() {
        let execution = run(r#"
r = list(range(5, 0, -2))
z = dict(zip(["a", "b"], [1, 2]))
e = [i for i, _ in enumerate("ab", 1)]
s = set(["x", "y", "x"])
m = max([3, 9, 2])
lo = min("b", "a", "c")
total = sum([1, 2, 3])
kept = list(filter(None, [0, 1, "", "a"]))
lens = list(map(len, ["ab", "c"]))
srt = sorted(["bb", "a", "ccc"], key=len, reverse=True)
"#);
        assert_eq!(var(&execution, "r"), var(&run("r = [5, 3, 1]"), "r"));
        assert_eq!(var(&execution, "z"), var(&run("z = {'a': 1, 'b': 2}"), "z"));
        assert_eq!(var(&execution, "e"), var(&run("e = [1, 2]"), "e"));
        assert_eq!(var(&execution, "s"), var(&run("s = ['x', 'y']"), "s"));
        assert_eq!(execution.graph.lookup("m"), Some(&VarValue::Scalar(Scalar::Integer(9))));
        assert_eq!(execution.graph.lookup("lo"), Some(&VarValue::string("a")));
        assert_eq!(execution.graph.lookup("total"), Some(&VarValue::Scalar(Scalar::Integer(6))));
        assert_eq!(var(&execution, "kept"), var(&run("kept = [1, 'a']"), "kept"));
        assert_eq!(var(&execution, "lens"), var(&run("lens = [2, 1]"), "lens"));
        assert_eq!(var(&execution, "srt"), var(&run("srt = ['ccc', 'bb', 'a']"), "srt"));
    }

    #[test]
    fn test_conversions_and_types() {
        let execution = run(r#"
a = int("0x1F", 16)
b = int("42")
c = float("2.5")
d = isinstance("x", str)
f = isinstance([], (dict, tuple))
g = hasattr("abc", "upper")
h = str(None)
"#);
        assert_eq!(execution.graph.lookup("a"), Some(&VarValue::Scalar(Scalar::Integer(31))));
        assert_eq!(execution.graph.lookup("b"), Some(&VarValue::Scalar(Scalar::Integer(42))));
        assert_eq!(execution.graph.lookup("c"), Some(&VarValue::Scalar(Scalar::Float(2.5))));
        assert_eq!(execution.graph.lookup("d"), Some(&VarValue::boolean(true)));
        assert_eq!(execution.graph.lookup("f"), Some(&VarValue::boolean(false)));
        assert_eq!(execution.graph.lookup("g"), Some(&VarValue::boolean(true)));
        assert_eq!(execution.graph.lookup("h"), Some(&VarValue::string("None")));
    }
}

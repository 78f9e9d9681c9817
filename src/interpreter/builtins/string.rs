use crate::interpreter::error::{ErrorContext, bail_runtime_error, bail_type_error};
use crate::interpreter::ops::format_spec;
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, Value};

type StringMethod = fn(&str, Vec<Value>, Kwargs, &mut Interpreter) -> Result<Value, InterpreterError>;

const METHODS: &[(&str, StringMethod)] = &[
    ("format", format),
    ("split", split),
    ("rsplit", rsplit),
    ("splitlines", splitlines),
    ("join", join),
    ("strip", strip),
    ("lstrip", lstrip),
    ("rstrip", rstrip),
    ("startswith", startswith),
    ("endswith", endswith),
    ("replace", replace),
    ("find", find),
    ("rfind", rfind),
    ("index", index),
    ("count", count),
    ("upper", upper),
    ("lower", lower),
    ("capitalize", capitalize),
    ("title", title),
    ("isdigit", isdigit),
    ("isalpha", isalpha),
    ("isalnum", isalnum),
    ("isupper", isupper),
    ("islower", islower),
    ("isspace", isspace),
    ("partition", partition),
    ("rpartition", rpartition),
    ("zfill", zfill),
    ("ljust", ljust),
    ("rjust", rjust),
    ("center", center),
    ("encode", identity),
    ("decode", identity),
];

pub fn call(
    obj: &str,
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
    interp: &mut Interpreter,
) -> Result<Value, InterpreterError> {
    match METHODS.iter().find(|(candidate, _)| *candidate == name) {
        Some((_, method)) => method(obj, args, kwargs, interp),
        None => bail_runtime_error!("AttributeError: 'str' object has no attribute '{}'", name),
    }
}

fn str_arg<'a>(args: &'a [Value], index: usize, method: &str) -> Result<&'a str, InterpreterError> {
    args.get(index)
        .with_context_type(|| format!("{method}() missing argument {}", index + 1))?
        .as_string()
}

/// Separator argument of `split`: absent or `None` means runs of whitespace.
fn separator(args: &[Value], kwargs: &Kwargs) -> Result<Option<String>, InterpreterError> {
    match args.first().or(kwargs.get("sep")) {
        None | Some(Value::None) => Ok(None),
        Some(sep) => {
            let sep = sep.as_string()?;
            if sep.is_empty() {
                bail_runtime_error!("ValueError: empty separator");
            }
            Ok(Some(sep.to_string()))
        }
    }
}

fn max_split(args: &[Value], kwargs: &Kwargs) -> Result<Option<usize>, InterpreterError> {
    match args.get(1).or(kwargs.get("maxsplit")) {
        None => Ok(None),
        Some(n) => {
            let n = n.as_integer()?;
            Ok(usize::try_from(n).ok())
        }
    }
}

fn strings(parts: impl IntoIterator<Item = impl Into<String>>) -> Value {
    Value::list(parts.into_iter().map(|p| Value::String(p.into())).collect())
}

pub fn format(obj: &str, args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let mut out = String::new();
    let mut chars = obj.chars().peekable();
    let mut auto_index = 0;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    field.push(c);
                }
                if !closed {
                    bail_runtime_error!("ValueError: single '{{' encountered in format string");
                }
                let (field, spec) = match field.split_once(':') {
                    Some((field, spec)) => (field.to_string(), spec.to_string()),
                    None => (field, String::new()),
                };
                let (field, conversion) = match field.split_once('!') {
                    Some((field, conversion)) => (field.to_string(), Some(conversion.to_string())),
                    None => (field, None),
                };
                let value = if field.is_empty() {
                    let value = args.get(auto_index).cloned();
                    auto_index += 1;
                    value.context_runtime("IndexError: replacement index out of range")?
                } else if let Ok(index) = field.parse::<usize>() {
                    args.get(index)
                        .cloned()
                        .with_context_runtime(|| format!("IndexError: replacement index {index} out of range"))?
                } else {
                    kwargs
                        .get(&field)
                        .cloned()
                        .with_context_runtime(|| format!("KeyError: '{field}'"))?
                };
                let value = match conversion.as_deref() {
                    Some("r") => Value::String(value.repr()),
                    Some("s") => Value::String(value.coerce_string()),
                    Some(other) => bail_runtime_error!("ValueError: unknown conversion specifier {}", other),
                    None => value,
                };
                out.push_str(&format_spec(&value, &spec)?);
            }
            '}' => bail_runtime_error!("ValueError: single '}}' encountered in format string"),
            other => out.push(other),
        }
    }
    Ok(Value::String(out))
}

pub fn split(obj: &str, args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let limit = max_split(&args, &kwargs)?;
    let parts: Vec<String> = match (separator(&args, &kwargs)?, limit) {
        (None, None) => obj.split_whitespace().map(str::to_string).collect(),
        (None, Some(n)) => {
            let mut parts = Vec::new();
            let mut rest = obj.trim_start();
            while !rest.is_empty() && parts.len() < n {
                match rest.find(char::is_whitespace) {
                    Some(end) => {
                        parts.push(rest[..end].to_string());
                        rest = rest[end..].trim_start();
                    }
                    None => {
                        parts.push(rest.to_string());
                        rest = "";
                    }
                }
            }
            if !rest.is_empty() {
                parts.push(rest.to_string());
            }
            parts
        }
        (Some(sep), None) => obj.split(sep.as_str()).map(str::to_string).collect(),
        (Some(sep), Some(n)) => obj.splitn(n + 1, sep.as_str()).map(str::to_string).collect(),
    };
    Ok(strings(parts))
}

pub fn rsplit(obj: &str, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let limit = max_split(&args, &kwargs)?;
    match (separator(&args, &kwargs)?, limit) {
        (Some(sep), Some(n)) => {
            let mut parts: Vec<String> = obj.rsplitn(n + 1, sep.as_str()).map(str::to_string).collect();
            parts.reverse();
            Ok(strings(parts))
        }
        _ => split(obj, args, kwargs, interp),
    }
}

pub fn splitlines(obj: &str, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(strings(obj.lines()))
}

pub fn join(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let items = args.first().context_type("join() takes exactly one argument")?.iterate()?;
    let mut parts = Vec::with_capacity(items.len());
    for item in &items {
        match item {
            Value::String(s) => parts.push(s.as_str()),
            other => bail_type_error!("sequence item: expected str instance, {} found", other.type_name()),
        }
    }
    Ok(Value::String(parts.join(obj)))
}

fn strip_set(args: &[Value]) -> Result<Option<Vec<char>>, InterpreterError> {
    match args.first() {
        None | Some(Value::None) => Ok(None),
        Some(chars) => Ok(Some(chars.as_string()?.chars().collect())),
    }
}

pub fn strip(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::String(match strip_set(&args)? {
        Some(set) => obj.trim_matches(set.as_slice()).to_string(),
        None => obj.trim().to_string(),
    }))
}

pub fn lstrip(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::String(match strip_set(&args)? {
        Some(set) => obj.trim_start_matches(set.as_slice()).to_string(),
        None => obj.trim_start().to_string(),
    }))
}

pub fn rstrip(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::String(match strip_set(&args)? {
        Some(set) => obj.trim_end_matches(set.as_slice()).to_string(),
        None => obj.trim_end().to_string(),
    }))
}

/// Prefix/suffix arguments: a string or a tuple of candidates.
fn affixes(args: &[Value], method: &str) -> Result<Vec<String>, InterpreterError> {
    match args.first() {
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Tuple(items)) => items.iter().map(|v| v.as_string().map(str::to_string)).collect(),
        _ => bail_type_error!("{}() first arg must be str or a tuple of str", method),
    }
}

pub fn startswith(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let prefixes = affixes(&args, "startswith")?;
    Ok(Value::Boolean(prefixes.iter().any(|p| obj.starts_with(p.as_str()))))
}

pub fn endswith(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let suffixes = affixes(&args, "endswith")?;
    Ok(Value::Boolean(suffixes.iter().any(|s| obj.ends_with(s.as_str()))))
}

pub fn replace(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let old = str_arg(&args, 0, "replace")?;
    let new = str_arg(&args, 1, "replace")?;
    Ok(Value::String(match args.get(2) {
        Some(count) => obj.replacen(old, new, usize::try_from(count.as_integer()?).unwrap_or(usize::MAX)),
        None => obj.replace(old, new),
    }))
}

/// Character index of a byte offset.
fn char_index(obj: &str, byte: usize) -> i64 {
    obj[..byte].chars().count() as i64
}

pub fn find(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let needle = str_arg(&args, 0, "find")?;
    Ok(Value::Integer(obj.find(needle).map_or(-1, |i| char_index(obj, i))))
}

pub fn rfind(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let needle = str_arg(&args, 0, "rfind")?;
    Ok(Value::Integer(obj.rfind(needle).map_or(-1, |i| char_index(obj, i))))
}

pub fn index(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let needle = str_arg(&args, 0, "index")?;
    match obj.find(needle) {
        Some(i) => Ok(Value::Integer(char_index(obj, i))),
        None => bail_runtime_error!("ValueError: substring not found"),
    }
}

pub fn count(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let needle = str_arg(&args, 0, "count")?;
    let count = if needle.is_empty() {
        obj.chars().count() + 1
    } else {
        obj.matches(needle).count()
    };
    Ok(Value::Integer(count as i64))
}

pub fn upper(obj: &str, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::String(obj.to_uppercase()))
}

pub fn lower(obj: &str, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::String(obj.to_lowercase()))
}

pub fn capitalize(obj: &str, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let mut chars = obj.chars();
    Ok(Value::String(match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }))
}

pub fn title(obj: &str, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let mut out = String::with_capacity(obj.len());
    let mut at_word_start = true;
    for c in obj.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    Ok(Value::String(out))
}

fn predicate(obj: &str, test: impl Fn(char) -> bool) -> Value {
    Value::Boolean(!obj.is_empty() && obj.chars().all(test))
}

pub fn isdigit(obj: &str, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(predicate(obj, |c| c.is_ascii_digit()))
}

pub fn isalpha(obj: &str, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(predicate(obj, char::is_alphabetic))
}

pub fn isalnum(obj: &str, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(predicate(obj, char::is_alphanumeric))
}

pub fn isspace(obj: &str, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(predicate(obj, char::is_whitespace))
}

pub fn isupper(obj: &str, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::Boolean(
        obj.chars().any(char::is_alphabetic) && !obj.chars().any(char::is_lowercase),
    ))
}

pub fn islower(obj: &str, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::Boolean(
        obj.chars().any(char::is_alphabetic) && !obj.chars().any(char::is_uppercase),
    ))
}

pub fn partition(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let sep = str_arg(&args, 0, "partition")?;
    let (head, sep, tail) = match obj.split_once(sep) {
        Some((head, tail)) => (head, sep, tail),
        None => (obj, "", ""),
    };
    Ok(Value::Tuple(vec![Value::string(head), Value::string(sep), Value::string(tail)]))
}

pub fn rpartition(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let sep = str_arg(&args, 0, "rpartition")?;
    let (head, sep, tail) = match obj.rsplit_once(sep) {
        Some((head, tail)) => (head, sep, tail),
        None => ("", "", obj),
    };
    Ok(Value::Tuple(vec![Value::string(head), Value::string(sep), Value::string(tail)]))
}

fn width_arg(args: &[Value], method: &str) -> Result<usize, InterpreterError> {
    let width = args
        .first()
        .with_context_type(|| format!("{method}() missing width"))?
        .as_integer()?;
    Ok(usize::try_from(width).unwrap_or(0))
}

fn fill_arg(args: &[Value]) -> Result<char, InterpreterError> {
    match args.get(1) {
        None => Ok(' '),
        Some(fill) => fill
            .as_string()?
            .chars()
            .next()
            .context_type("fill character must be exactly one character long"),
    }
}

fn padded(obj: &str, width: usize, fill: char, align: char) -> Value {
    let len = obj.chars().count();
    if len >= width {
        return Value::string(obj);
    }
    let pad = width - len;
    let (left, right) = match align {
        '<' => (0, pad),
        '>' => (pad, 0),
        _ => (pad / 2, pad - pad / 2),
    };
    let fill = |n: usize| fill.to_string().repeat(n);
    Value::String(format!("{}{obj}{}", fill(left), fill(right)))
}

pub fn zfill(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let width = width_arg(&args, "zfill")?;
    let (sign, digits) = match obj.strip_prefix(['-', '+']) {
        Some(rest) => (&obj[..1], rest),
        None => ("", obj),
    };
    let padded = padded(digits, width.saturating_sub(sign.len()), '0', '>').coerce_string();
    Ok(Value::String(format!("{sign}{padded}")))
}

pub fn ljust(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(padded(obj, width_arg(&args, "ljust")?, fill_arg(&args)?, '<'))
}

pub fn rjust(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(padded(obj, width_arg(&args, "rjust")?, fill_arg(&args)?, '>'))
}

pub fn center(obj: &str, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(padded(obj, width_arg(&args, "center")?, fill_arg(&args)?, '^'))
}

/// Bytes and text are the same thing here.
fn identity(obj: &str, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::string(obj))
}

#[cfg(test)]
mod tests {
    use crate::graph::{Scalar, VarValue};
    use crate::interpreter::tests::{run, var};

    #[test]
    fn test_split_variants() {
        let execution = run(r#"
a = "  a  b c ".split()
b = "a,b,,c".split(",")
c = "x.y.z".rsplit(".", 1)
d = "k=v=w".split("=", 1)
e = "one two three".split(None, 1)
"#);
        assert_eq!(var(&execution, "a"), var(&run("a = ['a', 'b', 'c']"), "a"));
        assert_eq!(var(&execution, "b"), var(&run("b = ['a', 'b', '', 'c']"), "b"));
        assert_eq!(var(&execution, "c"), var(&run("c = ['x.y', 'z']"), "c"));
        assert_eq!(var(&execution, "d"), var(&run("d = ['k', 'v=w']"), "d"));
        assert_eq!(var(&execution, "e"), var(&run("e = ['one', 'two three']"), "e"));
    }

    #[test]
    fn test_string_methods() {
        let execution = run(r#"
s = "--core--".strip("-")
t = "file.cpp".endswith((".c", ".cpp"))
u = "Hello".replace("l", "L", 1)
v = "a/b/c".rpartition("/")[2]
w = "7".zfill(3)
x = "{0}-{0}-{1!r}".format("a", "b")
y = "{:>5}|{:<3}|".format("ab", "c")
z = "abc".find("c")
"#);
        assert_eq!(execution.graph.lookup("s"), Some(&VarValue::string("core")));
        assert_eq!(execution.graph.lookup("t"), Some(&VarValue::boolean(true)));
        assert_eq!(execution.graph.lookup("u"), Some(&VarValue::string("HeLlo")));
        assert_eq!(execution.graph.lookup("v"), Some(&VarValue::string("c")));
        assert_eq!(execution.graph.lookup("w"), Some(&VarValue::string("007")));
        assert_eq!(execution.graph.lookup("x"), Some(&VarValue::string("a-a-'b'")));
        assert_eq!(execution.graph.lookup("y"), Some(&VarValue::string("   ab|c  |")));
        assert_eq!(execution.graph.lookup("z"), Some(&VarValue::Scalar(Scalar::Integer(2))));
    }
}

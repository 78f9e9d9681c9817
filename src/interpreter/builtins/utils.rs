use crate::interpreter::{Interpreter, InterpreterError, Kwargs, Value};

/// Flattens nested lists and tuples depth-first, keeping order.
pub fn flatten<'a>(args: impl IntoIterator<Item = &'a Value>) -> Vec<Value> {
    let mut out = Vec::new();
    let mut stack: Vec<std::vec::IntoIter<Value>> = vec![args.into_iter().cloned().collect::<Vec<_>>().into_iter()];

    while let Some(top) = stack.last_mut() {
        let Some(value) = top.next() else {
            stack.pop();
            continue;
        };
        match value {
            Value::List(items) => {
                let items = items.borrow().clone();
                stack.push(items.into_iter());
            }
            Value::Tuple(items) => stack.push(items.into_iter()),
            other => out.push(other),
        }
    }
    out
}

/// Strings of a flattened argument; non-string values are rendered with
/// `str()`.
pub fn strings<'a>(args: impl IntoIterator<Item = &'a Value>) -> Vec<String> {
    flatten(args)
        .into_iter()
        .filter(|v| !v.is_none())
        .map(|v| v.coerce_string())
        .collect()
}

/// Names given as `'a b'`, `['a', 'b']` or a mix.
pub fn names<'a>(args: impl IntoIterator<Item = &'a Value>) -> Vec<String> {
    strings(args)
        .iter()
        .flat_map(|s| s.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .collect()
}

pub fn split(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let items = match args.first() {
        Some(Value::String(s)) => s.split_whitespace().map(Value::string).collect(),
        Some(other) => flatten([other]),
        None => Vec::new(),
    };
    Ok(Value::list(items))
}

pub fn flatten_builtin(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::list(flatten(&args)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_flatten() {
        let input = vec![
            Value::Integer(1),
            Value::list(vec![
                Value::list(vec![]),
                Value::Integer(2),
                Value::Tuple(vec![Value::Integer(3), Value::Integer(4)]),
                Value::list(vec![]),
            ]),
            Value::Integer(5),
        ];
        let flat: Vec<i64> = flatten(&input)
            .iter()
            .map(|v| v.as_integer().unwrap())
            .collect();
        assert_eq!(flat, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_names() {
        let input = vec![Value::string("env opts"), Value::list(vec![Value::string("extra")])];
        assert_eq!(names(&input), vec!["env", "opts", "extra"]);
    }
}

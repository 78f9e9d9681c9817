use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::interpreter::error::{ErrorContext, bail_runtime_error, bail_type_error};
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, Value};

type Dict = Rc<RefCell<IndexMap<String, Value>>>;

fn key_arg(args: &[Value], method: &str) -> Result<String, InterpreterError> {
    args.first()
        .with_context_type(|| format!("{method}() expects a key"))?
        .dict_key()
}

pub fn call(
    dict: &Dict,
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
    _interp: &mut Interpreter,
) -> Result<Value, InterpreterError> {
    match name {
        "get" => {
            let key = key_arg(&args, name)?;
            let found = dict.borrow().get(&key).cloned();
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "has_key" => {
            let key = key_arg(&args, name)?;
            Ok(Value::Boolean(dict.borrow().contains_key(&key)))
        }
        "keys" => Ok(Value::list(dict.borrow().keys().cloned().map(Value::String).collect())),
        "values" => Ok(Value::list(dict.borrow().values().cloned().collect())),
        "items" => Ok(Value::list(
            dict.borrow()
                .iter()
                .map(|(k, v)| Value::Tuple(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
        )),
        "update" => {
            let mut entries = Vec::new();
            match args.first() {
                Some(Value::Dict(other)) => {
                    entries.extend(other.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Some(other) => {
                    for pair in other.iterate()? {
                        match pair.iterate()?.as_slice() {
                            [key, value] => entries.push((key.dict_key()?, value.clone())),
                            _ => bail_type_error!("dictionary update sequence elements must be pairs"),
                        }
                    }
                }
                None => {}
            }
            entries.extend(kwargs);
            dict.borrow_mut().extend(entries);
            Ok(Value::None)
        }
        "setdefault" => {
            let key = key_arg(&args, name)?;
            let default = args.get(1).cloned().unwrap_or(Value::None);
            Ok(dict.borrow_mut().entry(key).or_insert(default).clone())
        }
        "pop" => {
            let key = key_arg(&args, name)?;
            let removed = dict.borrow_mut().shift_remove(&key);
            match (removed, args.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => bail_runtime_error!("KeyError: '{}'", key),
            }
        }
        "copy" => Ok(Value::dict(dict.borrow().clone())),
        "clear" => {
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => bail_runtime_error!("AttributeError: 'dict' object has no attribute '{}'", name),
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{Scalar, VarValue};
    use crate::interpreter::tests::{run, var};

    #[test]
    fn test_dict_methods() {
        let execution = run(r#"
d = {"a": 1}
d.update({"b": 2}, c=3)
d.setdefault("a", 10)
d.setdefault("e", 5)
popped = d.pop("b")
missing = d.get("zz", "none")
keys = sorted(d.keys())
pairs = [k + str(v) for k, v in d.items()]
"#);
        assert_eq!(execution.graph.lookup("popped"), Some(&VarValue::Scalar(Scalar::Integer(2))));
        assert_eq!(execution.graph.lookup("missing"), Some(&VarValue::string("none")));
        assert_eq!(var(&execution, "keys"), var(&run("keys = ['a', 'c', 'e']"), "keys"));
        assert_eq!(var(&execution, "pairs"), var(&run("pairs = ['a1', 'c3', 'e5']"), "pairs"));
    }
}

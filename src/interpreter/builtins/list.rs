//! List and tuple methods. Sets are lists that keep their items unique,
//! so the common set methods live here too.

use std::cell::RefCell;
use std::rc::Rc;

use crate::interpreter::builtins::python::sort_values;
use crate::interpreter::error::{ErrorContext, bail_runtime_error};
use crate::interpreter::value::py_eq;
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, Value};

type Items = Rc<RefCell<Vec<Value>>>;

fn arg<'a>(args: &'a [Value], method: &str) -> Result<&'a Value, InterpreterError> {
    args.first()
        .with_context_type(|| format!("{method}() takes exactly one argument"))
}

fn position(items: &[Value], needle: &Value) -> Option<usize> {
    items.iter().position(|item| py_eq(item, needle))
}

pub fn call(
    items: &Items,
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
    interp: &mut Interpreter,
) -> Result<Value, InterpreterError> {
    match name {
        "append" => {
            let item = arg(&args, name)?.clone();
            items.borrow_mut().push(item);
        }
        "extend" | "update" => {
            let mut extra = Vec::new();
            for arg in &args {
                extra.extend(arg.iterate()?);
            }
            let mut items = items.borrow_mut();
            for item in extra {
                if name == "update" && position(&items, &item).is_some() {
                    continue;
                }
                items.push(item);
            }
        }
        "add" => {
            let item = arg(&args, name)?.clone();
            let mut items = items.borrow_mut();
            if position(&items, &item).is_none() {
                items.push(item);
            }
        }
        "insert" => {
            let index = args.first().context_type("insert() expects two arguments")?.as_integer()?;
            let item = args.get(1).context_type("insert() expects two arguments")?.clone();
            let mut items = items.borrow_mut();
            let len = items.len() as i64;
            let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(index as usize, item);
        }
        "pop" => {
            let mut items = items.borrow_mut();
            let len = items.len() as i64;
            let index = match args.first() {
                Some(index) => index.as_integer()?,
                None => len - 1,
            };
            let index = if index < 0 { index + len } else { index };
            if !(0..len).contains(&index) {
                bail_runtime_error!("IndexError: pop index out of range");
            }
            return Ok(items.remove(index as usize));
        }
        "remove" | "discard" => {
            let needle = arg(&args, name)?;
            let mut items = items.borrow_mut();
            match position(&items, needle) {
                Some(index) => {
                    items.remove(index);
                }
                None if name == "discard" => {}
                None => bail_runtime_error!("ValueError: list.remove(x): x not in list"),
            }
        }
        "clear" => items.borrow_mut().clear(),
        "reverse" => items.borrow_mut().reverse(),
        "sort" => {
            let snapshot = items.borrow().clone();
            let reverse = kwargs.get("reverse").is_some_and(Value::truthy);
            let sorted = sort_values(snapshot, kwargs.get("key"), reverse, interp)?;
            *items.borrow_mut() = sorted;
        }
        "copy" => return Ok(Value::list(items.borrow().clone())),
        "union" => {
            let mut out = items.borrow().clone();
            for arg in &args {
                for item in arg.iterate()? {
                    if position(&out, &item).is_none() {
                        out.push(item);
                    }
                }
            }
            return Ok(Value::list(out));
        }
        "intersection" | "difference" => {
            let other = arg(&args, name)?.iterate()?;
            let keep_common = name == "intersection";
            let out = items
                .borrow()
                .iter()
                .filter(|item| position(&other, item).is_some() == keep_common)
                .cloned()
                .collect();
            return Ok(Value::list(out));
        }
        _ => return call_tuple(&items.borrow(), name, args),
    }
    Ok(Value::None)
}

/// Methods shared by lists and tuples.
pub fn call_tuple(items: &[Value], name: &str, args: Vec<Value>) -> Result<Value, InterpreterError> {
    match name {
        "index" => {
            let needle = arg(&args, name)?;
            match position(items, needle) {
                Some(index) => Ok(Value::Integer(index as i64)),
                None => bail_runtime_error!("ValueError: {} is not in list", needle.repr()),
            }
        }
        "count" => {
            let needle = arg(&args, name)?;
            Ok(Value::Integer(items.iter().filter(|item| py_eq(item, needle)).count() as i64))
        }
        _ => bail_runtime_error!("AttributeError: 'list' object has no attribute '{}'", name),
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{Scalar, VarValue};
    use crate::interpreter::tests::{run, var};

    #[test]
    fn test_list_methods() {
        let execution = run(r#"
l = ["b", "a"]
l.append("d")
l.insert(0, "z")
l.extend(("c",))
l.remove("z")
last = l.pop()
l.sort()
idx = l.index("b")
s = set()
s.add("x")
s.add("x")
s.update(["y", "x"])
t = (1, 2, 2)
twos = t.count(2)
"#);
        assert_eq!(var(&execution, "l"), var(&run("l = ['a', 'b', 'd']"), "l"));
        assert_eq!(execution.graph.lookup("last"), Some(&VarValue::string("c")));
        assert_eq!(execution.graph.lookup("idx"), Some(&VarValue::Scalar(Scalar::Integer(1))));
        assert_eq!(var(&execution, "s"), var(&run("s = ['x', 'y']"), "s"));
        assert_eq!(execution.graph.lookup("twos"), Some(&VarValue::Scalar(Scalar::Integer(2))));
    }
}

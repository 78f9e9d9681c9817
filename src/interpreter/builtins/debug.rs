use tracing::{error, info, warn};

use crate::interpreter::{Interpreter, InterpreterError, Kwargs, Value};

fn message(args: &[Value], kwargs: &Kwargs) -> String {
    let sep = kwargs.get("sep").map(Value::coerce_string).unwrap_or_else(|| " ".into());
    args.iter().map(Value::coerce_string).collect::<Vec<_>>().join(&sep)
}

/// `print(...)`. Script output goes to the log, never to stdout.
pub fn print(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let text = message(&args, &kwargs);
    info!(target: "script", "{}: {}", interp.script_path(), text.trim_end_matches('\n'));
    Ok(Value::None)
}

pub fn print_info(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    print(args, kwargs, interp)
}

pub fn print_warning(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    warn!(target: "script", "{}: WARNING: {}", interp.script_path(), message(&args, &kwargs));
    Ok(Value::None)
}

/// Reports only; unlike SCons' `print_error` helpers it does not stop the
/// script.
pub fn print_error(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    error!(target: "script", "{}: ERROR: {}", interp.script_path(), message(&args, &kwargs));
    Ok(Value::None)
}

#[cfg(test)]
mod tests {
    use crate::interpreter::tests::run;

    #[test]
    fn test_diagnostics_leave_graph_untouched() {
        let execution = run("print('a', 1, sep='-')\nprint_info('x')\nprint_warning('y')\nprint_error('z')\n");
        assert!(execution.graph.targets().is_empty());
        assert!(execution.graph.unrecognized_calls().is_empty());
        assert_eq!(execution.warnings, 0);
    }
}

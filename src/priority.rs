//! Overload ordering heuristic.
//!
//! Overloads are tried in descending priority. The score looks only at
//! method flags and argument type names, never at the call's arguments:
//! floating-point and `void*` parameters sink below integers, arguments
//! the reflection service cannot complete sink below everything, and
//! templates go after plain overloads.
//!
//! | Condition | Adjustment |
//! |---|---|
//! | builtin `void*` argument | −10000 |
//! | builtin `float` argument | −1000 |
//! | builtin `long double` argument | −100 |
//! | builtin `double` argument | −10 |
//! | builtin `bool` argument | +1 |
//! | incomplete class by reference | −1000000 |
//! | incomplete class otherwise | −100000 |
//! | each defaulted argument | −1 |
//! | const `operator[]` | −1 |
//! | template | −5000 |
//!
//! Host callbacks have a fixed priority of [`HOST_CALLBACK_PRIORITY`].

use crossbind_core::type_name;
use crossbind_core::{MethodId, Reflection};
use crossbind_marshal::is_builtin;

pub const HOST_CALLBACK_PRIORITY: i32 = 100;

/// Priority contribution of one argument type.
pub fn arg_priority(reflection: &dyn Reflection, arg_type: &str) -> i32 {
    let clean = type_name::clean_type(arg_type);
    if is_builtin(&clean) {
        if arg_type.contains("void*") {
            -10000
        } else if arg_type.contains("float") {
            -1000
        } else if arg_type.contains("long double") {
            -100
        } else if arg_type.contains("double") {
            -10
        } else if arg_type.contains("bool") {
            1
        } else {
            0
        }
    } else if !clean.is_empty() && !reflection.is_complete(&clean) {
        if arg_type.trim_end().ends_with('&') {
            -1000000
        } else {
            -100000
        }
    } else {
        0
    }
}

/// Priority of a native method.
pub fn method_priority(reflection: &dyn Reflection, method: MethodId) -> i32 {
    let nargs = reflection.arg_count(method);
    let mut priority: i32 = (0..nargs)
        .map(|i| arg_priority(reflection, &reflection.arg_type(method, i)))
        .sum();

    priority += reflection.required_args(method) as i32 - nargs as i32;

    if reflection.is_const_method(method) && reflection.method_name(method) == "operator[]" {
        priority -= 1;
    }
    if reflection.is_template(method) {
        priority -= 5000;
    }
    priority
}

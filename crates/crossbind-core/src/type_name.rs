//! Native type-string manipulation.
//!
//! Converter and executor lookup keys on type strings as the reflection
//! service spells them (`const std::string&`, `Foo*[]`, `int[16]`). This
//! module splits such strings into a canonical base name and a
//! [`Compound`] shape.
//!
//! ```
//! use crossbind_core::type_name::{clean_type, Compound};
//!
//! assert_eq!(clean_type("const Foo*&"), "Foo");
//! assert_eq!(Compound::of("const Foo*&"), Compound::PtrRef);
//! ```

use std::fmt;

/// The reference/pointer/array decoration of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compound {
    Value,
    Pointer,
    Reference,
    RValueRef,
    Array,
    PtrPtr,
    PtrRef,
    /// Decorations this layer has no shape for, e.g. `***`.
    Other,
}

impl Compound {
    /// Parse the trailing decoration of `type_name`.
    pub fn of(type_name: &str) -> Self {
        Self::from_suffix(&suffix(type_name))
    }

    pub fn from_suffix(suffix: &str) -> Self {
        match suffix {
            "" => Compound::Value,
            "*" => Compound::Pointer,
            "&" => Compound::Reference,
            "&&" => Compound::RValueRef,
            "[]" => Compound::Array,
            "**" | "&*" => Compound::PtrPtr,
            "*&" => Compound::PtrRef,
            _ => Compound::Other,
        }
    }

    /// Canonical suffix spelling used in registry keys.
    pub fn suffix(self) -> &'static str {
        match self {
            Compound::Value | Compound::Other => "",
            Compound::Pointer => "*",
            Compound::Reference => "&",
            Compound::RValueRef => "&&",
            Compound::Array => "[]",
            Compound::PtrPtr => "**",
            Compound::PtrRef => "*&",
        }
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Index where the trailing decoration of `name` begins.
fn decoration_start(name: &str) -> usize {
    let bytes = name.as_bytes();
    let mut end = bytes.len();
    while end > 0 {
        match bytes[end - 1] {
            b' ' | b'*' | b'&' => end -= 1,
            b']' => match name[..end].rfind('[') {
                Some(open) => end = open,
                None => break,
            },
            _ => break,
        }
    }
    end
}

/// The raw trailing decoration, with whitespace and array extents removed.
///
/// `"int[16]"` gives `"[]"`, `"const Foo* &"` gives `"*&"`.
pub fn suffix(type_name: &str) -> String {
    let name = remove_const(type_name);
    let start = decoration_start(&name);
    let mut out = String::new();
    let mut in_extent = false;
    for c in name[start..].chars() {
        match c {
            '[' => {
                in_extent = true;
                out.push_str("[]");
            }
            ']' => in_extent = false,
            '*' | '&' if !in_extent => out.push(c),
            _ => {}
        }
    }
    out
}

/// Strip `const`, pointer, reference, and array decorations.
pub fn clean_type(type_name: &str) -> String {
    let name = remove_const(type_name);
    let start = decoration_start(&name);
    name[..start].trim().to_string()
}

/// Remove every top-level `const` qualifier; template arguments are kept
/// intact.
pub fn remove_const(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len());
    let mut depth = 0usize;
    for token in tokens(type_name) {
        match token {
            "<" => depth += 1,
            ">" => depth = depth.saturating_sub(1),
            "const" if depth == 0 => continue,
            _ => {}
        }
        let joins_word = out
            .chars()
            .last()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
            && token.starts_with(|c: char| c.is_alphanumeric() || c == '_');
        if joins_word {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

/// Whether `type_name` carries a top-level `const`.
pub fn is_const(type_name: &str) -> bool {
    let mut depth = 0usize;
    for token in tokens(type_name) {
        match token {
            "<" => depth += 1,
            ">" => depth = depth.saturating_sub(1),
            "const" if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

/// Fixed extent of a trailing array declarator, e.g. 16 for `int[16]`.
pub fn array_size(type_name: &str) -> Option<usize> {
    let open = type_name.rfind('[')?;
    let close = type_name[open..].find(']')? + open;
    type_name[open + 1..close].trim().parse().ok()
}

/// Whether `type_name` spells a function or member-function pointer.
pub fn is_function_pointer(type_name: &str) -> bool {
    type_name.contains("(*)") || type_name.contains("::*)")
}

/// Split into identifier-ish words and single punctuation characters,
/// dropping whitespace.
fn tokens(s: &str) -> impl Iterator<Item = &str> {
    let mut rest = s;
    std::iter::from_fn(move || {
        rest = rest.trim_start();
        let first = rest.chars().next()?;
        let len = if first.is_alphanumeric() || first == '_' {
            rest.find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len())
        } else if rest.starts_with("::") {
            2
        } else {
            first.len_utf8()
        };
        let (token, tail) = rest.split_at(len);
        rest = tail;
        Some(token)
    })
}

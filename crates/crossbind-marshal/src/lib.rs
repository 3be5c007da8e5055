//! Marshaling between host values and native memory.
//!
//! This crate provides the two halves of a native call's data path:
//!
//! - [`Converter`]: host value → argument slot, and native memory ↔ host
//!   value for data members
//! - [`Executor`]: invokes a method and turns its raw result into a host
//!   value with the right ownership
//!
//! Both are looked up by native type string through a registry
//! ([`ConverterRegistry`], [`ExecutorRegistry`]). Builtin types come from
//! process-wide factory tables; class, enum, and unknown types are
//! synthesized on first use and cached per registry.
//!
//! ```ignore
//! let converters = ConverterRegistry::new(reflection.clone(), true);
//! let conv = converters.get("const std::string&", None);
//! let param = conv.set_arg(&Value::from("hello"), &mut ctx)?;
//! ```

pub mod converters;
pub mod executors;
mod lookup;

#[cfg(test)]
pub(crate) mod testing;

pub use converters::{Converter, ConverterRegistry};
pub use executors::{Executor, ExecutorRegistry};
pub use lookup::{is_builtin, smart_pointee};

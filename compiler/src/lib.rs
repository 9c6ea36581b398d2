// pkc — Polyhedral Kernel Compiler front end
//
// Library root. Turns domains, instruction text and arguments into a
// validated `Kernel`; `make_kernel` runs the whole construction pipeline.

pub mod callables;
pub mod check;
pub mod cse;
pub mod diag;
pub mod domain;
pub mod dtype;
pub mod expr;
pub mod grammar;
pub mod kernel;
pub mod lexer;
pub mod macros;
pub mod names;
pub mod options;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod polyset;
pub mod reduction;
pub mod source;
pub mod temporaries;

pub use diag::{Diagnostic, Result};
pub use kernel::Kernel;
pub use options::KernelOptions;
pub use pipeline::{make_kernel, KernelInputs};

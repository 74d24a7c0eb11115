pub mod codegen;
pub mod wat;

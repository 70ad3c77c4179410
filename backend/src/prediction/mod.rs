pub mod literal;
pub mod tabular;
pub mod weekly;

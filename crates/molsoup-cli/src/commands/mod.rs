pub mod elements;
pub mod run;

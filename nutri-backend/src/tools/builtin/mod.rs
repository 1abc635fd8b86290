pub mod csv_tools;
pub mod google_search;
pub mod reasoning;

pub use csv_tools::{csv_toolkit, CsvReader, CsvSource};
pub use google_search::GoogleSearchTool;
pub use reasoning::{reasoning_toolkit, REASONING_INSTRUCTIONS};

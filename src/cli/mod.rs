pub mod output;

pub use output::{describe_rule, print_error, print_formatted_block, print_success, Icons};

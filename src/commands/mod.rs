//! CLI command handlers.

mod check;
mod links;
mod sites;

pub use check::run_check_command;
pub use links::run_links_command;
pub use sites::{
    run_add_command, run_list_command, run_modify_command, run_remove_command, run_show_command,
};

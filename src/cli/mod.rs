//! Command-line interface

pub mod commands;

pub use commands::{
    cmd_keygen, cmd_payout, cmd_pending_list, cmd_script_create, cmd_script_inspect, cmd_sign,
    parse_extended_key, parse_output, CliResult, ScriptCreateArgs,
};

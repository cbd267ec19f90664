use crate::error::Result;
use clap::Command;
use clap_complete::Shell;
use std::io::Write;

/// Write a completion script for `shell` to `out`.
pub fn completions(cmd: &mut Command, shell: Shell, out: &mut dyn Write) -> Result<()> {
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, cmd, name, out);
    Ok(())
}

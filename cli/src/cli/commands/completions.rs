//! Shell completion scripts.

use std::io::stdout;

use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::cli::args::{Cli, ShellType};
use crate::error::Result;

/// Handle `authgate completions <shell>`.
pub fn handle_completions(shell: ShellType) -> Result<()> {
    let shell = to_shell(shell);
    generate(shell, &mut Cli::command(), "authgate", &mut stdout());
    Ok(())
}

const fn to_shell(shell: ShellType) -> Shell {
    match shell {
        ShellType::Bash => Shell::Bash,
        ShellType::Zsh => Shell::Zsh,
        ShellType::Fish => Shell::Fish,
        ShellType::PowerShell => Shell::PowerShell,
        ShellType::Elvish => Shell::Elvish,
    }
}

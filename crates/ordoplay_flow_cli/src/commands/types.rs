// SPDX-License-Identifier: MIT OR Apache-2.0
//! List the registered types.

use clap::Args;
use ordoplay_flow_compiler::CompilerSession;

/// List the types node classes can be specialized with.
#[derive(Args)]
pub struct TypesArgs {
    /// Include list types
    #[arg(long)]
    pub lists: bool,
}

/// Run the types command.
pub fn run(args: TypesArgs, session: &CompilerSession) -> anyhow::Result<()> {
    println!("{:<20} {:>5}  {:<8} Unit", "Type", "Words", "Managed");
    for descriptor in session
        .types()
        .iter()
        .filter(|t| args.lists || !t.is_list())
    {
        println!(
            "{:<20} {:>5}  {:<8} {}",
            descriptor.name,
            descriptor.shape.words(),
            if descriptor.managed { "yes" } else { "no" },
            descriptor.unit
        );
    }
    Ok(())
}

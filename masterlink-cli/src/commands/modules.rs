//! `modules` command implementation.

use anyhow::{Context, Result};
use masterlink::{Fields, MasterCommunicator, api};

/// Query and print the number of input and output modules.
pub(crate) fn cmd_modules(communicator: &MasterCommunicator, json: bool) -> Result<()> {
    let reply = communicator
        .do_command(api::number_of_io_modules(), &Fields::new())
        .context("Module count request failed")?;
    let inputs = reply.get_int("in").context("reply lacks 'in'")?;
    let outputs = reply.get_int("out").context("reply lacks 'out'")?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "inputs": inputs, "outputs": outputs })
        );
    } else {
        println!("Input modules:  {inputs}");
        println!("Output modules: {outputs}");
    }
    Ok(())
}

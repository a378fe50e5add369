//! Command dispatch: bridges CLI args to unimux-api client calls.

pub mod config_cmd;
pub mod request;

use unimux_api::Client;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a resource command to its handler.
///
/// `config` and `completions` never reach here; they run without a client.
pub async fn dispatch(
    cmd: Command,
    client: &Client,
    site: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Get(args) => request::get(client, site, args, global).await,
        Command::Create(args) => request::create(client, site, args, global).await,
        Command::Update(args) => request::update(client, site, args, global).await,
        Command::Delete(args) => request::delete(client, site, &args, global).await,
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}

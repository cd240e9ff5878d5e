/*!
 * Remote command execution
 */

use tracing::{debug, warn};

use crate::backend::CommandOutput;
use crate::error::{GridError, Result};
use crate::session::Session;

pub const EXEC: &str = "exec";

/// Run `command` with `args` on the remote side.
///
/// A non-zero exit status is returned in the output, not as an error.
pub fn exec(session: &mut Session, command: &str, args: &[String]) -> Result<CommandOutput> {
    if command.trim().is_empty() {
        return Err(GridError::validation("no command given"));
    }

    let output = session.with_session(EXEC, |fs| Ok(fs.execute(command, args)?))?;
    if output.success() {
        debug!("{} exited with status 0", command);
    } else {
        warn!("{} exited with status {}", command, output.exit_status);
    }
    Ok(output)
}

//! Running named queries page by page.

use histdb_core::Database;
use histdb_proto::{QueryRequest, QueryResponse};
use tracing::debug;

use crate::error::CliError;

/// Run `request` and hand each page to `emit`. With `all`, continuation
/// tokens are followed until the range is exhausted. Returns the number of
/// pages emitted.
pub fn run_query(
    db: &Database,
    mut request: QueryRequest,
    all: bool,
    mut emit: impl FnMut(&QueryResponse),
) -> Result<usize, CliError> {
    if all && request.max_results == 0 {
        return Err(CliError::Argument("--all needs --max-results above zero".to_string()));
    }

    let mut pages = 0;
    loop {
        let response = db.query(&request)?;
        emit(&response);
        pages += 1;
        match response.more {
            // A token equal to the bound just used means no row fits in a page.
            Some(token) if all && token != request.first => {
                debug!(page = pages, "following continuation");
                request = request.resume(token);
            }
            _ => return Ok(pages),
        }
    }
}

use std::time::Duration;

use repack_consts::consts;
use reqwest::Client;

use crate::FetchError;

/// Builds the HTTP client used to talk to the forge.
///
/// The user agent is browser-like because some forges put bot checks in front
/// of archive downloads. `timeout` bounds the whole request including the body.
pub fn build_reqwest_client(timeout: Duration) -> Result<Client, FetchError> {
    let client = Client::builder()
        .user_agent(consts::USER_AGENT)
        .connect_timeout(timeout.min(Duration::from_secs(30)))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

//! Server health command.

use anyhow::Result;

use crate::client::ApiClient;
use crate::output;

pub async fn execute(client: &ApiClient) -> Result<()> {
    let health = client.get_raw("/health").await?;

    output::print_success("Server is reachable");
    if let Some(status) = health.get("status").and_then(|v| v.as_str()) {
        output::print_detail("Status", status);
    }
    if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
        output::print_detail("Version", version);
    }
    Ok(())
}

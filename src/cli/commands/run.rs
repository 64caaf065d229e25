//! `dockloop run` - start a fresh run.

use anyhow::Result;
use tracing::info;

use super::{live_collaborators, RunOutput};
use crate::cli::output::output;
use crate::domain::models::Config;
use crate::services::Pipeline;

pub async fn execute(
    subject: &str,
    max_rounds: Option<u32>,
    mut config: Config,
    json_mode: bool,
) -> Result<()> {
    if let Some(max_rounds) = max_rounds {
        config.max_rounds = max_rounds;
    }
    info!(subject, max_rounds = config.max_rounds, output_dir = %config.output_dir, "run requested");

    let pipeline = Pipeline::new(live_collaborators(&config)?, &config);
    let state = pipeline.run(subject).await?;

    output(&RunOutput::from_state(&state, &config.output_dir), json_mode);
    Ok(())
}

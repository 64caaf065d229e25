//! `dockloop resume` - continue from the last checkpoint.

use anyhow::Result;

use super::{live_collaborators, RunOutput};
use crate::cli::output::output;
use crate::domain::models::Config;
use crate::services::Pipeline;

pub async fn execute(config: Config, json_mode: bool) -> Result<()> {
    let pipeline = Pipeline::new(live_collaborators(&config)?, &config);
    let state = pipeline.resume().await?;

    output(&RunOutput::from_state(&state, &config.output_dir), json_mode);
    Ok(())
}

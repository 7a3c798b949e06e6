use std::path::PathBuf;

use nodeagent::runtime::{boot, run};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    boot::init_logging();
    let spec = std::env::args_os().nth(1).map(PathBuf::from);
    let (state, _config) = boot::boot().await?;
    run::run(state, spec.as_deref()).await
}

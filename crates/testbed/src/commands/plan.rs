use std::path::Path;

use testbed_core::ResourcePlan;

use crate::error::Result;
use crate::output;

pub(super) fn run(file: &Path) -> Result<()> {
    let plan = ResourcePlan::load(file)?;
    print!("{}", output::plan_order(&plan));
    Ok(())
}

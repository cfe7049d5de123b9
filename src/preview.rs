use anyhow::Result;
use log::info;

use crate::{cli::PreviewArgs, io_utils, normalize::Dataset, table};

pub fn execute(args: &PreviewArgs) -> Result<()> {
    let dataset = io_utils::load_dataset(&args.input.input, args.input.mime.as_deref())?;
    let rows = preview_rows(&dataset, args.rows);
    table::print_table(&dataset.columns, &rows);
    info!(
        "Displayed {} of {} row(s) from {:?}",
        rows.len(),
        dataset.row_count(),
        args.input.input
    );
    Ok(())
}

/// The first `limit` records as display strings, one cell per column.
pub fn preview_rows(dataset: &Dataset, limit: usize) -> Vec<Vec<String>> {
    dataset
        .sample(limit)
        .iter()
        .map(|record| {
            dataset
                .columns
                .iter()
                .map(|column| record.get(column).as_display())
                .collect()
        })
        .collect()
}

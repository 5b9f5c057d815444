//! `bwr table` commands

use super::written;
use crate::error::{require_exists, Result};
use crate::TableCommand;
use bwr_formats::table::{self, CollapseOptions, Table};
use std::collections::HashMap;
use tracing::info;

pub fn run(command: &TableCommand) -> Result<()> {
    match command {
        TableCommand::Collapse {
            input,
            by,
            output,
            sep,
            empty_rep,
            ignore,
        } => {
            require_exists(input)?;
            let options = CollapseOptions {
                sep,
                empty_rep: empty_rep.as_deref(),
                ignore: ignore.as_deref(),
            };
            let source = Table::read(input)?;
            let collapsed = table::collapse(&source, by, &options)?;
            info!(rows = source.len(), groups = collapsed.len(), "Collapsed table");
            collapsed.write(output)?;
            written(output);
        },
        TableCommand::Replace {
            input,
            column,
            mapping,
            output,
        } => {
            require_exists(input)?;
            require_exists(mapping)?;
            let map: HashMap<String, String> = table::read_pairs(mapping)?.into_iter().collect();
            let mut data = Table::read(input)?;
            let replaced = table::replace_column_values(&mut data, column, &map)?;
            info!(replaced, column = %column, "Replaced column values");
            data.write(output)?;
            written(output);
        },
    }
    Ok(())
}

//! Table rendering for the `fields` subcommand

use tabled::{
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Rows},
};

use crate::export::{FieldId, SchemaPath};

/// Render sampled field paths as a table of `#`, dotted path and depth
pub fn render_fields_table(paths: &[SchemaPath]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["#", "Field", "Depth", "Id"]);

    for (index, path) in paths.iter().enumerate() {
        builder.push_record([
            (index + 1).to_string(),
            path.join("."),
            path.len().to_string(),
            FieldId::for_path(path).to_string(),
        ]);
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.with(Modify::new(Rows::first()).with(Alignment::center()));
    table.to_string()
}
